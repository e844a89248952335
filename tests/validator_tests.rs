use graphqa::{
    GeneratedQuery, SchemaSnapshot, ValidationErrorKind,
    validator::{QueryValidator, WritePolicy},
};

fn schema() -> SchemaSnapshot {
    SchemaSnapshot::new()
        .with_label("Contract", ["name", "value"])
        .with_label("Clause", ["title", "text"])
        .with_label("Party", ["name"])
        .with_relationship("HAS_CLAUSE", ["position"])
        .with_relationship("PARTY_TO", Vec::<String>::new())
        .with_pattern("Contract", "HAS_CLAUSE", "Clause")
        .with_pattern("Party", "PARTY_TO", "Contract")
}

fn check(text: &str) -> Result<graphqa::validator::ValidationReport, graphqa::ValidationError> {
    QueryValidator::default().validate(&GeneratedQuery::new(text), &schema())
}

#[test]
fn test_unknown_relationship_type_reported() {
    let err = check("MATCH (c:Contract)-[:FOO]->(k:Clause) RETURN k").unwrap_err();
    assert_eq!(err.kind, ValidationErrorKind::UnknownRelationship);
    assert_eq!(err.identifier, "FOO");
}

#[test]
fn test_first_mismatch_in_text_order_wins() {
    let err = check("MATCH (p:Person)-[:FOO]->(c:Contract) RETURN p.age").unwrap_err();
    assert_eq!(err.kind, ValidationErrorKind::UnknownLabel);
    assert_eq!(err.identifier, "Person");

    let err = check("MATCH (c:Contract) WHERE c.age > 1 MATCH (c)-[:FOO]->() RETURN c").unwrap_err();
    assert_eq!(err.kind, ValidationErrorKind::UnknownProperty);
    assert_eq!(err.identifier, "age");
}

#[test]
fn test_alternative_relationship_types_checked() {
    let err = check("MATCH (a)-[:HAS_CLAUSE|SIGNED]->(b) RETURN b").unwrap_err();
    assert_eq!(err.identifier, "SIGNED");
}

#[test]
fn test_pattern_property_keys_scoped_to_label() {
    let err = check("MATCH (k:Clause {name: 'x'}) RETURN k").unwrap_err();
    assert_eq!(err.kind, ValidationErrorKind::UnknownProperty);
    assert_eq!(err.identifier, "name");
    assert!(check("MATCH (p:Party {name: 'ACME'})-[:PARTY_TO]->(c) RETURN c.value").is_ok());
}

#[test]
fn test_relationship_property_scope() {
    assert!(check("MATCH ()-[r:HAS_CLAUSE {position: 1}]->(k) RETURN r.position").is_ok());
    let err = check("MATCH ()-[r:PARTY_TO]->() RETURN r.position").unwrap_err();
    assert_eq!(err.identifier, "position");
}

#[test]
fn test_string_contents_are_ignored() {
    assert!(check("MATCH (c:Contract) WHERE c.name = 'Person:FOO.bar' RETURN c").is_ok());
}

#[test]
fn test_validation_is_deterministic() {
    let query = GeneratedQuery::new("MATCH (c:Contract)-[:HAS_CLAUSE]->(k) RETURN c.name, k.title");
    let validator = QueryValidator::default();
    let first = validator.validate(&query, &schema()).expect("valid");
    let second = validator.validate(&query, &schema()).expect("valid");
    assert_eq!(first, second);
    assert_eq!(first.properties, vec!["name", "title"]);
}

#[test]
fn test_write_query_allowed_under_warn_policy() {
    let report = check("MATCH (c:Contract) SET c.value = 1 RETURN c").expect("warn");
    assert!(report.mutating);
    assert_eq!(report.write_clauses, vec!["SET"]);
}

#[test]
fn test_write_query_rejected_under_reject_policy() {
    let validator = QueryValidator::new(WritePolicy::Reject);
    let err = validator
        .validate(
            &GeneratedQuery::new("MATCH (c:Contract) DETACH DELETE c"),
            &schema(),
        )
        .unwrap_err();
    assert_eq!(err.kind, ValidationErrorKind::MutatingQuery);
    assert_eq!(err.identifier, "DETACH DELETE");
}

#[test]
fn test_create_cannot_invent_labels() {
    let err = check("CREATE (n:Invoice {total: 1})").unwrap_err();
    assert_eq!(err.kind, ValidationErrorKind::UnknownLabel);
    assert_eq!(err.identifier, "Invoice");
}

#[test]
fn test_write_policy_parses() {
    assert_eq!("reject".parse::<WritePolicy>(), Ok(WritePolicy::Reject));
    assert_eq!(" Warn ".parse::<WritePolicy>(), Ok(WritePolicy::Warn));
    assert!("allow".parse::<WritePolicy>().is_err());
}
