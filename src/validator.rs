//! Static schema-conformance check over the token stream of a generated query.
//!
//! The scan does not build an AST: it tracks bracket context well enough to
//! tell node patterns, relationship brackets, pattern property maps and label
//! predicates apart, then checks every identifier against the snapshot in the
//! order it appears.

use std::str::FromStr;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    cypher::lexer::{Token, TokenKind, tokenize},
    errors::{ValidationError, ValidationErrorKind},
    schema::SchemaSnapshot,
    synthesizer::GeneratedQuery,
};

/// Keywords after which `(` opens a pattern or expression rather than a call.
const NOT_CALLABLE: &[&str] = &[
    "MATCH", "OPTIONAL", "MERGE", "CREATE", "WHERE", "AND", "OR", "XOR", "NOT", "IN", "RETURN",
    "WITH", "DISTINCT", "UNWIND", "AS", "DELETE", "DETACH", "SET", "REMOVE", "CASE", "WHEN",
    "THEN", "ELSE", "CONTAINS", "IS", "ON", "BY", "SKIP", "LIMIT", "UNION", "ALL", "YIELD",
];

const WRITE_KEYWORDS: &[&str] = &["CREATE", "MERGE", "SET", "DELETE", "REMOVE"];

/// What happens when a query contains write clauses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WritePolicy {
    /// Log at `warn` and let the query run.
    #[default]
    Warn,
    /// Fail validation with [`ValidationErrorKind::MutatingQuery`].
    Reject,
}

impl FromStr for WritePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warn" => Ok(WritePolicy::Warn),
            "reject" => Ok(WritePolicy::Reject),
            other => Err(format!("unknown write policy `{other}` (expected warn|reject)")),
        }
    }
}

/// Identifiers a query references, plus its write clauses.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub mutating: bool,
    pub write_clauses: Vec<String>,
    pub labels: Vec<String>,
    pub relationship_types: Vec<String>,
    pub properties: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct QueryValidator {
    write_policy: WritePolicy,
}

impl QueryValidator {
    pub fn new(write_policy: WritePolicy) -> Self {
        Self { write_policy }
    }

    pub fn write_policy(&self) -> WritePolicy {
        self.write_policy
    }

    /// Deterministic: the same query and snapshot always give the same result.
    pub fn validate(
        &self,
        query: &GeneratedQuery,
        schema: &SchemaSnapshot,
    ) -> Result<ValidationReport, ValidationError> {
        let tokens = match tokenize(query.as_str()) {
            Ok(tokens) => tokens,
            Err(err) => {
                // Malformed text is left for the executor to classify.
                debug!(error = %err, "query does not tokenize; skipping schema checks");
                return Ok(ValidationReport::default());
            }
        };
        let events = scan(&tokens);
        let bindings = Bindings::from_events(&events);
        let mut report = ValidationReport::default();
        for event in &events {
            match event {
                Event::Label(label) => {
                    if !schema.has_label(label) {
                        return Err(ValidationError::new(ValidationErrorKind::UnknownLabel, label));
                    }
                    push_unique(&mut report.labels, label);
                }
                Event::RelType(rel_type) => {
                    if !schema.has_relationship_type(rel_type) {
                        return Err(ValidationError::new(
                            ValidationErrorKind::UnknownRelationship,
                            rel_type,
                        ));
                    }
                    push_unique(&mut report.relationship_types, rel_type);
                }
                Event::Property { key, owner } => {
                    if !bindings.property_known(schema, owner, key) {
                        return Err(ValidationError::new(
                            ValidationErrorKind::UnknownProperty,
                            key,
                        ));
                    }
                    push_unique(&mut report.properties, key);
                }
                Event::Write(clause) => {
                    if self.write_policy == WritePolicy::Reject {
                        return Err(ValidationError::new(
                            ValidationErrorKind::MutatingQuery,
                            clause,
                        ));
                    }
                    report.mutating = true;
                    push_unique(&mut report.write_clauses, clause);
                }
                Event::BindNode { .. } | Event::BindRel { .. } => {}
            }
        }
        if report.mutating {
            warn!(clauses = ?report.write_clauses, "generated query writes to the graph");
        }
        Ok(report)
    }
}

fn push_unique(values: &mut Vec<String>, value: &str) {
    if !values.iter().any(|v| v == value) {
        values.push(value.to_string());
    }
}

/// Element whose labels or types scope a property reference.
#[derive(Clone, Debug, PartialEq)]
enum Owner {
    Var(String),
    Node {
        var: Option<String>,
        labels: Vec<String>,
    },
    Rel {
        var: Option<String>,
        types: Vec<String>,
    },
    Unknown,
}

#[derive(Clone, Debug, PartialEq)]
enum Event {
    Label(String),
    RelType(String),
    Property { key: String, owner: Owner },
    Write(String),
    BindNode { var: String, labels: Vec<String> },
    BindRel { var: String, types: Vec<String> },
}

enum Ctx {
    Paren,
    List,
    Node {
        var: Option<String>,
        labels: Vec<String>,
    },
    Rel {
        var: Option<String>,
        types: Vec<String>,
    },
    Map {
        owner: Option<Owner>,
    },
}

#[derive(Default)]
struct Bindings {
    nodes: AHashMap<String, Vec<String>>,
    rels: AHashMap<String, Vec<String>>,
}

impl Bindings {
    fn from_events(events: &[Event]) -> Self {
        let mut bindings = Bindings::default();
        for event in events {
            match event {
                Event::BindNode { var, labels } => {
                    let entry = bindings.nodes.entry(var.clone()).or_default();
                    for label in labels {
                        if !entry.contains(label) {
                            entry.push(label.clone());
                        }
                    }
                }
                Event::BindRel { var, types } => {
                    let entry = bindings.rels.entry(var.clone()).or_default();
                    for ty in types {
                        if !entry.contains(ty) {
                            entry.push(ty.clone());
                        }
                    }
                }
                _ => {}
            }
        }
        bindings
    }

    fn node_labels(&self, var: Option<&String>) -> &[String] {
        var.and_then(|v| self.nodes.get(v))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn rel_types(&self, var: Option<&String>) -> &[String] {
        var.and_then(|v| self.rels.get(v))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Checks against the owner's labels or types when known, otherwise
    /// against every property in the schema.
    fn property_known(&self, schema: &SchemaSnapshot, owner: &Owner, key: &str) -> bool {
        let (labels, types): (Vec<&String>, Vec<&String>) = match owner {
            Owner::Var(var) => (
                self.node_labels(Some(var)).iter().collect(),
                self.rel_types(Some(var)).iter().collect(),
            ),
            Owner::Node { var, labels } => (
                labels
                    .iter()
                    .chain(self.node_labels(var.as_ref()))
                    .collect(),
                Vec::new(),
            ),
            Owner::Rel { var, types } => (
                Vec::new(),
                types.iter().chain(self.rel_types(var.as_ref())).collect(),
            ),
            Owner::Unknown => (Vec::new(), Vec::new()),
        };
        if labels.is_empty() && types.is_empty() {
            return schema.has_property(key);
        }
        labels.iter().any(|l| schema.label_has_property(l, key))
            || types.iter().any(|t| schema.relationship_has_property(t, key))
    }
}

fn kind_at(tokens: &[Token], idx: usize) -> Option<&TokenKind> {
    tokens.get(idx).map(|t| &t.kind)
}

fn prev_kind(tokens: &[Token], idx: usize) -> Option<&TokenKind> {
    idx.checked_sub(1).and_then(|prev| kind_at(tokens, prev))
}

fn ident_at(tokens: &[Token], idx: usize) -> Option<String> {
    tokens.get(idx).and_then(Token::ident).map(str::to_string)
}

fn is_call(tokens: &[Token], paren: usize) -> bool {
    let Some(prev) = paren.checked_sub(1).and_then(|p| tokens.get(p)) else {
        return false;
    };
    match &prev.kind {
        TokenKind::Ident { quoted: true, .. } => true,
        TokenKind::Ident { .. } => !NOT_CALLABLE.iter().any(|kw| prev.is_keyword(kw)),
        _ => false,
    }
}

fn write_clause(tokens: &[Token], idx: usize) -> Option<String> {
    let token = &tokens[idx];
    if token.is_keyword("DETACH") && tokens.get(idx + 1).is_some_and(|t| t.is_keyword("DELETE")) {
        return Some("DETACH DELETE".to_string());
    }
    WRITE_KEYWORDS
        .iter()
        .find(|kw| token.is_keyword(kw))
        .map(|kw| kw.to_string())
}

fn scan(tokens: &[Token]) -> Vec<Event> {
    let mut events = Vec::new();
    let mut stack: Vec<Ctx> = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let in_map = matches!(stack.last(), Some(Ctx::Map { .. }));
        let at_key = in_map
            && matches!(prev_kind(tokens, i), Some(TokenKind::LBrace | TokenKind::Comma))
            && kind_at(tokens, i + 1) == Some(&TokenKind::Colon);
        match &tokens[i].kind {
            TokenKind::Ident { .. } | TokenKind::Str(_) if at_key => {
                if let Some(Ctx::Map { owner: Some(owner) }) = stack.last() {
                    let key = match &tokens[i].kind {
                        TokenKind::Str(key) => key.clone(),
                        _ => ident_at(tokens, i).unwrap_or_default(),
                    };
                    events.push(Event::Property {
                        key,
                        owner: owner.clone(),
                    });
                }
                i += 2;
            }
            TokenKind::Ident { quoted, .. } => {
                if !quoted {
                    if let Some(clause) = write_clause(tokens, i) {
                        let width = if clause == "DETACH DELETE" { 2 } else { 1 };
                        events.push(Event::Write(clause));
                        i += width;
                        continue;
                    }
                }
                if !in_map && kind_at(tokens, i + 1) == Some(&TokenKind::Colon) {
                    let mut j = i + 1;
                    while kind_at(tokens, j) == Some(&TokenKind::Colon) {
                        let Some(label) = ident_at(tokens, j + 1) else {
                            break;
                        };
                        events.push(Event::Label(label));
                        j += 2;
                    }
                    i = j;
                } else {
                    i += 1;
                }
            }
            TokenKind::Dot => {
                let Some(key) = ident_at(tokens, i + 1) else {
                    i += 1;
                    continue;
                };
                let mut end = i;
                while kind_at(tokens, end) == Some(&TokenKind::Dot)
                    && ident_at(tokens, end + 1).is_some()
                {
                    end += 2;
                }
                if kind_at(tokens, end) == Some(&TokenKind::LParen) {
                    // Namespaced function such as `db.labels()`.
                    i = end;
                    continue;
                }
                let owner = match (prev_kind(tokens, i), i.checked_sub(2).map(|p| kind_at(tokens, p))) {
                    (Some(TokenKind::Ident { name, .. }), before) if before.flatten() != Some(&TokenKind::Dot) => {
                        Owner::Var(name.clone())
                    }
                    _ => Owner::Unknown,
                };
                events.push(Event::Property { key, owner });
                i = end;
            }
            TokenKind::LParen => {
                if is_call(tokens, i) {
                    stack.push(Ctx::Paren);
                    i += 1;
                    continue;
                }
                let mut j = i + 1;
                let opens_head = |k: Option<&TokenKind>| {
                    matches!(
                        k,
                        Some(TokenKind::RParen | TokenKind::Colon | TokenKind::LBrace)
                    )
                };
                let var = match ident_at(tokens, j) {
                    Some(name) if opens_head(kind_at(tokens, j + 1)) => {
                        j += 1;
                        Some(name)
                    }
                    _ => None,
                };
                if var.is_none() && !opens_head(kind_at(tokens, j)) {
                    stack.push(Ctx::Paren);
                    i += 1;
                    continue;
                }
                let mut labels = Vec::new();
                while kind_at(tokens, j) == Some(&TokenKind::Colon) {
                    let Some(label) = ident_at(tokens, j + 1) else {
                        break;
                    };
                    events.push(Event::Label(label.clone()));
                    labels.push(label);
                    j += 2;
                }
                if let Some(var) = &var {
                    events.push(Event::BindNode {
                        var: var.clone(),
                        labels: labels.clone(),
                    });
                }
                stack.push(Ctx::Node { var, labels });
                i = j;
            }
            TokenKind::LBracket if prev_kind(tokens, i) == Some(&TokenKind::Minus) => {
                let mut j = i + 1;
                let var = match ident_at(tokens, j) {
                    Some(name)
                        if matches!(
                            kind_at(tokens, j + 1),
                            Some(
                                TokenKind::Colon
                                    | TokenKind::RBracket
                                    | TokenKind::LBrace
                                    | TokenKind::Star
                            )
                        ) =>
                    {
                        j += 1;
                        Some(name)
                    }
                    _ => None,
                };
                let mut types = Vec::new();
                if kind_at(tokens, j) == Some(&TokenKind::Colon) {
                    j += 1;
                    while let Some(ty) = ident_at(tokens, j) {
                        events.push(Event::RelType(ty.clone()));
                        types.push(ty);
                        j += 1;
                        if kind_at(tokens, j) != Some(&TokenKind::Pipe) {
                            break;
                        }
                        j += 1;
                        if kind_at(tokens, j) == Some(&TokenKind::Colon) {
                            j += 1;
                        }
                    }
                }
                if let Some(var) = &var {
                    events.push(Event::BindRel {
                        var: var.clone(),
                        types: types.clone(),
                    });
                }
                stack.push(Ctx::Rel { var, types });
                i = j;
            }
            TokenKind::LBracket => {
                stack.push(Ctx::List);
                i += 1;
            }
            TokenKind::LBrace => {
                let owner = match stack.last() {
                    Some(Ctx::Node { var, labels }) => Some(Owner::Node {
                        var: var.clone(),
                        labels: labels.clone(),
                    }),
                    Some(Ctx::Rel { var, types }) => Some(Owner::Rel {
                        var: var.clone(),
                        types: types.clone(),
                    }),
                    _ => None,
                };
                stack.push(Ctx::Map { owner });
                i += 1;
            }
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                stack.pop();
                i += 1;
            }
            _ => i += 1,
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> SchemaSnapshot {
        SchemaSnapshot::new()
            .with_label("Contract", ["name", "text"])
            .with_label("Clause", ["title"])
            .with_relationship("HAS_CLAUSE", ["position"])
            .with_pattern("Contract", "HAS_CLAUSE", "Clause")
    }

    fn validate(text: &str) -> Result<ValidationReport, ValidationError> {
        QueryValidator::default().validate(&GeneratedQuery::new(text), &schema())
    }

    #[test]
    fn accepts_conforming_query() {
        let report = validate(
            "MATCH (c:Contract {name: 'x'})-[r:HAS_CLAUSE]->(k:Clause) \
             WHERE r.position > 1 RETURN c.text, k.title, count(k) AS n",
        )
        .expect("valid");
        assert_eq!(report.labels, vec!["Contract", "Clause"]);
        assert_eq!(report.relationship_types, vec!["HAS_CLAUSE"]);
        assert!(!report.mutating);
    }

    #[test]
    fn property_scoped_to_bound_label() {
        let err = validate("MATCH (k:Clause) RETURN k.name").expect_err("scoped");
        assert_eq!(err.kind, ValidationErrorKind::UnknownProperty);
        assert_eq!(err.identifier, "name");
    }

    #[test]
    fn unbound_variable_uses_union() {
        assert!(validate("MATCH (n) WHERE n.title = 'x' RETURN n").is_ok());
    }

    #[test]
    fn map_literal_keys_are_not_labels() {
        assert!(validate("MATCH (c:Contract) RETURN {label: c.name} AS m").is_ok());
    }

    #[test]
    fn namespaced_calls_are_skipped() {
        assert!(validate("MATCH (c:Contract) RETURN apoc.text.clean(c.name)").is_ok());
    }

    #[test]
    fn label_predicate_is_checked() {
        let err = validate("MATCH (n) WHERE n:Person RETURN n").expect_err("label");
        assert_eq!(err.kind, ValidationErrorKind::UnknownLabel);
        assert_eq!(err.identifier, "Person");
    }
}
