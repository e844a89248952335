use rand::{Rng, SeedableRng, rngs::StdRng};
use serde_json::{Map, Value, json};

use crate::seed::{SeedDocument, SeedNode, SeedRelationship};

/// Shape of the synthetic contract graph.
#[derive(Clone, Copy, Debug)]
pub struct DatasetShape {
    pub contracts: usize,
    pub clauses_per_contract: usize,
    pub parties: usize,
    /// Random `REFERS_TO` links between clauses of different contracts.
    pub cross_references: usize,
}

impl Default for DatasetShape {
    fn default() -> Self {
        Self {
            contracts: 50,
            clauses_per_contract: 8,
            parties: 20,
            cross_references: 100,
        }
    }
}

const COUNTRIES: &[&str] = &["SE", "DE", "US", "JP"];

const CLAUSE_TITLES: &[&str] = &[
    "Definitions",
    "Term",
    "Termination",
    "Confidentiality",
    "Liability",
    "Indemnity",
    "Governing Law",
    "Payment",
    "Assignment",
    "Notices",
];

/// Deterministic for a given `(shape, seed)`.
pub fn generate_dataset(shape: DatasetShape, seed: u64) -> SeedDocument {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut doc = SeedDocument::default();

    for p in 0..shape.parties {
        let country = COUNTRIES[p % COUNTRIES.len()];
        doc.nodes.push(node(
            format!("p{p}"),
            "Party",
            json!({ "name": format!("Party {p}"), "country": country }),
        ));
    }
    for c in 0..shape.contracts {
        doc.nodes.push(node(
            format!("c{c}"),
            "Contract",
            json!({
                "name": format!("Contract {c}"),
                "value": rng.gen_range(1_000..1_000_000),
                "signed": 2000 + (c % 25) as i64,
            }),
        ));
        if shape.parties > 0 {
            for _ in 0..2 {
                let party = rng.gen_range(0..shape.parties);
                doc.relationships.push(rel(format!("p{party}"), format!("c{c}"), "PARTY_TO"));
            }
        }
        for k in 0..shape.clauses_per_contract {
            let key = format!("c{c}k{k}");
            doc.nodes.push(node(
                key.clone(),
                "Clause",
                json!({
                    "title": CLAUSE_TITLES[k % CLAUSE_TITLES.len()],
                    "text": format!("Clause {k} of contract {c}"),
                }),
            ));
            let mut has = rel(format!("c{c}"), key, "HAS_CLAUSE");
            has.properties.insert("position".into(), json!(k));
            doc.relationships.push(has);
        }
    }
    if shape.contracts > 1 && shape.clauses_per_contract > 0 {
        for _ in 0..shape.cross_references {
            let from = rng.gen_range(0..shape.contracts);
            let mut to = rng.gen_range(0..shape.contracts);
            if to == from {
                to = (to + 1) % shape.contracts;
            }
            let from_clause = rng.gen_range(0..shape.clauses_per_contract);
            let to_clause = rng.gen_range(0..shape.clauses_per_contract);
            doc.relationships.push(rel(
                format!("c{from}k{from_clause}"),
                format!("c{to}k{to_clause}"),
                "REFERS_TO",
            ));
        }
    }
    doc
}

fn node(key: String, label: &str, properties: Value) -> SeedNode {
    SeedNode {
        key,
        labels: vec![label.to_string()],
        properties: match properties {
            Value::Object(map) => map,
            _ => Map::new(),
        },
    }
}

fn rel(from: String, to: String, rel_type: &str) -> SeedRelationship {
    SeedRelationship {
        from,
        to,
        rel_type: rel_type.to_string(),
        properties: Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_is_deterministic_and_complete() {
        let shape = DatasetShape {
            contracts: 3,
            clauses_per_contract: 2,
            parties: 5,
            cross_references: 4,
        };
        let doc = generate_dataset(shape, 11);
        assert_eq!(doc.nodes.len(), 3 + 3 * 2 + 5);
        assert_eq!(doc.relationships.len(), 3 * 2 + 3 * 2 + 4);
        let party = &doc.nodes[4];
        assert_eq!(party.labels, vec!["Party"]);
        assert_eq!(party.properties["country"], json!("SE"));

        assert_eq!(doc, generate_dataset(shape, 11));
    }
}
