use std::{cmp::Ordering, collections::BTreeMap};

use serde_json::{Number, Value as Json};

use crate::errors::CypherError;

/// Runtime value of the interpreter. Nodes and relationships are held by id
/// and resolved against the store on access.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Node(i64),
    Relationship(i64),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Node(_) => "node",
            Value::Relationship(_) => "relationship",
        }
    }

    pub fn from_json(json: &Json) -> Value {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Value::Str(s.clone()),
            Json::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            Json::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// JSON form of a value that may be stored as a property.
    pub fn to_property(&self) -> Result<Json, CypherError> {
        match self {
            Value::Null => Ok(Json::Null),
            Value::Bool(b) => Ok(Json::Bool(*b)),
            Value::Int(i) => Ok(Json::from(*i)),
            Value::Float(f) => Number::from_f64(*f)
                .map(Json::Number)
                .ok_or_else(|| CypherError::type_error("non-finite float cannot be stored")),
            Value::Str(s) => Ok(Json::String(s.clone())),
            Value::List(items) => items
                .iter()
                .map(|item| match item {
                    Value::List(_) => Err(CypherError::type_error(
                        "nested lists cannot be stored as properties",
                    )),
                    other => other.to_property(),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Json::Array),
            other => Err(CypherError::type_error(format!(
                "{} cannot be stored as a property",
                other.type_name()
            ))),
        }
    }

    /// Canonical text used for grouping and DISTINCT.
    pub fn group_key(values: &[Value]) -> String {
        format!("{values:?}")
    }

    /// Cypher equality: `None` when the outcome is unknown (null involved).
    pub fn equals(&self, other: &Value) -> Option<bool> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                Some((*a as f64) == *b)
            }
            (Value::List(a), Value::List(b)) => {
                if a.len() != b.len() {
                    return Some(false);
                }
                let mut unknown = false;
                for (x, y) in a.iter().zip(b) {
                    match x.equals(y) {
                        Some(false) => return Some(false),
                        None => unknown = true,
                        Some(true) => {}
                    }
                }
                if unknown { None } else { Some(true) }
            }
            (Value::Map(a), Value::Map(b)) => {
                if a.len() != b.len() || a.keys().ne(b.keys()) {
                    return Some(false);
                }
                let mut unknown = false;
                for (x, y) in a.values().zip(b.values()) {
                    match x.equals(y) {
                        Some(false) => return Some(false),
                        None => unknown = true,
                        Some(true) => {}
                    }
                }
                if unknown { None } else { Some(true) }
            }
            (a, b) => Some(a == b),
        }
    }

    /// Ordering for `<`-style comparisons; `None` when the types are not comparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b) {
                    match x.compare(y)? {
                        Ordering::Equal => {}
                        other => return Some(other),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => None,
        }
    }

    /// Total order used by ORDER BY, min and max. Nulls sort last.
    pub fn order(&self, other: &Value) -> Ordering {
        let rank = |v: &Value| match v {
            Value::Map(_) => 0,
            Value::Node(_) => 1,
            Value::Relationship(_) => 2,
            Value::List(_) => 3,
            Value::Str(_) => 4,
            Value::Bool(_) => 5,
            Value::Int(_) | Value::Float(_) => 6,
            Value::Null => 7,
        };
        match (self, other) {
            (Value::Node(a), Value::Node(b)) | (Value::Relationship(a), Value::Relationship(b)) => {
                a.cmp(b)
            }
            (Value::Map(a), Value::Map(b)) => format!("{a:?}").cmp(&format!("{b:?}")),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b) {
                    match x.order(y) {
                        Ordering::Equal => {}
                        other => return other,
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (a, b) if rank(a) == rank(b) => a.compare(b).unwrap_or(Ordering::Equal),
            (a, b) => rank(a).cmp(&rank(b)),
        }
    }

    pub fn as_bool(&self) -> Result<Option<bool>, CypherError> {
        match self {
            Value::Null => Ok(None),
            Value::Bool(b) => Ok(Some(*b)),
            other => Err(CypherError::type_error(format!(
                "expected a boolean, found {}",
                other.type_name()
            ))),
        }
    }
}

impl From<Option<bool>> for Value {
    fn from(value: Option<bool>) -> Self {
        value.map(Value::Bool).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_equality_is_unknown() {
        assert_eq!(Value::Null.equals(&Value::Int(1)), None);
        assert_eq!(Value::Int(1).equals(&Value::Float(1.0)), Some(true));
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::Null]).equals(&Value::List(vec![
                Value::Int(2),
                Value::Null
            ])),
            Some(false)
        );
    }

    #[test]
    fn ordering_puts_nulls_last() {
        let mut values = vec![Value::Null, Value::Int(3), Value::Float(1.5), Value::Int(2)];
        values.sort_by(|a, b| a.order(b));
        assert_eq!(
            values,
            vec![Value::Float(1.5), Value::Int(2), Value::Int(3), Value::Null]
        );
    }

    #[test]
    fn json_conversion_keeps_integers() {
        assert_eq!(Value::from_json(&json!(4)), Value::Int(4));
        assert_eq!(Value::from_json(&json!(4.5)), Value::Float(4.5));
        assert!(Value::Map(BTreeMap::new()).to_property().is_err());
    }
}
