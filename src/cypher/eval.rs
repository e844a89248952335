use std::collections::BTreeMap;

use regex::Regex;

use super::{
    ast::{BinaryOp, Expr, Literal, UnaryOp},
    exec::{Interpreter, Row, lookup},
    value::Value,
};
use crate::errors::CypherError;

/// Scalar functions the interpreter evaluates, lower-cased.
const FUNCTIONS: &[&str] = &[
    "exists", "id", "labels", "type", "startnode", "endnode", "keys", "properties", "tolower",
    "toupper", "trim", "ltrim", "rtrim", "reverse", "tostring", "tointeger", "tofloat", "size",
    "length", "head", "last", "abs", "round", "range", "split", "replace", "substring", "left",
    "right",
];

impl Interpreter<'_> {
    pub(super) fn eval(&mut self, expr: &Expr, row: &Row) -> Result<Value, CypherError> {
        self.eval_with(expr, row, &[])
    }

    /// Evaluates `expr`; aggregate calls resolve to the values precomputed in
    /// `aggregates`, matched by node identity.
    pub(super) fn eval_with(
        &mut self,
        expr: &Expr,
        row: &Row,
        aggregates: &[(&Expr, Value)],
    ) -> Result<Value, CypherError> {
        if expr.is_aggregate_call() {
            return aggregates
                .iter()
                .find(|(call, _)| std::ptr::eq(*call, expr))
                .map(|(_, value)| value.clone())
                .ok_or_else(|| {
                    CypherError::semantic("aggregate functions are only allowed in WITH and RETURN")
                });
        }
        match expr {
            Expr::Literal(literal) => Ok(match literal {
                Literal::Null => Value::Null,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Int(i) => Value::Int(*i),
                Literal::Float(f) => Value::Float(*f),
                Literal::Str(s) => Value::Str(s.clone()),
            }),
            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval_with(item, row, aggregates)?);
                }
                Ok(Value::List(values))
            }
            Expr::Map(entries) => {
                let mut map = BTreeMap::new();
                for (key, item) in entries {
                    map.insert(key.clone(), self.eval_with(item, row, aggregates)?);
                }
                Ok(Value::Map(map))
            }
            Expr::Variable(name) => lookup(row, name),
            Expr::Property(base, key) => {
                let base = self.eval_with(base, row, aggregates)?;
                self.property(&base, key)
            }
            Expr::Index(base, index) => {
                let base = self.eval_with(base, row, aggregates)?;
                let index = self.eval_with(index, row, aggregates)?;
                self.index(base, index)
            }
            Expr::Call { name, args, .. } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval_with(arg, row, aggregates)?);
                }
                self.call(name, values)
            }
            Expr::CountStar => Err(CypherError::semantic("count(*) is only allowed in WITH and RETURN")),
            Expr::Unary(UnaryOp::Not, inner) => {
                let value = self.eval_with(inner, row, aggregates)?;
                Ok(value.as_bool()?.map(|b| !b).into())
            }
            Expr::Unary(UnaryOp::Neg, inner) => match self.eval_with(inner, row, aggregates)? {
                Value::Null => Ok(Value::Null),
                Value::Int(i) => i
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| CypherError::type_error("integer overflow")),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(CypherError::type_error(format!(
                    "cannot negate {}",
                    other.type_name()
                ))),
            },
            Expr::Binary(op @ (BinaryOp::And | BinaryOp::Or | BinaryOp::Xor), lhs, rhs) => {
                let left = self.eval_with(lhs, row, aggregates)?.as_bool()?;
                match (op, left) {
                    (BinaryOp::And, Some(false)) => return Ok(Value::Bool(false)),
                    (BinaryOp::Or, Some(true)) => return Ok(Value::Bool(true)),
                    _ => {}
                }
                let right = self.eval_with(rhs, row, aggregates)?.as_bool()?;
                Ok(match (op, left, right) {
                    (BinaryOp::And, _, Some(false)) => Value::Bool(false),
                    (BinaryOp::And, Some(true), Some(true)) => Value::Bool(true),
                    (BinaryOp::Or, _, Some(true)) => Value::Bool(true),
                    (BinaryOp::Or, Some(false), Some(false)) => Value::Bool(false),
                    (BinaryOp::Xor, Some(a), Some(b)) => Value::Bool(a != b),
                    _ => Value::Null,
                })
            }
            Expr::Binary(op, lhs, rhs) => {
                let left = self.eval_with(lhs, row, aggregates)?;
                let right = self.eval_with(rhs, row, aggregates)?;
                self.binary(*op, left, right)
            }
            Expr::IsNull { expr, negated } => {
                let value = self.eval_with(expr, row, aggregates)?;
                Ok(Value::Bool(value.is_null() != *negated))
            }
            Expr::HasLabels(inner, labels) => match self.eval_with(inner, row, aggregates)? {
                Value::Null => Ok(Value::Null),
                Value::Node(id) => {
                    let node = self.node(id)?;
                    Ok(Value::Bool(
                        labels.iter().all(|label| node.labels.contains(label)),
                    ))
                }
                other => Err(CypherError::type_error(format!(
                    "label predicate on {}",
                    other.type_name()
                ))),
            },
            Expr::Case {
                operand,
                branches,
                otherwise,
            } => {
                let subject = match operand {
                    Some(operand) => Some(self.eval_with(operand, row, aggregates)?),
                    None => None,
                };
                for (when, then) in branches {
                    let candidate = self.eval_with(when, row, aggregates)?;
                    let hit = match &subject {
                        Some(subject) => subject.equals(&candidate) == Some(true),
                        None => candidate.as_bool()? == Some(true),
                    };
                    if hit {
                        return self.eval_with(then, row, aggregates);
                    }
                }
                match otherwise {
                    Some(otherwise) => self.eval_with(otherwise, row, aggregates),
                    None => Ok(Value::Null),
                }
            }
        }
    }

    fn property(&mut self, base: &Value, key: &str) -> Result<Value, CypherError> {
        let properties = match base {
            Value::Null => return Ok(Value::Null),
            Value::Map(map) => return Ok(map.get(key).cloned().unwrap_or(Value::Null)),
            Value::Node(id) => &self.node(*id)?.properties,
            Value::Relationship(id) => &self.relationship(*id)?.properties,
            other => {
                return Err(CypherError::type_error(format!(
                    "cannot read property `{key}` of {}",
                    other.type_name()
                )));
            }
        };
        Ok(properties
            .get(key)
            .map(Value::from_json)
            .unwrap_or(Value::Null))
    }

    fn index(&mut self, base: Value, index: Value) -> Result<Value, CypherError> {
        match (base, index) {
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (Value::List(items), Value::Int(i)) => {
                let len = items.len() as i64;
                let pos = if i < 0 { len + i } else { i };
                Ok(usize::try_from(pos)
                    .ok()
                    .and_then(|pos| items.get(pos).cloned())
                    .unwrap_or(Value::Null))
            }
            (Value::Map(map), Value::Str(key)) => Ok(map.get(&key).cloned().unwrap_or(Value::Null)),
            (base @ (Value::Node(_) | Value::Relationship(_)), Value::Str(key)) => {
                self.property(&base, &key)
            }
            (base, index) => Err(CypherError::type_error(format!(
                "cannot index {} with {}",
                base.type_name(),
                index.type_name()
            ))),
        }
    }

    pub(super) fn aggregate(&mut self, call: &Expr, rows: &[&Row]) -> Result<Value, CypherError> {
        let (name, distinct, args) = match call {
            Expr::CountStar => return Ok(Value::Int(rows.len() as i64)),
            Expr::Call {
                name,
                distinct,
                args,
            } => (name.as_str(), *distinct, args),
            _ => return Err(CypherError::semantic("not an aggregate function")),
        };
        let [arg] = args.as_slice() else {
            return Err(CypherError::semantic(format!(
                "{name}() takes exactly one argument"
            )));
        };
        if arg.contains_aggregate() {
            return Err(CypherError::semantic("aggregate functions cannot be nested"));
        }
        let mut values = Vec::with_capacity(rows.len());
        for row in rows {
            self.deadline.check()?;
            let value = self.eval(arg, row)?;
            if !value.is_null() {
                values.push(value);
            }
        }
        if distinct {
            let mut seen = ahash::AHashSet::new();
            values.retain(|v| seen.insert(Value::group_key(std::slice::from_ref(v))));
        }
        match name {
            "count" => Ok(Value::Int(values.len() as i64)),
            "collect" => Ok(Value::List(values)),
            "sum" => {
                let mut total = Value::Int(0);
                for value in values {
                    total = match (total, value) {
                        (Value::Int(a), Value::Int(b)) => Value::Int(
                            a.checked_add(b)
                                .ok_or_else(|| CypherError::type_error("integer overflow in sum"))?,
                        ),
                        (a, b) => Value::Float(number(&a, "sum")? + number(&b, "sum")?),
                    };
                }
                Ok(total)
            }
            "avg" => {
                if values.is_empty() {
                    return Ok(Value::Null);
                }
                let mut total = 0.0;
                for value in &values {
                    total += number(value, "avg")?;
                }
                Ok(Value::Float(total / values.len() as f64))
            }
            "min" => Ok(values
                .into_iter()
                .min_by(|a, b| a.order(b))
                .unwrap_or(Value::Null)),
            "max" => Ok(values
                .into_iter()
                .max_by(|a, b| a.order(b))
                .unwrap_or(Value::Null)),
            other => Err(CypherError::unsupported(format!("aggregate {other}()"))),
        }
    }

    fn call(&mut self, name: &str, args: Vec<Value>) -> Result<Value, CypherError> {
        if name == "coalesce" {
            return Ok(args
                .into_iter()
                .find(|v| !v.is_null())
                .unwrap_or(Value::Null));
        }
        if !FUNCTIONS.contains(&name) {
            return Err(CypherError::unsupported(format!("function {name}()")));
        }
        let expected = match name {
            "range" | "substring" => 2..=3,
            "split" | "left" | "right" => 2..=2,
            "replace" => 3..=3,
            _ => 1..=1,
        };
        if !expected.contains(&args.len()) {
            return Err(CypherError::semantic(format!(
                "wrong number of arguments to {name}()"
            )));
        }
        if args.iter().take(1).any(Value::is_null) && name != "exists" {
            return Ok(Value::Null);
        }
        let mut args = args.into_iter();
        let first = args.next().unwrap_or(Value::Null);
        let rest: Vec<Value> = args.collect();
        match (name, first) {
            ("exists", value) => Ok(Value::Bool(!value.is_null())),
            ("id", Value::Node(id) | Value::Relationship(id)) => Ok(Value::Int(id)),
            ("labels", Value::Node(id)) => Ok(Value::List(
                self.node(id)?
                    .labels
                    .iter()
                    .cloned()
                    .map(Value::Str)
                    .collect(),
            )),
            ("type", Value::Relationship(id)) => {
                Ok(Value::Str(self.relationship(id)?.rel_type.clone()))
            }
            ("startnode", Value::Relationship(id)) => Ok(Value::Node(self.relationship(id)?.start)),
            ("endnode", Value::Relationship(id)) => Ok(Value::Node(self.relationship(id)?.end)),
            ("keys", Value::Map(map)) => Ok(Value::List(map.into_keys().map(Value::Str).collect())),
            ("keys", entity @ (Value::Node(_) | Value::Relationship(_))) => {
                match self.properties_of(&entity)? {
                    Value::Map(map) => Ok(Value::List(map.into_keys().map(Value::Str).collect())),
                    _ => Ok(Value::Null),
                }
            }
            ("properties", entity @ (Value::Node(_) | Value::Relationship(_))) => {
                self.properties_of(&entity)
            }
            ("properties", map @ Value::Map(_)) => Ok(map),
            ("tolower", Value::Str(s)) => Ok(Value::Str(s.to_lowercase())),
            ("toupper", Value::Str(s)) => Ok(Value::Str(s.to_uppercase())),
            ("trim", Value::Str(s)) => Ok(Value::Str(s.trim().to_string())),
            ("ltrim", Value::Str(s)) => Ok(Value::Str(s.trim_start().to_string())),
            ("rtrim", Value::Str(s)) => Ok(Value::Str(s.trim_end().to_string())),
            ("reverse", Value::Str(s)) => Ok(Value::Str(s.chars().rev().collect())),
            ("reverse", Value::List(mut items)) => {
                items.reverse();
                Ok(Value::List(items))
            }
            ("tostring", value) => to_string(value).map(Value::Str),
            ("tointeger", Value::Int(i)) => Ok(Value::Int(i)),
            ("tointeger", Value::Float(f)) => Ok(Value::Int(f.trunc() as i64)),
            ("tointeger", Value::Str(s)) => Ok(s
                .trim()
                .parse::<i64>()
                .ok()
                .or_else(|| s.trim().parse::<f64>().ok().map(|f| f.trunc() as i64))
                .map(Value::Int)
                .unwrap_or(Value::Null)),
            ("tofloat", Value::Int(i)) => Ok(Value::Float(i as f64)),
            ("tofloat", Value::Float(f)) => Ok(Value::Float(f)),
            ("tofloat", Value::Str(s)) => Ok(s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .unwrap_or(Value::Null)),
            ("size" | "length", Value::Str(s)) => Ok(Value::Int(s.chars().count() as i64)),
            ("size" | "length", Value::List(items)) => Ok(Value::Int(items.len() as i64)),
            ("head", Value::List(items)) => Ok(items.into_iter().next().unwrap_or(Value::Null)),
            ("last", Value::List(items)) => Ok(items.into_iter().last().unwrap_or(Value::Null)),
            ("abs", Value::Int(i)) => Ok(Value::Int(i.saturating_abs())),
            ("abs", Value::Float(f)) => Ok(Value::Float(f.abs())),
            ("round", Value::Int(i)) => Ok(Value::Float(i as f64)),
            ("round", Value::Float(f)) => Ok(Value::Float(f.round())),
            ("range", Value::Int(start)) => range(start, &rest),
            ("split", Value::Str(s)) => match &rest[..] {
                [Value::Str(delim)] => Ok(Value::List(
                    s.split(delim.as_str())
                        .map(|part| Value::Str(part.to_string()))
                        .collect(),
                )),
                [Value::Null] => Ok(Value::Null),
                _ => Err(CypherError::type_error("split() expects string arguments")),
            },
            ("replace", Value::Str(s)) => match &rest[..] {
                [Value::Str(from), Value::Str(to)] => Ok(Value::Str(s.replace(from.as_str(), to))),
                _ => Ok(Value::Null),
            },
            ("substring", Value::Str(s)) => substring(&s, &rest),
            ("left", Value::Str(s)) => match &rest[..] {
                [Value::Int(n)] if *n >= 0 => Ok(Value::Str(s.chars().take(*n as usize).collect())),
                _ => Err(CypherError::type_error("left() expects a non-negative length")),
            },
            ("right", Value::Str(s)) => match &rest[..] {
                [Value::Int(n)] if *n >= 0 => {
                    let len = s.chars().count();
                    let skip = len.saturating_sub(*n as usize);
                    Ok(Value::Str(s.chars().skip(skip).collect()))
                }
                _ => Err(CypherError::type_error("right() expects a non-negative length")),
            },
            (
                "id" | "labels" | "type" | "startnode" | "endnode" | "keys" | "properties"
                | "tolower" | "toupper" | "trim" | "ltrim" | "rtrim" | "reverse" | "tointeger"
                | "tofloat" | "size" | "length" | "head" | "last" | "abs" | "round" | "range"
                | "split" | "replace" | "substring" | "left" | "right",
                other,
            ) => Err(CypherError::type_error(format!(
                "{name}() does not accept {}",
                other.type_name()
            ))),
            (other, _) => Err(CypherError::unsupported(format!("function {other}()"))),
        }
    }

    fn properties_of(&mut self, entity: &Value) -> Result<Value, CypherError> {
        let properties = match entity {
            Value::Node(id) => self.node(*id)?.properties.clone(),
            Value::Relationship(id) => self.relationship(*id)?.properties.clone(),
            _ => return Ok(Value::Null),
        };
        Ok(Value::from_json(&serde_json::Value::Object(properties)))
    }

    fn binary(&mut self, op: BinaryOp, left: Value, right: Value) -> Result<Value, CypherError> {
        use std::cmp::Ordering::{Greater, Less};
        match op {
            BinaryOp::Eq => return Ok(left.equals(&right).into()),
            BinaryOp::Neq => return Ok(left.equals(&right).map(|eq| !eq).into()),
            BinaryOp::In => return membership(left, right),
            _ => {}
        }
        if left.is_null() || right.is_null() {
            return Ok(Value::Null);
        }
        match op {
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let Some(ord) = left.compare(&right) else {
                    return Ok(Value::Null);
                };
                Ok(Value::Bool(match op {
                    BinaryOp::Lt => ord == Less,
                    BinaryOp::Le => ord != Greater,
                    BinaryOp::Gt => ord == Greater,
                    _ => ord != Less,
                }))
            }
            BinaryOp::Contains | BinaryOp::StartsWith | BinaryOp::EndsWith => {
                let (Value::Str(text), Value::Str(needle)) = (&left, &right) else {
                    return Ok(Value::Null);
                };
                Ok(Value::Bool(match op {
                    BinaryOp::Contains => text.contains(needle.as_str()),
                    BinaryOp::StartsWith => text.starts_with(needle.as_str()),
                    _ => text.ends_with(needle.as_str()),
                }))
            }
            BinaryOp::RegexMatch => {
                let (Value::Str(text), Value::Str(pattern)) = (&left, &right) else {
                    return Ok(Value::Null);
                };
                let regex = self.regex(pattern)?;
                Ok(Value::Bool(regex.is_match(text)))
            }
            _ => arithmetic(op, left, right),
        }
    }

    fn regex(&mut self, pattern: &str) -> Result<&Regex, CypherError> {
        use std::collections::hash_map::Entry;
        match self.regexes.entry(pattern.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let compiled = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
                    CypherError::semantic(format!("invalid regular expression: {e}"))
                })?;
                Ok(entry.insert(compiled))
            }
        }
    }
}

fn membership(needle: Value, haystack: Value) -> Result<Value, CypherError> {
    let items = match haystack {
        Value::Null => return Ok(Value::Null),
        Value::List(items) => items,
        other => {
            return Err(CypherError::type_error(format!(
                "IN expects a list, found {}",
                other.type_name()
            )));
        }
    };
    let mut unknown = false;
    for item in &items {
        match needle.equals(item) {
            Some(true) => return Ok(Value::Bool(true)),
            Some(false) => {}
            None => unknown = true,
        }
    }
    Ok(if unknown { Value::Null } else { Value::Bool(false) })
}

fn arithmetic(op: BinaryOp, left: Value, right: Value) -> Result<Value, CypherError> {
    let overflow = || CypherError::type_error("integer overflow");
    match (op, left, right) {
        (BinaryOp::Add, Value::Str(a), b) => Ok(Value::Str(a + &to_string(b)?)),
        (BinaryOp::Add, a @ (Value::Int(_) | Value::Float(_)), Value::Str(b)) => {
            Ok(Value::Str(to_string(a)? + &b))
        }
        (BinaryOp::Add, Value::List(mut a), Value::List(b)) => {
            a.extend(b);
            Ok(Value::List(a))
        }
        (BinaryOp::Add, Value::List(mut a), b) => {
            a.push(b);
            Ok(Value::List(a))
        }
        (BinaryOp::Add, a, Value::List(b)) => {
            let mut items = vec![a];
            items.extend(b);
            Ok(Value::List(items))
        }
        (op, Value::Int(a), Value::Int(b)) => match op {
            BinaryOp::Add => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
            BinaryOp::Sub => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
            BinaryOp::Mul => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
            BinaryOp::Div if b == 0 => Err(CypherError::type_error("division by zero")),
            BinaryOp::Div => a.checked_div(b).map(Value::Int).ok_or_else(overflow),
            BinaryOp::Mod if b == 0 => Err(CypherError::type_error("division by zero")),
            BinaryOp::Mod => a.checked_rem(b).map(Value::Int).ok_or_else(overflow),
            _ => Ok(Value::Float((a as f64).powf(b as f64))),
        },
        (op, a @ (Value::Int(_) | Value::Float(_)), b @ (Value::Int(_) | Value::Float(_))) => {
            let (a, b) = (number(&a, "arithmetic")?, number(&b, "arithmetic")?);
            Ok(Value::Float(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::Mod => a % b,
                _ => a.powf(b),
            }))
        }
        (_, a, b) => Err(CypherError::type_error(format!(
            "cannot apply arithmetic to {} and {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn number(value: &Value, context: &str) -> Result<f64, CypherError> {
    match value {
        Value::Int(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        other => Err(CypherError::type_error(format!(
            "{context} expects numbers, found {}",
            other.type_name()
        ))),
    }
}

fn to_string(value: Value) -> Result<String, CypherError> {
    match value {
        Value::Str(s) => Ok(s),
        Value::Int(i) => Ok(i.to_string()),
        Value::Float(f) if f.is_finite() && f.fract() == 0.0 => Ok(format!("{f:.1}")),
        Value::Float(f) => Ok(f.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(CypherError::type_error(format!(
            "cannot convert {} to a string",
            other.type_name()
        ))),
    }
}

/// Inclusive integer range; capped so a generated query cannot exhaust memory.
fn range(start: i64, rest: &[Value]) -> Result<Value, CypherError> {
    const MAX_RANGE: usize = 100_000;
    let (end, step) = match rest {
        [Value::Int(end)] => (*end, 1),
        [Value::Int(end), Value::Int(step)] => (*end, *step),
        _ => return Err(CypherError::type_error("range() expects integer arguments")),
    };
    if step == 0 {
        return Err(CypherError::type_error("range() step cannot be zero"));
    }
    let mut items = Vec::new();
    let mut current = start;
    while (step > 0 && current <= end) || (step < 0 && current >= end) {
        if items.len() >= MAX_RANGE {
            return Err(CypherError::type_error("range() result too large"));
        }
        items.push(Value::Int(current));
        current = match current.checked_add(step) {
            Some(next) => next,
            None => break,
        };
    }
    Ok(Value::List(items))
}

fn substring(text: &str, rest: &[Value]) -> Result<Value, CypherError> {
    let (start, len) = match rest {
        [Value::Int(start)] => (*start, None),
        [Value::Int(start), Value::Int(len)] => (*start, Some(*len)),
        _ => return Err(CypherError::type_error("substring() expects integer offsets")),
    };
    if start < 0 || len.is_some_and(|l| l < 0) {
        return Err(CypherError::type_error("substring() offsets must be non-negative"));
    }
    let chars = text.chars().skip(start as usize);
    Ok(Value::Str(match len {
        Some(len) => chars.take(len as usize).collect(),
        None => chars.collect(),
    }))
}
