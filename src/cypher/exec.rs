use ahash::{AHashMap, AHashSet};
use regex::Regex;
use serde_json::{Map, Number, Value as Json, json};

use super::{
    ast::{Clause, Expr, NodePattern, PathPattern, Projection, Query, RelPattern, SetItem},
    value::Value,
};
use crate::{
    errors::{CypherError, GraphStoreError},
    graph::{
        DeadlineGuard, Direction, GraphNode, GraphRelationship, NodeSpec, Properties,
        RelationshipSpec, SqliteGraph,
    },
    result_set::{ResultSet, WriteStats},
};

pub(super) type Row = AHashMap<String, Value>;

/// Runs a parsed statement against `graph`. The caller owns the surrounding
/// transaction; `deadline` bounds the whole run.
pub fn execute(
    graph: &SqliteGraph,
    query: &Query,
    deadline: &DeadlineGuard<'_>,
) -> Result<ResultSet, CypherError> {
    let mut interp = Interpreter::new(graph, deadline);
    let mut rows: Vec<Row> = vec![Row::new()];
    let mut returned: Option<(Vec<String>, Vec<Row>)> = None;
    for clause in &query.clauses {
        deadline.check()?;
        match clause {
            Clause::Match {
                optional,
                patterns,
                predicate,
            } => {
                rows = interp.match_clause(rows, *optional, patterns, predicate.as_ref())?;
            }
            Clause::Unwind { expr, alias } => rows = interp.unwind(rows, expr, alias)?,
            Clause::With {
                projection,
                predicate,
            } => {
                let (_, projected) = interp.project(&rows, projection)?;
                rows = match predicate {
                    Some(predicate) => interp.filter(projected, predicate)?,
                    None => projected,
                };
            }
            Clause::Return(projection) => returned = Some(interp.project(&rows, projection)?),
            Clause::Create(patterns) => rows = interp.create(rows, patterns)?,
            Clause::Set(items) => interp.set(&rows, items)?,
            Clause::Delete { detach, targets } => interp.delete(&rows, *detach, targets)?,
        }
    }
    let mut result = ResultSet::default();
    if let Some((columns, rows)) = returned {
        for row in &rows {
            deadline.check()?;
            let mut values = Vec::with_capacity(columns.len());
            for column in &columns {
                let value = row.get(column).cloned().unwrap_or(Value::Null);
                values.push(interp.to_json(&value)?);
            }
            result.rows.push(values);
        }
        result.columns = columns;
    }
    result.stats = interp.stats;
    Ok(result)
}

pub(super) struct Interpreter<'g> {
    pub(super) graph: &'g SqliteGraph,
    pub(super) deadline: &'g DeadlineGuard<'g>,
    pub(super) nodes: AHashMap<i64, GraphNode>,
    pub(super) relationships: AHashMap<i64, GraphRelationship>,
    pub(super) regexes: AHashMap<String, Regex>,
    pub(super) stats: WriteStats,
}

impl<'g> Interpreter<'g> {
    fn new(graph: &'g SqliteGraph, deadline: &'g DeadlineGuard<'g>) -> Self {
        Self {
            graph,
            deadline,
            nodes: AHashMap::new(),
            relationships: AHashMap::new(),
            regexes: AHashMap::new(),
            stats: WriteStats::default(),
        }
    }

    pub(super) fn node(&mut self, id: i64) -> Result<&GraphNode, CypherError> {
        use std::collections::hash_map::Entry;
        match self.nodes.entry(id) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => Ok(entry.insert(self.graph.get_node(id)?)),
        }
    }

    pub(super) fn relationship(&mut self, id: i64) -> Result<&GraphRelationship, CypherError> {
        use std::collections::hash_map::Entry;
        match self.relationships.entry(id) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => Ok(entry.insert(self.graph.get_relationship(id)?)),
        }
    }

    fn invalidate(&mut self) {
        self.nodes.clear();
        self.relationships.clear();
    }

    fn filter(&mut self, rows: Vec<Row>, predicate: &Expr) -> Result<Vec<Row>, CypherError> {
        let mut kept = Vec::with_capacity(rows.len());
        for row in rows {
            self.deadline.check()?;
            if self.eval(predicate, &row)?.as_bool()? == Some(true) {
                kept.push(row);
            }
        }
        Ok(kept)
    }

    fn match_clause(
        &mut self,
        rows: Vec<Row>,
        optional: bool,
        patterns: &[PathPattern],
        predicate: Option<&Expr>,
    ) -> Result<Vec<Row>, CypherError> {
        let mut out = Vec::new();
        for row in rows {
            let mut partials = vec![(row.clone(), Vec::<i64>::new())];
            for pattern in patterns {
                let mut next = Vec::new();
                for (bound, used) in &partials {
                    next.extend(self.match_path(bound, used, pattern)?);
                }
                partials = next;
            }
            let mut matched = false;
            for (bound, _) in partials {
                if let Some(predicate) = predicate {
                    if self.eval(predicate, &bound)?.as_bool()? != Some(true) {
                        continue;
                    }
                }
                matched = true;
                out.push(bound);
            }
            if optional && !matched {
                let mut filled = row;
                for pattern in patterns {
                    for var in pattern.variables() {
                        filled.entry(var.to_string()).or_insert(Value::Null);
                    }
                }
                out.push(filled);
            }
        }
        Ok(out)
    }

    /// Extends `row` with every binding of `pattern`. Relationship ids in
    /// `used` are already bound elsewhere in the same MATCH and are skipped.
    fn match_path(
        &mut self,
        row: &Row,
        used: &[i64],
        pattern: &PathPattern,
    ) -> Result<Vec<(Row, Vec<i64>)>, CypherError> {
        let mut states = Vec::new();
        for id in self.node_candidates(row, &pattern.start)? {
            let mut bound = row.clone();
            if let Some(var) = &pattern.start.var {
                bound.insert(var.clone(), Value::Node(id));
            }
            states.push((bound, used.to_vec(), id));
        }
        for (rel_pattern, node_pattern) in &pattern.steps {
            let mut next = Vec::new();
            for (bound, used, current) in states {
                self.deadline.check()?;
                for rel in self.expand(current, rel_pattern, &bound, &used)? {
                    let other = match rel_pattern.direction {
                        Direction::Outgoing => rel.end,
                        Direction::Incoming => rel.start,
                        Direction::Both if rel.start == current => rel.end,
                        Direction::Both => rel.start,
                    };
                    if !self.node_matches(other, node_pattern, &bound)? {
                        continue;
                    }
                    let mut extended = bound.clone();
                    if let Some(var) = &rel_pattern.var {
                        extended.insert(var.clone(), Value::Relationship(rel.id));
                    }
                    if let Some(var) = &node_pattern.var {
                        extended.insert(var.clone(), Value::Node(other));
                    }
                    let mut now_used = used.clone();
                    now_used.push(rel.id);
                    next.push((extended, now_used, other));
                }
            }
            states = next;
        }
        Ok(states
            .into_iter()
            .map(|(bound, used, _)| (bound, used))
            .collect())
    }

    fn expand(
        &mut self,
        current: i64,
        pattern: &RelPattern,
        row: &Row,
        used: &[i64],
    ) -> Result<Vec<GraphRelationship>, CypherError> {
        let bound = match pattern.var.as_ref().and_then(|var| row.get(var)) {
            Some(Value::Relationship(id)) => Some(*id),
            Some(Value::Null) => return Ok(Vec::new()),
            Some(other) => {
                return Err(CypherError::type_error(format!(
                    "expected a relationship, found {}",
                    other.type_name()
                )));
            }
            None => None,
        };
        let mut matched = Vec::new();
        for rel in self
            .graph
            .relationships_of(current, pattern.direction, &pattern.types)?
        {
            if used.contains(&rel.id) || bound.is_some_and(|id| id != rel.id) {
                continue;
            }
            if !self.properties_match(&rel.properties, &pattern.properties, row)? {
                continue;
            }
            self.relationships.insert(rel.id, rel.clone());
            matched.push(rel);
        }
        Ok(matched)
    }

    fn node_candidates(&mut self, row: &Row, pattern: &NodePattern) -> Result<Vec<i64>, CypherError> {
        if let Some(value) = pattern.var.as_ref().and_then(|var| row.get(var)) {
            return match value {
                Value::Node(id) => {
                    let id = *id;
                    Ok(if self.node_matches(id, pattern, row)? {
                        vec![id]
                    } else {
                        Vec::new()
                    })
                }
                Value::Null => Ok(Vec::new()),
                other => Err(CypherError::type_error(format!(
                    "expected a node, found {}",
                    other.type_name()
                ))),
            };
        }
        let ids = match pattern.labels.first() {
            Some(label) => self.graph.node_ids_with_label(label)?,
            None => self.graph.all_node_ids()?,
        };
        let mut matched = Vec::new();
        for id in ids {
            self.deadline.check()?;
            if self.node_matches(id, pattern, row)? {
                matched.push(id);
            }
        }
        Ok(matched)
    }

    fn node_matches(
        &mut self,
        id: i64,
        pattern: &NodePattern,
        row: &Row,
    ) -> Result<bool, CypherError> {
        if let Some(value) = pattern.var.as_ref().and_then(|var| row.get(var)) {
            if value != &Value::Node(id) {
                return Ok(false);
            }
        }
        if pattern.labels.is_empty() && pattern.properties.is_empty() {
            return Ok(true);
        }
        let node = self.node(id)?.clone();
        if !pattern
            .labels
            .iter()
            .all(|label| node.labels.contains(label))
        {
            return Ok(false);
        }
        self.properties_match(&node.properties, &pattern.properties, row)
    }

    fn properties_match(
        &mut self,
        actual: &Properties,
        wanted: &[(String, Expr)],
        row: &Row,
    ) -> Result<bool, CypherError> {
        for (key, expr) in wanted {
            let expected = self.eval(expr, row)?;
            let found = actual.get(key).map(Value::from_json).unwrap_or(Value::Null);
            if found.equals(&expected) != Some(true) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn unwind(&mut self, rows: Vec<Row>, expr: &Expr, alias: &str) -> Result<Vec<Row>, CypherError> {
        let mut out = Vec::new();
        for row in rows {
            match self.eval(expr, &row)? {
                Value::Null => {}
                Value::List(items) => {
                    for item in items {
                        let mut bound = row.clone();
                        bound.insert(alias.to_string(), item);
                        out.push(bound);
                    }
                }
                other => {
                    let mut bound = row;
                    bound.insert(alias.to_string(), other);
                    out.push(bound);
                }
            }
        }
        Ok(out)
    }

    /// Evaluates a WITH / RETURN projection. Returns the column names and one
    /// row per output record keyed by column name.
    fn project(
        &mut self,
        rows: &[Row],
        projection: &Projection,
    ) -> Result<(Vec<String>, Vec<Row>), CypherError> {
        let mut items: Vec<(String, Expr)> = Vec::new();
        if projection.star {
            let mut vars: Vec<&String> = rows.first().map(|r| r.keys().collect()).unwrap_or_default();
            vars.sort();
            items.extend(vars.into_iter().map(|v| (v.clone(), Expr::Variable(v.clone()))));
        }
        items.extend(
            projection
                .items
                .iter()
                .map(|item| (item.name.clone(), item.expr.clone())),
        );
        let mut seen = AHashSet::new();
        for (name, _) in &items {
            if !seen.insert(name.as_str()) {
                return Err(CypherError::semantic(format!(
                    "multiple result columns named `{name}`"
                )));
            }
        }

        let mut records = if items.iter().any(|(_, expr)| expr.contains_aggregate()) {
            self.project_grouped(rows, &items)?
        } else {
            let mut records = Vec::with_capacity(rows.len());
            for row in rows {
                self.deadline.check()?;
                let mut projected = Row::new();
                for (name, expr) in &items {
                    projected.insert(name.clone(), self.eval(expr, row)?);
                }
                let mut env = row.clone();
                env.extend(projected.iter().map(|(k, v)| (k.clone(), v.clone())));
                records.push((projected, env));
            }
            records
        };

        let columns: Vec<String> = items.iter().map(|(name, _)| name.clone()).collect();
        if projection.distinct {
            let mut keys = AHashSet::new();
            records.retain(|(projected, _)| {
                let values: Vec<Value> = columns
                    .iter()
                    .map(|c| projected.get(c).cloned().unwrap_or(Value::Null))
                    .collect();
                keys.insert(Value::group_key(&values))
            });
        }

        if !projection.order_by.is_empty() {
            let mut keyed = Vec::with_capacity(records.len());
            for (projected, env) in records {
                let mut keys = Vec::with_capacity(projection.order_by.len());
                for sort in &projection.order_by {
                    let by_item = items
                        .iter()
                        .find(|(_, expr)| expr == &sort.expr)
                        .and_then(|(name, _)| projected.get(name).cloned());
                    let key = match by_item {
                        Some(value) => value,
                        None => self.eval(&sort.expr, &env)?,
                    };
                    keys.push(key);
                }
                keyed.push((keys, projected, env));
            }
            keyed.sort_by(|(a, ..), (b, ..)| {
                for (idx, sort) in projection.order_by.iter().enumerate() {
                    let ord = a[idx].order(&b[idx]);
                    let ord = if sort.descending { ord.reverse() } else { ord };
                    if ord != std::cmp::Ordering::Equal {
                        return ord;
                    }
                }
                std::cmp::Ordering::Equal
            });
            records = keyed
                .into_iter()
                .map(|(_, projected, env)| (projected, env))
                .collect();
        }

        let skip = self.count_expr(projection.skip.as_ref(), "SKIP")?.unwrap_or(0);
        let limit = self.count_expr(projection.limit.as_ref(), "LIMIT")?;
        let out = records
            .into_iter()
            .skip(skip)
            .take(limit.unwrap_or(usize::MAX))
            .map(|(projected, _)| projected)
            .collect();
        Ok((columns, out))
    }

    fn project_grouped(
        &mut self,
        rows: &[Row],
        items: &[(String, Expr)],
    ) -> Result<Vec<(Row, Row)>, CypherError> {
        let mut groups: Vec<(Vec<Value>, Vec<&Row>)> = Vec::new();
        let mut index: AHashMap<String, usize> = AHashMap::new();
        for row in rows {
            self.deadline.check()?;
            let mut key = Vec::new();
            for (_, expr) in items.iter().filter(|(_, e)| !e.contains_aggregate()) {
                key.push(self.eval(expr, row)?);
            }
            let slot = *index.entry(Value::group_key(&key)).or_insert_with(|| {
                groups.push((key, Vec::new()));
                groups.len() - 1
            });
            groups[slot].1.push(row);
        }
        let has_keys = items.iter().any(|(_, e)| !e.contains_aggregate());
        if groups.is_empty() && !has_keys {
            groups.push((Vec::new(), Vec::new()));
        }

        let empty = Row::new();
        let mut records = Vec::with_capacity(groups.len());
        for (key, members) in groups {
            let representative = members.first().copied().unwrap_or(&empty);
            let mut key_values = key.into_iter();
            let mut projected = Row::new();
            for (name, expr) in items {
                let value = if expr.contains_aggregate() {
                    let mut computed = Vec::new();
                    for call in expr.aggregate_calls() {
                        computed.push((call, self.aggregate(call, &members)?));
                    }
                    self.eval_with(expr, representative, &computed)?
                } else {
                    key_values.next().unwrap_or(Value::Null)
                };
                projected.insert(name.clone(), value);
            }
            let mut env = representative.clone();
            env.extend(projected.iter().map(|(k, v)| (k.clone(), v.clone())));
            records.push((projected, env));
        }
        Ok(records)
    }

    fn count_expr(&mut self, expr: Option<&Expr>, clause: &str) -> Result<Option<usize>, CypherError> {
        let Some(expr) = expr else { return Ok(None) };
        match self.eval(expr, &Row::new())? {
            Value::Int(n) if n >= 0 => Ok(Some(n as usize)),
            other => Err(CypherError::type_error(format!(
                "{clause} expects a non-negative integer, found {}",
                other.type_name()
            ))),
        }
    }

    fn create(&mut self, rows: Vec<Row>, patterns: &[PathPattern]) -> Result<Vec<Row>, CypherError> {
        let mut out = Vec::with_capacity(rows.len());
        for mut row in rows {
            self.deadline.check()?;
            for pattern in patterns {
                let mut current = self.create_node(&mut row, &pattern.start)?;
                for (rel_pattern, node_pattern) in &pattern.steps {
                    let next = self.create_node(&mut row, node_pattern)?;
                    self.create_relationship(&mut row, rel_pattern, current, next)?;
                    current = next;
                }
            }
            out.push(row);
        }
        Ok(out)
    }

    fn create_node(&mut self, row: &mut Row, pattern: &NodePattern) -> Result<i64, CypherError> {
        if let Some(var) = &pattern.var {
            if let Some(existing) = row.get(var) {
                if !pattern.labels.is_empty() || !pattern.properties.is_empty() {
                    return Err(CypherError::semantic(format!(
                        "variable `{var}` already declared"
                    )));
                }
                return match existing {
                    Value::Node(id) => Ok(*id),
                    other => Err(CypherError::type_error(format!(
                        "expected a node for `{var}`, found {}",
                        other.type_name()
                    ))),
                };
            }
        }
        let properties = self.property_map(&pattern.properties, row)?;
        let set = properties.len();
        let spec = NodeSpec {
            labels: pattern.labels.clone(),
            properties,
        };
        let id = self.graph.insert_node(&spec)?;
        self.stats.nodes_created += 1;
        self.stats.labels_added += spec.labels.len();
        self.stats.properties_set += set;
        if let Some(var) = &pattern.var {
            row.insert(var.clone(), Value::Node(id));
        }
        Ok(id)
    }

    fn create_relationship(
        &mut self,
        row: &mut Row,
        pattern: &RelPattern,
        left: i64,
        right: i64,
    ) -> Result<(), CypherError> {
        let [rel_type] = pattern.types.as_slice() else {
            return Err(CypherError::semantic(
                "CREATE requires exactly one relationship type",
            ));
        };
        let (start, end) = match pattern.direction {
            Direction::Outgoing => (left, right),
            Direction::Incoming => (right, left),
            Direction::Both => {
                return Err(CypherError::semantic(
                    "CREATE requires a directed relationship",
                ));
            }
        };
        if let Some(var) = &pattern.var {
            if row.contains_key(var) {
                return Err(CypherError::semantic(format!(
                    "variable `{var}` already declared"
                )));
            }
        }
        let properties = self.property_map(&pattern.properties, row)?;
        let set = properties.len();
        let spec = RelationshipSpec {
            start,
            end,
            rel_type: rel_type.clone(),
            properties,
        };
        let id = self.graph.insert_relationship(&spec)?;
        self.stats.relationships_created += 1;
        self.stats.properties_set += set;
        if let Some(var) = &pattern.var {
            row.insert(var.clone(), Value::Relationship(id));
        }
        Ok(())
    }

    fn property_map(
        &mut self,
        entries: &[(String, Expr)],
        row: &Row,
    ) -> Result<Properties, CypherError> {
        let mut properties = Properties::new();
        for (key, expr) in entries {
            let value = self.eval(expr, row)?;
            if !value.is_null() {
                properties.insert(key.clone(), value.to_property()?);
            }
        }
        Ok(properties)
    }

    fn set(&mut self, rows: &[Row], items: &[SetItem]) -> Result<(), CypherError> {
        for row in rows {
            self.deadline.check()?;
            for item in items {
                match item {
                    SetItem::Property { var, key, value } => {
                        let target = lookup(row, var)?;
                        let value = self.eval(value, row)?.to_property()?;
                        match target {
                            Value::Node(id) => self.graph.set_node_property(id, key, value)?,
                            Value::Relationship(id) => {
                                self.graph.set_relationship_property(id, key, value)?
                            }
                            Value::Null => continue,
                            other => {
                                return Err(CypherError::type_error(format!(
                                    "cannot set a property on {}",
                                    other.type_name()
                                )));
                            }
                        }
                        self.stats.properties_set += 1;
                    }
                    SetItem::Labels { var, labels } => match lookup(row, var)? {
                        Value::Node(id) => {
                            for label in labels {
                                if self.graph.add_label(id, label)? {
                                    self.stats.labels_added += 1;
                                }
                            }
                        }
                        Value::Null => continue,
                        other => {
                            return Err(CypherError::type_error(format!(
                                "cannot add labels to {}",
                                other.type_name()
                            )));
                        }
                    },
                }
                self.invalidate();
            }
        }
        Ok(())
    }

    fn delete(&mut self, rows: &[Row], detach: bool, targets: &[Expr]) -> Result<(), CypherError> {
        let mut nodes = Vec::new();
        let mut rels = Vec::new();
        for row in rows {
            for target in targets {
                match self.eval(target, row)? {
                    Value::Node(id) if !nodes.contains(&id) => nodes.push(id),
                    Value::Relationship(id) if !rels.contains(&id) => rels.push(id),
                    Value::Node(_) | Value::Relationship(_) | Value::Null => {}
                    other => {
                        return Err(CypherError::type_error(format!(
                            "cannot delete {}",
                            other.type_name()
                        )));
                    }
                }
            }
        }
        for id in rels {
            self.deadline.check()?;
            match self.graph.delete_relationship(id) {
                Ok(()) => self.stats.relationships_deleted += 1,
                Err(GraphStoreError::NotFound(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }
        for id in nodes {
            self.deadline.check()?;
            let attached = if detach {
                self.graph.relationships_of(id, Direction::Both, &[])?.len()
            } else {
                0
            };
            match self.graph.delete_node(id, detach) {
                Ok(()) => {
                    self.stats.nodes_deleted += 1;
                    self.stats.relationships_deleted += attached;
                }
                Err(GraphStoreError::NotFound(_)) => {}
                Err(GraphStoreError::ConstraintViolation(msg)) => {
                    return Err(CypherError::Constraint(msg));
                }
                Err(err) => return Err(err.into()),
            }
        }
        self.invalidate();
        Ok(())
    }

    fn to_json(&mut self, value: &Value) -> Result<Json, CypherError> {
        Ok(match value {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Float(f) => Number::from_f64(*f).map(Json::Number).unwrap_or(Json::Null),
            Value::Str(s) => Json::String(s.clone()),
            Value::List(items) => Json::Array(
                items
                    .iter()
                    .map(|item| self.to_json(item))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Map(entries) => {
                let mut map = Map::new();
                for (key, item) in entries {
                    map.insert(key.clone(), self.to_json(item)?);
                }
                Json::Object(map)
            }
            Value::Node(id) => {
                let node = self.node(*id)?;
                json!({"id": node.id, "labels": node.labels, "properties": node.properties})
            }
            Value::Relationship(id) => {
                let rel = self.relationship(*id)?;
                json!({
                    "id": rel.id,
                    "type": rel.rel_type,
                    "start": rel.start,
                    "end": rel.end,
                    "properties": rel.properties,
                })
            }
        })
    }
}

pub(super) fn lookup(row: &Row, var: &str) -> Result<Value, CypherError> {
    row.get(var)
        .cloned()
        .ok_or_else(|| CypherError::semantic(format!("variable `{var}` not defined")))
}
