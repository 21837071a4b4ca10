//! The result pipeline: joins the embedding stream, applies WHERE, groups
//! for aggregates, then DISTINCT, ORDER BY, SKIP, LIMIT, and shapes the
//! columnar output. Stages run strictly in that order; without ORDER BY or
//! aggregation the stream stays lazy and LIMIT stops the matcher early.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use serde::ser::{Serialize, SerializeMap, Serializer};

use common::{is_order_null, sort_cmp, Value};

use crate::error::EngineError;
use crate::host::HostGraph;
use crate::matcher::{EdgeBinding, Embedding, Hint, MatchStream};
use crate::motif::Motif;
use crate::query::ast::{
    AggregateExpression, AggregateFunction, BinaryOperator, Expression, Query, UnaryOperator,
};
use crate::query::eval::{evaluate, truth};

/// Query results keyed by RETURN item label, one equal-length list per
/// column, in declared order.
#[derive(Debug, Clone, Default)]
pub struct ColumnarTable {
    columns: Vec<(String, Vec<Value>)>,
}

impl ColumnarTable {
    fn new(labels: &[String]) -> Self {
        Self {
            columns: labels
                .iter()
                .map(|label| (label.clone(), Vec::new()))
                .collect(),
        }
    }

    fn push_row(&mut self, row: Vec<Value>) {
        for ((_, column), value) in self.columns.iter_mut().zip(row) {
            column.push(value);
        }
    }

    pub fn get(&self, label: &str) -> Option<&[Value]> {
        self.columns
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, column)| column.as_slice())
    }

    pub fn column_labels(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, |(_, column)| column.len())
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }
}

impl Serialize for ColumnarTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (label, column) in &self.columns {
            map.serialize_entry(label, column)?;
        }
        map.end()
    }
}

pub fn execute<G: HostGraph>(
    host: &G,
    query: &Query,
    hints: &[Hint],
) -> Result<ColumnarTable, EngineError> {
    let mut anon = 0;
    let motifs: Vec<Motif> = query
        .matches
        .iter()
        .map(|clause| Motif::compile(clause, &mut anon))
        .collect();

    let node_names: HashSet<&str> = motifs
        .iter()
        .flat_map(|m| m.nodes.iter())
        .filter(|n| !n.anonymous)
        .map(|n| n.name.as_str())
        .collect();
    let known: HashSet<&str> = motifs.iter().flat_map(|m| m.variable_names()).collect();

    for hint in hints {
        for key in hint.keys() {
            if !node_names.contains(key.as_str()) {
                return Err(EngineError::InvalidHint(key.clone()));
            }
        }
    }

    let labels: Vec<String> = query
        .returns
        .items
        .iter()
        .map(|item| {
            item.alias
                .clone()
                .unwrap_or_else(|| expression_label(&item.expression))
        })
        .collect();

    let has_aggregate = query
        .returns
        .items
        .iter()
        .any(|item| item.expression.contains_aggregate());

    validate_variables(query, &known, &labels, has_aggregate)?;

    tracing::debug!(
        target: "grandcypher::plan",
        motifs = motifs.len(),
        aggregated = has_aggregate,
        ordered = !query.order_by.is_empty(),
        streaming = query.order_by.is_empty() && !has_aggregate,
        "query planned"
    );

    let stream = MatchStream::new(host, &motifs, hints);
    if has_aggregate {
        execute_grouped(host, stream, query, &labels)
    } else {
        execute_plain(host, stream, query, &labels)
    }
}

/// Every variable in WHERE and RETURN must be bound by some MATCH; ORDER BY
/// keys may instead name a returned column.
fn validate_variables(
    query: &Query,
    known: &HashSet<&str>,
    labels: &[String],
    has_aggregate: bool,
) -> Result<(), EngineError> {
    let mut referenced = Vec::new();
    if let Some(predicate) = &query.predicate {
        predicate.collect_variables(&mut referenced);
    }
    for item in &query.returns.items {
        item.expression.collect_variables(&mut referenced);
    }
    for name in &referenced {
        if !known.contains(name.as_str()) {
            return Err(EngineError::UnknownVariable(name.clone()));
        }
    }

    for key in &query.order_by {
        let label = expression_label(&key.expression);
        if labels.iter().any(|l| *l == label) {
            continue;
        }
        if key.expression.contains_aggregate() || has_aggregate {
            // Sorting by something not produced by RETURN.
            return Err(EngineError::UnknownVariable(label));
        }
        let mut vars = Vec::new();
        key.expression.collect_variables(&mut vars);
        for name in vars {
            if !known.contains(name.as_str()) {
                return Err(EngineError::UnknownVariable(name));
            }
        }
    }
    Ok(())
}

fn execute_plain<G: HostGraph>(
    host: &G,
    stream: MatchStream<'_, G>,
    query: &Query,
    labels: &[String],
) -> Result<ColumnarTable, EngineError> {
    let skip = query.skip.unwrap_or(0);
    let wanted = query.limit.map(|limit| skip.saturating_add(limit));
    let streaming = query.order_by.is_empty();

    let mut rows: Vec<Vec<Value>> = Vec::new();
    let mut embeddings: Vec<Embedding> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for embedding in stream {
        let Some(embedding) = apply_where(host, query.predicate.as_ref(), embedding)? else {
            continue;
        };
        let mut values = Vec::with_capacity(query.returns.items.len());
        for item in &query.returns.items {
            values.push(evaluate(host, &embedding, &item.expression)?);
        }
        if query.returns.distinct && !seen.insert(fingerprint(&values)?) {
            continue;
        }
        rows.push(values);
        if streaming {
            if wanted.map_or(false, |n| rows.len() >= n) {
                break;
            }
        } else {
            // Kept only for ORDER BY keys that are not returned columns.
            embeddings.push(embedding);
        }
    }

    if !query.order_by.is_empty() {
        let mut paired: Vec<(Vec<Value>, Embedding)> =
            rows.into_iter().zip(embeddings).collect();
        for key in query.order_by.iter().rev() {
            let column = labels
                .iter()
                .position(|l| *l == expression_label(&key.expression));
            let mut keyed: Vec<(Value, (Vec<Value>, Embedding))> = Vec::new();
            for (values, embedding) in paired {
                let sort_value = match column {
                    Some(index) => values[index].clone(),
                    None => evaluate(host, &embedding, &key.expression)?,
                };
                keyed.push((sort_value, (values, embedding)));
            }
            keyed.sort_by(|(a, _), (b, _)| order_compare(a, b, key.descending));
            paired = keyed.into_iter().map(|(_, row)| row).collect();
        }
        rows = paired.into_iter().map(|(values, _)| values).collect();
    }

    Ok(paginate(rows, query, labels))
}

fn execute_grouped<G: HostGraph>(
    host: &G,
    stream: MatchStream<'_, G>,
    query: &Query,
    labels: &[String],
) -> Result<ColumnarTable, EngineError> {
    let items = &query.returns.items;
    let plain_items: Vec<usize> = items
        .iter()
        .enumerate()
        .filter(|(_, item)| !item.expression.contains_aggregate())
        .map(|(index, _)| index)
        .collect();

    // Group embeddings by the tuple of non-aggregate return values,
    // first-seen order.
    let mut group_index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(Vec<Value>, Vec<Embedding>)> = Vec::new();
    for embedding in stream {
        let Some(embedding) = apply_where(host, query.predicate.as_ref(), embedding)? else {
            continue;
        };
        let mut key_values = Vec::with_capacity(plain_items.len());
        for &index in &plain_items {
            key_values.push(evaluate(host, &embedding, &items[index].expression)?);
        }
        let fp = fingerprint(&key_values)?;
        match group_index.get(&fp).copied() {
            Some(slot) => groups[slot].1.push(embedding),
            None => {
                group_index.insert(fp, groups.len());
                groups.push((key_values, vec![embedding]));
            }
        }
    }

    let mut rows: Vec<Vec<Value>> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for (key_values, members) in &groups {
        let mut values = Vec::with_capacity(items.len());
        let mut plain_cursor = 0;
        for item in items {
            if let Expression::Aggregate(aggregate) = &item.expression {
                values.push(compute_aggregate(host, members, aggregate)?);
            } else if item.expression.contains_aggregate() {
                return Err(EngineError::Type(
                    "aggregate calls cannot be nested in other expressions".into(),
                ));
            } else {
                values.push(key_values[plain_cursor].clone());
                plain_cursor += 1;
            }
        }
        if query.returns.distinct && !seen.insert(fingerprint(&values)?) {
            continue;
        }
        rows.push(values);
    }

    for key in query.order_by.iter().rev() {
        let label = expression_label(&key.expression);
        let Some(index) = labels.iter().position(|l| *l == label) else {
            return Err(EngineError::UnknownVariable(label));
        };
        rows.sort_by(|a, b| order_compare(&a[index], &b[index], key.descending));
    }

    Ok(paginate(rows, query, labels))
}

fn paginate(rows: Vec<Vec<Value>>, query: &Query, labels: &[String]) -> ColumnarTable {
    let skip = query.skip.unwrap_or(0);
    let mut table = ColumnarTable::new(labels);
    for row in rows
        .into_iter()
        .skip(skip)
        .take(query.limit.unwrap_or(usize::MAX))
    {
        table.push_row(row);
    }
    table
}

/// Stable comparison for one ORDER BY key: nulls last in both directions.
fn order_compare(a: &Value, b: &Value, descending: bool) -> Ordering {
    match (is_order_null(a), is_order_null(b)) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let ordering = sort_cmp(a, b);
            if descending {
                ordering.reverse()
            } else {
                ordering
            }
        }
    }
}

/// Applies the WHERE predicate to one embedding.
///
/// Parallel edges are filtered entry-wise first: an edge variable's binding
/// keeps only the host edges that satisfy the predicate on their own, and
/// the row dies when a referenced binding empties out. The surviving
/// embedding then passes the ordinary truth gate.
fn apply_where<G: HostGraph>(
    host: &G,
    predicate: Option<&Expression>,
    mut embedding: Embedding,
) -> Result<Option<Embedding>, EngineError> {
    let Some(predicate) = predicate else {
        return Ok(Some(embedding));
    };

    let mut edge_names: Vec<String> = embedding.edges.keys().cloned().collect();
    edge_names.sort();
    for name in edge_names {
        if !predicate.references(&name) {
            continue;
        }
        let Some(EdgeBinding::Single(instances)) = embedding.edges.get(&name).cloned() else {
            continue;
        };
        let mut kept = Vec::new();
        for instance in instances {
            let mut probe = embedding.clone();
            probe
                .edges
                .insert(name.clone(), EdgeBinding::Single(vec![instance.clone()]));
            if truth(&evaluate(host, &probe, predicate)?)? == Some(true) {
                kept.push(instance);
            }
        }
        if kept.is_empty() {
            return Ok(None);
        }
        embedding
            .edges
            .insert(name.clone(), EdgeBinding::Single(kept));
    }

    match truth(&evaluate(host, &embedding, predicate)?)? {
        Some(true) => Ok(Some(embedding)),
        _ => Ok(None),
    }
}

fn compute_aggregate<G: HostGraph>(
    host: &G,
    members: &[Embedding],
    aggregate: &AggregateExpression,
) -> Result<Value, EngineError> {
    let Some(target) = &aggregate.target else {
        // COUNT(*) counts rows.
        return Ok(Value::Integer(members.len() as i64));
    };

    let mut values = Vec::with_capacity(members.len());
    for embedding in members {
        values.push(evaluate(host, embedding, target)?);
    }

    if values.iter().any(|v| matches!(v, Value::EdgeMap(_))) {
        // Bucket parallel-edge inputs by primary label, preserving labels
        // whose entries are all null.
        let mut buckets: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        for value in &values {
            let Value::EdgeMap(entries) = value else {
                continue;
            };
            for (slot, entry) in entries {
                let bucket = buckets.entry(slot.label.clone().unwrap_or_default()).or_default();
                if !entry.is_null() {
                    bucket.push(entry.clone());
                }
            }
        }
        let mut out = BTreeMap::new();
        for (label, bucket) in buckets {
            out.insert(label, aggregate_scalar(aggregate.function, bucket)?);
        }
        return Ok(Value::Map(out));
    }

    let non_null: Vec<Value> = values.into_iter().filter(|v| !v.is_null()).collect();
    aggregate_scalar(aggregate.function, non_null)
}

fn aggregate_scalar(
    function: AggregateFunction,
    values: Vec<Value>,
) -> Result<Value, EngineError> {
    match function {
        AggregateFunction::Count => Ok(Value::Integer(values.len() as i64)),
        AggregateFunction::Sum => {
            if values.is_empty() {
                return Ok(Value::Integer(0));
            }
            let (total, all_int) = numeric_sum(&values)?;
            if all_int {
                Ok(Value::Integer(total as i64))
            } else {
                Ok(Value::Float(total))
            }
        }
        AggregateFunction::Avg => {
            if values.is_empty() {
                return Ok(Value::Null);
            }
            let (total, _) = numeric_sum(&values)?;
            Ok(Value::Float(total / values.len() as f64))
        }
        AggregateFunction::Min => Ok(fold_extreme(values, Ordering::Less)),
        AggregateFunction::Max => Ok(fold_extreme(values, Ordering::Greater)),
    }
}

fn numeric_sum(values: &[Value]) -> Result<(f64, bool), EngineError> {
    let mut total = 0.0;
    let mut all_int = true;
    for value in values {
        match value {
            Value::Integer(i) => total += *i as f64,
            Value::Float(f) => {
                total += f;
                all_int = false;
            }
            other => {
                return Err(EngineError::Type(format!(
                    "numeric aggregate received non-numeric value {other:?}"
                )));
            }
        }
    }
    Ok((total, all_int))
}

fn fold_extreme(values: Vec<Value>, keep: Ordering) -> Value {
    let mut best: Option<Value> = None;
    for value in values {
        match &best {
            Some(current) => {
                if common::compare_values(&value, current) == Some(keep) {
                    best = Some(value);
                }
            }
            None => best = Some(value),
        }
    }
    best.unwrap_or(Value::Null)
}

fn fingerprint(values: &[Value]) -> Result<String, EngineError> {
    serde_json::to_string(values)
        .map_err(|err| EngineError::Type(format!("unserializable row value: {err}")))
}

/// Renders an expression back to its column label, e.g. `A.club`,
/// `SUM(r.amount)`, `ID(A)`.
pub fn expression_label(expr: &Expression) -> String {
    match expr {
        Expression::Literal(value) => literal_label(value),
        Expression::Variable(name) => name.clone(),
        Expression::Property {
            variable,
            attribute,
        } => format!("{variable}.{attribute}"),
        Expression::Unary { op, operand } => match op {
            UnaryOperator::Not => format!("NOT {}", expression_label(operand)),
            UnaryOperator::Negate => format!("-{}", expression_label(operand)),
        },
        Expression::Binary { op, left, right } => format!(
            "{} {} {}",
            expression_label(left),
            operator_symbol(*op),
            expression_label(right)
        ),
        Expression::IsNull { operand, negated } => {
            if *negated {
                format!("{} IS NOT NULL", expression_label(operand))
            } else {
                format!("{} IS NULL", expression_label(operand))
            }
        }
        Expression::Function { argument, .. } => format!("ID({})", expression_label(argument)),
        Expression::Aggregate(aggregate) => match &aggregate.target {
            None => "COUNT(*)".to_string(),
            Some(target) => format!(
                "{}({})",
                aggregate.function.name(),
                expression_label(target)
            ),
        },
    }
}

fn literal_label(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("{value:?}"))
}

fn operator_symbol(op: BinaryOperator) -> &'static str {
    match op {
        BinaryOperator::Equals => "==",
        BinaryOperator::NotEquals => "<>",
        BinaryOperator::LessThan => "<",
        BinaryOperator::LessThanOrEqual => "<=",
        BinaryOperator::GreaterThan => ">",
        BinaryOperator::GreaterThanOrEqual => ">=",
        BinaryOperator::And => "AND",
        BinaryOperator::Or => "OR",
        BinaryOperator::Add => "+",
        BinaryOperator::Subtract => "-",
        BinaryOperator::Multiply => "*",
        BinaryOperator::Divide => "/",
        BinaryOperator::In => "IN",
        BinaryOperator::Contains => "CONTAINS",
        BinaryOperator::StartsWith => "STARTS WITH",
        BinaryOperator::EndsWith => "ENDS WITH",
    }
}
