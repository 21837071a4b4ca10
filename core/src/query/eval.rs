//! Expression evaluation against one bound embedding.
//!
//! Comparisons follow three-valued logic: null operands make the answer
//! null, and only the final WHERE gate coerces null to false. An edge
//! variable evaluates to its per-parallel-edge mapping; comparison and
//! string operators over such a mapping hold existentially (some entry
//! satisfies), while arithmetic distributes entry-wise.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use common::{
    compare_values, primary_label, values_equal, AttrMap, EdgeSlot, NodeId, Value,
};

use crate::error::EngineError;
use crate::host::HostGraph;
use crate::matcher::{EdgeBinding, EdgeInstance, Embedding};
use crate::query::ast::{
    BinaryOperator, Expression, ScalarFunction, UnaryOperator,
};

/// Key under which a node dictionary carries its host id.
pub const ID_ATTR: &str = "__id__";
/// Endpoint and key entries of an edge dictionary.
pub const SOURCE_ATTR: &str = "__source__";
pub const TARGET_ATTR: &str = "__target__";
pub const KEY_ATTR: &str = "__key__";

pub fn node_id_value(id: &NodeId) -> Value {
    match id {
        NodeId::Int(i) => Value::Integer(*i),
        NodeId::Str(s) => Value::String(s.clone()),
    }
}

fn attr_map_value(attrs: &AttrMap) -> BTreeMap<String, Value> {
    attrs
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn instance_slot<G: HostGraph>(host: &G, instance: &EdgeInstance) -> EdgeSlot {
    let label = instance.attrs(host).and_then(primary_label);
    EdgeSlot::new(instance.key, label)
}

fn instance_dict<G: HostGraph>(host: &G, instance: &EdgeInstance) -> Value {
    let mut dict = instance
        .attrs(host)
        .map(attr_map_value)
        .unwrap_or_default();
    dict.insert(SOURCE_ATTR.to_string(), node_id_value(&instance.source));
    dict.insert(TARGET_ATTR.to_string(), node_id_value(&instance.target));
    dict.insert(KEY_ATTR.to_string(), Value::Integer(instance.key));
    Value::Map(dict)
}

fn instance_attr<G: HostGraph>(host: &G, instance: &EdgeInstance, attribute: &str) -> Value {
    instance
        .attrs(host)
        .and_then(|attrs| attrs.get(attribute).cloned())
        .unwrap_or(Value::Null)
}

fn edge_map<G: HostGraph, F: Fn(&EdgeInstance) -> Value>(
    host: &G,
    instances: &[EdgeInstance],
    project: F,
) -> Value {
    let mut entries = BTreeMap::new();
    for instance in instances {
        entries.insert(instance_slot(host, instance), project(instance));
    }
    Value::EdgeMap(entries)
}

fn edge_variable_value<G: HostGraph>(host: &G, binding: &EdgeBinding) -> Value {
    match binding {
        EdgeBinding::Single(instances) => edge_map(host, instances, |i| instance_dict(host, i)),
        EdgeBinding::Path(hops) => Value::List(
            hops.iter()
                .map(|hop| edge_map(host, hop, |i| instance_dict(host, i)))
                .collect(),
        ),
        EdgeBinding::Empty => Value::List(vec![Value::Null]),
    }
}

fn edge_attribute_value<G: HostGraph>(host: &G, binding: &EdgeBinding, attribute: &str) -> Value {
    match binding {
        EdgeBinding::Single(instances) => {
            edge_map(host, instances, |i| instance_attr(host, i, attribute))
        }
        EdgeBinding::Path(hops) => Value::List(
            hops.iter()
                .map(|hop| edge_map(host, hop, |i| instance_attr(host, i, attribute)))
                .collect(),
        ),
        EdgeBinding::Empty => Value::List(vec![Value::Null]),
    }
}

/// Truth of a value at the WHERE gate and inside boolean connectives.
pub fn truth(value: &Value) -> Result<Option<bool>, EngineError> {
    match value {
        Value::Boolean(b) => Ok(Some(*b)),
        Value::Null => Ok(None),
        other => Err(EngineError::Type(format!(
            "expected a boolean condition, found {other:?}"
        ))),
    }
}

pub fn evaluate<G: HostGraph>(
    host: &G,
    embedding: &Embedding,
    expr: &Expression,
) -> Result<Value, EngineError> {
    match expr {
        Expression::Literal(value) => Ok(value.clone()),
        Expression::Variable(name) => {
            if let Some(id) = embedding.nodes.get(name) {
                let mut dict = host
                    .node_attrs(id)
                    .map(attr_map_value)
                    .unwrap_or_default();
                dict.insert(ID_ATTR.to_string(), node_id_value(id));
                return Ok(Value::Map(dict));
            }
            if let Some(binding) = embedding.edges.get(name) {
                return Ok(edge_variable_value(host, binding));
            }
            Err(EngineError::UnknownVariable(name.clone()))
        }
        Expression::Property {
            variable,
            attribute,
        } => {
            if let Some(id) = embedding.nodes.get(variable) {
                let value = host
                    .node_attrs(id)
                    .and_then(|attrs| attrs.get(attribute).cloned())
                    .unwrap_or(Value::Null);
                return Ok(value);
            }
            if let Some(binding) = embedding.edges.get(variable) {
                return Ok(edge_attribute_value(host, binding, attribute));
            }
            Err(EngineError::UnknownVariable(variable.clone()))
        }
        Expression::Unary { op, operand } => {
            let value = evaluate(host, embedding, operand)?;
            match op {
                UnaryOperator::Not => Ok(kleene_not(truth(&value)?)),
                UnaryOperator::Negate => negate(value),
            }
        }
        Expression::Binary { op, left, right } => {
            let lhs = evaluate(host, embedding, left)?;
            let rhs = evaluate(host, embedding, right)?;
            apply_binary(*op, lhs, rhs)
        }
        Expression::IsNull { operand, negated } => {
            let value = evaluate(host, embedding, operand)?;
            let is_null = match &value {
                Value::EdgeMap(entries) => entries.values().any(Value::is_null),
                other => other.is_null(),
            };
            Ok(Value::Boolean(is_null != *negated))
        }
        Expression::Function { function, argument } => match function {
            ScalarFunction::Id => {
                let Expression::Variable(name) = argument.as_ref() else {
                    return Err(EngineError::Type("ID() expects a node variable".into()));
                };
                match embedding.nodes.get(name) {
                    Some(id) => Ok(node_id_value(id)),
                    None => Err(EngineError::UnknownVariable(name.clone())),
                }
            }
        },
        Expression::Aggregate(_) => Err(EngineError::Type(
            "aggregate call is only valid as a RETURN item".into(),
        )),
    }
}

fn kleene_not(value: Option<bool>) -> Value {
    match value {
        Some(b) => Value::Boolean(!b),
        None => Value::Null,
    }
}

fn kleene_and(a: Option<bool>, b: Option<bool>) -> Value {
    match (a, b) {
        (Some(false), _) | (_, Some(false)) => Value::Boolean(false),
        (Some(true), Some(true)) => Value::Boolean(true),
        _ => Value::Null,
    }
}

fn kleene_or(a: Option<bool>, b: Option<bool>) -> Value {
    match (a, b) {
        (Some(true), _) | (_, Some(true)) => Value::Boolean(true),
        (Some(false), Some(false)) => Value::Boolean(false),
        _ => Value::Null,
    }
}

pub fn apply_binary(op: BinaryOperator, lhs: Value, rhs: Value) -> Result<Value, EngineError> {
    match op {
        BinaryOperator::And => Ok(kleene_and(truth(&lhs)?, truth(&rhs)?)),
        BinaryOperator::Or => Ok(kleene_or(truth(&lhs)?, truth(&rhs)?)),
        BinaryOperator::Equals
        | BinaryOperator::NotEquals
        | BinaryOperator::LessThan
        | BinaryOperator::LessThanOrEqual
        | BinaryOperator::GreaterThan
        | BinaryOperator::GreaterThanOrEqual => existential(lhs, rhs, |l, r| comparison(op, l, r)),
        BinaryOperator::In => existential(lhs, rhs, membership),
        BinaryOperator::Contains | BinaryOperator::StartsWith | BinaryOperator::EndsWith => {
            existential(lhs, rhs, |l, r| string_op(op, l, r))
        }
        BinaryOperator::Add
        | BinaryOperator::Subtract
        | BinaryOperator::Multiply
        | BinaryOperator::Divide => distribute_arith(op, lhs, rhs),
    }
}

/// Predicate operators hold existentially over a per-edge mapping: true if
/// some entry satisfies, null if none does but some entry is unknown.
fn existential(
    lhs: Value,
    rhs: Value,
    op: impl Fn(&Value, &Value) -> Result<Value, EngineError>,
) -> Result<Value, EngineError> {
    let entries: Vec<(Value, Value)> = match (&lhs, &rhs) {
        (Value::EdgeMap(left), _) => left.values().map(|v| (v.clone(), rhs.clone())).collect(),
        (_, Value::EdgeMap(right)) => right.values().map(|v| (lhs.clone(), v.clone())).collect(),
        _ => return op(&lhs, &rhs),
    };
    let mut unknown = false;
    for (l, r) in &entries {
        match truth(&op(l, r)?)? {
            Some(true) => return Ok(Value::Boolean(true)),
            Some(false) => {}
            None => unknown = true,
        }
    }
    if unknown || entries.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(Value::Boolean(false))
    }
}

fn comparison(op: BinaryOperator, lhs: &Value, rhs: &Value) -> Result<Value, EngineError> {
    let verdict = match op {
        BinaryOperator::Equals => values_equal(lhs, rhs),
        BinaryOperator::NotEquals => values_equal(lhs, rhs).map(|b| !b),
        BinaryOperator::LessThan => ordering(lhs, rhs).map(|o| o == Ordering::Less),
        BinaryOperator::LessThanOrEqual => ordering(lhs, rhs).map(|o| o != Ordering::Greater),
        BinaryOperator::GreaterThan => ordering(lhs, rhs).map(|o| o == Ordering::Greater),
        BinaryOperator::GreaterThanOrEqual => ordering(lhs, rhs).map(|o| o != Ordering::Less),
        _ => None,
    };
    Ok(verdict.map(Value::Boolean).unwrap_or(Value::Null))
}

fn ordering(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    if lhs.is_null() || rhs.is_null() {
        return None;
    }
    compare_values(lhs, rhs)
}

fn membership(lhs: &Value, rhs: &Value) -> Result<Value, EngineError> {
    if lhs.is_null() || rhs.is_null() {
        return Ok(Value::Null);
    }
    let Value::List(items) = rhs else {
        return Err(EngineError::Type("IN expects a list operand".into()));
    };
    let mut unknown = false;
    for item in items {
        match values_equal(lhs, item) {
            Some(true) => return Ok(Value::Boolean(true)),
            Some(false) => {}
            None => unknown = true,
        }
    }
    if unknown {
        Ok(Value::Null)
    } else {
        Ok(Value::Boolean(false))
    }
}

fn string_op(op: BinaryOperator, lhs: &Value, rhs: &Value) -> Result<Value, EngineError> {
    if lhs.is_null() || rhs.is_null() {
        return Ok(Value::Null);
    }
    let (Some(subject), Some(needle)) = (lhs.as_str(), rhs.as_str()) else {
        return Err(EngineError::Type(format!(
            "string operator applied to non-string operands: {lhs:?}, {rhs:?}"
        )));
    };
    let result = match op {
        BinaryOperator::Contains => subject.contains(needle),
        BinaryOperator::StartsWith => subject.starts_with(needle),
        BinaryOperator::EndsWith => subject.ends_with(needle),
        _ => false,
    };
    Ok(Value::Boolean(result))
}

/// Arithmetic distributes entry-wise over a per-edge mapping, so the result
/// stays keyed by parallel edge and feeds back into existential predicates.
fn distribute_arith(op: BinaryOperator, lhs: Value, rhs: Value) -> Result<Value, EngineError> {
    match (&lhs, &rhs) {
        (Value::EdgeMap(entries), _) => {
            let mut out = BTreeMap::new();
            for (slot, value) in entries {
                out.insert(slot.clone(), arith(op, value, &rhs)?);
            }
            Ok(Value::EdgeMap(out))
        }
        (_, Value::EdgeMap(entries)) => {
            let mut out = BTreeMap::new();
            for (slot, value) in entries {
                out.insert(slot.clone(), arith(op, &lhs, value)?);
            }
            Ok(Value::EdgeMap(out))
        }
        _ => arith(op, &lhs, &rhs),
    }
}

fn arith(op: BinaryOperator, lhs: &Value, rhs: &Value) -> Result<Value, EngineError> {
    if lhs.is_null() || rhs.is_null() {
        return Ok(Value::Null);
    }
    let both_int = matches!(
        (lhs, rhs),
        (Value::Integer(_), Value::Integer(_))
    );
    let (Some(a), Some(b)) = (lhs.as_f64(), rhs.as_f64()) else {
        return Err(EngineError::Type(format!(
            "arithmetic applied to non-numeric operands: {lhs:?}, {rhs:?}"
        )));
    };
    let value = match op {
        BinaryOperator::Add => a + b,
        BinaryOperator::Subtract => a - b,
        BinaryOperator::Multiply => a * b,
        BinaryOperator::Divide => {
            if b == 0.0 {
                return Ok(Value::Null);
            }
            return Ok(Value::Float(a / b));
        }
        _ => {
            return Err(EngineError::Type("unsupported arithmetic operator".into()));
        }
    };
    if both_int {
        Ok(Value::Integer(value as i64))
    } else {
        Ok(Value::Float(value))
    }
}

fn negate(value: Value) -> Result<Value, EngineError> {
    match value {
        Value::Integer(i) => Ok(Value::Integer(-i)),
        Value::Float(f) => Ok(Value::Float(-f)),
        Value::Null => Ok(Value::Null),
        other => Err(EngineError::Type(format!(
            "cannot negate non-numeric value {other:?}"
        ))),
    }
}
