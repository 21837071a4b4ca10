use std::collections::BTreeMap;

use common::{AttrMap, EdgeSlot, Value};
use grandcypher_core::{GrandCypher, MemoryGraph};

fn attrs(pairs: &[(&str, Value)]) -> AttrMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn labeled(label: &str, pairs: &[(&str, Value)]) -> AttrMap {
    let mut map = attrs(pairs);
    map.insert(
        "__labels__".to_string(),
        Value::List(vec![Value::from(label)]),
    );
    map
}

fn edge_map(entries: &[(i64, &str, Value)]) -> Value {
    let mut map = BTreeMap::new();
    for (key, label, value) in entries {
        map.insert(EdgeSlot::new(*key, Some(label.to_string())), value.clone());
    }
    Value::EdgeMap(map)
}

fn label_map(entries: &[(&str, Value)]) -> Value {
    Value::Map(
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
    )
}

/// The payments fixture: parallel `paid` edges in both directions, plus an
/// unrelated `friends` edge.
fn payments() -> MemoryGraph {
    let mut host = MemoryGraph::multi_directed();
    host.add_node("a", attrs(&[("name", Value::from("Alice"))]));
    host.add_node("b", attrs(&[("name", Value::from("Bob"))]));
    host.add_edge("a", "b", labeled("paid", &[("amount", Value::Integer(12))]));
    host.add_edge("b", "a", labeled("paid", &[("amount", Value::Integer(6))]));
    host.add_edge("b", "a", labeled("paid", &[("value", Value::Integer(14))]));
    host.add_edge("a", "b", labeled("friends", &[("years", Value::Integer(9))]));
    host.add_edge("a", "b", labeled("paid", &[("amount", Value::Integer(40))]));
    host
}

#[test]
fn parallel_edges_fold_into_one_row() {
    let engine = GrandCypher::new(payments());
    let table = engine
        .run("MATCH (n)-[r:paid]->(m) RETURN n.name, m.name, r.amount")
        .unwrap();

    assert_eq!(
        table.get("n.name").unwrap(),
        &[Value::from("Alice"), Value::from("Bob")]
    );
    assert_eq!(
        table.get("m.name").unwrap(),
        &[Value::from("Bob"), Value::from("Alice")]
    );
    // Edge keys are the host's own: the `friends` edge occupies key 1, so
    // the second paid edge from Alice carries key 2.
    assert_eq!(
        table.get("r.amount").unwrap(),
        &[
            edge_map(&[(0, "paid", Value::Integer(12)), (2, "paid", Value::Integer(40))]),
            edge_map(&[(0, "paid", Value::Integer(6)), (1, "paid", Value::Null)]),
        ]
    );
}

#[test]
fn aggregate_sum_buckets_by_label() {
    let engine = GrandCypher::new(payments());
    let table = engine
        .run("MATCH (n)-[r:paid]->(m) RETURN n.name, m.name, SUM(r.amount)")
        .unwrap();

    assert_eq!(
        table.get("n.name").unwrap(),
        &[Value::from("Alice"), Value::from("Bob")]
    );
    assert_eq!(
        table.get("m.name").unwrap(),
        &[Value::from("Bob"), Value::from("Alice")]
    );
    assert_eq!(
        table.get("SUM(r.amount)").unwrap(),
        &[
            label_map(&[("paid", Value::Integer(52))]),
            label_map(&[("paid", Value::Integer(6))]),
        ]
    );
}

#[test]
fn aggregate_count_avg_min_max() {
    let mut host = MemoryGraph::multi_directed();
    host.add_node("a", attrs(&[("name", Value::from("Alice"))]));
    host.add_node("b", attrs(&[("name", Value::from("Bob"))]));
    host.add_node("c", attrs(&[("name", Value::from("Christine"))]));
    host.add_edge("a", "b", labeled("paid", &[("amount", Value::Integer(40))]));
    host.add_edge("a", "b", labeled("paid", &[("amount", Value::Integer(12))]));
    host.add_edge("a", "c", labeled("owes", &[("amount", Value::Integer(39))]));
    host.add_edge("b", "a", labeled("paid", &[("amount", Value::Integer(6))]));
    let engine = GrandCypher::new(host);

    let table = engine
        .run("MATCH (n)-[r:paid]->(m) RETURN n.name, m.name, COUNT(r.amount), SUM(r.amount)")
        .unwrap();
    assert_eq!(
        table.get("COUNT(r.amount)").unwrap(),
        &[
            label_map(&[("paid", Value::Integer(2))]),
            label_map(&[("paid", Value::Integer(1))]),
        ]
    );
    assert_eq!(
        table.get("SUM(r.amount)").unwrap(),
        &[
            label_map(&[("paid", Value::Integer(52))]),
            label_map(&[("paid", Value::Integer(6))]),
        ]
    );

    let table = engine
        .run("MATCH (n)-[r:paid]->(m) RETURN n.name, MIN(r.amount), MAX(r.amount), AVG(r.amount)")
        .unwrap();
    assert_eq!(
        table.get("MIN(r.amount)").unwrap(),
        &[
            label_map(&[("paid", Value::Integer(12))]),
            label_map(&[("paid", Value::Integer(6))]),
        ]
    );
    assert_eq!(
        table.get("MAX(r.amount)").unwrap(),
        &[
            label_map(&[("paid", Value::Integer(40))]),
            label_map(&[("paid", Value::Integer(6))]),
        ]
    );
    assert_eq!(
        table.get("AVG(r.amount)").unwrap(),
        &[
            label_map(&[("paid", Value::Float(26.0))]),
            label_map(&[("paid", Value::Float(6.0))]),
        ]
    );

    let table = engine
        .run("MATCH (n)-[r:owes]->(m) RETURN n.name, MAX(r.amount)")
        .unwrap();
    assert_eq!(
        table.get("MAX(r.amount)").unwrap(),
        &[label_map(&[("owes", Value::Integer(39))])]
    );
}

#[test]
fn where_filters_individual_parallel_edges() {
    let engine = GrandCypher::new(payments());
    let table = engine
        .run("MATCH (n)-[r:paid]->(m) WHERE r.amount > 12 RETURN n.name, m.name, r.amount")
        .unwrap();

    // Only the 40-unit payment survives; the Bob->Alice row dies outright.
    assert_eq!(table.get("n.name").unwrap(), &[Value::from("Alice")]);
    assert_eq!(table.get("m.name").unwrap(), &[Value::from("Bob")]);
    assert_eq!(
        table.get("r.amount").unwrap(),
        &[edge_map(&[(2, "paid", Value::Integer(40))])]
    );
}

#[test]
fn where_or_over_edge_attributes() {
    let mut host = MemoryGraph::multi_directed();
    host.add_node("a", attrs(&[("name", Value::from("Alice"))]));
    host.add_node("b", attrs(&[("name", Value::from("Bob"))]));
    host.add_node("c", attrs(&[("name", Value::from("Christine"))]));
    host.add_edge(
        "a",
        "b",
        labeled(
            "friend",
            &[("years", Value::Integer(1)), ("friendly", Value::from("very"))],
        ),
    );
    host.add_edge("b", "a", labeled("colleague", &[("years", Value::Integer(2))]));
    host.add_edge("b", "a", labeled("mentor", &[("years", Value::Integer(4))]));
    host.add_edge("b", "c", labeled("chef", &[("years", Value::Integer(12))]));
    let engine = GrandCypher::new(host);

    let table = engine
        .run(
            r#"MATCH (a)-[r]->(b) WHERE r.friendly == "very" OR r.years == 2
               RETURN a.name, b.name, r.years"#,
        )
        .unwrap();
    assert_eq!(
        table.get("a.name").unwrap(),
        &[Value::from("Alice"), Value::from("Bob")]
    );
    assert_eq!(
        table.get("r.years").unwrap(),
        &[
            edge_map(&[(0, "friend", Value::Integer(1))]),
            edge_map(&[(0, "colleague", Value::Integer(2))]),
        ]
    );
}

#[test]
fn node_where_keeps_all_parallel_edges() {
    let mut host = MemoryGraph::multi_directed();
    host.add_node("a", attrs(&[("name", Value::from("Alice"))]));
    host.add_node("b", attrs(&[("name", Value::from("Bob"))]));
    host.add_edge("a", "b", labeled("paid", &[("amount", Value::Integer(12))]));
    host.add_edge("a", "b", labeled("paid", &[("amount", Value::Integer(40))]));
    host.add_edge("b", "a", labeled("paid", &[("amount", Value::Integer(6))]));
    let engine = GrandCypher::new(host);

    let table = engine
        .run(r#"MATCH (a)-[r]->(b) WHERE a.name == "Alice" RETURN r.amount"#)
        .unwrap();
    assert_eq!(
        table.get("r.amount").unwrap(),
        &[edge_map(&[
            (0, "paid", Value::Integer(12)),
            (1, "paid", Value::Integer(40)),
        ])]
    );
}

#[test]
fn edge_label_alternatives() {
    let mut host = MemoryGraph::directed();
    host.add_node("a", attrs(&[("name", Value::from("Alice"))]));
    host.add_node("b", attrs(&[("name", Value::from("Bob"))]));
    host.add_node("c", attrs(&[("name", Value::from("Carol"))]));
    host.add_node("d", attrs(&[("name", Value::from("Derek"))]));
    host.add_edge("a", "b", labeled("LOVES", &[]));
    host.add_edge("a", "c", labeled("KNOWS", &[]));
    host.add_edge("b", "c", labeled("LIVES_NEAR", &[]));
    host.add_edge("b", "d", labeled("WORKS_WITH", &[]));
    let engine = GrandCypher::new(host);

    let table = engine
        .run("MATCH (n1)-[r:LOVES|KNOWS|LIVES_NEAR]->(n2) RETURN n1.name, n2.name")
        .unwrap();
    assert_eq!(
        table.get("n1.name").unwrap(),
        &[Value::from("Alice"), Value::from("Alice"), Value::from("Bob")]
    );
    assert_eq!(
        table.get("n2.name").unwrap(),
        &[Value::from("Bob"), Value::from("Carol"), Value::from("Carol")]
    );

    let table = engine
        .run("MATCH (n1)-[r:ADMIRES]->(n2) RETURN n1.name")
        .unwrap();
    assert!(table.is_empty());
}

#[test]
fn edge_labels_attribute_is_returned() {
    let mut host = MemoryGraph::multi_directed();
    host.add_node("a", attrs(&[("name", Value::from("Alice"))]));
    host.add_node("b", attrs(&[("name", Value::from("Bob"))]));
    host.add_edge("a", "b", labeled("friend", &[("years", Value::Integer(1))]));
    let engine = GrandCypher::new(host);

    let table = engine
        .run("MATCH (a)-[r]->(b) RETURN r.__labels__")
        .unwrap();
    assert_eq!(
        table.get("r.__labels__").unwrap(),
        &[edge_map(&[(
            0,
            "friend",
            Value::List(vec![Value::from("friend")]),
        )])]
    );
}

#[test]
fn order_by_edge_attribute() {
    let mut host = MemoryGraph::directed();
    host.add_node("a", attrs(&[("name", Value::from("Alice"))]));
    host.add_node("b", attrs(&[("name", Value::from("Bob"))]));
    host.add_node("c", attrs(&[("name", Value::from("Carol"))]));
    host.add_edge("b", "a", labeled("paid", &[("amount", Value::Integer(14))]));
    host.add_edge("a", "b", labeled("paid", &[("value", Value::Integer(9))]));
    host.add_edge("c", "b", labeled("paid", &[("value", Value::Integer(980))]));
    host.add_edge("b", "c", labeled("paid", &[("value", Value::Integer(11))]));
    let engine = GrandCypher::new(host);

    let table = engine
        .run("MATCH (n)-[r]->(m) RETURN n.name, r.value ORDER BY r.value ASC")
        .unwrap();
    // Nulls last regardless of direction; the amount-only edge has no value.
    assert_eq!(
        table.get("n.name").unwrap(),
        &[
            Value::from("Alice"),
            Value::from("Bob"),
            Value::from("Carol"),
            Value::from("Bob"),
        ]
    );

    let table = engine
        .run("MATCH (n)-[r]->(m) RETURN n.name, r.value ORDER BY r.value DESC")
        .unwrap();
    assert_eq!(
        table.get("n.name").unwrap(),
        &[
            Value::from("Carol"),
            Value::from("Bob"),
            Value::from("Alice"),
            Value::from("Bob"),
        ]
    );
}

#[test]
fn scalar_aggregates_group_by_plain_columns() {
    let mut host = MemoryGraph::directed();
    host.add_node(1, attrs(&[("city", Value::from("Zurich")), ("age", Value::Integer(20))]));
    host.add_node(2, attrs(&[("city", Value::from("Zurich")), ("age", Value::Integer(30))]));
    host.add_node(3, attrs(&[("city", Value::from("Basel")), ("age", Value::Integer(40))]));
    let engine = GrandCypher::new(host);

    let table = engine
        .run("MATCH (n) RETURN n.city, COUNT(*), SUM(n.age), AVG(n.age)")
        .unwrap();
    assert_eq!(
        table.get("n.city").unwrap(),
        &[Value::from("Zurich"), Value::from("Basel")]
    );
    assert_eq!(
        table.get("COUNT(*)").unwrap(),
        &[Value::Integer(2), Value::Integer(1)]
    );
    assert_eq!(
        table.get("SUM(n.age)").unwrap(),
        &[Value::Integer(50), Value::Integer(40)]
    );
    assert_eq!(
        table.get("AVG(n.age)").unwrap(),
        &[Value::Float(25.0), Value::Float(40.0)]
    );
}

#[test]
fn count_expr_skips_nulls_and_sum_of_nothing_is_zero() {
    let mut host = MemoryGraph::directed();
    host.add_node(1, attrs(&[("age", Value::Integer(20))]));
    host.add_node(2, AttrMap::new());
    host.add_node(3, attrs(&[("age", Value::Integer(40))]));
    let engine = GrandCypher::new(host);

    let table = engine
        .run("MATCH (n) RETURN COUNT(*), COUNT(n.age), SUM(n.missing), AVG(n.missing), MIN(n.missing)")
        .unwrap();
    assert_eq!(table.get("COUNT(*)").unwrap(), &[Value::Integer(3)]);
    assert_eq!(table.get("COUNT(n.age)").unwrap(), &[Value::Integer(2)]);
    assert_eq!(table.get("SUM(n.missing)").unwrap(), &[Value::Integer(0)]);
    assert_eq!(table.get("AVG(n.missing)").unwrap(), &[Value::Null]);
    assert_eq!(table.get("MIN(n.missing)").unwrap(), &[Value::Null]);
}
