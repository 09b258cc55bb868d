mod common;

use common::{column_of, event_dataset, event_schema, row_counts};
use pretty_assertions::assert_eq;
use relation_filter::{
    CompareOp, Condition, EngineOptions, EntityGraph, EntitySchema, ErrorKind, ExpansionMode,
    FilterEngine, FilterError, FilterSet, Hop, Predicate, Relation, RelationStore, Value,
};
use std::collections::{BTreeMap, BTreeSet};

fn store() -> RelationStore {
    RelationStore::from_relations(event_dataset()).unwrap()
}

fn graph(expansion: ExpansionMode) -> EntityGraph {
    EntityGraph::build(&store(), &event_schema(), expansion).unwrap()
}

fn company_hops() -> ExpansionMode {
    ExpansionMode::Guided {
        hops: vec![
            Hop::new("companies", "company_employees"),
            Hop::new("companies", "event_attendees"),
            Hop::new("event_attendees", "events"),
        ],
    }
}

fn condition(attribute: &str, condition: Condition) -> BTreeMap<String, Condition> {
    BTreeMap::from([(attribute.to_string(), condition)])
}

fn ids(graph: &EntityGraph, nodes: &BTreeSet<usize>) -> Vec<String> {
    nodes
        .iter()
        .map(|&idx| graph.node(idx).unwrap().id().to_string())
        .collect()
}

#[test]
fn one_node_per_row_and_one_edge_per_declared_match() {
    let graph = graph(ExpansionMode::Closure);
    assert_eq!(graph.node_count(), 19);
    // 6 attendee->event, 6 attendee->company, 5 employee->company.
    assert_eq!(graph.edge_count(), 17);
    assert_eq!(graph.nodes_of("event_attendees").len(), 6);
}

#[test]
fn duplicate_identifiers_stay_separate_nodes() {
    let graph = graph(ExpansionMode::Closure);
    let attendee_ids: Vec<&str> = graph
        .nodes_of("event_attendees")
        .iter()
        .map(|&idx| graph.node(idx).unwrap().id())
        .collect();
    assert_eq!(
        attendee_ids,
        vec![
            "event_attendees:event-1",
            "event_attendees:event-1",
            "event_attendees:event-2",
            "event_attendees:event-3",
            "event_attendees:event-3",
            "event_attendees:event-4",
        ]
    );
}

#[test]
fn closure_reaches_the_whole_component() {
    let graph = graph(ExpansionMode::Closure);
    let result = graph
        .filter(&condition("company_industry", Condition::Equals("Energy".into())))
        .unwrap();

    assert_eq!(
        column_of(&result, "companies", "company_url"),
        vec!["company-1", "company-2", "company-4"]
    );
    assert_eq!(
        column_of(&result, "events", "event_url"),
        vec!["event-1", "event-3", "event-4"]
    );
    assert_eq!(
        column_of(&result, "company_employees", "person_id"),
        vec!["person-1", "person-2", "person-3", "person-5"]
    );
    assert_eq!(
        column_of(&result, "event_attendees", "event_url"),
        vec!["event-1", "event-1", "event-3", "event-3", "event-4"]
    );
}

#[test]
fn guided_expansion_only_follows_listed_hops() {
    let graph = graph(company_hops());
    let result = graph
        .filter(&condition("company_industry", Condition::one_of(["Energy"])))
        .unwrap();

    assert_eq!(column_of(&result, "companies", "company_url"), vec!["company-4"]);
    assert_eq!(column_of(&result, "company_employees", "person_id"), vec!["person-5"]);
    assert_eq!(column_of(&result, "event_attendees", "company_url"), vec!["company-4"]);
    assert_eq!(column_of(&result, "events", "event_url"), vec!["event-3"]);
}

#[test]
fn unreached_relations_are_absent() {
    let graph = graph(ExpansionMode::Guided {
        hops: vec![Hop::new("companies", "company_employees")],
    });
    let result = graph
        .filter(&condition("company_industry", Condition::Equals("Finance".into())))
        .unwrap();

    assert_eq!(
        row_counts(&result),
        BTreeMap::from([("companies", 1), ("company_employees", 1)])
    );
}

#[test]
fn comparator_conditions_select_matching_nodes() {
    let graph = graph(ExpansionMode::Closure);
    let selected = graph.select(&condition(
        "company_revenue",
        Condition::Compare(CompareOp::Gte, 2_000_000.into()),
    ));
    assert_eq!(
        ids(&graph, &selected),
        vec!["companies:company-2", "companies:company-3"]
    );

    let selected = graph.select(&condition(
        "event_start_date",
        Condition::Satisfies(Predicate::date_range(Some("2023-06-01"), None).unwrap()),
    ));
    assert_eq!(ids(&graph, &selected), vec!["events:event-3", "events:event-4"]);
}

#[test]
fn missing_attributes_never_match() {
    let graph = graph(ExpansionMode::Closure);
    let result = graph
        .filter(&condition("ticker", Condition::Equals("ACME".into())))
        .unwrap();
    assert!(result.is_empty());

    // No single node carries both attributes.
    let mut both = condition("company_industry", Condition::Equals("Tech".into()));
    both.insert("person_seniority".into(), Condition::Equals("Director".into()));
    assert!(graph.select(&both).is_empty());
}

#[test]
fn connected_finds_direct_neighbors_of_one_relation() {
    let graph = graph(ExpansionMode::Closure);
    let company_1 = graph.select(&condition("company_url", Condition::Equals("company-1".into())));
    let company_1: BTreeSet<usize> = company_1
        .into_iter()
        .filter(|&idx| graph.node(idx).unwrap().relation() == "companies")
        .collect();

    let employees = graph.connected(&company_1, "company_employees");
    assert_eq!(
        ids(&graph, &employees),
        vec!["company_employees:person-1", "company_employees:person-2"]
    );
}

#[test]
fn condition_semantics() {
    assert!(!Condition::Equals(Value::Null).matches(&Value::Null));
    assert!(!Condition::Compare(CompareOp::Ne, 1.into()).matches(&Value::Null));
    assert!(Condition::Compare(CompareOp::Ne, 1.into()).matches(&"1".into()));
    assert!(!Condition::Compare(CompareOp::Gt, 1.into()).matches(&"2".into()));
    assert!(Condition::Compare(CompareOp::Lt, 2.into()).matches(&1.5.into()));
    assert!(Condition::Equals(3.into()).matches(&3.0.into()));
    assert_eq!(CompareOp::parse("gte"), Some(CompareOp::Gte));
    assert_eq!(CompareOp::parse(">="), None);
}

#[test]
fn schema_links_must_target_identified_relations() {
    let schema = EntitySchema::new()
        .with_id("companies", "company_url")
        .with_link("companies", "company_url", "company_employees");
    let err = EntityGraph::build(&store(), &schema, ExpansionMode::Closure).unwrap_err();
    assert!(matches!(err, FilterError::EntitySchema(_)));
    assert_eq!(err.kind(), ErrorKind::Configuration);

    let schema = EntitySchema::new()
        .with_id("companies", "company_url")
        .with_link("companies", "company_url", "companies");
    assert!(EntityGraph::build(&store(), &schema, ExpansionMode::Closure).is_err());
}

#[test]
fn relations_without_identifiers_use_row_positions() {
    let mut relations = event_dataset();
    relations.push(
        Relation::from_rows("weather", vec!["day"], vec![vec!["mon".into()], vec!["tue".into()]])
            .unwrap(),
    );
    let store = RelationStore::from_relations(relations).unwrap();
    let graph = EntityGraph::build(&store, &event_schema(), ExpansionMode::Closure).unwrap();

    let weather: Vec<&str> = graph
        .nodes_of("weather")
        .iter()
        .map(|&idx| graph.node(idx).unwrap().id())
        .collect();
    assert_eq!(weather, vec!["weather:#0", "weather:#1"]);
    assert_eq!(graph.filter_predicates(&FilterSet::new()).unwrap().len(), 5);
}

#[test]
fn engine_keeps_targeted_relations_within_their_predicates() {
    let filter_sets = [
        FilterSet::new().with("companies", "company_industry", Predicate::membership(["Energy"])),
        FilterSet::new().with("events", "event_city", Predicate::membership(["Singapore"])),
        FilterSet::new()
            .with("companies", "company_industry", Predicate::membership(["Tech"]))
            .with("company_employees", "person_seniority", Predicate::membership(["Director"])),
    ];
    let modes = [
        ExpansionMode::Closure,
        company_hops(),
        ExpansionMode::Guided { hops: Vec::new() },
    ];

    for expansion in modes {
        let engine = FilterEngine::with_options(
            event_dataset(),
            EngineOptions::entity_graph(event_schema(), expansion.clone()),
        )
        .unwrap();
        for filters in &filter_sets {
            let result = engine.filter(filters).unwrap();
            for (relation, predicates) in filters.iter() {
                for p in predicates {
                    let failing = result[relation]
                        .column_values(&p.column)
                        .unwrap()
                        .into_iter()
                        .filter(|value| !p.predicate.matches(value))
                        .count();
                    assert_eq!(failing, 0, "{relation}[{}] under {expansion:?}", p.column);
                }
            }
        }
    }
}

#[test]
fn closure_does_not_walk_back_into_the_filtered_relation() {
    let filters =
        FilterSet::new().with("companies", "company_industry", Predicate::membership(["Energy"]));

    let propagation = FilterEngine::build(event_dataset()).unwrap();
    let by_propagation = propagation.filter(&filters).unwrap();
    assert_eq!(
        column_of(&by_propagation, "companies", "company_url"),
        vec!["company-4"]
    );

    let closure = FilterEngine::with_options(
        event_dataset(),
        EngineOptions::entity_graph(event_schema(), ExpansionMode::Closure),
    )
    .unwrap();
    assert_eq!(closure.filter(&filters).unwrap(), by_propagation);

    let guided = FilterEngine::with_options(
        event_dataset(),
        EngineOptions::entity_graph(event_schema(), company_hops()),
    )
    .unwrap();
    assert_eq!(guided.filter(&filters).unwrap(), by_propagation);
}

#[test]
fn engine_strategies_can_disagree() {
    let filters =
        FilterSet::new().with("companies", "company_industry", Predicate::membership(["Finance"]));

    let propagation = FilterEngine::build(event_dataset()).unwrap();
    let by_propagation = propagation.filter(&filters).unwrap();
    assert_eq!(
        column_of(&by_propagation, "companies", "company_url"),
        vec!["company-2"]
    );
    assert_eq!(
        column_of(&by_propagation, "events", "event_url"),
        vec!["event-1", "event-4"]
    );

    // The graph never reaches attendance, so the inferred companies/attendees relationship empties
    // everything during consistency enforcement.
    let employees_only = FilterEngine::with_options(
        event_dataset(),
        EngineOptions::entity_graph(
            event_schema(),
            ExpansionMode::Guided {
                hops: vec![Hop::new("companies", "company_employees")],
            },
        ),
    )
    .unwrap();
    let by_graph = employees_only.filter(&filters).unwrap();
    assert_eq!(
        row_counts(&by_graph),
        BTreeMap::from([
            ("companies", 0),
            ("company_employees", 0),
            ("event_attendees", 0),
            ("events", 0),
        ])
    );
}

#[test]
fn engine_returns_empty_relations_the_graph_did_not_reach() {
    let engine = FilterEngine::with_options(
        event_dataset(),
        EngineOptions::entity_graph(event_schema(), ExpansionMode::Closure),
    )
    .unwrap();
    let filters =
        FilterSet::new().with("companies", "company_industry", Predicate::membership(["Retail"]));

    let outcome = engine.filter_outcome(&filters).unwrap();
    assert_eq!(outcome.strategy, "entity-graph");
    assert_eq!(outcome.strategy_work, 0);
    assert_eq!(
        row_counts(&outcome.relations),
        BTreeMap::from([
            ("companies", 0),
            ("company_employees", 0),
            ("event_attendees", 0),
            ("events", 0),
        ])
    );
    assert_eq!(
        outcome.relations["events"].columns(),
        engine.relation("events").unwrap().columns()
    );
}
