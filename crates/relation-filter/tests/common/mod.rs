#![allow(dead_code)]

use chrono::NaiveDate;
use relation_filter::{EntitySchema, Relation, Value};
use std::collections::{BTreeMap, BTreeSet};

pub fn date(year: i32, month: u32, day: u32) -> Value {
    Value::Date(NaiveDate::from_ymd_opt(year, month, day).unwrap())
}

fn relation(name: &str, columns: Vec<&str>, rows: Vec<Vec<Value>>) -> Relation {
    Relation::from_rows(name, columns, rows).unwrap()
}

/// `customers{customer_id, tier}` and `orders{order_id, customer_id}`.
///
/// Order 104 references customer 5, who does not exist; customer 4 has no orders.
pub fn orders_customers() -> Vec<Relation> {
    let customers = relation(
        "customers",
        vec!["customer_id", "tier"],
        vec![
            vec![1.into(), "gold".into()],
            vec![2.into(), "silver".into()],
            vec![3.into(), "gold".into()],
            vec![4.into(), "bronze".into()],
        ],
    );
    let orders = relation(
        "orders",
        vec!["order_id", "customer_id"],
        vec![
            vec![100.into(), 1.into()],
            vec![101.into(), 2.into()],
            vec![102.into(), 3.into()],
            vec![103.into(), 3.into()],
            vec![104.into(), 5.into()],
        ],
    );
    vec![customers, orders]
}

/// Events, companies, the companies attending each event, and company employees.
///
/// Attendance links e1-c1, e1-c2, e2-c3, e3-c1, e3-c4 and e4-c2, so `{e2, c3}` is the only
/// component not reachable from company-4.
pub fn event_dataset() -> Vec<Relation> {
    let events = relation(
        "events",
        vec!["event_url", "event_name", "event_start_date", "event_city"],
        vec![
            vec!["event-1".into(), "Event 1".into(), date(2023, 1, 1), "Singapore".into()],
            vec!["event-2".into(), "Event 2".into(), date(2023, 3, 1), "New York".into()],
            vec!["event-3".into(), "Event 3".into(), date(2023, 7, 1), "Singapore".into()],
            vec!["event-4".into(), "Event 4".into(), date(2023, 9, 1), "London".into()],
        ],
    );
    let companies = relation(
        "companies",
        vec!["company_url", "company_name", "company_industry", "company_revenue"],
        vec![
            vec!["company-1".into(), "Company 1".into(), "Tech".into(), 1_500_000.into()],
            vec!["company-2".into(), "Company 2".into(), "Finance".into(), 2_000_000.into()],
            vec!["company-3".into(), "Company 3".into(), "Tech".into(), 3_500_000.into()],
            vec!["company-4".into(), "Company 4".into(), "Energy".into(), 1_000_000.into()],
        ],
    );
    let attendees = relation(
        "event_attendees",
        vec!["event_url", "company_url", "company_relation_to_event"],
        vec![
            vec!["event-1".into(), "company-1".into(), "Sponsor".into()],
            vec!["event-1".into(), "company-2".into(), "Attendee".into()],
            vec!["event-2".into(), "company-3".into(), "Sponsor".into()],
            vec!["event-3".into(), "company-1".into(), "Attendee".into()],
            vec!["event-3".into(), "company-4".into(), "Sponsor".into()],
            vec!["event-4".into(), "company-2".into(), "Sponsor".into()],
        ],
    );
    let employees = relation(
        "company_employees",
        vec!["company_url", "person_id", "person_seniority"],
        vec![
            vec!["company-1".into(), "person-1".into(), "Director".into()],
            vec!["company-1".into(), "person-2".into(), "Engineer".into()],
            vec!["company-2".into(), "person-3".into(), "C-Level".into()],
            vec!["company-3".into(), "person-4".into(), "Director".into()],
            vec!["company-4".into(), "person-5".into(), "Manager".into()],
        ],
    );
    vec![events, companies, attendees, employees]
}

/// Declared links for [`event_dataset`]. Note there is no attendee/employee link even though both
/// relations carry `company_url`.
pub fn event_schema() -> EntitySchema {
    EntitySchema::new()
        .with_id("events", "event_url")
        .with_id("companies", "company_url")
        .with_id("company_employees", "person_id")
        .with_id("event_attendees", "event_url")
        .with_link("event_attendees", "event_url", "events")
        .with_link("event_attendees", "company_url", "companies")
        .with_link("company_employees", "company_url", "companies")
}

/// Rendered values of one column, in row order.
pub fn column(relation: &Relation, column: &str) -> Vec<String> {
    relation
        .column_values(column)
        .unwrap()
        .into_iter()
        .map(ToString::to_string)
        .collect()
}

pub fn column_of(result: &BTreeMap<String, Relation>, name: &str, col: &str) -> Vec<String> {
    column(&result[name], col)
}

pub fn keys(relation: &Relation, column: &str) -> BTreeSet<Value> {
    relation.key_values(column)
}

pub fn row_counts(result: &BTreeMap<String, Relation>) -> BTreeMap<&str, usize> {
    result
        .iter()
        .map(|(name, relation)| (name.as_str(), relation.row_count()))
        .collect()
}
