//! Unit tests for dependency level scheduling.

use sql_fixtures::generator::plan;
use sql_fixtures::prioritize::LevelSummary;
use sql_fixtures::spec_id::SpecIdGenerator;
use sql_fixtures::{FixtureError, Spec};
use std::collections::BTreeMap;

fn schedule(json: &str) -> Result<Vec<LevelSummary>, FixtureError> {
    let spec = Spec::from_json_str(json).unwrap();
    plan(&spec, &SpecIdGenerator::new()).map(|levels| levels.iter().map(|l| l.summary()).collect())
}

fn level(tables: &[(&str, &[usize])]) -> LevelSummary {
    LevelSummary {
        tables: tables
            .iter()
            .map(|(t, idx)| (t.to_string(), idx.to_vec()))
            .collect::<BTreeMap<_, _>>(),
        statements: Vec::new(),
    }
}

#[test]
fn test_simple_case_single_level() {
    let levels = schedule(r#"{"Users": {"username": "bob"}}"#).unwrap();
    assert_eq!(levels, vec![level(&[("Users", &[0])])]);
}

#[test]
fn test_no_references_is_one_level_in_order() {
    let levels = schedule(
        r#"{
            "Users": [{"username": "a"}, {"username": "b"}, {"username": "c"}],
            "Tags": [{"name": "x"}, {"name": "y"}]
        }"#,
    )
    .unwrap();
    assert_eq!(levels, vec![level(&[("Tags", &[0, 1]), ("Users", &[0, 1, 2])])]);
}

#[test]
fn test_one_dependency() {
    let levels = schedule(
        r#"{
            "Users": {"username": "bob"},
            "Challenges": [{"createdById": "Users:0", "name": "my challenge"}]
        }"#,
    )
    .unwrap();
    assert_eq!(
        levels,
        vec![level(&[("Users", &[0])]), level(&[("Challenges", &[0])])]
    );
}

#[test]
fn test_later_dependencies_split_a_table() {
    let levels = schedule(
        r#"{
            "Users": [{"username": "bob"}, {"username": "Challenges:0:name"}],
            "Challenges": [{"createdById": "Users:0", "name": "my challenge"}]
        }"#,
    )
    .unwrap();
    assert_eq!(
        levels,
        vec![
            level(&[("Users", &[0])]),
            level(&[("Challenges", &[0])]),
            level(&[("Users", &[1])]),
        ]
    );
}

#[test]
fn test_sql_statements_wait_for_their_references() {
    let levels = schedule(
        r#"{
            "Users": {"username": "bob"},
            "Items": {"name": "my item", "userId": "Users:0"},
            "sql": "foo {Users:0} {Items:0}"
        }"#,
    )
    .unwrap();
    assert_eq!(levels.len(), 3);
    assert_eq!(levels[1], level(&[("Items", &[0])]));
    assert!(levels[2].tables.is_empty());
    assert_eq!(levels[2].statements, vec![0]);
}

#[test]
fn test_advanced_case() {
    let levels = schedule(
        r#"{
            "Users": [{"username": "bob"}],
            "Comments": [
                {"comment": "comment 1", "createdById": "Users:0", "userId": "Users:0"},
                {"comment": "child of 1", "createdById": "Users:0", "userId": "Users:0", "parentId": "Comments:0"}
            ],
            "LikeVotes": [
                {"commentId": "Comments:0", "createdById": "Users:0"},
                {"commentId": "Comments:1", "createdById": "Users:0"}
            ]
        }"#,
    )
    .unwrap();
    assert_eq!(
        levels,
        vec![
            level(&[("Users", &[0])]),
            level(&[("Comments", &[0])]),
            level(&[("Comments", &[1]), ("LikeVotes", &[0])]),
            level(&[("LikeVotes", &[1])]),
        ]
    );
}

#[test]
fn test_explicit_spec_ids() {
    let levels = schedule(
        r#"{
            "Users": [{"username": "bob", "specId": "myId"}, {"username": "Challenges:0:name"}],
            "Challenges": [{"createdById": "Users:myId", "name": "my challenge"}]
        }"#,
    )
    .unwrap();
    assert_eq!(
        levels,
        vec![
            level(&[("Users", &[0])]),
            level(&[("Challenges", &[0])]),
            level(&[("Users", &[1])]),
        ]
    );
}

#[test]
fn test_self_reference_chain() {
    let levels = schedule(
        r#"{
            "Categories": [
                {"name": "leaf", "parentId": "Categories:1"},
                {"name": "middle", "parentId": "Categories:2"},
                {"name": "root"}
            ]
        }"#,
    )
    .unwrap();
    assert_eq!(
        levels,
        vec![
            level(&[("Categories", &[2])]),
            level(&[("Categories", &[1])]),
            level(&[("Categories", &[0])]),
        ]
    );
}

#[test]
fn test_array_and_interpolated_references_are_needs() {
    let levels = schedule(
        r#"{
            "Tags": [{"name": "a"}, {"name": "b"}],
            "Posts": [{"tagIds": ["Tags:0", "Tags:1"], "title": "about {Tags:0:name}"}]
        }"#,
    )
    .unwrap();
    assert_eq!(
        levels,
        vec![level(&[("Tags", &[0, 1])]), level(&[("Posts", &[0])])]
    );
}

#[test]
fn test_escaped_values_are_not_needs() {
    let levels = schedule(r#"{"Users": {"username": "foo::bar"}, "Links": {"url": "http:://x"}}"#)
        .unwrap();
    assert_eq!(levels.len(), 1);
}

#[test]
fn test_query_objects_add_no_dependencies() {
    let levels = schedule(
        r#"{"Items": {"name": "x", "userId": {"from": "users", "where": {"username": "bob"}}}}"#,
    )
    .unwrap();
    assert_eq!(levels, vec![level(&[("Items", &[0])])]);
}

#[test]
fn test_missing_table_is_an_error() {
    let err = schedule(
        r#"{
            "Users": {"username": "bob"},
            "Challenges": [{"createdById": "Tasks:0", "name": "my challenge"}]
        }"#,
    )
    .unwrap_err();
    assert!(matches!(err, FixtureError::UnsatisfiableDependencies { .. }));
    assert!(err.to_string().contains("Tasks:0"));
}

#[test]
fn test_out_of_range_index_is_an_error() {
    let err = schedule(
        r#"{
            "Users": {"username": "bob"},
            "Challenges": [{"createdById": "Users:1", "name": "my challenge"}]
        }"#,
    )
    .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("Challenges[0]"), "{}", message);
    assert!(message.contains("Users:1"), "{}", message);
}

#[test]
fn test_cycle_reports_every_unmet_need() {
    let err = schedule(
        r#"{
            "A": {"bId": "B:0"},
            "B": {"aId": "A:0"},
            "C": {"name": "fine"}
        }"#,
    )
    .unwrap_err();
    let FixtureError::UnsatisfiableDependencies { needs } = err else {
        panic!("expected unsatisfiable dependencies");
    };
    let tables: Vec<&str> = needs.iter().map(|n| n.table.as_str()).collect();
    assert_eq!(tables, vec!["A", "B"]);
}
