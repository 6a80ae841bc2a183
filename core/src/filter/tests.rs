use chrono::Utc;
use serde_json::{json, Value};

use super::*;

fn item(metadata: Value, document: Option<&str>) -> ItemRecord {
    let metadata = match metadata {
        Value::Object(map) => Some(map),
        Value::Null => None,
        other => panic!("metadata must be an object, got {other}"),
    };
    ItemRecord {
        id: "a".to_string(),
        document: document.map(str::to_string),
        embedding: vec![1.0, 0.0],
        metadata,
        created_at: Utc::now(),
    }
}

fn filter(value: Value) -> WhereFilter {
    WhereFilter::from_json(&value).expect("filter must parse")
}

#[test]
fn absent_and_empty_filters_match_everything() {
    let record = item(json!({"k": 1}), None);
    assert!(matches(&record, None, None));
    assert!(matches(&record, Some(&filter(json!({}))), None));
    assert!(matches(&record, Some(&filter(json!({"$and": []}))), None));
}

#[test]
fn scalar_value_is_eq_shorthand() {
    let record = item(json!({"genre": "jazz", "year": 1959}), None);
    assert!(matches(&record, Some(&filter(json!({"genre": "jazz"}))), None));
    assert!(!matches(&record, Some(&filter(json!({"genre": "rock"}))), None));
    assert!(matches(&record, Some(&filter(json!({"year": {"$eq": 1959}}))), None));
}

#[test]
fn numeric_equality_ignores_integer_float_representation() {
    let record = item(json!({"score": 42.0}), None);
    assert!(matches(&record, Some(&filter(json!({"score": 42}))), None));
    assert!(matches(&record, Some(&filter(json!({"score": {"$in": [1, 42]}}))), None));
}

#[test]
fn large_integers_compare_exactly() {
    let record = item(json!({"k": 9_007_199_254_740_993_u64}), None);
    assert!(!matches(&record, Some(&filter(json!({"k": 9_007_199_254_740_992_u64}))), None));
    assert!(matches(&record, Some(&filter(json!({"k": 9_007_199_254_740_993_u64}))), None));
    assert!(matches(
        &record,
        Some(&filter(json!({"k": {"$ne": 9_007_199_254_740_992_u64}}))),
        None
    ));
    assert!(!matches(
        &record,
        Some(&filter(json!({"k": {"$in": [9_007_199_254_740_992_u64]}}))),
        None
    ));
    assert!(matches(
        &record,
        Some(&filter(json!({"k": {"$nin": [9_007_199_254_740_992_u64]}}))),
        None
    ));
    assert!(matches(
        &record,
        Some(&filter(json!({"k": {"$gt": 9_007_199_254_740_992_u64}}))),
        None
    ));

    let huge = item(json!({"k": u64::MAX}), None);
    assert!(!matches(&huge, Some(&filter(json!({"k": -1}))), None));
    assert!(matches(&huge, Some(&filter(json!({"k": {"$gt": i64::MAX}}))), None));
}

#[test]
fn and_range_matches_only_open_interval() {
    let range = filter(json!({"$and": [{"k": {"$gt": 1}}, {"k": {"$lt": 5}}]}));
    for (value, expected) in [(0, false), (1, false), (2, true), (4, true), (5, false), (9, false)] {
        let record = item(json!({ "k": value }), None);
        assert_eq!(matches(&record, Some(&range), None), expected, "k={value}");
    }
}

#[test]
fn or_requires_at_least_one_branch() {
    let either = filter(json!({"$or": [{"color": "red"}, {"size": {"$gte": 10}}]}));
    assert!(matches(&item(json!({"color": "red"}), None), Some(&either), None));
    assert!(matches(&item(json!({"size": 10}), None), Some(&either), None));
    assert!(!matches(&item(json!({"color": "blue", "size": 3}), None), Some(&either), None));

    let empty_or = filter(json!({"$or": []}));
    assert!(!matches(&item(json!({"color": "red"}), None), Some(&empty_or), None));
}

#[test]
fn nested_boolean_trees_are_recursive() {
    let tree = filter(json!({
        "$or": [
            {"$and": [{"a": 1}, {"b": {"$ne": 2}}]},
            {"c": {"$nin": ["x", "y"]}}
        ]
    }));
    assert!(matches(&item(json!({"a": 1, "b": 3, "c": "x"}), None), Some(&tree), None));
    assert!(!matches(&item(json!({"a": 1, "b": 2, "c": "x"}), None), Some(&tree), None));
    assert!(matches(&item(json!({"a": 0, "c": "z"}), None), Some(&tree), None));
}

#[test]
fn multiple_operators_on_one_field_must_all_hold() {
    let bounded = filter(json!({"k": {"$gte": 2, "$lte": 3}}));
    assert!(matches(&item(json!({"k": 2}), None), Some(&bounded), None));
    assert!(matches(&item(json!({"k": 3}), None), Some(&bounded), None));
    assert!(!matches(&item(json!({"k": 4}), None), Some(&bounded), None));
}

#[test]
fn ordering_operators_require_numeric_comparands() {
    let record = item(json!({"name": "b", "flag": true}), None);
    assert!(!matches(&record, Some(&filter(json!({"name": {"$gt": "a"}}))), None));
    assert!(!matches(&record, Some(&filter(json!({"flag": {"$lt": 2}}))), None));
    assert!(!matches(&record, Some(&filter(json!({"missing": {"$lte": 2}}))), None));
}

#[test]
fn missing_fields_behave_as_null() {
    let record = item(json!({"other": 1}), None);
    assert!(matches(&record, Some(&filter(json!({"k": null}))), None));
    assert!(matches(&record, Some(&filter(json!({"k": {"$ne": 1}}))), None));
    assert!(!matches(&record, Some(&filter(json!({"k": {"$in": [1, 2]}}))), None));
    assert!(matches(&record, Some(&filter(json!({"k": {"$nin": [1, 2]}}))), None));

    let without_metadata = item(Value::Null, None);
    assert!(!matches(&without_metadata, Some(&filter(json!({"k": 1}))), None));
    assert!(matches(&without_metadata, Some(&filter(json!({"k": {"$ne": 1}}))), None));
}

#[test]
fn document_filters_check_substrings() {
    let record = item(json!({}), Some("the quick brown fox"));
    assert!(matches(&record, None, Some(&DocumentFilter::contains("quick"))));
    assert!(!matches(&record, None, Some(&DocumentFilter::contains("slow"))));
    assert!(matches(&record, None, Some(&DocumentFilter::not_contains("slow"))));
    assert!(!matches(&record, None, Some(&DocumentFilter::not_contains("fox"))));

    let without_document = item(json!({}), None);
    assert!(matches(&without_document, None, Some(&DocumentFilter::contains(""))));
    assert!(!matches(&without_document, None, Some(&DocumentFilter::contains("a"))));
    assert!(matches(&without_document, None, Some(&DocumentFilter::not_contains("a"))));
}

#[test]
fn metadata_and_document_filters_combine() {
    let record = item(json!({"lang": "en"}), Some("hello world"));
    let lang = filter(json!({"lang": "en"}));
    assert!(matches(&record, Some(&lang), Some(&DocumentFilter::contains("world"))));
    assert!(!matches(&record, Some(&lang), Some(&DocumentFilter::contains("monde"))));
}

#[test]
fn parse_rejects_malformed_filters() {
    for bad in [
        json!([1, 2]),
        json!({"$xor": []}),
        json!({"$and": {"a": 1}}),
        json!({"k": {"$between": [1, 2]}}),
        json!({"k": {"$in": 3}}),
        json!({"bad name": 1}),
    ] {
        let error = WhereFilter::from_json(&bad).expect_err("filter must be rejected");
        assert!(error.is_validation(), "unexpected error for {bad}: {error}");
    }

    for bad in [json!("text"), json!({"$contains": 3}), json!({"$regex": "a"})] {
        let error = DocumentFilter::from_json(&bad).expect_err("filter must be rejected");
        assert!(error.is_validation(), "unexpected error for {bad}: {error}");
    }
}

#[test]
fn filters_deserialize_from_json() {
    let parsed: WhereFilter =
        serde_json::from_value(json!({"k": {"$gt": 1}})).expect("must deserialize");
    assert_eq!(
        parsed,
        WhereFilter::field("k", vec![Condition::Gt(json!(1))])
    );

    let document: DocumentFilter =
        serde_json::from_value(json!({"$not_contains": "spam"})).expect("must deserialize");
    assert_eq!(document, DocumentFilter::not_contains("spam"));
    assert_eq!(
        serde_json::to_value(&document).expect("must serialize"),
        json!({"$not_contains": "spam"})
    );
}

#[test]
fn programmatic_filters_are_validated() {
    WhereFilter::and(vec![WhereFilter::eq("ok", 1)])
        .validate()
        .expect("valid tree");
    let error = WhereFilter::or(vec![WhereFilter::eq("not ok", 1)])
        .validate()
        .expect_err("bad field name");
    assert!(error.is_validation());
}
