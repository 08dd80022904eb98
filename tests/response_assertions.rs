use indexmap::IndexMap;
use shapify::{Entry, Expected, Finding, match_response};

// End-to-end runs over raw response bodies, the way a test suite would use
// the matcher right after an HTTP call.

#[test]
fn test_scalar_id_body() {
    let report = match_response(&Expected::ScalarId(7), br#"{"id": 7}"#).unwrap();
    assert!(report.ok());

    let report = match_response(&Expected::ScalarId(8), br#"{"id": 7}"#).unwrap();
    assert!(!report.ok());
    assert_eq!(report.findings().len(), 1);
    let rendered = report.render();
    assert!(rendered.contains("expected 8"));
    assert!(rendered.contains("actual 7"));
}

#[test]
fn test_scalar_id64_body() {
    let report = match_response(&Expected::ScalarId64(9), br#"{"id": "9"}"#).unwrap();
    assert!(report.ok());
}

#[test]
fn test_id_set_body_ignores_order() {
    let body = br#"[{"id": 1}, {"id": 2}]"#;
    let report = match_response(&Expected::IdSet(vec![2, 1]), body).unwrap();
    assert!(report.ok());
}

#[test]
fn test_id_set64_body() {
    let body = br#"[{"id": "3"}, {"id": "4"}]"#;
    assert!(
        match_response(&Expected::IdSet64(vec![4, 3]), body)
            .unwrap()
            .ok()
    );
    assert!(
        !match_response(&Expected::IdSet64(vec![4, 5]), body)
            .unwrap()
            .ok()
    );
}

#[test]
fn test_filtered_id_set64_body() {
    let body = br#"{"data": [{"id": "1"}, {"id": "2"}], "count": 2}"#;
    let report = match_response(&Expected::FilteredIdSet64(vec![1, 2]), body).unwrap();
    assert!(report.ok());

    let report = match_response(&Expected::FilteredIdSet64(vec![1, 3]), body).unwrap();
    assert!(!report.ok());
    let rendered = report.render();
    assert!(rendered.contains("data"));
    assert!(rendered.contains("id 3"));
}

#[test]
fn test_filtered_id_set_plain_body() {
    let body = br#"{"data": [{"id": 10}, {"id": 11}], "count": 40}"#;
    let report = match_response(&Expected::FilteredIdSet(vec![11, 10]), body).unwrap();
    assert!(report.ok());
}

#[test]
fn test_mixed_map_body() {
    let body = br#"{"owner": {"id": "5"}, "tags": [{"id": "1"}, {"id": "2"}]}"#;
    let expected = Expected::MixedMap(IndexMap::from([
        ("owner".to_string(), Entry::Id(5)),
        ("tags".to_string(), Entry::Ids(vec![1, 2])),
    ]));
    assert!(match_response(&expected, body).unwrap().ok());

    // A wrong tag set stays scoped to `tags`; `owner` produces no finding.
    let expected = Expected::MixedMap(IndexMap::from([
        ("owner".to_string(), Entry::Id(5)),
        ("tags".to_string(), Entry::Ids(vec![1, 3])),
    ]));
    let report = match_response(&expected, body).unwrap();
    assert_eq!(report.findings().len(), 1);
    assert!(report.render().contains("tags"));
    assert!(!report.render().contains("owner"));
}

#[test]
fn test_mixed_map_accumulates_findings_across_keys() {
    let body = br#"{"owner": {"id": "6"}, "tags": "oops", "parent": []}"#;
    let expected = Expected::MixedMap(IndexMap::from([
        ("owner".to_string(), Entry::Id(5)),
        ("tags".to_string(), Entry::Ids(vec![1])),
        ("parent".to_string(), Entry::Null),
    ]));
    let report = match_response(&expected, body).unwrap();
    assert_eq!(report.findings().len(), 3);
    assert!(matches!(report.findings()[0], Finding::ValueMismatch { .. }));
    assert!(matches!(report.findings()[1], Finding::Shape { .. }));
    assert!(matches!(report.findings()[2], Finding::ValueMismatch { .. }));
}

#[test]
fn test_malformed_body_is_fatal() {
    let error = match_response(&Expected::ScalarId(7), br#"{"id": 7,"#).unwrap_err();
    assert!(error.to_string().contains("JSON syntax error"));
    assert_eq!(error.line, 1);
}

#[test]
fn test_report_renders_deterministically() {
    let body = br#"[{"id": 1}, {"id": 2}, {"id": 3}]"#;
    let expected = Expected::IdSet(vec![4, 5, 6]);
    let first = match_response(&expected, body).unwrap().render();
    let second = match_response(&expected, body).unwrap().render();
    assert_eq!(first, second);
}
