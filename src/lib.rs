use indexmap::IndexMap;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// Structural kind of a decoded JSON node, computed once instead of being
// re-inferred ad hoc at every comparison site.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Null,
    Bool,
    Number,
    String,
    List,
    Map,
}

pub fn kind_of(value: &Value) -> Kind {
    match value {
        Value::Null => Kind::Null,
        Value::Bool(_) => Kind::Bool,
        Value::Number(_) => Kind::Number,
        Value::String(_) => Kind::String,
        Value::Array(_) => Kind::List,
        Value::Object(_) => Kind::Map,
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Null => "null",
            Kind::Bool => "boolean",
            Kind::Number => "number",
            Kind::String => "string",
            Kind::List => "list",
            Kind::Map => "map",
        };
        f.write_str(name)
    }
}

// The expected-result descriptor. Each variant fixes both the response shape
// (bare object, bare list, paginated envelope, heterogeneous map) and the
// wire form of the `id` fields it contains: the `64` variants expect ids
// string-encoded on the wire, the plain variants expect bare numbers.
#[derive(Debug, Clone, PartialEq)]
pub enum Expected {
    ScalarId(i64),
    ScalarId64(i64),
    IdSet(Vec<i64>),
    IdSet64(Vec<i64>),
    FilteredIdSet(Vec<i64>),
    FilteredIdSet64(Vec<i64>),
    MixedMap(IndexMap<String, Entry>),
}

// One value slot of a heterogeneous map expectation. Ids are always
// string-encoded there, matching how related-object summaries are serialized.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Null,
    Id(i64),
    Ids(Vec<i64>),
}

// Findings and reports

#[derive(Serialize, Debug, Clone, PartialEq)]
pub enum Finding {
    Shape {
        path: String,
        expected: String, // what the expectation required at this position
        actual: String,   // the structural kind (or decode failure) found
    },
    TypeMismatch {
        path: String,
        expected: String,
        actual: String,
    },
    KeyNotFound {
        path: String,
    },
    CountMismatch {
        path: String,
        expected: usize,
        actual: usize,
        detail: String, // both collections, for debugging
    },
    ValueMismatch {
        path: String,
        expected: String,
        actual: String,
    },
}

fn loc(path: &str) -> &str {
    if path.is_empty() { "response" } else { path }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::Shape {
                path,
                expected,
                actual,
            } => write!(
                f,
                "shape mismatch at `{}`: expected {}, found {}",
                loc(path),
                expected,
                actual
            ),
            Finding::TypeMismatch {
                path,
                expected,
                actual,
            } => write!(
                f,
                "type mismatch at `{}`: expected {}, found {}",
                loc(path),
                expected,
                actual
            ),
            Finding::KeyNotFound { path } => {
                write!(f, "required key `{}` not found", loc(path))
            }
            Finding::CountMismatch {
                path,
                expected,
                actual,
                detail,
            } => write!(
                f,
                "count mismatch at `{}`: expected {} items, found {} ({})",
                loc(path),
                expected,
                actual,
                detail
            ),
            Finding::ValueMismatch {
                path,
                expected,
                actual,
            } => write!(
                f,
                "value mismatch at `{}`: expected {}, actual {}",
                loc(path),
                expected,
                actual
            ),
        }
    }
}

// Accumulated comparison outcome. Append-only; findings keep insertion order
// so rendered output is reproducible across runs.
#[derive(Serialize, Debug, Default)]
pub struct Report {
    findings: Vec<Finding>,
}

// The one capability the surrounding test framework must provide: a sink for
// failure annotations. Implemented for Vec<String> out of the box.
pub trait FailureSink {
    fn failure(&mut self, message: &str);
}

impl FailureSink for Vec<String> {
    fn failure(&mut self, message: &str) {
        self.push(message.to_string());
    }
}

impl Report {
    pub fn new() -> Self {
        Self {
            findings: Vec::new(),
        }
    }

    fn push(&mut self, finding: Finding) {
        self.findings.push(finding);
    }

    pub fn ok(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn render(&self) -> String {
        self.findings
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn emit(&self, sink: &mut dyn FailureSink) {
        for finding in &self.findings {
            sink.failure(&finding.to_string());
        }
    }

    /// Panics with the full rendered report unless the comparison passed.
    /// This is the adapter for plain `#[test]` functions.
    #[track_caller]
    pub fn assert_ok(&self) {
        if !self.ok() {
            panic!("response shape assertion failed:\n{}", self.render());
        }
    }
}

// Fatal decode failure. The response body never became a value, so no
// partial report exists.
#[derive(Debug)]
pub struct DecodeError {
    pub detail: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.detail)
    }
}

impl std::error::Error for DecodeError {}

fn describe_syntax_error(error: &serde_json::Error) -> String {
    let message = error.to_string();
    let line = error.line();
    let column = error.column();

    if message.contains("EOF while parsing") {
        format!(
            "JSON syntax error at line {line}, column {column}: unexpected end of input. The body appears to be truncated."
        )
    } else if message.contains("trailing comma") {
        format!(
            "JSON syntax error at line {line}, column {column}: trailing comma after the last element."
        )
    } else if message.contains("control character") {
        format!(
            "JSON syntax error at line {line}, column {column}: unescaped control character in a string."
        )
    } else if message.contains("expected value") {
        format!("JSON syntax error at line {line}, column {column}: expected a JSON value here.")
    } else {
        format!("JSON syntax error at line {line}, column {column}: {message}")
    }
}

pub fn decode_body(body: &[u8]) -> Result<Value, DecodeError> {
    serde_json::from_slice(body).map_err(|error| DecodeError {
        line: error.line(),
        column: error.column(),
        detail: describe_syntax_error(&error),
    })
}

// The validation-error tree broke its contract: every leaf must be a string
// message. This is a collaborator bug, not a system-under-test discrepancy,
// so it fails the whole diff instead of becoming a finding.
#[derive(Debug)]
pub struct TreeShapeError {
    pub path: String,
    pub found: Kind,
}

impl fmt::Display for TreeShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "validation tree holds a non-string leaf at `{}`: found {}",
            loc(&self.path),
            self.found
        )
    }
}

impl std::error::Error for TreeShapeError {}

// Shape matching

#[derive(Debug, Clone, Copy)]
enum Wire {
    Plain, // `id` is a bare JSON number
    Str,   // `id` is a string-encoded integer
}

pub fn match_response(expected: &Expected, body: &[u8]) -> Result<Report, DecodeError> {
    let value = decode_body(body)?;
    Ok(match_value(expected, &value))
}

pub fn match_value(expected: &Expected, value: &Value) -> Report {
    let mut report = Report::new();
    match expected {
        Expected::ScalarId(want) => compare_scalar(*want, Wire::Plain, value, "", &mut report),
        Expected::ScalarId64(want) => compare_scalar(*want, Wire::Str, value, "", &mut report),
        Expected::IdSet(want) => {
            if let Some(ids) = collect_ids(value, Wire::Plain, "", &mut report) {
                compare_id_sets("", want, &ids, &mut report);
            }
        }
        Expected::IdSet64(want) => {
            if let Some(ids) = collect_ids(value, Wire::Str, "", &mut report) {
                compare_id_sets("", want, &ids, &mut report);
            }
        }
        Expected::FilteredIdSet(want) => match_page(want, Wire::Plain, value, &mut report),
        Expected::FilteredIdSet64(want) => match_page(want, Wire::Str, value, &mut report),
        Expected::MixedMap(entries) => match_mixed_map(entries, value, &mut report),
    }
    report
}

fn join(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{path}.{segment}")
    }
}

fn compare_scalar(want: i64, wire: Wire, value: &Value, path: &str, report: &mut Report) {
    if let Some(got) = extract_id(value, wire, path, report) {
        if got != want {
            report.push(Finding::ValueMismatch {
                path: join(path, "id"),
                expected: want.to_string(),
                actual: got.to_string(),
            });
        }
    }
}

fn extract_id(value: &Value, wire: Wire, path: &str, report: &mut Report) -> Option<i64> {
    let map = match value {
        Value::Object(map) => map,
        other => {
            report.push(Finding::Shape {
                path: path.to_string(),
                expected: "an object carrying an `id` field".to_string(),
                actual: kind_of(other).to_string(),
            });
            return None;
        }
    };
    let id = match map.get("id") {
        Some(id) => id,
        None => {
            report.push(Finding::KeyNotFound {
                path: join(path, "id"),
            });
            return None;
        }
    };
    match (wire, id) {
        (Wire::Plain, Value::Number(number)) => match number.as_i64() {
            Some(got) => Some(got),
            None => {
                report.push(Finding::TypeMismatch {
                    path: join(path, "id"),
                    expected: "a 64-bit integer".to_string(),
                    actual: number.to_string(),
                });
                None
            }
        },
        (Wire::Str, Value::String(raw)) => match raw.parse::<i64>() {
            Ok(got) => Some(got),
            Err(_) => {
                report.push(Finding::TypeMismatch {
                    path: join(path, "id"),
                    expected: "a string-encoded integer".to_string(),
                    actual: format!("\"{raw}\""),
                });
                None
            }
        },
        (Wire::Plain, other) => {
            report.push(Finding::TypeMismatch {
                path: join(path, "id"),
                expected: "an integer".to_string(),
                actual: kind_of(other).to_string(),
            });
            None
        }
        (Wire::Str, other) => {
            report.push(Finding::TypeMismatch {
                path: join(path, "id"),
                expected: "a string-encoded integer".to_string(),
                actual: kind_of(other).to_string(),
            });
            None
        }
    }
}

// Returns None when any element failed to yield an id; those failures are
// already on the report, and a set comparison over a partial collection
// would only add noise.
fn collect_ids(value: &Value, wire: Wire, path: &str, report: &mut Report) -> Option<Vec<i64>> {
    let items = match value {
        Value::Array(items) => items,
        other => {
            report.push(Finding::Shape {
                path: path.to_string(),
                expected: "a list of objects carrying `id` fields".to_string(),
                actual: kind_of(other).to_string(),
            });
            return None;
        }
    };
    let mut ids = Vec::with_capacity(items.len());
    let mut complete = true;
    for (index, item) in items.iter().enumerate() {
        match extract_id(item, wire, &join(path, &index.to_string()), report) {
            Some(id) => ids.push(id),
            None => complete = false,
        }
    }
    complete.then_some(ids)
}

// Order-independent multiset comparison: duplicates in `expected` each
// demand a separate partner in `actual`. Cardinality is checked first and
// short-circuits, since element matching is meaningless when counts differ.
pub fn compare_id_sets(path: &str, expected: &[i64], actual: &[i64], report: &mut Report) {
    if actual.len() != expected.len() {
        report.push(Finding::CountMismatch {
            path: path.to_string(),
            expected: expected.len(),
            actual: actual.len(),
            detail: format!("expected ids {expected:?}, actual ids {actual:?}"),
        });
        return;
    }
    let mut matched = vec![false; actual.len()];
    for &want in expected {
        let slot = actual
            .iter()
            .enumerate()
            .find(|&(index, &got)| !matched[index] && got == want);
        match slot {
            Some((index, _)) => matched[index] = true,
            None => report.push(Finding::ValueMismatch {
                path: path.to_string(),
                expected: format!("id {want} among {expected:?}"),
                actual: format!("{actual:?}"),
            }),
        }
    }
}

// Paginated envelope. `count` must decode but is never validated against
// the data length; filtered endpoints report the unfiltered total there.
#[derive(Deserialize)]
struct Envelope {
    data: Vec<Value>,
    #[allow(dead_code)]
    count: i64,
}

fn match_page(want: &[i64], wire: Wire, value: &Value, report: &mut Report) {
    let envelope: Envelope = match serde_path_to_error::deserialize(value) {
        Ok(envelope) => envelope,
        Err(error) => {
            let path = error.path().to_string();
            report.push(Finding::Shape {
                path: if path == "." { String::new() } else { path },
                expected: "a `{data, count}` envelope".to_string(),
                actual: error.inner().to_string(),
            });
            return;
        }
    };
    let data = Value::Array(envelope.data);
    if let Some(ids) = collect_ids(&data, wire, "data", report) {
        compare_id_sets("data", want, &ids, report);
    }
}

fn match_mixed_map(entries: &IndexMap<String, Entry>, value: &Value, report: &mut Report) {
    let map = match value {
        Value::Object(map) => map,
        other => {
            report.push(Finding::Shape {
                path: String::new(),
                expected: "a map of related objects".to_string(),
                actual: kind_of(other).to_string(),
            });
            return;
        }
    };
    // Key cardinality must match exactly; an extra or missing top-level key
    // means the response schema drifted, so per-key comparison stops here.
    if map.len() != entries.len() {
        let expected_keys: Vec<&str> = entries.keys().map(String::as_str).collect();
        let actual_keys: Vec<&str> = map.keys().map(String::as_str).collect();
        report.push(Finding::CountMismatch {
            path: String::new(),
            expected: entries.len(),
            actual: map.len(),
            detail: format!("expected keys {expected_keys:?}, actual keys {actual_keys:?}"),
        });
        return;
    }
    for (key, entry) in entries {
        let Some(actual) = map.get(key) else {
            report.push(Finding::KeyNotFound { path: key.clone() });
            continue;
        };
        match entry {
            // An expected-null slot rejects any non-null value, including an
            // empty list or object: absence and emptiness are different facts.
            Entry::Null => {
                if !actual.is_null() {
                    report.push(Finding::ValueMismatch {
                        path: key.clone(),
                        expected: "null".to_string(),
                        actual: kind_of(actual).to_string(),
                    });
                }
            }
            Entry::Id(want) => compare_scalar(*want, Wire::Str, actual, key, report),
            Entry::Ids(want) => {
                if let Some(ids) = collect_ids(actual, Wire::Str, key, report) {
                    compare_id_sets(key, want, &ids, report);
                }
            }
        }
    }
}

// Error-tree flattening and pruning

pub type FlatErrorMap = IndexMap<String, String>;

pub fn flatten(tree: &Value) -> Result<FlatErrorMap, TreeShapeError> {
    let mut flat = FlatErrorMap::new();
    flatten_into(tree, "", &mut flat)?;
    Ok(flat)
}

fn flatten_into(node: &Value, path: &str, flat: &mut FlatErrorMap) -> Result<(), TreeShapeError> {
    match node {
        Value::Object(map) => {
            for (key, child) in map {
                flatten_into(child, &join(path, key), flat)?;
            }
            Ok(())
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_into(child, &join(path, &index.to_string()), flat)?;
            }
            Ok(())
        }
        Value::String(message) => {
            flat.insert(path.to_string(), message.clone());
            Ok(())
        }
        other => Err(TreeShapeError {
            path: path.to_string(),
            found: kind_of(other),
        }),
    }
}

/// Deletes the leaf at the dotted `path`, then collapses every ancestor
/// container the deletion left empty. Returns whether a leaf was removed.
///
/// Removing a list element shifts the indices of its later siblings, so
/// pruning every path of a [`flatten`] result empties the tree only when
/// the paths are pruned in reverse flatten order (map-only trees empty in
/// any order).
pub fn prune(tree: &mut Value, path: &str) -> bool {
    let segments: Vec<&str> = path.split('.').collect();
    let mut removed = false;
    prune_at(tree, &segments, &mut removed);
    removed
}

// Returns whether `node` ended up empty, so the parent level can drop it.
fn prune_at(node: &mut Value, segments: &[&str], removed: &mut bool) -> bool {
    match node {
        Value::Object(map) => {
            let key = segments[0];
            if segments.len() == 1 {
                *removed |= map.shift_remove(key).is_some();
            } else if let Some(child) = map.get_mut(key) {
                if prune_at(child, &segments[1..], removed) {
                    map.shift_remove(key);
                }
            }
            map.is_empty()
        }
        Value::Array(items) => {
            let Ok(index) = segments[0].parse::<usize>() else {
                return false;
            };
            if index < items.len() {
                if segments.len() == 1 {
                    items.remove(index);
                    *removed = true;
                } else if prune_at(&mut items[index], &segments[1..], removed) {
                    items.remove(index);
                }
            }
            items.is_empty()
        }
        _ => false,
    }
}

// Error-tree diffing

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Mismatch {
    pub expected: String,
    pub actual: String,
}

// Three-way outcome of comparing a validation-error tree against an
// expected path-to-message table. Messages compare by exact string equality;
// a right message at a wrong path is one missing plus one unexpected entry,
// never a "moved" entry.
#[derive(Serialize, Debug, Default)]
pub struct ErrorDiff {
    pub mismatched: IndexMap<String, Mismatch>,
    pub missing_expected: IndexMap<String, String>,
    pub unexpected_actual: IndexMap<String, String>,
}

impl ErrorDiff {
    pub fn is_clean(&self) -> bool {
        self.mismatched.is_empty()
            && self.missing_expected.is_empty()
            && self.unexpected_actual.is_empty()
    }

    pub fn into_report(self) -> Report {
        let mut report = Report::new();
        for (path, entry) in self.mismatched {
            report.push(Finding::ValueMismatch {
                path,
                expected: format!("\"{}\"", entry.expected),
                actual: format!("\"{}\"", entry.actual),
            });
        }
        for (path, expected) in self.missing_expected {
            report.push(Finding::ValueMismatch {
                path,
                expected: format!("\"{expected}\""),
                actual: "no error recorded".to_string(),
            });
        }
        for (path, actual) in self.unexpected_actual {
            report.push(Finding::ValueMismatch {
                path,
                expected: "no error expected".to_string(),
                actual: format!("\"{actual}\""),
            });
        }
        report
    }
}

pub fn diff_error_tree(tree: &Value, expected: &FlatErrorMap) -> Result<ErrorDiff, TreeShapeError> {
    let mut flat = flatten(tree)?;
    let mut diff = ErrorDiff::default();
    for (path, want) in expected {
        match flat.shift_remove(path) {
            Some(got) if got == *want => {}
            Some(got) => {
                diff.mismatched.insert(
                    path.clone(),
                    Mismatch {
                        expected: want.clone(),
                        actual: got,
                    },
                );
            }
            None => {
                diff.missing_expected.insert(path.clone(), want.clone());
            }
        }
    }
    diff.unexpected_actual = flat;
    Ok(diff)
}

// Incidental test-data helper. The generator is an explicit argument so
// parallel test cases stay deterministic under their own seeds.
pub fn random_string<R: Rng>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| char::from(rng.sample(Alphanumeric)))
        .collect()
}
