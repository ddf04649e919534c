//! Pass-through filter matching.
//!
//! A filter maps a field path to either an expected value or an operator
//! object such as `{"$gt": 3}`. Dotted paths reach into nested documents.
//! Identity fields are handled by the provider before matching.

use std::cmp::Ordering;

use serde_json::Value;

use crate::document::{Document, ID_FIELD, INTERNAL_ID_FIELD};

/// Returns true if every clause in `filter` matches `doc`.
pub fn matches(filter: &Document, doc: &Document) -> bool {
    filter
        .iter()
        .filter(|(path, _)| path.as_str() != ID_FIELD && path.as_str() != INTERNAL_ID_FIELD)
        .all(|(path, expected)| clause_matches(lookup(doc, path), expected))
}

fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn is_operator_object(value: &Value) -> bool {
    match value {
        Value::Object(map) => !map.is_empty() && map.keys().all(|k| k.starts_with('$')),
        _ => false,
    }
}

fn clause_matches(actual: Option<&Value>, expected: &Value) -> bool {
    if !is_operator_object(expected) {
        return equals(actual, expected);
    }

    let Value::Object(ops) = expected else {
        return false;
    };

    ops.iter().all(|(op, operand)| match op.as_str() {
        "$eq" => equals(actual, operand),
        "$ne" => !equals(actual, operand),
        "$gt" => compare(actual, operand) == Some(Ordering::Greater),
        "$gte" => matches!(
            compare(actual, operand),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        "$lt" => compare(actual, operand) == Some(Ordering::Less),
        "$lte" => matches!(
            compare(actual, operand),
            Some(Ordering::Less | Ordering::Equal)
        ),
        "$in" => match operand {
            Value::Array(options) => options.iter().any(|o| equals(actual, o)),
            _ => false,
        },
        "$nin" => match operand {
            Value::Array(options) => !options.iter().any(|o| equals(actual, o)),
            _ => false,
        },
        "$exists" => actual.is_some() == operand.as_bool().unwrap_or(true),
        other => {
            tracing::debug!("Unsupported filter operator {}", other);
            false
        }
    })
}

/// Equality with the document-store convention that a scalar matches an
/// array containing it, and `null` matches a missing field.
fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(value) if value == expected => true,
        Some(Value::Number(a)) => match expected {
            Value::Number(b) => a.as_f64() == b.as_f64(),
            _ => false,
        },
        Some(Value::Array(items)) => !expected.is_array() && items.iter().any(|i| i == expected),
        Some(_) => false,
    }
}

fn compare(actual: Option<&Value>, operand: &Value) -> Option<Ordering> {
    match (actual?, operand) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::doc;
    use serde_json::json;

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(matches(&Document::new(), &doc(json!({"a": 1}))));
    }

    #[test]
    fn test_equality() {
        let d = doc(json!({"email": "a@x.com", "level": "admin"}));
        assert!(matches(&doc(json!({"email": "a@x.com"})), &d));
        assert!(!matches(&doc(json!({"email": "b@x.com"})), &d));
        assert!(!matches(
            &doc(json!({"email": "a@x.com", "level": "viewer"})),
            &d
        ));
    }

    #[test]
    fn test_null_matches_missing() {
        let d = doc(json!({"name": "Ann"}));
        assert!(matches(&doc(json!({"token": null})), &d));
        assert!(!matches(&doc(json!({"token": "t"})), &d));
    }

    #[test]
    fn test_numbers_compare_across_representations() {
        let d = doc(json!({"timeout": 10}));
        assert!(matches(&doc(json!({"timeout": 10.0})), &d));
        assert!(matches(&doc(json!({"timeout": {"$gt": 9, "$lte": 10}})), &d));
        assert!(!matches(&doc(json!({"timeout": {"$lt": 10}})), &d));
    }

    #[test]
    fn test_nested_path() {
        let d = doc(json!({"patient": {"name": "Bo", "tags": ["x", "y"]}}));
        assert!(matches(&doc(json!({"patient.name": "Bo"})), &d));
        assert!(matches(&doc(json!({"patient.tags": "y"})), &d));
        assert!(matches(&doc(json!({"patient.tags.0": "x"})), &d));
        assert!(!matches(&doc(json!({"patient.age": {"$exists": true}})), &d));
    }

    #[test]
    fn test_in_and_nin() {
        let d = doc(json!({"level": "regular"}));
        assert!(matches(
            &doc(json!({"level": {"$in": ["regular", "admin"]}})),
            &d
        ));
        assert!(!matches(&doc(json!({"level": {"$nin": ["regular"]}})), &d));
    }

    #[test]
    fn test_nested_document_equality_is_literal() {
        let d = doc(json!({"meta": {"a": 1}}));
        assert!(matches(&doc(json!({"meta": {"a": 1}})), &d));
        assert!(!matches(&doc(json!({"meta": {"a": 2}})), &d));
    }

    #[test]
    fn test_unknown_operator_never_matches() {
        let d = doc(json!({"a": 1}));
        assert!(!matches(&doc(json!({"a": {"$regex": "1"}})), &d));
    }

    #[test]
    fn test_identity_clauses_are_ignored() {
        let d = doc(json!({"a": 1}));
        assert!(matches(&doc(json!({"id": "whatever", "a": 1})), &d));
    }
}
