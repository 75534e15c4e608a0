//! Field-name reconciliation at the API boundary.
//!
//! Document-store backends identify records with `_id` and camelCase
//! timestamps; relational backends use `id` and snake_case columns. Both
//! are folded into one canonical shape before deserialization:
//!
//! - `_id` and `id` both present, holding the same string (`_id` wins)
//! - `userId`, `createdAt`, `updatedAt`, `dueDate` in camelCase
//! - numeric identifiers rendered as strings
//! - `null` members dropped, so absent and null read the same

use serde_json::{Map, Value};

/// camelCase name and its snake_case synonym
const SYNONYMS: &[(&str, &str)] = &[
    ("userId", "user_id"),
    ("createdAt", "created_at"),
    ("updatedAt", "updated_at"),
    ("dueDate", "due_date"),
];

/// Normalize one record. Non-objects are returned unchanged.
pub fn normalize_record(value: Value) -> Value {
    let mut obj = match value {
        Value::Object(obj) => obj,
        other => return other,
    };

    obj.retain(|_, v| !v.is_null());

    let id = first_present(&obj, "_id", "id").map(id_string);
    if let Some(id) = id {
        obj.insert("_id".to_string(), Value::String(id.clone()));
        obj.insert("id".to_string(), Value::String(id));
    }

    for &(camel, snake) in SYNONYMS {
        let snake_value = obj.remove(snake);
        if !obj.get(camel).is_some_and(is_present) {
            if let Some(v) = snake_value.filter(is_present) {
                obj.insert(camel.to_string(), v);
            }
        }
    }

    if let Some(user_id) = obj.get("userId").cloned() {
        obj.insert("userId".to_string(), Value::String(id_string(user_id)));
    }

    Value::Object(obj)
}

/// Normalize every element of an array, or a single record otherwise.
pub fn normalize_all(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_record).collect()),
        other => normalize_record(other),
    }
}

/// Identifier of a record under either convention, or an empty string.
pub fn get_id(value: &Value) -> String {
    match value {
        Value::Object(obj) => first_present(obj, "_id", "id")
            .map(id_string)
            .unwrap_or_default(),
        _ => String::new(),
    }
}

pub fn has_id(value: &Value) -> bool {
    !get_id(value).is_empty()
}

fn first_present(obj: &Map<String, Value>, primary: &str, fallback: &str) -> Option<Value> {
    obj.get(primary)
        .filter(|v| is_present(v))
        .or_else(|| obj.get(fallback).filter(|v| is_present(v)))
        .cloned()
}

/// Mirrors the falsy check of the backends' JSON clients: null, empty
/// strings and zero do not count as a value.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::Bool(b) => *b,
        _ => true,
    }
}

fn id_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_store_record() {
        let record = normalize_record(json!({
            "_id": "65f0a1",
            "title": "Write report",
            "userId": "u1",
            "createdAt": "2024-03-01T10:00:00Z",
        }));

        assert_eq!(record["_id"], "65f0a1");
        assert_eq!(record["id"], "65f0a1");
        assert_eq!(record["userId"], "u1");
        assert_eq!(record["createdAt"], "2024-03-01T10:00:00Z");
    }

    #[test]
    fn test_relational_record() {
        let record = normalize_record(json!({
            "id": 17,
            "title": "Write report",
            "user_id": 4,
            "created_at": "2024-03-01T10:00:00Z",
            "updated_at": "2024-03-02T10:00:00Z",
            "due_date": "2024-03-10",
        }));

        assert_eq!(record["_id"], "17");
        assert_eq!(record["id"], "17");
        assert_eq!(record["userId"], "4");
        assert_eq!(record["createdAt"], "2024-03-01T10:00:00Z");
        assert_eq!(record["updatedAt"], "2024-03-02T10:00:00Z");
        assert_eq!(record["dueDate"], "2024-03-10");
        assert!(record.get("user_id").is_none());
        assert!(record.get("created_at").is_none());
    }

    #[test]
    fn test_underscore_id_takes_precedence() {
        let record = normalize_record(json!({"_id": "mongo", "id": "pg"}));
        assert_eq!(record["_id"], "mongo");
        assert_eq!(record["id"], "mongo");

        let record = normalize_record(json!({"_id": "", "id": "pg"}));
        assert_eq!(record["_id"], "pg");
    }

    #[test]
    fn test_camel_case_wins_over_snake_case() {
        let record = normalize_record(json!({
            "createdAt": "camel",
            "created_at": "snake",
        }));
        assert_eq!(record["createdAt"], "camel");
        assert!(record.get("created_at").is_none());
    }

    #[test]
    fn test_nulls_are_dropped() {
        let record = normalize_record(json!({"_id": "1", "description": null, "tags": null}));
        assert!(record.get("description").is_none());
        assert!(record.get("tags").is_none());
    }

    #[test]
    fn test_non_objects_pass_through() {
        assert_eq!(normalize_record(json!("text")), json!("text"));
        assert_eq!(
            normalize_all(json!([{"id": 1}, {"_id": "a"}])),
            json!([{"_id": "1", "id": "1"}, {"_id": "a", "id": "a"}])
        );
    }

    #[test]
    fn test_get_id_and_has_id() {
        assert_eq!(get_id(&json!({"_id": "a", "id": "b"})), "a");
        assert_eq!(get_id(&json!({"id": 9})), "9");
        assert_eq!(get_id(&json!({"title": "x"})), "");
        assert_eq!(get_id(&json!(null)), "");
        assert!(has_id(&json!({"id": "b"})));
        assert!(!has_id(&json!({})));
    }
}
