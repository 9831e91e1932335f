use serde_json::{Map, Value};

/// Keeps only `fields` on every entry of a result set.
///
/// Arrays are projected element by element, objects one level down (each
/// child is an entry). Anything else is returned unchanged, as are entries
/// that are not objects. Fields missing on an entry are left out rather than
/// filled with `null`.
pub fn pluck_fields(result: &Value, fields: &[String]) -> Value {
    match result {
        Value::Array(entries) => Value::Array(
            entries
                .iter()
                .map(|entry| pluck_entry(entry, fields))
                .collect(),
        ),
        Value::Object(entries) => Value::Object(
            entries
                .iter()
                .map(|(key, entry)| (key.clone(), pluck_entry(entry, fields)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Keeps only `fields` on a single entry.
pub fn pluck_entry(entry: &Value, fields: &[String]) -> Value {
    match entry {
        Value::Object(map) => Value::Object(
            fields
                .iter()
                .filter_map(|field| map.get(field).map(|value| (field.clone(), value.clone())))
                .collect::<Map<String, Value>>(),
        ),
        other => other.clone(),
    }
}

/// [`pluck_fields`] when `fields` is set, identity otherwise.
pub fn project(result: &Value, fields: Option<&[String]>) -> Value {
    match fields {
        Some(fields) => pluck_fields(result, fields),
        None => result.clone(),
    }
}
