use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::database::error::{internal_error, invalid_argument, DatabaseResult};

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub(crate) enum QueryIndex {
    #[default]
    Priority,
    Key,
    Value,
    Child(Vec<String>),
}

/// Ordering, bounds and limit carried by a [`DatabaseQuery`](crate::database::DatabaseQuery).
///
/// Backends receive it with every read: the REST backend serialises it with
/// [`QueryParams::to_rest_params`], the in-memory backend runs
/// [`QueryParams::evaluate`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryParams {
    pub(crate) index: QueryIndex,
    pub(crate) start: Option<Value>,
    pub(crate) end: Option<Value>,
    pub(crate) limit: Option<QueryLimit>,
    pub(crate) order_by_called: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum QueryLimit {
    First(u32),
    Last(u32),
}

impl QueryParams {
    pub(crate) fn set_index(&mut self, index: QueryIndex) -> DatabaseResult<()> {
        if self.order_by_called {
            return Err(invalid_argument("orderBy has already been specified"));
        }
        self.index = index;
        self.order_by_called = true;
        Ok(())
    }

    pub(crate) fn set_start(&mut self, value: Value) -> DatabaseResult<()> {
        if self.start.is_some() {
            return Err(invalid_argument("startAt has already been specified"));
        }
        self.start = Some(value);
        Ok(())
    }

    pub(crate) fn set_end(&mut self, value: Value) -> DatabaseResult<()> {
        if self.end.is_some() {
            return Err(invalid_argument("endAt has already been specified"));
        }
        self.end = Some(value);
        Ok(())
    }

    pub(crate) fn set_limit(&mut self, limit: QueryLimit) -> DatabaseResult<()> {
        if self.limit.is_some() {
            return Err(invalid_argument("limit has already been specified"));
        }
        self.limit = Some(limit);
        Ok(())
    }

    pub fn is_default(&self) -> bool {
        !self.order_by_called
            && matches!(self.index, QueryIndex::Priority)
            && self.start.is_none()
            && self.end.is_none()
            && self.limit.is_none()
    }

    pub fn to_rest_params(&self) -> DatabaseResult<Vec<(String, String)>> {
        let mut params = Vec::new();

        if self.is_default() {
            return Ok(params);
        }

        let order_by = match &self.index {
            QueryIndex::Priority => "$priority".to_string(),
            QueryIndex::Key => "$key".to_string(),
            QueryIndex::Value => "$value".to_string(),
            QueryIndex::Child(segments) => segments.join("/"),
        };
        params.push(("orderBy".to_string(), encode_json(&Value::String(order_by))?));

        if let Some(value) = &self.start {
            params.push(("startAt".to_string(), encode_json(value)?));
        }

        if let Some(value) = &self.end {
            params.push(("endAt".to_string(), encode_json(value)?));
        }

        match self.limit {
            Some(QueryLimit::First(count)) => {
                params.push(("limitToFirst".to_string(), count.to_string()));
            }
            Some(QueryLimit::Last(count)) => {
                params.push(("limitToLast".to_string(), count.to_string()));
            }
            None => {}
        }

        Ok(params)
    }

    /// Applies ordering, bounds and limits to a stored value the way the
    /// server would. Scalars pass through untouched; an empty result is `null`.
    pub fn evaluate(&self, value: &Value) -> Value {
        if self.is_default() {
            return value.clone();
        }

        let mut children: Vec<(String, Value)> = match value {
            Value::Object(map) => map
                .iter()
                .map(|(key, child)| (key.clone(), child.clone()))
                .collect(),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .filter(|(_, child)| !child.is_null())
                .map(|(index, child)| (index.to_string(), child.clone()))
                .collect(),
            other => return other.clone(),
        };

        children.sort_by(|left, right| self.compare_children(left, right));

        children.retain(|(key, child)| {
            let after_start = self
                .start
                .as_ref()
                .map(|bound| self.compare_to_bound(key, child, bound) != Ordering::Less)
                .unwrap_or(true);
            let before_end = self
                .end
                .as_ref()
                .map(|bound| self.compare_to_bound(key, child, bound) != Ordering::Greater)
                .unwrap_or(true);
            after_start && before_end
        });

        match self.limit {
            Some(QueryLimit::First(count)) => children.truncate(count as usize),
            Some(QueryLimit::Last(count)) => {
                let skip = children.len().saturating_sub(count as usize);
                children = children.split_off(skip);
            }
            None => {}
        }

        if children.is_empty() {
            return Value::Null;
        }
        Value::Object(children.into_iter().collect::<Map<String, Value>>())
    }

    fn index_value<'a>(&self, child: &'a Value) -> Option<&'a Value> {
        match &self.index {
            QueryIndex::Priority | QueryIndex::Key => None,
            QueryIndex::Value => Some(child),
            QueryIndex::Child(segments) => segments
                .iter()
                .try_fold(child, |current, segment| current.get(segment.as_str())),
        }
    }

    fn compare_children(&self, left: &(String, Value), right: &(String, Value)) -> Ordering {
        let by_index = match &self.index {
            QueryIndex::Key => Ordering::Equal,
            _ => compare_values(
                self.index_value(&left.1).unwrap_or(&Value::Null),
                self.index_value(&right.1).unwrap_or(&Value::Null),
            ),
        };
        by_index.then_with(|| compare_keys(&left.0, &right.0))
    }

    fn compare_to_bound(&self, key: &str, child: &Value, bound: &Value) -> Ordering {
        match &self.index {
            QueryIndex::Key => match bound {
                Value::String(name) => compare_keys(key, name),
                other => compare_keys(key, &other.to_string()),
            },
            _ => compare_values(self.index_value(child).unwrap_or(&Value::Null), bound),
        }
    }
}

fn encode_json(value: &Value) -> DatabaseResult<String> {
    serde_json::to_string(value)
        .map_err(|err| internal_error(format!("Failed to encode query parameter: {err}")))
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(false) => 1,
        Value::Bool(true) => 2,
        Value::Number(_) => 3,
        Value::String(_) => 4,
        Value::Array(_) | Value::Object(_) => 5,
    }
}

/// Orders values as the server does: null, false, true, numbers, strings, objects.
pub(crate) fn compare_values(left: &Value, right: &Value) -> Ordering {
    let rank = type_rank(left).cmp(&type_rank(right));
    if rank != Ordering::Equal {
        return rank;
    }
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64().unwrap_or(0.0);
            let b = b.as_f64().unwrap_or(0.0);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => Ordering::Equal,
    }
}

/// Keys that are canonical 32-bit integers sort first, numerically; the rest
/// sort lexicographically.
pub(crate) fn compare_keys(left: &str, right: &str) -> Ordering {
    match (int_key(left), int_key(right)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => left.cmp(right),
    }
}

fn int_key(key: &str) -> Option<i32> {
    let parsed: i32 = key.parse().ok()?;
    (parsed.to_string() == key).then_some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn child_index(path: &str) -> QueryIndex {
        QueryIndex::Child(path.split('/').map(str::to_string).collect())
    }

    #[test]
    fn default_params_pass_value_through() {
        let params = QueryParams::default();
        let value = json!({ "b": 1, "a": 2 });
        assert_eq!(params.evaluate(&value), value);
        assert!(params.to_rest_params().unwrap().is_empty());
    }

    #[test]
    fn second_order_by_is_rejected() {
        let mut params = QueryParams::default();
        params.set_index(QueryIndex::Key).unwrap();
        let err = params.set_index(QueryIndex::Value).unwrap_err();
        assert_eq!(err.code_str(), "database/invalid-argument");
    }

    #[test]
    fn order_by_child_with_limit_to_last() {
        let mut params = QueryParams::default();
        params.set_index(child_index("price")).unwrap();
        params.set_limit(QueryLimit::Last(2)).unwrap();

        let value = json!({
            "a": { "price": 30 },
            "b": { "price": 10 },
            "c": { "price": 20 },
        });
        assert_eq!(
            params.evaluate(&value),
            json!({ "a": { "price": 30 }, "c": { "price": 20 } })
        );
    }

    #[test]
    fn equal_bounds_select_matching_children() {
        let mut params = QueryParams::default();
        params.set_index(child_index("meta/kind")).unwrap();
        params.set_start(json!("shower")).unwrap();
        params.set_end(json!("shower")).unwrap();

        let value = json!({
            "1": { "meta": { "kind": "shower" } },
            "2": { "meta": { "kind": "bath" } },
            "3": { "meta": {} },
        });
        assert_eq!(
            params.evaluate(&value),
            json!({ "1": { "meta": { "kind": "shower" } } })
        );
    }

    #[test]
    fn key_index_orders_integer_keys_first() {
        assert_eq!(compare_keys("2", "10"), Ordering::Less);
        assert_eq!(compare_keys("10", "a"), Ordering::Less);
        assert_eq!(compare_keys("007", "7"), Ordering::Greater);

        let mut params = QueryParams::default();
        params.set_index(QueryIndex::Key).unwrap();
        params.set_limit(QueryLimit::First(1)).unwrap();
        assert_eq!(
            params.evaluate(&json!({ "b": true, "10": true, "2": true })),
            json!({ "2": true })
        );
    }

    #[test]
    fn value_ordering_ranks_types() {
        assert_eq!(compare_values(&json!(null), &json!(false)), Ordering::Less);
        assert_eq!(compare_values(&json!(true), &json!(0)), Ordering::Less);
        assert_eq!(compare_values(&json!(5), &json!("5")), Ordering::Less);
        assert_eq!(compare_values(&json!("z"), &json!({})), Ordering::Less);
    }

    #[test]
    fn empty_result_is_null() {
        let mut params = QueryParams::default();
        params.set_index(QueryIndex::Value).unwrap();
        params.set_start(json!(100)).unwrap();
        assert_eq!(params.evaluate(&json!({ "a": 1 })), Value::Null);
    }

    #[test]
    fn rest_params_encode_bounds_as_json() {
        let mut params = QueryParams::default();
        params.set_index(child_index("score")).unwrap();
        params.set_start(json!(100)).unwrap();
        params.set_end(json!("z")).unwrap();
        params.set_limit(QueryLimit::First(5)).unwrap();

        let encoded = params.to_rest_params().unwrap();
        assert_eq!(
            encoded,
            vec![
                ("orderBy".to_string(), "\"score\"".to_string()),
                ("startAt".to_string(), "100".to_string()),
                ("endAt".to_string(), "\"z\"".to_string()),
                ("limitToFirst".to_string(), "5".to_string()),
            ]
        );
    }
}
