use serde_json::{Map, Value};

use crate::cms::error::{invalid_options, CmsResult};

/// Filter options in the order they are applied to a query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterKey {
    LimitToFirst,
    LimitToLast,
    StartAt,
    EndAt,
    EqualTo,
}

impl FilterKey {
    pub const ORDER: [FilterKey; 5] = [
        FilterKey::LimitToFirst,
        FilterKey::LimitToLast,
        FilterKey::StartAt,
        FilterKey::EndAt,
        FilterKey::EqualTo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKey::LimitToFirst => "limitToFirst",
            FilterKey::LimitToLast => "limitToLast",
            FilterKey::StartAt => "startAt",
            FilterKey::EndAt => "endAt",
            FilterKey::EqualTo => "equalTo",
        }
    }
}

/// Ordering, filtering and projection requested for a read or subscription.
///
/// At most one ordering is applied, with `order_by_child` taking precedence
/// over `order_by_value`, which takes precedence over `order_by_key`.
/// `order_by_child` is kept as a raw JSON value so that malformed directives
/// coming from [`QueryOptions::from_value`] can be reported when the query is
/// built.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryOptions {
    pub order_by_child: Option<Value>,
    pub order_by_value: bool,
    pub order_by_key: bool,
    pub limit_to_first: Option<u32>,
    pub limit_to_last: Option<u32>,
    pub start_at: Option<Value>,
    pub end_at: Option<Value>,
    pub equal_to: Option<Value>,
    pub fields: Option<Vec<String>>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads options from a JSON object using the camelCase option names
    /// (`orderByChild`, `limitToFirst`, `fields`, ...). Unknown keys are
    /// ignored; `null` and a missing object both mean "no options".
    pub fn from_value(value: &Value) -> CmsResult<Self> {
        let map = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map,
            other => {
                return Err(invalid_options(
                    "options",
                    format!("expected an object, got {other}"),
                ))
            }
        };

        Ok(Self {
            order_by_child: map.get("orderByChild").filter(|v| !v.is_null()).cloned(),
            order_by_value: map.get("orderByValue").is_some_and(is_truthy),
            order_by_key: map.get("orderByKey").is_some_and(is_truthy),
            limit_to_first: read_limit(map, FilterKey::LimitToFirst)?,
            limit_to_last: read_limit(map, FilterKey::LimitToLast)?,
            start_at: map.get(FilterKey::StartAt.as_str()).cloned(),
            end_at: map.get(FilterKey::EndAt.as_str()).cloned(),
            equal_to: map.get(FilterKey::EqualTo.as_str()).cloned(),
            fields: map.get("fields").and_then(read_fields),
        })
    }

    pub fn order_by_child(mut self, path: impl Into<String>) -> Self {
        self.order_by_child = Some(Value::String(path.into()));
        self
    }

    pub fn order_by_value(mut self) -> Self {
        self.order_by_value = true;
        self
    }

    pub fn order_by_key(mut self) -> Self {
        self.order_by_key = true;
        self
    }

    pub fn limit_to_first(mut self, limit: u32) -> Self {
        self.limit_to_first = Some(limit);
        self
    }

    pub fn limit_to_last(mut self, limit: u32) -> Self {
        self.limit_to_last = Some(limit);
        self
    }

    pub fn start_at(mut self, value: impl Into<Value>) -> Self {
        self.start_at = Some(value.into());
        self
    }

    pub fn end_at(mut self, value: impl Into<Value>) -> Self {
        self.end_at = Some(value.into());
        self
    }

    pub fn equal_to(mut self, value: impl Into<Value>) -> Self {
        self.equal_to = Some(value.into());
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn has_ordering(&self) -> bool {
        self.order_by_child.is_some() || self.order_by_value || self.order_by_key
    }

    pub fn has_filters(&self) -> bool {
        FilterKey::ORDER.iter().any(|key| self.has_filter(*key))
    }

    pub fn has_filter(&self, key: FilterKey) -> bool {
        match key {
            FilterKey::LimitToFirst => self.limit_to_first.is_some(),
            FilterKey::LimitToLast => self.limit_to_last.is_some(),
            FilterKey::StartAt => self.start_at.is_some(),
            FilterKey::EndAt => self.end_at.is_some(),
            FilterKey::EqualTo => self.equal_to.is_some(),
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn read_limit(map: &Map<String, Value>, key: FilterKey) -> CmsResult<Option<u32>> {
    match map.get(key.as_str()) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|limit| u32::try_from(limit).ok())
            .map(Some)
            .ok_or_else(|| {
                invalid_options(
                    key.as_str(),
                    format!("expected a non-negative integer, got {value}"),
                )
            }),
    }
}

fn read_fields(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|field| field.as_str().map(str::to_string))
        .collect()
}
