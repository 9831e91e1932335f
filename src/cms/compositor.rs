//! Applies [`QueryOptions`] ordering and filters to a store query.

use std::sync::LazyLock;

use serde_json::Value;

use crate::cms::error::{invalid_order_by_child, CmsError, CmsResult};
use crate::cms::options::{FilterKey, QueryOptions};
use crate::database::{DatabaseError, DatabaseQuery};
use crate::logger::Logger;

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@cms/query"));

/// Immutable query builder the compositor drives. Every call consumes the
/// builder and returns a new one.
pub trait QueryBuilder: Sized {
    type Error;

    fn order_by_child(self, path: &str) -> Result<Self, Self::Error>;
    fn order_by_value(self) -> Result<Self, Self::Error>;
    fn order_by_key(self) -> Result<Self, Self::Error>;
    fn limit_to_first(self, limit: u32) -> Result<Self, Self::Error>;
    fn limit_to_last(self, limit: u32) -> Result<Self, Self::Error>;
    fn start_at(self, value: Value) -> Result<Self, Self::Error>;
    fn end_at(self, value: Value) -> Result<Self, Self::Error>;
    fn equal_to(self, value: Value) -> Result<Self, Self::Error>;
}

impl QueryBuilder for DatabaseQuery {
    type Error = DatabaseError;

    fn order_by_child(self, path: &str) -> Result<Self, Self::Error> {
        DatabaseQuery::order_by_child(self, path)
    }

    fn order_by_value(self) -> Result<Self, Self::Error> {
        DatabaseQuery::order_by_value(self)
    }

    fn order_by_key(self) -> Result<Self, Self::Error> {
        DatabaseQuery::order_by_key(self)
    }

    fn limit_to_first(self, limit: u32) -> Result<Self, Self::Error> {
        DatabaseQuery::limit_to_first(self, limit)
    }

    fn limit_to_last(self, limit: u32) -> Result<Self, Self::Error> {
        DatabaseQuery::limit_to_last(self, limit)
    }

    fn start_at(self, value: Value) -> Result<Self, Self::Error> {
        DatabaseQuery::start_at(self, value)
    }

    fn end_at(self, value: Value) -> Result<Self, Self::Error> {
        DatabaseQuery::end_at(self, value)
    }

    fn equal_to(self, value: Value) -> Result<Self, Self::Error> {
        DatabaseQuery::equal_to(self, value)
    }
}

/// Applies at most one ordering: child, then value, then key. Without any
/// ordering directive the query is returned as is.
pub fn apply_order_by<Q>(query: Q, options: &QueryOptions) -> CmsResult<Q>
where
    Q: QueryBuilder,
    CmsError: From<Q::Error>,
{
    if let Some(child) = &options.order_by_child {
        return match child {
            Value::String(path) if !path.is_empty() => {
                LOGGER.debug(format!("orderByChild({path})"));
                Ok(query.order_by_child(path)?)
            }
            other => Err(invalid_order_by_child(other)),
        };
    }
    if options.order_by_value {
        LOGGER.debug("orderByValue()");
        return Ok(query.order_by_value()?);
    }
    if options.order_by_key {
        LOGGER.debug("orderByKey()");
        return Ok(query.order_by_key()?);
    }
    Ok(query)
}

/// Applies every present filter in [`FilterKey::ORDER`]. Without any filter
/// the query is returned as is.
pub fn apply_filters<Q>(query: Q, options: &QueryOptions) -> CmsResult<Q>
where
    Q: QueryBuilder,
    CmsError: From<Q::Error>,
{
    if !options.has_filters() {
        return Ok(query);
    }

    FilterKey::ORDER.iter().try_fold(query, |query, key| -> CmsResult<Q> {
        let next = match key {
            FilterKey::LimitToFirst => match options.limit_to_first {
                Some(limit) => query.limit_to_first(limit)?,
                None => return Ok(query),
            },
            FilterKey::LimitToLast => match options.limit_to_last {
                Some(limit) => query.limit_to_last(limit)?,
                None => return Ok(query),
            },
            FilterKey::StartAt => match &options.start_at {
                Some(value) => query.start_at(value.clone())?,
                None => return Ok(query),
            },
            FilterKey::EndAt => match &options.end_at {
                Some(value) => query.end_at(value.clone())?,
                None => return Ok(query),
            },
            FilterKey::EqualTo => match &options.equal_to {
                Some(value) => query.equal_to(value.clone())?,
                None => return Ok(query),
            },
        };
        LOGGER.debug(format!("applied {}", key.as_str()));
        Ok(next)
    })
}

/// Ordering followed by filters.
pub fn compose_query<Q>(query: Q, options: &QueryOptions) -> CmsResult<Q>
where
    Q: QueryBuilder,
    CmsError: From<Q::Error>,
{
    apply_filters(apply_order_by(query, options)?, options)
}
