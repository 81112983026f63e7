//! The persistence collaborator an entity binds to.
//!
//! `Model` answers naming, identity and timestamp questions and hands out a
//! [`Query`] handle for the actual reads and writes. Everything behind that
//! handle (SQL generation, connections, transactions) is the implementor's
//! business.

use std::fmt;

use sqlentity_core::naming::snake_case;
use sqlentity_core::{DateTime, Record, Result, Value};

use crate::entity::Entity;

/// Lifecycle events fired around persistence operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    BeforeWrite,
    AfterWrite,
    BeforeInsert,
    AfterInsert,
    BeforeUpdate,
    AfterUpdate,
    BeforeDelete,
    AfterDelete,
}

impl Event {
    pub const fn name(&self) -> &'static str {
        match self {
            Event::BeforeWrite => "before_write",
            Event::AfterWrite => "after_write",
            Event::BeforeInsert => "before_insert",
            Event::AfterInsert => "after_insert",
            Event::BeforeUpdate => "before_update",
            Event::AfterUpdate => "after_update",
            Event::BeforeDelete => "before_delete",
            Event::AfterDelete => "after_delete",
        }
    }

    /// `Before*` events may abort the operation that fired them.
    pub const fn can_abort(&self) -> bool {
        matches!(
            self,
            Event::BeforeWrite | Event::BeforeInsert | Event::BeforeUpdate | Event::BeforeDelete
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A filter applied to a [`Query`].
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `column = value`
    Eq(String, Value),
    /// `column IN (values)`
    In(String, Vec<Value>),
}

impl Condition {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Eq(column.into(), value.into())
    }

    pub fn column(&self) -> &str {
        match self {
            Condition::Eq(column, _) | Condition::In(column, _) => column,
        }
    }

    /// Whether `row` satisfies this condition.
    pub fn matches(&self, row: &Record) -> bool {
        match self {
            Condition::Eq(column, value) => row.get(column) == Some(value),
            Condition::In(column, values) => row.get(column).is_some_and(|v| values.contains(v)),
        }
    }
}

/// A query-builder handle scoped to one model's table.
///
/// Filters and field restrictions accumulate; the terminal operations run
/// against whatever has been accumulated.
pub trait Query {
    /// Add a filter.
    fn filter(&mut self, condition: Condition);

    /// Restrict writes to `fields`.
    fn fields(&mut self, fields: &[String]);

    /// Insert a row. With `return_id` the new primary key is returned,
    /// otherwise the number of inserted rows.
    fn insert(&mut self, payload: Record, return_id: bool) -> Result<Value>;

    /// Update filtered rows; returns the number of affected rows.
    fn update(&mut self, payload: Record) -> Result<u64>;

    /// Select filtered rows, additionally restricted to `keys` when not empty.
    fn select(&mut self, keys: &[Value]) -> Result<Vec<Record>>;

    /// Delete filtered rows; returns the number of removed rows.
    fn delete(&mut self) -> Result<u64>;
}

/// Current local time in the default date-time layout.
pub fn default_timestamp() -> Value {
    Value::Text(
        chrono::Local::now()
            .format(DateTime::DEFAULT_FORMAT)
            .to_string(),
    )
}

/// The persistence object an entity type is bound to.
pub trait Model: Send + Sync {
    /// The bound storage table.
    fn table(&self) -> &str;

    /// Normalize an incoming field name (used when field names are not strict).
    fn real_field_name(&self, name: &str) -> String {
        snake_case(name)
    }

    /// Primary-key field name.
    fn pk(&self) -> &str {
        "id"
    }

    /// Whether the key is generated by [`Model::auto_write_id`] before insert.
    fn is_auto_write_id(&self) -> bool {
        false
    }

    /// Generate a key for a new row.
    fn auto_write_id(&self) -> Value {
        Value::Null
    }

    /// Auto-timestamp fields: every such field on insert, only the update
    /// field when `update_only` is set.
    fn date_time_fields(&self, update_only: bool) -> Vec<String> {
        let _ = update_only;
        Vec::new()
    }

    /// The value written into auto-timestamp fields.
    fn timestamp(&self) -> Value {
        default_timestamp()
    }

    /// Output layout for date-time value objects.
    fn date_format(&self) -> Option<&str> {
        None
    }

    /// Model-level lifecycle hook; `false` aborts a `Before*` operation.
    fn trigger(&self, event: Event, entity: &Entity) -> bool {
        let _ = (event, entity);
        true
    }

    /// A fresh query handle.
    fn db(&self) -> Box<dyn Query + '_>;

    /// Introspected `(column, column type)` pairs of `table`.
    fn fields_type(&self, table: &str) -> Result<Vec<(String, String)>> {
        let _ = table;
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlentity_core::record;

    #[test]
    fn test_event_abort_capability() {
        assert!(Event::BeforeWrite.can_abort());
        assert!(Event::BeforeDelete.can_abort());
        assert!(!Event::AfterInsert.can_abort());
        assert_eq!(Event::BeforeUpdate.to_string(), "before_update");
    }

    #[test]
    fn test_condition_matches() {
        let row = record! { "id" => 3_i64, "name" => "Ann" };
        assert!(Condition::eq("id", 3_i64).matches(&row));
        assert!(!Condition::eq("id", 4_i64).matches(&row));
        assert!(Condition::In("id".into(), vec![Value::Int(1), Value::Int(3)]).matches(&row));
        assert!(!Condition::eq("missing", Value::Null).matches(&row));
    }

    #[test]
    fn test_default_timestamp_layout() {
        let Value::Text(ts) = default_timestamp() else {
            panic!("timestamp is text");
        };
        assert!(chrono::NaiveDateTime::parse_from_str(&ts, DateTime::DEFAULT_FORMAT).is_ok());
    }
}
