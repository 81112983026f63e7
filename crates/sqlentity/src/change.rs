//! Change tracking: the minimal update payload.
//!
//! Both sides are compared in their written (storable) form, so a value
//! object and the scalar it was read from compare equal, and coercions done
//! on read never show up as changes.

use sqlentity_core::{Record, Result, Value};

use crate::entity::Entity;

/// Which fields of `working` go into an update.
#[derive(Debug, Clone, Copy)]
pub struct DiffOptions<'a> {
    /// Primary-key field; never part of an update.
    pub pk: &'a str,
    /// Fields stripped even when changed.
    pub readonly: &'a [String],
    /// Include every field without comparing.
    pub force: bool,
}

/// Fields of `working` that are new or differ from `origin`.
///
/// Both records hold written values and no relations.
pub fn diff(working: &Record, origin: &Record, options: DiffOptions<'_>) -> Record {
    working
        .iter()
        .filter(|(name, _)| *name != options.pk)
        .filter(|(name, _)| !options.readonly.iter().any(|r| r == *name))
        .filter(|(name, value)| options.force || origin.get(name) != Some(*value))
        .map(|(name, value)| (name, value.clone()))
        .collect()
}

impl Entity {
    /// Whether a field differs from its origin value.
    pub fn is_dirty(&self, name: &str) -> Result<bool> {
        let current = self.get_written(name)?;
        let origin = match self.origin.get(name) {
            Some(value) => Some(self.write_value(name, value.clone())?),
            None => None,
        };
        Ok(current != origin)
    }

    /// Fields that would be written by the next update, in written form.
    pub fn changes(&self) -> Result<Record> {
        let working = self.columns()?;
        let origin = self.written_origin()?;
        Ok(diff(
            &working,
            &origin,
            DiffOptions {
                pk: &self.pk,
                readonly: &self.kind.readonly,
                force: self.force,
            },
        ))
    }

    fn get_written(&self, name: &str) -> Result<Option<Value>> {
        match self.data.get(name).and_then(|attr| attr.as_value()) {
            Some(value) => self.write_value(name, value.clone()).map(Some),
            None => Ok(None),
        }
    }

    /// Written values of the persistable fields: schema fields that are not
    /// relations or deprecated.
    pub(crate) fn columns(&self) -> Result<Record> {
        let mut columns = Record::new();
        for (name, attr) in self.data.iter() {
            let Some(value) = attr.as_value() else {
                continue;
            };
            if !self.schema.accepts(name)
                || self.kind.is_relation(name)
                || self.kind.is_disused(name)
            {
                continue;
            }
            columns.insert(name, self.write_value(name, value.clone())?);
        }
        Ok(columns)
    }

    pub(crate) fn written_origin(&self) -> Result<Record> {
        let mut origin = Record::new();
        for (name, value) in self.origin.iter() {
            origin.insert(name, self.write_value(name, value.clone())?);
        }
        Ok(origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;
    use crate::memory::MemoryModel;
    use sqlentity_core::record;
    use std::sync::Arc;

    fn options<'a>(readonly: &'a [String], force: bool) -> DiffOptions<'a> {
        DiffOptions {
            pk: "id",
            readonly,
            force,
        }
    }

    #[test]
    fn test_diff_keeps_only_changed_and_new_fields() {
        let origin = record! { "id" => 1_i64, "a" => 1_i64, "b" => "x" };
        let working = record! { "id" => 1_i64, "a" => 1_i64, "b" => "y", "c" => true };
        let payload = diff(&working, &origin, options(&[], false));
        assert_eq!(payload, record! { "b" => "y", "c" => true });
    }

    #[test]
    fn test_diff_force_takes_everything_but_pk() {
        let origin = record! { "id" => 1_i64, "a" => 1_i64 };
        let working = origin.clone();
        let payload = diff(&working, &origin, options(&[], true));
        assert_eq!(payload, record! { "a" => 1_i64 });
    }

    #[test]
    fn test_diff_strips_readonly() {
        let readonly = vec!["a".to_string()];
        let origin = record! { "a" => 1_i64, "b" => 1_i64 };
        let working = record! { "a" => 2_i64, "b" => 2_i64 };
        let payload = diff(&working, &origin, options(&readonly, false));
        assert_eq!(payload, record! { "b" => 2_i64 });
    }

    #[test]
    fn test_empty_values_are_compared_strictly() {
        let origin = record! { "a" => "", "b" => Value::Null };
        let working = record! { "a" => Value::Null, "b" => Value::Null };
        let payload = diff(&working, &origin, options(&[], false));
        assert_eq!(payload, record! { "a" => Value::Null });
    }

    #[test]
    fn test_value_objects_compare_in_written_form() {
        let kind = EntityType::new("event")
            .field("id", "int")
            .field("at", "datetime")
            .build();
        let mut event = Entity::new(
            &kind,
            Arc::new(MemoryModel::new("events")),
            record! { "id" => 1_i64, "at" => "2024-01-01 10:00:00" },
        )
        .unwrap();
        assert!(event.changes().unwrap().is_empty());

        // Same instant in another layout is not a change.
        event.set("at", "2024-01-01T10:00:00").unwrap();
        assert!(!event.is_dirty("at").unwrap());
        assert!(event.changes().unwrap().is_empty());

        event.set("at", "2024-01-01 11:00:00").unwrap();
        assert!(event.is_dirty("at").unwrap());
        assert_eq!(
            event.changes().unwrap(),
            record! { "at" => "2024-01-01 11:00:00" }
        );
    }
}
