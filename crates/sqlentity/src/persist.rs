//! Persistence: insert or update, lifecycle events, cascades and batch
//! destroy.
//!
//! Hook order within one `save` is fixed:
//! `BeforeWrite -> BeforeInsert|BeforeUpdate -> write -> AfterInsert|AfterUpdate
//! -> AfterWrite -> cascades`. Cascades run after the parent row is written and
//! never undo it.

use std::fmt;
use std::sync::Arc;

use sqlentity_core::{Error, Record, Result, Value, find_relationship};

use crate::change::{DiffOptions, diff};
use crate::entity::{Attr, Entity, EntityState, EntityType};
use crate::model::{Condition, Event, Model, Query};

/// Which rows a batch [`Entity::destroy`] removes.
pub enum Criteria {
    /// One primary-key value.
    Key(Value),
    /// A list of primary-key values.
    Keys(Vec<Value>),
    /// Column equality filters.
    Columns(Record),
    /// Arbitrary filters applied to the query handle.
    Query(Box<dyn FnOnce(&mut dyn Query)>),
}

impl Criteria {
    pub fn query<F>(build: F) -> Self
    where
        F: FnOnce(&mut dyn Query) + 'static,
    {
        Criteria::Query(Box::new(build))
    }

    /// Empty criteria are rejected; the literal integer zero is a valid key.
    pub fn is_usable(&self) -> bool {
        match self {
            Criteria::Key(key) => !key.is_empty() || *key == Value::Int(0),
            Criteria::Keys(keys) => !keys.is_empty(),
            Criteria::Columns(columns) => !columns.is_empty(),
            Criteria::Query(_) => true,
        }
    }
}

impl fmt::Debug for Criteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criteria::Key(key) => f.debug_tuple("Key").field(key).finish(),
            Criteria::Keys(keys) => f.debug_tuple("Keys").field(keys).finish(),
            Criteria::Columns(columns) => f.debug_tuple("Columns").field(columns).finish(),
            Criteria::Query(_) => f.write_str("Query(..)"),
        }
    }
}

impl Entity {
    /// Construct and save.
    pub fn create(kind: &Arc<EntityType>, model: Arc<dyn Model>, data: Record) -> Result<Self> {
        let mut entity = Self::new(kind, model, data)?;
        entity.save()?;
        Ok(entity)
    }

    /// Delete every row matched by `criteria`, one instance at a time so
    /// delete events and cascades run for each.
    #[tracing::instrument(level = "debug", skip(kind, model), fields(entity = %kind.name()))]
    pub fn destroy(
        kind: &Arc<EntityType>,
        model: Arc<dyn Model>,
        criteria: Criteria,
    ) -> Result<bool> {
        if !criteria.is_usable() {
            tracing::debug!("Destroy criteria empty, nothing removed");
            return Ok(false);
        }

        let rows = {
            let mut db = model.db();
            match criteria {
                Criteria::Key(key) => db.select(&[key])?,
                Criteria::Keys(keys) => db.select(&keys)?,
                Criteria::Columns(columns) => {
                    for (column, value) in columns {
                        db.filter(Condition::Eq(column, value));
                    }
                    db.select(&[])?
                }
                Criteria::Query(build) => {
                    build(db.as_mut());
                    db.select(&[])?
                }
            }
        };

        tracing::info!(rows = rows.len(), "Destroying matched rows");
        for row in rows {
            Self::new(kind, Arc::clone(&model), row)?.delete()?;
        }
        Ok(true)
    }

    /// Bind `data` through [`Entity::set`], then save.
    pub fn save_with(&mut self, data: Record) -> Result<bool> {
        for (name, value) in data {
            if self.kind.is_disused(&self.field_name(&name)) {
                continue;
            }
            self.set(&name, value)?;
        }
        self.save()
    }

    /// Insert or update, then cascade to enrolled relations.
    ///
    /// `Ok(false)` means nothing was written: no data, an empty update diff,
    /// or a `Before*` event aborted.
    #[tracing::instrument(level = "debug", skip(self), fields(entity = %self.kind.name()))]
    pub fn save(&mut self) -> Result<bool> {
        if self.is_virtual {
            tracing::debug!("Virtual entity, save skipped");
            return Ok(true);
        }
        if self.data.is_empty() {
            tracing::debug!("No data to save");
            return Ok(false);
        }
        if !self.fire(Event::BeforeWrite) {
            return Ok(false);
        }

        let columns = self.columns()?;
        let written = if self.key.is_some() {
            self.update_row(columns)?
        } else {
            self.insert_row(columns)?
        };
        if !written {
            return Ok(false);
        }

        self.fire(Event::AfterWrite);
        self.refresh_origin();
        self.accessor_cache.get_mut().clear();
        if self.key.is_some() {
            self.state = EntityState::Persisted;
        } else {
            tracing::warn!("Storage returned no key, entity stays transient");
        }
        self.save_relations()?;
        Ok(true)
    }

    fn insert_row(&mut self, mut payload: Record) -> Result<bool> {
        let model = Arc::clone(&self.model);
        let pk = self.pk.clone();

        let mut generated = Vec::new();
        if model.is_auto_write_id() && payload.get(&pk).is_none_or(Value::is_empty) {
            generated.push(self.generate(&pk, model.auto_write_id(), &mut payload)?);
        }

        if !self.fire(Event::BeforeInsert) {
            return Ok(false);
        }

        for field in model.date_time_fields(false) {
            if self.schema.accepts(&field) && payload.get(&field).is_none_or(Value::is_empty) {
                generated.push(self.generate(&field, model.timestamp(), &mut payload)?);
            }
        }

        let payload = self.mutate(payload)?;
        let known: Vec<String> = if self.schema.is_empty() {
            payload.keys().map(str::to_string).collect()
        } else {
            self.schema.field_names().map(str::to_string).collect()
        };

        tracing::info!(table = model.table(), fields = payload.len(), "Inserting entity");
        let id = {
            let mut db = model.db();
            db.fields(&known);
            db.insert(payload.clone(), true)?
        };
        self.adopt(generated);

        let key = if id.is_empty() {
            payload.get(&pk).filter(|key| !key.is_empty()).cloned()
        } else {
            let key = self.read_value(&pk, id)?;
            self.data.insert(pk.as_str(), Attr::Value(key.clone()));
            Some(key)
        };
        self.key = key;

        self.fire(Event::AfterInsert);
        Ok(true)
    }

    fn update_row(&mut self, columns: Record) -> Result<bool> {
        let model = Arc::clone(&self.model);
        let Some(key) = self.key.clone() else {
            return Ok(false);
        };

        let origin = self.written_origin()?;
        let mut payload = diff(
            &columns,
            &origin,
            DiffOptions {
                pk: &self.pk,
                readonly: &self.kind.readonly,
                force: self.force,
            },
        );
        if payload.is_empty() {
            tracing::debug!("No changes to update");
            return Ok(false);
        }

        if !self.fire(Event::BeforeUpdate) {
            return Ok(false);
        }

        let mut generated = Vec::new();
        if let Some(field) = model.date_time_fields(true).into_iter().next() {
            if self.schema.accepts(&field) && !payload.contains(&field) {
                generated.push(self.generate(&field, model.timestamp(), &mut payload)?);
            }
        }

        let payload = self.mutate(payload)?;
        tracing::info!(
            table = model.table(),
            fields = ?payload.keys().collect::<Vec<_>>(),
            "Updating entity"
        );
        {
            let mut db = model.db();
            db.filter(Condition::Eq(self.pk.clone(), key));
            db.update(payload)?;
        }
        self.adopt(generated);

        self.fire(Event::AfterUpdate);
        Ok(true)
    }

    /// Delete this entity's row, then enrolled relations.
    ///
    /// Without identity there is nothing to delete and `Ok(true)` is returned.
    #[tracing::instrument(level = "debug", skip(self), fields(entity = %self.kind.name()))]
    pub fn delete(&mut self) -> Result<bool> {
        if self.is_virtual {
            tracing::debug!("Virtual entity, delete skipped");
            return Ok(true);
        }
        let Some(key) = self.key.clone() else {
            tracing::debug!("Entity has no identity, nothing to delete");
            return Ok(true);
        };

        if !self.fire(Event::BeforeDelete) {
            return Ok(false);
        }

        let model = Arc::clone(&self.model);
        tracing::info!(table = model.table(), key = ?key, "Deleting entity");
        let removed = {
            let mut db = model.db();
            db.filter(Condition::Eq(self.pk.clone(), key));
            db.delete()?
        };
        if removed > 0 {
            self.fire(Event::AfterDelete);
        }

        self.delete_relations()?;

        self.data.clear();
        self.origin.clear();
        self.accessor_cache.get_mut().clear();
        self.key = None;
        self.state = EntityState::Deleted;
        Ok(true)
    }

    /// Run listeners and the model trigger for `event`. Only `Before*`
    /// events can return `false`.
    fn fire(&self, event: Event) -> bool {
        let listeners = self
            .kind
            .listeners
            .iter()
            .filter(|(on, _)| *on == event)
            .all(|(_, listener)| listener(self));
        let proceed = listeners && self.model.trigger(event, self);

        if proceed || !event.can_abort() {
            return true;
        }
        tracing::info!(event = %event, "Operation aborted by event listener");
        false
    }

    /// Put a generated value into the payload. The read form is returned and
    /// only reaches working data through [`Entity::adopt`] once storage has
    /// accepted the row.
    fn generate(&self, field: &str, raw: Value, payload: &mut Record) -> Result<(String, Value)> {
        let value = self.read_value(field, raw)?;
        payload.insert(field, self.write_value(field, value.clone())?);
        Ok((field.to_string(), value))
    }

    fn adopt(&mut self, generated: Vec<(String, Value)>) {
        for (field, value) in generated {
            self.data.insert(field, Attr::Value(value));
        }
    }

    /// Apply mutators to a written payload.
    fn mutate(&self, mut payload: Record) -> Result<Record> {
        if self.kind.mutators.is_empty() {
            return Ok(payload);
        }
        let snapshot = self.values();
        for (name, value) in payload.iter_mut() {
            if let Some(mutator) = self.kind.mutators.get(name) {
                *value = mutator(value, &snapshot)?;
            }
        }
        Ok(payload)
    }

    fn save_relations(&mut self) -> Result<()> {
        let kind = Arc::clone(&self.kind);
        let key = self.key.clone();
        for name in self.together.clone() {
            let Some(Attr::One(child)) = self.data.get_mut(&name) else {
                continue;
            };
            let Some(foreign_key) = find_relationship(&kind.relations, &name)
                .filter(|info| info.cascades_on_save())
                .and_then(|info| info.foreign_key.as_deref())
            else {
                tracing::warn!(relation = %name, "Enrolled relation has no foreign key");
                return Err(Error::MissingRelationKey(name));
            };

            if let Some(key) = &key {
                child.set(foreign_key, key.clone())?;
            }
            let saved = child.save()?;
            tracing::debug!(relation = %name, saved, "Cascade save");
        }
        Ok(())
    }

    fn delete_relations(&mut self) -> Result<()> {
        for name in self.together.clone() {
            match self.data.get_mut(&name) {
                Some(Attr::One(child)) => {
                    child.delete()?;
                }
                Some(Attr::Many(children)) => {
                    for child in children.iter_mut() {
                        child.delete()?;
                    }
                }
                _ => continue,
            }
            tracing::debug!(relation = %name, "Cascade delete");
        }
        Ok(())
    }
}
