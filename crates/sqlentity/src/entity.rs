//! Entity types and entity instances.
//!
//! An [`EntityType`] is registered once per kind of domain object: its
//! declared fields, relations, hooks and default view configuration. Each
//! [`Entity`] owns its working data, the origin snapshot the change tracker
//! diffs against, and its memoized accessor output.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use sqlentity::prelude::*;
//!
//! let users = EntityType::new("user")
//!     .field("id", "int")
//!     .field("name", "string")
//!     .field("age", "int")
//!     .build();
//! let model = Arc::new(MemoryModel::new("users"));
//!
//! let mut ann = Entity::new(&users, model, record! { "name" => "Ann", "age" => "30" })?;
//! assert_eq!(ann.get("age")?, Value::Int(30));
//! assert!(ann.save()?);
//! assert_eq!(ann.key(), Some(&Value::Int(1)));
//! # Ok::<(), sqlentity::Error>(())
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use sqlentity_core::{
    Error, FieldDef, FieldType, FromValue, Record, RelationshipInfo, RelationshipKind, Result,
    Schema, SchemaCache, TransformContext, TypeRegistry, Value, find_relationship,
};

use crate::model::{Event, Model};
use crate::view::ViewConfig;

/// Accessor or mutator hook: `(value, working data) -> value`.
pub type FieldHook = Arc<dyn Fn(&Value, &Record) -> Result<Value> + Send + Sync>;

/// Lifecycle listener; `false` aborts a `Before*` operation.
pub type Listener = Arc<dyn Fn(&Entity) -> bool + Send + Sync>;

/// Per-type registration: schema sources, relations, hooks and defaults.
pub struct EntityType {
    pub(crate) name: String,
    pub(crate) pk: Option<String>,
    pub(crate) fields: Vec<FieldDef>,
    pub(crate) overrides: Vec<FieldDef>,
    pub(crate) readonly: Vec<String>,
    pub(crate) disuse: Vec<String>,
    pub(crate) strict: bool,
    pub(crate) relations: Vec<RelationshipInfo>,
    pub(crate) accessors: HashMap<String, FieldHook>,
    pub(crate) mutators: HashMap<String, FieldHook>,
    pub(crate) listeners: Vec<(Event, Listener)>,
    pub(crate) view: ViewConfig,
    pub(crate) virtual_entity: bool,
    pub(crate) types: TypeRegistry,
    schema: SchemaCache,
}

impl EntityType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pk: None,
            fields: Vec::new(),
            overrides: Vec::new(),
            readonly: Vec::new(),
            disuse: Vec::new(),
            strict: true,
            relations: Vec::new(),
            accessors: HashMap::new(),
            mutators: HashMap::new(),
            listeners: Vec::new(),
            view: ViewConfig::default(),
            virtual_entity: false,
            types: TypeRegistry::builtin(),
            schema: SchemaCache::new(),
        }
    }

    /// Primary-key field; defaults to the model's.
    pub fn pk(mut self, name: impl Into<String>) -> Self {
        self.pk = Some(name.into());
        self
    }

    /// Declare a field. Any declared field makes the schema strict.
    pub fn field(mut self, name: impl Into<String>, ty: impl Into<FieldType>) -> Self {
        self.fields.push(FieldDef::new(name, ty));
        self
    }

    /// Type a column of an introspected (dynamic) schema.
    pub fn type_override(mut self, name: impl Into<String>, ty: impl Into<FieldType>) -> Self {
        self.overrides.push(FieldDef::new(name, ty));
        self
    }

    /// Fields never written by an update.
    pub fn readonly<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.readonly.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Deprecated fields, dropped from input and from save payloads.
    pub fn disuse<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disuse.extend(fields.into_iter().map(Into::into));
        self
    }

    /// With `false`, incoming field names go through `Model::real_field_name`.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Declare a one-to-one relation whose entity receives this entity's key
    /// in `foreign_key`.
    pub fn relation(mut self, name: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        self.relations
            .push(RelationshipInfo::new(name).foreign_key(foreign_key));
        self
    }

    /// Declare a one-to-many relation (cascades on delete only).
    pub fn has_many(mut self, name: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        self.relations.push(
            RelationshipInfo::new(name)
                .foreign_key(foreign_key)
                .kind(RelationshipKind::OneToMany),
        );
        self
    }

    pub fn accessor<F>(mut self, field: impl Into<String>, hook: F) -> Self
    where
        F: Fn(&Value, &Record) -> Result<Value> + Send + Sync + 'static,
    {
        self.accessors.insert(field.into(), Arc::new(hook));
        self
    }

    pub fn mutator<F>(mut self, field: impl Into<String>, hook: F) -> Self
    where
        F: Fn(&Value, &Record) -> Result<Value> + Send + Sync + 'static,
    {
        self.mutators.insert(field.into(), Arc::new(hook));
        self
    }

    /// Listen for a lifecycle event.
    pub fn on<F>(mut self, event: Event, listener: F) -> Self
    where
        F: Fn(&Entity) -> bool + Send + Sync + 'static,
    {
        self.listeners.push((event, Arc::new(listener)));
        self
    }

    /// Default view configuration for new instances.
    pub fn view(mut self, view: ViewConfig) -> Self {
        self.view = view;
        self
    }

    /// Instances never touch storage.
    pub fn virtual_entity(mut self) -> Self {
        self.virtual_entity = true;
        self
    }

    /// Replace the custom type registry (the built-ins are not re-added).
    pub fn types(mut self, types: TypeRegistry) -> Self {
        self.types = types;
        self
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn relations(&self) -> &[RelationshipInfo] {
        &self.relations
    }

    /// The resolved schema, introspecting `model` if nothing is declared.
    pub fn schema(&self, model: &dyn Model) -> Arc<Schema> {
        self.schema
            .get_or_resolve(&self.name, &self.fields, &self.overrides, || {
                model.fields_type(model.table())
            })
    }

    pub(crate) fn is_disused(&self, name: &str) -> bool {
        self.disuse.iter().any(|f| f == name)
    }

    pub(crate) fn is_relation(&self, name: &str) -> bool {
        find_relationship(&self.relations, name).is_some()
    }
}

impl fmt::Debug for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityType")
            .field("name", &self.name)
            .field("pk", &self.pk)
            .field("fields", &self.fields)
            .field("relations", &self.relations)
            .field("types", &self.types)
            .finish_non_exhaustive()
    }
}

/// A working-data entry: a field value or related entities.
#[derive(Debug, Clone)]
pub enum Attr {
    Value(Value),
    One(Box<Entity>),
    Many(Vec<Entity>),
}

impl Attr {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Attr::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_relation(&self) -> bool {
        !matches!(self, Attr::Value(_))
    }
}

/// Persistence state of an entity instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    /// No identity yet; `save` inserts.
    Transient,
    /// Has identity; `save` updates.
    Persisted,
    /// Removed from storage; identity cleared.
    Deleted,
    /// Never persisted; `save` and `delete` are no-ops.
    Virtual,
}

/// A domain object bound to a [`Model`].
#[derive(Clone)]
pub struct Entity {
    pub(crate) kind: Arc<EntityType>,
    pub(crate) model: Arc<dyn Model>,
    pub(crate) schema: Arc<Schema>,
    pub(crate) pk: String,
    pub(crate) key: Option<Value>,
    pub(crate) data: Record<Attr>,
    pub(crate) origin: Record,
    pub(crate) accessor_cache: RefCell<HashMap<String, Value>>,
    pub(crate) view: ViewConfig,
    pub(crate) together: Vec<String>,
    pub(crate) force: bool,
    pub(crate) state: EntityState,
    pub(crate) is_virtual: bool,
}

impl Entity {
    /// Bind `data` (raw stored values) to a new instance of `kind`.
    ///
    /// Values of schema fields go through the read transform. Deprecated
    /// fields and, unless the schema is empty, names outside it are dropped.
    /// The result becomes the origin snapshot.
    pub fn new(kind: &Arc<EntityType>, model: Arc<dyn Model>, data: Record) -> Result<Self> {
        let schema = kind.schema(model.as_ref());
        let pk = kind.pk.clone().unwrap_or_else(|| model.pk().to_string());

        let mut entity = Self {
            kind: Arc::clone(kind),
            model,
            schema,
            pk,
            key: None,
            data: Record::new(),
            origin: Record::new(),
            accessor_cache: RefCell::new(HashMap::new()),
            view: kind.view.clone(),
            together: Vec::new(),
            force: false,
            state: EntityState::Transient,
            is_virtual: kind.virtual_entity,
        };

        for (name, raw) in data {
            let name = entity.field_name(&name);
            if entity.kind.is_disused(&name) || !entity.schema.accepts(&name) {
                continue;
            }
            let value = entity.read_value(&name, raw)?;
            entity.data.insert(name, Attr::Value(value));
        }

        entity.refresh_origin();
        entity.key = entity.current_key();
        if entity.key.is_some() {
            entity.state = EntityState::Persisted;
        }
        Ok(entity)
    }

    /// An instance with no data.
    pub fn empty(kind: &Arc<EntityType>, model: Arc<dyn Model>) -> Result<Self> {
        Self::new(kind, model, Record::new())
    }

    pub fn kind(&self) -> &Arc<EntityType> {
        &self.kind
    }

    pub fn model(&self) -> &Arc<dyn Model> {
        &self.model
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Primary-key field name.
    pub fn pk(&self) -> &str {
        &self.pk
    }

    /// The persisted identity, if any.
    pub fn key(&self) -> Option<&Value> {
        self.key.as_ref()
    }

    pub fn state(&self) -> EntityState {
        if self.is_virtual {
            EntityState::Virtual
        } else {
            self.state
        }
    }

    /// No working data.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    pub fn set_virtual(&mut self, is_virtual: bool) -> &mut Self {
        self.is_virtual = is_virtual;
        self
    }

    /// Current working data, relations included.
    pub fn data(&self) -> &Record<Attr> {
        &self.data
    }

    /// Last known persisted values of schema fields.
    pub fn origin(&self) -> &Record {
        &self.origin
    }

    /// Read a field, applying its accessor (memoized) if one is defined.
    pub fn get(&self, name: &str) -> Result<Value> {
        let key = self.data_key(name);
        if let Some(cached) = self.accessor_cache.borrow().get(&key) {
            return Ok(cached.clone());
        }

        let value = self
            .data
            .get(&key)
            .and_then(Attr::as_value)
            .cloned()
            .unwrap_or_default();

        let accessor = self
            .kind
            .accessors
            .get(&key)
            .or_else(|| self.kind.accessors.get(name));
        match accessor {
            Some(accessor) => {
                let value = accessor(&value, &self.values())?;
                self.accessor_cache.borrow_mut().insert(key, value.clone());
                Ok(value)
            }
            None => Ok(value),
        }
    }

    /// Typed read for statically known fields.
    pub fn get_as<T: FromValue>(&self, name: &str) -> Result<T> {
        let value = self.get(name)?;
        T::from_value(&value).ok_or_else(|| Error::TypeMismatch {
            field: name.to_string(),
            expected: T::EXPECTED,
            found: value.type_name(),
        })
    }

    /// Set a field. The value goes through the field's read transform so the
    /// working data stays typed.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<&mut Self> {
        let name = self.field_name(name);
        let value = self.read_value(&name, value.into())?;
        self.data.insert(name, Attr::Value(value));
        self.accessor_cache.get_mut().clear();
        Ok(self)
    }

    pub fn has(&self, name: &str) -> bool {
        self.data.contains(&self.data_key(name))
    }

    pub fn unset(&mut self, name: &str) -> Option<Attr> {
        let key = self.data_key(name);
        self.accessor_cache.get_mut().clear();
        self.data.remove(&key)
    }

    /// Hold a related entity under `name`.
    pub fn set_one(&mut self, name: impl Into<String>, entity: Entity) -> &mut Self {
        self.data.insert(name, Attr::One(Box::new(entity)));
        self.accessor_cache.get_mut().clear();
        self
    }

    /// Hold a collection of related entities under `name`.
    pub fn set_many(&mut self, name: impl Into<String>, entities: Vec<Entity>) -> &mut Self {
        self.data.insert(name, Attr::Many(entities));
        self.accessor_cache.get_mut().clear();
        self
    }

    pub fn relation(&self, name: &str) -> Option<&Entity> {
        match self.data.get(name) {
            Some(Attr::One(entity)) => Some(entity),
            _ => None,
        }
    }

    pub fn relation_mut(&mut self, name: &str) -> Option<&mut Entity> {
        match self.data.get_mut(name) {
            Some(Attr::One(entity)) => Some(entity),
            _ => None,
        }
    }

    pub fn relations_many(&self, name: &str) -> Option<&[Entity]> {
        match self.data.get(name) {
            Some(Attr::Many(entities)) => Some(entities),
            _ => None,
        }
    }

    /// Enroll relations to be saved and deleted with this entity.
    pub fn together(&mut self, relations: &[&str]) -> &mut Self {
        self.together = relations.iter().map(|r| (*r).to_string()).collect();
        self
    }

    /// Bypass the change diff: the next update writes every field.
    pub fn force(&mut self, force: bool) -> &mut Self {
        self.force = force;
        self
    }

    pub(crate) fn ctx<'a>(&'a self, field: &'a str) -> TransformContext<'a> {
        TransformContext::new(&self.kind.name, field).with_date_format(self.model.date_format())
    }

    pub(crate) fn field_name(&self, name: &str) -> String {
        if self.kind.strict {
            name.to_string()
        } else {
            self.model.real_field_name(name)
        }
    }

    /// The working-data key `name` refers to. Relations are held under the
    /// name they were given, so a name already present is used verbatim.
    pub(crate) fn data_key(&self, name: &str) -> String {
        if self.kind.strict || self.data.contains(name) {
            name.to_string()
        } else {
            self.model.real_field_name(name)
        }
    }

    pub(crate) fn read_value(&self, name: &str, raw: Value) -> Result<Value> {
        match self.schema.field_type(name) {
            Some(ty) => self.kind.types.read_transform(raw, ty, &self.ctx(name)),
            None => Ok(raw),
        }
    }

    pub(crate) fn write_value(&self, name: &str, value: Value) -> Result<Value> {
        match self.schema.field_type(name) {
            Some(ty) => self.kind.types.write_transform(value, ty, &self.ctx(name)),
            None => Ok(value),
        }
    }

    /// Plain field values of the working data, relations left out.
    pub(crate) fn values(&self) -> Record {
        self.data
            .iter()
            .filter_map(|(name, attr)| attr.as_value().map(|v| (name, v.clone())))
            .collect()
    }

    pub(crate) fn current_key(&self) -> Option<Value> {
        self.data
            .get(&self.pk)
            .and_then(Attr::as_value)
            .filter(|key| !key.is_empty())
            .cloned()
    }

    /// Copy the working values of schema fields into the origin snapshot.
    pub(crate) fn refresh_origin(&mut self) {
        let schema = &self.schema;
        self.origin = self
            .data
            .iter()
            .filter(|(name, _)| schema.accepts(name))
            .filter_map(|(name, attr)| attr.as_value().map(|v| (name, v.clone())))
            .collect();
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("kind", &self.kind.name)
            .field("key", &self.key)
            .field("state", &self.state())
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryModel;
    use sqlentity_core::{DateTime, record};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn users() -> Arc<EntityType> {
        EntityType::new("user")
            .field("id", "int")
            .field("name", "string")
            .field("age", "int")
            .field("tags", "array")
            .field("created_at", "datetime")
            .build()
    }

    fn model() -> Arc<dyn Model> {
        Arc::new(MemoryModel::new("users"))
    }

    #[test]
    fn test_construct_applies_read_transform() {
        let user = Entity::new(
            &users(),
            model(),
            record! {
                "id" => Value::Null,
                "name" => "Ann",
                "age" => "30",
                "tags" => "[\"a\",\"b\"]",
                "created_at" => "2024-01-02 03:04:05",
            },
        )
        .unwrap();

        assert_eq!(user.get("id").unwrap(), Value::Null);
        assert_eq!(user.get("age").unwrap(), Value::Int(30));
        assert_eq!(
            user.get("tags").unwrap(),
            Value::Json(serde_json::json!(["a", "b"]))
        );
        assert!(user.get("created_at").unwrap().downcast_ref::<DateTime>().is_some());
        assert_eq!(user.key(), None);
        assert_eq!(user.state(), EntityState::Transient);
        assert_eq!(user.origin().len(), 5);
    }

    #[test]
    fn test_identity_comes_from_pk() {
        let user = Entity::new(&users(), model(), record! { "id" => "7", "name" => "Ann" }).unwrap();
        assert_eq!(user.key(), Some(&Value::Int(7)));
        assert_eq!(user.state(), EntityState::Persisted);
        assert_eq!(user.get_as::<i64>("id").unwrap(), 7);
    }

    #[test]
    fn test_get_as_reports_mismatch() {
        let user = Entity::new(&users(), model(), record! { "name" => "Ann" }).unwrap();
        assert_eq!(user.get_as::<String>("name").unwrap(), "Ann");
        assert_eq!(user.get_as::<Option<i64>>("age").unwrap(), None);
        match user.get_as::<i64>("name") {
            Err(Error::TypeMismatch { field, found, .. }) => {
                assert_eq!(field, "name");
                assert_eq!(found, "text");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_disused_fields_are_dropped() {
        let kind = EntityType::new("user")
            .field("id", "int")
            .field("name", "string")
            .disuse(["legacy"])
            .build();
        let user = Entity::new(&kind, model(), record! { "name" => "Ann", "legacy" => 1_i64 }).unwrap();
        assert!(!user.has("legacy"));
        assert!(user.has("name"));
    }

    #[test]
    fn test_non_strict_names_are_normalized() {
        let kind = EntityType::new("user")
            .field("user_name", "string")
            .strict(false)
            .build();
        let mut user = Entity::new(&kind, model(), record! { "userName" => "Ann" }).unwrap();
        assert_eq!(user.get("user_name").unwrap(), Value::from("Ann"));
        user.set("UserName", "Bob").unwrap();
        assert_eq!(user.get("user_name").unwrap(), Value::from("Bob"));

        assert_eq!(user.get("userName").unwrap(), Value::from("Bob"));
        assert_eq!(user.get_as::<String>("UserName").unwrap(), "Bob");
        assert!(user.has("userName"));
        assert!(user.unset("userName").is_some());
        assert!(!user.has("user_name"));
    }

    #[test]
    fn test_names_outside_schema_are_dropped_on_construct() {
        let kind = EntityType::new("user").field("id", "int").field("name", "string").build();
        let user = Entity::new(
            &kind,
            model(),
            record! { "id" => 1_i64, "name" => "Ann", "password_hash" => "xyz" },
        )
        .unwrap();
        assert!(!user.has("password_hash"));
        assert_eq!(user.to_json().unwrap(), r#"{"id":1,"name":"Ann"}"#);

        let open = EntityType::new("note").build();
        let note = Entity::new(&open, model(), record! { "anything" => "kept" }).unwrap();
        assert!(note.has("anything"));
    }

    #[test]
    fn test_accessor_is_memoized_until_data_changes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let kind = EntityType::new("user")
            .field("name", "string")
            .accessor("name", move |value, _data| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Text(value.as_str().unwrap_or_default().to_uppercase()))
            })
            .build();

        let mut user = Entity::new(&kind, model(), record! { "name" => "ann" }).unwrap();
        assert_eq!(user.get("name").unwrap(), Value::from("ANN"));
        assert_eq!(user.get("name").unwrap(), Value::from("ANN"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        user.set("name", "bob").unwrap();
        assert_eq!(user.get("name").unwrap(), Value::from("BOB"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_accessor_sees_working_data() {
        let kind = EntityType::new("user")
            .field("first", "string")
            .field("last", "string")
            .accessor("full_name", |_value, data| {
                let part = |name: &str| data.get(name).and_then(Value::as_str).unwrap_or_default().to_string();
                Ok(Value::Text(format!("{} {}", part("first"), part("last"))))
            })
            .build();
        let user = Entity::new(&kind, model(), record! { "first" => "Ann", "last" => "Lee" }).unwrap();
        assert_eq!(user.get("full_name").unwrap(), Value::from("Ann Lee"));
    }

    #[test]
    fn test_relations_live_in_working_data() {
        let profiles = EntityType::new("profile").field("id", "int").field("user_id", "int").build();
        let mut user = Entity::new(&users(), model(), record! { "name" => "Ann" }).unwrap();
        let profile = Entity::new(&profiles, model(), record! { "bio" => "hi" }).unwrap();
        user.set_one("profile", profile);

        assert!(user.relation("profile").is_some());
        assert!(user.data().get("profile").is_some_and(Attr::is_relation));
        assert_eq!(user.get("profile").unwrap(), Value::Null);
        assert!(!user.origin().contains("profile"));
        assert!(user.unset("profile").is_some());
        assert!(user.relation("profile").is_none());
    }
}
