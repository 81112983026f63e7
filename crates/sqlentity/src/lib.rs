//! SQLEntity: typed active-record entities.
//!
//! `sqlentity` is the **primary user-facing crate**. It binds rows of raw column
//! values to typed, mutable [`Entity`] instances, tracks what changed since the
//! last persisted state, shapes entities into output views, and orchestrates
//! saving and deleting them through a [`Model`] collaborator.
//!
//! # Role In The Architecture
//!
//! - **Registration**: [`EntityType`] declares fields, relations, accessor and
//!   mutator hooks, lifecycle listeners and default view configuration, once
//!   per kind of entity.
//! - **State**: [`Entity`] owns its working data and origin snapshot.
//! - **Change tracking**: [`change::diff`] yields the minimal update payload.
//! - **Views**: [`ViewConfig`] drives `to_array`/`to_json`.
//! - **Persistence**: `save`/`delete`/`create`/`destroy` decide insert versus
//!   update, fire [`Event`]s and cascade to enrolled relations.
//! - **Collaborators**: [`Model`] and [`Query`] are implemented by the storage
//!   layer; [`MemoryModel`] is an in-memory implementation.
//!
//! Value types, transforms and schemas come from `sqlentity-core` and are
//! re-exported here.

pub mod change;
pub mod entity;
pub mod memory;
pub mod model;
pub mod persist;
pub mod view;

pub use sqlentity_core::{
    Capability, Date, DateTime, EnumValue, Error, FieldDef, FieldMode, FieldType,
    FieldTypeTransform, FromValue, Record, RelationshipInfo, RelationshipKind, Result, Schema,
    TransformContext, TypeRegistry, Typeable, Value, ValueObject, naming, record,
};

pub use change::{DiffOptions, diff};
pub use entity::{Attr, Entity, EntityState, EntityType, FieldHook, Listener};
pub use memory::{Call, MemoryModel};
pub use model::{Condition, Event, Model, Query, default_timestamp};
pub use persist::Criteria;
pub use view::ViewConfig;

/// Common imports.
pub mod prelude {
    pub use crate::{
        Attr, Condition, Criteria, Entity, EntityState, EntityType, Error, Event, FieldType,
        MemoryModel, Model, Query, Record, Result, TransformContext, TypeRegistry, Value,
        ValueObject, ViewConfig, record,
    };
}
