//! Core types for SQLEntity.
//!
//! `sqlentity-core` is the **leaf layer** of the workspace. It knows nothing about
//! entities or storage; it defines the data model and conversions the facade binds
//! entity instances through.
//!
//! # Role In The Architecture
//!
//! - **Data model**: `Value` (typed field value, including value objects and raw
//!   storage expressions) and `Record` (ordered column map exchanged with storage).
//! - **Schema resolution**: `FieldType`, `Schema` and the per-type `SchemaCache`,
//!   fed by declared fields or by introspected column types.
//! - **Type transforms**: `TypeRegistry` with the `Typeable`, `FieldTypeTransform`
//!   and `EnumValue` capabilities plus a constructor fallback, driving
//!   `read_transform`/`write_transform`.
//! - **Built-in value objects**: `DateTime` and `Date`.
//!
//! Most applications should use the `sqlentity` facade; reach for `sqlentity-core`
//! directly when writing custom value-object types.

pub mod datetime;
pub mod error;
pub mod field;
pub mod naming;
pub mod record;
pub mod relationship;
pub mod schema;
pub mod transform;
pub mod types;
pub mod value;

pub use datetime::{Date, DateTime, parse_datetime};
pub use error::{Error, Result};
pub use field::{FieldDef, FieldType};
pub use record::Record;
pub use relationship::{RelationshipInfo, RelationshipKind, find_relationship};
pub use schema::{FieldMode, Schema, SchemaCache};
pub use types::{
    Capability, EnumValue, FieldTypeTransform, TransformContext, TypeRegistry, Typeable,
    ValueObject,
};
pub use value::{FromValue, Value};
