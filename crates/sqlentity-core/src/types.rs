//! Pluggable value-object types.
//!
//! A custom field type is registered under a name together with one
//! capability, which decides how raw storage values become typed values and
//! back:
//!
//! - [`Typeable`]: `from_raw(raw, ctx)` on read, `value(ctx)` on write.
//! - [`FieldTypeTransform`]: symmetric `get`/`set` hooks with context.
//! - [`EnumValue`]: a member looked up by its backing scalar.
//! - constructor fallback: a one-argument constructor from the raw value.
//!
//! Dispatch happens through [`TypeRegistry`] lookups keyed on the declared
//! [`FieldType::Custom`](crate::FieldType::Custom) name.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::datetime::{Date, DateTime};
use crate::error::{Error, Result};
use crate::value::Value;

/// Context handed to every transform: which entity and field is being
/// converted, and the per-model date format if one is configured.
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    pub entity: &'a str,
    pub field: &'a str,
    pub date_format: Option<&'a str>,
}

impl<'a> TransformContext<'a> {
    pub const fn new(entity: &'a str, field: &'a str) -> Self {
        Self {
            entity,
            field,
            date_format: None,
        }
    }

    pub const fn with_date_format(mut self, format: Option<&'a str>) -> Self {
        self.date_format = format;
        self
    }

    /// Same context, different field.
    pub const fn field(mut self, field: &'a str) -> Self {
        self.field = field;
        self
    }
}

/// A typed value held in an entity field.
pub trait ValueObject: fmt::Debug + Send + Sync + 'static {
    /// The storable scalar for this value.
    fn value(&self, ctx: &TransformContext<'_>) -> Result<Value>;

    fn as_any(&self) -> &dyn Any;
}

/// Value objects built by a static factory from the raw stored value.
pub trait Typeable: ValueObject + Sized {
    fn from_raw(raw: &Value, ctx: &TransformContext<'_>) -> Result<Self>;
}

/// Enum-like value holders backed by a scalar.
///
/// [`ValueObject::value`] must return the backing scalar.
pub trait EnumValue: ValueObject + Sized {
    fn from_backing(backing: &Value) -> Option<Self>;
}

/// Bidirectional, context-aware conversion for types that need more than a
/// constructor.
pub trait FieldTypeTransform: Send + Sync + 'static {
    /// Stored value -> working value.
    fn get(&self, raw: Value, ctx: &TransformContext<'_>) -> Result<Value>;

    /// Working value -> stored value.
    fn set(&self, value: Value, ctx: &TransformContext<'_>) -> Result<Value>;
}

type ReadFn = Arc<dyn Fn(&Value, &TransformContext<'_>) -> Result<Value> + Send + Sync>;

fn read_fn<F>(read: F) -> ReadFn
where
    F: Fn(&Value, &TransformContext<'_>) -> Result<Value> + Send + Sync + 'static,
{
    Arc::new(read)
}

/// How a registered custom type converts values.
#[derive(Clone)]
pub enum Capability {
    Typeable(ReadFn),
    Transform(Arc<dyn FieldTypeTransform>),
    Enum(ReadFn),
    Construct(ReadFn),
}

impl Capability {
    pub const fn kind(&self) -> &'static str {
        match self {
            Capability::Typeable(_) => "typeable",
            Capability::Transform(_) => "transform",
            Capability::Enum(_) => "enum",
            Capability::Construct(_) => "constructor",
        }
    }

    pub(crate) fn read(&self, raw: Value, ctx: &TransformContext<'_>) -> Result<Value> {
        match self {
            Capability::Typeable(read) | Capability::Enum(read) | Capability::Construct(read) => {
                if matches!(raw, Value::Object(_)) {
                    return Ok(raw);
                }
                read(&raw, ctx)
            }
            Capability::Transform(transform) => transform.get(raw, ctx),
        }
    }

    pub(crate) fn write(&self, value: Value, ctx: &TransformContext<'_>) -> Result<Value> {
        match self {
            Capability::Transform(transform) => transform.set(value, ctx),
            _ => match value {
                Value::Object(obj) => obj.value(ctx),
                scalar => match self.read(scalar, ctx)? {
                    Value::Object(obj) => obj.value(ctx),
                    other => Ok(other),
                },
            },
        }
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// Registry of custom field types, keyed by lower-cased type name.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<String, Capability>,
}

impl TypeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in `datetime` and `date` types.
    pub fn builtin() -> Self {
        Self::new()
            .typeable::<DateTime>("datetime")
            .typeable::<Date>("date")
    }

    fn register(mut self, name: &str, capability: Capability) -> Self {
        self.types.insert(name.to_ascii_lowercase(), capability);
        self
    }

    /// Register a [`Typeable`] value object.
    pub fn typeable<T: Typeable>(self, name: &str) -> Self {
        self.register(
            name,
            Capability::Typeable(read_fn(|raw, ctx| Ok(Value::object(T::from_raw(raw, ctx)?)))),
        )
    }

    /// Register an [`EnumValue`]; unknown backing values fail the transform.
    pub fn enumeration<T: EnumValue>(self, name: &str) -> Self {
        let type_name = name.to_string();
        self.register(
            name,
            Capability::Enum(read_fn(move |raw, ctx| {
                T::from_backing(raw).map(Value::object).ok_or_else(|| {
                    Error::transform(
                        ctx.field,
                        type_name.as_str(),
                        format!("no member is backed by {raw:?}"),
                    )
                })
            })),
        )
    }

    /// Register a [`FieldTypeTransform`].
    pub fn transform(self, name: &str, transform: impl FieldTypeTransform) -> Self {
        self.register(name, Capability::Transform(Arc::new(transform)))
    }

    /// Register a plain constructor taking the raw value.
    pub fn constructor<T, F>(self, name: &str, construct: F) -> Self
    where
        T: ValueObject,
        F: Fn(&Value) -> Result<T> + Send + Sync + 'static,
    {
        self.register(
            name,
            Capability::Construct(read_fn(move |raw, _ctx| Ok(Value::object(construct(raw)?)))),
        )
    }

    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.types.get(&name.to_ascii_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Email(String);

    impl ValueObject for Email {
        fn value(&self, _ctx: &TransformContext<'_>) -> Result<Value> {
            Ok(Value::Text(self.0.clone()))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_builtin_registry() {
        let registry = TypeRegistry::builtin();
        assert!(registry.contains("datetime"));
        assert!(registry.contains("DateTime"));
        assert!(registry.contains("date"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_constructor_capability() {
        let registry = TypeRegistry::new().constructor("email", |raw: &Value| {
            Ok(Email(raw.as_str().unwrap_or_default().to_lowercase()))
        });
        let cap = registry.get("email").unwrap();
        assert_eq!(cap.kind(), "constructor");

        let ctx = TransformContext::new("user", "email");
        let read = cap.read(Value::from("Ann@Example.com"), &ctx).unwrap();
        assert_eq!(read.downcast_ref::<Email>(), Some(&Email("ann@example.com".into())));

        let written = cap.write(Value::from("Bob@Example.com"), &ctx).unwrap();
        assert_eq!(written, Value::from("bob@example.com"));
    }
}
