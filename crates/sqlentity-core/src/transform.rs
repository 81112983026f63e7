//! The read/write type-transform pipeline.
//!
//! `read_transform` turns a stored value into the typed working value for a
//! field; `write_transform` turns a working value back into a storable
//! scalar. Null short-circuits both directions and [`Value::Raw`] is never
//! touched on write.

use crate::error::{Error, Result};
use crate::field::FieldType;
use crate::types::{TransformContext, TypeRegistry};
use crate::value::Value;

impl TypeRegistry {
    /// Convert a stored value into the typed value for a field of type `ty`.
    pub fn read_transform(
        &self,
        raw: Value,
        ty: &FieldType,
        ctx: &TransformContext<'_>,
    ) -> Result<Value> {
        if raw.is_null() || matches!(raw, Value::Raw(_)) {
            return Ok(raw);
        }

        match ty {
            FieldType::String => Ok(Value::Text(to_text(&raw, ctx)?)),
            FieldType::Int => Ok(Value::Int(to_int(&raw))),
            FieldType::Float => Ok(Value::Float(to_float(&raw))),
            FieldType::Bool => Ok(Value::Bool(to_bool(&raw))),
            FieldType::Array => decode_json(raw, ctx, || serde_json::Value::Array(Vec::new())),
            FieldType::Object => decode_json(raw, ctx, || {
                serde_json::Value::Object(serde_json::Map::new())
            }),
            FieldType::Custom(name) => match self.get(name) {
                Some(capability) => capability.read(raw, ctx),
                None => {
                    tracing::debug!(
                        entity = ctx.entity,
                        field = ctx.field,
                        ty = name.as_str(),
                        "Unregistered field type, value passed through"
                    );
                    Ok(raw)
                }
            },
        }
    }

    /// Convert a working value into a storable scalar for a field of type `ty`.
    pub fn write_transform(
        &self,
        value: Value,
        ty: &FieldType,
        ctx: &TransformContext<'_>,
    ) -> Result<Value> {
        if value.is_null() || matches!(value, Value::Raw(_)) {
            return Ok(value);
        }

        match ty {
            FieldType::String => Ok(Value::Text(to_text(&value, ctx)?)),
            FieldType::Int => Ok(Value::Int(to_int(&unwrap_object(value, ctx)?))),
            FieldType::Float => Ok(Value::Float(to_float(&unwrap_object(value, ctx)?))),
            FieldType::Bool => Ok(Value::Bool(to_bool(&value))),
            FieldType::Array | FieldType::Object => match value {
                Value::Json(json) => Ok(Value::Text(serde_json::to_string(&json)?)),
                obj @ Value::Object(_) => Ok(obj),
                scalar => match self.read_transform(scalar, ty, ctx)? {
                    Value::Json(json) => Ok(Value::Text(serde_json::to_string(&json)?)),
                    other => Ok(other),
                },
            },
            FieldType::Custom(name) => match self.get(name) {
                Some(capability) => capability.write(value, ctx),
                None => unwrap_object(value, ctx),
            },
        }
    }
}

/// Replace a value object by its storable value; other values are unchanged.
fn unwrap_object(value: Value, ctx: &TransformContext<'_>) -> Result<Value> {
    match value {
        Value::Object(obj) => obj.value(ctx),
        other => Ok(other),
    }
}

fn to_text(value: &Value, ctx: &TransformContext<'_>) -> Result<String> {
    Ok(match value {
        Value::Object(obj) => obj.value(ctx)?.to_text(),
        other => other.to_text(),
    })
}

/// Integer coercion: numeric text is parsed from its leading number,
/// anything unparseable becomes zero.
fn to_int(value: &Value) -> i64 {
    match value {
        Value::Bool(b) => i64::from(*b),
        Value::Int(i) => *i,
        Value::Float(f) => f.trunc() as i64,
        Value::Text(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| leading_number(s).map(|f| f.trunc() as i64))
                .unwrap_or(0)
        }
        Value::Json(serde_json::Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::Json(_) => i64::from(!value.is_empty()),
        Value::Null | Value::Object(_) | Value::Raw(_) => 0,
    }
}

fn to_float(value: &Value) -> f64 {
    match value {
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Int(i) => *i as f64,
        Value::Float(f) => *f,
        Value::Text(s) => leading_number(s.trim()).unwrap_or(0.0),
        Value::Json(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Value::Json(_) | Value::Null | Value::Object(_) | Value::Raw(_) => 0.0,
    }
}

fn to_bool(value: &Value) -> bool {
    match value {
        Value::Object(_) => true,
        other => !other.is_empty(),
    }
}

/// The longest numeric prefix of `s`, if any.
fn leading_number(s: &str) -> Option<f64> {
    if let Ok(f) = s.parse::<f64>() {
        return Some(f);
    }
    let end = s
        .char_indices()
        .take_while(|(i, c)| c.is_ascii_digit() || *c == '.' || (*i == 0 && matches!(*c, '-' | '+')))
        .map(|(i, c)| i + c.len_utf8())
        .last()?;
    (1..=end).rev().find_map(|cut| s[..cut].parse::<f64>().ok())
}

fn decode_json(
    raw: Value,
    ctx: &TransformContext<'_>,
    empty: impl FnOnce() -> serde_json::Value,
) -> Result<Value> {
    if raw.is_empty() {
        return Ok(Value::Json(empty()));
    }
    match raw {
        Value::Json(json) => Ok(Value::Json(json)),
        Value::Text(text) => serde_json::from_str(&text)
            .map(Value::Json)
            .map_err(|source| Error::Json {
                field: ctx.field.to_string(),
                source,
            }),
        Value::Bool(b) => Ok(Value::Json(serde_json::Value::Bool(b))),
        Value::Int(i) => Ok(Value::Json(serde_json::Value::from(i))),
        Value::Float(f) => Ok(Value::Json(
            serde_json::Number::from_f64(f).map_or(serde_json::Value::Null, serde_json::Value::Number),
        )),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;

    use serde_json::json;

    use super::*;
    use crate::datetime::DateTime;
    use crate::types::{EnumValue, FieldTypeTransform, ValueObject};

    fn ctx() -> TransformContext<'static> {
        TransformContext::new("user", "field")
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Status {
        Active,
        Banned,
    }

    impl ValueObject for Status {
        fn value(&self, _ctx: &TransformContext<'_>) -> Result<Value> {
            Ok(Value::Int(match self {
                Status::Active => 1,
                Status::Banned => 2,
            }))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    impl EnumValue for Status {
        fn from_backing(backing: &Value) -> Option<Self> {
            match to_int(backing) {
                1 => Some(Status::Active),
                2 => Some(Status::Banned),
                _ => None,
            }
        }
    }

    /// Stores comma separated tags, exposes them as a JSON list.
    struct CommaList;

    impl FieldTypeTransform for CommaList {
        fn get(&self, raw: Value, _ctx: &TransformContext<'_>) -> Result<Value> {
            let text = raw.as_str().unwrap_or_default();
            Ok(Value::Json(json!(text.split(',').collect::<Vec<_>>())))
        }

        fn set(&self, value: Value, _ctx: &TransformContext<'_>) -> Result<Value> {
            let items: Vec<String> = value
                .as_json()
                .and_then(|j| j.as_array())
                .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default();
            Ok(Value::Text(items.join(",")))
        }
    }

    #[test]
    fn test_primitive_reads() {
        let types = TypeRegistry::new();
        let ctx = ctx();
        assert_eq!(
            types.read_transform(Value::from("30"), &FieldType::Int, &ctx).unwrap(),
            Value::Int(30)
        );
        assert_eq!(
            types.read_transform(Value::from("12abc"), &FieldType::Int, &ctx).unwrap(),
            Value::Int(12)
        );
        assert_eq!(
            types.read_transform(Value::from("1.5"), &FieldType::Float, &ctx).unwrap(),
            Value::Float(1.5)
        );
        assert_eq!(
            types.read_transform(Value::Int(7), &FieldType::String, &ctx).unwrap(),
            Value::from("7")
        );
        assert_eq!(
            types.read_transform(Value::from("0"), &FieldType::Bool, &ctx).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_null_and_raw_short_circuit() {
        let types = TypeRegistry::builtin();
        let ctx = ctx();
        let datetime = FieldType::parse("datetime");
        assert_eq!(types.read_transform(Value::Null, &datetime, &ctx).unwrap(), Value::Null);
        assert_eq!(types.write_transform(Value::Null, &FieldType::Int, &ctx).unwrap(), Value::Null);
        assert_eq!(
            types.write_transform(Value::raw("NOW()"), &datetime, &ctx).unwrap(),
            Value::raw("NOW()")
        );
    }

    #[test]
    fn test_empty_json_fields_decode_to_empty_containers() {
        let types = TypeRegistry::new();
        let ctx = ctx();
        assert_eq!(
            types.read_transform(Value::from(""), &FieldType::Array, &ctx).unwrap(),
            Value::Json(json!([]))
        );
        assert_eq!(
            types.read_transform(Value::from(""), &FieldType::Object, &ctx).unwrap(),
            Value::Json(json!({}))
        );
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let types = TypeRegistry::new();
        let err = types
            .read_transform(Value::from("[1,"), &FieldType::Array, &ctx().field("tags"))
            .unwrap_err();
        assert!(matches!(err, Error::Json { ref field, .. } if field == "tags"));
    }

    #[test]
    fn test_array_write_encodes_json() {
        let types = TypeRegistry::new();
        let ctx = ctx();
        assert_eq!(
            types
                .write_transform(Value::Json(json!(["a", "é"])), &FieldType::Array, &ctx)
                .unwrap(),
            Value::from(r#"["a","é"]"#)
        );
        assert_eq!(
            types
                .write_transform(Value::from(r#"{"a":1}"#), &FieldType::Object, &ctx)
                .unwrap(),
            Value::from(r#"{"a":1}"#)
        );
    }

    #[test]
    fn test_enum_capability() {
        let types = TypeRegistry::new().enumeration::<Status>("status");
        let ty = FieldType::parse("status");
        let ctx = ctx();

        let read = types.read_transform(Value::from("2"), &ty, &ctx).unwrap();
        assert_eq!(read.downcast_ref::<Status>(), Some(&Status::Banned));
        assert_eq!(types.write_transform(read, &ty, &ctx).unwrap(), Value::Int(2));

        let err = types.read_transform(Value::Int(9), &ty, &ctx).unwrap_err();
        assert!(matches!(err, Error::Transform { .. }));
    }

    #[test]
    fn test_field_type_transform_capability() {
        let types = TypeRegistry::new().transform("comma_list", CommaList);
        let ty = FieldType::parse("comma_list");
        let ctx = ctx();

        let read = types.read_transform(Value::from("a,b"), &ty, &ctx).unwrap();
        assert_eq!(read, Value::Json(json!(["a", "b"])));
        assert_eq!(types.write_transform(read, &ty, &ctx).unwrap(), Value::from("a,b"));
    }

    #[test]
    fn test_unregistered_custom_type_passes_through() {
        let types = TypeRegistry::new();
        let ty = FieldType::parse("money");
        assert_eq!(
            types.read_transform(Value::from("1.00"), &ty, &ctx()).unwrap(),
            Value::from("1.00")
        );
    }

    #[test]
    fn test_value_object_round_trip() {
        let types = TypeRegistry::builtin();
        let ctx = ctx();
        let ty = FieldType::parse("datetime");

        for raw in ["2024-03-01 08:30:00", "2024-03-01T08:30:00"] {
            let read = types.read_transform(Value::from(raw), &ty, &ctx).unwrap();
            assert!(read.downcast_ref::<DateTime>().is_some());
            let written = types.write_transform(read, &ty, &ctx).unwrap();
            let normalized = types.write_transform(Value::from(raw), &ty, &ctx).unwrap();
            assert_eq!(written, normalized);
            assert_eq!(written, Value::from("2024-03-01 08:30:00"));
        }
    }

    #[test]
    fn test_leading_number() {
        assert_eq!(leading_number("42"), Some(42.0));
        assert_eq!(leading_number("-3.5kg"), Some(-3.5));
        assert_eq!(leading_number("abc"), None);
    }
}
