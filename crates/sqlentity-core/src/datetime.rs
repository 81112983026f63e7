//! Built-in date and date-time value types.
//!
//! Both accept unix timestamps (integers or numeric text) and the common
//! textual layouts. Timestamps are interpreted as UTC.

use std::any::Any;

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{Error, Result};
use crate::types::{Typeable, TransformContext, ValueObject};
use crate::value::Value;

const LAYOUTS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y%m%d%H%M%S",
];

const DATE_LAYOUTS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];

/// Parse a raw stored value into a naive (UTC) date-time.
///
/// `preferred` is tried first so values written with a custom model format
/// read back without loss.
pub fn parse_datetime(raw: &Value, preferred: Option<&str>) -> Option<NaiveDateTime> {
    match raw {
        Value::Int(ts) => from_timestamp(*ts),
        Value::Float(ts) => from_timestamp(ts.trunc() as i64),
        Value::Text(text) => {
            let text = text.trim();
            if let Ok(ts) = text.parse::<i64>() {
                return from_timestamp(ts);
            }
            if let Some(format) = preferred {
                let parsed = NaiveDateTime::parse_from_str(text, format).ok().or_else(|| {
                    NaiveDate::parse_from_str(text, format)
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                });
                if parsed.is_some() {
                    return parsed;
                }
            }
            if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(text) {
                return Some(dt.naive_utc());
            }
            LAYOUTS
                .iter()
                .find_map(|layout| NaiveDateTime::parse_from_str(text, layout).ok())
                .or_else(|| {
                    DATE_LAYOUTS
                        .iter()
                        .find_map(|layout| NaiveDate::parse_from_str(text, layout).ok())
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                })
        }
        Value::Object(obj) => {
            let any = obj.as_any();
            any.downcast_ref::<DateTime>()
                .map(|dt| dt.inner)
                .or_else(|| any.downcast_ref::<Date>().and_then(|d| d.inner.and_hms_opt(0, 0, 0)))
        }
        _ => None,
    }
}

fn from_timestamp(ts: i64) -> Option<NaiveDateTime> {
    chrono::DateTime::from_timestamp(ts, 0).map(|dt| dt.naive_utc())
}

fn unparseable(ctx: &TransformContext<'_>, ty: &str, raw: &Value) -> Error {
    Error::transform(ctx.field, ty, format!("unrecognized date/time value {raw:?}"))
}

/// A date-time rendered with the model's date format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateTime {
    inner: NaiveDateTime,
    format: String,
}

impl DateTime {
    pub const DEFAULT_FORMAT: &'static str = "%Y-%m-%d %H:%M:%S";

    pub fn new(inner: NaiveDateTime) -> Self {
        Self {
            inner,
            format: Self::DEFAULT_FORMAT.to_string(),
        }
    }

    /// Render with `format` instead of the default.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn naive(&self) -> NaiveDateTime {
        self.inner
    }

    pub fn format(&self) -> &str {
        &self.format
    }
}

impl ValueObject for DateTime {
    fn value(&self, _ctx: &TransformContext<'_>) -> Result<Value> {
        Ok(Value::Text(self.inner.format(&self.format).to_string()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Typeable for DateTime {
    fn from_raw(raw: &Value, ctx: &TransformContext<'_>) -> Result<Self> {
        let inner =
            parse_datetime(raw, ctx.date_format).ok_or_else(|| unparseable(ctx, "datetime", raw))?;
        Ok(Self {
            inner,
            format: ctx.date_format.unwrap_or(Self::DEFAULT_FORMAT).to_string(),
        })
    }
}

/// A calendar date, always rendered as `%Y-%m-%d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Date {
    inner: NaiveDate,
}

impl Date {
    pub const FORMAT: &'static str = "%Y-%m-%d";

    pub fn new(inner: NaiveDate) -> Self {
        Self { inner }
    }

    pub fn naive(&self) -> NaiveDate {
        self.inner
    }
}

impl ValueObject for Date {
    fn value(&self, _ctx: &TransformContext<'_>) -> Result<Value> {
        Ok(Value::Text(self.inner.format(Self::FORMAT).to_string()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Typeable for Date {
    fn from_raw(raw: &Value, ctx: &TransformContext<'_>) -> Result<Self> {
        let inner = parse_datetime(raw, ctx.date_format)
            .map(|dt| dt.date())
            .ok_or_else(|| unparseable(ctx, "date", raw))?;
        Ok(Self { inner })
    }
}
