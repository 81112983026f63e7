//! Error types shared by the core and facade crates.
//!
//! Expected control flow (a `Before*` hook aborting, an empty update diff, a
//! virtual entity) is reported as `Ok(false)` by the persistence layer. The
//! variants below cover what is genuinely exceptional: data that cannot be
//! converted, misconfigured entity types, and failures reported by the
//! storage collaborator.

use thiserror::Error;

/// Errors produced while binding, transforming or persisting entity data.
#[derive(Debug, Error)]
pub enum Error {
    /// A value-object or primitive transform could not convert a value.
    #[error("cannot convert field `{field}` to `{ty}`: {reason}")]
    Transform {
        field: String,
        ty: String,
        reason: String,
    },

    /// An `array`/`object` field held text that is not valid JSON.
    #[error("invalid JSON in field `{field}`: {source}")]
    Json {
        field: String,
        #[source]
        source: serde_json::Error,
    },

    /// A relation is enrolled for cascading but has no foreign key configured.
    #[error("relation `{0}` has no foreign key configured")]
    MissingRelationKey(String),

    /// A typed read asked for a different kind of value than the one stored.
    #[error("type mismatch for `{field}`: expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    /// The storage collaborator reported a failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Output serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Build a [`Error::Transform`] for `field` and type name `ty`.
    pub fn transform(
        field: impl Into<String>,
        ty: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Transform {
            field: field.into(),
            ty: ty.into(),
            reason: reason.into(),
        }
    }

    /// Build a [`Error::Storage`] from any displayable cause.
    pub fn storage(cause: impl std::fmt::Display) -> Self {
        Self::Storage(cause.to_string())
    }
}

/// Result alias used across SQLEntity.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_message() {
        let err = Error::transform("birthday", "date", "unrecognized layout");
        assert_eq!(
            err.to_string(),
            "cannot convert field `birthday` to `date`: unrecognized layout"
        );
    }

    #[test]
    fn test_json_error_keeps_source() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = Error::Json {
            field: "tags".to_string(),
            source,
        };
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().starts_with("invalid JSON in field `tags`"));
    }
}
