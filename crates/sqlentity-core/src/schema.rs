//! Entity schemas and their per-type resolution cache.
//!
//! A schema is resolved once per entity type. Declared fields win; without
//! them the storage table is introspected and the result is merged with any
//! declared value-object overrides (dynamic mode). When neither source yields
//! anything the schema is empty and every field passes through untyped.

use std::sync::{Arc, OnceLock};

use crate::error::Result;
use crate::field::{FieldDef, FieldType};

/// Whether fields are fixed declarations or discovered from storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FieldMode {
    /// Fields were declared on the entity type.
    #[default]
    Strict,
    /// Fields were introspected from storage; they exist only as keys of the
    /// per-instance working map.
    Dynamic,
}

/// Field name -> type mapping for one entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<FieldDef>,
    mode: FieldMode,
}

impl Schema {
    /// Schema from static declarations.
    pub fn declared(fields: impl IntoIterator<Item = FieldDef>) -> Self {
        let mut schema = Self {
            fields: Vec::new(),
            mode: FieldMode::Strict,
        };
        for field in fields {
            schema.push(field);
        }
        schema
    }

    /// Schema from introspected `(column, column type)` pairs, with declared
    /// type overrides taking precedence. Overrides for columns storage did
    /// not report are still added.
    pub fn introspected(columns: &[(String, String)], overrides: &[FieldDef]) -> Self {
        let mut schema = Self {
            fields: Vec::with_capacity(columns.len()),
            mode: FieldMode::Dynamic,
        };
        for (name, column_type) in columns {
            schema.push(FieldDef::new(
                name.clone(),
                FieldType::from_column_type(column_type),
            ));
        }
        for field in overrides {
            schema.push(field.clone());
        }
        schema
    }

    /// The pass-through schema: no fields, dynamic mode.
    pub fn empty() -> Self {
        Self {
            fields: Vec::new(),
            mode: FieldMode::Dynamic,
        }
    }

    fn push(&mut self, field: FieldDef) {
        if let Some(existing) = self.fields.iter_mut().find(|f| f.name == field.name) {
            existing.ty = field.ty;
        } else {
            self.fields.push(field);
        }
    }

    pub fn mode(&self) -> FieldMode {
        self.mode
    }

    pub fn is_strict(&self) -> bool {
        self.mode == FieldMode::Strict
    }

    /// True when no fields are known; values then pass through untyped.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// Whether `name` may be stored: any name for an empty schema, otherwise
    /// only known fields.
    pub fn accepts(&self, name: &str) -> bool {
        self.is_empty() || self.contains(name)
    }

    /// Declared type of `name`, or `None` when values pass through untyped.
    pub fn field_type(&self, name: &str) -> Option<&FieldType> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.ty)
    }
}

/// Process-lifetime cache of one entity type's resolved schema.
///
/// Only successful resolutions are cached; a failed introspection yields the
/// empty schema for this call and is retried next time.
#[derive(Debug, Default)]
pub struct SchemaCache {
    cell: OnceLock<Arc<Schema>>,
}

impl SchemaCache {
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    /// The cached schema, if one was resolved.
    pub fn get(&self) -> Option<Arc<Schema>> {
        self.cell.get().cloned()
    }

    /// Return the cached schema or resolve it.
    ///
    /// `introspect` is only called when nothing is declared; it returns the
    /// bound table's `(column, column type)` pairs.
    pub fn get_or_resolve(
        &self,
        entity: &str,
        declared: &[FieldDef],
        overrides: &[FieldDef],
        introspect: impl FnOnce() -> Result<Vec<(String, String)>>,
    ) -> Arc<Schema> {
        if let Some(schema) = self.cell.get() {
            return Arc::clone(schema);
        }

        let schema = if declared.is_empty() {
            match introspect() {
                Ok(columns) if columns.is_empty() && overrides.is_empty() => Schema::empty(),
                Ok(columns) => Schema::introspected(&columns, overrides),
                Err(e) => {
                    tracing::warn!(
                        entity = entity,
                        error = %e,
                        "Schema introspection failed, fields pass through untyped"
                    );
                    return Arc::new(Schema::empty());
                }
            }
        } else {
            Schema::declared(declared.iter().cloned())
        };

        tracing::debug!(
            entity = entity,
            fields = schema.len(),
            mode = ?schema.mode(),
            "Resolved entity schema"
        );

        Arc::clone(self.cell.get_or_init(|| Arc::new(schema)))
    }
}
