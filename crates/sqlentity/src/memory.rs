//! An in-memory [`Model`].
//!
//! Rows live in a vector behind a mutex. Every storage call is recorded, so
//! tests can assert exactly what an entity asked storage to do.

use std::sync::{Mutex, MutexGuard, PoisonError};

use sqlentity_core::{Record, Result, Value};

use crate::model::{Condition, Model, Query};

/// A storage call made through [`MemoryModel::db`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    /// The row as stored.
    Insert(Record),
    Update {
        filters: Vec<Condition>,
        payload: Record,
    },
    Select {
        filters: Vec<Condition>,
        keys: Vec<Value>,
    },
    Delete {
        filters: Vec<Condition>,
    },
}

#[derive(Debug, Default)]
struct MemoryState {
    rows: Vec<Record>,
    next_id: i64,
    calls: Vec<Call>,
}

impl MemoryState {
    fn next_id(&mut self) -> Value {
        self.next_id += 1;
        Value::Int(self.next_id)
    }
}

/// A model whose table is a vector of rows.
#[derive(Debug)]
pub struct MemoryModel {
    table: String,
    pk: String,
    auto_write_id: bool,
    columns: Vec<(String, String)>,
    create_time: Option<String>,
    update_time: Option<String>,
    timestamp: Option<Value>,
    date_format: Option<String>,
    state: Mutex<MemoryState>,
}

impl MemoryModel {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            pk: "id".to_string(),
            auto_write_id: false,
            columns: Vec::new(),
            create_time: None,
            update_time: None,
            timestamp: None,
            date_format: None,
            state: Mutex::new(MemoryState::default()),
        }
    }

    pub fn with_pk(mut self, pk: impl Into<String>) -> Self {
        self.pk = pk.into();
        self
    }

    /// Generate keys before insert instead of on insert.
    pub fn with_auto_write_id(mut self, enabled: bool) -> Self {
        self.auto_write_id = enabled;
        self
    }

    /// Column types reported to schema introspection.
    pub fn with_columns<I, K, V>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.columns = columns
            .into_iter()
            .map(|(name, ty)| (name.into(), ty.into()))
            .collect();
        self
    }

    /// Auto-timestamp fields.
    pub fn with_timestamps(mut self, create_time: Option<&str>, update_time: Option<&str>) -> Self {
        self.create_time = create_time.map(str::to_string);
        self.update_time = update_time.map(str::to_string);
        self
    }

    /// Use a fixed timestamp instead of the current time.
    pub fn with_fixed_timestamp(mut self, timestamp: impl Into<Value>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn with_date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = Some(format.into());
        self
    }

    /// Seed rows; the key sequence continues after the largest integer key.
    pub fn with_rows(self, rows: impl IntoIterator<Item = Record>) -> Self {
        {
            let mut state = self.lock();
            for row in rows {
                if let Some(id) = row.get(&self.pk).and_then(Value::as_i64) {
                    state.next_id = state.next_id.max(id);
                }
                state.rows.push(row);
            }
        }
        self
    }

    /// Calls recorded so far.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Current table contents.
    pub fn rows(&self) -> Vec<Record> {
        self.lock().rows.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Model for MemoryModel {
    fn table(&self) -> &str {
        &self.table
    }

    fn pk(&self) -> &str {
        &self.pk
    }

    fn is_auto_write_id(&self) -> bool {
        self.auto_write_id
    }

    fn auto_write_id(&self) -> Value {
        self.lock().next_id()
    }

    fn date_time_fields(&self, update_only: bool) -> Vec<String> {
        if update_only {
            self.update_time.iter().cloned().collect()
        } else {
            self.create_time
                .iter()
                .chain(self.update_time.iter())
                .cloned()
                .collect()
        }
    }

    fn timestamp(&self) -> Value {
        self.timestamp
            .clone()
            .unwrap_or_else(crate::model::default_timestamp)
    }

    fn date_format(&self) -> Option<&str> {
        self.date_format.as_deref()
    }

    fn db(&self) -> Box<dyn Query + '_> {
        Box::new(MemoryQuery {
            model: self,
            filters: Vec::new(),
            fields: Vec::new(),
        })
    }

    fn fields_type(&self, _table: &str) -> Result<Vec<(String, String)>> {
        Ok(self.columns.clone())
    }
}

struct MemoryQuery<'a> {
    model: &'a MemoryModel,
    filters: Vec<Condition>,
    fields: Vec<String>,
}

impl MemoryQuery<'_> {
    fn matches(&self, row: &Record) -> bool {
        self.filters.iter().all(|c| c.matches(row))
    }
}

impl Query for MemoryQuery<'_> {
    fn filter(&mut self, condition: Condition) {
        self.filters.push(condition);
    }

    fn fields(&mut self, fields: &[String]) {
        self.fields = fields.to_vec();
    }

    fn insert(&mut self, mut payload: Record, return_id: bool) -> Result<Value> {
        let pk = self.model.pk.as_str();
        let mut state = self.model.lock();

        if !self.fields.is_empty() {
            payload.retain(|name, _| self.fields.iter().any(|f| f == name));
        }
        let id = match payload.get(pk) {
            Some(id) if !id.is_empty() => id.clone(),
            _ => {
                let id = state.next_id();
                payload.insert(pk, id.clone());
                id
            }
        };

        state.calls.push(Call::Insert(payload.clone()));
        state.rows.push(payload);
        Ok(if return_id { id } else { Value::Int(1) })
    }

    fn update(&mut self, payload: Record) -> Result<u64> {
        let mut state = self.model.lock();
        let mut affected = 0;
        for row in state.rows.iter_mut().filter(|row| self.matches(row)) {
            for (name, value) in payload.iter() {
                row.insert(name, value.clone());
            }
            affected += 1;
        }
        state.calls.push(Call::Update {
            filters: self.filters.clone(),
            payload,
        });
        Ok(affected)
    }

    fn select(&mut self, keys: &[Value]) -> Result<Vec<Record>> {
        let pk = self.model.pk.as_str();
        let mut state = self.model.lock();
        let rows = state
            .rows
            .iter()
            .filter(|row| self.matches(row))
            .filter(|row| keys.is_empty() || row.get(pk).is_some_and(|id| keys.contains(id)))
            .cloned()
            .collect();
        state.calls.push(Call::Select {
            filters: self.filters.clone(),
            keys: keys.to_vec(),
        });
        Ok(rows)
    }

    fn delete(&mut self) -> Result<u64> {
        let mut state = self.model.lock();
        let before = state.rows.len();
        state.rows.retain(|row| !self.matches(row));
        let removed = (before - state.rows.len()) as u64;
        state.calls.push(Call::Delete {
            filters: self.filters.clone(),
        });
        Ok(removed)
    }
}
