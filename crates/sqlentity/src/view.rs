//! Output views of an entity.
//!
//! `to_array` walks the working data in insertion order. Keys are filtered
//! by the allow-set, renamed keys are moved behind the plain ones, and
//! appended (accessor-only) attributes come last.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use sqlentity_core::Result;

use crate::entity::{Attr, Entity};

/// Visibility and naming rules for output views.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Fields never shown.
    pub hidden: Vec<String>,
    /// When non-empty, only these fields are shown.
    pub visible: Vec<String>,
    /// Accessor-only attributes added to the output.
    pub append: Vec<String>,
    /// `internal -> external` output names.
    pub mapping: HashMap<String, String>,
}

impl ViewConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hidden<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hidden = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn visible<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.visible = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn append<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.append = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn mapping<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.mapping = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Whether `name` passes the default allow-set.
    pub fn allows(&self, name: &str) -> bool {
        (self.visible.is_empty() || self.visible.iter().any(|f| f == name))
            && !self.hidden.iter().any(|f| f == name)
    }

    fn external_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.mapping.get(name).map_or(name, String::as_str)
    }
}

fn to_strings(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|f| (*f).to_string()).collect()
}

impl Entity {
    /// Current view configuration.
    pub fn view_config(&self) -> &ViewConfig {
        &self.view
    }

    /// Replace the appended attributes.
    pub fn append(&mut self, fields: &[&str]) -> &mut Self {
        self.view.append = to_strings(fields);
        self
    }

    /// Replace the hidden fields.
    pub fn hidden(&mut self, fields: &[&str]) -> &mut Self {
        self.view.hidden = to_strings(fields);
        self
    }

    /// Replace the visible fields.
    pub fn visible(&mut self, fields: &[&str]) -> &mut Self {
        self.view.visible = to_strings(fields);
        self
    }

    /// Replace the output renames.
    pub fn mapping(&mut self, pairs: &[(&str, &str)]) -> &mut Self {
        self.view.mapping = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        self
    }

    /// The output mapping under the instance's view configuration.
    pub fn to_array(&self) -> Result<Map<String, Json>> {
        self.shape(None)
    }

    /// The output mapping restricted to `allow`, ignoring hidden/visible.
    /// An empty list means the default allow-set.
    pub fn to_array_with(&self, allow: &[&str]) -> Result<Map<String, Json>> {
        self.shape(if allow.is_empty() { None } else { Some(allow) })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_array()?)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_array()?)?)
    }

    fn shape(&self, allow: Option<&[&str]>) -> Result<Map<String, Json>> {
        let view = &self.view;
        let allowed = |name: &str| match allow {
            Some(list) => list.contains(&name),
            None => view.allows(name),
        };

        let mut output = Map::new();
        let mut renamed = Vec::new();
        for (name, attr) in self.data.iter() {
            if !allowed(name) {
                continue;
            }
            let value = match attr {
                Attr::One(entity) => Json::Object(entity.to_array()?),
                Attr::Many(entities) => Json::Array(
                    entities
                        .iter()
                        .map(|e| e.to_array().map(Json::Object))
                        .collect::<Result<_>>()?,
                ),
                Attr::Value(_) => self.get(name)?.to_json(&self.ctx(name))?,
            };
            match view.mapping.get(name) {
                Some(external) => renamed.push((external.clone(), value)),
                None => {
                    output.insert(name.to_string(), value);
                }
            }
        }
        output.extend(renamed);

        for name in &view.append {
            let permitted = match allow {
                Some(list) => list.contains(&name.as_str()),
                None => !view.hidden.contains(name),
            };
            if !permitted {
                continue;
            }
            let value = self.get(name)?.to_json(&self.ctx(name))?;
            output.insert(view.external_name(name).to_string(), value);
        }

        Ok(output)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = self.to_json().map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}
