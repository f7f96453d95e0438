// src/task/params.rs

//! Typed task parameters.
//!
//! Every registered task declares a [`ParamSchema`]. Configuration sections
//! (`[TaskName]` tables) are converted through it, so a value either has the
//! declared type or the whole invocation fails with a configuration error.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value as JsonValue;
use toml::Value as TomlValue;

use crate::errors::{Result, ScandagError};
use crate::storage::Metadata;

/// Declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Str,
    Bool,
    Int,
    Float,
    List,
    Dict,
    /// Name of another registered task; resolved into an upstream node.
    Task,
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParamType::Str => "string",
            ParamType::Bool => "bool",
            ParamType::Int => "int",
            ParamType::Float => "float",
            ParamType::List => "list",
            ParamType::Dict => "dict",
            ParamType::Task => "task",
        };
        f.write_str(s)
    }
}

/// A resolved parameter value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Str(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    List(Vec<ParamValue>),
    Dict(BTreeMap<String, ParamValue>),
    Task(String),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) | ParamValue::Task(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(f) => Some(*f),
            ParamValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ParamValue]> {
        match self {
            ParamValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<String, ParamValue>> {
        match self {
            ParamValue::Dict(map) => Some(map),
            _ => None,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        // Untagged serialization of plain data cannot fail.
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }

    pub fn to_toml(&self) -> TomlValue {
        match self {
            ParamValue::Str(s) | ParamValue::Task(s) => TomlValue::String(s.clone()),
            ParamValue::Bool(b) => TomlValue::Boolean(*b),
            ParamValue::Int(i) => TomlValue::Integer(*i),
            ParamValue::Float(f) => TomlValue::Float(*f),
            ParamValue::List(items) => {
                TomlValue::Array(items.iter().map(ParamValue::to_toml).collect())
            }
            ParamValue::Dict(map) => TomlValue::Table(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_toml()))
                    .collect(),
            ),
        }
    }

    /// Untyped conversion, used for list elements and dict values.
    fn from_toml_untyped(value: &TomlValue) -> ParamValue {
        match value {
            TomlValue::String(s) => ParamValue::Str(s.clone()),
            TomlValue::Integer(i) => ParamValue::Int(*i),
            TomlValue::Float(f) => ParamValue::Float(*f),
            TomlValue::Boolean(b) => ParamValue::Bool(*b),
            TomlValue::Datetime(d) => ParamValue::Str(d.to_string()),
            TomlValue::Array(items) => {
                ParamValue::List(items.iter().map(ParamValue::from_toml_untyped).collect())
            }
            TomlValue::Table(table) => ParamValue::Dict(
                table
                    .iter()
                    .map(|(k, v)| (k.clone(), ParamValue::from_toml_untyped(v)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Str(s) | ParamValue::Task(s) => f.write_str(s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

/// Declaration of one parameter of a task.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub ty: ParamType,
    pub default: Option<ParamValue>,
    pub required: bool,
    /// Significant parameters take part in the node identity.
    pub significant: bool,
}

impl ParamSpec {
    fn new(name: &str, ty: ParamType, default: Option<ParamValue>) -> Self {
        Self {
            name: name.to_string(),
            ty,
            required: default.is_none(),
            default,
            significant: true,
        }
    }

    pub fn string(name: &str, default: &str) -> Self {
        Self::new(name, ParamType::Str, Some(ParamValue::Str(default.to_string())))
    }

    pub fn bool(name: &str, default: bool) -> Self {
        Self::new(name, ParamType::Bool, Some(ParamValue::Bool(default)))
    }

    pub fn int(name: &str, default: i64) -> Self {
        Self::new(name, ParamType::Int, Some(ParamValue::Int(default)))
    }

    pub fn float(name: &str, default: f64) -> Self {
        Self::new(name, ParamType::Float, Some(ParamValue::Float(default)))
    }

    pub fn list(name: &str, default: Vec<ParamValue>) -> Self {
        Self::new(name, ParamType::List, Some(ParamValue::List(default)))
    }

    pub fn dict(name: &str, default: BTreeMap<String, ParamValue>) -> Self {
        Self::new(name, ParamType::Dict, Some(ParamValue::Dict(default)))
    }

    /// Upstream task reference with a default task name.
    pub fn task(name: &str, default: &str) -> Self {
        Self::new(name, ParamType::Task, Some(ParamValue::Task(default.to_string())))
    }

    /// A parameter without default that must be supplied by configuration.
    pub fn required(name: &str, ty: ParamType) -> Self {
        Self::new(name, ty, None)
    }

    /// Exclude this parameter from the node identity.
    pub fn insignificant(mut self) -> Self {
        self.significant = false;
        self
    }

    /// Convert a configuration value according to the declared type.
    pub fn parse(&self, task: &str, value: &TomlValue) -> Result<ParamValue> {
        let mismatch = || {
            ScandagError::ConfigError(format!(
                "[{task}].{} expects a {} value, got {}",
                self.name,
                self.ty,
                value.type_str()
            ))
        };

        if has_non_finite(value) {
            return Err(ScandagError::ConfigError(format!(
                "[{task}].{} must not hold NaN or infinite numbers",
                self.name
            )));
        }

        let parsed = match (self.ty, value) {
            (ParamType::Str, TomlValue::String(s)) => ParamValue::Str(s.clone()),
            (ParamType::Task, TomlValue::String(s)) => ParamValue::Task(s.clone()),
            (ParamType::Bool, TomlValue::Boolean(b)) => ParamValue::Bool(*b),
            (ParamType::Int, TomlValue::Integer(i)) => ParamValue::Int(*i),
            (ParamType::Float, TomlValue::Float(f)) => ParamValue::Float(*f),
            (ParamType::Float, TomlValue::Integer(i)) => ParamValue::Float(*i as f64),
            (ParamType::List, TomlValue::Array(_)) | (ParamType::Dict, TomlValue::Table(_)) => {
                ParamValue::from_toml_untyped(value)
            }
            _ => return Err(mismatch()),
        };
        Ok(parsed)
    }
}

/// NaN and infinities have no JSON rendering, so they cannot take part in
/// node identities.
fn has_non_finite(value: &TomlValue) -> bool {
    match value {
        TomlValue::Float(f) => !f.is_finite(),
        TomlValue::Array(items) => items.iter().any(has_non_finite),
        TomlValue::Table(table) => table.values().any(has_non_finite),
        _ => false,
    }
}

/// Ordered parameter declarations of a task.
#[derive(Debug, Clone, Default)]
pub struct ParamSchema {
    specs: Vec<ParamSpec>,
}

impl ParamSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.specs.retain(|s| s.name != spec.name);
        self.specs.push(spec);
        self
    }

    pub fn specs(&self) -> &[ParamSpec] {
        &self.specs
    }

    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    /// Resolve the effective parameters of `task` from its configuration
    /// section (`None` when the configuration has no `[task]` table).
    pub fn resolve(&self, task: &str, section: Option<&toml::Table>) -> Result<Params> {
        if let Some(section) = section {
            if let Some(unknown) = section.keys().find(|key| self.get(key).is_none()) {
                return Err(ScandagError::ConfigError(format!(
                    "[{task}] has unknown parameter '{unknown}'"
                )));
            }
        }

        let mut values = BTreeMap::new();
        for spec in &self.specs {
            let configured = section.and_then(|s| s.get(&spec.name));
            let value = match (configured, &spec.default) {
                (Some(raw), _) => spec.parse(task, raw)?,
                (None, Some(default)) => default.clone(),
                (None, None) => {
                    return Err(ScandagError::ConfigError(format!(
                        "[{task}].{} is required ({})",
                        spec.name, spec.ty
                    )));
                }
            };
            values.insert(spec.name.clone(), value);
        }

        let significant = self
            .specs
            .iter()
            .filter(|s| s.significant)
            .map(|s| s.name.clone())
            .collect();

        Ok(Params {
            values,
            significant,
        })
    }
}

/// Resolved parameter set of one task node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: BTreeMap<String, ParamValue>,
    significant: Vec<String>,
}

impl Params {
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ParamValue::as_str)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(ParamValue::as_bool)
    }

    /// String elements of a list parameter; non-string elements are skipped.
    pub fn str_list(&self, name: &str) -> Vec<String> {
        self.get(name)
            .and_then(ParamValue::as_list)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// A dict parameter rendered as a metadata filter query.
    pub fn query(&self, name: &str) -> Metadata {
        self.get(name)
            .and_then(ParamValue::as_dict)
            .map(|map| map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            .unwrap_or_default()
    }

    /// Names of `Task`-typed parameters with their referenced task names.
    pub fn task_refs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().filter_map(|(k, v)| match v {
            ParamValue::Task(t) => Some((k.as_str(), t.as_str())),
            _ => None,
        })
    }

    /// Significant parameters, sorted by name.
    pub fn significant(&self) -> BTreeMap<&str, &ParamValue> {
        self.significant
            .iter()
            .filter_map(|name| self.values.get(name).map(|v| (name.as_str(), v)))
            .collect()
    }

    /// All parameters as a JSON object (provenance metadata).
    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    /// All parameters as a TOML table (backup record section).
    pub fn to_toml(&self) -> toml::Table {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_toml()))
            .collect()
    }
}
