use std::path::Path;

use serde_json::{Map, Value};

use super::Settings;
use crate::error::SettingsError;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "NETFUSION__";

/// A configuration tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Configuration {
    root: Value,
}

impl Configuration {
    pub fn new() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }

    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, SettingsError> {
        let value: toml::Value = toml::from_str(text).map_err(|e| SettingsError::Parse(e.to_string()))?;
        let root = serde_json::to_value(value).map_err(|e| SettingsError::Parse(e.to_string()))?;
        Ok(Self { root })
    }

    pub fn from_json_str(text: &str) -> Result<Self, SettingsError> {
        let root = serde_json::from_str(text).map_err(|e| SettingsError::Parse(e.to_string()))?;
        Ok(Self { root })
    }

    /// Load a `.toml` or `.json` file; other extensions are read as TOML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| SettingsError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            _ => Self::from_toml_str(&text),
        }
    }

    /// Apply `NETFUSION__a__b=value` variables from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(std::env::vars())
    }

    /// Apply `NETFUSION__a__b=value` style pairs.
    pub fn with_overrides<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(rest) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let path = format!("netfusion:{}", rest.replace("__", ":"));
            self.set(&path, parse_scalar(value.as_ref()));
        }
        self
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Look up a section by `:`-separated path.
    pub fn section(&self, path: &str) -> Option<&Value> {
        let mut node = &self.root;
        for segment in split_path(path) {
            node = match node {
                Value::Object(map) => lookup(map, segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(node)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.section(path).and_then(|v| v.as_str())
    }

    /// Set a value, creating intermediate objects.
    pub fn set(&mut self, path: &str, value: Value) {
        let segments: Vec<&str> = split_path(path).collect();
        let Some((last, parents)) = segments.split_last() else {
            self.root = value;
            return;
        };

        let mut node = &mut self.root;
        for segment in parents {
            node = child_mut(node, segment);
        }

        match node {
            Value::Array(items) => match last.parse::<usize>() {
                Ok(index) if index < items.len() => items[index] = value,
                Ok(_) => items.push(value),
                Err(_) => {}
            },
            _ => {
                let map = ensure_object(node);
                let key = existing_key(map, last).unwrap_or_else(|| last.to_string());
                map.insert(key, value);
            }
        }
    }

    /// Bind and validate a typed settings section.
    pub fn get<T: Settings>(&self) -> Result<T, SettingsError> {
        let settings = match self.section(T::SECTION) {
            None | Some(Value::Null) => T::default(),
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| SettingsError::Malformed {
                section: T::SECTION.to_string(),
                reason: e.to_string(),
            })?,
        };
        settings.validate().map_err(|reason| SettingsError::Invalid {
            section: T::SECTION.to_string(),
            reason,
        })?;
        Ok(settings)
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split(':').filter(|s| !s.is_empty())
}

fn lookup<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key)
        .or_else(|| map.iter().find(|(k, _)| k.eq_ignore_ascii_case(key)).map(|(_, v)| v))
}

fn existing_key(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.keys().find(|k| k.eq_ignore_ascii_case(key)).cloned()
}

fn ensure_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just replaced with an object"),
    }
}

fn child_mut<'a>(node: &'a mut Value, segment: &str) -> &'a mut Value {
    let index = if node.is_array() {
        segment.parse::<usize>().ok()
    } else {
        None
    };
    match (node, index) {
        (Value::Array(items), Some(index)) => {
            let index = if index < items.len() {
                index
            } else {
                items.push(Value::Object(Map::new()));
                items.len() - 1
            };
            &mut items[index]
        }
        (node, _) => {
            let map = ensure_object(node);
            let key = existing_key(map, segment).unwrap_or_else(|| segment.to_string());
            map.entry(key).or_insert_with(|| Value::Object(Map::new()))
        }
    }
}

/// Environment values are strings; keep booleans and numbers typed.
fn parse_scalar(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ (Value::Bool(_) | Value::Number(_))) => value,
        _ => Value::String(raw.to_string()),
    }
}
