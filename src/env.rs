use crate::resolver::is_falsey_str;
use crate::value::Value;
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Suppresses non-fatal warnings (undefined variables, argument order).
pub const SILENT: &str = "SILENT";
/// Prints resolved arguments before every command call.
pub const DEBUG: &str = "DEBUG";
/// Alias of [`DEBUG`].
pub const CHATTY: &str = "CHATTY";
/// Overrides the prompt string.
pub const PROMPT: &str = "PROMPT";

pub const DEFAULT_PROMPT: &str = "> ";
pub const DEFAULT_ENV_FILE: &str = "env.json";

/// Host-supplied conversion for values without a native JSON form, used when
/// saving the environment. Returning `None` keeps the value unserializable.
pub type JsonFallback = dyn Fn(&Value) -> Option<JsonValue>;

/// Errors that can occur when loading or saving an environment file.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("failed to read environment file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write environment file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse environment file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("environment file '{path}' does not hold a json object")]
    NotObject { path: PathBuf },

    #[error("variable '{key}' holds a value of type {type_name} which is not json serializable")]
    NotSerializable { key: String, type_name: String },
}

/// Session variables and behavior flags shared by every stage of every line.
///
/// Lives as long as the interpreter that owns it. Commands see it through
/// [`crate::command::Context`]; the completion helper reads it to propose
/// variable names.
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    vars: BTreeMap<String, Value>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// An environment holding only the default flags.
    pub fn new() -> Self {
        let mut env = Self::empty();
        env.set_var(SILENT, false);
        env.set_var(DEBUG, false);
        env.set_var(PROMPT, DEFAULT_PROMPT);
        env
    }

    pub fn empty() -> Self {
        Self {
            vars: BTreeMap::new(),
        }
    }

    pub fn get_var(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    /// Set or override a variable, returning the previous value.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<Value>) -> Option<Value> {
        self.vars.insert(key.into(), val.into())
    }

    pub fn remove_var(&mut self, key: &str) -> Option<Value> {
        self.vars.remove(key)
    }

    pub fn vars(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    fn flag(&self, key: &str) -> bool {
        match self.vars.get(key) {
            Some(Value::Str(s)) => !is_falsey_str(s),
            Some(value) => value.is_truthy(),
            None => false,
        }
    }

    pub fn is_silent(&self) -> bool {
        self.flag(SILENT)
    }

    pub fn is_debug(&self) -> bool {
        self.flag(DEBUG) || self.flag(CHATTY)
    }

    pub fn prompt(&self) -> String {
        match self.vars.get(PROMPT) {
            None | Some(Value::None) => DEFAULT_PROMPT.to_string(),
            Some(value) => value.to_string(),
        }
    }

    /// Replace this environment with `other` or merge `other` into it, with
    /// incoming keys winning on conflict.
    pub fn absorb(&mut self, other: Environment, overwrite: bool) {
        if overwrite {
            *self = other;
        } else {
            self.vars.extend(other.vars);
        }
    }

    /// Build an environment from a JSON object. JSON scalars become scalar
    /// values, arrays and objects stay JSON.
    pub fn from_json(json: JsonValue) -> Option<Self> {
        match json {
            JsonValue::Object(map) => Some(Self {
                vars: map
                    .into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            }),
            _ => None,
        }
    }

    /// Serialize every variable; values without a JSON form go through
    /// `fallback` or fail the whole conversion.
    pub fn to_json(&self, fallback: Option<&JsonFallback>) -> Result<JsonValue, EnvError> {
        let mut map = Map::new();
        for (key, value) in &self.vars {
            let json = value
                .to_json()
                .or_else(|| fallback.and_then(|f| f(value)))
                .ok_or_else(|| EnvError::NotSerializable {
                    key: key.clone(),
                    type_name: match value {
                        Value::Foreign(f) => f.type_name().to_string(),
                        other => other.type_name().to_string(),
                    },
                })?;
            map.insert(key.clone(), json);
        }
        Ok(JsonValue::Object(map))
    }

    /// Read an environment file and replace or merge into this environment.
    /// On error this environment is left unchanged.
    pub fn load_file(&mut self, path: impl AsRef<Path>, overwrite: bool) -> Result<(), EnvError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| EnvError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let json: JsonValue = serde_json::from_str(&content).map_err(|e| EnvError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        let loaded = Self::from_json(json).ok_or_else(|| EnvError::NotObject {
            path: path.to_path_buf(),
        })?;

        tracing::debug!(
            path = %path.display(),
            vars = loaded.len(),
            overwrite,
            "loaded environment"
        );
        self.absorb(loaded, overwrite);
        Ok(())
    }

    /// Write this environment as a JSON object. The file is only opened once
    /// every value has been serialized, so a failing save leaves an existing
    /// file untouched.
    pub fn save_file(
        &self,
        path: impl AsRef<Path>,
        fallback: Option<&JsonFallback>,
    ) -> Result<(), EnvError> {
        let path = path.as_ref();
        let json = self.to_json(fallback)?;
        let content = serde_json::to_string_pretty(&json).map_err(|e| EnvError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        fs::write(path, content).map_err(|e| EnvError::Write {
            path: path.to_path_buf(),
            source: e,
        })?;

        tracing::debug!(path = %path.display(), vars = self.len(), "saved environment");
        Ok(())
    }
}
