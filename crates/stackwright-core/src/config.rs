//! The per-environment configuration document
//!
//! ```yaml
//! env:
//!   CHARTS_PATH: ../charts
//!   CLOUDFLARE_EMAIL: ops@example.com
//! components:
//!   whatsapp_waha:
//!     username: admin
//!     password: s3cret
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_yaml::Value as YamlValue;

use crate::error::{GenerateError, Result};
use crate::values::Values;

#[derive(Debug, Default, Deserialize)]
struct RawDocument {
    #[serde(default)]
    env: IndexMap<String, YamlValue>,
    #[serde(default)]
    components: IndexMap<String, YamlValue>,
}

/// A loaded configuration document, bound to the environment it configures
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    environment: String,
    path: Option<PathBuf>,
    env: IndexMap<String, YamlValue>,
    components: IndexMap<String, YamlValue>,
}

impl ConfigDocument {
    /// Load a document from disk
    pub fn load(path: &Path, environment: &str) -> Result<Self> {
        if !path.exists() {
            return Err(GenerateError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        let mut doc = Self::from_yaml(&content, environment)?;
        doc.path = Some(path.to_path_buf());
        Ok(doc)
    }

    /// Parse a document from a YAML string
    pub fn from_yaml(yaml: &str, environment: &str) -> Result<Self> {
        // An empty file is an empty document
        let raw: RawDocument = if yaml.trim().is_empty() {
            RawDocument::default()
        } else {
            serde_yaml::from_str(yaml)?
        };

        Ok(Self {
            environment: environment.to_string(),
            path: None,
            env: raw.env,
            components: raw.components,
        })
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Path the document was loaded from
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Directory relative paths in `env` are resolved against
    pub fn base_dir(&self) -> PathBuf {
        self.path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// An `env` entry as a string; empty strings count as absent
    pub fn env_str(&self, key: &str) -> Result<Option<String>> {
        match self.env.get(key) {
            None | Some(YamlValue::Null) => Ok(None),
            Some(value) => {
                let s = scalar_to_string(value).ok_or_else(|| GenerateError::InvalidValue {
                    environment: self.environment.clone(),
                    section: "env".to_string(),
                    key: key.to_string(),
                    message: "expected a scalar".to_string(),
                })?;
                Ok((!s.is_empty()).then_some(s))
            }
        }
    }

    /// An `env` entry that must be present and non-empty
    pub fn require_env(&self, key: &str) -> Result<String> {
        self.env_str(key)?
            .ok_or_else(|| GenerateError::MissingEnvKey {
                environment: self.environment.clone(),
                key: key.to_string(),
            })
    }

    /// An `env` entry interpreted as a boolean (`true`, `"true"`, `"1"`, `"yes"`)
    pub fn env_flag(&self, key: &str) -> Result<bool> {
        Ok(self
            .env_str(key)?
            .map(|s| matches!(s.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false))
    }

    /// An `env` entry as a path, resolved against [`Self::base_dir`]
    pub fn env_path(&self, key: &str) -> Result<Option<PathBuf>> {
        Ok(self.env_str(key)?.map(|s| {
            let path = PathBuf::from(s);
            if path.is_absolute() {
                path
            } else {
                self.base_dir().join(path)
            }
        }))
    }

    pub fn has_component(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }

    /// Accessor for `components.<name>`; an absent section reads as empty
    pub fn component(&self, name: &str) -> ComponentConfig<'_> {
        ComponentConfig {
            environment: &self.environment,
            name: name.to_string(),
            value: self.components.get(name),
        }
    }
}

/// Typed view over one `components.<name>` mapping
#[derive(Debug, Clone)]
pub struct ComponentConfig<'a> {
    environment: &'a str,
    name: String,
    value: Option<&'a YamlValue>,
}

impl<'a> ComponentConfig<'a> {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<&'a YamlValue> {
        self.value
            .and_then(|v| v.get(key))
            .filter(|v| !v.is_null())
    }

    fn missing(&self, key: &str) -> GenerateError {
        GenerateError::MissingKey {
            environment: self.environment.to_string(),
            component: self.name.clone(),
            key: key.to_string(),
        }
    }

    fn invalid(&self, key: &str, message: impl Into<String>) -> GenerateError {
        GenerateError::InvalidValue {
            environment: self.environment.to_string(),
            section: format!("components.{}", self.name),
            key: key.to_string(),
            message: message.into(),
        }
    }

    /// A string that must be present and non-empty
    pub fn require_str(&self, key: &str) -> Result<String> {
        self.optional_str(key)?.ok_or_else(|| self.missing(key))
    }

    pub fn optional_str(&self, key: &str) -> Result<Option<String>> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => {
                let s = scalar_to_string(value)
                    .ok_or_else(|| self.invalid(key, "expected a scalar"))?;
                Ok((!s.is_empty()).then_some(s))
            }
        }
    }

    pub fn str_or(&self, key: &str, default: &str) -> Result<String> {
        Ok(self
            .optional_str(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key) {
            None => Ok(default),
            Some(YamlValue::Bool(b)) => Ok(*b),
            Some(YamlValue::String(s)) => match s.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(true),
                "false" | "no" | "0" => Ok(false),
                _ => Err(self.invalid(key, format!("expected a boolean, got '{}'", s))),
            },
            Some(_) => Err(self.invalid(key, "expected a boolean")),
        }
    }

    pub fn u32_or(&self, key: &str, default: u32) -> Result<u32> {
        match self.get(key) {
            None => Ok(default),
            Some(YamlValue::Number(n)) => n
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| self.invalid(key, format!("expected a positive integer, got {}", n))),
            Some(YamlValue::String(s)) => s
                .parse()
                .map_err(|_| self.invalid(key, format!("expected a positive integer, got '{}'", s))),
            Some(_) => Err(self.invalid(key, "expected a positive integer")),
        }
    }

    /// A list of scalars; absent reads as empty
    pub fn string_list(&self, key: &str) -> Result<Vec<String>> {
        match self.get(key) {
            None => Ok(Vec::new()),
            Some(YamlValue::Sequence(items)) => items
                .iter()
                .map(|item| {
                    scalar_to_string(item).ok_or_else(|| self.invalid(key, "expected a list of scalars"))
                })
                .collect(),
            Some(_) => Err(self.invalid(key, "expected a list")),
        }
    }

    /// A flat string mapping; absent reads as empty
    pub fn string_map(&self, key: &str) -> Result<BTreeMap<String, String>> {
        match self.get(key) {
            None => Ok(BTreeMap::new()),
            Some(YamlValue::Mapping(map)) => map
                .iter()
                .map(|(k, v)| {
                    let k = scalar_to_string(k).ok_or_else(|| self.invalid(key, "expected scalar keys"))?;
                    let v = scalar_to_string(v).ok_or_else(|| self.invalid(key, "expected scalar values"))?;
                    Ok((k, v))
                })
                .collect(),
            Some(_) => Err(self.invalid(key, "expected a mapping")),
        }
    }

    /// Extra Helm values under `values`, deep-merged over factory defaults
    pub fn values_overrides(&self) -> Result<Values> {
        match self.get("values") {
            None => Ok(Values::new()),
            Some(value @ YamlValue::Mapping(_)) => {
                let json = serde_json::to_value(value)?;
                Ok(Values::from(json))
            }
            Some(_) => Err(self.invalid("values", "expected a mapping")),
        }
    }

    /// Deserialize a structured entry, e.g. a list of address pools
    pub fn deserialize<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => serde_yaml::from_value(value.clone())
                .map(Some)
                .map_err(|e| self.invalid(key, e.to_string())),
        }
    }
}

fn scalar_to_string(value: &YamlValue) -> Option<String> {
    match value {
        YamlValue::String(s) => Some(s.clone()),
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
