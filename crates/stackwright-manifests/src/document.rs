//! Rendered Kubernetes resource documents

use serde::Deserialize;
use serde_yaml::{Mapping, Value as YamlValue};

use crate::error::{PipelineError, Result};

/// Label preferred when grouping split files
pub const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";

/// Fallback grouping label set by older charts
pub const RELEASE_LABEL: &str = "release";

/// One resource from a rendered manifest
#[derive(Debug, Clone, PartialEq)]
pub struct Document(YamlValue);

impl Document {
    pub fn new(value: YamlValue) -> Self {
        Self(value)
    }

    pub fn value(&self) -> &YamlValue {
        &self.0
    }

    fn str_at(&self, path: &[&str]) -> Option<&str> {
        let mut current = &self.0;
        for key in path {
            current = current.get(*key)?;
        }
        current.as_str().filter(|s| !s.is_empty())
    }

    pub fn kind(&self) -> Option<&str> {
        self.str_at(&["kind"])
    }

    pub fn api_version(&self) -> Option<&str> {
        self.str_at(&["apiVersion"])
    }

    pub fn name(&self) -> Option<&str> {
        self.str_at(&["metadata", "name"])
    }

    pub fn namespace(&self) -> Option<&str> {
        self.str_at(&["metadata", "namespace"])
    }

    /// Instance label, then release label
    pub fn instance(&self) -> Option<&str> {
        self.str_at(&["metadata", "labels", INSTANCE_LABEL])
            .or_else(|| self.str_at(&["metadata", "labels", RELEASE_LABEL]))
    }

    pub fn set_api_version(&mut self, api_version: &str) {
        if let YamlValue::Mapping(map) = &mut self.0 {
            map.insert("apiVersion".into(), api_version.into());
        }
    }

    /// Set `metadata.namespace`, creating `metadata` when absent
    pub fn set_namespace(&mut self, namespace: &str) {
        let YamlValue::Mapping(map) = &mut self.0 else {
            return;
        };
        let metadata = map
            .entry("metadata".into())
            .or_insert_with(|| YamlValue::Mapping(Mapping::new()));
        if !metadata.is_mapping() {
            *metadata = YamlValue::Mapping(Mapping::new());
        }
        if let YamlValue::Mapping(metadata) = metadata {
            metadata.insert("namespace".into(), namespace.into());
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.0)?)
    }
}

/// Parse a multi-document manifest
///
/// Empty documents are dropped and `kind: List` documents are flattened
/// into their items.
pub fn parse_documents(directory: &str, text: &str) -> Result<Vec<Document>> {
    let mut documents = Vec::new();
    for part in serde_yaml::Deserializer::from_str(text) {
        let value = YamlValue::deserialize(part).map_err(|e| PipelineError::InvalidManifest {
            directory: directory.to_string(),
            message: e.to_string(),
        })?;
        push_document(&mut documents, value);
    }
    Ok(documents)
}

fn push_document(documents: &mut Vec<Document>, value: YamlValue) {
    match value {
        YamlValue::Null => {}
        YamlValue::Mapping(ref map) if map.is_empty() => {}
        YamlValue::Mapping(ref map)
            if map.get("kind").and_then(YamlValue::as_str) == Some("List") =>
        {
            if let Some(YamlValue::Sequence(items)) = map.get("items") {
                for item in items.clone() {
                    push_document(documents, item);
                }
            }
        }
        other => documents.push(Document::new(other)),
    }
}
