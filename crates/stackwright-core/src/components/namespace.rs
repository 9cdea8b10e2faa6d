//! Namespace factory

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::json;

use super::require;
use crate::component::{Component, ComponentVariant};
use crate::emission::{Emission, Emitter};
use crate::error::Result;
use crate::fragments::{FleetConfig, SkaffoldConfig};

pub const TYPE_SUFFIX: &str = "namespace";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NamespaceParams {
    pub slug: String,
    pub namespace: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl NamespaceParams {
    pub fn new(slug: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            namespace: namespace.into(),
            ..Self::default()
        }
    }
}

/// One entry of a bulk namespace list
#[derive(Debug, Clone, Deserialize)]
pub struct NamespaceEntry {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

pub fn create(params: &NamespaceParams, depends_on: &[&Component]) -> Result<Emission> {
    let slug = &params.slug;
    let namespace = require(slug, "namespace", &params.namespace)?;
    let component = Component::new(slug.as_str(), namespace, TYPE_SUFFIX, ComponentVariant::Namespace);

    let mut metadata = json!({ "name": namespace });
    if !params.labels.is_empty() {
        metadata["labels"] = json!(params.labels);
    }
    if !params.annotations.is_empty() {
        metadata["annotations"] = json!(params.annotations);
    }

    let mut emitter = Emitter::new(component.clone());
    let manifest = emitter.manifest(
        "namespace.yaml",
        &json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": metadata,
        }),
    )?;

    emitter.skaffold(
        "skaffold-namespace.yaml",
        &SkaffoldConfig::new()
            .with_raw_manifest(manifest)
            .with_default_namespace(namespace),
    )?;
    emitter.fleet(
        &FleetConfig::new(&component.dir_name, depends_on).with_release_name(&component.dir_name),
    )?;

    Ok(emitter.finish())
}

/// Create one namespace component per entry; slugs derive from the names
pub fn create_many(entries: &[NamespaceEntry], depends_on: &[&Component]) -> Result<Vec<Emission>> {
    entries
        .iter()
        .map(|entry| {
            let params = NamespaceParams {
                slug: entry.name.replace('_', "-"),
                namespace: entry.name.clone(),
                labels: entry.labels.clone(),
                annotations: entry.annotations.clone(),
            };
            create(&params, depends_on)
        })
        .collect()
}
