//! Pull and push credentials for a private image registry

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;

use super::require;
use crate::component::{Component, ComponentVariant};
use crate::emission::{Emission, Emitter};
use crate::error::Result;
use crate::fragments::{FleetConfig, SkaffoldConfig};

pub const TYPE_SUFFIX: &str = "registry";

#[derive(Debug, Clone)]
pub struct RegistryParams {
    pub slug: String,
    pub namespace: String,
    pub url: String,
    pub username: String,
    pub password: String,
    pub insecure_registries: Vec<String>,
}

/// Name of the `kubernetes.io/dockerconfigjson` pull secret
pub fn pull_secret_name(slug: &str) -> String {
    format!("{}-registry-secret", slug)
}

/// Name of the secret mounted by in-cluster kaniko builds
pub fn kaniko_secret_name(slug: &str) -> String {
    format!("{}-registry-kaniko-secret", slug)
}

pub fn create(params: &RegistryParams, depends_on: &[&Component]) -> Result<Emission> {
    let slug = params.slug.as_str();
    let namespace = require(slug, "namespace", &params.namespace)?;
    let url = require(slug, "url", &params.url)?;
    let username = require(slug, "username", &params.username)?;
    let password = require(slug, "password", &params.password)?;

    let component = Component::new(slug, namespace, TYPE_SUFFIX, ComponentVariant::Standard);
    let domain = url.split('/').next().unwrap_or(url);

    let mut docker_config = json!({
        "auths": { domain: { "username": username, "password": password } }
    });
    if !params.insecure_registries.is_empty() {
        docker_config["insecure-registries"] = json!(params.insecure_registries);
    }
    let docker_config = serde_json::to_string(&docker_config)?;

    let mut emitter = Emitter::new(component.clone());
    let pull = emitter.manifest(
        "registry-secret.yaml",
        &json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": { "name": pull_secret_name(slug), "namespace": namespace },
            "type": "kubernetes.io/dockerconfigjson",
            "data": { ".dockerconfigjson": STANDARD.encode(&docker_config) },
        }),
    )?;
    let kaniko = emitter.manifest(
        "registry-kaniko-secret.yaml",
        &json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": { "name": kaniko_secret_name(slug), "namespace": namespace },
            "type": "Opaque",
            "data": {
                "registry_url": STANDARD.encode(url),
                "registry_username": STANDARD.encode(username),
                "registry_password": STANDARD.encode(password),
                "config.json": STANDARD.encode(&docker_config),
            },
        }),
    )?;

    emitter.skaffold(
        "skaffold-registry.yaml",
        &SkaffoldConfig::new()
            .with_raw_manifest(pull)
            .with_raw_manifest(kaniko)
            .with_default_namespace(namespace),
    )?;
    emitter.fleet(
        &FleetConfig::new(&component.dir_name, depends_on).with_release_name(&component.dir_name),
    )?;

    Ok(emitter.finish())
}
