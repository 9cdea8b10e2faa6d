//! Component factories
//!
//! Every factory is a pure function from typed parameters and the
//! components it depends on to an [`Emission`](crate::Emission). Nothing
//! is written until the whole environment has composed.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::{Value as JsonValue, json};

use crate::error::{GenerateError, Result};
use crate::settings::{DEFAULT_IMAGES_TAG, Settings};

pub mod cert_manager_certificate;
pub mod cert_manager_issuer;
pub mod cert_manager_operator;
pub mod cloudflare_tunnel;
pub mod cloudnative_pg_operator;
pub mod fs_watchers;
pub mod ingress_nginx;
pub mod longhorn;
pub mod metallb;
pub mod namespace;
pub mod postgres;
pub mod rancher;
pub mod redis;
pub mod registry;
pub mod whatsapp_waha;

/// Run-wide inputs shared by every factory
#[derive(Debug, Clone)]
pub struct FactoryContext {
    pub charts_dir: PathBuf,
    pub images_tag: String,
}

impl FactoryContext {
    pub fn new(charts_dir: impl Into<PathBuf>) -> Self {
        Self {
            charts_dir: charts_dir.into(),
            images_tag: DEFAULT_IMAGES_TAG.to_string(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            charts_dir: settings.charts_dir.clone(),
            images_tag: settings.images_tag.clone(),
        }
    }

    /// Absolute path of a vendored chart
    pub fn chart(&self, name: &str) -> PathBuf {
        self.charts_dir.join(name)
    }
}

/// Fail when a security-relevant parameter is empty
pub(crate) fn require<'a>(component: &str, parameter: &str, value: &'a str) -> Result<&'a str> {
    if value.trim().is_empty() {
        return Err(GenerateError::missing_parameter(component, parameter));
    }
    Ok(value)
}

/// Like [`require`] for optional parameters
pub(crate) fn require_some<'a>(
    component: &str,
    parameter: &str,
    value: Option<&'a str>,
) -> Result<&'a str> {
    require(component, parameter, value.unwrap_or_default())
}

/// Recommended labels for resources a factory writes directly
pub(crate) fn labels(slug: &str, name: &str) -> JsonValue {
    json!({
        "app.kubernetes.io/name": name,
        "app.kubernetes.io/instance": slug,
        "app.kubernetes.io/managed-by": "stackwright",
    })
}

/// An `Opaque` Secret carrying `stringData`
pub(crate) fn opaque_secret(
    name: &str,
    namespace: &str,
    labels: JsonValue,
    string_data: &BTreeMap<&str, &str>,
) -> JsonValue {
    json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "labels": labels,
        },
        "type": "Opaque",
        "stringData": string_data,
    })
}

/// The parent domain of a host name (`longhorn.example.com` -> `example.com`)
pub fn root_domain(host: &str) -> &str {
    match host.split_once('.') {
        Some((_, rest)) if rest.contains('.') => rest,
        _ => host,
    }
}

/// DNS names for a wildcard certificate covering `domain`
pub fn wildcard_dns_names(domain: &str) -> Vec<String> {
    vec![domain.to_string(), format!("*.{}", domain)]
}
