//! WhatsApp HTTP API (WAHA) behind an authenticated ingress

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;
use sha1::{Digest, Sha1};

use super::{FactoryContext, labels, require};
use crate::component::{Component, ComponentVariant};
use crate::emission::{Emission, Emitter};
use crate::error::Result;
use crate::fragments::{FleetConfig, HelmRelease, SkaffoldConfig};
use crate::values::Values;

pub const TYPE_SUFFIX: &str = "whatsapp-waha";

const DEFAULT_REALM: &str = "Authentication Required";

#[derive(Debug, Clone)]
pub struct WahaIngress {
    pub host: String,
    pub class_name: String,
    pub tls_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WahaParams {
    pub slug: String,
    pub namespace: String,
    pub image_repository: String,
    pub image_tag: String,
    pub replicas: u32,
    pub env: BTreeMap<String, String>,
    pub ingress: Option<WahaIngress>,
    /// Basic auth credentials protecting the API
    pub username: String,
    pub password: String,
    pub extra_values: Values,
}

impl WahaParams {
    pub fn new(slug: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            namespace: namespace.into(),
            image_repository: "devlikeapro/waha".into(),
            image_tag: "latest".into(),
            replicas: 1,
            env: BTreeMap::new(),
            ingress: None,
            username: String::new(),
            password: String::new(),
            extra_values: Values::new(),
        }
    }
}

/// One htpasswd line using the `{SHA}` scheme understood by ingress-nginx
pub fn htpasswd_line(username: &str, password: &str) -> String {
    let digest = Sha1::digest(password.as_bytes());
    format!("{}:{{SHA}}{}", username, STANDARD.encode(digest))
}

pub fn create(
    ctx: &FactoryContext,
    params: &WahaParams,
    depends_on: &[&Component],
) -> Result<Emission> {
    let slug = params.slug.as_str();
    let namespace = require(slug, "namespace", &params.namespace)?;
    let username = require(slug, "username", &params.username)?;
    let password = require(slug, "password", &params.password)?;

    let component = Component::new(slug, namespace, TYPE_SUFFIX, ComponentVariant::Standard);
    let auth_secret = format!("{}-basic-auth", slug);

    let mut values = Values::from(json!({
        "nameOverride": slug,
        "replicaCount": params.replicas,
        "image": { "repository": params.image_repository, "tag": params.image_tag },
        "service": { "type": "ClusterIP", "port": 80, "targetPort": 3000 },
        "env": params.env,
        "ingress": { "enabled": params.ingress.is_some() },
        "basicAuth": { "enabled": true, "secretName": auth_secret, "realm": DEFAULT_REALM },
    }));

    if let Some(ingress) = &params.ingress {
        let host = require(slug, "ingress.host", &ingress.host)?;
        values.set("ingress.className", json!(ingress.class_name));
        values.set(
            "ingress.hosts",
            json!([{ "host": host, "paths": [{ "path": "/", "pathType": "Prefix" }] }]),
        );
        values.set(
            "ingress.annotations",
            json!({
                "nginx.ingress.kubernetes.io/auth-type": "basic",
                "nginx.ingress.kubernetes.io/auth-secret": auth_secret,
                "nginx.ingress.kubernetes.io/auth-realm": DEFAULT_REALM,
            }),
        );
        if let Some(tls) = ingress.tls_secret.as_deref() {
            let tls = require(slug, "ingress.tls_secret", tls)?;
            values.set("ingress.tls", json!([{ "secretName": tls, "hosts": [host] }]));
        }
    }
    values.merge(&params.extra_values);

    let mut emitter = Emitter::new(component.clone());
    emitter.values("values.yaml", &values)?;

    let htpasswd = htpasswd_line(username, password);
    let secret = emitter.manifest(
        "basic-auth-secret.yaml",
        &json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {
                "name": auth_secret,
                "namespace": namespace,
                "labels": labels(slug, &auth_secret),
            },
            "type": "Opaque",
            "data": { "auth": STANDARD.encode(htpasswd) },
        }),
    )?;

    emitter.skaffold(
        "skaffold-whatsapp-waha.yaml",
        &SkaffoldConfig::new()
            .with_release(HelmRelease::new(
                &component.dir_name,
                &ctx.chart("whatsapp-waha"),
                "values.yaml",
                namespace,
            ))
            .with_raw_manifest(secret)
            .with_default_namespace(namespace),
    )?;
    emitter.fleet(&FleetConfig::new(&component.dir_name, depends_on).with_namespace(namespace))?;

    Ok(emitter.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::testing;

    fn params() -> WahaParams {
        let mut p = WahaParams::new("whatsapp", "whatsapp");
        p.username = "admin".into();
        p.password = "password".into();
        p.ingress = Some(WahaIngress {
            host: "waha.example.com".into(),
            class_name: "nginx".into(),
            tls_secret: Some("whatsapp-certificate".into()),
        });
        p
    }

    #[test]
    fn test_htpasswd_line() {
        // Reference value produced by `htpasswd -nbs admin password`
        assert_eq!(
            htpasswd_line("admin", "password"),
            "admin:{SHA}W6ph5Mm5Pz8GgiULbPgzG37mj9g="
        );
    }

    #[test]
    fn test_basic_auth_secret() {
        let emission = create(&testing::context(), &params(), &[]).unwrap();
        let secret = testing::yaml(&emission, "manifests/basic-auth-secret.yaml");
        assert_eq!(secret["metadata"]["name"].as_str(), Some("whatsapp-basic-auth"));

        let encoded = secret["data"]["auth"].as_str().unwrap();
        let decoded = String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap();
        assert!(decoded.starts_with("admin:{SHA}"));
        assert!(!decoded.contains("password"));
    }

    #[test]
    fn test_ingress_values() {
        let emission = create(&testing::context(), &params(), &[]).unwrap();
        let values = testing::yaml(&emission, "values.yaml");
        assert_eq!(values["ingress"]["hosts"][0]["host"].as_str(), Some("waha.example.com"));
        assert_eq!(values["ingress"]["tls"][0]["secretName"].as_str(), Some("whatsapp-certificate"));
        assert_eq!(
            values["ingress"]["annotations"]["nginx.ingress.kubernetes.io/auth-secret"].as_str(),
            Some("whatsapp-basic-auth")
        );
    }

    #[test]
    fn test_credentials_are_required() {
        let mut p = params();
        p.username.clear();
        let err = create(&testing::context(), &p, &[]).unwrap_err();
        assert!(err.to_string().contains("username"));

        let mut p = params();
        p.password.clear();
        assert!(create(&testing::context(), &p, &[]).is_err());
    }
}
