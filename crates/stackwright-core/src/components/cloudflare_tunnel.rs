//! Cloudflare tunnel connector (cloudflared)

use std::collections::BTreeMap;

use serde_json::json;

use super::{FactoryContext, labels, opaque_secret, require};
use crate::component::{Component, ComponentVariant};
use crate::emission::{Emission, Emitter};
use crate::error::Result;
use crate::fragments::{FleetConfig, HelmRelease, SkaffoldConfig};
use crate::values::Values;

pub const TYPE_SUFFIX: &str = "cloudflare-tunnel";

#[derive(Debug, Clone)]
pub struct TunnelParams {
    pub slug: String,
    pub namespace: String,
    pub token: String,
    pub replicas: u32,
    pub image_repository: String,
    pub image_tag: String,
    pub env: BTreeMap<String, String>,
    pub extra_values: Values,
}

impl TunnelParams {
    pub fn new(slug: impl Into<String>, namespace: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            namespace: namespace.into(),
            token: token.into(),
            replicas: 2,
            image_repository: "cloudflare/cloudflared".into(),
            image_tag: "latest".into(),
            env: BTreeMap::new(),
            extra_values: Values::new(),
        }
    }
}

pub fn create(
    ctx: &FactoryContext,
    params: &TunnelParams,
    depends_on: &[&Component],
) -> Result<Emission> {
    let slug = params.slug.as_str();
    let namespace = require(slug, "namespace", &params.namespace)?;
    let token = require(slug, "token", &params.token)?;
    let component = Component::new(slug, namespace, TYPE_SUFFIX, ComponentVariant::Standard);
    let token_secret = format!("{}-cloudflare-tunnel-token", slug);

    // The chart reads the token from the secret, never from values
    let mut values = Values::from(json!({
        "nameOverride": slug,
        "fullnameOverride": format!("{}-cloudflared", slug),
        "image": { "repository": params.image_repository, "tag": params.image_tag },
        "replicas": params.replicas,
        "existingSecret": { "name": token_secret, "key": "token" },
        "envVars": params.env,
    }));
    values.merge(&params.extra_values);

    let mut emitter = Emitter::new(component.clone());
    emitter.values("values.yaml", &values)?;
    let secret = emitter.manifest(
        "token-secret.yaml",
        &opaque_secret(
            &token_secret,
            namespace,
            labels(slug, &token_secret),
            &BTreeMap::from([("token", token)]),
        ),
    )?;

    emitter.skaffold(
        "skaffold-cloudflare-tunnel.yaml",
        &SkaffoldConfig::new()
            .with_release(HelmRelease::new(
                &component.dir_name,
                &ctx.chart("cloudflare-tunnel"),
                "values.yaml",
                namespace,
            ))
            .with_raw_manifest(secret)
            .with_default_namespace(namespace),
    )?;
    emitter.fleet(
        &FleetConfig::new(&component.dir_name, depends_on).with_release_name(&component.dir_name),
    )?;

    Ok(emitter.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::testing;

    #[test]
    fn test_token_only_in_secret() {
        let emission = create(
            &testing::context(),
            &TunnelParams::new("edge", "whatsapp", "tunnel-token"),
            &[],
        )
        .unwrap();

        let values = emission.file("values.yaml").unwrap();
        assert!(!values.contents.contains("tunnel-token"));

        let secret = testing::yaml(&emission, "manifests/token-secret.yaml");
        assert_eq!(secret["stringData"]["token"].as_str(), Some("tunnel-token"));
        assert_eq!(emission.component.dir_name, "edge-cloudflare-tunnel");
    }

    #[test]
    fn test_token_is_required() {
        let params = TunnelParams::new("edge", "whatsapp", "");
        assert!(create(&testing::context(), &params, &[]).is_err());
    }
}
