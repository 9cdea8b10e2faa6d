//! cert-manager ACME issuer solving DNS01 challenges through Cloudflare

use std::collections::BTreeMap;

use serde_json::json;

use super::{labels, opaque_secret, require};
use crate::component::{Component, ComponentVariant};
use crate::emission::{Emission, Emitter};
use crate::error::Result;
use crate::fragments::{ComparePatch, FleetConfig, SkaffoldConfig};

pub const TYPE_SUFFIX: &str = "certificate-issuer";

const ACME_SERVER: &str = "https://acme-v02.api.letsencrypt.org/directory";
const TOKEN_KEY: &str = "api-token";

#[derive(Debug, Clone)]
pub struct IssuerParams {
    pub slug: String,
    pub namespace: String,
    pub cloudflare_email: String,
    pub cloudflare_api_token: String,
}

pub fn create(params: &IssuerParams, depends_on: &[&Component]) -> Result<Emission> {
    let slug = params.slug.as_str();
    let namespace = require(slug, "namespace", &params.namespace)?;
    let email = require(slug, "cloudflare_email", &params.cloudflare_email)?;
    let token = require(slug, "cloudflare_api_token", &params.cloudflare_api_token)?;

    let issuer_name = format!("{}-issuer", slug);
    let token_secret = format!("{}-certificate-cloudflare-api-token", slug);

    let component = Component::new(
        slug,
        namespace,
        TYPE_SUFFIX,
        ComponentVariant::Issuer {
            issuer_secret_name: issuer_name.clone(),
        },
    );
    let mut emitter = Emitter::new(component.clone());

    let secret = emitter.manifest(
        "cert-manager-issuer-secret.yaml",
        &opaque_secret(
            &token_secret,
            namespace,
            labels(slug, &format!("{}-certificate-cloudflare", slug)),
            &BTreeMap::from([(TOKEN_KEY, token)]),
        ),
    )?;

    let issuer = emitter.manifest(
        "cert-manager-letsencrypt-issuer.yaml",
        &json!({
            "apiVersion": "cert-manager.io/v1",
            "kind": "Issuer",
            "metadata": {
                "name": issuer_name,
                "namespace": namespace,
                "labels": labels(slug, &format!("{}-letsencrypt", slug)),
            },
            "spec": {
                "acme": {
                    "server": ACME_SERVER,
                    "email": email,
                    "privateKeySecretRef": { "name": format!("{}-letsencrypt-production", slug) },
                    "solvers": [{
                        "dns01": {
                            "cloudflare": {
                                "email": email,
                                "apiTokenSecretRef": { "name": token_secret, "key": TOKEN_KEY },
                            }
                        }
                    }],
                }
            }
        }),
    )?;

    emitter.skaffold(
        "skaffold-certificate-issuer.yaml",
        &SkaffoldConfig::new()
            .with_raw_manifest(secret)
            .with_raw_manifest(issuer)
            .with_default_namespace(namespace),
    )?;

    emitter.fleet(
        &FleetConfig::new(&component.dir_name, depends_on)
            .with_namespace(namespace)
            .with_compare_patch(ComparePatch::ignore_server_metadata("cert-manager.io/v1", "Issuer"))
            .with_compare_patch(ComparePatch::ignore_server_metadata("v1", "Secret")),
    )?;

    Ok(emitter.finish())
}
