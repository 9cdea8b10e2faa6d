//! cert-manager operator

use serde_json::json;

use super::{FactoryContext, require};
use crate::component::{Component, ComponentVariant};
use crate::emission::{Emission, Emitter};
use crate::error::Result;
use crate::fragments::{ComparePatch, FleetConfig, HelmRelease, SkaffoldConfig};
use crate::values::Values;

pub const TYPE_SUFFIX: &str = "cert-manager-operator";

const WEBHOOK: &str = "cert-manager-webhook";
const ADMISSION_API: &str = "admissionregistration.k8s.io/v1";

#[derive(Debug, Clone)]
pub struct OperatorParams {
    pub slug: String,
    pub namespace: String,
    /// Resolvers used for DNS01 self-checks
    pub recursive_nameservers: Vec<String>,
    pub extra_values: Values,
}

impl OperatorParams {
    pub fn new(slug: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            namespace: namespace.into(),
            recursive_nameservers: vec!["1.1.1.1:53".into(), "8.8.8.8:53".into()],
            extra_values: Values::new(),
        }
    }
}

pub fn create(
    ctx: &FactoryContext,
    params: &OperatorParams,
    depends_on: &[&Component],
) -> Result<Emission> {
    let slug = params.slug.as_str();
    let namespace = require(slug, "namespace", &params.namespace)?;
    let component = Component::new(slug, namespace, TYPE_SUFFIX, ComponentVariant::Standard);

    let mut values = Values::from(json!({
        "installCRDs": true,
        "dns01RecursiveNameserversOnly": !params.recursive_nameservers.is_empty(),
        "dns01RecursiveNameservers": params.recursive_nameservers.join(","),
    }));
    values.merge(&params.extra_values);

    let mut emitter = Emitter::new(component.clone());
    emitter.values("cert-manager-values.yaml", &values)?;
    emitter.skaffold(
        "skaffold-cert-manager-operator.yaml",
        &SkaffoldConfig::new().with_release(HelmRelease::new(
            &component.dir_name,
            &ctx.chart("cert-manager"),
            "cert-manager-values.yaml",
            namespace,
        )),
    )?;

    // The CA bundle injected into the webhooks drifts on every rotation
    emitter.fleet(
        &FleetConfig::new(&component.dir_name, depends_on)
            .with_namespace(namespace)
            .with_compare_patch(ComparePatch::remove_path(
                ADMISSION_API,
                "MutatingWebhookConfiguration",
                WEBHOOK,
                "/webhooks",
            ))
            .with_compare_patch(ComparePatch::remove_path(
                ADMISSION_API,
                "ValidatingWebhookConfiguration",
                WEBHOOK,
                "/webhooks",
            )),
    )?;

    Ok(emitter.finish())
}
