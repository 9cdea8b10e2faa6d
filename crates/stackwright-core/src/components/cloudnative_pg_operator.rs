//! CloudNativePG operator

use serde_json::json;

use super::{FactoryContext, require};
use crate::component::{Component, ComponentVariant};
use crate::emission::{Emission, Emitter};
use crate::error::Result;
use crate::fragments::{ComparePatch, FleetConfig, HelmRelease, SkaffoldConfig};
use crate::values::Values;

pub const TYPE_SUFFIX: &str = "cloudnative-pg-operator";

const ADMISSION_API: &str = "admissionregistration.k8s.io/v1";

#[derive(Debug, Clone)]
pub struct CnpgOperatorParams {
    pub slug: String,
    pub namespace: String,
    pub extra_values: Values,
}

pub fn create(
    ctx: &FactoryContext,
    params: &CnpgOperatorParams,
    depends_on: &[&Component],
) -> Result<Emission> {
    let slug = params.slug.as_str();
    let namespace = require(slug, "namespace", &params.namespace)?;
    let component = Component::new(slug, namespace, TYPE_SUFFIX, ComponentVariant::Standard);

    let limits = json!({ "cpu": "100m", "memory": "200Mi" });
    let mut values = Values::from(json!({
        "fullnameOverride": "cnpg-controller-manager",
        "crds": { "create": true },
        "config": { "create": true, "name": "cnpg-controller-manager-config" },
        "webhook": { "port": 9443 },
        "monitoring": { "enabled": true, "podMonitorEnabled": true },
        "image": {
            "repository": "ghcr.io/cloudnative-pg/cloudnative-pg",
            "pullPolicy": "IfNotPresent",
        },
        "replicaCount": 1,
        "resources": { "limits": limits, "requests": limits },
    }));
    values.merge(&params.extra_values);

    let mut emitter = Emitter::new(component.clone());
    emitter.values("cnpg-values.yaml", &values)?;
    emitter.skaffold(
        "skaffold-cloudnative-pg-operator.yaml",
        &SkaffoldConfig::new().with_release(HelmRelease::new(
            &component.dir_name,
            &ctx.chart("cloudnative-pg"),
            "cnpg-values.yaml",
            namespace,
        )),
    )?;
    emitter.fleet(
        &FleetConfig::new(&component.dir_name, depends_on)
            .with_release_name(&component.dir_name)
            .with_compare_patch(ComparePatch::remove_path(
                ADMISSION_API,
                "MutatingWebhookConfiguration",
                "cnpg-mutating-webhook-configuration",
                "/webhooks",
            ))
            .with_compare_patch(ComparePatch::remove_path(
                ADMISSION_API,
                "ValidatingWebhookConfiguration",
                "cnpg-validating-webhook-configuration",
                "/webhooks",
            )),
    )?;

    Ok(emitter.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::testing;

    #[test]
    fn test_operator_fragment() {
        let params = CnpgOperatorParams {
            slug: "cnpg".into(),
            namespace: "cnpg-system".into(),
            extra_values: Values::from(json!({ "replicaCount": 2 })),
        };
        let emission = create(&testing::context(), &params, &[]).unwrap();
        assert_eq!(emission.component.dir_name, "cnpg-cloudnative-pg-operator");

        let values = testing::yaml(&emission, "cnpg-values.yaml");
        assert_eq!(values["replicaCount"].as_u64(), Some(2));
        assert_eq!(values["fullnameOverride"].as_str(), Some("cnpg-controller-manager"));

        let fleet = testing::fleet(&emission);
        assert_eq!(fleet.diff.unwrap().compare_patches.len(), 2);
    }
}
