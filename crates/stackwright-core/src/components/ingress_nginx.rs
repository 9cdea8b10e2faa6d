//! ingress-nginx controller behind a LoadBalancer service

use serde_json::json;

use super::{FactoryContext, require};
use crate::component::{Component, ComponentVariant};
use crate::emission::{Emission, Emitter};
use crate::error::Result;
use crate::fragments::{FleetConfig, HelmRelease, SkaffoldConfig};
use crate::values::Values;

pub const TYPE_SUFFIX: &str = "ingress-nginx";

/// Ingress class registered by the controller
pub const INGRESS_CLASS: &str = "nginx";

#[derive(Debug, Clone)]
pub struct IngressNginxParams {
    pub slug: String,
    pub namespace: String,
    /// MetalLB pool the LoadBalancer address is taken from
    pub metallb_address_pool: Option<String>,
    pub extra_values: Values,
}

pub fn create(
    ctx: &FactoryContext,
    params: &IngressNginxParams,
    depends_on: &[&Component],
) -> Result<Emission> {
    let slug = params.slug.as_str();
    let namespace = require(slug, "namespace", &params.namespace)?;
    let component = Component::new(slug, namespace, TYPE_SUFFIX, ComponentVariant::Standard);

    let annotations = match params.metallb_address_pool.as_deref() {
        Some(pool) if !pool.is_empty() => json!({ "metallb.universe.tf/address-pool": pool }),
        _ => json!({}),
    };

    let mut values = Values::from(json!({
        "controller": {
            "ingressClassResource": { "name": INGRESS_CLASS, "enabled": true, "default": true },
            "service": {
                "type": "LoadBalancer",
                "externalTrafficPolicy": "Local",
                "annotations": annotations,
            },
            "config": {
                "use-forwarded-headers": "true",
                "compute-full-forwarded-for": "true",
                "use-proxy-protocol": "false",
            },
            "resources": {
                "requests": { "cpu": "100m", "memory": "128Mi" },
                "limits": { "cpu": "500m", "memory": "512Mi" },
            },
        },
        "defaultBackend": {
            "enabled": true,
            "resources": {
                "requests": { "cpu": "10m", "memory": "20Mi" },
                "limits": { "cpu": "50m", "memory": "50Mi" },
            },
        },
    }));
    values.merge(&params.extra_values);

    let mut emitter = Emitter::new(component.clone());
    emitter.values("ingress-nginx-values.yaml", &values)?;
    emitter.skaffold(
        "skaffold-ingress-nginx.yaml",
        &SkaffoldConfig::new()
            .with_release(HelmRelease::new(
                &component.dir_name,
                &ctx.chart("ingress-nginx"),
                "ingress-nginx-values.yaml",
                namespace,
            ))
            .with_default_namespace(namespace),
    )?;
    emitter.fleet(&FleetConfig::new(&component.dir_name, depends_on).with_namespace(namespace))?;

    Ok(emitter.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::testing;

    fn params(pool: Option<&str>) -> IngressNginxParams {
        IngressNginxParams {
            slug: "ingress".into(),
            namespace: "ingress-nginx".into(),
            metallb_address_pool: pool.map(String::from),
            extra_values: Values::new(),
        }
    }

    #[test]
    fn test_pool_annotation() {
        let emission = create(&testing::context(), &params(Some("default")), &[]).unwrap();
        let values = testing::yaml(&emission, "ingress-nginx-values.yaml");
        assert_eq!(
            values["controller"]["service"]["annotations"]["metallb.universe.tf/address-pool"].as_str(),
            Some("default")
        );
        assert_eq!(emission.component.dir_name, "ingress-ingress-nginx");
    }

    #[test]
    fn test_without_pool() {
        let emission = create(&testing::context(), &params(None), &[]).unwrap();
        let values = testing::yaml(&emission, "ingress-nginx-values.yaml");
        let annotations = values["controller"]["service"]["annotations"].as_mapping().unwrap();
        assert!(annotations.is_empty());
    }
}
