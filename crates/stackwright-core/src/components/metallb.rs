//! MetalLB load balancer with layer 2 address pools

use serde::Deserialize;
use serde_json::json;

use super::{FactoryContext, require};
use crate::component::{Component, ComponentVariant};
use crate::emission::{Emission, Emitter};
use crate::error::{GenerateError, Result};
use crate::fragments::{FleetConfig, HelmRelease, SkaffoldConfig};
use crate::values::Values;

pub const TYPE_SUFFIX: &str = "metallb";

#[derive(Debug, Clone, Deserialize)]
pub struct AddressPool {
    pub name: String,
    pub addresses: Vec<String>,
    #[serde(default)]
    pub auto_assign: Option<bool>,
    #[serde(default)]
    pub avoid_buggy_ips: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct MetallbParams {
    pub slug: String,
    pub namespace: String,
    pub address_pools: Vec<AddressPool>,
    pub extra_values: Values,
}

pub fn create(
    ctx: &FactoryContext,
    params: &MetallbParams,
    depends_on: &[&Component],
) -> Result<Emission> {
    let slug = params.slug.as_str();
    let namespace = require(slug, "namespace", &params.namespace)?;
    let component = Component::new(slug, namespace, TYPE_SUFFIX, ComponentVariant::Standard);

    let resources = json!({
        "limits": { "cpu": "100m", "memory": "100Mi" },
        "requests": { "cpu": "50m", "memory": "50Mi" },
    });
    let mut values = Values::from(json!({
        "crds": { "enabled": true },
        "prometheus": { "serviceMonitor": { "enabled": false } },
        "controller": { "resources": resources },
        "speaker": { "resources": resources, "tolerateMaster": true },
    }));
    values.merge(&params.extra_values);

    let mut emitter = Emitter::new(component.clone());
    emitter.values("metallb-values.yaml", &values)?;

    let mut skaffold = SkaffoldConfig::new()
        .with_release(HelmRelease::new(
            &component.dir_name,
            &ctx.chart("metallb"),
            "metallb-values.yaml",
            namespace,
        ))
        .with_default_namespace(namespace);

    for pool in &params.address_pools {
        if pool.addresses.is_empty() {
            return Err(GenerateError::missing_parameter(
                slug,
                format!("address_pools.{}.addresses", pool.name),
            ));
        }

        let mut spec = json!({ "addresses": pool.addresses });
        if let Some(auto_assign) = pool.auto_assign {
            spec["autoAssign"] = json!(auto_assign);
        }
        if let Some(avoid) = pool.avoid_buggy_ips {
            spec["avoidBuggyIPs"] = json!(avoid);
        }

        let pool_manifest = emitter.manifest(
            &format!("ipaddresspool-{}.yaml", pool.name),
            &json!({
                "apiVersion": "metallb.io/v1beta1",
                "kind": "IPAddressPool",
                "metadata": { "name": pool.name, "namespace": namespace },
                "spec": spec,
            }),
        )?;
        let advertisement = emitter.manifest(
            &format!("l2advertisement-{}.yaml", pool.name),
            &json!({
                "apiVersion": "metallb.io/v1beta1",
                "kind": "L2Advertisement",
                "metadata": { "name": format!("l2-{}", pool.name), "namespace": namespace },
                "spec": { "ipAddressPools": [pool.name] },
            }),
        )?;
        skaffold = skaffold
            .with_raw_manifest(pool_manifest)
            .with_raw_manifest(advertisement);
    }

    emitter.skaffold("skaffold-metallb.yaml", &skaffold)?;
    emitter.fleet(
        &FleetConfig::new(&component.dir_name, depends_on).with_release_name(&component.dir_name),
    )?;

    Ok(emitter.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::testing;

    fn pool() -> AddressPool {
        AddressPool {
            name: "default".into(),
            addresses: vec!["10.3.0.100-10.3.255.254".into()],
            auto_assign: None,
            avoid_buggy_ips: Some(true),
        }
    }

    #[test]
    fn test_pool_manifests_are_referenced() {
        let params = MetallbParams {
            slug: "metallb".into(),
            namespace: "metallb-system".into(),
            address_pools: vec![pool()],
            extra_values: Values::new(),
        };
        let emission = create(&testing::context(), &params, &[]).unwrap();

        let skaffold = testing::skaffold(&emission, "skaffold-metallb.yaml");
        let raw = skaffold.manifests.unwrap().raw_yaml;
        assert_eq!(
            raw,
            vec![
                "./manifests/ipaddresspool-default.yaml",
                "./manifests/l2advertisement-default.yaml"
            ]
        );

        let pool = testing::yaml(&emission, "manifests/ipaddresspool-default.yaml");
        assert_eq!(pool["spec"]["avoidBuggyIPs"].as_bool(), Some(true));
        assert!(pool["spec"].get("autoAssign").is_none());
    }

    #[test]
    fn test_empty_pool_is_rejected() {
        let mut empty = pool();
        empty.addresses.clear();
        let params = MetallbParams {
            slug: "metallb".into(),
            namespace: "metallb-system".into(),
            address_pools: vec![empty],
            extra_values: Values::new(),
        };
        assert!(create(&testing::context(), &params, &[]).is_err());
    }
}
