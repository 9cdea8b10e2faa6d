//! Cluster platform: cert-manager, MetalLB, ingress-nginx, Longhorn and Rancher

use crate::components::FactoryContext;
use crate::components::cert_manager_operator::{self, OperatorParams};
use crate::components::fs_watchers::{self, FsWatchersParams};
use crate::components::ingress_nginx::{self, INGRESS_CLASS, IngressNginxParams};
use crate::components::longhorn::{self, LonghornIngress, LonghornParams, StorageClass};
use crate::components::metallb::{self, AddressPool, MetallbParams};
use crate::components::namespace::{self, NamespaceEntry, NamespaceParams};
use crate::components::rancher::{self, RancherParams};
use crate::config::ConfigDocument;
use crate::error::Result;
use crate::generation::Generation;

use super::tls_chain;

const DEFAULT_POOL: &str = "default";

pub(super) fn compose(
    generation: &mut Generation,
    doc: &ConfigDocument,
    ctx: &FactoryContext,
) -> Result<()> {
    generation.compose("increase-fs-watchers-limit", |g| {
        g.add(fs_watchers::create(
            &FsWatchersParams::new("increase-fs-watchers-limit", "kube-system"),
            &[],
        )?)
    })?;

    // Workload namespaces managed outside any chart
    let extra_namespaces = doc
        .component("namespaces")
        .deserialize::<Vec<NamespaceEntry>>("extra")
        .and_then(|entries| namespace::create_many(&entries.unwrap_or_default(), &[]))
        .map_err(|e| e.in_component("namespaces"))?;
    for emission in extra_namespaces {
        generation.add(emission).map_err(|e| e.in_component("namespaces"))?;
    }

    // cert-manager
    let cert_manager_ns = generation.compose("cert-manager", |g| {
        g.add(namespace::create(&NamespaceParams::new("cert-manager", "cert-manager"), &[])?)
    })?;
    let cert_manager = generation.compose("cert-manager", |g| {
        let config = doc.component("cert_manager");
        let mut params = OperatorParams::new("cert-manager", "cert-manager");
        params.extra_values = config.values_overrides()?;
        g.add(cert_manager_operator::create(ctx, &params, &[&cert_manager_ns])?)
    })?;

    // MetalLB
    let metallb_ns = generation.compose("metallb", |g| {
        g.add(namespace::create(&NamespaceParams::new("metallb", "metallb-system"), &[])?)
    })?;
    let metallb = generation.compose("metallb", |g| {
        let config = doc.component("metallb");
        let address_pools = config
            .deserialize::<Vec<AddressPool>>("address_pools")?
            .unwrap_or_else(|| {
                vec![AddressPool {
                    name: DEFAULT_POOL.to_string(),
                    addresses: vec!["10.3.0.100-10.3.255.254".to_string()],
                    auto_assign: None,
                    avoid_buggy_ips: None,
                }]
            });
        let params = MetallbParams {
            slug: "metallb".into(),
            namespace: "metallb-system".into(),
            address_pools,
            extra_values: config.values_overrides()?,
        };
        g.add(metallb::create(ctx, &params, &[&metallb_ns])?)
    })?;

    // ingress-nginx
    let ingress_ns = generation.compose("ingress-nginx", |g| {
        g.add(namespace::create(&NamespaceParams::new("ingress-nginx", "ingress-nginx"), &[])?)
    })?;
    let ingress = generation.compose("ingress", |g| {
        let config = doc.component("ingress_nginx");
        let params = IngressNginxParams {
            slug: "ingress".into(),
            namespace: "ingress-nginx".into(),
            metallb_address_pool: Some(config.str_or("metallb_address_pool", DEFAULT_POOL)?),
            extra_values: config.values_overrides()?,
        };
        g.add(ingress_nginx::create(ctx, &params, &[&ingress_ns, &metallb])?)
    })?;

    // Longhorn
    let longhorn_host = doc
        .component("longhorn")
        .require_str("domain_name")
        .map_err(|e| e.in_component("longhorn"))?;
    let longhorn_tls =
        tls_chain(generation, doc, "longhorn", "longhorn-system", &longhorn_host, &cert_manager)?;
    let longhorn = generation.compose("longhorn", |g| {
        let config = doc.component("longhorn");
        let storage_classes = config
            .deserialize::<Vec<StorageClass>>("storage_classes")?
            .unwrap_or_else(StorageClass::default_tiers);
        let params = LonghornParams {
            slug: "longhorn".into(),
            namespace: "longhorn-system".into(),
            ingress: Some(LonghornIngress {
                host: longhorn_host.clone(),
                class_name: INGRESS_CLASS.into(),
                tls_secret: longhorn_tls.certificate.certificate_secret_name().map(String::from),
            }),
            storage_classes,
            extra_values: config.values_overrides()?,
        };
        g.add(longhorn::create(
            ctx,
            &params,
            &[&longhorn_tls.namespace, &ingress, &longhorn_tls.certificate],
        )?)
    })?;

    // Rancher
    let rancher_host = doc
        .component("rancher")
        .require_str("domain_name")
        .map_err(|e| e.in_component("rancher"))?;
    let rancher_tls = tls_chain(generation, doc, "rancher", "rancher", &rancher_host, &cert_manager)?;
    generation.compose("rancher", |g| {
        let config = doc.component("rancher");
        let params = RancherParams {
            slug: "rancher".into(),
            namespace: "rancher".into(),
            hostname: rancher_host.clone(),
            replicas: config.u32_or("replicas", 3)?,
            bootstrap_password: config.require_str("bootstrap_password")?,
            certificate_secret_name: rancher_tls.certificate.require_certificate_secret_name()?.to_string(),
            ingress_class_name: INGRESS_CLASS.into(),
            kube_version: config.optional_str("kube_version")?,
            extra_env: config.string_map("extra_env")?.into_iter().collect(),
            extra_values: config.values_overrides()?,
        };
        g.add(rancher::create(
            ctx,
            &params,
            &[&rancher_tls.namespace, &rancher_tls.certificate, &ingress, &longhorn],
        )?)
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::components::testing;
    use crate::config::ConfigDocument;
    use crate::environments::{EnvironmentName, compose};

    const CONFIG: &str = r#"
env:
  CLOUDFLARE_EMAIL: ops@example.com
  CLOUDFLARE_API_TOKEN: cf-token
components:
  longhorn:
    domain_name: longhorn.lab.example.com
  rancher:
    domain_name: rancher.lab.example.com
    bootstrap_password: change-me
    replicas: 1
"#;

    #[test]
    fn test_sample_composes_in_dependency_order() {
        let doc = ConfigDocument::from_yaml(CONFIG, "sample").unwrap();
        let generation = compose(EnvironmentName::Sample, &doc, &testing::context()).unwrap();
        let dirs: Vec<_> = generation.components().into_iter().map(|c| c.dir_name).collect();

        let position = |dir: &str| {
            dirs.iter()
                .position(|d| d == dir)
                .unwrap_or_else(|| panic!("{} missing from {:?}", dir, dirs))
        };
        assert_eq!(position("increase-fs-watchers-limit-fs-watchers"), 0);
        assert!(position("metallb-metallb") < position("ingress-ingress-nginx"));
        assert!(position("longhorn-certificate") < position("longhorn-longhorn"));
        assert!(position("longhorn-longhorn") < position("rancher-rancher"));
    }

    #[test]
    fn test_extra_namespaces_are_composed() {
        let config = format!(
            "{}  namespaces:\n    extra:\n      - name: team-a\n        labels:\n          owner: team-a\n",
            CONFIG
        );
        let doc = ConfigDocument::from_yaml(&config, "sample").unwrap();
        let generation = compose(EnvironmentName::Sample, &doc, &testing::context()).unwrap();

        let team = generation
            .components()
            .into_iter()
            .find(|c| c.dir_name == "team-a-namespace")
            .expect("team-a namespace composed");
        assert_eq!(team.namespace, "team-a");
    }

    #[test]
    fn test_rancher_bootstrap_password_is_required() {
        let doc = ConfigDocument::from_yaml(
            &CONFIG.replace("    bootstrap_password: change-me\n", ""),
            "sample",
        )
        .unwrap();
        let err = compose(EnvironmentName::Sample, &doc, &testing::context()).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("bootstrap_password"));
    }
}
