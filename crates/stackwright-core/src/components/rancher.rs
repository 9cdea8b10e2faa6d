//! Rancher management server

use serde_json::{Value as JsonValue, json};

use super::{FactoryContext, require};
use crate::component::{Component, ComponentVariant};
use crate::emission::{Emission, Emitter};
use crate::error::Result;
use crate::fragments::{FleetConfig, HelmRelease, SkaffoldConfig};
use crate::values::Values;

pub const TYPE_SUFFIX: &str = "rancher";

#[derive(Debug, Clone)]
pub struct RancherParams {
    pub slug: String,
    pub namespace: String,
    pub hostname: String,
    pub replicas: u32,
    pub bootstrap_password: String,
    pub certificate_secret_name: String,
    pub ingress_class_name: String,
    /// Passed as `--kube-version` when the chart refuses the cluster version
    pub kube_version: Option<String>,
    pub extra_env: Vec<(String, String)>,
    pub extra_values: Values,
}

pub fn create(
    ctx: &FactoryContext,
    params: &RancherParams,
    depends_on: &[&Component],
) -> Result<Emission> {
    let slug = params.slug.as_str();
    let namespace = require(slug, "namespace", &params.namespace)?;
    let hostname = require(slug, "hostname", &params.hostname)?;
    let password = require(slug, "bootstrap_password", &params.bootstrap_password)?;
    let tls_secret = require(slug, "certificate_secret_name", &params.certificate_secret_name)?;

    let component = Component::new(slug, namespace, TYPE_SUFFIX, ComponentVariant::Standard);

    let mut values = Values::from(json!({
        "hostname": hostname,
        "replicas": params.replicas,
        "bootstrapPassword": password,
        "tls": "ingress",
        "ingress": {
            "ingressClassName": params.ingress_class_name,
            "tls": { "source": "secret", "secretName": tls_secret },
        },
        "resources": {
            "limits": { "cpu": "1000m", "memory": "1Gi" },
            "requests": { "cpu": "250m", "memory": "750Mi" },
        },
        "auditLog": { "level": 0, "maxAge": 1, "maxBackup": 1, "maxSize": 100 },
        "priorityClassName": "rancher-critical",
    }));
    if !params.extra_env.is_empty() {
        let env: Vec<JsonValue> = params
            .extra_env
            .iter()
            .map(|(name, value)| json!({ "name": name, "value": value }))
            .collect();
        values.set("extraEnv", JsonValue::Array(env));
    }
    values.merge(&params.extra_values);

    let mut skaffold = SkaffoldConfig::new().with_release(HelmRelease::new(
        &component.dir_name,
        &ctx.chart("rancher"),
        "rancher-values.yaml",
        namespace,
    ));
    if let Some(version) = params.kube_version.as_deref().filter(|v| !v.is_empty()) {
        skaffold = skaffold.with_template_flag(format!("--kube-version={}", version));
    }

    let mut emitter = Emitter::new(component.clone());
    emitter.values("rancher-values.yaml", &values)?;
    emitter.skaffold("skaffold-rancher.yaml", &skaffold)?;
    emitter.fleet(
        &FleetConfig::new(&component.dir_name, depends_on)
            .with_namespace(namespace)
            .with_release_name(&component.dir_name),
    )?;

    Ok(emitter.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::testing;

    fn params() -> RancherParams {
        RancherParams {
            slug: "rancher".into(),
            namespace: "rancher".into(),
            hostname: "rancher.example.com".into(),
            replicas: 3,
            bootstrap_password: "admin-pass".into(),
            certificate_secret_name: "rancher-certificate".into(),
            ingress_class_name: "nginx".into(),
            kube_version: Some("v1.31.7".into()),
            extra_env: vec![("CATTLE_PROMETHEUS_METRICS".into(), "true".into())],
            extra_values: Values::new(),
        }
    }

    #[test]
    fn test_rancher_values() {
        let emission = create(&testing::context(), &params(), &[]).unwrap();
        let values = testing::yaml(&emission, "rancher-values.yaml");
        assert_eq!(values["hostname"].as_str(), Some("rancher.example.com"));
        assert_eq!(values["ingress"]["tls"]["secretName"].as_str(), Some("rancher-certificate"));
        assert_eq!(values["extraEnv"][0]["name"].as_str(), Some("CATTLE_PROMETHEUS_METRICS"));

        let skaffold = testing::skaffold(&emission, "skaffold-rancher.yaml");
        let flags = skaffold.deploy.unwrap().helm.unwrap().flags.unwrap();
        assert_eq!(flags.template, vec!["--kube-version=v1.31.7"]);
    }

    #[test]
    fn test_bootstrap_password_is_required() {
        let mut p = params();
        p.bootstrap_password.clear();
        let err = create(&testing::context(), &p, &[]).unwrap_err();
        assert!(err.to_string().contains("bootstrap_password"));
    }

    #[test]
    fn test_certificate_secret_is_required() {
        let mut p = params();
        p.certificate_secret_name.clear();
        assert!(create(&testing::context(), &p, &[]).is_err());
    }
}
