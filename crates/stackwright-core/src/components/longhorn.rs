//! Longhorn distributed block storage

use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

use super::{FactoryContext, require, require_some};
use crate::component::{Component, ComponentVariant};
use crate::emission::{Emission, Emitter};
use crate::error::Result;
use crate::fragments::{ComparePatch, FleetConfig, HelmRelease, SkaffoldConfig};
use crate::values::Values;

pub const TYPE_SUFFIX: &str = "longhorn";

const PROVISIONER: &str = "driver.longhorn.io";

/// A StorageClass backed by Longhorn
#[derive(Debug, Clone, Deserialize)]
pub struct StorageClass {
    pub name: String,
    #[serde(default = "default_replicas")]
    pub replica_count: u32,
    #[serde(default)]
    pub disk_selector: Vec<String>,
    #[serde(default)]
    pub node_selector: Vec<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default = "default_reclaim_policy")]
    pub reclaim_policy: String,
    #[serde(default = "default_fs_type")]
    pub fs_type: String,
}

fn default_replicas() -> u32 {
    3
}

fn default_reclaim_policy() -> String {
    "Delete".to_string()
}

fn default_fs_type() -> String {
    "ext4".to_string()
}

impl StorageClass {
    /// The tiers most clusters start with: NVMe default, SSD, HDD
    pub fn default_tiers() -> Vec<Self> {
        [("longhorn-nvme", 2, "nvme", true), ("longhorn-ssd", 3, "ssd", false), ("longhorn-hdd", 1, "hdd", false)]
            .into_iter()
            .map(|(name, replicas, disk, is_default)| Self {
                name: name.to_string(),
                replica_count: replicas,
                disk_selector: vec![disk.to_string()],
                node_selector: Vec::new(),
                is_default,
                reclaim_policy: "Retain".to_string(),
                fs_type: default_fs_type(),
            })
            .collect()
    }

    fn manifest(&self) -> JsonValue {
        let mut parameters = json!({
            "numberOfReplicas": self.replica_count.to_string(),
            "staleReplicaTimeout": "30",
            "fromBackup": "",
            "fsType": self.fs_type,
        });
        if !self.disk_selector.is_empty() {
            parameters["diskSelector"] = json!(self.disk_selector.join(","));
        }
        if !self.node_selector.is_empty() {
            parameters["nodeSelector"] = json!(self.node_selector.join(","));
        }

        let annotations = if self.is_default {
            json!({ "storageclass.kubernetes.io/is-default-class": "true" })
        } else {
            json!({})
        };

        json!({
            "apiVersion": "storage.k8s.io/v1",
            "kind": "StorageClass",
            "metadata": { "name": self.name, "annotations": annotations },
            "provisioner": PROVISIONER,
            "parameters": parameters,
            "reclaimPolicy": self.reclaim_policy,
            "allowVolumeExpansion": true,
        })
    }
}

#[derive(Debug, Clone)]
pub struct LonghornIngress {
    pub host: String,
    pub class_name: String,
    pub tls_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LonghornParams {
    pub slug: String,
    pub namespace: String,
    pub ingress: Option<LonghornIngress>,
    pub storage_classes: Vec<StorageClass>,
    pub extra_values: Values,
}

pub fn create(
    ctx: &FactoryContext,
    params: &LonghornParams,
    depends_on: &[&Component],
) -> Result<Emission> {
    let slug = params.slug.as_str();
    let namespace = require(slug, "namespace", &params.namespace)?;
    let component = Component::new(slug, namespace, TYPE_SUFFIX, ComponentVariant::Standard);

    let mut values = Values::from(json!({
        "persistence": {
            "defaultClass": params.storage_classes.is_empty(),
            "defaultClassReplicaCount": 3,
        },
        "defaultSettings": {
            "defaultReplicaCount": 3,
            "backupstorePollInterval": 300,
            "defaultDataPath": "/var/lib/longhorn/",
            "replicaSoftAntiAffinity": "true",
            "replicaAutoBalance": "least-effort",
            "storageOverProvisioningPercentage": 200,
            "storageMinimalAvailablePercentage": 10,
        },
        "csi": {
            "attacherReplicaCount": 3,
            "provisionerReplicaCount": 3,
            "resizerReplicaCount": 3,
            "snapshotterReplicaCount": 3,
        },
        "longhornManager": { "priorityClass": "system-cluster-critical" },
        "longhornDriver": { "priorityClass": "system-node-critical" },
    }));

    if let Some(ingress) = &params.ingress {
        let host = require(slug, "ingress.host", &ingress.host)?;
        values.set("ingress.enabled", json!(true));
        values.set("ingress.host", json!(host));
        values.set("ingress.ingressClassName", json!(ingress.class_name));
        if ingress.tls_secret.is_some() {
            let secret = require_some(slug, "ingress.tls_secret", ingress.tls_secret.as_deref())?;
            values.set("ingress.tls", json!(true));
            values.set("ingress.tlsSecret", json!(secret));
        }
    }
    values.merge(&params.extra_values);

    let mut emitter = Emitter::new(component.clone());
    emitter.values("longhorn-values.yaml", &values)?;

    let mut skaffold = SkaffoldConfig::new()
        .with_release(HelmRelease::new(
            &component.dir_name,
            &ctx.chart("longhorn"),
            "longhorn-values.yaml",
            namespace,
        ))
        .with_default_namespace(namespace);

    for class in &params.storage_classes {
        let path = emitter.manifest(&format!("storageclass-{}.yaml", class.name), &class.manifest())?;
        skaffold = skaffold.with_raw_manifest(path);
    }
    emitter.skaffold("skaffold-longhorn.yaml", &skaffold)?;

    let mut service_patch = ComparePatch::ignore_server_metadata("v1", "Service");
    service_patch
        .json_pointers
        .extend(["/spec/clusterIP".to_string(), "/spec/clusterIPs".to_string()]);
    let mut node_patch = ComparePatch::ignore_server_metadata("longhorn.io/v1beta2", "Node");
    node_patch.json_pointers.push("/metadata/generation".to_string());

    emitter.fleet(
        &FleetConfig::new(&component.dir_name, depends_on)
            .with_namespace(namespace)
            .with_compare_patch(ComparePatch::ignore_server_metadata("apps/v1", "Deployment"))
            .with_compare_patch(ComparePatch::ignore_server_metadata("apps/v1", "DaemonSet"))
            .with_compare_patch(service_patch)
            .with_compare_patch(node_patch),
    )?;

    Ok(emitter.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::testing;

    fn params() -> LonghornParams {
        LonghornParams {
            slug: "longhorn".into(),
            namespace: "longhorn-system".into(),
            ingress: Some(LonghornIngress {
                host: "longhorn.example.com".into(),
                class_name: "nginx".into(),
                tls_secret: Some("longhorn-certificate".into()),
            }),
            storage_classes: StorageClass::default_tiers(),
            extra_values: Values::new(),
        }
    }

    #[test]
    fn test_ingress_uses_certificate_secret() {
        let emission = create(&testing::context(), &params(), &[]).unwrap();
        let values = testing::yaml(&emission, "longhorn-values.yaml");
        assert_eq!(values["ingress"]["host"].as_str(), Some("longhorn.example.com"));
        assert_eq!(values["ingress"]["tlsSecret"].as_str(), Some("longhorn-certificate"));
        assert_eq!(values["persistence"]["defaultClass"].as_bool(), Some(false));
    }

    #[test]
    fn test_storage_classes_are_emitted() {
        let emission = create(&testing::context(), &params(), &[]).unwrap();
        let nvme = testing::yaml(&emission, "manifests/storageclass-longhorn-nvme.yaml");
        assert_eq!(nvme["provisioner"].as_str(), Some(PROVISIONER));
        assert_eq!(nvme["parameters"]["numberOfReplicas"].as_str(), Some("2"));
        assert_eq!(
            nvme["metadata"]["annotations"]["storageclass.kubernetes.io/is-default-class"].as_str(),
            Some("true")
        );

        let skaffold = testing::skaffold(&emission, "skaffold-longhorn.yaml");
        assert_eq!(skaffold.manifests.unwrap().raw_yaml.len(), 3);
    }

    #[test]
    fn test_blank_tls_secret_is_rejected() {
        let mut p = params();
        if let Some(ingress) = p.ingress.as_mut() {
            ingress.tls_secret = Some(String::new());
        }
        let err = create(&testing::context(), &p, &[]).unwrap_err();
        assert!(err.to_string().contains("ingress.tls_secret"));
    }
}
