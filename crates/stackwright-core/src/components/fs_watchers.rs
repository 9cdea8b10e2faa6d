//! DaemonSet raising the inotify limits on every Linux node

use serde_json::json;

use super::require;
use crate::component::{Component, ComponentVariant};
use crate::emission::{Emission, Emitter};
use crate::error::Result;
use crate::fragments::{FleetConfig, SkaffoldConfig};

pub const TYPE_SUFFIX: &str = "fs-watchers";

const APP: &str = "more-fs-watchers";
const DEFAULT_LIMIT: u64 = 2_099_999_999;

#[derive(Debug, Clone)]
pub struct FsWatchersParams {
    pub slug: String,
    pub namespace: String,
    pub max_user_watches: u64,
    pub max_user_instances: u64,
    pub max_queued_events: u64,
}

impl FsWatchersParams {
    pub fn new(slug: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            namespace: namespace.into(),
            max_user_watches: DEFAULT_LIMIT,
            max_user_instances: DEFAULT_LIMIT,
            max_queued_events: DEFAULT_LIMIT,
        }
    }

    fn sysctl_command(&self) -> String {
        format!(
            "sysctl -w fs.inotify.max_user_watches={} && sysctl -w fs.inotify.max_user_instances={} && sysctl -w fs.inotify.max_queued_events={}",
            self.max_user_watches, self.max_user_instances, self.max_queued_events
        )
    }
}

pub fn create(params: &FsWatchersParams, depends_on: &[&Component]) -> Result<Emission> {
    let slug = params.slug.as_str();
    let namespace = require(slug, "namespace", &params.namespace)?;
    let component = Component::new(slug, namespace, TYPE_SUFFIX, ComponentVariant::Standard);

    let daemonset = json!({
        "apiVersion": "apps/v1",
        "kind": "DaemonSet",
        "metadata": {
            "name": APP,
            "namespace": namespace,
            "labels": { "app": APP, "k8s-app": APP },
        },
        "spec": {
            "selector": { "matchLabels": { "k8s-app": APP } },
            "template": {
                "metadata": { "labels": { "name": APP, "k8s-app": APP } },
                "spec": {
                    "nodeSelector": { "kubernetes.io/os": "linux" },
                    "initContainers": [{
                        "name": "sysctl",
                        "image": "alpine:3",
                        "command": ["/bin/sh", "-c", params.sysctl_command()],
                        "resources": {
                            "requests": { "cpu": "10m", "memory": "10Mi" },
                            "limits": { "cpu": "50m", "memory": "50Mi" },
                        },
                        "securityContext": {
                            "runAsUser": 0,
                            "privileged": true,
                            "readOnlyRootFilesystem": true,
                            "capabilities": { "drop": ["ALL"] },
                        },
                    }],
                    "containers": [{
                        "name": "pause",
                        "image": "registry.k8s.io/pause:3.9",
                        "resources": {
                            "requests": { "cpu": "10m", "memory": "1Mi" },
                            "limits": { "cpu": "50m", "memory": "5Mi" },
                        },
                        "securityContext": {
                            "runAsNonRoot": true,
                            "runAsUser": 65535,
                            "allowPrivilegeEscalation": false,
                            "readOnlyRootFilesystem": true,
                            "capabilities": { "drop": ["ALL"] },
                        },
                    }],
                    "terminationGracePeriodSeconds": 5,
                },
            },
        },
    });

    let mut emitter = Emitter::new(component.clone());
    let manifest = emitter.manifest("daemonset.yaml", &daemonset)?;
    emitter.skaffold(
        "skaffold-fs-watchers.yaml",
        &SkaffoldConfig::new()
            .with_raw_manifest(manifest)
            .with_default_namespace(namespace),
    )?;
    emitter.fleet(&FleetConfig::new(&component.dir_name, depends_on).with_namespace(namespace))?;

    Ok(emitter.finish())
}
