//! Skaffold and Fleet fragment types
//!
//! These are the configuration files fed to external tools. Only the
//! fields Stackwright writes or reads back are modelled; anything else in
//! a hand-written fragment is ignored on parse.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::component::Component;
use crate::error::Result;

/// Skaffold schema version written into every generated fragment
pub const SKAFFOLD_API_VERSION: &str = "skaffold/v4beta13";

/// File name of the per-component umbrella config
pub const COMPONENT_SKAFFOLD_FILE: &str = "skaffold.yaml";

/// File name of the Fleet fragment in each component directory
pub const FLEET_FILE: &str = "fleet.yaml";

// =============================================================================
// Skaffold
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkaffoldConfig {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<SkaffoldRequire>,
    /// Build section, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifests: Option<SkaffoldManifests>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy: Option<SkaffoldDeploy>,
}

fn default_api_version() -> String {
    SKAFFOLD_API_VERSION.to_string()
}

fn default_kind() -> String {
    "Config".to_string()
}

impl Default for SkaffoldConfig {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            requires: Vec::new(),
            build: None,
            manifests: None,
            deploy: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkaffoldRequire {
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkaffoldManifests {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub raw_yaml: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helm: Option<HelmSection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkaffoldDeploy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubectl: Option<KubectlDeploy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helm: Option<HelmSection>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubectlDeploy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_namespace: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<HelmFlags>,
    #[serde(default)]
    pub releases: Vec<HelmRelease>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmFlags {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub template: Vec<String>,
}

/// A Helm release deployed by Skaffold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmRelease {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub chart_path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_namespace: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade_on_change: Option<bool>,
}

impl HelmRelease {
    /// A release that creates its namespace, waits until healthy and
    /// upgrades whenever its inputs change
    pub fn new(
        name: impl Into<String>,
        chart_path: &Path,
        values_file: &str,
        namespace: &str,
    ) -> Self {
        Self {
            name: name.into(),
            chart_path: chart_path.to_string_lossy().into_owned(),
            values_files: vec![format!("./{}", values_file)],
            namespace: (!namespace.is_empty()).then(|| namespace.to_string()),
            create_namespace: Some(true),
            wait: Some(true),
            upgrade_on_change: Some(true),
        }
    }
}

impl SkaffoldConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a fragment from disk
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Add a Helm release to the deploy section
    pub fn with_release(mut self, release: HelmRelease) -> Self {
        self.deploy
            .get_or_insert_with(SkaffoldDeploy::default)
            .helm
            .get_or_insert_with(HelmSection::default)
            .releases
            .push(release);
        self
    }

    /// Add a flag passed to `helm template`
    pub fn with_template_flag(mut self, flag: impl Into<String>) -> Self {
        self.deploy
            .get_or_insert_with(SkaffoldDeploy::default)
            .helm
            .get_or_insert_with(HelmSection::default)
            .flags
            .get_or_insert_with(HelmFlags::default)
            .template
            .push(flag.into());
        self
    }

    /// Reference a raw manifest, relative to the component directory
    pub fn with_raw_manifest(mut self, path: impl Into<String>) -> Self {
        self.manifests
            .get_or_insert_with(SkaffoldManifests::default)
            .raw_yaml
            .push(path.into());
        self
    }

    /// Set the namespace kubectl deploys raw manifests into
    pub fn with_default_namespace(mut self, namespace: &str) -> Self {
        if !namespace.is_empty() {
            self.deploy
                .get_or_insert_with(SkaffoldDeploy::default)
                .kubectl
                .get_or_insert_with(KubectlDeploy::default)
                .default_namespace = Some(namespace.to_string());
        }
        self
    }

    pub fn with_requires(mut self, requires: Vec<SkaffoldRequire>) -> Self {
        self.requires = requires;
        self
    }

    /// The declared kubectl default namespace, if any
    pub fn default_namespace(&self) -> Option<&str> {
        self.deploy
            .as_ref()
            .and_then(|d| d.kubectl.as_ref())
            .and_then(|k| k.default_namespace.as_deref())
            .filter(|ns| !ns.is_empty())
    }

    /// Every Helm release, from both the manifests and deploy sections
    pub fn helm_releases(&self) -> impl Iterator<Item = &HelmRelease> {
        let from_manifests = self
            .manifests
            .as_ref()
            .and_then(|m| m.helm.as_ref())
            .into_iter()
            .flat_map(|h| h.releases.iter());
        let from_deploy = self
            .deploy
            .as_ref()
            .and_then(|d| d.helm.as_ref())
            .into_iter()
            .flat_map(|h| h.releases.iter());
        from_manifests.chain(from_deploy)
    }
}

// =============================================================================
// Fleet
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetDependency {
    pub name: String,
}

/// Contents of a component's `fleet.yaml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<FleetDependency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helm: Option<FleetHelm>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<FleetDiff>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetHelm {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetDiff {
    #[serde(default)]
    pub compare_patches: Vec<ComparePatch>,
}

/// Tells Fleet which drift to ignore on one resource type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparePatch {
    pub api_version: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub json_pointers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operations: Vec<PatchOperation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: String,
    pub path: String,
}

impl ComparePatch {
    /// Ignore server-populated metadata on a resource type
    pub fn ignore_server_metadata(api_version: &str, kind: &str) -> Self {
        Self {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            json_pointers: vec![
                "/metadata/resourceVersion".to_string(),
                "/metadata/uid".to_string(),
            ],
            ..Self::default()
        }
    }

    /// Drop a path from a named resource before comparing
    pub fn remove_path(api_version: &str, kind: &str, name: &str, path: &str) -> Self {
        Self {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            name: Some(name.to_string()),
            operations: vec![PatchOperation {
                op: "remove".to_string(),
                path: path.to_string(),
            }],
            ..Self::default()
        }
    }

    pub fn in_namespace(mut self, namespace: &str) -> Self {
        if !namespace.is_empty() {
            self.namespace = Some(namespace.to_string());
        }
        self
    }
}

impl FleetConfig {
    /// A fragment depending on `depends_on`, in the order given
    pub fn new(label_name: impl Into<String>, depends_on: &[&Component]) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert("name".to_string(), label_name.into());
        Self {
            depends_on: depends_on.iter().map(|c| c.as_fleet_dependency()).collect(),
            labels,
            ..Self::default()
        }
    }

    /// Parse a fragment from disk
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn with_namespace(mut self, namespace: &str) -> Self {
        if !namespace.is_empty() {
            self.namespace = Some(namespace.to_string());
        }
        self
    }

    pub fn with_release_name(mut self, release_name: impl Into<String>) -> Self {
        self.helm = Some(FleetHelm {
            release_name: Some(release_name.into()),
        });
        self
    }

    pub fn with_compare_patch(mut self, patch: ComparePatch) -> Self {
        self.diff
            .get_or_insert_with(FleetDiff::default)
            .compare_patches
            .push(patch);
        self
    }

    /// Names listed in `dependsOn`
    pub fn dependency_names(&self) -> Vec<&str> {
        self.depends_on.iter().map(|d| d.name.as_str()).collect()
    }

    /// First namespace declared on a comparison patch
    pub fn compare_patch_namespace(&self) -> Option<&str> {
        self.diff
            .as_ref()?
            .compare_patches
            .iter()
            .filter_map(|p| p.namespace.as_deref())
            .find(|ns| !ns.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentVariant;
    use std::path::PathBuf;

    #[test]
    fn test_helm_release_policy_is_always_enabled() {
        let release = HelmRelease::new(
            "web-redis",
            &PathBuf::from("/charts/redis"),
            "values.yaml",
            "web",
        );
        assert_eq!(release.create_namespace, Some(true));
        assert_eq!(release.wait, Some(true));
        assert_eq!(release.upgrade_on_change, Some(true));
        assert_eq!(release.values_files, vec!["./values.yaml"]);
    }

    #[test]
    fn test_skaffold_serializes_camel_case() {
        let config = SkaffoldConfig::new()
            .with_release(HelmRelease::new(
                "app",
                &PathBuf::from("/charts/app"),
                "values.yaml",
                "apps",
            ))
            .with_raw_manifest("./manifests/secret.yaml")
            .with_default_namespace("apps");

        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("apiVersion: skaffold/v4beta13"));
        assert!(yaml.contains("rawYaml:"));
        assert!(yaml.contains("defaultNamespace: apps"));
        assert!(yaml.contains("upgradeOnChange: true"));
        assert!(yaml.contains("createNamespace: true"));
    }

    #[test]
    fn test_skaffold_parse_reads_both_release_sections() {
        let yaml = r#"
apiVersion: skaffold/v3
kind: Config
manifests:
  helm:
    releases:
      - name: a
        chartPath: ./a
        namespace: first
deploy:
  helm:
    releases:
      - name: b
        chartPath: ./b
        namespace: second
  kubectl: {}
"#;
        let config: SkaffoldConfig = serde_yaml::from_str(yaml).unwrap();
        let names: Vec<_> = config.helm_releases().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(config.default_namespace(), None);
    }

    #[test]
    fn test_fleet_depends_on_preserves_order() {
        let a = Component::new("a", "ns", "namespace", ComponentVariant::Namespace);
        let b = Component::new("b", "ns", "redis", ComponentVariant::Standard);
        let fleet = FleetConfig::new("c", &[&b, &a]);
        assert_eq!(fleet.dependency_names(), vec!["b-redis", "a-namespace"]);

        let yaml = serde_yaml::to_string(&fleet).unwrap();
        let back: FleetConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, fleet);
    }

    #[test]
    fn test_fleet_empty_depends_on_is_written() {
        let fleet = FleetConfig::new("standalone", &[]);
        let yaml = serde_yaml::to_string(&fleet).unwrap();
        assert!(yaml.contains("dependsOn: []"));
    }

    #[test]
    fn test_compare_patch_namespace() {
        let fleet = FleetConfig::new("x", &[]).with_compare_patch(
            ComparePatch::ignore_server_metadata("v1", "Secret").in_namespace("vault"),
        );
        assert_eq!(fleet.compare_patch_namespace(), Some("vault"));
    }
}
