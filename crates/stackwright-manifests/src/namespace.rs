//! Namespace resolution and injection
//!
//! The sealing tool binds a secret to its namespace, so every namespaced
//! resource must carry one before it is sealed. The namespace of a
//! component directory is taken from the first structured source that
//! declares one.

use std::fmt;
use std::path::Path;

use stackwright_core::fragments::{COMPONENT_SKAFFOLD_FILE, FLEET_FILE, FleetConfig, SkaffoldConfig};

use crate::document::Document;
use crate::error::{PipelineError, Result};

/// Kinds that never receive an injected namespace
pub const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "CustomResourceDefinition",
    "MutatingWebhookConfiguration",
    "ValidatingWebhookConfiguration",
    "ClusterRoleBinding",
    "Namespace",
];

/// Where a resolved namespace came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceSource {
    SkaffoldDefault,
    HelmRelease,
    FleetComparePatch,
    FleetNamespace,
    NamespaceResource,
    ResourceMetadata,
}

impl fmt::Display for NamespaceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NamespaceSource::SkaffoldDefault => "skaffold default namespace",
            NamespaceSource::HelmRelease => "helm release",
            NamespaceSource::FleetComparePatch => "fleet compare patch",
            NamespaceSource::FleetNamespace => "fleet namespace",
            NamespaceSource::NamespaceResource => "Namespace resource",
            NamespaceSource::ResourceMetadata => "resource metadata",
        };
        f.write_str(label)
    }
}

/// Skaffold fragments of a component directory, umbrella first
fn skaffold_fragments(dir: &Path) -> Result<Vec<SkaffoldConfig>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if name.starts_with("skaffold-") && (name.ends_with(".yaml") || name.ends_with(".yml")) {
            paths.push(path);
        }
    }
    paths.sort();
    let umbrella = dir.join(COMPONENT_SKAFFOLD_FILE);
    if umbrella.is_file() {
        paths.insert(0, umbrella);
    }

    let mut fragments = Vec::new();
    for path in paths {
        fragments.push(SkaffoldConfig::from_file(&path)?);
    }
    Ok(fragments)
}

/// Resolve the namespace of the component directory `dir`
///
/// Sources, in priority order: the Skaffold default namespace, a Helm
/// release namespace, a Fleet comparison patch namespace, the Fleet
/// namespace, the rendered `Namespace` resource, then any resource's
/// `metadata.namespace`.
pub fn resolve_namespace(dir: &Path, documents: &[Document]) -> Result<(String, NamespaceSource)> {
    let directory = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let fragments = skaffold_fragments(dir)?;
    if let Some(ns) = fragments.iter().find_map(SkaffoldConfig::default_namespace) {
        return Ok((ns.to_string(), NamespaceSource::SkaffoldDefault));
    }
    if let Some(ns) = fragments
        .iter()
        .flat_map(SkaffoldConfig::helm_releases)
        .find_map(|release| release.namespace.as_deref().filter(|ns| !ns.is_empty()))
    {
        return Ok((ns.to_string(), NamespaceSource::HelmRelease));
    }

    let fleet_path = dir.join(FLEET_FILE);
    if fleet_path.is_file() {
        let fleet = FleetConfig::from_file(&fleet_path)?;
        if let Some(ns) = fleet.compare_patch_namespace() {
            return Ok((ns.to_string(), NamespaceSource::FleetComparePatch));
        }
        if let Some(ns) = fleet.namespace.as_deref().filter(|ns| !ns.is_empty()) {
            return Ok((ns.to_string(), NamespaceSource::FleetNamespace));
        }
    }

    if let Some(ns) = documents
        .iter()
        .filter(|doc| doc.kind() == Some("Namespace"))
        .find_map(Document::name)
    {
        return Ok((ns.to_string(), NamespaceSource::NamespaceResource));
    }
    if let Some(ns) = documents.iter().find_map(Document::namespace) {
        return Ok((ns.to_string(), NamespaceSource::ResourceMetadata));
    }

    Err(PipelineError::NamespaceMissing { directory })
}

/// Set `namespace` on every namespaced document that has none
///
/// Returns how many documents changed. Documents that already carry a
/// namespace and cluster-scoped kinds are left alone, so running this
/// twice changes nothing the second time.
pub fn inject_namespace(documents: &mut [Document], namespace: &str) -> usize {
    let mut injected = 0;
    for doc in documents.iter_mut() {
        let excluded = doc
            .kind()
            .is_some_and(|kind| CLUSTER_SCOPED_KINDS.contains(&kind));
        if excluded || doc.namespace().is_some() {
            continue;
        }
        doc.set_namespace(namespace);
        injected += 1;
    }
    injected
}
