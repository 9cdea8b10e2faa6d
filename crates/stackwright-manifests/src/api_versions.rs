//! Deprecated apiVersion rewriting
//!
//! Charts pinned to old releases still emit API groups removed from
//! current clusters. Each rewrite is keyed on kind and old apiVersion.

use crate::document::Document;

/// `(kind, deprecated apiVersion, replacement)`
pub const API_VERSION_PATCHES: &[(&str, &str, &str)] = &[
    ("PodDisruptionBudget", "policy/v1beta1", "policy/v1"),
    ("CronJob", "batch/v1beta1", "batch/v1"),
    ("HorizontalPodAutoscaler", "autoscaling/v2beta1", "autoscaling/v2"),
    ("HorizontalPodAutoscaler", "autoscaling/v2beta2", "autoscaling/v2"),
    ("Ingress", "networking.k8s.io/v1beta1", "networking.k8s.io/v1"),
    ("Ingress", "extensions/v1beta1", "networking.k8s.io/v1"),
];

fn replacement(kind: &str, api_version: &str) -> Option<&'static str> {
    API_VERSION_PATCHES
        .iter()
        .find(|(k, old, _)| *k == kind && *old == api_version)
        .map(|(_, _, new)| *new)
}

/// Rewrite deprecated apiVersions in place, returning how many changed
pub fn patch_api_versions(documents: &mut [Document]) -> usize {
    let mut patched = 0;
    for doc in documents.iter_mut() {
        let (Some(kind), Some(api_version)) = (doc.kind(), doc.api_version()) else {
            continue;
        };
        if let Some(new) = replacement(kind, api_version) {
            tracing::debug!(kind, from = api_version, to = new, "patching apiVersion");
            doc.set_api_version(new);
            patched += 1;
        }
    }
    patched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parse_documents;

    #[test]
    fn test_patches_known_pairs_only() {
        let mut docs = parse_documents(
            "app",
            r#"
apiVersion: policy/v1beta1
kind: PodDisruptionBudget
metadata:
  name: pdb
---
apiVersion: extensions/v1beta1
kind: Ingress
metadata:
  name: web
---
apiVersion: autoscaling/v2beta2
kind: HorizontalPodAutoscaler
metadata:
  name: hpa
---
apiVersion: policy/v1beta1
kind: PodSecurityPolicy
metadata:
  name: psp
"#,
        )
        .unwrap();

        assert_eq!(patch_api_versions(&mut docs), 3);
        let versions: Vec<_> = docs.iter().filter_map(Document::api_version).collect();
        assert_eq!(
            versions,
            vec!["policy/v1", "networking.k8s.io/v1", "autoscaling/v2", "policy/v1beta1"]
        );
    }

    #[test]
    fn test_current_versions_untouched() {
        let mut docs = parse_documents(
            "app",
            "apiVersion: batch/v1\nkind: CronJob\nmetadata:\n  name: job\n",
        )
        .unwrap();
        let before = docs.clone();
        assert_eq!(patch_api_versions(&mut docs), 0);
        assert_eq!(docs, before);
    }
}
