//! The component record shared by factories, compositions and the aggregator

use serde::{Deserialize, Serialize};

use crate::error::{GenerateError, Result};

/// What a component exposes to the components that depend on it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "kebab-case")]
pub enum ComponentVariant {
    /// Creates a namespace and nothing else
    Namespace,
    /// A cert-manager issuer; dependents reference it by name
    Issuer { issuer_secret_name: String },
    /// A cert-manager certificate; dependents mount its TLS secret
    Certificate { certificate_secret_name: String },
    /// Any other deployable unit
    Standard,
}

impl ComponentVariant {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Namespace => "namespace",
            Self::Issuer { .. } => "issuer",
            Self::Certificate { .. } => "certificate",
            Self::Standard => "standard",
        }
    }
}

/// One deployable unit, as returned by a factory
///
/// Components are immutable once built. Only their emitted files are
/// persisted; the records themselves live in the ordered list handed to
/// the aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub slug: String,
    /// Empty means "resolve from the rendered output"
    pub namespace: String,
    pub dir_name: String,
    pub fleet_name: String,
    pub variant: ComponentVariant,
}

impl Component {
    /// Build a component whose fleet name matches its directory name
    pub fn new(
        slug: impl Into<String>,
        namespace: impl Into<String>,
        type_suffix: &str,
        variant: ComponentVariant,
    ) -> Self {
        let slug = slug.into();
        let dir_name = dir_name_for(&slug, type_suffix);
        Self {
            fleet_name: dir_name.clone(),
            slug,
            namespace: namespace.into(),
            dir_name,
            variant,
        }
    }

    /// Override the name other components use in `dependsOn`
    pub fn with_fleet_name(mut self, fleet_name: impl Into<String>) -> Self {
        self.fleet_name = fleet_name.into();
        self
    }

    /// Secret name of the issuer, if this is an issuer component
    pub fn issuer_secret_name(&self) -> Option<&str> {
        match &self.variant {
            ComponentVariant::Issuer { issuer_secret_name } => Some(issuer_secret_name),
            _ => None,
        }
    }

    /// TLS secret name, if this is a certificate component
    pub fn certificate_secret_name(&self) -> Option<&str> {
        match &self.variant {
            ComponentVariant::Certificate {
                certificate_secret_name,
            } => Some(certificate_secret_name),
            _ => None,
        }
    }

    /// Like [`Self::issuer_secret_name`] but fails for other variants
    pub fn require_issuer_secret_name(&self) -> Result<&str> {
        self.issuer_secret_name()
            .ok_or_else(|| GenerateError::UnexpectedVariant {
                slug: self.slug.clone(),
                expected: "issuer",
            })
    }

    /// Like [`Self::certificate_secret_name`] but fails for other variants
    pub fn require_certificate_secret_name(&self) -> Result<&str> {
        self.certificate_secret_name()
            .ok_or_else(|| GenerateError::UnexpectedVariant {
                slug: self.slug.clone(),
                expected: "certificate",
            })
    }

    /// Entry for a Fleet `dependsOn` list
    pub fn as_fleet_dependency(&self) -> crate::fragments::FleetDependency {
        crate::fragments::FleetDependency {
            name: self.fleet_name.clone(),
        }
    }

    /// Path of this component's umbrella Skaffold config, relative to a sibling directory
    pub fn as_skaffold_dependency(&self) -> crate::fragments::SkaffoldRequire {
        crate::fragments::SkaffoldRequire {
            path: format!("../{}/skaffold.yaml", self.dir_name),
        }
    }
}

/// Directory name for a slug and a component type suffix
///
/// Slugs are lowercased and anything outside `[a-z0-9-]` becomes `-`, so
/// the result is always a single path segment.
pub fn dir_name_for(slug: &str, type_suffix: &str) -> String {
    let sanitize = |s: &str| -> String {
        s.chars()
            .map(|c| {
                let c = c.to_ascii_lowercase();
                if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' }
            })
            .collect()
    };

    let slug = sanitize(slug);
    if type_suffix.is_empty() {
        slug
    } else {
        format!("{}-{}", slug, sanitize(type_suffix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_name_suffixes_type() {
        assert_eq!(dir_name_for("longhorn", "namespace"), "longhorn-namespace");
        assert_eq!(
            dir_name_for("longhorn", "certificate-issuer"),
            "longhorn-certificate-issuer"
        );
    }

    #[test]
    fn test_dir_name_is_single_segment() {
        assert_eq!(dir_name_for("My_App/v2", "redis"), "my-app-v2-redis");
    }

    #[test]
    fn test_same_slug_different_types_do_not_collide() {
        let ns = Component::new("rancher", "rancher", "namespace", ComponentVariant::Namespace);
        let app = Component::new("rancher", "rancher", "rancher", ComponentVariant::Standard);
        assert_ne!(ns.dir_name, app.dir_name);
    }

    #[test]
    fn test_variant_accessors() {
        let issuer = Component::new(
            "web",
            "web",
            "certificate-issuer",
            ComponentVariant::Issuer {
                issuer_secret_name: "web-issuer".into(),
            },
        );
        assert_eq!(issuer.issuer_secret_name(), Some("web-issuer"));
        assert_eq!(issuer.certificate_secret_name(), None);
        assert!(issuer.require_certificate_secret_name().is_err());
        assert_eq!(issuer.require_issuer_secret_name().unwrap(), "web-issuer");
    }

    #[test]
    fn test_fleet_dependency_uses_fleet_name() {
        let c = Component::new("cert", "ns", "certificate", ComponentVariant::Standard)
            .with_fleet_name("cert-certificates");
        assert_eq!(c.as_fleet_dependency().name, "cert-certificates");
        assert_eq!(c.as_skaffold_dependency().path, "../cert-certificate/skaffold.yaml");
    }
}
