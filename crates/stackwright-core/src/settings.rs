//! Resolved run settings
//!
//! Built once from the configuration document and command-line overrides,
//! then passed explicitly to the composition, the aggregator and the
//! manifest pipeline.

use std::path::{Path, PathBuf};

use crate::config::ConfigDocument;
use crate::error::Result;

/// Default number of directories processed concurrently
pub const DEFAULT_PARALLELISM: usize = 5;

/// Default images tag passed to the renderer
pub const DEFAULT_IMAGES_TAG: &str = "latest";

/// Public certificate used for sealing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KubesealCert {
    /// PEM content inlined in the config document
    Pem(String),
    /// Path to a PEM file
    Path(PathBuf),
}

/// Values supplied on the command line, taking precedence over the document
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub images_tag: Option<String>,
    pub parallelism: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub environment: String,
    pub config_path: Option<PathBuf>,
    pub repo_root: PathBuf,
    pub charts_dir: PathBuf,
    pub generated_skaffold_dir: PathBuf,
    pub generated_skaffold_tmp_dir: PathBuf,
    pub generated_manifests_dir: PathBuf,
    pub kubeconfig: Option<PathBuf>,
    pub kubeseal_cert: Option<KubesealCert>,
    pub images_tag: String,
    pub parallelism: usize,
}

impl Settings {
    /// Resolve settings from a document
    ///
    /// Relative paths are resolved against the document's directory.
    /// `REPO_ROOT` defaults to that directory; the chart and output
    /// directories default to locations under the repository root.
    pub fn resolve(doc: &ConfigDocument, overrides: &SettingsOverrides) -> Result<Self> {
        let repo_root = doc.env_path("REPO_ROOT")?.unwrap_or_else(|| doc.base_dir());
        let under_root = |key: &str, default: &str| -> Result<PathBuf> {
            Ok(doc
                .env_path(key)?
                .unwrap_or_else(|| repo_root.join(default)))
        };

        let charts_dir = under_root("CHARTS_PATH", "charts")?;
        let generated_skaffold_dir = under_root("GENERATED_SKAFFOLD_DIR", "generated/skaffolds")?;
        let generated_skaffold_tmp_dir =
            under_root("GENERATED_SKAFFOLD_TMP_DIR", "generated/skaffolds.tmp")?;
        let generated_manifests_dir = under_root("GENERATED_MANIFESTS_DIR", "generated/manifests")?;

        // Inline PEM wins over a certificate path
        let kubeseal_cert = match doc.env_str("KUBESEAL_CERT")? {
            Some(pem) => Some(KubesealCert::Pem(pem)),
            None => doc
                .env_path("KUBESEAL_CERTIFICATE_PATH")?
                .map(KubesealCert::Path),
        };

        let images_tag = match &overrides.images_tag {
            Some(tag) if !tag.is_empty() => tag.clone(),
            _ => doc
                .env_str("IMAGES_TAG")?
                .unwrap_or_else(|| DEFAULT_IMAGES_TAG.to_string()),
        };

        Ok(Self {
            environment: doc.environment().to_string(),
            config_path: doc.path().map(Path::to_path_buf),
            repo_root,
            charts_dir,
            generated_skaffold_dir,
            generated_skaffold_tmp_dir,
            generated_manifests_dir,
            kubeconfig: doc.env_path("KUBECONFIG")?,
            kubeseal_cert,
            images_tag,
            parallelism: overrides
                .parallelism
                .filter(|p| *p > 0)
                .unwrap_or(DEFAULT_PARALLELISM),
        })
    }

    /// Path of a chart below the charts directory
    pub fn chart(&self, name: &str) -> PathBuf {
        self.charts_dir.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(yaml: &str) -> ConfigDocument {
        ConfigDocument::from_yaml(yaml, "sample").unwrap()
    }

    #[test]
    fn test_defaults_live_under_repo_root() {
        let settings = Settings::resolve(
            &doc("env:\n  REPO_ROOT: /srv/infra\n"),
            &SettingsOverrides::default(),
        )
        .unwrap();

        assert_eq!(settings.charts_dir, PathBuf::from("/srv/infra/charts"));
        assert_eq!(
            settings.generated_skaffold_dir,
            PathBuf::from("/srv/infra/generated/skaffolds")
        );
        assert_eq!(settings.images_tag, "latest");
        assert_eq!(settings.parallelism, DEFAULT_PARALLELISM);
        assert!(settings.kubeseal_cert.is_none());
    }

    #[test]
    fn test_overrides_take_precedence() {
        let settings = Settings::resolve(
            &doc("env:\n  IMAGES_TAG: v1\n"),
            &SettingsOverrides {
                images_tag: Some("v2".into()),
                parallelism: Some(2),
            },
        )
        .unwrap();
        assert_eq!(settings.images_tag, "v2");
        assert_eq!(settings.parallelism, 2);
    }

    #[test]
    fn test_zero_parallelism_falls_back_to_default() {
        let settings = Settings::resolve(
            &doc("env: {}\n"),
            &SettingsOverrides {
                images_tag: None,
                parallelism: Some(0),
            },
        )
        .unwrap();
        assert_eq!(settings.parallelism, DEFAULT_PARALLELISM);
    }

    #[test]
    fn test_inline_certificate_wins() {
        let settings = Settings::resolve(
            &doc("env:\n  KUBESEAL_CERT: PEM\n  KUBESEAL_CERTIFICATE_PATH: /tmp/cert.pem\n"),
            &SettingsOverrides::default(),
        )
        .unwrap();
        assert_eq!(settings.kubeseal_cert, Some(KubesealCert::Pem("PEM".into())));
    }
}
