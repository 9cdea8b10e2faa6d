//! The `generate-skaffolds` flow: compose, write, aggregate, sync

use tracing::info;

use crate::aggregate::{AggregateSummary, aggregate};
use crate::component::Component;
use crate::components::FactoryContext;
use crate::config::ConfigDocument;
use crate::environments::{self, EnvironmentName};
use crate::error::Result;
use crate::settings::Settings;
use crate::sync::{SyncSummary, sync_output};

/// Outcome of one generation run
#[derive(Debug, Clone)]
pub struct GenerateReport {
    pub environment: EnvironmentName,
    /// Components in composition order
    pub components: Vec<Component>,
    pub aggregate: AggregateSummary,
    pub sync: SyncSummary,
}

/// Generate the Skaffold and Fleet tree of one environment
///
/// Nothing is written until the whole environment composed. The new tree
/// is built in the temporary directory and only synced to the final one
/// once aggregation succeeded.
pub fn generate_skaffolds(
    environment: EnvironmentName,
    doc: &ConfigDocument,
    settings: &Settings,
) -> Result<GenerateReport> {
    let ctx = FactoryContext::from_settings(settings);
    let generation = environments::compose(environment, doc, &ctx)?;

    let tmp = &settings.generated_skaffold_tmp_dir;
    if tmp.exists() {
        std::fs::remove_dir_all(tmp)?;
    }
    generation.write_to(tmp)?;
    let aggregate = aggregate(&generation, tmp)?;
    let sync = sync_output(tmp, &settings.generated_skaffold_dir)?;

    info!(
        environment = %environment,
        components = generation.len(),
        output = %settings.generated_skaffold_dir.display(),
        "generated skaffolds"
    );
    Ok(GenerateReport {
        environment,
        components: generation.components(),
        aggregate,
        sync,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::MAIN_SKAFFOLD_FILE;
    use crate::settings::SettingsOverrides;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
env:
  CLOUDFLARE_EMAIL: ops@example.com
  CLOUDFLARE_API_TOKEN: cf-token
components:
  whatsapp_waha:
    domain_name: waha.example.com
    username: admin
    password: s3cret
  redis:
    password: redis-pw
  postgres:
    superuser_password: root-pw
    user_password: app-pw
"#;

    fn load(temp: &TempDir, yaml: &str) -> (ConfigDocument, Settings) {
        let path = temp.path().join("messaging.yaml");
        std::fs::write(&path, yaml).unwrap();
        let doc = ConfigDocument::load(&path, "messaging").unwrap();
        let settings = Settings::resolve(&doc, &SettingsOverrides::default()).unwrap();
        (doc, settings)
    }

    #[test]
    fn test_generate_writes_final_tree() {
        let temp = TempDir::new().unwrap();
        let (doc, settings) = load(&temp, CONFIG);

        let report = generate_skaffolds(EnvironmentName::Messaging, &doc, &settings).unwrap();

        let out = &settings.generated_skaffold_dir;
        assert!(out.join(MAIN_SKAFFOLD_FILE).is_file());
        for component in &report.components {
            assert!(out.join(&component.dir_name).join("fleet.yaml").is_file());
        }
        assert!(!settings.generated_skaffold_tmp_dir.exists());
        assert!(report.sync.copied > 0);
        assert_eq!(report.sync.removed, 0);
    }

    #[test]
    fn test_missing_key_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let (doc, settings) = load(&temp, &CONFIG.replace("    username: admin\n", ""));

        let err = generate_skaffolds(EnvironmentName::Messaging, &doc, &settings).unwrap_err();

        assert!(err.to_string().contains("username"));
        assert!(!settings.generated_skaffold_tmp_dir.exists());
        assert!(!settings.generated_skaffold_dir.exists());
    }

    #[test]
    fn test_regeneration_drops_removed_components() {
        let temp = TempDir::new().unwrap();
        let with_tunnel = format!("{}  cloudflare_tunnel:\n    token: t0k3n\n", CONFIG);
        let (doc, settings) = load(&temp, &with_tunnel);
        generate_skaffolds(EnvironmentName::Messaging, &doc, &settings).unwrap();
        let tunnel_dir = settings
            .generated_skaffold_dir
            .join("cloudflare-cloudflare-tunnel");
        assert!(tunnel_dir.is_dir());

        let (doc, settings) = load(&temp, CONFIG);
        let report = generate_skaffolds(EnvironmentName::Messaging, &doc, &settings).unwrap();
        assert!(!tunnel_dir.exists());
        assert!(report.sync.removed > 0);
        assert!(report.sync.unchanged > 0);
    }
}
