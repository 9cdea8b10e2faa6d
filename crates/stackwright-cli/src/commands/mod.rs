//! CLI commands
//!
//! Every target loads the configuration document once and resolves
//! [`Settings`] from it before running its steps.

use std::path::{Path, PathBuf};

use console::style;
use stackwright_core::{ConfigDocument, EnvironmentName, Settings, SettingsOverrides};

use crate::error::Result;

pub mod build;
pub mod deploy;
pub mod generate_manifests;
pub mod generate_skaffolds;

/// Flags shared by every target
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub config: Option<PathBuf>,
    pub environment: String,
    pub images_tag: Option<String>,
    pub parallelism: Option<usize>,
}

/// Loaded configuration for one invocation
pub struct Context {
    pub environment: EnvironmentName,
    pub doc: ConfigDocument,
    pub settings: Settings,
}

/// Conventional location of an environment's config document
fn default_config_path(environment: &str) -> PathBuf {
    Path::new("environments")
        .join(environment)
        .join("secrets")
        .join("config_env.yaml")
}

impl Context {
    pub fn load(args: &GlobalArgs) -> Result<Self> {
        let environment: EnvironmentName = args.environment.parse()?;
        let path = args
            .config
            .clone()
            .unwrap_or_else(|| default_config_path(environment.as_str()));
        let path = std::path::absolute(&path).unwrap_or(path);

        let doc = ConfigDocument::load(&path, environment.as_str())?;
        let settings = Settings::resolve(
            &doc,
            &SettingsOverrides {
                images_tag: args.images_tag.clone(),
                parallelism: args.parallelism,
            },
        )?;

        tracing::debug!(
            environment = %environment,
            config = %path.display(),
            images_tag = %settings.images_tag,
            "loaded configuration"
        );
        Ok(Self {
            environment,
            doc,
            settings,
        })
    }
}

/// Header line printed before each step
pub(crate) fn step(message: &str) {
    println!("{} {}", style("→").blue().bold(), message);
}
