//! Stackwright Manifests - render, split and seal generated components
//!
//! This crate provides:
//! - **External tools**: `skaffold`, `kubeseal`, `kubectl` and `fleet` behind one trait
//! - **Namespace handling**: structured resolution and idempotent injection
//! - **apiVersion patching**: rewrites of removed Kubernetes API versions
//! - **Split and seal**: one file per resource, secrets sealed in place
//! - **Pipeline**: bounded-parallel processing with a stop-the-world seal failure
//! - **Deploy**: image builds and graph-ordered kubectl and Fleet deploys
//! - **Progress Reporting**: per-directory state on the terminal

pub mod api_versions;
pub mod deploy;
pub mod document;
pub mod error;
pub mod namespace;
pub mod pipeline;
pub mod progress;
pub mod seal;
pub mod split;
pub mod tools;

pub use api_versions::patch_api_versions;
pub use deploy::{
    FleetGraph, build_images_command, deploy_order, fleet_deploy_commands,
    kubectl_deploy_commands, load_fleet_graph, run_commands, skaffold_deploy_command,
};
pub use document::{Document, parse_documents};
pub use error::{PipelineError, Result};
pub use namespace::{CLUSTER_SCOPED_KINDS, NamespaceSource, inject_namespace, resolve_namespace};
pub use pipeline::{DirectoryOutcome, ManifestPipeline, PipelineOptions, PipelineReport};
pub use progress::{DirectoryState, PipelineProgress, ProgressReporter, QuietProgress};
pub use seal::{is_secret_file, purge_plaintext_secrets, seal_directory};
pub use split::split_documents;
pub use tools::{CliTools, ExternalTools, MockTools, ToolCalls, ToolCommand};
