//! Error types for stackwright-manifests

use std::path::PathBuf;

use thiserror::Error;

/// Result type for manifest pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised while rendering, splitting or sealing manifests
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PipelineError {
    /// The renderer failed for one component directory
    #[error("render failed for '{directory}':\n{output}")]
    Render { directory: String, output: String },

    /// No structured source declares a namespace
    #[error("no namespace found for '{directory}'\nHint: set a default namespace in its skaffold fragment or a namespace in fleet.yaml")]
    NamespaceMissing { directory: String },

    /// The sealing tool failed; plaintext secrets were purged
    #[error("sealing '{}' failed: {message}", file.display())]
    Seal { file: PathBuf, message: String },

    /// A secret needs sealing but no certificate is configured
    #[error("'{directory}' contains secrets but no sealing certificate is configured\nHint: set KUBESEAL_CERT or KUBESEAL_CERTIFICATE_PATH in env")]
    MissingCertificate { directory: String },

    /// Another branch hit a fatal error and the run is stopping
    #[error("'{directory}' was stopped after a fatal error elsewhere")]
    Stopped { directory: String },

    /// An external command exited unsuccessfully
    #[error("command '{command}' failed: {message}")]
    CommandFailed { command: String, message: String },

    /// A rendered document is not valid YAML
    #[error("invalid manifest in '{directory}': {message}")]
    InvalidManifest { directory: String, message: String },

    /// Configuration or generation error from the core crate
    #[error(transparent)]
    Generate(#[from] stackwright_core::GenerateError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_yaml::Error> for PipelineError {
    fn from(e: serde_yaml::Error) -> Self {
        PipelineError::Serialization(e.to_string())
    }
}

impl From<walkdir::Error> for PipelineError {
    fn from(e: walkdir::Error) -> Self {
        PipelineError::Io(e.into())
    }
}

impl PipelineError {
    /// Whether this error must stop every other branch of the run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::Seal { .. } | PipelineError::MissingCertificate { .. }
        )
    }

    /// Component directory the error belongs to, when known
    pub fn directory(&self) -> Option<&str> {
        match self {
            PipelineError::Render { directory, .. }
            | PipelineError::NamespaceMissing { directory }
            | PipelineError::MissingCertificate { directory }
            | PipelineError::Stopped { directory }
            | PipelineError::InvalidManifest { directory, .. } => Some(directory),
            _ => None,
        }
    }
}
