//! CLI error types with exit code handling
//!
//! Library errors are folded into one diagnostic type whose variant
//! decides the process exit code.

use miette::Diagnostic;
use stackwright_core::{EnvironmentName, GenerateError};
use stackwright_manifests::PipelineError;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Missing or malformed configuration
    #[error("Configuration error: {message}")]
    #[diagnostic(code(stackwright::cli::config))]
    Configuration {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// One or more components failed to render
    #[error("Render failed: {message}")]
    #[diagnostic(code(stackwright::cli::render))]
    Render { message: String },

    /// A component has no resolvable namespace
    #[error("Namespace error: {message}")]
    #[diagnostic(
        code(stackwright::cli::namespace),
        help("set a default namespace in the component's skaffold fragment or fleet.yaml")
    )]
    Namespace { message: String },

    /// Sealing failed; plaintext secrets were purged
    #[error("Sealing failed: {message}")]
    #[diagnostic(code(stackwright::cli::seal))]
    Seal {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(stackwright::cli::io))]
    Io { message: String },

    /// Wrapped error for passthrough (stores the formatted message)
    #[error("{message}")]
    #[diagnostic(code(stackwright::cli::error))]
    Other { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Configuration { .. } => exit_codes::CONFIG_ERROR,
            CliError::Render { .. } => exit_codes::RENDER_ERROR,
            CliError::Namespace { .. } => exit_codes::NAMESPACE_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Seal { .. } => exit_codes::SEAL_ERROR,
            CliError::Other { .. } => exit_codes::ERROR,
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            help: None,
        }
    }
}

fn environment_help(name: &str) -> String {
    match EnvironmentName::suggest(name) {
        Some(env) => format!("did you mean '{}'?", env),
        None => format!(
            "known environments: {}",
            EnvironmentName::all()
                .iter()
                .map(|env| env.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

impl From<&GenerateError> for CliError {
    fn from(err: &GenerateError) -> Self {
        let message = err.to_string();
        match err {
            GenerateError::UnknownEnvironment { name, .. } => CliError::Configuration {
                message,
                help: Some(environment_help(name)),
            },
            GenerateError::ConfigNotFound { .. } => CliError::Configuration {
                message,
                help: Some("pass --config or set CONFIG_YAML_PATH".to_string()),
            },
            GenerateError::Io(_) | GenerateError::Walk { .. } => CliError::Io { message },
            e if e.is_configuration() => CliError::configuration(message),
            _ => CliError::Other { message },
        }
    }
}

impl From<GenerateError> for CliError {
    fn from(err: GenerateError) -> Self {
        (&err).into()
    }
}

impl From<&PipelineError> for CliError {
    fn from(err: &PipelineError) -> Self {
        let message = err.to_string();
        match err {
            PipelineError::Render { .. } | PipelineError::InvalidManifest { .. } => {
                CliError::Render { message }
            }
            PipelineError::NamespaceMissing { .. } => CliError::Namespace { message },
            PipelineError::MissingCertificate { .. } => CliError::Seal {
                message,
                help: Some("set KUBESEAL_CERT or KUBESEAL_CERTIFICATE_PATH in env".to_string()),
            },
            PipelineError::Seal { .. } | PipelineError::Stopped { .. } => CliError::Seal {
                message,
                help: Some("plaintext secrets were removed; fix the sealer and re-run".to_string()),
            },
            PipelineError::Generate(e) => e.into(),
            PipelineError::Io(_) | PipelineError::Serialization(_) => CliError::Io { message },
            _ => CliError::Other { message },
        }
    }
}

impl From<PipelineError> for CliError {
    fn from(err: PipelineError) -> Self {
        (&err).into()
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
