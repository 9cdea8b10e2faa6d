//! Core error types

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("config file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("environment '{environment}': missing required key '{key}' in components.{component}")]
    MissingKey {
        environment: String,
        component: String,
        key: String,
    },

    #[error("environment '{environment}': missing required key '{key}' in env")]
    MissingEnvKey { environment: String, key: String },

    #[error("environment '{environment}': invalid value for '{key}' in {section}: {message}")]
    InvalidValue {
        environment: String,
        section: String,
        key: String,
        message: String,
    },

    #[error("component '{component}': parameter '{parameter}' is required")]
    MissingParameter { component: String, parameter: String },

    #[error("component '{slug}' is not a {expected} component")]
    UnexpectedVariant { slug: String, expected: &'static str },

    #[error("directory '{dir_name}' is produced by both '{first}' and '{second}'")]
    DuplicateDirectory {
        dir_name: String,
        first: String,
        second: String,
    },

    #[error("fleet name '{fleet_name}' is used by both '{first}' and '{second}'")]
    DuplicateFleetName {
        fleet_name: String,
        first: String,
        second: String,
    },

    #[error("component '{dir_name}' depends on unknown fleet name '{dependency}'")]
    UnknownDependency { dir_name: String, dependency: String },

    #[error("unknown environment '{name}' (available: {available})")]
    UnknownEnvironment { name: String, available: String },

    #[error("failed to compose component '{slug}': {source}")]
    ComponentFailed {
        slug: String,
        #[source]
        source: Box<GenerateError>,
    },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to serialize JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to walk {path}: {message}")]
    Walk { path: PathBuf, message: String },
}

impl GenerateError {
    /// Create a missing parameter error
    pub fn missing_parameter(component: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self::MissingParameter {
            component: component.into(),
            parameter: parameter.into(),
        }
    }

    /// Wrap this error with the slug of the component being composed
    pub fn in_component(self, slug: impl Into<String>) -> Self {
        match self {
            // Keep the innermost component as the reported one
            already @ Self::ComponentFailed { .. } => already,
            other => Self::ComponentFailed {
                slug: slug.into(),
                source: Box::new(other),
            },
        }
    }

    /// Whether this error came from reading the configuration document
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::ConfigNotFound { .. }
            | Self::MissingKey { .. }
            | Self::MissingEnvKey { .. }
            | Self::InvalidValue { .. }
            | Self::MissingParameter { .. }
            | Self::UnknownEnvironment { .. }
            | Self::YamlParse(_) => true,
            Self::ComponentFailed { source, .. } => source.is_configuration(),
            _ => false,
        }
    }
}

impl From<walkdir::Error> for GenerateError {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(PathBuf::from).unwrap_or_default();
        Self::Walk {
            path,
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GenerateError>;
