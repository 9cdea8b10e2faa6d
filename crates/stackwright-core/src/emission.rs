//! In-memory output of a factory call
//!
//! Factories never touch the filesystem. They build an [`Emission`] through
//! an [`Emitter`]; the [`crate::Generation`] writes every emission at once,
//! after the whole environment composed successfully.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::component::Component;
use crate::error::Result;
use crate::fragments::{FLEET_FILE, FleetConfig, SkaffoldConfig};
use crate::values::Values;

/// Sub-directory holding raw manifests inside a component directory
pub const MANIFESTS_DIR: &str = "manifests";

/// A file produced by a factory, relative to its component directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedFile {
    pub path: PathBuf,
    pub contents: String,
}

/// A component together with the files it generates
#[derive(Debug, Clone)]
pub struct Emission {
    pub component: Component,
    pub files: Vec<EmittedFile>,
    /// Fleet names from the component's `dependsOn`
    pub depends_on: Vec<String>,
}

impl Emission {
    /// Look up an emitted file by its relative path
    pub fn file(&self, path: impl AsRef<Path>) -> Option<&EmittedFile> {
        let path = path.as_ref();
        self.files.iter().find(|f| f.path == path)
    }

    /// Write every file below `root/<dir_name>`, replacing existing files
    pub fn write_to(&self, root: &Path) -> Result<PathBuf> {
        let dir = root.join(&self.component.dir_name);
        std::fs::create_dir_all(&dir)?;

        for file in &self.files {
            let target = dir.join(&file.path);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, &file.contents)?;
        }

        Ok(dir)
    }
}

/// Builder used by factories to assemble an [`Emission`]
#[derive(Debug)]
pub struct Emitter {
    component: Component,
    files: Vec<EmittedFile>,
    depends_on: Vec<String>,
}

impl Emitter {
    pub fn new(component: Component) -> Self {
        Self {
            component,
            files: Vec::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn component(&self) -> &Component {
        &self.component
    }

    /// Serialize any document as YAML at `path`
    pub fn yaml<T: Serialize>(&mut self, path: impl Into<PathBuf>, document: &T) -> Result<()> {
        let contents = serde_yaml::to_string(document)?;
        self.push(path.into(), contents);
        Ok(())
    }

    /// Write a Helm values file
    pub fn values(&mut self, file_name: &str, values: &Values) -> Result<()> {
        self.yaml(file_name, values)
    }

    /// Write a raw manifest under `manifests/` and return the path a
    /// Skaffold fragment uses to reference it
    pub fn manifest<T: Serialize>(&mut self, file_name: &str, document: &T) -> Result<String> {
        self.yaml(Path::new(MANIFESTS_DIR).join(file_name), document)?;
        Ok(format!("./{}/{}", MANIFESTS_DIR, file_name))
    }

    /// Write a Skaffold fragment
    pub fn skaffold(&mut self, file_name: &str, config: &SkaffoldConfig) -> Result<()> {
        self.yaml(file_name, config)
    }

    /// Write the Fleet fragment and record its dependencies
    pub fn fleet(&mut self, config: &FleetConfig) -> Result<()> {
        self.depends_on = config
            .dependency_names()
            .into_iter()
            .map(String::from)
            .collect();
        self.yaml(FLEET_FILE, config)
    }

    pub fn finish(self) -> Emission {
        Emission {
            component: self.component,
            files: self.files,
            depends_on: self.depends_on,
        }
    }

    // A second write to the same path replaces the first
    fn push(&mut self, path: PathBuf, contents: String) {
        match self.files.iter_mut().find(|f| f.path == path) {
            Some(existing) => existing.contents = contents,
            None => self.files.push(EmittedFile { path, contents }),
        }
    }
}
