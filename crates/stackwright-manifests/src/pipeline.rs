//! Manifest pipeline
//!
//! Renders every generated component directory, resolves and injects its
//! namespace, patches deprecated apiVersions, splits the output into
//! per-resource files and seals the secrets. Directories run concurrently
//! up to the configured parallelism; steps within a directory run in order.
//!
//! A render or namespace failure only ends its own directory. A seal
//! failure sets a shared stop flag: the other directories halt before
//! their next step and purge their plaintext secrets.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use futures::stream::{self, StreamExt};
use stackwright_core::{COMPONENT_SKAFFOLD_FILE, FLEET_FILE, KubesealCert, Settings};
use tempfile::NamedTempFile;

use crate::api_versions::patch_api_versions;
use crate::document::parse_documents;
use crate::error::{PipelineError, Result};
use crate::namespace::{inject_namespace, resolve_namespace};
use crate::progress::{DirectoryState, PipelineProgress};
use crate::seal::{purge_plaintext_secrets, seal_directory, secret_files};
use crate::split::split_documents;
use crate::tools::ExternalTools;

/// Name of the combined render output inside a directory's output folder
const RENDERED_FILE: &str = ".rendered.yaml";

/// Inputs of one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Generated component directories
    pub source_dir: PathBuf,
    /// Root of the split and sealed tree
    pub output_dir: PathBuf,
    pub images_tag: String,
    pub parallelism: usize,
    pub certificate: Option<KubesealCert>,
}

impl PipelineOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            source_dir: settings.generated_skaffold_dir.clone(),
            output_dir: settings.generated_manifests_dir.clone(),
            images_tag: settings.images_tag.clone(),
            parallelism: settings.parallelism.max(1),
            certificate: settings.kubeseal_cert.clone(),
        }
    }
}

/// Result of processing one component directory
#[derive(Debug)]
pub struct DirectoryOutcome {
    pub directory: String,
    pub state: DirectoryState,
    pub namespace: Option<String>,
    /// Split files still in plaintext
    pub files: Vec<PathBuf>,
    pub sealed: Vec<PathBuf>,
    pub error: Option<PipelineError>,
}

impl DirectoryOutcome {
    fn new(directory: &str) -> Self {
        Self {
            directory: directory.to_string(),
            state: DirectoryState::Pending,
            namespace: None,
            files: Vec::new(),
            sealed: Vec::new(),
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == DirectoryState::Done
    }
}

/// Outcomes of every directory, sorted by directory name
#[derive(Debug, Default)]
pub struct PipelineReport {
    pub outcomes: Vec<DirectoryOutcome>,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(DirectoryOutcome::is_success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &DirectoryOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    /// The error that decides the run's exit status
    ///
    /// A fatal seal error wins over the first per-directory failure;
    /// directories stopped because of it are never chosen.
    pub fn primary_error(&self) -> Option<&PipelineError> {
        let errors = || self.outcomes.iter().filter_map(|o| o.error.as_ref());
        errors()
            .find(|e| e.is_fatal())
            .or_else(|| errors().find(|e| !matches!(e, PipelineError::Stopped { .. })))
            .or_else(|| errors().next())
    }

    pub fn sealed_count(&self) -> usize {
        self.outcomes.iter().map(|o| o.sealed.len()).sum()
    }
}

/// Removes the combined render output when dropped
struct RenderedFile(PathBuf);

impl Drop for RenderedFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(file = %self.0.display(), error = %e, "failed to remove rendered file");
            }
        }
    }
}

/// Sealing certificate on disk for the length of a run
enum Certificate {
    /// Inline PEM written to a temporary file, deleted on drop
    Temporary(NamedTempFile),
    Existing(PathBuf),
}

impl Certificate {
    fn prepare(cert: &KubesealCert) -> Result<Self> {
        match cert {
            KubesealCert::Pem(pem) => {
                let mut file = NamedTempFile::new()?;
                file.write_all(pem.as_bytes())?;
                file.flush()?;
                Ok(Certificate::Temporary(file))
            }
            KubesealCert::Path(path) => Ok(Certificate::Existing(path.clone())),
        }
    }

    fn path(&self) -> &Path {
        match self {
            Certificate::Temporary(file) => file.path(),
            Certificate::Existing(path) => path.as_path(),
        }
    }
}

/// Component directories below `source_dir` that carry a Skaffold config
pub fn component_directories(source_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    if !source_dir.is_dir() {
        return Ok(dirs);
    }
    for entry in std::fs::read_dir(source_dir)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        if path.join(COMPONENT_SKAFFOLD_FILE).is_file() {
            dirs.push(path);
        } else {
            tracing::warn!(directory = %path.display(), "no skaffold.yaml, skipping");
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn failure_state(error: &PipelineError) -> DirectoryState {
    match error {
        PipelineError::Render { .. } | PipelineError::InvalidManifest { .. } => {
            DirectoryState::RenderFailed
        }
        PipelineError::NamespaceMissing { .. } => DirectoryState::NamespaceMissing,
        PipelineError::Seal { .. } | PipelineError::MissingCertificate { .. } => {
            DirectoryState::SealFailed
        }
        PipelineError::Stopped { .. } => DirectoryState::Stopped,
        _ => DirectoryState::Failed,
    }
}

/// Runs the manifest pipeline over a generated tree
pub struct ManifestPipeline<'a> {
    tools: &'a dyn ExternalTools,
    progress: &'a dyn PipelineProgress,
    options: PipelineOptions,
}

impl<'a> ManifestPipeline<'a> {
    pub fn new(
        tools: &'a dyn ExternalTools,
        progress: &'a dyn PipelineProgress,
        options: PipelineOptions,
    ) -> Self {
        Self {
            tools,
            progress,
            options,
        }
    }

    /// Process every component directory and collect the outcomes
    ///
    /// Output directories with no generated counterpart are removed after a
    /// fully successful run.
    pub async fn run(&self) -> Result<PipelineReport> {
        let dirs = component_directories(&self.options.source_dir)?;
        if dirs.is_empty() {
            tracing::warn!(
                directory = %self.options.source_dir.display(),
                "no component directories to render"
            );
            return Ok(PipelineReport::default());
        }
        std::fs::create_dir_all(&self.options.output_dir)?;

        let certificate = self
            .options
            .certificate
            .as_ref()
            .map(Certificate::prepare)
            .transpose()?;
        let cert_path = certificate.as_ref().map(Certificate::path);
        let stop = AtomicBool::new(false);

        for dir in &dirs {
            self.progress.update(&dir_name(dir), DirectoryState::Pending, None);
        }

        let mut outcomes: Vec<DirectoryOutcome> = stream::iter(dirs.iter())
            .map(|dir| self.process(dir, cert_path, &stop))
            .buffer_unordered(self.options.parallelism.max(1))
            .collect()
            .await;
        outcomes.sort_by(|a, b| a.directory.cmp(&b.directory));

        // Every branch has finished with the certificate
        drop(certificate);

        let report = PipelineReport { outcomes };
        if report.is_success() {
            self.prune_stale_outputs(&report)?;
        }
        tracing::info!(
            directories = report.outcomes.len(),
            failed = report.failures().count(),
            sealed = report.sealed_count(),
            "manifest pipeline finished"
        );
        Ok(report)
    }

    async fn process(
        &self,
        dir: &Path,
        certificate: Option<&Path>,
        stop: &AtomicBool,
    ) -> DirectoryOutcome {
        let name = dir_name(dir);
        let output = self.options.output_dir.join(&name);
        let mut outcome = DirectoryOutcome::new(&name);

        match self
            .process_steps(dir, &output, certificate, stop, &mut outcome)
            .await
        {
            Ok(()) => {
                outcome.state = DirectoryState::Done;
                self.progress.update(&name, DirectoryState::Done, None);
            }
            Err(e) => {
                if e.is_fatal() {
                    stop.store(true, Ordering::SeqCst);
                }
                if let Err(purge) = purge_plaintext_secrets(&output) {
                    tracing::warn!(directory = %name, error = %purge, "failed to purge plaintext secrets");
                }
                outcome.state = failure_state(&e);
                outcome.files.clear();
                let message = e.to_string();
                self.progress.update(&name, outcome.state, Some(&message));
                tracing::debug!(directory = %name, error = %message, "directory failed");
                outcome.error = Some(e);
            }
        }
        outcome
    }

    /// Move to `state` unless another branch asked the run to stop
    fn enter(
        &self,
        outcome: &mut DirectoryOutcome,
        state: DirectoryState,
        stop: &AtomicBool,
    ) -> Result<()> {
        if stop.load(Ordering::SeqCst) {
            return Err(PipelineError::Stopped {
                directory: outcome.directory.clone(),
            });
        }
        outcome.state = state;
        self.progress.update(&outcome.directory, state, None);
        Ok(())
    }

    async fn process_steps(
        &self,
        dir: &Path,
        output: &Path,
        certificate: Option<&Path>,
        stop: &AtomicBool,
        outcome: &mut DirectoryOutcome,
    ) -> Result<()> {
        let name = outcome.directory.clone();

        self.enter(outcome, DirectoryState::Rendering, stop)?;
        let rendered = self
            .tools
            .render(&dir.join(COMPONENT_SKAFFOLD_FILE), &self.options.images_tag)
            .await
            .map_err(|e| PipelineError::Render {
                directory: name.clone(),
                output: match e {
                    PipelineError::CommandFailed { message, .. } => message,
                    other => other.to_string(),
                },
            })?;

        if output.exists() {
            std::fs::remove_dir_all(output)?;
        }
        std::fs::create_dir_all(output)?;
        let combined = RenderedFile(output.join(RENDERED_FILE));
        std::fs::write(&combined.0, &rendered)?;
        let text = std::fs::read_to_string(&combined.0)?;
        let mut documents = parse_documents(&name, &text)?;
        drop(combined);
        self.enter(outcome, DirectoryState::Rendered, stop)?;

        if documents.is_empty() {
            tracing::warn!(directory = %name, "no documents rendered");
            self.copy_fleet_config(dir, output)?;
            return Ok(());
        }

        let (namespace, source) = resolve_namespace(dir, &documents)?;
        tracing::debug!(directory = %name, namespace = %namespace, %source, "namespace resolved");
        let injected = inject_namespace(&mut documents, &namespace);
        let patched = patch_api_versions(&mut documents);
        tracing::debug!(directory = %name, injected, patched, "documents patched");
        outcome.namespace = Some(namespace);
        self.enter(outcome, DirectoryState::NamespaceResolved, stop)?;

        outcome.files = split_documents(&documents, output)?;
        self.enter(outcome, DirectoryState::Split, stop)?;

        if !secret_files(output)?.is_empty() {
            let Some(certificate) = certificate else {
                return Err(PipelineError::MissingCertificate { directory: name });
            };
            self.enter(outcome, DirectoryState::Sealing, stop)?;
            outcome.sealed = seal_directory(self.tools, output, certificate, stop).await?;
            outcome.files.retain(|f| f.exists());
        }

        self.copy_fleet_config(dir, output)?;
        Ok(())
    }

    fn copy_fleet_config(&self, dir: &Path, output: &Path) -> Result<()> {
        let fleet = dir.join(FLEET_FILE);
        if fleet.is_file() {
            std::fs::create_dir_all(output)?;
            std::fs::copy(&fleet, output.join(FLEET_FILE))?;
        }
        Ok(())
    }

    fn prune_stale_outputs(&self, report: &PipelineReport) -> Result<()> {
        for entry in std::fs::read_dir(&self.options.output_dir)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            let name = dir_name(&path);
            if !report.outcomes.iter().any(|o| o.directory == name) {
                tracing::info!(directory = %name, "removing stale manifests");
                std::fs::remove_dir_all(&path)?;
            }
        }
        Ok(())
    }
}
