//! External tools the pipeline shells out to
//!
//! Rendering, sealing and deployment go through [`ExternalTools`] so the
//! namespace, split and seal logic can run against [`MockTools`] in tests.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_yaml::{Mapping, Value as YamlValue};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::debug;

use crate::error::{PipelineError, Result};

/// A command line to run, with its working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Renderer, sealer and command runner
///
/// Implementations must be Send + Sync for use across pipeline branches.
#[async_trait]
pub trait ExternalTools: Send + Sync {
    /// Render a Skaffold config into a multi-document manifest
    async fn render(&self, fragment: &Path, images_tag: &str) -> Result<Vec<u8>>;

    /// Seal one Secret manifest against a public certificate
    async fn seal(&self, manifest: &Path, certificate: &Path) -> Result<Vec<u8>>;

    /// Run a command, streaming its standard output
    async fn run(&self, command: &ToolCommand) -> Result<()>;
}

// =============================================================================
// Process-backed tools
// =============================================================================

/// Runs the real `skaffold` and `kubeseal` binaries
#[derive(Debug, Clone)]
pub struct CliTools {
    skaffold: String,
    kubeseal: String,
    kubeconfig: Option<PathBuf>,
}

impl CliTools {
    pub fn new() -> Self {
        Self {
            skaffold: "skaffold".to_string(),
            kubeseal: "kubeseal".to_string(),
            kubeconfig: None,
        }
    }

    /// Point the sealer at a specific cluster configuration
    pub fn with_kubeconfig(mut self, kubeconfig: Option<PathBuf>) -> Self {
        self.kubeconfig = kubeconfig;
        self
    }

    fn command(&self, tool: &ToolCommand) -> Command {
        let mut command = Command::new(&tool.program);
        command.args(&tool.args).kill_on_drop(true);
        if let Some(cwd) = &tool.cwd {
            command.current_dir(cwd);
        }
        if let Some(kubeconfig) = &self.kubeconfig {
            command.env("KUBECONFIG", kubeconfig);
        }
        command
    }
}

impl Default for CliTools {
    fn default() -> Self {
        Self::new()
    }
}

fn failed(command: &ToolCommand, stderr: &[u8]) -> PipelineError {
    PipelineError::CommandFailed {
        command: command.to_string(),
        message: String::from_utf8_lossy(stderr).trim().to_string(),
    }
}

#[async_trait]
impl ExternalTools for CliTools {
    async fn render(&self, fragment: &Path, images_tag: &str) -> Result<Vec<u8>> {
        let file_name = fragment
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut tool = ToolCommand::new(&self.skaffold).args([
            "render".to_string(),
            "--filename".to_string(),
            file_name,
            "--tag".to_string(),
            images_tag.to_string(),
            "--offline=true".to_string(),
            "--digest-source=tag".to_string(),
            "--sync-remote-cache=never".to_string(),
        ]);
        if let Some(dir) = fragment.parent() {
            tool = tool.current_dir(dir);
        }

        debug!(command = %tool, "rendering");
        let output = self.command(&tool).output().await?;
        if !output.status.success() {
            let mut detail = output.stderr;
            detail.extend_from_slice(&output.stdout);
            return Err(failed(&tool, &detail));
        }
        Ok(output.stdout)
    }

    async fn seal(&self, manifest: &Path, certificate: &Path) -> Result<Vec<u8>> {
        let tool = ToolCommand::new(&self.kubeseal).args([
            "--cert".to_string(),
            certificate.to_string_lossy().into_owned(),
            "--format".to_string(),
            "yaml".to_string(),
        ]);
        let input = tokio::fs::read(manifest).await?;

        debug!(command = %tool, file = %manifest.display(), "sealing");
        let mut child = self
            .command(&tool)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&input).await?;
        }
        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(failed(&tool, &output.stderr));
        }
        Ok(output.stdout)
    }

    async fn run(&self, tool: &ToolCommand) -> Result<()> {
        debug!(command = %tool, "running");
        let mut child = self
            .command(tool)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Drained alongside stdout so a chatty stderr cannot fill its pipe
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buffer = Vec::new();
                stderr.read_to_end(&mut buffer).await.map(|_| buffer)
            })
        });

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                println!("    {}", line);
            }
        }

        let status = child.wait().await?;
        let stderr = match stderr_task {
            Some(task) => task.await.map_err(std::io::Error::other)??,
            None => Vec::new(),
        };
        if !status.success() {
            return Err(failed(tool, &stderr));
        }
        if !stderr.is_empty() {
            let stderr = String::from_utf8_lossy(&stderr);
            debug!(command = %tool, stderr = %stderr.trim(), "command stderr");
        }
        Ok(())
    }
}

// =============================================================================
// Mock tools
// =============================================================================

/// In-memory tools for testing
///
/// Renders return canned output keyed by component directory name; seals
/// produce a `SealedSecret` naming the original secret and fail when the
/// certificate file is not on disk, as `kubeseal` does.
#[derive(Clone, Default)]
pub struct MockTools {
    renders: Arc<Mutex<HashMap<String, std::result::Result<String, String>>>>,
    render_delay: Option<Duration>,
    renders_in_flight: Arc<AtomicUsize>,
    seal_failures: Arc<Mutex<HashSet<String>>>,
    calls: Arc<Mutex<ToolCalls>>,
}

/// Calls recorded by [`MockTools`] for assertions
#[derive(Debug, Default, Clone)]
pub struct ToolCalls {
    pub renders: Vec<PathBuf>,
    /// Highest number of renders running at the same time
    pub max_concurrent_renders: usize,
    pub seals: Vec<PathBuf>,
    /// Certificate passed to each seal, in call order
    pub certificates: Vec<PathBuf>,
    pub commands: Vec<ToolCommand>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockTools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render `manifest` for the component directory `directory`
    pub fn with_render(self, directory: &str, manifest: &str) -> Self {
        lock(&self.renders).insert(directory.to_string(), Ok(manifest.to_string()));
        self
    }

    /// Make rendering `directory` fail with `output`
    pub fn with_render_failure(self, directory: &str, output: &str) -> Self {
        lock(&self.renders).insert(directory.to_string(), Err(output.to_string()));
        self
    }

    /// Hold every render for `delay` before answering
    pub fn with_render_delay(mut self, delay: Duration) -> Self {
        self.render_delay = Some(delay);
        self
    }

    /// Make sealing fail for files whose name contains `pattern`
    pub fn with_seal_failure(self, pattern: &str) -> Self {
        lock(&self.seal_failures).insert(pattern.to_string());
        self
    }

    pub fn calls(&self) -> ToolCalls {
        lock(&self.calls).clone()
    }
}

fn sealed_secret(plain: &YamlValue) -> YamlValue {
    let metadata = plain.get("metadata").cloned().unwrap_or(YamlValue::Null);
    let mut encrypted = Mapping::new();
    for section in ["data", "stringData"] {
        if let Some(YamlValue::Mapping(entries)) = plain.get(section) {
            for (key, _) in entries {
                if let Some(key) = key.as_str() {
                    encrypted.insert(key.into(), format!("sealed:{}", key).into());
                }
            }
        }
    }

    let mut spec = Mapping::new();
    spec.insert("encryptedData".into(), YamlValue::Mapping(encrypted));
    let mut sealed = Mapping::new();
    sealed.insert("apiVersion".into(), "bitnami.com/v1alpha1".into());
    sealed.insert("kind".into(), "SealedSecret".into());
    sealed.insert("metadata".into(), metadata);
    sealed.insert("spec".into(), YamlValue::Mapping(spec));
    YamlValue::Mapping(sealed)
}

#[async_trait]
impl ExternalTools for MockTools {
    async fn render(&self, fragment: &Path, _images_tag: &str) -> Result<Vec<u8>> {
        let in_flight = self.renders_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut calls = lock(&self.calls);
            calls.renders.push(fragment.to_path_buf());
            calls.max_concurrent_renders = calls.max_concurrent_renders.max(in_flight);
        }
        if let Some(delay) = self.render_delay {
            tokio::time::sleep(delay).await;
        }
        self.renders_in_flight.fetch_sub(1, Ordering::SeqCst);

        let directory = fragment
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match lock(&self.renders).get(&directory) {
            Some(Ok(manifest)) => Ok(manifest.clone().into_bytes()),
            Some(Err(output)) => Err(PipelineError::CommandFailed {
                command: format!("skaffold render --filename {}", fragment.display()),
                message: output.clone(),
            }),
            None => Ok(Vec::new()),
        }
    }

    async fn seal(&self, manifest: &Path, certificate: &Path) -> Result<Vec<u8>> {
        {
            let mut calls = lock(&self.calls);
            calls.seals.push(manifest.to_path_buf());
            calls.certificates.push(certificate.to_path_buf());
        }
        if !certificate.is_file() {
            return Err(PipelineError::CommandFailed {
                command: "kubeseal".to_string(),
                message: format!("error: cannot read certificate {}", certificate.display()),
            });
        }
        let name = manifest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let fails = lock(&self.seal_failures)
            .iter()
            .any(|pattern| name.contains(pattern.as_str()));
        if fails {
            return Err(PipelineError::CommandFailed {
                command: "kubeseal".to_string(),
                message: "error: cannot fetch certificate".to_string(),
            });
        }

        let plain: YamlValue = serde_yaml::from_str(&tokio::fs::read_to_string(manifest).await?)?;
        Ok(serde_yaml::to_string(&sealed_secret(&plain))?.into_bytes())
    }

    async fn run(&self, command: &ToolCommand) -> Result<()> {
        lock(&self.calls).commands.push(command.clone());
        Ok(())
    }
}
