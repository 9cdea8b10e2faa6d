//! Progress reporting for the manifest pipeline
//!
//! Each component directory moves through:
//! - rendering and namespace resolution
//! - splitting into per-resource files
//! - sealing of secret files
//!
//! Branches run concurrently, so reporters take `&self` and keep their
//! state behind a mutex.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use console::style;

/// State of one component directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryState {
    Pending,
    Rendering,
    RenderFailed,
    Rendered,
    NamespaceResolved,
    NamespaceMissing,
    Split,
    Sealing,
    SealFailed,
    Stopped,
    /// IO or parse failure outside the named steps
    Failed,
    Done,
}

impl DirectoryState {
    fn symbol(&self) -> &'static str {
        match self {
            DirectoryState::Pending => "○",
            DirectoryState::Rendering => "◐",
            DirectoryState::Rendered | DirectoryState::NamespaceResolved => "◑",
            DirectoryState::Split | DirectoryState::Sealing => "◕",
            DirectoryState::Done => "●",
            DirectoryState::RenderFailed
            | DirectoryState::NamespaceMissing
            | DirectoryState::SealFailed
            | DirectoryState::Failed => "✗",
            DirectoryState::Stopped => "⊘",
        }
    }

    fn styled_symbol(&self) -> console::StyledObject<&'static str> {
        match self {
            DirectoryState::Pending | DirectoryState::Stopped => style(self.symbol()).dim(),
            DirectoryState::Rendering => style(self.symbol()).cyan(),
            DirectoryState::Rendered | DirectoryState::NamespaceResolved => {
                style(self.symbol()).blue()
            }
            DirectoryState::Split | DirectoryState::Sealing => style(self.symbol()).yellow(),
            DirectoryState::Done => style(self.symbol()).green(),
            _ => style(self.symbol()).red(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            DirectoryState::RenderFailed
                | DirectoryState::NamespaceMissing
                | DirectoryState::SealFailed
                | DirectoryState::Stopped
                | DirectoryState::Failed
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            DirectoryState::Pending => "pending",
            DirectoryState::Rendering => "rendering",
            DirectoryState::RenderFailed => "render failed",
            DirectoryState::Rendered => "rendered",
            DirectoryState::NamespaceResolved => "namespace resolved",
            DirectoryState::NamespaceMissing => "namespace missing",
            DirectoryState::Split => "split",
            DirectoryState::Sealing => "sealing",
            DirectoryState::SealFailed => "seal failed",
            DirectoryState::Stopped => "stopped",
            DirectoryState::Failed => "failed",
            DirectoryState::Done => "done",
        }
    }
}

/// Receives directory state changes from the pipeline
pub trait PipelineProgress: Send + Sync {
    fn update(&self, directory: &str, state: DirectoryState, message: Option<&str>);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Console reporter writing to stderr
pub struct ProgressReporter {
    states: Mutex<BTreeMap<String, DirectoryState>>,
    start_time: Instant,
    /// Print intermediate states, not only outcomes
    verbose: bool,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self {
            states: Mutex::new(BTreeMap::new()),
            start_time: Instant::now(),
            verbose: false,
        }
    }

    /// Create with verbose output
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    pub fn state(&self, directory: &str) -> Option<DirectoryState> {
        lock(&self.states).get(directory).copied()
    }

    pub fn any_failed(&self) -> bool {
        lock(&self.states).values().any(DirectoryState::is_failure)
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Print overall progress summary
    pub fn print_summary(&self) {
        let states = lock(&self.states);
        let total = states.len();
        let done = states.values().filter(|s| **s == DirectoryState::Done).count();
        let failed = states.values().filter(|s| s.is_failure()).count();
        let elapsed = self.elapsed().as_secs_f64();

        let _ = writeln!(io::stderr());
        if failed > 0 {
            let _ = writeln!(
                io::stderr(),
                "{} {}/{} directories processed, {} failed ({:.1}s)",
                style("✗").red().bold(),
                done,
                total,
                failed,
                elapsed
            );
        } else {
            let _ = writeln!(
                io::stderr(),
                "{} All {} directories processed ({:.1}s)",
                style("✓").green().bold(),
                total,
                elapsed
            );
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineProgress for ProgressReporter {
    fn update(&self, directory: &str, state: DirectoryState, message: Option<&str>) {
        lock(&self.states).insert(directory.to_string(), state);

        let terminal = matches!(state, DirectoryState::Done) || state.is_failure();
        if !terminal && !self.verbose {
            return;
        }
        let message = message
            .map(|m| format!(" - {}", style(m).dim()))
            .unwrap_or_default();
        let _ = writeln!(
            io::stderr(),
            "  {} {} [{}]{}",
            state.styled_symbol(),
            directory,
            state.label(),
            message
        );
    }
}

/// Reporter that prints nothing
pub struct QuietProgress;

impl PipelineProgress for QuietProgress {
    fn update(&self, directory: &str, state: DirectoryState, _message: Option<&str>) {
        tracing::debug!(directory, state = state.label(), "directory state");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_state_symbols() {
        assert_eq!(DirectoryState::Pending.symbol(), "○");
        assert_eq!(DirectoryState::Done.symbol(), "●");
        assert_eq!(DirectoryState::SealFailed.symbol(), "✗");
    }

    #[test]
    fn test_reporter_tracks_latest_state() {
        let reporter = ProgressReporter::new();
        reporter.update("redis-redis", DirectoryState::Rendering, None);
        reporter.update("redis-redis", DirectoryState::Done, None);

        assert_eq!(reporter.state("redis-redis"), Some(DirectoryState::Done));
        assert!(!reporter.any_failed());
    }

    #[test]
    fn test_reporter_any_failed() {
        let reporter = ProgressReporter::new().verbose();
        reporter.update("app-a", DirectoryState::Done, None);
        reporter.update("app-b", DirectoryState::RenderFailed, Some("chart not found"));

        assert!(reporter.any_failed());
        assert_eq!(reporter.state("app-c"), None);
    }
}
