//! Skaffold aggregation
//!
//! After a generation has been written, every component directory gets an
//! umbrella `skaffold.yaml` requiring its fragments, and the root gets a
//! main config requiring every umbrella plus a Fleet dependency graph.
//! Per-component `dependsOn` is never rewritten here.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::error::Result;
use crate::fragments::{COMPONENT_SKAFFOLD_FILE, SkaffoldConfig, SkaffoldRequire};
use crate::generation::Generation;

/// Main config building and deploying every component
pub const MAIN_SKAFFOLD_FILE: &str = "skaffold--main--all.yaml";

/// Component to `dependsOn` names, in composition order
pub const FLEET_GRAPH_FILE: &str = "fleet--dependencies.yaml";

const FRAGMENT_PREFIX: &str = "skaffold-";
const BUILD_FRAGMENT_PREFIX: &str = "skaffold-with-build-";

/// What [`aggregate`] wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateSummary {
    /// Umbrella configs generated from fragments
    pub umbrellas_written: usize,
    /// Hand-written umbrella configs left untouched
    pub umbrellas_kept: usize,
    /// Components without any Skaffold fragment
    pub skipped: Vec<String>,
}

/// Write umbrella configs, the main config and the Fleet graph under `root`
pub fn aggregate(generation: &Generation, root: &Path) -> Result<AggregateSummary> {
    let mut summary = AggregateSummary::default();
    let mut main_requires = Vec::new();
    let mut graph: IndexMap<String, Vec<String>> = IndexMap::new();

    for emission in generation.emissions() {
        let dir_name = &emission.component.dir_name;
        graph.insert(
            emission.component.fleet_name.clone(),
            emission.depends_on.clone(),
        );

        let dir = root.join(dir_name);
        let umbrella = dir.join(COMPONENT_SKAFFOLD_FILE);
        if umbrella.is_file() {
            debug!(component = %dir_name, "keeping existing umbrella config");
            summary.umbrellas_kept += 1;
        } else {
            let fragments = fragment_paths(&dir)?;
            if fragments.is_empty() {
                warn!(component = %dir_name, "no skaffold fragments, leaving it out of the main config");
                summary.skipped.push(dir_name.clone());
                continue;
            }
            let requires = fragments
                .into_iter()
                .map(|path| SkaffoldRequire { path })
                .collect();
            let config = SkaffoldConfig::new().with_requires(requires);
            std::fs::write(&umbrella, serde_yaml::to_string(&config)?)?;
            summary.umbrellas_written += 1;
        }

        main_requires.push(SkaffoldRequire {
            path: format!("{}/{}", dir_name, COMPONENT_SKAFFOLD_FILE),
        });
    }

    let main = SkaffoldConfig::new().with_requires(main_requires);
    std::fs::write(root.join(MAIN_SKAFFOLD_FILE), serde_yaml::to_string(&main)?)?;
    std::fs::write(root.join(FLEET_GRAPH_FILE), serde_yaml::to_string(&graph)?)?;

    debug!(
        written = summary.umbrellas_written,
        kept = summary.umbrellas_kept,
        "aggregated skaffold configs"
    );
    Ok(summary)
}

/// Fragment paths relative to `dir` in `requires` order
fn fragment_paths(dir: &Path) -> Result<Vec<String>> {
    let mut found: Vec<PathBuf> = Vec::new();
    if !dir.exists() {
        return Ok(Vec::new());
    }

    for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name.starts_with(FRAGMENT_PREFIX) && !name.starts_with(BUILD_FRAGMENT_PREFIX) {
            if let Ok(relative) = entry.path().strip_prefix(dir) {
                found.push(relative.to_path_buf());
            }
        }
    }

    let mut paths: Vec<String> = found
        .iter()
        .map(|p| format!("./{}", p.to_string_lossy().replace('\\', "/")))
        .collect();
    // Operators first, longest path first; then the rest, shortest path first
    let rank = |path: &str| {
        let sign = if path.contains("operator") { -1 } else { 1 };
        sign * path.len() as isize
    };
    paths.sort_by(|a, b| rank(a).cmp(&rank(b)).then_with(|| a.cmp(b)));
    Ok(paths)
}
