//! Image builds and deployment
//!
//! Builds and Skaffold deploys run once against the main config. Kubectl
//! and Fleet deploys walk the Fleet dependency graph so every component is
//! applied after the components it depends on.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use stackwright_core::{FLEET_FILE, FLEET_GRAPH_FILE, MAIN_SKAFFOLD_FILE, Settings};
use walkdir::WalkDir;

use crate::error::Result;
use crate::seal::is_secret_file;
use crate::tools::{ExternalTools, ToolCommand};

/// Component name to the names it depends on, in composition order
pub type FleetGraph = IndexMap<String, Vec<String>>;

/// Load the Fleet dependency graph written next to the main config
pub fn load_fleet_graph(skaffold_dir: &Path) -> Result<FleetGraph> {
    let text = std::fs::read_to_string(skaffold_dir.join(FLEET_GRAPH_FILE))?;
    Ok(serde_yaml::from_str(&text)?)
}

/// Graph nodes with every dependency listed before its dependents
///
/// Composition order already satisfies this; nodes whose dependencies are
/// not in the graph keep their position.
pub fn deploy_order(graph: &FleetGraph) -> Vec<&str> {
    let mut ordered: Vec<&str> = Vec::with_capacity(graph.len());
    let mut pending: Vec<&str> = graph.keys().map(String::as_str).collect();

    while !pending.is_empty() {
        let before = pending.len();
        pending.retain(|name| {
            let ready = graph[*name]
                .iter()
                .all(|dep| ordered.contains(&dep.as_str()) || !graph.contains_key(dep));
            if ready {
                ordered.push(*name);
            }
            !ready
        });
        if pending.len() == before {
            tracing::warn!(components = ?pending, "dependency cycle, keeping composition order");
            ordered.append(&mut pending);
        }
    }
    ordered
}

/// `skaffold build` over the main config
pub fn build_images_command(settings: &Settings) -> ToolCommand {
    ToolCommand::new("skaffold")
        .args(["build", "--filename", MAIN_SKAFFOLD_FILE, "--tag"])
        .arg(&settings.images_tag)
        .current_dir(&settings.generated_skaffold_dir)
}

/// `skaffold run` over the main config
pub fn skaffold_deploy_command(settings: &Settings) -> ToolCommand {
    ToolCommand::new("skaffold")
        .args(["run", "--filename", MAIN_SKAFFOLD_FILE, "--tag"])
        .arg(&settings.images_tag)
        .current_dir(&settings.generated_skaffold_dir)
}

/// Split manifest files of one component, sealed files included
fn manifest_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        let is_manifest = path.extension().is_some_and(|ext| ext == "yml");
        if entry.file_type().is_file() && is_manifest && !is_secret_file(path) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// One `kubectl apply` per component, in dependency order
pub fn kubectl_deploy_commands(settings: &Settings, graph: &FleetGraph) -> Result<Vec<ToolCommand>> {
    let mut commands = Vec::new();
    for name in deploy_order(graph) {
        let dir = settings.generated_manifests_dir.join(name);
        if !dir.is_dir() {
            tracing::warn!(component = name, "no manifests, skipping");
            continue;
        }
        let files = manifest_files(&dir)?;
        if files.is_empty() {
            tracing::warn!(component = name, "no manifest files, skipping");
            continue;
        }
        let mut command = ToolCommand::new("kubectl").arg("apply");
        for file in files {
            command = command.arg("-f").arg(file.to_string_lossy());
        }
        commands.push(command);
    }
    Ok(commands)
}

/// One `fleet apply` per component bundle, in dependency order
pub fn fleet_deploy_commands(settings: &Settings, graph: &FleetGraph) -> Vec<ToolCommand> {
    deploy_order(graph)
        .into_iter()
        .filter(|name| {
            let present = settings
                .generated_manifests_dir
                .join(name)
                .join(FLEET_FILE)
                .is_file();
            if !present {
                tracing::warn!(component = name, "no fleet.yaml in manifests, skipping");
            }
            present
        })
        .map(|name| {
            ToolCommand::new("fleet")
                .args(["apply", name, name])
                .current_dir(&settings.generated_manifests_dir)
        })
        .collect()
}

/// Run commands in order, stopping at the first failure
pub async fn run_commands(tools: &dyn ExternalTools, commands: &[ToolCommand]) -> Result<()> {
    for command in commands {
        tracing::info!(command = %command, "running");
        tools.run(command).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::MockTools;
    use stackwright_core::{ConfigDocument, SettingsOverrides};
    use tempfile::TempDir;

    fn settings(root: &Path) -> Settings {
        let doc = ConfigDocument::from_yaml(
            &format!("env:\n  REPO_ROOT: {}\n  IMAGES_TAG: v7\n", root.display()),
            "sample",
        )
        .unwrap();
        Settings::resolve(&doc, &SettingsOverrides::default()).unwrap()
    }

    fn graph(entries: &[(&str, &[&str])]) -> FleetGraph {
        entries
            .iter()
            .map(|(name, deps)| {
                (
                    name.to_string(),
                    deps.iter().map(|d| d.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_deploy_order_puts_dependencies_first() {
        let graph = graph(&[
            ("whatsapp-whatsapp-waha", &["whatsapp-namespace", "whatsapp-certificate"]),
            ("whatsapp-certificate", &["whatsapp-namespace"]),
            ("whatsapp-namespace", &[]),
            ("cloudflare-tunnel", &["external-thing"]),
        ]);
        assert_eq!(
            deploy_order(&graph),
            vec![
                "whatsapp-namespace",
                "cloudflare-tunnel",
                "whatsapp-certificate",
                "whatsapp-whatsapp-waha",
            ]
        );
    }

    #[test]
    fn test_deploy_order_survives_cycles() {
        let graph = graph(&[("a", &["b"]), ("b", &["a"])]);
        assert_eq!(deploy_order(&graph), vec!["a", "b"]);
    }

    #[test]
    fn test_skaffold_commands_use_main_config() {
        let temp = TempDir::new().unwrap();
        let settings = settings(temp.path());

        let build = build_images_command(&settings);
        assert_eq!(
            build.to_string(),
            "skaffold build --filename skaffold--main--all.yaml --tag v7"
        );
        assert_eq!(build.cwd.as_deref(), Some(settings.generated_skaffold_dir.as_path()));
        assert!(skaffold_deploy_command(&settings).to_string().starts_with("skaffold run"));
    }

    #[tokio::test]
    async fn test_kubectl_applies_in_graph_order() {
        let temp = TempDir::new().unwrap();
        let settings = settings(temp.path());
        let manifests = &settings.generated_manifests_dir;
        for (dir, file) in [
            ("db-namespace", "db/db-Namespace.yml"),
            ("db-postgres", "db/creds-Secret.sealed.yml"),
            ("db-postgres", "db/db-Service.yml"),
        ] {
            let path = manifests.join(dir).join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, "kind: Thing\n").unwrap();
        }
        std::fs::write(manifests.join("db-postgres/fleet.yaml"), "dependsOn: []\n").unwrap();

        let graph = graph(&[("db-postgres", &["db-namespace"]), ("db-namespace", &[])]);
        let commands = kubectl_deploy_commands(&settings, &graph).unwrap();
        assert_eq!(commands.len(), 2);
        assert!(commands[0].to_string().ends_with("db-namespace/db/db-Namespace.yml"));
        assert_eq!(commands[1].args.iter().filter(|a| *a == "-f").count(), 2);
        assert!(!commands[1].to_string().contains("fleet.yaml"));

        let fleet = fleet_deploy_commands(&settings, &graph);
        assert_eq!(fleet.len(), 1);
        assert_eq!(fleet[0].to_string(), "fleet apply db-postgres db-postgres");

        let tools = MockTools::new();
        run_commands(&tools, &commands).await.unwrap();
        assert_eq!(tools.calls().commands, commands);
    }

    #[test]
    fn test_load_fleet_graph_keeps_order() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(FLEET_GRAPH_FILE),
            "b-app:\n- a-namespace\na-namespace: []\n",
        )
        .unwrap();
        let graph = load_fleet_graph(temp.path()).unwrap();
        assert_eq!(graph.keys().collect::<Vec<_>>(), vec!["b-app", "a-namespace"]);
    }
}
