//! Integration tests for CLI commands

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

/// Helper to run stackwright command
fn stackwright(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_stackwright"))
        .args(args)
        .env_remove("CONFIG_YAML_PATH")
        .env_remove("IMAGES_TAG")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute stackwright")
}

const MESSAGING_CONFIG: &str = r#"
env:
  CLOUDFLARE_EMAIL: ops@example.com
  CLOUDFLARE_API_TOKEN: cf-token
components:
  whatsapp_waha:
    domain_name: waha.example.com
    username: admin
    password: s3cret
  redis:
    password: redis-pw
  postgres:
    superuser_password: root-pw
"#;

fn write_config(dir: &Path, content: &str) -> String {
    let path = dir.join("config_env.yaml");
    std::fs::write(&path, content).unwrap();
    path.to_string_lossy().into_owned()
}

fn files_under(dir: &Path) -> Vec<String> {
    let mut files: Vec<_> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().strip_prefix(dir).unwrap().to_string_lossy().into_owned())
        .collect();
    files.sort();
    files
}

mod usage {
    use super::*;

    #[test]
    fn test_help_lists_targets() {
        let output = stackwright(&["--help"]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        for target in [
            "generate-skaffolds",
            "generate-manifests",
            "build-all-docker-images",
            "deploy-using-skaffold",
            "deploy-manifests-using-kubectl",
            "deploy-using-fleet-manifests",
        ] {
            assert!(stdout.contains(target), "missing {target} in help");
        }
    }

    #[test]
    fn test_unknown_target_is_usage_error() {
        let output = stackwright(&["deploy-everything"]);
        assert_eq!(output.status.code(), Some(64));
    }
}

mod generate_skaffolds_command {
    use super::*;

    #[test]
    fn test_generates_messaging_tree() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), MESSAGING_CONFIG);

        let output = stackwright(&["generate-skaffolds", "-c", &config, "-e", "messaging"]);

        assert!(
            output.status.success(),
            "stderr: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("whatsapp-whatsapp-waha"));

        let generated = temp.path().join("generated/skaffolds");
        let files = files_under(&generated);
        assert!(files.contains(&"skaffold--main--all.yaml".to_string()));
        assert!(files.contains(&"fleet--dependencies.yaml".to_string()));
        assert!(files.contains(&"whatsapp-certificate/fleet.yaml".to_string()));
        assert!(!temp.path().join("generated/skaffolds.tmp").exists());

        let fleet: serde_yaml::Value = serde_yaml::from_str(
            &std::fs::read_to_string(generated.join("whatsapp-certificate/fleet.yaml")).unwrap(),
        )
        .unwrap();
        let depends_on: Vec<_> = fleet["dependsOn"]
            .as_sequence()
            .unwrap()
            .iter()
            .filter_map(|d| d["name"].as_str())
            .collect();
        assert_eq!(
            depends_on,
            vec!["whatsapp-namespace", "whatsapp-certificate-issuer"]
        );
    }

    #[test]
    fn test_missing_key_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let config = write_config(
            temp.path(),
            &MESSAGING_CONFIG.replace("    username: admin\n", ""),
        );

        let output = stackwright(&["generate-skaffolds", "-c", &config, "-e", "messaging"]);

        assert_eq!(output.status.code(), Some(2));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("username"));
        assert!(stderr.contains("whatsapp_waha"));
        assert!(!temp.path().join("generated").exists());
    }

    #[test]
    fn test_unknown_environment_suggests_closest() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), MESSAGING_CONFIG);

        let output = stackwright(&["generate-skaffolds", "-c", &config, "-e", "mesaging"]);

        assert_eq!(output.status.code(), Some(2));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("did you mean 'messaging'"));
    }

    #[test]
    fn test_missing_config_file() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope.yaml");

        let output = stackwright(&[
            "generate-skaffolds",
            "-c",
            &missing.to_string_lossy(),
            "-e",
            "messaging",
        ]);

        assert_eq!(output.status.code(), Some(2));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("config file not found"));
    }
}
