//! Sealing of split secret files
//!
//! Every split file whose name mentions "secret" is encrypted against the
//! cluster certificate into a `.sealed.yml` sibling and the plaintext is
//! removed. On failure the plaintext files of the directory are purged so
//! none survive the run.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use walkdir::WalkDir;

use crate::error::{PipelineError, Result};
use crate::tools::ExternalTools;

/// Suffix of a sealed secret file
pub const SEALED_SUFFIX: &str = ".sealed.yml";

/// Whether `path` is a plaintext secret file waiting to be sealed
pub fn is_secret_file(path: &Path) -> bool {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_lowercase()) else {
        return false;
    };
    name.contains("secret")
        && !name.ends_with(SEALED_SUFFIX)
        && (name.ends_with(".yml") || name.ends_with(".yaml"))
}

/// Sealed sibling of a plaintext secret file
pub fn sealed_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{stem}{SEALED_SUFFIX}"))
}

/// Plaintext secret files below `dir`, sorted
pub fn secret_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !dir.exists() {
        return Ok(files);
    }
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() && is_secret_file(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Delete every plaintext secret file below `dir`, returning how many
pub fn purge_plaintext_secrets(dir: &Path) -> Result<usize> {
    let files = secret_files(dir)?;
    for file in &files {
        std::fs::remove_file(file)?;
    }
    if !files.is_empty() {
        tracing::warn!(directory = %dir.display(), count = files.len(), "purged plaintext secrets");
    }
    Ok(files.len())
}

/// Seal the secret files of one output directory, one at a time
///
/// Stops before the next file once `stop` is set. Any failure purges the
/// directory's remaining plaintext before the error is returned.
pub async fn seal_directory(
    tools: &dyn ExternalTools,
    dir: &Path,
    certificate: &Path,
    stop: &AtomicBool,
) -> Result<Vec<PathBuf>> {
    let directory = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut sealed = Vec::new();

    for file in secret_files(dir)? {
        if stop.load(Ordering::SeqCst) {
            purge_plaintext_secrets(dir)?;
            return Err(PipelineError::Stopped { directory });
        }

        let result = match tools.seal(&file, certificate).await {
            Ok(bytes) => {
                let target = sealed_path(&file);
                std::fs::write(&target, bytes)
                    .and_then(|()| std::fs::remove_file(&file))
                    .map(|()| target)
                    .map_err(PipelineError::from)
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(target) => {
                tracing::debug!(file = %target.display(), "sealed");
                sealed.push(target);
            }
            Err(e) => {
                purge_plaintext_secrets(dir)?;
                return Err(PipelineError::Seal {
                    file,
                    message: e.to_string(),
                });
            }
        }
    }
    Ok(sealed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::MockTools;
    use tempfile::TempDir;

    const SECRET: &str = "apiVersion: v1\nkind: Secret\nmetadata:\n  name: creds\n  namespace: apps\nstringData:\n  token: abc\n";

    fn write(dir: &Path, relative: &str, content: &str) -> PathBuf {
        let path = dir.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    fn certificate(dir: &Path) -> PathBuf {
        write(dir, "cert.pem", "-----BEGIN CERTIFICATE-----\n")
    }

    #[test]
    fn test_secret_heuristic() {
        assert!(is_secret_file(Path::new("a/creds-Secret.yml")));
        assert!(is_secret_file(Path::new("a/my-secrets-ConfigMap.yaml")));
        assert!(!is_secret_file(Path::new("a/creds-Secret.sealed.yml")));
        assert!(!is_secret_file(Path::new("a/web-Service.yml")));
        assert_eq!(
            sealed_path(Path::new("a/creds-Secret.yml")),
            PathBuf::from("a/creds-Secret.sealed.yml")
        );
    }

    #[tokio::test]
    async fn test_seal_replaces_plaintext() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("apps-app");
        let plain = write(&dir, "app/creds-Secret.yml", SECRET);
        write(&dir, "app/web-Service.yml", "kind: Service\n");

        let tools = MockTools::new();
        let stop = AtomicBool::new(false);
        let sealed = seal_directory(&tools, &dir, &certificate(temp.path()), &stop)
            .await
            .unwrap();

        assert_eq!(sealed, vec![dir.join("app/creds-Secret.sealed.yml")]);
        assert!(!plain.exists());
        assert!(dir.join("app/web-Service.yml").exists());
        let content = std::fs::read_to_string(&sealed[0]).unwrap();
        assert!(content.contains("SealedSecret"));
        assert!(!content.contains("abc"));
        assert!(secret_files(&dir).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_seal_failure_purges_plaintext() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("apps-app");
        write(&dir, "app/a-Secret.yml", SECRET);
        write(&dir, "app/b-Secret.yml", SECRET);

        let tools = MockTools::new().with_seal_failure("a-Secret");
        let stop = AtomicBool::new(false);
        let err = seal_directory(&tools, &dir, &certificate(temp.path()), &stop)
            .await
            .unwrap_err();

        assert!(err.is_fatal());
        assert!(matches!(err, PipelineError::Seal { ref file, .. } if file.ends_with("a-Secret.yml")));
        assert!(secret_files(&dir).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stop_flag_halts_before_sealing() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("apps-app");
        write(&dir, "app/a-Secret.yml", SECRET);

        let tools = MockTools::new();
        let stop = AtomicBool::new(true);
        let err = seal_directory(&tools, &dir, &certificate(temp.path()), &stop)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Stopped { .. }));
        assert!(tools.calls().seals.is_empty());
        assert!(secret_files(&dir).unwrap().is_empty());
    }
}
