//! Per-resource manifest files
//!
//! A rendered directory is written as `<group>/<name>-<Kind>.yml`, where the
//! group is the instance label, the release label, or the resource name.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::document::Document;
use crate::error::Result;

/// Extension of a split plaintext file
pub const SPLIT_EXTENSION: &str = "yml";

/// Relative path of a document's split file, `None` without name or kind
pub fn split_path(doc: &Document) -> Option<PathBuf> {
    let name = doc.name()?;
    let kind = doc.kind()?;
    let group = doc.instance().unwrap_or(name);
    Some(PathBuf::from(group).join(format!("{name}-{kind}.{SPLIT_EXTENSION}")))
}

/// Write one file per document below `output_dir`
///
/// Returns the written paths in document order. Unnamed documents and
/// repeated `(group, name, kind)` keys are skipped with a warning; the first
/// occurrence wins.
pub fn split_documents(documents: &[Document], output_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let mut written = Vec::new();

    for doc in documents {
        let Some(relative) = split_path(doc) else {
            tracing::warn!(
                directory = %output_dir.display(),
                kind = doc.kind().unwrap_or("<none>"),
                "skipping resource without name or kind"
            );
            continue;
        };
        if !seen.insert(relative.clone()) {
            tracing::warn!(
                file = %relative.display(),
                "duplicate resource in rendered output, keeping the first"
            );
            continue;
        }

        let path = output_dir.join(&relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, doc.to_yaml()?)?;
        written.push(path);
    }

    if written.is_empty() {
        tracing::warn!(directory = %output_dir.display(), "no manifest names found");
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parse_documents;
    use tempfile::TempDir;

    const RENDERED: &str = r#"
apiVersion: v1
kind: Secret
metadata:
  name: waha-auth
  namespace: whatsapp
  labels:
    app.kubernetes.io/instance: waha
---
apiVersion: v1
kind: Service
metadata:
  name: waha
  namespace: whatsapp
---
apiVersion: v1
kind: Service
metadata:
  name: waha
  namespace: whatsapp
  labels:
    extra: duplicate
---
apiVersion: v1
kind: ConfigMap
"#;

    #[test]
    fn test_split_layout() {
        let temp = TempDir::new().unwrap();
        let docs = parse_documents("whatsapp-whatsapp-waha", RENDERED).unwrap();

        let written = split_documents(&docs, temp.path()).unwrap();
        let relative: Vec<_> = written
            .iter()
            .map(|p| p.strip_prefix(temp.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            relative,
            vec![
                PathBuf::from("waha/waha-auth-Secret.yml"),
                PathBuf::from("waha/waha-Service.yml"),
            ]
        );

        let service = std::fs::read_to_string(&written[1]).unwrap();
        assert!(!service.contains("duplicate"));
    }

    #[test]
    fn test_split_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let docs = parse_documents("app", RENDERED).unwrap();

        let first = split_documents(&docs, temp.path()).unwrap();
        let contents: Vec<_> = first
            .iter()
            .map(|p| std::fs::read_to_string(p).unwrap())
            .collect();
        let second = split_documents(&docs, temp.path()).unwrap();

        assert_eq!(first, second);
        for (path, before) in second.iter().zip(contents) {
            assert_eq!(std::fs::read_to_string(path).unwrap(), before);
        }
        let files = walkdir::WalkDir::new(temp.path())
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .count();
        assert_eq!(files, 2);
    }
}
