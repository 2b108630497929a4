use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::SpecEntry;
use crate::domain::ports::SpecArchive;

/// Spec directories under one root; the directory name is the spec id.
#[derive(Debug, Clone)]
pub struct FsSpecArchive {
    root: PathBuf,
}

impl FsSpecArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SpecArchive for FsSpecArchive {
    async fn list(&self) -> DomainResult<Vec<SpecEntry>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DomainError::io(&self.root, e)),
        };

        let mut specs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DomainError::io(&self.root, e))?
        {
            let path = entry.path();
            let metadata = entry.metadata().await.map_err(|e| DomainError::io(&path, e))?;
            if !metadata.is_dir() {
                continue;
            }
            let modified_at: DateTime<Utc> = metadata
                .modified()
                .map_err(|e| DomainError::io(&path, e))?
                .into();
            specs.push(SpecEntry {
                id: entry.file_name().to_string_lossy().into_owned(),
                path,
                modified_at,
            });
        }

        specs.sort_by(|a, b| b.modified_at.cmp(&a.modified_at).then_with(|| b.id.cmp(&a.id)));
        Ok(specs)
    }

    async fn delete(&self, id: &str) -> DomainResult<()> {
        if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
            return Err(DomainError::InvalidConfiguration(format!("invalid spec id: {id}")));
        }
        let path = self.root.join(id);
        tokio::fs::remove_dir_all(&path)
            .await
            .map_err(|e| DomainError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_and_delete() {
        let dir = tempfile::tempdir().expect("tempdir");
        tokio::fs::create_dir_all(dir.path().join("001-00-alpha")).await.expect("mkdir");
        tokio::fs::create_dir_all(dir.path().join("001-01-alpha")).await.expect("mkdir");
        tokio::fs::write(dir.path().join("README.md"), b"not a spec").await.expect("write");

        let archive = FsSpecArchive::new(dir.path());
        let specs = archive.list().await.expect("list");
        assert_eq!(specs.len(), 2);

        archive.delete("001-00-alpha").await.expect("delete");
        assert_eq!(archive.list().await.expect("list").len(), 1);
        assert!(archive.delete("../escape").await.is_err());
    }

    #[tokio::test]
    async fn test_missing_root_is_empty() {
        let archive = FsSpecArchive::new("/nonexistent/specs/root");
        assert!(archive.list().await.expect("list").is_empty());
    }
}
