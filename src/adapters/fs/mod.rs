//! File-backed adapters.
//!
//! Every write goes through [`atomic_write`]: content lands in a uniquely
//! named sibling temp file which is then renamed over the target.

mod collaboration;
mod queue_file;
mod recovery_memory_store;
mod session_repository;
mod spec_archive;

pub use collaboration::FsCollaborationMarkerReader;
pub use queue_file::LineGoalQueue;
pub use recovery_memory_store::FsRecoveryMemoryStore;
pub use session_repository::FsSessionRepository;
pub use spec_archive::FsSpecArchive;

use std::path::Path;

use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

/// Atomic write using a temp file and rename
pub(crate) async fn atomic_write(path: &Path, content: &[u8]) -> DomainResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DomainError::io(parent, e))?;
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));

    tokio::fs::write(&temp_path, content)
        .await
        .map_err(|e| DomainError::io(&temp_path, e))?;

    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(DomainError::io(path, e));
    }

    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
pub(crate) async fn write_json<T: serde::Serialize + Sync>(path: &Path, value: &T) -> DomainResult<()> {
    let content = serde_json::to_vec_pretty(value)?;
    atomic_write(path, &content).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_atomic_write_creates_parents_and_leaves_no_temp() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("nested/deeper/record.json");

        atomic_write(&target, b"{\"a\":1}").await.expect("write");
        atomic_write(&target, b"{\"a\":2}").await.expect("overwrite");

        let content = tokio::fs::read_to_string(&target).await.expect("read");
        assert_eq!(content, "{\"a\":2}");

        let mut entries = tokio::fs::read_dir(target.parent().expect("parent")).await.expect("read_dir");
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.expect("entry") {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["record.json".to_string()]);
    }
}
