use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;

use super::write_json;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::RecoveryMemory;
use crate::domain::ports::RecoveryMemoryStore;

/// Recovery memory kept in one JSON file.
#[derive(Debug, Clone)]
pub struct FsRecoveryMemoryStore {
    path: PathBuf,
}

impl FsRecoveryMemoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RecoveryMemoryStore for FsRecoveryMemoryStore {
    async fn load(&self) -> DomainResult<RecoveryMemory> {
        match tokio::fs::read(&self.path).await {
            Ok(content) => serde_json::from_slice(&content).map_err(|e| DomainError::Corrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(RecoveryMemory::default()),
            Err(e) => Err(DomainError::io(&self.path, e)),
        }
    }

    async fn save(&self, memory: &RecoveryMemory) -> DomainResult<()> {
        write_json(&self.path, memory).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::RemediationAction;
    use chrono::Utc;

    #[tokio::test]
    async fn test_round_trip_and_cold_start() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsRecoveryMemoryStore::new(dir.path().join("auto/recovery-memory.json"));
        assert_eq!(store.load().await.expect("load"), RecoveryMemory::default());

        let mut memory = RecoveryMemory::default();
        memory.record("sig", "program", RemediationAction::ReduceAgentBudget, true, Utc::now());
        store.save(&memory).await.expect("save");

        assert_eq!(store.load().await.expect("load"), memory);
    }
}
