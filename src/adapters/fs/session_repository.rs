use async_trait::async_trait;
use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use super::write_json;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ListQuery, RecordPayload, SessionKind, SessionListing, SessionRecord, SessionRef,
};
use crate::domain::ports::SessionRepository;

/// File-per-record session archives under one root directory.
///
/// Each kind lives in its own sub-directory; a record's file is
/// `<root>/<kind dir>/<id>.json`.
#[derive(Debug, Clone)]
pub struct FsSessionRepository {
    root: PathBuf,
}

impl FsSessionRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn archive_dir(&self, kind: SessionKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    fn record_path(&self, kind: SessionKind, id: &str) -> PathBuf {
        self.archive_dir(kind).join(format!("{id}.json"))
    }

    fn new_id(kind: SessionKind) -> String {
        let simple = Uuid::new_v4().simple().to_string();
        format!(
            "{}-{}-{}",
            kind.id_prefix(),
            Utc::now().format("%Y%m%d%H%M%S"),
            &simple[..8]
        )
    }

    async fn read_record(path: &Path) -> DomainResult<SessionRecord> {
        let content = tokio::fs::read(path)
            .await
            .map_err(|e| DomainError::io(path, e))?;
        serde_json::from_slice(&content).map_err(|e| DomainError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl SessionRepository for FsSessionRepository {
    async fn create(&self, payload: RecordPayload) -> DomainResult<SessionRecord> {
        let kind = payload.kind();
        let id = Self::new_id(kind);
        let now = Utc::now();
        let record = SessionRecord {
            file: self.record_path(kind, &id),
            id,
            created_at: now,
            updated_at: now,
            payload,
        };
        write_json(&record.file, &record).await?;
        debug!(session_id = %record.id, mode = record.payload.mode(), "created session record");
        Ok(record)
    }

    async fn save(&self, record: &mut SessionRecord) -> DomainResult<()> {
        record.updated_at = Utc::now();
        write_json(&record.file, record).await
    }

    async fn get(&self, kind: SessionKind, reference: &SessionRef) -> DomainResult<SessionRecord> {
        let not_found = || DomainError::SessionNotFound {
            kind,
            reference: reference.to_string(),
        };

        match reference {
            SessionRef::Latest => self
                .load_all(kind)
                .await?
                .into_iter()
                .next()
                .ok_or_else(not_found),
            SessionRef::Id(id) => {
                let path = self.record_path(kind, id);
                if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    return Err(not_found());
                }
                Self::read_record(&path).await
            }
            SessionRef::Path(path) => {
                if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                    return Err(not_found());
                }
                Self::read_record(path).await
            }
        }
    }

    async fn list(&self, kind: SessionKind, query: &ListQuery) -> DomainResult<SessionListing> {
        let matching: Vec<SessionRecord> = self
            .load_all(kind)
            .await?
            .into_iter()
            .filter(|record| query.status.is_none_or(|status| record.status() == status))
            .collect();
        let total = matching.len();
        let items = matching
            .iter()
            .take(query.limit.unwrap_or(usize::MAX))
            .map(SessionRecord::summary)
            .collect();
        Ok(SessionListing { kind, total, items })
    }

    async fn load_all(&self, kind: SessionKind) -> DomainResult<Vec<SessionRecord>> {
        let dir = self.archive_dir(kind);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DomainError::io(&dir, e)),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DomainError::io(&dir, e))?
        {
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') || path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match Self::read_record(&path).await {
                Ok(record) => records.push(record),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable session record"),
            }
        }

        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(records)
    }

    async fn delete(&self, kind: SessionKind, id: &str) -> DomainResult<()> {
        let path = self.record_path(kind, id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(DomainError::SessionNotFound {
                kind,
                reference: id.to_string(),
            }),
            Err(e) => Err(DomainError::io(path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{CloseLoopSession, Portfolio, RecordStatus};

    fn payload(goal: &str, status: RecordStatus) -> RecordPayload {
        RecordPayload::Session(CloseLoopSession {
            status,
            goal: goal.to_string(),
            complexity_score: 10,
            sub_spec_count: 1,
            portfolio: Portfolio::default(),
            resumed: false,
            resumed_from_session: None,
            dry_run: true,
            error: None,
        })
    }

    #[tokio::test]
    async fn test_create_get_latest_and_by_id() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = FsSessionRepository::new(dir.path());

        let first = repo.create(payload("one", RecordStatus::Completed)).await.expect("create");
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = repo.create(payload("two", RecordStatus::Planned)).await.expect("create");

        assert!(first.id.starts_with("cl-"));
        assert!(first.file.ends_with(format!("close-loop-sessions/{}.json", first.id)));

        let latest = repo.get(SessionKind::Session, &SessionRef::Latest).await.expect("latest");
        assert_eq!(latest.id, second.id);

        let by_id = repo
            .get(SessionKind::Session, &SessionRef::Id(first.id.clone()))
            .await
            .expect("by id");
        assert_eq!(by_id, first);

        let by_path = repo
            .get(SessionKind::Session, &SessionRef::Path(first.file.clone()))
            .await
            .expect("by path");
        assert_eq!(by_path.id, first.id);
    }

    #[tokio::test]
    async fn test_missing_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = FsSessionRepository::new(dir.path());

        let err = repo
            .get(SessionKind::BatchSession, &SessionRef::Latest)
            .await
            .expect_err("empty archive");
        assert!(matches!(err, DomainError::SessionNotFound { .. }));

        let err = repo
            .delete(SessionKind::Session, "cl-missing")
            .await
            .expect_err("missing record");
        assert!(matches!(err, DomainError::SessionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_filters_and_limits() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = FsSessionRepository::new(dir.path());
        for status in [RecordStatus::Completed, RecordStatus::Failed, RecordStatus::Completed] {
            repo.create(payload("g", status)).await.expect("create");
        }

        let listing = repo
            .list(
                SessionKind::Session,
                &ListQuery {
                    status: Some(RecordStatus::Completed),
                    limit: Some(1),
                },
            )
            .await
            .expect("list");
        assert_eq!(listing.total, 2);
        assert_eq!(listing.items.len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_records_are_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = FsSessionRepository::new(dir.path());
        repo.create(payload("ok", RecordStatus::Completed)).await.expect("create");
        tokio::fs::write(repo.archive_dir(SessionKind::Session).join("broken.json"), b"{nope")
            .await
            .expect("write");

        let records = repo.load_all(SessionKind::Session).await.expect("load");
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_save_bumps_updated_at() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = FsSessionRepository::new(dir.path());
        let mut record = repo.create(payload("g", RecordStatus::Running)).await.expect("create");
        let created = record.updated_at;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        repo.save(&mut record).await.expect("save");
        assert!(record.updated_at > created);

        let reloaded = repo
            .get(SessionKind::Session, &SessionRef::Id(record.id.clone()))
            .await
            .expect("get");
        assert_eq!(reloaded.updated_at, record.updated_at);
    }
}
