/// Session repository port (trait) for dependency injection.
///
/// Defines the contract for the four session archives. Services depend on this
/// trait, not on the file-backed adapter.
use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    ListQuery, RecordPayload, SessionKind, SessionListing, SessionRecord, SessionRef,
};

/// Repository trait for session record persistence
///
/// Implementations should handle:
/// - One durable record per run, keyed by a unique file path
/// - Atomic replacement on update
/// - Newest-first ordering by creation time
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Creates a new record in the archive matching the payload's kind
    ///
    /// # Errors
    /// Returns error if the record cannot be serialized or written
    async fn create(&self, payload: RecordPayload) -> DomainResult<SessionRecord>;

    /// Replaces an existing record, bumping `updated_at`
    ///
    /// # Errors
    /// Returns error if the record cannot be serialized or written
    async fn save(&self, record: &mut SessionRecord) -> DomainResult<()>;

    /// Resolves an id, a path or `latest`
    ///
    /// # Errors
    /// Returns `SessionNotFound` if nothing matches, or a read/parse error
    async fn get(&self, kind: SessionKind, reference: &SessionRef) -> DomainResult<SessionRecord>;

    /// Lists records newest first with optional status filter and limit
    ///
    /// # Errors
    /// Returns error if the archive directory cannot be read
    async fn list(&self, kind: SessionKind, query: &ListQuery) -> DomainResult<SessionListing>;

    /// Loads every readable record of a kind, newest first
    ///
    /// Unreadable records are skipped.
    ///
    /// # Errors
    /// Returns error if the archive directory cannot be read
    async fn load_all(&self, kind: SessionKind) -> DomainResult<Vec<SessionRecord>>;

    /// Deletes a record by id
    ///
    /// # Errors
    /// Returns error if the record does not exist or cannot be removed
    async fn delete(&self, kind: SessionKind, id: &str) -> DomainResult<()>;
}
