//! Recovery memory persistence port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::RecoveryMemory;

#[async_trait]
pub trait RecoveryMemoryStore: Send + Sync {
    /// Current ledger; empty when nothing was recorded yet.
    async fn load(&self) -> DomainResult<RecoveryMemory>;

    async fn save(&self, memory: &RecoveryMemory) -> DomainResult<()>;
}
