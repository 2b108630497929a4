//! Durable goal queue port.

use async_trait::async_trait;
use std::path::Path;

use crate::domain::errors::DomainResult;

/// Line-oriented FIFO goal queue addressed by path.
#[async_trait]
pub trait GoalQueue: Send + Sync {
    /// Pending goals in queue order. A missing file is an empty queue.
    async fn pending(&self, path: &Path) -> DomainResult<Vec<String>>;

    /// Remove one occurrence of each dequeued goal from the current file
    /// content, keeping everything else. Returns the goals still pending.
    async fn remove(&self, path: &Path, dequeued: &[String]) -> DomainResult<usize>;

    async fn append(&self, path: &Path, goals: &[String]) -> DomainResult<()>;
}
