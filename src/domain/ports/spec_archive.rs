//! Spec archive port - spec directories produced by goal runners.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::SpecEntry;

#[async_trait]
pub trait SpecArchive: Send + Sync {
    /// All spec directories, newest modification first.
    async fn list(&self) -> DomainResult<Vec<SpecEntry>>;

    async fn delete(&self, id: &str) -> DomainResult<()>;
}
