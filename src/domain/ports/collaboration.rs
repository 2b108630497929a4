//! Collaboration marker port, consulted only when protecting specs from pruning.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainResult;

/// Statuses that mean someone is still working on a spec.
const ACTIVE_STATUSES: [&str; 4] = ["in-progress", "active", "assigned", "claimed"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollaborationMarker {
    pub status: String,
}

impl CollaborationMarker {
    pub fn is_active(&self) -> bool {
        let status = self.status.trim().to_lowercase().replace('_', "-");
        ACTIVE_STATUSES.contains(&status.as_str())
    }
}

#[async_trait]
pub trait CollaborationMarkerReader: Send + Sync {
    /// Marker for a spec, if one exists.
    async fn read(&self, spec_id: &str) -> DomainResult<Option<CollaborationMarker>>;
}
