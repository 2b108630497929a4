use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{CollaborationMarker, CollaborationMarkerReader};

/// Marker file inside a spec directory.
const MARKER_FILE: &str = "collaboration.json";

/// Reads `<specs root>/<spec id>/collaboration.json`.
#[derive(Debug, Clone)]
pub struct FsCollaborationMarkerReader {
    specs_root: PathBuf,
}

impl FsCollaborationMarkerReader {
    pub fn new(specs_root: impl Into<PathBuf>) -> Self {
        Self {
            specs_root: specs_root.into(),
        }
    }
}

#[async_trait]
impl CollaborationMarkerReader for FsCollaborationMarkerReader {
    async fn read(&self, spec_id: &str) -> DomainResult<Option<CollaborationMarker>> {
        let path = self.specs_root.join(spec_id).join(MARKER_FILE);
        match tokio::fs::read(&path).await {
            Ok(content) => serde_json::from_slice(&content)
                .map(Some)
                .map_err(|e| DomainError::Corrupt {
                    path,
                    reason: e.to_string(),
                }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DomainError::io(path, e)),
        }
    }
}
