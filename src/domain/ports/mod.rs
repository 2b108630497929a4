//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that adapters must implement:
//! - GoalRunner: the external unit of work executing one goal
//! - SessionRepository: the four session archives
//! - SpecArchive: spec directories
//! - CollaborationMarkerReader: collaboration markers for spec protection
//! - RecoveryMemoryStore: the recovery-memory ledger
//! - GoalQueue: the controller's line queue

pub mod collaboration;
pub mod goal_queue;
pub mod goal_runner;
pub mod recovery_memory_store;
pub mod session_repository;
pub mod spec_archive;

pub use collaboration::{CollaborationMarker, CollaborationMarkerReader};
pub use goal_queue::GoalQueue;
pub use goal_runner::{GoalRunOutcome, GoalRunRequest, GoalRunner};
pub use recovery_memory_store::RecoveryMemoryStore;
pub use session_repository::SessionRepository;
pub use spec_archive::SpecArchive;
