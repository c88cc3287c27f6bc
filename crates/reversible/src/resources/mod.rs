//! Per-resource-type rollback wiring.
//!
//! Each resource type contributes its policies, executors and (optionally)
//! a live-state reader through one [`ResourceModule`], registered into the
//! engine at startup with [`crate::RollbackEngineBuilder::module`].

use std::sync::Arc;

use reversible_types::{AuditAction, ResourceType};

use crate::executor::{Executor, StateReader};
use crate::policy::RollbackPolicy;

pub mod event;
pub mod message;

pub use event::{EventResource, EventStore, RegistrationStatus};
pub use message::MessageResource;

/// Rollback support for one resource type.
pub trait ResourceModule {
    fn resource_type(&self) -> ResourceType;

    /// Every policy for this resource type. Keys must be unique.
    fn policies(&self) -> Vec<RollbackPolicy>;

    /// Executors for the reversible actions.
    fn executors(&self) -> Vec<(AuditAction, Arc<dyn Executor>)> {
        Vec::new()
    }

    fn state_reader(&self) -> Option<Arc<dyn StateReader>> {
        None
    }
}
