//! Executor contract and registry.
//!
//! An [`Executor`] performs the compensating mutation for one
//! `(resource type, action)` pair and writes the audit entry describing it.
//! The mutation and the audit append must commit together: executors use a
//! storage operation that fails visibly on a concurrent write instead of
//! silently overwriting.
//!
//! [`ExecutionContext::compensation_entry`] prefills the audit entry with
//! the resource, the acting user and every rollback metadata key, so
//! executors only add their own `before`/`after` snapshots.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use reversible_ledger::{AuditLedger, LedgerError};
use reversible_types::{
    ActorContext, AuditAction, AuditLogEntry, AuditLogId, NewAuditEntry, ResourceId,
    ResourceType, Snapshot, rollback_metadata,
};
use serde_json::Value;
use thiserror::Error;

use crate::error::{RegistryError, RollbackFailure};
use crate::policy::{PolicyKey, PolicyRegistry, RollbackPolicy};

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("{resource_id} was modified concurrently (expected version {expected}, found {found})")]
    Conflict {
        resource_id: ResourceId,
        expected: u64,
        found: u64,
    },

    #[error("{resource_type} {resource_id} no longer exists")]
    ResourceNotFound {
        resource_type: ResourceType,
        resource_id: ResourceId,
    },

    #[error("the original change has no prior state to restore")]
    MissingSnapshot,

    #[error("audit ledger rejected the compensation entry")]
    Ledger(#[from] LedgerError),

    #[error("{0}")]
    Failed(String),
}

/// Shown in place of detail that only belongs in the logs.
pub(crate) const UNEXPECTED_FAILURE: &str = "an unexpected error occurred";

impl ExecutorError {
    /// The failure reported to the caller. Versions, ledger errors and
    /// executor-specific messages are logged, not returned.
    pub fn to_failure(&self) -> RollbackFailure {
        let message = match self {
            Self::ResourceNotFound {
                resource_type,
                resource_id,
            } => {
                return RollbackFailure::ResourceNotFound {
                    resource_type: resource_type.clone(),
                    resource_id: resource_id.clone(),
                };
            }
            Self::MissingSnapshot => return RollbackFailure::MissingSnapshot,
            Self::Conflict { .. } => "the resource was changed by someone else; preview it again",
            Self::Ledger(_) => "the audit log could not record the rollback",
            Self::Failed(_) => UNEXPECTED_FAILURE,
        };
        RollbackFailure::ExecutorFailure {
            message: message.to_string(),
        }
    }
}

/// Everything an executor needs to compensate one audit entry.
pub struct ExecutionContext<'a> {
    /// The entry being undone.
    pub entry: &'a AuditLogEntry,
    pub policy: &'a RollbackPolicy,
    pub actor: &'a ActorContext,
    /// Caller-supplied justification, already trimmed and length-checked.
    pub reason: &'a str,
    pub ledger: &'a dyn AuditLedger,
    pub now: DateTime<Utc>,
}

impl ExecutionContext<'_> {
    /// A compensation entry for `action` on the same resource, carrying the
    /// rollback metadata that links it to the original entry.
    pub fn compensation_entry(&self, action: AuditAction) -> NewAuditEntry {
        let original_actor = self
            .entry
            .actor_id
            .as_ref()
            .map_or(Value::Null, |a| Value::String(a.to_string()));

        NewAuditEntry::new(
            action,
            self.entry.resource_type.clone(),
            self.entry.resource_id.clone(),
        )
        .with_actor(self.actor.actor_id.clone())
        .with_metadata(rollback_metadata::IS_ROLLBACK, true)
        .with_metadata(
            rollback_metadata::ORIGINAL_AUDIT_LOG_ID,
            self.entry.id.to_string(),
        )
        .with_metadata(rollback_metadata::ORIGINAL_ACTION, self.entry.action.as_str())
        .with_metadata(rollback_metadata::ORIGINAL_ACTOR_ID, original_actor)
        .with_metadata(
            rollback_metadata::ORIGINAL_TIMESTAMP,
            self.entry
                .created_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        )
        .with_metadata(rollback_metadata::REASON, self.reason)
    }

    /// The inverse of the original action, for direct-undo executors.
    pub fn inverse_action(&self) -> Result<AuditAction, ExecutorError> {
        self.entry.action.inverse().ok_or_else(|| {
            ExecutorError::Failed(format!("{} has no inverse action", self.entry.action))
        })
    }
}

/// What a successful compensation produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorOutcome {
    /// Id of the compensation entry the executor appended.
    pub rollback_audit_log_id: AuditLogId,
    pub restored_state: Option<Snapshot>,
    pub warnings: Vec<String>,
}

impl ExecutorOutcome {
    pub fn new(rollback_audit_log_id: AuditLogId) -> Self {
        Self {
            rollback_audit_log_id,
            restored_state: None,
            warnings: Vec::new(),
        }
    }

    pub fn with_restored_state(mut self, state: Snapshot) -> Self {
        self.restored_state = Some(state);
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// Applies the compensating mutation for one `(resource type, action)`.
pub trait Executor: Send + Sync {
    fn execute(&self, ctx: &ExecutionContext<'_>) -> Result<ExecutorOutcome, ExecutorError>;
}

impl fmt::Debug for dyn Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Executor")
    }
}

struct FnExecutor<F>(F);

impl<F> Executor for FnExecutor<F>
where
    F: Fn(&ExecutionContext<'_>) -> Result<ExecutorOutcome, ExecutorError> + Send + Sync,
{
    fn execute(&self, ctx: &ExecutionContext<'_>) -> Result<ExecutorOutcome, ExecutorError> {
        (self.0)(ctx)
    }
}

/// Wraps a closure as an executor.
pub fn executor_fn<F>(execute: F) -> Arc<dyn Executor>
where
    F: Fn(&ExecutionContext<'_>) -> Result<ExecutorOutcome, ExecutorError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnExecutor(execute))
}

/// Reads the live state of resources of one type, for previews.
pub trait StateReader: Send + Sync {
    /// `Ok(None)` means the resource does not exist.
    fn current_state(&self, resource_id: &ResourceId) -> Result<Option<Snapshot>, ExecutorError>;
}

/// Executors and state readers, keyed like the policy registry.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: BTreeMap<PolicyKey, Arc<dyn Executor>>,
    state_readers: BTreeMap<ResourceType, Arc<dyn StateReader>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        resource_type: ResourceType,
        action: AuditAction,
        executor: Arc<dyn Executor>,
    ) -> Result<(), RegistryError> {
        let key = PolicyKey::new(resource_type, action);
        if self.executors.contains_key(&key) {
            return Err(RegistryError::DuplicateExecutor(key));
        }
        self.executors.insert(key, executor);
        Ok(())
    }

    pub fn register_state_reader(
        &mut self,
        resource_type: ResourceType,
        reader: Arc<dyn StateReader>,
    ) -> Result<(), RegistryError> {
        if self.state_readers.contains_key(&resource_type) {
            return Err(RegistryError::DuplicateStateReader(resource_type));
        }
        self.state_readers.insert(resource_type, reader);
        Ok(())
    }

    pub fn get(
        &self,
        resource_type: &ResourceType,
        action: AuditAction,
    ) -> Option<&Arc<dyn Executor>> {
        self.executors.get(&PolicyKey::new(resource_type.clone(), action))
    }

    pub fn state_reader(&self, resource_type: &ResourceType) -> Option<&Arc<dyn StateReader>> {
        self.state_readers.get(resource_type)
    }

    /// Reversible policies that have no executor. Each is a deployment defect.
    pub fn missing_for(&self, policies: &PolicyRegistry) -> Vec<PolicyKey> {
        policies
            .all()
            .filter(|p| !p.is_irreversible())
            .map(RollbackPolicy::key)
            .filter(|key| !self.executors.contains_key(key))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("executors", &self.executors.keys().collect::<Vec<_>>())
            .field("state_readers", &self.state_readers.keys().collect::<Vec<_>>())
            .finish()
    }
}
