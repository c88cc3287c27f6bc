//! Error taxonomy for rollback attempts.
//!
//! Two layers:
//! - [`RollbackFailure`]: every terminal "no" a caller can act on. These are
//!   carried inside [`crate::RollbackPreview`] and [`crate::RollbackResult`],
//!   never returned as `Err`.
//! - [`EngineError`]: the few conditions that do cross the boundary as `Err`
//!   (unknown audit entry, confirmation misuse, internal storage faults).

use reversible_types::{AuditAction, AuditLogId, ResourceId, ResourceType};
use serde::Serialize;
use thiserror::Error;

/// A terminal, human-explainable reason a rollback cannot proceed.
///
/// `Display` output is safe to show to end users. [`RollbackFailure::code`]
/// is stable and lets UIs decide which step to retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(
    tag = "code",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum RollbackFailure {
    #[error("No rollback policy is defined for {action} on {resource_type}")]
    NoPolicy {
        resource_type: ResourceType,
        action: AuditAction,
    },

    #[error("{message}")]
    Irreversible { message: String },

    #[error("This change was made {elapsed} ago and can only be undone within {window}")]
    WindowExpired {
        elapsed: String,
        window: String,
        elapsed_secs: i64,
        max_age_secs: i64,
    },

    #[error("The original change recorded no prior state, so it cannot be restored automatically")]
    MissingSnapshot,

    /// The resource the entry describes has since been removed.
    #[error("{resource_type} {resource_id} no longer exists")]
    ResourceNotFound {
        resource_type: ResourceType,
        resource_id: ResourceId,
    },

    #[error("{}", .reasons.join("; "))]
    BlockedByCascade { reasons: Vec<String> },

    #[error("A reason between {min_len} and {max_len} characters is required")]
    InvalidReason { min_len: usize, max_len: usize },

    #[error("This rollback must be confirmed; preview it again and confirm")]
    ConfirmationRequired,

    #[error("The confirmation is invalid or has expired; preview it again and confirm")]
    InvalidConfirmation,

    #[error("Undoing {action} on {resource_type} is not implemented")]
    ExecutorMissing {
        resource_type: ResourceType,
        action: AuditAction,
    },

    #[error("The rollback could not be applied: {message}")]
    ExecutorFailure { message: String },
}

impl RollbackFailure {
    /// Stable machine-readable code, identical to the serialized `code` tag.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoPolicy { .. } => "NO_POLICY",
            Self::Irreversible { .. } => "IRREVERSIBLE",
            Self::WindowExpired { .. } => "WINDOW_EXPIRED",
            Self::MissingSnapshot => "MISSING_SNAPSHOT",
            Self::ResourceNotFound { .. } => "RESOURCE_NOT_FOUND",
            Self::BlockedByCascade { .. } => "BLOCKED_BY_CASCADE",
            Self::InvalidReason { .. } => "INVALID_REASON",
            Self::ConfirmationRequired => "CONFIRMATION_REQUIRED",
            Self::InvalidConfirmation => "INVALID_CONFIRMATION",
            Self::ExecutorMissing { .. } => "EXECUTOR_MISSING",
            Self::ExecutorFailure { .. } => "EXECUTOR_FAILURE",
        }
    }

    /// Whether the caller should re-run preview and confirmation before retrying.
    pub fn needs_reconfirmation(&self) -> bool {
        matches!(
            self,
            Self::ConfirmationRequired | Self::InvalidConfirmation | Self::ExecutorFailure { .. }
        )
    }
}

/// Errors returned as `Err` from engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Audit entry not found: {0}")]
    AuditEntryNotFound(AuditLogId),

    #[error("Rollback cannot be confirmed: {0}")]
    NotConfirmable(RollbackFailure),

    #[error("This rollback does not require confirmation")]
    ConfirmationNotRequired,

    /// Unexpected storage or token-store fault. `detail` is for logs only.
    #[error("Internal error; the rollback was not performed")]
    Internal { detail: String },
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised while building registries and engines.
///
/// These are programming errors in the host's startup wiring.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Duplicate rollback policy registered for {0}")]
    DuplicatePolicy(crate::policy::PolicyKey),

    #[error("Duplicate rollback executor registered for {0}")]
    DuplicateExecutor(crate::policy::PolicyKey),

    #[error("Duplicate state reader registered for resource type {0}")]
    DuplicateStateReader(ResourceType),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_serialized_tag() {
        let failures = [
            RollbackFailure::NoPolicy {
                resource_type: ResourceType::new("Event"),
                action: AuditAction::Delete,
            },
            RollbackFailure::Irreversible {
                message: "nope".into(),
            },
            RollbackFailure::WindowExpired {
                elapsed: "100 hours".into(),
                window: "72 hours".into(),
                elapsed_secs: 360_000,
                max_age_secs: 259_200,
            },
            RollbackFailure::MissingSnapshot,
            RollbackFailure::ResourceNotFound {
                resource_type: ResourceType::new("Event"),
                resource_id: ResourceId::new("E1"),
            },
            RollbackFailure::BlockedByCascade {
                reasons: vec!["a".into()],
            },
            RollbackFailure::InvalidReason {
                min_len: 10,
                max_len: 500,
            },
            RollbackFailure::ConfirmationRequired,
            RollbackFailure::InvalidConfirmation,
            RollbackFailure::ExecutorMissing {
                resource_type: ResourceType::new("Event"),
                action: AuditAction::Publish,
            },
            RollbackFailure::ExecutorFailure {
                message: "conflict".into(),
            },
        ];

        for failure in failures {
            let value = serde_json::to_value(&failure).unwrap();
            assert_eq!(value["code"], failure.code());
        }
    }

    #[test]
    fn cascade_failure_joins_reasons() {
        let failure = RollbackFailure::BlockedByCascade {
            reasons: vec!["first".into(), "second".into()],
        };
        assert_eq!(failure.to_string(), "first; second");
    }

    #[test]
    fn confirmation_failures_are_distinguishable() {
        assert_ne!(
            RollbackFailure::ConfirmationRequired.code(),
            RollbackFailure::InvalidConfirmation.code()
        );
        assert!(RollbackFailure::InvalidConfirmation.needs_reconfirmation());
        assert!(!RollbackFailure::MissingSnapshot.needs_reconfirmation());
    }

    #[test]
    fn internal_errors_hide_detail() {
        let err = EngineError::Internal {
            detail: "lock poisoned at token store".into(),
        };
        assert!(!err.to_string().contains("poisoned"));
    }
}
