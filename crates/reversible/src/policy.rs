//! Rollback policies and the registry that holds them.
//!
//! A [`RollbackPolicy`] states, for one `(resource type, action)` pair,
//! whether and how an audit entry can be undone. Policies are registered
//! once at startup; a duplicate key is a wiring bug and is rejected.
//! A pair with no policy is simply not rollbackable.
//!
//! # Example
//!
//! ```
//! use reversible::policy::{Classification, PolicyRegistry, RollbackPolicy, RollbackWindow};
//! use reversible_types::{AuditAction, ResourceType};
//!
//! let mut registry = PolicyRegistry::new();
//! registry
//!     .register(
//!         RollbackPolicy::new(
//!             "Event",
//!             AuditAction::Update,
//!             Classification::Compensatable,
//!             "Restore the event's previous details",
//!         )
//!         .with_window(RollbackWindow::hours(72))
//!         .requiring_confirmation(),
//!     )
//!     .unwrap();
//!
//! let event = ResourceType::new("Event");
//! assert!(registry.is_rollbackable(&event, AuditAction::Update));
//! assert!(!registry.is_rollbackable(&event, AuditAction::Delete));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::Duration;
use reversible_types::{AuditAction, ResourceType};
use serde::{Serialize, Serializer};

use crate::cascade::CascadeCheck;
use crate::error::RegistryError;

/// Static reversibility category of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    /// The prior state can be restored exactly.
    FullyReversible,
    /// A compensating action approximates the undo; side effects may remain.
    Compensatable,
    /// Can never be undone (e.g. a sent message).
    Irreversible,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FullyReversible => write!(f, "Fully reversible"),
            Self::Compensatable => write!(f, "Compensatable"),
            Self::Irreversible => write!(f, "Irreversible"),
        }
    }
}

/// How an executor undoes the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompensationStrategy {
    /// Applies the inverse action (toggle a flag, archive a creation).
    /// The original entry's `before` snapshot is optional.
    DirectUndo,
    /// Writes the original entry's `before` snapshot back onto the resource.
    /// A missing snapshot blocks the rollback.
    RestoreSnapshot,
}

/// Maximum age an audit entry may have and still be undone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackWindow {
    #[serde(rename = "maxAgeSecs", serialize_with = "serialize_secs")]
    pub max_age: Duration,
    pub description: String,
    /// Actors holding this capability may undo entries older than the window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation_capability: Option<String>,
}

impl RollbackWindow {
    pub fn new(max_age: Duration, description: impl Into<String>) -> Self {
        Self {
            max_age,
            description: description.into(),
            escalation_capability: None,
        }
    }

    /// A window of `hours`, described as "N hours".
    pub fn hours(hours: i64) -> Self {
        Self::new(Duration::hours(hours), format!("{hours} hours"))
    }

    pub fn with_escalation(mut self, capability: impl Into<String>) -> Self {
        self.escalation_capability = Some(capability.into());
        self
    }
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i64(duration.num_seconds())
}

fn serialize_check_names<S: Serializer>(
    checks: &[Arc<dyn CascadeCheck>],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(checks.iter().map(|c| c.name()))
}

/// Registry key: one policy per `(resource type, action)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PolicyKey {
    pub resource_type: ResourceType,
    pub action: AuditAction,
}

impl PolicyKey {
    pub const SEPARATOR: &'static str = "::";

    pub fn new(resource_type: ResourceType, action: AuditAction) -> Self {
        Self {
            resource_type,
            action,
        }
    }
}

impl fmt::Display for PolicyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.resource_type, Self::SEPARATOR, self.action)
    }
}

/// Reversibility rules for one `(resource type, action)` pair.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackPolicy {
    pub resource_type: ResourceType,
    pub action: AuditAction,
    pub classification: Classification,
    pub strategy: CompensationStrategy,
    pub description: String,
    /// Opaque permission tag; enforced by the caller, echoed for display.
    pub required_capability: String,
    /// `None` means no age limit.
    pub window: Option<RollbackWindow>,
    pub requires_confirmation: bool,
    #[serde(serialize_with = "serialize_check_names")]
    pub cascade_checks: Vec<Arc<dyn CascadeCheck>>,
    pub warning_message: Option<String>,
}

impl RollbackPolicy {
    /// Creates a snapshot-restoring policy with no window, no confirmation
    /// and no cascade checks.
    pub fn new(
        resource_type: impl Into<ResourceType>,
        action: AuditAction,
        classification: Classification,
        description: impl Into<String>,
    ) -> Self {
        let resource_type = resource_type.into();
        let required_capability = format!("{}:rollback", resource_type.as_str().to_lowercase());
        Self {
            resource_type,
            action,
            classification,
            strategy: CompensationStrategy::RestoreSnapshot,
            description: description.into(),
            required_capability,
            window: None,
            requires_confirmation: false,
            cascade_checks: Vec::new(),
            warning_message: None,
        }
    }

    /// An irreversible policy; `warning` explains why to the user.
    pub fn irreversible(
        resource_type: impl Into<ResourceType>,
        action: AuditAction,
        description: impl Into<String>,
        warning: impl Into<String>,
    ) -> Self {
        Self::new(
            resource_type,
            action,
            Classification::Irreversible,
            description,
        )
        .with_warning(warning)
    }

    pub fn direct_undo(mut self) -> Self {
        self.strategy = CompensationStrategy::DirectUndo;
        self
    }

    pub fn requiring_capability(mut self, capability: impl Into<String>) -> Self {
        self.required_capability = capability.into();
        self
    }

    pub fn with_window(mut self, window: RollbackWindow) -> Self {
        self.window = Some(window);
        self
    }

    pub fn requiring_confirmation(mut self) -> Self {
        self.requires_confirmation = true;
        self
    }

    pub fn with_cascade_check(mut self, check: Arc<dyn CascadeCheck>) -> Self {
        self.cascade_checks.push(check);
        self
    }

    pub fn with_warning(mut self, message: impl Into<String>) -> Self {
        self.warning_message = Some(message.into());
        self
    }

    pub fn key(&self) -> PolicyKey {
        PolicyKey::new(self.resource_type.clone(), self.action)
    }

    pub fn is_irreversible(&self) -> bool {
        self.classification == Classification::Irreversible
    }

    /// The message shown when this policy refuses a rollback outright.
    pub fn refusal_message(&self) -> String {
        self.warning_message
            .clone()
            .unwrap_or_else(|| format!("{} cannot be undone", self.description))
    }
}

/// Deterministic lookup of rollback policies.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    policies: BTreeMap<PolicyKey, RollbackPolicy>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a policy. Registering the same key twice is rejected.
    pub fn register(&mut self, policy: RollbackPolicy) -> Result<(), RegistryError> {
        let key = policy.key();
        if self.policies.contains_key(&key) {
            return Err(RegistryError::DuplicatePolicy(key));
        }
        self.policies.insert(key, policy);
        Ok(())
    }

    /// Registers every policy, stopping at the first duplicate.
    pub fn register_all(
        &mut self,
        policies: impl IntoIterator<Item = RollbackPolicy>,
    ) -> Result<(), RegistryError> {
        for policy in policies {
            self.register(policy)?;
        }
        Ok(())
    }

    pub fn lookup(
        &self,
        resource_type: &ResourceType,
        action: AuditAction,
    ) -> Option<&RollbackPolicy> {
        self.policies.get(&PolicyKey::new(resource_type.clone(), action))
    }

    /// True iff a policy exists and it is not irreversible.
    pub fn is_rollbackable(&self, resource_type: &ResourceType, action: AuditAction) -> bool {
        self.lookup(resource_type, action)
            .is_some_and(|p| !p.is_irreversible())
    }

    pub fn policies_for(&self, resource_type: &ResourceType) -> Vec<&RollbackPolicy> {
        self.policies
            .values()
            .filter(|p| &p.resource_type == resource_type)
            .collect()
    }

    /// Everything that can never be undone, for documentation and UI.
    pub fn irreversible_policies(&self) -> Vec<&RollbackPolicy> {
        self.policies
            .values()
            .filter(|p| p.is_irreversible())
            .collect()
    }

    /// All policies ordered by key.
    pub fn all(&self) -> impl Iterator<Item = &RollbackPolicy> {
        self.policies.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &PolicyKey> {
        self.policies.keys()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}
