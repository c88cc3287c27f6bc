//! # reversible-types: Core types for the reversible action engine
//!
//! This crate contains the shared data model used across the workspace:
//! - Entity IDs ([`AuditLogId`], [`ResourceId`], [`ActorId`])
//! - Resource tags and actions ([`ResourceType`], [`AuditAction`])
//! - Audit records ([`AuditLogEntry`], [`NewAuditEntry`], [`Snapshot`])
//! - Caller context ([`ActorContext`])
//! - Rollback metadata keys ([`rollback_metadata`])
//! - Time sources ([`Clock`], [`SystemClock`], [`ManualClock`])

use std::collections::BTreeSet;
use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

/// A point-in-time copy of a resource's fields.
///
/// Snapshots are JSON objects so that restore logic can diff field by field
/// without knowing the resource's concrete type.
pub type Snapshot = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// Entity IDs
// ============================================================================

/// Unique identifier for an audit log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditLogId(Uuid);

impl AuditLogId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Generates a fresh random (v4) identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Display for AuditLogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for AuditLogId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl std::str::FromStr for AuditLogId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identifier of a mutated resource, unique within its [`ResourceType`].
    ResourceId
);

string_id!(
    /// Identifier of the human or service account that performed an action.
    ActorId
);

string_id!(
    /// Tag naming a kind of resource (e.g. `"Event"`, `"Message"`).
    ResourceType
);

// ============================================================================
// Actions
// ============================================================================

/// Symbolic kind of a recorded mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Publish,
    Unpublish,
    Send,
    Archive,
    Restore,
}

impl AuditAction {
    /// Returns the action recorded when this action is compensated.
    ///
    /// `None` means the action has no natural inverse (a sent message stays sent).
    pub fn inverse(self) -> Option<Self> {
        match self {
            Self::Publish => Some(Self::Unpublish),
            Self::Unpublish => Some(Self::Publish),
            Self::Create => Some(Self::Archive),
            Self::Archive => Some(Self::Restore),
            Self::Restore => Some(Self::Archive),
            Self::Update => Some(Self::Update),
            Self::Delete => Some(Self::Restore),
            Self::Send => None,
        }
    }

    /// Canonical upper-case name, identical to the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Publish => "PUBLISH",
            Self::Unpublish => "UNPUBLISH",
            Self::Send => "SEND",
            Self::Archive => "ARCHIVE",
            Self::Restore => "RESTORE",
        }
    }

    pub fn all() -> [Self; 8] {
        [
            Self::Create,
            Self::Update,
            Self::Delete,
            Self::Publish,
            Self::Unpublish,
            Self::Send,
            Self::Archive,
            Self::Restore,
        ]
    }
}

impl Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown audit action: {s}"))
    }
}

// ============================================================================
// Audit entries
// ============================================================================

/// One immutable record of a mutation, as stored by the audit ledger.
///
/// Entries are never modified after they are written. Compensations are
/// recorded as new entries that reference the original through
/// [`rollback_metadata`] keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: AuditLogId,
    pub action: AuditAction,
    pub resource_type: ResourceType,
    pub resource_id: ResourceId,
    /// `None` means the mutation was system-initiated.
    pub actor_id: Option<ActorId>,
    pub before: Option<Snapshot>,
    pub after: Option<Snapshot>,
    #[serde(default)]
    pub metadata: Snapshot,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Whether this entry records a compensation written by the engine.
    pub fn is_rollback(&self) -> bool {
        self.metadata
            .get(rollback_metadata::IS_ROLLBACK)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    /// The entry this one compensated, if it is a rollback.
    pub fn original_audit_log_id(&self) -> Option<AuditLogId> {
        self.metadata
            .get(rollback_metadata::ORIGINAL_AUDIT_LOG_ID)
            .and_then(serde_json::Value::as_str)
            .and_then(|s| s.parse().ok())
    }
}

/// An entry about to be appended; the ledger assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAuditEntry {
    pub action: AuditAction,
    pub resource_type: ResourceType,
    pub resource_id: ResourceId,
    pub actor_id: Option<ActorId>,
    pub before: Option<Snapshot>,
    pub after: Option<Snapshot>,
    pub metadata: Snapshot,
}

impl NewAuditEntry {
    pub fn new(
        action: AuditAction,
        resource_type: impl Into<ResourceType>,
        resource_id: impl Into<ResourceId>,
    ) -> Self {
        Self {
            action,
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            actor_id: None,
            before: None,
            after: None,
            metadata: Snapshot::new(),
        }
    }

    pub fn with_actor(mut self, actor_id: Option<ActorId>) -> Self {
        self.actor_id = actor_id;
        self
    }

    pub fn with_before(mut self, before: Snapshot) -> Self {
        self.before = Some(before);
        self
    }

    pub fn with_after(mut self, after: Snapshot) -> Self {
        self.after = Some(after);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Builds the stored entry once the ledger has assigned identity and time.
    pub fn into_entry(self, id: AuditLogId, created_at: DateTime<Utc>) -> AuditLogEntry {
        AuditLogEntry {
            id,
            action: self.action,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            actor_id: self.actor_id,
            before: self.before,
            after: self.after,
            metadata: self.metadata,
            created_at,
        }
    }
}

/// Metadata keys written on every compensation entry.
pub mod rollback_metadata {
    pub const IS_ROLLBACK: &str = "isRollback";
    pub const ORIGINAL_AUDIT_LOG_ID: &str = "originalAuditLogId";
    pub const ORIGINAL_ACTION: &str = "originalAction";
    pub const ORIGINAL_ACTOR_ID: &str = "originalActorId";
    pub const ORIGINAL_TIMESTAMP: &str = "originalTimestamp";
    pub const REASON: &str = "reason";
}

// ============================================================================
// Caller context
// ============================================================================

/// Who is asking for a preview or execution.
///
/// Capability enforcement is the caller's job; the engine only reads
/// `capabilities` to honour window escalation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    pub actor_id: Option<ActorId>,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
}

impl ActorContext {
    pub fn user(actor_id: impl Into<ActorId>) -> Self {
        Self {
            actor_id: Some(actor_id.into()),
            capabilities: BTreeSet::new(),
        }
    }

    pub fn system() -> Self {
        Self::default()
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}
