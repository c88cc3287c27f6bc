//! Audit ledger adapter.
//!
//! The engine never owns the audit log. It reads entries through the
//! [`AuditLedger`] trait and appends compensation entries through it. Hosts
//! back the trait with their own append-only store; [`InMemoryLedger`] is the
//! reference implementation used by tests, the CLI demo and embedded setups.
//!
//! # Architecture
//!
//! ```text
//! AuditLedger = {
//!     find_by_id(id) -> Option<Entry>,
//!     find_latest_for_resource(type, id) -> Option<Entry>,
//!     list(query) -> Vec<Entry>,          // newest first
//!     append(new_entry) -> AuditLogId,    // the only write
//! }
//! ```
//!
//! The ledger is append-only: there is no update or delete method, so an
//! entry observed once is guaranteed to read back identically.
//!
//! # Example
//!
//! ```
//! use reversible_ledger::{AuditLedger, InMemoryLedger, LedgerQuery};
//! use reversible_types::{AuditAction, NewAuditEntry, ResourceType};
//!
//! let ledger = InMemoryLedger::new();
//! let id = ledger
//!     .append(NewAuditEntry::new(AuditAction::Publish, "Event", "E1"))
//!     .unwrap();
//!
//! let entry = ledger.find_by_id(id).unwrap().expect("appended entry");
//! assert_eq!(entry.action, AuditAction::Publish);
//!
//! let recent = ledger
//!     .list(&LedgerQuery::default().with_resource_type(ResourceType::new("Event")))
//!     .unwrap();
//! assert_eq!(recent.len(), 1);
//! ```

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use reversible_types::{
    ActorId, AuditAction, AuditLogEntry, AuditLogId, Clock, NewAuditEntry, ResourceId,
    ResourceType, SystemClock,
};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Audit ledger is read-only")]
    ReadOnly,

    #[error("Audit ledger lock poisoned")]
    LockPoisoned,

    #[error("Audit ledger storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Read/append access to the host's audit log.
pub trait AuditLedger: Send + Sync {
    fn find_by_id(&self, id: AuditLogId) -> Result<Option<AuditLogEntry>>;

    /// The most recently written entry for one resource.
    fn find_latest_for_resource(
        &self,
        resource_type: &ResourceType,
        resource_id: &ResourceId,
    ) -> Result<Option<AuditLogEntry>>;

    /// Entries matching `query`, newest first.
    fn list(&self, query: &LedgerQuery) -> Result<Vec<AuditLogEntry>>;

    /// Appends a new entry and returns the identifier the ledger assigned.
    fn append(&self, entry: NewAuditEntry) -> Result<AuditLogId>;
}

impl<L: AuditLedger + ?Sized> AuditLedger for Arc<L> {
    fn find_by_id(&self, id: AuditLogId) -> Result<Option<AuditLogEntry>> {
        (**self).find_by_id(id)
    }

    fn find_latest_for_resource(
        &self,
        resource_type: &ResourceType,
        resource_id: &ResourceId,
    ) -> Result<Option<AuditLogEntry>> {
        (**self).find_latest_for_resource(resource_type, resource_id)
    }

    fn list(&self, query: &LedgerQuery) -> Result<Vec<AuditLogEntry>> {
        (**self).list(query)
    }

    fn append(&self, entry: NewAuditEntry) -> Result<AuditLogId> {
        (**self).append(entry)
    }
}

/// Query filter for the ledger.
///
/// All fields are optional and combined with AND logic. Use the builder
/// methods for ergonomic construction.
#[derive(Debug, Default, Clone)]
pub struct LedgerQuery {
    pub resource_type: Option<ResourceType>,
    pub resource_id: Option<ResourceId>,
    pub action: Option<AuditAction>,
    pub actor_id: Option<ActorId>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl LedgerQuery {
    pub fn with_resource_type(mut self, resource_type: ResourceType) -> Self {
        self.resource_type = Some(resource_type);
        self
    }

    pub fn with_resource(mut self, resource_type: ResourceType, resource_id: ResourceId) -> Self {
        self.resource_type = Some(resource_type);
        self.resource_id = Some(resource_id);
        self
    }

    pub fn with_action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_actor(mut self, actor_id: ActorId) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    /// Only entries created at or after `since`.
    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Only entries created at or before `until`.
    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        if let Some(ref resource_type) = self.resource_type {
            if &entry.resource_type != resource_type {
                return false;
            }
        }
        if let Some(ref resource_id) = self.resource_id {
            if &entry.resource_id != resource_id {
                return false;
            }
        }
        if let Some(action) = self.action {
            if entry.action != action {
                return false;
            }
        }
        if let Some(ref actor_id) = self.actor_id {
            match &entry.actor_id {
                Some(entry_actor) if entry_actor == actor_id => {}
                _ => return false,
            }
        }
        if let Some(since) = self.since {
            if entry.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if entry.created_at > until {
                return false;
            }
        }
        true
    }
}

/// Append-only, in-process audit ledger.
///
/// Entries are kept in insertion order. Reads return clones, so callers can
/// never alter what is stored.
pub struct InMemoryLedger {
    entries: RwLock<Vec<AuditLogEntry>>,
    clock: Arc<dyn Clock>,
    read_only: RwLock<bool>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            clock,
            read_only: RwLock::new(false),
        }
    }

    /// Appends an entry with an explicit creation time (for imports and tests).
    pub fn record_at(&self, entry: NewAuditEntry, created_at: DateTime<Utc>) -> Result<AuditLogId> {
        if self.is_read_only()? {
            return Err(LedgerError::ReadOnly);
        }
        let mut entries = self.entries.write().map_err(|_| LedgerError::LockPoisoned)?;
        let count_before = entries.len();

        let id = AuditLogId::generate();
        let stored = entry.into_entry(id, created_at);
        debug!(
            audit_log_id = %id,
            action = %stored.action,
            resource_type = %stored.resource_type,
            resource_id = %stored.resource_id,
            "Audit entry appended"
        );
        entries.push(stored);

        assert_eq!(
            entries.len(),
            count_before + 1,
            "ledger append must increase entry count by exactly 1"
        );

        Ok(id)
    }

    /// Rejects all further appends while set; reads keep working.
    pub fn set_read_only(&self, read_only: bool) -> Result<()> {
        let mut flag = self.read_only.write().map_err(|_| LedgerError::LockPoisoned)?;
        *flag = read_only;
        Ok(())
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self
            .entries
            .read()
            .map_err(|_| LedgerError::LockPoisoned)?
            .len())
    }

    fn is_read_only(&self) -> Result<bool> {
        Ok(*self.read_only.read().map_err(|_| LedgerError::LockPoisoned)?)
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryLedger")
            .field("entries", &self.count().unwrap_or_default())
            .finish_non_exhaustive()
    }
}

impl AuditLedger for InMemoryLedger {
    fn find_by_id(&self, id: AuditLogId) -> Result<Option<AuditLogEntry>> {
        let entries = self.entries.read().map_err(|_| LedgerError::LockPoisoned)?;
        Ok(entries.iter().find(|e| e.id == id).cloned())
    }

    fn find_latest_for_resource(
        &self,
        resource_type: &ResourceType,
        resource_id: &ResourceId,
    ) -> Result<Option<AuditLogEntry>> {
        let entries = self.entries.read().map_err(|_| LedgerError::LockPoisoned)?;
        Ok(entries
            .iter()
            .rev()
            .find(|e| &e.resource_type == resource_type && &e.resource_id == resource_id)
            .cloned())
    }

    fn list(&self, query: &LedgerQuery) -> Result<Vec<AuditLogEntry>> {
        let entries = self.entries.read().map_err(|_| LedgerError::LockPoisoned)?;
        let mut results: Vec<AuditLogEntry> = entries
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();

        // Stable sort keeps insertion order among equal timestamps; reversing
        // afterwards puts the latest write first.
        results.sort_by_key(|e| e.created_at);
        results.reverse();

        if let Some(limit) = query.limit {
            results.truncate(limit);
        }
        Ok(results)
    }

    fn append(&self, entry: NewAuditEntry) -> Result<AuditLogId> {
        let now = self.clock.now();
        self.record_at(entry, now)
    }
}
