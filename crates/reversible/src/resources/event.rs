//! Events: publish toggles, field restores and archiving of creations.
//!
//! [`EventStore`] is an in-process store with optimistic versioning. Every
//! write goes through [`EventStore::apply_with_audit`], which holds the
//! write lock across the audit append and commits the new fields only if
//! the append succeeded. A stale expected version fails with
//! [`ExecutorError::Conflict`] instead of overwriting.
//!
//! Field conventions: `title` (string), `published` (bool), `capacity`
//! (unsigned), `archived` (bool). A `null` value in a patch removes the
//! field; a field absent before a write is recorded as `null` in `before`.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::Duration;
use reversible_ledger::AuditLedger;
use reversible_types::{
    ActorId, AuditAction, AuditLogEntry, AuditLogId, NewAuditEntry, ResourceId, ResourceType,
    Snapshot,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::cascade::{CascadeCheck, CascadeCheckResult, CascadeError};
use crate::executor::{
    ExecutionContext, Executor, ExecutorError, ExecutorOutcome, StateReader,
};
use crate::policy::{Classification, RollbackPolicy, RollbackWindow};
use crate::resources::ResourceModule;

pub const RESOURCE_TYPE: &str = "Event";

/// Lets an actor undo event updates older than the window.
pub const ESCALATION_CAPABILITY: &str = "event:rollback-escalate";

pub const FIELD_PUBLISHED: &str = "published";
pub const FIELD_CAPACITY: &str = "capacity";
pub const FIELD_ARCHIVED: &str = "archived";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl RegistrationStatus {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }
}

#[derive(Debug, Clone)]
struct Registration {
    event_id: ResourceId,
    status: RegistrationStatus,
}

/// Stored event: its fields and an optimistic version, starting at 1.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub fields: Snapshot,
    pub version: u64,
}

/// Outcome of a committed write.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedMutation {
    pub audit_log_id: AuditLogId,
    pub fields: Snapshot,
    pub version: u64,
}

#[derive(Debug, Default)]
pub struct EventStore {
    events: RwLock<BTreeMap<ResourceId, EventRecord>>,
    registrations: RwLock<Vec<Registration>>,
}

fn poisoned() -> ExecutorError {
    ExecutorError::Failed("event store lock poisoned".to_string())
}

fn not_found(resource_id: &ResourceId) -> ExecutorError {
    ExecutorError::ResourceNotFound {
        resource_type: ResourceType::new(RESOURCE_TYPE),
        resource_id: resource_id.clone(),
    }
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, resource_id: &ResourceId) -> Result<Option<EventRecord>, ExecutorError> {
        let events = self.events.read().map_err(|_| poisoned())?;
        Ok(events.get(resource_id).cloned())
    }

    /// Creates an event and records a `CREATE` entry (no `before`).
    pub fn create(
        &self,
        ledger: &dyn AuditLedger,
        actor: Option<ActorId>,
        resource_id: impl Into<ResourceId>,
        fields: Snapshot,
    ) -> Result<AuditLogId, ExecutorError> {
        let resource_id = resource_id.into();
        let mut events = self.events.write().map_err(|_| poisoned())?;
        if events.contains_key(&resource_id) {
            return Err(ExecutorError::Failed(format!(
                "event {resource_id} already exists"
            )));
        }

        let audit_log_id = ledger.append(
            NewAuditEntry::new(AuditAction::Create, RESOURCE_TYPE, resource_id.clone())
                .with_actor(actor)
                .with_after(fields.clone()),
        )?;
        events.insert(resource_id, EventRecord { fields, version: 1 });
        Ok(audit_log_id)
    }

    /// Applies `patch` as an ordinary (non-rollback) audited mutation.
    pub fn update(
        &self,
        ledger: &dyn AuditLedger,
        actor: Option<ActorId>,
        resource_id: &ResourceId,
        action: AuditAction,
        patch: Snapshot,
    ) -> Result<AuditLogId, ExecutorError> {
        let record = self.get(resource_id)?.ok_or_else(|| not_found(resource_id))?;
        let audit =
            NewAuditEntry::new(action, RESOURCE_TYPE, resource_id.clone()).with_actor(actor);
        let applied = self.apply_with_audit(resource_id, record.version, patch, ledger, audit)?;
        Ok(applied.audit_log_id)
    }

    pub fn publish(
        &self,
        ledger: &dyn AuditLedger,
        actor: Option<ActorId>,
        resource_id: &ResourceId,
    ) -> Result<AuditLogId, ExecutorError> {
        self.update(
            ledger,
            actor,
            resource_id,
            AuditAction::Publish,
            flag(FIELD_PUBLISHED, true),
        )
    }

    pub fn unpublish(
        &self,
        ledger: &dyn AuditLedger,
        actor: Option<ActorId>,
        resource_id: &ResourceId,
    ) -> Result<AuditLogId, ExecutorError> {
        self.update(
            ledger,
            actor,
            resource_id,
            AuditAction::Unpublish,
            flag(FIELD_PUBLISHED, false),
        )
    }

    /// Writes `patch` and appends `audit` as one unit.
    ///
    /// `audit` receives `before` (prior values of the patched fields) and
    /// `after` (the patch). Nothing is committed if the version is stale or
    /// the ledger rejects the entry.
    pub fn apply_with_audit(
        &self,
        resource_id: &ResourceId,
        expected_version: u64,
        patch: Snapshot,
        ledger: &dyn AuditLedger,
        audit: NewAuditEntry,
    ) -> Result<AppliedMutation, ExecutorError> {
        let mut events = self.events.write().map_err(|_| poisoned())?;
        let record = events
            .get_mut(resource_id)
            .ok_or_else(|| not_found(resource_id))?;

        if record.version != expected_version {
            return Err(ExecutorError::Conflict {
                resource_id: resource_id.clone(),
                expected: expected_version,
                found: record.version,
            });
        }

        let before: Snapshot = patch
            .keys()
            .map(|k| (k.clone(), record.fields.get(k).cloned().unwrap_or(Value::Null)))
            .collect();

        let mut fields = record.fields.clone();
        for (key, value) in &patch {
            if value.is_null() {
                fields.remove(key);
            } else {
                fields.insert(key.clone(), value.clone());
            }
        }

        let audit_log_id = ledger.append(audit.with_before(before).with_after(patch))?;

        record.fields = fields;
        record.version += 1;
        debug!(
            resource_id = %resource_id,
            version = record.version,
            audit_log_id = %audit_log_id,
            "Event mutation committed"
        );

        Ok(AppliedMutation {
            audit_log_id,
            fields: record.fields.clone(),
            version: record.version,
        })
    }

    pub fn register(
        &self,
        event_id: impl Into<ResourceId>,
        status: RegistrationStatus,
    ) -> Result<(), ExecutorError> {
        self.registrations
            .write()
            .map_err(|_| poisoned())?
            .push(Registration {
                event_id: event_id.into(),
                status,
            });
        Ok(())
    }

    /// Pending plus confirmed registrations.
    pub fn active_registrations(&self, event_id: &ResourceId) -> Result<usize, ExecutorError> {
        self.count_registrations(event_id, RegistrationStatus::is_active)
    }

    pub fn confirmed_registrations(&self, event_id: &ResourceId) -> Result<usize, ExecutorError> {
        self.count_registrations(event_id, |s| s == RegistrationStatus::Confirmed)
    }

    fn count_registrations(
        &self,
        event_id: &ResourceId,
        include: impl Fn(RegistrationStatus) -> bool,
    ) -> Result<usize, ExecutorError> {
        let registrations = self.registrations.read().map_err(|_| poisoned())?;
        Ok(registrations
            .iter()
            .filter(|r| &r.event_id == event_id && include(r.status))
            .count())
    }
}

impl StateReader for EventStore {
    fn current_state(&self, resource_id: &ResourceId) -> Result<Option<Snapshot>, ExecutorError> {
        Ok(self.get(resource_id)?.map(|r| r.fields))
    }
}

fn flag(field: &str, value: bool) -> Snapshot {
    let mut patch = Snapshot::new();
    patch.insert(field.to_string(), Value::Bool(value));
    patch
}

fn query_error(e: &ExecutorError) -> CascadeError {
    CascadeError::Query(e.to_string())
}

// ============================================================================
// Cascade checks
// ============================================================================

/// Warns when people are registered for the event.
pub struct ActiveRegistrations {
    store: Arc<EventStore>,
}

impl ActiveRegistrations {
    pub fn new(store: Arc<EventStore>) -> Self {
        Self { store }
    }
}

impl CascadeCheck for ActiveRegistrations {
    fn name(&self) -> &str {
        "active_registrations"
    }

    fn check(
        &self,
        resource_id: &ResourceId,
        _entry: &AuditLogEntry,
    ) -> Result<CascadeCheckResult, CascadeError> {
        let active = self
            .store
            .active_registrations(resource_id)
            .map_err(|e| query_error(&e))?;
        if active == 0 {
            return Ok(CascadeCheckResult::pass("No active registrations"));
        }
        Ok(
            CascadeCheckResult::warn(format!("{active} active registrations"))
                .with_data(json!({ "activeRegistrations": active })),
        )
    }
}

/// Blocks restoring a capacity below the number of confirmed registrations.
pub struct CapacityCoversConfirmed {
    store: Arc<EventStore>,
}

impl CapacityCoversConfirmed {
    pub fn new(store: Arc<EventStore>) -> Self {
        Self { store }
    }
}

impl CascadeCheck for CapacityCoversConfirmed {
    fn name(&self) -> &str {
        "capacity_covers_confirmed"
    }

    fn check(
        &self,
        resource_id: &ResourceId,
        entry: &AuditLogEntry,
    ) -> Result<CascadeCheckResult, CascadeError> {
        let Some(capacity) = entry
            .before
            .as_ref()
            .and_then(|b| b.get(FIELD_CAPACITY))
            .and_then(Value::as_u64)
        else {
            return Ok(CascadeCheckResult::pass("Capacity is not being restored"));
        };

        let confirmed = self
            .store
            .confirmed_registrations(resource_id)
            .map_err(|e| query_error(&e))?;
        let confirmed_u64 = u64::try_from(confirmed).unwrap_or(u64::MAX);
        if confirmed_u64 <= capacity {
            return Ok(CascadeCheckResult::pass(format!(
                "Capacity {capacity} covers {confirmed} confirmed registrations"
            )));
        }

        Ok(CascadeCheckResult::block(format!(
            "Restoring capacity to {capacity} would orphan {} of {confirmed} \
             confirmed registrations",
            confirmed_u64 - capacity
        ))
        .with_data(json!({ "capacity": capacity, "confirmedRegistrations": confirmed })))
    }
}

/// Blocks archiving a created event that already has confirmed attendees.
pub struct NoConfirmedRegistrations {
    store: Arc<EventStore>,
}

impl NoConfirmedRegistrations {
    pub fn new(store: Arc<EventStore>) -> Self {
        Self { store }
    }
}

impl CascadeCheck for NoConfirmedRegistrations {
    fn name(&self) -> &str {
        "no_confirmed_registrations"
    }

    fn check(
        &self,
        resource_id: &ResourceId,
        _entry: &AuditLogEntry,
    ) -> Result<CascadeCheckResult, CascadeError> {
        let confirmed = self
            .store
            .confirmed_registrations(resource_id)
            .map_err(|e| query_error(&e))?;
        if confirmed == 0 {
            Ok(CascadeCheckResult::pass("No confirmed registrations"))
        } else {
            Ok(CascadeCheckResult::block(format!(
                "{confirmed} confirmed registrations would be orphaned by archiving this event"
            )))
        }
    }
}

// ============================================================================
// Executors
// ============================================================================

/// Direct undo of PUBLISH/UNPUBLISH: sets `published` and records the
/// inverse action.
pub struct SetPublished {
    store: Arc<EventStore>,
    published: bool,
}

impl SetPublished {
    /// `published` is the flag value the undo writes.
    pub fn new(store: Arc<EventStore>, published: bool) -> Self {
        Self { store, published }
    }
}

impl Executor for SetPublished {
    fn execute(&self, ctx: &ExecutionContext<'_>) -> Result<ExecutorOutcome, ExecutorError> {
        let resource_id = &ctx.entry.resource_id;
        let record = self.store.get(resource_id)?.ok_or_else(|| not_found(resource_id))?;
        let action = ctx.inverse_action()?;

        let applied = self.store.apply_with_audit(
            resource_id,
            record.version,
            flag(FIELD_PUBLISHED, self.published),
            ctx.ledger,
            ctx.compensation_entry(action),
        )?;
        Ok(ExecutorOutcome::new(applied.audit_log_id).with_restored_state(applied.fields))
    }
}

/// Restore-from-snapshot: writes back only the fields present in the
/// original entry's `before`.
pub struct RestoreFields {
    store: Arc<EventStore>,
}

impl RestoreFields {
    pub fn new(store: Arc<EventStore>) -> Self {
        Self { store }
    }
}

impl Executor for RestoreFields {
    fn execute(&self, ctx: &ExecutionContext<'_>) -> Result<ExecutorOutcome, ExecutorError> {
        let before = ctx.entry.before.as_ref().ok_or(ExecutorError::MissingSnapshot)?;
        let resource_id = &ctx.entry.resource_id;
        let record = self.store.get(resource_id)?.ok_or_else(|| not_found(resource_id))?;

        // Fields edited again after the original change get overwritten.
        let drifted: Vec<&str> = ctx
            .entry
            .after
            .iter()
            .flatten()
            .filter(|(key, value)| {
                before.contains_key(*key)
                    && record.fields.get(*key).unwrap_or(&Value::Null) != *value
            })
            .map(|(key, _)| key.as_str())
            .collect();

        let applied = self.store.apply_with_audit(
            resource_id,
            record.version,
            before.clone(),
            ctx.ledger,
            ctx.compensation_entry(AuditAction::Update),
        )?;

        let mut outcome =
            ExecutorOutcome::new(applied.audit_log_id).with_restored_state(applied.fields);
        for field in drifted {
            outcome = outcome.with_warning(format!(
                "Field '{field}' changed after the original update and was overwritten"
            ));
        }
        Ok(outcome)
    }
}

/// Compensates a CREATE by archiving the event.
pub struct ArchiveCreated {
    store: Arc<EventStore>,
}

impl ArchiveCreated {
    pub fn new(store: Arc<EventStore>) -> Self {
        Self { store }
    }
}

impl Executor for ArchiveCreated {
    fn execute(&self, ctx: &ExecutionContext<'_>) -> Result<ExecutorOutcome, ExecutorError> {
        let resource_id = &ctx.entry.resource_id;
        let record = self.store.get(resource_id)?.ok_or_else(|| not_found(resource_id))?;

        let applied = self.store.apply_with_audit(
            resource_id,
            record.version,
            flag(FIELD_ARCHIVED, true),
            ctx.ledger,
            ctx.compensation_entry(AuditAction::Archive),
        )?;
        Ok(ExecutorOutcome::new(applied.audit_log_id).with_restored_state(applied.fields))
    }
}

// ============================================================================
// Module
// ============================================================================

/// Rollback support for events backed by an [`EventStore`].
#[derive(Debug, Clone)]
pub struct EventResource {
    store: Arc<EventStore>,
    update_window: RollbackWindow,
}

impl EventResource {
    pub fn new(store: Arc<EventStore>) -> Self {
        Self {
            store,
            update_window: RollbackWindow::hours(72).with_escalation(ESCALATION_CAPABILITY),
        }
    }

    /// Overrides the UPDATE window. Out-of-range values keep the current one.
    pub fn with_window_hours(mut self, hours: u64) -> Self {
        if let Some(max_age) = i64::try_from(hours).ok().and_then(Duration::try_hours) {
            self.update_window = RollbackWindow::new(max_age, format!("{hours} hours"))
                .with_escalation(ESCALATION_CAPABILITY);
        }
        self
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    fn store_handle(&self) -> Arc<EventStore> {
        Arc::clone(&self.store)
    }
}

impl ResourceModule for EventResource {
    fn resource_type(&self) -> ResourceType {
        ResourceType::new(RESOURCE_TYPE)
    }

    fn policies(&self) -> Vec<RollbackPolicy> {
        vec![
            RollbackPolicy::new(
                RESOURCE_TYPE,
                AuditAction::Publish,
                Classification::Compensatable,
                "Unpublish the event",
            )
            .direct_undo()
            .requiring_confirmation()
            .with_cascade_check(Arc::new(ActiveRegistrations {
                store: self.store_handle(),
            }))
            .with_warning("Registrants may already have been notified about this event."),
            RollbackPolicy::new(
                RESOURCE_TYPE,
                AuditAction::Unpublish,
                Classification::FullyReversible,
                "Publish the event again",
            )
            .direct_undo(),
            RollbackPolicy::new(
                RESOURCE_TYPE,
                AuditAction::Update,
                Classification::FullyReversible,
                "Restore the event's previous details",
            )
            .with_window(self.update_window.clone())
            .requiring_confirmation()
            .with_cascade_check(Arc::new(CapacityCoversConfirmed {
                store: self.store_handle(),
            })),
            RollbackPolicy::new(
                RESOURCE_TYPE,
                AuditAction::Create,
                Classification::Compensatable,
                "Archive the created event",
            )
            .direct_undo()
            .requiring_confirmation()
            .with_cascade_check(Arc::new(NoConfirmedRegistrations {
                store: self.store_handle(),
            }))
            .with_warning("The event is archived, not deleted."),
        ]
    }

    fn executors(&self) -> Vec<(AuditAction, Arc<dyn Executor>)> {
        let set_published = |published| -> Arc<dyn Executor> {
            Arc::new(SetPublished {
                store: self.store_handle(),
                published,
            })
        };
        let restore: Arc<dyn Executor> = Arc::new(RestoreFields {
            store: self.store_handle(),
        });
        let archive: Arc<dyn Executor> = Arc::new(ArchiveCreated {
            store: self.store_handle(),
        });

        vec![
            (AuditAction::Publish, set_published(false)),
            (AuditAction::Unpublish, set_published(true)),
            (AuditAction::Update, restore),
            (AuditAction::Create, archive),
        ]
    }

    fn state_reader(&self) -> Option<Arc<dyn StateReader>> {
        let reader: Arc<dyn StateReader> = self.store_handle();
        Some(reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use reversible_ledger::{InMemoryLedger, LedgerError};
    use reversible_types::{ActorContext, rollback_metadata};

    fn fields(value: Value) -> Snapshot {
        value.as_object().cloned().unwrap_or_default()
    }

    fn seeded() -> (Arc<EventStore>, InMemoryLedger, ResourceId) {
        let store = Arc::new(EventStore::new());
        let ledger = InMemoryLedger::new();
        let id = ResourceId::new("E1");
        store
            .create(
                &ledger,
                Some(ActorId::new("alice")),
                id.clone(),
                fields(json!({"title": "Launch", "published": false, "capacity": 50})),
            )
            .unwrap();
        (store, ledger, id)
    }

    #[test]
    fn test_update_records_prior_values() {
        let (store, ledger, id) = seeded();
        let audit_id = store
            .update(
                &ledger,
                None,
                &id,
                AuditAction::Update,
                fields(json!({"capacity": 20, "venue": "Hall A"})),
            )
            .unwrap();

        let entry = ledger.find_by_id(audit_id).unwrap().unwrap();
        assert_eq!(entry.before, Some(fields(json!({"capacity": 50, "venue": null}))));
        assert_eq!(entry.after, Some(fields(json!({"capacity": 20, "venue": "Hall A"}))));
        assert_eq!(store.get(&id).unwrap().unwrap().version, 2);
    }

    #[test]
    fn test_stale_version_conflicts() {
        let (store, ledger, id) = seeded();
        store.publish(&ledger, None, &id).unwrap();
        let entries_before = ledger.count().unwrap();

        let err = store
            .apply_with_audit(
                &id,
                1,
                flag(FIELD_PUBLISHED, false),
                &ledger,
                NewAuditEntry::new(AuditAction::Unpublish, RESOURCE_TYPE, id.clone()),
            )
            .unwrap_err();

        assert!(matches!(
            err,
            ExecutorError::Conflict {
                expected: 1,
                found: 2,
                ..
            }
        ));
        assert_eq!(ledger.count().unwrap(), entries_before);
        assert_eq!(
            store.get(&id).unwrap().unwrap().fields[FIELD_PUBLISHED],
            true
        );
    }

    #[test]
    fn test_failed_audit_append_leaves_event_untouched() {
        let (store, ledger, id) = seeded();
        ledger.set_read_only(true).unwrap();

        let err = store.publish(&ledger, None, &id).unwrap_err();
        assert!(matches!(err, ExecutorError::Ledger(LedgerError::ReadOnly)));

        let record = store.get(&id).unwrap().unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(record.fields[FIELD_PUBLISHED], false);
    }

    #[test]
    fn test_registration_counts_and_checks() {
        let (store, _ledger, id) = seeded();
        store.register("E1", RegistrationStatus::Confirmed).unwrap();
        store.register("E1", RegistrationStatus::Pending).unwrap();
        store.register("E1", RegistrationStatus::Cancelled).unwrap();
        store.register("E2", RegistrationStatus::Confirmed).unwrap();

        assert_eq!(store.active_registrations(&id).unwrap(), 2);
        assert_eq!(store.confirmed_registrations(&id).unwrap(), 1);

        let entry = NewAuditEntry::new(AuditAction::Publish, RESOURCE_TYPE, "E1")
            .into_entry(AuditLogId::generate(), Utc::now());
        let active = ActiveRegistrations {
            store: Arc::clone(&store),
        }
        .check(&id, &entry)
        .unwrap();
        assert!(active.is_warning());
        assert_eq!(active.message, "2 active registrations");

        let archive = NoConfirmedRegistrations {
            store: Arc::clone(&store),
        }
        .check(&id, &entry)
        .unwrap();
        assert!(archive.is_blocking());
    }

    #[test]
    fn test_capacity_check() {
        let (store, _ledger, id) = seeded();
        for _ in 0..3 {
            store.register("E1", RegistrationStatus::Confirmed).unwrap();
        }
        let check = CapacityCoversConfirmed {
            store: Arc::clone(&store),
        };

        let shrink = NewAuditEntry::new(AuditAction::Update, RESOURCE_TYPE, "E1")
            .with_before(fields(json!({"capacity": 2})))
            .into_entry(AuditLogId::generate(), Utc::now());
        let result = check.check(&id, &shrink).unwrap();
        assert!(result.is_blocking());
        assert!(result.message.contains("orphan 1 of 3"));

        let roomy = NewAuditEntry::new(AuditAction::Update, RESOURCE_TYPE, "E1")
            .with_before(fields(json!({"capacity": 10})))
            .into_entry(AuditLogId::generate(), Utc::now());
        assert!(check.check(&id, &roomy).unwrap().passed);

        let title_only = NewAuditEntry::new(AuditAction::Update, RESOURCE_TYPE, "E1")
            .with_before(fields(json!({"title": "Old"})))
            .into_entry(AuditLogId::generate(), Utc::now());
        assert!(check.check(&id, &title_only).unwrap().passed);
    }

    #[test]
    fn test_restore_fields_only_touches_snapshot_keys() {
        let (store, ledger, id) = seeded();
        let update_id = store
            .update(
                &ledger,
                None,
                &id,
                AuditAction::Update,
                fields(json!({"title": "Launch v2"})),
            )
            .unwrap();
        // Unrelated field added later must survive the restore.
        store
            .update(
                &ledger,
                None,
                &id,
                AuditAction::Update,
                fields(json!({"venue": "Hall B"})),
            )
            .unwrap();

        let entry = ledger.find_by_id(update_id).unwrap().unwrap();
        let module = EventResource::new(Arc::clone(&store));
        let policies = module.policies();
        let policy = policies
            .iter()
            .find(|p| p.action == AuditAction::Update)
            .unwrap();
        let actor = ActorContext::user("bob");
        let ctx = ExecutionContext {
            entry: &entry,
            policy,
            actor: &actor,
            reason: "revert the title change",
            ledger: &ledger,
            now: Utc::now(),
        };

        let outcome = RestoreFields {
            store: Arc::clone(&store),
        }
        .execute(&ctx)
        .unwrap();

        let restored = outcome.restored_state.unwrap();
        assert_eq!(restored["title"], "Launch");
        assert_eq!(restored["venue"], "Hall B");
        assert!(outcome.warnings.is_empty());

        let compensation = ledger
            .find_by_id(outcome.rollback_audit_log_id)
            .unwrap()
            .unwrap();
        assert!(compensation.is_rollback());
        assert_eq!(compensation.original_audit_log_id(), Some(update_id));
        assert_eq!(
            compensation.metadata[rollback_metadata::REASON],
            "revert the title change"
        );
    }

    #[test]
    fn test_module_wiring_is_complete() {
        let module = EventResource::new(Arc::new(EventStore::new())).with_window_hours(24);
        let policies = module.policies();
        let executors = module.executors();

        assert_eq!(policies.len(), 4);
        for policy in &policies {
            assert!(
                executors.iter().any(|(action, _)| *action == policy.action),
                "missing executor for {}",
                policy.action
            );
        }
        let update = policies
            .iter()
            .find(|p| p.action == AuditAction::Update)
            .unwrap();
        let window = update.window.as_ref().unwrap();
        assert_eq!(window.max_age, Duration::hours(24));
        assert_eq!(window.escalation_capability.as_deref(), Some(ESCALATION_CAPABILITY));
    }
}
