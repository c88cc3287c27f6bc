//! Shared fixtures: a manual clock, an in-memory ledger and an event store.

#![allow(dead_code)]

use std::sync::Arc;

use reversible::resources::{EventResource, EventStore, MessageResource};
use reversible::{
    EngineOptions, RollbackEngine, RollbackEngineBuilder, RollbackRequest, RollbackResult,
};
use reversible_ledger::InMemoryLedger;
use reversible_types::{ActorContext, AuditLogId, ManualClock, ResourceId, Snapshot};
use serde_json::{Value, json};

pub struct Harness {
    pub clock: ManualClock,
    pub ledger: Arc<InMemoryLedger>,
    pub store: Arc<EventStore>,
}

impl Harness {
    pub fn new() -> Self {
        let clock = ManualClock::starting_now();
        let ledger = Arc::new(InMemoryLedger::with_clock(Arc::new(clock.clone())));
        Self {
            clock,
            ledger,
            store: Arc::new(EventStore::new()),
        }
    }

    /// A builder with the clock wired in and no resources registered.
    pub fn builder(&self) -> RollbackEngineBuilder {
        RollbackEngine::builder(self.ledger.clone())
            .clock(Arc::new(self.clock.clone()))
            .options(EngineOptions::default())
    }

    /// An engine with the standard Event and Message modules.
    pub fn engine(&self) -> RollbackEngine {
        self.builder()
            .module(&EventResource::new(Arc::clone(&self.store)))
            .module(&MessageResource)
            .build()
            .expect("standard modules register cleanly")
    }

    /// Creates an unpublished event with capacity 50.
    pub fn event(&self, id: &str) -> ResourceId {
        let resource_id = ResourceId::new(id);
        self.store
            .create(
                &*self.ledger,
                None,
                resource_id.clone(),
                snapshot(json!({
                    "title": format!("Event {id}"),
                    "published": false,
                    "capacity": 50,
                })),
            )
            .expect("create event");
        resource_id
    }

    pub fn publish(&self, id: &ResourceId) -> AuditLogId {
        self.store
            .publish(&*self.ledger, Some("alice".into()), id)
            .expect("publish event")
    }

    pub fn field(&self, id: &ResourceId, field: &str) -> Value {
        self.store
            .get(id)
            .expect("read event")
            .expect("event exists")
            .fields
            .get(field)
            .cloned()
            .unwrap_or(Value::Null)
    }

    pub fn entry_count(&self) -> usize {
        self.ledger.count().expect("count entries")
    }
}

/// Previews, confirms when required, and executes.
pub fn confirm_and_execute(
    engine: &RollbackEngine,
    audit_log_id: AuditLogId,
    reason: &str,
    actor: &ActorContext,
) -> RollbackResult {
    let preview = engine.preview(audit_log_id, actor).expect("preview");
    assert!(preview.rollbackable, "not rollbackable: {:?}", preview.blocking_reasons);

    let mut request = RollbackRequest::new(audit_log_id, reason);
    if preview.requires_confirmation {
        let issued = engine
            .issue_confirmation(audit_log_id, actor)
            .expect("issue confirmation");
        request = request.with_token(issued.token);
    }
    engine.execute(&request, actor).expect("execute")
}

pub fn snapshot(value: Value) -> Snapshot {
    value.as_object().cloned().unwrap_or_default()
}
