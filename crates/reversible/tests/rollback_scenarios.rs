//! End-to-end preview/confirm/execute scenarios against in-memory collaborators.

mod common;

use std::sync::Arc;

use chrono::Duration;
use common::{Harness, confirm_and_execute, snapshot};
use reversible::resources::RegistrationStatus;
use reversible::resources::event::{ActiveRegistrations, SetPublished};
use reversible::{
    Classification, EngineError, RecentFilter, RollbackFailure, RollbackPolicy, RollbackRequest,
    RollbackStatus,
};
use reversible_ledger::AuditLedger;
use reversible_types::{ActorContext, AuditAction, NewAuditEntry, ResourceType, rollback_metadata};
use serde_json::json;

// ============================================================================
// Publish undo with an advisory cascade check
// ============================================================================

#[test]
fn publish_undo_with_active_registrations() {
    let h = Harness::new();
    let engine = h
        .builder()
        .policy(
            RollbackPolicy::new(
                "Event",
                AuditAction::Publish,
                Classification::Compensatable,
                "Unpublish the event",
            )
            .direct_undo()
            .requiring_confirmation()
            .with_cascade_check(Arc::new(ActiveRegistrations::new(Arc::clone(&h.store)))),
        )
        .executor(
            "Event",
            AuditAction::Publish,
            Arc::new(SetPublished::new(Arc::clone(&h.store), false)),
        )
        .state_reader("Event", h.store.clone())
        .build()
        .unwrap();

    let e1 = h.event("E1");
    h.store.register("E1", RegistrationStatus::Confirmed).unwrap();
    h.store.register("E1", RegistrationStatus::Confirmed).unwrap();
    h.store.register("E1", RegistrationStatus::Pending).unwrap();
    let published = h.publish(&e1);
    let actor = ActorContext::user("bob");

    let preview = engine.preview(published, &actor).unwrap();
    assert!(preview.rollbackable);
    assert_eq!(preview.status, RollbackStatus::ConfirmationRequired);
    assert_eq!(preview.classification, Some(Classification::Compensatable));
    assert_eq!(preview.warnings, vec!["3 active registrations".to_string()]);
    assert!(preview.blocking_reasons.is_empty());
    assert!(preview.requires_confirmation);
    assert_eq!(preview.current_state.as_ref().unwrap()["published"], true);
    assert_eq!(preview.target_state, Some(snapshot(json!({"published": false}))));

    let issued = engine.issue_confirmation(published, &actor).unwrap();
    let result = engine
        .execute(
            &RollbackRequest::new(published, "undoing accidental publish").with_token(issued.token),
            &actor,
        )
        .unwrap();

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.status, RollbackStatus::Executed);
    assert_eq!(result.resource_id, e1);
    assert_eq!(h.field(&e1, "published"), false);

    let rollback_id = result.rollback_audit_log_id.unwrap();
    let rollback = h.ledger.find_by_id(rollback_id).unwrap().unwrap();
    assert_eq!(rollback.action, AuditAction::Unpublish);
    assert_eq!(rollback.metadata[rollback_metadata::IS_ROLLBACK], true);
    assert_eq!(
        rollback.metadata[rollback_metadata::ORIGINAL_AUDIT_LOG_ID],
        published.to_string()
    );
    assert_eq!(rollback.metadata[rollback_metadata::ORIGINAL_ACTION], "PUBLISH");
    assert_eq!(rollback.metadata[rollback_metadata::ORIGINAL_ACTOR_ID], "alice");
    assert_eq!(
        rollback.metadata[rollback_metadata::REASON],
        "undoing accidental publish"
    );
    assert_eq!(rollback.actor_id, Some("bob".into()));

    let latest = h
        .ledger
        .find_latest_for_resource(&ResourceType::new("Event"), &e1)
        .unwrap()
        .unwrap();
    assert_eq!(latest.id, rollback_id);
}

// ============================================================================
// Expired window
// ============================================================================

#[test]
fn update_older_than_window_is_blocked() {
    let h = Harness::new();
    let engine = h.engine();
    let e1 = h.event("E1");
    let update = h
        .store
        .update(
            &*h.ledger,
            None,
            &e1,
            AuditAction::Update,
            snapshot(json!({"title": "Renamed"})),
        )
        .unwrap();

    h.clock.advance(Duration::hours(100));

    let preview = engine.preview(update, &ActorContext::user("bob")).unwrap();
    assert!(!preview.rollbackable);
    assert_eq!(preview.status, RollbackStatus::Blocked);
    assert_eq!(preview.blocking_reasons.len(), 1);
    let reason = &preview.blocking_reasons[0];
    assert!(reason.contains("100"), "{reason}");
    assert!(reason.contains("72"), "{reason}");
    assert!(matches!(
        preview.failure,
        Some(RollbackFailure::WindowExpired { .. })
    ));
    assert!(preview.cascade_effects.is_empty());

    let entries = h.entry_count();
    let result = engine
        .execute(
            &RollbackRequest::new(update, "revert the stale rename"),
            &ActorContext::user("bob"),
        )
        .unwrap();
    assert!(!result.success);
    assert_eq!(result.error.as_ref().map(RollbackFailure::code), Some("WINDOW_EXPIRED"));
    assert_eq!(h.entry_count(), entries);
}

#[test]
fn update_within_window_restores_previous_fields() {
    let h = Harness::new();
    let engine = h.engine();
    let e1 = h.event("E1");
    let update = h
        .store
        .update(
            &*h.ledger,
            None,
            &e1,
            AuditAction::Update,
            snapshot(json!({"title": "Renamed", "capacity": 80})),
        )
        .unwrap();
    h.clock.advance(Duration::hours(71));

    let result = confirm_and_execute(
        &engine,
        update,
        "rename was a mistake",
        &ActorContext::user("bob"),
    );

    assert!(result.success, "{:?}", result.error);
    assert_eq!(h.field(&e1, "title"), "Event E1");
    assert_eq!(h.field(&e1, "capacity"), 50);
    let restored = result.restored_state.unwrap();
    assert_eq!(restored["published"], false);
}

// ============================================================================
// Confirmation handling
// ============================================================================

#[test]
fn missing_confirmation_changes_nothing() {
    let h = Harness::new();
    let engine = h.engine();
    let e1 = h.event("E1");
    let published = h.publish(&e1);
    let entries = h.entry_count();

    let result = engine
        .execute(
            &RollbackRequest::new(published, "undoing accidental publish"),
            &ActorContext::user("bob"),
        )
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.error, Some(RollbackFailure::ConfirmationRequired));
    assert_eq!(result.status, RollbackStatus::ConfirmationRequired);
    assert!(result.rollback_audit_log_id.is_none());
    assert_eq!(h.field(&e1, "published"), true);
    assert_eq!(h.entry_count(), entries);
}

#[test]
fn empty_token_counts_as_missing() {
    let h = Harness::new();
    let engine = h.engine();
    let e1 = h.event("E1");
    let published = h.publish(&e1);

    let result = engine
        .execute(
            &RollbackRequest::new(published, "undoing accidental publish").with_token(""),
            &ActorContext::user("bob"),
        )
        .unwrap();
    assert_eq!(result.error, Some(RollbackFailure::ConfirmationRequired));
}

#[test]
fn expired_token_is_invalid() {
    let h = Harness::new();
    let engine = h.engine();
    let e1 = h.event("E1");
    let published = h.publish(&e1);
    let actor = ActorContext::user("bob");

    let issued = engine.issue_confirmation(published, &actor).unwrap();
    h.clock.advance(Duration::minutes(11));

    let result = engine
        .execute(
            &RollbackRequest::new(published, "undoing accidental publish").with_token(issued.token),
            &actor,
        )
        .unwrap();
    assert_eq!(result.error, Some(RollbackFailure::InvalidConfirmation));
    assert!(result.error.unwrap().needs_reconfirmation());
    assert_eq!(h.field(&e1, "published"), true);
}

// ============================================================================
// Dry run
// ============================================================================

#[test]
fn dry_run_reports_without_changing_anything() {
    let h = Harness::new();
    let engine = h.engine();
    let e1 = h.event("E1");
    let published = h.publish(&e1);
    let actor = ActorContext::user("bob");
    let issued = engine.issue_confirmation(published, &actor).unwrap();
    let entries = h.entry_count();

    let result = engine
        .execute(
            &RollbackRequest::new(published, "what would this undo do")
                .with_token(issued.token.clone())
                .dry_run(),
            &actor,
        )
        .unwrap();

    assert!(result.success);
    assert!(result.dry_run);
    assert!(result.rollback_audit_log_id.is_none());
    assert!(
        result
            .warnings
            .iter()
            .any(|w| w.contains("no changes made"))
    );
    assert_eq!(h.field(&e1, "published"), true);
    assert_eq!(h.entry_count(), entries);

    // The token survives a dry run.
    assert!(engine.tokens().validate(&issued.token, published).unwrap());
    let real = engine
        .execute(
            &RollbackRequest::new(published, "what would this undo do").with_token(issued.token),
            &actor,
        )
        .unwrap();
    assert!(real.success);
    assert_eq!(h.field(&e1, "published"), false);
}

// ============================================================================
// Cascade drift between preview and execute
// ============================================================================

#[test]
fn new_confirmed_registrations_block_capacity_restore() {
    let h = Harness::new();
    let engine = h.engine();
    let e1 = h.event("E1");
    let shrink = h
        .store
        .update(
            &*h.ledger,
            None,
            &e1,
            AuditAction::Update,
            snapshot(json!({"capacity": 100})),
        )
        .unwrap();
    // Before the update the capacity was 50; a restore must still fit everyone.
    let actor = ActorContext::user("bob");
    assert!(engine.preview(shrink, &actor).unwrap().rollbackable);
    let issued = engine.issue_confirmation(shrink, &actor).unwrap();

    for _ in 0..60 {
        h.store.register("E1", RegistrationStatus::Confirmed).unwrap();
    }

    let result = engine
        .execute(
            &RollbackRequest::new(shrink, "capacity bump was premature")
                .with_token(issued.token.clone()),
            &actor,
        )
        .unwrap();

    assert!(!result.success);
    let Some(RollbackFailure::BlockedByCascade { reasons }) = &result.error else {
        panic!("expected cascade block, got {:?}", result.error);
    };
    assert!(reasons[0].contains("orphan 10 of 60"));
    assert_eq!(h.field(&e1, "capacity"), 100);
    // A blocked execution leaves the token in place.
    assert!(engine.tokens().validate(&issued.token, shrink).unwrap());
}

// ============================================================================
// Irreversible and unregistered actions
// ============================================================================

#[test]
fn message_send_explains_why_it_cannot_be_undone() {
    let h = Harness::new();
    let engine = h.engine();
    let sent = h
        .ledger
        .append(NewAuditEntry::new(AuditAction::Send, "Message", "M1"))
        .unwrap();

    let preview = engine.preview(sent, &ActorContext::user("bob")).unwrap();
    assert!(!preview.rollbackable);
    assert_eq!(
        preview.blocking_reasons,
        vec!["Messages cannot be unsent once delivered.".to_string()]
    );
    assert_eq!(preview.classification, Some(Classification::Irreversible));
    assert_eq!(engine.policies().irreversible_policies().len(), 1);
}

#[test]
fn create_undo_archives_unless_attendees_confirmed() {
    let h = Harness::new();
    let engine = h.engine();
    let actor = ActorContext::user("bob");

    let empty = engine
        .list_recent_rollbackable(&RecentFilter::default())
        .unwrap();
    assert!(empty.is_empty());

    let e1 = h.event("E1");
    let created = h
        .ledger
        .find_latest_for_resource(&ResourceType::new("Event"), &e1)
        .unwrap()
        .unwrap()
        .id;

    let result = confirm_and_execute(&engine, created, "created by mistake", &actor);
    assert!(result.success);
    assert_eq!(h.field(&e1, "archived"), true);

    let e2 = h.event("E2");
    h.store.register("E2", RegistrationStatus::Confirmed).unwrap();
    let created = h
        .ledger
        .find_latest_for_resource(&ResourceType::new("Event"), &e2)
        .unwrap()
        .unwrap()
        .id;
    let preview = engine.preview(created, &actor).unwrap();
    assert!(!preview.rollbackable);
    assert!(preview.blocking_reasons[0].contains("1 confirmed registrations"));
    assert!(preview.warnings.contains(&"The event is archived, not deleted.".to_string()));
}

// ============================================================================
// Resource no longer exists
// ============================================================================

#[test]
fn missing_resource_blocks_without_spending_the_token() {
    let h = Harness::new();
    let engine = h.engine();
    let actor = ActorContext::user("bob");
    let ghost = h
        .ledger
        .append(NewAuditEntry::new(AuditAction::Publish, "Event", "GHOST"))
        .unwrap();
    let expected = RollbackFailure::ResourceNotFound {
        resource_type: ResourceType::new("Event"),
        resource_id: "GHOST".into(),
    };

    let preview = engine.preview(ghost, &actor).unwrap();
    assert!(!preview.rollbackable);
    assert_eq!(preview.status, RollbackStatus::Blocked);
    assert!(preview.current_state.is_none());
    assert_eq!(preview.failure, Some(expected.clone()));
    assert_eq!(preview.blocking_reasons, vec!["Event GHOST no longer exists".to_string()]);

    let err = engine.issue_confirmation(ghost, &actor).unwrap_err();
    assert!(
        matches!(&err, EngineError::NotConfirmable(failure) if *failure == expected),
        "unexpected error: {err:?}"
    );

    // A token minted before the resource vanished must survive the refusal.
    let issued = engine.tokens().issue(ghost).unwrap();
    let entries = h.entry_count();
    let result = engine
        .execute(
            &RollbackRequest::new(ghost, "undoing accidental publish")
                .with_token(issued.token.clone()),
            &actor,
        )
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.error, Some(expected));
    assert_eq!(result.status, RollbackStatus::Blocked);
    assert!(engine.tokens().validate(&issued.token, ghost).unwrap());
    assert_eq!(h.entry_count(), entries);
}
