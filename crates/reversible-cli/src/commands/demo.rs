//! End-to-end walkthrough against in-memory collaborators.

use anyhow::{Context, Result};
use reversible::resources::RegistrationStatus;
use reversible::{RollbackPreview, RollbackRequest, RollbackResult};
use reversible_config::RollbackConfig;
use reversible_types::{ActorContext, ResourceId, Snapshot};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use super::Deployment;
use crate::Format;

const DEMO_REASON: &str = "Published to the wrong audience";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DemoReport {
    preview: RollbackPreview,
    result: RollbackResult,
    published_after: bool,
}

/// Creates and publishes an event with three registrations, then undoes the publish.
pub fn run(config: &RollbackConfig, format: Format) -> Result<()> {
    let deployment = Deployment::standard(config)?;
    let Deployment {
        ledger,
        store,
        engine,
    } = &deployment;

    let event_id = ResourceId::new("evt-demo");
    let fields: Snapshot = json!({
        "title": "Quarterly town hall",
        "published": false,
        "capacity": 40,
    })
    .as_object()
    .cloned()
    .unwrap_or_default();

    store
        .create(&**ledger, Some("alice".into()), event_id.clone(), fields)
        .context("Failed to create demo event")?;
    for status in [
        RegistrationStatus::Confirmed,
        RegistrationStatus::Confirmed,
        RegistrationStatus::Pending,
    ] {
        store.register(event_id.clone(), status)?;
    }
    let published = store
        .publish(&**ledger, Some("alice".into()), &event_id)
        .context("Failed to publish demo event")?;
    info!(audit_log_id = %published, "demo event published");

    let actor = ActorContext::user("bob");
    let preview = engine.preview(published, &actor)?;

    let mut request = RollbackRequest::new(published, DEMO_REASON);
    if preview.requires_confirmation {
        let issued = engine.issue_confirmation(published, &actor)?;
        request = request.with_token(issued.token);
    }
    let result = engine.execute(&request, &actor)?;

    let published_after = store
        .get(&event_id)?
        .and_then(|record| record.fields.get("published").and_then(|v| v.as_bool()))
        .unwrap_or(false);

    let report = DemoReport {
        preview,
        result,
        published_after,
    };

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        Format::Text => print_text(&report),
    }

    if !report.result.success {
        anyhow::bail!(
            "Rollback failed: {}",
            report
                .result
                .error
                .as_ref()
                .map_or_else(|| "unknown".to_string(), ToString::to_string)
        );
    }
    Ok(())
}

fn print_text(report: &DemoReport) {
    let preview = &report.preview;
    println!("Preview");
    println!("=======\n");
    println!("  Audit entry: {}", preview.audit_log_id);
    if let Some(policy) = &preview.policy {
        println!("  Policy: {} ({})", policy.key(), policy.classification);
    }
    println!("  Rollbackable: {}", preview.rollbackable);
    println!("  Requires confirmation: {}", preview.requires_confirmation);
    for effect in &preview.cascade_effects {
        println!("  Check {}: {}", effect.check, effect.message);
    }
    for warning in &preview.warnings {
        println!("  Warning: {warning}");
    }
    for reason in &preview.blocking_reasons {
        println!("  Blocked: {reason}");
    }
    println!();

    let result = &report.result;
    println!("Result");
    println!("======\n");
    println!("  Success: {}", result.success);
    println!("  Status: {:?}", result.status);
    if let Some(id) = result.rollback_audit_log_id {
        println!("  Compensation entry: {id}");
    }
    if let Some(error) = &result.error {
        println!("  Error: {error}");
    }
    println!("  Event published afterwards: {}", report.published_after);
}
