//! Policy listing.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL};
use reversible::{Classification, CompensationStrategy, RollbackPolicy};
use reversible_config::RollbackConfig;

use super::Deployment;
use crate::Format;

/// Lists the policies of the standard modules, optionally only the irreversible ones.
pub fn run(config: &RollbackConfig, irreversible_only: bool, format: Format) -> Result<()> {
    let deployment = Deployment::standard(config)?;
    let registry = deployment.engine.policies();
    let policies: Vec<&RollbackPolicy> = if irreversible_only {
        registry.irreversible_policies()
    } else {
        registry.all().collect()
    };

    if format == Format::Json {
        println!("{}", serde_json::to_string_pretty(&policies)?);
        return Ok(());
    }

    if policies.is_empty() {
        println!("No policies registered.");
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Key").fg(Color::Blue),
        Cell::new("Classification").fg(Color::Blue),
        Cell::new("Strategy").fg(Color::Blue),
        Cell::new("Window").fg(Color::Blue),
        Cell::new("Confirm").fg(Color::Blue),
        Cell::new("Checks").fg(Color::Blue),
        Cell::new("Warning").fg(Color::Blue),
    ]);

    for policy in &policies {
        let classification = match policy.classification {
            Classification::FullyReversible => {
                Cell::new(policy.classification).fg(Color::Green)
            }
            Classification::Compensatable => Cell::new(policy.classification).fg(Color::Yellow),
            Classification::Irreversible => Cell::new(policy.classification).fg(Color::Red),
        };
        let strategy = match policy.strategy {
            CompensationStrategy::DirectUndo => "direct undo",
            CompensationStrategy::RestoreSnapshot => "restore snapshot",
        };
        let window = policy
            .window
            .as_ref()
            .map_or_else(|| "-".to_string(), |w| w.description.clone());
        let checks = policy
            .cascade_checks
            .iter()
            .map(|c| c.name().to_string())
            .collect::<Vec<_>>()
            .join(", ");

        table.add_row(vec![
            Cell::new(policy.key()),
            classification,
            Cell::new(strategy),
            Cell::new(window),
            Cell::new(if policy.requires_confirmation { "yes" } else { "no" }),
            Cell::new(if checks.is_empty() { "-".to_string() } else { checks }),
            Cell::new(policy.warning_message.as_deref().unwrap_or("-")),
        ]);
    }

    println!("{table}");
    println!();
    println!("{} policies", policies.len());

    Ok(())
}
