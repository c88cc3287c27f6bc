//! CLI command implementations.

pub mod config;
pub mod demo;
pub mod policies;

use std::sync::Arc;

use anyhow::{Context, Result};
use reversible::{EngineOptions, RollbackEngine};
use reversible::resources::{EventResource, EventStore, MessageResource};
use reversible_config::RollbackConfig;
use reversible_ledger::InMemoryLedger;

/// The in-memory collaborators every command wires together.
pub struct Deployment {
    pub ledger: Arc<InMemoryLedger>,
    pub store: Arc<EventStore>,
    pub engine: RollbackEngine,
}

impl Deployment {
    /// Registers the standard Event and Message modules with `config` applied.
    pub fn standard(config: &RollbackConfig) -> Result<Self> {
        let ledger = Arc::new(InMemoryLedger::new());
        let store = Arc::new(EventStore::new());
        let events = EventResource::new(Arc::clone(&store))
            .with_window_hours(config.windows.default_max_age_hours);

        let options = EngineOptions::try_from(config).context("Invalid engine options")?;
        let engine = RollbackEngine::builder(ledger.clone())
            .options(options)
            .module(&events)
            .module(&MessageResource)
            .build()
            .context("Failed to register rollback modules")?;

        Ok(Self {
            ledger,
            store,
            engine,
        })
    }
}
