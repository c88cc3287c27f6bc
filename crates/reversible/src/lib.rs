//! # reversible: Policy-driven rollback of audited mutations
//!
//! Every state-changing operation in a host system is recorded as an
//! immutable audit entry. This crate decides, per `(resource type, action)`,
//! whether such an entry can be undone and under what conditions, then
//! performs the undo as a new, equally audited action.
//!
//! # Components
//!
//! - [`PolicyRegistry`]: reversibility rules per `(resource type, action)`
//! - [`cascade`]: read-only side-effect checks that warn or block
//! - [`ConfirmationTokenStore`]: single-use, time-limited confirmations
//! - [`ExecutorRegistry`]: compensating mutations per `(resource type, action)`
//! - [`RollbackEngine`]: the preview/confirm/execute orchestrator
//! - [`resources`]: example wiring for events and messages
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use reversible::resources::{EventResource, EventStore, MessageResource};
//! use reversible::{RollbackEngine, RollbackRequest};
//! use reversible_ledger::InMemoryLedger;
//! use reversible_types::{ActorContext, ResourceId, Snapshot};
//!
//! let ledger = Arc::new(InMemoryLedger::new());
//! let store = Arc::new(EventStore::new());
//! let engine = RollbackEngine::builder(ledger.clone())
//!     .module(&EventResource::new(store.clone()))
//!     .module(&MessageResource)
//!     .build()
//!     .unwrap();
//!
//! let event = ResourceId::new("E1");
//! store.create(&*ledger, None, event.clone(), Snapshot::new()).unwrap();
//! let published = store.publish(&*ledger, None, &event).unwrap();
//!
//! let actor = ActorContext::user("alice");
//! let preview = engine.preview(published, &actor).unwrap();
//! assert!(preview.rollbackable && preview.requires_confirmation);
//!
//! let confirmation = engine.issue_confirmation(published, &actor).unwrap();
//! let result = engine
//!     .execute(
//!         &RollbackRequest::new(published, "published the wrong event")
//!             .with_token(confirmation.token),
//!         &actor,
//!     )
//!     .unwrap();
//! assert!(result.success);
//! ```

pub mod cascade;
pub mod engine;
pub mod error;
pub mod executor;
pub mod policy;
pub mod resources;
pub mod token;

pub use cascade::{CascadeCheck, CascadeCheckResult, CascadeError, CascadeReport, check_fn};
pub use engine::{
    EngineOptions, RecentFilter, RollbackEngine, RollbackEngineBuilder, RollbackPreview,
    RollbackRequest, RollbackResult, RollbackStatus,
};
pub use error::{EngineError, RegistryError, Result, RollbackFailure};
pub use executor::{
    ExecutionContext, Executor, ExecutorError, ExecutorOutcome, ExecutorRegistry, StateReader,
    executor_fn,
};
pub use policy::{
    Classification, CompensationStrategy, PolicyKey, PolicyRegistry, RollbackPolicy,
    RollbackWindow,
};
pub use resources::ResourceModule;
pub use token::{ConfirmationTokenStore, IssuedConfirmation, TokenError};
