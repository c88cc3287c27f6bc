//! Preview/execute orchestration.
//!
//! # State machine
//!
//! ```text
//! LOOKUP -> POLICY_CHECK -> WINDOW_CHECK -> CASCADE_CHECK
//!        -> PREVIEW_DONE | CONFIRMATION_REQUIRED | BLOCKED
//!        -> EXECUTED | FAILED
//! ```
//!
//! `preview` is read-only. `execute` re-runs every check preview ran and
//! never trusts a preview the caller may be holding. A confirmation token
//! is consumed only after all validation has passed, immediately before the
//! executor runs. A failed execution therefore always needs a fresh
//! preview and token.
//!
//! Terminal "no" outcomes are returned as data ([`RollbackFailure`] inside
//! the preview or result). Only a missing audit entry, confirmation misuse,
//! and storage faults cross the boundary as [`EngineError`].

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reversible_config::{ConfigError, RollbackConfig};
use reversible_ledger::{AuditLedger, LedgerQuery};
use reversible_types::{
    ActorContext, AuditAction, AuditLogEntry, AuditLogId, Clock, ResourceId, ResourceType,
    Snapshot, SystemClock,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::cascade::{CascadeCheckResult, run_cascade_checks};
use crate::error::{EngineError, RegistryError, Result, RollbackFailure};
use crate::executor::{
    ExecutionContext, Executor, ExecutorRegistry, StateReader, UNEXPECTED_FAILURE,
};
use crate::policy::{Classification, CompensationStrategy, PolicyRegistry, RollbackPolicy};
use crate::resources::ResourceModule;
use crate::token::{ConfirmationTokenStore, DEFAULT_TOKEN_TTL_SECS, IssuedConfirmation};

/// Warning attached to every successful dry run.
pub const DRY_RUN_WARNING: &str = "Dry run: no changes made";

/// Stage reached by a rollback attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RollbackStatus {
    Lookup,
    PolicyCheck,
    WindowCheck,
    CascadeCheck,
    PreviewDone,
    ConfirmationRequired,
    Blocked,
    Executed,
    Failed,
}

impl RollbackStatus {
    /// Status reported alongside a terminal failure.
    pub fn for_failure(failure: &RollbackFailure) -> Self {
        match failure {
            RollbackFailure::ConfirmationRequired | RollbackFailure::InvalidConfirmation => {
                Self::ConfirmationRequired
            }
            RollbackFailure::ExecutorMissing { .. } | RollbackFailure::ExecutorFailure { .. } => {
                Self::Failed
            }
            _ => Self::Blocked,
        }
    }
}

/// Read-only assessment of whether an audit entry can be undone.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackPreview {
    pub audit_log_id: AuditLogId,
    pub rollbackable: bool,
    pub status: RollbackStatus,
    pub classification: Option<Classification>,
    /// Echo of the matching policy, `None` if none is registered.
    pub policy: Option<RollbackPolicy>,
    pub current_state: Option<Snapshot>,
    /// What the resource would look like after undo (the original `before`).
    pub target_state: Option<Snapshot>,
    pub cascade_effects: Vec<CascadeCheckResult>,
    pub warnings: Vec<String>,
    pub blocking_reasons: Vec<String>,
    pub requires_confirmation: bool,
    /// The first terminal reason, when not rollbackable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<RollbackFailure>,
}

impl RollbackPreview {
    fn new(audit_log_id: AuditLogId) -> Self {
        Self {
            audit_log_id,
            rollbackable: false,
            status: RollbackStatus::Lookup,
            classification: None,
            policy: None,
            current_state: None,
            target_state: None,
            cascade_effects: Vec::new(),
            warnings: Vec::new(),
            blocking_reasons: Vec::new(),
            requires_confirmation: false,
            failure: None,
        }
    }

    fn block(&mut self, failure: RollbackFailure) {
        self.blocking_reasons.push(failure.to_string());
        if self.failure.is_none() {
            self.failure = Some(failure);
        }
    }

    fn finish(mut self) -> Self {
        self.rollbackable = self.blocking_reasons.is_empty();
        self.status = if !self.rollbackable {
            RollbackStatus::Blocked
        } else if self.requires_confirmation {
            RollbackStatus::ConfirmationRequired
        } else {
            RollbackStatus::PreviewDone
        };
        self
    }
}

/// A request to undo one audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackRequest {
    pub audit_log_id: AuditLogId,
    /// Mandatory justification, recorded in the compensation's metadata.
    pub reason: String,
    #[serde(default)]
    pub confirmation_token: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
}

impl RollbackRequest {
    pub fn new(audit_log_id: AuditLogId, reason: impl Into<String>) -> Self {
        Self {
            audit_log_id,
            reason: reason.into(),
            confirmation_token: None,
            dry_run: false,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.confirmation_token = Some(token.into());
        self
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

/// Outcome of [`RollbackEngine::execute`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackResult {
    pub success: bool,
    pub status: RollbackStatus,
    pub audit_log_id: AuditLogId,
    pub resource_id: ResourceId,
    /// Id of the compensation entry; `None` unless the rollback executed.
    pub rollback_audit_log_id: Option<AuditLogId>,
    pub restored_state: Option<Snapshot>,
    pub warnings: Vec<String>,
    /// Present only when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RollbackFailure>,
    pub dry_run: bool,
}

impl RollbackResult {
    fn failed(entry: &AuditLogEntry, failure: RollbackFailure, warnings: Vec<String>) -> Self {
        Self {
            success: false,
            status: RollbackStatus::for_failure(&failure),
            audit_log_id: entry.id,
            resource_id: entry.resource_id.clone(),
            rollback_audit_log_id: None,
            restored_state: None,
            warnings,
            error: Some(failure),
            dry_run: false,
        }
    }
}

/// Filters for [`RollbackEngine::list_recent_rollbackable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentFilter {
    pub resource_type: Option<ResourceType>,
    pub since: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl Default for RecentFilter {
    fn default() -> Self {
        Self {
            resource_type: None,
            since: None,
            limit: 50,
        }
    }
}

/// Tunables taken from [`RollbackConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub token_ttl: Duration,
    pub min_reason_len: usize,
    pub max_reason_len: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            token_ttl: Duration::seconds(DEFAULT_TOKEN_TTL_SECS),
            min_reason_len: 10,
            max_reason_len: 500,
        }
    }
}

impl TryFrom<&RollbackConfig> for EngineOptions {
    type Error = ConfigError;

    fn try_from(config: &RollbackConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let ttl_secs = config.tokens.ttl_secs;
        let token_ttl = i64::try_from(ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| {
                ConfigError::ValidationError(format!(
                    "tokens.ttl_secs ({ttl_secs}) is out of range"
                ))
            })?;
        Ok(Self {
            token_ttl,
            min_reason_len: config.reasons.min_len,
            max_reason_len: config.reasons.max_len,
        })
    }
}

/// Builder for [`RollbackEngine`]. Registration conflicts surface from
/// [`RollbackEngineBuilder::build`].
pub struct RollbackEngineBuilder {
    ledger: Arc<dyn AuditLedger>,
    clock: Arc<dyn Clock>,
    options: EngineOptions,
    policies: Vec<RollbackPolicy>,
    executors: Vec<(ResourceType, AuditAction, Arc<dyn Executor>)>,
    state_readers: Vec<(ResourceType, Arc<dyn StateReader>)>,
    token_store: Option<Arc<ConfirmationTokenStore>>,
}

impl RollbackEngineBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn policy(mut self, policy: RollbackPolicy) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn executor(
        mut self,
        resource_type: impl Into<ResourceType>,
        action: AuditAction,
        executor: Arc<dyn Executor>,
    ) -> Self {
        self.executors.push((resource_type.into(), action, executor));
        self
    }

    pub fn state_reader(
        mut self,
        resource_type: impl Into<ResourceType>,
        reader: Arc<dyn StateReader>,
    ) -> Self {
        self.state_readers.push((resource_type.into(), reader));
        self
    }

    /// Registers a resource type's policies, executors and state reader.
    pub fn module<M: ResourceModule + ?Sized>(mut self, module: &M) -> Self {
        let resource_type = module.resource_type();
        self.policies.extend(module.policies());
        for (action, executor) in module.executors() {
            self.executors.push((resource_type.clone(), action, executor));
        }
        if let Some(reader) = module.state_reader() {
            self.state_readers.push((resource_type, reader));
        }
        self
    }

    /// Uses an externally owned token store instead of a fresh one.
    pub fn token_store(mut self, store: Arc<ConfirmationTokenStore>) -> Self {
        self.token_store = Some(store);
        self
    }

    pub fn build(self) -> std::result::Result<RollbackEngine, RegistryError> {
        let mut policies = PolicyRegistry::new();
        policies.register_all(self.policies)?;

        let mut executors = ExecutorRegistry::new();
        for (resource_type, action, executor) in self.executors {
            executors.register(resource_type, action, executor)?;
        }
        for (resource_type, reader) in self.state_readers {
            executors.register_state_reader(resource_type, reader)?;
        }

        for key in executors.missing_for(&policies) {
            error!(policy = %key, "Reversible policy has no executor registered");
        }

        let tokens = self.token_store.unwrap_or_else(|| {
            Arc::new(ConfirmationTokenStore::with_clock(
                self.options.token_ttl,
                Arc::clone(&self.clock),
            ))
        });

        info!(
            policies = policies.len(),
            executors = executors.len(),
            "Rollback engine ready"
        );

        Ok(RollbackEngine {
            ledger: self.ledger,
            policies,
            executors,
            tokens,
            clock: self.clock,
            options: self.options,
        })
    }
}

/// Decides whether audit entries can be undone, and undoes them.
///
/// Registries are fixed at build time. The engine is `Send + Sync` and
/// every call is independent, so one instance serves concurrent requests.
pub struct RollbackEngine {
    ledger: Arc<dyn AuditLedger>,
    policies: PolicyRegistry,
    executors: ExecutorRegistry,
    tokens: Arc<ConfirmationTokenStore>,
    clock: Arc<dyn Clock>,
    options: EngineOptions,
}

/// Result of the cheap checks shared by preview, confirmation and execute.
struct Gate<'p> {
    policy: &'p RollbackPolicy,
    warnings: Vec<String>,
}

/// What the registered state reader reports for an entry's resource.
enum LiveState {
    /// No reader is registered, or the entry is a delete whose undo
    /// recreates the resource.
    Unknown,
    Missing,
    Present(Snapshot),
}

impl RollbackEngine {
    pub fn builder(ledger: Arc<dyn AuditLedger>) -> RollbackEngineBuilder {
        RollbackEngineBuilder {
            ledger,
            clock: Arc::new(SystemClock),
            options: EngineOptions::default(),
            policies: Vec::new(),
            executors: Vec::new(),
            state_readers: Vec::new(),
            token_store: None,
        }
    }

    pub fn policies(&self) -> &PolicyRegistry {
        &self.policies
    }

    pub fn executors(&self) -> &ExecutorRegistry {
        &self.executors
    }

    pub fn tokens(&self) -> &ConfirmationTokenStore {
        &self.tokens
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Assesses whether `audit_log_id` can be undone. Never mutates anything
    /// and never issues a token.
    pub fn preview(
        &self,
        audit_log_id: AuditLogId,
        actor: &ActorContext,
    ) -> Result<RollbackPreview> {
        let entry = self.load_entry(audit_log_id)?;
        let mut preview = RollbackPreview::new(audit_log_id);

        preview.status = RollbackStatus::PolicyCheck;
        if let Some(policy) = self.policies.lookup(&entry.resource_type, entry.action) {
            preview.classification = Some(policy.classification);
            preview.policy = Some(policy.clone());
            preview.requires_confirmation = policy.requires_confirmation;
        }

        let gate = match self.gate(&entry, actor) {
            Ok(gate) => gate,
            Err(failure) => {
                preview.block(failure);
                let preview = preview.finish();
                warn!(
                    audit_log_id = %audit_log_id,
                    resource_type = %entry.resource_type,
                    action = %entry.action,
                    reason = ?preview.failure.as_ref().map(RollbackFailure::code),
                    "Rollback preview blocked"
                );
                return Ok(preview);
            }
        };
        preview.warnings.extend(gate.warnings);

        match self.live_state(&entry)? {
            LiveState::Present(state) => preview.current_state = Some(state),
            LiveState::Missing => preview.block(Self::resource_missing(&entry)),
            LiveState::Unknown => {}
        }
        preview.target_state.clone_from(&entry.before);
        if let Some(failure) = Self::snapshot_check(gate.policy, &entry) {
            preview.block(failure);
        }

        preview.status = RollbackStatus::CascadeCheck;
        let report = run_cascade_checks(&gate.policy.cascade_checks, &entry.resource_id, &entry);
        preview.cascade_effects = report.results;
        preview.warnings.extend(report.warnings);
        if !report.blocking_reasons.is_empty() {
            if preview.failure.is_none() {
                preview.failure = Some(RollbackFailure::BlockedByCascade {
                    reasons: report.blocking_reasons.clone(),
                });
            }
            preview.blocking_reasons.extend(report.blocking_reasons);
        }

        if let Some(message) = &gate.policy.warning_message {
            preview.warnings.push(message.clone());
        }

        let preview = preview.finish();
        if preview.rollbackable {
            info!(
                audit_log_id = %audit_log_id,
                resource_type = %entry.resource_type,
                action = %entry.action,
                warnings = preview.warnings.len(),
                requires_confirmation = preview.requires_confirmation,
                "Rollback preview granted"
            );
        } else {
            warn!(
                audit_log_id = %audit_log_id,
                resource_type = %entry.resource_type,
                action = %entry.action,
                blocking = preview.blocking_reasons.len(),
                "Rollback preview blocked"
            );
        }
        Ok(preview)
    }

    /// Mints a confirmation token for an entry whose policy requires one.
    ///
    /// Runs the cheap checks again (policy, window, snapshot, resource
    /// existence) so a token is never minted for an entry that could not be
    /// undone anyway.
    pub fn issue_confirmation(
        &self,
        audit_log_id: AuditLogId,
        actor: &ActorContext,
    ) -> Result<IssuedConfirmation> {
        let entry = self.load_entry(audit_log_id)?;
        let gate = self.gate(&entry, actor).map_err(EngineError::NotConfirmable)?;
        if let Some(failure) = Self::snapshot_check(gate.policy, &entry) {
            return Err(EngineError::NotConfirmable(failure));
        }
        if let Some(failure) = self.existence_check(&entry)? {
            return Err(EngineError::NotConfirmable(failure));
        }
        if !gate.policy.requires_confirmation {
            return Err(EngineError::ConfirmationNotRequired);
        }

        let issued = self.tokens.issue(audit_log_id).map_err(|e| {
            error!(
                audit_log_id = %audit_log_id,
                error = %e,
                "Failed to issue confirmation token"
            );
            EngineError::Internal {
                detail: e.to_string(),
            }
        })?;

        info!(
            audit_log_id = %audit_log_id,
            actor = ?actor.actor_id,
            expires_at = %issued.expires_at,
            "Rollback confirmation issued"
        );
        Ok(issued)
    }

    /// Re-validates everything and, unless this is a dry run, undoes the entry.
    pub fn execute(
        &self,
        request: &RollbackRequest,
        actor: &ActorContext,
    ) -> Result<RollbackResult> {
        let entry = self.load_entry(request.audit_log_id)?;

        let gate = match self.gate(&entry, actor) {
            Ok(gate) => gate,
            Err(failure) => return Ok(Self::reject(&entry, failure, Vec::new())),
        };
        let mut warnings = gate.warnings;
        let policy = gate.policy;

        let reason = request.reason.trim();
        let reason_len = reason.chars().count();
        if reason_len < self.options.min_reason_len || reason_len > self.options.max_reason_len {
            let failure = RollbackFailure::InvalidReason {
                min_len: self.options.min_reason_len,
                max_len: self.options.max_reason_len,
            };
            return Ok(Self::reject(&entry, failure, warnings));
        }

        if let Some(failure) = Self::snapshot_check(policy, &entry) {
            return Ok(Self::reject(&entry, failure, warnings));
        }
        if let Some(failure) = self.existence_check(&entry)? {
            return Ok(Self::reject(&entry, failure, warnings));
        }

        let token = if policy.requires_confirmation {
            let Some(token) = request
                .confirmation_token
                .as_deref()
                .filter(|t| !t.is_empty())
            else {
                return Ok(Self::reject(&entry, RollbackFailure::ConfirmationRequired, warnings));
            };
            if !self
                .tokens
                .validate(token, entry.id)
                .map_err(|e| Self::internal(&entry, &e))?
            {
                return Ok(Self::reject(&entry, RollbackFailure::InvalidConfirmation, warnings));
            }
            Some(token)
        } else {
            None
        };

        let report = run_cascade_checks(&policy.cascade_checks, &entry.resource_id, &entry);
        warnings.extend(report.warnings);
        if !report.blocking_reasons.is_empty() {
            let failure = RollbackFailure::BlockedByCascade {
                reasons: report.blocking_reasons,
            };
            return Ok(Self::reject(&entry, failure, warnings));
        }
        if let Some(message) = &policy.warning_message {
            warnings.push(message.clone());
        }

        if request.dry_run {
            warnings.push(DRY_RUN_WARNING.to_string());
            info!(audit_log_id = %entry.id, "Rollback dry run passed");
            return Ok(RollbackResult {
                success: true,
                status: RollbackStatus::PreviewDone,
                audit_log_id: entry.id,
                resource_id: entry.resource_id.clone(),
                rollback_audit_log_id: None,
                restored_state: None,
                warnings,
                error: None,
                dry_run: true,
            });
        }

        let Some(executor) = self.executors.get(&entry.resource_type, entry.action) else {
            error!(
                audit_log_id = %entry.id,
                resource_type = %entry.resource_type,
                action = %entry.action,
                "Rollback policy exists but no executor is registered"
            );
            let failure = RollbackFailure::ExecutorMissing {
                resource_type: entry.resource_type.clone(),
                action: entry.action,
            };
            return Ok(RollbackResult::failed(&entry, failure, warnings));
        };

        if let Some(token) = token {
            // A concurrent execute may have consumed it since validation.
            if !self
                .tokens
                .consume(token)
                .map_err(|e| Self::internal(&entry, &e))?
            {
                return Ok(Self::reject(&entry, RollbackFailure::InvalidConfirmation, warnings));
            }
        }

        let ctx = ExecutionContext {
            entry: &entry,
            policy,
            actor,
            reason,
            ledger: self.ledger.as_ref(),
            now: self.clock.now(),
        };

        let outcome = match catch_unwind(AssertUnwindSafe(|| executor.execute(&ctx))) {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!(
                    audit_log_id = %entry.id,
                    resource_type = %entry.resource_type,
                    resource_id = %entry.resource_id,
                    error = %e,
                    "Rollback executor failed"
                );
                return Ok(RollbackResult::failed(&entry, e.to_failure(), warnings));
            }
            Err(panic) => {
                error!(
                    audit_log_id = %entry.id,
                    resource_type = %entry.resource_type,
                    resource_id = %entry.resource_id,
                    panic = panic_message(panic.as_ref()),
                    "Rollback executor panicked"
                );
                let failure = RollbackFailure::ExecutorFailure {
                    message: UNEXPECTED_FAILURE.to_string(),
                };
                return Ok(RollbackResult::failed(&entry, failure, warnings));
            }
        };

        warnings.extend(outcome.warnings);
        info!(
            audit_log_id = %entry.id,
            rollback_audit_log_id = %outcome.rollback_audit_log_id,
            resource_type = %entry.resource_type,
            resource_id = %entry.resource_id,
            actor = ?actor.actor_id,
            "Rollback executed"
        );

        Ok(RollbackResult {
            success: true,
            status: RollbackStatus::Executed,
            audit_log_id: entry.id,
            resource_id: entry.resource_id.clone(),
            rollback_audit_log_id: Some(outcome.rollback_audit_log_id),
            restored_state: outcome.restored_state,
            warnings,
            error: None,
            dry_run: false,
        })
    }

    /// Recent audit entries whose `(resource type, action)` is rollbackable,
    /// newest first. Window and cascade state are not evaluated here.
    pub fn list_recent_rollbackable(&self, filter: &RecentFilter) -> Result<Vec<AuditLogEntry>> {
        let mut query = LedgerQuery::default();
        if let Some(resource_type) = &filter.resource_type {
            query = query.with_resource_type(resource_type.clone());
        }
        if let Some(since) = filter.since {
            query = query.since(since);
        }

        let entries = self.ledger.list(&query).map_err(|e| {
            error!(error = %e, "Failed to list audit entries");
            EngineError::Internal {
                detail: e.to_string(),
            }
        })?;

        Ok(entries
            .into_iter()
            .filter(|e| self.policies.is_rollbackable(&e.resource_type, e.action))
            .take(filter.limit)
            .collect())
    }

    fn load_entry(&self, audit_log_id: AuditLogId) -> Result<AuditLogEntry> {
        self.ledger
            .find_by_id(audit_log_id)
            .map_err(|e| {
                error!(audit_log_id = %audit_log_id, error = %e, "Audit ledger lookup failed");
                EngineError::Internal {
                    detail: e.to_string(),
                }
            })?
            .ok_or(EngineError::AuditEntryNotFound(audit_log_id))
    }

    /// Policy, classification and window checks, in that order.
    fn gate(
        &self,
        entry: &AuditLogEntry,
        actor: &ActorContext,
    ) -> std::result::Result<Gate<'_>, RollbackFailure> {
        let Some(policy) = self.policies.lookup(&entry.resource_type, entry.action) else {
            return Err(RollbackFailure::NoPolicy {
                resource_type: entry.resource_type.clone(),
                action: entry.action,
            });
        };

        if policy.is_irreversible() {
            return Err(RollbackFailure::Irreversible {
                message: policy.refusal_message(),
            });
        }

        let mut warnings = Vec::new();
        if let Some(window) = &policy.window {
            let age = self.clock.now() - entry.created_at;
            if age > window.max_age {
                let escalated = window
                    .escalation_capability
                    .as_deref()
                    .is_some_and(|cap| actor.has_capability(cap));
                if !escalated {
                    return Err(RollbackFailure::WindowExpired {
                        elapsed: humanize(age),
                        window: window.description.clone(),
                        elapsed_secs: age.num_seconds(),
                        max_age_secs: window.max_age.num_seconds(),
                    });
                }
                debug!(audit_log_id = %entry.id, "Rollback window exceeded under escalation");
                warnings.push(format!(
                    "This change is {} old, beyond the {} rollback window; \
                     proceeding under escalation",
                    humanize(age),
                    window.description
                ));
            }
        }

        Ok(Gate { policy, warnings })
    }

    fn snapshot_check(policy: &RollbackPolicy, entry: &AuditLogEntry) -> Option<RollbackFailure> {
        (policy.strategy == CompensationStrategy::RestoreSnapshot && entry.before.is_none())
            .then_some(RollbackFailure::MissingSnapshot)
    }

    fn live_state(&self, entry: &AuditLogEntry) -> Result<LiveState> {
        let Some(reader) = self.executors.state_reader(&entry.resource_type) else {
            return Ok(LiveState::Unknown);
        };
        let state = reader.current_state(&entry.resource_id).map_err(|e| {
            error!(
                resource_type = %entry.resource_type,
                resource_id = %entry.resource_id,
                error = %e,
                "Failed to read current resource state"
            );
            EngineError::Internal {
                detail: e.to_string(),
            }
        })?;
        Ok(match state {
            Some(state) => LiveState::Present(state),
            None if entry.action == AuditAction::Delete => LiveState::Unknown,
            None => LiveState::Missing,
        })
    }

    fn existence_check(&self, entry: &AuditLogEntry) -> Result<Option<RollbackFailure>> {
        Ok(matches!(self.live_state(entry)?, LiveState::Missing)
            .then(|| Self::resource_missing(entry)))
    }

    fn resource_missing(entry: &AuditLogEntry) -> RollbackFailure {
        RollbackFailure::ResourceNotFound {
            resource_type: entry.resource_type.clone(),
            resource_id: entry.resource_id.clone(),
        }
    }

    fn reject(
        entry: &AuditLogEntry,
        failure: RollbackFailure,
        warnings: Vec<String>,
    ) -> RollbackResult {
        warn!(
            audit_log_id = %entry.id,
            resource_type = %entry.resource_type,
            action = %entry.action,
            code = failure.code(),
            "Rollback rejected"
        );
        RollbackResult::failed(entry, failure, warnings)
    }

    fn internal(entry: &AuditLogEntry, e: &dyn std::error::Error) -> EngineError {
        error!(audit_log_id = %entry.id, error = %e, "Confirmation token store failure");
        EngineError::Internal {
            detail: e.to_string(),
        }
    }
}

impl std::fmt::Debug for RollbackEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollbackEngine")
            .field("policies", &self.policies.len())
            .field("executors", &self.executors)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Formats an elapsed duration in the largest whole unit up to hours.
fn humanize(elapsed: Duration) -> String {
    fn unit(n: i64, name: &str) -> String {
        if n == 1 {
            format!("1 {name}")
        } else {
            format!("{n} {name}s")
        }
    }

    if elapsed.num_hours() >= 1 {
        unit(elapsed.num_hours(), "hour")
    } else if elapsed.num_minutes() >= 1 {
        unit(elapsed.num_minutes(), "minute")
    } else {
        unit(elapsed.num_seconds().max(0), "second")
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
