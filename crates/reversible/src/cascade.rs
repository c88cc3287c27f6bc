//! Cascade checks: side effects that make an undo unsafe or merely noteworthy.
//!
//! A check looks at live state for one resource and answers with a
//! [`CascadeCheckResult`]:
//!
//! | passed | blocking | meaning                          |
//! |--------|----------|----------------------------------|
//! | true   | false    | nothing to report                |
//! | false  | false    | warning, shown but not enforced  |
//! | false  | true     | rollback must not proceed        |
//!
//! Checks are read-only and idempotent: the engine runs them once for the
//! preview and again right before execution. All configured checks always
//! run, so a preview lists every effect even when an early check blocks.
//! A check that cannot reach its data source is treated as blocking.

use std::fmt;
use std::sync::Arc;

use reversible_types::{AuditLogEntry, ResourceId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Outcome of one cascade check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeCheckResult {
    /// Name of the check that produced this result (filled in by the runner).
    #[serde(default)]
    pub check: String,
    pub passed: bool,
    /// Only meaningful when `passed` is false.
    pub blocking: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl CascadeCheckResult {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            check: String::new(),
            passed: true,
            blocking: false,
            message: message.into(),
            data: None,
        }
    }

    /// A failed, advisory result.
    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            check: String::new(),
            passed: false,
            blocking: false,
            message: message.into(),
            data: None,
        }
    }

    /// A failed result that prevents the rollback.
    pub fn block(message: impl Into<String>) -> Self {
        Self {
            check: String::new(),
            passed: false,
            blocking: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn is_warning(&self) -> bool {
        !self.passed && !self.blocking
    }

    pub fn is_blocking(&self) -> bool {
        !self.passed && self.blocking
    }
}

#[derive(Debug, Error)]
pub enum CascadeError {
    #[error("cascade query timed out")]
    Timeout,

    #[error("cascade query failed: {0}")]
    Query(String),
}

/// A read-only check run against live state before a rollback.
pub trait CascadeCheck: Send + Sync {
    /// Short identifier used in results and logs.
    fn name(&self) -> &str;

    /// Inspects current state for `resource_id`. Must not mutate anything.
    fn check(
        &self,
        resource_id: &ResourceId,
        entry: &AuditLogEntry,
    ) -> Result<CascadeCheckResult, CascadeError>;
}

impl fmt::Debug for dyn CascadeCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CascadeCheck({})", self.name())
    }
}

struct FnCheck<F> {
    name: String,
    check: F,
}

impl<F> CascadeCheck for FnCheck<F>
where
    F: Fn(&ResourceId, &AuditLogEntry) -> Result<CascadeCheckResult, CascadeError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn check(
        &self,
        resource_id: &ResourceId,
        entry: &AuditLogEntry,
    ) -> Result<CascadeCheckResult, CascadeError> {
        (self.check)(resource_id, entry)
    }
}

/// Wraps a closure as a named cascade check.
pub fn check_fn<F>(name: impl Into<String>, check: F) -> Arc<dyn CascadeCheck>
where
    F: Fn(&ResourceId, &AuditLogEntry) -> Result<CascadeCheckResult, CascadeError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnCheck {
        name: name.into(),
        check,
    })
}

/// All check results for one rollback attempt, partitioned for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeReport {
    pub results: Vec<CascadeCheckResult>,
    pub warnings: Vec<String>,
    pub blocking_reasons: Vec<String>,
}

impl CascadeReport {
    pub fn is_blocked(&self) -> bool {
        !self.blocking_reasons.is_empty()
    }
}

/// Message used when a check could not determine its answer.
pub const UNVERIFIED_MESSAGE: &str = "Could not verify cascade effects; treat as unsafe";

/// Runs `checks` in order and partitions the results.
///
/// A failing check never stops later checks. Errors become blocking results
/// so that an unreachable data source can never read as a pass.
pub fn run_cascade_checks(
    checks: &[Arc<dyn CascadeCheck>],
    resource_id: &ResourceId,
    entry: &AuditLogEntry,
) -> CascadeReport {
    let mut report = CascadeReport::default();

    for check in checks {
        let mut result = match check.check(resource_id, entry) {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    check = check.name(),
                    resource_id = %resource_id,
                    error = %e,
                    "Cascade check could not complete"
                );
                CascadeCheckResult::block(format!("{UNVERIFIED_MESSAGE} ({})", check.name()))
            }
        };

        // A passing check is never blocking.
        if result.passed {
            result.blocking = false;
        }
        result.check = check.name().to_string();

        debug!(
            check = check.name(),
            resource_id = %resource_id,
            passed = result.passed,
            blocking = result.blocking,
            "Cascade check evaluated"
        );

        if result.is_blocking() {
            report.blocking_reasons.push(result.message.clone());
        } else if result.is_warning() {
            report.warnings.push(result.message.clone());
        }
        report.results.push(result);
    }

    report
}
