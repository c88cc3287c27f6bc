//! Confirmation token store.
//!
//! A token binds one human "yes" to one audit entry for a short time.
//! Tokens are single-use: execution consumes them right before the executor
//! runs. Expired tokens are purged lazily whenever a new token is issued;
//! `validate` re-checks expiry on every call, so a token that was never
//! swept is still rejected once its TTL has passed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use reversible_types::{AuditLogId, Clock, SystemClock};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Random bytes per token (256 bits before encoding).
pub const TOKEN_BYTES: usize = 32;

/// Default token lifetime.
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 600;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Failed to gather token entropy: {0}")]
    Entropy(String),

    #[error("Confirmation token store lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, TokenError>;

/// A freshly minted confirmation, handed to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedConfirmation {
    pub token: String,
    pub audit_log_id: AuditLogId,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct PendingConfirmation {
    audit_log_id: AuditLogId,
    expires_at: DateTime<Utc>,
}

/// Process-local store of outstanding confirmation tokens.
///
/// Safe to share between threads; all operations take one short lock.
pub struct ConfirmationTokenStore {
    pending: Mutex<HashMap<String, PendingConfirmation>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl ConfirmationTokenStore {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mints a token for `audit_log_id`, expiring `ttl` from now.
    ///
    /// Sweeps expired tokens as a side effect.
    pub fn issue(&self, audit_log_id: AuditLogId) -> Result<IssuedConfirmation> {
        let token = generate_token()?;
        let now = self.clock.now();
        let expires_at = now + self.ttl;

        let mut pending = self.lock()?;
        let before = pending.len();
        pending.retain(|_, p| p.expires_at > now);
        let swept = before - pending.len();

        pending.insert(
            token.clone(),
            PendingConfirmation {
                audit_log_id,
                expires_at,
            },
        );

        debug!(
            audit_log_id = %audit_log_id,
            expires_at = %expires_at,
            swept,
            "Confirmation token issued"
        );

        Ok(IssuedConfirmation {
            token,
            audit_log_id,
            expires_at,
        })
    }

    /// True only if `token` exists, has not expired, and was issued for
    /// `audit_log_id`. Never consumes the token.
    pub fn validate(&self, token: &str, audit_log_id: AuditLogId) -> Result<bool> {
        let now = self.clock.now();
        let pending = self.lock()?;

        let Some(entry) = pending.get(token) else {
            warn!(audit_log_id = %audit_log_id, "Unknown or already used confirmation token");
            return Ok(false);
        };

        if now >= entry.expires_at {
            warn!(audit_log_id = %audit_log_id, "Expired confirmation token");
            return Ok(false);
        }

        if entry.audit_log_id != audit_log_id {
            warn!(
                audit_log_id = %audit_log_id,
                bound_to = %entry.audit_log_id,
                "Confirmation token presented for a different audit entry"
            );
            return Ok(false);
        }

        Ok(true)
    }

    /// Deletes `token`. Returns whether it was present.
    pub fn consume(&self, token: &str) -> Result<bool> {
        Ok(self.lock()?.remove(token).is_some())
    }

    /// Drops every expired token and returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut pending = self.lock()?;
        let before = pending.len();
        pending.retain(|_, p| p.expires_at > now);
        Ok(before - pending.len())
    }

    /// Outstanding tokens, including expired ones not yet swept.
    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, PendingConfirmation>>> {
        self.pending.lock().map_err(|_| TokenError::LockPoisoned)
    }
}

impl Default for ConfirmationTokenStore {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_TOKEN_TTL_SECS))
    }
}

impl std::fmt::Debug for ConfirmationTokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Token values stay out of logs.
        f.debug_struct("ConfirmationTokenStore")
            .field("ttl", &self.ttl)
            .field("pending", &self.len().unwrap_or_default())
            .finish_non_exhaustive()
    }
}

fn generate_token() -> Result<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    getrandom::fill(&mut bytes).map_err(|e| TokenError::Entropy(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
