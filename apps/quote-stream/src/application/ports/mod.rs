//! Port Interfaces
//!
//! Contracts for the external collaborators this subsystem consumes but
//! does not implement:
//!
//! - [`TokenProvider`]: source of the opaque bearer credential presented at
//!   connect time. Read fresh on every connect attempt, never cached here.
//! - [`WatchlistProvider`]: resolves a watch-group name to its symbol list.
//!   The REST implementation behind it is out of scope; a provider failure
//!   is treated as "no symbols" by the caller.

use async_trait::async_trait;

use crate::domain::quote::Symbol;

/// Errors from external collaborators.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The credential store has no usable token.
    #[error("no credential available: {0}")]
    MissingCredential(String),

    /// The watch-group source failed or the group does not exist.
    #[error("watchlist unavailable: {0}")]
    WatchlistUnavailable(String),
}

/// Source of the bearer credential for the broker handshake.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Current bearer token.
    ///
    /// Called on every connect attempt so an out-of-band refresh is picked
    /// up by the next handshake; this is best-effort, not a freshness
    /// guarantee.
    ///
    /// # Errors
    ///
    /// Returns an error when no credential is available.
    async fn bearer_token(&self) -> Result<String, ProviderError>;
}

/// Resolves a watch group to the symbols it currently contains.
#[async_trait]
pub trait WatchlistProvider: Send + Sync {
    /// Symbol list for the named watch group.
    ///
    /// # Errors
    ///
    /// Returns an error when the group cannot be resolved; callers treat
    /// that as an empty symbol list, not a fatal condition.
    async fn resolve(&self, group: &str) -> Result<Vec<Symbol>, ProviderError>;
}

// =============================================================================
// Environment-backed implementations
// =============================================================================

/// Token provider reading the credential from an environment variable on
/// every call. The `Debug` implementation never prints the token.
pub struct EnvTokenProvider {
    var: String,
}

impl EnvTokenProvider {
    /// Default environment variable holding the credential.
    pub const DEFAULT_VAR: &'static str = "QUOTE_STREAM_TOKEN";

    /// Create a provider reading the default variable.
    #[must_use]
    pub fn new() -> Self {
        Self::with_var(Self::DEFAULT_VAR)
    }

    /// Create a provider reading a custom variable.
    #[must_use]
    pub fn with_var(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvTokenProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EnvTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvTokenProvider")
            .field("var", &self.var)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl TokenProvider for EnvTokenProvider {
    async fn bearer_token(&self) -> Result<String, ProviderError> {
        match std::env::var(&self.var) {
            Ok(token) if !token.is_empty() => Ok(token),
            _ => Err(ProviderError::MissingCredential(format!(
                "{} is not set",
                self.var
            ))),
        }
    }
}

/// Watchlist provider backed by a fixed in-memory group map.
///
/// Used by the binary (group contents from the environment) and by tests;
/// stands in for the out-of-scope REST watch-group API.
#[derive(Debug, Default, Clone)]
pub struct StaticWatchlistProvider {
    groups: std::collections::HashMap<String, Vec<Symbol>>,
}

impl StaticWatchlistProvider {
    /// Create an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group with its symbols.
    #[must_use]
    pub fn with_group(mut self, name: impl Into<String>, symbols: Vec<Symbol>) -> Self {
        self.groups.insert(name.into(), symbols);
        self
    }
}

#[async_trait]
impl WatchlistProvider for StaticWatchlistProvider {
    async fn resolve(&self, group: &str) -> Result<Vec<Symbol>, ProviderError> {
        self.groups.get(group).cloned().ok_or_else(|| {
            ProviderError::WatchlistUnavailable(format!("unknown watch group: {group}"))
        })
    }
}
