use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

use tracing::warn;

use crate::docs::DocumentStore;
use crate::orchestrator::Orchestrator;

/// Pipeline tuning, read from the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub top_k: usize,
    pub snippet_chars: usize,
    pub request_timeout_secs: u64,
    pub scope_timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            top_k: 8,
            snippet_chars: 600,
            request_timeout_secs: 180,
            scope_timeout_secs: 20,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            top_k: env_or("EVIDENCE_TOP_K", defaults.top_k),
            snippet_chars: env_or("EVIDENCE_SNIPPET_CHARS", defaults.snippet_chars),
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs),
            scope_timeout_secs: env_or("EVIDENCE_SCOPE_TIMEOUT_SECS", defaults.scope_timeout_secs),
        }
    }
}

/// Read `key` from the environment, falling back to `default` when it is
/// unset or does not parse.
pub fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match dotenv::var(key) {
        Ok(raw) => parse_or(key, &raw, default),
        Err(_) => default,
    }
}

fn parse_or<T>(key: &str, raw: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match raw.trim().parse() {
        Ok(value) => value,
        Err(e) => {
            warn!(key, value = raw, %default, "invalid setting, using default: {}", e);
            default
        }
    }
}

pub struct AppState {
    pub store: Arc<DocumentStore>,
    pub orchestrator: Arc<Orchestrator>,
    pub config: OrchestratorConfig,
}
