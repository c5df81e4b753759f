//! Error types for loadshield-core.
//!
//! Steady-state errors (`SampleError`, `RemoteApiError`, `NotifyError`) are
//! tick-local and never end the polling loop. Only `StartupError` is fatal.

use std::path::PathBuf;

// ═══════════════════════════════════════════════════════════════════════════════
// Collaborator Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// The CPU sampling facility could not produce a reading.
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("CPU sampler unavailable: {0}")]
    Unavailable(String),

    #[error("CPU sampler returned an invalid reading: {0}")]
    InvalidReading(f32),
}

/// A security-level read or write that did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum RemoteApiError {
    #[error("{operation} failed after {attempts} attempt(s): {last_cause}")]
    Exhausted {
        operation: &'static str,
        attempts: u32,
        last_cause: String,
    },

    #[error("remote reported unrecognized security level `{0}`")]
    UnrecognizedLevel(String),
}

/// Notification delivery exhausted its retries.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification delivery failed after {attempts} attempt(s): {last_cause}")]
    Exhausted { attempts: u32, last_cause: String },
}

/// A security level name outside the supported set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid security level `{given}` (valid levels: {valid})")]
pub struct InvalidSecurityLevel {
    pub given: String,
    pub valid: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration & Startup Errors
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration value: {0}")]
    MissingCredential(&'static str),

    #[error("Configuration read failed: {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration file malformed: {path}: {details}")]
    Parse { path: PathBuf, details: String },

    #[error("Invalid configuration value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error(transparent)]
    InvalidSecurityLevel(#[from] InvalidSecurityLevel),

    #[error("Home directory not found")]
    NoHomeDir,
}

/// Failures that abort process startup. Never retried.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{service} connection check failed: {cause}")]
    Connectivity {
        service: &'static str,
        cause: String,
    },

    #[error("Failed to read initial security level: {0}")]
    InitialPosture(#[source] RemoteApiError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tick Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Anything that can go wrong inside a single polling tick.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    #[error(transparent)]
    Sample(#[from] SampleError),

    #[error(transparent)]
    Remote(#[from] RemoteApiError),
}
