//! # loadshield-core
//!
//! Attack-mode decision engine for a single host: watches CPU load, and when
//! it stays high, switches the zone's Cloudflare security level to
//! "under attack", reverting once load has been normal for a cooldown period.
//! Every transition is reported to an operator channel.
//!
//! ## Design Principles
//!
//! - **Deterministic core**: [`ThresholdDetector`] is a pure state machine over
//!   `(sample, instant)`; all I/O lives in the orchestrator's collaborators.
//! - **Single writer**: one task owns [`AttackModeOrchestrator`]; no locks
//!   around detector state.
//! - **Failure isolation**: remote and notification failures are tick-local.
//!   Only startup can fail fatally.
//! - **Trait seams**: [`Sampler`], [`SecurityLevelClient`] and [`Notifier`]
//!   are swappable for tests.

pub mod config;
pub mod detector;
pub mod error;
pub mod notify;
pub mod orchestrator;
pub mod retry;
pub mod sampler;
pub mod security_client;
pub mod security_level;

pub use config::ShieldConfig;
pub use detector::{Decision, DetectorConfig, DetectorState, DetectorStatus, Percentage, ThresholdDetector};
pub use error::{ConfigError, NotifyError, RemoteApiError, SampleError, StartupError, TickError};
pub use notify::{MessageFormatter, Notification, NotificationKind, Notifier, TelegramNotifier};
pub use orchestrator::{
    AttackModeOrchestrator, OrchestratorSettings, OrchestratorStatus, ShutdownHandle, IDLE_LOG_WINDOW,
};
pub use retry::RetryPolicy;
pub use sampler::{Sampler, SysinfoSampler};
pub use security_client::{CloudflareClient, SecurityLevelClient};
pub use security_level::SecurityLevel;
