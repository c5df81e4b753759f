//! Attack-mode orchestration.
//!
//! A single task owns the orchestrator and runs one tick at a time:
//! sample → detect → dispatch. Transitions are idempotent against the remote
//! posture, notifications are best-effort, and no steady-state error ends the
//! loop. Only [`AttackModeOrchestrator::start`] can fail fatally.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ShieldConfig;
use crate::detector::{Decision, DetectorConfig, DetectorStatus, Percentage, ThresholdDetector};
use crate::error::{RemoteApiError, StartupError, TickError};
use crate::notify::{Notification, Notifier};
use crate::sampler::Sampler;
use crate::security_client::SecurityLevelClient;
use crate::security_level::SecurityLevel;

pub const IDLE_LOG_WINDOW: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub detector: DetectorConfig,
    pub interval: Duration,
    pub default_level: SecurityLevel,
    pub idle_log_window: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(config: &ShieldConfig) -> Self {
        Self {
            detector: config.monitoring.detector_config(),
            interval: config.monitoring.interval(),
            default_level: config.cloudflare.default_security_level,
            idle_log_window: IDLE_LOG_WINDOW,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorStatus {
    pub running: bool,
    pub detector: DetectorStatus,
    pub since_last_action: Option<Duration>,
    pub interval: Duration,
    pub default_level: SecurityLevel,
}

/// Requests loop shutdown. Cloneable; safe to call from any task.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    token: CancellationToken,
    running: Arc<AtomicBool>,
    requested: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Returns `false` when shutdown was already requested.
    pub fn shutdown(&self) -> bool {
        if self.requested.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.running.store(false, Ordering::SeqCst);
        self.token.cancel();
        info!("Shutting down attack-mode monitor");
        true
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

pub struct AttackModeOrchestrator<S, C, N> {
    sampler: S,
    security: C,
    notifier: N,
    settings: OrchestratorSettings,
    detector: ThresholdDetector,
    last_action_at: Option<Instant>,
    shutdown: ShutdownHandle,
}

impl<S, C, N> AttackModeOrchestrator<S, C, N>
where
    S: Sampler,
    C: SecurityLevelClient,
    N: Notifier,
{
    /// Verifies both remote services, seeds the detector from the current
    /// posture, and sends the startup notification.
    pub async fn start(
        settings: OrchestratorSettings,
        sampler: S,
        security: C,
        notifier: N,
        shutdown: CancellationToken,
    ) -> Result<Self, StartupError> {
        info!("Initializing attack-mode monitor");

        let security_probe = security.probe().await;
        let notifier_probe = notifier.probe().await;
        if let Err(err) = security_probe {
            return Err(StartupError::Connectivity {
                service: "security level API",
                cause: err.to_string(),
            });
        }
        if let Err(err) = notifier_probe {
            return Err(StartupError::Connectivity {
                service: "notification API",
                cause: err.to_string(),
            });
        }

        let current_level = security
            .get()
            .await
            .map_err(StartupError::InitialPosture)?;
        info!(level = %current_level, "Current security level");

        let detector = ThresholdDetector::new(settings.detector, current_level.is_under_attack());

        if let Err(err) = notifier
            .send(&Notification::Startup {
                current_level: Some(current_level),
            })
            .await
        {
            warn!(error = %err, "Failed to send startup notification");
        }

        info!("Attack-mode monitor initialized");
        Ok(Self {
            sampler,
            security,
            notifier,
            settings,
            detector,
            last_action_at: None,
            shutdown: ShutdownHandle {
                token: shutdown,
                running: Arc::new(AtomicBool::new(false)),
                requested: Arc::new(AtomicBool::new(false)),
            },
        })
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn detector(&self) -> &ThresholdDetector {
        &self.detector
    }

    pub fn status(&self) -> OrchestratorStatus {
        let now = now();
        OrchestratorStatus {
            running: self.shutdown.is_running(),
            detector: self.detector.status(now),
            since_last_action: self
                .last_action_at
                .map(|at| now.saturating_duration_since(at)),
            interval: self.settings.interval,
            default_level: self.settings.default_level,
        }
    }

    /// Runs ticks every `interval` until the shutdown token fires. A tick in
    /// progress always completes; a slow tick delays the next one.
    pub async fn run(&mut self) {
        let token = self.shutdown.token.clone();
        if token.is_cancelled() {
            return;
        }
        self.shutdown.running.store(true, Ordering::SeqCst);
        info!(
            interval_secs = self.settings.interval.as_secs_f64(),
            "Starting CPU monitoring"
        );

        let start = tokio::time::Instant::now() + self.settings.interval;
        let mut ticker = tokio::time::interval_at(start, self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.tick().await;
        }

        self.shutdown.running.store(false, Ordering::SeqCst);
        info!("CPU monitoring stopped");
    }

    /// One sample → detect → dispatch cycle. Errors stop at this boundary.
    pub async fn tick(&mut self) {
        if let Err(err) = self.process_tick().await {
            error!(error = %err, "Error in monitoring cycle");
            self.notify_error(&err).await;
        }
    }

    async fn process_tick(&mut self) -> Result<(), TickError> {
        let usage = self.sampler.current_load().await?;
        let now = now();

        match self.detector.tick(usage, now) {
            Decision::EnterElevated {
                usage,
                high_duration,
            } => self.enable_under_attack(usage, high_duration).await?,
            Decision::ExitElevated {
                usage,
                normal_duration,
            } => self.disable_under_attack(usage, normal_duration).await?,
            Decision::None => self.log_idle_status(usage, now),
        }
        Ok(())
    }

    async fn enable_under_attack(
        &mut self,
        usage: Percentage,
        duration: Duration,
    ) -> Result<(), RemoteApiError> {
        warn!(
            usage,
            duration_secs = duration.as_secs_f64(),
            "Enabling under attack mode"
        );

        let current = self.security.get().await?;
        if current.is_under_attack() {
            info!("Security level already under attack; skipping update");
        } else {
            self.security.set(SecurityLevel::UnderAttack).await?;
            warn!("Under attack mode enabled");
        }

        self.notify(Notification::UnderAttackEnabled { usage, duration })
            .await;
        self.last_action_at = Some(now());
        Ok(())
    }

    async fn disable_under_attack(
        &mut self,
        usage: Percentage,
        duration: Duration,
    ) -> Result<(), RemoteApiError> {
        info!(
            usage,
            cooldown_secs = duration.as_secs_f64(),
            "Disabling under attack mode"
        );

        let current = self.security.get().await?;
        if current.is_under_attack() {
            self.security.set(self.settings.default_level).await?;
            info!(level = %self.settings.default_level, "Under attack mode disabled");
        } else {
            info!(level = %current, "Security level not under attack; skipping update");
        }

        self.notify(Notification::UnderAttackDisabled { usage, duration })
            .await;
        self.last_action_at = Some(now());
        Ok(())
    }

    fn log_idle_status(&mut self, usage: Percentage, now: Instant) {
        let due = self
            .last_action_at
            .map_or(true, |at| now.saturating_duration_since(at) > self.settings.idle_log_window);
        if !due {
            debug!(usage, "No transition");
            return;
        }

        let status = if self.detector.is_elevated() {
            "high"
        } else {
            "normal"
        };
        info!(status, usage, "Monitor status");
        self.last_action_at = Some(now);
    }

    async fn notify(&self, notification: Notification) {
        if let Err(err) = self.notifier.send(&notification).await {
            warn!(
                error = %err,
                kind = %notification.kind(),
                "Failed to send notification"
            );
        }
    }

    async fn notify_error(&self, err: &TickError) {
        let notification = Notification::Error {
            message: err.to_string(),
        };
        if let Err(notify_err) = self.notifier.send(&notification).await {
            error!(
                original_error = %err,
                notify_error = %notify_err,
                "Failed to send error notification"
            );
        }
    }
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}
