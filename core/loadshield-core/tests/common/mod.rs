#![allow(dead_code)]

use async_trait::async_trait;
use loadshield_core::{
    DetectorConfig, Notification, Notifier, NotifyError, OrchestratorSettings, Percentage,
    RemoteApiError, SampleError, Sampler, SecurityLevel, SecurityLevelClient, IDLE_LOG_WINDOW,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn settings() -> OrchestratorSettings {
    OrchestratorSettings {
        detector: DetectorConfig {
            high_threshold: 80,
            high_duration: Duration::from_secs(15),
            normal_cooldown: Duration::from_secs(60),
        },
        interval: Duration::from_secs(5),
        default_level: SecurityLevel::High,
        idle_log_window: IDLE_LOG_WINDOW,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sampler
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SamplerState {
    script: VecDeque<Result<Percentage, String>>,
    fallback: Percentage,
    calls: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedSampler {
    state: Arc<Mutex<SamplerState>>,
}

impl ScriptedSampler {
    pub fn constant(usage: Percentage) -> Self {
        let sampler = Self::default();
        sampler.state.lock().expect("sampler lock").fallback = usage;
        sampler
    }

    pub fn set_usage(&self, usage: Percentage) {
        self.state.lock().expect("sampler lock").fallback = usage;
    }

    pub fn push_failure(&self, message: &str) {
        self.state
            .lock()
            .expect("sampler lock")
            .script
            .push_back(Err(message.to_string()));
    }

    pub fn calls(&self) -> usize {
        self.state.lock().expect("sampler lock").calls
    }
}

#[async_trait]
impl Sampler for ScriptedSampler {
    async fn current_load(&mut self) -> Result<Percentage, SampleError> {
        let mut state = self.state.lock().expect("sampler lock");
        state.calls += 1;
        match state.script.pop_front() {
            Some(Ok(usage)) => Ok(usage),
            Some(Err(message)) => Err(SampleError::Unavailable(message)),
            None => Ok(state.fallback),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Security level client
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct RemoteState {
    level: SecurityLevel,
    get_calls: usize,
    set_calls: Vec<SecurityLevel>,
    fail_probe: bool,
    fail_get: bool,
    fail_set: bool,
    set_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct FakeSecurity {
    state: Arc<Mutex<RemoteState>>,
}

impl FakeSecurity {
    pub fn at(level: SecurityLevel) -> Self {
        Self {
            state: Arc::new(Mutex::new(RemoteState {
                level,
                get_calls: 0,
                set_calls: Vec::new(),
                fail_probe: false,
                fail_get: false,
                fail_set: false,
                set_delay: Duration::ZERO,
            })),
        }
    }

    pub fn level(&self) -> SecurityLevel {
        self.state.lock().expect("remote lock").level
    }

    pub fn set_level(&self, level: SecurityLevel) {
        self.state.lock().expect("remote lock").level = level;
    }

    pub fn set_calls(&self) -> Vec<SecurityLevel> {
        self.state.lock().expect("remote lock").set_calls.clone()
    }

    pub fn fail_probe(self) -> Self {
        self.state.lock().expect("remote lock").fail_probe = true;
        self
    }

    /// Toggles read failures after startup has already read the level.
    pub fn set_get_failing(&self, failing: bool) {
        self.state.lock().expect("remote lock").fail_get = failing;
    }

    pub fn set_set_failing(&self, failing: bool) {
        self.state.lock().expect("remote lock").fail_set = failing;
    }

    pub fn fail_set(self) -> Self {
        self.state.lock().expect("remote lock").fail_set = true;
        self
    }

    pub fn slow_set(self, delay: Duration) -> Self {
        self.state.lock().expect("remote lock").set_delay = delay;
        self
    }
}

fn exhausted(operation: &'static str) -> RemoteApiError {
    RemoteApiError::Exhausted {
        operation,
        attempts: 3,
        last_cause: "connection refused".to_string(),
    }
}

#[async_trait]
impl SecurityLevelClient for FakeSecurity {
    async fn get(&self) -> Result<SecurityLevel, RemoteApiError> {
        let mut state = self.state.lock().expect("remote lock");
        state.get_calls += 1;
        if state.fail_get {
            return Err(exhausted("get security level"));
        }
        Ok(state.level)
    }

    async fn set(&self, level: SecurityLevel) -> Result<(), RemoteApiError> {
        let delay = {
            let mut state = self.state.lock().expect("remote lock");
            state.set_calls.push(level);
            if state.fail_set {
                return Err(exhausted("set security level"));
            }
            state.set_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.state.lock().expect("remote lock").level = level;
        Ok(())
    }

    async fn probe(&self) -> Result<(), RemoteApiError> {
        if self.state.lock().expect("remote lock").fail_probe {
            return Err(exhausted("get security level"));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Notifier
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct NotifierState {
    sent: Vec<Notification>,
    attempts: usize,
    fail_send: bool,
    fail_probe: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    state: Arc<Mutex<NotifierState>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.state.lock().expect("notifier lock").sent.clone()
    }

    pub fn attempts(&self) -> usize {
        self.state.lock().expect("notifier lock").attempts
    }

    pub fn errors(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|notification| match notification {
                Notification::Error { message } => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.lock().expect("notifier lock").fail_send = failing;
    }

    pub fn fail_probe(self) -> Self {
        self.state.lock().expect("notifier lock").fail_probe = true;
        self
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut state = self.state.lock().expect("notifier lock");
        state.attempts += 1;
        if state.fail_send {
            return Err(NotifyError::Exhausted {
                attempts: 3,
                last_cause: "telegram unreachable".to_string(),
            });
        }
        state.sent.push(notification.clone());
        Ok(())
    }

    async fn probe(&self) -> Result<(), NotifyError> {
        if self.state.lock().expect("notifier lock").fail_probe {
            return Err(NotifyError::Exhausted {
                attempts: 3,
                last_cause: "telegram unreachable".to_string(),
            });
        }
        Ok(())
    }
}
