//! Operator notifications.
//!
//! Messages are Markdown text delivered through the Telegram Bot API. Callers
//! treat delivery as best-effort: a `NotifyError` is logged, never escalated.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::info;

use crate::config::{MonitoringConfig, TelegramConfig};
use crate::detector::Percentage;
use crate::error::{NotifyError, StartupError};
use crate::retry::RetryPolicy;
use crate::security_level::SecurityLevel;

const TELEGRAM_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Startup,
    UnderAttackEnabled,
    UnderAttackDisabled,
    StatusUpdate,
    Error,
    Message,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Startup => "startup",
            NotificationKind::UnderAttackEnabled => "under_attack_enabled",
            NotificationKind::UnderAttackDisabled => "under_attack_disabled",
            NotificationKind::StatusUpdate => "status_update",
            NotificationKind::Error => "error",
            NotificationKind::Message => "message",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Startup {
        current_level: Option<SecurityLevel>,
    },
    UnderAttackEnabled {
        usage: Percentage,
        duration: Duration,
    },
    UnderAttackDisabled {
        usage: Percentage,
        duration: Duration,
    },
    StatusUpdate {
        usage: Percentage,
        status: String,
    },
    Error {
        message: String,
    },
    Message {
        message: String,
    },
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Notification::Startup { .. } => NotificationKind::Startup,
            Notification::UnderAttackEnabled { .. } => NotificationKind::UnderAttackEnabled,
            Notification::UnderAttackDisabled { .. } => NotificationKind::UnderAttackDisabled,
            Notification::StatusUpdate { .. } => NotificationKind::StatusUpdate,
            Notification::Error { .. } => NotificationKind::Error,
            Notification::Message { .. } => NotificationKind::Message,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;

    async fn probe(&self) -> Result<(), NotifyError>;
}

/// Renders notifications with the host name and active thresholds.
#[derive(Debug, Clone)]
pub struct MessageFormatter {
    server_name: String,
    monitoring: MonitoringConfig,
    default_level: SecurityLevel,
}

impl MessageFormatter {
    pub fn new(
        server_name: impl Into<String>,
        monitoring: MonitoringConfig,
        default_level: SecurityLevel,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            monitoring,
            default_level,
        }
    }

    /// Uses the local host name, falling back to "unknown".
    pub fn for_local_host(monitoring: MonitoringConfig, default_level: SecurityLevel) -> Self {
        let server_name = sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string());
        Self::new(server_name, monitoring, default_level)
    }

    pub fn format(&self, notification: &Notification, at: DateTime<Utc>) -> String {
        let timestamp = at.to_rfc3339_opts(SecondsFormat::Millis, true);
        let server = escape_markdown(&self.server_name);

        match notification {
            Notification::UnderAttackEnabled { usage, duration } => format!(
                "🚨 *VPS UNDER ATTACK MODE ENABLED* 🚨\n\n\
                 *Server:* {server}\n\
                 *CPU Usage:* {usage}%\n\
                 *Duration:* {duration:.1}s\n\
                 *Threshold:* {threshold}%\n\
                 *Time:* {timestamp}\n\n\
                 Cloudflare security level set to \"Under Attack\" mode.",
                duration = duration.as_secs_f64(),
                threshold = self.monitoring.cpu_threshold,
            ),
            Notification::UnderAttackDisabled { usage, duration } => format!(
                "✅ *VPS UNDER ATTACK MODE DISABLED* ✅\n\n\
                 *Server:* {server}\n\
                 *CPU Usage:* {usage}%\n\
                 *Cooldown Period:* {duration:.1}s\n\
                 *Time:* {timestamp}\n\n\
                 Cloudflare security level restored to \"{level}\".",
                duration = duration.as_secs_f64(),
                level = self.default_level.display_name(),
            ),
            Notification::StatusUpdate { usage, status } => format!(
                "📊 *VPS Status Update*\n\n\
                 *Server:* {server}\n\
                 *CPU Usage:* {usage}%\n\
                 *Status:* {status}\n\
                 *Time:* {timestamp}"
            ),
            Notification::Error { message } => format!(
                "❌ *VPS Monitor Error*\n\n\
                 *Server:* {server}\n\
                 *Error:* {message}\n\
                 *Time:* {timestamp}",
                message = escape_markdown(message),
            ),
            Notification::Startup { current_level } => {
                let under_attack = current_level.map_or(false, |level| level.is_under_attack());
                let (emoji, status) = if under_attack {
                    ("🚨", "UNDER ATTACK")
                } else {
                    ("✅", "NORMAL")
                };
                let level = current_level
                    .map(|level| level.display_name())
                    .unwrap_or_else(|| "unknown".to_string());
                format!(
                    "{emoji} *VPS Monitor Started* {emoji}\n\n\
                     *Server:* {server}\n\
                     *Current Cloudflare Level:* {level}\n\
                     *Status:* {status}\n\
                     *CPU Threshold:* {threshold}%\n\
                     *High CPU Duration:* {high}s\n\
                     *Cooldown Period:* {cooldown}s\n\
                     *Default Security Level:* {default_level}\n\
                     *Monitoring Interval:* {interval}s\n\
                     *Time:* {timestamp}",
                    threshold = self.monitoring.cpu_threshold,
                    high = self.monitoring.high_cpu_duration_secs,
                    cooldown = self.monitoring.normal_cooldown_secs,
                    default_level = self.default_level.display_name(),
                    interval = self.monitoring.monitoring_interval_secs,
                )
            }
            Notification::Message { message } => format!(
                "ℹ️ *VPS Monitor Notification*\n\n\
                 *Server:* {server}\n\
                 *Message:* {message}\n\
                 *Time:* {timestamp}",
                message = escape_markdown(message),
            ),
        }
    }
}

/// Escapes the entity characters of Telegram's legacy Markdown so free text
/// (error causes, host names) renders literally.
fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[derive(Debug, Deserialize)]
struct BotEnvelope {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Value,
}

#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    http: reqwest::Client,
    api_base: String,
    chat_id: String,
    formatter: MessageFormatter,
    retry: RetryPolicy,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig, formatter: MessageFormatter) -> Result<Self, StartupError> {
        let retry = RetryPolicy::with_base_delay(TELEGRAM_RETRY_BASE_DELAY);
        let http = reqwest::Client::builder()
            .timeout(retry.request_timeout)
            .build()
            .map_err(|err| StartupError::HttpClient(err.to_string()))?;
        Ok(Self {
            http,
            api_base: format!("{}{}", config.base_url, config.bot_token),
            chat_id: config.chat_id.clone(),
            formatter,
            retry,
        })
    }

    async fn call(&self, endpoint: &str, body: Option<&Value>) -> Result<Value, String> {
        let url = format!("{}{}", self.api_base, endpoint);
        let request = match body {
            Some(body) => self.http.post(&url).json(body),
            None => self.http.get(&url),
        };
        let response = request
            .send()
            .await
            .map_err(|err| format!("request failed: {}", err.without_url()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| format!("failed to read response: {}", err.without_url()))?;
        parse_bot_envelope(status.as_u16(), &text)
    }
}

fn parse_bot_envelope(status: u16, body: &str) -> Result<Value, String> {
    let envelope: BotEnvelope = serde_json::from_str(body)
        .map_err(|err| format!("HTTP {}: response was not valid JSON: {}", status, err))?;
    if envelope.ok {
        Ok(envelope.result)
    } else {
        Err(format!(
            "Telegram API error (HTTP {}): {}",
            status,
            envelope
                .description
                .unwrap_or_else(|| "no description".to_string())
        ))
    }
}

fn exhausted(err: crate::retry::RetryExhausted) -> NotifyError {
    NotifyError::Exhausted {
        attempts: err.attempts,
        last_cause: err.last_cause,
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": self.formatter.format(notification, Utc::now()),
            "parse_mode": "Markdown",
        });
        let body = &body;
        self.retry
            .run("telegram.send_message", move || {
                self.call("/sendMessage", Some(body))
            })
            .await
            .map_err(exhausted)?;
        info!(kind = %notification.kind(), "Telegram message sent");
        Ok(())
    }

    async fn probe(&self) -> Result<(), NotifyError> {
        let bot = self
            .retry
            .run("telegram.get_me", move || self.call("/getMe", None))
            .await
            .map_err(exhausted)?;
        let bot_name = bot.get("first_name").and_then(Value::as_str).unwrap_or("");
        let username = bot.get("username").and_then(Value::as_str).unwrap_or("");
        info!(bot_name, username, "Telegram API connection verified");
        Ok(())
    }
}
