//! Remote security-level API.
//!
//! `CloudflareClient` reads and patches a zone's `security_level` setting.
//! Every request goes through the shared [`RetryPolicy`].

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::info;

use crate::config::CloudflareConfig;
use crate::error::{RemoteApiError, StartupError};
use crate::retry::RetryPolicy;
use crate::security_level::SecurityLevel;

const CLOUDFLARE_RETRY_BASE_DELAY: Duration = Duration::from_secs(2);

#[async_trait]
pub trait SecurityLevelClient: Send + Sync {
    async fn get(&self) -> Result<SecurityLevel, RemoteApiError>;

    async fn set(&self, level: SecurityLevel) -> Result<(), RemoteApiError>;

    /// Cheap round-trip used at startup.
    async fn probe(&self) -> Result<(), RemoteApiError> {
        self.get().await.map(|_| ())
    }
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Value,
    #[serde(default)]
    result: Option<SettingResult>,
}

#[derive(Debug, Deserialize)]
struct SettingResult {
    value: String,
}

#[derive(Debug, Clone)]
pub struct CloudflareClient {
    http: reqwest::Client,
    setting_url: String,
    api_token: String,
    retry: RetryPolicy,
}

impl CloudflareClient {
    pub fn new(config: &CloudflareConfig) -> Result<Self, StartupError> {
        let retry = RetryPolicy::with_base_delay(CLOUDFLARE_RETRY_BASE_DELAY);
        let http = reqwest::Client::builder()
            .timeout(retry.request_timeout)
            .build()
            .map_err(|err| StartupError::HttpClient(err.to_string()))?;
        Ok(Self {
            http,
            setting_url: format!(
                "{}/zones/{}/settings/security_level",
                config.base_url.trim_end_matches('/'),
                config.zone_id
            ),
            api_token: config.api_token.clone(),
            retry,
        })
    }

    async fn send(&self, body: Option<Value>) -> Result<ApiEnvelope, String> {
        let request = match &body {
            Some(body) => self.http.patch(&self.setting_url).json(body),
            None => self.http.get(&self.setting_url),
        };
        let response = request
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|err| format!("request failed: {}", err.without_url()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| format!("failed to read response: {}", err.without_url()))?;
        parse_envelope(status.as_u16(), &text)
    }
}

fn parse_envelope(status: u16, body: &str) -> Result<ApiEnvelope, String> {
    let envelope: ApiEnvelope = serde_json::from_str(body)
        .map_err(|err| format!("HTTP {}: response was not valid JSON: {}", status, err))?;
    if envelope.success {
        Ok(envelope)
    } else {
        Err(format!("Cloudflare API error (HTTP {}): {}", status, envelope.errors))
    }
}

fn level_from_envelope(envelope: ApiEnvelope) -> Result<SecurityLevel, RemoteApiError> {
    let value = envelope
        .result
        .map(|result| result.value)
        .unwrap_or_default();
    value
        .parse()
        .map_err(|_| RemoteApiError::UnrecognizedLevel(value))
}

#[async_trait]
impl SecurityLevelClient for CloudflareClient {
    async fn get(&self) -> Result<SecurityLevel, RemoteApiError> {
        let envelope = self
            .retry
            .run("cloudflare.get_security_level", move || self.send(None))
            .await
            .map_err(|err| RemoteApiError::Exhausted {
                operation: "get security level",
                attempts: err.attempts,
                last_cause: err.last_cause,
            })?;
        let level = level_from_envelope(envelope)?;
        tracing::debug!(level = %level, "Current security level");
        Ok(level)
    }

    async fn set(&self, level: SecurityLevel) -> Result<(), RemoteApiError> {
        let body = serde_json::json!({ "value": level });
        let body = &body;
        self.retry
            .run("cloudflare.set_security_level", move || {
                self.send(Some(body.clone()))
            })
            .await
            .map_err(|err| RemoteApiError::Exhausted {
                operation: "set security level",
                attempts: err.attempts,
                last_cause: err.last_cause,
            })?;
        info!(level = %level, "Security level updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_setting_url_from_config() {
        let config = CloudflareConfig {
            api_token: "token".to_string(),
            zone_id: "zone-123".to_string(),
            base_url: "https://example.test/client/v4/".to_string(),
            ..CloudflareConfig::default()
        };
        let client = CloudflareClient::new(&config).expect("client");
        assert_eq!(
            client.setting_url,
            "https://example.test/client/v4/zones/zone-123/settings/security_level"
        );
    }

    #[test]
    fn parses_successful_envelope() {
        let envelope = parse_envelope(
            200,
            r#"{"success":true,"errors":[],"result":{"id":"security_level","value":"under_attack"}}"#,
        )
        .expect("envelope");
        assert_eq!(
            level_from_envelope(envelope).expect("level"),
            SecurityLevel::UnderAttack
        );
    }

    #[test]
    fn unsuccessful_envelope_reports_errors() {
        let err = parse_envelope(
            403,
            r#"{"success":false,"errors":[{"code":10000,"message":"Authentication error"}]}"#,
        )
        .unwrap_err();
        assert!(err.contains("HTTP 403"));
        assert!(err.contains("Authentication error"));
    }

    #[test]
    fn non_json_body_is_an_error() {
        let err = parse_envelope(502, "<html>bad gateway</html>").unwrap_err();
        assert!(err.contains("HTTP 502"));
    }

    #[test]
    fn unknown_remote_level_is_rejected() {
        let envelope = parse_envelope(200, r#"{"success":true,"result":{"value":"ludicrous"}}"#)
            .expect("envelope");
        assert!(matches!(
            level_from_envelope(envelope),
            Err(RemoteApiError::UnrecognizedLevel(value)) if value == "ludicrous"
        ));
    }

    #[tokio::test]
    async fn transport_failure_omits_request_url() {
        let config = CloudflareConfig {
            api_token: "token".to_string(),
            zone_id: "zone-123".to_string(),
            base_url: "http://127.0.0.1:9/client/v4".to_string(),
            ..CloudflareConfig::default()
        };
        let mut client = CloudflareClient::new(&config).expect("client");
        client.retry.max_attempts = 1;

        let err = client.get().await.unwrap_err().to_string();
        assert!(err.contains("request failed"), "unexpected error: {err}");
        assert!(!err.contains("security_level"), "url leaked: {err}");
        assert!(!err.contains("zone-123"), "url leaked: {err}");
    }
}
