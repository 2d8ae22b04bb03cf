//! Authenticated M2M session and request envelope
//!
//! Owns the base endpoint and the bearer token, and wraps every call in the
//! uniform error-classification layer. The token lives for the whole run;
//! there is no mid-run refresh, so a 401-class rejection is fatal.

use std::num::NonZeroU32;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde_json::json;
use url::Url;

use crate::auth::Credentials;
use crate::constants::{api, http};
use crate::errors::{ApiError, ApiResult, AuthError, AuthResult};

/// Which M2M deployment to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ApiInstance {
    /// Production
    Ops,
    /// Development mainline
    Devmast,
    /// Development system
    Devsys,
}

impl ApiInstance {
    pub fn base_url(&self) -> &'static str {
        match self {
            ApiInstance::Ops => api::OPS_BASE_URL,
            ApiInstance::Devmast => api::DEVMAST_BASE_URL,
            ApiInstance::Devsys => api::DEVSYS_BASE_URL,
        }
    }
}

/// Session behavior knobs
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Treat HTTP 5xx as fatal for the call. Off by default: the fault is
    /// logged and the call proceeds on whatever body came back.
    pub fail_on_server_fault: bool,
    /// API calls per second
    pub rate_limit_rps: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fail_on_server_fault: false,
            rate_limit_rps: http::API_RATE_LIMIT_RPS,
        }
    }
}

/// Authenticated session against one M2M API instance
pub struct M2mSession {
    client: Client,
    base_url: Url,
    token: Option<String>,
    config: SessionConfig,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl std::fmt::Debug for M2mSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("M2mSession")
            .field("base_url", &self.base_url.as_str())
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

impl M2mSession {
    /// Create an unauthenticated session for the given instance
    pub fn new(instance: ApiInstance, config: SessionConfig) -> AuthResult<Self> {
        let client = Client::builder()
            .timeout(http::API_TIMEOUT)
            .connect_timeout(http::CONNECT_TIMEOUT)
            .user_agent(http::USER_AGENT)
            .build()
            .map_err(AuthError::Http)?;

        let base_url = Url::parse(instance.base_url()).expect("instance base URL is valid");

        let quota = Quota::per_second(
            NonZeroU32::new(config.rate_limit_rps.max(1)).expect("rate limit is non-zero"),
        );

        Ok(Self {
            client,
            base_url,
            token: None,
            config,
            rate_limiter: RateLimiter::direct(quota),
        })
    }

    /// Exchange stored credentials for a session token via `login-token`
    pub async fn login(&mut self, credentials: &Credentials) -> AuthResult<()> {
        let payload = json!({
            "username": credentials.username,
            "token": credentials.token,
        });

        let data = self
            .post_raw("login-token", payload)
            .await
            .map_err(|e| match e {
                ApiError::Http { source, .. } => AuthError::Http(source),
                other => AuthError::LoginFailed {
                    reason: other.to_string(),
                },
            })?;

        let token = data.as_str().ok_or(AuthError::TokenMissing)?.to_string();
        tracing::info!(
            "Logged in to {} as {}",
            self.base_url,
            credentials.username
        );
        self.token = Some(token);
        Ok(())
    }

    /// Whether `login` has succeeded
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Issue a POST to `resource` with the bearer token attached and return
    /// the envelope's `data` payload.
    pub async fn request(
        &self,
        resource: &str,
        payload: serde_json::Value,
    ) -> ApiResult<serde_json::Value> {
        self.post_raw(resource, payload).await
    }

    async fn post_raw(
        &self,
        resource: &str,
        payload: serde_json::Value,
    ) -> ApiResult<serde_json::Value> {
        self.rate_limiter.until_ready().await;

        let url = self
            .base_url
            .join(resource)
            .map_err(|e| ApiError::Protocol {
                resource: resource.to_string(),
                reason: format!("invalid resource path: {}", e),
            })?;

        tracing::debug!("POST {} {}", url, redact_token(&payload));

        let mut builder = self.client.post(url).json(&payload);
        if let Some(token) = &self.token {
            builder = builder.header(api::AUTH_HEADER, token);
        }

        let response = builder.send().await.map_err(|source| ApiError::Http {
            resource: resource.to_string(),
            source,
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|source| ApiError::Http {
            resource: resource.to_string(),
            source,
        })?;

        let data = classify_response(resource, status, &body, self.config.fail_on_server_fault)?;
        tracing::debug!("RESPONSE {} {}", resource, data);
        Ok(data)
    }
}

/// Apply the severity-ordered error classification to one response and
/// return the `data` payload when the call is acceptable.
///
/// Severity levels, highest wins:
///   5. body lacks the `data` envelope
///   4. body carries an explicit errorCode/errorMessage
///   3. body is not parseable JSON
///   2. HTTP 4xx
///   1. HTTP 5xx - logged, raised only when `fail_on_server_fault` is set
pub(crate) fn classify_response(
    resource: &str,
    status: u16,
    body: &str,
    fail_on_server_fault: bool,
) -> ApiResult<serde_json::Value> {
    let server_fault = status >= 500;
    let client_error = (400..500).contains(&status);

    if server_fault {
        tracing::error!("M2M server fault on {}: HTTP {}", resource, status);
    }
    if client_error {
        tracing::error!("M2M API rejection on {}: HTTP {}", resource, status);
    }

    let parsed: Option<crate::app::models::ApiEnvelope> = serde_json::from_str(body).ok();

    let mut missing_data = false;
    let mut api_message: Option<String> = None;
    let mut unparseable = false;

    match &parsed {
        Some(envelope) => {
            if envelope.error_code.is_some() || envelope.error_message.is_some() {
                api_message = Some(format!(
                    "{}: {}",
                    envelope.error_code.as_deref().unwrap_or("unknown"),
                    envelope.error_message.as_deref().unwrap_or("")
                ));
                tracing::error!("M2M API error on {}: {}", resource, api_message.as_deref().unwrap_or(""));
            }
            if envelope.data.is_none() {
                // An explicit `"data": null` is acceptable; only a body with
                // no data key at all counts as missing.
                missing_data = !body_has_data_key(body);
            }
        }
        None => {
            unparseable = true;
            tracing::error!("Unparseable M2M response from {}", resource);
        }
    }

    // Severities 5 down to 2 raise; severity 1 alone does not.
    if missing_data {
        return Err(ApiError::Protocol {
            resource: resource.to_string(),
            reason: "no data found in response".to_string(),
        });
    }
    if let Some(message) = api_message {
        return Err(ApiError::Request {
            resource: resource.to_string(),
            message,
        });
    }
    if unparseable {
        return Err(ApiError::Protocol {
            resource: resource.to_string(),
            reason: "unable to parse JSON response".to_string(),
        });
    }
    if client_error {
        return Err(ApiError::Request {
            resource: resource.to_string(),
            message: format!("HTTP {}", status),
        });
    }
    if server_fault && fail_on_server_fault {
        return Err(ApiError::ServerFault {
            resource: resource.to_string(),
            status,
        });
    }

    Ok(parsed
        .and_then(|e| e.data)
        .unwrap_or(serde_json::Value::Null))
}

fn body_has_data_key(body: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.as_object().map(|o| o.contains_key("data")))
        .unwrap_or(false)
}

/// Render a payload for logging with any token field masked
fn redact_token(payload: &serde_json::Value) -> String {
    let mut clone = payload.clone();
    if let Some(obj) = clone.as_object_mut() {
        if obj.contains_key("token") {
            obj.insert("token".to_string(), serde_json::Value::from("xxxxx"));
        }
    }
    clone.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_accepts_data_envelope() {
        let data = classify_response("scene-search", 200, r#"{"data": {"totalHits": 3}}"#, false)
            .unwrap();
        assert_eq!(data["totalHits"], 3);
    }

    #[test]
    fn classify_missing_data_is_protocol_error() {
        let result = classify_response("scene-search", 200, r#"{"sessionId": 1}"#, false);
        match result {
            Err(ApiError::Protocol { reason, .. }) => assert!(reason.contains("no data")),
            other => panic!("expected Protocol error, got {:?}", other),
        }
    }

    #[test]
    fn classify_explicit_error_code_wins_over_status() {
        let body = r#"{"data": null, "errorCode": "AUTH_INVALID", "errorMessage": "bad token"}"#;
        let result = classify_response("login-token", 200, body, false);
        match result {
            Err(ApiError::Request { message, .. }) => {
                assert!(message.contains("AUTH_INVALID"));
                assert!(message.contains("bad token"));
            }
            other => panic!("expected Request error, got {:?}", other),
        }
    }

    #[test]
    fn classify_unparseable_body() {
        let result = classify_response("download-options", 200, "<html>oops</html>", false);
        assert!(matches!(result, Err(ApiError::Protocol { .. })));
    }

    #[test]
    fn classify_client_error_status() {
        let result = classify_response("scene-search", 404, r#"{"data": 1}"#, false);
        assert!(matches!(result, Err(ApiError::Request { .. })));
    }

    #[test]
    fn classify_server_fault_tolerated_by_default() {
        // HTTP 5xx alone does not abort the call unless configured to.
        let data = classify_response("scene-search", 503, r#"{"data": 42}"#, false).unwrap();
        assert_eq!(data, 42);

        let result = classify_response("scene-search", 503, r#"{"data": 42}"#, true);
        assert!(matches!(result, Err(ApiError::ServerFault { status: 503, .. })));
    }

    #[test]
    fn token_redacted_in_logs() {
        let payload = json!({"username": "u", "token": "secret"});
        let rendered = redact_token(&payload);
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("xxxxx"));
    }

    #[test]
    fn instance_base_urls() {
        assert!(ApiInstance::Ops.base_url().contains("m2m.cr.usgs.gov"));
        assert!(ApiInstance::Devmast.base_url().contains("devmast"));
        assert!(ApiInstance::Devsys.base_url().contains("devsys"));
    }
}
