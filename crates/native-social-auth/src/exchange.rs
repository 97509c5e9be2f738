//! Native access token exchange.
//!
//! One `POST` to the provider's exchange endpoint, retried once on transient
//! failures, all of it bounded by a call-level timeout.

use crate::credential::{Credential, UserProfile};
use crate::{AuthError, AuthErrorKind, AuthResult};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// Body fields owned by the exchange protocol. Extra parameters never replace them.
const PROTOCOL_FIELDS: [&str; 5] = [
    "client_id",
    "connection",
    "access_token",
    "permissions",
    "scope",
];

/// Digest of a response body that is safe to log.
fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// Raw HTTP answer from the exchange endpoint.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// Failures below the HTTP layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Transport I/O error: {0}")]
    Io(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TransportError::Timeout
        } else if error.is_connect() {
            TransportError::Connect(error.to_string())
        } else {
            TransportError::Io(error.to_string())
        }
    }
}

impl From<TransportError> for AuthError {
    fn from(error: TransportError) -> Self {
        AuthError::new(AuthErrorKind::NetworkError).with_cause(error)
    }
}

/// HTTP seam of the exchange client.
#[async_trait]
pub trait ExchangeTransport: Send + Sync {
    /// POST `body` as JSON to `url`.
    async fn post_json(
        &self,
        url: &Url,
        body: &serde_json::Value,
    ) -> Result<TransportResponse, TransportError>;
}

/// [`ExchangeTransport`] backed by reqwest.
#[derive(Clone, Default)]
pub struct ReqwestTransport {
    http_client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured client (proxies, custom roots).
    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl ExchangeTransport for ReqwestTransport {
    async fn post_json(
        &self,
        url: &Url,
        body: &serde_json::Value,
    ) -> Result<TransportResponse, TransportError> {
        let response = self
            .http_client
            .post(url.clone())
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(TransportResponse { status, body })
    }
}

/// Configuration for retry behavior during the exchange.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first request. Only transient failures are retried.
    pub max_retries: u32,
    /// Initial delay between retries in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            initial_delay_ms: native_auth_config::DEFAULT_RETRY_INITIAL_DELAY_MS,
            max_delay_ms: native_auth_config::DEFAULT_RETRY_MAX_DELAY_MS,
        }
    }
}

impl RetryConfig {
    /// Calculate the delay for a given retry number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms = self
            .initial_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

/// Endpoint and limits for a [`TokenExchangeClient`].
#[derive(Debug, Clone)]
pub struct ExchangeSettings {
    pub endpoint: Url,
    pub client_id: String,
    /// Bounds the whole call, retry and backoff included.
    pub call_timeout: Duration,
    pub retry: RetryConfig,
}

impl ExchangeSettings {
    pub fn new(endpoint: Url, client_id: impl Into<String>) -> Self {
        Self {
            endpoint,
            client_id: client_id.into(),
            call_timeout: Duration::from_millis(native_auth_config::DEFAULT_EXCHANGE_TIMEOUT_MS),
            retry: RetryConfig::default(),
        }
    }

    /// Budget for one request: the call timeout minus the worst-case backoff,
    /// split evenly across the first request and its retries.
    pub fn attempt_timeout(&self) -> Duration {
        let attempts = self.retry.max_retries.saturating_add(1);
        let backoff: Duration = (0..self.retry.max_retries)
            .map(|n| self.retry.delay_for_attempt(n))
            .sum();
        let budget = self
            .call_timeout
            .checked_sub(backoff)
            .filter(|budget| !budget.is_zero())
            .unwrap_or(self.call_timeout);
        budget / attempts
    }

    /// Settings taken from the loaded configuration.
    pub fn from_config(config: &native_auth_config::Config) -> AuthResult<Self> {
        let endpoint = config
            .exchange_url()
            .map_err(|e| AuthError::invalid_configuration(e.to_string()))?;
        Ok(Self {
            endpoint,
            client_id: config.client_id.clone(),
            call_timeout: config.exchange_timeout(),
            retry: RetryConfig {
                max_retries: 1,
                initial_delay_ms: config.retry_initial_delay_ms,
                max_delay_ms: config.retry_max_delay_ms,
            },
        })
    }
}

/// Inputs of one exchange besides the native token.
#[derive(Debug, Clone, Default)]
pub struct ExchangeOptions {
    /// Sent as `scope` when present.
    pub scope: Option<String>,
    /// Extra body fields. Keys that collide with protocol fields are dropped.
    pub parameters: BTreeMap<String, String>,
}

/// Request body sent to the exchange endpoint.
#[derive(Clone, Serialize)]
pub struct ExchangeRequest {
    pub client_id: String,
    pub connection: String,
    pub access_token: String,
    pub permissions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(flatten)]
    pub parameters: BTreeMap<String, String>,
}

impl fmt::Debug for ExchangeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeRequest")
            .field("client_id", &self.client_id)
            .field("connection", &self.connection)
            .field("access_token_len", &self.access_token.len())
            .field("permissions", &self.permissions)
            .field("scope", &self.scope)
            .field("parameters", &self.parameters.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Deserialize)]
struct ExchangeResponse {
    access_token: String,
    token_type: String,
    expires_in: i64,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Deserialize)]
struct ExchangeErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default, alias = "description")]
    error_description: Option<String>,
}

/// Exchanges a native access token for provider credentials.
#[derive(Clone)]
pub struct TokenExchangeClient {
    transport: Arc<dyn ExchangeTransport>,
    settings: ExchangeSettings,
}

impl TokenExchangeClient {
    pub fn new(transport: Arc<dyn ExchangeTransport>, settings: ExchangeSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    /// Client over reqwest with settings from the loaded configuration.
    pub fn from_config(config: &native_auth_config::Config) -> AuthResult<Self> {
        Ok(Self::new(
            Arc::new(ReqwestTransport::new()),
            ExchangeSettings::from_config(config)?,
        ))
    }

    pub fn settings(&self) -> &ExchangeSettings {
        &self.settings
    }

    /// Exchange with no scope and no extra parameters.
    pub async fn exchange(
        &self,
        native_access_token: &str,
        permissions: &[String],
        connection: &str,
    ) -> AuthResult<Credential> {
        self.exchange_with_options(
            native_access_token,
            permissions,
            connection,
            &ExchangeOptions::default(),
        )
        .await
    }

    /// Exchange `native_access_token` for a [`Credential`] on `connection`.
    ///
    /// `permissions` is the granted subset and is echoed into the credential.
    pub async fn exchange_with_options(
        &self,
        native_access_token: &str,
        permissions: &[String],
        connection: &str,
        options: &ExchangeOptions,
    ) -> AuthResult<Credential> {
        let request = self.build_request(native_access_token, permissions, connection, options);
        let body = serde_json::to_value(&request)
            .map_err(|e| AuthError::unknown(format!("failed to encode exchange request: {}", e)))?;

        let call_timeout = self.settings.call_timeout;
        let response =
            match tokio::time::timeout(call_timeout, self.exchange_with_backoff(connection, &body))
                .await
            {
                Ok(result) => result?,
                Err(_) => {
                    warn!(
                        connection = %connection,
                        timeout_ms = call_timeout.as_millis() as u64,
                        "Token exchange exceeded call timeout"
                    );
                    return Err(AuthError::timeout().with_message(format!(
                        "token exchange did not finish within {}ms",
                        call_timeout.as_millis()
                    )));
                }
            };

        Ok(self.build_credential(response, permissions, connection))
    }

    fn build_request(
        &self,
        native_access_token: &str,
        permissions: &[String],
        connection: &str,
        options: &ExchangeOptions,
    ) -> ExchangeRequest {
        let parameters = options
            .parameters
            .iter()
            .filter(|(key, _)| !PROTOCOL_FIELDS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        ExchangeRequest {
            client_id: self.settings.client_id.clone(),
            connection: connection.to_string(),
            access_token: native_access_token.to_string(),
            permissions: permissions.to_vec(),
            scope: options.scope.clone(),
            parameters,
        }
    }

    /// Send with exponential backoff on transient failures.
    async fn exchange_with_backoff(
        &self,
        connection: &str,
        body: &serde_json::Value,
    ) -> AuthResult<ExchangeResponse> {
        let max_retries = self.settings.retry.max_retries;
        let mut attempt = 0;

        loop {
            match self.try_exchange(connection, body, attempt).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < max_retries => {
                    let delay = self.settings.retry.delay_for_attempt(attempt);
                    debug!(
                        attempt_no = attempt + 1,
                        max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Exchange failed with transient error, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(
                        connection = %connection,
                        attempt_no = attempt + 1,
                        "Token exchange failed: {}",
                        e
                    );
                    return Err(e);
                }
            }
        }
    }

    /// Single round trip to the exchange endpoint.
    async fn try_exchange(
        &self,
        connection: &str,
        body: &serde_json::Value,
        attempt: u32,
    ) -> AuthResult<ExchangeResponse> {
        debug!(
            url = %self.settings.endpoint,
            connection = %connection,
            attempt_no = attempt + 1,
            "Exchanging native access token"
        );

        let attempt_timeout = self.settings.attempt_timeout();
        let response = tokio::time::timeout(
            attempt_timeout,
            self.transport.post_json(&self.settings.endpoint, body),
        )
        .await
        .map_err(|_| {
            AuthError::timeout().with_message(format!(
                "exchange request did not answer within {}ms",
                attempt_timeout.as_millis()
            ))
        })??;

        if (200..300).contains(&response.status) {
            return serde_json::from_str(&response.body).map_err(|e| {
                let body_summary = summarize_response_body(&response.body);
                warn!(
                    status = response.status,
                    body_summary = %body_summary,
                    "Unparsable exchange response"
                );
                AuthError::new(AuthErrorKind::Unknown).with_cause(e)
            });
        }

        Err(classify_failure(&response))
    }

    fn build_credential(
        &self,
        response: ExchangeResponse,
        permissions: &[String],
        connection: &str,
    ) -> Credential {
        let profile = response
            .id_token
            .as_deref()
            .and_then(UserProfile::from_id_token);

        let identifier = profile
            .as_ref()
            .and_then(|p| p.sub.clone())
            .or(response.user_id)
            .unwrap_or_else(|| format!("{}|{}", connection, Uuid::new_v4()));

        let expires_at = (response.expires_in > 0)
            .then(|| Utc::now() + chrono::Duration::seconds(response.expires_in));

        info!(
            connection = %connection,
            identifier = %identifier,
            has_id_token = response.id_token.is_some(),
            "Token exchange succeeded"
        );

        Credential {
            identifier,
            access_token: response.access_token,
            token_type: response.token_type,
            id_token: response.id_token,
            expires_at,
            profile,
            connection: connection.to_string(),
            granted_permissions: permissions.to_vec(),
            declined_permissions: Vec::new(),
        }
    }
}

/// Map a non-success response to an error.
fn classify_failure(response: &TransportResponse) -> AuthError {
    let status = response.status;
    let detail = match serde_json::from_str::<ExchangeErrorBody>(&response.body) {
        Ok(ExchangeErrorBody {
            error: Some(error),
            error_description,
        }) => match error_description {
            Some(description) => format!("{}: {}", error, description),
            None => error,
        },
        _ => format!("HTTP {} ({})", status, summarize_response_body(&response.body)),
    };

    warn!(status, detail = %detail, "Exchange endpoint rejected the request");

    let error = match status {
        401 => AuthError::new(AuthErrorKind::InvalidCredentialsFromProvider),
        400..=499 => AuthError::new(AuthErrorKind::ServerRejected(status)),
        500..=599 => AuthError::new(AuthErrorKind::ServerRejected(status)).with_retryable(true),
        _ => AuthError::new(AuthErrorKind::Unknown),
    };
    error.with_message(detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_for_attempt() {
        let config = RetryConfig {
            max_retries: 1,
            initial_delay_ms: 250,
            max_delay_ms: 2000,
        };

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(250));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(2000));
        assert_eq!(config.delay_for_attempt(40), Duration::from_millis(2000));
    }

    #[test]
    fn test_default_retry_is_single() {
        assert_eq!(RetryConfig::default().max_retries, 1);
    }

    #[test]
    fn test_attempt_timeout_leaves_room_for_retry() {
        let mut settings = ExchangeSettings::new(
            Url::parse("https://samples.auth0.com/oauth/access_token").unwrap(),
            "CLIENT_ID",
        );
        settings.call_timeout = Duration::from_millis(2_000);
        settings.retry = RetryConfig {
            max_retries: 1,
            initial_delay_ms: 200,
            max_delay_ms: 1_000,
        };
        assert_eq!(settings.attempt_timeout(), Duration::from_millis(900));

        // Backoff larger than the whole budget
        settings.call_timeout = Duration::from_millis(100);
        assert_eq!(settings.attempt_timeout(), Duration::from_millis(50));
    }

    #[test]
    fn test_summarize_response_body_hides_content() {
        let summary = summarize_response_body("{\"access_token\":\"secret\"}");
        assert!(summary.starts_with("len=26,digest="));
        assert!(!summary.contains("secret"));
    }

    fn response(status: u16, body: &str) -> TransportResponse {
        TransportResponse {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_classify_401() {
        let error = classify_failure(&response(
            401,
            r#"{"error":"invalid_token","error_description":"expired"}"#,
        ));
        assert_eq!(error.kind(), &AuthErrorKind::InvalidCredentialsFromProvider);
        assert!(!error.is_retryable());
        assert_eq!(
            error.cause().map(|c| c.to_string()),
            Some("invalid_token: expired".to_string())
        );
    }

    #[test]
    fn test_classify_other_4xx() {
        let error = classify_failure(&response(403, "forbidden"));
        assert_eq!(error.kind(), &AuthErrorKind::ServerRejected(403));
        assert!(!error.is_transient());
    }

    #[test]
    fn test_classify_5xx_is_retryable() {
        let error = classify_failure(&response(502, ""));
        assert_eq!(error.kind(), &AuthErrorKind::ServerRejected(502));
        assert!(error.is_transient());
        assert!(error.is_retryable());
    }

    #[test]
    fn test_transport_error_maps_to_network() {
        let error: AuthError = TransportError::Connect("refused".into()).into();
        assert_eq!(error.kind(), &AuthErrorKind::NetworkError);
        assert!(error.is_retryable());
    }

    #[test]
    fn test_request_body_keeps_protocol_fields() {
        let client = TokenExchangeClient::new(
            Arc::new(ReqwestTransport::new()),
            ExchangeSettings::new(
                Url::parse("https://samples.auth0.com/oauth/access_token").unwrap(),
                "CLIENT",
            ),
        );
        let mut options = ExchangeOptions {
            scope: Some("openid".into()),
            ..Default::default()
        };
        options
            .parameters
            .insert("connection".into(), "evil".into());
        options.parameters.insert("device".into(), "iPhone".into());

        let request = client.build_request(
            "EAAB",
            &["public_profile".to_string()],
            "facebook",
            &options,
        );
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["client_id"], "CLIENT");
        assert_eq!(body["connection"], "facebook");
        assert_eq!(body["access_token"], "EAAB");
        assert_eq!(body["permissions"], serde_json::json!(["public_profile"]));
        assert_eq!(body["scope"], "openid");
        assert_eq!(body["device"], "iPhone");
    }

    #[test]
    fn test_request_debug_hides_token() {
        let request = ExchangeRequest {
            client_id: "CLIENT".into(),
            connection: "facebook".into(),
            access_token: "EAAB-secret".into(),
            permissions: vec![],
            scope: None,
            parameters: BTreeMap::new(),
        };
        assert!(!format!("{:?}", request).contains("EAAB-secret"));
    }
}
