//! Authentication error types.
//!
//! Every failure an attempt can end with is an [`AuthError`]: a kind from the
//! fixed taxonomy, an optional underlying cause, and whether retrying the whole
//! attempt could succeed.

use std::sync::Arc;
use thiserror::Error;

/// Shared underlying cause attached to an [`AuthError`].
pub type ErrorCause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Classification of authentication failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// The user dismissed the native login, or the attempt was cancelled.
    #[error("Login cancelled")]
    UserCancelled,

    /// A required permission was declined.
    #[error("Permission denied: {}", .0.join(", "))]
    PermissionDenied(Vec<String>),

    /// The native SDK is missing, misconfigured, or could not reach its backend.
    #[error("Native SDK unavailable")]
    SdkUnavailable,

    /// The token exchange could not reach the provider.
    #[error("Network error")]
    NetworkError,

    /// The provider refused the native access token.
    #[error("Invalid credentials from provider")]
    InvalidCredentialsFromProvider,

    /// The provider answered the exchange with a non-success status.
    #[error("Server rejected the request: HTTP {0}")]
    ServerRejected(u16),

    /// The attempt or the exchange ran out of time.
    #[error("Operation timed out")]
    Timeout,

    /// `start()` was called while a previous attempt is still running.
    #[error("Authentication already in progress")]
    AlreadyInProgress,

    /// Construction-time validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Anything that does not fit the kinds above.
    #[error("Unknown error")]
    Unknown,
}

/// Authentication error type.
#[derive(Error, Debug, Clone)]
#[error("{kind}")]
pub struct AuthError {
    kind: AuthErrorKind,
    #[source]
    cause: Option<ErrorCause>,
    retryable: bool,
}

impl AuthError {
    /// Create an error of the given kind with its default retry classification.
    pub fn new(kind: AuthErrorKind) -> Self {
        let retryable = matches!(kind, AuthErrorKind::NetworkError | AuthErrorKind::Timeout);
        Self {
            kind,
            cause: None,
            retryable,
        }
    }

    /// Attach an underlying cause.
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// Attach a plain message as the underlying cause.
    pub fn with_message(self, message: impl Into<String>) -> Self {
        self.with_cause(ErrorMessage(message.into()))
    }

    /// Override the retry classification.
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn cancelled() -> Self {
        Self::new(AuthErrorKind::UserCancelled)
    }

    pub fn already_in_progress() -> Self {
        Self::new(AuthErrorKind::AlreadyInProgress)
    }

    pub fn timeout() -> Self {
        Self::new(AuthErrorKind::Timeout)
    }

    pub fn permission_denied(declined: Vec<String>) -> Self {
        Self::new(AuthErrorKind::PermissionDenied(declined))
    }

    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::InvalidConfiguration(message.into()))
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::Unknown).with_message(message)
    }

    /// The error kind.
    pub fn kind(&self) -> &AuthErrorKind {
        &self.kind
    }

    /// The underlying cause, if any.
    pub fn cause(&self) -> Option<&ErrorCause> {
        self.cause.as_ref()
    }

    /// Whether a new attempt could succeed without user action.
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Returns true if this error is transient and the exchange may be retried.
    ///
    /// Transient errors include:
    /// - Network failures
    /// - Per-request timeouts
    /// - 5xx responses
    pub fn is_transient(&self) -> bool {
        match &self.kind {
            AuthErrorKind::NetworkError | AuthErrorKind::Timeout => true,
            AuthErrorKind::ServerRejected(code) => (500..600).contains(code),
            _ => false,
        }
    }
}

impl From<AuthErrorKind> for AuthError {
    fn from(kind: AuthErrorKind) -> Self {
        AuthError::new(kind)
    }
}

/// Plain-text cause.
#[derive(Error, Debug)]
#[error("{0}")]
struct ErrorMessage(String);

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
