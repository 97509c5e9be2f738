//! Seam between the orchestrator and the external social-identity SDK.
//!
//! The SDK is callback based: [`NativeLoginSdk::log_in`] returns once the
//! native flow has been presented, and the outcome arrives later through the
//! [`NativeCallback`] it was handed, either directly or after the host forwards
//! a lifecycle event to [`NativeLoginSdk::resume_with_url`] /
//! [`NativeLoginSdk::application_did_become_active`].

use crate::context::ContextEvent;
use crate::{AuthError, AuthErrorKind, PermissionSet};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;
use uuid::Uuid;

/// Identity of one `start()` invocation. Outcomes carry it so stale ones can be
/// told apart from the current attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttemptId(Uuid);

impl AttemptId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the SDK is asked to do for one attempt.
#[derive(Debug, Clone)]
pub struct NativeLoginRequest {
    pub attempt: AttemptId,
    pub permissions: PermissionSet,
    pub connection: String,
}

/// Result of a successful native login.
#[derive(Clone)]
pub struct NativeAuthResult {
    pub native_access_token: String,
    pub granted_permissions: Vec<String>,
    pub declined_permissions: Vec<String>,
    pub expiry: Option<DateTime<Utc>>,
}

impl fmt::Debug for NativeAuthResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeAuthResult")
            .field("native_access_token_len", &self.native_access_token.len())
            .field("granted_permissions", &self.granted_permissions)
            .field("declined_permissions", &self.declined_permissions)
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// Failures reported by the native SDK.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NativeSdkError {
    /// The provider app or SDK is not available on this device.
    #[error("Native SDK not installed")]
    NotInstalled,

    /// App id, URL scheme, or similar setup is wrong.
    #[error("Native SDK misconfigured: {0}")]
    Misconfigured(String),

    /// The SDK could not reach its own backend.
    #[error("Native SDK network failure: {0}")]
    Network(String),

    #[error("Native SDK error: {0}")]
    Other(String),
}

impl From<NativeSdkError> for AuthError {
    fn from(error: NativeSdkError) -> Self {
        match &error {
            NativeSdkError::NotInstalled | NativeSdkError::Misconfigured(_) => {
                AuthError::new(AuthErrorKind::SdkUnavailable).with_cause(error)
            }
            NativeSdkError::Network(_) => AuthError::new(AuthErrorKind::SdkUnavailable)
                .with_retryable(true)
                .with_cause(error),
            NativeSdkError::Other(_) => AuthError::new(AuthErrorKind::Unknown).with_cause(error),
        }
    }
}

/// Terminal outcome of a native login session.
#[derive(Debug, Clone)]
pub enum NativeLoginOutcome {
    Success(NativeAuthResult),
    Cancelled,
    Failed(NativeSdkError),
}

/// Handle the SDK uses to report the outcome of a login.
///
/// Cloneable and callable from any thread. Only the first outcome reported for
/// the current attempt has an effect; everything else is discarded.
#[derive(Debug, Clone)]
pub struct NativeCallback {
    attempt: AttemptId,
    events: mpsc::UnboundedSender<ContextEvent>,
}

impl NativeCallback {
    pub(crate) fn new(attempt: AttemptId, events: mpsc::UnboundedSender<ContextEvent>) -> Self {
        Self { attempt, events }
    }

    pub fn attempt(&self) -> AttemptId {
        self.attempt
    }

    /// Report the outcome. Returns false if the orchestrator is gone.
    pub fn complete(&self, outcome: NativeLoginOutcome) -> bool {
        self.events
            .send(ContextEvent::Native {
                attempt: self.attempt,
                outcome,
            })
            .is_ok()
    }

    pub fn succeed(&self, result: NativeAuthResult) -> bool {
        self.complete(NativeLoginOutcome::Success(result))
    }

    pub fn cancel(&self) -> bool {
        self.complete(NativeLoginOutcome::Cancelled)
    }

    pub fn fail(&self, error: NativeSdkError) -> bool {
        self.complete(NativeLoginOutcome::Failed(error))
    }
}

/// The external social-identity SDK.
///
/// All methods are invoked from the orchestrator's context task, one at a
/// time. Implementations must not block.
pub trait NativeLoginSdk: Send + Sync {
    /// Open a native login session. An `Err` means the session could not be
    /// opened at all; otherwise the outcome is reported through `callback`.
    ///
    /// Drop `callback` and its clones once an outcome has been reported or
    /// `log_out` is called. A retained callback keeps the orchestrator's
    /// context task, and with it this SDK, alive.
    fn log_in(
        &self,
        request: NativeLoginRequest,
        callback: NativeCallback,
    ) -> Result<(), NativeSdkError>;

    /// Force-close any open native session.
    fn log_out(&self);

    /// Offer a URL opened by the host application. Returns whether the SDK
    /// consumed it.
    fn resume_with_url(
        &self,
        url: &Url,
        source_application: Option<&str>,
        annotation: Option<&Value>,
    ) -> bool;

    /// The host application became active again.
    fn application_did_become_active(&self);
}
