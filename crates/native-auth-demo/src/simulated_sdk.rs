//! Stand-in for the native Facebook SDK.
//!
//! Completes each login with a token supplied on the command line, either
//! directly after a short delay or when the host forwards the
//! `fb<app id>://authorize#access_token=…` URL the real SDK would receive.

use native_social_auth::{
    NativeAuthResult, NativeCallback, NativeLoginRequest, NativeLoginSdk, NativeSdkError,
};
use serde_json::Value;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Delay before a direct completion, mimicking the app switch.
const DIRECT_COMPLETION_DELAY: Duration = Duration::from_millis(150);

/// How the simulated user answers the login dialog.
#[derive(Debug, Clone)]
pub struct SimulatedUser {
    pub token: String,
    pub declined: Vec<String>,
    pub cancels: bool,
    /// Deliver the result only through a forwarded open-URL.
    pub via_url: bool,
}

pub struct SimulatedSdk {
    user: SimulatedUser,
    pending: Mutex<Option<(NativeLoginRequest, NativeCallback)>>,
}

impl SimulatedSdk {
    pub fn new(user: SimulatedUser) -> Self {
        Self {
            user,
            pending: Mutex::new(None),
        }
    }

    fn take_pending(&self) -> Option<(NativeLoginRequest, NativeCallback)> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// `access_token` carried in the URL fragment.
pub(crate) fn token_from_url(url: &Url) -> Option<String> {
    let fragment = url.fragment()?;
    url::form_urlencoded::parse(fragment.as_bytes())
        .find(|(key, _)| key == "access_token")
        .map(|(_, value)| value.into_owned())
}

/// Report the simulated user's answer for `request`.
fn answer(
    user: &SimulatedUser,
    token: String,
    request: &NativeLoginRequest,
    callback: &NativeCallback,
) {
    if user.cancels {
        info!(attempt = %request.attempt, "Simulated user dismissed the login dialog");
        callback.cancel();
        return;
    }

    let (declined, granted): (Vec<String>, Vec<String>) = request
        .permissions
        .to_strings()
        .into_iter()
        .partition(|p| user.declined.contains(p));

    callback.succeed(NativeAuthResult {
        native_access_token: token,
        granted_permissions: granted,
        declined_permissions: declined,
        expiry: None,
    });
}

impl NativeLoginSdk for SimulatedSdk {
    fn log_in(
        &self,
        request: NativeLoginRequest,
        callback: NativeCallback,
    ) -> Result<(), NativeSdkError> {
        if self.user.token.trim().is_empty() {
            return Err(NativeSdkError::Misconfigured(
                "no native access token supplied".to_string(),
            ));
        }
        debug!(
            attempt = %request.attempt,
            permissions = %request.permissions,
            "Simulated login dialog opened"
        );

        if self.user.via_url {
            *self.pending.lock().unwrap_or_else(PoisonError::into_inner) =
                Some((request, callback));
            return Ok(());
        }

        // The callback moves into the task and is dropped once it has reported.
        let user = self.user.clone();
        tokio::spawn(async move {
            tokio::time::sleep(DIRECT_COMPLETION_DELAY).await;
            answer(&user, user.token.clone(), &request, &callback);
        });
        Ok(())
    }

    fn log_out(&self) {
        if self.take_pending().is_some() {
            debug!("Simulated login dialog closed");
        }
    }

    fn resume_with_url(
        &self,
        url: &Url,
        source_application: Option<&str>,
        _annotation: Option<&Value>,
    ) -> bool {
        let Some(token) = token_from_url(url) else {
            return false;
        };
        let Some((request, callback)) = self.take_pending() else {
            return false;
        };

        debug!(source_application = ?source_application, "Simulated SDK resumed from URL");
        answer(&self.user, token, &request, &callback);
        true
    }

    fn application_did_become_active(&self) {
        debug!("Simulated SDK notified of activation");
    }
}
