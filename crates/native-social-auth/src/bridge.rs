//! Wraps the native SDK's login session for one orchestrator.

use crate::sdk::{
    AttemptId, NativeCallback, NativeLoginRequest, NativeLoginSdk, NativeSdkError,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// The native session opened for one attempt.
#[derive(Debug)]
struct NativeSession {
    attempt: AttemptId,
}

/// Owns at most one open native session at a time.
///
/// Only the orchestrator's context task touches a bridge, so it needs no
/// synchronization of its own.
pub(crate) struct SdkSessionBridge {
    sdk: Arc<dyn NativeLoginSdk>,
    session: Option<NativeSession>,
}

impl SdkSessionBridge {
    pub(crate) fn new(sdk: Arc<dyn NativeLoginSdk>) -> Self {
        Self { sdk, session: None }
    }

    /// Open a native session for `request.attempt`, force-closing any
    /// session still open.
    pub(crate) fn start(
        &mut self,
        request: NativeLoginRequest,
        callback: NativeCallback,
    ) -> Result<(), NativeSdkError> {
        if let Some(previous) = self.session.take() {
            debug!(attempt = %previous.attempt, "Force-closing previous native session");
            self.sdk.log_out();
        }

        let attempt = request.attempt;
        debug!(
            attempt = %attempt,
            connection = %request.connection,
            permissions = %request.permissions,
            "Opening native login session"
        );
        self.sdk.log_in(request, callback)?;
        self.session = Some(NativeSession { attempt });
        Ok(())
    }

    /// Consume the session if `attempt` is the one pending. Returns false for
    /// stale or duplicate outcomes.
    pub(crate) fn resolve(&mut self, attempt: AttemptId) -> bool {
        match &self.session {
            Some(session) if session.attempt == attempt => {
                self.session = None;
                true
            }
            _ => false,
        }
    }

    /// Close the pending session, if any. Returns whether one was open.
    pub(crate) fn cancel(&mut self) -> bool {
        match self.session.take() {
            Some(session) => {
                debug!(attempt = %session.attempt, "Closing native session");
                self.sdk.log_out();
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.session.is_some()
    }

    /// Forward a host URL-open to the SDK while a session is pending.
    pub(crate) fn resume_with_url(
        &self,
        url: &Url,
        source_application: Option<&str>,
        annotation: Option<&Value>,
    ) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.sdk.resume_with_url(url, source_application, annotation)
    }

    /// Forward a become-active notification while a session is pending.
    pub(crate) fn application_did_become_active(&self) {
        if self.is_pending() {
            self.sdk.application_did_become_active();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PermissionSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct CountingSdk {
        log_ins: AtomicUsize,
        log_outs: AtomicUsize,
        resumes: AtomicUsize,
        activations: AtomicUsize,
        fail_log_in: bool,
    }

    impl NativeLoginSdk for CountingSdk {
        fn log_in(
            &self,
            _request: NativeLoginRequest,
            _callback: NativeCallback,
        ) -> Result<(), NativeSdkError> {
            self.log_ins.fetch_add(1, Ordering::SeqCst);
            if self.fail_log_in {
                return Err(NativeSdkError::NotInstalled);
            }
            Ok(())
        }

        fn log_out(&self) {
            self.log_outs.fetch_add(1, Ordering::SeqCst);
        }

        fn resume_with_url(
            &self,
            _url: &Url,
            _source: Option<&str>,
            _annotation: Option<&Value>,
        ) -> bool {
            self.resumes.fetch_add(1, Ordering::SeqCst);
            true
        }

        fn application_did_become_active(&self) {
            self.activations.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn request(attempt: AttemptId) -> (NativeLoginRequest, NativeCallback) {
        let (tx, _rx) = mpsc::unbounded_channel();
        (
            NativeLoginRequest {
                attempt,
                permissions: PermissionSet::default_set(),
                connection: "facebook".into(),
            },
            NativeCallback::new(attempt, tx),
        )
    }

    fn url() -> Url {
        Url::parse("fb123://authorize#access_token=abc").unwrap()
    }

    #[test]
    fn test_start_force_closes_previous_session() {
        let sdk = Arc::new(CountingSdk::default());
        let mut bridge = SdkSessionBridge::new(sdk.clone());

        let first = AttemptId::new();
        let (req, cb) = request(first);
        bridge.start(req, cb).unwrap();
        assert_eq!(sdk.log_outs.load(Ordering::SeqCst), 0);

        let second = AttemptId::new();
        let (req, cb) = request(second);
        bridge.start(req, cb).unwrap();
        assert_eq!(sdk.log_outs.load(Ordering::SeqCst), 1);

        assert!(!bridge.resolve(first));
        assert!(bridge.resolve(second));
    }

    #[test]
    fn test_failed_log_in_leaves_nothing_pending() {
        let sdk = Arc::new(CountingSdk {
            fail_log_in: true,
            ..Default::default()
        });
        let mut bridge = SdkSessionBridge::new(sdk);
        let (req, cb) = request(AttemptId::new());

        assert_eq!(bridge.start(req, cb), Err(NativeSdkError::NotInstalled));
        assert!(!bridge.is_pending());
    }

    #[test]
    fn test_resolve_is_one_shot() {
        let sdk = Arc::new(CountingSdk::default());
        let mut bridge = SdkSessionBridge::new(sdk);
        let attempt = AttemptId::new();
        let (req, cb) = request(attempt);
        bridge.start(req, cb).unwrap();

        assert!(bridge.resolve(attempt));
        assert!(!bridge.resolve(attempt));
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let sdk = Arc::new(CountingSdk::default());
        let mut bridge = SdkSessionBridge::new(sdk.clone());
        let attempt = AttemptId::new();
        let (req, cb) = request(attempt);
        bridge.start(req, cb).unwrap();

        assert!(bridge.cancel());
        assert!(!bridge.cancel());
        assert_eq!(sdk.log_outs.load(Ordering::SeqCst), 1);
        assert!(!bridge.resolve(attempt));
    }

    #[test]
    fn test_lifecycle_events_ignored_without_session() {
        let sdk = Arc::new(CountingSdk::default());
        let mut bridge = SdkSessionBridge::new(sdk.clone());

        assert!(!bridge.resume_with_url(&url(), None, None));
        bridge.application_did_become_active();
        assert_eq!(sdk.resumes.load(Ordering::SeqCst), 0);
        assert_eq!(sdk.activations.load(Ordering::SeqCst), 0);

        let (req, cb) = request(AttemptId::new());
        bridge.start(req, cb).unwrap();
        assert!(bridge.resume_with_url(&url(), Some("com.facebook.Facebook"), None));
        bridge.application_did_become_active();
        assert_eq!(sdk.resumes.load(Ordering::SeqCst), 1);
        assert_eq!(sdk.activations.load(Ordering::SeqCst), 1);
    }
}
