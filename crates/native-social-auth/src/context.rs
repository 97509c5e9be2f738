//! The designated execution context of an orchestrator.
//!
//! One Tokio task per orchestrator owns the session state machine, the SDK
//! bridge, and the active attempt. Everything that mutates them (`start`,
//! `cancel`, native outcomes, lifecycle events, timeouts, exchange results)
//! arrives as a [`ContextEvent`] on one channel and is handled in order, so no
//! two transitions ever run concurrently and no locks are needed.

use crate::bridge::SdkSessionBridge;
use crate::credential::Credential;
use crate::exchange::{ExchangeOptions, TokenExchangeClient};
use crate::registry::ProviderTag;
use crate::sdk::{
    AttemptId, NativeAuthResult, NativeCallback, NativeLoginOutcome, NativeLoginRequest,
    NativeLoginSdk,
};
use crate::session_fsm::{SessionMachine, SessionMachineInput, SessionState};
use crate::{AuthError, AuthResult, PartialGrantPolicy, PermissionSet};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

/// Receives the single outcome of a `start()` call.
pub type AuthCompletion = Box<dyn FnOnce(AuthResult<Credential>) + Send + 'static>;

/// Work delivered to the context task.
pub(crate) enum ContextEvent {
    Start {
        completion: AuthCompletion,
    },
    Cancel,
    Native {
        attempt: AttemptId,
        outcome: NativeLoginOutcome,
    },
    OpenUrl {
        url: Url,
        source_application: Option<String>,
        annotation: Option<Value>,
        reply: oneshot::Sender<bool>,
    },
    BecomeActive,
    CallbackTimeout {
        attempt: AttemptId,
    },
    Exchanged {
        attempt: AttemptId,
        result: AuthResult<Credential>,
    },
}

/// Everything fixed for the lifetime of an orchestrator.
#[derive(Debug, Clone)]
pub(crate) struct AttemptPlan {
    pub provider: ProviderTag,
    pub permissions: PermissionSet,
    pub connection: String,
    pub callback_timeout: Duration,
    pub partial_grant_policy: PartialGrantPolicy,
    pub required_permissions: BTreeSet<String>,
    pub exchange_options: ExchangeOptions,
}

impl AttemptPlan {
    /// Decide whether a native grant may proceed to the exchange.
    ///
    /// Returns `(granted, declined)` on success. A requested permission missing
    /// from the granted list counts as declined. Required permissions only
    /// apply when they were requested.
    fn check_grant(&self, result: &NativeAuthResult) -> AuthResult<(Vec<String>, Vec<String>)> {
        let granted: BTreeSet<String> = result.granted_permissions.iter().cloned().collect();

        let missing: Vec<String> = self
            .permissions
            .iter()
            .map(|p| p.as_str())
            .filter(|p| !granted.contains(*p))
            .map(str::to_string)
            .collect();

        let denied: Vec<String> = match self.partial_grant_policy {
            PartialGrantPolicy::Reject => missing.clone(),
            PartialGrantPolicy::AllowReduced => missing
                .iter()
                .filter(|p| self.required_permissions.contains(*p))
                .cloned()
                .collect(),
        };
        if !denied.is_empty() {
            return Err(AuthError::permission_denied(denied));
        }

        let declined: BTreeSet<String> = result
            .declined_permissions
            .iter()
            .cloned()
            .chain(missing)
            .collect();

        Ok((granted.into_iter().collect(), declined.into_iter().collect()))
    }
}

struct ActiveAttempt {
    id: AttemptId,
    machine: SessionMachine,
    completion: AuthCompletion,
    callback_timer: Option<JoinHandle<()>>,
}

impl ActiveAttempt {
    fn state(&self) -> SessionState {
        SessionState::from(self.machine.state())
    }

    fn disarm_callback_timer(&mut self) {
        if let Some(timer) = self.callback_timer.take() {
            timer.abort();
        }
    }
}

/// State owned by the context task.
pub(crate) struct SessionContext {
    plan: Arc<AttemptPlan>,
    bridge: SdkSessionBridge,
    exchange: Arc<TokenExchangeClient>,
    active: Option<ActiveAttempt>,
    state_tx: watch::Sender<SessionState>,
    events: mpsc::WeakUnboundedSender<ContextEvent>,
}

impl SessionContext {
    /// Spawn the context task. Must be called inside a Tokio runtime.
    ///
    /// The task keeps running while any sender is alive: the handle, a native
    /// callback held by the SDK, an armed timer, or a running exchange.
    pub(crate) fn spawn(
        plan: AttemptPlan,
        sdk: Arc<dyn NativeLoginSdk>,
        exchange: Arc<TokenExchangeClient>,
    ) -> (
        mpsc::UnboundedSender<ContextEvent>,
        watch::Receiver<SessionState>,
    ) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);

        let context = SessionContext {
            plan: Arc::new(plan),
            bridge: SdkSessionBridge::new(sdk),
            exchange,
            active: None,
            state_tx,
            events: events_tx.downgrade(),
        };
        tokio::spawn(context.run(events_rx));

        (events_tx, state_rx)
    }

    async fn run(mut self, mut events: mpsc::UnboundedReceiver<ContextEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event);
        }

        // Every sender is gone, so nothing can resolve the attempt anymore.
        if let Some(active) = self.active.take() {
            warn!(attempt = %active.id, "Context closed with an attempt in flight");
            (active.completion)(Err(AuthError::cancelled()));
        }
        debug!(provider = %self.plan.provider, "Session context stopped");
    }

    fn handle(&mut self, event: ContextEvent) {
        match event {
            ContextEvent::Start { completion } => self.start(completion),
            ContextEvent::Cancel => self.cancel(),
            ContextEvent::Native { attempt, outcome } => self.on_native(attempt, outcome),
            ContextEvent::OpenUrl {
                url,
                source_application,
                annotation,
                reply,
            } => {
                let handled = self.bridge.resume_with_url(
                    &url,
                    source_application.as_deref(),
                    annotation.as_ref(),
                );
                debug!(handled, scheme = url.scheme(), "Forwarded open-URL event");
                let _ = reply.send(handled);
            }
            ContextEvent::BecomeActive => self.bridge.application_did_become_active(),
            ContextEvent::CallbackTimeout { attempt } => self.on_callback_timeout(attempt),
            ContextEvent::Exchanged { attempt, result } => self.on_exchanged(attempt, result),
        }
    }

    fn start(&mut self, completion: AuthCompletion) {
        if let Some(active) = &self.active {
            debug!(attempt = %active.id, "Rejecting start() while an attempt is in flight");
            completion(Err(AuthError::already_in_progress()));
            return;
        }
        let Some(events) = self.events.upgrade() else {
            completion(Err(AuthError::cancelled()));
            return;
        };

        let id = AttemptId::new();
        info!(
            attempt = %id,
            provider = %self.plan.provider,
            connection = %self.plan.connection,
            "Starting authentication attempt"
        );
        self.active = Some(ActiveAttempt {
            id,
            machine: SessionMachine::new(),
            completion,
            callback_timer: None,
        });
        self.transition(SessionMachineInput::Begin);

        let request = NativeLoginRequest {
            attempt: id,
            permissions: self.plan.permissions.clone(),
            connection: self.plan.connection.clone(),
        };
        let callback = NativeCallback::new(id, events.clone());

        match self.bridge.start(request, callback) {
            Ok(()) => {
                self.transition(SessionMachineInput::SdkOpened);
                self.arm_callback_timer(id, events);
            }
            Err(e) => {
                warn!(attempt = %id, "Native SDK could not open a session: {}", e);
                self.finish(SessionMachineInput::SdkOpenFailed, Err(e.into()));
            }
        }
    }

    fn cancel(&mut self) {
        let Some(active) = &self.active else {
            debug!("cancel() with no attempt in flight");
            return;
        };
        info!(attempt = %active.id, state = ?active.state(), "Cancelling attempt");
        self.bridge.cancel();
        self.finish(SessionMachineInput::Cancel, Err(AuthError::cancelled()));
    }

    fn on_native(&mut self, attempt: AttemptId, outcome: NativeLoginOutcome) {
        if !self.is_current(attempt, SessionState::AwaitingExternalCallback)
            || !self.bridge.resolve(attempt)
        {
            debug!(attempt = %attempt, "Discarding stale native outcome");
            return;
        }
        if let Some(active) = self.active.as_mut() {
            active.disarm_callback_timer();
        }

        match outcome {
            NativeLoginOutcome::Cancelled => {
                self.finish(SessionMachineInput::NativeCancelled, Err(AuthError::cancelled()));
            }
            NativeLoginOutcome::Failed(e) => {
                warn!(attempt = %attempt, "Native login failed: {}", e);
                self.finish(SessionMachineInput::NativeFailed, Err(e.into()));
            }
            NativeLoginOutcome::Success(result) => match self.plan.check_grant(&result) {
                Ok((granted, declined)) => {
                    self.transition(SessionMachineInput::NativeSucceeded);
                    self.spawn_exchange(attempt, result, granted, declined);
                }
                Err(e) => {
                    warn!(attempt = %attempt, "Native grant rejected: {}", e);
                    self.finish(SessionMachineInput::GrantRejected, Err(e));
                }
            },
        }
    }

    fn on_callback_timeout(&mut self, attempt: AttemptId) {
        if !self.is_current(attempt, SessionState::AwaitingExternalCallback) {
            return;
        }
        let timeout = self.plan.callback_timeout;
        warn!(
            attempt = %attempt,
            timeout_ms = timeout.as_millis() as u64,
            "Native login timed out"
        );
        if let Some(active) = self.active.as_mut() {
            active.callback_timer = None;
        }
        self.bridge.cancel();
        self.finish(
            SessionMachineInput::CallbackTimedOut,
            Err(AuthError::timeout().with_message(format!(
                "native login did not complete within {}ms",
                timeout.as_millis()
            ))),
        );
    }

    fn on_exchanged(&mut self, attempt: AttemptId, result: AuthResult<Credential>) {
        if !self.is_current(attempt, SessionState::Exchanging) {
            debug!(attempt = %attempt, "Discarding stale exchange result");
            return;
        }
        let input = match &result {
            Ok(_) => SessionMachineInput::ExchangeSucceeded,
            Err(_) => SessionMachineInput::ExchangeFailed,
        };
        self.finish(input, result);
    }

    fn arm_callback_timer(
        &mut self,
        attempt: AttemptId,
        events: mpsc::UnboundedSender<ContextEvent>,
    ) {
        let timeout = self.plan.callback_timeout;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = events.send(ContextEvent::CallbackTimeout { attempt });
        });
        if let Some(active) = self.active.as_mut() {
            active.callback_timer = Some(timer);
        }
    }

    /// Run the exchange off the context and post its result back.
    fn spawn_exchange(
        &mut self,
        attempt: AttemptId,
        native: NativeAuthResult,
        granted: Vec<String>,
        declined: Vec<String>,
    ) {
        let Some(events) = self.events.upgrade() else {
            self.finish(
                SessionMachineInput::ExchangeFailed,
                Err(AuthError::unknown("context closed before the exchange")),
            );
            return;
        };

        let exchange = Arc::clone(&self.exchange);
        let plan = Arc::clone(&self.plan);
        debug!(
            attempt = %attempt,
            native_token_len = native.native_access_token.len(),
            "Dispatching token exchange"
        );

        tokio::spawn(async move {
            let worker = tokio::spawn(async move {
                exchange
                    .exchange_with_options(
                        &native.native_access_token,
                        &granted,
                        &plan.connection,
                        &plan.exchange_options,
                    )
                    .await
            });

            let result = match worker.await {
                Ok(result) => result.map(|mut credential| {
                    credential.declined_permissions = declined;
                    credential
                }),
                Err(e) => Err(AuthError::unknown(format!("exchange worker failed: {}", e))),
            };
            let _ = events.send(ContextEvent::Exchanged { attempt, result });
        });
    }

    fn is_current(&self, attempt: AttemptId, expected: SessionState) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.id == attempt && active.state() == expected)
    }

    /// Apply `input` to the active attempt's machine and publish the new state.
    fn transition(&mut self, input: SessionMachineInput) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        let old_state = active.state();

        if active.machine.consume(&input).is_err() {
            warn!(
                attempt = %active.id,
                state = ?old_state,
                input = ?input,
                "Ignoring invalid session transition"
            );
            return false;
        }

        let new_state = active.state();
        debug!(
            attempt = %active.id,
            old_state = ?old_state,
            state = ?new_state,
            "Session state transition"
        );
        self.state_tx.send_replace(new_state);
        true
    }

    /// Move to a terminal state and deliver the outcome. The only place a
    /// completion is invoked for an accepted attempt.
    fn finish(&mut self, input: SessionMachineInput, result: AuthResult<Credential>) {
        self.transition(input);
        let Some(mut active) = self.active.take() else {
            return;
        };
        active.disarm_callback_timer();

        match &result {
            Ok(credential) => info!(
                attempt = %active.id,
                connection = %credential.connection,
                "Authentication completed"
            ),
            Err(e) => info!(attempt = %active.id, "Authentication ended: {}", e),
        }
        (active.completion)(result);
    }
}
