//! Top-level entry point driving one authentication attempt at a time.

use crate::context::{AttemptPlan, AuthCompletion, ContextEvent, SessionContext};
use crate::credential::Credential;
use crate::exchange::{ExchangeOptions, TokenExchangeClient};
use crate::registry::{NativeAuthenticator, ProviderTag};
use crate::sdk::NativeLoginSdk;
use crate::session_fsm::SessionState;
use crate::{
    AuthError, AuthResult, ConnectionDescriptor, PartialGrantPolicy, Permission, PermissionSet,
};
use async_trait::async_trait;
use native_auth_config::Config;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;
use url::Url;

/// Scope sent with every exchange unless overridden.
pub const DEFAULT_SCOPE: &str = "openid";

/// Per-provider behavior knobs.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Bounds the wait for the native SDK.
    pub callback_timeout: Duration,
    pub partial_grant_policy: PartialGrantPolicy,
    /// Permissions that must be granted, when requested.
    pub required_permissions: Vec<String>,
    /// URL scheme owned by the provider. Other schemes are never forwarded.
    pub url_scheme: Option<String>,
    pub scope: Option<String>,
    /// Extra exchange body fields.
    pub parameters: BTreeMap<String, String>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            callback_timeout: Duration::from_secs(
                native_auth_config::DEFAULT_CALLBACK_TIMEOUT_SECS,
            ),
            partial_grant_policy: PartialGrantPolicy::default(),
            required_permissions: vec![crate::permissions::DEFAULT_PERMISSION.to_string()],
            url_scheme: None,
            scope: Some(DEFAULT_SCOPE.to_string()),
            parameters: BTreeMap::new(),
        }
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            callback_timeout: config.callback_timeout(),
            partial_grant_policy: config.partial_grant_policy,
            required_permissions: config.required_permissions.clone(),
            ..Self::default()
        }
    }
}

/// Everything an orchestrator needs to talk to one provider.
#[derive(Clone)]
pub struct ProviderBinding {
    pub tag: ProviderTag,
    /// Connection used when none is named at construction.
    pub default_connection: String,
    pub sdk: Arc<dyn NativeLoginSdk>,
    pub exchange: Arc<TokenExchangeClient>,
    pub settings: OrchestratorSettings,
}

/// Drives native login and token exchange into exactly one outcome per
/// [`start`](Self::start).
///
/// Permissions and connection are fixed at construction. All mutable state
/// lives in a context task spawned by the constructor, so constructors must
/// run inside a Tokio runtime.
pub struct AuthenticationOrchestrator {
    provider: ProviderTag,
    permissions: PermissionSet,
    connection: ConnectionDescriptor,
    resolved_connection: String,
    url_scheme: Option<String>,
    events: mpsc::UnboundedSender<ContextEvent>,
    state: watch::Receiver<SessionState>,
}

impl AuthenticationOrchestrator {
    /// Default permissions on the provider's default connection.
    pub fn with_default_permissions(binding: ProviderBinding) -> AuthResult<Self> {
        Self::build(
            binding,
            PermissionSet::default_set(),
            ConnectionDescriptor::provider_default(),
        )
    }

    /// Explicit permissions on the provider's default connection. An empty
    /// list falls back to the default set.
    pub fn with_permissions<I, S>(binding: ProviderBinding, permissions: I) -> AuthResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::build(
            binding,
            PermissionSet::new(permissions)?,
            ConnectionDescriptor::provider_default(),
        )
    }

    /// Explicit permissions on a named connection.
    pub fn with_permissions_for_connection<I, S>(
        binding: ProviderBinding,
        permissions: I,
        connection: &str,
    ) -> AuthResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::build(
            binding,
            PermissionSet::new(permissions)?,
            ConnectionDescriptor::named(connection)?,
        )
    }

    /// Default permissions on a named connection.
    pub fn with_default_permissions_for_connection(
        binding: ProviderBinding,
        connection: &str,
    ) -> AuthResult<Self> {
        Self::build(
            binding,
            PermissionSet::default_set(),
            ConnectionDescriptor::named(connection)?,
        )
    }

    fn build(
        binding: ProviderBinding,
        permissions: PermissionSet,
        connection: ConnectionDescriptor,
    ) -> AuthResult<Self> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(AuthError::invalid_configuration(
                "orchestrator must be created inside a Tokio runtime",
            ));
        }

        let ProviderBinding {
            tag,
            default_connection,
            sdk,
            exchange,
            settings,
        } = binding;

        let default_connection = default_connection.trim();
        if default_connection.is_empty() {
            return Err(AuthError::invalid_configuration(
                "provider default connection must not be empty",
            ));
        }
        let resolved_connection = connection.resolve(default_connection).to_string();

        let required_permissions: BTreeSet<String> = settings
            .required_permissions
            .iter()
            .map(|p| Permission::new(p).map(String::from))
            .collect::<AuthResult<_>>()?;

        let url_scheme = settings
            .url_scheme
            .as_deref()
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty());

        let plan = AttemptPlan {
            provider: tag.clone(),
            permissions: permissions.clone(),
            connection: resolved_connection.clone(),
            callback_timeout: settings.callback_timeout,
            partial_grant_policy: settings.partial_grant_policy,
            required_permissions,
            exchange_options: ExchangeOptions {
                scope: settings.scope,
                parameters: settings.parameters,
            },
        };

        debug!(
            provider = %tag,
            connection = %resolved_connection,
            permissions = %permissions,
            "Creating authentication orchestrator"
        );
        let (events, state) = SessionContext::spawn(plan, sdk, exchange);

        Ok(Self {
            provider: tag,
            permissions,
            connection,
            resolved_connection,
            url_scheme,
            events,
            state,
        })
    }

    /// Begin an attempt. `completion` fires exactly once, with
    /// `AlreadyInProgress` right away if an attempt is still running.
    pub fn start<F>(&self, completion: F)
    where
        F: FnOnce(AuthResult<Credential>) + Send + 'static,
    {
        let event = ContextEvent::Start {
            completion: Box::new(completion),
        };
        if let Err(mpsc::error::SendError(ContextEvent::Start { completion })) =
            self.events.send(event)
        {
            completion(Err(AuthError::unknown("session context is not running")));
        }
    }

    /// Cancel the running attempt. No-op when nothing is running.
    pub fn cancel(&self) {
        let _ = self.events.send(ContextEvent::Cancel);
    }

    /// Run one attempt and wait for its outcome.
    pub async fn authenticate(&self) -> AuthResult<Credential> {
        let (tx, rx) = oneshot::channel();
        self.start(move |result| {
            let _ = tx.send(result);
        });
        rx.await
            .unwrap_or_else(|_| Err(AuthError::unknown("completion dropped without a result")))
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Observe session state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Host URL-open hook. Returns whether the URL was consumed.
    pub async fn handle_open_url(
        &self,
        url: &Url,
        source_application: Option<&str>,
        annotation: Option<&Value>,
    ) -> bool {
        if let Some(scheme) = &self.url_scheme {
            if url.scheme() != scheme {
                return false;
            }
        }

        let (reply, handled) = oneshot::channel();
        let event = ContextEvent::OpenUrl {
            url: url.clone(),
            source_application: source_application.map(str::to_string),
            annotation: annotation.cloned(),
            reply,
        };
        if self.events.send(event).is_err() {
            return false;
        }
        handled.await.unwrap_or(false)
    }

    /// Host become-active hook.
    pub fn handle_become_active(&self) {
        let _ = self.events.send(ContextEvent::BecomeActive);
    }

    pub fn provider(&self) -> &ProviderTag {
        &self.provider
    }

    pub fn permissions(&self) -> &PermissionSet {
        &self.permissions
    }

    pub fn connection(&self) -> &ConnectionDescriptor {
        &self.connection
    }

    /// Connection name sent to the exchange endpoint.
    pub fn resolved_connection(&self) -> &str {
        &self.resolved_connection
    }
}

#[async_trait]
impl NativeAuthenticator for AuthenticationOrchestrator {
    fn provider(&self) -> &ProviderTag {
        &self.provider
    }

    fn start(&self, completion: AuthCompletion) {
        AuthenticationOrchestrator::start(self, completion);
    }

    fn cancel(&self) {
        AuthenticationOrchestrator::cancel(self);
    }

    async fn handle_open_url(
        &self,
        url: &Url,
        source_application: Option<&str>,
        annotation: Option<&Value>,
    ) -> bool {
        AuthenticationOrchestrator::handle_open_url(self, url, source_application, annotation).await
    }

    fn handle_become_active(&self) {
        AuthenticationOrchestrator::handle_become_active(self);
    }
}
