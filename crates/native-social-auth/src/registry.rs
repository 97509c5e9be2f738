//! Provider-independent authenticator capability and its registry.

use crate::context::AuthCompletion;
use crate::AuthError;
use async_trait::async_trait;
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Names an identity provider, e.g. `facebook`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProviderTag(Cow<'static, str>);

impl ProviderTag {
    pub const fn from_static(tag: &'static str) -> Self {
        Self(Cow::Borrowed(tag))
    }

    pub fn new(tag: impl Into<String>) -> Self {
        Self(Cow::Owned(tag.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderTag {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

/// What a host needs from one provider's authenticator.
#[async_trait]
pub trait NativeAuthenticator: Send + Sync {
    fn provider(&self) -> &ProviderTag;

    /// Begin an attempt. `completion` fires exactly once.
    fn start(&self, completion: AuthCompletion);

    /// Cancel the running attempt, if any.
    fn cancel(&self);

    /// Offer a host URL-open. Returns whether it was consumed.
    async fn handle_open_url(
        &self,
        url: &Url,
        source_application: Option<&str>,
        annotation: Option<&Value>,
    ) -> bool;

    fn handle_become_active(&self);
}

/// Authenticators keyed by provider tag, in registration order.
#[derive(Clone, Default)]
pub struct AuthenticatorRegistry {
    authenticators: Vec<Arc<dyn NativeAuthenticator>>,
}

impl AuthenticatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an authenticator, replacing and returning any previous one
    /// with the same tag.
    pub fn register(
        &mut self,
        authenticator: Arc<dyn NativeAuthenticator>,
    ) -> Option<Arc<dyn NativeAuthenticator>> {
        let tag = authenticator.provider().clone();
        debug!(provider = %tag, "Registering authenticator");

        match self
            .authenticators
            .iter_mut()
            .find(|existing| existing.provider() == &tag)
        {
            Some(slot) => Some(std::mem::replace(slot, authenticator)),
            None => {
                self.authenticators.push(authenticator);
                None
            }
        }
    }

    pub fn get(&self, tag: &ProviderTag) -> Option<&Arc<dyn NativeAuthenticator>> {
        self.authenticators
            .iter()
            .find(|authenticator| authenticator.provider() == tag)
    }

    /// Start an attempt on the provider named by `tag`. An unknown tag fails
    /// the completion with `InvalidConfiguration`.
    pub fn start(&self, tag: &ProviderTag, completion: AuthCompletion) {
        match self.get(tag) {
            Some(authenticator) => authenticator.start(completion),
            None => {
                warn!(provider = %tag, "No authenticator registered");
                completion(Err(AuthError::invalid_configuration(format!(
                    "no authenticator registered for provider '{}'",
                    tag
                ))));
            }
        }
    }

    /// Cancel on the provider named by `tag`. Returns whether it exists.
    pub fn cancel(&self, tag: &ProviderTag) -> bool {
        match self.get(tag) {
            Some(authenticator) => {
                authenticator.cancel();
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn NativeAuthenticator>> {
        self.authenticators.iter()
    }

    pub fn tags(&self) -> Vec<ProviderTag> {
        self.iter().map(|a| a.provider().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.authenticators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.authenticators.is_empty()
    }
}
