//! Fans host lifecycle notifications out to registered authenticators.

use crate::registry::AuthenticatorRegistry;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Entry point for the host application's lifecycle hooks.
///
/// Each authenticator serializes the forwarded event onto its own context, so
/// routing never races an in-flight state transition. Authenticators with no
/// pending session ignore the event.
#[derive(Clone)]
pub struct LifecycleEventRouter {
    registry: Arc<AuthenticatorRegistry>,
}

impl LifecycleEventRouter {
    pub fn new(registry: Arc<AuthenticatorRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &AuthenticatorRegistry {
        &self.registry
    }

    /// Offer a URL opened by the host. Stops at the first authenticator that
    /// consumes it.
    pub async fn on_open_url(
        &self,
        url: &Url,
        source_application: Option<&str>,
        annotation: Option<&Value>,
    ) -> bool {
        for authenticator in self.registry.iter() {
            if authenticator
                .handle_open_url(url, source_application, annotation)
                .await
            {
                debug!(provider = %authenticator.provider(), "Open-URL consumed");
                return true;
            }
        }
        debug!(scheme = url.scheme(), "Open-URL not consumed");
        false
    }

    /// The host application became active.
    pub fn on_become_active(&self) {
        for authenticator in self.registry.iter() {
            authenticator.handle_become_active();
        }
    }
}
