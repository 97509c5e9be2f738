//! Facebook presets.

use crate::exchange::TokenExchangeClient;
use crate::orchestrator::{OrchestratorSettings, ProviderBinding};
use crate::registry::ProviderTag;
use crate::sdk::NativeLoginSdk;
use crate::AuthResult;
use native_auth_config::Config;
use std::sync::Arc;

pub const TAG: ProviderTag = ProviderTag::from_static("facebook");

pub const DEFAULT_CONNECTION: &str = "facebook";

pub const DEFAULT_PERMISSION: &str = crate::permissions::DEFAULT_PERMISSION;

/// URL scheme the Facebook SDK registers for an app: `fb<app id>`.
pub fn url_scheme(app_id: &str) -> String {
    format!("fb{}", app_id.trim())
}

/// Binding for the Facebook SDK. With an `app_id`, only `fb<app id>` URLs are
/// forwarded to the SDK.
pub fn binding(
    sdk: Arc<dyn NativeLoginSdk>,
    exchange: Arc<TokenExchangeClient>,
    app_id: Option<&str>,
    mut settings: OrchestratorSettings,
) -> ProviderBinding {
    if let Some(app_id) = app_id {
        settings.url_scheme = Some(url_scheme(app_id));
    }
    ProviderBinding {
        tag: TAG,
        default_connection: DEFAULT_CONNECTION.to_string(),
        sdk,
        exchange,
        settings,
    }
}

/// Binding with exchange client and settings taken from `config`. The
/// configured default connection replaces `facebook` when set.
pub fn binding_from_config(
    config: &Config,
    sdk: Arc<dyn NativeLoginSdk>,
    app_id: Option<&str>,
) -> AuthResult<ProviderBinding> {
    let exchange = Arc::new(TokenExchangeClient::from_config(config)?);
    let mut binding = binding(sdk, exchange, app_id, OrchestratorSettings::from_config(config));
    if !config.default_connection.trim().is_empty() {
        binding.default_connection = config.default_connection.trim().to_string();
    }
    Ok(binding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_scheme() {
        assert_eq!(url_scheme("1234567890"), "fb1234567890");
        assert_eq!(url_scheme(" 42 "), "fb42");
    }

    #[test]
    fn test_tag() {
        assert_eq!(TAG.as_str(), "facebook");
        assert_eq!(DEFAULT_PERMISSION, "public_profile");
    }
}
