//! Demo subcommands.

use crate::output::{self, OutputFormat};
use crate::simulated_sdk::{SimulatedSdk, SimulatedUser};
use native_auth_config::{Config, Paths};
use native_social_auth::{
    facebook, AuthenticationOrchestrator, AuthenticatorRegistry, Credential, LifecycleEventRouter,
    SessionState,
};
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Inputs of the `login` subcommand.
pub struct LoginArgs {
    pub token: String,
    pub permissions: Vec<String>,
    pub connection: Option<String>,
    pub app_id: Option<String>,
    pub via_url: bool,
    pub decline: Vec<String>,
    pub cancel: bool,
}

/// Run one Facebook login against the configured exchange endpoint.
pub async fn login(config: &Config, args: LoginArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let user = SimulatedUser {
        token: args.token.clone(),
        declined: args.decline,
        cancels: args.cancel,
        via_url: args.via_url,
    };
    let sdk = Arc::new(SimulatedSdk::new(user));
    let binding = facebook::binding_from_config(config, sdk, args.app_id.as_deref())?;

    let orchestrator = match (args.permissions.is_empty(), args.connection.as_deref()) {
        (true, None) => AuthenticationOrchestrator::with_default_permissions(binding)?,
        (false, None) => AuthenticationOrchestrator::with_permissions(binding, &args.permissions)?,
        (true, Some(connection)) => {
            AuthenticationOrchestrator::with_default_permissions_for_connection(
                binding, connection,
            )?
        }
        (false, Some(connection)) => AuthenticationOrchestrator::with_permissions_for_connection(
            binding,
            &args.permissions,
            connection,
        )?,
    };
    let orchestrator = Arc::new(orchestrator);

    let mut registry = AuthenticatorRegistry::new();
    registry.register(orchestrator.clone());
    let router = LifecycleEventRouter::new(Arc::new(registry));

    if args.via_url {
        let app_id = args.app_id.as_deref().unwrap_or("0");
        let url = app_switch_url(app_id, &args.token)?;
        let mut states = orchestrator.subscribe_state();

        // Plays the part of the OS handing control back to the host app.
        tokio::spawn(async move {
            let ready = states
                .wait_for(|state| *state == SessionState::AwaitingExternalCallback)
                .await
                .is_ok();
            if ready {
                router.on_become_active();
                let handled = router
                    .on_open_url(&url, Some("com.facebook.Facebook"), None)
                    .await;
                debug!(handled, "Forwarded simulated app switch");
            }
        });
    }

    let credential = orchestrator
        .authenticate()
        .await
        .map_err(|e| anyhow::anyhow!("Login failed: {}", e))?;

    match format {
        OutputFormat::Text => print_credential(&credential),
        OutputFormat::Json => output::print_json(&credential),
    }
    Ok(())
}

/// The `fb<app id>://authorize#access_token=…` URL the provider app opens
/// when it hands control back.
fn app_switch_url(app_id: &str, token: &str) -> Result<Url, url::ParseError> {
    let fragment = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("access_token", token)
        .finish();
    Url::parse(&format!(
        "{}://authorize#{}",
        facebook::url_scheme(app_id),
        fragment
    ))
}

fn print_credential(credential: &Credential) {
    output::print_heading("Login succeeded");
    output::print_row("Identifier", &credential.identifier);
    output::print_row("Connection", &credential.connection);
    output::print_row("Token type", &credential.token_type);
    output::print_row(
        "Access token",
        &format!("{} chars", credential.access_token.len()),
    );
    if let Some(expires_at) = credential.expires_at {
        output::print_row("Expires at", &expires_at.to_rfc3339());
    }
    if let Some(profile) = &credential.profile {
        if let Some(name) = &profile.name {
            output::print_row("Name", name);
        }
        if let Some(email) = &profile.email {
            output::print_row("Email", email);
        }
    }
    output::print_row("Granted", &credential.granted_permissions.join(", "));
    if !credential.declined_permissions.is_empty() {
        output::print_row("Declined", &credential.declined_permissions.join(", "));
    }
}

/// Print the effective configuration.
pub fn show_config(config: &Config, paths: &Paths, format: &OutputFormat) -> anyhow::Result<()> {
    let exchange_url = config.exchange_url()?;

    match format {
        OutputFormat::Json => output::print_json(&serde_json::json!({
            "config_file": paths.config_file(),
            "exchange_url": exchange_url,
            "config": config,
        })),
        OutputFormat::Text => {
            output::print_heading("Configuration");
            output::print_row("Config file", &paths.config_file().display().to_string());
            output::print_row("Exchange URL", exchange_url.as_str());
            output::print_row(
                "Client ID",
                if config.client_id.is_empty() {
                    "(not set)"
                } else {
                    config.client_id.as_str()
                },
            );
            output::print_row("Default connection", &config.default_connection);
            output::print_row(
                "Callback timeout",
                &format!("{}s", config.callback_timeout_secs),
            );
            output::print_row(
                "Exchange timeout",
                &format!("{}ms", config.exchange_timeout_ms),
            );
            output::print_row(
                "Partial grants",
                &format!("{:?}", config.partial_grant_policy),
            );
            output::print_row("Required", &config.required_permissions.join(", "));
            output::print_row("Log level", &config.log_level);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated_sdk::token_from_url;

    #[test]
    fn test_app_switch_url_keeps_reserved_characters() {
        let token = "EAAB&expires=0#frag+x y";
        let url = app_switch_url("123", token).unwrap();

        assert_eq!(url.scheme(), "fb123");
        assert_eq!(token_from_url(&url).as_deref(), Some(token));
    }
}
