//! Demo host for native social authentication.
//!
//! Plays the role of a mobile app with a single "Login with Facebook" button:
//! a simulated native SDK hands back a token, and the real orchestrator
//! exchanges it with the configured provider.

mod commands;
mod output;
mod simulated_sdk;

use clap::{Parser, Subcommand};
use native_auth_config::{init_logging, parse_level, Config, LogSettings, Paths};
use std::path::PathBuf;

/// Native social authentication demo host.
#[derive(Parser)]
#[command(name = "native-auth-demo")]
#[command(about = "Drive a native social login and token exchange from the terminal")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error); defaults to the configured level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Configuration directory (defaults to ~/.native-auth)
    #[arg(long, global = true, env = "NATIVE_AUTH_HOME")]
    config_dir: Option<PathBuf>,

    /// Also write JSON logs to <config dir>/logs/auth.jsonl
    #[arg(long, global = true)]
    log_file: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with Facebook using a native access token
    Login {
        /// Native access token the simulated SDK hands back
        #[arg(long, env = "NATIVE_AUTH_NATIVE_TOKEN")]
        token: String,

        /// Permissions to request (comma separated); defaults to public_profile
        #[arg(short, long, value_delimiter = ',')]
        permissions: Vec<String>,

        /// Connection name; defaults to the configured connection
        #[arg(short, long)]
        connection: Option<String>,

        /// Facebook app id, used for the fb<app id> URL scheme
        #[arg(long)]
        app_id: Option<String>,

        /// Deliver the SDK result through a forwarded open-URL event
        #[arg(long)]
        via_url: bool,

        /// Permissions the simulated user declines (comma separated)
        #[arg(long, value_delimiter = ',')]
        decline: Vec<String>,

        /// The simulated user dismisses the login dialog
        #[arg(long)]
        cancel: bool,
    },

    /// Show the effective configuration
    Config,
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let paths = match cli.config_dir {
        Some(dir) => Paths::with_base_dir(dir),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;

    init_logging(&LogSettings {
        service_name: "native-auth-demo".into(),
        default_level: parse_level(cli.log_level.as_deref().unwrap_or(&config.log_level)),
        format: config.log_format,
        log_path: cli.log_file.then(|| paths.log_file()),
        also_stderr: true,
    })?;

    match cli.command {
        Commands::Login {
            token,
            permissions,
            connection,
            app_id,
            via_url,
            decline,
            cancel,
        } => {
            let args = commands::LoginArgs {
                token,
                permissions,
                connection,
                app_id,
                via_url,
                decline,
                cancel,
            };
            commands::login(&config, args, &cli.format).await
        }
        Commands::Config => commands::show_config(&config, &paths, &cli.format),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let format = cli.format;

    if let Err(e) = run(cli).await {
        output::print_error(&e.to_string(), &format);
        std::process::exit(1);
    }
}
