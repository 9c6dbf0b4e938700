//! tokenward - command-line client for a token-based authentication service.
//!
//! Logs in, keeps the access/refresh token pair in the configured credential
//! store, and sends authenticated requests that renew the access token when
//! the service reports it expired.

mod cli;
mod format;

use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tokenward_core::api::Method;
use tokenward_core::{Config, CredentialBackend, FileStore, Request, SessionError, SessionManager};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Command};
use format::saved_ago;

/// Log file name prefix when logging to a directory
const LOG_FILE_PREFIX: &str = "tokenward.log";

/// Initialize the tracing subscriber for logging.
/// Logs go to stderr unless `log_dir` is configured; the returned guard must
/// outlive the program for file logs to be flushed.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let (mut config, config_error) = match Config::load() {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };
    if let Some(ref url) = cli.api_url {
        config.api_base_url = url.clone();
    }

    let _guard = init_tracing(config.log_dir.as_deref());
    if let Some(e) = config_error {
        warn!(error = %e, "Failed to load config, using defaults");
    }
    info!(api = %config.api_base_url, backend = ?config.credential_backend, "tokenward starting");

    let result = run(cli.command, &config).await;

    if let Err(ref e) = result {
        if e.downcast_ref::<SessionError>().is_some_and(SessionError::requires_login) {
            eprintln!("Run `tokenward login` to start a new session.");
        }
    }
    result
}

async fn run(command: Command, config: &Config) -> Result<()> {
    let manager = config.session_manager()?;

    match command {
        Command::Register {
            email,
            username,
            password,
        } => {
            let password = password_or_prompt(password)?;
            let summary = manager.register(&email, &username, &password).await?;
            println!("{}", summary.message);
            if let Some(user_id) = summary.user_id {
                println!("User ID: {}", user_id);
            }
        }
        Command::Login {
            identifier,
            password,
        } => {
            let identifier = identifier
                .or_else(|| config.last_identifier.clone())
                .context("No identifier given and none remembered; pass an email or username")?;
            let password = password_or_prompt(password)?;

            manager.login(&identifier, &password).await?;
            println!("Logged in as {}", identifier);

            if let Err(e) = Config::remember_identifier(&identifier) {
                warn!(error = %e, "Failed to save config");
            }
        }
        Command::Logout => {
            manager.logout().await;
            println!("Logged out");
        }
        Command::Whoami => {
            let user = manager.current_user().await?;
            println!("User ID:  {}", user.user_id);
            println!("Email:    {}", user.email);
            println!("Username: {}", user.username);
            println!("Verified: {}", user.verified_display());
        }
        Command::Refresh => {
            manager.refresh().await?;
            println!("Access token refreshed");
        }
        Command::Status => print_status(&manager, config)?,
        Command::Protected => {
            let protected = manager.protected_message().await?;
            println!("{}", protected.message);
        }
        Command::Request { path, method, data } => {
            let method: Method = method
                .to_ascii_uppercase()
                .parse()
                .with_context(|| format!("Invalid HTTP method: {}", method))?;
            let mut request = Request::new(method, path);
            if let Some(data) = data {
                let body: serde_json::Value =
                    serde_json::from_str(&data).context("--data must be valid JSON")?;
                request = request.json(&body)?;
            }

            let response = manager.authenticated_request(request).await?;
            eprintln!("HTTP {}", response.status());
            match serde_json::from_slice::<serde_json::Value>(&response.body) {
                Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
                Err(_) => println!("{}", response.text()),
            }
        }
    }

    Ok(())
}

fn print_status(manager: &SessionManager, config: &Config) -> Result<()> {
    if !manager.is_authenticated() {
        println!("Not logged in");
        return Ok(());
    }

    println!("Logged in (tokens stored, not yet verified with the service)");
    if config.credential_backend == CredentialBackend::File {
        let store = FileStore::new(config.cache_dir()?);
        if let Some(saved_at) = store.saved_at() {
            println!("Tokens saved {}", saved_ago(saved_at));
        }
    }
    Ok(())
}

fn password_or_prompt(password: Option<String>) -> Result<String> {
    match password {
        Some(password) => Ok(password),
        None => rpassword::prompt_password("Password: ").context("Failed to read password"),
    }
}
