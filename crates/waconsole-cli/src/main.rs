//! waconsole - command-line access to the WhatsApp Business admin console API.
//!
//! Logs in, keeps the session alive, and issues authenticated requests using
//! the same session core as the browser console.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use waconsole_core::auth::{Credentials, Registration, RenewalState, SessionState};
use waconsole_core::{SessionConfig, SessionContext};

// ============================================================================
// Constants
// ============================================================================

/// Set to `1` to also write logs to a daily file in the cache directory.
const LOG_FILE_ENV: &str = "WACONSOLE_LOG_FILE";

const EMAIL_ENV: &str = "WACONSOLE_EMAIL";
const PASSWORD_ENV: &str = "WACONSOLE_PASSWORD";

const USAGE: &str = "\
Usage: waconsole <command>

Commands:
  login [email]                     Log in and store the session
  register <name> <email> [org]     Create an account and log in
  logout                            Clear the stored session
  status                            Show session state and token expiry
  get <path>                        GET an API path with the current session
  watch                             Keep the session renewed until Ctrl-C
";

/// Initialize the tracing subscriber for logging
fn init_tracing(log_dir: Option<PathBuf>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "waconsole.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let loaded = SessionConfig::load();
    let log_dir = std::env::var(LOG_FILE_ENV)
        .ok()
        .filter(|v| v == "1")
        .and_then(|_| loaded.as_ref().ok().and_then(|c| c.cache_dir().ok()));
    let _log_guard = init_tracing(log_dir);

    let config = match loaded {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            SessionConfig::default()
        }
    };

    let args: Vec<String> = std::env::args().skip(1).collect();
    let ctx = SessionContext::from_config(config)?;

    match args.first().map(String::as_str) {
        Some("login") => login(&ctx, args.get(1).cloned()).await,
        Some("register") if args.len() >= 3 => {
            register(&ctx, &args[1], &args[2], args.get(3).cloned()).await
        }
        Some("logout") => {
            ctx.coordinator().clear_session();
            println!("Logged out.");
            Ok(())
        }
        Some("status") => {
            status(&ctx);
            Ok(())
        }
        Some("get") if args.len() >= 2 => get(&ctx, &args[1]).await,
        Some("watch") => watch(&ctx).await,
        _ => {
            print!("{}", USAGE);
            Ok(())
        }
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;

    let mut value = String::new();
    io::stdin().read_line(&mut value)?;
    Ok(value.trim().to_string())
}

fn prompt_password() -> Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(password);
    }
    let password = rpassword::prompt_password("Password: ")?;
    Ok(password)
}

/// Remember the email for the next login prompt.
fn remember_email(email: &str) {
    if let Err(e) = SessionConfig::remember_email(email) {
        warn!(error = %e, "Failed to save last email to config");
    }
}

async fn login(ctx: &SessionContext, email: Option<String>) -> Result<()> {
    let email = match email
        .or_else(|| std::env::var(EMAIL_ENV).ok())
        .or_else(|| ctx.config().last_email.clone())
    {
        Some(e) if !e.is_empty() => e,
        _ => prompt("Email")?,
    };
    let password = prompt_password()?;

    println!("Authenticating...");
    let user = ctx
        .coordinator()
        .login(&Credentials::new(email.clone(), password))
        .await
        .context("Login failed")?;

    remember_email(&email);
    match user.and_then(|u| u.name) {
        Some(name) => println!("Logged in as {}.", name),
        None => println!("Logged in as {}.", email),
    }
    Ok(())
}

async fn register(
    ctx: &SessionContext,
    name: &str,
    email: &str,
    organization_name: Option<String>,
) -> Result<()> {
    let password = prompt_password()?;
    let registration = Registration {
        name: name.to_string(),
        email: email.to_string(),
        password,
        organization_name,
    };

    ctx.coordinator()
        .register(&registration)
        .await
        .context("Registration failed")?;

    remember_email(email);
    println!("Account created for {}.", email);
    Ok(())
}

fn status(ctx: &SessionContext) {
    let authenticated = ctx.coordinator().check_auth();
    let status = ctx.coordinator().status();

    let state = match status.state {
        SessionState::Authenticated => "authenticated",
        SessionState::Unauthenticated if authenticated => "access token only (cannot renew)",
        SessionState::Unauthenticated => "not logged in",
    };
    println!("Session:  {}", state);
    if status.renewal == RenewalState::Renewing {
        println!("Renewal:  in progress");
    }
    match status.minutes_until_access_expiry() {
        Some(minutes) => println!("Access:   expires in {}m", minutes),
        None => println!("Access:   none"),
    }
    if let Some(refresh) = status.refresh_expires_at {
        println!("Refresh:  valid until {}", refresh.format("%Y-%m-%d %H:%M UTC"));
    }
}

async fn get(ctx: &SessionContext, path: &str) -> Result<()> {
    let data: serde_json::Value = ctx
        .gateway()
        .get(path)
        .await
        .with_context(|| format!("GET {} failed", path))?;
    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}

async fn watch(ctx: &SessionContext) -> Result<()> {
    if !ctx.coordinator().check_auth() {
        anyhow::bail!("Not logged in. Run `waconsole login` first.");
    }

    let watchdog = ctx.start_watchdog();
    info!("Watching session, press Ctrl-C to stop");
    println!(
        "Keeping session alive (checking every {}s). Press Ctrl-C to stop.",
        ctx.config().watchdog_interval().as_secs()
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    watchdog.shutdown().await;
    println!("Stopped.");
    Ok(())
}
