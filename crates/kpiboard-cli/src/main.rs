//! KPIBoard CLI - sign in to the KPIBoard backend from a terminal.
//!
//! Every invocation starts the way the web client does: the stored session
//! is checked once, then the requested command runs against it.

use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kpiboard_core::models::user::display_name_or_placeholder;
use kpiboard_core::{AuthContext, AuthOutcome, Config, Outcome, RegisterCompanyRequest, Route};

// ============================================================================
// Constants
// ============================================================================

/// Directory for a daily log file, in addition to stderr
const ENV_LOG_DIR: &str = "KPIBOARD_LOG_DIR";

const ENV_LOGIN: &str = "KPIBOARD_LOGIN";
const ENV_PASSWORD: &str = "KPIBOARD_PASSWORD";

const USAGE: &str = "\
Usage: kpiboard <command>

Commands:
  status              Show the session and the landing route
  login [LOGIN]       Sign in (password from KPIBOARD_PASSWORD or prompt)
  register <FILE>     Register a company from a JSON file and sign in
  logout              Sign out and forget stored tokens
  whoami              Print the current user as JSON
  open <PATH>         Navigate to a route, e.g. /dashboard
  get <PATH>          Authenticated GET against the API, e.g. /tasks
";

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(ENV_LOG_DIR) {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "kpiboard.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        _ => (None, None),
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

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_tracing();
    info!("kpiboard starting");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        eprint!("{}", USAGE);
        return Ok(());
    };
    if matches!(command, "help" | "-h" | "--help") {
        print!("{}", USAGE);
        return Ok(());
    }

    let config = Config::load().context("Failed to load configuration")?;
    debug!(api = %config.api_base_url, "Configuration loaded");
    let ctx = AuthContext::new(config)?;
    let landing = ctx.start().await?;

    match (command, args.get(1).map(String::as_str)) {
        ("status", _) => status(&ctx, landing),
        ("login", login) => run_login(&ctx, login).await,
        ("register", Some(file)) => run_register(&ctx, Path::new(file)).await,
        ("logout", _) => {
            ctx.session().logout();
            println!("Signed out.");
            Ok(())
        }
        ("whoami", _) => whoami(&ctx),
        ("open", Some(path)) => {
            let route: Route = path.parse()?;
            print_outcome(ctx.visit(route)?);
            Ok(())
        }
        ("get", Some(path)) => {
            let value: serde_json::Value = ctx.session().api().get(path).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        _ => {
            eprint!("{}", USAGE);
            Err(anyhow::anyhow!("Unknown or incomplete command: {}", args.join(" ")))
        }
    }
}

fn status(ctx: &AuthContext, landing: Outcome) -> Result<()> {
    let state = ctx.session().state();
    if state.is_authenticated {
        println!("Signed in as {}", display_name_or_placeholder(state.user.as_ref()));
    } else {
        println!("Not signed in");
    }
    println!("API: {}", ctx.config().api_base_url);
    print_outcome(landing);
    Ok(())
}

fn whoami(ctx: &AuthContext) -> Result<()> {
    match ctx.session().state().user {
        Some(user) => {
            println!("{}", serde_json::to_string_pretty(&user)?);
            Ok(())
        }
        None => Err(anyhow::anyhow!("Not signed in")),
    }
}

fn print_outcome(outcome: Outcome) {
    match outcome {
        Outcome::Loading => println!("Loading..."),
        Outcome::Render { route } => println!("Route: {}", route),
        Outcome::Redirect { to, .. } => println!("Redirect: {}", to),
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

async fn run_login(ctx: &AuthContext, login: Option<&str>) -> Result<()> {
    if ctx.session().state().is_authenticated {
        println!("Already signed in.");
        print_outcome(ctx.visit(Route::Login)?);
        return Ok(());
    }

    let login = match login {
        Some(login) => login.to_string(),
        None => match std::env::var(ENV_LOGIN).ok().or_else(|| ctx.config().last_login.clone()) {
            Some(last) => {
                let input = prompt(&format!("Login [{}]: ", last))?;
                if input.is_empty() { last } else { input }
            }
            None => prompt("Login: ")?,
        },
    };
    let password = match std::env::var(ENV_PASSWORD) {
        Ok(password) => password,
        Err(_) => rpassword::prompt_password("Password: ")?,
    };

    let outcome = ctx.session().login(&login, &password).await;
    report(&outcome)?;

    if let Err(e) = Config::remember_login(&login) {
        warn!(error = %e, "Failed to save config");
    }

    print_outcome(ctx.visit(Route::Dashboard)?);
    Ok(())
}

async fn run_register(ctx: &AuthContext, file: &Path) -> Result<()> {
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let request: RegisterCompanyRequest = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse registration form {}", file.display()))?;

    let outcome = ctx.session().register_company(&request).await;
    report(&outcome)?;

    print_outcome(ctx.visit(Route::Dashboard)?);
    Ok(())
}

/// Print a failed outcome field by field and turn it into an error.
fn report(outcome: &AuthOutcome) -> Result<()> {
    match outcome {
        AuthOutcome::Success => Ok(()),
        AuthOutcome::Failure { message, field_errors } => {
            for (field, msg) in field_errors.iter() {
                eprintln!("  {}: {}", field, msg);
            }
            Err(anyhow::anyhow!("{}", message))
        }
    }
}
