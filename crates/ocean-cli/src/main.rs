//! Ocean CLI - a terminal client for the Ocean platform.
//!
//! Signs in and out, keeps a session alive and manages projects. The
//! session itself (stored tokens, expiry and refresh) lives in `ocean-core`.

mod app;

use std::io;

use anyhow::Result;
use ocean_core::Route;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::App;

const USAGE: &str = "\
Usage: ocean <command>

Commands:
  status                               Show whether a session is active
  signin [email]                       Sign in with email and password
  signup                               Create an account and sign in
  signout                              End the session and forget tokens
  projects                             List projects
  projects new <name> <description>    Create a project
  watch                                Keep the session alive until it ends
";

/// Set `OCEAN_LOG_FILE=1` to also write a daily log file to the cache dir.
const LOG_FILE_ENV: &str = "OCEAN_LOG_FILE";

/// Initialize the tracing subscriber for logging.
///
/// The returned guard must stay alive for file logging to flush.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let log_dir = std::env::var(LOG_FILE_ENV)
        .ok()
        .filter(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .and_then(|_| ocean_core::Config::default().cache_dir().ok());

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "ocean.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(fmt::layer().with_ansi(false).with_writer(writer))
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

enum Command {
    Status,
    SignIn(Option<String>),
    SignUp,
    SignOut,
    Projects,
    ProjectCreate { name: String, description: String },
    Watch,
}

impl Command {
    fn parse(args: &[String]) -> Option<Self> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        match args.as_slice() {
            [] | ["status"] => Some(Command::Status),
            ["signin"] => Some(Command::SignIn(None)),
            ["signin", email] => Some(Command::SignIn(Some(email.to_string()))),
            ["signup"] => Some(Command::SignUp),
            ["signout"] => Some(Command::SignOut),
            ["projects"] => Some(Command::Projects),
            ["projects", "new", name, description @ ..] if !description.is_empty() => {
                Some(Command::ProjectCreate {
                    name: name.to_string(),
                    description: description.join(" "),
                })
            }
            ["watch"] => Some(Command::Watch),
            _ => None,
        }
    }

    /// Route the command corresponds to, so a logged-out session only
    /// redirects where a screen would.
    fn route(&self) -> Route {
        match self {
            Command::SignIn(_) | Command::SignOut => Route::SignIn,
            Command::SignUp => Route::SignUp,
            Command::Projects => Route::Projects,
            Command::ProjectCreate { .. } => Route::ProjectCreate,
            Command::Status | Command::Watch => Route::Home,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if matches!(args.first().map(String::as_str), Some("-h" | "--help" | "help")) {
        print!("{}", USAGE);
        return Ok(());
    }
    let Some(command) = Command::parse(&args) else {
        eprint!("{}", USAGE);
        std::process::exit(2);
    };

    let log_guard = init_tracing();
    info!("Ocean CLI starting");

    let keep_alive = matches!(command, Command::Watch);
    let mut app = App::new(command.route(), keep_alive).await?;

    let result = match command {
        Command::Status => {
            app.status();
            Ok(())
        }
        Command::SignIn(email) => app.sign_in(email).await,
        Command::SignUp => app.sign_up().await,
        Command::SignOut => {
            app.sign_out();
            Ok(())
        }
        Command::Projects => app.list_projects().await,
        Command::ProjectCreate { name, description } => app.create_project(name, description).await,
        Command::Watch => app.watch().await,
    };

    app.session.shutdown();
    info!("Ocean CLI shutting down");

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        drop(log_guard);
        std::process::exit(1);
    }
    Ok(())
}
