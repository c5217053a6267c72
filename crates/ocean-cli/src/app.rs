//! Application state for the terminal client.
//!
//! Wires configuration, the API client and the session manager together and
//! implements each command on top of them.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use ocean_core::models::{Credentials, ProjectCreateRequest, RegisterAccountRequest};
use ocean_core::{ApiClient, Config, Navigator, Route, SessionManager, SessionState};
use tracing::{debug, info, warn};

/// Navigator for a command-line front end: there are no screens, so a
/// navigation only records where the user was sent and prints a hint.
pub struct TerminalNavigator {
    current: Mutex<Route>,
}

impl TerminalNavigator {
    pub fn new(start: Route) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    pub fn current(&self) -> Route {
        self.current.lock().map(|r| *r).unwrap_or(Route::Home)
    }
}

impl Navigator for TerminalNavigator {
    fn current_path(&self) -> String {
        self.current().path().to_string()
    }

    fn navigate(&self, route: Route) {
        debug!(%route, "Navigating");
        let previous = match self.current.lock() {
            Ok(mut current) => std::mem::replace(&mut *current, route),
            Err(_) => return,
        };
        if route == Route::SignIn && previous != Route::SignIn {
            eprintln!("Not signed in. Run `ocean signin` to continue.");
        }
    }
}

pub struct App {
    pub config: Config,
    pub api: ApiClient,
    pub session: SessionManager,
}

impl App {
    /// Load configuration and resolve the stored session.
    ///
    /// `start` is the route the command corresponds to; `keep_alive` runs
    /// the background refresh task.
    pub async fn new(start: Route, keep_alive: bool) -> Result<Self> {
        let config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        };
        debug!(api_domain = config.api_domain(), backend = ?config.token_backend, "Config loaded");

        let api = ApiClient::new(config.api_domain())?;
        let storage = config.token_storage()?;
        let navigator = Arc::new(TerminalNavigator::new(start));

        let mut options = config.session_options();
        options.auto_refresh = keep_alive && options.auto_refresh;

        let session = SessionManager::mount(
            Arc::new(api.clone()),
            storage,
            navigator,
            options,
        )
        .await;
        debug!(state = ?session.state(), "Session resolved");

        Ok(Self {
            config,
            api,
            session,
        })
    }

    pub fn status(&self) {
        match self.session.state() {
            SessionState::LoggedIn => println!("Signed in ({})", self.config.api_domain()),
            SessionState::LoggedOut => println!("Signed out"),
            SessionState::Unknown => println!("Session state unknown"),
        }
    }

    pub async fn sign_in(&mut self, email: Option<String>) -> Result<()> {
        let email = match email.or_else(|| self.config.last_email.clone()) {
            Some(email) => email,
            None => prompt("Email: ")?,
        };
        let password = rpassword::prompt_password("Password: ")?;

        println!("Signing in...");
        if let Err(e) = self.session.login(&Credentials::new(email.clone(), password)).await {
            anyhow::bail!(e.user_message());
        }
        self.remember_email(email);
        println!("Signed in.");
        Ok(())
    }

    pub async fn sign_up(&mut self) -> Result<()> {
        let request = RegisterAccountRequest {
            email: prompt("Email: ")?,
            password: rpassword::prompt_password("Password: ")?,
            firstname: prompt("First name: ")?,
            lastname: prompt("Last name: ")?,
            company: prompt("Company: ")?,
            username: String::new(),
        };

        println!("Creating account...");
        match self.session.sign_up(&request).await {
            Ok(account) => {
                self.remember_email(account.email.clone());
                println!("Welcome, {}!", account.display_name());
                Ok(())
            }
            Err(e) => anyhow::bail!(e.user_message()),
        }
    }

    pub fn sign_out(&self) {
        self.session.logout();
        println!("Signed out.");
    }

    pub async fn list_projects(&self) -> Result<()> {
        let api = self.authorized_api()?;
        let projects = api.fetch_projects().await.map_err(|e| anyhow::anyhow!(e.user_message()))?;

        if projects.is_empty() {
            println!("No projects. Get started with `ocean projects new <name> <description>`.");
            return Ok(());
        }
        for project in projects {
            println!("{:<24} {:<32} {}", project.id, project.name, project.description_display());
        }
        Ok(())
    }

    pub async fn create_project(&self, name: String, description: String) -> Result<()> {
        let request = ProjectCreateRequest::new(name, description);
        if let Err(msg) = request.validate() {
            anyhow::bail!(msg);
        }
        let api = self.authorized_api()?;
        let project = api
            .create_project(&request)
            .await
            .map_err(|e| anyhow::anyhow!(e.user_message()))?;
        info!(id = %project.id, "Project created");
        println!("Created project {} ({})", project.name, project.id);
        Ok(())
    }

    /// Stay in the foreground, refreshing tokens until the session ends.
    pub async fn watch(&self) -> Result<()> {
        if self.session.state() != SessionState::LoggedIn {
            anyhow::bail!("Not signed in");
        }
        println!(
            "Keeping session alive, next refresh in {}s. Press Ctrl-C to stop.",
            self.session.next_refresh_delay().as_secs()
        );

        let mut changes = self.session.subscribe();
        while changes.changed().await.is_ok() {
            let snapshot = changes.borrow_and_update().clone();
            if snapshot.state != SessionState::LoggedIn {
                println!("Session ended.");
                break;
            }
            debug!("Session refreshed");
        }
        Ok(())
    }

    fn authorized_api(&self) -> Result<ApiClient> {
        if self.session.state() != SessionState::LoggedIn {
            anyhow::bail!("Not signed in");
        }
        let token = self
            .session
            .access_token()
            .context("No access token stored")?;
        Ok(self.api.with_token(token))
    }

    fn remember_email(&mut self, email: String) {
        self.config.last_email = Some(email);
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_navigator_tracks_route() {
        let nav = TerminalNavigator::new(Route::Projects);
        assert_eq!(nav.current_path(), "/projects");
        nav.navigate(Route::SignIn);
        assert_eq!(nav.current(), Route::SignIn);
    }
}
