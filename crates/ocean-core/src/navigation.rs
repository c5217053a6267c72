//! Routes and the navigation seam.
//!
//! The session manager does not know how a front end presents screens.
//! It reports where the user should go through a `Navigator`.

use std::fmt;
use std::sync::Mutex;

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Home,
    SignIn,
    SignUp,
    Projects,
    ProjectCreate,
}

impl Route {
    pub const ALL: [Route; 5] = [
        Route::Home,
        Route::SignIn,
        Route::SignUp,
        Route::Projects,
        Route::ProjectCreate,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Route::Home => "/",
            Route::SignIn => "/signin",
            Route::SignUp => "/signup",
            Route::Projects => "/projects",
            Route::ProjectCreate => "/projects/new",
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.path() == path)
    }

    /// Reachable without a valid session.
    pub fn is_unauthenticated_allowed(&self) -> bool {
        matches!(self, Route::SignIn | Route::SignUp)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// True exactly for the sign-in and sign-up paths.
pub fn is_unauthenticated_allowed(path: &str) -> bool {
    Route::from_path(path)
        .map(|r| r.is_unauthenticated_allowed())
        .unwrap_or(false)
}

pub trait Navigator: Send + Sync {
    /// Path the user is currently on.
    fn current_path(&self) -> String;

    fn navigate(&self, route: Route);
}

/// Navigator that only remembers where it was sent.
pub struct MemoryNavigator {
    state: Mutex<NavState>,
}

struct NavState {
    current: String,
    history: Vec<Route>,
}

impl MemoryNavigator {
    pub fn new(start: &str) -> Self {
        Self {
            state: Mutex::new(NavState {
                current: start.to_string(),
                history: Vec::new(),
            }),
        }
    }

    pub fn at(route: Route) -> Self {
        Self::new(route.path())
    }

    /// Routes navigated to, oldest first.
    pub fn history(&self) -> Vec<Route> {
        self.state
            .lock()
            .map(|s| s.history.clone())
            .unwrap_or_default()
    }
}

impl Navigator for MemoryNavigator {
    fn current_path(&self) -> String {
        self.state
            .lock()
            .map(|s| s.current.clone())
            .unwrap_or_default()
    }

    fn navigate(&self, route: Route) {
        debug!(%route, "Navigating");
        if let Ok(mut state) = self.state.lock() {
            state.current = route.path().to_string();
            state.history.push(route);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthenticated_allowed_set() {
        assert!(is_unauthenticated_allowed("/signin"));
        assert!(is_unauthenticated_allowed("/signup"));
        assert!(!is_unauthenticated_allowed("/"));
        assert!(!is_unauthenticated_allowed("/projects"));
        assert!(!is_unauthenticated_allowed("/login"));
        assert!(!is_unauthenticated_allowed("/signin/"));
    }

    #[test]
    fn test_route_paths_round_trip() {
        for route in Route::ALL {
            assert_eq!(Route::from_path(route.path()), Some(route));
        }
        assert_eq!(Route::from_path("/nope"), None);
    }

    #[test]
    fn test_memory_navigator_records_history() {
        let nav = MemoryNavigator::at(Route::Projects);
        assert_eq!(nav.current_path(), "/projects");

        nav.navigate(Route::SignIn);
        nav.navigate(Route::Home);
        assert_eq!(nav.current_path(), "/");
        assert_eq!(nav.history(), vec![Route::SignIn, Route::Home]);
    }
}
