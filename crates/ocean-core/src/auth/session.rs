//! Session lifecycle: startup resolution, sign-in, sign-out and keeping the
//! token pair fresh in the background.
//!
//! A `SessionManager` only exists once startup resolution has finished, so
//! every sign-in or sign-out is ordered after it. Clones share one session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ApiError, AuthClient};
use crate::models::{Account, Credentials, RegisterAccountRequest};
use crate::navigation::{self, Navigator, Route};

use super::storage::TokenStorage;
use super::token::{DecodePolicy, TokenCodec};

/// Fallback keep-alive period for tokens without a readable expiry.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(100_000);

/// How long before access token expiry the refresh fires.
pub const DEFAULT_REFRESH_LEAD: Duration = Duration::from_secs(60);

/// Floor for the expiry-derived delay, so an almost-expired token does not
/// cause a tight refresh loop.
pub const MIN_REFRESH_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    /// Startup resolution has not finished, or the session was torn down.
    #[default]
    Unknown,
    LoggedIn,
    LoggedOut,
}

/// What views observe: the state plus the last sign-in failure message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub error: Option<String>,
}

impl SessionSnapshot {
    /// `None` while the state is still unknown.
    pub fn is_logged_in(&self) -> Option<bool> {
        match self.state {
            SessionState::Unknown => None,
            SessionState::LoggedIn => Some(true),
            SessionState::LoggedOut => Some(false),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Run the background refresh task while logged in.
    pub auto_refresh: bool,
    /// Used when the access token carries no decodable expiry.
    pub refresh_interval: Duration,
    pub refresh_lead: Duration,
    pub min_refresh_delay: Duration,
    pub decode_policy: DecodePolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            auto_refresh: true,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            refresh_lead: DEFAULT_REFRESH_LEAD,
            min_refresh_delay: MIN_REFRESH_DELAY,
            decode_policy: DecodePolicy::default(),
        }
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("{0}")]
    Validation(String),

    #[error("Failed to store session: {0}")]
    Storage(String),
}

impl SessionError {
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Api(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}

struct Inner {
    client: Arc<dyn AuthClient>,
    storage: TokenStorage,
    navigator: Arc<dyn Navigator>,
    codec: TokenCodec,
    options: SessionOptions,
    snapshot: watch::Sender<SessionSnapshot>,
    timer: Mutex<Option<JoinHandle<()>>>,
    refresh_lock: tokio::sync::Mutex<()>,
    /// Bumped each time a refresh finishes; lets waiters detect that the
    /// refresh they queued behind already ran.
    refresh_generation: AtomicU64,
    /// Bumped by logout and teardown; a refresh answer that arrives after
    /// the epoch moved is dropped.
    session_epoch: AtomicU64,
}

impl Inner {
    fn cancel_timer(&self) {
        let handle = self.timer.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            debug!("Cancelling refresh timer");
            handle.abort();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Build a session and resolve its startup state.
    ///
    /// 1. A stored, unexpired access token logs in without a request.
    /// 2. Otherwise a stored, unexpired refresh token is exchanged.
    /// 3. Otherwise the session is logged out and, unless the user is
    ///    already on sign-in or sign-up, sent to sign-in.
    pub async fn mount(
        client: Arc<dyn AuthClient>,
        storage: TokenStorage,
        navigator: Arc<dyn Navigator>,
        options: SessionOptions,
    ) -> Self {
        let (snapshot, _) = watch::channel(SessionSnapshot::default());
        let manager = Self {
            inner: Arc::new(Inner {
                client,
                storage,
                navigator,
                codec: TokenCodec::new(options.decode_policy),
                options,
                snapshot,
                timer: Mutex::new(None),
                refresh_lock: tokio::sync::Mutex::new(()),
                refresh_generation: AtomicU64::new(0),
                session_epoch: AtomicU64::new(0),
            }),
        };
        manager.resolve_startup().await;
        manager
    }

    async fn resolve_startup(&self) {
        let stored = match self.inner.storage.load() {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Failed to read stored tokens");
                Default::default()
            }
        };
        let codec = &self.inner.codec;
        debug!(
            has_access = stored.access_token.is_some(),
            has_refresh = stored.refresh_token.is_some(),
            "Resolving session"
        );

        if let Some(access) = stored.access_token.as_deref() {
            if !codec.is_expired(access) {
                info!("Resumed session from stored access token");
                self.set_state(SessionState::LoggedIn);
                self.start_auto_refresh();
                return;
            }
        }

        if let Some(refresh) = stored.refresh_token.as_deref() {
            if !codec.is_expired(refresh) {
                info!("Access token unusable, exchanging refresh token");
                if self.refresh(refresh).await == SessionState::LoggedIn {
                    self.start_auto_refresh();
                }
                return;
            }
        }

        info!("No usable tokens, session logged out");
        self.set_state(SessionState::LoggedOut);
        let current = self.inner.navigator.current_path();
        if !navigation::is_unauthenticated_allowed(&current) {
            self.inner.navigator.navigate(Route::SignIn);
        }
    }

    // ===== Observation =====

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    pub fn state(&self) -> SessionState {
        self.inner.snapshot.borrow().state
    }

    pub fn is_logged_in(&self) -> Option<bool> {
        self.snapshot().is_logged_in()
    }

    /// Message from the last failed sign-in or sign-up, for display.
    pub fn error(&self) -> Option<String> {
        self.inner.snapshot.borrow().error.clone()
    }

    /// Receive every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.snapshot.subscribe()
    }

    /// Currently stored access token, for authorizing API calls.
    pub fn access_token(&self) -> Option<String> {
        match self.inner.storage.access_token() {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Failed to read access token");
                None
            }
        }
    }

    pub fn has_active_timer(&self) -> bool {
        self.inner
            .timer
            .lock()
            .map(|t| t.as_ref().map(|h| !h.is_finished()).unwrap_or(false))
            .unwrap_or(false)
    }

    fn set_state(&self, state: SessionState) {
        self.inner.snapshot.send_modify(|s| s.state = state);
    }

    fn set_error(&self, error: Option<String>) {
        self.inner.snapshot.send_modify(|s| s.error = error);
    }

    // ===== Operations =====

    /// Sign in with one request. On failure both stored tokens are removed,
    /// the state is left as it was and the message is kept in `error()`.
    pub async fn login(&self, credentials: &Credentials) -> Result<(), SessionError> {
        info!(email = %credentials.email, "Signing in");
        let result = match self.inner.client.sign_in(credentials).await {
            Ok(pair) => self
                .inner
                .storage
                .save(&pair)
                .map_err(|e| SessionError::Storage(e.to_string())),
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(()) => {
                self.inner.snapshot.send_modify(|s| {
                    s.state = SessionState::LoggedIn;
                    s.error = None;
                });
                self.start_refresh_timer();
                self.inner.navigator.navigate(Route::Home);
                info!("Signed in");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Sign-in failed");
                if let Err(clear) = self.inner.storage.clear() {
                    warn!(error = %clear, "Failed to clear stored tokens");
                }
                self.set_error(Some(e.user_message()));
                Err(e)
            }
        }
    }

    /// Register an account, then sign in with the same email and password.
    pub async fn sign_up(&self, request: &RegisterAccountRequest) -> Result<Account, SessionError> {
        if let Err(msg) = request.validate() {
            self.set_error(Some(msg.clone()));
            return Err(SessionError::Validation(msg));
        }

        let account = match self.inner.client.register(request).await {
            Ok(account) => account,
            Err(e) => {
                warn!(error = %e, "Registration failed");
                self.set_error(Some(e.user_message()));
                return Err(e.into());
            }
        };
        info!(email = %account.email, "Account registered");

        self.login(&request.credentials()).await?;
        Ok(account)
    }

    /// Stop the refresh timer, drop both tokens and go to sign-in.
    /// Safe to call in any state.
    pub fn logout(&self) {
        self.inner.session_epoch.fetch_add(1, Ordering::SeqCst);
        self.inner.cancel_timer();
        if let Err(e) = self.inner.storage.clear() {
            warn!(error = %e, "Failed to clear stored tokens");
        }
        self.set_state(SessionState::LoggedOut);
        self.inner.navigator.navigate(Route::SignIn);
        info!("Signed out");
    }

    /// Exchange `refresh_token` for a new pair. A failure ends the session
    /// exactly like `logout`; it is never reported as an error message.
    ///
    /// Calls that arrive while another refresh is in flight wait for it and
    /// share its outcome instead of sending a second request. An answer that
    /// arrives after `logout` or `shutdown` is discarded.
    pub async fn refresh(&self, refresh_token: &str) -> SessionState {
        let seen = self.inner.refresh_generation.load(Ordering::SeqCst);
        let _guard = self.inner.refresh_lock.lock().await;
        if self.inner.refresh_generation.load(Ordering::SeqCst) != seen {
            debug!("Joined in-flight refresh");
            return self.state();
        }

        let epoch = self.inner.session_epoch.load(Ordering::SeqCst);
        let result = self.inner.client.refresh(refresh_token).await;
        if self.inner.session_epoch.load(Ordering::SeqCst) != epoch {
            debug!("Session ended during refresh, discarding result");
            self.inner.refresh_generation.fetch_add(1, Ordering::SeqCst);
            return self.state();
        }

        let state = match result {
            Ok(pair) => match self.inner.storage.save(&pair) {
                Ok(()) => {
                    debug!("Token pair refreshed");
                    self.set_state(SessionState::LoggedIn);
                    SessionState::LoggedIn
                }
                Err(e) => {
                    warn!(error = %e, "Failed to store refreshed tokens, signing out");
                    self.logout();
                    SessionState::LoggedOut
                }
            },
            Err(e) => {
                info!(error = %e, "Refresh rejected, signing out");
                self.logout();
                SessionState::LoggedOut
            }
        };
        self.inner.refresh_generation.fetch_add(1, Ordering::SeqCst);
        state
    }

    /// Cancel background work and return to the unknown state.
    pub fn shutdown(&self) {
        self.inner.session_epoch.fetch_add(1, Ordering::SeqCst);
        self.inner.cancel_timer();
        self.inner.snapshot.send_modify(|s| {
            s.state = SessionState::Unknown;
            s.error = None;
        });
        debug!("Session torn down");
    }

    // ===== Refresh scheduling =====

    /// Time until the next refresh: `refresh_lead` ahead of the access
    /// token's expiry, or the fixed interval when the expiry is unreadable.
    pub fn next_refresh_delay(&self) -> Duration {
        let options = &self.inner.options;
        let expiry = self
            .access_token()
            .and_then(|token| self.inner.codec.expires_at(&token));

        match expiry {
            Some(expiry) => {
                let remaining = (expiry - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                remaining
                    .saturating_sub(options.refresh_lead)
                    .max(options.min_refresh_delay)
            }
            None => options.refresh_interval,
        }
    }

    /// Startup only runs the timer when automatic refresh is enabled.
    fn start_auto_refresh(&self) {
        if self.inner.options.auto_refresh {
            self.start_refresh_timer();
        } else {
            debug!("Automatic refresh disabled");
        }
    }

    /// Replace any running timer with a fresh one. Each loop iteration is a
    /// single one-shot deadline, re-armed from the token the last refresh
    /// stored.
    fn start_refresh_timer(&self) {
        let weak = Arc::downgrade(&self.inner);
        let previous = self
            .inner
            .timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(tokio::spawn(run_refresh_timer(weak)));
        if let Some(previous) = previous {
            previous.abort();
        }
        debug!("Refresh timer started");
    }

    async fn tick(&self) -> SessionState {
        let token = match self.inner.storage.refresh_token() {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Failed to read refresh token");
                None
            }
        };
        match token {
            Some(token) => self.refresh(&token).await,
            None => {
                info!("Refresh token missing, signing out");
                self.logout();
                SessionState::LoggedOut
            }
        }
    }
}

async fn run_refresh_timer(weak: Weak<Inner>) {
    loop {
        let Some(inner) = weak.upgrade() else { return };
        let delay = SessionManager { inner }.next_refresh_delay();
        debug!(delay_secs = delay.as_secs(), "Next refresh scheduled");

        tokio::time::sleep(delay).await;

        let Some(inner) = weak.upgrade() else { return };
        if (SessionManager { inner }).tick().await != SessionState::LoggedIn {
            return;
        }
    }
}
