//! API client for communicating with the Ocean REST API.
//!
//! This module provides the `ApiClient` struct for authentication,
//! account registration and project requests, and the `AuthClient` trait
//! that decouples the session manager from the network.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::models::{
    Account, Credentials, Project, ProjectCreateRequest, RefreshTokenRequest,
    RegisterAccountRequest, TokenPair,
};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Sign-in provider segment used by the credentials flow
const SIGN_IN_PROVIDER: &str = "credentials";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) data requests.
/// Authentication calls are never retried.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Network side of sign-in and token refresh.
///
/// Implementations make exactly one request per call and never retry.
#[async_trait]
pub trait AuthClient: Send + Sync {
    async fn sign_in(&self, credentials: &Credentials) -> Result<TokenPair, ApiError>;

    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApiError>;

    /// Create an account. Does not sign in.
    async fn register(&self, request: &RegisterAccountRequest) -> Result<Account, ApiError>;
}

/// API client for the Ocean platform.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client rooted at `base_url` (e.g. `https://api.example.com`)
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Create a new ApiClient with the given token, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn auth_headers(&self) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref token) = self.token {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ApiError::InvalidResponse("Token is not a valid header value".to_string()))?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    // ===== Authentication =====

    /// Single POST for the auth endpoints. No retry, and 4xx answers are
    /// reported as credential rejections.
    async fn post_auth<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self.client.post(url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_auth_status(status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response from {}: {}", url, e)))
    }

    // ===== Projects =====

    /// Fetch all projects visible to the signed-in account
    pub async fn fetch_projects(&self) -> Result<Vec<Project>, ApiError> {
        self.get(&self.url("projects")).await
    }

    pub async fn create_project(&self, request: &ProjectCreateRequest) -> Result<Project, ApiError> {
        self.post(&self.url("projects"), request).await
    }

    // ===== Plumbing =====

    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, ApiError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        self.send_with_backoff(url, || self.client.get(url)).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send_with_backoff(url, || self.client.post(url).json(body)).await
    }

    async fn send_with_backoff<T, F>(&self, url: &str, build: F) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = build().headers(self.auth_headers()?).send().await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    return response.json().await.map_err(|e| {
                        ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e))
                    });
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }
}

#[async_trait]
impl AuthClient for ApiClient {
    async fn sign_in(&self, credentials: &Credentials) -> Result<TokenPair, ApiError> {
        let url = self.url(&format!("auth/signin/{}", SIGN_IN_PROVIDER));
        debug!(email = %credentials.email, "Signing in");
        self.post_auth(&url, credentials).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
        let url = self.url("auth/refresh");
        debug!("Refreshing token pair");
        self.post_auth(&url, &RefreshTokenRequest { refresh_token }).await
    }

    async fn register(&self, request: &RegisterAccountRequest) -> Result<Account, ApiError> {
        let url = self.url("auth/register");
        debug!(email = %request.email, "Registering account");
        self.post_auth(&url, request).await
    }
}
