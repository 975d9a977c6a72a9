//! Thin client for the external auth provider, plus the route guard:
//! unauthenticated visitors are sent to sign-in, signed-in visitors skip the
//! landing and sign-in pages.

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use shared::{domain::UserId, error::ApiError};
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("auth request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("auth provider rejected the request: {0}")]
    Provider(String),
    #[error("auth provider returned a malformed body: {0}")]
    MalformedBody(#[source] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub id: UserId,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub user: AuthenticatedUser,
}

#[derive(Debug, Serialize)]
struct ExchangeCodeRequest<'a> {
    grant_type: &'static str,
    auth_code: &'a str,
}

pub struct AuthClient {
    http: Client,
    authorize_url: Url,
    token_url: Url,
    user_url: Url,
    logout_url: Url,
}

impl AuthClient {
    pub fn new(base_url: &Url) -> Result<Self> {
        let base = ensure_trailing_slash(base_url);
        let join = |segment: &str| {
            base.join(segment)
                .with_context(|| format!("invalid auth endpoint '{segment}'"))
        };

        Ok(Self {
            http: Client::new(),
            authorize_url: join("authorize")?,
            token_url: join("token")?,
            user_url: join("user")?,
            logout_url: join("logout")?,
        })
    }

    /// URL the user opens in a browser to start the provider's OAuth flow.
    pub fn authorize_url(&self, provider: &str, redirect_to: &str) -> Url {
        let mut url = self.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("provider", provider)
            .append_pair("redirect_to", redirect_to)
            .finish();
        url
    }

    /// Exchanges the callback code from the OAuth redirect for a session.
    pub async fn exchange_code(&self, code: &str) -> Result<AuthSession, AuthError> {
        debug!("auth: exchanging callback code");
        let mut url = self.token_url.clone();
        url.query_pairs_mut()
            .append_pair("grant_type", "authorization_code")
            .finish();

        let response = self
            .http
            .post(url)
            .json(&ExchangeCodeRequest {
                grant_type: "authorization_code",
                auth_code: code,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(provider_error(response).await);
        }
        response.json().await.map_err(AuthError::MalformedBody)
    }

    /// Resolves the token to its user. `None` means the token is missing,
    /// expired, or revoked; callers treat that as signed out.
    pub async fn current_user(
        &self,
        access_token: &str,
    ) -> Result<Option<AuthenticatedUser>, AuthError> {
        let response = self
            .http
            .get(self.user_url.clone())
            .bearer_auth(access_token)
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            status if status.is_success() => Ok(Some(
                response.json().await.map_err(AuthError::MalformedBody)?,
            )),
            _ => Err(provider_error(response).await),
        }
    }

    pub async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        let response = self
            .http
            .post(self.logout_url.clone())
            .bearer_auth(access_token)
            .send()
            .await?;

        // An already-expired token still counts as signed out.
        match response.status() {
            StatusCode::UNAUTHORIZED => Ok(()),
            status if status.is_success() => Ok(()),
            _ => Err(provider_error(response).await),
        }
    }
}

async fn provider_error(response: reqwest::Response) -> AuthError {
    let status = response.status();
    match response.json::<ApiError>().await {
        Ok(body) => AuthError::Provider(body.message),
        Err(_) => AuthError::Provider(format!("status {status}")),
    }
}

fn ensure_trailing_slash(url: &Url) -> Url {
    let mut url = url.clone();
    if !url.path().ends_with('/') {
        url.set_path(&format!("{}/", url.path()));
    }
    url
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Landing,
    SignIn,
    Dashboard,
    History,
    ReportDetail,
}

impl Route {
    pub fn requires_auth(self) -> bool {
        matches!(self, Self::Dashboard | Self::History | Self::ReportDetail)
    }
}

/// Where a navigation request ends up given the visitor's auth state.
pub fn resolve_route(signed_in: bool, requested: Route) -> Route {
    if !signed_in && requested.requires_auth() {
        Route::SignIn
    } else if signed_in && matches!(requested, Route::SignIn | Route::Landing) {
        Route::Dashboard
    } else {
        requested
    }
}

#[cfg(test)]
#[path = "tests/auth_tests.rs"]
mod tests;
