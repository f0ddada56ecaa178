//! GitHub OAuth 2.0 authorization-code flow.
//!
//! Three steps: build an authorization URL carrying a CSRF `state`, exchange
//! the callback `code` for an access token, and fetch the user profile. The
//! profile's numeric `id` is the stable subject id stored on the user record.

use serde::Deserialize;
use url::Url;

use crate::config::GithubConfig;

const GITHUB_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_USER_API_URL: &str = "https://api.github.com/user";

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("failed to parse response: {0}")]
    ParseError(String),

    #[error("GitHub API error: {0}")]
    GitHubError(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubTokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub scope: String,
}

/// Profile from GitHub's `/user` endpoint. `id` is stable across username
/// changes; `login` is the display username.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubUser {
    pub id: i64,
    pub login: String,
}

#[derive(Debug, Deserialize)]
struct GithubErrorResponse {
    error: String,
    error_description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GithubOAuthClient {
    config: GithubConfig,
    http_client: reqwest::Client,
}

impl GithubOAuthClient {
    pub fn new(config: GithubConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    /// Build the authorization URL the user is redirected to. `state` is an
    /// unguessable value verified again on the callback.
    pub fn authorization_url(&self, state: &str) -> String {
        let mut url = Url::parse(GITHUB_AUTHORIZE_URL).expect("invalid authorize URL");

        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", "read:user")
            .append_pair("state", state);

        url.to_string()
    }

    /// Exchange the callback authorization code for an access token.
    pub async fn exchange_code(&self, code: &str) -> Result<GithubTokenResponse, OAuthError> {
        tracing::debug!("exchanging authorization code for access token");

        let response = self
            .http_client
            .post(GITHUB_TOKEN_URL)
            .header("Accept", "application/json")
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ])
            .send()
            .await?;

        let body = response.text().await?;

        // GitHub reports errors as 200s with an error payload
        if let Ok(error_response) = serde_json::from_str::<GithubErrorResponse>(&body) {
            if !error_response.error.is_empty() {
                let message = error_response
                    .error_description
                    .unwrap_or(error_response.error);
                return Err(OAuthError::GitHubError(message));
            }
        }

        serde_json::from_str(&body)
            .map_err(|e| OAuthError::ParseError(format!("failed to parse token response: {e}")))
    }

    /// Fetch the authenticated user's profile.
    pub async fn get_user(&self, access_token: &str) -> Result<GithubUser, OAuthError> {
        tracing::debug!("fetching GitHub user info");

        let response = self
            .http_client
            .get(GITHUB_USER_API_URL)
            .header("Accept", "application/vnd.github+json")
            .header("Authorization", format!("Bearer {access_token}"))
            .header("User-Agent", "microblog")
            .send()
            .await?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OAuthError::GitHubError(format!(
                "failed to get user: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| OAuthError::ParseError(format!("failed to parse user response: {e}")))
    }
}
