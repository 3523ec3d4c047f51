use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use sarv_db::models::panel::Panel;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

mod tests;
pub mod types;

pub use types::{AccountPatch, MarzbanAccount, NewAccount};

const AUTH_TIMEOUT: Duration = Duration::from_secs(10);
const SINGLE_TIMEOUT: Duration = Duration::from_secs(15);
const WRITE_TIMEOUT: Duration = Duration::from_secs(20);
const LIST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum PanelError {
    #[error("Panel authentication failed. Check the panel credentials.")]
    Auth,
    #[error("Account not found on the panel.")]
    NotFound,
    #[error("No inbounds configured for this panel. Configure inbounds through the admin menu first.")]
    NoInbounds,
    #[error("Panel error: {0}")]
    Api(String),
    #[error("Panel request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// Client for one Marzban-compatible panel. The bearer token is obtained
/// lazily and reused; a 401 triggers exactly one re-authentication and retry.
#[derive(Clone)]
pub struct MarzbanClient {
    http: Client,
    base_url: String,
    username: String,
    password: String,
    token: Arc<RwLock<Option<String>>>,
}

impl MarzbanClient {
    pub fn from_panel(panel: &Panel) -> Result<Self, PanelError> {
        if panel.url.is_empty() || panel.username.is_empty() || panel.password.is_empty() {
            return Err(PanelError::Auth);
        }
        if !panel.url.starts_with("http://") && !panel.url.starts_with("https://") {
            return Err(PanelError::Api(format!("Invalid panel URL: {}", panel.url)));
        }
        Ok(Self {
            http: Client::new(),
            base_url: panel.url.trim_end_matches('/').to_string(),
            username: panel.username.clone(),
            password: panel.password.clone(),
            token: Arc::new(RwLock::new(None)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[cfg(test)]
    pub(crate) async fn seed_token(&self, token: &str) {
        *self.token.write().await = Some(token.to_string());
    }

    pub async fn authenticate(&self) -> Result<String, PanelError> {
        let resp = self
            .http
            .post(format!("{}/api/admin/token", self.base_url))
            .form(&[("username", self.username.as_str()), ("password", self.password.as_str())])
            .timeout(AUTH_TIMEOUT)
            .send()
            .await?;

        if !resp.status().is_success() {
            warn!("Panel token request rejected with {}", resp.status());
            return Err(PanelError::Auth);
        }

        let body: TokenResponse = resp.json().await?;
        let token = body.access_token.ok_or(PanelError::Auth)?;
        *self.token.write().await = Some(token.clone());
        info!("Authenticated with panel at {}", self.base_url);
        Ok(token)
    }

    async fn token(&self) -> Result<String, PanelError> {
        if let Some(token) = self.token.read().await.clone() {
            return Ok(token);
        }
        self.authenticate().await
    }

    /// Sends a request, retrying once with a fresh token on 401. The builder
    /// closure is re-invoked per attempt since RequestBuilder is single-use.
    async fn send_authed<F>(&self, build: F) -> Result<reqwest::Response, PanelError>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let token = self.token().await?;
        let resp = build(&token).send().await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }

        let token = self.authenticate().await?;
        let resp = build(&token).send().await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(PanelError::Auth);
        }
        Ok(resp)
    }

    pub async fn get_account(&self, username: &str) -> Result<MarzbanAccount, PanelError> {
        let url = format!("{}/api/user/{}", self.base_url, username);
        let resp = self
            .send_authed(|token| self.http.get(&url).bearer_auth(token).timeout(SINGLE_TIMEOUT))
            .await?;

        match resp.status() {
            StatusCode::NOT_FOUND => Err(PanelError::NotFound),
            s if s.is_success() => Ok(resp.json().await?),
            _ => Err(api_error(resp).await),
        }
    }

    pub async fn list_accounts(&self) -> Result<Vec<MarzbanAccount>, PanelError> {
        let url = format!("{}/api/users", self.base_url);
        let resp = self
            .send_authed(|token| self.http.get(&url).bearer_auth(token).timeout(LIST_TIMEOUT))
            .await?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        let list: types::AccountList = resp.json().await?;
        Ok(list.users)
    }

    pub async fn create_account(&self, account: &NewAccount) -> Result<MarzbanAccount, PanelError> {
        let url = format!("{}/api/user", self.base_url);
        let resp = self
            .send_authed(|token| {
                self.http
                    .post(&url)
                    .bearer_auth(token)
                    .json(account)
                    .timeout(WRITE_TIMEOUT)
            })
            .await?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        Ok(resp.json().await?)
    }

    pub async fn update_account(
        &self,
        username: &str,
        patch: &AccountPatch,
    ) -> Result<MarzbanAccount, PanelError> {
        let url = format!("{}/api/user/{}", self.base_url, username);
        let resp = self
            .send_authed(|token| {
                self.http
                    .put(&url)
                    .bearer_auth(token)
                    .json(patch)
                    .timeout(WRITE_TIMEOUT)
            })
            .await?;

        match resp.status() {
            StatusCode::NOT_FOUND => Err(PanelError::NotFound),
            s if s.is_success() => Ok(resp.json().await?),
            _ => Err(api_error(resp).await),
        }
    }
}

/// Marzban error bodies carry a `detail` field, either a string or a list of
/// {msg} validation objects. That text is what admins need to see, so keep it.
async fn api_error(resp: reqwest::Response) -> PanelError {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();

    let detail = serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|v| match v.get("detail") {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Array(items)) => Some(
                items
                    .iter()
                    .filter_map(|d| d.get("msg").and_then(|m| m.as_str()))
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            _ => None,
        })
        .filter(|s| !s.is_empty());

    match detail {
        Some(d) => PanelError::Api(format!("HTTP {}: {}", status.as_u16(), d)),
        None => PanelError::Api(format!("HTTP {}", status.as_u16())),
    }
}
