//! Repository-hosting REST API client (Gitea-compatible).
//!
//! Only the handful of endpoints sync needs: the authenticated user, repo
//! creation and lookup, and repo search. Calls are blocking; the sync
//! orchestrators run on a worker thread of the caller's choosing.

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::errors::HostingError;
use crate::git::remote_url::derive_ssh_url;
use crate::models::{HostingSession, RemoteDescriptor};
use crate::sync::RemoteHosting;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostingUser {
    pub id: u64,
    pub login: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostingRepo {
    pub id: u64,
    pub name: String,
    pub owner: HostingUser,
    #[serde(default)]
    pub ssh_url: Option<String>,
    #[serde(default)]
    pub private: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<HostingRepo>,
}

/// Blocking client for the hosting service's REST API.
#[derive(Clone)]
pub struct HostingClient {
    http: Client,
    api_url: String,
    private: bool,
}

impl HostingClient {
    pub fn new(api_url: impl Into<String>) -> Result<Self, HostingError> {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("transync/", env!("CARGO_PKG_VERSION"))),
        );
        let http = Client::builder().default_headers(headers).build()?;
        info!(api_url = %api_url, "created HostingClient");
        Ok(Self {
            http,
            api_url,
            private: false,
        })
    }

    /// Create new repositories as private.
    pub fn with_private_repos(mut self, private: bool) -> Self {
        self.private = private;
        self
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Exchange a token for a session describing its user.
    #[instrument(skip(self, token))]
    pub fn authenticate(&self, token: &str) -> Result<HostingSession, HostingError> {
        let url = format!("{}/user", self.api_url);
        let resp = self.http.get(&url).header(AUTHORIZATION, auth_value(token)).send()?;
        let resp = check_response(resp)?;
        let user: HostingUser = parse(resp)?;
        info!(login = %user.login, "authenticated");
        Ok(HostingSession {
            user_id: user.id,
            username: user.login,
            token: token.to_string(),
        })
    }

    #[instrument(skip(self, session))]
    pub fn get_repo(
        &self,
        session: &HostingSession,
        owner: &str,
        name: &str,
    ) -> Result<HostingRepo, HostingError> {
        let url = format!("{}/repos/{}/{}", self.api_url, owner, name);
        let resp = self
            .http
            .get(&url)
            .header(AUTHORIZATION, auth_value(&session.token))
            .send()?;
        let repo: HostingRepo = parse(check_response(resp)?)?;
        debug!(repo = %repo.name, "fetched repository");
        Ok(repo)
    }

    /// Create a repository owned by the session user. `None` when one with
    /// that name already exists.
    #[instrument(skip(self, session))]
    pub fn create_repo(
        &self,
        session: &HostingSession,
        name: &str,
    ) -> Result<Option<HostingRepo>, HostingError> {
        let url = format!("{}/user/repos", self.api_url);
        let payload = serde_json::json!({
            "name": name,
            "private": self.private,
            "auto_init": false,
        });
        let resp = self
            .http
            .post(&url)
            .header(AUTHORIZATION, auth_value(&session.token))
            .json(&payload)
            .send()?;
        if resp.status().as_u16() == 409 {
            debug!(repo_name = name, "repository already exists");
            return Ok(None);
        }
        let repo: HostingRepo = parse(check_response(resp)?)?;
        info!(repo_name = name, private = self.private, "created repository");
        Ok(Some(repo))
    }

    fn descriptor(&self, repo: HostingRepo) -> RemoteDescriptor {
        let ssh_url = repo
            .ssh_url
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| derive_ssh_url(&self.api_url, &repo.owner.login, &repo.name));
        RemoteDescriptor {
            ssh_url,
            owner_name: repo.owner.login,
            repo_name: repo.name,
        }
    }
}

impl RemoteHosting for HostingClient {
    fn find_or_create_repository(
        &self,
        session: &HostingSession,
        document_id: &str,
    ) -> Result<Option<RemoteDescriptor>, HostingError> {
        let repo = match self.create_repo(session, document_id)? {
            Some(repo) => repo,
            None => self.get_repo(session, &session.username, document_id)?,
        };
        Ok(Some(self.descriptor(repo)))
    }

    #[instrument(skip(self, session))]
    fn search_repositories(
        &self,
        session: &HostingSession,
        owner_id: u64,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RemoteDescriptor>, HostingError> {
        let url = format!("{}/repos/search", self.api_url);
        let resp = self
            .http
            .get(&url)
            .header(AUTHORIZATION, auth_value(&session.token))
            .query(&[
                ("q", query.to_string()),
                ("uid", owner_id.to_string()),
                ("limit", limit.to_string()),
            ])
            .send()?;
        let found: SearchResponse = parse(check_response(resp)?)?;
        debug!(count = found.data.len(), query, "searched repositories");
        Ok(found.data.into_iter().map(|r| self.descriptor(r)).collect())
    }
}

fn auth_value(token: &str) -> String {
    format!("token {}", token)
}

fn check_response(resp: Response) -> Result<Response, HostingError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(HostingError::AuthenticationFailed(format!("HTTP {}", status)));
    }
    if status.as_u16() == 429 {
        let reset = resp
            .headers()
            .get("x-ratelimit-reset")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();
        return Err(HostingError::RateLimited { reset_at: reset });
    }
    let body = resp.text().unwrap_or_else(|_| format!("HTTP {}", status));
    Err(HostingError::ApiError {
        status: status.as_u16(),
        body,
    })
}

fn parse<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T, HostingError> {
    let text = resp.text()?;
    serde_json::from_str(&text).map_err(|e| HostingError::ParseError(e.to_string()))
}
