use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::{Client, Method, Url};
use serde_json::Value;
use thiserror::Error;

const USER_AGENT: &str = concat!("meetup-harvest/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const LOGIN_PATH: &str = "/login";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid url {0}")]
    InvalidUrl(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("non-success status {status} for {url}")]
    Status { status: u16, url: String },
    #[error("session is not authenticated (redirected to {0})")]
    NotAuthenticated(String),
    #[error("unable to decode response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// A loaded page: the final URL after redirects plus its markup.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: Url,
    pub html: String,
}

/// An already-authenticated browsing session on the event platform.
#[async_trait]
pub trait Session: Send + Sync {
    fn base_url(&self) -> &Url;

    async fn navigate(&self, url: &Url) -> Result<Page, SessionError>;

    async fn request(
        &self,
        method: Method,
        url: &Url,
        body: Option<Value>,
    ) -> Result<Value, SessionError>;

    /// Resolves a site-relative path against the session's base URL.
    fn resolve(&self, path: &str) -> Result<Url, SessionError> {
        self.base_url()
            .join(path.trim_start_matches('/'))
            .map_err(|err| SessionError::InvalidUrl(format!("{path}: {err}")))
    }
}

pub struct HttpSession {
    base_url: Url,
    client: Client,
}

impl HttpSession {
    pub fn new(base_url: &str, cookie: Option<&str>) -> Result<Self, SessionError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|err| SessionError::InvalidUrl(format!("{base_url}: {err}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut headers = HeaderMap::new();
        if let Some(cookie) = cookie.map(str::trim).filter(|value| !value.is_empty()) {
            let value = HeaderValue::from_str(cookie)
                .map_err(|err| SessionError::Http(format!("invalid session cookie: {err}")))?;
            headers.insert(COOKIE, value);
        }

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|err| SessionError::Http(err.to_string()))?;

        Ok(Self { base_url, client })
    }

    async fn send(
        &self,
        method: Method,
        url: &Url,
        body: Option<Value>,
    ) -> Result<reqwest::Response, SessionError> {
        tracing::debug!(%method, %url, "session request");
        let mut request = self.client.request(method, url.clone());
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request
            .send()
            .await
            .map_err(|err| SessionError::Http(format!("request failed for {url}: {err}")))?;

        if response.url().path().starts_with(LOGIN_PATH) {
            return Err(SessionError::NotAuthenticated(response.url().to_string()));
        }

        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl Session for HttpSession {
    fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn navigate(&self, url: &Url) -> Result<Page, SessionError> {
        let response = self.send(Method::GET, url, None).await?;
        let final_url = response.url().clone();
        let html = response.text().await.map_err(|err| SessionError::Decode {
            url: url.to_string(),
            reason: err.to_string(),
        })?;
        Ok(Page {
            url: final_url,
            html,
        })
    }

    async fn request(
        &self,
        method: Method,
        url: &Url,
        body: Option<Value>,
    ) -> Result<Value, SessionError> {
        let response = self.send(method, url, body).await?;
        let text = response.text().await.map_err(|err| SessionError::Decode {
            url: url.to_string(),
            reason: err.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|err| SessionError::Decode {
            url: url.to_string(),
            reason: err.to_string(),
        })
    }
}
