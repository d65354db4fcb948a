//! Client for a chain store.
//!
//! Requests are built by chaining path segments onto the configured root and
//! finished with [`Endpoint::call`]:
//!
//! ```rust,no_run
//! # async fn demo() -> Result<(), chainfury::RemoteError> {
//! use chainfury::remote::{Client, ClientConfig, Method};
//!
//! let client = Client::new(ClientConfig::resolve("http://localhost:8000", "my-token")?);
//! let record = client.path("chatbot").path("l6lnksln").call(Method::GET, None).await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod chains;
pub mod error;

use crate::core::NodeValue;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

pub use cache::ClientCache;
pub use chains::{ActionRecord, ChainRecord};
pub use error::RemoteError;
pub use reqwest::Method;

/// Environment variable holding the store's base URL.
pub const URL_ENV: &str = "CF_URL";
/// Environment variable holding the store's API token.
pub const TOKEN_ENV: &str = "CF_TOKEN";

/// Where the store lives and how to authenticate against it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientConfig {
    pub base_url: String,
    pub token: String,
    /// Path prepended to every request (default: `api/v1`)
    pub prefix: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: String::new(),
            prefix: "api/v1".to_string(),
        }
    }
}

impl ClientConfig {
    /// Uses `url` and `token`, falling back to `CF_URL` / `CF_TOKEN` for empty ones.
    pub fn resolve(url: &str, token: &str) -> Result<Self, RemoteError> {
        let base_url = Self::pick(url, URL_ENV)?;
        let token = Self::pick(token, TOKEN_ENV)?;
        Ok(Self {
            base_url,
            token,
            ..Default::default()
        })
    }

    /// Reads everything from the environment.
    pub fn from_env() -> Result<Self, RemoteError> {
        Self::resolve("", "")
    }

    fn pick(explicit: &str, var: &str) -> Result<String, RemoteError> {
        let value = if explicit.is_empty() {
            std::env::var(var).unwrap_or_default()
        } else {
            explicit.to_string()
        };
        if value.is_empty() {
            return Err(RemoteError::Configuration(format!(
                "{} is not set and no value was given",
                var
            )));
        }
        Ok(value)
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Base URL joined with the prefix, without a trailing slash.
    pub fn root_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            base.to_string()
        } else {
            format!("{}/{}", base, prefix)
        }
    }
}

/// Sends one request and returns the decoded body.
///
/// A successful response whose body is not JSON comes back as a JSON string.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        method: Method,
        url: &str,
        token: &str,
        body: Option<&NodeValue>,
    ) -> Result<NodeValue, RemoteError>;
}

/// [`Transport`] over `reqwest`, authenticating with a `token` header.
#[derive(Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        method: Method,
        url: &str,
        token: &str,
        body: Option<&NodeValue>,
    ) -> Result<NodeValue, RemoteError> {
        let mut request = self.client.request(method, url).header("token", token);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(serde_json::from_str(&text).unwrap_or(NodeValue::String(text)))
    }
}

#[derive(Clone)]
pub struct Client {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("root_url", &self.config.root_url())
            .finish_non_exhaustive()
    }
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, Arc::new(HttpTransport::default()))
    }

    pub fn from_env() -> Result<Self, RemoteError> {
        Ok(Self::new(ClientConfig::from_env()?))
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The configured root, before any path segment.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            client: self.clone(),
            url: self.config.root_url(),
        }
    }

    pub fn path(&self, segment: &str) -> Endpoint {
        self.endpoint().path(segment)
    }
}

/// A request under construction.
#[derive(Debug, Clone)]
pub struct Endpoint {
    client: Client,
    url: String,
}

impl Endpoint {
    pub fn path(mut self, segment: &str) -> Self {
        let segment = segment.trim_matches('/');
        if !self.url.ends_with('/') {
            self.url.push('/');
        }
        self.url.push_str(segment);
        self
    }

    /// Collection routes of the store expect `.../name/`.
    pub fn trailing_slash(mut self) -> Self {
        if !self.url.ends_with('/') {
            self.url.push('/');
        }
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn call(
        &self,
        method: Method,
        body: Option<NodeValue>,
    ) -> Result<NodeValue, RemoteError> {
        log::debug!("{} {}", method, self.url);
        self.client
            .transport
            .send(method, &self.url, &self.client.config.token, body.as_ref())
            .await
    }
}
