use crate::request::is_same_origin;
use crate::{Request, Response, ResponseType};
use async_trait::async_trait;
use std::io::Read;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },
    #[error("failed to read body of {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: std::io::Error,
    },
    #[error("fetch task failed: {0}")]
    Task(String),
}

/// The network, as seen by the cache manager
///
/// Any HTTP status counts as a response; only transport failures are
/// errors.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

/// Blocking HTTP client run on the blocking thread pool
#[derive(Debug, Clone)]
pub struct UreqFetcher {
    agent: ureq::Agent,
    origin: String,
}

impl UreqFetcher {
    /// `origin` decides which responses count as same-origin
    pub fn new(origin: impl Into<String>) -> Self {
        Self::with_timeout(origin, Duration::from_secs(30))
    }

    pub fn with_timeout(origin: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self { agent, origin: origin.into() }
    }
}

#[async_trait]
impl Fetcher for UreqFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let agent = self.agent.clone();
        let method = request.method.as_str().to_string();
        let url = request.url.clone();
        let response_type = if is_same_origin(&url, &self.origin) {
            ResponseType::Basic
        } else {
            ResponseType::Cors
        };

        tokio::task::spawn_blocking(move || fetch_blocking(&agent, &method, &url, response_type))
            .await
            .map_err(|err| FetchError::Task(err.to_string()))?
    }
}

fn fetch_blocking(
    agent: &ureq::Agent,
    method: &str,
    url: &str,
    response_type: ResponseType,
) -> Result<Response, FetchError> {
    let response = match agent.request(method, url).call() {
        Ok(response) => response,
        Err(ureq::Error::Status(_, response)) => response,
        Err(err) => {
            return Err(FetchError::Network { url: url.to_string(), message: err.to_string() })
        }
    };

    let status = response.status();
    let status_text = response.status_text().to_string();
    let headers = response
        .headers_names()
        .into_iter()
        .filter_map(|name| {
            let value = response.header(&name)?.to_string();
            Some((name, value))
        })
        .collect();

    let mut body = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut body)
        .map_err(|source| FetchError::Body { url: url.to_string(), source })?;

    tracing::trace!(url, status, bytes = body.len(), "fetched");

    Ok(Response { status, status_text, headers, body: body.into(), response_type })
}
