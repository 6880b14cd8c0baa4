//! Requests and responses seen by the cache manager

use bytes::Bytes;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Other(String),
}

impl Method {
    pub fn parse(method: &str) -> Self {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Self::Get,
            "HEAD" => Self::Head,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Other(method) => method,
        }
    }
}

/// What the request is for; `Document` marks a navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    Document,
    Script,
    Style,
    Image,
    Font,
    #[default]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub destination: Destination,
}

impl Request {
    pub fn get(url: impl Into<String>) -> Self {
        Self { method: Method::Get, url: url.into(), destination: Destination::Other }
    }

    pub fn navigate(url: impl Into<String>) -> Self {
        Self { destination: Destination::Document, ..Self::get(url) }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.destination == Destination::Document
    }

    pub fn is_http(&self) -> bool {
        http_url(&self.url).is_some()
    }

    /// Normalised URL the response is stored under
    pub fn cache_key(&self) -> String {
        Url::parse(&self.url).map(String::from).unwrap_or_else(|_| self.url.clone())
    }
}

/// How the response was obtained, as far as cacheability goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    /// Same-origin response
    Basic,
    /// Cross-origin response with readable body
    Cors,
    /// Cross-origin response without CORS; status and body hidden
    Opaque,
    /// Built locally, never fetched
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub response_type: ResponseType,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            status_text: String::new(),
            headers: Vec::new(),
            body: body.into(),
            response_type: ResponseType::Basic,
        }
    }

    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(200, body).with_status_text("OK")
    }

    /// Synthetic answer for a failed fetch that has no cached fallback
    pub fn offline() -> Self {
        Self {
            status: 503,
            status_text: "Service Unavailable".to_string(),
            headers: vec![("Content-Type".to_string(), "text/plain".to_string())],
            body: Bytes::from_static(b"Offline"),
            response_type: ResponseType::Synthetic,
        }
    }

    pub fn with_status_text(mut self, text: impl Into<String>) -> Self {
        self.status_text = text.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    /// 2xx status
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }

    pub fn body_len(&self) -> u64 {
        self.body.len() as u64
    }
}

fn http_url(url: &str) -> Option<Url> {
    Url::parse(url).ok().filter(|url| matches!(url.scheme(), "http" | "https"))
}

/// `scheme://host[:port]` of an absolute http(s) URL, default port omitted
pub fn origin_of(url: &str) -> Option<String> {
    Some(http_url(url)?.origin().ascii_serialization())
}

pub fn is_same_origin(url: &str, origin: &str) -> bool {
    match (http_url(url), http_url(origin)) {
        (Some(left), Some(right)) => left.origin() == right.origin(),
        _ => false,
    }
}

/// Absolute URLs are normalised; anything else is taken relative to the
/// root of `origin`
pub fn resolve_url(origin: &str, url: &str) -> String {
    let root = Url::parse(origin).and_then(|base| base.join("/"));

    match root.and_then(|root| root.join(url)) {
        Ok(resolved) => resolved.into(),
        Err(err) => {
            tracing::warn!(%origin, %url, error = %err, "cannot resolve url");
            url.to_string()
        }
    }
}
