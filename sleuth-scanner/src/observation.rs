use reqwest::header::HeaderMap;
use std::time::Duration;
use url::Url;

/// One fetched page, handed to the analyzer and then dropped.
#[derive(Debug, Clone)]
pub struct PageObservation {
    pub url: Url,
    pub status_code: u16,
    pub body: String,
    /// Headers returned by the server
    pub headers: HeaderMap,
    /// Headers of the outbound request as the crawler built it
    pub request_headers: HeaderMap,
    pub elapsed: Duration,
}

impl PageObservation {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            status_code: 0,
            body: String::new(),
            headers: HeaderMap::new(),
            request_headers: HeaderMap::new(),
            elapsed: Duration::from_secs(0),
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn with_request_headers(mut self, headers: HeaderMap) -> Self {
        self.request_headers = headers;
        self
    }

    pub fn is_secure(&self) -> bool {
        self.url.scheme() == "https"
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// Pages without a content type are treated as markup
    pub fn is_html(&self) -> bool {
        self.content_type()
            .map(|ct| ct.contains("text/html") || ct.contains("application/xhtml"))
            .unwrap_or(true)
    }
}
