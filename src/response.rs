use std::borrow::Cow;

use reqwest::{header::HeaderMap, StatusCode, Url};
use serde::de::DeserializeOwned;

use crate::RetryableResponse;

/// Response with its body already read into memory.
///
/// When reading the body failed, the response is delivered next to the
/// transport error with an empty body.
#[derive(Clone, Debug)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    url: Url,
    body: Vec<u8>,
}

impl HttpResponse {
    pub(crate) fn from_head(response: &reqwest::Response) -> Self {
        Self {
            status: response.status(),
            headers: response.headers().clone(),
            url: response.url().clone(),
            body: Vec::new(),
        }
    }

    pub(crate) fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Final URL of the attempt, after redirects.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

impl RetryableResponse for HttpResponse {
    fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    fn header_value(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}
