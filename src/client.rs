use std::fmt;
use std::time::Duration;

use reqwest::{IntoUrl, Method};
use serde::Serialize;

use crate::{
    interceptor::{self, Interceptor},
    AttemptOutcome, ClientOptions, Delivery, HttpResponse, RetryConfig, TransportError,
    TransportErrorKind,
};

/// HTTP client whose requests can carry a retry policy.
#[derive(Clone, Default)]
pub struct RetryClient {
    http: reqwest::Client,
    options: ClientOptions,
}

impl fmt::Debug for RetryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryClient")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl RetryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an already configured `reqwest` client (proxies, TLS, pools).
    pub fn from_reqwest(http: reqwest::Client) -> Self {
        Self {
            http,
            options: ClientOptions::default(),
        }
    }

    /// Creates a client with options read by [`ClientOptions::from_env`].
    ///
    /// **Not available on `wasm32` targets.**
    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_env() -> std::result::Result<Self, String> {
        Ok(Self::new().with_options(ClientOptions::from_env()?))
    }

    /// Applies client options such as timeout and default retry delay.
    pub fn with_options(mut self, opts: ClientOptions) -> Self {
        self.options = opts;
        self
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn get(&self, url: impl IntoUrl) -> RetryRequest {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: impl IntoUrl) -> RetryRequest {
        self.request(Method::POST, url)
    }

    pub fn put(&self, url: impl IntoUrl) -> RetryRequest {
        self.request(Method::PUT, url)
    }

    pub fn delete(&self, url: impl IntoUrl) -> RetryRequest {
        self.request(Method::DELETE, url)
    }

    /// Starts a request. Retrying stays off until one of the `retry*`
    /// methods is called.
    pub fn request(&self, method: Method, url: impl IntoUrl) -> RetryRequest {
        let builder = self
            .http
            .request(method, url)
            .timeout(Duration::from_millis(self.options.timeout_ms));
        RetryRequest {
            http: self.http.clone(),
            builder,
            retry: RetryConfig::disabled(),
            default_delay: Duration::from_millis(self.options.default_retry_delay_ms),
        }
    }
}

/// A request that is sent with its retry policy applied.
#[derive(Debug)]
pub struct RetryRequest {
    http: reqwest::Client,
    builder: reqwest::RequestBuilder,
    retry: RetryConfig,
    default_delay: Duration,
}

impl RetryRequest {
    /// Installs a retry policy, replacing any earlier one and restarting the
    /// budget.
    ///
    /// Accepts a [`RetryConfig`], a count (negative counts disable retrying)
    /// or `true` for a single retry.
    pub fn retry(mut self, config: impl Into<RetryConfig>) -> Self {
        self.retry = config.into();
        self
    }

    /// Same as `retry(true)`.
    pub fn retry_once(self) -> Self {
        self.retry(RetryConfig::once())
    }

    /// Installs a retry policy from its three parts.
    ///
    /// ```no_run
    /// # async fn demo() {
    /// use retry_header_delay::RetryClient;
    ///
    /// let delivery = RetryClient::new()
    ///     .get("https://api.example.com/items")
    ///     .retry_with(5, [429], Some("Retry-After"))
    ///     .send()
    ///     .await;
    /// # let _ = delivery;
    /// # }
    /// ```
    pub fn retry_with(
        self,
        max_retries: impl Into<RetryConfig>,
        retryable_statuses: impl IntoIterator<Item = u16>,
        wait_header: Option<&str>,
    ) -> Self {
        let mut config = max_retries.into().retry_on(retryable_statuses);
        if let Some(name) = wait_header {
            config = config.wait_header(name);
        }
        self.retry(config)
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    pub fn header(self, name: &str, value: &str) -> Self {
        self.map_request(|builder| builder.header(name, value))
    }

    pub fn bearer_auth(self, token: impl fmt::Display) -> Self {
        self.map_request(|builder| builder.bearer_auth(token))
    }

    pub fn body(self, body: impl Into<reqwest::Body>) -> Self {
        self.map_request(|builder| builder.body(body))
    }

    pub fn json<T: Serialize + ?Sized>(self, json: &T) -> Self {
        self.map_request(|builder| builder.json(json))
    }

    /// Per-attempt timeout, overriding [`ClientOptions::timeout_ms`].
    pub fn timeout(self, timeout: Duration) -> Self {
        self.map_request(|builder| builder.timeout(timeout))
    }

    /// Escape hatch for any other `reqwest` builder call.
    pub fn map_request(
        mut self,
        f: impl FnOnce(reqwest::RequestBuilder) -> reqwest::RequestBuilder,
    ) -> Self {
        self.builder = f(self.builder);
        self
    }

    /// Sends the request, re-issuing it as the retry policy allows, and
    /// returns the final outcome.
    pub async fn send(self) -> Delivery<HttpResponse> {
        let Self {
            http,
            builder,
            mut retry,
            default_delay,
        } = self;

        let request = match builder.build() {
            Ok(request) => request,
            Err(err) => return Interceptor::new(retry).deliver(AttemptOutcome::failure(err.into())),
        };

        if retry.is_enabled() && request.try_clone().is_none() {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                url = %request.url(),
                "request body cannot be cloned, sending without retries"
            );
            retry = RetryConfig::disabled();
        }

        let interceptor = Interceptor::new(retry).with_default_delay(default_delay);
        let mut template = Some(request);
        interceptor::run(interceptor, move || {
            // Streaming bodies cannot be cloned; those are only ever sent once.
            let request = template
                .as_ref()
                .and_then(reqwest::Request::try_clone)
                .or_else(|| template.take());
            let http = http.clone();
            async move {
                match request {
                    Some(request) => execute(&http, request).await,
                    None => AttemptOutcome::failure(TransportError::new(
                        TransportErrorKind::Other,
                        "request body was already consumed",
                    )),
                }
            }
        })
        .await
    }
}

async fn execute(http: &reqwest::Client, request: reqwest::Request) -> AttemptOutcome<HttpResponse> {
    let response = match http.execute(request).await {
        Ok(response) => response,
        Err(err) => return AttemptOutcome::failure(err.into()),
    };

    let head = HttpResponse::from_head(&response);
    match response.bytes().await {
        Ok(body) => AttemptOutcome::success(head.with_body(body.to_vec())),
        Err(err) => AttemptOutcome::partial(err.into(), head),
    }
}
