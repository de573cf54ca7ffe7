//! Per-request completion handling.
//!
//! [`Interceptor`] judges each finished attempt and either asks for another
//! one after a delay or produces the final [`Delivery`]. [`run`] drives it
//! with an attempt closure and the runtime timer.

use std::future::Future;
use std::time::Duration;

use crate::{policy::should_retry, AttemptOutcome, Delivery, RetryConfig, RetryableResponse};

/// Delay used when no wait header applies.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1_000);

/// Where a request is in its retry lifecycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryState {
    /// An attempt is in flight.
    Pending,
    /// A re-attempt is scheduled after `delay`.
    WaitingToRetry { delay: Duration },
    /// The outcome has been handed to the caller.
    Delivered,
}

/// What to do after an attempt completed.
#[derive(Debug)]
pub enum Step<R> {
    /// Re-issue the request once the delay has elapsed.
    Retry(Duration),
    /// Hand this to the caller; no further attempts.
    Deliver(Delivery<R>),
}

/// Retry state machine for a single request.
#[derive(Clone, Debug)]
pub struct Interceptor {
    config: RetryConfig,
    default_delay: Duration,
    state: RetryState,
}

impl Interceptor {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            default_delay: DEFAULT_RETRY_DELAY,
            state: RetryState::Pending,
        }
    }

    /// Overrides the delay used when no wait header applies.
    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Marks a scheduled re-attempt as issued. No effect once delivered.
    pub fn begin_attempt(&mut self) {
        if self.state != RetryState::Delivered {
            self.state = RetryState::Pending;
        }
    }

    /// Judges a completed attempt.
    ///
    /// `Delivered` is terminal: later outcomes are handed straight back
    /// without touching the budget.
    pub fn on_complete<R: RetryableResponse>(&mut self, outcome: AttemptOutcome<R>) -> Step<R> {
        if self.state == RetryState::Delivered {
            return Step::Deliver(self.deliver(outcome));
        }

        if self.config.is_enabled()
            && self.config.has_budget()
            && should_retry(
                outcome.error(),
                outcome.response(),
                self.config.retryable_statuses(),
            )
        {
            self.config.consume_attempt();
            let delay = self.retry_delay(outcome.response());

            #[cfg(feature = "tracing")]
            tracing::debug!(
                attempt = self.config.attempts_used(),
                max_retries = self.config.max_retries(),
                status = ?outcome.response().map(|response| response.status_code()),
                error = ?outcome.error().map(|err| err.kind()),
                "scheduling retry after {} ms",
                delay.as_millis()
            );

            self.state = RetryState::WaitingToRetry { delay };
            return Step::Retry(delay);
        }

        Step::Deliver(self.deliver(outcome))
    }

    /// Finalizes without consulting the policy.
    ///
    /// Used directly for requests that could not be attempted at all.
    pub fn deliver<R>(&mut self, outcome: AttemptOutcome<R>) -> Delivery<R> {
        self.state = RetryState::Delivered;
        let (error, response) = outcome.into_parts();

        #[cfg(feature = "tracing")]
        tracing::trace!(
            retries = self.config.attempts_used(),
            failed = error.is_some(),
            "delivering final outcome"
        );

        Delivery {
            error,
            response,
            retries: self.config.attempts_used(),
            retry_enabled: self.config.is_enabled(),
        }
    }

    fn retry_delay<R: RetryableResponse>(&self, response: Option<&R>) -> Duration {
        let Some(name) = self.config.wait_header_name() else {
            return self.default_delay;
        };
        let Some(value) = response.and_then(|response| response.header_value(name)) else {
            return self.default_delay;
        };

        match parse_wait_seconds(value) {
            Some(delay) => delay,
            None => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    header = name,
                    value,
                    "ignoring malformed wait header, using default delay"
                );
                self.default_delay
            }
        }
    }
}

/// Parses a wait header as a decimal number of seconds.
///
/// Empty, non-numeric, negative, non-finite, and out-of-range values yield
/// `None`.
pub fn parse_wait_seconds(value: &str) -> Option<Duration> {
    let seconds = value.trim().parse::<f64>().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(seconds).ok()
}

/// Runs attempts until the interceptor delivers.
///
/// `attempt` is called once for the original request and once per scheduled
/// retry, never concurrently. Dropping the returned future cancels any
/// pending retry timer along with it.
pub async fn run<R, F, Fut>(mut interceptor: Interceptor, mut attempt: F) -> Delivery<R>
where
    R: RetryableResponse,
    F: FnMut() -> Fut,
    Fut: Future<Output = AttemptOutcome<R>>,
{
    loop {
        let outcome = attempt().await;
        match interceptor.on_complete(outcome) {
            Step::Retry(delay) => {
                sleep(delay).await;
                interceptor.begin_attempt();
            }
            Step::Deliver(delivery) => return delivery,
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
async fn sleep(delay: Duration) {
    tokio::time::sleep(delay).await;
}

// No tokio timer in browser runtimes; go through the global `setTimeout`.
#[cfg(target_arch = "wasm32")]
async fn sleep(delay: Duration) {
    use wasm_bindgen::JsCast;

    let millis = i32::try_from(delay.as_millis()).unwrap_or(i32::MAX);
    let promise = js_sys::Promise::new(&mut |resolve, _reject| {
        let global = js_sys::global();
        let set_timeout = js_sys::Reflect::get(&global, &"setTimeout".into())
            .ok()
            .and_then(|value| value.dyn_into::<js_sys::Function>().ok());
        match set_timeout {
            Some(set_timeout) => {
                let _ = set_timeout.call2(&global, &resolve, &millis.into());
            }
            None => {
                let _ = resolve.call0(&global);
            }
        }
    });
    let _ = wasm_bindgen_futures::JsFuture::from(promise).await;
}
