//! `retry-header-delay` adds a retry policy to `reqwest` requests.
//!
//! After every attempt the policy decides whether to try again, waits either
//! a fixed second or as long as a server-chosen response header says, and
//! hands exactly one final [`Delivery`] back to the caller:
//! - [`RetryRequest::retry`] / [`RetryRequest::retry_with`] install the policy
//! - [`RetryRequest::send`] runs the attempts
//! - [`should_retry`] and [`Interceptor`] are usable with any transport
//!
//! ```no_run
//! use retry_header_delay::{RetryClient, RetryConfig};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let client = RetryClient::new();
//! let response = client
//!     .get("https://api.example.com/items")
//!     .retry(RetryConfig::new(5).retry_on([429]).wait_header("Retry-After"))
//!     .send()
//!     .await
//!     .into_result()?;
//! println!("{}", response.text());
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
pub mod interceptor;
mod options;
mod policy;
mod response;
mod types;

pub use client::{RetryClient, RetryRequest};
pub use config::RetryConfig;
pub use error::{TransportError, TransportErrorKind};
pub use interceptor::{Interceptor, RetryState, Step};
pub use options::ClientOptions;
pub use policy::should_retry;
pub use response::HttpResponse;
pub use types::{AttemptOutcome, Delivery, Failure, RetryableResponse};
