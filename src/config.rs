/// Retry budget and policy for one request.
///
/// Built with the chaining methods below, or converted from a count or a
/// boolean. Each conversion yields a fresh value with `attempts_used = 0`, so
/// installing a configuration on a request always restarts its budget.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RetryConfig {
    max_retries: u32,
    attempts_used: u32,
    retryable_statuses: Vec<u16>,
    wait_header: Option<String>,
}

impl RetryConfig {
    /// Allows up to `max_retries` re-attempts after the first one.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            attempts_used: 0,
            retryable_statuses: Vec::new(),
            wait_header: None,
        }
    }

    /// A single re-attempt; what an argument-less `retry` means.
    pub fn once() -> Self {
        Self::new(1)
    }

    /// Installed but inactive. Requests start out with this.
    pub fn disabled() -> Self {
        Self::new(0)
    }

    /// Extra statuses to retry besides 5xx, typically 429 or 404.
    ///
    /// Only statuses outside 200..=399 take effect. Replaces any earlier list.
    pub fn retry_on(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_statuses = statuses.into_iter().collect();
        self
    }

    /// Response header holding the wait time in seconds (e.g. `Retry-After`).
    pub fn wait_header(mut self, name: impl Into<String>) -> Self {
        self.wait_header = Some(name.into());
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn attempts_used(&self) -> u32 {
        self.attempts_used
    }

    pub fn retryable_statuses(&self) -> &[u16] {
        &self.retryable_statuses
    }

    pub fn wait_header_name(&self) -> Option<&str> {
        self.wait_header.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.max_retries > 0
    }

    pub fn has_budget(&self) -> bool {
        self.attempts_used < self.max_retries
    }

    pub(crate) fn consume_attempt(&mut self) {
        debug_assert!(self.has_budget(), "retry scheduled past the budget");
        self.attempts_used += 1;
    }
}

impl From<u32> for RetryConfig {
    fn from(max_retries: u32) -> Self {
        Self::new(max_retries)
    }
}

impl From<i32> for RetryConfig {
    fn from(max_retries: i32) -> Self {
        Self::new(max_retries.max(0).unsigned_abs())
    }
}

impl From<i64> for RetryConfig {
    fn from(max_retries: i64) -> Self {
        Self::new(u32::try_from(max_retries.max(0)).unwrap_or(u32::MAX))
    }
}

impl From<usize> for RetryConfig {
    fn from(max_retries: usize) -> Self {
        Self::new(u32::try_from(max_retries).unwrap_or(u32::MAX))
    }
}

impl From<bool> for RetryConfig {
    fn from(enabled: bool) -> Self {
        if enabled {
            Self::once()
        } else {
            Self::disabled()
        }
    }
}
