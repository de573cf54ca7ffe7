use serde::Deserialize;

/// Configures per-attempt timeout and the default retry delay.
///
/// Deserializable so it can sit inside a host application's own config file;
/// missing fields take their defaults.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    /// Delay before a re-attempt when no wait header applies, in milliseconds.
    pub default_retry_delay_ms: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            default_retry_delay_ms: 1_000,
        }
    }
}

impl ClientOptions {
    /// Reads options from the environment, falling back to defaults.
    ///
    /// - `RETRY_HTTP_TIMEOUT_MS`
    /// - `RETRY_HTTP_DEFAULT_DELAY_MS`
    ///
    /// **Not available on `wasm32` targets.**
    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_env() -> std::result::Result<Self, String> {
        let mut options = Self::default();
        if let Some(value) = env_millis("RETRY_HTTP_TIMEOUT_MS")? {
            options.timeout_ms = value;
        }
        if let Some(value) = env_millis("RETRY_HTTP_DEFAULT_DELAY_MS")? {
            options.default_retry_delay_ms = value;
        }
        Ok(options)
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn env_millis(name: &str) -> std::result::Result<Option<u64>, String> {
    match std::env::var(name) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|err| format!("{name} must be a whole number of milliseconds: {err}")),
        Err(_) => Ok(None),
    }
}
