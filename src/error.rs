use std::fmt;

/// Classification of a failed attempt at the transport level.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TransportErrorKind {
    /// The peer reset the connection (`ECONNRESET`).
    ConnectionReset,
    /// Establishing the connection timed out (`ETIMEDOUT`).
    ConnectTimedOut,
    /// Name resolution failed for a reason other than an unknown host
    /// (`EADDRINFO`).
    AddressInfo,
    /// An established socket stopped responding (`ESOCKETTIMEDOUT`).
    SocketTimedOut,
    /// The resolver does not know the host (`ENOTFOUND`).
    HostNotFound,
    /// The client aborted the attempt because its own timeout elapsed.
    ClientTimeout,
    /// Opaque browser fetch failure, usually a CORS rejection.
    CrossOrigin,
    /// The attempt was aborted for a reason other than a timeout.
    Aborted,
    /// Anything else (refused connections, invalid requests, TLS, ...).
    Other,
}

impl TransportErrorKind {
    /// Whether this kind is one of the transient conditions worth retrying.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::ConnectionReset
                | Self::ConnectTimedOut
                | Self::AddressInfo
                | Self::SocketTimedOut
                | Self::HostNotFound
                | Self::ClientTimeout
                | Self::CrossOrigin
        )
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ConnectionReset => "connection reset",
            Self::ConnectTimedOut => "connect timed out",
            Self::AddressInfo => "address lookup failed",
            Self::SocketTimedOut => "socket timed out",
            Self::HostNotFound => "host not found",
            Self::ClientTimeout => "request timed out",
            Self::CrossOrigin => "cross-origin request failed",
            Self::Aborted => "request aborted",
            Self::Other => "transport error",
        };
        f.write_str(label)
    }
}

/// Error produced by one attempt, before any retry decision is made.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
    #[source]
    source: Option<reqwest::Error>,
}

impl TransportError {
    /// Builds an error of the given kind without an underlying `reqwest` error.
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The `reqwest` error this was classified from, if any.
    pub fn reqwest(&self) -> Option<&reqwest::Error> {
        self.source.as_ref()
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self.kind,
            TransportErrorKind::ClientTimeout
                | TransportErrorKind::ConnectTimedOut
                | TransportErrorKind::SocketTimedOut
        )
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self {
            kind: classify(&err),
            message: err.to_string(),
            source: Some(err),
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn classify(err: &reqwest::Error) -> TransportErrorKind {
    if err.is_connect() {
        if let Some(kind) = chain_messages(err).find_map(|message| classify_resolver(&message)) {
            return kind;
        }
        if err.is_timeout() {
            return TransportErrorKind::ConnectTimedOut;
        }
    }

    // A peer that closes the socket mid-exchange surfaces from hyper without
    // an io error; that is the classic "socket hang up" reset.
    let hung_up = chain(err)
        .find_map(|source| source.downcast_ref::<hyper::Error>())
        .is_some_and(hyper::Error::is_incomplete_message);
    if hung_up {
        return TransportErrorKind::ConnectionReset;
    }

    let io_kind = chain(err)
        .find_map(|source| source.downcast_ref::<std::io::Error>())
        .and_then(|io| classify_io(io.kind()));
    match io_kind {
        Some(TransportErrorKind::SocketTimedOut) if err.is_connect() => {
            TransportErrorKind::ConnectTimedOut
        }
        Some(kind) => kind,
        None if err.is_timeout() => TransportErrorKind::ClientTimeout,
        None => TransportErrorKind::Other,
    }
}

// Fetch hides the reason for network failures from scripts, so anything that
// is not our own timeout is reported the way browsers report CORS rejections.
#[cfg(target_arch = "wasm32")]
fn classify(err: &reqwest::Error) -> TransportErrorKind {
    if err.is_timeout() {
        TransportErrorKind::ClientTimeout
    } else if err.is_request() {
        TransportErrorKind::CrossOrigin
    } else {
        TransportErrorKind::Other
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn chain<'a>(
    err: &'a (dyn std::error::Error + 'static),
) -> impl Iterator<Item = &'a (dyn std::error::Error + 'static)> {
    std::iter::successors(Some(err), |current| current.source())
}

#[cfg(not(target_arch = "wasm32"))]
fn chain_messages<'a>(
    err: &'a (dyn std::error::Error + 'static),
) -> impl Iterator<Item = String> + 'a {
    chain(err).map(|source| source.to_string())
}

#[cfg(not(target_arch = "wasm32"))]
fn classify_io(kind: std::io::ErrorKind) -> Option<TransportErrorKind> {
    match kind {
        std::io::ErrorKind::ConnectionReset => Some(TransportErrorKind::ConnectionReset),
        std::io::ErrorKind::TimedOut => Some(TransportErrorKind::SocketTimedOut),
        std::io::ErrorKind::ConnectionAborted => Some(TransportErrorKind::Aborted),
        _ => None,
    }
}

/// Maps resolver failure text (glibc, macOS, Windows) to a kind.
#[cfg(not(target_arch = "wasm32"))]
fn classify_resolver(message: &str) -> Option<TransportErrorKind> {
    let lower = message.to_ascii_lowercase();
    let unknown_host = [
        "name or service not known",
        "no such host is known",
        "nodename nor servname provided",
        "no address associated with hostname",
    ];
    if unknown_host.iter().any(|needle| lower.contains(needle)) {
        return Some(TransportErrorKind::HostNotFound);
    }
    if lower.contains("dns error") || lower.contains("failed to lookup address") {
        return Some(TransportErrorKind::AddressInfo);
    }
    None
}
