use std::time::Duration;

/// Default deadline for channel operations (connect, subscribe, unsubscribe).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default deadline for one HTTP exchange.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Holds the runtime options of a [`SepaClient`](crate::SepaClient).
///
/// Everything that describes the broker lives in the
/// [`ApplicationProfile`](crate::profile::ApplicationProfile); these options only tune how the
/// client talks to it.
#[derive(Clone, Debug)]
pub struct ClientOptions {
    /// Deadline for opening the channel and for each subscribe/unsubscribe reply.
    pub channel_timeout: Duration,
    /// Deadline for each HTTP exchange (query, update, registration, token request).
    pub http_timeout: Duration,
    /// Whether the security extension uses `https`/`wss`.
    ///
    /// Only disable this for brokers behind a TLS-terminating proxy on the same host.
    pub use_tls: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            channel_timeout: DEFAULT_TIMEOUT,
            http_timeout: HTTP_TIMEOUT,
            use_tls: true,
        }
    }
}
