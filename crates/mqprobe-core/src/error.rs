//! Shared error type across mqprobe crates.

use thiserror::Error;

/// Shared result type.
pub type Result<T> = std::result::Result<T, MqProbeError>;

/// Unified error type used by core and bench.
///
/// Severity is positional, not intrinsic: `Connection`, `Key`, and `Config`
/// only occur during setup and abort the run; `Crypto` occurs per message
/// and is caught at the point of processing. Missing wire metadata is a
/// counted warning, not an error (see `secure::SecureEnvelope::open`).
#[derive(Debug, Error)]
pub enum MqProbeError {
    /// Transport/handshake failure.
    #[error("connection: {0}")]
    Connection(String),
    /// Cryptographic material required by the active configuration is
    /// missing or unreadable.
    #[error("key material: {0}")]
    Key(String),
    /// A cryptographic transform failed on a given message.
    #[error("crypto: {0}")]
    Crypto(String),
    /// Invalid or inconsistent configuration.
    #[error("config: {0}")]
    Config(String),
    /// The channel closed while the run still had work in flight.
    #[error("channel closed")]
    ChannelClosed,
    /// Internal invariant violation.
    #[error("internal: {0}")]
    Internal(String),
}
