//! Abstract channel capability consumed by the measurement engine.
//!
//! The wire protocol (connection establishment, framing, TLS, credit
//! accounting) lives behind these traits; the engine only drives them.
//! Event-emitter wiring from broker clients maps onto the async methods
//! here: readiness is the completion of `open_*`, delivery outcomes and
//! inbound messages are pulled as streams of events.

use async_trait::async_trait;
use std::path::PathBuf;

use mqprobe_core::protocol::envelope::Envelope;
use mqprobe_core::Result;

pub mod memory;

/// Identity of one in-flight delivery, unique within a sender.
pub type DeliveryTag = u64;

/// Terminal disposition of a sent envelope. Every delivery yields exactly
/// one of these, eventually.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Accepted,
    Rejected,
    Released,
}

/// Transport-level security selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportSecurity {
    #[default]
    Plain,
    Tls,
}

/// Credentials presented to the broker at connection time.
#[derive(Debug, Clone, Default)]
pub enum Credentials {
    #[default]
    None,
    Password {
        username: String,
        password: String,
    },
    Certificate {
        cert: PathBuf,
        key: PathBuf,
        ca: Option<PathBuf>,
        server_name: Option<String>,
    },
}

/// Connection parameters handed to a [`Connector`]. Pure data; concrete
/// transports interpret it.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub host: String,
    pub port: u16,
    pub transport: TransportSecurity,
    pub credentials: Credentials,
}

/// Establishes transport-level connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection. Suspends until the transport reports the
    /// connection established; fails with `MqProbeError::Connection`.
    async fn open(&self, config: &ChannelConfig) -> Result<std::sync::Arc<dyn Channel>>;
}

/// An open connection to the broker.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Open a sender on the named queue/topic. Suspends until the channel
    /// signals the sender may carry traffic. No timeout is enforced here;
    /// a hung broker hangs setup.
    async fn open_sender(&self, address: &str) -> Result<Box<dyn ChannelSender>>;

    /// Open a receiver on the named queue/topic. Suspends until the channel
    /// signals readiness to receive.
    async fn open_receiver(&self, address: &str) -> Result<Box<dyn ChannelReceiver>>;

    /// Release the connection. Idempotent.
    async fn close(&self);
}

/// Send half of the channel. Exclusively owned by the producer.
#[async_trait]
pub trait ChannelSender: Send {
    /// Flow-control gate: whether the channel currently accepts more sends.
    fn can_send_more(&self) -> bool;

    /// Submit one envelope. Non-blocking; callers poll `can_send_more`
    /// first and treat a closed gate as backpressure, not an error.
    fn send(&mut self, envelope: Envelope) -> Result<DeliveryTag>;

    /// Next terminal delivery outcome; `None` once the channel is closed.
    async fn next_outcome(&mut self) -> Option<(DeliveryTag, DeliveryOutcome)>;

    /// An outcome already queued, if any. Never suspends.
    fn try_next_outcome(&mut self) -> Option<(DeliveryTag, DeliveryOutcome)>;
}

/// Receive half of the channel. Exclusively owned by the consumer.
#[async_trait]
pub trait ChannelReceiver: Send {
    /// Next inbound envelope; `None` once the channel is closed.
    async fn next_envelope(&mut self) -> Option<Envelope>;
}
