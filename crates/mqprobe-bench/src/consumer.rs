//! Sample collector: receives envelopes, computes end-to-end latency, and
//! optionally verifies/decrypts, feeding every observation into the shared
//! aggregator.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use mqprobe_core::protocol::envelope::Envelope;
use mqprobe_core::secure::{OpenedBody, SecureEnvelope};
use mqprobe_core::stats::{epoch_millis, Stats};
use mqprobe_core::{MqProbeError, Result};

use crate::channel::{Channel, ChannelReceiver};

/// What the consumer expects on inbound envelopes.
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub address: String,
    pub target: u64,
    pub decrypt: bool,
    pub verify: bool,
}

/// Receive-side metrics included in the run report.
#[derive(Debug, Clone, Serialize)]
pub struct ConsumerMetrics {
    pub received_count: u64,
    pub receiver_ready_ms: u64,
    pub per_message_size: usize,
    pub duration_secs: f64,
    pub invalid_signatures: u64,
}

pub struct Consumer {
    settings: ConsumerSettings,
    secure: Arc<SecureEnvelope>,
    stats: Arc<Stats>,
    receiver: Option<Box<dyn ChannelReceiver>>,
    received_count: u64,
    invalid_signatures: u64,
    started: Option<Instant>,
    receiver_ready_ms: u64,
    per_message_size: usize,
    completion: Option<oneshot::Sender<()>>,
}

impl Consumer {
    /// `completion` fires exactly once, when the received count reaches the
    /// target.
    pub fn new(
        settings: ConsumerSettings,
        secure: Arc<SecureEnvelope>,
        stats: Arc<Stats>,
        completion: oneshot::Sender<()>,
    ) -> Self {
        Self {
            settings,
            secure,
            stats,
            receiver: None,
            received_count: 0,
            invalid_signatures: 0,
            started: None,
            receiver_ready_ms: 0,
            per_message_size: 0,
            completion: Some(completion),
        }
    }

    /// Open the receiver. Suspends until the channel signals readiness;
    /// time-to-ready is recorded against the absolute run start.
    pub async fn setup(&mut self, channel: &dyn Channel, run_start: Instant) -> Result<()> {
        let receiver = channel.open_receiver(&self.settings.address).await?;
        self.receiver_ready_ms = run_start.elapsed().as_millis() as u64;
        self.receiver = Some(receiver);
        debug!(ready_ms = self.receiver_ready_ms, "receiver ready");
        Ok(())
    }

    /// Receive until the target count is reached or the channel closes.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            let envelope = match self
                .receiver
                .as_mut()
                .ok_or_else(|| MqProbeError::Internal("consumer not set up".into()))?
                .next_envelope()
                .await
            {
                Some(envelope) => envelope,
                None => break,
            };
            self.on_envelope(envelope);
            if self.received_count >= self.settings.target {
                break;
            }
        }
        Ok(())
    }

    /// Process one inbound envelope. Per-message faults (bad decrypt, bad
    /// signature, missing metadata) are logged and counted; messages are
    /// independent trials and never abort the run.
    pub fn on_envelope(&mut self, envelope: Envelope) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
        let now = epoch_millis();

        if self.per_message_size == 0 {
            self.per_message_size = envelope.encoded_len();
        }

        if let Some(sent) = envelope.sent_time {
            self.stats.record_latency((now - sent) as f64);
        }

        let mut body = envelope.body.to_vec();
        if self.settings.decrypt {
            let begin = Instant::now();
            match self.secure.open(&envelope) {
                Ok(OpenedBody::Decrypted(plain)) => {
                    self.stats
                        .record_decryption_time(begin.elapsed().as_secs_f64() * 1_000.0);
                    body = plain;
                }
                Ok(OpenedBody::PassedThrough(raw)) => {
                    self.stats.note_protocol_warning();
                    warn!(
                        "envelope missing encryption metadata; raw body passed through, \
                         results may be skewed. Ensure the queue is empty before the test."
                    );
                    body = raw;
                }
                Err(e) => {
                    error!(error = %e, "decrypt failed; message counted as received");
                }
            }
        }

        if self.settings.verify {
            if let Some(signature) = &envelope.signature {
                let begin = Instant::now();
                match self.secure.verify(&body, signature) {
                    Ok(true) => {}
                    Ok(false) => {
                        self.invalid_signatures += 1;
                        error!("invalid signature on message");
                    }
                    Err(e) => error!(error = %e, "signature verification unavailable"),
                }
                self.stats
                    .record_signature_time(begin.elapsed().as_secs_f64() * 1_000.0);
            }
        }

        self.received_count += 1;
        self.stats.note_received();

        if self.received_count == self.settings.target {
            if let Some(done) = self.completion.take() {
                let _ = done.send(());
            }
        }
    }

    pub fn received_count(&self) -> u64 {
        self.received_count
    }

    pub fn metrics(&self) -> ConsumerMetrics {
        ConsumerMetrics {
            received_count: self.received_count,
            receiver_ready_ms: self.receiver_ready_ms,
            per_message_size: self.per_message_size,
            duration_secs: self
                .started
                .map(|t| t.elapsed().as_secs_f64())
                .unwrap_or(0.0),
            invalid_signatures: self.invalid_signatures,
        }
    }
}
