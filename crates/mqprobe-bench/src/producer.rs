//! Load generator: emits envelopes as fast as the channel's flow control
//! allows, tracking every unacknowledged delivery until it settles.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, warn};

use mqprobe_core::protocol::envelope::Envelope;
use mqprobe_core::secure::SecureEnvelope;
use mqprobe_core::stats::{epoch_millis, Stats};
use mqprobe_core::{MqProbeError, Result};

use crate::channel::{Channel, ChannelSender, DeliveryOutcome, DeliveryTag};

/// Producer lifecycle. `Draining` means the target count has been sent but
/// terminal outcomes are still outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    Uninitialized,
    Ready,
    Sending,
    Draining,
    Done,
}

/// What the producer sends, and how.
#[derive(Debug, Clone)]
pub struct ProducerSettings {
    pub address: String,
    pub target: u64,
    pub payload: Bytes,
    pub sign: bool,
    pub encrypt: bool,
}

/// Send-side metrics included in the run report.
#[derive(Debug, Clone, Serialize)]
pub struct ProducerMetrics {
    pub sent_count: u64,
    pub per_message_size: usize,
    pub sent_rate: f64,
    pub sender_ready_ms: u64,
    pub duration_secs: f64,
    pub accepted: u64,
    pub rejected: u64,
    pub released: u64,
    pub pending: usize,
}

pub struct Producer {
    settings: ProducerSettings,
    secure: Arc<SecureEnvelope>,
    stats: Arc<Stats>,
    sender: Option<Box<dyn ChannelSender>>,
    pending: HashSet<DeliveryTag>,
    sent_count: u64,
    accepted: u64,
    rejected: u64,
    released: u64,
    state: ProducerState,
    sender_ready_ms: u64,
    started: Option<Instant>,
    per_message_size: usize,
}

impl Producer {
    pub fn new(settings: ProducerSettings, secure: Arc<SecureEnvelope>, stats: Arc<Stats>) -> Self {
        stats.set_payload_size(settings.payload.len() as u64);
        Self {
            settings,
            secure,
            stats,
            sender: None,
            pending: HashSet::new(),
            sent_count: 0,
            accepted: 0,
            rejected: 0,
            released: 0,
            state: ProducerState::Uninitialized,
            sender_ready_ms: 0,
            started: None,
            per_message_size: 0,
        }
    }

    /// Open the sender. Suspends until the channel reports it can accept
    /// traffic; time-to-ready is recorded against the absolute run start.
    pub async fn setup(&mut self, channel: &dyn Channel, run_start: Instant) -> Result<()> {
        let sender = channel.open_sender(&self.settings.address).await?;
        self.sender_ready_ms = run_start.elapsed().as_millis() as u64;
        self.sender = Some(sender);
        self.state = ProducerState::Ready;
        debug!(ready_ms = self.sender_ready_ms, "sender ready");
        Ok(())
    }

    fn build_envelope(&self) -> Result<Envelope> {
        let payload = &self.settings.payload;
        let mut envelope = Envelope::new(payload.clone());
        envelope.sent_time = Some(epoch_millis());

        // sign the plaintext first; the signature travels as metadata and
        // is verified against the decrypted body on the other side
        if self.settings.sign {
            envelope.signature = Some(self.secure.sign(payload)?);
        }
        if self.settings.encrypt {
            let sealed = self.secure.encrypt(payload)?;
            envelope.body = Bytes::from(sealed.ciphertext);
            envelope.encrypted_key = Some(sealed.encrypted_key);
            envelope.iv = Some(sealed.iv);
        }
        Ok(envelope)
    }

    /// Send until the target count is reached or the channel reports no
    /// capacity. Backpressure ends the burst so the caller can yield and
    /// poll again instead of busy-spinning. Returns whether the target has
    /// been reached.
    pub fn send_burst(&mut self) -> Result<bool> {
        if self.sender.is_none() {
            return Err(MqProbeError::Internal("producer not set up".into()));
        }
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
        if self.sent_count < self.settings.target {
            self.state = ProducerState::Sending;
        }

        while self.sent_count < self.settings.target
            && self.sender.as_ref().is_some_and(|s| s.can_send_more())
        {
            let envelope = self.build_envelope()?;
            if self.per_message_size == 0 {
                self.per_message_size = envelope.encoded_len();
            }
            let tag = self
                .sender
                .as_mut()
                .ok_or_else(|| MqProbeError::Internal("sender handle lost".into()))?
                .send(envelope)?;
            if !self.pending.insert(tag) {
                warn!(tag, "channel reused an in-flight delivery tag");
            }
            self.sent_count += 1;
            self.stats.note_sent();
        }

        let done = self.sent_count >= self.settings.target;
        if done {
            self.state = if self.pending.is_empty() {
                ProducerState::Done
            } else {
                ProducerState::Draining
            };
        }
        Ok(done)
    }

    /// Consume every outcome the channel has already settled. Never
    /// suspends; called between bursts.
    pub fn collect_outcomes(&mut self) {
        while let Some((tag, outcome)) = self
            .sender
            .as_mut()
            .and_then(|s| s.try_next_outcome())
        {
            self.handle_outcome(tag, outcome);
        }
    }

    /// Wait until every in-flight delivery has settled. Callers needing the
    /// exact tail must use this, not the send count.
    pub async fn drain(&mut self) -> Result<()> {
        if !self.pending.is_empty() {
            self.state = ProducerState::Draining;
        }
        while !self.pending.is_empty() {
            let sender = self
                .sender
                .as_mut()
                .ok_or_else(|| MqProbeError::Internal("producer not set up".into()))?;
            match sender.next_outcome().await {
                Some((tag, outcome)) => self.handle_outcome(tag, outcome),
                None => return Err(MqProbeError::ChannelClosed),
            }
        }
        self.state = ProducerState::Done;
        Ok(())
    }

    /// Remove the delivery from the pending set exactly once and record the
    /// outcome. Rejection and release are bookkeeping, not failures: this
    /// tool measures what the broker did, it does not retry.
    fn handle_outcome(&mut self, tag: DeliveryTag, outcome: DeliveryOutcome) {
        if !self.pending.remove(&tag) {
            warn!(tag, ?outcome, "duplicate delivery outcome ignored");
            return;
        }
        match outcome {
            DeliveryOutcome::Accepted => self.accepted += 1,
            DeliveryOutcome::Rejected => {
                self.rejected += 1;
                debug!(tag, "delivery rejected");
            }
            DeliveryOutcome::Released => {
                self.released += 1;
                debug!(tag, "delivery released");
            }
        }
        if self.state == ProducerState::Draining && self.pending.is_empty() {
            self.state = ProducerState::Done;
        }
    }

    pub fn state(&self) -> ProducerState {
        self.state
    }

    pub fn sent_count(&self) -> u64 {
        self.sent_count
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn metrics(&self) -> ProducerMetrics {
        let duration_secs = self
            .started
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        let sent_rate = if duration_secs > 0.0 {
            self.sent_count as f64 / duration_secs
        } else {
            0.0
        };
        ProducerMetrics {
            sent_count: self.sent_count,
            per_message_size: self.per_message_size,
            sent_rate,
            sender_ready_ms: self.sender_ready_ms,
            duration_secs,
            accepted: self.accepted,
            rejected: self.rejected,
            released: self.released,
            pending: self.pending.len(),
        }
    }
}
