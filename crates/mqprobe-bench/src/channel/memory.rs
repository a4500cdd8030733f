//! In-process loopback channel.
//!
//! Stands in for a broker transport in tests and the self-contained binary:
//! envelopes sent on an address are routed to whichever receiver is open on
//! that address, with a fixed credit window and a configurable outcome
//! policy. Messages sent (or pre-seeded) before a receiver opens are kept
//! in a per-address backlog, which reproduces the "stale queue contents"
//! scenario real deployments hit.
//!
//! Credit model: each send consumes one credit; credit is replenished as
//! the sender's delivery outcomes are consumed, the way broker clients
//! replenish link credit on settlement.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;

use mqprobe_core::protocol::envelope::Envelope;
use mqprobe_core::{MqProbeError, Result};

use super::{
    Channel, ChannelConfig, ChannelReceiver, ChannelSender, Connector, DeliveryOutcome,
    DeliveryTag,
};

const DEFAULT_CREDIT_WINDOW: usize = 256;

/// How the loopback settles each delivery.
#[derive(Debug, Clone, Copy, Default)]
pub enum OutcomePolicy {
    /// Everything is accepted.
    #[default]
    AcceptAll,
    /// Every nth delivery (1-based) is rejected, the rest accepted.
    RejectEveryNth(u64),
    /// Every nth delivery (1-based) is released, the rest accepted.
    ReleaseEveryNth(u64),
}

impl OutcomePolicy {
    fn outcome_for(self, seq: u64) -> DeliveryOutcome {
        match self {
            OutcomePolicy::AcceptAll => DeliveryOutcome::Accepted,
            OutcomePolicy::RejectEveryNth(n) if n > 0 && seq % n == 0 => DeliveryOutcome::Rejected,
            OutcomePolicy::ReleaseEveryNth(n) if n > 0 && seq % n == 0 => {
                DeliveryOutcome::Released
            }
            _ => DeliveryOutcome::Accepted,
        }
    }
}

#[derive(Default)]
struct AddressState {
    tx: Option<mpsc::UnboundedSender<Envelope>>,
    backlog: VecDeque<Envelope>,
}

struct MemoryInner {
    addresses: Mutex<HashMap<String, AddressState>>,
    policy: OutcomePolicy,
    window: usize,
    closed: AtomicBool,
}

impl MemoryInner {
    fn addresses(&self) -> MutexGuard<'_, HashMap<String, AddressState>> {
        match self.addresses.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn deliver(&self, address: &str, envelope: Envelope) {
        let mut addresses = self.addresses();
        let state = addresses.entry(address.to_string()).or_default();
        match &state.tx {
            Some(tx) => {
                if let Err(returned) = tx.send(envelope) {
                    state.backlog.push_back(returned.0);
                }
            }
            None => state.backlog.push_back(envelope),
        }
    }
}

/// In-process channel; cloning shares the underlying address space.
#[derive(Clone)]
pub struct MemoryChannel {
    inner: Arc<MemoryInner>,
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryChannel {
    /// Loopback with the default credit window, accepting every delivery.
    pub fn new() -> Self {
        Self::with_options(DEFAULT_CREDIT_WINDOW, OutcomePolicy::AcceptAll)
    }

    /// Loopback with an explicit credit window and outcome policy.
    pub fn with_options(window: usize, policy: OutcomePolicy) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                addresses: Mutex::new(HashMap::new()),
                policy,
                window: window.max(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Plant an envelope on an address ahead of any run, as if a previous
    /// run had left it on the queue.
    pub fn pre_seed(&self, address: &str, envelope: Envelope) {
        self.inner.deliver(address, envelope);
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn open_sender(&self, address: &str) -> Result<Box<dyn ChannelSender>> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(MqProbeError::Connection("channel is closed".into()));
        }
        // the loopback is sendable immediately; a broker client would
        // suspend here until its sendable event
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        Ok(Box::new(MemorySender {
            inner: Arc::clone(&self.inner),
            address: address.to_string(),
            outcome_tx,
            outcome_rx,
            outstanding: 0,
            seq: 0,
        }))
    }

    async fn open_receiver(&self, address: &str) -> Result<Box<dyn ChannelReceiver>> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(MqProbeError::Connection("channel is closed".into()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut addresses = self.inner.addresses();
            let state = addresses.entry(address.to_string()).or_default();
            while let Some(envelope) = state.backlog.pop_front() {
                let _ = tx.send(envelope);
            }
            state.tx = Some(tx);
        }
        Ok(Box::new(MemoryReceiver { rx }))
    }

    async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut addresses = self.inner.addresses();
        for state in addresses.values_mut() {
            // dropping the sender ends each receiver's stream after it
            // drains what was already queued
            state.tx = None;
        }
    }
}

struct MemorySender {
    inner: Arc<MemoryInner>,
    address: String,
    outcome_tx: mpsc::UnboundedSender<(DeliveryTag, DeliveryOutcome)>,
    outcome_rx: mpsc::UnboundedReceiver<(DeliveryTag, DeliveryOutcome)>,
    outstanding: usize,
    seq: u64,
}

#[async_trait]
impl ChannelSender for MemorySender {
    fn can_send_more(&self) -> bool {
        !self.inner.closed.load(Ordering::SeqCst) && self.outstanding < self.inner.window
    }

    fn send(&mut self, envelope: Envelope) -> Result<DeliveryTag> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(MqProbeError::ChannelClosed);
        }
        self.seq += 1;
        let tag = self.seq;
        let outcome = self.inner.policy.outcome_for(tag);
        if outcome == DeliveryOutcome::Accepted {
            self.inner.deliver(&self.address, envelope);
        }
        let _ = self.outcome_tx.send((tag, outcome));
        self.outstanding += 1;
        Ok(tag)
    }

    async fn next_outcome(&mut self) -> Option<(DeliveryTag, DeliveryOutcome)> {
        let outcome = self.outcome_rx.recv().await;
        if outcome.is_some() {
            self.outstanding = self.outstanding.saturating_sub(1);
        }
        outcome
    }

    fn try_next_outcome(&mut self) -> Option<(DeliveryTag, DeliveryOutcome)> {
        match self.outcome_rx.try_recv() {
            Ok(outcome) => {
                self.outstanding = self.outstanding.saturating_sub(1);
                Some(outcome)
            }
            Err(_) => None,
        }
    }
}

struct MemoryReceiver {
    rx: mpsc::UnboundedReceiver<Envelope>,
}

#[async_trait]
impl ChannelReceiver for MemoryReceiver {
    async fn next_envelope(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }
}

/// Connector handing out a pre-built loopback channel, so tests can keep a
/// handle for pre-seeding while the runner owns connection setup.
pub struct MemoryConnector {
    channel: MemoryChannel,
}

impl MemoryConnector {
    pub fn new(channel: MemoryChannel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, _config: &ChannelConfig) -> Result<Arc<dyn Channel>> {
        Ok(Arc::new(self.channel.clone()))
    }
}
