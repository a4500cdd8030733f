//! Statistics aggregator: raw samples in, windowed snapshots and an
//! end-of-run summary out.
//!
//! One `Stats` instance is shared (by `Arc`) between the producer, the
//! consumer, and the run controller; duplicating it would fragment the
//! sample history and break percentile correctness. Internals are guarded
//! by a mutex because the host runtime schedules callers on parallel
//! threads. Snapshots are driven only by the run controller's timer, one
//! per tick, and are append-only once recorded.

use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// Current wall-clock time as integer epoch milliseconds.
pub fn epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Producer-side windowed aggregate, recorded once per snapshot tick.
#[derive(Debug, Clone, Serialize)]
pub struct ProducerSnapshot {
    /// Wall-clock timestamp, epoch milliseconds.
    pub timestamp: i64,
    /// Envelopes sent since the previous snapshot.
    pub sent: u64,
    /// Messages per second. The denominator is the cumulative elapsed run
    /// time, not the inter-snapshot interval, matching the historical
    /// output consumers expect (smoothed rather than instantaneous).
    pub rate: f64,
}

/// Consumer-side windowed aggregate, recorded once per snapshot tick.
#[derive(Debug, Clone, Serialize)]
pub struct ConsumerSnapshot {
    /// Wall-clock timestamp, epoch milliseconds.
    pub timestamp: i64,
    /// Envelopes received since the previous snapshot.
    pub received: u64,
    /// Messages per second (cumulative-elapsed denominator, see
    /// [`ProducerSnapshot::rate`]).
    pub rate: f64,
    /// Running average latency over the whole run so far, milliseconds.
    pub avg_latency: f64,
}

/// Min/avg/max over one sample sequence, all zero when empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MinAvgMax {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
}

/// Latency aggregate: min/avg/max plus the 95th percentile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
    pub p95: f64,
}

/// End-of-run aggregate over the full sample history. Pure derived view;
/// computing it does not mutate the aggregator.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    /// Configured payload size in bytes.
    pub payload_size: u64,
    /// End-to-end latency, milliseconds.
    pub latency: LatencySummary,
    /// Signature verification duration, milliseconds.
    pub signature: MinAvgMax,
    /// Decryption duration, milliseconds.
    pub decryption: MinAvgMax,
}

/// Point-in-time view backing the live console table row.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiveView {
    pub sender_time: f64,
    pub sender_count: u64,
    pub sender_rate: f64,
    pub receiver_time: f64,
    pub receiver_count: u64,
    pub receiver_rate: f64,
    pub avg_latency: f64,
}

#[derive(Default)]
struct StatsInner {
    sent_total: u64,
    snapshot_sent: u64,
    received_total: u64,
    snapshot_received: u64,
    latencies: Vec<f64>,
    signature_times: Vec<f64>,
    decryption_times: Vec<f64>,
    payload_size: u64,
    protocol_warnings: u64,
    producer_snapshots: Vec<ProducerSnapshot>,
    consumer_snapshots: Vec<ConsumerSnapshot>,
    live: LiveView,
}

/// Single shared accumulation point for all timing and count data.
#[derive(Default)]
pub struct Stats {
    inner: Mutex<StatsInner>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> MutexGuard<'_, StatsInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("stats lock poisoned; continuing with recovered state");
                poisoned.into_inner()
            }
        }
    }

    /// Record one end-to-end latency sample, milliseconds.
    pub fn record_latency(&self, ms: f64) {
        self.locked().latencies.push(ms);
    }

    /// Record one signature-verification duration, milliseconds.
    pub fn record_signature_time(&self, ms: f64) {
        self.locked().signature_times.push(ms);
    }

    /// Record one decryption duration, milliseconds.
    pub fn record_decryption_time(&self, ms: f64) {
        self.locked().decryption_times.push(ms);
    }

    /// Count one sent envelope.
    pub fn note_sent(&self) {
        let mut g = self.locked();
        g.sent_total += 1;
        g.snapshot_sent += 1;
    }

    /// Count one received envelope.
    pub fn note_received(&self) {
        let mut g = self.locked();
        g.received_total += 1;
        g.snapshot_received += 1;
    }

    /// Count one protocol-data fault (missing expected metadata).
    pub fn note_protocol_warning(&self) {
        self.locked().protocol_warnings += 1;
    }

    /// Set the configured payload size in bytes.
    pub fn set_payload_size(&self, bytes: u64) {
        self.locked().payload_size = bytes;
    }

    /// Record a producer snapshot for the current tick and reset the
    /// since-last-snapshot counter.
    pub fn snapshot_producer(&self, now_ms: i64, elapsed_secs: f64) -> ProducerSnapshot {
        let mut g = self.locked();
        let rate = if elapsed_secs > 0.0 {
            g.snapshot_sent as f64 / elapsed_secs
        } else {
            0.0
        };
        let snapshot = ProducerSnapshot {
            timestamp: now_ms,
            sent: g.snapshot_sent,
            rate,
        };
        g.live.sender_time = elapsed_secs;
        g.live.sender_count = g.snapshot_sent;
        g.live.sender_rate = rate;
        g.producer_snapshots.push(snapshot.clone());
        g.snapshot_sent = 0;
        snapshot
    }

    /// Record a consumer snapshot for the current tick and reset the
    /// since-last-snapshot counter.
    pub fn snapshot_consumer(&self, now_ms: i64, elapsed_secs: f64) -> ConsumerSnapshot {
        let mut g = self.locked();
        let rate = if elapsed_secs > 0.0 {
            g.snapshot_received as f64 / elapsed_secs
        } else {
            0.0
        };
        let avg_latency = mean(&g.latencies);
        let snapshot = ConsumerSnapshot {
            timestamp: now_ms,
            received: g.snapshot_received,
            rate,
            avg_latency,
        };
        g.live.receiver_time = elapsed_secs;
        g.live.receiver_count = g.snapshot_received;
        g.live.receiver_rate = rate;
        g.live.avg_latency = avg_latency;
        g.consumer_snapshots.push(snapshot.clone());
        g.snapshot_received = 0;
        snapshot
    }

    /// Derive the end-of-run summary over the full sample history.
    pub fn summary(&self) -> Summary {
        let g = self.locked();
        Summary {
            payload_size: g.payload_size,
            latency: LatencySummary {
                min: min_of(&g.latencies),
                avg: mean(&g.latencies),
                max: max_of(&g.latencies),
                p95: percentile(&g.latencies, 95.0),
            },
            signature: min_avg_max(&g.signature_times),
            decryption: min_avg_max(&g.decryption_times),
        }
    }

    /// Snapshot histories recorded so far (append-only, in tick order).
    pub fn snapshots(&self) -> (Vec<ProducerSnapshot>, Vec<ConsumerSnapshot>) {
        let g = self.locked();
        (g.producer_snapshots.clone(), g.consumer_snapshots.clone())
    }

    /// View for the live console row.
    pub fn live_view(&self) -> LiveView {
        self.locked().live
    }

    /// Total envelopes counted as sent.
    pub fn sent_total(&self) -> u64 {
        self.locked().sent_total
    }

    /// Total envelopes counted as received.
    pub fn received_total(&self) -> u64 {
        self.locked().received_total
    }

    /// Protocol-data faults observed so far.
    pub fn protocol_warnings(&self) -> u64 {
        self.locked().protocol_warnings
    }

    /// Number of latency samples recorded so far.
    pub fn latency_samples(&self) -> usize {
        self.locked().latencies.len()
    }
}

/// Nearest-rank percentile: sort ascending, take index `ceil(p/100*N) - 1`.
/// No interpolation. Zero on an empty sequence.
pub fn percentile(samples: &[f64], p: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (p / 100.0 * sorted.len() as f64).ceil() as usize;
    sorted.get(rank.saturating_sub(1)).copied().unwrap_or(0.0)
}

fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

fn min_of(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        0.0
    } else {
        samples.iter().copied().fold(f64::INFINITY, f64::min)
    }
}

fn max_of(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        0.0
    } else {
        samples.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }
}

fn min_avg_max(samples: &[f64]) -> MinAvgMax {
    MinAvgMax {
        min: min_of(samples),
        avg: mean(samples),
        max: max_of(samples),
    }
}
