//! Run controller: owns the benchmark lifecycle.
//!
//! Starts the producer and/or consumer, drives the periodic snapshot timer
//! (as its only owner), detects completion (the consumer's signal when one
//! is active, otherwise the pending-delivery drain plus a short grace), and
//! finalizes exactly once.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration, MissedTickBehavior};
use tracing::{info, warn};

use mqprobe_core::secure::SecureEnvelope;
use mqprobe_core::stats::{epoch_millis, ConsumerSnapshot, ProducerSnapshot, Stats, Summary};
use mqprobe_core::{MqProbeError, Result};

use crate::channel::{Channel, ChannelConfig, Connector};
use crate::config::{BenchConfig, Mode};
use crate::consumer::{Consumer, ConsumerMetrics, ConsumerSettings};
use crate::output;
use crate::producer::{Producer, ProducerMetrics, ProducerSettings};

/// Settle time for in-flight protocol acknowledgments after a send-only
/// run drains, before the channel is closed.
const SEND_ONLY_GRACE: Duration = Duration::from_millis(500);

/// Everything the controller needs for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub address: String,
    pub mode: Mode,
    pub count: u64,
    pub payload: Bytes,
    pub sign: bool,
    pub encrypt: bool,
    pub snapshot_period: Duration,
    pub poll_delay: Duration,
    /// Print the periodic console table row on each snapshot tick.
    pub live_table: bool,
}

impl RunOptions {
    pub fn from_config(cfg: &BenchConfig, payload: Bytes) -> Self {
        Self {
            address: cfg.address.clone(),
            mode: cfg.mode,
            count: cfg.count,
            payload,
            sign: cfg.signing.enabled,
            encrypt: cfg.encryption.enabled,
            snapshot_period: Duration::from_millis(cfg.snapshot_period_ms),
            poll_delay: Duration::from_millis(cfg.poll_delay_ms),
            live_table: true,
        }
    }
}

/// End-of-run report handed to the printer/persister.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub connection_ready_ms: u64,
    pub producer: Option<ProducerMetrics>,
    pub consumer: Option<ConsumerMetrics>,
    /// Received messages per second of receive-phase wall time.
    pub throughput: Option<f64>,
    pub summary: Summary,
    pub protocol_warnings: u64,
    pub producer_snapshots: Vec<ProducerSnapshot>,
    pub consumer_snapshots: Vec<ConsumerSnapshot>,
}

/// Guards finalization: both the completion path and the fallback path may
/// request it, and it must run exactly once.
struct Finalizer {
    timer: Option<JoinHandle<()>>,
    channel: Arc<dyn Channel>,
    done: bool,
}

impl Finalizer {
    async fn finalize(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.channel.close().await;
    }
}

pub struct Runner {
    options: RunOptions,
    connector: Box<dyn Connector>,
    channel_config: ChannelConfig,
    secure: Arc<SecureEnvelope>,
    stats: Arc<Stats>,
}

impl Runner {
    pub fn new(
        options: RunOptions,
        connector: Box<dyn Connector>,
        channel_config: ChannelConfig,
        secure: Arc<SecureEnvelope>,
    ) -> Self {
        Self {
            options,
            connector,
            channel_config,
            secure,
            stats: Arc::new(Stats::new()),
        }
    }

    /// The shared aggregator (one instance per run, passed by reference
    /// everywhere).
    pub fn stats(&self) -> Arc<Stats> {
        Arc::clone(&self.stats)
    }

    /// Execute the run to completion and assemble the report.
    pub async fn run(self) -> Result<RunReport> {
        let run_start = Instant::now();

        let channel = self.connector.open(&self.channel_config).await?;
        let connection_ready_ms = run_start.elapsed().as_millis() as u64;
        info!(connection_ready_ms, "connection open");

        let timer = self.spawn_snapshot_timer(run_start);
        let mut finalizer = Finalizer {
            timer: Some(timer),
            channel: Arc::clone(&channel),
            done: false,
        };

        let driven = self.drive(&channel, run_start, &mut finalizer).await;
        // fallback finalize; harmless when the completion path already ran
        finalizer.finalize().await;
        let (producer_metrics, consumer_metrics) = driven?;

        let throughput = consumer_metrics
            .as_ref()
            .filter(|m| m.duration_secs > 0.0)
            .map(|m| m.received_count as f64 / m.duration_secs);
        let (producer_snapshots, consumer_snapshots) = self.stats.snapshots();

        Ok(RunReport {
            connection_ready_ms,
            producer: producer_metrics,
            consumer: consumer_metrics,
            throughput,
            summary: self.stats.summary(),
            protocol_warnings: self.stats.protocol_warnings(),
            producer_snapshots,
            consumer_snapshots,
        })
    }

    /// Sole owner of the snapshot timer. One logical tick records the
    /// producer snapshot, then the consumer snapshot, so appends stay
    /// totally ordered.
    fn spawn_snapshot_timer(&self, run_start: Instant) -> JoinHandle<()> {
        let stats = Arc::clone(&self.stats);
        let mode = self.options.mode;
        let live = self.options.live_table;
        let period = self.options.snapshot_period;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first interval tick completes immediately; skip it so the
            // first snapshot lands one full period into the run
            tick.tick().await;
            loop {
                tick.tick().await;
                let elapsed = run_start.elapsed().as_secs_f64();
                let now = epoch_millis();
                if mode.sends() {
                    stats.snapshot_producer(now, elapsed);
                }
                if mode.receives() {
                    stats.snapshot_consumer(now, elapsed);
                }
                if live {
                    output::print_live_row(mode, &stats.live_view());
                }
            }
        })
    }

    async fn drive(
        &self,
        channel: &Arc<dyn Channel>,
        run_start: Instant,
        finalizer: &mut Finalizer,
    ) -> Result<(Option<ProducerMetrics>, Option<ConsumerMetrics>)> {
        let mode = self.options.mode;

        let mut producer = if mode.sends() {
            let settings = ProducerSettings {
                address: self.options.address.clone(),
                target: self.options.count,
                payload: self.options.payload.clone(),
                sign: self.options.sign,
                encrypt: self.options.encrypt,
            };
            let mut p = Producer::new(settings, Arc::clone(&self.secure), Arc::clone(&self.stats));
            p.setup(channel.as_ref(), run_start).await?;
            Some(p)
        } else {
            None
        };

        let (done_tx, mut done_rx) = oneshot::channel();
        let consumer_task = if mode.receives() {
            let settings = ConsumerSettings {
                address: self.options.address.clone(),
                target: self.options.count,
                decrypt: self.options.encrypt,
                verify: self.options.sign,
            };
            let mut c = Consumer::new(
                settings,
                Arc::clone(&self.secure),
                Arc::clone(&self.stats),
                done_tx,
            );
            c.setup(channel.as_ref(), run_start).await?;
            Some(tokio::spawn(async move {
                let result = c.run().await;
                (c, result)
            }))
        } else {
            None
        };

        // drive the send loop, yielding between bursts so channel I/O and
        // flow-control state can progress
        if let Some(p) = producer.as_mut() {
            loop {
                let reached = p.send_burst()?;
                p.collect_outcomes();
                if reached {
                    break;
                }
                sleep(self.options.poll_delay).await;
            }
        }

        let mut consumer_metrics = None;
        if let Some(mut task) = consumer_task {
            let (consumer, run_result) = tokio::select! {
                _ = &mut done_rx => {
                    // completion callback fired; the consumer loop exits
                    // right after, so the join is immediate
                    task.await
                        .map_err(|e| MqProbeError::Internal(format!("consumer task failed: {e}")))?
                }
                joined = &mut task => {
                    let (consumer, result) = joined
                        .map_err(|e| MqProbeError::Internal(format!("consumer task failed: {e}")))?;
                    if consumer.received_count() < self.options.count {
                        warn!("consumer ended before reaching the target count");
                    }
                    (consumer, result)
                }
            };
            run_result?;
            if let Some(p) = producer.as_mut() {
                p.collect_outcomes();
            }
            consumer_metrics = Some(consumer.metrics());
            finalizer.finalize().await;
        } else if let Some(p) = producer.as_mut() {
            info!(
                pending = p.pending_len(),
                "send complete; waiting for deliveries to settle"
            );
            p.drain().await?;
            info!("all deliveries settled");
            sleep(SEND_ONLY_GRACE).await;
        }

        Ok((producer.map(|p| p.metrics()), consumer_metrics))
    }
}
