//! Engine scenarios over the in-process loopback channel: counting
//! idempotence, pending-delivery accounting, backpressure, and outcome
//! handling.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;

use mqprobe_bench::channel::memory::{MemoryChannel, MemoryConnector, OutcomePolicy};
use mqprobe_bench::channel::{ChannelConfig, Credentials, TransportSecurity};
use mqprobe_bench::config::Mode;
use mqprobe_bench::producer::{Producer, ProducerSettings, ProducerState};
use mqprobe_bench::runner::{RunOptions, Runner};
use mqprobe_core::secure::SecureEnvelope;
use mqprobe_core::stats::Stats;

fn channel_config() -> ChannelConfig {
    ChannelConfig {
        host: "localhost".into(),
        port: 5672,
        transport: TransportSecurity::Plain,
        credentials: Credentials::None,
    }
}

fn run_options(mode: Mode, count: u64) -> RunOptions {
    RunOptions {
        address: "bench-queue".into(),
        mode,
        count,
        payload: Bytes::from_static(b"Hello world"),
        sign: false,
        encrypt: false,
        snapshot_period: Duration::from_millis(200),
        poll_delay: Duration::from_millis(5),
        live_table: false,
    }
}

fn runner(mode: Mode, count: u64, channel: MemoryChannel) -> Runner {
    Runner::new(
        run_options(mode, count),
        Box::new(MemoryConnector::new(channel)),
        channel_config(),
        Arc::new(SecureEnvelope::new()),
    )
}

#[tokio::test]
async fn both_mode_delivers_every_message_exactly_once() {
    let report = runner(Mode::Both, 100, MemoryChannel::new())
        .run()
        .await
        .expect("run");

    let producer = report.producer.expect("producer metrics");
    let consumer = report.consumer.expect("consumer metrics");
    assert_eq!(producer.sent_count, 100);
    assert_eq!(consumer.received_count, 100);
    assert_eq!(producer.accepted, 100);
    assert_eq!(producer.rejected, 0);
    assert_eq!(producer.pending, 0);
    assert_eq!(report.protocol_warnings, 0);
    // every envelope carried a sent_time, so every receive made a sample
    assert!(report.throughput.is_some());
    assert!(report.summary.latency.max >= report.summary.latency.min);
    assert!(producer.per_message_size > 0);
    assert_eq!(consumer.invalid_signatures, 0);
}

#[tokio::test]
async fn send_only_run_drains_pending_before_finalizing() {
    let report = runner(Mode::Sender, 50, MemoryChannel::new())
        .run()
        .await
        .expect("run");

    let producer = report.producer.expect("producer metrics");
    assert!(report.consumer.is_none());
    assert_eq!(producer.sent_count, 50);
    assert_eq!(producer.accepted, 50);
    // the run may not finalize while deliveries are unsettled
    assert_eq!(producer.pending, 0);
}

#[tokio::test]
async fn rejected_and_released_deliveries_are_counted_not_retried() {
    let channel = MemoryChannel::with_options(256, OutcomePolicy::RejectEveryNth(10));
    let report = runner(Mode::Sender, 100, channel).run().await.expect("run");

    let producer = report.producer.expect("producer metrics");
    assert_eq!(producer.sent_count, 100);
    assert_eq!(producer.accepted, 90);
    assert_eq!(producer.rejected, 10);
    assert_eq!(producer.released, 0);
    assert_eq!(producer.pending, 0);

    let channel = MemoryChannel::with_options(256, OutcomePolicy::ReleaseEveryNth(25));
    let report = runner(Mode::Sender, 100, channel).run().await.expect("run");
    let producer = report.producer.expect("producer metrics");
    assert_eq!(producer.released, 4);
    assert_eq!(producer.pending, 0);
}

#[tokio::test]
async fn backpressure_window_smaller_than_target_still_completes() {
    let channel = MemoryChannel::with_options(8, OutcomePolicy::AcceptAll);
    let report = runner(Mode::Sender, 100, channel).run().await.expect("run");

    let producer = report.producer.expect("producer metrics");
    assert_eq!(producer.sent_count, 100);
    assert_eq!(producer.accepted, 100);
    assert_eq!(producer.pending, 0);
}

// Drive the producer by hand to observe the state machine and the
// pending-set invariant (pending == sent - outcomes observed).
#[tokio::test]
async fn producer_state_machine_and_pending_accounting() {
    let channel = MemoryChannel::with_options(8, OutcomePolicy::AcceptAll);
    let stats = Arc::new(Stats::new());
    let settings = ProducerSettings {
        address: "bench-queue".into(),
        target: 20,
        payload: Bytes::from_static(b"x"),
        sign: false,
        encrypt: false,
    };
    let mut producer = Producer::new(settings, Arc::new(SecureEnvelope::new()), stats);
    assert_eq!(producer.state(), ProducerState::Uninitialized);

    producer.setup(&channel, Instant::now()).await.expect("setup");
    assert_eq!(producer.state(), ProducerState::Ready);

    // first burst fills the credit window
    let reached = producer.send_burst().expect("burst");
    assert!(!reached);
    assert_eq!(producer.state(), ProducerState::Sending);
    assert_eq!(producer.sent_count(), 8);
    assert_eq!(producer.pending_len(), 8);

    // consuming the settled outcomes empties the pending set and
    // replenishes credit
    producer.collect_outcomes();
    assert_eq!(producer.pending_len(), 0);

    while !producer.send_burst().expect("burst") {
        producer.collect_outcomes();
    }
    assert_eq!(producer.sent_count(), 20);
    assert!(matches!(
        producer.state(),
        ProducerState::Draining | ProducerState::Done
    ));

    producer.drain().await.expect("drain");
    assert_eq!(producer.state(), ProducerState::Done);
    assert_eq!(producer.pending_len(), 0);
    let metrics = producer.metrics();
    assert_eq!(metrics.accepted, 20);
    assert_eq!(metrics.pending, 0);
}

#[tokio::test]
async fn receiver_only_run_completes_from_queued_messages() {
    use mqprobe_core::protocol::envelope::Envelope;

    let channel = MemoryChannel::new();
    for _ in 0..5 {
        let mut envelope = Envelope::new(Bytes::from_static(b"queued"));
        envelope.sent_time = Some(mqprobe_core::stats::epoch_millis());
        channel.pre_seed("bench-queue", envelope);
    }

    let report = runner(Mode::Receiver, 5, channel).run().await.expect("run");
    assert!(report.producer.is_none());
    let consumer = report.consumer.expect("consumer metrics");
    assert_eq!(consumer.received_count, 5);
    assert!(report.throughput.is_some());
}

#[tokio::test]
async fn consumer_counts_stale_plaintext_messages() {
    use mqprobe_core::protocol::envelope::Envelope;

    // a message left behind by a previous run is still one received message
    let channel = MemoryChannel::new();
    channel.pre_seed("bench-queue", Envelope::new(Bytes::from_static(b"leftover")));

    let report = runner(Mode::Both, 10, channel).run().await.expect("run");
    let consumer = report.consumer.expect("consumer metrics");
    assert_eq!(consumer.received_count, 10);
    // no crypto configured, so nothing about the stale message warrants a
    // protocol warning
    assert_eq!(report.protocol_warnings, 0);
}
