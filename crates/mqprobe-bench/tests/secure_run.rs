//! End-to-end runs with signing and encryption enabled, including the
//! stale-message degradation path.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;

use mqprobe_bench::channel::memory::{MemoryChannel, MemoryConnector};
use mqprobe_bench::channel::{ChannelConfig, Credentials, TransportSecurity};
use mqprobe_bench::config::Mode;
use mqprobe_bench::consumer::{Consumer, ConsumerSettings};
use mqprobe_bench::runner::{RunOptions, Runner};
use mqprobe_core::protocol::envelope::Envelope;
use mqprobe_core::secure::SecureEnvelope;
use mqprobe_core::stats::Stats;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::RsaPrivateKey;

fn key_pair() -> &'static (String, String) {
    static PAIR: OnceLock<(String, String)> = OnceLock::new();
    PAIR.get_or_init(|| {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let public = private.to_public_key();
        (
            private.to_pkcs8_pem(LineEnding::LF).unwrap().to_string(),
            public.to_public_key_pem(LineEnding::LF).unwrap(),
        )
    })
}

fn full_secure() -> Arc<SecureEnvelope> {
    let (private_pem, public_pem) = key_pair();
    Arc::new(
        SecureEnvelope::new()
            .with_signing_key_pem(private_pem)
            .unwrap()
            .with_verification_key_pem(public_pem)
            .unwrap()
            .with_encryption_key_pem(public_pem)
            .unwrap()
            .with_decryption_key_pem(private_pem)
            .unwrap(),
    )
}

fn channel_config() -> ChannelConfig {
    ChannelConfig {
        host: "localhost".into(),
        port: 5672,
        transport: TransportSecurity::Plain,
        credentials: Credentials::None,
    }
}

fn secured_runner(count: u64, sign: bool, encrypt: bool, channel: MemoryChannel) -> Runner {
    let options = RunOptions {
        address: "secure-queue".into(),
        mode: Mode::Both,
        count,
        payload: Bytes::from_static(b"confidential payload"),
        sign,
        encrypt,
        snapshot_period: Duration::from_millis(200),
        poll_delay: Duration::from_millis(5),
        live_table: false,
    };
    Runner::new(
        options,
        Box::new(MemoryConnector::new(channel)),
        channel_config(),
        full_secure(),
    )
}

#[tokio::test]
async fn signed_and_encrypted_run_verifies_every_message() {
    let report = secured_runner(25, true, true, MemoryChannel::new())
        .run()
        .await
        .expect("run");

    let producer = report.producer.expect("producer metrics");
    let consumer = report.consumer.expect("consumer metrics");
    assert_eq!(producer.sent_count, 25);
    assert_eq!(consumer.received_count, 25);
    assert_eq!(consumer.invalid_signatures, 0);
    assert_eq!(report.protocol_warnings, 0);
    assert_eq!(report.summary.payload_size, b"confidential payload".len() as u64);
    // every message was decrypted and verified; durations are non-negative
    // and the aggregates are populated
    assert!(report.summary.decryption.max >= report.summary.decryption.min);
    assert!(report.summary.signature.max >= report.summary.signature.min);
    assert!(report.summary.decryption.avg >= 0.0);
    assert!(report.summary.signature.avg >= 0.0);
    // ciphertext plus metadata is strictly larger than the plaintext body
    assert!(producer.per_message_size > b"confidential payload".len());
}

#[tokio::test]
async fn sign_only_run_checks_signatures_in_the_clear() {
    let report = secured_runner(10, true, false, MemoryChannel::new())
        .run()
        .await
        .expect("run");

    let consumer = report.consumer.expect("consumer metrics");
    assert_eq!(consumer.received_count, 10);
    assert_eq!(consumer.invalid_signatures, 0);
    assert_eq!(report.protocol_warnings, 0);
    // no decryption happened, so that aggregate stays empty
    assert_eq!(report.summary.decryption.max, 0.0);
}

// A stale plaintext message on the queue, under an encrypted run, must be
// passed through with a warning instead of failing the run.
#[tokio::test]
async fn stale_message_without_iv_degrades_with_a_warning() {
    let channel = MemoryChannel::new();
    let mut stale = Envelope::new(Bytes::from_static(b"from a previous run"));
    stale.sent_time = Some(mqprobe_core::stats::epoch_millis());
    channel.pre_seed("secure-queue", stale);

    let report = secured_runner(10, false, true, channel)
        .run()
        .await
        .expect("run");

    let consumer = report.consumer.expect("consumer metrics");
    // the stale message is one of the ten counted receives
    assert_eq!(consumer.received_count, 10);
    assert_eq!(report.protocol_warnings, 1);
}

#[tokio::test]
async fn tampered_signature_is_reported_not_fatal() {
    let stats = Arc::new(Stats::new());
    let (done_tx, _done_rx) = tokio::sync::oneshot::channel();
    let settings = ConsumerSettings {
        address: "secure-queue".into(),
        target: 2,
        decrypt: false,
        verify: true,
    };
    let mut consumer = Consumer::new(settings, full_secure(), Arc::clone(&stats), done_tx);

    let secure = full_secure();
    let payload = b"genuine payload";
    let mut good = Envelope::new(Bytes::from_static(payload));
    good.signature = Some(secure.sign(payload).unwrap());
    consumer.on_envelope(good);

    let mut forged = Envelope::new(Bytes::from_static(b"tampered payload"));
    forged.signature = Some(secure.sign(payload).unwrap());
    consumer.on_envelope(forged);

    let metrics = consumer.metrics();
    assert_eq!(metrics.received_count, 2);
    assert_eq!(metrics.invalid_signatures, 1);
}
