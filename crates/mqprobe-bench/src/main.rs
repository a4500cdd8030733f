//! mqprobe benchmark binary.
//!
//! Mirrors the classic single-run tool: pick a mode (sender, receiver, or
//! both), a target count, and optional signing/encryption, then print the
//! live table and persist the results. The wire transport is an external
//! collaborator behind `channel::Connector`; this binary wires the
//! in-process loopback channel so a run is self-contained.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mqprobe_bench::channel::memory::{MemoryChannel, MemoryConnector};
use mqprobe_bench::config::{
    BenchConfig, EncryptionSection, Mode, SigningSection, TransportSection,
};
use mqprobe_bench::runner::{RunOptions, Runner};
use mqprobe_bench::{keys, output};
use mqprobe_core::stats::epoch_millis;

#[derive(Parser, Debug)]
#[command(name = "mqprobe-bench")]
#[command(about = "Throughput/latency benchmark for broker-mediated messaging")]
struct Args {
    /// Broker host address
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Broker port (defaults to 5672, or 5671 with TLS)
    #[arg(long)]
    port: Option<u16>,

    /// Username for the connection
    #[arg(long)]
    username: Option<String>,

    /// Password for the connection
    #[arg(long)]
    password: Option<String>,

    /// The queue name
    #[arg(long)]
    address: String,

    /// Number of messages to send
    #[arg(long, default_value_t = 10_000)]
    count: u64,

    /// Mode of operation
    #[arg(long, value_enum, default_value_t = ModeArg::Both)]
    mode: ModeArg,

    /// File providing the message body
    #[arg(long)]
    payload: Option<PathBuf>,

    /// Use a TLS connection
    #[arg(short = 's', long)]
    tls: bool,

    /// Client TLS private key file
    #[arg(long)]
    key: Option<PathBuf>,

    /// Client TLS certificate file
    #[arg(long)]
    cert: Option<PathBuf>,

    /// CA certificate file
    #[arg(long)]
    ca: Option<PathBuf>,

    /// Server name for TLS verification
    #[arg(long)]
    servername: Option<String>,

    /// Enable message body encryption
    #[arg(long)]
    encrypt: bool,

    /// Recipient public key for message encryption
    #[arg(long)]
    encrypt_key: Option<PathBuf>,

    /// Recipient private key for message decryption
    #[arg(long)]
    decrypt_key: Option<PathBuf>,

    /// Enable message body signing
    #[arg(long)]
    sign: bool,

    /// Sender private key for message signing
    #[arg(long)]
    sign_key: Option<PathBuf>,

    /// Sender public key for signature verification
    #[arg(long)]
    sign_cert: Option<PathBuf>,

    /// Output directory for the results
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Sender,
    Receiver,
    Both,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Sender => Mode::Sender,
            ModeArg::Receiver => Mode::Receiver,
            ModeArg::Both => Mode::Both,
        }
    }
}

fn to_config(args: Args) -> BenchConfig {
    BenchConfig {
        host: args.host,
        port: args.port,
        address: args.address,
        count: args.count,
        mode: args.mode.into(),
        payload: args.payload,
        output: args.output,
        transport: TransportSection {
            tls: args.tls,
            username: args.username,
            password: args.password,
            cert: args.cert,
            key: args.key,
            ca: args.ca,
            server_name: args.servername,
        },
        signing: SigningSection {
            enabled: args.sign,
            sign_key: args.sign_key,
            sign_cert: args.sign_cert,
        },
        encryption: EncryptionSection {
            enabled: args.encrypt,
            encrypt_key: args.encrypt_key,
            decrypt_key: args.decrypt_key,
        },
        snapshot_period_ms: 2_000,
        poll_delay_ms: 100,
    }
}

fn require_exists(what: &str, path: &Path) -> Result<()> {
    if !path.exists() {
        bail!("{what} file {} does not exist", path.display());
    }
    Ok(())
}

/// Setup-time existence checks for every file the active configuration
/// references; failures here terminate before anything connects.
fn check_files(cfg: &BenchConfig) -> Result<()> {
    if let Some(payload) = &cfg.payload {
        require_exists("payload", payload)?;
    }
    if cfg.transport.tls {
        if let Some(key) = &cfg.transport.key {
            require_exists("TLS key", key)?;
        }
        if let Some(cert) = &cfg.transport.cert {
            require_exists("TLS certificate", cert)?;
        }
        if let Some(ca) = &cfg.transport.ca {
            require_exists("CA certificate", ca)?;
        }
    }
    if cfg.encryption.enabled {
        if cfg.mode.sends() {
            if let Some(path) = &cfg.encryption.encrypt_key {
                require_exists("encryption key", path)?;
            }
        }
        if cfg.mode.receives() {
            if let Some(path) = &cfg.encryption.decrypt_key {
                require_exists("decryption key", path)?;
            }
        }
    }
    if cfg.signing.enabled {
        if cfg.mode.sends() {
            if let Some(path) = &cfg.signing.sign_key {
                require_exists("signing key", path)?;
            }
        }
        if cfg.mode.receives() {
            if let Some(path) = &cfg.signing.sign_cert {
                require_exists("signing certificate", path)?;
            }
        }
    }
    Ok(())
}

fn load_payload(cfg: &BenchConfig) -> Result<Bytes> {
    match &cfg.payload {
        Some(path) => {
            let body = std::fs::read(path)
                .with_context(|| format!("read payload {}", path.display()))?;
            Ok(Bytes::from(body))
        }
        None => Ok(Bytes::from_static(b"Hello world")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = to_config(Args::parse());
    cfg.validate().context("invalid configuration")?;
    check_files(&cfg)?;

    let payload = load_payload(&cfg)?;
    let secure = Arc::new(keys::build_secure_envelope(&cfg).context("load key material")?);

    let output_dir = cfg
        .output
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join(format!("mqprobe-{}", epoch_millis())));

    info!(
        address = %cfg.address,
        count = cfg.count,
        mode = cfg.mode.as_str(),
        "starting benchmark against the in-process loopback channel"
    );
    let channel = MemoryChannel::new();
    let connector = Box::new(MemoryConnector::new(channel));

    let options = RunOptions::from_config(&cfg, payload);
    let runner = Runner::new(options, connector, cfg.channel_config(), secure);

    output::print_table_header(cfg.mode);
    let report = runner.run().await.context("benchmark run failed")?;
    output::print_table_footer(cfg.mode);

    output::print_report(&cfg, &report);
    output::persist(&report, &output_dir)?;
    println!("\nResults saved to {}", output_dir.display());

    Ok(())
}
