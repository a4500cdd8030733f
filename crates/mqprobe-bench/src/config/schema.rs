use serde::Deserialize;
use std::path::PathBuf;

use mqprobe_core::error::{MqProbeError, Result};

use crate::channel::{ChannelConfig, Credentials, TransportSecurity};

/// Which side(s) of the channel this run drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Sender,
    Receiver,
    Both,
}

impl Mode {
    pub fn sends(self) -> bool {
        matches!(self, Mode::Sender | Mode::Both)
    }

    pub fn receives(self) -> bool {
        matches!(self, Mode::Receiver | Mode::Both)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Sender => "sender",
            Mode::Receiver => "receiver",
            Mode::Both => "both",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BenchConfig {
    #[serde(default = "default_host")]
    pub host: String,

    /// Defaults to the standard port for the selected transport.
    #[serde(default)]
    pub port: Option<u16>,

    /// Queue/topic name.
    pub address: String,

    #[serde(default = "default_count")]
    pub count: u64,

    #[serde(default = "default_mode")]
    pub mode: Mode,

    /// File providing the message body; a built-in body is used otherwise.
    #[serde(default)]
    pub payload: Option<PathBuf>,

    /// Directory for result files; a temp directory is used otherwise.
    #[serde(default)]
    pub output: Option<PathBuf>,

    #[serde(default)]
    pub transport: TransportSection,

    #[serde(default)]
    pub signing: SigningSection,

    #[serde(default)]
    pub encryption: EncryptionSection,

    #[serde(default = "default_snapshot_period_ms")]
    pub snapshot_period_ms: u64,

    #[serde(default = "default_poll_delay_ms")]
    pub poll_delay_ms: u64,
}

impl BenchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.count == 0 {
            return Err(MqProbeError::Config("count must be at least 1".into()));
        }
        if self.address.is_empty() {
            return Err(MqProbeError::Config("address must not be empty".into()));
        }
        if !(100..=60_000).contains(&self.snapshot_period_ms) {
            return Err(MqProbeError::Config(
                "snapshot_period_ms must be between 100 and 60000".into(),
            ));
        }
        if !(1..=10_000).contains(&self.poll_delay_ms) {
            return Err(MqProbeError::Config(
                "poll_delay_ms must be between 1 and 10000".into(),
            ));
        }

        self.transport.validate()?;
        self.signing.validate(self.mode)?;
        self.encryption.validate(self.mode)?;

        Ok(())
    }

    /// Effective port: explicit, or the standard one for the transport.
    pub fn port(&self) -> u16 {
        self.port
            .unwrap_or(if self.transport.tls { 5671 } else { 5672 })
    }

    /// Connection parameters for the channel collaborator.
    pub fn channel_config(&self) -> ChannelConfig {
        let credentials = if self.transport.tls {
            match (&self.transport.cert, &self.transport.key) {
                (Some(cert), Some(key)) => Credentials::Certificate {
                    cert: cert.clone(),
                    key: key.clone(),
                    ca: self.transport.ca.clone(),
                    server_name: self.transport.server_name.clone(),
                },
                _ => Credentials::None,
            }
        } else {
            match (&self.transport.username, &self.transport.password) {
                (Some(username), Some(password)) => Credentials::Password {
                    username: username.clone(),
                    password: password.clone(),
                },
                _ => Credentials::None,
            }
        };
        ChannelConfig {
            host: self.host.clone(),
            port: self.port(),
            transport: if self.transport.tls {
                TransportSecurity::Tls
            } else {
                TransportSecurity::Plain
            },
            credentials,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportSection {
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub cert: Option<PathBuf>,
    #[serde(default)]
    pub key: Option<PathBuf>,
    #[serde(default)]
    pub ca: Option<PathBuf>,
    #[serde(default)]
    pub server_name: Option<String>,
}

impl TransportSection {
    pub fn validate(&self) -> Result<()> {
        if self.tls && (self.key.is_none() || self.cert.is_none()) {
            return Err(MqProbeError::Config(
                "transport.key and transport.cert are required when tls is enabled".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SigningSection {
    #[serde(default)]
    pub enabled: bool,
    /// Sender private key PEM file.
    #[serde(default)]
    pub sign_key: Option<PathBuf>,
    /// Receiver verification public key PEM file.
    #[serde(default)]
    pub sign_cert: Option<PathBuf>,
}

impl SigningSection {
    pub fn validate(&self, mode: Mode) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if mode.sends() && self.sign_key.is_none() {
            return Err(MqProbeError::Config(
                "signing.sign_key is required when signing in sender mode".into(),
            ));
        }
        if mode.receives() && self.sign_cert.is_none() {
            return Err(MqProbeError::Config(
                "signing.sign_cert is required when verifying in receiver mode".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncryptionSection {
    #[serde(default)]
    pub enabled: bool,
    /// Recipient public key PEM file (sender side).
    #[serde(default)]
    pub encrypt_key: Option<PathBuf>,
    /// Recipient private key PEM file (receiver side).
    #[serde(default)]
    pub decrypt_key: Option<PathBuf>,
}

impl EncryptionSection {
    pub fn validate(&self, mode: Mode) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if mode.sends() && self.encrypt_key.is_none() {
            return Err(MqProbeError::Config(
                "encryption.encrypt_key is required when encrypting in sender mode".into(),
            ));
        }
        if mode.receives() && self.decrypt_key.is_none() {
            return Err(MqProbeError::Config(
                "encryption.decrypt_key is required when decrypting in receiver mode".into(),
            ));
        }
        Ok(())
    }
}

fn default_host() -> String {
    "localhost".into()
}
fn default_count() -> u64 {
    10_000
}
fn default_mode() -> Mode {
    Mode::Both
}
fn default_snapshot_period_ms() -> u64 {
    2_000
}
fn default_poll_delay_ms() -> u64 {
    100
}
