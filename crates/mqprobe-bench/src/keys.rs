//! Key material loading for the secure envelope.
//!
//! Only the keys the active mode needs are loaded: the sender side reads
//! signing/encryption keys, the receiver side reads verification/decryption
//! keys. Failures here are fatal setup errors, never per-message ones.

use std::fs;
use std::path::Path;

use mqprobe_core::secure::SecureEnvelope;
use mqprobe_core::{MqProbeError, Result};

use crate::config::BenchConfig;

/// Build the run's cryptographic identity from the configured PEM files.
pub fn build_secure_envelope(cfg: &BenchConfig) -> Result<SecureEnvelope> {
    let mut secure = SecureEnvelope::new();

    if cfg.signing.enabled {
        if cfg.mode.sends() {
            if let Some(path) = &cfg.signing.sign_key {
                secure = secure.with_signing_key_pem(&read_pem(path)?)?;
            }
        }
        if cfg.mode.receives() {
            if let Some(path) = &cfg.signing.sign_cert {
                secure = secure.with_verification_key_pem(&read_pem(path)?)?;
            }
        }
    }

    if cfg.encryption.enabled {
        if cfg.mode.sends() {
            if let Some(path) = &cfg.encryption.encrypt_key {
                secure = secure.with_encryption_key_pem(&read_pem(path)?)?;
            }
        }
        if cfg.mode.receives() {
            if let Some(path) = &cfg.encryption.decrypt_key {
                secure = secure.with_decryption_key_pem(&read_pem(path)?)?;
            }
        }
    }

    Ok(secure)
}

fn read_pem(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| MqProbeError::Key(format!("read {}: {e}", path.display())))
}
