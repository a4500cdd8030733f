//! Bench config loader (strict parsing).

pub mod schema;

use std::fs;
use std::path::Path;

use mqprobe_core::error::{MqProbeError, Result};

pub use schema::{BenchConfig, EncryptionSection, Mode, SigningSection, TransportSection};

pub fn load_from_file(path: &Path) -> Result<BenchConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| MqProbeError::Config(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<BenchConfig> {
    let cfg: BenchConfig = serde_yaml::from_str(s)
        .map_err(|e| MqProbeError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
