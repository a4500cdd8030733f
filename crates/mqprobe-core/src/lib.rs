//! mqprobe core: envelope protocol, secure transform, statistics, and errors.
//!
//! This crate defines the measurement primitives shared by the bench runtime
//! and external tooling. It intentionally carries no transport or runtime
//! dependencies so it can be reused in multiple contexts.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `MqProbeError`/`Result` so a running
//! benchmark does not crash on malformed traffic or bad key material.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;
pub mod secure;
pub mod stats;

/// Shared result type.
pub use error::{MqProbeError, Result};
