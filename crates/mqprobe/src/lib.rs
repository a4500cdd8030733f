//! Top-level facade crate for mqprobe.
//!
//! Re-exports core types and the bench library so users can depend on a single crate.

pub mod core {
    pub use mqprobe_core::*;
}

pub mod bench {
    pub use mqprobe_bench::*;
}
