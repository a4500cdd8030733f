//! Protocol module: the envelope exchanged over the channel.
//!
//! The envelope's metadata field names are shared with existing deployments
//! of this tool and are preserved bit-exact; see [`envelope`] for the keys.

pub mod envelope;
