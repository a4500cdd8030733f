//! Message envelope: body plus application-property metadata.
//!
//! Wire metadata keys must match existing deployments byte for byte;
//! transports carry them as string application properties next to the body,
//! never appended to the payload itself.

use std::collections::BTreeMap;

use bytes::Bytes;

/// Producer-side send time, integer epoch milliseconds.
pub const PROP_SENT_TIME: &str = "sent_time";
/// Base64 RSA-SHA256 signature over the plaintext body.
pub const PROP_SIGNATURE: &str = "x-digital-signature";
/// Base64 RSA-OAEP-wrapped AES session key.
pub const PROP_ENCRYPTED_KEY: &str = "x-encrypted-key";
/// Base64 AES initialization vector (16 bytes decoded).
pub const PROP_IV: &str = "x-iv";

/// One message unit exchanged over the channel.
///
/// When confidentiality is enabled the body is ciphertext and
/// `encrypted_key`/`iv` are both set; partial presence of the pair is a
/// protocol-data fault on the inbound side.
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    /// Raw body bytes (plaintext, or ciphertext when encryption is on).
    pub body: Bytes,
    /// Send time stamped by the producer, epoch milliseconds.
    pub sent_time: Option<i64>,
    /// Detached signature over the plaintext, base64.
    pub signature: Option<String>,
    /// Wrapped session key, base64.
    pub encrypted_key: Option<String>,
    /// Initialization vector, base64.
    pub iv: Option<String>,
}

impl Envelope {
    /// New envelope with the given body and no metadata.
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    /// Both encryption metadata fields are present.
    pub fn has_encryption_metadata(&self) -> bool {
        self.encrypted_key.is_some() && self.iv.is_some()
    }

    /// Exactly one of the two encryption metadata fields is present.
    pub fn partial_encryption_metadata(&self) -> bool {
        self.encrypted_key.is_some() != self.iv.is_some()
    }

    /// Metadata as the string property map transports put on the wire.
    pub fn wire_properties(&self) -> BTreeMap<String, String> {
        let mut props = BTreeMap::new();
        if let Some(t) = self.sent_time {
            props.insert(PROP_SENT_TIME.to_string(), t.to_string());
        }
        if let Some(sig) = &self.signature {
            props.insert(PROP_SIGNATURE.to_string(), sig.clone());
        }
        if let Some(key) = &self.encrypted_key {
            props.insert(PROP_ENCRYPTED_KEY.to_string(), key.clone());
        }
        if let Some(iv) = &self.iv {
            props.insert(PROP_IV.to_string(), iv.clone());
        }
        props
    }

    /// Rebuild an envelope from a body and a wire property map.
    ///
    /// Unknown properties are ignored; a non-numeric `sent_time` is treated
    /// as absent (stale queue contents from other producers).
    pub fn from_wire_properties(body: Bytes, props: &BTreeMap<String, String>) -> Self {
        Self {
            body,
            sent_time: props.get(PROP_SENT_TIME).and_then(|v| v.parse().ok()),
            signature: props.get(PROP_SIGNATURE).cloned(),
            encrypted_key: props.get(PROP_ENCRYPTED_KEY).cloned(),
            iv: props.get(PROP_IV).cloned(),
        }
    }

    /// Estimated encoded size in bytes: body plus all property keys and
    /// values. Used for the per-message-size metric.
    pub fn encoded_len(&self) -> usize {
        let props = self.wire_properties();
        self.body.len()
            + props
                .iter()
                .map(|(k, v)| k.len() + v.len())
                .sum::<usize>()
    }
}
