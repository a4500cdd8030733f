//! Secure envelope transform: signing and hybrid encryption.
//!
//! Outbound, the plaintext is signed first (RSA-SHA256) and then encrypted
//! (fresh AES-256-CBC session key per message, wrapped under the recipient
//! public key with RSA-OAEP). Inbound, decryption runs first and the
//! signature is verified against the recovered plaintext. The signature and
//! encryption metadata travel unencrypted as envelope properties.
//!
//! Session keys and IVs are generated fresh on every call; reusing either
//! across messages would allow plaintext recovery under CBC.

use aes::Aes256;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::{MqProbeError, Result};
use crate::protocol::envelope::Envelope;

const SESSION_KEY_BYTES: usize = 32;
const IV_BYTES: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Output of [`SecureEnvelope::encrypt`]: the ciphertext plus the two
/// metadata fields the caller must carry alongside it on the wire.
#[derive(Debug, Clone)]
pub struct SealedBody {
    /// AES-256-CBC ciphertext (PKCS#7 padded).
    pub ciphertext: Vec<u8>,
    /// RSA-OAEP-wrapped session key, base64.
    pub encrypted_key: String,
    /// Initialization vector, base64.
    pub iv: String,
}

/// Result of opening an inbound envelope body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenedBody {
    /// Metadata was present and the body decrypted cleanly.
    Decrypted(Vec<u8>),
    /// Required encryption metadata was missing; the raw (still encrypted
    /// or never-encrypted) body is passed through unmodified. Callers must
    /// surface this as a benchmark-validity warning.
    PassedThrough(Vec<u8>),
}

impl OpenedBody {
    /// The recovered bytes, whichever path produced them.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            OpenedBody::Decrypted(b) | OpenedBody::PassedThrough(b) => b,
        }
    }

    /// Whether the missing-metadata fallback was taken.
    pub fn is_passed_through(&self) -> bool {
        matches!(self, OpenedBody::PassedThrough(_))
    }
}

/// Per-run cryptographic identity: optional signing, verification,
/// encryption, and decryption keys, each configured independently.
///
/// Operations fail with `MqProbeError::Key` when the key they need was not
/// configured; that is a setup-time mistake, never a per-message one.
#[derive(Default)]
pub struct SecureEnvelope {
    signing_key: Option<SigningKey<Sha256>>,
    verifying_key: Option<VerifyingKey<Sha256>>,
    encryption_key: Option<RsaPublicKey>,
    decryption_key: Option<RsaPrivateKey>,
}

impl SecureEnvelope {
    /// Envelope with no key material (plaintext passthrough).
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the sender-side signing key from a private key PEM.
    pub fn with_signing_key_pem(mut self, pem: &str) -> Result<Self> {
        self.signing_key = Some(SigningKey::new(private_key_from_pem(pem)?));
        Ok(self)
    }

    /// Configure the receiver-side verification key from a public key PEM.
    pub fn with_verification_key_pem(mut self, pem: &str) -> Result<Self> {
        self.verifying_key = Some(VerifyingKey::new(public_key_from_pem(pem)?));
        Ok(self)
    }

    /// Configure the recipient public key used to wrap session keys.
    pub fn with_encryption_key_pem(mut self, pem: &str) -> Result<Self> {
        self.encryption_key = Some(public_key_from_pem(pem)?);
        Ok(self)
    }

    /// Configure the recipient private key used to unwrap session keys.
    pub fn with_decryption_key_pem(mut self, pem: &str) -> Result<Self> {
        self.decryption_key = Some(private_key_from_pem(pem)?);
        Ok(self)
    }

    /// Sign the payload with RSA PKCS#1 v1.5 over SHA-256, base64-encoded.
    ///
    /// Deterministic for a given key and payload.
    pub fn sign(&self, payload: &[u8]) -> Result<String> {
        let key = self
            .signing_key
            .as_ref()
            .ok_or_else(|| MqProbeError::Key("no signing key configured".into()))?;
        let signature = key
            .try_sign(payload)
            .map_err(|e| MqProbeError::Crypto(format!("sign: {e}")))?;
        Ok(BASE64.encode(signature.to_bytes()))
    }

    /// Verify a base64 signature against the payload.
    ///
    /// A cryptographically invalid (or undecodable) signature yields
    /// `Ok(false)`; only a missing verification key is an error.
    pub fn verify(&self, payload: &[u8], signature_b64: &str) -> Result<bool> {
        let key = self
            .verifying_key
            .as_ref()
            .ok_or_else(|| MqProbeError::Key("no verification key configured".into()))?;
        let raw = match BASE64.decode(signature_b64) {
            Ok(raw) => raw,
            Err(_) => return Ok(false),
        };
        let signature = match Signature::try_from(raw.as_slice()) {
            Ok(sig) => sig,
            Err(_) => return Ok(false),
        };
        Ok(key.verify(payload, &signature).is_ok())
    }

    /// Encrypt the payload under a fresh 256-bit session key and 128-bit IV.
    pub fn encrypt(&self, payload: &[u8]) -> Result<SealedBody> {
        let key = self
            .encryption_key
            .as_ref()
            .ok_or_else(|| MqProbeError::Key("no encryption key configured".into()))?;

        let mut rng = rand::thread_rng();
        let mut session_key = [0u8; SESSION_KEY_BYTES];
        rng.fill_bytes(&mut session_key);
        let mut iv = [0u8; IV_BYTES];
        rng.fill_bytes(&mut iv);

        let cipher = Aes256CbcEnc::new_from_slices(&session_key, &iv)
            .map_err(|e| MqProbeError::Crypto(format!("cipher init: {e}")))?;
        let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(payload);

        let wrapped = key
            .encrypt(&mut rng, Oaep::new::<Sha256>(), &session_key)
            .map_err(|e| MqProbeError::Crypto(format!("session key wrap: {e}")))?;

        Ok(SealedBody {
            ciphertext,
            encrypted_key: BASE64.encode(wrapped),
            iv: BASE64.encode(iv),
        })
    }

    /// Unwrap the session key and decrypt the ciphertext.
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        encrypted_key_b64: &str,
        iv_b64: &str,
    ) -> Result<Vec<u8>> {
        let key = self
            .decryption_key
            .as_ref()
            .ok_or_else(|| MqProbeError::Key("no decryption key configured".into()))?;

        let wrapped = BASE64
            .decode(encrypted_key_b64)
            .map_err(|e| MqProbeError::Crypto(format!("encrypted key is not base64: {e}")))?;
        let iv = BASE64
            .decode(iv_b64)
            .map_err(|e| MqProbeError::Crypto(format!("iv is not base64: {e}")))?;

        let session_key = key
            .decrypt(Oaep::new::<Sha256>(), &wrapped)
            .map_err(|e| MqProbeError::Crypto(format!("session key unwrap: {e}")))?;

        let cipher = Aes256CbcDec::new_from_slices(&session_key, &iv)
            .map_err(|e| MqProbeError::Crypto(format!("cipher init: {e}")))?;
        cipher
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| {
                MqProbeError::Crypto("aes-cbc decrypt failed (wrong key, corrupt ciphertext, or bad padding)".into())
            })
    }

    /// Open an inbound envelope under the missing-metadata policy.
    ///
    /// Envelopes carrying both `x-encrypted-key` and `x-iv` are decrypted;
    /// anything else (stale messages left on a shared queue by a prior run)
    /// has its raw body passed through and is flagged `PassedThrough`.
    pub fn open(&self, envelope: &Envelope) -> Result<OpenedBody> {
        match (&envelope.encrypted_key, &envelope.iv) {
            (Some(key), Some(iv)) => Ok(OpenedBody::Decrypted(self.decrypt(
                &envelope.body,
                key,
                iv,
            )?)),
            _ => Ok(OpenedBody::PassedThrough(envelope.body.to_vec())),
        }
    }
}

/// Parse an RSA private key from PKCS#8 or PKCS#1 PEM.
pub fn private_key_from_pem(pem: &str) -> Result<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| MqProbeError::Key(format!("unsupported private key PEM: {e}")))
}

/// Parse an RSA public key from SPKI or PKCS#1 PEM.
pub fn public_key_from_pem(pem: &str) -> Result<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| MqProbeError::Key(format!("unsupported public key PEM: {e}")))
}
