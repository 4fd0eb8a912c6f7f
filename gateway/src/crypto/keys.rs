//! # Key Handles
//!
//! Typed wrappers for every piece of secret material the engine touches:
//!
//! - [`VaultKey`] — the triple-DES key pulled out of the keystore. It has
//!   exactly one job, unlocking the resource artifact, and is dropped as
//!   soon as that is done.
//! - [`TransportKey`] — the terminal's AES resource key, used for the
//!   `trandata` transform in both directions.
//! - [`KeyMaterial`] — what a terminal session holds for its lifetime:
//!   outbound and inbound transport keys plus the tranportal password.
//!
//! All of them live in [`Zeroizing`] buffers and are wiped on drop, on
//! every path including early returns. None of them implement `Serialize`,
//! and their `Debug` output is a short SHA-256 fingerprint. Raw bytes are
//! only reachable from inside the crate.

use std::fmt;

use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::error::CipherError;
use crate::config::{TDES_THREE_KEY_LENGTH, TDES_TWO_KEY_LENGTH, TRANSPORT_KEY_LENGTH};

/// Length of the hex fingerprint printed for keys (8 bytes of SHA-256).
const FINGERPRINT_BYTES: usize = 8;

fn fingerprint(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(&digest[..FINGERPRINT_BYTES])
}

// ---------------------------------------------------------------------------
// VaultKey
// ---------------------------------------------------------------------------

/// Triple-DES key protecting the resource artifact.
pub struct VaultKey {
    bytes: Zeroizing<Vec<u8>>,
}

impl VaultKey {
    /// Wraps raw key bytes. Two-key (16 bytes) and three-key (24 bytes)
    /// triple-DES are both in circulation.
    pub(crate) fn from_bytes(bytes: Zeroizing<Vec<u8>>) -> Result<Self, CipherError> {
        match bytes.len() {
            TDES_TWO_KEY_LENGTH | TDES_THREE_KEY_LENGTH => Ok(Self { bytes }),
            _ => Err(CipherError::InvalidKeyLength),
        }
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Key length in bytes (16 or 24).
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always `false`; a vault key cannot be constructed empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Short SHA-256 fingerprint, safe to log.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.bytes)
    }
}

impl fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VaultKey(tdes{}, {})", self.len() * 8, self.fingerprint())
    }
}

// ---------------------------------------------------------------------------
// TransportKey
// ---------------------------------------------------------------------------

/// AES-128 key used for the `trandata` transform. Also the CBC IV.
pub struct TransportKey {
    bytes: Zeroizing<[u8; TRANSPORT_KEY_LENGTH]>,
}

impl TransportKey {
    /// Copies a 16-byte key out of `slice`.
    pub(crate) fn from_slice(slice: &[u8]) -> Result<Self, CipherError> {
        if slice.len() != TRANSPORT_KEY_LENGTH {
            return Err(CipherError::InvalidKeyLength);
        }
        let mut bytes = Zeroizing::new([0u8; TRANSPORT_KEY_LENGTH]);
        bytes.copy_from_slice(slice);
        Ok(Self { bytes })
    }

    pub(crate) fn as_bytes(&self) -> &[u8; TRANSPORT_KEY_LENGTH] {
        &self.bytes
    }

    /// Short SHA-256 fingerprint, safe to log.
    pub fn fingerprint(&self) -> String {
        fingerprint(self.bytes.as_slice())
    }
}

impl Clone for TransportKey {
    /// Every copy is one more buffer to wipe. The copy lands in its own
    /// zeroizing box.
    fn clone(&self) -> Self {
        Self {
            bytes: Zeroizing::new(*self.bytes),
        }
    }
}

impl fmt::Debug for TransportKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransportKey({})", self.fingerprint())
    }
}

// ---------------------------------------------------------------------------
// KeyMaterial
// ---------------------------------------------------------------------------

/// Secret material owned by one terminal session.
///
/// The resource kit uses a single resource key for both directions, so
/// `outbound` and `inbound` start out as copies of each other; they are
/// kept separate so each code path names the key it actually means.
pub struct KeyMaterial {
    outbound: TransportKey,
    inbound: TransportKey,
    portal_password: Zeroizing<String>,
}

impl KeyMaterial {
    pub(crate) fn new(resource_key: TransportKey, portal_password: Zeroizing<String>) -> Self {
        Self {
            outbound: resource_key.clone(),
            inbound: resource_key,
            portal_password,
        }
    }

    /// Key that encrypts request payloads.
    pub(crate) fn outbound(&self) -> &TransportKey {
        &self.outbound
    }

    /// Key that decrypts callback payloads.
    pub(crate) fn inbound(&self) -> &TransportKey {
        &self.inbound
    }

    /// Tranportal password, sent only inside the encrypted payload.
    pub(crate) fn portal_password(&self) -> &str {
        &self.portal_password
    }

    /// Fingerprint of the outbound key, for logs.
    pub fn fingerprint(&self) -> String {
        self.outbound.fingerprint()
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("outbound", &self.outbound)
            .field("inbound", &self.inbound)
            .field("portal_password", &"<redacted>")
            .finish()
    }
}
