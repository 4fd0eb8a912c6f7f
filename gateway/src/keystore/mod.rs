//! # Keystore
//!
//! Opens the vendor keystore (`keystore.bin`, a Java JCEKS keystore) and
//! unseals the vault key that protects the resource artifact.
//!
//! ## Container layout
//!
//! All integers big-endian. The entry bodies are described in `jceks.rs`.
//!
//! ```text
//! magic      u32    0xCECECECE
//! version    u32    2
//! count      u32
//! entries    count × entry
//! digest     [u8; 20]   SHA-1(passphrase as UTF-16BE || "Mighty Aphrodite" || everything above)
//! ```
//!
//! A secret-key entry is a Java-serialized `SealedObjectForKeyProtector`
//! (see `object_stream.rs`). Its ciphertext is
//! `PBEWithMD5AndTripleDES(passphrase, salt, iterations, serialized key)`,
//! where the key object is a `SecretKeySpec` or the `KeyRep` keytool
//! writes for generated keys.
//!
//! ## Error mapping
//!
//! Structure is checked before the digest, so a corrupt file reports
//! [`GatewayError::KeystoreFormat`] no matter the passphrase. A digest
//! mismatch, an unknown alias and an entry sealed under another password
//! all come back as the same [`GatewayError::KeystoreAccess`].

mod jceks;
mod object_stream;

use std::fmt;
use std::path::Path;

use sha1::{Digest, Sha1};
use tracing::debug;
use zeroize::Zeroizing;

use crate::config::{
    KEYSTORE_DIGEST_LENGTH, KEYSTORE_DIGEST_WHITENER, KEYSTORE_SEAL_ALGORITHM, PBE_MAX_ITERATIONS,
    VENDOR_KEYSTORE_PASSPHRASE,
};
use crate::crypto::{pbe, CipherError, VaultKey};
use crate::error::{GatewayError, Result};

pub(crate) use jceks::{seal_secret_key, ContainerWriter};
use jceks::format_error;
use object_stream::StreamError;

impl From<StreamError> for GatewayError {
    fn from(e: StreamError) -> Self {
        GatewayError::KeystoreFormat(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// PassphrasePolicy
// ---------------------------------------------------------------------------

/// Where the keystore passphrase comes from.
#[derive(Clone, Default)]
pub enum PassphrasePolicy {
    /// The fixed passphrase every resource kit ships with.
    #[default]
    VendorDefault,
    /// A caller-supplied passphrase, wiped on drop.
    Explicit(Zeroizing<String>),
}

impl PassphrasePolicy {
    pub fn explicit(passphrase: impl Into<String>) -> Self {
        Self::Explicit(Zeroizing::new(passphrase.into()))
    }

    pub(crate) fn passphrase(&self) -> &str {
        match self {
            Self::VendorDefault => VENDOR_KEYSTORE_PASSPHRASE,
            Self::Explicit(p) => p.as_str(),
        }
    }
}

impl fmt::Debug for PassphrasePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VendorDefault => f.write_str("VendorDefault"),
            Self::Explicit(_) => f.write_str("Explicit(<redacted>)"),
        }
    }
}

/// Integrity digest over a container body. Also used when writing one.
pub(crate) fn integrity_digest(passphrase: &str, body: &[u8]) -> [u8; KEYSTORE_DIGEST_LENGTH] {
    let mut hasher = Sha1::new();
    let mut unit = [0u8; 2];
    for c in passphrase.encode_utf16() {
        unit.copy_from_slice(&c.to_be_bytes());
        hasher.update(unit);
    }
    hasher.update(KEYSTORE_DIGEST_WHITENER);
    hasher.update(body);
    hasher.finalize().into()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ---------------------------------------------------------------------------
// Keystore
// ---------------------------------------------------------------------------

/// Reader for the vendor keystore.
pub struct Keystore;

impl Keystore {
    /// Reads the keystore at `path` and unseals the entry `alias`.
    pub fn open(
        path: impl AsRef<Path>,
        alias: &str,
        policy: &PassphrasePolicy,
    ) -> Result<VaultKey> {
        let path = path.as_ref();
        let bytes = Zeroizing::new(std::fs::read(path).map_err(|source| {
            GatewayError::KeystoreIo {
                path: path.to_path_buf(),
                source,
            }
        })?);
        Self::from_bytes(&bytes, alias, policy)
    }

    /// Same as [`Keystore::open`] for a container already in memory.
    pub fn from_bytes(container: &[u8], alias: &str, policy: &PassphrasePolicy) -> Result<VaultKey> {
        if container.len() < KEYSTORE_DIGEST_LENGTH {
            return Err(format_error("truncated"));
        }
        let (body, digest) = container.split_at(container.len() - KEYSTORE_DIGEST_LENGTH);
        let entries = jceks::parse_container(body)?;

        let passphrase = policy.passphrase();
        if !constant_time_eq(&integrity_digest(passphrase, body), digest) {
            debug!("keystore integrity digest mismatch");
            return Err(GatewayError::KeystoreAccess);
        }

        // Java keystores fold aliases to lower case.
        let wanted = alias.to_lowercase();
        let entry = entries
            .iter()
            .find(|e| e.alias.to_lowercase() == wanted)
            .ok_or_else(|| {
                debug!(alias, "key alias not present in keystore");
                GatewayError::KeystoreAccess
            })?;

        if !entry.seal_alg.eq_ignore_ascii_case(KEYSTORE_SEAL_ALGORITHM) {
            return Err(format_error(format!(
                "unsupported seal algorithm {}",
                entry.seal_alg
            )));
        }
        if entry.iterations == 0 || entry.iterations > PBE_MAX_ITERATIONS {
            return Err(format_error(format!(
                "iteration count {} out of range",
                entry.iterations
            )));
        }

        let plaintext = pbe::open(passphrase.as_bytes(), &entry.salt, entry.iterations, &entry.ciphertext)
            .map_err(|e| match e {
                CipherError::Padding => {
                    debug!(alias, "sealed key did not decrypt under the store passphrase");
                    GatewayError::KeystoreAccess
                }
                other => format_error(format!("sealed key: {other}")),
            })?;
        let raw = jceks::unwrap_key(&plaintext)?;
        let key = VaultKey::from_bytes(raw).map_err(|e| format_error(format!("vault key: {e}")))?;

        debug!(alias, key = %key.fingerprint(), "vault key unsealed");
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_KEY_ALIAS, PBE_SALT_LENGTH};
    use crate::provision::KeystoreBuilder;

    const KEYTOOL_PGKEY: &[u8] = include_bytes!("../../tests/fixtures/keytool_pgkey.jceks");
    const MERCHANT_KIT: &[u8] = include_bytes!("../../tests/fixtures/merchant_kit.jceks");

    fn sample(passphrase: &str) -> Vec<u8> {
        KeystoreBuilder::new()
            .iterations(10)
            .secret_key(DEFAULT_KEY_ALIAS, &[0x24; 24])
            .build(passphrase)
            .unwrap()
    }

    #[test]
    fn test_open_with_vendor_default() {
        let bytes = sample(VENDOR_KEYSTORE_PASSPHRASE);
        let key = Keystore::from_bytes(&bytes, "pgkey", &PassphrasePolicy::VendorDefault).unwrap();
        assert_eq!(key.as_bytes(), &[0x24; 24]);
    }

    #[test]
    fn test_open_keytool_generated_key() {
        // keytool -genseckey -keyalg DESede -storetype JCEKS, stored as a KeyRep.
        let key = Keystore::from_bytes(KEYTOOL_PGKEY, "pgkey", &PassphrasePolicy::VendorDefault)
            .unwrap();
        assert_eq!(
            hex::encode(key.as_bytes()),
            "1938e35808109ed385ea0edafb6226ce858ff4e554d5e601"
        );
    }

    #[test]
    fn test_open_keystore_with_private_key_entry() {
        let policy = PassphrasePolicy::explicit("s3cret");
        let key = Keystore::from_bytes(MERCHANT_KIT, "PGKEY", &policy).unwrap();
        assert_eq!(
            hex::encode(key.as_bytes()),
            "0123456789abcdeffedcba98765432100f1e2d3c4b5a6978"
        );

        // `tls` exists, but holds a private key rather than a secret key.
        let err = Keystore::from_bytes(MERCHANT_KIT, "tls", &policy).unwrap_err();
        assert!(matches!(err, GatewayError::KeystoreAccess));

        let err = Keystore::from_bytes(MERCHANT_KIT, "pgkey", &PassphrasePolicy::VendorDefault)
            .unwrap_err();
        assert!(matches!(err, GatewayError::KeystoreAccess));
    }

    #[test]
    fn test_alias_lookup_is_case_insensitive() {
        let bytes = sample("password");
        assert!(Keystore::from_bytes(&bytes, "PGKEY", &PassphrasePolicy::VendorDefault).is_ok());
    }

    #[test]
    fn test_wrong_passphrase_and_unknown_alias_look_the_same() {
        let bytes = sample("s3cret");
        let wrong_pass =
            Keystore::from_bytes(&bytes, "pgkey", &PassphrasePolicy::VendorDefault).unwrap_err();
        let wrong_alias =
            Keystore::from_bytes(&bytes, "other", &PassphrasePolicy::explicit("s3cret")).unwrap_err();
        assert!(matches!(wrong_pass, GatewayError::KeystoreAccess));
        assert!(matches!(wrong_alias, GatewayError::KeystoreAccess));
        assert_eq!(wrong_pass.to_string(), wrong_alias.to_string());
    }

    #[test]
    fn test_entry_sealed_under_other_password_is_access_error() {
        // Container signed with the store passphrase, key sealed with another.
        let salt = [5u8; PBE_SALT_LENGTH];
        let sealed = seal_secret_key("keypass", &salt, 10, &[0x24; 24]).unwrap();
        let mut writer = ContainerWriter::new(1, 0).unwrap();
        writer.secret_key("pgkey", &sealed).unwrap();
        let bytes = writer.finish(VENDOR_KEYSTORE_PASSPHRASE);

        let err = Keystore::from_bytes(&bytes, "pgkey", &PassphrasePolicy::VendorDefault)
            .unwrap_err();
        assert!(matches!(err, GatewayError::KeystoreAccess));
    }

    #[test]
    fn test_bad_magic_is_format_error_regardless_of_passphrase() {
        let mut bytes = sample("password");
        bytes[0] ^= 0xFF;
        let err = Keystore::from_bytes(&bytes, "pgkey", &PassphrasePolicy::explicit("nope"))
            .unwrap_err();
        assert!(matches!(err, GatewayError::KeystoreFormat(_)));
    }

    #[test]
    fn test_truncation_is_format_error() {
        let bytes = sample("password");
        for cut in [0, 3, 12, 30, 60, bytes.len() - 21] {
            let err = Keystore::from_bytes(&bytes[..cut], "pgkey", &PassphrasePolicy::VendorDefault)
                .unwrap_err();
            assert!(matches!(err, GatewayError::KeystoreFormat(_)), "cut at {cut}");
        }
    }

    #[test]
    fn test_body_tamper_fails_digest() {
        // The last body byte belongs to the certificate of `tls`.
        let mut bytes = MERCHANT_KIT.to_vec();
        let last = bytes.len() - KEYSTORE_DIGEST_LENGTH - 1;
        bytes[last] ^= 0x01;
        let err = Keystore::from_bytes(&bytes, "pgkey", &PassphrasePolicy::explicit("s3cret"))
            .unwrap_err();
        assert!(matches!(err, GatewayError::KeystoreAccess));
    }

    #[test]
    fn test_stream_corruption_is_format_error() {
        let mut bytes = sample("password");
        // Stream magic of the sealed object, right after the entry header.
        let stream = 12 + 4 + 2 + DEFAULT_KEY_ALIAS.len() + 8;
        assert_eq!(&bytes[stream..stream + 2], &[0xAC, 0xED]);
        bytes[stream] = 0x00;
        let err = Keystore::from_bytes(&bytes, "pgkey", &PassphrasePolicy::VendorDefault)
            .unwrap_err();
        assert!(matches!(err, GatewayError::KeystoreFormat(_)));
    }

    #[test]
    fn test_other_entries_are_skipped() {
        let bytes = KeystoreBuilder::new()
            .iterations(5)
            .trusted_certificate("cert", b"\x30\x03\x02\x01\x00")
            .secret_key("pgkey", &[9u8; 16])
            .build("password")
            .unwrap();
        let key = Keystore::from_bytes(&bytes, "pgkey", &PassphrasePolicy::VendorDefault).unwrap();
        assert_eq!(key.len(), 16);
        let err = Keystore::from_bytes(&bytes, "cert", &PassphrasePolicy::VendorDefault)
            .unwrap_err();
        assert!(matches!(err, GatewayError::KeystoreAccess));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = Keystore::open("/nonexistent/keystore.bin", "pgkey", &PassphrasePolicy::VendorDefault)
            .unwrap_err();
        assert!(matches!(err, GatewayError::KeystoreIo { .. }));
    }

    #[test]
    fn test_policy_debug_redacts() {
        let debug = format!("{:?}", PassphrasePolicy::explicit("hunter2"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_digest_matches_utf16_layout() {
        let mut hasher = Sha1::new();
        hasher.update([0x00, b'a', 0x00, b'b']);
        hasher.update(KEYSTORE_DIGEST_WHITENER);
        hasher.update(b"body");
        let expected: [u8; 20] = hasher.finalize().into();
        assert_eq!(integrity_digest("ab", b"body"), expected);
    }
}
