//! JCEKS container framing and the key protector around secret-key entries.
//!
//! ```text
//! container  = magic u32 | version u32 | count u32 | count × entry | digest [u8; 20]
//! entry      = tag u32 | alias utf | timestamp u64 (ms) | body
//!
//! body (1)   = key_len u32 | protected key | chain u32 | chain × (type utf | len u32 | der)
//! body (2)   = type utf | len u32 | der
//! body (3)   = serialized SealedObjectForKeyProtector
//! ```
//!
//! `utf` is Java's `writeUTF`: a u16 length and modified UTF-8. The sealed
//! object carries the PBE parameters as DER (`SEQUENCE { OCTET STRING salt,
//! INTEGER iterations }`) and the ciphertext of a second serialized object,
//! a `SecretKeySpec` or the `KeyRep` keytool writes in its place.

use tracing::debug;
use zeroize::Zeroizing;

use super::object_stream::{
    encode_modified_utf8, read_object, ByteReader, ObjectWriter, KEY_REP,
    SEALED_OBJECT_FOR_KEY_PROTECTOR, SECRET_KEY_SPEC,
};
use super::integrity_digest;
use crate::config::{
    KEYSTORE_MAGIC, KEYSTORE_SEAL_ALGORITHM, KEYSTORE_TAG_PRIVATE_KEY, KEYSTORE_TAG_SECRET_KEY,
    KEYSTORE_TAG_TRUSTED_CERT, KEYSTORE_VERSION, PBE_SALT_LENGTH,
};
use crate::crypto::pbe;
use crate::error::{GatewayError, Result};

const DER_SEQUENCE: u8 = 0x30;
const DER_OCTET_STRING: u8 = 0x04;
const DER_INTEGER: u8 = 0x02;

/// Certificate type keytool records for every certificate it stores.
const CERTIFICATE_TYPE: &str = "X.509";

/// Smallest possible entry: tag, empty alias, timestamp, empty trusted
/// certificate body.
const MIN_ENTRY_LENGTH: usize = 4 + 2 + 8 + 2 + 4;

pub(crate) fn format_error(reason: impl Into<String>) -> GatewayError {
    GatewayError::KeystoreFormat(reason.into())
}

/// A secret-key entry, still sealed.
pub(crate) struct SealedEntry {
    pub alias: String,
    pub salt: [u8; PBE_SALT_LENGTH],
    pub iterations: u32,
    pub ciphertext: Vec<u8>,
    pub seal_alg: String,
}

fn skip_certificate(r: &mut ByteReader<'_>) -> Result<()> {
    r.utf()?;
    let len = r.u32()? as usize;
    r.take(len)?;
    Ok(())
}

fn sealed_entry(alias: String, r: &mut ByteReader<'_>) -> Result<SealedEntry> {
    let object = read_object(r)?;
    if object.class_name() != SEALED_OBJECT_FOR_KEY_PROTECTOR.name {
        return Err(format_error(format!(
            "secret-key entry holds a {}",
            object.class_name()
        )));
    }
    let missing = |field: &str| format_error(format!("sealed key has no {field}"));

    let params = object.bytes("encodedParams").ok_or_else(|| missing("encodedParams"))?;
    let (salt, iterations) = parse_pbe_params(params)?;
    let ciphertext = object
        .bytes("encryptedContent")
        .ok_or_else(|| missing("encryptedContent"))?
        .to_vec();
    let seal_alg = object.string("sealAlg").ok_or_else(|| missing("sealAlg"))?;

    Ok(SealedEntry {
        alias,
        salt,
        iterations,
        ciphertext,
        seal_alg: seal_alg.to_string(),
    })
}

/// Walks every entry of a container body (digest already split off) and
/// returns the secret-key entries. Other entry kinds are checked for
/// framing and skipped.
pub(crate) fn parse_container(body: &[u8]) -> Result<Vec<SealedEntry>> {
    let mut r = ByteReader::new(body);

    if r.u32()? != KEYSTORE_MAGIC {
        return Err(format_error("bad magic"));
    }
    let version = r.u32()?;
    if version != KEYSTORE_VERSION {
        return Err(format_error(format!("unsupported version {version}")));
    }
    let count = r.u32()? as usize;
    if count > r.remaining() / MIN_ENTRY_LENGTH {
        return Err(format_error("entry count exceeds container size"));
    }

    let mut entries = Vec::new();
    for _ in 0..count {
        let tag = r.u32()?;
        let alias = r.utf()?;
        let _timestamp = r.u64()?;

        match tag {
            KEYSTORE_TAG_PRIVATE_KEY => {
                let len = r.u32()? as usize;
                r.take(len)?;
                let chain = r.u32()? as usize;
                for _ in 0..chain {
                    skip_certificate(&mut r)?;
                }
            }
            KEYSTORE_TAG_TRUSTED_CERT => skip_certificate(&mut r)?,
            KEYSTORE_TAG_SECRET_KEY => entries.push(sealed_entry(alias, &mut r)?),
            other => return Err(format_error(format!("unknown entry tag {other}"))),
        }
    }

    if r.remaining() != 0 {
        return Err(format_error("trailing bytes after entries"));
    }
    Ok(entries)
}

// ---------------------------------------------------------------------------
// PBE parameters
// ---------------------------------------------------------------------------

fn der_header(r: &mut ByteReader<'_>, tag: u8) -> Result<usize> {
    if r.u8()? != tag {
        return Err(format_error("malformed PBE parameters"));
    }
    match r.u8()? {
        short @ 0x00..=0x7F => Ok(short as usize),
        0x81 => Ok(r.u8()? as usize),
        _ => Err(format_error("malformed PBE parameters")),
    }
}

pub(crate) fn parse_pbe_params(der: &[u8]) -> Result<([u8; PBE_SALT_LENGTH], u32)> {
    let mut r = ByteReader::new(der);
    if der_header(&mut r, DER_SEQUENCE)? != r.remaining() {
        return Err(format_error("malformed PBE parameters"));
    }

    if der_header(&mut r, DER_OCTET_STRING)? != PBE_SALT_LENGTH {
        return Err(format_error("PBE salt is not 8 bytes"));
    }
    let mut salt = [0u8; PBE_SALT_LENGTH];
    salt.copy_from_slice(r.take(PBE_SALT_LENGTH)?);

    let len = der_header(&mut r, DER_INTEGER)?;
    let int = r.take(len)?;
    if int.is_empty() || int.len() > 5 || int[0] & 0x80 != 0 {
        return Err(format_error("PBE iteration count out of range"));
    }
    let iterations = int.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
    let iterations = u32::try_from(iterations)
        .map_err(|_| format_error("PBE iteration count out of range"))?;

    if r.remaining() != 0 {
        return Err(format_error("malformed PBE parameters"));
    }
    Ok((salt, iterations))
}

pub(crate) fn encode_pbe_params(salt: &[u8; PBE_SALT_LENGTH], iterations: u32) -> Vec<u8> {
    let bytes = iterations.to_be_bytes();
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
    let mut int = bytes[start..].to_vec();
    if int[0] & 0x80 != 0 {
        int.insert(0, 0);
    }

    let inner_len = 2 + PBE_SALT_LENGTH + 2 + int.len();
    let mut der = Vec::with_capacity(2 + inner_len);
    der.extend_from_slice(&[DER_SEQUENCE, inner_len as u8, DER_OCTET_STRING, PBE_SALT_LENGTH as u8]);
    der.extend_from_slice(salt);
    der.extend_from_slice(&[DER_INTEGER, int.len() as u8]);
    der.extend_from_slice(&int);
    der
}

// ---------------------------------------------------------------------------
// Key objects
// ---------------------------------------------------------------------------

/// Pulls the raw key out of a decrypted key stream. A stream that does not
/// parse is what a wrong key password produces once in a while (the
/// padding happened to check out), so it is reported as access denied.
pub(crate) fn unwrap_key(plaintext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let mut r = ByteReader::new(plaintext);
    let object = match read_object(&mut r) {
        Ok(object) if r.remaining() == 0 => object,
        Ok(_) | Err(_) => {
            debug!("decrypted key entry is not a serialized key");
            return Err(GatewayError::KeystoreAccess);
        }
    };

    let key = match object.class_name() {
        name if name == SECRET_KEY_SPEC.name => object.bytes("key"),
        KEY_REP => {
            if object.constant("type") != Some("SECRET") || object.string("format") != Some("RAW")
            {
                return Err(format_error("key entry is not a raw secret key"));
            }
            object.bytes("encoded")
        }
        other => return Err(format_error(format!("unsupported key class {other}"))),
    };
    let key = key.ok_or_else(|| format_error("key object has no key bytes"))?;

    debug!(
        class = object.class_name(),
        algorithm = object.string("algorithm").unwrap_or_default(),
        "key object decoded"
    );
    Ok(Zeroizing::new(key.to_vec()))
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Seals `key` the way `KeyStore.setKeyEntry` does for a DESede
/// `SecretKeySpec` and returns the serialized sealed object.
pub(crate) fn seal_secret_key(
    password: &str,
    salt: &[u8; PBE_SALT_LENGTH],
    iterations: u32,
    key: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    let mut plain = ObjectWriter::new();
    plain.begin_object(&SECRET_KEY_SPEC);
    plain.string("DESede");
    plain.byte_array(key);
    let plaintext = plain.finish();

    let ciphertext = pbe::seal(password.as_bytes(), salt, iterations, &plaintext)
        .map_err(|e| format_error(e.to_string()))?;

    let mut sealed = ObjectWriter::new();
    sealed.begin_object(&SEALED_OBJECT_FOR_KEY_PROTECTOR);
    sealed.byte_array(&encode_pbe_params(salt, iterations));
    sealed.byte_array(&ciphertext);
    sealed.string(KEYSTORE_SEAL_ALGORITHM);
    sealed.string(KEYSTORE_SEAL_ALGORITHM);
    Ok(sealed.finish())
}

/// Appends entries to a container and signs it.
pub(crate) struct ContainerWriter {
    buf: Vec<u8>,
    timestamp: u64,
}

impl ContainerWriter {
    pub fn new(count: usize, timestamp: u64) -> Result<Self> {
        let count = u32::try_from(count).map_err(|_| format_error("too many entries"))?;
        let mut buf = Vec::with_capacity(512);
        buf.extend_from_slice(&KEYSTORE_MAGIC.to_be_bytes());
        buf.extend_from_slice(&KEYSTORE_VERSION.to_be_bytes());
        buf.extend_from_slice(&count.to_be_bytes());
        Ok(Self { buf, timestamp })
    }

    fn utf(&mut self, s: &str) -> Result<()> {
        let bytes = encode_modified_utf8(s);
        let len = u16::try_from(bytes.len()).map_err(|_| format_error("string too long"))?;
        self.buf.extend_from_slice(&len.to_be_bytes());
        self.buf.extend_from_slice(&bytes);
        Ok(())
    }

    fn entry_header(&mut self, tag: u32, alias: &str) -> Result<()> {
        self.buf.extend_from_slice(&tag.to_be_bytes());
        // keytool stores aliases lower-cased.
        self.utf(&alias.to_lowercase())?;
        self.buf.extend_from_slice(&self.timestamp.to_be_bytes());
        Ok(())
    }

    /// Adds a secret-key entry from the output of [`seal_secret_key`].
    pub fn secret_key(&mut self, alias: &str, sealed: &[u8]) -> Result<()> {
        self.entry_header(KEYSTORE_TAG_SECRET_KEY, alias)?;
        self.buf.extend_from_slice(sealed);
        Ok(())
    }

    pub fn trusted_certificate(&mut self, alias: &str, der: &[u8]) -> Result<()> {
        let len = u32::try_from(der.len()).map_err(|_| format_error("certificate too large"))?;
        self.entry_header(KEYSTORE_TAG_TRUSTED_CERT, alias)?;
        self.utf(CERTIFICATE_TYPE)?;
        self.buf.extend_from_slice(&len.to_be_bytes());
        self.buf.extend_from_slice(der);
        Ok(())
    }

    /// Appends the integrity digest and returns the container.
    pub fn finish(mut self, passphrase: &str) -> Vec<u8> {
        let digest = integrity_digest(passphrase, &self.buf);
        self.buf.extend_from_slice(&digest);
        self.buf
    }
}
