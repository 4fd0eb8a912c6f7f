//! # `trandata` Transform
//!
//! The confidentiality transform the gateway applies to request and
//! callback payloads: AES-128-CBC with PKCS#7 padding, where the IV is the
//! key itself, rendered as hex.
//!
//! ## What this transform does NOT give you
//!
//! There is no MAC. CBC on its own is malleable, so "authentication" here
//! rests on the decoder being strict about everything that comes out of
//! [`open`]: the hex must be well-formed and single-case, the length a whole
//! number of blocks, the padding valid, and (checked by the callback
//! decoder) the plaintext a printable form encoding whose fields agree with
//! the cleartext copies. Flipping a ciphertext bit scrambles a full
//! 16-byte plaintext block, which then fails those checks with
//! overwhelming probability.
//!
//! Letter case is not covered. An all-uppercase blob, or a blob with a
//! single hex letter whose case is flipped, decodes to the same ciphertext
//! bytes and opens to the same payload. Only mixed case is rejected.
//!
//! ## Determinism
//!
//! Fixed IV means the same plaintext under the same key always produces the
//! same blob. The vendor protocol defines no nonce, so none is added.

use aes::Aes128;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use zeroize::Zeroizing;

use super::error::CipherError;
use super::keys::TransportKey;
use crate::config::TRANSPORT_KEY_LENGTH;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Encrypts `plaintext` and returns lowercase hex.
pub fn seal(key: &TransportKey, plaintext: &[u8]) -> Result<String, CipherError> {
    let k = key.as_bytes();
    let ciphertext = Aes128CbcEnc::new_from_slices(k, k)
        .map_err(|_| CipherError::InvalidKeyLength)?
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
    Ok(hex::encode(ciphertext))
}

/// Decodes and decrypts a hex blob.
pub fn open(key: &TransportKey, blob: &str) -> Result<Zeroizing<Vec<u8>>, CipherError> {
    let ciphertext = decode_blob(blob)?;
    let k = key.as_bytes();
    Aes128CbcDec::new_from_slices(k, k)
        .map_err(|_| CipherError::InvalidKeyLength)?
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| CipherError::Padding)
}

/// Hex-decodes a blob. Letters must all share one case, either one; a
/// re-cased blob is the same ciphertext.
pub fn decode_blob(blob: &str) -> Result<Vec<u8>, CipherError> {
    let has_upper = blob.bytes().any(|b| b.is_ascii_uppercase());
    let has_lower = blob.bytes().any(|b| b.is_ascii_lowercase());
    if has_upper && has_lower {
        return Err(CipherError::MixedCaseHex);
    }

    let bytes = hex::decode(blob).map_err(|_| CipherError::InvalidHex)?;
    if bytes.is_empty() || bytes.len() % TRANSPORT_KEY_LENGTH != 0 {
        return Err(CipherError::InvalidLength);
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> TransportKey {
        TransportKey::from_slice(b"1234567890ABCDEF").unwrap()
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let blob = seal(&key(), b"result=CAPTURED&trackid=1").unwrap();
        let opened = open(&key(), &blob).unwrap();
        assert_eq!(opened.as_slice(), b"result=CAPTURED&trackid=1");
    }

    #[test]
    fn test_seal_is_deterministic_lowercase_hex() {
        let a = seal(&key(), b"amt=1.000").unwrap();
        let b = seal(&key(), b"amt=1.000").unwrap();
        assert_eq!(a, b);
        assert!(a.bytes().all(|c| c.is_ascii_digit() || (b'a'..=b'f').contains(&c)));
        assert_eq!(a.len() % (TRANSPORT_KEY_LENGTH * 2), 0);
    }

    #[test]
    fn test_uppercase_blob_accepted() {
        let blob = seal(&key(), b"x=1").unwrap().to_ascii_uppercase();
        assert_eq!(open(&key(), &blob).unwrap().as_slice(), b"x=1");
    }

    #[test]
    fn test_mixed_case_blob_rejected() {
        let mut blob = seal(&key(), b"paymentid=100").unwrap();
        let pos = blob.find(|c: char| c.is_ascii_lowercase()).expect("hex letter");
        let upper = blob[pos..pos + 1].to_ascii_uppercase();
        blob.replace_range(pos..pos + 1, &upper);
        assert_eq!(open(&key(), &blob).unwrap_err(), CipherError::MixedCaseHex);
    }

    #[test]
    fn test_case_flip_decodes_identically_unless_mixed() {
        let one_letter = format!("{}a", "0".repeat(31));
        let flipped = format!("{}A", "0".repeat(31));
        assert_eq!(decode_blob(&one_letter).unwrap(), decode_blob(&flipped).unwrap());

        let two_letters = format!("b{}a", "0".repeat(30));
        let flipped = format!("b{}A", "0".repeat(30));
        assert!(decode_blob(&two_letters).is_ok());
        assert_eq!(decode_blob(&flipped).unwrap_err(), CipherError::MixedCaseHex);
    }

    #[test]
    fn test_non_hex_rejected() {
        assert_eq!(open(&key(), "zz").unwrap_err(), CipherError::InvalidHex);
        assert_eq!(open(&key(), "abc").unwrap_err(), CipherError::InvalidHex);
    }

    #[test]
    fn test_partial_block_rejected() {
        assert_eq!(open(&key(), "00112233").unwrap_err(), CipherError::InvalidLength);
        assert_eq!(open(&key(), "").unwrap_err(), CipherError::InvalidLength);
    }

    #[test]
    fn test_last_block_tamper_fails() {
        let blob = seal(&key(), b"result=CAPTURED").unwrap();
        let mut bytes = hex::decode(&blob).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = hex::encode(bytes);
        assert!(open(&key(), &tampered).map(|p| p.as_slice() != b"result=CAPTURED").unwrap_or(true));
    }
}
