//! Password-based sealing of keystore entries (PBEWithMD5AndTripleDES).
//!
//! This is the SunJCE key protector used for secret-key entries in JCEKS
//! keystores. Key and IV come from two independent iterated MD5 chains, one
//! per half of the 8-byte salt:
//!
//! ```text
//! half_i   = salt[4i .. 4i+4]
//! digest_i = MD5^n(half_i || password)      (n = iteration count)
//! key      = digest_0 || digest_1[..8]      (24 bytes, three-key EDE)
//! iv       = digest_1[8..]                  (8 bytes)
//! ```
//!
//! When both salt halves are equal, the first half is permuted before use.
//! The permutation reproduces a long-standing quirk of the JCE code, which
//! swaps with a typo'd index; anything "fixed" would fail to open real
//! keystores.

use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use des::TdesEde3;
use md5::{Digest, Md5};
use zeroize::Zeroizing;

use super::error::CipherError;
use crate::config::{PBE_SALT_LENGTH, TDES_BLOCK_LENGTH, TDES_THREE_KEY_LENGTH};

type TdesCbcDec = cbc::Decryptor<TdesEde3>;
type TdesCbcEnc = cbc::Encryptor<TdesEde3>;

/// Derived key (24 bytes) followed by the IV (8 bytes).
const DERIVED_LENGTH: usize = TDES_THREE_KEY_LENGTH + TDES_BLOCK_LENGTH;

fn permute_salt_half(half: &mut [u8; 4]) {
    half[2] = half[1];
    half[1] = half[0];
    half[0] = half[3];
}

/// Runs the two MD5 chains and returns `key || iv`. An iteration count of
/// zero is treated as one.
pub fn derive(
    password: &[u8],
    salt: &[u8; PBE_SALT_LENGTH],
    iterations: u32,
) -> Zeroizing<[u8; DERIVED_LENGTH]> {
    let mut halves = [[0u8; 4]; 2];
    halves[0].copy_from_slice(&salt[..4]);
    halves[1].copy_from_slice(&salt[4..]);
    if halves[0] == halves[1] {
        permute_salt_half(&mut halves[0]);
    }

    let mut derived = Zeroizing::new([0u8; DERIVED_LENGTH]);
    for (i, half) in halves.iter().enumerate() {
        let mut chain = Zeroizing::new(half.to_vec());
        for _ in 0..iterations.max(1) {
            let mut hasher = Md5::new();
            hasher.update(chain.as_slice());
            hasher.update(password);
            let digest = hasher.finalize();
            chain.clear();
            chain.extend_from_slice(&digest);
        }
        derived[i * 16..(i + 1) * 16].copy_from_slice(&chain);
    }
    derived
}

/// Decrypts a sealed entry.
pub fn open(
    password: &[u8],
    salt: &[u8; PBE_SALT_LENGTH],
    iterations: u32,
    sealed: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CipherError> {
    if sealed.is_empty() || sealed.len() % TDES_BLOCK_LENGTH != 0 {
        return Err(CipherError::InvalidLength);
    }
    let derived = derive(password, salt, iterations);
    let (key, iv) = derived.split_at(TDES_THREE_KEY_LENGTH);
    TdesCbcDec::new_from_slices(key, iv)
        .map_err(|_| CipherError::InvalidKeyLength)?
        .decrypt_padded_vec_mut::<Pkcs7>(sealed)
        .map(Zeroizing::new)
        .map_err(|_| CipherError::Padding)
}

/// Seals `plaintext` under `password`.
pub fn seal(
    password: &[u8],
    salt: &[u8; PBE_SALT_LENGTH],
    iterations: u32,
    plaintext: &[u8],
) -> Result<Vec<u8>, CipherError> {
    let derived = derive(password, salt, iterations);
    let (key, iv) = derived.split_at(TDES_THREE_KEY_LENGTH);
    Ok(TdesCbcEnc::new_from_slices(key, iv)
        .map_err(|_| CipherError::InvalidKeyLength)?
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SALT: [u8; 8] = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88];

    #[test]
    fn test_single_iteration_matches_plain_md5() {
        let derived = derive(b"pw", &SALT, 1);

        let mut first = Md5::new();
        first.update(&SALT[..4]);
        first.update(b"pw");
        assert_eq!(&derived[..16], first.finalize().as_slice());

        let mut second = Md5::new();
        second.update(&SALT[4..]);
        second.update(b"pw");
        assert_eq!(&derived[16..], second.finalize().as_slice());
    }

    #[test]
    fn test_equal_salt_halves_are_permuted() {
        let salt = [1, 2, 3, 4, 1, 2, 3, 4];
        let derived = derive(b"pw", &salt, 1);

        let mut first = Md5::new();
        first.update([4u8, 1, 2, 4]);
        first.update(b"pw");
        assert_eq!(&derived[..16], first.finalize().as_slice());
    }

    #[test]
    fn test_derivation_depends_on_iterations() {
        assert_ne!(*derive(b"pw", &SALT, 1), *derive(b"pw", &SALT, 2));
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let key = [0x42u8; 24];
        let sealed = seal(b"changeit", &SALT, 50, &key).unwrap();
        let opened = open(b"changeit", &SALT, 50, &sealed).unwrap();
        assert_eq!(opened.as_slice(), &key);
    }

    #[test]
    fn test_open_rejects_ragged_input() {
        assert_eq!(open(b"pw", &SALT, 1, &[0u8; 7]).unwrap_err(), CipherError::InvalidLength);
    }

    #[test]
    fn test_wrong_password_never_recovers_key() {
        let key = [0x42u8; 24];
        let sealed = seal(b"changeit", &SALT, 10, &key).unwrap();
        let attempt = open(b"wrong", &SALT, 10, &sealed);
        assert!(attempt.map(|k| k.as_slice() != key).unwrap_or(true));
    }
}
