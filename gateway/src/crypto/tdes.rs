//! Triple-DES in ECB mode with PKCS#5 padding.
//!
//! This is how the resource kit protects the resource artifact and each
//! terminal entry inside it. ECB is a poor mode by any modern standard, but
//! the layout is the vendor's and there is nothing to choose here. The key
//! length picks the variant: 16 bytes is two-key EDE, 24 bytes three-key.

use des::{TdesEde2, TdesEde3};
use ecb::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyInit};
use zeroize::Zeroizing;

use super::error::CipherError;
use super::keys::VaultKey;
use crate::config::{TDES_BLOCK_LENGTH, TDES_THREE_KEY_LENGTH, TDES_TWO_KEY_LENGTH};

/// Decrypts `ciphertext` and strips the padding.
///
/// The plaintext comes back in a zeroizing buffer since it is either the
/// resource archive or a terminal's credentials.
pub fn decrypt_ecb(key: &VaultKey, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, CipherError> {
    if ciphertext.is_empty() || ciphertext.len() % TDES_BLOCK_LENGTH != 0 {
        return Err(CipherError::InvalidLength);
    }

    let plaintext = match key.len() {
        TDES_TWO_KEY_LENGTH => ecb::Decryptor::<TdesEde2>::new_from_slice(key.as_bytes())
            .map_err(|_| CipherError::InvalidKeyLength)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        TDES_THREE_KEY_LENGTH => ecb::Decryptor::<TdesEde3>::new_from_slice(key.as_bytes())
            .map_err(|_| CipherError::InvalidKeyLength)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        _ => return Err(CipherError::InvalidKeyLength),
    };

    plaintext.map(Zeroizing::new).map_err(|_| CipherError::Padding)
}

/// Pads and encrypts `plaintext`. Only the sandbox provisioner writes
/// resource artifacts; the engine itself never needs to.
pub fn encrypt_ecb(key: &VaultKey, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
    match key.len() {
        TDES_TWO_KEY_LENGTH => Ok(ecb::Encryptor::<TdesEde2>::new_from_slice(key.as_bytes())
            .map_err(|_| CipherError::InvalidKeyLength)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext)),
        TDES_THREE_KEY_LENGTH => Ok(ecb::Encryptor::<TdesEde3>::new_from_slice(key.as_bytes())
            .map_err(|_| CipherError::InvalidKeyLength)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext)),
        _ => Err(CipherError::InvalidKeyLength),
    }
}
