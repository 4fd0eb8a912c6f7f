//! Errors raised by the cipher primitives.
//!
//! Kept vague on purpose. "Bad padding" versus "wrong key" is exactly the
//! kind of oracle an attacker probing the callback endpoint would love to
//! have, so callers map every variant onto a coarse [`crate::GatewayError`].

use thiserror::Error;

/// Failure of a low-level cipher operation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("invalid key length")]
    InvalidKeyLength,

    #[error("ciphertext is not valid hex")]
    InvalidHex,

    #[error("ciphertext mixes upper and lower case hex")]
    MixedCaseHex,

    #[error("ciphertext length is not a whole number of blocks")]
    InvalidLength,

    #[error("decryption failed -- wrong key or corrupted ciphertext")]
    Padding,
}
