//! # Cryptographic Primitives
//!
//! Everything the engine does with a key goes through this module. There
//! are three vendor-mandated transforms, none of which we would pick today,
//! and all of which we must reproduce bit for bit:
//!
//! - **Triple-DES/ECB** ([`tdes`]) — protects the resource artifact and the
//!   terminal entries inside it.
//! - **PBEWithMD5AndTripleDES** ([`pbe`]) — seals the vault key inside the
//!   keystore.
//! - **AES-128-CBC, IV = key** ([`transport`]) — the `trandata` payload in
//!   both directions.
//!
//! Key handles live in [`keys`]. They zero themselves on drop and never
//! print their contents.

pub mod keys;
pub mod pbe;
pub mod tdes;
pub mod transport;

mod error;

pub use error::CipherError;
pub use keys::{KeyMaterial, TransportKey, VaultKey};
