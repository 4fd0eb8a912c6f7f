//! # Protocol Configuration & Constants
//!
//! Every magic number of the iPay resource-kit protocol lives here. The
//! vendor defines these values; none of them are ours to negotiate. If the
//! gateway changes one, this is the only file that should need to move.
//!
//! The second half of the module holds [`GatewayConfig`], the set of
//! knobs a merchant turns when opening a terminal session.

use std::path::{Path, PathBuf};

use crate::keystore::PassphrasePolicy;
use crate::transaction::types::{Currency, Language};

// ---------------------------------------------------------------------------
// Protocol Identity
// ---------------------------------------------------------------------------

/// Version tag of the only wire protocol this crate speaks: hosted
/// purchase through the resource kit.
pub const PROTOCOL_VERSION: &str = "ipay-hosted-1";

/// Page on the gateway that accepts hosted payment initialisation.
pub const PAYMENT_PAGE: &str = "PaymentHTTP.htm";

/// Value of the cleartext `param` query parameter on the redirect.
pub const PAYMENT_INIT_PARAM: &str = "paymentInit";

/// Action code for a purchase. Refund (2), void (3) and inquiry (8) exist
/// in the vendor protocol but are not spoken here.
pub const ACTION_PURCHASE: u8 = 1;

// ---------------------------------------------------------------------------
// Wire Field Names
// ---------------------------------------------------------------------------

/// Query/body parameter carrying the encrypted payload, in both directions.
pub const FIELD_TRANDATA: &str = "trandata";

/// Cleartext terminal id on the redirect URL.
pub const FIELD_TRANPORTAL_ID: &str = "tranportalId";

/// Callback fields. Spelling and casing are the gateway's.
pub const FIELD_PAYMENT_ID: &str = "paymentid";
pub const FIELD_RESULT: &str = "result";
pub const FIELD_AUTH: &str = "auth";
pub const FIELD_AMOUNT: &str = "amt";
pub const FIELD_REF: &str = "ref";
pub const FIELD_POST_DATE: &str = "postdate";
pub const FIELD_TRACK_ID: &str = "trackid";
pub const FIELD_TRAN_ID: &str = "tranid";
pub const FIELD_AVR: &str = "avr";
pub const FIELD_AUTH_RESP_CODE: &str = "authRespCode";
pub const FIELD_ERROR: &str = "Error";
pub const FIELD_ERROR_TEXT: &str = "ErrorText";

/// Names of the five user-defined fields, in wire order.
pub const UDF_FIELDS: [&str; UDF_COUNT] = ["udf1", "udf2", "udf3", "udf4", "udf5"];

// ---------------------------------------------------------------------------
// Field Limits
// ---------------------------------------------------------------------------

/// Number of user-defined fields the gateway echoes back.
pub const UDF_COUNT: usize = 5;

/// Longest UDF value the gateway accepts, counted after sanitizing.
pub const UDF_MAX_LENGTH: usize = 255;

/// Characters stripped from UDF values before they are sent. The gateway
/// rejects requests that carry any of them.
pub const UDF_FILTER_CHARS: &str = "!#$%^&*()+[]\\';,{}|\":<>?~`";

/// Longest track id the gateway stores.
pub const TRACK_ID_MAX_LENGTH: usize = 40;

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Transport cipher block length (AES). The resource key doubles as the IV,
/// so it must be exactly one block long.
pub const TRANSPORT_KEY_LENGTH: usize = 16;

/// Two-key and three-key triple-DES key lengths accepted for the vault key.
pub const TDES_TWO_KEY_LENGTH: usize = 16;
pub const TDES_THREE_KEY_LENGTH: usize = 24;

/// Triple-DES block length.
pub const TDES_BLOCK_LENGTH: usize = 8;

/// Magic number opening a JCEKS-framed keystore.
pub const KEYSTORE_MAGIC: u32 = 0xCECE_CECE;

/// Keystore format version we read.
pub const KEYSTORE_VERSION: u32 = 2;

/// Entry tags: private key with its certificate chain, trusted
/// certificate, sealed secret key.
pub const KEYSTORE_TAG_PRIVATE_KEY: u32 = 1;
pub const KEYSTORE_TAG_TRUSTED_CERT: u32 = 2;
pub const KEYSTORE_TAG_SECRET_KEY: u32 = 3;

/// Seal algorithm named inside every sealed secret-key entry.
pub const KEYSTORE_SEAL_ALGORITHM: &str = "PBEWithMD5AndTripleDES";

/// Whitener mixed into the keystore integrity digest. Fixed by the Java
/// keystore format.
pub const KEYSTORE_DIGEST_WHITENER: &[u8] = b"Mighty Aphrodite";

/// SHA-1 digest length trailing every keystore.
pub const KEYSTORE_DIGEST_LENGTH: usize = 20;

/// PBE salt length for sealed keystore entries.
pub const PBE_SALT_LENGTH: usize = 8;

/// Upper bound on PBE iterations. Anything above is treated as corruption
/// rather than burned through.
pub const PBE_MAX_ITERATIONS: u32 = 5_000_000;

/// Iterations used when sealing sandbox keystores. Same as keytool.
pub const PBE_DEFAULT_ITERATIONS: u32 = 200_000;

/// Entry alias the resource kit stores its vault key under.
pub const DEFAULT_KEY_ALIAS: &str = "pgkey";

/// Store passphrase shipped with every resource kit.
pub const VENDOR_KEYSTORE_PASSPHRASE: &str = "password";

/// Largest terminal XML entry we are willing to inflate from the resource
/// archive.
pub const MAX_TERMINAL_ENTRY_BYTES: u64 = 64 * 1024;

/// Largest callback body accepted by the decoder.
pub const MAX_CALLBACK_BYTES: usize = 16 * 1024;

// ---------------------------------------------------------------------------
// Gateway Configuration
// ---------------------------------------------------------------------------

/// Everything needed to open a terminal session against the gateway.
///
/// Paths point at the two vendor artifacts; `alias` picks the terminal out
/// of the resource archive. Currency and language default to the vendor
/// kit's defaults (KWD, English).
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Path to the keystore artifact (usually `keystore.bin`).
    pub keystore_path: PathBuf,
    /// Path to the resource artifact (usually `resource.cgn`).
    pub resource_path: PathBuf,
    /// Terminal alias as configured by the acquiring bank.
    pub alias: String,
    /// Alias of the vault key inside the keystore.
    pub key_alias: String,
    /// How the keystore passphrase is obtained.
    pub passphrase: PassphrasePolicy,
    /// Transaction currency.
    pub currency: Currency,
    /// Language of the hosted payment pages.
    pub language: Language,
}

impl GatewayConfig {
    /// Creates a configuration with vendor defaults for everything but the
    /// artifact paths and terminal alias.
    pub fn new(
        keystore_path: impl AsRef<Path>,
        resource_path: impl AsRef<Path>,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            keystore_path: keystore_path.as_ref().to_path_buf(),
            resource_path: resource_path.as_ref().to_path_buf(),
            alias: alias.into(),
            key_alias: DEFAULT_KEY_ALIAS.to_string(),
            passphrase: PassphrasePolicy::VendorDefault,
            currency: Currency::KWD,
            language: Language::English,
        }
    }

    /// Overrides the keystore entry alias.
    pub fn key_alias(mut self, key_alias: impl Into<String>) -> Self {
        self.key_alias = key_alias.into();
        self
    }

    /// Overrides the keystore passphrase policy.
    pub fn passphrase(mut self, passphrase: PassphrasePolicy) -> Self {
        self.passphrase = passphrase;
        self
    }

    /// Sets the transaction currency.
    pub fn currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    /// Sets the hosted page language.
    pub fn language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_udf_field_names_are_ordered() {
        assert_eq!(UDF_FIELDS.len(), UDF_COUNT);
        for (i, name) in UDF_FIELDS.iter().enumerate() {
            assert_eq!(*name, format!("udf{}", i + 1));
        }
    }

    #[test]
    fn test_keystore_magic_bytes() {
        assert_eq!(KEYSTORE_MAGIC.to_be_bytes(), [0xCE, 0xCE, 0xCE, 0xCE]);
    }

    #[test]
    fn test_key_lengths_sanity() {
        // The transport key is also the CBC IV, which is one AES block.
        assert_eq!(TRANSPORT_KEY_LENGTH, 16);
        assert!(TDES_TWO_KEY_LENGTH < TDES_THREE_KEY_LENGTH);
        assert_eq!(TDES_THREE_KEY_LENGTH % TDES_BLOCK_LENGTH, 0);
    }

    #[test]
    fn test_pbe_iteration_bounds() {
        assert!(PBE_DEFAULT_ITERATIONS <= PBE_MAX_ITERATIONS);
        assert!(PBE_DEFAULT_ITERATIONS > 0);
    }

    #[test]
    fn test_filter_chars_cover_form_delimiters() {
        // Sanitized UDFs must never be able to smuggle a field separator.
        assert!(UDF_FILTER_CHARS.contains('&'));
        assert!(UDF_FILTER_CHARS.contains('+'));
        assert!(UDF_FILTER_CHARS.contains('%'));
    }

    #[test]
    fn test_gateway_config_defaults() {
        let config = GatewayConfig::new("keystore.bin", "resource.cgn", "terminal");
        assert_eq!(config.key_alias, DEFAULT_KEY_ALIAS);
        assert_eq!(config.currency, Currency::KWD);
        assert_eq!(config.language, Language::English);
        assert!(matches!(config.passphrase, PassphrasePolicy::VendorDefault));
    }

    #[test]
    fn test_gateway_config_overrides() {
        let config = GatewayConfig::new("k", "r", "t")
            .key_alias("other")
            .currency(Currency::USD)
            .language(Language::Arabic);
        assert_eq!(config.key_alias, "other");
        assert_eq!(config.currency, Currency::USD);
        assert_eq!(config.language, Language::Arabic);
    }
}
