//! Error taxonomy for the gateway engine.
//!
//! Every public operation returns a [`GatewayError`]. The variants split
//! into construction-time failures (resource and keystore) and per-call
//! failures (encoding and callback decoding). Callers that only care about
//! one question, "can I trust this callback?", should use
//! [`GatewayError::is_authentication_failure`].

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the gateway engine.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The resource artifact could not be read from disk.
    #[error("cannot read resource artifact {}: {source}", path.display())]
    ResourceIo {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The resource artifact does not match the vendor layout.
    #[error("malformed resource artifact: {0}")]
    ResourceFormat(String),

    /// The keystore artifact could not be read from disk.
    #[error("cannot read keystore {}: {source}", path.display())]
    KeystoreIo {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Wrong passphrase or unknown alias. Deliberately says nothing about
    /// which of the two it was, or which aliases do exist.
    #[error("keystore access denied")]
    KeystoreAccess,

    /// The keystore container is corrupt or uses an unsupported layout.
    #[error("malformed keystore: {0}")]
    KeystoreFormat(String),

    /// A purchase intent failed validation.
    #[error("invalid {field}: {reason}")]
    Encoding {
        /// Intent field that was rejected.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// The callback body is not a well-formed key/value payload.
    #[error("malformed callback: {0}")]
    CallbackFormat(String),

    /// The encrypted result blob failed decryption or integrity checks.
    /// Never carries detail; the reason is logged instead.
    #[error("callback failed authentication")]
    Authentication,

    /// The callback authenticated but a field has the wrong shape.
    #[error("invalid callback field {field}: {reason}")]
    FieldValidation {
        /// Wire name of the offending field.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// The gateway redirected to the error URL without an encrypted result.
    /// The code and text are unauthenticated and only good for display.
    #[error("gateway reported error {code}: {text}")]
    GatewayReported {
        /// Vendor error code, e.g. `IPAY0100013`.
        code: String,
        /// Vendor error text, empty when not supplied.
        text: String,
    },
}

impl GatewayError {
    /// Shorthand for an [`GatewayError::Encoding`] error.
    pub(crate) fn encoding(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Encoding {
            field,
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`GatewayError::FieldValidation`] error.
    pub(crate) fn field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::FieldValidation {
            field,
            reason: reason.into(),
        }
    }

    /// Returns `true` if the callback must not be trusted at all.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::Authentication)
    }

    /// Returns `true` for errors raised while opening a terminal session.
    pub fn is_construction_failure(&self) -> bool {
        matches!(
            self,
            Self::ResourceIo { .. }
                | Self::ResourceFormat(_)
                | Self::KeystoreIo { .. }
                | Self::KeystoreAccess
                | Self::KeystoreFormat(_)
        )
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GatewayError>;
