//! # Gateway Façade
//!
//! One [`Gateway`] is one terminal session: a loaded profile, the terminal's
//! key material, and the merchant's per-purchase settings.
//!
//! Two ways to use it:
//!
//! - **Session style**: set the amount, URLs and UDFs on a `&mut Gateway`,
//!   then call [`Gateway::generate_purchase_request`]. Mirrors how the
//!   vendor kit is driven.
//! - **Shared style**: wrap the gateway in an `Arc` and call
//!   [`Gateway::purchase_request`] with a fully built
//!   [`PurchaseIntent`] and [`Gateway::get_result`] from any thread. Neither
//!   takes a lock.

use tracing::info;

use crate::codec::{self, RedirectUrl};
use crate::config::{GatewayConfig, UDF_COUNT, UDF_FIELDS};
use crate::crypto::KeyMaterial;
use crate::error::{GatewayError, Result};
use crate::keystore::Keystore;
use crate::resource::{LoadedTerminal, ResourceDescriptor, TerminalProfile};
use crate::transaction::{
    sanitize_udf, validate_gateway_url, Amount, PurchaseIntent, TrackId, TransactionRecord,
};

/// Per-purchase settings for session-style use.
#[derive(Debug, Clone)]
struct Session {
    amount: Amount,
    track_id: TrackId,
    response_url: Option<String>,
    error_url: Option<String>,
    udfs: [Option<String>; UDF_COUNT],
}

/// A terminal session against the hosted payment gateway.
#[derive(Debug)]
pub struct Gateway {
    profile: TerminalProfile,
    material: KeyMaterial,
    session: Session,
}

impl Gateway {
    /// Opens the keystore, loads the terminal from the resource artifact
    /// and starts a session for `amount`.
    ///
    /// The vault key only lives for the duration of this call.
    pub fn open(config: &GatewayConfig, amount: Amount) -> Result<Self> {
        let vault_key = Keystore::open(&config.keystore_path, &config.key_alias, &config.passphrase)?;
        let terminal = ResourceDescriptor::load(
            &config.resource_path,
            &vault_key,
            &config.alias,
            config.currency,
            config.language,
        )?;
        drop(vault_key);

        info!(
            alias = terminal.profile.terminal_alias(),
            merchant_id = terminal.profile.merchant_id(),
            endpoint = terminal.profile.endpoint_base(),
            currency = %terminal.profile.currency(),
            "terminal session opened"
        );
        Ok(Self::from_parts(terminal, amount))
    }

    /// Starts a session from an already loaded terminal.
    pub fn from_parts(terminal: LoadedTerminal, amount: Amount) -> Self {
        let LoadedTerminal { profile, material } = terminal;
        Self {
            profile,
            material,
            session: Session {
                amount,
                track_id: TrackId::from_timestamp(),
                response_url: None,
                error_url: None,
                udfs: Default::default(),
            },
        }
    }

    pub fn profile(&self) -> &TerminalProfile {
        &self.profile
    }

    pub(crate) fn material(&self) -> &KeyMaterial {
        &self.material
    }

    /// Fingerprint of the terminal's transport key, for logs.
    pub fn key_fingerprint(&self) -> String {
        self.material.fingerprint()
    }

    // -- session setters ----------------------------------------------------

    pub fn amount(&self) -> Amount {
        self.session.amount
    }

    pub fn set_amount(&mut self, amount: Amount) {
        self.session.amount = amount;
    }

    /// Validated immediately; the gateway appends its own query string.
    pub fn set_response_url(&mut self, url: &str) -> Result<()> {
        self.session.response_url = Some(validate_gateway_url("responseURL", url)?);
        Ok(())
    }

    pub fn set_error_url(&mut self, url: &str) -> Result<()> {
        self.session.error_url = Some(validate_gateway_url("errorURL", url)?);
        Ok(())
    }

    pub fn response_url(&self) -> Option<&str> {
        self.session.response_url.as_deref()
    }

    pub fn error_url(&self) -> Option<&str> {
        self.session.error_url.as_deref()
    }

    /// Sets UDF `index` (1 through 5) after sanitizing it.
    pub fn set_udf(&mut self, index: usize, text: &str) -> Result<()> {
        let slot = index
            .checked_sub(1)
            .filter(|i| *i < UDF_COUNT)
            .ok_or_else(|| {
                GatewayError::encoding("udf", format!("index {index} outside 1..={UDF_COUNT}"))
            })?;
        self.session.udfs[slot] = sanitize_udf(UDF_FIELDS[slot], text)?;
        Ok(())
    }

    /// Sanitized UDF by 1-based index.
    pub fn udf(&self, index: usize) -> Option<&str> {
        index
            .checked_sub(1)
            .and_then(|i| self.session.udfs.get(i))
            .and_then(|v| v.as_deref())
    }

    /// Overrides the default track id, the Unix time at which the session
    /// was started.
    pub fn set_track_id(&mut self, track_id: &str) -> Result<()> {
        let id = TrackId::new(track_id).map_err(|e| GatewayError::encoding("trackid", e.to_string()))?;
        self.session.track_id = id;
        Ok(())
    }

    /// Track id the next session-style request will carry. Callbacks for
    /// that request must echo it back.
    pub fn track_id(&self) -> &TrackId {
        &self.session.track_id
    }

    // -- operations ---------------------------------------------------------

    /// Builds the redirect URL from the session settings.
    ///
    /// Fails with [`GatewayError::Encoding`] when either URL is unset.
    pub fn generate_purchase_request(&self) -> Result<RedirectUrl> {
        let s = &self.session;
        let mut builder = PurchaseIntent::builder()
            .amount(s.amount)
            .track_id(s.track_id.as_str());
        if let Some(url) = &s.response_url {
            builder = builder.response_url(url.as_str());
        }
        if let Some(url) = &s.error_url {
            builder = builder.error_url(url.as_str());
        }
        for (i, udf) in s.udfs.iter().enumerate() {
            if let Some(value) = udf {
                builder = builder.udf(i + 1, value.as_str());
            }
        }
        self.purchase_request(&builder.build()?)
    }

    /// Builds the redirect URL for an explicit intent. Safe to call
    /// concurrently on a shared gateway.
    pub fn purchase_request(&self, intent: &PurchaseIntent) -> Result<RedirectUrl> {
        codec::encode(&self.profile, &self.material, intent)
    }

    /// Decodes and authenticates a callback body.
    pub fn get_result(&self, body: impl AsRef<[u8]>) -> Result<TransactionRecord> {
        codec::decode(&self.profile, &self.material, body.as_ref())
    }
}
