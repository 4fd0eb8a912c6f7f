//! Request encoder: purchase intent in, redirect URL out.
//!
//! ```text
//! PurchaseIntent ──► EncodedRequest ──► form plaintext ──► AES-CBC hex ──► RedirectUrl
//!                    (vendor order)     (zeroizing)        (trandata)
//! ```
//!
//! Encoding is deterministic: the same intent under the same key material
//! always yields the same URL.

use std::fmt;

use tracing::debug;
use zeroize::Zeroizing;

use super::form::{encode_component, encode_pairs};
use crate::config::{
    ACTION_PURCHASE, FIELD_TRANDATA, FIELD_TRANPORTAL_ID, PAYMENT_INIT_PARAM, UDF_FIELDS,
};
use crate::crypto::{transport, KeyMaterial};
use crate::error::{GatewayError, Result};
use crate::resource::TerminalProfile;
use crate::transaction::{PurchaseIntent, TrackId};

// ---------------------------------------------------------------------------
// EncodedRequest
// ---------------------------------------------------------------------------

/// The request payload as ordered key/value pairs, before encryption.
///
/// Order is fixed by the gateway: `action, id, password, langid,
/// currencycode, trackid, amt, udf1..udf5, responseURL, errorURL`. Empty
/// values are left out entirely.
pub struct EncodedRequest {
    pairs: Vec<(&'static str, Zeroizing<String>)>,
}

impl EncodedRequest {
    /// Lays out `intent` for `profile`.
    pub(crate) fn new(
        profile: &TerminalProfile,
        material: &KeyMaterial,
        intent: &PurchaseIntent,
    ) -> Result<Self> {
        let amount = intent.amount();
        if amount.currency != profile.currency() {
            return Err(GatewayError::encoding(
                "amt",
                format!(
                    "currency {} does not match terminal currency {}",
                    amount.currency,
                    profile.currency()
                ),
            ));
        }

        let mut candidates: Vec<(&'static str, String)> = vec![
            ("action", ACTION_PURCHASE.to_string()),
            ("id", profile.merchant_id().to_string()),
            ("password", material.portal_password().to_string()),
            ("langid", profile.language().wire_code().to_string()),
            ("currencycode", profile.currency().numeric_code().to_string()),
            ("trackid", intent.track_id().to_string()),
            ("amt", amount.to_wire()),
        ];
        for (name, value) in UDF_FIELDS.iter().zip(intent.udfs()) {
            candidates.push((*name, value.clone().unwrap_or_default()));
        }
        candidates.push(("responseURL", intent.response_url().to_string()));
        candidates.push(("errorURL", intent.error_url().to_string()));

        let pairs = candidates
            .into_iter()
            .map(|(k, v)| (k, Zeroizing::new(v)))
            .filter(|(_, v)| !v.is_empty())
            .collect();
        Ok(Self { pairs })
    }

    /// Value of `key`, if it survived the empty-value filter.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Field names in wire order.
    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.pairs.iter().map(|(k, _)| *k)
    }

    /// Form-encoded plaintext, ready for the transport transform.
    pub(crate) fn plaintext(&self) -> Zeroizing<String> {
        encode_pairs(self.pairs.iter().map(|(k, v)| (*k, v.as_str())))
    }
}

impl fmt::Debug for EncodedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.pairs {
            if *key == "password" {
                map.entry(key, &"<redacted>");
            } else {
                map.entry(key, &value.as_str());
            }
        }
        map.finish()
    }
}

// ---------------------------------------------------------------------------
// RedirectUrl
// ---------------------------------------------------------------------------

/// Where to send the customer's browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectUrl {
    url: String,
    trandata: String,
    track_id: TrackId,
}

impl RedirectUrl {
    pub fn as_str(&self) -> &str {
        &self.url
    }

    /// The encrypted payload embedded in the URL.
    pub fn trandata(&self) -> &str {
        &self.trandata
    }

    /// Track id sealed into the payload. The callback for this redirect
    /// carries the same value.
    pub fn track_id(&self) -> &TrackId {
        &self.track_id
    }

    pub fn into_string(self) -> String {
        self.url
    }
}

impl fmt::Display for RedirectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

impl AsRef<str> for RedirectUrl {
    fn as_ref(&self) -> &str {
        &self.url
    }
}

// ---------------------------------------------------------------------------
// encode
// ---------------------------------------------------------------------------

/// Encrypts `intent` for the terminal and builds the redirect URL.
pub fn encode(
    profile: &TerminalProfile,
    material: &KeyMaterial,
    intent: &PurchaseIntent,
) -> Result<RedirectUrl> {
    let request = EncodedRequest::new(profile, material, intent)?;
    let plaintext = request.plaintext();
    let trandata = transport::seal(material.outbound(), plaintext.as_bytes())
        .map_err(|e| GatewayError::encoding(FIELD_TRANDATA, e.to_string()))?;

    let url = format!(
        "{page}?param={init}&{td}={trandata}&{tp}={id}&responseURL={ok}&errorURL={err}",
        page = profile.payment_url(),
        init = PAYMENT_INIT_PARAM,
        td = FIELD_TRANDATA,
        tp = FIELD_TRANPORTAL_ID,
        id = encode_component(profile.merchant_id()),
        ok = encode_component(intent.response_url()),
        err = encode_component(intent.error_url()),
    );

    debug!(
        alias = profile.terminal_alias(),
        track_id = %intent.track_id(),
        amount = %intent.amount(),
        key = %material.fingerprint(),
        "purchase request encoded"
    );
    Ok(RedirectUrl {
        url,
        trandata,
        track_id: intent.track_id().clone(),
    })
}
