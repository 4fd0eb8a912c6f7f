//! Purchase intents and their builder.
//!
//! A [`PurchaseIntent`] is everything the merchant decides about one payment
//! attempt. It is validated once, at `build()`, so the request encoder never
//! sees a half-formed intent.

use url::Url;

use super::types::{Amount, TrackId};
use crate::config::{UDF_COUNT, UDF_FIELDS, UDF_FILTER_CHARS, UDF_MAX_LENGTH};
use crate::error::{GatewayError, Result};

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

/// Strips surrounding whitespace and every character the gateway refuses in
/// a user-defined field.
///
/// Returns `None` when nothing is left, so an all-junk UDF is simply not
/// sent. Longer than [`UDF_MAX_LENGTH`] after cleaning is an error rather
/// than a silent truncation.
pub fn sanitize_udf(field: &'static str, raw: &str) -> Result<Option<String>> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !UDF_FILTER_CHARS.contains(*c))
        .collect();

    if cleaned.chars().count() > UDF_MAX_LENGTH {
        return Err(GatewayError::encoding(
            field,
            format!("longer than {UDF_MAX_LENGTH} characters"),
        ));
    }
    Ok(if cleaned.is_empty() { None } else { Some(cleaned) })
}

/// Checks a merchant callback URL.
///
/// The gateway appends its own query string to these, so the URL must be
/// absolute http(s) with a host and no query or fragment of its own.
pub fn validate_gateway_url(field: &'static str, raw: &str) -> Result<String> {
    if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(GatewayError::encoding(field, "contains whitespace"));
    }

    let url = Url::parse(raw).map_err(|e| GatewayError::encoding(field, e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(GatewayError::encoding(
                field,
                format!("scheme {other:?} is not http or https"),
            ))
        }
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(GatewayError::encoding(field, "missing host"));
    }
    if url.query().is_some() {
        return Err(GatewayError::encoding(field, "must not carry a query string"));
    }
    if url.fragment().is_some() {
        return Err(GatewayError::encoding(field, "must not carry a fragment"));
    }
    Ok(raw.to_string())
}

// ---------------------------------------------------------------------------
// PurchaseIntent
// ---------------------------------------------------------------------------

/// A validated purchase request, ready to be encoded for one terminal.
///
/// URLs keep the exact text the merchant supplied; only their shape is
/// checked. UDFs are stored already sanitized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseIntent {
    amount: Amount,
    track_id: TrackId,
    response_url: String,
    error_url: String,
    udfs: [Option<String>; UDF_COUNT],
}

impl PurchaseIntent {
    /// Starts a builder.
    pub fn builder() -> PurchaseIntentBuilder {
        PurchaseIntentBuilder::default()
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn track_id(&self) -> &TrackId {
        &self.track_id
    }

    pub fn response_url(&self) -> &str {
        &self.response_url
    }

    pub fn error_url(&self) -> &str {
        &self.error_url
    }

    /// UDF by 1-based index, as the gateway numbers them.
    pub fn udf(&self, index: usize) -> Option<&str> {
        index
            .checked_sub(1)
            .and_then(|i| self.udfs.get(i))
            .and_then(|v| v.as_deref())
    }

    /// All five UDF slots in wire order.
    pub fn udfs(&self) -> &[Option<String>; UDF_COUNT] {
        &self.udfs
    }
}

// ---------------------------------------------------------------------------
// PurchaseIntentBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`PurchaseIntent`].
///
/// ```rust,no_run
/// use ipay_gateway::transaction::{Amount, Currency, PurchaseIntent};
///
/// let intent = PurchaseIntent::builder()
///     .amount(Amount::new(1_234, Currency::KWD))
///     .track_id("TX1001")
///     .response_url("https://merchant.example/ipay/ok")
///     .error_url("https://merchant.example/ipay/error")
///     .udf(1, "order 42")
///     .build()?;
/// # Ok::<(), ipay_gateway::GatewayError>(())
/// ```
///
/// Nothing is checked until `build()`. A missing track id defaults to the
/// current Unix time in seconds.
#[derive(Debug, Clone, Default)]
pub struct PurchaseIntentBuilder {
    amount: Option<Amount>,
    track_id: Option<String>,
    response_url: Option<String>,
    error_url: Option<String>,
    udfs: Vec<(usize, String)>,
}

impl PurchaseIntentBuilder {
    pub fn amount(mut self, amount: Amount) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn track_id(mut self, track_id: impl Into<String>) -> Self {
        self.track_id = Some(track_id.into());
        self
    }

    pub fn response_url(mut self, url: impl Into<String>) -> Self {
        self.response_url = Some(url.into());
        self
    }

    pub fn error_url(mut self, url: impl Into<String>) -> Self {
        self.error_url = Some(url.into());
        self
    }

    /// Sets UDF `index` (1 through 5). Setting the same slot twice keeps the
    /// last value.
    pub fn udf(mut self, index: usize, value: impl Into<String>) -> Self {
        self.udfs.push((index, value.into()));
        self
    }

    /// Validates every field and produces the intent.
    pub fn build(self) -> Result<PurchaseIntent> {
        let amount = self
            .amount
            .ok_or_else(|| GatewayError::encoding("amt", "not set"))?;
        if amount.is_zero() {
            return Err(GatewayError::encoding("amt", "must be greater than zero"));
        }

        let track_id = match self.track_id {
            Some(raw) => {
                TrackId::new(raw).map_err(|e| GatewayError::encoding("trackid", e.to_string()))?
            }
            None => TrackId::from_timestamp(),
        };

        let response_url = self
            .response_url
            .ok_or_else(|| GatewayError::encoding("responseURL", "not set"))
            .and_then(|u| validate_gateway_url("responseURL", &u))?;
        let error_url = self
            .error_url
            .ok_or_else(|| GatewayError::encoding("errorURL", "not set"))
            .and_then(|u| validate_gateway_url("errorURL", &u))?;

        let mut udfs: [Option<String>; UDF_COUNT] = Default::default();
        for (index, raw) in &self.udfs {
            let slot = index
                .checked_sub(1)
                .filter(|i| *i < UDF_COUNT)
                .ok_or_else(|| {
                    GatewayError::encoding("udf", format!("index {index} outside 1..={UDF_COUNT}"))
                })?;
            udfs[slot] = sanitize_udf(UDF_FIELDS[slot], raw)?;
        }

        Ok(PurchaseIntent {
            amount,
            track_id,
            response_url,
            error_url,
            udfs,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
