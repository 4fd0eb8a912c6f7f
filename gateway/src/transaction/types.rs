//! Value types shared by requests and callbacks.
//!
//! Amounts are integers in the currency's minor unit. The gateway talks in
//! decimal strings ("1.234"), so parsing and formatting happen at the edge
//! and nowhere near a float.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::TRACK_ID_MAX_LENGTH;

// ---------------------------------------------------------------------------
// Currency
// ---------------------------------------------------------------------------

/// Currencies the gateway settles in.
///
/// The list covers the Gulf currencies the resource kit is deployed for
/// plus the usual cross-border ones. Each carries its ISO 4217 numeric code
/// (what goes on the wire) and minor-unit exponent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    /// Kuwaiti Dinar (fils, 10^-3). The kit's default.
    KWD,
    /// Bahraini Dinar (fils, 10^-3).
    BHD,
    /// Omani Rial (baisa, 10^-3).
    OMR,
    /// Jordanian Dinar (fils, 10^-3).
    JOD,
    /// Saudi Riyal (halala, 10^-2).
    SAR,
    /// UAE Dirham (fils, 10^-2).
    AED,
    /// Qatari Riyal (dirham, 10^-2).
    QAR,
    /// Egyptian Pound (piastre, 10^-2).
    EGP,
    /// United States Dollar (cent, 10^-2).
    USD,
    /// Euro (cent, 10^-2).
    EUR,
    /// Pound Sterling (penny, 10^-2).
    GBP,
}

impl Currency {
    /// Number of decimal places in the minor unit.
    pub fn decimals(&self) -> u8 {
        match self {
            Self::KWD | Self::BHD | Self::OMR | Self::JOD => 3,
            Self::SAR | Self::AED | Self::QAR | Self::EGP | Self::USD | Self::EUR | Self::GBP => 2,
        }
    }

    /// ISO 4217 numeric code, zero-padded to three digits.
    pub fn numeric_code(&self) -> &'static str {
        match self {
            Self::KWD => "414",
            Self::BHD => "048",
            Self::OMR => "512",
            Self::JOD => "400",
            Self::SAR => "682",
            Self::AED => "784",
            Self::QAR => "634",
            Self::EGP => "818",
            Self::USD => "840",
            Self::EUR => "978",
            Self::GBP => "826",
        }
    }

    /// ISO 4217 alphabetic code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::KWD => "KWD",
            Self::BHD => "BHD",
            Self::OMR => "OMR",
            Self::JOD => "JOD",
            Self::SAR => "SAR",
            Self::AED => "AED",
            Self::QAR => "QAR",
            Self::EGP => "EGP",
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
        }
    }

    const ALL: [Currency; 11] = [
        Self::KWD,
        Self::BHD,
        Self::OMR,
        Self::JOD,
        Self::SAR,
        Self::AED,
        Self::QAR,
        Self::EGP,
        Self::USD,
        Self::EUR,
        Self::GBP,
    ];
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Returned when a currency code is not one the gateway settles in.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported currency: {0}")]
pub struct UnsupportedCurrency(pub String);

impl FromStr for Currency {
    type Err = UnsupportedCurrency;

    /// Accepts the alphabetic code in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.code().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnsupportedCurrency(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Language
// ---------------------------------------------------------------------------

/// Language of the hosted payment pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    English,
    Arabic,
}

impl Language {
    /// The gateway's own language id.
    pub fn wire_code(&self) -> &'static str {
        match self {
            Self::English => "USA",
            Self::Arabic => "ARA",
        }
    }

    /// Parses `en`/`ar` (case-insensitive). Anything else falls back to
    /// English, same as the vendor kit.
    pub fn from_code_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "ar" | "ara" | "arabic" => Self::Arabic,
            _ => Self::English,
        }
    }
}

// ---------------------------------------------------------------------------
// Amount
// ---------------------------------------------------------------------------

/// Why a decimal amount string was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,

    #[error("amount must be plain decimal digits with an optional point")]
    Malformed,

    #[error("more than {max} significant decimal places")]
    TooPrecise { max: u8 },

    #[error("amount does not fit in 64 bits")]
    Overflow,
}

/// A monetary amount in the currency's smallest unit.
///
/// `Amount::new(1_234, Currency::KWD)` is 1.234 KWD. Nothing in this type
/// rounds: parsing refuses digits the currency cannot represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Amount {
    /// Value in minor units.
    pub value: u64,
    /// Denomination.
    pub currency: Currency,
}

impl Amount {
    /// Creates an amount from minor units.
    pub fn new(value: u64, currency: Currency) -> Self {
        Self { value, currency }
    }

    /// Parses a decimal string such as `"1.234"` at the currency's scale.
    ///
    /// Trailing zeros beyond the scale are tolerated (`"1.2340"` for KWD);
    /// any other extra digit is an error rather than a rounding.
    pub fn parse(s: &str, currency: Currency) -> Result<Self, AmountError> {
        if s.is_empty() {
            return Err(AmountError::Empty);
        }

        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if whole.is_empty() || !all_digits(whole) || !all_digits(frac) {
            return Err(AmountError::Malformed);
        }
        if s.ends_with('.') {
            return Err(AmountError::Malformed);
        }

        let decimals = currency.decimals() as usize;
        let (kept, dropped) = frac.split_at(frac.len().min(decimals));
        if dropped.bytes().any(|b| b != b'0') {
            return Err(AmountError::TooPrecise {
                max: currency.decimals(),
            });
        }

        let scale = 10u64.pow(decimals as u32);
        let whole: u64 = whole.parse().map_err(|_| AmountError::Overflow)?;
        let mut minor: u64 = 0;
        for (i, digit) in kept.bytes().enumerate() {
            let weight = 10u64.pow((decimals - 1 - i) as u32);
            minor += u64::from(digit - b'0') * weight;
        }

        whole
            .checked_mul(scale)
            .and_then(|v| v.checked_add(minor))
            .map(|value| Self { value, currency })
            .ok_or(AmountError::Overflow)
    }

    /// Returns `true` if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.value == 0
    }

    /// Decimal string as sent to the gateway, always at full scale
    /// (`"1.234"`, `"5.000"`).
    pub fn to_wire(&self) -> String {
        let decimals = self.currency.decimals() as usize;
        if decimals == 0 {
            return self.value.to_string();
        }
        let divisor = 10u64.pow(decimals as u32);
        format!(
            "{}.{:0>width$}",
            self.value / divisor,
            self.value % divisor,
            width = decimals
        )
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_wire(), self.currency)
    }
}

// ---------------------------------------------------------------------------
// TrackId
// ---------------------------------------------------------------------------

/// Why a track id was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackIdError {
    #[error("track id is empty")]
    Empty,

    #[error("track id longer than {TRACK_ID_MAX_LENGTH} characters")]
    TooLong,

    #[error("track id contains {0:?}; only letters, digits, '-' and '_' are allowed")]
    IllegalCharacter(char),
}

/// Merchant-assigned correlation id for one payment attempt.
///
/// Uniqueness is the merchant's job; this type only guarantees the id is
/// something the gateway will store and echo back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TrackId(String);

impl TrackId {
    /// Validates and wraps a track id.
    pub fn new(id: impl Into<String>) -> Result<Self, TrackIdError> {
        let id = id.into();
        if id.is_empty() {
            return Err(TrackIdError::Empty);
        }
        if id.chars().count() > TRACK_ID_MAX_LENGTH {
            return Err(TrackIdError::TooLong);
        }
        if let Some(c) = id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(TrackIdError::IllegalCharacter(c));
        }
        Ok(Self(id))
    }

    /// The vendor kit's fallback: current Unix time in seconds.
    pub fn from_timestamp() -> Self {
        Self(Utc::now().timestamp().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TrackId {
    type Error = TrackIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TrackId> for String {
    fn from(id: TrackId) -> Self {
        id.0
    }
}

impl PartialEq<str> for TrackId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for TrackId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_codes() {
        assert_eq!(Currency::KWD.numeric_code(), "414");
        assert_eq!(Currency::BHD.numeric_code(), "048");
        assert_eq!(Currency::USD.numeric_code(), "840");
        assert_eq!(Currency::KWD.decimals(), 3);
        assert_eq!(Currency::SAR.decimals(), 2);
    }

    #[test]
    fn currency_from_str_is_case_insensitive() {
        assert_eq!("kwd".parse::<Currency>().unwrap(), Currency::KWD);
        assert_eq!("Eur".parse::<Currency>().unwrap(), Currency::EUR);
        assert_eq!(
            "XYZ".parse::<Currency>().unwrap_err(),
            UnsupportedCurrency("XYZ".into())
        );
    }

    #[test]
    fn language_lookup_falls_back_to_english() {
        assert_eq!(Language::from_code_lossy("ar"), Language::Arabic);
        assert_eq!(Language::from_code_lossy("AR"), Language::Arabic);
        assert_eq!(Language::from_code_lossy("en"), Language::English);
        assert_eq!(Language::from_code_lossy("fr"), Language::English);
        assert_eq!(Language::Arabic.wire_code(), "ARA");
        assert_eq!(Language::English.wire_code(), "USA");
    }

    #[test]
    fn amount_parse_exact_scale() {
        let amt = Amount::parse("1.234", Currency::KWD).unwrap();
        assert_eq!(amt.value, 1_234);
        assert_eq!(amt.to_wire(), "1.234");
    }

    #[test]
    fn amount_parse_short_fraction_and_integers() {
        assert_eq!(Amount::parse("1.2", Currency::KWD).unwrap().value, 1_200);
        assert_eq!(Amount::parse("5", Currency::KWD).unwrap().value, 5_000);
        assert_eq!(Amount::parse("0.05", Currency::USD).unwrap().value, 5);
        assert_eq!(Amount::parse("5", Currency::KWD).unwrap().to_wire(), "5.000");
    }

    #[test]
    fn amount_parse_tolerates_trailing_zeros_only() {
        assert_eq!(Amount::parse("1.2340", Currency::KWD).unwrap().value, 1_234);
        assert_eq!(
            Amount::parse("1.2345", Currency::KWD).unwrap_err(),
            AmountError::TooPrecise { max: 3 }
        );
    }

    #[test]
    fn amount_parse_rejects_garbage() {
        for bad in ["", "-1", "+1", "1e3", ".5", "1.", "1,5", " 1", "1.2.3", "abc"] {
            assert!(Amount::parse(bad, Currency::KWD).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn amount_parse_overflow() {
        assert_eq!(
            Amount::parse("18446744073709551615", Currency::KWD).unwrap_err(),
            AmountError::Overflow
        );
    }

    #[test]
    fn amount_display() {
        let usd = Amount::new(1050, Currency::USD);
        assert_eq!(usd.to_string(), "10.50 USD");
        assert!(Amount::new(0, Currency::KWD).is_zero());
    }

    #[test]
    fn track_id_validation() {
        assert!(TrackId::new("TX1001").is_ok());
        assert!(TrackId::new("order_42-b").is_ok());
        assert_eq!(TrackId::new("").unwrap_err(), TrackIdError::Empty);
        assert_eq!(TrackId::new("a".repeat(41)).unwrap_err(), TrackIdError::TooLong);
        assert_eq!(
            TrackId::new("TX 1").unwrap_err(),
            TrackIdError::IllegalCharacter(' ')
        );
        assert_eq!(
            TrackId::new("TX&1").unwrap_err(),
            TrackIdError::IllegalCharacter('&')
        );
    }

    #[test]
    fn track_id_from_timestamp_is_numeric() {
        let id = TrackId::from_timestamp();
        assert!(id.as_str().bytes().all(|b| b.is_ascii_digit()));
        assert!(TrackId::new(id.as_str()).is_ok());
    }

    #[test]
    fn track_id_serde_is_a_plain_string() {
        let id = TrackId::new("TX1001").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"TX1001\"");
        let back: TrackId = serde_json::from_str("\"TX1001\"").unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<TrackId>("\"bad id\"").is_err());
    }

    #[test]
    fn amount_serde_roundtrip() {
        let amt = Amount::new(42_000, Currency::KWD);
        let json = serde_json::to_string(&amt).unwrap();
        let recovered: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(amt, recovered);
    }
}
