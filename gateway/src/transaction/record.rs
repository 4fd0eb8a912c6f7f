//! Authenticated transaction results.
//!
//! A [`TransactionRecord`] only exists once a callback has been decrypted and
//! cross-checked. It is a fixed set of fields rather than a map, and fields
//! the gateway may omit stay `None` instead of collapsing to zero.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{Amount, TrackId};
use crate::config::UDF_COUNT;

// ---------------------------------------------------------------------------
// TransactionOutcome
// ---------------------------------------------------------------------------

/// Business outcome reported in the `result` field.
///
/// A decline is still a perfectly authentic callback. Whether money moved is
/// a question for [`TransactionOutcome::is_approved`], not for the decoder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionOutcome {
    /// Authorised and captured.
    Captured,
    /// Authorised, capture pending.
    Approved,
    /// Authorisation declined by the issuer.
    NotCaptured,
    /// Declined without a capture attempt.
    NotApproved,
    /// Customer cancelled on the payment page.
    Canceled,
    /// Stopped by the gateway's risk engine.
    DeniedByRisk,
    /// Issuer did not answer in time.
    HostTimeout,
    /// Reversed by the acquirer.
    Voided,
    /// A result string this crate does not know.
    Other(String),
}

impl TransactionOutcome {
    /// Maps a wire result string. Unknown values are kept verbatim.
    pub fn from_result(result: &str) -> Self {
        match result {
            "CAPTURED" => Self::Captured,
            "APPROVED" => Self::Approved,
            "NOT CAPTURED" => Self::NotCaptured,
            "NOT APPROVED" => Self::NotApproved,
            "CANCELED" => Self::Canceled,
            "DENIED BY RISK" => Self::DeniedByRisk,
            "HOST TIMEOUT" => Self::HostTimeout,
            "VOIDED" => Self::Voided,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns `true` if the issuer authorised the payment.
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Captured | Self::Approved)
    }
}

impl fmt::Display for TransactionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Captured => "CAPTURED",
            Self::Approved => "APPROVED",
            Self::NotCaptured => "NOT CAPTURED",
            Self::NotApproved => "NOT APPROVED",
            Self::Canceled => "CANCELED",
            Self::DeniedByRisk => "DENIED BY RISK",
            Self::HostTimeout => "HOST TIMEOUT",
            Self::Voided => "VOIDED",
            Self::Other(s) => s.as_str(),
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// PostDate
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PostDateError {
    #[error("expected four digits MMDD")]
    Shape,

    #[error("month {0} out of range")]
    Month(u8),

    #[error("day {day} out of range for month {month}")]
    Day { month: u8, day: u8 },
}

/// Settlement date as the gateway sends it: month and day, no year.
///
/// Without a year, 29 February is always accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PostDate {
    month: u8,
    day: u8,
}

impl PostDate {
    /// Parses `MMDD`.
    pub fn parse(s: &str) -> Result<Self, PostDateError> {
        let bytes = s.as_bytes();
        if bytes.len() != 4 || !bytes.iter().all(u8::is_ascii_digit) {
            return Err(PostDateError::Shape);
        }
        let month = (bytes[0] - b'0') * 10 + (bytes[1] - b'0');
        let day = (bytes[2] - b'0') * 10 + (bytes[3] - b'0');

        let max_day = match month {
            1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
            4 | 6 | 9 | 11 => 30,
            2 => 29,
            _ => return Err(PostDateError::Month(month)),
        };
        if day == 0 || day > max_day {
            return Err(PostDateError::Day { month, day });
        }
        Ok(Self { month, day })
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    pub fn day(&self) -> u8 {
        self.day
    }
}

impl fmt::Display for PostDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}{:02}", self.month, self.day)
    }
}

impl TryFrom<String> for PostDate {
    type Error = PostDateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PostDate> for String {
    fn from(date: PostDate) -> Self {
        date.to_string()
    }
}

// ---------------------------------------------------------------------------
// TransactionRecord
// ---------------------------------------------------------------------------

/// One authenticated gateway result, ready to persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Gateway-assigned payment id (`paymentid`).
    pub payment_id: u64,
    /// Raw result string (`result`), e.g. `CAPTURED`.
    pub result: String,
    /// Authorisation code (`auth`).
    pub auth: Option<String>,
    /// Amount echoed by the gateway (`amt`), at the terminal's scale.
    pub amount: Option<Amount>,
    /// Retrieval reference number (`ref`).
    pub reference: Option<String>,
    /// Settlement date (`postdate`).
    pub post_date: Option<PostDate>,
    /// Merchant track id (`trackid`).
    pub track_id: TrackId,
    /// Gateway transaction id (`tranid`).
    pub tran_id: Option<u64>,
    /// Address verification result (`avr`).
    pub avr: Option<String>,
    /// Issuer response code (`authRespCode`).
    pub auth_resp_code: Option<String>,
    /// UDF echoes, `udfs[0]` is `udf1`.
    pub udfs: [Option<String>; UDF_COUNT],
    /// Vendor error code (`Error`).
    pub error: Option<String>,
    /// Vendor error text (`ErrorText`).
    pub error_text: Option<String>,
}

impl TransactionRecord {
    /// Classified `result`.
    pub fn outcome(&self) -> TransactionOutcome {
        TransactionOutcome::from_result(&self.result)
    }

    /// Shorthand for `self.outcome().is_approved()`.
    pub fn is_approved(&self) -> bool {
        self.outcome().is_approved()
    }

    /// UDF echo by 1-based index.
    pub fn udf(&self, index: usize) -> Option<&str> {
        index
            .checked_sub(1)
            .and_then(|i| self.udfs.get(i))
            .and_then(|v| v.as_deref())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
