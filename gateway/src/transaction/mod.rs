//! # Transaction Module
//!
//! The merchant-side vocabulary of a hosted purchase: what goes out, and
//! what comes back once a callback has been authenticated.
//!
//! ## Architecture
//!
//! ```text
//! types.rs   — Value types (Currency, Language, Amount, TrackId)
//! intent.rs  — PurchaseIntent and its validating builder
//! record.rs  — TransactionRecord, PostDate and the result classification
//! ```
//!
//! ## Design Decisions
//!
//! - All amounts are `u64` in the currency's minor unit. Decimal strings are
//!   parsed and printed at the currency's scale, never through a float.
//! - Intents are validated once at `build()`. The encoder trusts them.
//! - Records are produced only by the callback decoder, after decryption and
//!   cross-checks. Declines are records too; authentication failures are not.

pub mod intent;
pub mod record;
pub mod types;

pub use intent::{sanitize_udf, validate_gateway_url, PurchaseIntent, PurchaseIntentBuilder};
pub use record::{PostDate, PostDateError, TransactionOutcome, TransactionRecord};
pub use types::{Amount, AmountError, Currency, Language, TrackId, TrackIdError, UnsupportedCurrency};
