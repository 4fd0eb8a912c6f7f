//! # Wire Codec
//!
//! Both directions of the hosted-purchase protocol:
//!
//! - [`request`] turns a [`PurchaseIntent`](crate::transaction::PurchaseIntent)
//!   into the redirect URL carrying the encrypted `trandata` blob.
//! - [`response`] turns the callback body back into an authenticated
//!   [`TransactionRecord`](crate::transaction::TransactionRecord).
//! - [`form`] is the vendor's flavour of form encoding shared by both.

pub mod form;
pub mod request;
pub mod response;

pub use form::{FormError, FormFields};
pub use request::{encode, EncodedRequest, RedirectUrl};
pub use response::decode;
