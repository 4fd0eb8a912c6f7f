// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # iPay Gateway — Core Library
//!
//! Merchant-side engine for the iPay hosted checkout (the resource kit KNET
//! hands to merchants). The gateway only ever talks through browser
//! redirects, so the whole integration comes down to two pure functions and
//! the key material they need:
//!
//! 1. turn a purchase into a redirect URL carrying an encrypted `trandata`
//!    blob, and
//! 2. turn the callback the browser brings back into a record that can be
//!    trusted.
//!
//! ## Architecture
//!
//! - **keystore** — Opens the vendor keystore and unseals the vault key.
//! - **resource** — Decrypts the resource artifact into a terminal profile
//!   and its key material.
//! - **codec** — Form encoding, the request encoder and the callback decoder.
//! - **gateway** — The façade tying one terminal session together.
//! - **transaction** — Amounts, intents and result records.
//! - **crypto** — The vendor's cipher constructions and zeroizing key handles.
//! - **provision** — Sandbox artifact writers and a gateway simulator.
//! - **config** — Protocol constants and [`GatewayConfig`].
//!
//! ## Ground Rules
//!
//! 1. No key, password or decrypted payload is ever logged or printed.
//! 2. Nothing is trusted from a callback until it has been decrypted and
//!    cross-checked. Declines are records; tampering is an error.
//! 3. No I/O after a [`Gateway`] is opened, and no locks on the hot path.

pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod gateway;
pub mod keystore;
pub mod provision;
pub mod resource;
pub mod transaction;

pub use codec::{EncodedRequest, RedirectUrl};
pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use gateway::Gateway;
pub use keystore::{Keystore, PassphrasePolicy};
pub use resource::{LoadedTerminal, ResourceDescriptor, TerminalProfile};
pub use transaction::{
    Amount, Currency, Language, PurchaseIntent, TrackId, TransactionOutcome, TransactionRecord,
};
