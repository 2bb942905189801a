#![warn(
    unused_extern_crates,
    missing_debug_implementations,
    missing_copy_implementations,
    rust_2018_idioms,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::fallible_impl_from,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap,
    clippy::print_stdout,
    clippy::dbg_macro
)]
#![cfg_attr(not(test), warn(clippy::unwrap_used))]
#![forbid(unsafe_code)]

//! Coordination of hash time-locked atomic swaps between an Ethereum-like
//! and a BitShares-like ledger.
//!
//! The [`Coordinator`] drives every swap through its lifecycle, the
//! [`ledger::LedgerAdapter`] trait is the seam to the chains and the
//! [`feed::StatusFeed`] lets a UI follow a swap.

pub mod asset;
pub mod config;
pub mod coordinator;
mod error;
pub mod feed;
pub mod identity;
pub mod ledger;
mod retry;
mod secret;
mod secret_hash;
pub mod secret_manager;
pub mod swap;
pub mod timelock;
mod timestamp;

pub use self::{
    coordinator::{Coordinator, RedeemOutcome},
    error::{Error, Mismatch, PartialRedeemWarning},
    ledger::Chain,
    secret::{Secret, SecretFromErr},
    secret_hash::{HashAlgorithm, SecretHash, SecretHashParseError},
    swap::{Leg, Role, StartParams, Swap, SwapId, SwapState},
    timestamp::{RelativeTime, Timestamp},
};
