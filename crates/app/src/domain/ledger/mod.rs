//! Usage Ledger
//!
//! Redemptions are appended to `gift_rule_usages` while the rule's global counter and the gift
//! product's allocation are claimed with conditional updates in the same transaction.

pub mod data;
mod errors;
mod repository;
pub mod service;

pub use errors::LedgerError;
pub use service::{MockUsageLedger, PgUsageLedger, UsageLedger};
