//! Gifting Domain Concerns

pub mod catalog;
pub mod gift_rules;
pub mod gifting;
pub mod ledger;
