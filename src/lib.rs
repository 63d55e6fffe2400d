//! Gifting
//!
//! Gifting is a promotional gift-rule engine: it decides which free gift products a cart is
//! entitled to from recursively structured conditions, usage quotas, stock caps and validity
//! windows, and re-validates a gift selection before it is redeemed.

pub mod cart;
pub mod conditions;
pub mod eligibility;
pub mod fixtures;
pub mod ids;
pub mod matcher;
pub mod prelude;
pub mod rules;
pub mod usage;
pub mod validator;
