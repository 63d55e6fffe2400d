//! Gifting service errors.

use gifting::{eligibility::Denial, validator::OrderRejection};
use thiserror::Error;

use crate::domain::{
    catalog::CatalogError,
    gift_rules::GiftRulesServiceError,
    ledger::{LedgerError, data::GiftConflict},
};

#[derive(Debug, Error)]
pub enum GiftingServiceError {
    /// The selected gift may not be added.
    #[error(transparent)]
    Denied(Denial),

    /// One or more gift lines of the order are invalid.
    #[error(transparent)]
    Rejected(#[from] OrderRejection),

    /// Quota or stock was taken, or the rule retired, between validation and commit.
    #[error("{count} gift line(s) lost to a concurrent redemption", count = .conflicts.len())]
    Conflict { conflicts: Vec<GiftConflict> },

    #[error("gift rules unavailable")]
    Rules(#[from] GiftRulesServiceError),

    #[error("catalog unavailable")]
    Catalog(#[from] CatalogError),

    #[error("usage ledger unavailable")]
    Ledger(#[source] LedgerError),
}

impl From<LedgerError> for GiftingServiceError {
    fn from(error: LedgerError) -> Self {
        match error {
            LedgerError::ConcurrencyConflict { conflicts } => Self::Conflict { conflicts },
            other @ LedgerError::Sql(_) => Self::Ledger(other),
        }
    }
}
