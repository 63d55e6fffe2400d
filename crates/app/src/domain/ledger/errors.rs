//! Ledger errors.

use thiserror::Error;

use crate::domain::ledger::data::GiftConflict;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{count} gift line(s) lost to a concurrent redemption", count = .conflicts.len())]
    ConcurrencyConflict { conflicts: Vec<GiftConflict> },

    #[error("storage error")]
    Sql(#[from] sqlx::Error),
}
