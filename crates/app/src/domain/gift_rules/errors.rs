//! Gift rules service errors.

use gifting::{conditions::rows::ConditionTreeError, rules::authoring::AuthoringError};
use sqlx::{
    Error,
    error::{DatabaseError, ErrorKind},
};
use thiserror::Error;

use crate::domain::catalog::CatalogError;

#[derive(Debug, Error)]
pub enum GiftRulesServiceError {
    #[error("gift rule already exists")]
    AlreadyExists,

    #[error("gift rule not found")]
    NotFound,

    #[error("related resource not found")]
    InvalidReference,

    #[error("missing required data")]
    MissingRequiredData,

    #[error("invalid data")]
    InvalidData,

    #[error(transparent)]
    Invalid(#[from] AuthoringError),

    #[error("stored conditions are corrupt")]
    CorruptConditions(#[from] ConditionTreeError),

    #[error("catalog lookup failed")]
    Catalog(#[from] CatalogError),

    #[error("storage error")]
    Sql(#[source] Error),
}

impl From<Error> for GiftRulesServiceError {
    fn from(error: Error) -> Self {
        if matches!(error, Error::RowNotFound) {
            return Self::NotFound;
        }

        match error.as_database_error().map(DatabaseError::kind) {
            Some(ErrorKind::UniqueViolation) => Self::AlreadyExists,
            Some(ErrorKind::ForeignKeyViolation) => Self::InvalidReference,
            Some(ErrorKind::NotNullViolation) => Self::MissingRequiredData,
            Some(ErrorKind::CheckViolation) => Self::InvalidData,
            _ => Self::Sql(error),
        }
    }
}
