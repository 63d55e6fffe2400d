//! Gift Rules

use gifting::rules::authoring::{NewGiftRule, RuleDraft};

use crate::domain::catalog::{CatalogReader, resolve_references};

pub mod data;
mod errors;
mod repositories;
pub mod service;

pub use errors::GiftRulesServiceError;
pub use service::{GiftRulesService, MockGiftRulesService, PgGiftRulesService};

/// Validate a draft against the catalog.
///
/// # Errors
///
/// Returns an error when the draft is invalid, references unknown products or categories, or
/// the catalog cannot be read.
pub async fn validate_draft(
    catalog: &dyn CatalogReader,
    draft: &RuleDraft,
) -> Result<NewGiftRule, GiftRulesServiceError> {
    let references = resolve_references(catalog, draft).await?;

    Ok(draft.validate(&references)?)
}
