//! Catalog
//!
//! Product prices, categories and stock belong to an external catalog. The gifting services
//! only read from it.

use async_trait::async_trait;
use gifting::{
    cart::CartProduct,
    ids::{CategoryId, ProductId},
    rules::authoring::{KnownReferences, RuleDraft},
};
use mockall::automock;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

mod fixture;

pub use fixture::FixtureCatalog;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

#[automock]
#[async_trait]
pub trait CatalogReader: Send + Sync {
    /// Look up products by identifier. Unknown identifiers are absent from the result.
    async fn products(
        &self,
        ids: &[ProductId],
    ) -> Result<FxHashMap<ProductId, CartProduct>, CatalogError>;

    /// The subset of `ids` naming existing categories.
    async fn categories(&self, ids: &[CategoryId]) -> Result<FxHashSet<CategoryId>, CatalogError>;
}

/// Fetch every product and category a draft refers to, for reference validation.
///
/// # Errors
///
/// Returns an error when the catalog cannot be read.
pub async fn resolve_references(
    catalog: &dyn CatalogReader,
    draft: &RuleDraft,
) -> Result<KnownReferences, CatalogError> {
    let products: Vec<ProductId> = draft.referenced_products().into_iter().collect();
    let categories: Vec<CategoryId> = draft.referenced_categories().into_iter().collect();

    let products = catalog.products(&products).await?.into_keys().collect();
    let categories = catalog.categories(&categories).await?;

    Ok(KnownReferences {
        products,
        categories,
    })
}
