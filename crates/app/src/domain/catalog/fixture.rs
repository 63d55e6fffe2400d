//! In-memory catalog

use async_trait::async_trait;
use gifting::{
    cart::CartProduct,
    fixtures::Fixture,
    ids::{CategoryId, ProductId},
};
use rustc_hash::{FxHashMap, FxHashSet};

use super::{CatalogError, CatalogReader};

/// Catalog held in memory, typically seeded from YAML fixtures.
#[derive(Debug, Clone, Default)]
pub struct FixtureCatalog {
    products: FxHashMap<ProductId, CartProduct>,
    categories: FxHashSet<CategoryId>,
}

impl FixtureCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every product and category loaded into `fixture`.
    #[must_use]
    pub fn from_fixture(fixture: &Fixture) -> Self {
        Self {
            products: fixture
                .products()
                .map(|(id, catalog)| (id, catalog.product))
                .collect(),
            categories: fixture.references().categories,
        }
    }

    #[must_use]
    pub fn with_product(mut self, id: ProductId, product: CartProduct) -> Self {
        self.categories.extend(product.category);
        self.products.insert(id, product);

        self
    }

    #[must_use]
    pub fn with_category(mut self, id: CategoryId) -> Self {
        self.categories.insert(id);

        self
    }
}

#[async_trait]
impl CatalogReader for FixtureCatalog {
    async fn products(
        &self,
        ids: &[ProductId],
    ) -> Result<FxHashMap<ProductId, CartProduct>, CatalogError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.products.get(id).map(|product| (*id, *product)))
            .collect())
    }

    async fn categories(&self, ids: &[CategoryId]) -> Result<FxHashSet<CategoryId>, CatalogError> {
        Ok(ids
            .iter()
            .copied()
            .filter(|id| self.categories.contains(id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[tokio::test]
    async fn from_fixture_exposes_fixture_products() -> TestResult {
        let mut fixture = Fixture::with_base_path("../../fixtures");

        fixture.load_products("spend_threshold")?;

        let catalog = FixtureCatalog::from_fixture(&fixture);
        let tote = fixture.product_id("tote")?;

        let found = catalog.products(&[tote, ProductId::new()]).await?;

        assert_eq!(found.len(), 1);
        assert_eq!(found.get(&tote).map(|product| product.price), Some(1_250));

        Ok(())
    }
}
