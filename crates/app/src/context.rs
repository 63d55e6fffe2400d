//! App Context

use std::sync::Arc;

use thiserror::Error;

use crate::{
    database::{self, Db},
    domain::{
        catalog::CatalogReader,
        gift_rules::{GiftRulesService, PgGiftRulesService},
        gifting::{EngineGiftingService, GiftingService, InMemoryGiftStore},
        ledger::{PgUsageLedger, UsageLedger},
    },
};

#[derive(Debug, Error)]
pub enum AppInitError {
    #[error("failed to connect to database")]
    Database(#[source] sqlx::Error),
}

#[derive(Clone)]
pub struct AppContext {
    pub catalog: Arc<dyn CatalogReader>,
    pub gift_rules: Arc<dyn GiftRulesService>,
    pub ledger: Arc<dyn UsageLedger>,
    pub gifting: Arc<dyn GiftingService>,
}

impl AppContext {
    /// Build application context backed by `PostgreSQL`.
    ///
    /// # Errors
    ///
    /// Returns an error when establishing a database connection fails.
    pub async fn from_database_url(
        url: &str,
        catalog: Arc<dyn CatalogReader>,
    ) -> Result<Self, AppInitError> {
        let pool = database::connect(url)
            .await
            .map_err(AppInitError::Database)?;

        let db = Db::new(pool);

        let gift_rules: Arc<dyn GiftRulesService> =
            Arc::new(PgGiftRulesService::new(db.clone(), Arc::clone(&catalog)));
        let ledger: Arc<dyn UsageLedger> = Arc::new(PgUsageLedger::new(db));

        Ok(Self::assemble(catalog, gift_rules, ledger))
    }

    /// Build application context over a single in-memory store.
    #[must_use]
    pub fn in_memory(catalog: Arc<dyn CatalogReader>) -> Self {
        let store = Arc::new(InMemoryGiftStore::new(Arc::clone(&catalog)));

        Self::assemble(catalog, store.clone(), store)
    }

    fn assemble(
        catalog: Arc<dyn CatalogReader>,
        gift_rules: Arc<dyn GiftRulesService>,
        ledger: Arc<dyn UsageLedger>,
    ) -> Self {
        let gifting = Arc::new(EngineGiftingService::new(
            Arc::clone(&gift_rules),
            Arc::clone(&ledger),
            Arc::clone(&catalog),
        ));

        Self {
            catalog,
            gift_rules,
            ledger,
            gifting,
        }
    }
}
