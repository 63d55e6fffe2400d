//! Fixtures

use std::{fs, path::PathBuf};

use jiff::Timestamp;
use rustc_hash::FxHashMap;
use rusty_money::iso::Currency;
use thiserror::Error;

use crate::{
    cart::{CartLine, CartProduct, EvaluationContext},
    fixtures::{
        carts::CartFixture,
        products::{CatalogProduct, ProductsFixture},
        rules::RulesFixture,
    },
    ids::{CategoryId, ProductId, RuleId, UserId},
    rules::{
        GiftRule,
        authoring::{AuthoringError, KnownReferences},
    },
    usage::UsageCounts,
};

pub mod carts;
pub mod products;
pub mod rules;

/// Fixture Parsing Errors
#[derive(Debug, Error)]
pub enum FixtureError {
    /// IO error reading fixture files
    #[error("Failed to read fixture file: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_norway::Error),

    /// Invalid price format
    #[error("Invalid price format: {0}")]
    InvalidPrice(String),

    /// Unknown currency code
    #[error("Unknown currency code: {0}")]
    UnknownCurrency(String),

    /// Currency mismatch between products
    #[error("Currency mismatch: expected {0}, found {1}")]
    CurrencyMismatch(String, String),

    /// No products loaded yet
    #[error("No products loaded yet; currency unknown")]
    NoCurrency,

    /// Product not found
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Category not found
    #[error("Category not found: {0}")]
    CategoryNotFound(String),

    /// Rule not found
    #[error("Rule not found: {0}")]
    RuleNotFound(String),

    /// Rule fixture failed authoring validation
    #[error("Invalid rule {key}: {source}")]
    InvalidRule {
        /// Rule key in the fixture
        key: String,

        /// Validation failure
        source: AuthoringError,
    },

    /// No cart loaded
    #[error("No cart loaded")]
    NoCart,
}

/// Fixture
#[derive(Debug)]
pub struct Fixture {
    /// Base path for fixture files
    base_path: PathBuf,

    /// String key -> identifier mappings for lookups
    product_keys: FxHashMap<String, ProductId>,
    category_keys: FxHashMap<String, CategoryId>,
    rule_keys: FxHashMap<String, RuleId>,
    user_keys: FxHashMap<String, UserId>,

    /// Catalog products by identifier
    products: FxHashMap<ProductId, CatalogProduct>,

    /// Validated rules
    rules: Vec<GiftRule>,

    /// Loaded cart, if any
    cart: Option<(UserId, Vec<CartLine>)>,

    /// Prior redemptions of the cart's customer
    usage: UsageCounts,

    /// Currency for the fixture set
    currency: Option<&'static Currency>,
}

impl Fixture {
    /// Create a new empty fixture with default base path
    pub fn new() -> Self {
        Self::with_base_path("./fixtures")
    }

    /// Create a new empty fixture with custom base path
    pub fn with_base_path(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            product_keys: FxHashMap::default(),
            category_keys: FxHashMap::default(),
            rule_keys: FxHashMap::default(),
            user_keys: FxHashMap::default(),
            products: FxHashMap::default(),
            rules: Vec::new(),
            cart: None,
            usage: UsageCounts::new(),
            currency: None,
        }
    }

    fn read(&self, kind: &str, name: &str) -> Result<String, FixtureError> {
        let file_path = self.base_path.join(kind).join(format!("{name}.yml"));

        Ok(fs::read_to_string(file_path)?)
    }

    /// Load products from a YAML fixture file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or if there are currency mismatches.
    pub fn load_products(&mut self, name: &str) -> Result<&mut Self, FixtureError> {
        let fixture: ProductsFixture = serde_norway::from_str(&self.read("products", name)?)?;

        let mut entries: Vec<_> = fixture.products.into_iter().collect();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));

        for (key, product_fixture) in entries {
            let (price, currency) = products::parse_price(&product_fixture.price)?;

            self.check_currency(currency)?;

            let category = product_fixture.category.map(|category| {
                *self
                    .category_keys
                    .entry(category)
                    .or_insert_with(CategoryId::new)
            });

            let product_id = ProductId::new();

            self.products.insert(
                product_id,
                CatalogProduct {
                    name: product_fixture.name,
                    product: CartProduct {
                        price,
                        category,
                        stock: product_fixture.stock,
                    },
                },
            );

            self.product_keys.insert(key, product_id);
        }

        Ok(self)
    }

    /// Load rules from a YAML fixture file
    ///
    /// Every rule goes through authoring validation, so fixtures cannot hold rules the store
    /// would refuse.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, if a referenced key is unknown,
    /// or if a rule fails validation.
    pub fn load_rules(&mut self, name: &str) -> Result<&mut Self, FixtureError> {
        let fixture: RulesFixture = serde_norway::from_str(&self.read("rules", name)?)?;

        let mut entries: Vec<_> = fixture.rules.into_iter().collect();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));

        let references = self.references();

        for (key, rule_fixture) in entries {
            let draft = rule_fixture.to_draft(self)?;

            let new_rule = match draft.validate(&references) {
                Ok(new_rule) => new_rule,
                Err(source) => return Err(FixtureError::InvalidRule { key, source }),
            };

            let mut rule = new_rule.into_rule(
                RuleId::new(),
                rule_fixture.created_at.unwrap_or(Timestamp::UNIX_EPOCH),
            );

            rule.quota.current_total_uses = rule_fixture.current_total_uses;

            self.rule_keys.insert(key, rule.id);
            self.rules.push(rule);
        }

        Ok(self)
    }

    /// Load a cart from a YAML fixture file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if a product or rule key is
    /// unknown.
    pub fn load_cart(&mut self, name: &str) -> Result<&mut Self, FixtureError> {
        let fixture: CartFixture = serde_norway::from_str(&self.read("carts", name)?)?;

        let user_key = fixture.user.unwrap_or_else(|| "customer".to_string());
        let user = *self.user_keys.entry(user_key).or_insert_with(UserId::new);

        let mut lines = Vec::with_capacity(fixture.lines.len());

        for line in fixture.lines {
            let product_id = self.product_id(&line.product)?;
            let product = self.product(&line.product)?.product;

            lines.push(match line.gift_rule {
                Some(rule_key) => {
                    CartLine::gift(self.rule_id(&rule_key)?, product_id, line.quantity, product)
                }
                None => CartLine::purchased(product_id, line.quantity, product),
            });
        }

        let mut usage = UsageCounts::new();

        for (rule_key, count) in fixture.usage {
            usage = usage.with_count(self.rule_id(&rule_key)?, count);
        }

        self.cart = Some((user, lines));
        self.usage = usage;

        Ok(self)
    }

    /// Load a complete fixture set (products, rules, and cart with the same name)
    ///
    /// # Errors
    ///
    /// Returns an error if any of the fixture files cannot be loaded.
    pub fn from_set(name: &str) -> Result<Self, FixtureError> {
        Self::from_set_at("./fixtures", name)
    }

    /// Load a complete fixture set from a custom base path
    ///
    /// # Errors
    ///
    /// Returns an error if any of the fixture files cannot be loaded.
    pub fn from_set_at(base_path: impl Into<PathBuf>, name: &str) -> Result<Self, FixtureError> {
        let mut fixture = Self::with_base_path(base_path);

        fixture
            .load_products(name)?
            .load_rules(name)?
            .load_cart(name)?;

        Ok(fixture)
    }

    fn check_currency(&mut self, currency: &'static Currency) -> Result<(), FixtureError> {
        match self.currency {
            Some(existing) if existing != currency => Err(FixtureError::CurrencyMismatch(
                existing.iso_alpha_code.to_string(),
                currency.iso_alpha_code.to_string(),
            )),
            Some(_) => Ok(()),
            None => {
                self.currency = Some(currency);

                Ok(())
            }
        }
    }

    /// Parse an amount such as `"100.00 GBP"` into minor units in the fixture currency
    ///
    /// # Errors
    ///
    /// Returns an error if the amount is malformed, no products have been loaded, or the
    /// currency differs from the products' currency.
    pub fn parse_amount(&self, value: &str) -> Result<i64, FixtureError> {
        let (minor_units, currency) = products::parse_price(value)?;
        let expected = self.currency()?;

        if expected != currency {
            return Err(FixtureError::CurrencyMismatch(
                expected.iso_alpha_code.to_string(),
                currency.iso_alpha_code.to_string(),
            ));
        }

        i64::try_from(minor_units)
            .map_err(|_overflow| FixtureError::InvalidPrice(value.to_string()))
    }

    /// Get a product identifier by its string key
    ///
    /// # Errors
    ///
    /// Returns an error if the product is not found.
    pub fn product_id(&self, key: &str) -> Result<ProductId, FixtureError> {
        self.product_keys
            .get(key)
            .copied()
            .ok_or_else(|| FixtureError::ProductNotFound(key.to_string()))
    }

    /// Get a product by its string key
    ///
    /// # Errors
    ///
    /// Returns an error if the product is not found.
    pub fn product(&self, key: &str) -> Result<&CatalogProduct, FixtureError> {
        let product_id = self.product_id(key)?;

        self.products
            .get(&product_id)
            .ok_or_else(|| FixtureError::ProductNotFound(key.to_string()))
    }

    /// Get a category identifier by its string key
    ///
    /// # Errors
    ///
    /// Returns an error if no product declared the category.
    pub fn category_id(&self, key: &str) -> Result<CategoryId, FixtureError> {
        self.category_keys
            .get(key)
            .copied()
            .ok_or_else(|| FixtureError::CategoryNotFound(key.to_string()))
    }

    /// Get a rule identifier by its string key
    ///
    /// # Errors
    ///
    /// Returns an error if the rule is not found.
    pub fn rule_id(&self, key: &str) -> Result<RuleId, FixtureError> {
        self.rule_keys
            .get(key)
            .copied()
            .ok_or_else(|| FixtureError::RuleNotFound(key.to_string()))
    }

    /// Get a rule by its string key
    ///
    /// # Errors
    ///
    /// Returns an error if the rule is not found.
    pub fn rule(&self, key: &str) -> Result<&GiftRule, FixtureError> {
        let rule_id = self.rule_id(key)?;

        self.rules
            .iter()
            .find(|rule| rule.id == rule_id)
            .ok_or_else(|| FixtureError::RuleNotFound(key.to_string()))
    }

    /// Get all rules
    pub fn rules(&self) -> &[GiftRule] {
        &self.rules
    }

    /// Get all catalog products
    pub fn products(&self) -> impl Iterator<Item = (ProductId, &CatalogProduct)> {
        self.products.iter().map(|(id, product)| (*id, product))
    }

    /// Catalog product by identifier
    pub fn catalog_product(&self, product: ProductId) -> Option<&CatalogProduct> {
        self.products.get(&product)
    }

    /// Known products and categories, for authoring validation
    pub fn references(&self) -> KnownReferences {
        KnownReferences {
            products: self.products.keys().copied().collect(),
            categories: self.category_keys.values().copied().collect(),
        }
    }

    /// Build an evaluation context from the loaded cart
    ///
    /// # Errors
    ///
    /// Returns an error if no cart has been loaded.
    pub fn context(&self) -> Result<EvaluationContext, FixtureError> {
        let (user, lines) = self.cart.as_ref().ok_or(FixtureError::NoCart)?;

        Ok(EvaluationContext::new(*user, lines.clone()))
    }

    /// Prior redemptions of the cart's customer
    pub fn usage(&self) -> &UsageCounts {
        &self.usage
    }

    /// Get the currency
    ///
    /// # Errors
    ///
    /// Returns an error if no products have been loaded yet.
    pub fn currency(&self) -> Result<&'static Currency, FixtureError> {
        self.currency.ok_or(FixtureError::NoCurrency)
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}
