//! Cart Fixtures

use rustc_hash::FxHashMap;
use serde::Deserialize;

/// Cart Fixture
#[derive(Debug, Deserialize)]
pub struct CartFixture {
    /// Customer key; every distinct key maps to one generated user
    #[serde(default)]
    pub user: Option<String>,

    /// Cart lines
    pub lines: Vec<LineFixture>,

    /// Prior redemptions by this customer, keyed by rule key
    #[serde(default)]
    pub usage: FxHashMap<String, u32>,
}

/// Line Fixture
#[derive(Debug, Deserialize)]
pub struct LineFixture {
    /// Product key
    pub product: String,

    /// Units
    #[serde(default = "default_quantity")]
    pub quantity: u32,

    /// Rule key, making this a gift line
    #[serde(default)]
    pub gift_rule: Option<String>,
}

const fn default_quantity() -> u32 {
    1
}
