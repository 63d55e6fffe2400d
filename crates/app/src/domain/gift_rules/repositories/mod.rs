pub(crate) mod conditions;
pub(crate) mod gift_products;
pub(crate) mod rules;
