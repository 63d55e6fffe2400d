//! Gift rule storage, usage ledger and request-time gifting services.

pub mod context;
pub mod database;
pub mod domain;
pub mod logging;

#[cfg(test)]
mod test;
