//! Gifting
//!
//! Request-time entry points: which rules a cart qualifies for, whether a gift may be added,
//! and committing an order's gifts against the usage ledger.

mod errors;
pub mod memory;
pub mod service;

pub use errors::GiftingServiceError;
pub use memory::InMemoryGiftStore;
pub use service::{EngineGiftingService, GiftingService, MockGiftingService};
