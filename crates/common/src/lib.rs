//! Shared vocabulary for the marketplace crates.
//!
//! Everything here is plain data: identifiers, money and the status enums
//! persisted alongside orders and payment intents. Behaviour lives in the
//! crates that own the workflows.

pub mod ids;
pub mod money;
pub mod status;

pub use ids::{OrderId, PaymentIntentId, ProductId, UserId};
pub use money::Money;
pub use status::{OrderStatus, ParseStatusError, PaymentIntentStatus};
