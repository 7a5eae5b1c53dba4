//! Payment intents for marketplace orders.
//!
//! Paying for an order is a two-step handshake:
//! 1. [`PaymentWorkflow::create_intent`] moves a `new` order to
//!    `awaiting_payment` and hands out a one-time client secret
//! 2. [`PaymentWorkflow::confirm`] checks the secret and marks both the intent
//!    and the order as paid in one transaction

pub mod error;
pub mod secret;
pub mod workflow;

pub use error::{PaymentError, Result};
pub use workflow::PaymentWorkflow;
