//! Orders: creation from a cart, reads, and the status lifecycle.

pub mod idempotency;
mod lifecycle;
pub mod state;
mod workflow;

pub use state::{allowed_targets, check_transition, is_terminal, is_valid_transition};
pub use workflow::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, OrderWorkflow};
