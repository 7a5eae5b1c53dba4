//! Domain layer of the marketplace.
//!
//! This crate provides:
//! - [`OrderWorkflow`], which converts a cart into an order atomically and
//!   replays completed requests that carry the same idempotency key
//! - the order status state machine and the operator transitions built on it
//! - [`CartService`] for maintaining a user's cart
//! - [`CatalogService`] for listing and maintaining products

pub mod cart;
pub mod catalog;
pub mod error;
pub mod order;

pub use cart::CartService;
pub use catalog::CatalogService;
pub use error::{CartError, CatalogError, OrderError};
pub use order::{
    DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, OrderWorkflow, check_transition, is_valid_transition,
};
