//! Order aggregate and related types.

mod aggregate;
mod events;
mod service;

pub use aggregate::Order;
pub use events::{
    NameUpdatedData, OrderCreatedData, OrderDeletedData, OrderEvent, ProductAddedData,
    ProductRemovedData,
};
pub use service::OrderService;

use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The order name is blank.
    #[error("Order name is required")]
    NameRequired,

    /// The product name is blank.
    #[error("Product name is required")]
    ProductRequired,

    /// The product is not on the order.
    #[error("Product not found: {product}")]
    ProductNotFound { product: String },

    /// The order has not been created yet.
    #[error("Order has not been created")]
    NotCreated,

    /// The order was deleted and can no longer change.
    #[error("Order has been deleted")]
    Deleted,
}
