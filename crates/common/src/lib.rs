//! Identifier types shared by the event store and the domain layer.

mod types;

pub use types::{AggregateId, TenantId, UserId};
