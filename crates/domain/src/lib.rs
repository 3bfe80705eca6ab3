//! Domain layer for the event-sourcing system.
//!
//! This crate provides the core domain abstractions including:
//! - `DomainEvent` envelopes over `EventData` payload enums
//! - The `Aggregate` trait with replay, pending events and audit
//! - `Repository` for loading, saving and snapshotting aggregates
//! - The order aggregate as a worked example

pub mod aggregate;
pub mod audit;
pub mod error;
pub mod event;
pub mod options;
pub mod order;
pub mod registry;
pub mod repository;

pub use aggregate::{Aggregate, AggregateRoot};
pub use audit::{Audit, AuditChange};
pub use error::{DomainError, Result};
pub use event::{DomainEvent, EventData};
pub use options::EventSourcingOptions;
pub use order::{Order, OrderError, OrderEvent, OrderService};
pub use registry::EventRegistry;
pub use repository::{CommandResult, Repository};
