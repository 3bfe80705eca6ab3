//! Order service providing a simplified API for order operations.

use common::{AggregateId, TenantId, UserId};
use event_store::{EventStore, Version};

use crate::aggregate::Aggregate;
use crate::error::Result;
use crate::options::EventSourcingOptions;
use crate::repository::{CommandResult, Repository};

use super::Order;

/// Attempts per command before a concurrency conflict is returned.
const MAX_ATTEMPTS: usize = 3;

/// Service for managing orders.
///
/// Wraps a [`Repository`] and retries commands that lose an optimistic
/// concurrency race.
pub struct OrderService<S: EventStore> {
    repository: Repository<S, Order>,
}

impl<S: EventStore> OrderService<S> {
    /// Creates a new order service with the given event store and options
    /// read from the environment.
    pub fn new(store: S) -> Result<Self> {
        Self::with_options(store, EventSourcingOptions::from_env())
    }

    pub fn with_options(store: S, options: EventSourcingOptions) -> Result<Self> {
        Ok(Self {
            repository: Repository::with_options(store, options)?,
        })
    }

    /// Returns a reference to the underlying repository.
    pub fn repository(&self) -> &Repository<S, Order> {
        &self.repository
    }

    /// Creates and persists a new order.
    ///
    /// Fails with a concurrency conflict if the stream already exists.
    #[tracing::instrument(skip(self))]
    pub async fn create_order(
        &self,
        order_id: AggregateId,
        name: String,
        created_by: UserId,
        tenant: Option<TenantId>,
    ) -> Result<Order> {
        let mut order = Order::create(order_id, name, created_by, tenant)?;
        self.repository.save(&mut order).await?;
        Ok(order)
    }

    /// Renames an order.
    #[tracing::instrument(skip(self))]
    pub async fn update_name(
        &self,
        order_id: AggregateId,
        name: String,
        updated_by: UserId,
    ) -> Result<CommandResult<Order>> {
        self.repository
            .execute_with_retry(order_id, MAX_ATTEMPTS, |order| {
                order.update_name(name.clone(), updated_by)
            })
            .await
    }

    /// Adds a product to an order.
    #[tracing::instrument(skip(self))]
    pub async fn add_product(
        &self,
        order_id: AggregateId,
        product: String,
        added_by: UserId,
    ) -> Result<CommandResult<Order>> {
        self.repository
            .execute_with_retry(order_id, MAX_ATTEMPTS, |order| {
                order.add_product(product.clone(), added_by)
            })
            .await
    }

    /// Removes a product from an order.
    #[tracing::instrument(skip(self))]
    pub async fn remove_product(
        &self,
        order_id: AggregateId,
        product: String,
        removed_by: UserId,
    ) -> Result<CommandResult<Order>> {
        self.repository
            .execute_with_retry(order_id, MAX_ATTEMPTS, |order| {
                order.remove_product(product.clone(), removed_by)
            })
            .await
    }

    /// Deletes an order.
    #[tracing::instrument(skip(self))]
    pub async fn delete_order(
        &self,
        order_id: AggregateId,
        deleted_by: UserId,
    ) -> Result<CommandResult<Order>> {
        self.repository
            .execute_with_retry(order_id, MAX_ATTEMPTS, |order| order.delete(deleted_by))
            .await
    }

    /// Gets an order by ID, or None if it was never created.
    pub async fn get_order(&self, order_id: AggregateId) -> Result<Option<Order>> {
        self.repository.load_existing(order_id).await
    }

    /// Current stream version of an order.
    pub async fn version(&self, order_id: AggregateId) -> Result<Version> {
        Ok(self.repository.load(order_id).await?.version())
    }
}
