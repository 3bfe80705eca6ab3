//! Order aggregate implementation.

use common::{AggregateId, TenantId, UserId};
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, AggregateRoot};
use crate::error::Result;
use crate::event::DomainEvent;

use super::{OrderError, OrderEvent};

/// Order aggregate root.
///
/// A named list of products owned by a tenant. Deleting an order is a
/// logical delete: the stream stays, the audit trail marks it inactive and
/// every later mutation is refused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    root: AggregateRoot<OrderEvent>,

    /// Display name of the order.
    name: String,

    /// Product names, in the order they were added.
    products: Vec<String>,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    const CATEGORY: &'static str = "order";

    fn with_id(id: AggregateId) -> Self {
        Self {
            root: AggregateRoot::new(id),
            name: String::new(),
            products: Vec::new(),
        }
    }

    fn root(&self) -> &AggregateRoot<OrderEvent> {
        &self.root
    }

    fn root_mut(&mut self) -> &mut AggregateRoot<OrderEvent> {
        &mut self.root
    }

    fn apply(&mut self, event: &DomainEvent<OrderEvent>) {
        match event.data() {
            OrderEvent::Created(data) => {
                self.name = data.name.clone();
            }
            OrderEvent::NameUpdated(data) => {
                self.name = data.name.clone();
            }
            OrderEvent::ProductAdded(data) => {
                self.products.push(data.product.clone());
            }
            OrderEvent::ProductRemoved(data) => {
                if let Some(index) = self.products.iter().position(|p| *p == data.product) {
                    self.products.remove(index);
                }
            }
            // Audit handles deactivation.
            OrderEvent::Deleted(_) => {}
        }
    }
}

impl Order {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn products(&self) -> &[String] {
        &self.products
    }

    /// Returns true once created and until deleted.
    pub fn is_active(&self) -> bool {
        self.audit().is_active()
    }

    /// Returns true if the order has been deleted.
    pub fn is_deleted(&self) -> bool {
        self.version().as_i64() > 0 && !self.is_active()
    }

    // Command handlers: validate, then raise events.

    /// Creates a new order.
    pub fn create(
        id: AggregateId,
        name: impl Into<String>,
        created_by: UserId,
        tenant: Option<TenantId>,
    ) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;

        let mut order = Self::with_id(id);
        order.raise(OrderEvent::created(name, created_by, tenant))?;
        Ok(order)
    }

    /// Renames the order.
    pub fn update_name(&mut self, name: impl Into<String>, updated_by: UserId) -> Result<()> {
        self.ensure_mutable()?;
        let name = name.into();
        validate_name(&name)?;
        self.raise(OrderEvent::name_updated(name, updated_by))
    }

    /// Adds a product. The same product may appear more than once.
    pub fn add_product(&mut self, product: impl Into<String>, added_by: UserId) -> Result<()> {
        self.ensure_mutable()?;
        let product = product.into();
        if product.trim().is_empty() {
            return Err(OrderError::ProductRequired.into());
        }
        self.raise(OrderEvent::product_added(product, added_by))
    }

    /// Removes one occurrence of a product.
    pub fn remove_product(&mut self, product: impl Into<String>, removed_by: UserId) -> Result<()> {
        self.ensure_mutable()?;
        let product = product.into();
        if !self.products.contains(&product) {
            return Err(OrderError::ProductNotFound { product }.into());
        }
        self.raise(OrderEvent::product_removed(product, removed_by))
    }

    /// Deletes the order.
    pub fn delete(&mut self, deleted_by: UserId) -> Result<()> {
        self.ensure_mutable()?;
        self.raise(OrderEvent::deleted(deleted_by))
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.is_deleted() {
            return Err(OrderError::Deleted.into());
        }
        if !self.is_active() {
            return Err(OrderError::NotCreated.into());
        }
        Ok(())
    }

    fn raise(&mut self, data: OrderEvent) -> Result<()> {
        let event = DomainEvent::new(self.id(), data);
        self.add_event(event)
    }
}

fn validate_name(name: &str) -> std::result::Result<(), OrderError> {
    if name.trim().is_empty() {
        return Err(OrderError::NameRequired);
    }
    Ok(())
}
