//! Order domain events.

use common::{TenantId, UserId};
use event_store::EventKey;
use serde::{Deserialize, Serialize};

use crate::audit::AuditChange;
use crate::event::EventData;

/// Events that can occur on an order aggregate.
///
/// The serde tag of each variant is its rendered [`EventKey`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// Order was created.
    #[serde(rename = "order.v1.created")]
    Created(OrderCreatedData),

    /// Order was renamed.
    #[serde(rename = "order.v1.name_updated")]
    NameUpdated(NameUpdatedData),

    /// Product was added to the order.
    #[serde(rename = "order.v1.product_added")]
    ProductAdded(ProductAddedData),

    /// Product was removed from the order.
    #[serde(rename = "order.v1.product_removed")]
    ProductRemoved(ProductRemovedData),

    /// Order was deleted. Terminal.
    #[serde(rename = "order.v1.deleted")]
    Deleted(OrderDeletedData),
}

impl OrderEvent {
    pub const CREATED: EventKey = EventKey::new("order", 1, "created");
    pub const NAME_UPDATED: EventKey = EventKey::new("order", 1, "name_updated");
    pub const PRODUCT_ADDED: EventKey = EventKey::new("order", 1, "product_added");
    pub const PRODUCT_REMOVED: EventKey = EventKey::new("order", 1, "product_removed");
    pub const DELETED: EventKey = EventKey::new("order", 1, "deleted");

    /// Creates an OrderCreated event.
    pub fn created(name: impl Into<String>, created_by: UserId, tenant: Option<TenantId>) -> Self {
        OrderEvent::Created(OrderCreatedData {
            name: name.into(),
            created_by,
            tenant,
        })
    }

    /// Creates a NameUpdated event.
    pub fn name_updated(name: impl Into<String>, updated_by: UserId) -> Self {
        OrderEvent::NameUpdated(NameUpdatedData {
            name: name.into(),
            updated_by,
        })
    }

    /// Creates a ProductAdded event.
    pub fn product_added(product: impl Into<String>, added_by: UserId) -> Self {
        OrderEvent::ProductAdded(ProductAddedData {
            product: product.into(),
            added_by,
        })
    }

    /// Creates a ProductRemoved event.
    pub fn product_removed(product: impl Into<String>, removed_by: UserId) -> Self {
        OrderEvent::ProductRemoved(ProductRemovedData {
            product: product.into(),
            removed_by,
        })
    }

    /// Creates an OrderDeleted event.
    pub fn deleted(deleted_by: UserId) -> Self {
        OrderEvent::Deleted(OrderDeletedData { deleted_by })
    }
}

impl EventData for OrderEvent {
    const KEYS: &'static [EventKey] = &[
        Self::CREATED,
        Self::NAME_UPDATED,
        Self::PRODUCT_ADDED,
        Self::PRODUCT_REMOVED,
        Self::DELETED,
    ];

    fn key(&self) -> EventKey {
        match self {
            OrderEvent::Created(_) => Self::CREATED,
            OrderEvent::NameUpdated(_) => Self::NAME_UPDATED,
            OrderEvent::ProductAdded(_) => Self::PRODUCT_ADDED,
            OrderEvent::ProductRemoved(_) => Self::PRODUCT_REMOVED,
            OrderEvent::Deleted(_) => Self::DELETED,
        }
    }

    fn audit_change(&self) -> AuditChange {
        match self {
            OrderEvent::Created(data) => AuditChange::Created {
                by: data.created_by,
                tenant: data.tenant,
            },
            OrderEvent::NameUpdated(data) => AuditChange::Updated {
                by: data.updated_by,
            },
            OrderEvent::ProductAdded(data) => AuditChange::Updated { by: data.added_by },
            OrderEvent::ProductRemoved(data) => AuditChange::Updated {
                by: data.removed_by,
            },
            OrderEvent::Deleted(data) => AuditChange::Deactivated {
                by: data.deleted_by,
            },
        }
    }
}

/// Data for OrderCreated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedData {
    pub name: String,
    pub created_by: UserId,
    #[serde(default)]
    pub tenant: Option<TenantId>,
}

/// Data for NameUpdated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameUpdatedData {
    pub name: String,
    pub updated_by: UserId,
}

/// Data for ProductAdded event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductAddedData {
    pub product: String,
    pub added_by: UserId,
}

/// Data for ProductRemoved event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRemovedData {
    pub product: String,
    pub removed_by: UserId,
}

/// Data for OrderDeleted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDeletedData {
    pub deleted_by: UserId,
}
