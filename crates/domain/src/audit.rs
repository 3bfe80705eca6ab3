//! Audit trail carried by every aggregate.

use chrono::{DateTime, Utc};
use common::{TenantId, UserId};
use serde::{Deserialize, Serialize};

/// How an event touches the audit trail.
///
/// Declared by the event payload via
/// [`EventData::audit_change`](crate::EventData::audit_change) and applied
/// during replay, so audit fields only ever move when an event is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditChange {
    /// The aggregate came into existence.
    Created {
        by: UserId,
        tenant: Option<TenantId>,
    },
    /// The aggregate was modified.
    Updated { by: UserId },
    /// The aggregate was soft-deleted.
    Deactivated { by: UserId },
    /// The event does not touch the audit trail.
    Untracked,
}

/// Who created and last changed an aggregate, and when.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Audit {
    created_at: Option<DateTime<Utc>>,
    created_by: Option<UserId>,
    updated_at: Option<DateTime<Utc>>,
    updated_by: Option<UserId>,
    is_active: bool,
    tenant: Option<TenantId>,
}

impl Audit {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn created_by(&self) -> Option<UserId> {
        self.created_by
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn updated_by(&self) -> Option<UserId> {
        self.updated_by
    }

    /// False before creation and after deactivation.
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn tenant(&self) -> Option<TenantId> {
        self.tenant
    }

    pub(crate) fn record(&mut self, change: AuditChange, at: DateTime<Utc>) {
        match change {
            AuditChange::Created { by, tenant } => {
                self.created_at = Some(at);
                self.created_by = Some(by);
                self.tenant = tenant;
                self.is_active = true;
            }
            AuditChange::Updated { by } => {
                self.updated_at = Some(at);
                self.updated_by = Some(by);
            }
            AuditChange::Deactivated { by } => {
                self.updated_at = Some(at);
                self.updated_by = Some(by);
                self.is_active = false;
            }
            AuditChange::Untracked => {}
        }
    }
}
