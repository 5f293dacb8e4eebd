use crate::domain::{AccountId, now_timestamp};
use crate::entities::{audit_logs, prelude::*};
use anyhow::Result;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set};

pub use crate::entities::audit_logs::Model as AuditEntry;

pub struct AuditRepository {
    conn: DatabaseConnection,
}

impl AuditRepository {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn add(
        &self,
        event_type: &str,
        account_id: Option<AccountId>,
        message: &str,
        details: Option<String>,
    ) -> Result<()> {
        let active_model = audit_logs::ActiveModel {
            event_type: Set(event_type.to_string()),
            account_id: Set(account_id.map(|id| id.value())),
            message: Set(message.to_string()),
            details: Set(details),
            created_at: Set(now_timestamp()),
            ..Default::default()
        };

        AuditLogs::insert(active_model).exec(&self.conn).await?;
        Ok(())
    }

    /// Newest first, optionally narrowed to one account or event type.
    pub async fn list(
        &self,
        limit: u64,
        account_id: Option<AccountId>,
        event_type: Option<String>,
    ) -> Result<Vec<AuditEntry>> {
        let mut query = AuditLogs::find()
            .order_by_desc(audit_logs::Column::CreatedAt)
            .order_by_desc(audit_logs::Column::Id);

        if let Some(id) = account_id {
            query = query.filter(audit_logs::Column::AccountId.eq(id.value()));
        }

        if let Some(event_type) = event_type {
            query = query.filter(audit_logs::Column::EventType.eq(event_type));
        }

        let items = query.limit(limit).all(&self.conn).await?;
        Ok(items)
    }
}
