use crate::db::{AuditEntry, Store};
use crate::domain::AccountId;
use crate::domain::events::AccountEvent;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, warn};

/// Persists account events to the audit log and counts them.
pub struct AuditService {
    store: Store,
    event_bus: broadcast::Sender<AccountEvent>,
}

impl AuditService {
    #[must_use]
    pub const fn new(store: Store, event_bus: broadcast::Sender<AccountEvent>) -> Self {
        Self { store, event_bus }
    }

    pub fn start_listener(self: Arc<Self>) {
        let mut rx = self.event_bus.subscribe();
        let service = self;

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let Err(e) = service.handle_event(&event).await {
                            error!(error = %e, event = event.event_type(), "Failed to write audit entry");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(count)) => {
                        warn!(count, "Audit listener lagged, events skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        });
    }

    /// Newest entries first.
    pub async fn recent(
        &self,
        limit: u64,
        account_id: Option<AccountId>,
        event_type: Option<String>,
    ) -> anyhow::Result<Vec<AuditEntry>> {
        self.store
            .list_audit_entries(limit, account_id, event_type)
            .await
    }

    async fn handle_event(&self, event: &AccountEvent) -> anyhow::Result<()> {
        let event_type = event.event_type();
        metrics::counter!("account_events_total", "event" => event_type).increment(1);

        let details = match event {
            AccountEvent::Registered { .. }
            | AccountEvent::Suspended { .. }
            | AccountEvent::Unsuspended { .. }
            | AccountEvent::Deleted { .. }
            | AccountEvent::Purged { .. }
            | AccountEvent::ForumCreated { .. }
            | AccountEvent::ModeratorGranted { .. }
            | AccountEvent::ModeratorRevoked { .. } => Some(serde_json::to_string(event)?),
            _ => None,
        };

        self.store
            .add_audit_entry(event_type, event.account_id(), &event.message(), details)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_land_in_the_audit_log() {
        let path = std::env::temp_dir().join(format!("townhall_audit_{}.db", uuid::Uuid::new_v4()));
        let store = Store::new(&format!("sqlite:{}?mode=rwc", path.display()))
            .await
            .unwrap();
        let (tx, _) = broadcast::channel(16);
        let service = AuditService::new(store.clone(), tx);

        service
            .handle_event(&AccountEvent::Suspended {
                account_id: AccountId::new(1),
                by: AccountId::new(1),
            })
            .await
            .unwrap();

        let entries = service
            .recent(10, Some(AccountId::new(1)), None)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event_type, "Suspended");
        assert!(entries[0].details.as_deref().unwrap().contains("\"by\":1"));

        let _ = std::fs::remove_file(path);
    }
}
