use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};

use crate::config::Config;
use crate::db::Store;
use crate::domain::events::AccountEvent;
use crate::services::mailer::{RetryPolicy, mailer_from_config};
use crate::services::{
    AccountService, AuditService, ForumService, MailQueue, Mailer, SeaOrmAccountService,
    SeaOrmForumService,
};

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<RwLock<Config>>,

    pub store: Store,

    pub event_bus: broadcast::Sender<AccountEvent>,

    pub audit_service: Arc<AuditService>,

    pub account_service: Arc<dyn AccountService>,

    pub forum_service: Arc<dyn ForumService>,
}

impl SharedState {
    /// Builds the state with the transport named by `config.mail`.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let mailer = mailer_from_config(&config.mail)
            .map_err(|e| anyhow::anyhow!("Failed to configure mail transport: {e}"))?;
        Self::with_mailer(config, mailer).await
    }

    pub async fn with_mailer(config: Config, mailer: Arc<dyn Mailer>) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        let (event_bus, _) = broadcast::channel(config.general.event_bus_buffer_size.max(1));

        let mail_queue = MailQueue::start(
            mailer,
            config.mail.queue_capacity,
            RetryPolicy::from(&config.mail),
        );

        let audit_service = Arc::new(AuditService::new(store.clone(), event_bus.clone()));
        audit_service.clone().start_listener();

        let account_service = Arc::new(SeaOrmAccountService::new(
            store.clone(),
            &config,
            mail_queue,
            event_bus.clone(),
        )) as Arc<dyn AccountService>;

        let forum_service = Arc::new(SeaOrmForumService::new(store.clone(), event_bus.clone()))
            as Arc<dyn ForumService>;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            store,
            event_bus,
            audit_service,
            account_service,
            forum_service,
        })
    }
}
