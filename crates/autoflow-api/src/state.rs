//! Application state wiring all services together.
//!
//! `AppState` pins the generic engine and scheduler to the SQLite stores and
//! picks a concrete implementation for every collaborator from the loaded
//! configuration. Used by both CLI commands and REST API handlers.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use autoflow_core::action::{ActionRegistry, ActionServices};
use autoflow_core::collaborator::{
    AgentClient, BroadcastChangeFeed, ChangeFeed, Datastore, MessageTransport, NotificationChannel,
};
use autoflow_core::engine::ExecutionEngine;
use autoflow_core::trigger::TriggerScheduler;
use autoflow_infra::config::load_config;
use autoflow_infra::http::{
    DisabledAgent, DisabledTransport, HttpAgentClient, HttpMessageTransport, ReqwestHttpClient,
    build_client,
};
use autoflow_infra::notification::{PushNotificationChannel, RecordNotificationChannel};
use autoflow_infra::sqlite::{DatabasePool, SqliteExecutionStore, SqliteRecordStore, SqliteWorkflowStore};
use autoflow_types::config::{AutoflowConfig, TransportConfig};

/// Engine pinned to the SQLite stores.
pub type Engine = ExecutionEngine<SqliteWorkflowStore, SqliteExecutionStore>;

/// Scheduler pinned to the SQLite stores.
pub type Scheduler = TriggerScheduler<SqliteWorkflowStore, SqliteExecutionStore>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AutoflowConfig>,
    pub data_dir: PathBuf,
    pub engine: Arc<Engine>,
    pub scheduler: Arc<Scheduler>,
}

impl AppState {
    /// Load `config.toml`, open the database and wire every collaborator.
    ///
    /// Must run inside the tokio runtime (the scheduler spawns its
    /// dispatcher task). Triggers are not armed here; `serve` does that.
    pub async fn init(data_dir: PathBuf) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let config = load_config(&data_dir).await;

        let pool = DatabasePool::open(&data_dir)
            .await
            .with_context(|| format!("failed to open database in {}", data_dir.display()))?;

        Self::from_parts(config, data_dir, pool)
    }

    /// Wire services over an already-open pool.
    fn from_parts(config: AutoflowConfig, data_dir: PathBuf, pool: DatabasePool) -> anyhow::Result<Self> {
        let change_feed: Arc<dyn ChangeFeed> = Arc::new(BroadcastChangeFeed::new());
        let datastore: Arc<dyn Datastore> =
            Arc::new(SqliteRecordStore::new(pool.clone(), change_feed.clone()));

        let client = build_client(&config.http).context("failed to build HTTP client")?;

        let notifications: Arc<dyn NotificationChannel> = match &config.notifications.push_url {
            Some(url) => Arc::new(PushNotificationChannel::new(client.clone(), url.clone())),
            None => Arc::new(RecordNotificationChannel::new(datastore.clone())),
        };
        let agent: Arc<dyn AgentClient> = match &config.agent {
            Some(agent) => Arc::new(HttpAgentClient::new(client.clone(), agent)),
            None => Arc::new(DisabledAgent),
        };

        let transport = |channel: &str, settings: Option<&TransportConfig>| -> Arc<dyn MessageTransport> {
            match settings {
                Some(settings) => Arc::new(HttpMessageTransport::new(channel, client.clone(), settings)),
                None => Arc::new(DisabledTransport::new(channel)),
            }
        };
        let email = transport("email", config.email.as_ref());
        let sms = transport("sms", config.sms.as_ref());

        let services = ActionServices {
            datastore: datastore.clone(),
            notifications,
            email,
            sms,
            http: Arc::new(ReqwestHttpClient::new(client)),
            agent,
        };
        let registry = ActionRegistry::with_defaults(services, &config.engine);

        let engine = Arc::new(ExecutionEngine::new(
            Arc::new(SqliteWorkflowStore::new(pool.clone())),
            Arc::new(SqliteExecutionStore::new(pool)),
            registry,
            &config.engine,
        ));
        let scheduler = Arc::new(TriggerScheduler::new(engine.clone(), datastore, change_feed));

        tracing::debug!(
            email = config.email.is_some(),
            sms = config.sms.is_some(),
            agent = config.agent.is_some(),
            push = config.notifications.push_url.is_some(),
            "services wired"
        );

        Ok(Self {
            config: Arc::new(config),
            data_dir,
            engine,
            scheduler,
        })
    }
}
