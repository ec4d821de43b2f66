//! Owned registry of armed workflow triggers.
//!
//! Each armed workflow gets one spawned task (a change-feed listener or a
//! timer loop) and a `CancellationToken`. Tasks never call the engine
//! directly: they push a [`FireRequest`] into an mpsc inbox, and a single
//! dispatcher task spawns one `execute_workflow` future per request.

use std::collections::BTreeMap;
use std::sync::Arc;

use autoflow_types::workflow::{TriggerType, Workflow};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{DatabaseTriggerSpec, FireRequest, ScheduleSpec, TriggerError, describe_trigger};
use crate::collaborator::{ChangeFeed, Datastore};
use crate::engine::ExecutionEngine;
use crate::repository::execution::ExecutionStore;
use crate::repository::workflow::WorkflowStore;

/// Pending fire requests before trigger tasks start waiting on the inbox.
const INBOX_CAPACITY: usize = 1024;

// ---------------------------------------------------------------------------
// Registration bookkeeping
// ---------------------------------------------------------------------------

struct ActiveTrigger {
    info: TriggerInfo,
    cancel: CancellationToken,
}

/// Public view of one armed trigger.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerInfo {
    pub workflow_id: Uuid,
    pub workflow_name: String,
    pub trigger_type: TriggerType,
    pub description: String,
    pub armed_at: DateTime<Utc>,
}

/// Snapshot returned by [`TriggerScheduler::get_active_trigger_stats`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct TriggerStats {
    pub total: usize,
    pub by_type: BTreeMap<String, usize>,
    pub triggers: Vec<TriggerInfo>,
}

// ---------------------------------------------------------------------------
// TriggerScheduler
// ---------------------------------------------------------------------------

pub struct TriggerScheduler<W, E> {
    engine: Arc<ExecutionEngine<W, E>>,
    datastore: Arc<dyn Datastore>,
    change_feed: Arc<dyn ChangeFeed>,
    active: DashMap<Uuid, ActiveTrigger>,
    inbox: mpsc::Sender<FireRequest>,
}

impl<W, E> TriggerScheduler<W, E>
where
    W: WorkflowStore + 'static,
    E: ExecutionStore + 'static,
{
    /// Create the scheduler and spawn its dispatcher task. Must be called
    /// inside a tokio runtime.
    pub fn new(
        engine: Arc<ExecutionEngine<W, E>>,
        datastore: Arc<dyn Datastore>,
        change_feed: Arc<dyn ChangeFeed>,
    ) -> Self {
        let (inbox, requests) = mpsc::channel(INBOX_CAPACITY);
        tokio::spawn(dispatch_requests(engine.clone(), requests));

        Self {
            engine,
            datastore,
            change_feed,
            active: DashMap::new(),
            inbox,
        }
    }

    pub fn engine(&self) -> &Arc<ExecutionEngine<W, E>> {
        &self.engine
    }

    /// Arm every enabled workflow. A workflow whose trigger fails to arm is
    /// logged and skipped. Returns the number of armed triggers.
    pub async fn initialize_workflow_triggers(&self) -> Result<usize, TriggerError> {
        let workflows = self.engine.workflow_store().list_enabled_workflows().await?;
        let mut armed = 0;

        for workflow in &workflows {
            match self.setup_workflow_trigger(workflow) {
                Ok(true) => armed += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        workflow_id = %workflow.id,
                        workflow = %workflow.name,
                        error = %e,
                        "skipping workflow with invalid trigger"
                    );
                }
            }
        }

        tracing::info!(armed, workflows = workflows.len(), "workflow triggers initialized");
        Ok(armed)
    }

    /// Arm one workflow's trigger, replacing any existing registration.
    ///
    /// Returns `Ok(false)` when nothing needs arming (disabled, `manual`,
    /// `api_event`).
    pub fn setup_workflow_trigger(&self, workflow: &Workflow) -> Result<bool, TriggerError> {
        self.stop_workflow_trigger(&workflow.id);

        if !workflow.enabled {
            tracing::debug!(workflow_id = %workflow.id, "workflow disabled, trigger not armed");
            return Ok(false);
        }

        let cancel = CancellationToken::new();
        match workflow.trigger_type {
            TriggerType::Manual | TriggerType::ApiEvent => return Ok(false),
            TriggerType::DatabaseEvent => {
                let spec = DatabaseTriggerSpec::from_config(&workflow.trigger_config)?;
                // Subscribe before spawning so no change published after
                // setup returns is missed.
                let events = self.change_feed.subscribe(&spec.table);
                tokio::spawn(listen_for_changes(
                    workflow.id,
                    spec,
                    events,
                    self.inbox.clone(),
                    cancel.clone(),
                ));
            }
            TriggerType::Scheduled => {
                let spec = ScheduleSpec::from_config(&workflow.trigger_config)?;
                tokio::spawn(run_schedule(
                    workflow.id,
                    spec,
                    self.datastore.clone(),
                    self.inbox.clone(),
                    cancel.clone(),
                ));
            }
        }

        let info = TriggerInfo {
            workflow_id: workflow.id,
            workflow_name: workflow.name.clone(),
            trigger_type: workflow.trigger_type,
            description: describe_trigger(workflow),
            armed_at: Utc::now(),
        };
        tracing::info!(
            workflow_id = %workflow.id,
            workflow = %workflow.name,
            trigger_type = %workflow.trigger_type,
            description = %info.description,
            "trigger armed"
        );
        // A concurrent setup for the same id may have registered between the
        // stop above and here; whatever this insert displaces must not outlive it.
        if let Some(displaced) = self.active.insert(workflow.id, ActiveTrigger { info, cancel }) {
            displaced.cancel.cancel();
            tracing::debug!(workflow_id = %workflow.id, "displaced concurrent registration");
        }
        Ok(true)
    }

    /// Tear down one registration. Returns `false` if nothing was armed.
    pub fn stop_workflow_trigger(&self, workflow_id: &Uuid) -> bool {
        match self.active.remove(workflow_id) {
            Some((_, trigger)) => {
                trigger.cancel.cancel();
                tracing::info!(workflow_id = %workflow_id, "trigger stopped");
                true
            }
            None => false,
        }
    }

    /// Tear down every registration. Returns how many were stopped.
    pub fn stop_all_workflow_triggers(&self) -> usize {
        let ids: Vec<Uuid> = self.active.iter().map(|entry| *entry.key()).collect();
        let stopped = ids
            .iter()
            .filter(|id| self.stop_workflow_trigger(id))
            .count();
        if stopped > 0 {
            tracing::info!(stopped, "all triggers stopped");
        }
        stopped
    }

    /// Stop everything and re-arm from the workflow store.
    pub async fn reload(&self) -> Result<usize, TriggerError> {
        self.stop_all_workflow_triggers();
        self.initialize_workflow_triggers().await
    }

    pub fn is_active(&self, workflow_id: &Uuid) -> bool {
        self.active.contains_key(workflow_id)
    }

    pub fn get_active_trigger_stats(&self) -> TriggerStats {
        let mut triggers: Vec<TriggerInfo> =
            self.active.iter().map(|entry| entry.info.clone()).collect();
        triggers.sort_by(|a, b| a.workflow_name.cmp(&b.workflow_name));

        let mut by_type = BTreeMap::new();
        for trigger in &triggers {
            *by_type.entry(trigger.trigger_type.to_string()).or_insert(0) += 1;
        }

        TriggerStats {
            total: triggers.len(),
            by_type,
            triggers,
        }
    }
}

impl<W, E> Drop for TriggerScheduler<W, E> {
    fn drop(&mut self) {
        for entry in self.active.iter() {
            entry.cancel.cancel();
        }
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Drain the inbox, running each request as its own execution.
async fn dispatch_requests<W, E>(
    engine: Arc<ExecutionEngine<W, E>>,
    mut requests: mpsc::Receiver<FireRequest>,
) where
    W: WorkflowStore + 'static,
    E: ExecutionStore + 'static,
{
    while let Some(request) = requests.recv().await {
        let engine = engine.clone();
        tokio::spawn(async move {
            match engine
                .execute_workflow(&request.workflow_id, request.trigger_data)
                .await
            {
                Ok(execution) => tracing::debug!(
                    workflow_id = %request.workflow_id,
                    execution_id = %execution.id,
                    trigger_type = %request.trigger_type,
                    status = %execution.status,
                    "triggered execution finished"
                ),
                Err(e) => tracing::warn!(
                    workflow_id = %request.workflow_id,
                    trigger_type = %request.trigger_type,
                    error = %e,
                    "triggered execution could not start"
                ),
            }
        });
    }
    tracing::debug!("trigger dispatcher stopped");
}

async fn listen_for_changes(
    workflow_id: Uuid,
    spec: DatabaseTriggerSpec,
    mut events: broadcast::Receiver<autoflow_types::record::ChangeEvent>,
    inbox: mpsc::Sender<FireRequest>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            received = events.recv() => received,
        };

        let event = match event {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(workflow_id = %workflow_id, skipped, "change feed lagged, events dropped");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        if !spec.matches(&event) {
            continue;
        }
        let trigger_data = DatabaseTriggerSpec::trigger_data(&event);
        if !spec.should_fire(&trigger_data) {
            tracing::debug!(workflow_id = %workflow_id, record_id = %event.record_id, "condition not met");
            continue;
        }

        let request = FireRequest {
            workflow_id,
            trigger_type: TriggerType::DatabaseEvent,
            trigger_data,
        };
        if inbox.send(request).await.is_err() {
            break;
        }
    }
    tracing::debug!(workflow_id = %workflow_id, "change listener exited");
}

async fn run_schedule(
    workflow_id: Uuid,
    spec: ScheduleSpec,
    datastore: Arc<dyn Datastore>,
    inbox: mpsc::Sender<FireRequest>,
    cancel: CancellationToken,
) {
    loop {
        if !fire_scheduled(workflow_id, &spec, datastore.as_ref(), &inbox).await {
            break;
        }

        let delay = match spec.next_delay(Utc::now()) {
            Ok(delay) => delay,
            Err(e) => {
                tracing::warn!(workflow_id = %workflow_id, error = %e, "schedule has no next occurrence");
                break;
            }
        };
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    tracing::debug!(workflow_id = %workflow_id, "schedule loop exited");
}

/// One scheduled firing. Returns `false` once the inbox is closed.
async fn fire_scheduled(
    workflow_id: Uuid,
    spec: &ScheduleSpec,
    datastore: &dyn Datastore,
    inbox: &mpsc::Sender<FireRequest>,
) -> bool {
    let payloads: Vec<Value> = match &spec.query {
        None => vec![json!({})],
        Some(query) => match datastore.query(&query.table, &query.query).await {
            Ok(rows) => rows.into_iter().map(|row| json!({"item": row})).collect(),
            Err(e) => {
                tracing::warn!(
                    workflow_id = %workflow_id,
                    table = %query.table,
                    error = %e,
                    "scheduled query failed, skipping this run"
                );
                Vec::new()
            }
        },
    };

    tracing::debug!(workflow_id = %workflow_id, runs = payloads.len(), "schedule fired");
    for trigger_data in payloads {
        let request = FireRequest {
            workflow_id,
            trigger_type: TriggerType::Scheduled,
            trigger_data,
        };
        if inbox.send(request).await.is_err() {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionRegistry;
    use crate::collaborator::BroadcastChangeFeed;
    use crate::testing::{MemoryExecutionStore, MemoryWorkflowStore, MockServices};
    use autoflow_types::config::EngineConfig;
    use autoflow_types::execution::Execution;
    use autoflow_types::record::{ChangeEvent, ChangeKind};
    use autoflow_types::workflow::{Action, ActionKind};
    use std::time::Duration;

    type Scheduler = TriggerScheduler<MemoryWorkflowStore, MemoryExecutionStore>;

    fn workflow(name: &str, trigger_type: TriggerType, trigger_config: Value) -> Workflow {
        Workflow {
            id: Uuid::now_v7(),
            name: name.to_string(),
            description: None,
            trigger_type,
            trigger_config,
            actions: vec![Action::new(ActionKind::Log, json!({"message": "fired"}))],
            enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn scheduler(mocks: &MockServices, feed: Arc<BroadcastChangeFeed>, workflows: Vec<Workflow>) -> Scheduler {
        let config = EngineConfig::default();
        let engine = ExecutionEngine::new(
            Arc::new(MemoryWorkflowStore::with(workflows)),
            Arc::new(MemoryExecutionStore::default()),
            ActionRegistry::with_defaults(mocks.services(), &config),
            &config,
        );
        TriggerScheduler::new(Arc::new(engine), mocks.datastore.clone(), feed)
    }

    /// Poll until `count` executions exist, or give up after two seconds.
    async fn wait_for_executions(scheduler: &Scheduler, count: usize) -> Vec<Execution> {
        for _ in 0..200 {
            let executions = scheduler.engine().execution_store().all_executions();
            if executions.len() >= count && executions.iter().all(|e| e.status.is_terminal()) {
                return executions;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        scheduler.engine().execution_store().all_executions()
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let mocks = MockServices::new();
        let wf = workflow("hourly", TriggerType::Scheduled, json!({"interval": 3_600_000}));
        let scheduler = scheduler(&mocks, Arc::new(BroadcastChangeFeed::new()), vec![wf.clone()]);

        assert!(scheduler.setup_workflow_trigger(&wf).unwrap());
        assert_eq!(scheduler.get_active_trigger_stats().total, 1);

        assert!(scheduler.stop_workflow_trigger(&wf.id));
        let after_first = scheduler.get_active_trigger_stats();
        assert!(!scheduler.stop_workflow_trigger(&wf.id));
        let after_second = scheduler.get_active_trigger_stats();
        assert_eq!(after_first.total, 0);
        assert_eq!(after_second.total, after_first.total);
        assert_eq!(after_second.by_type, after_first.by_type);
    }

    #[tokio::test]
    async fn test_setup_replaces_existing_registration() {
        let mocks = MockServices::new();
        let feed = Arc::new(BroadcastChangeFeed::new());
        let wf = workflow("jobs", TriggerType::DatabaseEvent, json!({"table": "jobs", "event": "insert"}));
        let scheduler = scheduler(&mocks, feed.clone(), vec![wf.clone()]);

        scheduler.setup_workflow_trigger(&wf).unwrap();
        scheduler.setup_workflow_trigger(&wf).unwrap();
        assert_eq!(scheduler.get_active_trigger_stats().total, 1);

        // The replaced listener drops its receiver once cancelled.
        for _ in 0..100 {
            if feed.subscriber_count("jobs") == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(feed.subscriber_count("jobs"), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_setup_leaves_one_listener() {
        let mocks = MockServices::new();
        let feed = Arc::new(BroadcastChangeFeed::new());
        let wf = workflow("jobs", TriggerType::DatabaseEvent, json!({"table": "jobs", "event": "insert"}));
        let scheduler = Arc::new(scheduler(&mocks, feed.clone(), vec![wf.clone()]));

        let barrier = Arc::new(tokio::sync::Barrier::new(8));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let scheduler = scheduler.clone();
            let barrier = barrier.clone();
            let wf = wf.clone();
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                scheduler.setup_workflow_trigger(&wf).unwrap()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert_eq!(scheduler.get_active_trigger_stats().total, 1);

        assert!(scheduler.stop_workflow_trigger(&wf.id));
        for _ in 0..200 {
            if feed.subscriber_count("jobs") == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(feed.subscriber_count("jobs"), 0);
    }

    #[tokio::test]
    async fn test_scheduled_query_fans_out_per_row() {
        let mocks = MockServices::new();
        for id in ["a", "b", "c"] {
            mocks.datastore.seed("jobs", json!({"id": id, "status": "open"}));
        }
        mocks.datastore.seed("jobs", json!({"id": "z", "status": "closed"}));
        let wf = workflow(
            "reminders",
            TriggerType::Scheduled,
            json!({"interval": 3_600_000, "query": {"table": "jobs", "filters": {"status": "open"}}}),
        );
        let scheduler = scheduler(&mocks, Arc::new(BroadcastChangeFeed::new()), vec![wf.clone()]);

        scheduler.setup_workflow_trigger(&wf).unwrap();
        let executions = wait_for_executions(&scheduler, 3).await;
        scheduler.stop_all_workflow_triggers();

        assert_eq!(executions.len(), 3);
        let mut ids: Vec<String> = executions
            .iter()
            .map(|e| e.trigger_data["item"]["id"].as_str().unwrap().to_string())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_scheduled_without_query_fires_empty_payload() {
        let mocks = MockServices::new();
        let wf = workflow("tick", TriggerType::Scheduled, json!({"interval": 3_600_000}));
        let scheduler = scheduler(&mocks, Arc::new(BroadcastChangeFeed::new()), vec![wf.clone()]);

        scheduler.setup_workflow_trigger(&wf).unwrap();
        let executions = wait_for_executions(&scheduler, 1).await;
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].trigger_data, json!({}));
    }

    #[tokio::test]
    async fn test_database_event_condition_gates_firing() {
        let mocks = MockServices::new();
        let feed = Arc::new(BroadcastChangeFeed::new());
        let wf = workflow(
            "job-done",
            TriggerType::DatabaseEvent,
            json!({"table": "jobs", "event": "update", "condition": "NEW.status == 'done' && OLD.status != 'done'"}),
        );
        let scheduler = scheduler(&mocks, feed.clone(), vec![wf.clone()]);
        scheduler.setup_workflow_trigger(&wf).unwrap();

        let change = |kind, old: Value, new: Value| ChangeEvent {
            table: "jobs".to_string(),
            kind,
            record_id: "j1".to_string(),
            old: Some(old),
            new: Some(new),
        };
        feed.publish(change(ChangeKind::Update, json!({"status": "open"}), json!({"status": "open"})));
        feed.publish(change(ChangeKind::Insert, json!({}), json!({"status": "done"})));
        feed.publish(change(ChangeKind::Update, json!({"status": "open"}), json!({"id": "j1", "status": "done"})));

        let executions = wait_for_executions(&scheduler, 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(executions.len(), 1);
        assert_eq!(scheduler.engine().execution_store().all_executions().len(), 1);
        assert_eq!(executions[0].trigger_data["event"], "update");
        assert_eq!(executions[0].trigger_data["status"], "done");
    }

    #[tokio::test]
    async fn test_initialize_skips_invalid_and_unarmed_workflows() {
        let mocks = MockServices::new();
        let good = workflow("good", TriggerType::Scheduled, json!({"interval": 3_600_000}));
        let bad = workflow("bad", TriggerType::DatabaseEvent, json!({}));
        let manual = workflow("manual", TriggerType::Manual, json!({}));
        let mut disabled = workflow("off", TriggerType::Scheduled, json!({"interval": 1000}));
        disabled.enabled = false;

        let scheduler = scheduler(
            &mocks,
            Arc::new(BroadcastChangeFeed::new()),
            vec![good.clone(), bad, manual, disabled],
        );
        assert_eq!(scheduler.initialize_workflow_triggers().await.unwrap(), 1);

        let stats = scheduler.get_active_trigger_stats();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.by_type.get("scheduled"), Some(&1));
        assert_eq!(stats.triggers[0].workflow_id, good.id);

        assert_eq!(scheduler.stop_all_workflow_triggers(), 1);
        assert_eq!(scheduler.stop_all_workflow_triggers(), 0);
    }
}
