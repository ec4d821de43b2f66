//! In-memory doubles for every store and collaborator trait, shared by the
//! unit tests of this crate.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use autoflow_types::error::{CollaboratorError, RepositoryError};
use autoflow_types::execution::{Execution, ExecutionUpdate, LogEntry};
use autoflow_types::record::{DeliveryReceipt, RecordQuery};
use autoflow_types::workflow::{ActionKind, Workflow};
use futures_util::future::BoxFuture;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::action::{ActionError, ActionExecutor, ActionRegistry, ActionServices};
use crate::collaborator::{
    AgentClient, Datastore, HttpClient, HttpRequest, HttpResponse, MessageTransport,
    Notification, NotificationChannel, OutboundMessage,
};
use crate::context::ExecutionContext;
use crate::repository::execution::ExecutionStore;
use crate::repository::workflow::WorkflowStore;

fn row_id(row: &Value) -> Option<String> {
    match row.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Datastore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockDatastore {
    tables: Mutex<BTreeMap<String, Vec<Value>>>,
    insert_calls: AtomicUsize,
    write_failure: Mutex<Option<String>>,
}

impl MockDatastore {
    /// Rows of a table in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables.lock().unwrap().get(table).cloned().unwrap_or_default()
    }

    /// Insert a row directly, bypassing call counting and failures.
    pub fn seed(&self, table: &str, mut row: Value) -> Value {
        if row_id(&row).is_none() {
            row["id"] = json!(Uuid::now_v7().to_string());
        }
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        row
    }

    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    /// Make every subsequent write fail with `message`.
    pub fn fail_writes(&self, message: &str) {
        *self.write_failure.lock().unwrap() = Some(message.to_string());
    }

    fn check_writable(&self) -> Result<(), CollaboratorError> {
        match self.write_failure.lock().unwrap().as_ref() {
            Some(message) => Err(CollaboratorError::Request(message.clone())),
            None => Ok(()),
        }
    }
}

impl Datastore for MockDatastore {
    fn insert<'a>(&'a self, table: &'a str, data: Value) -> BoxFuture<'a, Result<Value, CollaboratorError>> {
        Box::pin(async move {
            self.insert_calls.fetch_add(1, Ordering::SeqCst);
            self.check_writable()?;
            Ok(self.seed(table, data))
        })
    }

    fn update<'a>(
        &'a self,
        table: &'a str,
        id: &'a str,
        data: Value,
    ) -> BoxFuture<'a, Result<Value, CollaboratorError>> {
        Box::pin(async move {
            self.check_writable()?;
            let mut tables = self.tables.lock().unwrap();
            let row = tables
                .get_mut(table)
                .and_then(|rows| rows.iter_mut().find(|r| row_id(r).as_deref() == Some(id)))
                .ok_or(RepositoryError::NotFound)?;
            if let (Value::Object(target), Value::Object(changes)) = (&mut *row, data) {
                target.extend(changes);
            }
            Ok(row.clone())
        })
    }

    fn delete<'a>(&'a self, table: &'a str, id: &'a str) -> BoxFuture<'a, Result<Value, CollaboratorError>> {
        Box::pin(async move {
            self.check_writable()?;
            let mut tables = self.tables.lock().unwrap();
            let rows = tables.get_mut(table).ok_or(RepositoryError::NotFound)?;
            let position = rows
                .iter()
                .position(|r| row_id(r).as_deref() == Some(id))
                .ok_or(RepositoryError::NotFound)?;
            Ok(rows.remove(position))
        })
    }

    fn get<'a>(&'a self, table: &'a str, id: &'a str) -> BoxFuture<'a, Result<Option<Value>, CollaboratorError>> {
        Box::pin(async move {
            Ok(self
                .rows(table)
                .into_iter()
                .find(|r| row_id(r).as_deref() == Some(id)))
        })
    }

    fn query<'a>(
        &'a self,
        table: &'a str,
        query: &'a RecordQuery,
    ) -> BoxFuture<'a, Result<Vec<Value>, CollaboratorError>> {
        Box::pin(async move {
            let mut rows: Vec<Value> = self.rows(table).into_iter().filter(|r| query.matches(r)).collect();
            if let Some(field) = &query.order_by {
                rows.sort_by_key(|r| r.get(field).map(|v| v.to_string()).unwrap_or_default());
                if !query.ascending {
                    rows.reverse();
                }
            }
            if let Some(limit) = query.limit {
                rows.truncate(limit as usize);
            }
            Ok(rows)
        })
    }
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockNotifications {
    delivered: Mutex<Vec<Notification>>,
    failure: Mutex<Option<String>>,
}

impl MockNotifications {
    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }
}

impl NotificationChannel for MockNotifications {
    fn notify<'a>(&'a self, notification: &'a Notification) -> BoxFuture<'a, Result<(), CollaboratorError>> {
        Box::pin(async move {
            if let Some(message) = self.failure.lock().unwrap().clone() {
                return Err(CollaboratorError::Request(message));
            }
            self.delivered.lock().unwrap().push(notification.clone());
            Ok(())
        })
    }
}

pub struct MockTransport {
    channel: &'static str,
    sent: Mutex<Vec<OutboundMessage>>,
    failure: Mutex<Option<String>>,
    rejection: Mutex<Option<String>>,
}

impl MockTransport {
    pub fn new(channel: &'static str) -> Self {
        Self {
            channel,
            sent: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            rejection: Mutex::new(None),
        }
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Fail sends with a transport error.
    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    /// Accept sends but report them as rejected.
    pub fn reject_with(&self, message: &str) {
        *self.rejection.lock().unwrap() = Some(message.to_string());
    }
}

impl MessageTransport for MockTransport {
    fn channel(&self) -> &str {
        self.channel
    }

    fn send<'a>(&'a self, message: &'a OutboundMessage) -> BoxFuture<'a, Result<DeliveryReceipt, CollaboratorError>> {
        Box::pin(async move {
            if let Some(error) = self.failure.lock().unwrap().clone() {
                return Err(CollaboratorError::Request(error));
            }
            if let Some(error) = self.rejection.lock().unwrap().clone() {
                return Ok(DeliveryReceipt::rejected(error));
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push(message.clone());
            Ok(DeliveryReceipt::delivered(format!("{}-{}", self.channel, sent.len())))
        })
    }
}

// ---------------------------------------------------------------------------
// HTTP and agent
// ---------------------------------------------------------------------------

pub struct MockHttp {
    requests: Mutex<Vec<HttpRequest>>,
    response: Mutex<(u16, Value)>,
}

impl Default for MockHttp {
    fn default() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            response: Mutex::new((200, json!({"ok": true}))),
        }
    }
}

impl MockHttp {
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn respond_with(&self, status: u16, body: Value) {
        *self.response.lock().unwrap() = (status, body);
    }
}

impl HttpClient for MockHttp {
    fn send<'a>(&'a self, request: HttpRequest) -> BoxFuture<'a, Result<HttpResponse, CollaboratorError>> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(request);
            let (status, body) = self.response.lock().unwrap().clone();
            Ok(HttpResponse {
                status,
                headers: BTreeMap::new(),
                body,
            })
        })
    }
}

pub struct MockAgent {
    response: Mutex<Value>,
    failure: Mutex<Option<String>>,
    calls: Mutex<Vec<(String, String, Value)>>,
}

impl Default for MockAgent {
    fn default() -> Self {
        Self {
            response: Mutex::new(json!({"answer": "ok"})),
            failure: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl MockAgent {
    pub fn respond_with(&self, response: Value) {
        *self.response.lock().unwrap() = response;
    }

    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn calls(&self) -> Vec<(String, String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

impl AgentClient for MockAgent {
    fn invoke<'a>(
        &'a self,
        agent_name: &'a str,
        task: &'a str,
        data: Value,
    ) -> BoxFuture<'a, Result<Value, CollaboratorError>> {
        Box::pin(async move {
            self.calls
                .lock()
                .unwrap()
                .push((agent_name.to_string(), task.to_string(), data));
            if let Some(message) = self.failure.lock().unwrap().clone() {
                return Err(CollaboratorError::Request(message));
            }
            Ok(self.response.lock().unwrap().clone())
        })
    }
}

// ---------------------------------------------------------------------------
// Service bundle
// ---------------------------------------------------------------------------

/// Every collaborator double, kept typed so tests can inspect them.
pub struct MockServices {
    pub datastore: Arc<MockDatastore>,
    pub notifications: Arc<MockNotifications>,
    pub email: Arc<MockTransport>,
    pub sms: Arc<MockTransport>,
    pub http: Arc<MockHttp>,
    pub agent: Arc<MockAgent>,
}

impl MockServices {
    pub fn new() -> Self {
        Self {
            datastore: Arc::new(MockDatastore::default()),
            notifications: Arc::new(MockNotifications::default()),
            email: Arc::new(MockTransport::new("email")),
            sms: Arc::new(MockTransport::new("sms")),
            http: Arc::new(MockHttp::default()),
            agent: Arc::new(MockAgent::default()),
        }
    }

    pub fn services(&self) -> ActionServices {
        ActionServices {
            datastore: self.datastore.clone(),
            notifications: self.notifications.clone(),
            email: self.email.clone(),
            sms: self.sms.clone(),
            http: self.http.clone(),
            agent: self.agent.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Flaky executor
// ---------------------------------------------------------------------------

/// Registered as `webhook`; fails with a retryable error for the first
/// `failures` calls, then returns `{"attempt": n}`.
pub struct FlakyAction {
    failures: usize,
    pub calls: AtomicUsize,
}

impl FlakyAction {
    pub fn failing_times(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
        }
    }
}

impl ActionExecutor for FlakyAction {
    fn kind(&self) -> ActionKind {
        ActionKind::Webhook
    }

    fn validate(&self, _config: &Value, _registry: &ActionRegistry) -> Vec<String> {
        Vec::new()
    }

    fn execute<'a>(
        &'a self,
        _config: Value,
        _ctx: &'a mut ExecutionContext,
        _registry: &'a ActionRegistry,
    ) -> BoxFuture<'a, Result<Value, ActionError>> {
        Box::pin(async move {
            let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.failures {
                return Err(CollaboratorError::Request(format!("attempt {attempt} failed")).into());
            }
            Ok(json!({"attempt": attempt}))
        })
    }
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryWorkflowStore {
    workflows: Mutex<HashMap<Uuid, Workflow>>,
}

impl MemoryWorkflowStore {
    pub fn with(workflows: impl IntoIterator<Item = Workflow>) -> Self {
        let store = Self::default();
        store
            .workflows
            .lock()
            .unwrap()
            .extend(workflows.into_iter().map(|w| (w.id, w)));
        store
    }
}

impl WorkflowStore for MemoryWorkflowStore {
    async fn get_workflow(&self, id: &Uuid) -> Result<Option<Workflow>, RepositoryError> {
        Ok(self.workflows.lock().unwrap().get(id).cloned())
    }

    async fn list_enabled_workflows(&self) -> Result<Vec<Workflow>, RepositoryError> {
        let mut all = self.list_workflows().await?;
        all.retain(|w| w.enabled);
        Ok(all)
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>, RepositoryError> {
        let mut all: Vec<Workflow> = self.workflows.lock().unwrap().values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn save_workflow(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        self.workflows.lock().unwrap().insert(workflow.id, workflow.clone());
        Ok(())
    }

    async fn set_enabled(&self, id: &Uuid, enabled: bool) -> Result<(), RepositoryError> {
        let mut workflows = self.workflows.lock().unwrap();
        let workflow = workflows.get_mut(id).ok_or(RepositoryError::NotFound)?;
        workflow.enabled = enabled;
        Ok(())
    }

    async fn delete_workflow(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        Ok(self.workflows.lock().unwrap().remove(id).is_some())
    }
}

#[derive(Default)]
pub struct MemoryExecutionStore {
    executions: Mutex<HashMap<Uuid, Execution>>,
    logs: Mutex<Vec<LogEntry>>,
}

impl MemoryExecutionStore {
    pub fn all_executions(&self) -> Vec<Execution> {
        self.executions.lock().unwrap().values().cloned().collect()
    }
}

impl ExecutionStore for MemoryExecutionStore {
    async fn insert_execution(&self, execution: &Execution) -> Result<(), RepositoryError> {
        self.executions
            .lock()
            .unwrap()
            .insert(execution.id, execution.clone());
        Ok(())
    }

    async fn update_execution(&self, id: &Uuid, update: &ExecutionUpdate) -> Result<(), RepositoryError> {
        let mut executions = self.executions.lock().unwrap();
        let execution = executions.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if execution.status.is_terminal() {
            return Err(RepositoryError::Conflict(format!(
                "execution {id} is already {}",
                execution.status
            )));
        }
        execution.status = update.status;
        execution.result = update.result.clone();
        execution.error_message = update.error_message.clone();
        execution.completed_at = update.completed_at;
        Ok(())
    }

    async fn get_execution(&self, id: &Uuid) -> Result<Option<Execution>, RepositoryError> {
        Ok(self.executions.lock().unwrap().get(id).cloned())
    }

    async fn list_executions(&self, workflow_id: &Uuid, limit: u32) -> Result<Vec<Execution>, RepositoryError> {
        let mut matching: Vec<Execution> = self
            .all_executions()
            .into_iter()
            .filter(|e| &e.workflow_id == workflow_id)
            .collect();
        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        matching.truncate(limit as usize);
        Ok(matching)
    }

    async fn list_running_executions(&self) -> Result<Vec<Execution>, RepositoryError> {
        Ok(self
            .all_executions()
            .into_iter()
            .filter(|e| e.status == autoflow_types::execution::ExecutionStatus::Running)
            .collect())
    }

    async fn insert_log(&self, entry: &LogEntry) -> Result<(), RepositoryError> {
        self.logs.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn list_logs(&self, execution_id: &Uuid) -> Result<Vec<LogEntry>, RepositoryError> {
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|l| &l.execution_id == execution_id)
            .cloned()
            .collect())
    }
}
