//! External AI agent service interface used by the `ai_agent` action.

use autoflow_types::error::CollaboratorError;
use futures_util::future::BoxFuture;
use serde_json::Value;

/// Delegates a named task to an agent and returns its JSON answer.
pub trait AgentClient: Send + Sync {
    fn invoke<'a>(
        &'a self,
        agent_name: &'a str,
        task: &'a str,
        data: Value,
    ) -> BoxFuture<'a, Result<Value, CollaboratorError>>;
}
