//! Table-keyed record CRUD used by the record actions and scheduled queries.

use autoflow_types::error::CollaboratorError;
use autoflow_types::record::RecordQuery;
use futures_util::future::BoxFuture;
use serde_json::Value;

/// Generic datastore addressed by table name.
///
/// Rows are JSON objects; every row carries a string `id` assigned on insert
/// unless the caller supplies one.
pub trait Datastore: Send + Sync {
    /// Insert a row and return it as stored (including `id`).
    fn insert<'a>(
        &'a self,
        table: &'a str,
        data: Value,
    ) -> BoxFuture<'a, Result<Value, CollaboratorError>>;

    /// Merge `data` into an existing row and return the updated row.
    fn update<'a>(
        &'a self,
        table: &'a str,
        id: &'a str,
        data: Value,
    ) -> BoxFuture<'a, Result<Value, CollaboratorError>>;

    /// Delete a row, returning the removed row image.
    fn delete<'a>(
        &'a self,
        table: &'a str,
        id: &'a str,
    ) -> BoxFuture<'a, Result<Value, CollaboratorError>>;

    fn get<'a>(
        &'a self,
        table: &'a str,
        id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Value>, CollaboratorError>>;

    fn query<'a>(
        &'a self,
        table: &'a str,
        query: &'a RecordQuery,
    ) -> BoxFuture<'a, Result<Vec<Value>, CollaboratorError>>;
}
