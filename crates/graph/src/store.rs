//! Graph store boundary.
//!
//! The [`GraphStore`] trait is the only way the persistence adapter and the
//! detection engine reach the graph. Drivers for real graph databases implement
//! it; [`MemoryGraphStore`](crate::memory::MemoryGraphStore) is the in-process
//! reference implementation.

use std::future::Future;

use graphwarden_core::error::StorageError;
use graphwarden_core::event::{Alert, MergeOutcome, RuleQuery};

use crate::model::{AlertFilter, GraphStats, Node, QueryRow, WriteSet};

/// Trait abstracting graph database operations.
///
/// The trait is `Send + Sync + 'static`, allowing one store to be shared by
/// direct ingestion, queue workers and the detection engine.
///
/// # Connection Management
///
/// Every operation acquires a scoped connection from the store's pool and
/// releases it on every exit path. Acquisition timeout is
/// [`StorageError::PoolTimeout`].
pub trait GraphStore: Send + Sync + 'static {
    /// Merges an event, its entities and relationships in one transaction.
    ///
    /// Nodes are upserted by identity key and relationships by
    /// `(from, type, to)`. The event's relationship set is replaced by the one
    /// in `writes`. The returned outcome is `Unchanged` only when the Event
    /// node, its entities and its relationships were already stored as given.
    ///
    /// # Errors
    ///
    /// - `StorageError::Transaction`: the transaction aborted and nothing was written
    /// - `StorageError::PoolTimeout`: no connection became available in time
    fn merge(
        &self,
        writes: WriteSet,
    ) -> impl Future<Output = Result<MergeOutcome, StorageError>> + Send;

    /// Looks up an Event node by identity key.
    fn get_event(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<Node>, StorageError>> + Send;

    /// Executes a read-only rule query.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Query` for an unsupported language or
    /// query text the driver cannot interpret.
    fn query(
        &self,
        query: &RuleQuery,
    ) -> impl Future<Output = Result<Vec<QueryRow>, StorageError>> + Send;

    /// Appends a batch of alerts atomically: either every alert is stored or
    /// none is. Alerts are never updated.
    fn append_alerts(
        &self,
        alerts: Vec<Alert>,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Lists alerts newest first.
    fn list_alerts(
        &self,
        filter: &AlertFilter,
    ) -> impl Future<Output = Result<Vec<Alert>, StorageError>> + Send;

    /// Returns node, relationship and alert counts.
    fn stats(&self) -> impl Future<Output = Result<GraphStats, StorageError>> + Send;
}
