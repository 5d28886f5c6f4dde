//! Sync Observers
//!
//! Progress and logging side channel. The engine and orchestrator notify an
//! injected observer instead of writing output themselves.

use crate::batch::BatchStatus;

/// Kind of mutating label operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Create => write!(f, "create"),
            OperationKind::Update => write!(f, "update"),
            OperationKind::Delete => write!(f, "delete"),
        }
    }
}

/// Event emitted while reconciling one repository
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Remote labels were fetched
    RemoteFetched { count: usize },

    /// Operations were classified
    Planned {
        create: usize,
        update: usize,
        delete: usize,
        unchanged: usize,
    },

    /// An operation succeeded (or was recorded without a call in dry-run mode)
    Applied {
        kind: OperationKind,
        name: String,
        dry_run: bool,
    },

    /// An operation failed
    Failed {
        kind: OperationKind,
        name: String,
        error: String,
    },
}

/// Event emitted by the batch orchestrator
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    /// More than one target scope was set; only `used` applies
    ScopesAmbiguous { used: String },

    /// Target repositories were resolved
    TargetsResolved { count: usize },

    /// One repository finished
    RepositoryCompleted {
        index: usize,
        total: usize,
        repository: String,
        status: BatchStatus,
        error: Option<String>,
    },
}

/// Receives sync and batch events
///
/// Both methods default to doing nothing.
pub trait SyncObserver: Send + Sync {
    fn on_sync_event(&self, _repository: &str, _event: &SyncEvent) {}

    fn on_batch_event(&self, _event: &BatchEvent) {}
}

/// Observer that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl SyncObserver for NoopObserver {}

/// Observer that forwards events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl SyncObserver for TracingObserver {
    fn on_sync_event(&self, repository: &str, event: &SyncEvent) {
        match event {
            SyncEvent::RemoteFetched { count } => {
                tracing::debug!(repository, count, "fetched remote labels");
            }
            SyncEvent::Planned {
                create,
                update,
                delete,
                unchanged,
            } => {
                tracing::debug!(
                    repository,
                    create,
                    update,
                    delete,
                    unchanged,
                    "planned label operations"
                );
            }
            SyncEvent::Applied {
                kind,
                name,
                dry_run,
            } => {
                tracing::info!(repository, %kind, label = %name, dry_run, "label operation applied");
            }
            SyncEvent::Failed { kind, name, error } => {
                tracing::warn!(repository, %kind, label = %name, %error, "label operation failed");
            }
        }
    }

    fn on_batch_event(&self, event: &BatchEvent) {
        match event {
            BatchEvent::ScopesAmbiguous { used } => {
                tracing::warn!(used = %used, "several target scopes given; using the first of repositories, organization, user");
            }
            BatchEvent::TargetsResolved { count } => {
                tracing::info!(count, "resolved target repositories");
            }
            BatchEvent::RepositoryCompleted {
                index,
                total,
                repository,
                status,
                error,
            } => match error {
                Some(error) => {
                    tracing::warn!(index, total, repository = %repository, %status, %error, "repository sync failed")
                }
                None => tracing::info!(index, total, repository = %repository, %status, "repository sync finished"),
            },
        }
    }
}
