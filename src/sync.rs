//! Label Synchronization Functionality
//!
//! Reconciliation engine: classifies local label specs against the remote
//! label set and applies the resulting create/update/delete operations

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::config::{normalize_color, LabelSpec};
use crate::error::{Error, Result};
use crate::observer::{NoopObserver, OperationKind, SyncEvent, SyncObserver};
use crate::provider::{LabelProvider, RemoteLabel};

/// Number of mutating calls issued concurrently within one phase
pub const LABEL_BATCH_SIZE: usize = 5;

/// Reconciliation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Only create and update labels
    #[default]
    Append,

    /// Also delete remote labels absent from the local spec
    Replace,
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMode::Append => write!(f, "append"),
            SyncMode::Replace => write!(f, "replace"),
        }
    }
}

impl std::str::FromStr for SyncMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "append" => Ok(SyncMode::Append),
            "replace" => Ok(SyncMode::Replace),
            other => Err(Error::config_validation(format!(
                "Unknown sync mode '{other}' (expected append or replace)"
            ))),
        }
    }
}

/// Types of label synchronization operations
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOperation {
    /// Create a label
    Create { label: LabelSpec },

    /// Update a label
    Update {
        current_name: String,
        new_label: LabelSpec,
        changes: Vec<String>,
    },

    /// Delete a label
    Delete { name: String },

    /// No change
    NoChange { label: LabelSpec },
}

impl SyncOperation {
    /// Name the operation is reported under
    pub fn name(&self) -> &str {
        match self {
            SyncOperation::Create { label } | SyncOperation::NoChange { label } => &label.name,
            SyncOperation::Update { new_label, .. } => &new_label.name,
            SyncOperation::Delete { name } => name,
        }
    }

    /// Mutating kind, `None` for `NoChange`
    pub fn kind(&self) -> Option<OperationKind> {
        match self {
            SyncOperation::Create { .. } => Some(OperationKind::Create),
            SyncOperation::Update { .. } => Some(OperationKind::Update),
            SyncOperation::Delete { .. } => Some(OperationKind::Delete),
            SyncOperation::NoChange { .. } => None,
        }
    }
}

/// Label operation that failed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LabelFailure {
    /// Label name
    pub name: String,

    /// Error message
    pub error: String,
}

/// Synchronization result
///
/// Every local label ends up in exactly one of `created`, `updated`,
/// `unchanged` or `errors`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SyncResult {
    /// Labels created
    pub created: Vec<LabelSpec>,

    /// Labels updated
    pub updated: Vec<LabelSpec>,

    /// Names of remote labels deleted
    pub deleted: Vec<String>,

    /// Labels already matching the remote
    pub unchanged: Vec<LabelSpec>,

    /// Operations that failed
    pub errors: Vec<LabelFailure>,

    /// Whether this is a dry run
    pub dry_run: bool,
}

impl SyncResult {
    /// Create a new empty synchronization result
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Default::default()
        }
    }

    /// Whether changes were made (or would be, in dry-run mode)
    pub fn has_changes(&self) -> bool {
        self.change_count() > 0
    }

    /// Whether any operation failed
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Number of successful create/update/delete operations
    pub fn change_count(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }

    fn record(&mut self, operation: SyncOperation) {
        match operation {
            SyncOperation::Create { label } => self.created.push(label),
            SyncOperation::Update { new_label, .. } => self.updated.push(new_label),
            SyncOperation::Delete { name } => self.deleted.push(name),
            SyncOperation::NoChange { label } => self.unchanged.push(label),
        }
    }
}

/// Options for a single reconciliation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Reconciliation mode
    pub mode: SyncMode,

    /// Classify only, never call mutating provider operations
    pub dry_run: bool,
}

/// Plan synchronization operations
///
/// Matching is by case-insensitive name. Only color (case-insensitive) and
/// description (exact) are compared.
///
/// # Arguments
/// - `local`: Desired labels, in input order
/// - `remote`: Current remote labels, in fetch order
/// - `mode`: Whether unmatched remote labels are deleted
///
/// # Returns
/// One operation per local label in input order, followed by deletions in
/// remote order
pub fn plan_sync_operations(
    local: &[LabelSpec],
    remote: &[RemoteLabel],
    mode: SyncMode,
) -> Vec<SyncOperation> {
    let mut remote_by_name: BTreeMap<String, &RemoteLabel> = BTreeMap::new();
    for label in remote {
        remote_by_name.entry(label.name.to_lowercase()).or_insert(label);
    }

    let mut operations: Vec<SyncOperation> = local
        .iter()
        .map(|label| match remote_by_name.get(&label.name.to_lowercase()) {
            Some(current) => check_label_changes(current, label),
            None => SyncOperation::Create {
                label: label.clone(),
            },
        })
        .collect();

    if mode == SyncMode::Replace {
        let local_by_name: BTreeMap<String, &LabelSpec> = local
            .iter()
            .map(|label| (label.name.to_lowercase(), label))
            .collect();

        operations.extend(
            remote
                .iter()
                .filter(|label| !local_by_name.contains_key(&label.name.to_lowercase()))
                .map(|label| SyncOperation::Delete {
                    name: label.name.clone(),
                }),
        );
    }

    operations
}

/// Check label changes
///
/// # Arguments
/// - `current`: Current remote label
/// - `target`: Desired label
///
/// # Returns
/// `Update` targeting the remote label's original name, or `NoChange`
fn check_label_changes(current: &RemoteLabel, target: &LabelSpec) -> SyncOperation {
    let mut changes = Vec::new();

    if normalize_color(&current.color) != normalize_color(&target.color) {
        changes.push(format!("color: {} -> {}", current.color, target.color));
    }

    if current.description != target.description {
        let describe = |d: &str| if d.is_empty() { "(none)".to_string() } else { d.to_string() };
        changes.push(format!(
            "description: {} -> {}",
            describe(&current.description),
            describe(&target.description)
        ));
    }

    if changes.is_empty() {
        SyncOperation::NoChange {
            label: target.clone(),
        }
    } else {
        SyncOperation::Update {
            current_name: current.name.clone(),
            new_label: target.clone(),
            changes,
        }
    }
}

/// Label Synchronization Engine
///
/// Reconciles one repository, reached through a [`LabelProvider`], with a
/// local label spec
pub struct LabelSyncer<P> {
    provider: P,
    options: SyncOptions,
    repository: String,
    observer: Arc<dyn SyncObserver>,
}

impl<P: LabelProvider> LabelSyncer<P> {
    /// Create a new label synchronization engine
    pub fn new(provider: P, options: SyncOptions) -> Self {
        Self {
            provider,
            options,
            repository: String::new(),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Repository name attached to observer events
    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = repository.into();
        self
    }

    /// Observer notified of each classified and executed operation
    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Provider this engine is bound to
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Synchronize labels
    ///
    /// Operation failures are recorded in the result and never abort the run.
    ///
    /// # Errors
    /// Returns an error only if the remote labels cannot be fetched
    pub async fn sync_labels(&self, labels: &[LabelSpec]) -> Result<SyncResult> {
        self.run(labels, self.options.dry_run).await
    }

    /// Preview synchronization results without mutating the remote
    ///
    /// # Errors
    /// Returns an error only if the remote labels cannot be fetched
    pub async fn preview_sync(&self, labels: &[LabelSpec]) -> Result<SyncResult> {
        self.run(labels, true).await
    }

    async fn run(&self, labels: &[LabelSpec], dry_run: bool) -> Result<SyncResult> {
        let remote = self.provider.fetch_labels().await?;
        self.notify(SyncEvent::RemoteFetched {
            count: remote.len(),
        });

        let mut result = SyncResult::new(dry_run);
        let mut creates = Vec::new();
        let mut updates = Vec::new();
        let mut deletes = Vec::new();

        for operation in plan_sync_operations(labels, &remote, self.options.mode) {
            match operation.kind() {
                Some(OperationKind::Create) => creates.push(operation),
                Some(OperationKind::Update) => updates.push(operation),
                Some(OperationKind::Delete) => deletes.push(operation),
                None => result.record(operation),
            }
        }

        self.notify(SyncEvent::Planned {
            create: creates.len(),
            update: updates.len(),
            delete: deletes.len(),
            unchanged: result.unchanged.len(),
        });

        // Phases never interleave; each group settles before the next starts
        for phase in [creates, updates, deletes] {
            for group in phase.chunks(LABEL_BATCH_SIZE) {
                let outcomes =
                    join_all(group.iter().map(|op| self.execute_operation(op, dry_run))).await;

                for (operation, outcome) in group.iter().zip(outcomes) {
                    self.settle(&mut result, operation.clone(), outcome, dry_run);
                }
            }
        }

        Ok(result)
    }

    /// Execute an operation
    ///
    /// # Errors
    /// Returns an error if the provider call fails
    async fn execute_operation(&self, operation: &SyncOperation, dry_run: bool) -> Result<()> {
        if dry_run {
            return Ok(());
        }

        match operation {
            SyncOperation::Create { label } => {
                self.provider.create_label(label).await?;
            }
            SyncOperation::Update {
                current_name,
                new_label,
                ..
            } => {
                self.provider.update_label(current_name, new_label).await?;
            }
            SyncOperation::Delete { name } => {
                self.provider.delete_label(name).await?;
            }
            SyncOperation::NoChange { .. } => {}
        }

        Ok(())
    }

    fn settle(
        &self,
        result: &mut SyncResult,
        operation: SyncOperation,
        outcome: Result<()>,
        dry_run: bool,
    ) {
        let Some(kind) = operation.kind() else {
            result.record(operation);
            return;
        };
        let name = operation.name().to_string();

        match outcome {
            Ok(()) => {
                result.record(operation);
                self.notify(SyncEvent::Applied {
                    kind,
                    name,
                    dry_run,
                });
            }
            Err(e) => {
                let error = e.to_string();
                result.errors.push(LabelFailure {
                    name: name.clone(),
                    error: error.clone(),
                });
                self.notify(SyncEvent::Failed { kind, name, error });
            }
        }
    }

    fn notify(&self, event: SyncEvent) {
        self.observer.on_sync_event(&self.repository, &event);
    }
}
