//! Batch Synchronization
//!
//! Fans the reconciliation engine out across many repositories in chunks of
//! bounded size, isolating each repository's failure

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use crate::config::{parse_repository, LabelSpec};
use crate::error::Result;
use crate::observer::{BatchEvent, NoopObserver, SyncObserver};
use crate::provider::ProviderFactory;
use crate::sync::{LabelSyncer, SyncResult};
use crate::target::{resolve_targets, BatchOptions};

/// Outcome status of one repository in a batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Success,
    Failed,
    Skipped,
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchStatus::Success => write!(f, "success"),
            BatchStatus::Failed => write!(f, "failed"),
            BatchStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Result for one repository of a batch run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchSyncResult {
    /// `owner/repo` identifier as given or listed
    pub repository: String,

    pub status: BatchStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<SyncResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchSyncResult {
    fn success(repository: &str, result: SyncResult) -> Self {
        Self {
            repository: repository.to_string(),
            status: BatchStatus::Success,
            result: Some(result),
            error: None,
        }
    }

    fn failed(repository: &str, error: impl Into<String>) -> Self {
        Self {
            repository: repository.to_string(),
            status: BatchStatus::Failed,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Batch Synchronization Engine
///
/// Runs one [`LabelSyncer`] per target repository, `parallel` at a time
pub struct BatchSyncer<F> {
    factory: F,
    observer: Arc<dyn SyncObserver>,
}

impl<F: ProviderFactory> BatchSyncer<F> {
    /// Create a new batch engine over a provider factory
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Observer shared by every per-repository sync
    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Provider factory in use
    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Synchronize labels across every resolved repository
    ///
    /// Chunk N+1 starts only after every repository of chunk N settled.
    /// Results are in target order.
    ///
    /// # Errors
    /// Returns an error only if no targets can be resolved at all
    pub async fn sync_multiple(
        &self,
        labels: &[LabelSpec],
        options: &BatchOptions,
    ) -> Result<Vec<BatchSyncResult>> {
        let repositories = resolve_targets(&self.factory, options, &*self.observer).await?;
        let total = repositories.len();
        self.observer
            .on_batch_event(&BatchEvent::TargetsResolved { count: total });

        let mut results = Vec::with_capacity(total);
        for chunk in repositories.chunks(options.parallelism()) {
            let settled = join_all(chunk.iter().map(|repository| {
                AssertUnwindSafe(self.sync_single_repo(repository, labels, options)).catch_unwind()
            }))
            .await;

            for (repository, outcome) in chunk.iter().zip(settled) {
                let result = outcome.unwrap_or_else(|panic| {
                    BatchSyncResult::failed(repository, panic_message(&*panic))
                });

                self.observer.on_batch_event(&BatchEvent::RepositoryCompleted {
                    index: results.len() + 1,
                    total,
                    repository: result.repository.clone(),
                    status: result.status,
                    error: result.error.clone(),
                });
                results.push(result);
            }
        }

        Ok(results)
    }

    /// Synchronize a single repository, folding every error into the result
    async fn sync_single_repo(
        &self,
        repository: &str,
        labels: &[LabelSpec],
        options: &BatchOptions,
    ) -> BatchSyncResult {
        match self.try_sync_repo(repository, labels, options).await {
            Ok(result) => BatchSyncResult::success(repository, result),
            Err(e) => BatchSyncResult::failed(repository, e.to_string()),
        }
    }

    async fn try_sync_repo(
        &self,
        repository: &str,
        labels: &[LabelSpec],
        options: &BatchOptions,
    ) -> Result<SyncResult> {
        let (owner, repo) = parse_repository(repository)?;
        let provider = self.factory.connect(&owner, &repo).await?;

        LabelSyncer::new(provider, options.sync_options())
            .with_repository(repository)
            .with_observer(self.observer.clone())
            .sync_labels(labels)
            .await
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("Task panic: {detail}")
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::error::Error;
    use crate::provider::RemoteLabel;
    use crate::sync::SyncMode;
    use crate::testing::{repo_info, MockFactory};
    use crate::target::{RepositoryFilter, Visibility};

    fn labels() -> Vec<LabelSpec> {
        vec![
            LabelSpec::new("bug", "ff0000", "Something isn't working"),
            LabelSpec::new("feature", "00ff00", "New feature"),
        ]
    }

    fn repos(count: usize) -> Vec<String> {
        (1..=count).map(|i| format!("owner/repo-{i}")).collect()
    }

    fn options(repositories: Vec<String>, parallel: usize) -> BatchOptions {
        BatchOptions {
            repositories: Some(repositories),
            parallel,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_bounded_concurrency() {
        let factory = MockFactory::new().with_delay(Duration::from_millis(10));
        let syncer = BatchSyncer::new(factory);

        let results = syncer
            .sync_multiple(&labels(), &options(repos(10), 3))
            .await
            .unwrap();

        assert_eq!(results.len(), 10);
        assert!(results.iter().all(|r| r.status == BatchStatus::Success));
        assert_eq!(syncer.factory().peak_fetches(), 3);
    }

    #[tokio::test]
    async fn test_next_chunk_waits_for_slowest_repository() {
        let factory = MockFactory::new()
            .with_delay(Duration::from_millis(1))
            .with_repo_delay("owner/repo-1", Duration::from_millis(100));
        let syncer = BatchSyncer::new(factory);

        let results = syncer
            .sync_multiple(&labels(), &options(repos(6), 3))
            .await
            .unwrap();
        assert!(results.iter().all(|r| r.status == BatchStatus::Success));

        let factory = syncer.factory();
        let slow_done = factory.provider("owner/repo-1").unwrap().finished_at().unwrap();
        for repository in ["owner/repo-4", "owner/repo-5", "owner/repo-6"] {
            assert!(factory.connected_at(repository).unwrap() >= slow_done);
        }

        // Chunk siblings are not held back by the slow repository
        let sibling_done = factory.provider("owner/repo-2").unwrap().finished_at().unwrap();
        assert!(sibling_done < slow_done);
    }

    #[tokio::test]
    async fn test_failure_isolation() {
        let factory = MockFactory::new()
            .with_delay(Duration::from_millis(1))
            .failing("owner/repo-4");
        let syncer = BatchSyncer::new(factory);

        let results = syncer
            .sync_multiple(&labels(), &options(repos(10), 3))
            .await
            .unwrap();

        assert_eq!(results.len(), 10);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.repository, format!("owner/repo-{}", i + 1));
            if i == 3 {
                assert_eq!(result.status, BatchStatus::Failed);
                assert!(result.result.is_none());
                assert!(result.error.as_deref().unwrap().contains("injected fetch failure"));
            } else {
                assert_eq!(result.status, BatchStatus::Success);
                assert_eq!(result.result.as_ref().unwrap().created.len(), 2);
            }
        }
    }

    #[tokio::test]
    async fn test_malformed_repository_fails_alone() {
        let syncer = BatchSyncer::new(MockFactory::new());
        let targets = vec![
            "owner/good".to_string(),
            "not-a-repo".to_string(),
            "owner/other".to_string(),
        ];

        let results = syncer
            .sync_multiple(&labels(), &options(targets, 2))
            .await
            .unwrap();

        let statuses: Vec<_> = results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            [BatchStatus::Success, BatchStatus::Failed, BatchStatus::Success]
        );
        assert!(results[1]
            .error
            .as_deref()
            .unwrap()
            .contains("Invalid repository format"));
    }

    #[tokio::test]
    async fn test_panicking_repository_is_recorded_as_failed() {
        let factory = MockFactory::new().panicking("owner/repo-2");
        let syncer = BatchSyncer::new(factory);

        let results = syncer
            .sync_multiple(&labels(), &options(repos(3), 3))
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[1].status, BatchStatus::Failed);
        assert!(results[1].error.as_deref().unwrap().contains("simulated crash"));
        assert_eq!(results[2].status, BatchStatus::Success);
    }

    #[tokio::test]
    async fn test_no_target_fails_whole_batch() {
        let syncer = BatchSyncer::new(MockFactory::new());
        let result = syncer
            .sync_multiple(&labels(), &BatchOptions::default())
            .await;
        assert!(matches!(result, Err(Error::NoTarget)));
    }

    #[tokio::test]
    async fn test_mode_and_dry_run_reach_each_repository() {
        let factory = MockFactory::new()
            .with_labels("owner/a", vec![RemoteLabel::new("stale", "cccccc", "")])
            .with_labels("owner/b", vec![RemoteLabel::new("stale", "cccccc", "")]);
        let syncer = BatchSyncer::new(factory);

        let dry = BatchOptions {
            mode: SyncMode::Replace,
            dry_run: true,
            ..options(vec!["owner/a".to_string(), "owner/b".to_string()], 0)
        };
        let results = syncer.sync_multiple(&labels(), &dry).await.unwrap();

        for result in &results {
            let sync = result.result.as_ref().unwrap();
            assert!(sync.dry_run);
            assert_eq!(sync.deleted, vec!["stale".to_string()]);
            let provider = syncer.factory().provider(&result.repository).unwrap();
            assert!(provider.mutation_calls().is_empty());
        }
    }

    #[tokio::test]
    async fn test_organization_targets_with_filter() {
        let factory = MockFactory::new().with_listing(vec![
            repo_info("acme/api", "public", Some("Rust"), false),
            repo_info("acme/secret", "private", Some("Rust"), false),
        ]);
        let syncer = BatchSyncer::new(factory);
        let options = BatchOptions {
            organization: Some("acme".to_string()),
            filter: RepositoryFilter {
                visibility: Some(Visibility::Public),
                ..Default::default()
            },
            ..Default::default()
        };

        let results = syncer.sync_multiple(&labels(), &options).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].repository, "acme/api");
    }

    #[tokio::test]
    async fn test_observer_sees_every_completion() {
        #[derive(Default)]
        struct Recorder(Mutex<Vec<BatchEvent>>);

        impl SyncObserver for Recorder {
            fn on_batch_event(&self, event: &BatchEvent) {
                self.0.lock().unwrap().push(event.clone());
            }
        }

        let recorder = Arc::new(Recorder::default());
        let syncer = BatchSyncer::new(MockFactory::new().failing("owner/repo-2"))
            .with_observer(recorder.clone());
        syncer
            .sync_multiple(&labels(), &options(repos(4), 2))
            .await
            .unwrap();

        let events = recorder.0.lock().unwrap();
        assert_eq!(events[0], BatchEvent::TargetsResolved { count: 4 });
        let indexes: Vec<_> = events[1..]
            .iter()
            .map(|e| match e {
                BatchEvent::RepositoryCompleted { index, total, .. } => (*index, *total),
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(indexes, [(1, 4), (2, 4), (3, 4), (4, 4)]);
        assert!(matches!(
            &events[2],
            BatchEvent::RepositoryCompleted { status: BatchStatus::Failed, error: Some(_), .. }
        ));
    }
}
