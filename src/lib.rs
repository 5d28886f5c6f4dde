//! # labelsync
//!
//! Declarative GitHub label synchronization across one or many repositories
//!
//! ## Features
//! - Case-insensitive reconciliation of a label file against a repository
//! - Append and replace modes, dry-run previews
//! - Batch runs over explicit lists, organizations or users
//! - GitHub REST API and `gh` CLI providers

pub mod batch;
pub mod config;
pub mod error;
pub mod gh_cli;
pub mod github;
pub mod observer;
pub mod provider;
pub mod report;
pub mod sync;
pub mod target;

#[cfg(test)]
mod testing;

pub use batch::{BatchStatus, BatchSyncResult, BatchSyncer};
pub use config::{parse_repository, BatchConfig, LabelSpec};
pub use error::{Error, Result};
pub use gh_cli::GhCli;
pub use github::{GitHubApi, GitHubClient};
pub use observer::{NoopObserver, SyncObserver, TracingObserver};
pub use provider::{LabelProvider, ProviderFactory, RemoteLabel};
pub use report::{summarize, BatchSummary};
pub use sync::{LabelSyncer, SyncMode, SyncOptions, SyncResult};
pub use target::{BatchOptions, RepositoryFilter, Visibility};

/// Synchronize one repository through the GitHub API
///
/// # Examples
///
/// ```rust,no_run
/// use labelsync::{LabelSpec, SyncMode, SyncOptions};
///
/// #[tokio::main]
/// async fn main() -> labelsync::Result<()> {
///     let labels = vec![
///         LabelSpec::new("bug", "d73a4a", "Something isn't working"),
///         LabelSpec::new("enhancement", "a2eeef", "New feature or request"),
///     ];
///     let options = SyncOptions {
///         mode: SyncMode::Replace,
///         dry_run: true,
///     };
///
///     let result =
///         labelsync::sync_repository_labels("your_github_token", "owner/repo", &labels, options)
///             .await?;
///
///     println!("Would create {} labels", result.created.len());
///     Ok(())
/// }
/// ```
pub async fn sync_repository_labels(
    access_token: &str,
    repository: &str,
    labels: &[LabelSpec],
    options: SyncOptions,
) -> Result<SyncResult> {
    let (owner, repo) = parse_repository(repository)?;
    let api = GitHubApi::new(access_token).await?;

    LabelSyncer::new(api.client(&owner, &repo), options)
        .with_repository(repository)
        .sync_labels(labels)
        .await
}
