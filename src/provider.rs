//! Remote Label Provider
//!
//! Capability interface the reconciliation engine and batch orchestrator
//! depend on. Backed by either the GitHub REST API or the `gh` CLI.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LabelSpec;
use crate::error::{Error, Result};

/// Default timeout applied to every provider call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Label as it currently exists on the remote repository
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteLabel {
    /// Label name
    pub name: String,

    /// Label color (6-digit hexadecimal, without #)
    pub color: String,

    /// Label description (empty when unset)
    #[serde(default)]
    pub description: String,
}

impl RemoteLabel {
    /// Create a remote label
    pub fn new(
        name: impl Into<String>,
        color: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
            description: description.into(),
        }
    }
}

impl From<&LabelSpec> for RemoteLabel {
    fn from(spec: &LabelSpec) -> Self {
        Self::new(&spec.name, &spec.color, &spec.description)
    }
}

impl From<RemoteLabel> for LabelSpec {
    fn from(label: RemoteLabel) -> Self {
        LabelSpec::new(label.name, label.color, label.description)
    }
}

/// Scope a repository listing is performed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryScope {
    Organization,
    User,
}

impl std::fmt::Display for RepositoryScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepositoryScope::Organization => write!(f, "organization"),
            RepositoryScope::User => write!(f, "user"),
        }
    }
}

/// Repository entry returned by a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryInfo {
    /// `owner/repo` identifier
    pub identifier: String,

    /// Visibility, always lowercase (`public`, `private`, `internal`).
    /// Providers normalize whatever casing the remote reports.
    pub visibility: String,

    /// Primary language, if the remote reports one
    pub language: Option<String>,

    /// Whether the repository is archived
    pub archived: bool,
}

/// Label operations on a single repository
#[async_trait]
pub trait LabelProvider: Send + Sync {
    /// Fetch every label of the repository
    async fn fetch_labels(&self) -> Result<Vec<RemoteLabel>>;

    /// Create a label; fails if it already exists
    async fn create_label(&self, label: &LabelSpec) -> Result<RemoteLabel>;

    /// Update the label currently named `current_name` to match `label`
    async fn update_label(&self, current_name: &str, label: &LabelSpec) -> Result<RemoteLabel>;

    /// Delete a label; fails if it does not exist
    async fn delete_label(&self, name: &str) -> Result<()>;

    /// Whether a label with this name exists
    async fn label_exists(&self, name: &str) -> Result<bool>;
}

/// Hands out one [`LabelProvider`] per repository and lists repositories
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    type Provider: LabelProvider;

    /// Bind a provider to `owner/repo`
    async fn connect(&self, owner: &str, repo: &str) -> Result<Self::Provider>;

    /// List repositories of an organization or user
    async fn list_repositories(
        &self,
        scope: RepositoryScope,
        name: &str,
    ) -> Result<Vec<RepositoryInfo>>;
}

/// Run a provider call with a deadline
pub(crate) async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| Error::Timeout(limit))?
}
