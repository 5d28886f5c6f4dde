//! GitHub CLI Client
//!
//! Label provider that drives the `gh` command line tool as a subprocess.
//! Authentication is whatever `gh` is logged in with (or `GH_TOKEN`).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::config::LabelSpec;
use crate::error::{Error, Result};
use crate::provider::{
    with_timeout, LabelProvider, ProviderFactory, RemoteLabel, RepositoryInfo, RepositoryScope,
    DEFAULT_CALL_TIMEOUT,
};

/// Upper bound passed to `gh ... --limit`
const LIST_LIMIT: &str = "1000";

/// Run `gh` with the given arguments and return its stdout
///
/// # Errors
/// - `Io` if the program cannot be started
/// - `CommandFailed` on a non-zero exit status
/// - `Timeout` if the call exceeds `timeout`
async fn run_gh(program: &str, args: &[String], timeout: Duration) -> Result<String> {
    tracing::debug!(program, args = ?args, "running gh");

    let call = async {
        let output = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(Error::CommandFailed {
                command: format!("{} {}", program, args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    };

    with_timeout(timeout, call).await
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

fn list_labels_args(repository: &str) -> Vec<String> {
    strings(&[
        "label",
        "list",
        "--repo",
        repository,
        "--json",
        "name,color,description",
        "--limit",
        LIST_LIMIT,
    ])
}

fn create_label_args(repository: &str, label: &LabelSpec) -> Vec<String> {
    strings(&[
        "label",
        "create",
        &label.name,
        "--repo",
        repository,
        "--color",
        &label.color,
        "--description",
        &label.description,
    ])
}

fn edit_label_args(repository: &str, current_name: &str, label: &LabelSpec) -> Vec<String> {
    strings(&[
        "label",
        "edit",
        current_name,
        "--repo",
        repository,
        "--name",
        &label.name,
        "--color",
        &label.color,
        "--description",
        &label.description,
    ])
}

fn delete_label_args(repository: &str, name: &str) -> Vec<String> {
    strings(&["label", "delete", name, "--repo", repository, "--yes"])
}

fn list_repositories_args(owner: &str) -> Vec<String> {
    strings(&[
        "repo",
        "list",
        owner,
        "--json",
        "nameWithOwner,visibility,isArchived,primaryLanguage",
        "--limit",
        LIST_LIMIT,
    ])
}

/// Parse `gh label list --json name,color,description` output
fn parse_label_list(output: &str) -> Result<Vec<RemoteLabel>> {
    Ok(serde_json::from_str(output)?)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GhRepository {
    name_with_owner: String,
    #[serde(default)]
    visibility: Option<String>,
    #[serde(default)]
    is_archived: bool,
    #[serde(default)]
    primary_language: Option<GhLanguage>,
}

#[derive(Debug, Deserialize)]
struct GhLanguage {
    name: String,
}

/// Parse `gh repo list --json nameWithOwner,visibility,isArchived,primaryLanguage` output
fn parse_repository_list(output: &str) -> Result<Vec<RepositoryInfo>> {
    let repos: Vec<GhRepository> = serde_json::from_str(output)?;

    Ok(repos
        .into_iter()
        .map(|repo| RepositoryInfo {
            identifier: repo.name_with_owner,
            visibility: repo.visibility.unwrap_or_default().to_lowercase(),
            language: repo
                .primary_language
                .map(|l| l.name)
                .filter(|name| !name.is_empty()),
            archived: repo.is_archived,
        })
        .collect())
}

/// `gh` CLI provider factory
#[derive(Debug, Clone)]
pub struct GhCli {
    program: String,
    timeout: Duration,
}

impl Default for GhCli {
    fn default() -> Self {
        Self {
            program: "gh".to_string(),
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl GhCli {
    /// Create a factory running `gh` from `PATH`
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different executable
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Per-call timeout for every subprocess
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Client bound to `owner/repo`
    pub fn client(&self, owner: &str, repo: &str) -> GhCliClient {
        GhCliClient {
            program: self.program.clone(),
            repository: format!("{owner}/{repo}"),
            timeout: self.timeout,
        }
    }
}

#[async_trait]
impl ProviderFactory for GhCli {
    type Provider = GhCliClient;

    async fn connect(&self, owner: &str, repo: &str) -> Result<GhCliClient> {
        Ok(self.client(owner, repo))
    }

    /// `gh repo list` treats organizations and users alike
    async fn list_repositories(
        &self,
        _scope: RepositoryScope,
        name: &str,
    ) -> Result<Vec<RepositoryInfo>> {
        let output = run_gh(&self.program, &list_repositories_args(name), self.timeout).await?;
        parse_repository_list(&output)
    }
}

/// `gh` CLI client for a single repository
#[derive(Debug, Clone)]
pub struct GhCliClient {
    program: String,
    repository: String,
    timeout: Duration,
}

impl GhCliClient {
    async fn run(&self, args: Vec<String>) -> Result<String> {
        run_gh(&self.program, &args, self.timeout).await
    }
}

#[async_trait]
impl LabelProvider for GhCliClient {
    async fn fetch_labels(&self) -> Result<Vec<RemoteLabel>> {
        let output = self.run(list_labels_args(&self.repository)).await?;
        parse_label_list(&output)
    }

    async fn create_label(&self, label: &LabelSpec) -> Result<RemoteLabel> {
        self.run(create_label_args(&self.repository, label)).await?;
        Ok(RemoteLabel::from(label))
    }

    async fn update_label(&self, current_name: &str, label: &LabelSpec) -> Result<RemoteLabel> {
        self.run(edit_label_args(&self.repository, current_name, label))
            .await?;
        Ok(RemoteLabel::from(label))
    }

    async fn delete_label(&self, name: &str) -> Result<()> {
        self.run(delete_label_args(&self.repository, name)).await?;
        Ok(())
    }

    async fn label_exists(&self, name: &str) -> Result<bool> {
        let name = name.to_lowercase();
        Ok(self
            .fetch_labels()
            .await?
            .iter()
            .any(|label| label.name.to_lowercase() == name))
    }
}
