//! GitHub API Client
//!
//! Label provider backed directly by the GitHub REST API through octocrab

use std::time::Duration;

use async_trait::async_trait;
use octocrab::Octocrab;
use serde::{Deserialize, Serialize};

use crate::config::LabelSpec;
use crate::error::{Error, Result};
use crate::provider::{
    with_timeout, LabelProvider, ProviderFactory, RemoteLabel, RepositoryInfo, RepositoryScope,
    DEFAULT_CALL_TIMEOUT,
};

const PER_PAGE: u8 = 100;

/// Encode a string for use in URL path segments (RFC 3986 with UTF-8 support)
///
/// Only unreserved characters (A-Z, a-z, 0-9, -, ., _, ~) are left unencoded.
fn encode_path_segment(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '.' | '_' | '~' => c.to_string(),
            _ => c
                .to_string()
                .bytes()
                .map(|b| format!("%{:02X}", b))
                .collect::<String>(),
        })
        .collect()
}

/// Check if an octocrab error is a 404 Not Found
fn is_not_found_error(err: &octocrab::Error) -> bool {
    err.to_string().contains("Not Found")
}

fn remote_label(label: octocrab::models::Label) -> RemoteLabel {
    RemoteLabel {
        name: label.name,
        color: label.color,
        description: label.description.unwrap_or_default(),
    }
}

/// Repository fields used from the listing endpoints
#[derive(Debug, Deserialize)]
struct ApiRepository {
    full_name: String,
    #[serde(default)]
    visibility: Option<String>,
    #[serde(default)]
    private: bool,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    archived: bool,
}

impl From<ApiRepository> for RepositoryInfo {
    fn from(repo: ApiRepository) -> Self {
        let visibility = repo
            .visibility
            .map(|v| v.to_lowercase())
            .unwrap_or_else(|| if repo.private { "private" } else { "public" }.to_string());

        RepositoryInfo {
            identifier: repo.full_name,
            visibility,
            language: repo.language,
            archived: repo.archived,
        }
    }
}

#[derive(Serialize)]
struct PageParams {
    per_page: u8,
    page: u32,
}

/// GitHub API provider factory
///
/// Holds one authenticated octocrab client shared by every repository
#[derive(Clone)]
pub struct GitHubApi {
    octocrab: Octocrab,
    timeout: Duration,
}

impl GitHubApi {
    /// Create a new GitHub API factory
    ///
    /// # Arguments
    /// - `access_token`: GitHub access token
    ///
    /// # Errors
    /// Returns an error if client initialization or authentication fails
    pub async fn new(access_token: &str) -> Result<Self> {
        let octocrab = Octocrab::builder()
            .personal_token(access_token.to_string())
            .build()?;

        // Authentication test
        octocrab
            .current()
            .user()
            .await
            .map_err(|_| Error::AuthenticationFailed)?;

        Ok(Self {
            octocrab,
            timeout: DEFAULT_CALL_TIMEOUT,
        })
    }

    /// Per-call timeout for every client handed out
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Client bound to `owner/repo`
    pub fn client(&self, owner: &str, repo: &str) -> GitHubClient {
        GitHubClient {
            octocrab: self.octocrab.clone(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            timeout: self.timeout,
        }
    }

    async fn list_all_repositories(&self, route: &str) -> Result<Vec<RepositoryInfo>> {
        let mut repositories = Vec::new();
        let mut page = 1u32;

        loop {
            let params = PageParams {
                per_page: PER_PAGE,
                page,
            };
            let items: Vec<ApiRepository> = self.octocrab.get(route, Some(&params)).await?;
            let done = items.len() < PER_PAGE as usize;
            repositories.extend(items.into_iter().map(RepositoryInfo::from));

            if done {
                break;
            }
            page += 1;
        }

        Ok(repositories)
    }
}

#[async_trait]
impl ProviderFactory for GitHubApi {
    type Provider = GitHubClient;

    async fn connect(&self, owner: &str, repo: &str) -> Result<GitHubClient> {
        Ok(self.client(owner, repo))
    }

    async fn list_repositories(
        &self,
        scope: RepositoryScope,
        name: &str,
    ) -> Result<Vec<RepositoryInfo>> {
        let route = match scope {
            RepositoryScope::Organization => format!("/orgs/{}/repos", encode_path_segment(name)),
            RepositoryScope::User => format!("/users/{}/repos", encode_path_segment(name)),
        };
        tracing::debug!(%scope, name, "listing repositories via GitHub API");

        with_timeout(self.timeout, self.list_all_repositories(&route)).await
    }
}

/// GitHub API Client
///
/// Label operations on a single repository
#[derive(Clone)]
pub struct GitHubClient {
    octocrab: Octocrab,
    owner: String,
    repo: String,
    timeout: Duration,
}

impl GitHubClient {
    fn label_route(&self, name: &str) -> String {
        format!(
            "/repos/{}/{}/labels/{}",
            self.owner,
            self.repo,
            encode_path_segment(name)
        )
    }

    async fn get_all_labels(&self) -> Result<Vec<RemoteLabel>> {
        let mut labels = Vec::new();
        let mut page = 1u32;

        loop {
            let response = self
                .octocrab
                .issues(&self.owner, &self.repo)
                .list_labels_for_repo()
                .page(page)
                .per_page(PER_PAGE)
                .send()
                .await
                .map_err(|e| {
                    if is_not_found_error(&e) {
                        Error::RepositoryNotFound(format!("{}/{}", self.owner, self.repo))
                    } else {
                        Error::GitHubApi(e)
                    }
                })?;

            let done = response.items.len() < PER_PAGE as usize;
            labels.extend(response.items.into_iter().map(remote_label));

            if done {
                break;
            }
            page += 1;
        }

        Ok(labels)
    }
}

#[async_trait]
impl LabelProvider for GitHubClient {
    async fn fetch_labels(&self) -> Result<Vec<RemoteLabel>> {
        tracing::debug!(owner = %self.owner, repo = %self.repo, "fetching labels via GitHub API");
        with_timeout(self.timeout, self.get_all_labels()).await
    }

    async fn create_label(&self, label: &LabelSpec) -> Result<RemoteLabel> {
        let call = async {
            let created = self
                .octocrab
                .issues(&self.owner, &self.repo)
                .create_label(&label.name, &label.color, &label.description)
                .await?;
            Ok::<_, Error>(remote_label(created))
        };
        with_timeout(self.timeout, call).await
    }

    async fn update_label(&self, current_name: &str, label: &LabelSpec) -> Result<RemoteLabel> {
        let body = serde_json::json!({
            "new_name": label.name,
            "color": label.color,
            "description": label.description,
        });
        let route = self.label_route(current_name);

        let call = async {
            let updated: octocrab::models::Label =
                self.octocrab.patch(route, Some(&body)).await?;
            Ok::<_, Error>(remote_label(updated))
        };
        with_timeout(self.timeout, call).await
    }

    async fn delete_label(&self, name: &str) -> Result<()> {
        let encoded_name = encode_path_segment(name);
        let call = async {
            self.octocrab
                .issues(&self.owner, &self.repo)
                .delete_label(&encoded_name)
                .await?;
            Ok::<_, Error>(())
        };
        with_timeout(self.timeout, call).await
    }

    async fn label_exists(&self, name: &str) -> Result<bool> {
        let route = self.label_route(name);
        let call = async {
            match self
                .octocrab
                .get::<octocrab::models::Label, _, ()>(route, None)
                .await
            {
                Ok(_) => Ok(true),
                Err(e) if is_not_found_error(&e) => Ok(false),
                Err(e) => Err(Error::GitHubApi(e)),
            }
        };
        with_timeout(self.timeout, call).await
    }
}
