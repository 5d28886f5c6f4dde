//! Repository Target Resolution
//!
//! Turns a batch request (explicit list, organization or user) into the
//! ordered list of `owner/repo` identifiers to operate on

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::observer::{BatchEvent, SyncObserver};
use crate::provider::{ProviderFactory, RepositoryInfo, RepositoryScope};
use crate::sync::{SyncMode, SyncOptions};

/// Default number of repositories reconciled concurrently
pub const DEFAULT_PARALLEL: usize = 3;

/// Repository visibility filter value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
    Internal,
    All,
}

impl Visibility {
    /// Whether a listed repository's visibility passes this filter
    ///
    /// Exact comparison; providers report visibility in lowercase.
    pub fn matches(&self, visibility: &str) -> bool {
        match self {
            Visibility::All => true,
            other => other.to_string() == visibility,
        }
    }
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Visibility::Public => write!(f, "public"),
            Visibility::Private => write!(f, "private"),
            Visibility::Internal => write!(f, "internal"),
            Visibility::All => write!(f, "all"),
        }
    }
}

impl std::str::FromStr for Visibility {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            "internal" => Ok(Visibility::Internal),
            "all" => Ok(Visibility::All),
            other => Err(Error::config_validation(format!(
                "Unknown visibility '{other}' (expected public, private, internal or all)"
            ))),
        }
    }
}

/// Filters applied to organization/user listings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
}

impl RepositoryFilter {
    /// Whether a listed repository passes every configured filter
    pub fn matches(&self, repository: &RepositoryInfo) -> bool {
        if let Some(visibility) = &self.visibility {
            if !visibility.matches(&repository.visibility) {
                return false;
            }
        }

        if let Some(language) = &self.language {
            if repository.language.as_deref() != Some(language.as_str()) {
                return false;
            }
        }

        if let Some(archived) = self.archived {
            if repository.archived != archived {
                return false;
            }
        }

        true
    }
}

/// Batch Options
///
/// Target scope plus the options every per-repository sync runs with.
/// Scope precedence: `repositories`, then `organization`, then `user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOptions {
    /// Explicit `owner/repo` list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repositories: Option<Vec<String>>,

    /// Every repository of an organization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,

    /// Every repository of a user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Reconciliation mode
    #[serde(default)]
    pub mode: SyncMode,

    /// Classify only
    #[serde(default)]
    pub dry_run: bool,

    /// Repositories reconciled concurrently (values below 1 are treated as 1)
    #[serde(default = "default_parallel")]
    pub parallel: usize,

    /// Listing filters (ignored for explicit lists)
    #[serde(default)]
    pub filter: RepositoryFilter,
}

fn default_parallel() -> usize {
    DEFAULT_PARALLEL
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            repositories: None,
            organization: None,
            user: None,
            mode: SyncMode::default(),
            dry_run: false,
            parallel: DEFAULT_PARALLEL,
            filter: RepositoryFilter::default(),
        }
    }
}

impl BatchOptions {
    /// Effective chunk size
    pub fn parallelism(&self) -> usize {
        self.parallel.max(1)
    }

    /// Options for each per-repository sync
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            mode: self.mode,
            dry_run: self.dry_run,
        }
    }

    fn explicit_repositories(&self) -> Option<&[String]> {
        self.repositories
            .as_deref()
            .filter(|repositories| !repositories.is_empty())
    }

    fn scope_count(&self) -> usize {
        [
            self.explicit_repositories().is_some(),
            self.organization.is_some(),
            self.user.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }
}

/// Keep only the listed repositories passing `filter`, in listing order
pub fn apply_filter(repositories: Vec<RepositoryInfo>, filter: &RepositoryFilter) -> Vec<String> {
    repositories
        .into_iter()
        .filter(|repository| filter.matches(repository))
        .map(|repository| repository.identifier)
        .collect()
}

/// Resolve the repositories a batch run operates on
///
/// Explicit lists are returned verbatim: no de-duplication and no format
/// check. Malformed entries fail later, per repository.
///
/// `observer` is told when more than one scope was set.
///
/// # Errors
/// - `NoTarget` if no scope is set
/// - Provider errors from the repository listing
pub async fn resolve_targets<F>(
    factory: &F,
    options: &BatchOptions,
    observer: &dyn SyncObserver,
) -> Result<Vec<String>>
where
    F: ProviderFactory + ?Sized,
{
    let ambiguous = options.scope_count() > 1;
    let notify_used = |used: &str| {
        if ambiguous {
            observer.on_batch_event(&BatchEvent::ScopesAmbiguous {
                used: used.to_string(),
            });
        }
    };

    let (scope, name) = if let Some(repositories) = options.explicit_repositories() {
        notify_used("repositories");
        return Ok(repositories.to_vec());
    } else if let Some(organization) = &options.organization {
        notify_used("organization");
        (RepositoryScope::Organization, organization)
    } else if let Some(user) = &options.user {
        notify_used("user");
        (RepositoryScope::User, user)
    } else {
        return Err(Error::NoTarget);
    };

    let listing = factory.list_repositories(scope, name).await?;
    let listed = listing.len();
    let targets = apply_filter(listing, &options.filter);
    tracing::debug!(%scope, name = %name, listed, matched = targets.len(), "listed repositories");

    Ok(targets)
}
