//! In-memory provider doubles for tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::config::LabelSpec;
use crate::error::{Error, Result};
use crate::provider::{
    LabelProvider, ProviderFactory, RemoteLabel, RepositoryInfo, RepositoryScope,
};

/// Provider call recorded by [`MockProvider`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Fetch,
    Create(String),
    Update(String, String),
    Delete(String),
}

impl Call {
    /// Label the call acts on
    fn subject(&self) -> Option<&str> {
        match self {
            Call::Fetch => None,
            Call::Create(name) | Call::Update(name, _) | Call::Delete(name) => Some(name),
        }
    }
}

/// Start and end of one provider call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: Instant,
    pub end: Instant,
}

/// Tracks how many calls are in flight and the peak reached
#[derive(Debug, Default)]
pub struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct MockState {
    labels: Mutex<Vec<RemoteLabel>>,
    calls: Mutex<Vec<Call>>,
    failing: Mutex<HashSet<String>>,
    fail_fetch: AtomicBool,
    delay: Mutex<Duration>,
    label_delays: Mutex<HashMap<String, Duration>>,
    spans: Mutex<Vec<(Call, Span)>>,
    mutations: Gauge,
    fetches: Arc<Gauge>,
}

/// In-memory repository that behaves like the GitHub label API
#[derive(Clone, Default)]
pub struct MockProvider {
    state: Arc<MockState>,
}

impl MockProvider {
    pub fn with_labels(labels: Vec<RemoteLabel>) -> Self {
        let provider = Self::default();
        *provider.state.labels.lock().unwrap() = labels;
        provider
    }

    fn with_fetch_gauge(labels: Vec<RemoteLabel>, fetches: Arc<Gauge>, delay: Duration) -> Self {
        let state = MockState {
            labels: Mutex::new(labels),
            delay: Mutex::new(delay),
            fetches,
            ..Default::default()
        };
        Self {
            state: Arc::new(state),
        }
    }

    /// Make every mutation touching `name` fail
    pub fn fail_on(&self, name: &str) {
        self.state
            .failing
            .lock()
            .unwrap()
            .insert(name.to_lowercase());
    }

    pub fn fail_fetch(&self) {
        self.state.fail_fetch.store(true, Ordering::SeqCst);
    }

    /// Delay applied to every call so concurrent calls overlap
    pub fn set_delay(&self, delay: Duration) {
        *self.state.delay.lock().unwrap() = delay;
    }

    /// Delay for mutations touching `name`, overriding the common delay
    pub fn set_label_delay(&self, name: &str, delay: Duration) {
        self.state
            .label_delays
            .lock()
            .unwrap()
            .insert(name.to_lowercase(), delay);
    }

    /// Timing of the first recorded `call`
    pub fn span(&self, call: &Call) -> Option<Span> {
        self.state
            .spans
            .lock()
            .unwrap()
            .iter()
            .find(|(recorded, _)| recorded == call)
            .map(|(_, span)| *span)
    }

    /// When the last call on this provider returned
    pub fn finished_at(&self) -> Option<Instant> {
        self.state
            .spans
            .lock()
            .unwrap()
            .iter()
            .map(|(_, span)| span.end)
            .max()
    }

    fn delay_for(&self, call: &Call) -> Duration {
        let custom = call.subject().and_then(|name| {
            let delays = self.state.label_delays.lock().unwrap();
            delays.get(&name.to_lowercase()).copied()
        });
        custom.unwrap_or_else(|| *self.state.delay.lock().unwrap())
    }

    async fn timed(&self, call: Call) {
        let start = Instant::now();
        tokio::time::sleep(self.delay_for(&call)).await;
        let span = Span {
            start,
            end: Instant::now(),
        };
        self.state.spans.lock().unwrap().push((call, span));
    }

    pub fn labels(&self) -> Vec<RemoteLabel> {
        self.state.labels.lock().unwrap().clone()
    }

    pub fn mutation_calls(&self) -> Vec<Call> {
        self.state
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| **call != Call::Fetch)
            .cloned()
            .collect()
    }

    pub fn peak_mutations(&self) -> usize {
        self.state.mutations.peak()
    }

    fn check_failure(&self, names: &[&str]) -> Result<()> {
        let failing = self.state.failing.lock().unwrap();
        match names.iter().find(|n| failing.contains(&n.to_lowercase())) {
            Some(name) => Err(Error::provider(format!("injected failure for {name}"))),
            None => Ok(()),
        }
    }

    async fn mutate<T, F>(&self, call: Call, apply: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<RemoteLabel>) -> Result<T>,
    {
        self.state.calls.lock().unwrap().push(call.clone());
        self.state.mutations.enter();
        self.timed(call).await;
        let result = {
            let mut labels = self.state.labels.lock().unwrap();
            apply(&mut *labels)
        };
        self.state.mutations.exit();
        result
    }
}

fn position(labels: &[RemoteLabel], name: &str) -> Option<usize> {
    labels
        .iter()
        .position(|l| l.name.to_lowercase() == name.to_lowercase())
}

#[async_trait]
impl LabelProvider for MockProvider {
    async fn fetch_labels(&self) -> Result<Vec<RemoteLabel>> {
        self.state.calls.lock().unwrap().push(Call::Fetch);
        self.state.fetches.enter();
        self.timed(Call::Fetch).await;
        self.state.fetches.exit();

        if self.state.fail_fetch.load(Ordering::SeqCst) {
            return Err(Error::provider("injected fetch failure"));
        }
        Ok(self.labels())
    }

    async fn create_label(&self, label: &LabelSpec) -> Result<RemoteLabel> {
        let failure = self.check_failure(&[label.name.as_str()]);
        let created = RemoteLabel::from(label);
        self.mutate(Call::Create(label.name.clone()), |labels| {
            failure?;
            if position(labels, &created.name).is_some() {
                return Err(Error::provider(format!("{} already exists", created.name)));
            }
            labels.push(created.clone());
            Ok(created)
        })
        .await
    }

    async fn update_label(&self, current_name: &str, label: &LabelSpec) -> Result<RemoteLabel> {
        let failure = self.check_failure(&[current_name, label.name.as_str()]);
        let updated = RemoteLabel::from(label);
        let call = Call::Update(current_name.to_string(), label.name.clone());
        self.mutate(call, |labels| {
            failure?;
            let index = position(labels, current_name)
                .ok_or_else(|| Error::provider(format!("{current_name} not found")))?;
            labels[index] = updated.clone();
            Ok(updated)
        })
        .await
    }

    async fn delete_label(&self, name: &str) -> Result<()> {
        let failure = self.check_failure(&[name]);
        self.mutate(Call::Delete(name.to_string()), |labels| {
            failure?;
            let index =
                position(labels, name).ok_or_else(|| Error::provider(format!("{name} not found")))?;
            labels.remove(index);
            Ok(())
        })
        .await
    }

    async fn label_exists(&self, name: &str) -> Result<bool> {
        Ok(position(&self.labels(), name).is_some())
    }
}

/// Factory handing out one [`MockProvider`] per repository
#[derive(Default)]
pub struct MockFactory {
    initial: HashMap<String, Vec<RemoteLabel>>,
    failing: HashSet<String>,
    panicking: HashSet<String>,
    listing: Vec<RepositoryInfo>,
    delay: Duration,
    repo_delays: HashMap<String, Duration>,
    fetches: Arc<Gauge>,
    connected: Mutex<HashMap<String, Instant>>,
    providers: Mutex<HashMap<String, MockProvider>>,
    list_calls: Mutex<Vec<(RepositoryScope, String)>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_labels(mut self, repository: &str, labels: Vec<RemoteLabel>) -> Self {
        self.initial.insert(repository.to_string(), labels);
        self
    }

    /// Fetching labels of `repository` fails
    pub fn failing(mut self, repository: &str) -> Self {
        self.failing.insert(repository.to_string());
        self
    }

    /// Connecting to `repository` panics
    pub fn panicking(mut self, repository: &str) -> Self {
        self.panicking.insert(repository.to_string());
        self
    }

    pub fn with_listing(mut self, listing: Vec<RepositoryInfo>) -> Self {
        self.listing = listing;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Delay for every call on `repository`, overriding the common delay
    pub fn with_repo_delay(mut self, repository: &str, delay: Duration) -> Self {
        self.repo_delays.insert(repository.to_string(), delay);
        self
    }

    /// When the orchestrator connected to `repository`
    pub fn connected_at(&self, repository: &str) -> Option<Instant> {
        self.connected.lock().unwrap().get(repository).copied()
    }

    /// Peak number of repositories fetching labels at once
    pub fn peak_fetches(&self) -> usize {
        self.fetches.peak()
    }

    pub fn provider(&self, repository: &str) -> Option<MockProvider> {
        self.providers.lock().unwrap().get(repository).cloned()
    }

    pub fn list_calls(&self) -> Vec<(RepositoryScope, String)> {
        self.list_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderFactory for MockFactory {
    type Provider = MockProvider;

    async fn connect(&self, owner: &str, repo: &str) -> Result<MockProvider> {
        let repository = format!("{owner}/{repo}");
        if self.panicking.contains(&repository) {
            panic!("simulated crash for {repository}");
        }

        self.connected
            .lock()
            .unwrap()
            .insert(repository.clone(), Instant::now());

        let labels = self.initial.get(&repository).cloned().unwrap_or_default();
        let delay = self.repo_delays.get(&repository).copied().unwrap_or(self.delay);
        let provider = MockProvider::with_fetch_gauge(labels, self.fetches.clone(), delay);
        if self.failing.contains(&repository) {
            provider.fail_fetch();
        }

        self.providers
            .lock()
            .unwrap()
            .insert(repository, provider.clone());
        Ok(provider)
    }

    async fn list_repositories(
        &self,
        scope: RepositoryScope,
        name: &str,
    ) -> Result<Vec<RepositoryInfo>> {
        self.list_calls
            .lock()
            .unwrap()
            .push((scope, name.to_string()));
        Ok(self.listing.clone())
    }
}

/// Build a listing entry
pub fn repo_info(
    identifier: &str,
    visibility: &str,
    language: Option<&str>,
    archived: bool,
) -> RepositoryInfo {
    RepositoryInfo {
        identifier: identifier.to_string(),
        visibility: visibility.to_string(),
        language: language.map(str::to_string),
        archived,
    }
}
