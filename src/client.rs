//! The invocation surface: registry, transport and the current feed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::feed::{
    aggregate, fetch, Diagnostic, Feed, FetchError, Registry, Retrieve, SortOrder, Source,
    Transport,
};

/// Phase of a fetch cycle.
///
/// A cycle runs to completion inside [`Client::load`], so callers only ever
/// observe `Idle` (before the first cycle) or `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Fetching,
    Normalizing,
    Sorting,
    Ready,
}

enum Retriever {
    Transport(Transport),
    Custom(Arc<dyn Retrieve>),
}

/// Aggregating feed client.
///
/// Owns the source registry and the feed produced by the last cycle. Each
/// cycle rebuilds the feed from scratch.
pub struct Client {
    registry: Registry,
    retriever: Retriever,
    sort_order: SortOrder,
    deadline: Duration,
    feed: Feed,
    diagnostics: Vec<Diagnostic>,
    state: CycleState,
}

impl Client {
    /// Builds a client with the HTTP/file transport described by `config`.
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let transport = Transport::new(config.storage_root(), config.max_feed_bytes)?;
        Ok(Self::build(config, Retriever::Transport(transport)))
    }

    /// Builds a client that retrieves through `retriever` instead of the network.
    pub fn with_retriever(config: &Config, retriever: Arc<dyn Retrieve>) -> Self {
        Self::build(config, Retriever::Custom(retriever))
    }

    fn build(config: &Config, retriever: Retriever) -> Self {
        let mut registry = Registry::new();
        registry.add_sources(config.sources());
        Self {
            registry,
            retriever,
            sort_order: config.sort_order,
            deadline: config.deadline(),
            feed: Feed::default(),
            diagnostics: Vec::new(),
            state: CycleState::Idle,
        }
    }

    /// Changes the directory file sources are read from.
    ///
    /// Has no effect on a client built with a custom retriever.
    pub fn set_storage_root(&mut self, path: impl Into<PathBuf>) {
        match &mut self.retriever {
            Retriever::Transport(transport) => transport.set_storage_root(path),
            Retriever::Custom(_) => {
                tracing::warn!("Custom retriever in use, storage root not applied");
            }
        }
    }

    pub fn set_deadline(&mut self, deadline: Duration) {
        self.deadline = deadline;
    }

    pub fn add_sources<I>(&mut self, sources: I)
    where
        I: IntoIterator<Item = Source>,
    {
        self.registry.add_sources(sources);
    }

    pub fn remove_sources<S: AsRef<str>>(&mut self, paths: &[S]) {
        self.registry.remove_sources(paths);
    }

    pub fn list_sources(&self) -> Vec<Arc<Source>> {
        self.registry.list_sources()
    }

    pub fn find_source(&self, target: &str) -> Option<Arc<Source>> {
        self.registry.find_source(target)
    }

    /// The feed built by the last cycle (empty before the first one).
    pub fn feed(&self) -> &Feed {
        &self.feed
    }

    /// Per-source problems of the last cycle.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn sort_order(&self) -> SortOrder {
        self.sort_order
    }

    /// Stores `order` for later cycles and re-sorts the current feed.
    pub fn sort_feed(&mut self, order: SortOrder) -> &Feed {
        self.sort_order = order;
        self.feed.sort_by(order);
        &self.feed
    }

    /// Runs a cycle over `sources`, or over every registered source when
    /// the slice is empty.
    pub async fn load(&mut self, sources: &[Arc<Source>]) -> &Feed {
        if sources.is_empty() {
            return self.load_all().await;
        }
        self.run_cycle(sources.to_vec()).await
    }

    /// Runs a cycle over every registered source.
    pub async fn load_all(&mut self) -> &Feed {
        let snapshot = self.registry.list_sources();
        self.run_cycle(snapshot).await
    }

    /// Same as [`Client::load_all`].
    pub async fn refresh(&mut self) -> &Feed {
        self.load_all().await
    }

    async fn run_cycle(&mut self, sources: Vec<Arc<Source>>) -> &Feed {
        let retriever: Arc<dyn Retrieve> = match &self.retriever {
            Retriever::Transport(transport) => Arc::new(transport.clone()),
            Retriever::Custom(custom) => Arc::clone(custom),
        };

        self.transition(CycleState::Fetching);
        let outcomes = fetch(retriever, &sources, self.deadline).await;

        self.transition(CycleState::Normalizing);
        let result = aggregate(sources.into_iter().zip(outcomes), self.sort_order);

        // aggregate() already ordered the items; the phase is kept for tracing.
        self.transition(CycleState::Sorting);
        self.feed = result.feed;
        self.diagnostics = result.diagnostics;

        self.transition(CycleState::Ready);
        &self.feed
    }

    fn transition(&mut self, next: CycleState) {
        tracing::debug!(from = ?self.state, to = ?next, "Fetch cycle");
        self.state = next;
    }
}
