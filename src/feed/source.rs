use std::sync::Arc;

use serde::Deserialize;

/// How a [`Source`] is retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Plain HTTP(S) GET against the source path.
    Http,
    /// File read relative to the configured storage root.
    File,
}

/// A configured feed location.
///
/// `path` is either a URL or a file path relative to the storage root, and
/// is the unique key of the source inside a [`Registry`]. Sources are
/// immutable once created and shared as `Arc<Source>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Source {
    pub path: String,
    pub title: String,
    pub kind: SourceKind,
}

impl Source {
    pub fn new(path: impl Into<String>, title: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            path: path.into(),
            title: title.into(),
            kind,
        }
    }

    /// Builds a source whose kind is inferred from the path.
    ///
    /// Paths starting with `http` (any case) are HTTP sources, everything
    /// else is treated as a file under the storage root. Construct with
    /// [`Source::new`] when the guess would be wrong.
    pub fn guess(path: impl Into<String>, title: impl Into<String>) -> Self {
        let path = path.into();
        let kind = if path.to_ascii_lowercase().starts_with("http") {
            SourceKind::Http
        } else {
            SourceKind::File
        };
        Self::new(path, title, kind)
    }
}

/// Ordered set of sources keyed by [`Source::path`].
///
/// Insertion order is preserved and is the order the fetcher and
/// aggregator use as the input order of a cycle.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    sources: Vec<Arc<Source>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds sources, replacing any existing entry with the same path in place.
    pub fn add_sources<I>(&mut self, sources: I)
    where
        I: IntoIterator<Item = Source>,
    {
        for source in sources {
            match self.sources.iter().position(|s| s.path == source.path) {
                Some(idx) => {
                    tracing::debug!(source = %source.path, "Replacing existing source");
                    self.sources[idx] = Arc::new(source);
                }
                None => self.sources.push(Arc::new(source)),
            }
        }
    }

    /// Removes every source whose path is listed. Unknown paths are ignored.
    pub fn remove_sources<S: AsRef<str>>(&mut self, paths: &[S]) {
        self.sources
            .retain(|s| !paths.iter().any(|p| p.as_ref() == s.path));
    }

    /// Snapshot of the registered sources in insertion order.
    pub fn list_sources(&self) -> Vec<Arc<Source>> {
        self.sources.clone()
    }

    /// Finds a source by path or title.
    pub fn find_source(&self, target: &str) -> Option<Arc<Source>> {
        self.sources
            .iter()
            .find(|s| s.path == target || s.title == target)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
