// Document sources: local files and in-memory fixtures
use crate::config::UrlMapping;
use crate::registry::LoadError;
use crate::uri;
use ahash::AHashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Fetches raw bytes for a canonical URL. Parsing is the registry's job.
pub trait DocumentLoader: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, LoadError>;
}

/// Reads `file:` URLs, and remote URLs through prefix mappings onto local
/// directories. There is no network access.
#[derive(Debug, Default, Clone)]
pub struct FileLoader {
    mappings: Vec<UrlMapping>,
}

impl FileLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mappings(mut self, mappings: Vec<UrlMapping>) -> Self {
        self.mappings = mappings;
        // Longest prefix first
        self.mappings.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        self
    }

    fn local_path(&self, url: &str) -> Option<PathBuf> {
        if let Some(path) = uri::to_file_path(url) {
            return Some(path);
        }
        self.mappings.iter().find_map(|m| {
            url.strip_prefix(m.prefix.as_str())
                .map(|rest| m.path.join(rest.trim_start_matches('/')))
        })
    }
}

impl DocumentLoader for FileLoader {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, LoadError> {
        let path = self.local_path(url).ok_or_else(|| LoadError::NotFound {
            url: url.to_string(),
            reason: "no local mapping for remote URL".to_string(),
        })?;
        tracing::debug!(url, path = %path.display(), "Reading document");
        std::fs::read(&path).map_err(|e| LoadError::NotFound {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Documents held in memory, keyed by canonical URL.
#[derive(Debug, Default)]
pub struct MemoryLoader {
    files: AHashMap<String, Vec<u8>>,
    fetches: AtomicUsize,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document; relative paths are keyed as `file:` URLs.
    pub fn with(mut self, url: &str, content: impl Into<Vec<u8>>) -> Self {
        self.insert(url, content);
        self
    }

    pub fn insert(&mut self, url: &str, content: impl Into<Vec<u8>>) {
        let key = uri::canonicalize(None, url).unwrap_or_else(|_| url.to_string());
        self.files.insert(key, content.into());
    }

    /// Number of fetch calls served, successful or not.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

impl DocumentLoader for MemoryLoader {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, LoadError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        self.files.get(url).cloned().ok_or_else(|| LoadError::NotFound {
            url: url.to_string(),
            reason: "not in memory".to_string(),
        })
    }
}

impl<L: DocumentLoader + ?Sized> DocumentLoader for std::sync::Arc<L> {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, LoadError> {
        (**self).fetch(url)
    }
}
