// Document registry: at-most-once load and parse per canonical URL
use crate::loader::DocumentLoader;
use crate::model::{DocId, Document};
use crate::parser;
use crate::uri;
use ahash::AHashMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("document {url} not found: {reason}")]
    NotFound { url: String, reason: String },

    #[error("document {url} could not be parsed: {message} (line {line})")]
    Parse { url: String, message: String, line: u32 },

    #[error("invalid document URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl LoadError {
    pub fn url(&self) -> &str {
        match self {
            Self::NotFound { url, .. } | Self::Parse { url, .. } | Self::InvalidUrl { url, .. } => url,
        }
    }
}

pub struct DocumentRegistry {
    loader: Box<dyn DocumentLoader>,
    documents: Vec<Document>,
    by_url: AHashMap<String, DocId>,
    failures: AHashMap<String, LoadError>,
}

impl DocumentRegistry {
    pub fn new(loader: impl DocumentLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            documents: Vec::new(),
            by_url: AHashMap::new(),
            failures: AHashMap::new(),
        }
    }

    /// Load a document, resolving `url` against nothing (absolute URL or
    /// filesystem path).
    pub fn load(&mut self, url: &str) -> Result<DocId, LoadError> {
        let canonical = uri::canonicalize(None, url).map_err(|reason| LoadError::InvalidUrl {
            url: url.to_string(),
            reason,
        })?;
        self.load_canonical(&canonical)
    }

    /// Load `href` relative to the document `base`.
    pub fn load_relative(&mut self, base: DocId, href: &str) -> Result<DocId, LoadError> {
        let canonical = uri::canonicalize(Some(&self.get(base).url), href).map_err(|reason| {
            LoadError::InvalidUrl {
                url: href.to_string(),
                reason,
            }
        })?;
        self.load_canonical(&canonical)
    }

    fn load_canonical(&mut self, url: &str) -> Result<DocId, LoadError> {
        if let Some(&id) = self.by_url.get(url) {
            return Ok(id);
        }
        if let Some(failure) = self.failures.get(url) {
            return Err(failure.clone());
        }

        let id = DocId(self.documents.len() as u32);
        let result = self
            .loader
            .fetch(url)
            .and_then(|bytes| parse(id, url, &bytes));
        self.store(url, result)
    }

    fn store(&mut self, url: &str, result: Result<Document, LoadError>) -> Result<DocId, LoadError> {
        match result {
            Ok(mut doc) => {
                let id = DocId(self.documents.len() as u32);
                doc.id = id;
                tracing::debug!(url, doc_type = %doc.doc_type, elements = doc.len(), "Parsed document");
                self.documents.push(doc);
                self.by_url.insert(url.to_string(), id);
                Ok(id)
            }
            Err(e) => {
                tracing::debug!(url, error = %e, "Document load failed");
                self.failures.insert(url.to_string(), e.clone());
                Err(e)
            }
        }
    }

    /// Fetch and parse not-yet-cached URLs concurrently, then insert the
    /// results in the given order.
    #[cfg(feature = "parallel")]
    pub fn prefetch(&mut self, urls: &[String]) {
        use rayon::prelude::*;

        let pending: Vec<&String> = urls
            .iter()
            .filter(|u| !self.by_url.contains_key(u.as_str()) && !self.failures.contains_key(u.as_str()))
            .collect();
        if pending.len() < 2 {
            return;
        }
        let loader = &self.loader;
        let results: Vec<(&String, Result<Document, LoadError>)> = pending
            .par_iter()
            .map(|&url| {
                let result = loader.fetch(url).and_then(|bytes| parse(DocId(0), url, &bytes));
                (url, result)
            })
            .collect();
        for (url, result) in results {
            if !self.by_url.contains_key(url.as_str()) {
                // Failures surface again through load()
                let _ = self.store(url, result);
            }
        }
    }

    #[cfg(not(feature = "parallel"))]
    pub fn prefetch(&mut self, _urls: &[String]) {}

    #[inline]
    pub fn get(&self, id: DocId) -> &Document {
        &self.documents[id.index()]
    }

    pub(crate) fn get_mut(&mut self, id: DocId) -> &mut Document {
        &mut self.documents[id.index()]
    }

    pub fn lookup(&self, url: &str) -> Option<DocId> {
        let canonical = uri::canonicalize(None, url).ok()?;
        self.by_url.get(&canonical).copied()
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter()
    }

    /// Memoized load failures by URL.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &LoadError)> {
        self.failures.iter().map(|(url, e)| (url.as_str(), e))
    }

    /// Number of documents parsed so far.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

fn parse(id: DocId, url: &str, bytes: &[u8]) -> Result<Document, LoadError> {
    parser::parse_document(id, url, bytes).map_err(|e| LoadError::Parse {
        url: url.to_string(),
        message: e.message,
        line: e.line,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MemoryLoader;
    use std::sync::Arc;

    #[test]
    fn test_equivalent_urls_parse_once() {
        let loader = Arc::new(
            MemoryLoader::new().with("http://example.com/tax/core.xsd", "<schema/>"),
        );
        let mut registry = DocumentRegistry::new(loader.clone());

        let a = registry.load("http://example.com/tax/./core.xsd").unwrap();
        let b = registry.load("http://example.com/tax/sub/../core.xsd#frag").unwrap();
        let c = registry.load_relative(a, "core.xsd").unwrap();

        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(registry.len(), 1);
        assert_eq!(loader.fetch_count(), 1);
    }

    #[test]
    fn test_failures_are_memoized() {
        let loader = Arc::new(MemoryLoader::new().with("http://example.com/bad.xml", "<a><b></a>"));
        let mut registry = DocumentRegistry::new(loader.clone());

        let first = registry.load("http://example.com/bad.xml").unwrap_err();
        assert!(matches!(first, LoadError::Parse { .. }));
        let second = registry.load("http://example.com/bad.xml").unwrap_err();
        assert_eq!(first, second);
        assert!(registry.load("http://example.com/missing.xml").is_err());
        assert_eq!(loader.fetch_count(), 2);
        assert!(registry.is_empty());
    }
}
