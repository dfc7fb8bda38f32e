//! crabdts - DTS discovery and linkbase validation for XBRL taxonomies
//!
//! Licensed under AGPL-3.0

pub mod config;
pub mod continuation;
pub mod cycles;
pub mod diagnostics;
pub mod dts;
pub mod hooks;
pub mod href;
pub mod loader;
pub mod model;
pub mod parser;
pub mod registry;
pub mod relationships;
pub mod roles;
pub mod rules;
pub mod uri;
pub mod validator;
mod walker;

// Re-export main types
pub use config::{UrlMapping, ValidationConfig, ValidationFlags};
pub use diagnostics::{codes, Diagnostic, DiagnosticSink, Diagnostics, ErrorKind, ObjectRef, Severity};
pub use dts::Dts;
pub use hooks::{OnDocumentVisited, OnRelationshipBuilt};
pub use href::{ReferenceError, TargetKind};
pub use loader::{DocumentLoader, FileLoader, MemoryLoader};
pub use model::{DocId, Document, DocumentType, ElementId, NodeRef, QName};
pub use registry::{DocumentRegistry, LoadError};
pub use relationships::{Axis, BaseSetKey, Relationship, RelationshipSet};
pub use roles::{RoleDeclaration, RoleError};
pub use rules::{ConfiguredRules, GenericRules, RulePack};
pub use validator::DtsValidator;

/// Outcome of one validation run. The DTS stays available for queries.
pub struct ValidationResult {
    pub dts: Dts,
    pub diagnostics: Diagnostics,
    pub stats: ValidationStats,
    pub(crate) strict: bool,
}

impl ValidationResult {
    /// No errors; in strict mode, no warnings either.
    pub fn is_valid(&self) -> bool {
        if self.strict {
            self.is_valid_strict()
        } else {
            !self.diagnostics.has_errors()
        }
    }

    pub fn is_valid_strict(&self) -> bool {
        !self.diagnostics.has_errors() && self.diagnostics.warnings().next().is_none()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.errors()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.warnings()
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct ValidationStats {
    pub documents: usize,
    pub base_sets: usize,
    pub arcs: usize,
    pub duration_ms: u64,
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Entry document {url} could not be loaded: {source}")]
    EntryDocument {
        url: String,
        #[source]
        source: LoadError,
    },
}
