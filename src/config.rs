// Validation configuration
use crate::{Error, Result};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

bitflags! {
    /// Validation passes that are active for a run.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ValidationFlags: u32 {
        const ROLES = 1 << 0;
        const HREFS = 1 << 1;
        const EMBEDDED_LINKBASES = 1 << 2;
        const DUPLICATE_ORDERS = 1 << 3;
        const CALCULATION_CYCLES = 1 << 4;
        const ARCROLE_CYCLES = 1 << 5;
        const TUPLE_CYCLES = 1 << 6;
        const CONTINUATIONS = 1 << 7;
    }
}

impl Default for ValidationFlags {
    fn default() -> Self {
        Self::all()
    }
}

/// Maps a URL prefix onto a local directory, e.g. a published taxonomy
/// location onto an unpacked copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlMapping {
    pub prefix: String,
    pub path: PathBuf,
}

impl std::str::FromStr for UrlMapping {
    type Err = String;

    /// `PREFIX=DIR`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (prefix, path) = s
            .split_once('=')
            .ok_or_else(|| format!("expected PREFIX=DIR, got {}", s))?;
        if prefix.is_empty() || path.is_empty() {
            return Err(format!("expected PREFIX=DIR, got {}", s));
        }
        Ok(Self {
            prefix: prefix.to_string(),
            path: PathBuf::from(path),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Treat warnings as failures when reporting.
    pub strict: bool,
    pub flags: ValidationFlags,
    /// Allow `element(...)` xpointers in hrefs.
    pub allow_element_pointers: bool,
    /// Target namespace authorities accepted for schemas; empty accepts any.
    pub allowed_authorities: Vec<String>,
    pub url_mappings: Vec<UrlMapping>,
    pub max_documents: Option<usize>,
    pub max_depth: Option<usize>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            strict: false,
            flags: ValidationFlags::all(),
            allow_element_pointers: true,
            allowed_authorities: Vec::new(),
            url_mappings: Vec::new(),
            max_documents: None,
            max_depth: None,
        }
    }
}

impl ValidationConfig {
    /// Shorthand pointers only, warnings fail the run.
    pub fn restricted() -> Self {
        Self {
            strict: true,
            allow_element_pointers: false,
            ..Self::default()
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!("{}: {}", path.as_ref().display(), e))
        })
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn with_flags(mut self, flags: ValidationFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn without(mut self, flags: ValidationFlags) -> Self {
        self.flags.remove(flags);
        self
    }

    pub fn with_mapping(mut self, mapping: UrlMapping) -> Self {
        self.url_mappings.push(mapping);
        self
    }

    pub fn with_max_documents(mut self, max: usize) -> Self {
        self.max_documents = Some(max);
        self
    }

    pub fn with_max_depth(mut self, max: usize) -> Self {
        self.max_depth = Some(max);
        self
    }

    #[inline]
    pub fn enabled(&self, flag: ValidationFlags) -> bool {
        self.flags.contains(flag)
    }
}
