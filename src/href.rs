// Href and XPointer resolution
use crate::diagnostics::{codes, Diagnostic, ErrorKind};
use crate::model::*;
use crate::registry::{DocumentRegistry, LoadError};
use crate::rules::RulePack;
use crate::uri;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReferenceError {
    #[error("document {url} not found: {reason}")]
    DocumentNotFound { url: String, reason: String },

    #[error("no element with id \"{id}\" in {url}")]
    TargetIdNotFound { url: String, id: String },

    #[error("xpointer scheme \"{scheme}\" is not supported")]
    UnsupportedXpointerScheme { scheme: String },

    #[error("malformed xpointer \"{pointer}\"")]
    MalformedXpointer { pointer: String },

    #[error("xpointer \"{pointer}\" does not identify an element in {url}")]
    ElementPointerNotFound { pointer: String, url: String },

    #[error("href {href} targets {found}, expected {expected}")]
    WrongTargetType {
        href: String,
        found: String,
        expected: String,
    },

    #[error("invalid href {href}: {reason}")]
    InvalidHref { href: String, reason: String },
}

impl ReferenceError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::DocumentNotFound { .. } => codes::DOCUMENT_NOT_FOUND,
            Self::TargetIdNotFound { .. } => codes::TARGET_ID_NOT_FOUND,
            Self::UnsupportedXpointerScheme { .. } => codes::UNSUPPORTED_XPOINTER_SCHEME,
            Self::MalformedXpointer { .. } => codes::MALFORMED_XPOINTER,
            Self::ElementPointerNotFound { .. } => codes::ELEMENT_POINTER_NOT_FOUND,
            Self::WrongTargetType { .. } => codes::WRONG_TARGET_TYPE,
            Self::InvalidHref { .. } => codes::INVALID_HREF,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let d = |template: &'static str| Diagnostic::error(ErrorKind::Reference, self.code(), template);
        match self {
            Self::DocumentNotFound { url, reason } => d("Document {url} not found: {reason}")
                .arg("url", url)
                .arg("reason", reason),
            Self::TargetIdNotFound { url, id } => d("No element with id \"{id}\" in {url}")
                .arg("id", id)
                .arg("url", url),
            Self::UnsupportedXpointerScheme { scheme } => {
                d("XPointer scheme \"{scheme}\" is not supported").arg("scheme", scheme)
            }
            Self::MalformedXpointer { pointer } => d("Malformed XPointer \"{pointer}\"").arg("pointer", pointer),
            Self::ElementPointerNotFound { pointer, url } => {
                d("XPointer \"{pointer}\" does not identify an element in {url}")
                    .arg("pointer", pointer)
                    .arg("url", url)
            }
            Self::WrongTargetType { href, found, expected } => d("Href {href} targets {found}, expected {expected}")
                .arg("href", href)
                .arg("found", found)
                .arg("expected", expected),
            Self::InvalidHref { href, reason } => d("Invalid href {href}: {reason}")
                .arg("href", href)
                .arg("reason", reason),
        }
    }
}

impl From<LoadError> for ReferenceError {
    fn from(e: LoadError) -> Self {
        match e {
            LoadError::InvalidUrl { url, reason } => Self::InvalidHref { href: url, reason },
            other => Self::DocumentNotFound {
                url: other.url().to_string(),
                reason: other.to_string(),
            },
        }
    }
}

// ============================================================================
// XPointer
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementPointer {
    pub id: Option<String>,
    /// 1-based element child steps.
    pub steps: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Xpointer {
    Shorthand(String),
    /// `element()` parts, tried in order.
    Element(Vec<ElementPointer>),
}

fn is_ncname(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '\u{B7}'))
}

pub fn parse_xpointer(fragment: &str) -> Result<Xpointer, ReferenceError> {
    let malformed = || ReferenceError::MalformedXpointer {
        pointer: fragment.to_string(),
    };
    let trimmed = fragment.trim();
    if is_ncname(trimmed) {
        return Ok(Xpointer::Shorthand(trimmed.to_string()));
    }
    if !trimmed.contains('(') {
        return Err(malformed());
    }

    let mut parts = Vec::new();
    let mut rest = trimmed;
    while !rest.is_empty() {
        let open = rest.find('(').ok_or_else(malformed)?;
        let scheme = rest[..open].trim();
        if scheme.is_empty() {
            return Err(malformed());
        }
        let (body, consumed) = scheme_body(&rest[open + 1..]).ok_or_else(malformed)?;
        if scheme != "element" {
            return Err(ReferenceError::UnsupportedXpointerScheme {
                scheme: scheme.to_string(),
            });
        }
        parts.push(parse_element_scheme(&body).ok_or_else(malformed)?);
        rest = rest[open + 1 + consumed..].trim_start();
    }
    Ok(Xpointer::Element(parts))
}

/// Body of one scheme part up to its balanced `)`, unescaping `^`.
/// Returns the body and the bytes consumed including the `)`.
fn scheme_body(input: &str) -> Option<(String, usize)> {
    let mut depth = 0usize;
    let mut body = String::new();
    let mut chars = input.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '^' => {
                let (_, escaped) = chars.next()?;
                if !matches!(escaped, '(' | ')' | '^') {
                    return None;
                }
                body.push(escaped);
            }
            '(' => {
                depth += 1;
                body.push(c);
            }
            ')' if depth == 0 => return Some((body, i + 1)),
            ')' => {
                depth -= 1;
                body.push(c);
            }
            _ => body.push(c),
        }
    }
    None
}

fn parse_element_scheme(body: &str) -> Option<ElementPointer> {
    let body = body.trim();
    let (id, sequence) = match body.find('/') {
        Some(0) => (None, body),
        Some(pos) => (Some(&body[..pos]), &body[pos..]),
        None => (Some(body), ""),
    };
    if let Some(id) = id {
        if !is_ncname(id) {
            return None;
        }
    }
    let mut steps = Vec::new();
    for step in sequence.split('/').skip(1) {
        let n: usize = step.parse().ok()?;
        if n == 0 {
            return None;
        }
        steps.push(n);
    }
    if id.is_none() && steps.is_empty() {
        return None;
    }
    Some(ElementPointer {
        id: id.map(str::to_string),
        steps,
    })
}

fn evaluate_element_pointer(doc: &Document, pointer: &ElementPointer) -> Option<ElementId> {
    let mut steps = pointer.steps.iter();
    let mut current = match &pointer.id {
        Some(id) => doc.by_id(id)?,
        None => {
            // The first step selects among the document node's children
            if *steps.next()? != 1 {
                return None;
            }
            doc.root()
        }
    };
    for &step in steps {
        current = doc.element(current).children.get(step - 1).copied()?;
    }
    Some(current)
}

/// Resolve `href` relative to document `base`.
pub fn resolve_href(
    registry: &mut DocumentRegistry,
    rules: &dyn RulePack,
    base: DocId,
    href: &str,
) -> Result<NodeRef, ReferenceError> {
    let (location, fragment) = uri::split_href(href.trim());
    let doc_id = if location.is_empty() {
        base
    } else {
        registry.load_relative(base, location)?
    };
    let doc = registry.get(doc_id);

    let fragment = match fragment {
        Some(f) if !f.is_empty() => f,
        _ => return Ok(doc.node(doc.root())),
    };

    match parse_xpointer(&fragment)? {
        Xpointer::Shorthand(id) => doc
            .by_id(&id)
            .map(|el| doc.node(el))
            .ok_or_else(|| ReferenceError::TargetIdNotFound {
                url: doc.url.clone(),
                id,
            }),
        Xpointer::Element(parts) => {
            if !rules.element_pointers_allowed() {
                return Err(ReferenceError::UnsupportedXpointerScheme {
                    scheme: "element".to_string(),
                });
            }
            parts
                .iter()
                .find_map(|p| evaluate_element_pointer(doc, p))
                .map(|el| doc.node(el))
                .ok_or_else(|| ReferenceError::ElementPointerNotFound {
                    pointer: fragment.clone(),
                    url: doc.url.clone(),
                })
        }
    }
}

// ============================================================================
// Locator target table
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TargetKind {
    Concept,
    LabelResource,
    ReferenceResource,
    FootnoteResource,
    Fact,
    RoleType,
    ArcroleType,
    Other,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Concept => "a concept declaration",
            Self::LabelResource => "a label resource",
            Self::ReferenceResource => "a reference resource",
            Self::FootnoteResource => "a footnote resource",
            Self::Fact => "a fact",
            Self::RoleType => "a roleType",
            Self::ArcroleType => "an arcroleType",
            Self::Other => "another element",
        })
    }
}

pub fn classify_target(doc: &Document, element: ElementId) -> TargetKind {
    let el = doc.element(element);
    let parent_is_schema = el
        .parent
        .map(|p| doc.element(p).is(XSD_NS, "schema"))
        .unwrap_or(false);
    if el.is(XSD_NS, "element") && parent_is_schema && el.attr_local("name").is_some() {
        return TargetKind::Concept;
    }
    if el.name.namespace == LINK_NS {
        match el.name.local.as_str() {
            "label" => return TargetKind::LabelResource,
            "reference" => return TargetKind::ReferenceResource,
            "footnote" => return TargetKind::FootnoteResource,
            "roleType" => return TargetKind::RoleType,
            "arcroleType" => return TargetKind::ArcroleType,
            _ => {}
        }
    }
    if is_fact(doc, element) {
        return TargetKind::Fact;
    }
    TargetKind::Other
}

fn is_fact(doc: &Document, element: ElementId) -> bool {
    let el = doc.element(element);
    match doc.doc_type {
        DocumentType::Instance => {
            if element == doc.root() || [XBRLI_NS, LINK_NS].contains(&el.name.namespace.as_str()) {
                return false;
            }
            // Facts and tuples sit under the root, possibly nested in tuples
            let mut current = el.parent;
            while let Some(parent) = current {
                if parent == doc.root() {
                    return true;
                }
                if [XBRLI_NS, LINK_NS].contains(&doc.element(parent).name.namespace.as_str()) {
                    return false;
                }
                current = doc.element(parent).parent;
            }
            false
        }
        DocumentType::InlineInstance => {
            is_inline_ns(&el.name.namespace)
                && matches!(el.name.local.as_str(), "nonFraction" | "nonNumeric" | "fraction" | "tuple")
        }
        _ => false,
    }
}

const CONCEPT_ONLY: &[TargetKind] = &[TargetKind::Concept];
const LABEL_TARGETS: &[TargetKind] = &[TargetKind::Concept, TargetKind::LabelResource];
const REFERENCE_TARGETS: &[TargetKind] = &[TargetKind::Concept, TargetKind::ReferenceResource];
const FOOTNOTE_TARGETS: &[TargetKind] = &[TargetKind::Fact, TargetKind::FootnoteResource];

/// Allowed locator targets inside the given extended link; `None` means
/// the link is not a standard link and targets are unrestricted.
pub fn allowed_locator_targets(link: &QName) -> Option<&'static [TargetKind]> {
    if link.namespace != LINK_NS {
        return None;
    }
    match link.local.as_str() {
        "labelLink" => Some(LABEL_TARGETS),
        "referenceLink" => Some(REFERENCE_TARGETS),
        "presentationLink" | "calculationLink" | "definitionLink" => Some(CONCEPT_ONLY),
        "footnoteLink" => Some(FOOTNOTE_TARGETS),
        _ => None,
    }
}

pub fn check_locator_target(
    link: &QName,
    href: &str,
    doc: &Document,
    target: ElementId,
) -> Result<TargetKind, ReferenceError> {
    let kind = classify_target(doc, target);
    match allowed_locator_targets(link) {
        Some(allowed) if !allowed.contains(&kind) => Err(ReferenceError::WrongTargetType {
            href: href.to_string(),
            found: format!("{} ({})", kind, doc.element(target).name),
            expected: allowed
                .iter()
                .map(|k| k.to_string())
                .collect::<Vec<_>>()
                .join(" or "),
        }),
        _ => Ok(kind),
    }
}
