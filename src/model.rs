use ahash::AHashMap;
use compact_str::CompactString;
use serde::Serialize;
use std::fmt;
use std::hash::{Hash, Hasher};

// ============================================================================
// Namespaces
// ============================================================================

pub const XLINK_NS: &str = "http://www.w3.org/1999/xlink";
pub const LINK_NS: &str = "http://www.xbrl.org/2003/linkbase";
pub const XBRLI_NS: &str = "http://www.xbrl.org/2003/instance";
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";
pub const IX_NS: &str = "http://www.xbrl.org/2013/inlineXBRL";
pub const IX_NS_2008: &str = "http://www.xbrl.org/2008/inlineXBRL";
pub const GEN_LABEL_NS: &str = "http://xbrl.org/2008/label";
pub const GEN_REFERENCE_NS: &str = "http://xbrl.org/2008/reference";

pub fn is_inline_ns(ns: &str) -> bool {
    ns == IX_NS || ns == IX_NS_2008
}

// ============================================================================
// Identifiers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DocId(pub(crate) u32);

impl DocId {
    #[inline(always)]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ElementId(pub(crate) u32);

impl ElementId {
    #[inline(always)]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An element somewhere in the DTS. Components hold these instead of
/// borrowing from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeRef {
    pub doc: DocId,
    pub element: ElementId,
}

impl NodeRef {
    pub fn new(doc: DocId, element: ElementId) -> Self {
        Self { doc, element }
    }
}

// ============================================================================
// Qualified names
// ============================================================================

/// Namespace-qualified name. Equality and hashing ignore the prefix.
#[derive(Debug, Clone, Eq, Serialize)]
pub struct QName {
    pub namespace: CompactString,
    pub local: CompactString,
    pub prefix: Option<CompactString>,
}

impl QName {
    pub fn new(namespace: &str, local: &str) -> Self {
        Self {
            namespace: CompactString::from(namespace),
            local: CompactString::from(local),
            prefix: None,
        }
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        if !prefix.is_empty() {
            self.prefix = Some(CompactString::from(prefix));
        }
        self
    }

    #[inline]
    pub fn is(&self, namespace: &str, local: &str) -> bool {
        self.local == local && self.namespace == namespace
    }

    /// `{namespace}local`, independent of prefixes.
    pub fn clark(&self) -> String {
        format!("{{{}}}{}", self.namespace, self.local)
    }
}

impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.namespace == other.namespace && self.local == other.local
    }
}

impl Hash for QName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.namespace.hash(state);
        self.local.hash(state);
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(prefix) => write!(f, "{}:{}", prefix, self.local),
            None if self.namespace.is_empty() => write!(f, "{}", self.local),
            None => write!(f, "{{{}}}{}", self.namespace, self.local),
        }
    }
}

// ============================================================================
// Elements
// ============================================================================

#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum XLinkType {
    Simple,
    Extended,
    Locator,
    Arc,
    Resource,
    Title,
}

impl XLinkType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "simple" => Some(Self::Simple),
            "extended" => Some(Self::Extended),
            "locator" => Some(Self::Locator),
            "arc" => Some(Self::Arc),
            "resource" => Some(Self::Resource),
            "title" => Some(Self::Title),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Element {
    pub name: QName,
    pub attributes: Vec<Attribute>,
    /// Namespace bindings declared on this element; the default namespace
    /// has an empty prefix.
    pub namespaces: Vec<(CompactString, CompactString)>,
    pub parent: Option<ElementId>,
    pub children: Vec<ElementId>,
    pub text: String,
    pub line: u32,
}

impl Element {
    pub fn attr(&self, namespace: &str, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.is(namespace, local))
            .map(|a| a.value.as_str())
    }

    /// Unqualified attribute.
    #[inline]
    pub fn attr_local(&self, local: &str) -> Option<&str> {
        self.attr("", local)
    }

    #[inline]
    pub fn xlink(&self, local: &str) -> Option<&str> {
        self.attr(XLINK_NS, local)
    }

    pub fn id(&self) -> Option<&str> {
        self.attr_local("id").or_else(|| self.attr(XML_NS, "id"))
    }

    pub fn xlink_type(&self) -> Option<XLinkType> {
        self.xlink("type").and_then(XLinkType::parse)
    }

    #[inline]
    pub fn is(&self, namespace: &str, local: &str) -> bool {
        self.name.is(namespace, local)
    }
}

// ============================================================================
// Documents
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DocumentType {
    Schema,
    Linkbase,
    Instance,
    InlineInstance,
    Other,
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Schema => "schema",
            Self::Linkbase => "linkbase",
            Self::Instance => "instance",
            Self::InlineInstance => "inline instance",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReferenceKind {
    Import,
    Include,
    LinkbaseRef,
    Href,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Import => "import",
            Self::Include => "include",
            Self::LinkbaseRef => "linkbaseRef",
            Self::Href => "href",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct DocumentReference {
    /// Canonical, fragment-free URL.
    pub url: String,
    pub kind: ReferenceKind,
    pub element: ElementId,
}

/// A reference whose URL could not be canonicalized.
#[derive(Debug, Clone)]
pub struct BadReference {
    pub element: ElementId,
    pub href: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct Document {
    pub id: DocId,
    pub url: String,
    pub doc_type: DocumentType,
    pub target_namespace: Option<String>,
    pub in_dts: bool,
    pub references: Vec<DocumentReference>,
    pub bad_references: Vec<BadReference>,
    pub duplicate_ids: Vec<(CompactString, ElementId)>,
    pub(crate) elements: Vec<Element>,
    pub(crate) root: ElementId,
    pub(crate) ids: AHashMap<CompactString, ElementId>,
}

impl Document {
    #[inline]
    pub fn root(&self) -> ElementId {
        self.root
    }

    #[inline]
    pub fn element(&self, id: ElementId) -> &Element {
        &self.elements[id.index()]
    }

    pub fn root_element(&self) -> &Element {
        self.element(self.root)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// All elements in document order.
    pub fn elements(&self) -> impl Iterator<Item = (ElementId, &Element)> {
        self.elements
            .iter()
            .enumerate()
            .map(|(i, e)| (ElementId(i as u32), e))
    }

    pub fn by_id(&self, id: &str) -> Option<ElementId> {
        self.ids.get(id).copied()
    }

    pub fn children(&self, id: ElementId) -> impl Iterator<Item = (ElementId, &Element)> {
        self.element(id)
            .children
            .iter()
            .map(move |&c| (c, self.element(c)))
    }

    /// Descendants of `id` in document order, excluding `id` itself.
    pub fn descendants(&self, id: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut stack: Vec<ElementId> = self.element(id).children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.element(next).children.iter().rev().copied());
        }
        out
    }

    pub fn is_ancestor(&self, ancestor: ElementId, descendant: ElementId) -> bool {
        let mut current = self.element(descendant).parent;
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.element(parent).parent;
        }
        false
    }

    pub fn node(&self, element: ElementId) -> NodeRef {
        NodeRef::new(self.id, element)
    }

    pub fn resolve_prefix(&self, element: ElementId, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_NS);
        }
        let mut current = Some(element);
        while let Some(id) = current {
            let el = self.element(id);
            if let Some((_, uri)) = el.namespaces.iter().find(|(p, _)| *p == prefix) {
                return Some(uri.as_str());
            }
            current = el.parent;
        }
        None
    }

    /// Resolve a `prefix:local` lexical QName in the scope of `element`.
    pub fn resolve_qname(&self, element: ElementId, text: &str) -> Option<QName> {
        let text = text.trim();
        let (prefix, local) = match text.split_once(':') {
            Some((p, l)) => (p, l),
            None => ("", text),
        };
        if local.is_empty() {
            return None;
        }
        let namespace = match self.resolve_prefix(element, prefix) {
            Some(ns) => ns,
            None if prefix.is_empty() => "",
            None => return None,
        };
        Some(QName::new(namespace, local).with_prefix(prefix))
    }

    /// Prefix bound to `namespace` on the root element, used for display.
    pub fn prefix_for(&self, namespace: &str) -> Option<&str> {
        self.root_element()
            .namespaces
            .iter()
            .find(|(p, uri)| *uri == namespace && !p.is_empty())
            .map(|(p, _)| p.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qname_equality_ignores_prefix() {
        let a = QName::new(LINK_NS, "loc").with_prefix("link");
        let b = QName::new(LINK_NS, "loc");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "link:loc");
        assert_eq!(b.to_string(), "{http://www.xbrl.org/2003/linkbase}loc");
    }

    #[test]
    fn test_xlink_type_parse() {
        assert_eq!(XLinkType::parse("arc"), Some(XLinkType::Arc));
        assert_eq!(XLinkType::parse("Arc"), None);
    }
}
