// Structured diagnostics: the validator's only output channel
use crate::model::{Document, ElementId};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

pub mod codes {
    // Structural
    pub const DOCUMENT_NOT_FOUND: &str = "dts:documentNotFound";
    pub const PARSE_ERROR: &str = "dts:parseError";
    pub const DUPLICATE_ID: &str = "dts:duplicateId";
    pub const EMBEDDED_LINKBASE: &str = "dts:embeddedLinkbase";
    pub const INCLUDE_OUTSIDE_NAMESPACE: &str = "dts:includeOutsideNamespace";
    pub const TARGET_NAMESPACE_NOT_ABSOLUTE: &str = "dts:targetNamespaceNotAbsolute";
    pub const TARGET_NAMESPACE_AUTHORITY: &str = "dts:targetNamespaceAuthority";
    pub const INVALID_ARC_ATTRIBUTE: &str = "dts:invalidArcAttribute";
    pub const DOCUMENT_LIMIT: &str = "dts:documentLimit";
    pub const DEPTH_LIMIT: &str = "dts:depthLimit";
    // Reference
    pub const TARGET_ID_NOT_FOUND: &str = "dts:targetIdNotFound";
    pub const UNSUPPORTED_XPOINTER_SCHEME: &str = "dts:unsupportedXpointerScheme";
    pub const MALFORMED_XPOINTER: &str = "dts:malformedXpointer";
    pub const ELEMENT_POINTER_NOT_FOUND: &str = "dts:elementPointerNotFound";
    pub const WRONG_TARGET_TYPE: &str = "dts:wrongTargetType";
    pub const INVALID_HREF: &str = "dts:invalidHref";
    pub const LABEL_NOT_FOUND: &str = "dts:arcLabelNotFound";
    pub const LINKBASE_REF_ARCROLE: &str = "dts:linkbaseRefArcrole";
    pub const DUPLICATE_ROLE_REF: &str = "dts:duplicateRoleRef";
    pub const ROLE_REF_MISMATCH: &str = "dts:roleRefMismatch";
    // Role
    pub const EMPTY_ROLE: &str = "dts:emptyRole";
    pub const ROLE_NOT_ABSOLUTE: &str = "dts:roleNotAbsolute";
    pub const STANDARD_ROLE_NOT_DEFINED: &str = "dts:standardRoleNotDefinedForElement";
    pub const MISSING_ROLE_REF: &str = "dts:missingRoleRef";
    pub const UNDECLARED_ROLE: &str = "dts:undeclaredRole";
    pub const USED_ON_MISMATCH: &str = "dts:usedOnMismatch";
    pub const DUPLICATE_USED_ON: &str = "dts:duplicateUsedOn";
    // Duplicate declarations
    pub const DUPLICATE_ROLE_TYPE: &str = "dts:duplicateRoleType";
    pub const DUPLICATE_ARCROLE_TYPE: &str = "dts:duplicateArcroleType";
    // Relationships and cycles
    pub const DUPLICATE_ORDER: &str = "dts:duplicateOrder";
    pub const CALCULATION_CYCLE: &str = "dts:calculationCycle";
    pub const DIRECTED_CYCLE: &str = "dts:directedCycle";
    pub const TUPLE_CYCLE: &str = "dts:tupleCycle";
    // Continuations
    pub const CONTINUATION_TARGET: &str = "dts:continuationTarget";
    pub const CONTINUATION_NOT_CONTINUATION: &str = "dts:continuationNotContinuation";
    pub const CONTINUATION_CIRCULAR: &str = "dts:continuationCircular";
    pub const CONTINUATION_NESTED: &str = "dts:continuationNested";
    pub const CONTINUATION_REUSED: &str = "dts:continuationReused";
    pub const CONTINUATION_UNREFERENCED: &str = "dts:continuationUnreferenced";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    Structural,
    Reference,
    Role,
    DuplicateDeclaration,
    Cycle,
    Continuation,
}

/// Location of a model object implicated by a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectRef {
    pub document: String,
    pub element: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub line: u32,
}

impl ObjectRef {
    pub fn new(doc: &Document, element: ElementId) -> Self {
        let el = doc.element(element);
        Self {
            document: doc.url.clone(),
            element: el.name.to_string(),
            id: el.id().map(str::to_string),
            line: el.line,
        }
    }

    pub fn document(doc: &Document) -> Self {
        Self::new(doc, doc.root())
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} <{}", self.document, self.line, self.element)?;
        if let Some(id) = &self.id {
            write!(f, " id=\"{}\"", id)?;
        }
        f.write_str(">")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub code: CompactString,
    pub severity: Severity,
    pub kind: ErrorKind,
    /// Message with `{name}` placeholders filled from `args`.
    pub template: Cow<'static, str>,
    pub args: Vec<(CompactString, String)>,
    pub objects: Vec<ObjectRef>,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        kind: ErrorKind,
        code: &str,
        template: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            code: CompactString::from(code),
            severity,
            kind,
            template: template.into(),
            args: Vec::new(),
            objects: Vec::new(),
        }
    }

    pub fn error(kind: ErrorKind, code: &str, template: impl Into<Cow<'static, str>>) -> Self {
        Self::new(Severity::Error, kind, code, template)
    }

    pub fn warning(kind: ErrorKind, code: &str, template: impl Into<Cow<'static, str>>) -> Self {
        Self::new(Severity::Warning, kind, code, template)
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn arg(mut self, name: &str, value: impl fmt::Display) -> Self {
        self.args.push((CompactString::from(name), value.to_string()));
        self
    }

    pub fn object(mut self, object: ObjectRef) -> Self {
        self.objects.push(object);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn message(&self) -> String {
        let mut out = String::with_capacity(self.template.len());
        let mut rest = self.template.as_ref();
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) => {
                    let name = &after[..close];
                    match self.get(name) {
                        Some(value) => out.push_str(value),
                        None => {
                            out.push('{');
                            out.push_str(name);
                            out.push('}');
                        }
                    }
                    rest = &after[close + 1..];
                }
                None => {
                    out.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message())?;
        if let Some(first) = self.objects.first() {
            write!(f, " at {}", first)?;
        }
        Ok(())
    }
}

pub trait DiagnosticSink {
    fn emit(&mut self, diagnostic: Diagnostic);
}

/// Collecting sink; every record is also logged through `tracing`.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Diagnostics {
    records: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.records.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.records.iter().filter(|d| d.severity == Severity::Warning)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn with_code<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a Diagnostic> + 'a {
        self.records.iter().filter(move |d| d.code == code)
    }

    pub fn count(&self, code: &str) -> usize {
        self.with_code(code).count()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.records
    }
}

impl DiagnosticSink for Diagnostics {
    fn emit(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => tracing::error!(code = %diagnostic.code, "{}", diagnostic.message()),
            Severity::Warning => tracing::warn!(code = %diagnostic.code, "{}", diagnostic.message()),
            Severity::Info => tracing::info!(code = %diagnostic.code, "{}", diagnostic.message()),
        }
        self.records.push(diagnostic);
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_template() {
        let d = Diagnostic::error(ErrorKind::Role, codes::MISSING_ROLE_REF, "Role {role} used on {element} has no roleRef")
            .arg("role", "http://example.com/role/x")
            .arg("element", "link:presentationLink");
        assert_eq!(
            d.message(),
            "Role http://example.com/role/x used on link:presentationLink has no roleRef"
        );
    }

    #[test]
    fn test_named_arg_lookup() {
        let d = Diagnostic::error(ErrorKind::Role, codes::USED_ON_MISMATCH, "{element}")
            .arg("element", "link:definitionLink")
            .arg("uri", "http://example.com/role/x");
        assert_eq!(d.get("element"), Some("link:definitionLink"));
        assert_eq!(d.get("uri"), Some("http://example.com/role/x"));
        assert_eq!(d.get("usedOn"), None);
    }

    #[test]
    fn test_unknown_placeholder_kept() {
        let d = Diagnostic::warning(ErrorKind::Structural, "x", "value {missing} {");
        assert_eq!(d.message(), "value {missing} {");
    }

    #[test]
    fn test_collector_filters() {
        let mut sink = Diagnostics::new();
        sink.emit(Diagnostic::error(ErrorKind::Cycle, codes::CALCULATION_CYCLE, "cycle"));
        sink.emit(Diagnostic::warning(ErrorKind::Structural, codes::DUPLICATE_ID, "dup"));
        assert!(sink.has_errors());
        assert_eq!(sink.warnings().count(), 1);
        assert_eq!(sink.count(codes::CALCULATION_CYCLE), 1);
    }
}
