// Role and arcrole validation, declaration registry
use crate::diagnostics::{codes, Diagnostic, ErrorKind, ObjectRef};
use crate::model::*;
use crate::uri;
use ahash::{AHashMap, AHashSet};
use serde::Serialize;
use std::fmt;

pub const STANDARD_ROLE_NS: &str = "http://www.xbrl.org/2003/role/";
pub const STANDARD_ARCROLE_NS: &str = "http://www.xbrl.org/2003/arcrole/";
pub const LINKBASE_ARCROLE: &str = "http://www.w3.org/1999/xlink/properties/linkbase";

macro_rules! role {
    ($name:literal) => {
        concat!("http://www.xbrl.org/2003/role/", $name)
    };
}

macro_rules! arcrole {
    ($name:literal) => {
        concat!("http://www.xbrl.org/2003/arcrole/", $name)
    };
}

pub const LINK_ROLE: &str = role!("link");
pub const SUMMATION_ITEM: &str = arcrole!("summation-item");
pub const PARENT_CHILD: &str = arcrole!("parent-child");
pub const GENERAL_SPECIAL: &str = arcrole!("general-special");
pub const ESSENCE_ALIAS: &str = arcrole!("essence-alias");

const LABEL_ROLES: &[&str] = &[
    role!("label"),
    role!("terseLabel"),
    role!("verboseLabel"),
    role!("positiveLabel"),
    role!("positiveTerseLabel"),
    role!("positiveVerboseLabel"),
    role!("negativeLabel"),
    role!("negativeTerseLabel"),
    role!("negativeVerboseLabel"),
    role!("zeroLabel"),
    role!("zeroTerseLabel"),
    role!("zeroVerboseLabel"),
    role!("totalLabel"),
    role!("periodStartLabel"),
    role!("periodEndLabel"),
    role!("documentation"),
    role!("definitionGuidance"),
    role!("disclosureGuidance"),
    role!("presentationGuidance"),
    role!("measurementGuidance"),
    role!("commentaryGuidance"),
    role!("exampleGuidance"),
];

const REFERENCE_ROLES: &[&str] = &[
    role!("reference"),
    role!("definitionRef"),
    role!("disclosureRef"),
    role!("mandatoryDisclosureRef"),
    role!("recommendedDisclosureRef"),
    role!("unspecifiedDisclosureRef"),
    role!("presentationRef"),
    role!("measurementRef"),
    role!("commentaryRef"),
    role!("exampleRef"),
];

const FOOTNOTE_ROLES: &[&str] = &[role!("footnote")];
const EXTENDED_LINK_ROLES: &[&str] = &[LINK_ROLE];
const LINKBASE_REF_ROLES: &[&str] = &[
    role!("calculationLinkbaseRef"),
    role!("definitionLinkbaseRef"),
    role!("labelLinkbaseRef"),
    role!("presentationLinkbaseRef"),
    role!("referenceLinkbaseRef"),
];
const LOC_ROLES: &[&str] = &[];

const PRESENTATION_ARCROLES: &[&str] = &[PARENT_CHILD];
const CALCULATION_ARCROLES: &[&str] = &[SUMMATION_ITEM];
const DEFINITION_ARCROLES: &[&str] = &[
    GENERAL_SPECIAL,
    ESSENCE_ALIAS,
    arcrole!("similar-tuples"),
    arcrole!("requires-element"),
];
const LABEL_ARCROLES: &[&str] = &[arcrole!("concept-label")];
const REFERENCE_ARCROLES: &[&str] = &[arcrole!("concept-reference")];
const FOOTNOTE_ARCROLES: &[&str] = &[arcrole!("fact-footnote")];

/// Standard roles permitted on `el`.
pub fn standard_roles_for(el: &Element) -> &'static [&'static str] {
    match (el.name.namespace.as_str(), el.name.local.as_str()) {
        (LINK_NS | GEN_LABEL_NS, "label") => LABEL_ROLES,
        (LINK_NS | GEN_REFERENCE_NS, "reference") => REFERENCE_ROLES,
        (LINK_NS, "footnote") => FOOTNOTE_ROLES,
        (LINK_NS, "linkbaseRef") => LINKBASE_REF_ROLES,
        (LINK_NS, "loc") => LOC_ROLES,
        _ if el.xlink_type() == Some(XLinkType::Extended) => EXTENDED_LINK_ROLES,
        _ => &[],
    }
}

/// Standard arcroles permitted on the arc element `el`.
pub fn standard_arcroles_for(el: &Element) -> &'static [&'static str] {
    if el.name.namespace != LINK_NS {
        return &[];
    }
    match el.name.local.as_str() {
        "presentationArc" => PRESENTATION_ARCROLES,
        "calculationArc" => CALCULATION_ARCROLES,
        "definitionArc" => DEFINITION_ARCROLES,
        "labelArc" => LABEL_ARCROLES,
        "referenceArc" => REFERENCE_ARCROLES,
        "footnoteArc" => FOOTNOTE_ARCROLES,
        _ => &[],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CyclesAllowed {
    Any,
    Undirected,
    None,
}

impl CyclesAllowed {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "any" => Some(Self::Any),
            "undirected" => Some(Self::Undirected),
            "none" => Some(Self::None),
            _ => None,
        }
    }

    fn standard(arcrole: &str) -> Option<Self> {
        match arcrole {
            PARENT_CHILD | GENERAL_SPECIAL | ESSENCE_ALIAS => Some(Self::Undirected),
            _ if arcrole.starts_with(STANDARD_ARCROLE_NS) => Some(Self::Any),
            _ => None,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RoleAttr {
    Role,
    Arcrole,
}

impl fmt::Display for RoleAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Role => "role",
            Self::Arcrole => "arcrole",
        })
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RoleError {
    #[error("empty {attr} on {element}")]
    EmptyRole { attr: RoleAttr, element: String },

    #[error("{attr} \"{uri}\" on {element} is not an absolute URI")]
    RoleNotAbsolute { attr: RoleAttr, uri: String, element: String },

    #[error("standard {attr} {uri} is not defined for {element}")]
    StandardRoleNotDefinedForElement { attr: RoleAttr, uri: String, element: String },

    #[error("{attr} {uri} on {element} has no {attr}Ref in this document")]
    MissingRoleRef { attr: RoleAttr, uri: String, element: String },

    #[error("{attr} {uri} on {element} is not declared in the DTS")]
    UndeclaredRole { attr: RoleAttr, uri: String, element: String },

    #[error("{attr} {uri} is not declared for use on {element} (usedOn: {used_on})")]
    UsedOnMismatch {
        attr: RoleAttr,
        uri: String,
        element: String,
        used_on: String,
    },
}

impl RoleError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyRole { .. } => codes::EMPTY_ROLE,
            Self::RoleNotAbsolute { .. } => codes::ROLE_NOT_ABSOLUTE,
            Self::StandardRoleNotDefinedForElement { .. } => codes::STANDARD_ROLE_NOT_DEFINED,
            Self::MissingRoleRef { .. } => codes::MISSING_ROLE_REF,
            Self::UndeclaredRole { .. } => codes::UNDECLARED_ROLE,
            Self::UsedOnMismatch { .. } => codes::USED_ON_MISMATCH,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let d = |template: &'static str| Diagnostic::error(ErrorKind::Role, self.code(), template);
        match self {
            Self::EmptyRole { attr, element } => d("Empty {attr} on {element}")
                .arg("attr", attr)
                .arg("element", element),
            Self::RoleNotAbsolute { attr, uri, element } => {
                d("The {attr} \"{uri}\" on {element} is not an absolute URI")
                    .arg("attr", attr)
                    .arg("uri", uri)
                    .arg("element", element)
            }
            Self::StandardRoleNotDefinedForElement { attr, uri, element } => {
                d("Standard {attr} {uri} is not defined for {element}")
                    .arg("attr", attr)
                    .arg("uri", uri)
                    .arg("element", element)
            }
            Self::MissingRoleRef { attr, uri, element } => {
                d("The {attr} {uri} on {element} has no {attr}Ref in this document")
                    .arg("attr", attr)
                    .arg("uri", uri)
                    .arg("element", element)
            }
            Self::UndeclaredRole { attr, uri, element } => {
                d("The {attr} {uri} on {element} is not declared in the DTS")
                    .arg("attr", attr)
                    .arg("uri", uri)
                    .arg("element", element)
            }
            Self::UsedOnMismatch { attr, uri, element, used_on } => {
                d("The {attr} {uri} is not declared for use on {element} (usedOn: {usedOn})")
                    .arg("attr", attr)
                    .arg("uri", uri)
                    .arg("element", element)
                    .arg("usedOn", used_on)
            }
        }
    }
}

// ============================================================================
// Declarations
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct RoleDeclaration {
    pub uri: String,
    pub node: NodeRef,
    pub used_on: Vec<QName>,
    pub definition: Option<String>,
    pub cycles_allowed: Option<CyclesAllowed>,
    pub object: ObjectRef,
    /// Structural signature used for s-equality.
    #[serde(skip)]
    signature: String,
}

impl RoleDeclaration {
    /// Build from a `link:roleType` or `link:arcroleType` element.
    pub fn from_element(doc: &Document, element: ElementId) -> Option<(RoleAttr, Self)> {
        let el = doc.element(element);
        let (attr, uri) = if el.is(LINK_NS, "roleType") {
            (RoleAttr::Role, el.attr_local("roleURI")?)
        } else if el.is(LINK_NS, "arcroleType") {
            (RoleAttr::Arcrole, el.attr_local("arcroleURI")?)
        } else {
            return None;
        };

        let mut used_on = Vec::new();
        let mut definition = None;
        for (child_id, child) in doc.children(element) {
            if child.is(LINK_NS, "usedOn") {
                if let Some(qname) = doc.resolve_qname(child_id, &child.text) {
                    used_on.push(qname);
                }
            } else if child.is(LINK_NS, "definition") {
                definition = Some(child.text.trim().to_string());
            }
        }

        Some((
            attr,
            Self {
                uri: uri.trim().to_string(),
                node: doc.node(element),
                used_on,
                definition,
                cycles_allowed: el.attr_local("cyclesAllowed").and_then(CyclesAllowed::parse),
                object: ObjectRef::new(doc, element),
                signature: signature(doc, element),
            },
        ))
    }

    pub fn s_equal(&self, other: &Self) -> bool {
        self.signature == other.signature
    }

    pub fn allows(&self, element: &QName) -> bool {
        self.used_on.is_empty() || self.used_on.contains(element)
    }
}

/// Prefix-independent structural signature of an element subtree; two
/// subtrees are s-equal exactly when their signatures match. `id`
/// attributes do not participate.
fn signature(doc: &Document, element: ElementId) -> String {
    let mut out = String::new();
    let mut stack = vec![(element, false)];
    while let Some((id, closing)) = stack.pop() {
        if closing {
            out.push(')');
            continue;
        }
        let el = doc.element(id);
        out.push_str(&el.name.clark());
        let mut attrs: Vec<String> = el
            .attributes
            .iter()
            .filter(|a| !(a.name.namespace.is_empty() && a.name.local == "id"))
            .map(|a| format!("{}={:?}", a.name.clark(), a.value))
            .collect();
        attrs.sort();
        out.push('[');
        out.push_str(&attrs.join(","));
        out.push(']');
        let text = el.text.trim();
        if el.is(LINK_NS, "usedOn") {
            match doc.resolve_qname(id, text) {
                Some(q) => out.push_str(&q.clark()),
                None => out.push_str(text),
            }
        } else {
            out.push_str(&format!("{:?}", text));
        }
        out.push('(');
        stack.push((id, true));
        for &child in el.children.iter().rev() {
            stack.push((child, false));
        }
    }
    out
}

/// DTS-wide role and arcrole declarations plus usage counts.
#[derive(Debug, Default)]
pub struct RoleRegistry {
    roles: AHashMap<String, Vec<RoleDeclaration>>,
    arcroles: AHashMap<String, Vec<RoleDeclaration>>,
    mentions: AHashMap<String, usize>,
}

impl RoleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the declaration at `element`, reporting problems with it.
    pub fn register(&mut self, doc: &Document, element: ElementId) -> Vec<Diagnostic> {
        let mut problems = Vec::new();
        let (attr, decl) = match RoleDeclaration::from_element(doc, element) {
            Some(found) => found,
            None => return problems,
        };

        if !uri::is_absolute_uri(&decl.uri) {
            problems.push(
                RoleError::RoleNotAbsolute {
                    attr,
                    uri: decl.uri.clone(),
                    element: doc.element(element).name.to_string(),
                }
                .to_diagnostic()
                .object(decl.object.clone()),
            );
        }

        let mut seen: Vec<&QName> = Vec::new();
        for q in &decl.used_on {
            if seen.contains(&q) {
                problems.push(
                    Diagnostic::error(
                        ErrorKind::Role,
                        codes::DUPLICATE_USED_ON,
                        "The {attr}Type {uri} lists usedOn {usedOn} more than once",
                    )
                    .arg("attr", attr)
                    .arg("uri", &decl.uri)
                    .arg("usedOn", q)
                    .object(decl.object.clone()),
                );
            }
            seen.push(q);
        }

        let (table, code) = match attr {
            RoleAttr::Role => (&mut self.roles, codes::DUPLICATE_ROLE_TYPE),
            RoleAttr::Arcrole => (&mut self.arcroles, codes::DUPLICATE_ARCROLE_TYPE),
        };
        let existing = table.entry(decl.uri.clone()).or_default();
        if let Some(first) = existing.first() {
            let same_document = existing.iter().any(|d| d.node.doc == decl.node.doc);
            if same_document || !first.s_equal(&decl) {
                let reason = if same_document {
                    "declared more than once in one document"
                } else {
                    "declarations are not s-equal"
                };
                problems.push(
                    Diagnostic::error(
                        ErrorKind::DuplicateDeclaration,
                        code,
                        "The {attr}Type {uri} is declared more than once: {reason}",
                    )
                    .arg("attr", attr)
                    .arg("uri", &decl.uri)
                    .arg("reason", reason)
                    .object(decl.object.clone())
                    .object(first.object.clone()),
                );
            }
        }
        existing.push(decl);
        problems
    }

    pub fn role_type(&self, uri: &str) -> Option<&RoleDeclaration> {
        self.roles.get(uri).and_then(|v| v.first())
    }

    pub fn arcrole_type(&self, uri: &str) -> Option<&RoleDeclaration> {
        self.arcroles.get(uri).and_then(|v| v.first())
    }

    pub fn declarations(&self, attr: RoleAttr, uri: &str) -> &[RoleDeclaration] {
        let table = match attr {
            RoleAttr::Role => &self.roles,
            RoleAttr::Arcrole => &self.arcroles,
        };
        table.get(uri).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn role_uris(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }

    pub fn record_use(&mut self, uri: &str) {
        *self.mentions.entry(uri.to_string()).or_insert(0) += 1;
    }

    pub fn mentions(&self, uri: &str) -> usize {
        self.mentions.get(uri).copied().unwrap_or(0)
    }

    /// Cycle constraint for an arcrole: standard table first, then the
    /// declared arcroleType, otherwise unconstrained.
    pub fn cycles_allowed(&self, arcrole: &str) -> CyclesAllowed {
        CyclesAllowed::standard(arcrole)
            .or_else(|| self.arcrole_type(arcrole).and_then(|d| d.cycles_allowed))
            .unwrap_or(CyclesAllowed::Any)
    }
}

// ============================================================================
// Validation
// ============================================================================

/// roleRef/arcroleRef URIs visible in one document.
#[derive(Debug, Default, Clone)]
pub struct RefScope {
    roles: AHashSet<String>,
    arcroles: AHashSet<String>,
    /// Refs repeating a URI already referenced in the document.
    pub duplicates: Vec<(RoleAttr, ElementId)>,
    /// Every ref element with the URI it names.
    pub refs: Vec<(RoleAttr, ElementId, String)>,
}

impl RefScope {
    pub fn collect(doc: &Document) -> Self {
        let mut scope = Self::default();
        for (id, el) in doc.elements() {
            let (attr, uri) = if el.is(LINK_NS, "roleRef") {
                (RoleAttr::Role, el.attr_local("roleURI"))
            } else if el.is(LINK_NS, "arcroleRef") {
                (RoleAttr::Arcrole, el.attr_local("arcroleURI"))
            } else {
                continue;
            };
            let uri = match uri {
                Some(uri) => uri.trim().to_string(),
                None => continue,
            };
            let set = match attr {
                RoleAttr::Role => &mut scope.roles,
                RoleAttr::Arcrole => &mut scope.arcroles,
            };
            if !set.insert(uri.clone()) {
                scope.duplicates.push((attr, id));
            }
            scope.refs.push((attr, id, uri));
        }
        scope
    }

    pub fn contains(&self, attr: RoleAttr, uri: &str) -> bool {
        match attr {
            RoleAttr::Role => self.roles.contains(uri),
            RoleAttr::Arcrole => self.arcroles.contains(uri),
        }
    }
}

/// Validate `xlink:role` on `element`.
pub fn validate_role(
    registry: &mut RoleRegistry,
    scope: &RefScope,
    doc: &Document,
    element: ElementId,
) -> Result<(), RoleError> {
    let el = doc.element(element);
    let xtype = el.xlink_type();
    let standard_extended = xtype == Some(XLinkType::Extended) && el.name.namespace == LINK_NS;
    let empty = || RoleError::EmptyRole {
        attr: RoleAttr::Role,
        element: el.name.to_string(),
    };

    match el.xlink("role") {
        None if standard_extended => Err(empty()),
        None => Ok(()),
        Some(role) if role.trim().is_empty() => {
            if standard_extended || matches!(xtype, Some(XLinkType::Simple) | Some(XLinkType::Resource)) {
                Err(empty())
            } else {
                Err(RoleError::RoleNotAbsolute {
                    attr: RoleAttr::Role,
                    uri: role.to_string(),
                    element: el.name.to_string(),
                })
            }
        }
        Some(role) => check_uri(registry, scope, RoleAttr::Role, role, el, standard_roles_for(el)),
    }
}

/// Validate `xlink:arcrole` on the arc `element`.
pub fn validate_arcrole(
    registry: &mut RoleRegistry,
    scope: &RefScope,
    doc: &Document,
    element: ElementId,
) -> Result<(), RoleError> {
    let el = doc.element(element);
    match el.xlink("arcrole") {
        Some(arcrole) if !arcrole.trim().is_empty() => check_uri(
            registry,
            scope,
            RoleAttr::Arcrole,
            arcrole,
            el,
            standard_arcroles_for(el),
        ),
        _ => Err(RoleError::EmptyRole {
            attr: RoleAttr::Arcrole,
            element: el.name.to_string(),
        }),
    }
}

fn check_uri(
    registry: &mut RoleRegistry,
    scope: &RefScope,
    attr: RoleAttr,
    uri: &str,
    el: &Element,
    standard: &[&str],
) -> Result<(), RoleError> {
    let uri = uri.trim();
    let element = el.name.to_string();
    if !uri::is_absolute_uri(uri) {
        return Err(RoleError::RoleNotAbsolute {
            attr,
            uri: uri.to_string(),
            element,
        });
    }

    let standard_ns = match attr {
        RoleAttr::Role => STANDARD_ROLE_NS,
        RoleAttr::Arcrole => STANDARD_ARCROLE_NS,
    };
    if uri.starts_with(standard_ns) {
        if standard.contains(&uri) {
            return Ok(());
        }
        return Err(RoleError::StandardRoleNotDefinedForElement {
            attr,
            uri: uri.to_string(),
            element,
        });
    }

    registry.record_use(uri);
    if !scope.contains(attr, uri) {
        return Err(RoleError::MissingRoleRef {
            attr,
            uri: uri.to_string(),
            element,
        });
    }
    let declarations = registry.declarations(attr, uri);
    if declarations.is_empty() {
        return Err(RoleError::UndeclaredRole {
            attr,
            uri: uri.to_string(),
            element,
        });
    }
    if !declarations.iter().any(|d| d.allows(&el.name)) {
        let used_on = declarations
            .iter()
            .flat_map(|d| d.used_on.iter().map(|q| q.to_string()))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(RoleError::UsedOnMismatch {
            attr,
            uri: uri.to_string(),
            element,
            used_on,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_document;
    use pretty_assertions::assert_eq;

    const SCHEMA: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
    xmlns:link="http://www.xbrl.org/2003/linkbase" targetNamespace="http://example.com/ex">
  <xs:annotation><xs:appinfo>
    <link:roleType roleURI="http://example.com/role/Sheet" id="Sheet">
      <link:definition>Sheet</link:definition>
      <link:usedOn>link:presentationLink</link:usedOn>
    </link:roleType>
    <link:arcroleType arcroleURI="http://example.com/arcrole/dep" cyclesAllowed="none" id="dep">
      <link:usedOn>link:definitionArc</link:usedOn>
    </link:arcroleType>
  </xs:appinfo></xs:annotation>
</xs:schema>"#;

    const LINKBASE: &str = r#"<link:linkbase xmlns:link="http://www.xbrl.org/2003/linkbase"
    xmlns:xlink="http://www.w3.org/1999/xlink">
  <link:roleRef roleURI="http://example.com/role/Sheet" xlink:type="simple" xlink:href="ex.xsd#Sheet"/>
  <link:presentationLink xlink:type="extended" xlink:role="http://example.com/role/Sheet"/>
  <link:calculationLink xlink:type="extended" xlink:role="http://example.com/role/Sheet"/>
  <link:definitionLink xlink:type="extended" xlink:role="http://example.com/role/Other"/>
  <link:labelLink xlink:type="extended" xlink:role="http://www.xbrl.org/2003/role/label"/>
  <link:referenceLink xlink:type="extended"/>
  <link:footnoteLink xlink:type="extended" xlink:role="role/relative"/>
</link:linkbase>"#;

    fn setup() -> (RoleRegistry, Document, Document) {
        let schema = parse_document(DocId(0), "http://example.com/ex.xsd", SCHEMA.as_bytes()).unwrap();
        let linkbase = parse_document(DocId(1), "http://example.com/lb.xml", LINKBASE.as_bytes()).unwrap();
        let mut registry = RoleRegistry::new();
        for (id, _) in schema.elements() {
            assert!(registry.register(&schema, id).is_empty());
        }
        (registry, schema, linkbase)
    }

    fn link(doc: &Document, local: &str) -> ElementId {
        doc.elements()
            .find(|(_, e)| e.is(LINK_NS, local))
            .map(|(id, _)| id)
            .unwrap()
    }

    #[test]
    fn test_used_on_match_and_mismatch() {
        let (mut registry, _, lb) = setup();
        let scope = RefScope::collect(&lb);
        assert_eq!(validate_role(&mut registry, &scope, &lb, link(&lb, "presentationLink")), Ok(()));
        let err = validate_role(&mut registry, &scope, &lb, link(&lb, "calculationLink")).unwrap_err();
        assert_eq!(err.code(), codes::USED_ON_MISMATCH);
        assert_eq!(registry.mentions("http://example.com/role/Sheet"), 2);
    }

    #[test]
    fn test_missing_role_ref() {
        let (mut registry, _, lb) = setup();
        let scope = RefScope::collect(&lb);
        let err = validate_role(&mut registry, &scope, &lb, link(&lb, "definitionLink")).unwrap_err();
        assert!(matches!(err, RoleError::MissingRoleRef { .. }));
    }

    #[test]
    fn test_standard_role_allow_list() {
        let (mut registry, _, lb) = setup();
        let scope = RefScope::collect(&lb);
        let err = validate_role(&mut registry, &scope, &lb, link(&lb, "labelLink")).unwrap_err();
        assert!(matches!(err, RoleError::StandardRoleNotDefinedForElement { .. }));
    }

    #[test]
    fn test_empty_and_relative_roles() {
        let (mut registry, _, lb) = setup();
        let scope = RefScope::collect(&lb);
        let err = validate_role(&mut registry, &scope, &lb, link(&lb, "referenceLink")).unwrap_err();
        assert!(matches!(err, RoleError::EmptyRole { attr: RoleAttr::Role, .. }));
        let err = validate_role(&mut registry, &scope, &lb, link(&lb, "footnoteLink")).unwrap_err();
        assert!(matches!(err, RoleError::RoleNotAbsolute { .. }));
    }

    #[test]
    fn test_cycles_allowed_lookup() {
        let (registry, _, _) = setup();
        assert_eq!(registry.cycles_allowed("http://example.com/arcrole/dep"), CyclesAllowed::None);
        assert_eq!(registry.cycles_allowed(PARENT_CHILD), CyclesAllowed::Undirected);
        assert_eq!(registry.cycles_allowed(SUMMATION_ITEM), CyclesAllowed::Any);
        assert_eq!(registry.cycles_allowed("http://example.com/unknown"), CyclesAllowed::Any);
    }

    #[test]
    fn test_duplicate_declarations() {
        let (mut registry, _, _) = setup();
        // Same structure, different prefix for usedOn: s-equal
        let same = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:lb="http://www.xbrl.org/2003/linkbase">
  <lb:roleType roleURI="http://example.com/role/Sheet" id="Other">
    <lb:definition>Sheet</lb:definition>
    <lb:usedOn>lb:presentationLink</lb:usedOn>
  </lb:roleType>
</xs:schema>"#;
        let doc = parse_document(DocId(2), "http://example.com/same.xsd", same.as_bytes()).unwrap();
        let role_type = link(&doc, "roleType");
        assert!(registry.register(&doc, role_type).is_empty());

        let different = same.replace("<lb:definition>Sheet</lb:definition>", "<lb:definition>Other</lb:definition>");
        let doc = parse_document(DocId(3), "http://example.com/diff.xsd", different.as_bytes()).unwrap();
        let problems = registry.register(&doc, link(&doc, "roleType"));
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].code, codes::DUPLICATE_ROLE_TYPE);
        assert_eq!(problems[0].kind, ErrorKind::DuplicateDeclaration);
        assert_eq!(problems[0].objects.len(), 2);
    }
}
