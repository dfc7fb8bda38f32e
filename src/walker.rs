// DTS discovery and per-document checks
use crate::config::{ValidationConfig, ValidationFlags};
use crate::diagnostics::{codes, Diagnostic, DiagnosticSink, ErrorKind, ObjectRef};
use crate::dts::Dts;
use crate::hooks::OnDocumentVisited;
use crate::href::{check_locator_target, resolve_href, ReferenceError};
use crate::model::*;
use crate::registry::{DocumentRegistry, LoadError};
use crate::relationships::{ArcRecord, ArcUse, BaseSetKey};
use crate::roles::{self, RefScope, RoleAttr, RoleRegistry, LINKBASE_ARCROLE, LINK_ROLE};
use crate::rules::RulePack;
use crate::uri;
use ahash::AHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Visiting,
    Visited,
}

struct Frame {
    doc: DocId,
    next: usize,
    depth: usize,
}

pub(crate) struct Walker<'a> {
    dts: &'a mut Dts,
    config: &'a ValidationConfig,
    hooks: &'a [Box<dyn OnDocumentVisited>],
    sink: &'a mut dyn DiagnosticSink,
}

impl<'a> Walker<'a> {
    pub fn new(
        dts: &'a mut Dts,
        config: &'a ValidationConfig,
        hooks: &'a [Box<dyn OnDocumentVisited>],
        sink: &'a mut dyn DiagnosticSink,
    ) -> Self {
        Self { dts, config, hooks, sink }
    }

    /// Phase 1 visits every reachable document once, post-order. Phase 2
    /// then processes link content, when every declaration is known.
    pub fn run(mut self) {
        self.discover();
        let order = self.dts.visit_order.clone();
        for doc in order {
            self.process_links(doc);
        }
    }

    // ========================================================================
    // Phase 1
    // ========================================================================

    fn discover(&mut self) {
        let entry = self.dts.entry();
        let mut state: AHashMap<DocId, VisitState> = AHashMap::new();
        let mut document_limit_reported = false;
        let mut depth_limit_reported = false;

        state.insert(entry, VisitState::Visiting);
        self.prefetch(entry, 0, state.len());
        let mut stack = vec![Frame {
            doc: entry,
            next: 0,
            depth: 0,
        }];

        while let Some(frame) = stack.last_mut() {
            let doc_id = frame.doc;
            let depth = frame.depth;
            let reference = self.dts.registry.get(doc_id).references.get(frame.next).cloned();
            let Some(reference) = reference else {
                stack.pop();
                state.insert(doc_id, VisitState::Visited);
                self.finish_document(doc_id);
                continue;
            };
            frame.next += 1;

            if let Some(known) = self.dts.registry.lookup(&reference.url) {
                if state.contains_key(&known) {
                    continue;
                }
            }

            if let Some(max) = self.config.max_documents {
                if state.len() >= max {
                    if !document_limit_reported {
                        document_limit_reported = true;
                        self.sink.emit(
                            Diagnostic::warning(
                                ErrorKind::Structural,
                                codes::DOCUMENT_LIMIT,
                                "DTS discovery stopped at {max} documents",
                            )
                            .arg("max", max)
                            .object(ObjectRef::new(self.dts.registry.get(doc_id), reference.element)),
                        );
                    }
                    continue;
                }
            }
            if let Some(max) = self.config.max_depth {
                if depth >= max {
                    if !depth_limit_reported {
                        depth_limit_reported = true;
                        self.sink.emit(
                            Diagnostic::warning(
                                ErrorKind::Structural,
                                codes::DEPTH_LIMIT,
                                "DTS discovery stopped at reference depth {max}",
                            )
                            .arg("max", max)
                            .object(ObjectRef::new(self.dts.registry.get(doc_id), reference.element)),
                        );
                    }
                    continue;
                }
            }

            let target = match self.dts.registry.load(&reference.url) {
                Ok(target) => target,
                Err(e) => {
                    let doc = self.dts.registry.get(doc_id);
                    self.sink.emit(load_failure(&e).object(ObjectRef::new(doc, reference.element)));
                    continue;
                }
            };

            tracing::debug!(from = %self.dts.registry.get(doc_id).url, to = %reference.url, kind = %reference.kind, "Following reference");
            state.insert(target, VisitState::Visiting);
            self.prefetch(target, depth + 1, state.len());
            stack.push(Frame {
                doc: target,
                next: 0,
                depth: depth + 1,
            });
        }
    }

    /// Warm the registry with the references of `doc`, staying inside
    /// the document and depth bounds.
    fn prefetch(&mut self, doc: DocId, depth: usize, visited: usize) {
        if self.config.max_depth.is_some_and(|max| depth >= max) {
            return;
        }
        let budget = self
            .config
            .max_documents
            .map_or(usize::MAX, |max| max.saturating_sub(visited));
        let urls: Vec<String> = self
            .dts
            .registry
            .get(doc)
            .references
            .iter()
            .map(|r| r.url.clone())
            .take(budget)
            .collect();
        self.dts.registry.prefetch(&urls);
    }

    /// Structural checks and declaration registration, run once per
    /// document after everything it references has been visited.
    fn finish_document(&mut self, doc_id: DocId) {
        let config = self.config;
        {
            let Dts {
                registry,
                rules,
                roles,
                concepts,
                ..
            } = &mut *self.dts;
            let doc = registry.get(doc_id);
            let sink = &mut *self.sink;

            for (id, element) in &doc.duplicate_ids {
                sink.emit(
                    Diagnostic::warning(ErrorKind::Structural, codes::DUPLICATE_ID, "Duplicate id \"{id}\"")
                        .arg("id", id)
                        .object(ObjectRef::new(doc, *element)),
                );
            }
            if config.enabled(ValidationFlags::HREFS) {
                for bad in &doc.bad_references {
                    let error = ReferenceError::InvalidHref {
                        href: bad.href.clone(),
                        reason: bad.reason.clone(),
                    };
                    sink.emit(error.to_diagnostic().object(ObjectRef::new(doc, bad.element)));
                }
            }
            if doc.doc_type == DocumentType::Schema {
                check_schema(registry, &**rules, config, doc, sink);
                index_concepts(doc, concepts);
            }
            register_declarations(roles, config, doc, sink);
        }

        self.dts.registry.get_mut(doc_id).in_dts = true;
        self.dts.visit_order.push(doc_id);

        let doc = self.dts.registry.get(doc_id);
        tracing::debug!(url = %doc.url, doc_type = %doc.doc_type, "Visited document");
        for hook in self.hooks {
            hook.on_document_visited(&*self.dts, self.dts.registry.get(doc_id), &mut *self.sink);
        }
    }

    // ========================================================================
    // Phase 2
    // ========================================================================

    fn process_links(&mut self, doc_id: DocId) {
        let scope = RefScope::collect(self.dts.registry.get(doc_id));
        self.check_ref_scope(doc_id, &scope);

        let links: Vec<(ElementId, XLinkType)> = self
            .dts
            .registry
            .get(doc_id)
            .elements()
            .filter_map(|(id, el)| match el.xlink_type() {
                Some(t @ (XLinkType::Simple | XLinkType::Extended)) => Some((id, t)),
                _ => None,
            })
            .collect();
        for (id, xtype) in links {
            match xtype {
                XLinkType::Simple => self.simple_link(doc_id, id, &scope),
                _ => self.extended_link(doc_id, id, &scope),
            }
        }
    }

    fn enabled(&self, flag: ValidationFlags) -> bool {
        self.config.enabled(flag)
    }

    fn emit_at(&mut self, doc_id: DocId, element: ElementId, diagnostic: Diagnostic) {
        let object = ObjectRef::new(self.dts.registry.get(doc_id), element);
        self.sink.emit(diagnostic.object(object));
    }

    /// Resolve an href for a link element. Failures to load are reported
    /// during discovery and are not repeated; targets outside the DTS are
    /// treated as unresolved.
    fn resolve(&mut self, doc_id: DocId, element: ElementId, href: &str) -> Option<NodeRef> {
        // Documents cut off by discovery bounds are never fetched here
        let (location, _) = uri::split_href(href.trim());
        if !location.is_empty() {
            let base = self.dts.registry.get(doc_id).url.as_str();
            if let Ok(url) = uri::canonicalize(Some(base), href) {
                if self.dts.registry.lookup(&url).is_none() {
                    return None;
                }
            }
        }
        let result = resolve_href(&mut self.dts.registry, self.dts.rules.as_ref(), doc_id, href);
        match result {
            Ok(node) if self.dts.registry.get(node.doc).in_dts => Some(node),
            Ok(_) => None,
            Err(ReferenceError::DocumentNotFound { .. } | ReferenceError::InvalidHref { .. }) => None,
            Err(e) => {
                if self.enabled(ValidationFlags::HREFS) {
                    self.emit_at(doc_id, element, e.to_diagnostic());
                }
                None
            }
        }
    }

    fn check_role(&mut self, doc_id: DocId, element: ElementId, scope: &RefScope) {
        if !self.enabled(ValidationFlags::ROLES) {
            return;
        }
        let Dts { registry, roles, .. } = &mut *self.dts;
        let doc = registry.get(doc_id);
        if let Err(e) = roles::validate_role(roles, scope, doc, element) {
            self.sink.emit(e.to_diagnostic().object(ObjectRef::new(doc, element)));
        }
    }

    fn check_arcrole(&mut self, doc_id: DocId, element: ElementId, scope: &RefScope) {
        if !self.enabled(ValidationFlags::ROLES) {
            return;
        }
        let Dts { registry, roles, .. } = &mut *self.dts;
        let doc = registry.get(doc_id);
        if let Err(e) = roles::validate_arcrole(roles, scope, doc, element) {
            self.sink.emit(e.to_diagnostic().object(ObjectRef::new(doc, element)));
        }
    }

    /// roleRef/arcroleRef: one per URI, and the href must reach a matching
    /// declaration.
    fn check_ref_scope(&mut self, doc_id: DocId, scope: &RefScope) {
        if !self.enabled(ValidationFlags::ROLES) {
            return;
        }
        for &(attr, element) in &scope.duplicates {
            let uri = self.ref_uri(doc_id, element, attr);
            self.emit_at(
                doc_id,
                element,
                Diagnostic::error(
                    ErrorKind::Reference,
                    codes::DUPLICATE_ROLE_REF,
                    "{attr}Ref for {uri} appears more than once",
                )
                .arg("attr", attr)
                .arg("uri", uri),
            );
        }

        for (attr, element, uri) in &scope.refs {
            let href = match self.dts.registry.get(doc_id).element(*element).xlink("href") {
                Some(href) => href.to_string(),
                None => continue,
            };
            let Some(target) = self.resolve(doc_id, *element, &href) else {
                continue;
            };
            let target_el = self.dts.registry.get(target.doc).element(target.element);
            let declared = match attr {
                RoleAttr::Role if target_el.is(LINK_NS, "roleType") => target_el.attr_local("roleURI"),
                RoleAttr::Arcrole if target_el.is(LINK_NS, "arcroleType") => target_el.attr_local("arcroleURI"),
                _ => None,
            };
            if declared.map(str::trim) != Some(uri.as_str()) {
                let found = declared.map(str::to_string).unwrap_or_else(|| target_el.name.to_string());
                self.emit_at(
                    doc_id,
                    *element,
                    Diagnostic::error(
                        ErrorKind::Reference,
                        codes::ROLE_REF_MISMATCH,
                        "{attr}Ref for {uri} points at {found}",
                    )
                    .arg("attr", attr)
                    .arg("uri", uri)
                    .arg("found", found),
                );
            }
        }
    }

    fn ref_uri(&self, doc_id: DocId, element: ElementId, attr: RoleAttr) -> String {
        let name = match attr {
            RoleAttr::Role => "roleURI",
            RoleAttr::Arcrole => "arcroleURI",
        };
        self.dts
            .registry
            .get(doc_id)
            .element(element)
            .attr_local(name)
            .unwrap_or("")
            .to_string()
    }

    fn simple_link(&mut self, doc_id: DocId, element: ElementId, scope: &RefScope) {
        let (name, href, arcrole) = {
            let el = self.dts.registry.get(doc_id).element(element);
            (
                el.name.clone(),
                el.xlink("href").map(str::to_string),
                el.xlink("arcrole").map(|a| a.trim().to_string()),
            )
        };
        if name.is(LINK_NS, "roleRef") || name.is(LINK_NS, "arcroleRef") {
            return;
        }
        self.check_role(doc_id, element, scope);

        let expected = if name.is(LINK_NS, "linkbaseRef") {
            if self.enabled(ValidationFlags::HREFS) && arcrole.as_deref() != Some(LINKBASE_ARCROLE) {
                self.emit_at(
                    doc_id,
                    element,
                    Diagnostic::error(
                        ErrorKind::Reference,
                        codes::LINKBASE_REF_ARCROLE,
                        "linkbaseRef arcrole must be {expected}, found \"{found}\"",
                    )
                    .arg("expected", LINKBASE_ARCROLE)
                    .arg("found", arcrole.as_deref().unwrap_or("")),
                );
            }
            DocumentType::Linkbase
        } else if name.is(LINK_NS, "schemaRef") {
            DocumentType::Schema
        } else {
            return;
        };

        let Some(href) = href else { return };
        let Some(target) = self.resolve(doc_id, element, &href) else {
            return;
        };
        let target_doc = self.dts.registry.get(target.doc);
        let ok = match expected {
            DocumentType::Linkbase => {
                target_doc.doc_type == DocumentType::Linkbase
                    || target_doc.element(target.element).is(LINK_NS, "linkbase")
            }
            _ => target_doc.doc_type == expected,
        };
        if !ok && self.enabled(ValidationFlags::HREFS) {
            let error = ReferenceError::WrongTargetType {
                href,
                found: format!("a {} document", target_doc.doc_type),
                expected: format!("a {} document", expected),
            };
            self.emit_at(doc_id, element, error.to_diagnostic());
        }
    }

    fn extended_link(&mut self, doc_id: DocId, link: ElementId, scope: &RefScope) {
        self.check_role(doc_id, link, scope);

        struct Member {
            id: ElementId,
            xtype: Option<XLinkType>,
            label: Option<String>,
            href: Option<String>,
        }
        let (link_name, linkrole, members) = {
            let doc = self.dts.registry.get(doc_id);
            let el = doc.element(link);
            let members: Vec<Member> = doc
                .children(link)
                .map(|(id, child)| Member {
                    id,
                    xtype: child.xlink_type(),
                    label: child.xlink("label").map(str::to_string),
                    href: child.xlink("href").map(str::to_string),
                })
                .collect();
            let linkrole = el
                .xlink("role")
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .unwrap_or(LINK_ROLE)
                .to_string();
            (el.name.clone(), linkrole, members)
        };

        let mut labels = LinkLabels::default();
        let mut arcs = Vec::new();
        for member in members {
            match member.xtype {
                Some(XLinkType::Locator) => {
                    self.check_role(doc_id, member.id, scope);
                    let target = member
                        .href
                        .as_deref()
                        .and_then(|href| self.resolve(doc_id, member.id, href));
                    if let (Some(target), Some(href)) = (target, member.href.as_deref()) {
                        let target_doc = self.dts.registry.get(target.doc);
                        if let Err(e) = check_locator_target(&link_name, href, target_doc, target.element) {
                            if self.enabled(ValidationFlags::HREFS) {
                                self.emit_at(doc_id, member.id, e.to_diagnostic());
                            }
                        }
                        self.dts.locators.insert(NodeRef::new(doc_id, member.id), target);
                    }
                    if let Some(label) = member.label {
                        labels.add(label, target);
                    }
                }
                Some(XLinkType::Resource) => {
                    self.check_role(doc_id, member.id, scope);
                    if let Some(label) = member.label {
                        labels.add(label, Some(NodeRef::new(doc_id, member.id)));
                    }
                }
                Some(XLinkType::Arc) => arcs.push(member.id),
                _ => {}
            }
        }

        for arc in arcs {
            self.arc(doc_id, arc, &link_name, &linkrole, &labels, scope);
        }
    }

    fn arc(
        &mut self,
        doc_id: DocId,
        arc: ElementId,
        link_name: &QName,
        linkrole: &str,
        labels: &LinkLabels,
        scope: &RefScope,
    ) {
        self.check_arcrole(doc_id, arc, scope);

        let el = self.dts.registry.get(doc_id).element(arc).clone();
        let Some(arcrole) = el.xlink("arcrole").map(str::trim).filter(|a| !a.is_empty()) else {
            return;
        };

        let mut problems = Vec::new();
        let order = parse_attr::<f64>(&el, "order", &mut problems);
        let priority = parse_attr::<i32>(&el, "priority", &mut problems);
        let weight = parse_attr::<f64>(&el, "weight", &mut problems);
        let arc_use = match el.attr_local("use") {
            Some(value) => ArcUse::parse(value).or_else(|| {
                problems.push(("use", value.to_string()));
                None
            }),
            None => None,
        };
        for (attr, value) in problems {
            self.emit_at(
                doc_id,
                arc,
                Diagnostic::error(
                    ErrorKind::Structural,
                    codes::INVALID_ARC_ATTRIBUTE,
                    "Invalid value \"{value}\" for attribute {attr} on {element}",
                )
                .arg("value", value)
                .arg("attr", attr)
                .arg("element", &el.name),
            );
        }

        let mut endpoints = Vec::with_capacity(2);
        for side in ["from", "to"] {
            match el.xlink(side) {
                // An omitted label selects every member of the link
                None => endpoints.push(labels.all()),
                Some(label) => match labels.get(label) {
                    Some(nodes) => endpoints.push(nodes.clone()),
                    None => {
                        if self.enabled(ValidationFlags::HREFS) {
                            self.emit_at(
                                doc_id,
                                arc,
                                Diagnostic::error(
                                    ErrorKind::Reference,
                                    codes::LABEL_NOT_FOUND,
                                    "Arc {side} label \"{label}\" does not match a locator or resource in the link",
                                )
                                .arg("side", side)
                                .arg("label", label),
                            );
                        }
                        return;
                    }
                },
            }
        }

        let key = BaseSetKey::concrete(arcrole, linkrole, link_name.clone(), el.name.clone());
        let arc_node = NodeRef::new(doc_id, arc);
        let preferred_label = el.attr_local("preferredLabel").map(|p| p.trim().to_string());
        for &from in &endpoints[0] {
            for &to in &endpoints[1] {
                let mut record = ArcRecord::new(key.clone(), arc_node, from, to);
                if let Some(order) = order {
                    record.order = order;
                    record.explicit_order = true;
                }
                record.priority = priority.unwrap_or(0);
                record.weight = weight;
                record.arc_use = arc_use.unwrap_or(ArcUse::Optional);
                record.preferred_label = preferred_label.clone();
                self.dts.arcs.push(record);
            }
        }
    }
}

/// Labels of one extended link, kept in document order.
#[derive(Default)]
struct LinkLabels {
    order: Vec<String>,
    nodes: AHashMap<String, Vec<NodeRef>>,
}

impl LinkLabels {
    fn add(&mut self, label: String, node: Option<NodeRef>) {
        if !self.nodes.contains_key(&label) {
            self.order.push(label.clone());
        }
        self.nodes.entry(label).or_default().extend(node);
    }

    fn get(&self, label: &str) -> Option<&Vec<NodeRef>> {
        self.nodes.get(label)
    }

    fn all(&self) -> Vec<NodeRef> {
        self.order
            .iter()
            .filter_map(|label| self.nodes.get(label))
            .flatten()
            .copied()
            .collect()
    }
}

fn parse_attr<T: std::str::FromStr>(
    el: &Element,
    name: &'static str,
    problems: &mut Vec<(&'static str, String)>,
) -> Option<T> {
    let value = el.attr_local(name)?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            problems.push((name, value.to_string()));
            None
        }
    }
}

fn load_failure(error: &LoadError) -> Diagnostic {
    match error {
        LoadError::Parse { url, message, line } => Diagnostic::error(
            ErrorKind::Structural,
            codes::PARSE_ERROR,
            "Document {url} could not be parsed: {message} (line {line})",
        )
        .arg("url", url)
        .arg("message", message)
        .arg("line", line),
        other => ReferenceError::from(other.clone()).to_diagnostic(),
    }
}

fn check_schema(
    registry: &DocumentRegistry,
    rules: &dyn RulePack,
    config: &ValidationConfig,
    doc: &Document,
    sink: &mut dyn DiagnosticSink,
) {
    let tns = doc.target_namespace.as_deref();

    for reference in doc.references.iter().filter(|r| r.kind == ReferenceKind::Include) {
        let Some(included) = registry.lookup(&reference.url).map(|id| registry.get(id)) else {
            continue;
        };
        if let Some(included_tns) = included.target_namespace.as_deref() {
            if Some(included_tns) != tns {
                sink.emit(
                    Diagnostic::error(
                        ErrorKind::Structural,
                        codes::INCLUDE_OUTSIDE_NAMESPACE,
                        "Included schema {url} has target namespace {included}, expected {expected}",
                    )
                    .arg("url", &included.url)
                    .arg("included", included_tns)
                    .arg("expected", tns.unwrap_or("(none)"))
                    .object(ObjectRef::new(doc, reference.element)),
                );
            }
        }
    }

    if let Some(tns) = tns {
        let root = ObjectRef::document(doc);
        if !uri::is_absolute_uri(tns) {
            sink.emit(
                Diagnostic::error(
                    ErrorKind::Structural,
                    codes::TARGET_NAMESPACE_NOT_ABSOLUTE,
                    "Target namespace \"{namespace}\" is not an absolute URI",
                )
                .arg("namespace", tns)
                .object(root),
            );
        } else if let Some(authority) = uri::authority(tns) {
            if !rules.authority_allowed(&authority) {
                sink.emit(
                    Diagnostic::error(
                        ErrorKind::Structural,
                        codes::TARGET_NAMESPACE_AUTHORITY,
                        "Target namespace {namespace} uses authority {authority}, which {rules} rules do not accept",
                    )
                    .arg("namespace", tns)
                    .arg("authority", authority)
                    .arg("rules", rules.name())
                    .object(root),
                );
            }
        }
    }

    if config.enabled(ValidationFlags::EMBEDDED_LINKBASES) {
        for (id, el) in doc.elements() {
            if !el.is(LINK_NS, "linkbase") {
                continue;
            }
            let in_appinfo = el
                .parent
                .map(|p| doc.element(p).is(XSD_NS, "appinfo"))
                .unwrap_or(false);
            if in_appinfo {
                sink.emit(
                    Diagnostic::error(
                        ErrorKind::Structural,
                        codes::EMBEDDED_LINKBASE,
                        "Linkbase embedded in schema appinfo",
                    )
                    .object(ObjectRef::new(doc, id)),
                );
            }
        }
    }
}

/// Global element declarations, keyed by target namespace and name.
fn index_concepts(doc: &Document, concepts: &mut AHashMap<QName, NodeRef>) {
    let tns = doc.target_namespace.as_deref().unwrap_or("");
    for (id, el) in doc.children(doc.root()) {
        if !el.is(XSD_NS, "element") {
            continue;
        }
        if let Some(name) = el.attr_local("name") {
            concepts
                .entry(QName::new(tns, name.trim()))
                .or_insert_with(|| doc.node(id));
        }
    }
}

fn register_declarations(
    roles: &mut RoleRegistry,
    config: &ValidationConfig,
    doc: &Document,
    sink: &mut dyn DiagnosticSink,
) {
    for (id, el) in doc.elements() {
        if !(el.is(LINK_NS, "roleType") || el.is(LINK_NS, "arcroleType")) {
            continue;
        }
        let problems = roles.register(doc, id);
        if config.enabled(ValidationFlags::ROLES) {
            for problem in problems {
                sink.emit(problem);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::loader::MemoryLoader;
    use crate::registry::DocumentRegistry;
    use crate::rules::GenericRules;
    use std::sync::Arc;

    fn walk(loader: MemoryLoader, entry: &str, config: &ValidationConfig) -> (Dts, Diagnostics) {
        let mut registry = DocumentRegistry::new(loader);
        let entry = registry.load(entry).unwrap();
        let mut dts = Dts::new(registry, Arc::new(GenericRules), entry);
        let mut sink = Diagnostics::new();
        Walker::new(&mut dts, config, &[], &mut sink).run();
        (dts, sink)
    }

    fn schema(imports: &[&str]) -> String {
        let imports: String = imports
            .iter()
            .map(|i| format!(r#"<xs:import namespace="http://example.com/{0}" schemaLocation="{0}.xsd"/>"#, i))
            .collect();
        format!(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="http://example.com/ns">{}</xs:schema>"#,
            imports
        )
    }

    #[test]
    fn test_import_cycle_and_diamond_visited_once() {
        let loader = MemoryLoader::new()
            .with("http://example.com/a.xsd", schema(&["b", "c"]))
            .with("http://example.com/b.xsd", schema(&["d", "a"]))
            .with("http://example.com/c.xsd", schema(&["d"]))
            .with("http://example.com/d.xsd", schema(&["b"]));
        let (dts, sink) = walk(loader, "http://example.com/a.xsd", &ValidationConfig::default());
        assert_eq!(dts.len(), 4);
        assert!(sink.is_empty(), "{:?}", sink);
        let mut urls: Vec<&str> = dts.documents().map(|d| d.url.as_str()).collect();
        urls.sort();
        urls.dedup();
        assert_eq!(urls.len(), 4);
        // Post-order: the entry finishes last
        assert_eq!(dts.documents().last().map(|d| d.url.as_str()), Some("http://example.com/a.xsd"));
    }

    #[test]
    fn test_missing_import_reported_once() {
        let loader = MemoryLoader::new()
            .with("http://example.com/a.xsd", schema(&["missing", "b"]))
            .with("http://example.com/b.xsd", schema(&["missing"]));
        let (_, sink) = walk(loader, "http://example.com/a.xsd", &ValidationConfig::default());
        // One per referencing document
        assert_eq!(sink.count(codes::DOCUMENT_NOT_FOUND), 2);
    }

    #[test]
    fn test_document_limit() {
        let loader = MemoryLoader::new()
            .with("http://example.com/a.xsd", schema(&["b", "c"]))
            .with("http://example.com/b.xsd", schema(&[]))
            .with("http://example.com/c.xsd", schema(&[]));
        let config = ValidationConfig::default().with_max_documents(2);
        let (dts, sink) = walk(loader, "http://example.com/a.xsd", &config);
        assert_eq!(dts.len(), 2);
        assert_eq!(sink.count(codes::DOCUMENT_LIMIT), 1);
    }

    #[test]
    fn test_bounds_limit_fetches() {
        let entry = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:link="http://www.xbrl.org/2003/linkbase"
    xmlns:xlink="http://www.w3.org/1999/xlink" targetNamespace="http://example.com/entry">
  <xs:annotation><xs:appinfo>
    <link:linkbaseRef xlink:type="simple" xlink:href="pre.xml" xlink:arcrole="http://www.w3.org/1999/xlink/properties/linkbase"/>
  </xs:appinfo></xs:annotation>
</xs:schema>"#;
        let lb = r#"<link:linkbase xmlns:link="http://www.xbrl.org/2003/linkbase" xmlns:xlink="http://www.w3.org/1999/xlink">
  <link:presentationLink xlink:type="extended" xlink:role="http://www.xbrl.org/2003/role/link">
    <link:loc xlink:type="locator" xlink:href="ex.xsd#ex_A" xlink:label="A"/>
  </link:presentationLink>
</link:linkbase>"#;
        let xsd = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="http://example.com/ex">
  <xs:element name="A" id="ex_A"/>
</xs:schema>"#;
        let loader = Arc::new(
            MemoryLoader::new()
                .with("http://example.com/entry.xsd", entry)
                .with("http://example.com/pre.xml", lb)
                .with("http://example.com/ex.xsd", xsd),
        );

        let mut registry = DocumentRegistry::new(loader.clone());
        let root = registry.load("http://example.com/entry.xsd").unwrap();
        let mut dts = Dts::new(registry, Arc::new(GenericRules), root);
        let mut sink = Diagnostics::new();
        let config = ValidationConfig::default().with_max_documents(2);
        Walker::new(&mut dts, &config, &[], &mut sink).run();

        assert_eq!(dts.len(), 2);
        assert_eq!(sink.count(codes::DOCUMENT_LIMIT), 1);
        assert_eq!(loader.fetch_count(), 2);
        assert!(dts.registry().lookup("http://example.com/ex.xsd").is_none());
    }

    #[test]
    fn test_depth_limit_skips_deeper_fetches() {
        let loader = Arc::new(
            MemoryLoader::new()
                .with("http://example.com/a.xsd", schema(&["b"]))
                .with("http://example.com/b.xsd", schema(&["c", "d"]))
                .with("http://example.com/c.xsd", schema(&[]))
                .with("http://example.com/d.xsd", schema(&[])),
        );
        let mut registry = DocumentRegistry::new(loader.clone());
        let root = registry.load("http://example.com/a.xsd").unwrap();
        let mut dts = Dts::new(registry, Arc::new(GenericRules), root);
        let mut sink = Diagnostics::new();
        let config = ValidationConfig::default().with_max_depth(1);
        Walker::new(&mut dts, &config, &[], &mut sink).run();

        assert_eq!(dts.len(), 2);
        assert_eq!(sink.count(codes::DEPTH_LIMIT), 1);
        assert_eq!(loader.fetch_count(), 2);
    }

    #[test]
    fn test_target_namespace_and_include_checks() {
        let a = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="relative/ns">
  <xs:include schemaLocation="b.xsd"/>
</xs:schema>"#;
        let b = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="http://example.com/other"/>"#;
        let loader = MemoryLoader::new()
            .with("http://example.com/a.xsd", a)
            .with("http://example.com/b.xsd", b);
        let (_, sink) = walk(loader, "http://example.com/a.xsd", &ValidationConfig::default());
        assert_eq!(sink.count(codes::TARGET_NAMESPACE_NOT_ABSOLUTE), 1);
        assert_eq!(sink.count(codes::INCLUDE_OUTSIDE_NAMESPACE), 1);
    }

    #[test]
    fn test_arc_label_and_attribute_errors() {
        let xsd = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="http://example.com/ex">
  <xs:element name="A" id="ex_A"/>
  <xs:element name="B" id="ex_B"/>
</xs:schema>"#;
        let lb = r#"<link:linkbase xmlns:link="http://www.xbrl.org/2003/linkbase" xmlns:xlink="http://www.w3.org/1999/xlink">
  <link:presentationLink xlink:type="extended" xlink:role="http://www.xbrl.org/2003/role/link">
    <link:loc xlink:type="locator" xlink:href="ex.xsd#ex_A" xlink:label="A"/>
    <link:loc xlink:type="locator" xlink:href="ex.xsd#ex_B" xlink:label="B"/>
    <link:presentationArc xlink:type="arc" xlink:arcrole="http://www.xbrl.org/2003/arcrole/parent-child"
        xlink:from="A" xlink:to="B" order="first"/>
    <link:presentationArc xlink:type="arc" xlink:arcrole="http://www.xbrl.org/2003/arcrole/parent-child"
        xlink:from="A" xlink:to="C"/>
  </link:presentationLink>
</link:linkbase>"#;
        let entry = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:link="http://www.xbrl.org/2003/linkbase"
    xmlns:xlink="http://www.w3.org/1999/xlink" targetNamespace="http://example.com/entry">
  <xs:annotation><xs:appinfo>
    <link:linkbaseRef xlink:type="simple" xlink:href="pre.xml" xlink:arcrole="http://www.w3.org/1999/xlink/properties/linkbase"/>
  </xs:appinfo></xs:annotation>
  <xs:import namespace="http://example.com/ex" schemaLocation="ex.xsd"/>
</xs:schema>"#;
        let loader = MemoryLoader::new()
            .with("http://example.com/entry.xsd", entry)
            .with("http://example.com/ex.xsd", xsd)
            .with("http://example.com/pre.xml", lb);
        let (dts, sink) = walk(loader, "http://example.com/entry.xsd", &ValidationConfig::default());
        assert_eq!(sink.count(codes::INVALID_ARC_ATTRIBUTE), 1);
        assert_eq!(sink.count(codes::LABEL_NOT_FOUND), 1);
        assert_eq!(sink.len(), 2, "{:?}", sink);
        assert_eq!(dts.arcs().len(), 1);
    }

    #[test]
    fn test_omitted_arc_side_expands_in_document_order() {
        let names = ["A", "B", "C", "D", "E", "F"];
        let elements: String = names
            .iter()
            .map(|n| format!(r#"<xs:element name="{0}" id="ex_{0}"/>"#, n))
            .collect();
        let xsd = format!(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:ex="http://example.com/ex"
    targetNamespace="http://example.com/ex">{}</xs:schema>"#,
            elements
        );
        let locs: String = names
            .iter()
            .map(|n| format!(r#"<link:loc xlink:type="locator" xlink:href="ex.xsd#ex_{0}" xlink:label="{0}"/>"#, n))
            .collect();
        let lb = format!(
            r#"<link:linkbase xmlns:link="http://www.xbrl.org/2003/linkbase" xmlns:xlink="http://www.w3.org/1999/xlink">
  <link:presentationLink xlink:type="extended" xlink:role="http://www.xbrl.org/2003/role/link">{}
    <link:presentationArc xlink:type="arc" xlink:arcrole="http://www.xbrl.org/2003/arcrole/parent-child" xlink:from="A"/>
  </link:presentationLink>
</link:linkbase>"#,
            locs
        );
        let entry = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:link="http://www.xbrl.org/2003/linkbase"
    xmlns:xlink="http://www.w3.org/1999/xlink" targetNamespace="http://example.com/entry">
  <xs:annotation><xs:appinfo>
    <link:linkbaseRef xlink:type="simple" xlink:href="pre.xml" xlink:arcrole="http://www.w3.org/1999/xlink/properties/linkbase"/>
  </xs:appinfo></xs:annotation>
  <xs:import namespace="http://example.com/ex" schemaLocation="ex.xsd"/>
</xs:schema>"#;

        let targets = || {
            let loader = MemoryLoader::new()
                .with("http://example.com/entry.xsd", entry)
                .with("http://example.com/ex.xsd", xsd.as_str())
                .with("http://example.com/pre.xml", lb.as_str());
            let (dts, _) = walk(loader, "http://example.com/entry.xsd", &ValidationConfig::default());
            let set = dts.relationship_set("http://www.xbrl.org/2003/arcrole/parent-child", None);
            set.relationships()
                .iter()
                .map(|r| dts.describe(r.target))
                .collect::<Vec<_>>()
        };

        let first = targets();
        let expected: Vec<String> = names.iter().map(|n| format!("ex:{}", n)).collect();
        assert_eq!(first, expected);
        for _ in 0..20 {
            assert_eq!(targets(), first);
        }
    }
}
