// DTS model and query API
use crate::diagnostics::ObjectRef;
use crate::href::{self, ReferenceError};
use crate::model::*;
use crate::registry::DocumentRegistry;
use crate::relationships::{self, ArcIndex, Axis, BaseSetKey, RelationshipSet};
use crate::roles::{RoleDeclaration, RoleRegistry};
use crate::rules::RulePack;
use crate::uri;
use ahash::AHashMap;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

/// Everything one validation run discovers. Rule packs query it through
/// hooks and after the run.
pub struct Dts {
    pub(crate) registry: DocumentRegistry,
    pub(crate) rules: Arc<dyn RulePack>,
    pub(crate) roles: RoleRegistry,
    pub(crate) arcs: ArcIndex,
    pub(crate) concepts: AHashMap<QName, NodeRef>,
    pub(crate) locators: AHashMap<NodeRef, NodeRef>,
    pub(crate) visit_order: Vec<DocId>,
    entry: DocId,
    cache: RefCell<AHashMap<BaseSetKey, Rc<RelationshipSet>>>,
}

impl Dts {
    pub(crate) fn new(registry: DocumentRegistry, rules: Arc<dyn RulePack>, entry: DocId) -> Self {
        Self {
            registry,
            rules,
            roles: RoleRegistry::new(),
            arcs: ArcIndex::new(),
            concepts: AHashMap::new(),
            locators: AHashMap::new(),
            visit_order: Vec::new(),
            entry,
            cache: RefCell::new(AHashMap::new()),
        }
    }

    pub fn entry(&self) -> DocId {
        self.entry
    }

    #[inline]
    pub fn document(&self, id: DocId) -> &Document {
        self.registry.get(id)
    }

    /// Documents in the DTS, in visit order.
    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.visit_order.iter().map(move |&id| self.registry.get(id))
    }

    pub fn len(&self) -> usize {
        self.visit_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visit_order.is_empty()
    }

    pub fn registry(&self) -> &DocumentRegistry {
        &self.registry
    }

    pub fn roles(&self) -> &RoleRegistry {
        &self.roles
    }

    pub fn arcs(&self) -> &ArcIndex {
        &self.arcs
    }

    /// Concrete base-set keys in discovery order.
    pub fn base_set_keys(&self) -> &[BaseSetKey] {
        self.arcs.keys()
    }

    /// Relationship set for a full or partial key, built once per run.
    pub fn base_set(&self, key: &BaseSetKey) -> Rc<RelationshipSet> {
        if let Some(set) = self.cache.borrow().get(key) {
            return Rc::clone(set);
        }
        let set = Rc::new(relationships::build(&self.arcs, key));
        self.cache.borrow_mut().insert(key.clone(), Rc::clone(&set));
        set
    }

    pub fn relationship_set(&self, arcrole: &str, linkrole: Option<&str>) -> Rc<RelationshipSet> {
        let mut key = BaseSetKey::new(arcrole);
        if let Some(linkrole) = linkrole {
            key = key.with_linkrole(linkrole);
        }
        self.base_set(&key)
    }

    pub fn role_type(&self, uri: &str) -> Option<&RoleDeclaration> {
        self.roles.role_type(uri)
    }

    pub fn arcrole_type(&self, uri: &str) -> Option<&RoleDeclaration> {
        self.roles.arcrole_type(uri)
    }

    pub fn is_related(&self, key: &BaseSetKey, a: NodeRef, axis: Axis, b: NodeRef) -> bool {
        self.base_set(key).is_related(a, axis, b)
    }

    /// Resolve an href relative to `base`. Documents outside the DTS may
    /// be loaded on demand.
    pub fn resolve_href(&mut self, base: DocId, href: &str) -> Result<NodeRef, ReferenceError> {
        href::resolve_href(&mut self.registry, self.rules.as_ref(), base, href)
    }

    /// Element a locator resolved to during the walk.
    pub fn locator_target(&self, locator: NodeRef) -> Option<NodeRef> {
        self.locators.get(&locator).copied()
    }

    pub fn concept(&self, name: &QName) -> Option<NodeRef> {
        self.concepts.get(name).copied()
    }

    pub fn concepts(&self) -> impl Iterator<Item = (&QName, NodeRef)> {
        self.concepts.iter().map(|(q, &n)| (q, n))
    }

    pub fn object_ref(&self, node: NodeRef) -> ObjectRef {
        ObjectRef::new(self.document(node.doc), node.element)
    }

    /// Short human-readable name: `prefix:name` for concepts, otherwise
    /// `file#id` or the element name with its line.
    pub fn describe(&self, node: NodeRef) -> String {
        let doc = self.document(node.doc);
        let el = doc.element(node.element);
        let file = uri::file_name(&doc.url);
        if el.is(XSD_NS, "element") {
            if let Some(name) = el.attr_local("name") {
                let tns = doc.target_namespace.as_deref().unwrap_or("");
                return match doc.prefix_for(tns) {
                    Some(prefix) => format!("{}:{}", prefix, name),
                    None => QName::new(tns, name).to_string(),
                };
            }
        }
        match el.id() {
            Some(id) => format!("{}#{}", file, id),
            None => format!("{} ({}:{})", el.name, file, el.line),
        }
    }
}
