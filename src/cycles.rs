// Directed cycle detection over relationship and tuple graphs
use crate::model::*;
use crate::registry::DocumentRegistry;
use ahash::{AHashMap, AHashSet};
use std::hash::Hash;

/// Search for a cycle that leaves `origin` and returns to it. The result is
/// the chain `origin, .., origin`. Cycles among descendants that never
/// come back to `origin` are not reported for this origin.
pub fn find_cycle_from<N, F, I>(origin: N, mut successors: F) -> Option<Vec<N>>
where
    N: Copy + Eq + Hash,
    F: FnMut(N) -> I,
    I: IntoIterator<Item = N>,
{
    let mut path = vec![origin];
    let mut on_path = AHashSet::new();
    on_path.insert(origin);
    // Nodes fully explored without reaching the origin
    let mut exhausted = AHashSet::new();
    let mut stack: Vec<(Vec<N>, usize)> = vec![(successors(origin).into_iter().collect(), 0)];

    while let Some((next, cursor)) = stack.last_mut() {
        let Some(&node) = next.get(*cursor) else {
            stack.pop();
            if let Some(done) = path.pop() {
                on_path.remove(&done);
                exhausted.insert(done);
            }
            continue;
        };
        *cursor += 1;

        if node == origin {
            path.push(origin);
            return Some(path);
        }
        if on_path.contains(&node) || exhausted.contains(&node) {
            continue;
        }
        path.push(node);
        on_path.insert(node);
        stack.push((successors(node).into_iter().collect(), 0));
    }
    None
}

/// Run `find_cycle_from` for every origin, reporting each distinct cycle
/// (same member set) once.
pub fn distinct_cycles<N, F, I>(origins: impl IntoIterator<Item = N>, mut successors: F) -> Vec<Vec<N>>
where
    N: Copy + Ord + Hash,
    F: FnMut(N) -> I,
    I: IntoIterator<Item = N>,
{
    let mut seen: AHashSet<Vec<N>> = AHashSet::new();
    let mut cycles = Vec::new();
    for origin in origins {
        if let Some(chain) = find_cycle_from(origin, &mut successors) {
            let mut members = chain[..chain.len() - 1].to_vec();
            members.sort();
            if seen.insert(members) {
                cycles.push(chain);
            }
        }
    }
    cycles
}

/// Containment edges from tuple concepts to the concepts they reference as
/// members.
#[derive(Debug, Default)]
pub struct TupleGraph {
    tuples: Vec<NodeRef>,
    members: AHashMap<NodeRef, Vec<NodeRef>>,
}

impl TupleGraph {
    pub fn build(registry: &DocumentRegistry, concepts: &AHashMap<QName, NodeRef>) -> Self {
        let mut complex_types: AHashMap<QName, NodeRef> = AHashMap::new();
        for doc in registry.documents().filter(|d| d.in_dts && d.doc_type == DocumentType::Schema) {
            let tns = doc.target_namespace.as_deref().unwrap_or("");
            for (id, el) in doc.children(doc.root()) {
                if el.is(XSD_NS, "complexType") {
                    if let Some(name) = el.attr_local("name") {
                        complex_types.insert(QName::new(tns, name), doc.node(id));
                    }
                }
            }
        }

        let mut graph = Self::default();
        let mut ordered: Vec<(&QName, &NodeRef)> = concepts.iter().collect();
        ordered.sort_by_key(|(_, node)| **node);
        for (_, &concept) in ordered {
            if !is_tuple(registry, concepts, concept) {
                continue;
            }
            let doc = registry.get(concept.doc);
            let mut scopes = vec![concept];
            if let Some(named) = doc
                .element(concept.element)
                .attr_local("type")
                .and_then(|t| doc.resolve_qname(concept.element, t))
                .and_then(|q| complex_types.get(&q))
            {
                scopes.push(*named);
            }

            let mut members = Vec::new();
            for scope in scopes {
                let scope_doc = registry.get(scope.doc);
                for id in scope_doc.descendants(scope.element) {
                    let el = scope_doc.element(id);
                    if !el.is(XSD_NS, "element") {
                        continue;
                    }
                    let target = el
                        .attr_local("ref")
                        .and_then(|r| scope_doc.resolve_qname(id, r))
                        .and_then(|q| concepts.get(&q));
                    if let Some(&target) = target {
                        if !members.contains(&target) {
                            members.push(target);
                        }
                    }
                }
            }
            graph.tuples.push(concept);
            graph.members.insert(concept, members);
        }
        graph
    }

    pub fn tuples(&self) -> &[NodeRef] {
        &self.tuples
    }

    pub fn members(&self, tuple: NodeRef) -> &[NodeRef] {
        self.members.get(&tuple).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn cycles(&self) -> Vec<Vec<NodeRef>> {
        distinct_cycles(self.tuples.iter().copied(), |n| self.members(n).to_vec())
    }
}

/// Follow `substitutionGroup` through the concept index to `xbrli:tuple`.
fn is_tuple(registry: &DocumentRegistry, concepts: &AHashMap<QName, NodeRef>, concept: NodeRef) -> bool {
    let mut current = concept;
    let mut seen = AHashSet::new();
    while seen.insert(current) {
        let doc = registry.get(current.doc);
        let group = match doc
            .element(current.element)
            .attr_local("substitutionGroup")
            .and_then(|g| doc.resolve_qname(current.element, g))
        {
            Some(group) => group,
            None => return false,
        };
        if group.is(XBRLI_NS, "tuple") {
            return true;
        }
        match concepts.get(&group) {
            Some(&next) => current = next,
            None => return false,
        }
    }
    false
}
