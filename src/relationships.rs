// Relationship sets: base-set keys, arc index, prohibition and override
use crate::model::{NodeRef, QName};
use ahash::{AHashMap, AHashSet};
use serde::Serialize;
use std::fmt;

/// Identifies a base set. Missing parts act as wildcards and merge every
/// concrete base set they match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BaseSetKey {
    pub arcrole: String,
    pub linkrole: Option<String>,
    pub link: Option<QName>,
    pub arc: Option<QName>,
}

impl BaseSetKey {
    pub fn new(arcrole: &str) -> Self {
        Self {
            arcrole: arcrole.to_string(),
            linkrole: None,
            link: None,
            arc: None,
        }
    }

    pub fn concrete(arcrole: &str, linkrole: &str, link: QName, arc: QName) -> Self {
        Self {
            arcrole: arcrole.to_string(),
            linkrole: Some(linkrole.to_string()),
            link: Some(link),
            arc: Some(arc),
        }
    }

    pub fn with_linkrole(mut self, linkrole: &str) -> Self {
        self.linkrole = Some(linkrole.to_string());
        self
    }

    pub fn with_link(mut self, link: QName) -> Self {
        self.link = Some(link);
        self
    }

    pub fn with_arc(mut self, arc: QName) -> Self {
        self.arc = Some(arc);
        self
    }

    pub fn is_concrete(&self) -> bool {
        self.linkrole.is_some() && self.link.is_some() && self.arc.is_some()
    }

    /// Whether the concrete key `other` falls under this (possibly partial) key.
    pub fn matches(&self, other: &BaseSetKey) -> bool {
        fn part<T: PartialEq>(wanted: &Option<T>, actual: &Option<T>) -> bool {
            wanted.is_none() || wanted == actual
        }
        self.arcrole == other.arcrole
            && part(&self.linkrole, &other.linkrole)
            && part(&self.link, &other.link)
            && part(&self.arc, &other.arc)
    }
}

impl fmt::Display for BaseSetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.arcrole)?;
        write!(f, " [{}", self.linkrole.as_deref().unwrap_or("*"))?;
        match &self.link {
            Some(link) => write!(f, ", {}", link)?,
            None => f.write_str(", *")?,
        }
        match &self.arc {
            Some(arc) => write!(f, ", {}]", arc),
            None => f.write_str(", *]"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArcUse {
    Optional,
    Prohibited,
}

impl ArcUse {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "optional" => Some(Self::Optional),
            "prohibited" => Some(Self::Prohibited),
            _ => None,
        }
    }
}

/// One (from, to) endpoint pair of one arc.
#[derive(Debug, Clone, Serialize)]
pub struct ArcRecord {
    pub key: BaseSetKey,
    pub arc: NodeRef,
    pub from: NodeRef,
    pub to: NodeRef,
    pub order: f64,
    pub explicit_order: bool,
    pub weight: Option<f64>,
    pub priority: i32,
    pub arc_use: ArcUse,
    pub preferred_label: Option<String>,
    /// Discovery sequence, assigned by the index.
    pub seq: usize,
}

impl ArcRecord {
    pub fn new(key: BaseSetKey, arc: NodeRef, from: NodeRef, to: NodeRef) -> Self {
        Self {
            key,
            arc,
            from,
            to,
            order: 1.0,
            explicit_order: false,
            weight: None,
            priority: 0,
            arc_use: ArcUse::Optional,
            preferred_label: None,
            seq: 0,
        }
    }

    #[inline]
    pub fn is_prohibited(&self) -> bool {
        self.arc_use == ArcUse::Prohibited
    }
}

/// All arc records of a run, grouped by concrete base set.
#[derive(Debug, Default)]
pub struct ArcIndex {
    records: Vec<ArcRecord>,
    by_key: AHashMap<BaseSetKey, Vec<usize>>,
    keys: Vec<BaseSetKey>,
}

impl ArcIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mut record: ArcRecord) {
        record.seq = self.records.len();
        if !self.by_key.contains_key(&record.key) {
            self.keys.push(record.key.clone());
        }
        self.by_key.entry(record.key.clone()).or_default().push(record.seq);
        self.records.push(record);
    }

    /// Concrete keys in discovery order.
    pub fn keys(&self) -> &[BaseSetKey] {
        &self.keys
    }

    pub fn arcs<'a>(&'a self, key: &BaseSetKey) -> impl Iterator<Item = &'a ArcRecord> + 'a {
        self.by_key
            .get(key)
            .into_iter()
            .flatten()
            .map(move |&i| &self.records[i])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================================
// Relationship sets
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Relationship {
    pub key: BaseSetKey,
    pub arc: NodeRef,
    pub source: NodeRef,
    pub target: NodeRef,
    pub order: f64,
    pub weight: Option<f64>,
    pub priority: i32,
    pub preferred_label: Option<String>,
    pub seq: usize,
    pub effective: bool,
}

impl Relationship {
    fn from_record(record: &ArcRecord, effective: bool) -> Self {
        Self {
            key: record.key.clone(),
            arc: record.arc,
            source: record.from,
            target: record.to,
            order: record.order,
            weight: record.weight,
            priority: record.priority,
            preferred_label: record.preferred_label.clone(),
            seq: record.seq,
            effective,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IneffectiveReason {
    /// A higher-priority arc, or an earlier one at the same priority, won.
    Overridden,
    /// Cancelled by a prohibiting arc at the maximum priority.
    Prohibited,
    /// The prohibiting arc itself.
    Prohibiting,
}

#[derive(Debug, Clone, Serialize)]
pub struct IneffectiveArc {
    pub relationship: Relationship,
    pub reason: IneffectiveReason,
}

/// Two effective relationships sharing a source and an explicit order.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateOrder {
    pub key: BaseSetKey,
    pub source: NodeRef,
    pub order: f64,
    pub first: NodeRef,
    pub second: NodeRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Axis {
    Child,
    Parent,
    Descendant,
    Ancestor,
    Sibling,
}

#[derive(Debug, Default, Serialize)]
pub struct RelationshipSet {
    pub key: Option<BaseSetKey>,
    relationships: Vec<Relationship>,
    ineffective: Vec<IneffectiveArc>,
    duplicate_orders: Vec<DuplicateOrder>,
    #[serde(skip)]
    by_source: AHashMap<NodeRef, Vec<usize>>,
    #[serde(skip)]
    by_target: AHashMap<NodeRef, Vec<usize>>,
}

impl RelationshipSet {
    /// Effective relationships, ordered by first appearance of the
    /// source, then `order`, then discovery sequence.
    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    pub fn ineffective(&self) -> &[IneffectiveArc] {
        &self.ineffective
    }

    pub fn duplicate_orders(&self) -> &[DuplicateOrder] {
        &self.duplicate_orders
    }

    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }

    pub fn from(&self, source: NodeRef) -> impl Iterator<Item = &Relationship> {
        self.by_source
            .get(&source)
            .into_iter()
            .flatten()
            .map(move |&i| &self.relationships[i])
    }

    pub fn to(&self, target: NodeRef) -> impl Iterator<Item = &Relationship> {
        self.by_target
            .get(&target)
            .into_iter()
            .flatten()
            .map(move |&i| &self.relationships[i])
    }

    pub fn successors(&self, node: NodeRef) -> impl Iterator<Item = NodeRef> + '_ {
        self.from(node).map(|r| r.target)
    }

    /// Sources in first-appearance order.
    pub fn sources(&self) -> Vec<NodeRef> {
        let mut seen = AHashSet::new();
        self.relationships
            .iter()
            .map(|r| r.source)
            .filter(|s| seen.insert(*s))
            .collect()
    }

    /// Sources that are never a target.
    pub fn roots(&self) -> Vec<NodeRef> {
        self.sources()
            .into_iter()
            .filter(|s| !self.by_target.contains_key(s))
            .collect()
    }

    pub fn contains(&self, source: NodeRef, target: NodeRef) -> bool {
        self.from(source).any(|r| r.target == target)
    }

    /// Whether `b` stands on `axis` of `a`, e.g. `(a, Child, b)` holds when
    /// `b` is a child of `a`.
    pub fn is_related(&self, a: NodeRef, axis: Axis, b: NodeRef) -> bool {
        match axis {
            Axis::Child => self.contains(a, b),
            Axis::Parent => self.contains(b, a),
            Axis::Descendant => self.reaches(a, b),
            Axis::Ancestor => self.reaches(b, a),
            Axis::Sibling => a != b && self.to(a).any(|r| self.contains(r.source, b)),
        }
    }

    fn reaches(&self, from: NodeRef, to: NodeRef) -> bool {
        let mut visited = AHashSet::new();
        let mut stack: Vec<NodeRef> = self.successors(from).collect();
        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            if visited.insert(node) {
                stack.extend(self.successors(node));
            }
        }
        false
    }
}

/// Build the relationship set for `key` from the arc index.
pub fn build(index: &ArcIndex, key: &BaseSetKey) -> RelationshipSet {
    let mut effective: Vec<Relationship> = Vec::new();
    let mut ineffective = Vec::new();
    let mut source_rank: AHashMap<NodeRef, usize> = AHashMap::new();

    let concrete: Vec<&BaseSetKey> = index.keys().iter().filter(|k| key.matches(k)).collect();
    let mut all: Vec<&ArcRecord> = concrete.iter().flat_map(|k| index.arcs(k)).collect();
    all.sort_by_key(|r| r.seq);
    for record in &all {
        let next = source_rank.len();
        source_rank.entry(record.from).or_insert(next);
    }

    for concrete_key in &concrete {
        let mut groups: AHashMap<(NodeRef, NodeRef), Vec<&ArcRecord>> = AHashMap::new();
        let mut group_order = Vec::new();
        for record in index.arcs(concrete_key) {
            let pair = (record.from, record.to);
            groups
                .entry(pair)
                .or_insert_with(|| {
                    group_order.push(pair);
                    Vec::new()
                })
                .push(record);
        }

        for pair in group_order {
            let group = &groups[&pair];
            let max = group.iter().map(|r| r.priority).max().unwrap_or(0);
            let prohibited_at_max = group.iter().any(|r| r.priority == max && r.is_prohibited());
            let winner = if prohibited_at_max {
                None
            } else {
                group.iter().find(|r| r.priority == max).map(|r| r.seq)
            };

            for record in group {
                if Some(record.seq) == winner {
                    effective.push(Relationship::from_record(record, true));
                    continue;
                }
                let reason = match winner {
                    Some(_) => IneffectiveReason::Overridden,
                    None if record.priority == max && record.is_prohibited() => {
                        IneffectiveReason::Prohibiting
                    }
                    None => IneffectiveReason::Prohibited,
                };
                ineffective.push(IneffectiveArc {
                    relationship: Relationship::from_record(record, false),
                    reason,
                });
            }
        }
    }

    effective.sort_by(|a, b| {
        source_rank[&a.source]
            .cmp(&source_rank[&b.source])
            .then(canonical_order(a.order).total_cmp(&canonical_order(b.order)))
            .then(a.seq.cmp(&b.seq))
    });

    let explicit: AHashSet<usize> = all.iter().filter(|r| r.explicit_order).map(|r| r.seq).collect();
    let duplicate_orders = find_duplicate_orders(&effective, &explicit);

    let mut set = RelationshipSet {
        key: Some(key.clone()),
        relationships: effective,
        ineffective,
        duplicate_orders,
        ..Default::default()
    };
    for (i, rel) in set.relationships.iter().enumerate() {
        set.by_source.entry(rel.source).or_default().push(i);
        set.by_target.entry(rel.target).or_default().push(i);
    }
    tracing::debug!(
        key = %key,
        effective = set.relationships.len(),
        ineffective = set.ineffective.len(),
        "Built relationship set"
    );
    set
}

/// Folds `-0` into `0` so both compare and hash as one order.
fn canonical_order(order: f64) -> f64 {
    if order == 0.0 {
        0.0
    } else {
        order
    }
}

fn find_duplicate_orders(effective: &[Relationship], explicit: &AHashSet<usize>) -> Vec<DuplicateOrder> {
    let mut seen: AHashMap<(&BaseSetKey, NodeRef, u64), NodeRef> = AHashMap::new();
    let mut out = Vec::new();
    for rel in effective.iter().filter(|r| explicit.contains(&r.seq)) {
        let slot = (&rel.key, rel.source, canonical_order(rel.order).to_bits());
        match seen.get(&slot) {
            Some(&first) => out.push(DuplicateOrder {
                key: rel.key.clone(),
                source: rel.source,
                order: rel.order,
                first,
                second: rel.arc,
            }),
            None => {
                seen.insert(slot, rel.arc);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DocId, ElementId, LINK_NS};
    use crate::roles::{PARENT_CHILD, SUMMATION_ITEM};
    use pretty_assertions::assert_eq;

    fn node(n: u32) -> NodeRef {
        NodeRef::new(DocId(0), ElementId(n))
    }

    fn key(arcrole: &str, linkrole: &str) -> BaseSetKey {
        BaseSetKey::concrete(
            arcrole,
            linkrole,
            QName::new(LINK_NS, "presentationLink"),
            QName::new(LINK_NS, "presentationArc"),
        )
    }

    fn arc(key: &BaseSetKey, id: u32, from: u32, to: u32, priority: i32, arc_use: ArcUse) -> ArcRecord {
        let mut record = ArcRecord::new(key.clone(), node(100 + id), node(from), node(to));
        record.priority = priority;
        record.arc_use = arc_use;
        record
    }

    fn pairs(set: &RelationshipSet) -> Vec<(NodeRef, NodeRef)> {
        set.relationships().iter().map(|r| (r.source, r.target)).collect()
    }

    #[test]
    fn test_higher_priority_prohibition_removes_pair() {
        let k = key(PARENT_CHILD, "http://example.com/role/A");
        let mut index = ArcIndex::new();
        index.push(arc(&k, 0, 1, 2, 1, ArcUse::Optional));
        index.push(arc(&k, 1, 1, 2, 2, ArcUse::Prohibited));
        let set = build(&index, &k);
        assert!(set.is_empty());
        let reasons: Vec<_> = set.ineffective().iter().map(|a| a.reason).collect();
        assert_eq!(reasons, vec![IneffectiveReason::Prohibited, IneffectiveReason::Prohibiting]);
    }

    #[test]
    fn test_lower_priority_prohibition_is_overridden() {
        let k = key(PARENT_CHILD, "http://example.com/role/A");
        let mut index = ArcIndex::new();
        index.push(arc(&k, 0, 1, 2, 2, ArcUse::Optional));
        index.push(arc(&k, 1, 1, 2, 1, ArcUse::Prohibited));
        let set = build(&index, &k);
        assert_eq!(pairs(&set), vec![(node(1), node(2))]);
        assert_eq!(set.ineffective()[0].reason, IneffectiveReason::Overridden);
    }

    #[test]
    fn test_equal_priority_prohibition_wins() {
        let k = key(PARENT_CHILD, "http://example.com/role/A");
        let mut index = ArcIndex::new();
        index.push(arc(&k, 0, 1, 2, 0, ArcUse::Optional));
        index.push(arc(&k, 1, 1, 2, 0, ArcUse::Prohibited));
        assert!(build(&index, &k).is_empty());
    }

    #[test]
    fn test_first_discovered_arc_wins_at_equal_priority() {
        let k = key(PARENT_CHILD, "http://example.com/role/A");
        let mut index = ArcIndex::new();
        index.push(arc(&k, 0, 1, 2, 0, ArcUse::Optional));
        index.push(arc(&k, 1, 1, 2, 0, ArcUse::Optional));
        let set = build(&index, &k);
        assert_eq!(set.len(), 1);
        assert_eq!(set.relationships()[0].arc, node(100));
    }

    #[test]
    fn test_ordering_and_duplicate_orders() {
        let k = key(PARENT_CHILD, "http://example.com/role/A");
        let mut index = ArcIndex::new();
        for (id, from, to, order) in [(0, 5, 6, 3.0), (1, 1, 2, 2.0), (2, 1, 3, 1.0), (3, 5, 7, 3.0)] {
            let mut record = arc(&k, id, from, to, 0, ArcUse::Optional);
            record.order = order;
            record.explicit_order = true;
            index.push(record);
        }
        let set = build(&index, &k);
        assert_eq!(
            pairs(&set),
            vec![(node(5), node(6)), (node(5), node(7)), (node(1), node(3)), (node(1), node(2))]
        );
        assert_eq!(set.duplicate_orders().len(), 1);
        assert_eq!(set.duplicate_orders()[0].source, node(5));
        assert_eq!(set.roots(), vec![node(5), node(1)]);
    }

    #[test]
    fn test_negative_zero_order_duplicates_zero() {
        let k = key(PARENT_CHILD, "http://example.com/role/A");
        let mut index = ArcIndex::new();
        for (id, to, order) in [(0, 2, 0.0), (1, 3, -0.0)] {
            let mut record = arc(&k, id, 1, to, 0, ArcUse::Optional);
            record.order = order;
            record.explicit_order = true;
            index.push(record);
        }
        let set = build(&index, &k);
        assert_eq!(pairs(&set), vec![(node(1), node(2)), (node(1), node(3))]);
        assert_eq!(set.duplicate_orders().len(), 1);
        assert_eq!(set.duplicate_orders()[0].first, node(100));
        assert_eq!(set.duplicate_orders()[0].second, node(101));
    }

    #[test]
    fn test_default_orders_are_not_duplicates() {
        let k = key(PARENT_CHILD, "http://example.com/role/A");
        let mut index = ArcIndex::new();
        index.push(arc(&k, 0, 1, 2, 0, ArcUse::Optional));
        index.push(arc(&k, 1, 1, 3, 0, ArcUse::Optional));
        assert!(build(&index, &k).duplicate_orders().is_empty());
    }

    #[test]
    fn test_wildcard_key_merges_linkroles() {
        let a = key(PARENT_CHILD, "http://example.com/role/A");
        let b = key(PARENT_CHILD, "http://example.com/role/B");
        let c = key(SUMMATION_ITEM, "http://example.com/role/A");
        let mut index = ArcIndex::new();
        index.push(arc(&a, 0, 1, 2, 0, ArcUse::Optional));
        index.push(arc(&b, 1, 2, 3, 0, ArcUse::Optional));
        index.push(arc(&c, 2, 3, 4, 0, ArcUse::Optional));

        let set = build(&index, &BaseSetKey::new(PARENT_CHILD));
        assert_eq!(pairs(&set), vec![(node(1), node(2)), (node(2), node(3))]);
        assert!(set.is_related(node(1), Axis::Descendant, node(3)));
        assert!(set.is_related(node(3), Axis::Ancestor, node(1)));
        assert!(!set.is_related(node(1), Axis::Descendant, node(4)));

        let only_a = build(&index, &BaseSetKey::new(PARENT_CHILD).with_linkrole("http://example.com/role/A"));
        assert_eq!(only_a.len(), 1);
    }

    #[test]
    fn test_axes() {
        let k = key(PARENT_CHILD, "http://example.com/role/A");
        let mut index = ArcIndex::new();
        index.push(arc(&k, 0, 1, 2, 0, ArcUse::Optional));
        index.push(arc(&k, 1, 1, 3, 0, ArcUse::Optional));
        let set = build(&index, &k);
        assert!(set.is_related(node(1), Axis::Child, node(2)));
        assert!(set.is_related(node(2), Axis::Parent, node(1)));
        assert!(set.is_related(node(2), Axis::Sibling, node(3)));
        assert!(!set.is_related(node(2), Axis::Sibling, node(2)));
        assert!(!set.is_related(node(2), Axis::Child, node(1)));
    }
}
