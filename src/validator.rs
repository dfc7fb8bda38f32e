// DTS validation: discovery walk followed by relationship passes
use crate::config::{ValidationConfig, ValidationFlags};
use crate::continuation;
use crate::cycles::{distinct_cycles, TupleGraph};
use crate::diagnostics::{codes, Diagnostic, DiagnosticSink, Diagnostics, ErrorKind};
use crate::dts::Dts;
use crate::hooks::{OnDocumentVisited, OnRelationshipBuilt};
use crate::loader::{DocumentLoader, FileLoader};
use crate::model::{DocumentType, NodeRef};
use crate::registry::DocumentRegistry;
use crate::relationships::RelationshipSet;
use crate::roles::{CyclesAllowed, SUMMATION_ITEM};
use crate::rules::{ConfiguredRules, RulePack};
use crate::walker::Walker;
use crate::{Error, Result, ValidationResult, ValidationStats};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

pub struct DtsValidator {
    config: ValidationConfig,
    rules: Arc<dyn RulePack>,
    document_hooks: Vec<Box<dyn OnDocumentVisited>>,
    relationship_hooks: Vec<Box<dyn OnRelationshipBuilt>>,
}

impl Default for DtsValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl DtsValidator {
    pub fn new() -> Self {
        Self::with_config(ValidationConfig::default())
    }

    pub fn with_config(config: ValidationConfig) -> Self {
        let rules = Arc::new(ConfiguredRules::from_config(&config));
        Self {
            config,
            rules,
            document_hooks: Vec::new(),
            relationship_hooks: Vec::new(),
        }
    }

    pub fn with_rules(mut self, rules: impl RulePack + 'static) -> Self {
        self.rules = Arc::new(rules);
        self
    }

    pub fn on_document_visited(mut self, hook: impl OnDocumentVisited + 'static) -> Self {
        self.document_hooks.push(Box::new(hook));
        self
    }

    pub fn on_relationship_built(mut self, hook: impl OnRelationshipBuilt + 'static) -> Self {
        self.relationship_hooks.push(Box::new(hook));
        self
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Validate the DTS rooted at a local file, honoring configured URL
    /// mappings.
    pub fn validate_file<P: AsRef<Path>>(&self, path: P) -> Result<ValidationResult> {
        let loader = FileLoader::new().with_mappings(self.config.url_mappings.clone());
        let entry = path.as_ref().to_string_lossy().into_owned();
        self.validate(loader, &entry)
    }

    pub fn validate(&self, loader: impl DocumentLoader + 'static, entry: &str) -> Result<ValidationResult> {
        let start = Instant::now();
        let mut registry = DocumentRegistry::new(loader);
        let entry_id = registry.load(entry).map_err(|source| Error::EntryDocument {
            url: entry.to_string(),
            source,
        })?;

        tracing::info!(entry, rules = self.rules.name(), "Validating DTS");
        let mut dts = Dts::new(registry, Arc::clone(&self.rules), entry_id);
        let mut diagnostics = Diagnostics::new();
        Walker::new(&mut dts, &self.config, &self.document_hooks, &mut diagnostics).run();
        self.relationship_passes(&dts, &mut diagnostics);
        if self.config.enabled(ValidationFlags::TUPLE_CYCLES) {
            check_tuple_cycles(&dts, &mut diagnostics);
        }
        if self.config.enabled(ValidationFlags::CONTINUATIONS) {
            for doc in dts.documents().filter(|d| d.doc_type == DocumentType::InlineInstance) {
                continuation::check_document(doc, &mut diagnostics);
            }
        }

        let stats = ValidationStats {
            documents: dts.len(),
            base_sets: dts.base_set_keys().len(),
            arcs: dts.arcs().len(),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        tracing::info!(
            documents = stats.documents,
            base_sets = stats.base_sets,
            errors = diagnostics.errors().count(),
            warnings = diagnostics.warnings().count(),
            duration_ms = stats.duration_ms,
            "Validation finished"
        );
        Ok(ValidationResult {
            dts,
            diagnostics,
            stats,
            strict: self.config.strict,
        })
    }

    fn relationship_passes(&self, dts: &Dts, sink: &mut dyn DiagnosticSink) {
        for key in dts.base_set_keys().to_vec() {
            let set = dts.base_set(&key);

            if self.config.enabled(ValidationFlags::DUPLICATE_ORDERS) {
                for dup in set.duplicate_orders() {
                    sink.emit(
                        Diagnostic::warning(
                            ErrorKind::Structural,
                            codes::DUPLICATE_ORDER,
                            "Relationships from {source} in {baseSet} share order {order}",
                        )
                        .arg("source", dts.describe(dup.source))
                        .arg("baseSet", &dup.key)
                        .arg("order", dup.order)
                        .object(dts.object_ref(dup.first))
                        .object(dts.object_ref(dup.second)),
                    );
                }
            }

            let code = if key.arcrole == SUMMATION_ITEM {
                self.config
                    .enabled(ValidationFlags::CALCULATION_CYCLES)
                    .then_some(codes::CALCULATION_CYCLE)
            } else {
                let directed_allowed = dts.roles().cycles_allowed(&key.arcrole) == CyclesAllowed::Any;
                (!directed_allowed && self.config.enabled(ValidationFlags::ARCROLE_CYCLES))
                    .then_some(codes::DIRECTED_CYCLE)
            };
            if let Some(code) = code {
                for cycle in find_cycles(&set) {
                    sink.emit(cycle_diagnostic(dts, code, &cycle).arg("arcrole", &key.arcrole));
                }
            }

            for hook in &self.relationship_hooks {
                hook.on_relationship_built(dts, &set, sink);
            }
        }
    }
}

fn find_cycles(set: &RelationshipSet) -> Vec<Vec<NodeRef>> {
    distinct_cycles(set.sources(), |n| set.successors(n).collect::<Vec<_>>())
}

fn cycle_diagnostic(dts: &Dts, code: &str, cycle: &[NodeRef]) -> Diagnostic {
    let chain = cycle.iter().map(|&n| dts.describe(n)).collect::<Vec<_>>().join(" -> ");
    let template = if code == codes::TUPLE_CYCLE {
        "Tuple {origin} contains itself: {chain}"
    } else {
        "Directed cycle from {origin} in {arcrole} relationships: {chain}"
    };
    let mut diagnostic = Diagnostic::error(ErrorKind::Cycle, code, template)
        .arg("origin", dts.describe(cycle[0]))
        .arg("chain", chain);
    for &node in &cycle[..cycle.len() - 1] {
        diagnostic = diagnostic.object(dts.object_ref(node));
    }
    diagnostic
}

fn check_tuple_cycles(dts: &Dts, sink: &mut dyn DiagnosticSink) {
    let graph = TupleGraph::build(dts.registry(), &dts.concepts);
    for cycle in graph.cycles() {
        sink.emit(cycle_diagnostic(dts, codes::TUPLE_CYCLE, &cycle));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MemoryLoader;
    use crate::model::Document;
    use std::cell::Cell;
    use std::rc::Rc;

    const CALC_SCHEMA: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:link="http://www.xbrl.org/2003/linkbase"
    xmlns:xlink="http://www.w3.org/1999/xlink" xmlns:ex="http://example.com/ex" targetNamespace="http://example.com/ex">
  <xs:annotation><xs:appinfo>
    <link:linkbaseRef xlink:type="simple" xlink:href="cal.xml" xlink:arcrole="http://www.w3.org/1999/xlink/properties/linkbase"/>
  </xs:appinfo></xs:annotation>
  <xs:element name="A" id="ex_A"/>
  <xs:element name="B" id="ex_B"/>
  <xs:element name="C" id="ex_C"/>
  <xs:element name="D" id="ex_D"/>
</xs:schema>"#;

    fn calc_linkbase(edges: &[(&str, &str)]) -> String {
        let mut locs = String::new();
        for name in ["A", "B", "C", "D"] {
            locs.push_str(&format!(
                r#"<link:loc xlink:type="locator" xlink:href="ex.xsd#ex_{0}" xlink:label="{0}"/>"#,
                name
            ));
        }
        let arcs: String = edges
            .iter()
            .map(|(from, to)| {
                format!(
                    r#"<link:calculationArc xlink:type="arc" xlink:arcrole="http://www.xbrl.org/2003/arcrole/summation-item" xlink:from="{}" xlink:to="{}" weight="1"/>"#,
                    from, to
                )
            })
            .collect();
        format!(
            r#"<link:linkbase xmlns:link="http://www.xbrl.org/2003/linkbase" xmlns:xlink="http://www.w3.org/1999/xlink">
<link:calculationLink xlink:type="extended" xlink:role="http://www.xbrl.org/2003/role/link">{}{}</link:calculationLink>
</link:linkbase>"#,
            locs, arcs
        )
    }

    fn loader(edges: &[(&str, &str)]) -> MemoryLoader {
        MemoryLoader::new()
            .with("http://example.com/ex.xsd", CALC_SCHEMA)
            .with("http://example.com/cal.xml", calc_linkbase(edges))
    }

    #[test]
    fn test_calculation_cycle_reported_once() {
        let result = DtsValidator::new()
            .validate(loader(&[("A", "B"), ("B", "C"), ("C", "A"), ("D", "A")]), "http://example.com/ex.xsd")
            .unwrap();
        assert_eq!(result.diagnostics.count(codes::CALCULATION_CYCLE), 1, "{:?}", result.diagnostics);
        let cycle = result.diagnostics.with_code(codes::CALCULATION_CYCLE).next().unwrap();
        assert_eq!(cycle.get("chain"), Some("ex:A -> ex:B -> ex:C -> ex:A"));
        assert!(!result.is_valid());
    }

    #[test]
    fn test_acyclic_calculation_is_valid() {
        let result = DtsValidator::new()
            .validate(loader(&[("A", "B"), ("A", "C"), ("B", "D"), ("C", "D")]), "http://example.com/ex.xsd")
            .unwrap();
        assert!(result.is_valid(), "{:?}", result.diagnostics);
        assert_eq!(result.stats.documents, 2);
        assert_eq!(result.stats.arcs, 4);
    }

    #[test]
    fn test_cycle_pass_can_be_disabled() {
        let config = ValidationConfig::default().without(ValidationFlags::CALCULATION_CYCLES);
        let result = DtsValidator::with_config(config)
            .validate(loader(&[("A", "B"), ("B", "A")]), "http://example.com/ex.xsd")
            .unwrap();
        assert!(result.is_valid());
    }

    #[test]
    fn test_entry_failure_aborts() {
        let err = DtsValidator::new()
            .validate(MemoryLoader::new(), "http://example.com/none.xsd")
            .err()
            .unwrap();
        assert!(matches!(err, Error::EntryDocument { .. }));
    }

    #[test]
    fn test_hooks_run_in_order() {
        let visited = Rc::new(Cell::new(0));
        let built = Rc::new(Cell::new(0));
        let (v, b) = (visited.clone(), built.clone());
        let result = DtsValidator::new()
            .on_document_visited(move |_: &Dts, _: &Document, _: &mut dyn DiagnosticSink| v.set(v.get() + 1))
            .on_relationship_built(move |_: &Dts, set: &RelationshipSet, sink: &mut dyn DiagnosticSink| {
                b.set(b.get() + 1);
                if set.len() > 1 {
                    sink.emit(Diagnostic::warning(ErrorKind::Structural, "custom:large", "large set"));
                }
            })
            .validate(loader(&[("A", "B"), ("A", "C")]), "http://example.com/ex.xsd")
            .unwrap();
        assert_eq!(visited.get(), 2);
        assert_eq!(built.get(), 1);
        assert_eq!(result.diagnostics.count("custom:large"), 1);
        assert!(result.is_valid());
        assert!(!result.is_valid_strict());
    }
}
