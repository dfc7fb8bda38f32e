// Extension points for rule packs
use crate::diagnostics::DiagnosticSink;
use crate::dts::Dts;
use crate::model::Document;
use crate::relationships::RelationshipSet;

/// Runs once per document after its structural checks, in visit order.
pub trait OnDocumentVisited {
    fn on_document_visited(&self, dts: &Dts, doc: &Document, sink: &mut dyn DiagnosticSink);
}

impl<F> OnDocumentVisited for F
where
    F: Fn(&Dts, &Document, &mut dyn DiagnosticSink),
{
    fn on_document_visited(&self, dts: &Dts, doc: &Document, sink: &mut dyn DiagnosticSink) {
        self(dts, doc, sink)
    }
}

/// Runs once per concrete base set after it has been built.
pub trait OnRelationshipBuilt {
    fn on_relationship_built(&self, dts: &Dts, set: &RelationshipSet, sink: &mut dyn DiagnosticSink);
}

impl<F> OnRelationshipBuilt for F
where
    F: Fn(&Dts, &RelationshipSet, &mut dyn DiagnosticSink),
{
    fn on_relationship_built(&self, dts: &Dts, set: &RelationshipSet, sink: &mut dyn DiagnosticSink) {
        self(dts, set, sink)
    }
}
