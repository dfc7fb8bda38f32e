// Inline continuation chains
use crate::diagnostics::{codes, Diagnostic, DiagnosticSink, ErrorKind, ObjectRef};
use crate::model::*;
use ahash::AHashMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContinuationError {
    #[error("continuedAt \"{id}\" does not match any element")]
    MissingTarget { from: ElementId, id: String },

    #[error("continuedAt \"{id}\" targets an element that is not a continuation")]
    NotContinuation { from: ElementId, target: ElementId, id: String },

    #[error("continuation chain returns to \"{id}\"")]
    Circular { from: ElementId, id: String },

    #[error("continuation chain members are nested")]
    Nested { ancestor: ElementId, descendant: ElementId },
}

impl ContinuationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingTarget { .. } => codes::CONTINUATION_TARGET,
            Self::NotContinuation { .. } => codes::CONTINUATION_NOT_CONTINUATION,
            Self::Circular { .. } => codes::CONTINUATION_CIRCULAR,
            Self::Nested { .. } => codes::CONTINUATION_NESTED,
        }
    }

    pub fn to_diagnostic(&self, doc: &Document) -> Diagnostic {
        let d = |template: &'static str| Diagnostic::error(ErrorKind::Continuation, self.code(), template);
        match self {
            Self::MissingTarget { from, id } => d("continuedAt \"{id}\" does not match any element")
                .arg("id", id)
                .object(ObjectRef::new(doc, *from)),
            Self::NotContinuation { from, target, id } => {
                d("continuedAt \"{id}\" targets {element}, which is not a continuation")
                    .arg("id", id)
                    .arg("element", &doc.element(*target).name)
                    .object(ObjectRef::new(doc, *from))
                    .object(ObjectRef::new(doc, *target))
            }
            Self::Circular { from, id } => d("Continuation chain returns to \"{id}\"")
                .arg("id", id)
                .object(ObjectRef::new(doc, *from)),
            Self::Nested { ancestor, descendant } => d("Continuation chain member {descendant} is nested in {ancestor}")
                .arg("ancestor", describe(doc, *ancestor))
                .arg("descendant", describe(doc, *descendant))
                .object(ObjectRef::new(doc, *ancestor))
                .object(ObjectRef::new(doc, *descendant)),
        }
    }
}

fn describe(doc: &Document, element: ElementId) -> String {
    let el = doc.element(element);
    match el.id() {
        Some(id) => format!("{} \"{}\"", el.name, id),
        None => format!("{} (line {})", el.name, el.line),
    }
}

fn is_continuation(el: &Element) -> bool {
    is_inline_ns(&el.name.namespace) && el.name.local == "continuation"
}

/// Follow `continuedAt` from `start`. Returns the members reached before
/// any failure together with the failure.
fn follow(doc: &Document, start: ElementId) -> (Vec<ElementId>, Option<ContinuationError>) {
    let mut chain = vec![start];
    let mut current = start;
    while let Some(raw) = doc.element(current).attr_local("continuedAt") {
        let id = raw.trim().to_string();
        let target = match doc.by_id(&id) {
            Some(target) => target,
            None => return (chain, Some(ContinuationError::MissingTarget { from: current, id })),
        };
        if !is_continuation(doc.element(target)) {
            return (
                chain,
                Some(ContinuationError::NotContinuation {
                    from: current,
                    target,
                    id,
                }),
            );
        }
        if chain.contains(&target) {
            return (chain, Some(ContinuationError::Circular { from: current, id }));
        }
        for &member in &chain {
            if doc.is_ancestor(member, target) {
                return (chain, Some(ContinuationError::Nested { ancestor: member, descendant: target }));
            }
            if doc.is_ancestor(target, member) {
                return (chain, Some(ContinuationError::Nested { ancestor: target, descendant: member }));
            }
        }
        chain.push(target);
        current = target;
    }
    (chain, None)
}

/// The ordered chain starting at `start`, `start` included.
pub fn resolve_chain(doc: &Document, start: ElementId) -> Result<Vec<ElementId>, ContinuationError> {
    match follow(doc, start) {
        (chain, None) => Ok(chain),
        (_, Some(e)) => Err(e),
    }
}

/// Check every chain of an inline document, then report continuations
/// reached from more than one chain or from none.
pub fn check_document(doc: &Document, sink: &mut dyn DiagnosticSink) {
    let mut reached_from: AHashMap<ElementId, ElementId> = AHashMap::new();
    let starts: Vec<ElementId> = doc
        .elements()
        .filter(|(_, el)| {
            is_inline_ns(&el.name.namespace) && !is_continuation(el) && el.attr_local("continuedAt").is_some()
        })
        .map(|(id, _)| id)
        .collect();

    for start in starts {
        let (chain, error) = follow(doc, start);
        if let Some(error) = error {
            sink.emit(error.to_diagnostic(doc));
        }
        for &member in chain.iter().skip(1) {
            match reached_from.get(&member) {
                Some(&first) if first != start => sink.emit(
                    Diagnostic::error(
                        ErrorKind::Continuation,
                        codes::CONTINUATION_REUSED,
                        "Continuation {continuation} is reached from both {first} and {second}",
                    )
                    .arg("continuation", describe(doc, member))
                    .arg("first", describe(doc, first))
                    .arg("second", describe(doc, start))
                    .object(ObjectRef::new(doc, member)),
                ),
                Some(_) => {}
                None => {
                    reached_from.insert(member, start);
                }
            }
        }
    }

    for (id, el) in doc.elements() {
        if is_continuation(el) && !reached_from.contains_key(&id) {
            sink.emit(
                Diagnostic::error(
                    ErrorKind::Continuation,
                    codes::CONTINUATION_UNREFERENCED,
                    "Continuation {continuation} is not part of any chain",
                )
                .arg("continuation", describe(doc, id))
                .object(ObjectRef::new(doc, id)),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::parser::parse_document;
    use pretty_assertions::assert_eq;

    fn inline(body: &str) -> Document {
        let html = format!(
            r#"<html xmlns="http://www.w3.org/1999/xhtml" xmlns:ix="http://www.xbrl.org/2013/inlineXBRL"><body>{}</body></html>"#,
            body
        );
        parse_document(DocId(0), "http://example.com/report.html", html.as_bytes()).unwrap()
    }

    fn ids(doc: &Document, chain: &[ElementId]) -> Vec<String> {
        chain
            .iter()
            .map(|&e| doc.element(e).id().unwrap_or("").to_string())
            .collect()
    }

    #[test]
    fn test_sibling_chain_resolves_in_order() {
        let doc = inline(
            r#"<div><ix:nonNumeric id="f" name="ex:T" contextRef="c" continuedAt="c1">a</ix:nonNumeric></div>
<div><ix:continuation id="c1" continuedAt="c2">b</ix:continuation></div>
<div><ix:continuation id="c2">c</ix:continuation></div>"#,
        );
        let start = doc.by_id("f").unwrap();
        let chain = resolve_chain(&doc, start).unwrap();
        assert_eq!(ids(&doc, &chain), vec!["f", "c1", "c2"]);

        let mut sink = Diagnostics::new();
        check_document(&doc, &mut sink);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_nested_member_names_both_elements() {
        let doc = inline(
            r#"<div><ix:nonNumeric id="f" name="ex:T" contextRef="c" continuedAt="c1">a</ix:nonNumeric></div>
<ix:continuation id="c1" continuedAt="c2">b<span><ix:continuation id="c2">c</ix:continuation></span></ix:continuation>"#,
        );
        let start = doc.by_id("f").unwrap();
        let err = resolve_chain(&doc, start).unwrap_err();
        let c1 = doc.by_id("c1").unwrap();
        let c2 = doc.by_id("c2").unwrap();
        assert_eq!(err, ContinuationError::Nested { ancestor: c1, descendant: c2 });

        let message = err.to_diagnostic(&doc).message();
        assert!(message.contains("\"c1\""));
        assert!(message.contains("\"c2\""));
    }

    #[test]
    fn test_third_member_nested_in_start() {
        let doc = inline(
            r#"<div><ix:nonNumeric id="f" name="ex:T" contextRef="c" continuedAt="c1">a<span><ix:continuation id="c2">c</ix:continuation></span></ix:nonNumeric></div>
<div><ix:continuation id="c1" continuedAt="c2">b</ix:continuation></div>"#,
        );
        let f = doc.by_id("f").unwrap();
        let c2 = doc.by_id("c2").unwrap();
        let err = resolve_chain(&doc, f).unwrap_err();
        assert_eq!(err, ContinuationError::Nested { ancestor: f, descendant: c2 });

        let mut sink = Diagnostics::new();
        check_document(&doc, &mut sink);
        assert_eq!(sink.count(codes::CONTINUATION_NESTED), 1);
    }

    #[test]
    fn test_missing_and_wrong_targets() {
        let doc = inline(
            r#"<ix:nonNumeric id="f" name="ex:T" contextRef="c" continuedAt="nope">a</ix:nonNumeric>
<ix:nonNumeric id="g" name="ex:T" contextRef="c" continuedAt="f">b</ix:nonNumeric>"#,
        );
        let f = doc.by_id("f").unwrap();
        let g = doc.by_id("g").unwrap();
        assert!(matches!(resolve_chain(&doc, f), Err(ContinuationError::MissingTarget { .. })));
        assert!(matches!(resolve_chain(&doc, g), Err(ContinuationError::NotContinuation { .. })));
    }

    #[test]
    fn test_circular_chain() {
        let doc = inline(
            r#"<ix:nonNumeric id="f" name="ex:T" contextRef="c" continuedAt="c1">a</ix:nonNumeric>
<ix:continuation id="c1" continuedAt="c2">b</ix:continuation>
<ix:continuation id="c2" continuedAt="c1">c</ix:continuation>"#,
        );
        let f = doc.by_id("f").unwrap();
        assert!(matches!(resolve_chain(&doc, f), Err(ContinuationError::Circular { .. })));
    }

    #[test]
    fn test_reused_and_unreferenced() {
        let doc = inline(
            r#"<ix:nonNumeric id="f" name="ex:T" contextRef="c" continuedAt="c1">a</ix:nonNumeric>
<ix:footnote id="n" continuedAt="c1">b</ix:footnote>
<ix:continuation id="c1">c</ix:continuation>
<ix:continuation id="lost">d</ix:continuation>"#,
        );
        let mut sink = Diagnostics::new();
        check_document(&doc, &mut sink);
        assert_eq!(sink.count(codes::CONTINUATION_REUSED), 1);
        assert_eq!(sink.count(codes::CONTINUATION_UNREFERENCED), 1);
        assert_eq!(sink.len(), 2);
    }
}
