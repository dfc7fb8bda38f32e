// XML parsing into the element arena backing a Document
use crate::model::*;
use crate::uri;
use ahash::AHashMap;
use compact_str::CompactString;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (line {line})")]
pub struct ParseError {
    pub message: String,
    pub line: u32,
}

/// Parse `data` as the document at canonical `url`.
pub fn parse_document(id: DocId, url: &str, data: &[u8]) -> Result<Document, ParseError> {
    // Skip BOM if present
    let data = if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        &data[3..]
    } else {
        data
    };

    let mut builder = TreeBuilder::new(data);
    let mut reader = NsReader::from_reader(data);

    loop {
        let position = reader.buffer_position() as usize;
        let line = builder.line_at(position);
        let (resolved, event) = reader
            .read_resolved_event()
            .map_err(|e| ParseError { message: e.to_string(), line })?;
        let namespace = owned_namespace(resolved).map_err(|message| ParseError { message, line })?;

        match event {
            Event::Start(ref start) => {
                let element = builder.element(&reader, start, namespace, line)?;
                builder.open(element, line)?;
            }
            Event::Empty(ref start) => {
                let element = builder.element(&reader, start, namespace, line)?;
                builder.open(element, line)?;
                builder.close();
            }
            Event::End(_) => builder.close(),
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| ParseError { message: e.to_string(), line })?;
                builder.text(&text);
            }
            Event::CData(cdata) => {
                let text = std::str::from_utf8(&cdata).map_err(|e| ParseError {
                    message: e.to_string(),
                    line,
                })?;
                builder.text(text);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    builder.finish(id, url)
}

fn owned_namespace(resolved: ResolveResult<'_>) -> Result<CompactString, String> {
    match resolved {
        ResolveResult::Bound(Namespace(ns)) => Ok(CompactString::from(String::from_utf8_lossy(ns))),
        ResolveResult::Unbound => Ok(CompactString::default()),
        ResolveResult::Unknown(prefix) => Err(format!(
            "undeclared namespace prefix \"{}\"",
            String::from_utf8_lossy(&prefix)
        )),
    }
}

struct TreeBuilder<'a> {
    data: &'a [u8],
    elements: Vec<Element>,
    stack: Vec<ElementId>,
    ids: AHashMap<CompactString, ElementId>,
    duplicate_ids: Vec<(CompactString, ElementId)>,
    line_pos: usize,
    line: u32,
}

impl<'a> TreeBuilder<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            elements: Vec::new(),
            stack: Vec::new(),
            ids: AHashMap::new(),
            duplicate_ids: Vec::new(),
            line_pos: 0,
            line: 1,
        }
    }

    /// Line number at byte `position`; positions only move forward.
    fn line_at(&mut self, position: usize) -> u32 {
        let position = position.min(self.data.len());
        if position > self.line_pos {
            let newlines = self.data[self.line_pos..position]
                .iter()
                .filter(|&&b| b == b'\n')
                .count();
            self.line += newlines as u32;
            self.line_pos = position;
        }
        self.line
    }

    fn element(
        &self,
        reader: &NsReader<&[u8]>,
        start: &BytesStart<'_>,
        namespace: CompactString,
        line: u32,
    ) -> Result<Element, ParseError> {
        let err = |message: String| ParseError { message, line };
        let local = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut name = QName::new(&namespace, &local);
        if let Some(prefix) = start.name().prefix() {
            name = name.with_prefix(&String::from_utf8_lossy(prefix.as_ref()));
        }

        let mut attributes = Vec::new();
        let mut namespaces = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| err(e.to_string()))?;
            let value = attr
                .unescape_value()
                .map_err(|e| err(e.to_string()))?
                .into_owned();
            let key = attr.key.as_ref();
            if key == b"xmlns" {
                namespaces.push((CompactString::default(), CompactString::from(value)));
                continue;
            }
            if let Some(prefix) = key.strip_prefix(b"xmlns:") {
                namespaces.push((
                    CompactString::from(String::from_utf8_lossy(prefix)),
                    CompactString::from(value),
                ));
                continue;
            }
            let (resolved, attr_local) = reader.resolve_attribute(attr.key);
            let attr_ns = owned_namespace(resolved).map_err(err)?;
            let mut attr_name = QName::new(&attr_ns, &String::from_utf8_lossy(attr_local.as_ref()));
            if let Some(prefix) = attr.key.prefix() {
                attr_name = attr_name.with_prefix(&String::from_utf8_lossy(prefix.as_ref()));
            }
            attributes.push(Attribute { name: attr_name, value });
        }

        Ok(Element {
            name,
            attributes,
            namespaces,
            parent: None,
            children: Vec::new(),
            text: String::new(),
            line,
        })
    }

    fn open(&mut self, mut element: Element, line: u32) -> Result<(), ParseError> {
        let id = ElementId(self.elements.len() as u32);
        match self.stack.last() {
            Some(&parent) => {
                element.parent = Some(parent);
                self.elements[parent.index()].children.push(id);
            }
            None if !self.elements.is_empty() => {
                return Err(ParseError {
                    message: "multiple root elements".to_string(),
                    line,
                });
            }
            None => {}
        }
        if let Some(value) = element.id() {
            let key = CompactString::from(value);
            if self.ids.contains_key(&key) {
                self.duplicate_ids.push((key, id));
            } else {
                self.ids.insert(key, id);
            }
        }
        self.elements.push(element);
        self.stack.push(id);
        Ok(())
    }

    fn close(&mut self) {
        self.stack.pop();
    }

    fn text(&mut self, text: &str) {
        if let Some(&current) = self.stack.last() {
            self.elements[current.index()].text.push_str(text);
        }
    }

    fn finish(self, id: DocId, url: &str) -> Result<Document, ParseError> {
        if self.elements.is_empty() {
            return Err(ParseError {
                message: "missing root element".to_string(),
                line: self.line,
            });
        }
        if let Some(&open) = self.stack.last() {
            return Err(ParseError {
                message: format!("unclosed element {}", self.elements[open.index()].name),
                line: self.line,
            });
        }

        let mut doc = Document {
            id,
            url: url.to_string(),
            doc_type: DocumentType::Other,
            target_namespace: None,
            in_dts: false,
            references: Vec::new(),
            bad_references: Vec::new(),
            duplicate_ids: self.duplicate_ids,
            elements: self.elements,
            root: ElementId(0),
            ids: self.ids,
        };
        doc.doc_type = classify(&doc);
        if doc.doc_type == DocumentType::Schema {
            doc.target_namespace = doc
                .root_element()
                .attr_local("targetNamespace")
                .map(str::to_string);
        }
        collect_references(&mut doc);
        Ok(doc)
    }
}

fn classify(doc: &Document) -> DocumentType {
    let root = &doc.root_element().name;
    if root.is(XSD_NS, "schema") {
        DocumentType::Schema
    } else if root.is(LINK_NS, "linkbase") {
        DocumentType::Linkbase
    } else if root.is(XBRLI_NS, "xbrl") {
        DocumentType::Instance
    } else if root.local == "html" && doc.elements().any(|(_, e)| is_inline_ns(&e.name.namespace)) {
        DocumentType::InlineInstance
    } else {
        DocumentType::Other
    }
}

/// Record every document this one points at, first kind wins.
fn collect_references(doc: &mut Document) {
    let mut found: Vec<(ElementId, String, ReferenceKind)> = Vec::new();
    for (id, el) in doc.elements() {
        if el.is(XSD_NS, "import") || el.is(XSD_NS, "include") {
            if let Some(location) = el.attr_local("schemaLocation") {
                let kind = if el.name.local == "import" {
                    ReferenceKind::Import
                } else {
                    ReferenceKind::Include
                };
                found.push((id, location.to_string(), kind));
            }
            continue;
        }
        let href = match el.xlink("href") {
            Some(href) => href,
            None => continue,
        };
        if el.is(LINK_NS, "linkbaseRef") {
            found.push((id, href.to_string(), ReferenceKind::LinkbaseRef));
        } else if matches!(el.xlink_type(), Some(XLinkType::Simple) | Some(XLinkType::Locator)) {
            found.push((id, href.to_string(), ReferenceKind::Href));
        }
    }

    for (element, href, kind) in found {
        let (location, _) = uri::split_href(&href);
        if location.trim().is_empty() {
            continue;
        }
        match uri::canonicalize(Some(&doc.url), location) {
            Ok(url) => {
                if url != doc.url && !doc.references.iter().any(|r| r.url == url) {
                    doc.references.push(DocumentReference { url, kind, element });
                }
            }
            Err(reason) => doc.bad_references.push(BadReference { element, href, reason }),
        }
    }
}
