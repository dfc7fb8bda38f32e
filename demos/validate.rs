//! Validation example

use crabdts::{codes, Dts, DtsValidator, Diagnostic, DiagnosticSink, Document, DocumentType, ErrorKind};
use std::env;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <entry-document>", args[0]);
        std::process::exit(1);
    }

    // A host rule: every linkbase must declare at least one roleRef
    let validator = DtsValidator::new().on_document_visited(
        |_: &Dts, doc: &Document, sink: &mut dyn DiagnosticSink| {
            if doc.doc_type == DocumentType::Linkbase
                && !doc.elements().any(|(_, e)| e.name.local == "roleRef")
            {
                sink.emit(
                    Diagnostic::warning(ErrorKind::Structural, "demo:noRoleRef", "{url} declares no roleRef")
                        .arg("url", &doc.url),
                );
            }
        },
    );

    let result = validator.validate_file(&args[1])?;
    if result.is_valid() {
        println!("✓ DTS is valid ({} documents)", result.stats.documents);
    } else {
        println!("✗ Validation failed");
    }
    for diagnostic in result.diagnostics.iter() {
        println!("  {}", diagnostic);
    }
    println!(
        "  calculation cycles: {}",
        result.diagnostics.count(codes::CALCULATION_CYCLE)
    );

    Ok(())
}
