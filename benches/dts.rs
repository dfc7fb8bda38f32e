use crabdts::{DtsValidator, MemoryLoader};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

const CONCEPTS: usize = 500;
const LINKBASES: usize = 8;

/// A schema with `CONCEPTS` concepts and `LINKBASES` presentation
/// linkbases, each a tree over its slice of the concepts.
fn generated_dts() -> MemoryLoader {
    let mut schema = String::from(
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:link="http://www.xbrl.org/2003/linkbase"
    xmlns:xlink="http://www.w3.org/1999/xlink" xmlns:xbrli="http://www.xbrl.org/2003/instance"
    targetNamespace="http://example.com/bench"><xs:annotation><xs:appinfo>"#,
    );
    for l in 0..LINKBASES {
        schema.push_str(&format!(
            r#"<link:linkbaseRef xlink:type="simple" xlink:href="pre{}.xml" xlink:arcrole="http://www.w3.org/1999/xlink/properties/linkbase"/>"#,
            l
        ));
    }
    schema.push_str("</xs:appinfo></xs:annotation>");
    for c in 0..CONCEPTS {
        schema.push_str(&format!(
            r#"<xs:element name="C{0}" id="b_C{0}" substitutionGroup="xbrli:item"/>"#,
            c
        ));
    }
    schema.push_str("</xs:schema>");

    let mut loader = MemoryLoader::new().with("http://example.com/bench.xsd", schema);
    let per_linkbase = CONCEPTS / LINKBASES;
    for l in 0..LINKBASES {
        let mut body = String::new();
        let first = l * per_linkbase;
        for c in first..first + per_linkbase {
            body.push_str(&format!(
                r#"<link:loc xlink:type="locator" xlink:href="bench.xsd#b_C{0}" xlink:label="C{0}"/>"#,
                c
            ));
            if c > first {
                body.push_str(&format!(
                    r#"<link:presentationArc xlink:type="arc" xlink:arcrole="http://www.xbrl.org/2003/arcrole/parent-child" xlink:from="C{}" xlink:to="C{}" order="{}"/>"#,
                    first + (c - first - 1) / 2,
                    c,
                    c
                ));
            }
        }
        let linkbase = format!(
            r#"<link:linkbase xmlns:link="http://www.xbrl.org/2003/linkbase" xmlns:xlink="http://www.w3.org/1999/xlink">
<link:presentationLink xlink:type="extended" xlink:role="http://www.xbrl.org/2003/role/link">{}</link:presentationLink>
</link:linkbase>"#,
            body
        );
        loader.insert(&format!("http://example.com/pre{}.xml", l), linkbase);
    }
    loader
}

fn validate_generated_dts(c: &mut Criterion) {
    let validator = DtsValidator::new();
    c.bench_function("validate_generated_dts", |b| {
        b.iter(|| {
            let result = validator
                .validate(generated_dts(), black_box("http://example.com/bench.xsd"))
                .unwrap();
            black_box(result.stats.arcs)
        });
    });
}

criterion_group!(benches, validate_generated_dts);
criterion_main!(benches);
