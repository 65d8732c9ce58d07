#![allow(dead_code)]

use docx_rs::{Docx, Header, Paragraph, Run};
use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};
use printpdf::{BuiltinFont, Mm, PdfDocument};
use std::collections::BTreeMap;
use std::io::{BufWriter, Cursor, Read};
use std::path::Path;
use zip::ZipArchive;

pub const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

pub fn docx_bytes(body: &[&str], header: Option<&str>) -> Vec<u8> {
    let mut docx = Docx::new();
    if let Some(text) = header {
        docx = docx.header(Header::new().add_paragraph(
            Paragraph::new().add_run(Run::new().add_text(text)),
        ));
    }
    for line in body {
        docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(*line)));
    }
    let mut buf = Cursor::new(Vec::new());
    docx.build().pack(&mut buf).unwrap();
    buf.into_inner()
}

pub fn pdf_bytes(pages: usize) -> Vec<u8> {
    let (doc, page1, layer1) = PdfDocument::new("homework", Mm(210.0), Mm(297.0), "Layer 1");
    let font = doc.add_builtin_font(BuiltinFont::Helvetica).unwrap();
    doc.get_page(page1)
        .get_layer(layer1)
        .use_text("Page 1", 14.0, Mm(20.0), Mm(270.0), &font);
    for n in 2..=pages {
        let (page, layer) = doc.add_page(Mm(210.0), Mm(297.0), "Layer 1");
        doc.get_page(page)
            .get_layer(layer)
            .use_text(format!("Page {}", n), 14.0, Mm(20.0), Mm(270.0), &font);
    }
    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf).unwrap();
    buf.into_inner().unwrap()
}

/// Decompressed zip entries by name.
pub fn zip_entries(bytes: &[u8]) -> BTreeMap<String, Vec<u8>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    (0..archive.len())
        .map(|i| {
            let mut file = archive.by_index(i).unwrap();
            let mut content = Vec::new();
            file.read_to_end(&mut content).unwrap();
            (file.name().to_string(), content)
        })
        .collect()
}

/// Text of every red run in a header part, `w:br` rendered as `\n`.
pub fn red_runs(xml: &str) -> Vec<String> {
    let doc = roxmltree::Document::parse(xml).unwrap();
    doc.descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "r")
        .filter(|r| {
            r.descendants().any(|c| {
                c.tag_name().name() == "color" && c.attribute((W_NS, "val")) == Some("FF0000")
            })
        })
        .map(|r| {
            r.descendants()
                .filter(|c| c.is_element())
                .filter_map(|c| match c.tag_name().name() {
                    "t" => Some(c.text().unwrap_or("").to_string()),
                    "br" => Some("\n".to_string()),
                    _ => None,
                })
                .collect()
        })
        .collect()
}

/// Alignment of the paragraph holding the first red run.
pub fn red_run_alignment(xml: &str) -> Option<String> {
    let doc = roxmltree::Document::parse(xml).unwrap();
    let run = doc.descendants().find(|n| {
        n.is_element()
            && n.tag_name().name() == "r"
            && n.descendants().any(|c| c.tag_name().name() == "color")
    })?;
    let paragraph = run.ancestors().find(|n| n.tag_name().name() == "p")?;
    paragraph
        .descendants()
        .find(|n| n.tag_name().name() == "jc")
        .and_then(|jc| jc.attribute((W_NS, "val")))
        .map(str::to_string)
}

/// Strings shown by `Tj`/`TJ` on a page.
pub fn shown_text(doc: &Document, page_id: ObjectId) -> Vec<String> {
    let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
    content
        .operations
        .iter()
        .filter(|op| op.operator == "Tj" || op.operator == "TJ")
        .flat_map(|op| op.operands.iter())
        .flat_map(|operand| match operand {
            Object::Array(items) => items.clone(),
            other => vec![other.clone()],
        })
        .filter_map(|operand| match operand {
            Object::String(bytes, _) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            _ => None,
        })
        .collect()
}

pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
