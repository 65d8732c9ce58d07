mod common;

use annotator_rs::config::PdfStyle;
use annotator_rs::core::pdf_writer::PdfWriter;
use annotator_rs::core::writer::Writer;
use annotator_rs::error::AnnotateError;
use common::{file_names, pdf_bytes, shown_text};
use lopdf::{Document, Object};
use std::fs;
use std::path::Path;

#[test]
fn overlays_every_page() {
    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("out");
    fs::create_dir_all(&out_dir).unwrap();
    let input = dir.path().join("21001.pdf");
    let output = out_dir.join("21001_graded.pdf");
    let original = pdf_bytes(3);
    fs::write(&input, &original).unwrap();

    let writer = PdfWriter::new(
        PdfStyle::default(),
        dir.path().join("no-such-font.ttf"),
        out_dir.clone(),
    );
    writer.write_comment(&input, &output, "Good work").unwrap();

    assert_eq!(fs::read(&input).unwrap(), original);

    let doc = Document::load(&output).unwrap();
    let pages = doc.get_pages();
    assert_eq!(pages.len(), 3);
    for (number, page_id) in pages {
        let shown = shown_text(&doc, page_id);
        assert!(
            shown.iter().any(|t| t == &format!("Page {}", number)),
            "page {} lost its text: {:?}",
            number,
            shown
        );
        assert!(
            shown.iter().any(|t| t == "Comment: Good work"),
            "page {} has no comment: {:?}",
            number,
            shown
        );
    }

    // only the result remains; the overlay is gone
    assert_eq!(file_names(&out_dir), vec!["21001_graded.pdf".to_string()]);
}

#[test]
fn unusable_font_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("5.pdf");
    let output = dir.path().join("5_graded.pdf");
    let font = dir.path().join("broken.ttf");
    fs::write(&input, pdf_bytes(1)).unwrap();
    fs::write(&font, b"not a font").unwrap();

    let style = PdfStyle {
        prefix: "Note: ".to_string(),
        ..PdfStyle::default()
    };
    PdfWriter::new(style, font, dir.path().to_path_buf())
        .write_comment(&input, &output, "see page 2")
        .unwrap();

    let doc = Document::load(&output).unwrap();
    let page_id = *doc.get_pages().values().next().unwrap();
    assert!(shown_text(&doc, page_id)
        .iter()
        .any(|t| t == "Note: see page 2"));
}

#[test]
fn unreadable_pdf_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("out");
    fs::create_dir_all(&out_dir).unwrap();
    let input = dir.path().join("6.pdf");
    fs::write(&input, b"%PDF-1.4 garbage").unwrap();

    let result = PdfWriter::new(
        PdfStyle::default(),
        dir.path().join("no-such-font.ttf"),
        out_dir.clone(),
    )
    .write_comment(input.clone(), out_dir.join("6_graded.pdf"), "x");

    assert!(matches!(result, Err(AnnotateError::Pdf(_))));
    assert!(file_names(&out_dir).is_empty());
}

#[test]
fn embeds_configured_font_for_non_latin_text() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("8.pdf");
    let output = dir.path().join("8_graded.pdf");
    fs::write(&input, pdf_bytes(2)).unwrap();
    let font = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/RobotoMedium.ttf");

    PdfWriter::new(PdfStyle::default(), font, dir.path().to_path_buf())
        .write_comment(&input, &output, "Отлично, αρκετά καλό")
        .unwrap();

    let doc = Document::load(&output).unwrap();
    let deref = |object: &Object| match object {
        Object::Reference(id) => doc.get_object(*id).unwrap().clone(),
        other => other.clone(),
    };
    assert_eq!(doc.get_pages().len(), 2);
    for page_id in doc.get_pages().into_values() {
        let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
        let resources = deref(page.get(b"Resources").unwrap());
        let fonts = deref(resources.as_dict().unwrap().get(b"Font").unwrap());
        let overlay_fonts: Vec<Object> = fonts
            .as_dict()
            .unwrap()
            .iter()
            .filter(|(name, _)| name.starts_with(b"Overlay"))
            .map(|(_, font)| deref(font))
            .collect();
        assert_eq!(overlay_fonts.len(), 1);
        let font = overlay_fonts[0].as_dict().unwrap();
        assert_eq!(font.get(b"Subtype").unwrap().as_name().unwrap(), b"Type0");
        assert_ne!(font.get(b"BaseFont").unwrap().as_name().unwrap(), b"Helvetica");
        assert!(font.get(b"DescendantFonts").is_ok());
    }

    assert_eq!(
        file_names(dir.path()),
        vec!["8.pdf".to_string(), "8_graded.pdf".to_string()]
    );
}
