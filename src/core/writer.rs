use crate::config::WordStyle;
use crate::error::AnnotateError;
use log::debug;
use roxmltree::{Document, Node};
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const HEADER_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/header";
const HEADER_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.header+xml";

const DOCUMENT_PART: &str = "word/document.xml";
const DOCUMENT_RELS_PART: &str = "word/_rels/document.xml.rels";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

/// `w:pPr` children that must come after `w:jc`.
const JC_SUCCESSORS: &[&str] = &[
    "textDirection",
    "textAlignment",
    "textboxTightWrap",
    "outlineLvl",
    "divId",
    "cnfStyle",
    "rPr",
    "sectPr",
    "pPrChange",
];

/// Writer is responsible for writing an instructor comment into a copy of a homework file.
pub trait Writer {
    /// Write `comment` into `original` and produce a new file at `out_path`.
    /// `original` is never modified.
    fn write_comment<P: AsRef<Path>>(
        &self,
        original: P,
        out_path: P,
        comment: &str,
    ) -> Result<(), AnnotateError>;
}

/// DocxWriter puts the comment into the first header paragraph of the first section.
pub struct DocxWriter {
    style: WordStyle,
}

impl Writer for DocxWriter {
    fn write_comment<P: AsRef<Path>>(
        &self,
        original: P,
        out_path: P,
        comment: &str,
    ) -> Result<(), AnnotateError> {
        let original_file = File::open(original.as_ref())?;
        let mut archive = ZipArchive::new(original_file)?;

        let edits = self.header_edits(&mut archive, comment)?;
        let packaged = repackage(&mut archive, &edits)?;

        // Only touch the output path once the whole package is built
        std::fs::write(out_path.as_ref(), packaged)?;
        Ok(())
    }
}

impl DocxWriter {
    pub fn new(style: WordStyle) -> Self {
        Self { style }
    }

    /// Compute the new content of every part that changes, keyed by part name.
    fn header_edits<R: Read + Seek>(
        &self,
        archive: &mut ZipArchive<R>,
        comment: &str,
    ) -> Result<BTreeMap<String, String>, AnnotateError> {
        let text = format!("{}\n{}", self.style.label, comment);
        let mut edits = BTreeMap::new();

        let doc_xml = read_part(archive, DOCUMENT_PART)?.ok_or_else(|| {
            AnnotateError::MalformedDocument(format!("missing {}", DOCUMENT_PART))
        })?;
        let rels_xml = read_part(archive, DOCUMENT_RELS_PART)?;

        if let Some(rel_id) = default_header_rel(&doc_xml)? {
            let target = rels_xml
                .as_deref()
                .map(|rels| relationship_target(rels, &rel_id))
                .transpose()?
                .flatten()
                .ok_or_else(|| {
                    AnnotateError::MalformedDocument(format!(
                        "header relationship {} has no target",
                        rel_id
                    ))
                })?;
            let part = resolve_part("word", &target);
            debug!("Writing into existing header part {}", part);

            let header_xml = read_part(archive, &part)?.ok_or_else(|| {
                AnnotateError::MalformedDocument(format!("missing header part {}", part))
            })?;
            edits.insert(part.clone(), self.annotate_header(&header_xml, &part, &text)?);
            return Ok(edits);
        }

        // No header yet: create one and wire it to the first section
        let existing: HashSet<String> = archive.file_names().map(str::to_string).collect();
        let header_name = (1..)
            .map(|n| format!("header{}.xml", n))
            .find(|name| !existing.contains(&format!("word/{}", name)))
            .unwrap_or_else(|| "header1.xml".to_string());
        let part = format!("word/{}", header_name);
        debug!("Creating header part {}", part);

        let rels_xml = rels_xml.unwrap_or_else(|| {
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"></Relationships>"#
                .to_string()
        });
        let rel_id = unused_rel_id(&rels_xml)?;
        let rels_xml = insert_before_closing(
            &rels_xml,
            "</Relationships>",
            &format!(
                r#"<Relationship Id="{}" Type="{}" Target="{}"/>"#,
                rel_id, HEADER_REL_TYPE, header_name
            ),
            DOCUMENT_RELS_PART,
        )?;

        let content_types = read_part(archive, CONTENT_TYPES_PART)?.ok_or_else(|| {
            AnnotateError::MalformedDocument(format!("missing {}", CONTENT_TYPES_PART))
        })?;
        let override_attr = format!(r#"PartName="/{}""#, part);
        let content_types = if content_types.contains(&override_attr) {
            content_types
        } else {
            insert_before_closing(
                &content_types,
                "</Types>",
                &format!(
                    r#"<Override {} ContentType="{}"/>"#,
                    override_attr, HEADER_CONTENT_TYPE
                ),
                CONTENT_TYPES_PART,
            )?
        };

        let header_xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:hdr xmlns:w="{}" xmlns:r="{}"><w:p/></w:hdr>"#,
            W_NS, R_NS
        );

        edits.insert(part.clone(), self.annotate_header(&header_xml, &part, &text)?);
        edits.insert(DOCUMENT_PART.to_string(), add_header_reference(&doc_xml, &rel_id)?);
        edits.insert(DOCUMENT_RELS_PART.to_string(), rels_xml);
        edits.insert(CONTENT_TYPES_PART.to_string(), content_types);
        Ok(edits)
    }

    /// Right-align the first paragraph of a `w:hdr` part and append the comment run.
    fn annotate_header(&self, xml: &str, part: &str, text: &str) -> Result<String, AnnotateError> {
        let xml = strip_bom(xml);
        let doc = parse(xml, part)?;
        let root = doc.root_element();
        let w = root.lookup_prefix(W_NS).unwrap_or("w");

        let jc = format!(r#"<{}:jc {}:val="right"/>"#, w, w);
        let run = self.comment_run(w, text);
        let mut splices = Vec::new();

        match root.children().find(|n| is_elem(*n, "p")) {
            None => {
                let paragraph = format!("<{w}:p><{w}:pPr>{jc}</{w}:pPr>{run}</{w}:p>", w = w);
                splices.push(append_child(xml, root, &paragraph));
            }
            Some(p) => {
                let (_, self_closing) = start_tag_end(xml, p);
                match p.children().find(|n| is_elem(*n, "pPr")) {
                    Some(ppr) => {
                        if let Some(existing) = ppr.children().find(|n| is_elem(*n, "jc")) {
                            let range = existing.range();
                            splices.push(Splice::new(range.start, range.end, jc.clone()));
                        } else if let Some(successor) = ppr
                            .children()
                            .find(|n| n.is_element() && JC_SUCCESSORS.contains(&n.tag_name().name()))
                        {
                            let at = successor.range().start;
                            splices.push(Splice::new(at, at, jc.clone()));
                        } else {
                            splices.push(append_child(xml, ppr, &jc));
                        }
                        splices.push(append_child(xml, p, &run));
                    }
                    None if self_closing => {
                        let inner = format!("<{w}:pPr>{jc}</{w}:pPr>{run}", w = w);
                        splices.push(append_child(xml, p, &inner));
                    }
                    None => {
                        let (open_end, _) = start_tag_end(xml, p);
                        let ppr = format!("<{w}:pPr>{jc}</{w}:pPr>", w = w);
                        splices.push(Splice::new(open_end, open_end, ppr));
                        splices.push(append_child(xml, p, &run));
                    }
                }
            }
        }

        Ok(apply_splices(xml, splices))
    }

    fn comment_run(&self, w: &str, text: &str) -> String {
        let mut props = String::new();
        if self.style.bold {
            props.push_str(&format!("<{}:b/>", w));
        }
        props.push_str(&format!(r#"<{w}:color {w}:val="{}"/>"#, self.style.color, w = w));
        props.push_str(&format!(
            r#"<{w}:sz {w}:val="{}"/>"#,
            self.style.font_size_pt * 2,
            w = w
        ));

        format!(
            "<{w}:r><{w}:rPr>{}</{w}:rPr>{}</{w}:r>",
            props,
            run_content(w, text),
            w = w
        )
    }
}

/// Text becomes `w:t` pieces; newlines become `w:br` and tabs `w:tab`.
fn run_content(w: &str, text: &str) -> String {
    let mut out = String::new();
    let mut pending = String::new();
    let flush = |pending: &mut String, out: &mut String| {
        if !pending.is_empty() {
            out.push_str(&format!(
                r#"<{w}:t xml:space="preserve">{}</{w}:t>"#,
                quick_xml::escape::escape(pending.as_str()),
                w = w
            ));
            pending.clear();
        }
    };

    let normalized = text.replace("\r\n", "\n");
    for c in normalized.chars() {
        match c {
            '\n' | '\r' => {
                flush(&mut pending, &mut out);
                out.push_str(&format!("<{}:br/>", w));
            }
            '\t' => {
                flush(&mut pending, &mut out);
                out.push_str(&format!("<{}:tab/>", w));
            }
            _ => pending.push(c),
        }
    }
    flush(&mut pending, &mut out);
    out
}

/// `r:id` of the default `w:headerReference` of the first `w:sectPr`, if any.
fn default_header_rel(doc_xml: &str) -> Result<Option<String>, AnnotateError> {
    let doc = parse(strip_bom(doc_xml), DOCUMENT_PART)?;
    let Some(sect_pr) = doc.descendants().find(|n| is_elem(*n, "sectPr")) else {
        return Ok(None);
    };
    Ok(sect_pr
        .children()
        .filter(|n| is_elem(*n, "headerReference"))
        .find(|n| {
            n.attributes()
                .any(|a| a.name() == "type" && a.value() == "default")
        })
        .and_then(|n| {
            n.attributes()
                .find(|a| a.name() == "id" && a.namespace().is_some())
                .map(|a| a.value().to_string())
        }))
}

/// Insert a default `w:headerReference` as the first child of the first `w:sectPr`,
/// creating a body-level `w:sectPr` when the document has none.
fn add_header_reference(doc_xml: &str, rel_id: &str) -> Result<String, AnnotateError> {
    let xml = strip_bom(doc_xml);
    let doc = parse(xml, DOCUMENT_PART)?;
    let root = doc.root_element();
    let w = root.lookup_prefix(W_NS).unwrap_or("w");
    let reference = match root.lookup_prefix(R_NS) {
        Some(r) => format!(
            r#"<{w}:headerReference {w}:type="default" {r}:id="{}"/>"#,
            rel_id,
            w = w,
            r = r
        ),
        None => format!(
            r#"<{w}:headerReference xmlns:gr="{}" {w}:type="default" gr:id="{}"/>"#,
            R_NS,
            rel_id,
            w = w
        ),
    };

    let splice = match doc.descendants().find(|n| is_elem(*n, "sectPr")) {
        Some(sect_pr) => prepend_child(xml, sect_pr, &reference),
        None => {
            let body = doc.descendants().find(|n| is_elem(*n, "body")).ok_or_else(|| {
                AnnotateError::MalformedDocument("document has no w:body".to_string())
            })?;
            append_child(
                xml,
                body,
                &format!("<{w}:sectPr>{}</{w}:sectPr>", reference, w = w),
            )
        }
    };
    Ok(apply_splices(xml, vec![splice]))
}

fn relationship_target(rels_xml: &str, rel_id: &str) -> Result<Option<String>, AnnotateError> {
    let doc = parse(strip_bom(rels_xml), DOCUMENT_RELS_PART)?;
    Ok(doc
        .descendants()
        .filter(|n| is_elem(*n, "Relationship"))
        .find(|n| n.attribute("Id") == Some(rel_id))
        .and_then(|n| n.attribute("Target"))
        .map(str::to_string))
}

fn unused_rel_id(rels_xml: &str) -> Result<String, AnnotateError> {
    let doc = parse(strip_bom(rels_xml), DOCUMENT_RELS_PART)?;
    let taken: HashSet<&str> = doc
        .descendants()
        .filter(|n| is_elem(*n, "Relationship"))
        .filter_map(|n| n.attribute("Id"))
        .collect();
    Ok((1..)
        .map(|n| format!("rId{}", n))
        .find(|id| !taken.contains(id.as_str()))
        .unwrap_or_else(|| "rIdHeader".to_string()))
}

/// Relationship targets are relative to the source part's folder unless absolute.
fn resolve_part(base_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

fn insert_before_closing(
    xml: &str,
    closing: &str,
    fragment: &str,
    part: &str,
) -> Result<String, AnnotateError> {
    let pos = xml.rfind(closing).ok_or_else(|| {
        AnnotateError::MalformedDocument(format!("{} has no {}", part, closing))
    })?;
    let mut out = xml.to_string();
    out.insert_str(pos, fragment);
    Ok(out)
}

/// Rebuild the package, raw-copying every entry that is not edited.
fn repackage<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    edits: &BTreeMap<String, String>,
) -> Result<Vec<u8>, AnnotateError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut written = HashSet::new();

    for i in 0..archive.len() {
        let name = archive.by_index_raw(i)?.name().to_string();
        match edits.get(&name) {
            Some(content) => {
                zip.start_file(name.as_str(), options)?;
                zip.write_all(content.as_bytes())?;
            }
            None => {
                let entry = archive.by_index_raw(i)?;
                zip.raw_copy_file(entry)?;
            }
        }
        written.insert(name);
    }

    for (name, content) in edits {
        if !written.contains(name) {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(content.as_bytes())?;
        }
    }

    Ok(zip.finish()?.into_inner())
}

fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, AnnotateError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut xml = String::new();
    file.read_to_string(&mut xml)?;
    Ok(Some(xml))
}

fn parse<'a>(xml: &'a str, part: &str) -> Result<Document<'a>, AnnotateError> {
    Document::parse(xml).map_err(|source| AnnotateError::Xml {
        part: part.to_string(),
        source,
    })
}

fn strip_bom(xml: &str) -> &str {
    xml.strip_prefix('\u{feff}').unwrap_or(xml)
}

fn is_elem(node: Node, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name
}

// ---- byte-range editing on the original XML text ----

struct Splice {
    start: usize,
    end: usize,
    text: String,
}

impl Splice {
    fn new(start: usize, end: usize, text: String) -> Self {
        Self { start, end, text }
    }
}

/// Apply non-overlapping splices. Insertions at the same offset keep their given order.
fn apply_splices(src: &str, splices: Vec<Splice>) -> String {
    let mut ordered: Vec<(usize, Splice)> = splices.into_iter().enumerate().collect();
    ordered.sort_by(|(ia, a), (ib, b)| b.start.cmp(&a.start).then(ib.cmp(ia)));

    let mut out = src.to_string();
    for (_, splice) in ordered {
        out.replace_range(splice.start..splice.end, &splice.text);
    }
    out
}

/// Offset just past the `>` of `node`'s start tag, and whether the tag is self-closing.
fn start_tag_end(src: &str, node: Node) -> (usize, bool) {
    let bytes = src.as_bytes();
    let mut quote = None;
    for i in node.range().start..bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return (i + 1, bytes[i - 1] == b'/'),
            None => {}
        }
    }
    (bytes.len(), false)
}

fn qualified_name<'a>(src: &'a str, node: Node) -> &'a str {
    let rest = &src[node.range().start + 1..];
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
        .unwrap_or(rest.len());
    &rest[..end]
}

/// Splice that adds `fragment` as the last child of `node`, opening it if self-closing.
fn append_child(src: &str, node: Node, fragment: &str) -> Splice {
    let range = node.range();
    let (open_end, self_closing) = start_tag_end(src, node);
    if self_closing {
        let open = src[range.start..open_end - 2].trim_end();
        let name = qualified_name(src, node);
        return Splice::new(
            range.start,
            range.end,
            format!("{}>{}</{}>", open, fragment, name),
        );
    }
    let close = src[range.clone()]
        .rfind("</")
        .map(|i| range.start + i)
        .unwrap_or(range.end);
    Splice::new(close, close, fragment.to_string())
}

/// Splice that adds `fragment` as the first child of `node`.
fn prepend_child(src: &str, node: Node, fragment: &str) -> Splice {
    let (open_end, self_closing) = start_tag_end(src, node);
    if self_closing {
        return append_child(src, node, fragment);
    }
    Splice::new(open_end, open_end, fragment.to_string())
}
