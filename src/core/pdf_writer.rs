use crate::config::PdfStyle;
use crate::core::writer::Writer;
use crate::error::AnnotateError;
use log::{debug, warn};
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, Pt, Rgb,
};
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Prepended to overlay resource names so they never shadow the page's own.
const OVERLAY_PREFIX: &[u8] = b"Overlay";

/// Resource categories copied from the overlay page.
const OVERLAY_CATEGORIES: &[&[u8]] = &[
    b"Font",
    b"ExtGState",
    b"XObject",
    b"ColorSpace",
    b"Pattern",
    b"Shading",
];

const MAX_TREE_DEPTH: usize = 64;

/// PdfWriter stamps the comment onto every page through a one-page overlay PDF.
pub struct PdfWriter {
    style: PdfStyle,
    font_path: PathBuf,
    scratch_dir: PathBuf,
}

impl Writer for PdfWriter {
    fn write_comment<P: AsRef<Path>>(
        &self,
        original: P,
        out_path: P,
        comment: &str,
    ) -> Result<(), AnnotateError> {
        // Removed when this guard drops, whichever way we leave
        let overlay_file = OverlayFile::new(&self.scratch_dir);

        self.render_overlay(overlay_file.path(), comment)?;
        let overlay = Document::load(overlay_file.path())?;

        let mut target = Document::load(original.as_ref())?;
        if target.is_encrypted() {
            return Err(AnnotateError::Encrypted);
        }

        let pages = merge_overlay(&mut target, overlay)?;
        target.prune_objects();
        target.compress();

        let mut buf = Vec::new();
        target.save_to(&mut buf)?;
        std::fs::write(out_path.as_ref(), buf)?;

        debug!(
            "Overlaid comment on {} page(s) of {}",
            pages,
            original.as_ref().display()
        );
        Ok(())
    }
}

impl PdfWriter {
    pub fn new(style: PdfStyle, font_path: PathBuf, scratch_dir: PathBuf) -> Self {
        Self {
            style,
            font_path,
            scratch_dir,
        }
    }

    /// Single page holding only the red comment text.
    fn render_overlay(&self, path: &Path, comment: &str) -> Result<(), AnnotateError> {
        let (doc, page, layer) = PdfDocument::new(
            "comment overlay",
            Mm::from(Pt(self.style.page_width)),
            Mm::from(Pt(self.style.page_height)),
            "comment",
        );
        let font = self.overlay_font(&doc)?;

        let layer = doc.get_page(page).get_layer(layer);
        layer.set_fill_color(Color::Rgb(Rgb::new(1.0, 0.0, 0.0, None)));
        layer.use_text(
            format!("{}{}", self.style.prefix, comment),
            self.style.font_size,
            Mm::from(Pt(self.style.x)),
            Mm::from(Pt(self.style.y)),
            &font,
        );

        let mut out = BufWriter::new(File::create(path)?);
        doc.save(&mut out)
            .map_err(|e| AnnotateError::Overlay(format!("PDF save error: {}", e)))?;
        out.flush()?;
        Ok(())
    }

    /// The configured TrueType font, or Helvetica when it is missing or unusable.
    fn overlay_font(&self, doc: &PdfDocumentReference) -> Result<IndirectFontRef, AnnotateError> {
        if self.font_path.is_file() {
            let registered = File::open(&self.font_path)
                .map_err(|e| e.to_string())
                .and_then(|file| doc.add_external_font(file).map_err(|e| e.to_string()));
            match registered {
                Ok(font) => return Ok(font),
                Err(e) => warn!(
                    "Failed to register font {}: {}; falling back to Helvetica",
                    self.font_path.display(),
                    e
                ),
            }
        } else {
            warn!(
                "Font {} not found; non-Latin comment text may render incorrectly",
                self.font_path.display()
            );
        }

        doc.add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| AnnotateError::Overlay(format!("PDF font error: {}", e)))
    }
}

/// Temporary overlay PDF that is deleted on drop.
struct OverlayFile {
    path: PathBuf,
}

impl OverlayFile {
    fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(format!("temp_overlay_{}.pdf", Uuid::new_v4().simple())),
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for OverlayFile {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!("Failed to remove overlay {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Draw the overlay's first page on top of every page of `target`.
/// Returns the number of pages stamped.
fn merge_overlay(target: &mut Document, mut overlay: Document) -> Result<usize, AnnotateError> {
    overlay.renumber_objects_with(target.max_id + 1);
    let overlay_page = overlay
        .get_pages()
        .values()
        .next()
        .copied()
        .ok_or_else(|| AnnotateError::Overlay("overlay has no page".to_string()))?;

    let mut renamed = Dictionary::new();
    let mut renames: HashMap<(Vec<u8>, Vec<u8>), Vec<u8>> = HashMap::new();
    let overlay_resources = resolved_resources(&overlay, overlay_page)?;
    for (category, entries) in overlay_resources.iter() {
        if !OVERLAY_CATEGORIES.contains(&category.as_slice()) {
            continue;
        }
        let Ok(entries) = entries.as_dict() else {
            continue;
        };
        let mut prefixed = Dictionary::new();
        for (name, value) in entries.iter() {
            let new_name = [OVERLAY_PREFIX, name.as_slice()].concat();
            renames.insert((category.clone(), name.clone()), new_name.clone());
            prefixed.set(new_name, value.clone());
        }
        renamed.set(category.clone(), Object::Dictionary(prefixed));
    }

    let mut needed = BTreeSet::new();
    collect_references(&overlay, &Object::Dictionary(renamed.clone()), &mut needed);
    for id in needed {
        if let Ok(object) = overlay.get_object(id) {
            target.objects.insert(id, object.clone());
        }
    }
    target.max_id = target.max_id.max(overlay.max_id);

    let stamp = overlay_content(&overlay, overlay_page, &renames)?;

    let page_ids: Vec<ObjectId> = target.get_pages().into_values().collect();
    for &page_id in &page_ids {
        let mut resources = resolved_resources(target, page_id)?;
        merge_resources(&mut resources, &renamed);

        let mut content = b"q\n".to_vec();
        content.extend(target.get_page_content(page_id)?);
        content.extend_from_slice(b"\nQ\nq\n");
        content.extend_from_slice(&stamp);
        content.extend_from_slice(b"\nQ\n");
        let content_id = target.add_object(Stream::new(Dictionary::new(), content));

        let page = target.get_object_mut(page_id)?.as_dict_mut()?;
        page.set("Resources", Object::Dictionary(resources));
        page.set("Contents", Object::Reference(content_id));
    }

    Ok(page_ids.len())
}

/// Overlay drawing operators with marked-content wrappers dropped and resource names prefixed.
fn overlay_content(
    overlay: &Document,
    page_id: ObjectId,
    renames: &HashMap<(Vec<u8>, Vec<u8>), Vec<u8>>,
) -> Result<Vec<u8>, AnnotateError> {
    let raw = overlay.get_page_content(page_id)?;
    let content = Content::decode(&raw)?;

    let operations: Vec<_> = content
        .operations
        .into_iter()
        .filter(|op| !matches!(op.operator.as_str(), "BDC" | "BMC" | "EMC" | "MP" | "DP"))
        .map(|mut op| {
            if let Some(category) = resource_category(&op.operator) {
                for operand in op.operands.iter_mut() {
                    if let Object::Name(name) = operand {
                        if let Some(new_name) = renames.get(&(category.to_vec(), name.clone())) {
                            *name = new_name.clone();
                        }
                    }
                }
            }
            op
        })
        .collect();

    Ok(Content { operations }.encode()?)
}

fn resource_category(operator: &str) -> Option<&'static [u8]> {
    match operator {
        "Tf" => Some(b"Font"),
        "gs" => Some(b"ExtGState"),
        "Do" => Some(b"XObject"),
        "cs" | "CS" => Some(b"ColorSpace"),
        "scn" | "SCN" => Some(b"Pattern"),
        "sh" => Some(b"Shading"),
        _ => None,
    }
}

/// Effective resources of a page, following inheritance up the page tree.
/// Category dictionaries are inlined so they can be extended per page.
fn resolved_resources(doc: &Document, page_id: ObjectId) -> Result<Dictionary, AnnotateError> {
    let mut node = doc.get_object(page_id)?.as_dict()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(resources) = node.get(b"Resources") {
            let mut inlined = Dictionary::new();
            for (category, entries) in deref_dict(doc, resources)?.iter() {
                let value = match deref_dict(doc, entries) {
                    Ok(dict) => Object::Dictionary(dict.clone()),
                    Err(_) => entries.clone(),
                };
                inlined.set(category.clone(), value);
            }
            return Ok(inlined);
        }
        match node.get(b"Parent").and_then(Object::as_reference) {
            Ok(parent) => node = doc.get_object(parent)?.as_dict()?,
            Err(_) => break,
        }
    }
    Ok(Dictionary::new())
}

fn merge_resources(resources: &mut Dictionary, overlay: &Dictionary) {
    for (category, entries) in overlay.iter() {
        let Ok(entries) = entries.as_dict() else {
            continue;
        };
        let mut merged = resources
            .get(category)
            .and_then(Object::as_dict)
            .cloned()
            .unwrap_or_default();
        for (name, value) in entries.iter() {
            merged.set(name.clone(), value.clone());
        }
        resources.set(category.clone(), Object::Dictionary(merged));
    }
}

fn deref_dict<'a>(doc: &'a Document, object: &'a Object) -> lopdf::Result<&'a Dictionary> {
    match object {
        Object::Reference(id) => doc.get_object(*id)?.as_dict(),
        other => other.as_dict(),
    }
}

fn collect_references(doc: &Document, object: &Object, seen: &mut BTreeSet<ObjectId>) {
    match object {
        Object::Reference(id) => {
            if seen.insert(*id) {
                if let Ok(target) = doc.get_object(*id) {
                    collect_references(doc, target, seen);
                }
            }
        }
        Object::Array(items) => {
            for item in items {
                collect_references(doc, item, seen);
            }
        }
        Object::Dictionary(dict) => {
            for (_, value) in dict.iter() {
                collect_references(doc, value, seen);
            }
        }
        Object::Stream(stream) => {
            for (_, value) in stream.dict.iter() {
                collect_references(doc, value, seen);
            }
        }
        _ => {}
    }
}
