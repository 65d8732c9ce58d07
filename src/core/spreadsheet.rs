use crate::error::LoadError;
use roxmltree::{Document, Node};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use zip::ZipArchive;

/// One spreadsheet row, cells indexed by column (A = 0). Gaps are empty strings.
pub type Row = Vec<String>;

const DEFAULT_SHEET: &str = "xl/worksheets/sheet1.xml";
/// Column `XFD`, the last one Excel allows.
const MAX_COLUMNS: usize = 16_384;

/// Reads the cell text of the first worksheet of an `.xlsx` workbook.
pub struct XlsxReader;

impl XlsxReader {
    pub fn read_rows<P: AsRef<Path>>(&self, path: P) -> Result<Vec<Row>, LoadError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut archive = ZipArchive::new(file)?;

        let sheet_part = self.first_sheet_part(&mut archive)?;
        let shared = match read_part(&mut archive, "xl/sharedStrings.xml")? {
            Some(xml) => self.parse_shared_strings(&xml)?,
            None => Vec::new(),
        };
        let sheet_xml = read_part(&mut archive, &sheet_part)?
            .ok_or_else(|| LoadError::MissingPart(sheet_part.clone()))?;

        self.parse_sheet(&sheet_xml, &shared)
    }

    /// Resolve the first `<sheet>` of `xl/workbook.xml` to its part name.
    fn first_sheet_part<R: Read + Seek>(
        &self,
        archive: &mut ZipArchive<R>,
    ) -> Result<String, LoadError> {
        let Some(workbook_xml) = read_part(archive, "xl/workbook.xml")? else {
            return Ok(DEFAULT_SHEET.to_string());
        };
        let workbook = Document::parse(&workbook_xml)?;
        let rel_id = workbook
            .descendants()
            .find(|n| n.is_element() && n.tag_name().name() == "sheet")
            .and_then(|sheet| relationship_id(sheet).map(str::to_string));
        let Some(rel_id) = rel_id else {
            return Ok(DEFAULT_SHEET.to_string());
        };

        let Some(rels_xml) = read_part(archive, "xl/_rels/workbook.xml.rels")? else {
            return Ok(DEFAULT_SHEET.to_string());
        };
        let rels = Document::parse(&rels_xml)?;
        let target = rels
            .descendants()
            .filter(|n| n.is_element() && n.tag_name().name() == "Relationship")
            .find(|n| n.attribute("Id") == Some(rel_id.as_str()))
            .and_then(|n| n.attribute("Target"));

        Ok(match target {
            Some(t) if t.starts_with('/') => t.trim_start_matches('/').to_string(),
            Some(t) => format!("xl/{}", t),
            None => DEFAULT_SHEET.to_string(),
        })
    }

    fn parse_shared_strings(&self, xml: &str) -> Result<Vec<String>, LoadError> {
        let doc = Document::parse(xml)?;
        Ok(doc
            .root_element()
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "si")
            .map(rich_text)
            .collect())
    }

    fn parse_sheet(&self, xml: &str, shared: &[String]) -> Result<Vec<Row>, LoadError> {
        let doc = Document::parse(xml)?;
        let mut rows = Vec::new();

        for row_node in doc
            .descendants()
            .filter(|n| n.is_element() && n.tag_name().name() == "row")
        {
            let mut cells: HashMap<usize, String> = HashMap::new();
            let mut next_col = 0;
            for cell in row_node
                .children()
                .filter(|n| n.is_element() && n.tag_name().name() == "c")
            {
                let col = cell
                    .attribute("r")
                    .and_then(column_index)
                    .unwrap_or(next_col);
                next_col = col + 1;
                cells.insert(col, self.cell_text(cell, shared));
            }

            let width = cells.keys().max().map_or(0, |max| max + 1);
            let mut row = vec![String::new(); width];
            for (col, text) in cells {
                row[col] = text;
            }
            rows.push(row);
        }

        Ok(rows)
    }

    fn cell_text(&self, cell: Node, shared: &[String]) -> String {
        let value = child_text(cell, "v");
        match cell.attribute("t").unwrap_or("n") {
            "s" => value
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|i| shared.get(i).cloned())
                .unwrap_or_default(),
            "inlineStr" => cell
                .children()
                .find(|n| n.is_element() && n.tag_name().name() == "is")
                .map(rich_text)
                .unwrap_or_default(),
            "b" => match value.trim() {
                "1" => "True".to_string(),
                "0" => "False".to_string(),
                _ => String::new(),
            },
            "e" => String::new(),
            "n" => normalize_number(&value),
            _ => value,
        }
    }
}

/// Text of a `<si>` / `<is>` node: plain `<t>` or rich-text runs, phonetic hints excluded.
fn rich_text(node: Node) -> String {
    node.descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "t")
        .filter(|t| {
            t.parent()
                .map(|p| p == node || p.tag_name().name() == "r")
                .unwrap_or(false)
        })
        .filter_map(|t| t.text())
        .collect()
}

fn child_text(node: Node, name: &str) -> String {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
        .and_then(|n| n.text())
        .unwrap_or_default()
        .to_string()
}

/// `r:id` of a workbook `<sheet>`, whatever namespace URI the producer used for `r`.
fn relationship_id<'a>(sheet: Node<'a, '_>) -> Option<&'a str> {
    sheet
        .attributes()
        .find(|a| a.name() == "id" && a.namespace().is_some())
        .map(|a| a.value())
}

/// `"B12"` -> 1
fn column_index(reference: &str) -> Option<usize> {
    let letters: String = reference
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    if letters.is_empty() {
        return None;
    }
    let mut index = 0usize;
    for c in letters.chars() {
        let digit = c.to_ascii_uppercase() as usize - 'A' as usize + 1;
        index = index.checked_mul(26)?.checked_add(digit)?;
        if index > MAX_COLUMNS {
            return None;
        }
    }
    Some(index - 1)
}

/// Integral numbers lose their fractional part so numeric student IDs read as typed.
fn normalize_number(raw: &str) -> String {
    let raw = raw.trim();
    if !raw.contains(['.', 'e', 'E']) {
        return raw.to_string();
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 => {
            format!("{}", v as i64)
        }
        _ => raw.to_string(),
    }
}

fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, LoadError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut xml = String::new();
    file.read_to_string(&mut xml).map_err(|source| LoadError::Io {
        path: name.into(),
        source,
    })?;
    Ok(Some(xml))
}
