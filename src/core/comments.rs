use crate::core::spreadsheet::{Row, XlsxReader};
use crate::error::LoadError;
use log::{debug, info};
use std::collections::HashMap;
use std::path::Path;

/// Student ID -> instructor comment. Built once, read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentTable {
    entries: HashMap<String, String>,
}

impl CommentTable {
    /// Load the table from an `.xlsx`/`.xlsm` workbook or a `.csv` file.
    ///
    /// Column A is the student ID and column B the comment. When `header_row`
    /// is set the first row is skipped.
    pub fn load<P: AsRef<Path>>(path: P, header_row: bool) -> Result<Self, LoadError> {
        let path = path.as_ref();
        info!("Loading comment table: {}", path.display());
        if !path.is_file() {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        let mut rows = match ext.as_str() {
            "xlsx" | "xlsm" => XlsxReader.read_rows(path)?,
            "csv" => read_csv_rows(path)?,
            _ => return Err(LoadError::UnsupportedFormat(path.to_path_buf())),
        };
        if header_row && !rows.is_empty() {
            rows.remove(0);
        }

        let table = Self::from_rows(rows.into_iter().map(|mut row| {
            row.resize(2, String::new());
            let comment = row.pop().unwrap_or_default();
            let id = row.pop().unwrap_or_default();
            (id, comment)
        }));
        info!("Loaded {} comments", table.len());
        Ok(table)
    }

    /// Build from `(id, comment)` pairs, trimming both and dropping empty
    /// cells and `nan` IDs. Later duplicates replace earlier ones.
    pub fn from_rows<I, K, V>(rows: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut entries = HashMap::new();
        for (id, comment) in rows {
            let id = id.as_ref().trim();
            let comment = comment.as_ref().trim();
            if id.is_empty() || comment.is_empty() || id.eq_ignore_ascii_case("nan") {
                continue;
            }
            if let Some(previous) = entries.insert(id.to_string(), comment.to_string()) {
                debug!("Duplicate student ID {}: replacing comment {:?}", id, previous);
            }
        }
        Self { entries }
    }

    pub fn get(&self, student_id: &str) -> Option<&str> {
        self.entries.get(student_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn read_csv_rows(path: &Path) -> Result<Vec<Row>, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(String::from).collect());
    }
    Ok(rows)
}
