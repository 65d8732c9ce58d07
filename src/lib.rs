pub mod core {
    pub mod comments;
    pub mod matcher;
    pub mod pdf_writer;
    pub mod spreadsheet;
    pub mod writer;
}

pub mod utils {
    pub mod document_processor;
}

pub mod config;
pub mod error;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Homework formats the annotators know how to write into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FileFormat {
    Word,
    Pdf,
}

impl FileFormat {
    /// Detect the format from a path's extension, ignoring case.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "docx" => Some(FileFormat::Word),
            "pdf" => Some(FileFormat::Pdf),
            _ => None,
        }
    }
}

/// A homework file found in the input directory.
#[derive(Debug, Clone, PartialEq)]
pub struct HomeworkFile {
    pub path: PathBuf,
    pub format: FileFormat,
    pub student_id: Option<String>,
}

impl HomeworkFile {
    /// Returns `None` for paths that are not `.docx` or `.pdf`.
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let format = FileFormat::from_path(&path)?;
        let student_id = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(crate::core::matcher::student_id);
        Some(Self {
            path,
            format,
            student_id,
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// `<stem><suffix><.ext>` inside `output_dir`, keeping the original extension as written.
    pub fn output_path(&self, output_dir: &Path, suffix: &str) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = match self.path.extension() {
            Some(ext) => format!("{}{}.{}", stem, suffix, ext.to_string_lossy()),
            None => format!("{}{}", stem, suffix),
        };
        output_dir.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_format_case_insensitively() {
        assert_eq!(FileFormat::from_path(Path::new("a.DOCX")), Some(FileFormat::Word));
        assert_eq!(FileFormat::from_path(Path::new("b.Pdf")), Some(FileFormat::Pdf));
        assert_eq!(FileFormat::from_path(Path::new("c.doc")), None);
        assert_eq!(FileFormat::from_path(Path::new("noext")), None);
    }

    #[test]
    fn homework_file_carries_first_digit_run() {
        let file = HomeworkFile::from_path("in/hw12_003.docx").unwrap();
        assert_eq!(file.format, FileFormat::Word);
        assert_eq!(file.student_id.as_deref(), Some("12"));

        let file = HomeworkFile::from_path("in/essay.pdf").unwrap();
        assert_eq!(file.student_id, None);
    }

    #[test]
    fn output_path_appends_suffix_before_extension() {
        let file = HomeworkFile::from_path("in/21001 report.PDF").unwrap();
        let out = file.output_path(Path::new("out"), "_graded");
        assert_eq!(out, Path::new("out").join("21001 report_graded.PDF"));
    }
}
