//! Run configuration.
//!
//! Every path and style constant the annotators need lives in
//! [`AnnotatorConfig`], which is handed to the batch driver when it is built.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnnotatorConfig {
    /// Spreadsheet holding `student id | comment` rows.
    pub comments_path: PathBuf,
    /// Folder with the original `.docx` / `.pdf` homework.
    pub input_dir: PathBuf,
    /// Folder that receives the annotated copies.
    pub output_dir: PathBuf,
    /// TrueType font used for the PDF overlay (needed for CJK text).
    pub font_path: PathBuf,
    /// Appended to the file stem of every output file.
    pub output_suffix: String,
    /// Whether the first spreadsheet row is a header.
    pub header_row: bool,
    pub word: WordStyle,
    pub pdf: PdfStyle,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WordStyle {
    pub label: String,
    /// Size in points. Word stores half points.
    pub font_size_pt: u32,
    /// `RRGGBB`
    pub color: String,
    pub bold: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PdfStyle {
    pub prefix: String,
    pub font_size: f32,
    /// Text origin in points from the bottom-left corner.
    pub x: f32,
    pub y: f32,
    pub page_width: f32,
    pub page_height: f32,
}

impl Default for WordStyle {
    fn default() -> Self {
        Self {
            label: "【教师评语】".to_string(),
            font_size_pt: 12,
            color: "FF0000".to_string(),
            bold: true,
        }
    }
}

impl Default for PdfStyle {
    fn default() -> Self {
        // US Letter
        Self {
            prefix: "Comment: ".to_string(),
            font_size: 12.0,
            x: 300.0,
            y: 750.0,
            page_width: 612.0,
            page_height: 792.0,
        }
    }
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self::rooted_at(Path::new("."))
    }
}

impl AnnotatorConfig {
    /// Default layout under `base`: `homeworks/comments.xlsx`, `homeworks/`, `processed/`.
    pub fn rooted_at(base: &Path) -> Self {
        let input_dir = base.join("homeworks");
        Self {
            comments_path: input_dir.join("comments.xlsx"),
            input_dir,
            output_dir: base.join("processed"),
            font_path: default_font_path(base),
            output_suffix: "_graded".to_string(),
            header_row: true,
            word: WordStyle::default(),
            pdf: PdfStyle::default(),
        }
    }

    /// Load a JSON config file. Keys that are absent keep their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}

#[cfg(windows)]
fn default_font_path(_base: &Path) -> PathBuf {
    PathBuf::from("C:/Windows/Fonts/simhei.ttf")
}

#[cfg(not(windows))]
fn default_font_path(base: &Path) -> PathBuf {
    base.join("fonts").join("simhei.ttf")
}
