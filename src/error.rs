use std::path::PathBuf;
use thiserror::Error;

/// Failure to build the comment table. Aborts the whole run.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("comment table not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("unsupported comment table format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid workbook package")]
    Zip(#[from] zip::result::ZipError),

    #[error("invalid workbook XML")]
    Xml(#[from] roxmltree::Error),

    #[error("invalid CSV data")]
    Csv(#[from] csv::Error),

    #[error("workbook is missing part {0}")]
    MissingPart(String),
}

/// Failure to annotate one homework file. The batch records it and moves on.
#[derive(Debug, Error)]
pub enum AnnotateError {
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("invalid Word package")]
    Zip(#[from] zip::result::ZipError),

    #[error("invalid XML in {part}")]
    Xml {
        part: String,
        #[source]
        source: roxmltree::Error,
    },

    #[error("malformed Word document: {0}")]
    MalformedDocument(String),

    #[error("PDF error")]
    Pdf(#[from] lopdf::Error),

    #[error("PDF is encrypted")]
    Encrypted,

    #[error("failed to render comment overlay: {0}")]
    Overlay(String),

    #[error("output would overwrite the input file: {}", .0.display())]
    WouldOverwrite(PathBuf),
}

/// Render an error with its whole source chain on one line.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
