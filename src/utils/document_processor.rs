use crate::config::AnnotatorConfig;
use crate::core::comments::CommentTable;
use crate::core::pdf_writer::PdfWriter;
use crate::core::writer::{DocxWriter, Writer};
use crate::error::{error_chain, AnnotateError, LoadError};
use crate::{FileFormat, HomeworkFile};
use chrono::{DateTime, Local};
use log::{debug, error, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// Result of annotating one matched homework file.
#[derive(Debug)]
pub struct FileOutcome {
    pub file: HomeworkFile,
    pub result: Result<PathBuf, AnnotateError>,
}

/// What a batch run did.
#[derive(Debug)]
pub struct BatchReport {
    pub started_at: DateTime<Local>,
    pub output_dir: PathBuf,
    pub outcomes: Vec<FileOutcome>,
    pub skipped_no_id: usize,
    pub skipped_no_comment: usize,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

pub struct DocumentProcessor {
    config: AnnotatorConfig,
    docx_writer: DocxWriter,
    pdf_writer: PdfWriter,
}

impl DocumentProcessor {
    pub fn new(config: AnnotatorConfig) -> Self {
        let docx_writer = DocxWriter::new(config.word.clone());
        let pdf_writer = PdfWriter::new(
            config.pdf.clone(),
            config.font_path.clone(),
            config.output_dir.clone(),
        );
        Self {
            config,
            docx_writer,
            pdf_writer,
        }
    }

    pub fn config(&self) -> &AnnotatorConfig {
        &self.config
    }

    /// Load the comment table, then annotate every matched file in the input directory.
    ///
    /// Only a comment table failure is fatal. Per-file failures end up in the report.
    pub fn process_documents(&self) -> Result<BatchReport, LoadError> {
        let comments = CommentTable::load(&self.config.comments_path, self.config.header_row)?;
        Ok(self.process_with(&comments))
    }

    /// Annotate every matched file using an already loaded comment table.
    pub fn process_with(&self, comments: &CommentTable) -> BatchReport {
        let started_at = Local::now();
        let output_dir = self.config.output_dir.clone();
        let mut report = BatchReport {
            started_at,
            output_dir: output_dir.clone(),
            outcomes: Vec::new(),
            skipped_no_id: 0,
            skipped_no_comment: 0,
        };

        info!(
            "Starting to process homework from: {}",
            self.config.input_dir.display()
        );

        if let Err(e) = fs::create_dir_all(&output_dir) {
            error!(
                "Failed to create output directory {}: {}",
                output_dir.display(),
                e
            );
            return report;
        }

        let files = match self.homework_files() {
            Ok(files) => files,
            Err(e) => {
                error!(
                    "Failed to read input directory {}: {}",
                    self.config.input_dir.display(),
                    e
                );
                return report;
            }
        };

        for file in files {
            let Some(student_id) = file.student_id.as_deref() else {
                debug!("No student ID in file name: {}", file.file_name());
                report.skipped_no_id += 1;
                continue;
            };
            let Some(comment) = comments.get(student_id) else {
                debug!("No comment for student {}: {}", student_id, file.file_name());
                report.skipped_no_comment += 1;
                continue;
            };

            info!("Processing file: {}", file.file_name());
            let result = self.annotate(&file, comment);
            match &result {
                Ok(out) => info!("Successfully created annotated file: {}", out.display()),
                Err(e) => match file.format {
                    FileFormat::Pdf => {
                        error!("Failed to annotate PDF {}: {}", file.file_name(), error_chain(e));
                        debug!("{:?}", e);
                    }
                    FileFormat::Word => error!(
                        "Failed to annotate Word document {}: {}",
                        file.file_name(),
                        error_chain(e)
                    ),
                },
            }
            report.outcomes.push(FileOutcome { file, result });
        }

        info!(
            "Completed: {} file(s) annotated, {} failed",
            report.succeeded(),
            report.failed()
        );
        info!("Results saved in: {}", output_dir.display());
        report
    }

    /// Dispatch one file to the writer for its format.
    pub fn annotate(&self, file: &HomeworkFile, comment: &str) -> Result<PathBuf, AnnotateError> {
        let out_path = file.output_path(&self.config.output_dir, &self.config.output_suffix);
        if out_path == file.path {
            return Err(AnnotateError::WouldOverwrite(file.path.clone()));
        }
        match file.format {
            FileFormat::Word => self
                .docx_writer
                .write_comment(file.path.as_path(), out_path.as_path(), comment)?,
            FileFormat::Pdf => self
                .pdf_writer
                .write_comment(file.path.as_path(), out_path.as_path(), comment)?,
        }
        Ok(out_path)
    }

    /// Word and PDF files of the input directory, Word first, each in enumeration order.
    pub fn homework_files(&self) -> std::io::Result<Vec<HomeworkFile>> {
        let mut word = Vec::new();
        let mut pdf = Vec::new();

        for entry in fs::read_dir(&self.config.input_dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() || self.is_excluded(&path) {
                continue;
            }
            match HomeworkFile::from_path(path) {
                Some(file) if file.format == FileFormat::Word => word.push(file),
                Some(file) => pdf.push(file),
                None => {}
            }
        }

        word.extend(pdf);
        Ok(word)
    }

    /// Office/LibreOffice lock files, AppleDouble files, and earlier results when
    /// they are written back into the input directory.
    fn is_excluded(&self, path: &Path) -> bool {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        if name.starts_with("~$") || name.starts_with(".~lock.") || name.starts_with("._") {
            debug!("Skipping lock/temp file: {}", name);
            return true;
        }
        if self.config.output_dir != self.config.input_dir || self.config.output_suffix.is_empty() {
            return false;
        }
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy())
            .unwrap_or_default();
        if stem.ends_with(&self.config.output_suffix) {
            warn!("Skipping already annotated file: {}", name);
            return true;
        }
        false
    }
}
