use log::{debug, info, warn};
use std::io::Write;

use crate::chunking::{TextChunk, TextSplitter};
use crate::document::{decode_text, FormatKind, UploadedFile};
use crate::error::IngestError;
use crate::extract::{default_ocr_chain, extract_pdf_text, ocr_image, ImageTextExtractor};

/// A file that was turned into chunks
#[derive(Debug, Clone)]
pub struct FileSummary {
    pub name: String,
    pub kind: FormatKind,
    pub chunk_count: usize,
}

/// A file that could not be read
#[derive(Debug)]
pub struct FailedFile {
    pub name: String,
    pub error: IngestError,
}

/// Outcome of processing a batch of uploads
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Chunks from every successfully processed file, in upload order
    pub chunks: Vec<TextChunk>,
    pub succeeded: Vec<FileSummary>,
    pub failed: Vec<FailedFile>,
    /// Files whose extension is not supported
    pub skipped: Vec<String>,
}

impl IngestReport {
    /// Number of files that were attempted (supported formats only)
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// True when at least one supported file was given and none succeeded
    pub fn all_failed(&self) -> bool {
        self.succeeded.is_empty() && !self.failed.is_empty()
    }
}

/// Turns uploaded files into text chunks
pub struct DocumentProcessor {
    splitter: TextSplitter,
    ocr_strategies: Vec<Box<dyn ImageTextExtractor>>,
}

impl DocumentProcessor {
    /// Create a processor using the default Tesseract OCR chain
    pub fn new(splitter: TextSplitter, tesseract_cmd: &str) -> Self {
        Self::with_ocr_strategies(splitter, default_ocr_chain(tesseract_cmd))
    }

    pub fn with_ocr_strategies(
        splitter: TextSplitter,
        ocr_strategies: Vec<Box<dyn ImageTextExtractor>>,
    ) -> Self {
        DocumentProcessor {
            splitter,
            ocr_strategies,
        }
    }

    /// Process multiple documents of different types.
    ///
    /// A failing file is logged and recorded in the report; the remaining
    /// files are still processed.
    pub async fn process_documents(&self, files: &[UploadedFile]) -> IngestReport {
        let mut report = IngestReport::default();

        for file in files {
            let kind = file.format();
            if kind == FormatKind::Unsupported {
                debug!("Skipping unsupported file: {}", file.name);
                report.skipped.push(file.name.clone());
                continue;
            }

            match self.process_file(file, kind).await {
                Ok(chunks) => {
                    info!("Processed {} ({}): {} chunks", file.name, kind, chunks.len());
                    report.succeeded.push(FileSummary {
                        name: file.name.clone(),
                        kind,
                        chunk_count: chunks.len(),
                    });
                    report.chunks.extend(chunks);
                }
                Err(error) => {
                    warn!("Error processing {}: {}", file.name, error);
                    report.failed.push(FailedFile {
                        name: file.name.clone(),
                        error,
                    });
                }
            }
        }

        info!(
            "Processed {} of {} file(s) into {} chunks ({} skipped)",
            report.succeeded.len(),
            report.attempted(),
            report.chunks.len(),
            report.skipped.len()
        );

        report
    }

    /// Extract and chunk a single file of a supported format
    pub async fn process_file(
        &self,
        file: &UploadedFile,
        kind: FormatKind,
    ) -> Result<Vec<TextChunk>, IngestError> {
        let text = match kind {
            FormatKind::Text => decode_text(&file.bytes),
            FormatKind::Pdf => {
                let staged = stage(file)?;
                extract_pdf_text(staged.path()).await?
            }
            FormatKind::Image => {
                let staged = stage(file)?;
                ocr_image(&self.ocr_strategies, staged.path()).await?
            }
            FormatKind::Unsupported => return Ok(Vec::new()),
        };

        Ok(self.splitter.split_into_chunks(&text, &file.name))
    }
}

/// Write the upload to a temporary file that is deleted when dropped
fn stage(file: &UploadedFile) -> Result<tempfile::NamedTempFile, IngestError> {
    let mut staged = tempfile::Builder::new()
        .prefix("guru-upload-")
        .suffix(&file.suffix())
        .tempfile()?;
    staged.write_all(&file.bytes)?;
    staged.flush()?;
    debug!("Staged {} at {}", file.name, staged.path().display());
    Ok(staged)
}
