//! Text extraction for staged binary documents: PDF pages and OCR over images.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::document::{normalize_whitespace, FormatKind};
use crate::error::{IngestError, StrategyFailure};

/// Extract the text of every page of a PDF, in page order, joined by newlines.
///
/// Parsing is CPU bound and runs on the blocking pool. A panic inside the
/// parser is reported as an extraction error rather than unwinding into the
/// caller.
pub async fn extract_pdf_text(path: &Path) -> Result<String, IngestError> {
    let owned = path.to_path_buf();
    let pages = tokio::task::spawn_blocking(move || pdf_extract::extract_text_by_pages(&owned))
        .await
        .map_err(|e| pdf_error(format!("PDF parser aborted: {}", e)))?
        .map_err(|e| pdf_error(e.to_string()))?;

    info!("Extracted {} page(s) from {}", pages.len(), path.display());

    let content = normalize_whitespace(&pages.join("\n"));
    if content.is_empty() {
        warn!("Extracted PDF content is empty or contains only whitespace");
    }
    Ok(content)
}

fn pdf_error(message: String) -> IngestError {
    IngestError::Extraction {
        format: FormatKind::Pdf,
        message,
    }
}

/// One way of turning an image into text
#[async_trait]
pub trait ImageTextExtractor: Send + Sync {
    /// Short name used in logs and diagnostics
    fn name(&self) -> &str;

    async fn extract(&self, image_path: &Path) -> Result<String>;
}

/// Run the strategies in order; the first one producing non-blank text wins.
///
/// Blank output moves on to the next strategy. An image that some strategy
/// read without finding any text yields an empty string; only an image no
/// strategy could read at all is an error.
pub async fn ocr_image(
    strategies: &[Box<dyn ImageTextExtractor>],
    image_path: &Path,
) -> Result<String, IngestError> {
    let mut failures = Vec::new();
    let mut read_blank = false;

    for strategy in strategies {
        debug!(
            "Trying OCR strategy '{}' on {}",
            strategy.name(),
            image_path.display()
        );
        match strategy.extract(image_path).await {
            Ok(text) if !text.trim().is_empty() => return Ok(text),
            Ok(_) => {
                debug!("OCR strategy '{}' recognized no text", strategy.name());
                read_blank = true;
            }
            Err(e) => {
                warn!("OCR strategy '{}' failed: {:#}", strategy.name(), e);
                failures.push(StrategyFailure {
                    strategy: strategy.name().to_string(),
                    message: format!("{:#}", e),
                });
            }
        }
    }

    if read_blank {
        return Ok(String::new());
    }
    Err(IngestError::Ocr(failures))
}

/// The default OCR chain: layout-aware Tesseract first, plain Tesseract second
pub fn default_ocr_chain(tesseract_cmd: &str) -> Vec<Box<dyn ImageTextExtractor>> {
    vec![
        Box::new(StructuredTesseract::new(tesseract_cmd)),
        Box::new(PlainTesseract::new(tesseract_cmd)),
    ]
}

/// Runs Tesseract with automatic page segmentation and rebuilds blocks,
/// paragraphs and lines from its TSV word boxes.
pub struct StructuredTesseract {
    command: PathBuf,
}

impl StructuredTesseract {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        StructuredTesseract {
            command: command.into(),
        }
    }
}

#[async_trait]
impl ImageTextExtractor for StructuredTesseract {
    fn name(&self) -> &str {
        "structured"
    }

    async fn extract(&self, image_path: &Path) -> Result<String> {
        let tsv = run_tesseract(&self.command, image_path, &["--psm", "1", "tsv"]).await?;
        layout_from_tsv(&tsv)
    }
}

/// Invokes Tesseract directly and takes its plain text output
pub struct PlainTesseract {
    command: PathBuf,
}

impl PlainTesseract {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        PlainTesseract {
            command: command.into(),
        }
    }
}

#[async_trait]
impl ImageTextExtractor for PlainTesseract {
    fn name(&self) -> &str {
        "plain"
    }

    async fn extract(&self, image_path: &Path) -> Result<String> {
        run_tesseract(&self.command, image_path, &[]).await
    }
}

async fn run_tesseract(command: &Path, image_path: &Path, extra_args: &[&str]) -> Result<String> {
    let output = Command::new(command)
        .arg(image_path)
        .arg("stdout")
        .args(extra_args)
        .output()
        .await
        .with_context(|| format!("Failed to run {}", command.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("{} exited with {}: {}", command.display(), output.status, stderr.trim());
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Rebuild text from Tesseract TSV rows.
///
/// Words on the same line are joined by spaces, lines by newlines, and
/// blocks are separated by a blank line.
fn layout_from_tsv(tsv: &str) -> Result<String> {
    let mut lines = tsv.lines();
    let header = lines.next().context("empty TSV output")?;
    if !header.starts_with("level") {
        bail!("unexpected TSV header: {}", header);
    }

    let mut out = String::new();
    let mut current: Option<(u32, u32, u32)> = None;

    for row in lines {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let word = cols[11].trim();
        if word.is_empty() {
            continue;
        }

        let key = (
            cols[2].parse::<u32>().unwrap_or(0),
            cols[3].parse::<u32>().unwrap_or(0),
            cols[4].parse::<u32>().unwrap_or(0),
        );

        match current {
            None => {}
            Some(prev) if prev == key => out.push(' '),
            Some((block, _, _)) if block != key.0 => out.push_str("\n\n"),
            Some(_) => out.push('\n'),
        }
        out.push_str(word);
        current = Some(key);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str, Result<&'static str, &'static str>);

    #[async_trait]
    impl ImageTextExtractor for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        async fn extract(&self, _image_path: &Path) -> Result<String> {
            match self.1 {
                Ok(text) => Ok(text.to_string()),
                Err(e) => bail!(e),
            }
        }
    }

    #[tokio::test]
    async fn test_first_successful_strategy_wins() {
        let chain: Vec<Box<dyn ImageTextExtractor>> = vec![
            Box::new(Fixed("first", Err("loader crashed"))),
            Box::new(Fixed("second", Ok("recognized text"))),
            Box::new(Fixed("third", Ok("never used"))),
        ];
        let text = ocr_image(&chain, Path::new("scan.png")).await.unwrap();
        assert_eq!(text, "recognized text");
    }

    #[tokio::test]
    async fn test_all_failures_are_collected() {
        let chain: Vec<Box<dyn ImageTextExtractor>> = vec![
            Box::new(Fixed("first", Err("loader crashed"))),
            Box::new(Fixed("second", Err("unsupported image"))),
        ];
        match ocr_image(&chain, Path::new("scan.png")).await {
            Err(IngestError::Ocr(failures)) => {
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[0].strategy, "first");
                assert_eq!(failures[0].message, "loader crashed");
                assert_eq!(failures[1].message, "unsupported image");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_image_without_text_is_empty_not_an_error() {
        let chain: Vec<Box<dyn ImageTextExtractor>> = vec![
            Box::new(Fixed("first", Ok("  \n "))),
            Box::new(Fixed("second", Err("loader crashed"))),
        ];
        assert_eq!(ocr_image(&chain, Path::new("blank.png")).await.unwrap(), "");

        // blank output still lets a later strategy try
        let chain: Vec<Box<dyn ImageTextExtractor>> = vec![
            Box::new(Fixed("first", Ok(""))),
            Box::new(Fixed("second", Ok("faint text"))),
        ];
        assert_eq!(
            ocr_image(&chain, Path::new("faint.png")).await.unwrap(),
            "faint text"
        );
    }

    #[tokio::test]
    async fn test_missing_tesseract_binary_is_a_strategy_failure() {
        let chain = default_ocr_chain("/nonexistent/tesseract-binary");
        let result = ocr_image(&chain, Path::new("scan.png")).await;
        assert!(matches!(result, Err(IngestError::Ocr(ref f)) if f.len() == 2));
    }

    #[test]
    fn test_layout_from_tsv_keeps_blocks_and_lines() {
        let tsv = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
1\t1\t0\t0\t0\t0\t0\t0\t100\t100\t-1\t\n\
5\t1\t1\t1\t1\t1\t0\t0\t10\t10\t96\tHello\n\
5\t1\t1\t1\t1\t2\t0\t0\t10\t10\t95\tworld\n\
5\t1\t1\t1\t2\t1\t0\t0\t10\t10\t91\tSecond\n\
5\t1\t2\t1\t1\t1\t0\t0\t10\t10\t90\tNext\n\
5\t1\t2\t1\t1\t2\t0\t0\t10\t10\t90\tblock\n";
        assert_eq!(
            layout_from_tsv(tsv).unwrap(),
            "Hello world\nSecond\n\nNext block"
        );
    }

    #[test]
    fn test_layout_rejects_non_tsv_output() {
        assert!(layout_from_tsv("").is_err());
        assert!(layout_from_tsv("just some text").is_err());
    }

    #[tokio::test]
    async fn test_corrupt_pdf_is_an_extraction_error() {
        let file = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        std::fs::write(file.path(), b"definitely not a pdf").unwrap();
        let result = extract_pdf_text(file.path()).await;
        assert!(matches!(
            result,
            Err(IngestError::Extraction {
                format: FormatKind::Pdf,
                ..
            })
        ));
    }
}
