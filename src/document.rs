use anyhow::{Context, Result};
use log::debug;
use mime_guess::from_path;
use std::fmt;
use std::fs;
use std::path::Path;

/// A file handed over by the caller: raw bytes plus the declared name
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Declared file name, used to infer the format
    pub name: String,
    /// Raw file content
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        UploadedFile {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Load an upload from a file on disk
    pub fn from_path<P: AsRef<Path>>(file_path: P) -> Result<Self> {
        let path = file_path.as_ref();
        let name = path
            .file_name()
            .context("Invalid file name")?
            .to_str()
            .context("Invalid file name encoding")?
            .to_string();

        let bytes =
            fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;

        Ok(UploadedFile { name, bytes })
    }

    pub fn format(&self) -> FormatKind {
        FormatKind::from_file_name(&self.name)
    }

    /// Suffix of the declared name including the dot, e.g. `.pdf`
    pub fn suffix(&self) -> String {
        Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{}", ext.to_lowercase()))
            .unwrap_or_default()
    }
}

/// Document formats the ingestion pipeline knows how to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    Text,
    Pdf,
    Image,
    Unsupported,
}

impl FormatKind {
    /// Resolve the format from a file name suffix (case-insensitive)
    pub fn from_file_name(name: &str) -> Self {
        let lowered = name.to_lowercase();
        let kind = match from_path(&lowered).first() {
            Some(mime) => Self::from_mime(mime.essence_str()),
            None => FormatKind::Unsupported,
        };
        debug!("Detected format {} for {}", kind, name);
        kind
    }

    fn from_mime(mime: &str) -> Self {
        match mime {
            "application/pdf" => FormatKind::Pdf,
            "image/png" | "image/jpeg" => FormatKind::Image,
            mime if mime.starts_with("text/") => FormatKind::Text,
            _ => FormatKind::Unsupported,
        }
    }
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FormatKind::Text => "text",
            FormatKind::Pdf => "PDF",
            FormatKind::Image => "image",
            FormatKind::Unsupported => "unsupported",
        };
        f.write_str(name)
    }
}

/// A chunk stored in the knowledge base, together with where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// The chunk text
    pub text: String,
    /// Name of the uploaded file the chunk was cut from
    pub source: String,
    /// Character offset of the chunk within the extracted file text
    pub start_position: usize,
    /// Ordinal of the chunk within its source file
    pub chunk_index: usize,
}

impl Document {
    /// Short preview for "view source" displays
    pub fn excerpt(&self, max_chars: usize) -> String {
        let mut chars = self.text.chars();
        let head: String = chars.by_ref().take(max_chars).collect();
        if chars.next().is_some() {
            format!("{}...", head)
        } else {
            head
        }
    }
}

/// Decode text bytes as UTF-8, falling back to Latin-1 which accepts every byte
pub fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(e) => {
            debug!("UTF-8 decoding failed ({}), falling back to Latin-1", e);
            bytes.iter().map(|&b| b as char).collect()
        }
    }
}

/// Normalize whitespace in extracted text (collapse spaces, cap newline runs)
pub fn normalize_whitespace(text: &str) -> String {
    let result = text.replace('\r', "");

    let mut prev_char = ' ';
    let mut newline_count = 0;
    let mut normalized = String::with_capacity(result.len());

    for c in result.chars() {
        if c == '\n' {
            newline_count += 1;
            continue;
        }

        if newline_count > 0 {
            push_newlines(&mut normalized, newline_count);
            newline_count = 0;
            prev_char = '\n';
        }

        if !(c == ' ' && prev_char == ' ') {
            normalized.push(c);
        }
        prev_char = c;
    }

    if newline_count > 0 {
        push_newlines(&mut normalized, newline_count);
    }

    normalized.trim().to_string()
}

fn push_newlines(out: &mut String, count: usize) {
    // Longer runs collapse to a paragraph break
    if count >= 2 {
        out.push_str("\n\n");
    } else {
        out.push('\n');
    }
}
