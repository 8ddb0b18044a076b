use std::fmt;
use thiserror::Error;

use crate::document::FormatKind;

/// Errors raised while reading configuration from the environment
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    InvalidChunking { size: usize, overlap: usize },
}

/// One OCR strategy that did not produce text
#[derive(Debug, Clone)]
pub struct StrategyFailure {
    pub strategy: String,
    pub message: String,
}

impl fmt::Display for StrategyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.strategy, self.message)
    }
}

/// Errors that make ingestion skip a single file
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to extract text from {format} document: {message}")]
    Extraction { format: FormatKind, message: String },

    #[error("all OCR strategies failed: {}", join_failures(.0))]
    Ocr(Vec<StrategyFailure>),
}

fn join_failures(failures: &[StrategyFailure]) -> String {
    if failures.is_empty() {
        return "no strategies configured".to_string();
    }
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failures of the external embedding service
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding request failed: {0}")]
    Request(String),

    #[error("embedding API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed embedding response: {0}")]
    Malformed(String),

    #[error("expected {expected} embeddings, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Failures of the external chat-completion service
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Request(String),

    #[error("completion API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("no response generated")]
    Empty,
}

#[derive(Debug, Error)]
pub enum KnowledgeBaseError {
    #[error("cannot build a knowledge base from zero chunks")]
    Empty,

    #[error("top-k must be at least 1")]
    InvalidTopK,

    #[error("knowledge base was embedded with {index}, but the query embedder is {embedder}")]
    ModelMismatch { index: String, embedder: String },

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

#[derive(Debug, Error)]
pub enum QaError {
    #[error("no knowledge base loaded; upload documents first")]
    NoKnowledgeBase,

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Completion(#[from] CompletionError),
}

/// Errors from loading a batch of documents into a session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("none of the {0} file(s) could be processed")]
    AllFilesFailed(usize),

    #[error("the uploaded documents contain no text")]
    NoChunks,

    #[error(transparent)]
    KnowledgeBase(#[from] KnowledgeBaseError),
}

impl From<reqwest::Error> for EmbeddingError {
    fn from(e: reqwest::Error) -> Self {
        EmbeddingError::Request(e.to_string())
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(e: reqwest::Error) -> Self {
        CompletionError::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ocr_error_lists_every_strategy() {
        let err = IngestError::Ocr(vec![
            StrategyFailure {
                strategy: "structured".to_string(),
                message: "boom".to_string(),
            },
            StrategyFailure {
                strategy: "plain".to_string(),
                message: "no text".to_string(),
            },
        ]);
        assert_eq!(
            err.to_string(),
            "all OCR strategies failed: structured: boom; plain: no text"
        );
    }
}
