use log::{debug, info};
use std::cmp::Ordering;
use std::sync::Arc;

use crate::chunking::TextChunk;
use crate::document::Document;
use crate::embeddings::{Embedding, EmbeddingModel};
use crate::error::{EmbeddingError, KnowledgeBaseError};

/// Number of documents handed to the model per question
pub const DEFAULT_TOP_K: usize = 3;

/// In-memory similarity index over embedded documents.
///
/// Built once from the full document set and never modified afterwards;
/// reprocessing uploads builds a new index.
#[derive(Debug)]
pub struct KnowledgeBaseIndex {
    model: String,
    dims: usize,
    entries: Vec<(Embedding, Document)>,
}

/// A document paired with its similarity to the query
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub score: f32,
    pub document: Document,
}

impl KnowledgeBaseIndex {
    /// Build an index, checking that every vector has the same size
    pub fn build(
        model: &str,
        entries: Vec<(Embedding, Document)>,
    ) -> Result<Self, KnowledgeBaseError> {
        let dims = match entries.first() {
            Some((embedding, _)) => embedding.dims(),
            None => return Err(KnowledgeBaseError::Empty),
        };

        if let Some((embedding, _)) = entries.iter().find(|(e, _)| e.dims() != dims) {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dims,
                actual: embedding.dims(),
            }
            .into());
        }

        Ok(KnowledgeBaseIndex {
            model: model.to_string(),
            dims,
            entries,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Nearest neighbours by cosine similarity, best first.
    /// Equal scores keep insertion order.
    pub fn search(
        &self,
        query: &Embedding,
        limit: usize,
    ) -> Result<Vec<ScoredDocument>, EmbeddingError> {
        if query.dims() != self.dims {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dims,
                actual: query.dims(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, (embedding, _))| (i, embedding.cosine_similarity(query)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|(i, score)| ScoredDocument {
                score,
                document: self.entries[i].1.clone(),
            })
            .collect())
    }
}

/// Returns the top-k documents for a query text
pub struct Retriever {
    index: Arc<KnowledgeBaseIndex>,
    embedder: Arc<dyn EmbeddingModel>,
    k: usize,
}

impl Retriever {
    /// Pair an index with the embedder used for queries.
    ///
    /// The embedder must be the model the index was built with; vectors from
    /// two models are not comparable even when their sizes agree.
    pub fn new(
        index: Arc<KnowledgeBaseIndex>,
        embedder: Arc<dyn EmbeddingModel>,
        k: usize,
    ) -> Result<Self, KnowledgeBaseError> {
        if k == 0 {
            return Err(KnowledgeBaseError::InvalidTopK);
        }
        if embedder.model_name() != index.model() {
            return Err(KnowledgeBaseError::ModelMismatch {
                index: index.model().to_string(),
                embedder: embedder.model_name().to_string(),
            });
        }
        if let Some(declared) = embedder.dims() {
            if declared != index.dims() {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: index.dims(),
                    actual: declared,
                }
                .into());
            }
        }
        Ok(Retriever { index, embedder, k })
    }

    pub fn index(&self) -> &KnowledgeBaseIndex {
        &self.index
    }

    /// Up to k documents, nearest first
    pub async fn retrieve(&self, query: &str) -> Result<Vec<Document>, EmbeddingError> {
        Ok(self
            .retrieve_scored(query)
            .await?
            .into_iter()
            .map(|scored| scored.document)
            .collect())
    }

    pub async fn retrieve_scored(&self, query: &str) -> Result<Vec<ScoredDocument>, EmbeddingError> {
        let query_embedding = self.embedder.embed_query(query).await?;
        let results = self.index.search(&query_embedding, self.k)?;
        debug!(
            "Retrieved {} of at most {} document(s), best score {:?}",
            results.len(),
            self.k,
            results.first().map(|r| r.score)
        );
        Ok(results)
    }
}

/// Embed the chunks, index them and return a retriever over the index
pub async fn create_knowledge_base(
    chunks: Vec<TextChunk>,
    embedder: Arc<dyn EmbeddingModel>,
    k: usize,
) -> Result<Retriever, KnowledgeBaseError> {
    if chunks.is_empty() {
        return Err(KnowledgeBaseError::Empty);
    }
    if k == 0 {
        return Err(KnowledgeBaseError::InvalidTopK);
    }

    let documents: Vec<Document> = chunks
        .into_iter()
        .map(|chunk| Document {
            text: chunk.text,
            source: chunk.source,
            start_position: chunk.start_position,
            chunk_index: chunk.index,
        })
        .collect();

    info!(
        "Generating embeddings for {} document(s) with {}",
        documents.len(),
        embedder.model_name()
    );
    let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
    let embeddings = embedder.embed_documents(&texts).await?;

    if embeddings.len() != documents.len() {
        return Err(EmbeddingError::CountMismatch {
            expected: documents.len(),
            actual: embeddings.len(),
        }
        .into());
    }

    if let Some(expected) = embedder.dims() {
        if let Some(bad) = embeddings.iter().find(|e| e.dims() != expected) {
            return Err(EmbeddingError::DimensionMismatch {
                expected,
                actual: bad.dims(),
            }
            .into());
        }
    }

    let index = KnowledgeBaseIndex::build(
        embedder.model_name(),
        embeddings.into_iter().zip(documents).collect(),
    )?;
    info!(
        "Built knowledge base: {} document(s), {} dimensions",
        index.len(),
        index.dims()
    );

    Retriever::new(Arc::new(index), embedder, k)
}
