pub mod chunking;
pub mod completion;
pub mod config;
pub mod document;
pub mod embeddings;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod knowledge_base;
pub mod openai;
pub mod rag;
pub mod session;
