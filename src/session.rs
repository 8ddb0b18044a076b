use log::{info, warn};
use std::io::{self, BufRead, Write};
use std::sync::{Arc, RwLock};

use crate::document::UploadedFile;
use crate::embeddings::EmbeddingModel;
use crate::error::{QaError, SessionError};
use crate::ingest::{DocumentProcessor, IngestReport};
use crate::knowledge_base::{create_knowledge_base, Retriever};
use crate::rag::{ChatTurn, QaEngine, QaResult};

/// Characters of each source shown under an answer
const SOURCE_EXCERPT_CHARS: usize = 200;

/// Holds the current retriever. A rebuilt knowledge base replaces the old
/// one in a single swap; callers that already hold an `Arc` keep using the
/// index they started with.
#[derive(Default)]
pub struct KnowledgeBaseHandle {
    current: RwLock<Option<Arc<Retriever>>>,
}

impl KnowledgeBaseHandle {
    pub fn current(&self) -> Option<Arc<Retriever>> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn replace(&self, retriever: Retriever) {
        let retriever = Arc::new(retriever);
        match self.current.write() {
            Ok(mut guard) => *guard = Some(retriever),
            Err(poisoned) => *poisoned.into_inner() = Some(retriever),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.current().is_some()
    }
}

/// State a front end keeps for one user: the knowledge base and chat history
pub struct Session {
    processor: DocumentProcessor,
    embedder: Arc<dyn EmbeddingModel>,
    engine: QaEngine,
    top_k: usize,
    knowledge_base: KnowledgeBaseHandle,
    history: Vec<ChatTurn>,
}

impl Session {
    pub fn new(
        processor: DocumentProcessor,
        embedder: Arc<dyn EmbeddingModel>,
        engine: QaEngine,
        top_k: usize,
    ) -> Self {
        Session {
            processor,
            embedder,
            engine,
            top_k,
            knowledge_base: KnowledgeBaseHandle::default(),
            history: Vec::new(),
        }
    }

    /// Process uploads and swap in a knowledge base built from them.
    ///
    /// The previous knowledge base stays active when nothing usable came out
    /// of the batch or the build fails.
    pub async fn load_documents(
        &self,
        files: &[UploadedFile],
    ) -> Result<IngestReport, SessionError> {
        let mut report = self.processor.process_documents(files).await;

        if report.all_failed() {
            return Err(SessionError::AllFilesFailed(report.failed.len()));
        }
        if report.chunks.is_empty() {
            return Err(SessionError::NoChunks);
        }

        let chunks = std::mem::take(&mut report.chunks);
        let retriever = create_knowledge_base(chunks, self.embedder.clone(), self.top_k).await?;
        self.knowledge_base.replace(retriever);

        Ok(report)
    }

    pub fn knowledge_base(&self) -> &KnowledgeBaseHandle {
        &self.knowledge_base
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    pub fn message_count(&self) -> usize {
        self.history.len()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Ask a question; the history only grows when an answer came back
    pub async fn ask(&mut self, question: &str) -> Result<QaResult, QaError> {
        let retriever = self
            .knowledge_base
            .current()
            .ok_or(QaError::NoKnowledgeBase)?;

        let result = self
            .engine
            .answer(question, &self.history, &retriever)
            .await?;

        self.history.push(ChatTurn::user(question));
        self.history.push(ChatTurn::assistant(result.answer.clone()));
        Ok(result)
    }

    /// Interactive question loop.
    ///
    /// `exit` quits, `/clear` resets the history and `/sources` toggles
    /// the source listing.
    pub async fn run_query_loop<R, W>(
        &mut self,
        mut input: R,
        mut output: W,
        mut show_sources: bool,
    ) -> io::Result<()>
    where
        R: BufRead,
        W: Write,
    {
        writeln!(
            output,
            "Ready to answer questions about your documents. Type 'exit' to quit, '/clear' to reset the conversation."
        )?;
        if !self.knowledge_base.is_loaded() {
            writeln!(output, "No documents loaded yet; questions cannot be answered.")?;
        }

        let mut buffer = String::new();
        loop {
            write!(output, "\nYour question: ")?;
            output.flush()?;

            buffer.clear();
            if input.read_line(&mut buffer)? == 0 {
                break;
            }

            let question = buffer.trim();
            match question.to_lowercase().as_str() {
                "" => continue,
                "exit" => {
                    info!("Goodbye!");
                    break;
                }
                "/clear" => {
                    self.clear_history();
                    writeln!(output, "Chat history cleared.")?;
                    continue;
                }
                "/sources" => {
                    show_sources = !show_sources;
                    let state = if show_sources { "on" } else { "off" };
                    writeln!(output, "Source display {}.", state)?;
                    continue;
                }
                _ => {}
            }

            match self.ask(question).await {
                Ok(result) => {
                    writeln!(output, "\n{}", result.answer)?;
                    if show_sources {
                        for (i, doc) in result.source_documents.iter().enumerate() {
                            writeln!(
                                output,
                                "\nSource {} ({}):\n{}",
                                i + 1,
                                doc.source,
                                doc.excerpt(SOURCE_EXCERPT_CHARS)
                            )?;
                        }
                    }
                }
                Err(e) => {
                    warn!("Question failed: {}", e);
                    writeln!(output, "Error: {}", e)?;
                }
            }
        }

        Ok(())
    }
}
