use log::{debug, info};
use std::sync::Arc;

use crate::completion::{ChatMessage, ChatModel, Role};
use crate::document::Document;
use crate::error::QaError;
use crate::knowledge_base::Retriever;

/// Default sampling temperature for answers
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

const ANSWER_INSTRUCTIONS: &str = "Use the following pieces of context to answer the user's question. \
If you don't know the answer from the context, just say that you don't know, don't try to make up an answer.";

const CONDENSE_INSTRUCTIONS: &str = "Given the following conversation and a follow up question, \
rephrase the follow up question to be a standalone question, in its original language. \
Answer only with the standalone question.";

/// One turn of the session's chat history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        ChatTurn {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatTurn {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// How prior turns influence retrieval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryPolicy {
    /// Rewrite follow-up questions into standalone queries using the history
    Condense,
    /// Search with the latest question verbatim
    QuestionOnly,
}

/// An answer together with the documents it was grounded on
#[derive(Debug, Clone)]
pub struct QaResult {
    pub answer: String,
    /// Documents supplied to the model, most relevant first
    pub source_documents: Vec<Document>,
}

/// Answers questions from retrieved documents.
///
/// Holds no conversation state: history and the retriever come with every call.
pub struct QaEngine {
    llm: Arc<dyn ChatModel>,
    temperature: f32,
    history_policy: HistoryPolicy,
}

impl QaEngine {
    pub fn new(llm: Arc<dyn ChatModel>, temperature: f32, history_policy: HistoryPolicy) -> Self {
        QaEngine {
            llm,
            temperature,
            history_policy,
        }
    }

    /// Answer a question grounded in the retriever's knowledge base
    pub async fn answer(
        &self,
        question: &str,
        history: &[ChatTurn],
        retriever: &Retriever,
    ) -> Result<QaResult, QaError> {
        let query = self.search_query(question, history).await?;

        let source_documents = retriever.retrieve(&query).await?;
        info!(
            "Answering with {} source document(s) using {}",
            source_documents.len(),
            self.llm.model_name()
        );

        let messages = grounding_messages(&source_documents, question);
        let answer = self.llm.complete(&messages, self.temperature).await?;

        Ok(QaResult {
            answer: answer.trim().to_string(),
            source_documents,
        })
    }

    /// The text used to search the knowledge base
    async fn search_query(&self, question: &str, history: &[ChatTurn]) -> Result<String, QaError> {
        if history.is_empty() || self.history_policy == HistoryPolicy::QuestionOnly {
            return Ok(question.to_string());
        }

        let messages = [
            ChatMessage::new(Role::System, CONDENSE_INSTRUCTIONS),
            ChatMessage::new(
                Role::User,
                format!(
                    "Chat History:\n{}\nFollow Up Input: {}\nStandalone question:",
                    format_history(history),
                    question
                ),
            ),
        ];

        // Condensing is a rewrite, not a creative task
        let standalone = self.llm.complete(&messages, 0.0).await?;
        let standalone = standalone.trim().to_string();
        debug!("Condensed question: {}", standalone);
        Ok(standalone)
    }
}

fn format_history(history: &[ChatTurn]) -> String {
    history
        .iter()
        .map(|turn| {
            let speaker = match turn.role {
                Role::System => "System",
                Role::User => "Human",
                Role::Assistant => "Assistant",
            };
            format!("{}: {}", speaker, turn.content)
        })
        .collect::<Vec<String>>()
        .join("\n")
}

fn grounding_messages(documents: &[Document], question: &str) -> Vec<ChatMessage> {
    let context = documents
        .iter()
        .map(|doc| doc.text.as_str())
        .collect::<Vec<&str>>()
        .join("\n\n");

    vec![
        ChatMessage::new(
            Role::System,
            format!("{}\n----------------\n{}", ANSWER_INSTRUCTIONS, context),
        ),
        ChatMessage::new(Role::User, question),
    ]
}
