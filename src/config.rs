use log::warn;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::chunking::{TextSplitter, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::error::ConfigError;
use crate::knowledge_base::DEFAULT_TOP_K;
use crate::openai::{OpenAiConfig, DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_MODEL};
use crate::rag::{HistoryPolicy, DEFAULT_TEMPERATURE};

const DEFAULT_KNOWLEDGE_BASE_PATH: &str = "guru_knowledge.db";

/// Application configuration, read once at startup
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub openai: OpenAiConfig,
    pub splitter: TextSplitter,
    pub temperature: f32,
    pub top_k: usize,
    pub history_policy: HistoryPolicy,
    pub tesseract_cmd: String,
    /// Accepted for compatibility; the knowledge base is never persisted
    pub knowledge_base_path: PathBuf,
}

impl AppConfig {
    /// Create a new configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from any variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_key = var("OPENAI_API_KEY").ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;

        let openai = OpenAiConfig {
            api_key,
            base_url: var("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            embedding_model: var("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_dims: parse_opt(&var, "EMBEDDING_DIMS")?,
            embedding_batch_size: parse_or(&var, "EMBEDDING_BATCH_SIZE", 100)?,
            chat_model: var("CHAT_MODEL").unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            timeout: Duration::from_secs(parse_or(&var, "REQUEST_TIMEOUT_SECS", 60)?),
        };

        let splitter = TextSplitter::new(
            parse_or(&var, "CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?,
            parse_or(&var, "CHUNK_OVERLAP", DEFAULT_CHUNK_OVERLAP)?,
        )?;

        let top_k = parse_or(&var, "RETRIEVAL_TOP_K", DEFAULT_TOP_K)?;
        if top_k == 0 {
            return Err(ConfigError::Invalid {
                name: "RETRIEVAL_TOP_K",
                value: "0".to_string(),
            });
        }

        let history_policy = if parse_or(&var, "CONDENSE_HISTORY", true)? {
            HistoryPolicy::Condense
        } else {
            HistoryPolicy::QuestionOnly
        };

        let knowledge_base_path = PathBuf::from(
            var("KNOWLEDGE_BASE_PATH").unwrap_or_else(|| DEFAULT_KNOWLEDGE_BASE_PATH.to_string()),
        );

        Ok(AppConfig {
            openai,
            splitter,
            temperature: parse_or(&var, "TEMPERATURE", DEFAULT_TEMPERATURE)?,
            top_k,
            history_policy,
            tesseract_cmd: var("TESSERACT_CMD").unwrap_or_else(|| "tesseract".to_string()),
            knowledge_base_path,
        })
    }

    /// Log settings that are accepted but have no effect
    pub fn warn_inert_settings(&self) {
        warn!(
            "Knowledge base path {} is not used: the knowledge base lives in memory only",
            self.knowledge_base_path.display()
        );
    }
}

fn parse_or<T, F>(var: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    Ok(parse_opt(var, name)?.unwrap_or(default))
}

fn parse_opt<T, F>(var: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
