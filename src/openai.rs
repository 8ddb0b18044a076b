use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::completion::{ChatMessage, ChatModel};
use crate::embeddings::{Embedding, EmbeddingModel};
use crate::error::{CompletionError, EmbeddingError};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";

/// Configuration for the OpenAI-compatible API
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub embedding_model: String,
    /// Expected embedding size; inferred from the first response when unset
    pub embedding_dims: Option<usize>,
    /// Maximum number of texts sent in one embedding request
    pub embedding_batch_size: usize,
    pub chat_model: String,
    pub timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        OpenAiConfig {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dims: None,
            embedding_batch_size: 100,
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Client for the embeddings and chat completions endpoints.
///
/// Requests are never retried: a failed call is reported to the caller as is.
#[derive(Clone)]
pub struct OpenAiClient {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiClient {
    /// Create a new client
    pub fn new(config: OpenAiConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(OpenAiClient { config, client })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        let request = EmbeddingRequest {
            model: &self.config.embedding_model,
            input: texts,
        };

        let response = self
            .client
            .post(self.config.endpoint("embeddings"))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(EmbeddingError::Api { status, body });
        }

        let response_data: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Malformed(e.to_string()))?;

        embeddings_in_input_order(response_data, texts.len())
    }
}

#[async_trait]
impl EmbeddingModel for OpenAiClient {
    fn model_name(&self) -> &str {
        &self.config.embedding_model
    }

    fn dims(&self) -> Option<usize> {
        self.config.embedding_dims
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        embed_in_batches(texts, self.config.embedding_batch_size, |batch| {
            self.embed_batch(batch)
        })
        .await
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    fn model_name(&self) -> &str {
        &self.config.chat_model
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<String, CompletionError> {
        let request = ChatRequest {
            model: &self.config.chat_model,
            messages,
            temperature,
        };

        let response = self
            .client
            .post(self.config.endpoint("chat/completions"))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CompletionError::Api { status, body });
        }

        let response_data: ChatResponse = response.json().await?;
        first_choice_text(response_data)
    }
}

/// Embed `texts` in consecutive batches of at most `batch_size`, one request
/// at a time. The first failing batch aborts the whole call.
async fn embed_in_batches<'a, F, Fut>(
    texts: &'a [String],
    batch_size: usize,
    mut embed_batch: F,
) -> Result<Vec<Embedding>, EmbeddingError>
where
    F: FnMut(&'a [String]) -> Fut,
    Fut: Future<Output = Result<Vec<Embedding>, EmbeddingError>>,
{
    let mut embeddings = Vec::with_capacity(texts.len());

    for batch in texts.chunks(batch_size.max(1)) {
        debug!("Embedding batch of {} text(s)", batch.len());
        let vectors = embed_batch(batch).await?;
        if vectors.len() != batch.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: batch.len(),
                actual: vectors.len(),
            });
        }
        embeddings.extend(vectors);
    }

    Ok(embeddings)
}

/// Order the returned vectors by their `index` and check the count
fn embeddings_in_input_order(
    response: EmbeddingResponse,
    expected: usize,
) -> Result<Vec<Embedding>, EmbeddingError> {
    let mut data = response.data;
    if data.len() != expected {
        return Err(EmbeddingError::CountMismatch {
            expected,
            actual: data.len(),
        });
    }
    data.sort_by_key(|d| d.index);

    Ok(data
        .into_iter()
        .map(|d| Embedding { values: d.embedding })
        .collect())
}

fn first_choice_text(response: ChatResponse) -> Result<String, CompletionError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|text| !text.trim().is_empty())
        .ok_or(CompletionError::Empty)
}

// Request/response structures for the API

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize, Debug)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize, Debug)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::Role;

    #[test]
    fn test_embeddings_are_reordered_by_index() {
        let response: EmbeddingResponse = serde_json::from_str(
            r#"{"object":"list","data":[
                {"object":"embedding","index":1,"embedding":[0.0,1.0]},
                {"object":"embedding","index":0,"embedding":[1.0,0.0]}
            ],"model":"text-embedding-ada-002"}"#,
        )
        .unwrap();
        let embeddings = embeddings_in_input_order(response, 2).unwrap();
        assert_eq!(embeddings[0].values, vec![1.0, 0.0]);
        assert_eq!(embeddings[1].values, vec![0.0, 1.0]);
    }

    #[test]
    fn test_embedding_count_mismatch() {
        let response: EmbeddingResponse =
            serde_json::from_str(r#"{"data":[{"index":0,"embedding":[1.0]}]}"#).unwrap();
        assert!(matches!(
            embeddings_in_input_order(response, 3),
            Err(EmbeddingError::CountMismatch {
                expected: 3,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_first_choice_text() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"Paris."},"finish_reason":"stop"}]}"#,
        )
        .unwrap();
        assert_eq!(first_choice_text(response).unwrap(), "Paris.");
    }

    #[test]
    fn test_blank_or_missing_choice_is_empty() {
        let none: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(first_choice_text(none), Err(CompletionError::Empty)));

        let blank: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"  "}}]}"#).unwrap();
        assert!(matches!(first_choice_text(blank), Err(CompletionError::Empty)));
    }

    #[test]
    fn test_chat_request_shape() {
        let messages = [ChatMessage::new(Role::User, "hello")];
        let request = ChatRequest {
            model: "gpt-3.5-turbo",
            messages: &messages,
            temperature: 0.5,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-3.5-turbo");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["temperature"], 0.5);
    }

    #[test]
    fn test_endpoint_joins_paths() {
        let mut config = OpenAiConfig::new("key");
        config.base_url = "http://localhost:8080/v1/".to_string();
        assert_eq!(
            config.endpoint("embeddings"),
            "http://localhost:8080/v1/embeddings"
        );
    }

    fn numbered(count: usize) -> Vec<String> {
        (0..count).map(|i| i.to_string()).collect()
    }

    /// Embeds each text as its number and records the size of every batch
    async fn batch_sizes(count: usize, batch_size: usize) -> (Vec<f32>, Vec<usize>) {
        let texts = numbered(count);
        let mut sizes = Vec::new();
        let embeddings = embed_in_batches(&texts, batch_size, |batch| {
            sizes.push(batch.len());
            let vectors = batch
                .iter()
                .map(|t| Embedding {
                    values: vec![t.parse().unwrap()],
                })
                .collect();
            async move { Ok::<_, EmbeddingError>(vectors) }
        })
        .await
        .unwrap();
        (embeddings.iter().map(|e| e.values[0]).collect(), sizes)
    }

    #[tokio::test]
    async fn test_batches_respect_the_size_and_keep_order() {
        let (values, sizes) = batch_sizes(5, 2).await;
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(values, vec![0.0, 1.0, 2.0, 3.0, 4.0]);

        let (values, sizes) = batch_sizes(3, 1).await;
        assert_eq!(sizes, vec![1, 1, 1]);
        assert_eq!(values, vec![0.0, 1.0, 2.0]);

        let (_, sizes) = batch_sizes(4, 4).await;
        assert_eq!(sizes, vec![4]);

        // a zero batch size still makes progress
        let (_, sizes) = batch_sizes(2, 0).await;
        assert_eq!(sizes, vec![1, 1]);
    }

    #[tokio::test]
    async fn test_failing_batch_stops_the_remaining_requests() {
        let texts = numbered(6);
        let mut calls = 0;
        let result = embed_in_batches(&texts, 2, |batch| {
            calls += 1;
            let fails = batch.iter().any(|t| t == "3");
            let vectors: Vec<Embedding> = batch
                .iter()
                .map(|_| Embedding { values: vec![1.0] })
                .collect();
            async move {
                if fails {
                    Err(EmbeddingError::Api {
                        status: 429,
                        body: "rate limited".to_string(),
                    })
                } else {
                    Ok::<_, EmbeddingError>(vectors)
                }
            }
        })
        .await;

        assert!(matches!(result, Err(EmbeddingError::Api { status: 429, .. })));
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn test_short_batch_response_is_a_count_mismatch() {
        let texts = numbered(3);
        let result = embed_in_batches(&texts, 3, |_batch| async {
            Ok::<_, EmbeddingError>(vec![Embedding { values: vec![1.0] }])
        })
        .await;
        assert!(matches!(
            result,
            Err(EmbeddingError::CountMismatch {
                expected: 3,
                actual: 1
            })
        ));
    }
}
