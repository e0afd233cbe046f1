//! LLM-backed classifiers
//!
//! `LlmClassifier` owns prompting, rate limiting, retry and response parsing; the
//! backend only moves text. Two backends:
//! - `OpenAiBackend`: OpenAI-compatible `/chat/completions` with a Bearer key
//! - `OllamaBackend`: local Ollama `/api/generate`

use super::{prompt, response, Classifier, ClassifierKind};
use crate::config::ClassifierConfig;
use crate::error::ClassifierError;
use crate::models::Taxonomy;
use crate::types::{ClassificationResult, ProductDescriptor};
use crate::utils::{retry_with_backoff, RetryPolicy};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_OLLAMA_ENDPOINT: &str = "http://localhost:11434";
const DEFAULT_OLLAMA_MODEL: &str = "llama3.1";

/// Text-in, text-out transport to a language model
#[async_trait::async_trait]
pub trait LlmBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ClassifierError>;
}

fn build_http_client(timeout: Duration) -> Result<Client, ClassifierError> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| ClassifierError::Service(format!("HTTP client build failed: {}", e)))
}

fn transport_error(e: reqwest::Error, timeout: Duration) -> ClassifierError {
    if e.is_timeout() {
        ClassifierError::Service(format!("Request timed out after {}s", timeout.as_secs()))
    } else {
        ClassifierError::Service(e.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClassifierError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClassifierError::Api {
        status: status.as_u16(),
        body,
    })
}

// ============================================================================
// OpenAI-compatible chat completions
// ============================================================================

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiBackend {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl OpenAiBackend {
    pub fn new(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            ClassifierError::NotConfigured(
                "remote classifier needs an API key (PCAT_CLASSIFIER_API_KEY or [classifier] api_key)"
                    .to_string(),
            )
        })?;

        Ok(Self {
            client: build_http_client(config.timeout)?,
            endpoint: config
                .endpoint
                .as_deref()
                .unwrap_or(DEFAULT_OPENAI_ENDPOINT)
                .trim_end_matches('/')
                .to_string(),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            api_key,
            timeout: config.timeout,
        })
    }
}

#[async_trait::async_trait]
impl LlmBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ClassifierError> {
        let url = format!("{}/chat/completions", self.endpoint);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.0,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        let parsed: ChatResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ClassifierError::MalformedResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ClassifierError::MalformedResponse("Response has no choices".to_string()))
    }
}

// ============================================================================
// Ollama
// ============================================================================

#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    format: &'a str,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

pub struct OllamaBackend {
    client: Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaBackend {
    pub fn new(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        Ok(Self {
            client: build_http_client(config.timeout)?,
            base_url: config
                .endpoint
                .as_deref()
                .unwrap_or(DEFAULT_OLLAMA_ENDPOINT)
                .trim_end_matches('/')
                .to_string(),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
            timeout: config.timeout,
        })
    }
}

#[async_trait::async_trait]
impl LlmBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ClassifierError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = OllamaGenerateRequest {
            model: &self.model,
            prompt,
            system,
            stream: false,
            format: "json",
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ClassifierError::Service(format!("Cannot reach Ollama at {}", self.base_url))
                } else {
                    transport_error(e, self.timeout)
                }
            })?;

        let parsed: OllamaGenerateResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ClassifierError::MalformedResponse(e.to_string()))?;

        Ok(parsed.response)
    }
}

// ============================================================================
// Classifier
// ============================================================================

/// Classifier speaking to a language model through `B`
pub struct LlmClassifier<B: LlmBackend> {
    backend: B,
    kind: ClassifierKind,
    retry: RetryPolicy,
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl<B: LlmBackend> LlmClassifier<B> {
    pub fn new(backend: B, kind: ClassifierKind, config: &ClassifierConfig) -> Self {
        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            backend,
            kind,
            retry: config.retry.clone(),
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn request(&self, prompt: &str) -> Result<String, ClassifierError> {
        let operation = format!("{} classify", self.backend.name());
        retry_with_backoff(&operation, &self.retry, ClassifierError::is_transient, || async move {
            self.rate_limiter.until_ready().await;
            self.backend.complete(prompt::SYSTEM_PROMPT, prompt).await
        })
        .await
    }
}

#[async_trait::async_trait]
impl<B: LlmBackend> Classifier for LlmClassifier<B> {
    fn kind(&self) -> ClassifierKind {
        self.kind
    }

    async fn classify_one(
        &self,
        product: &ProductDescriptor,
        taxonomy: &Taxonomy,
    ) -> Result<ClassificationResult, ClassifierError> {
        let text = self
            .request(&prompt::single_prompt(product, taxonomy))
            .await?;
        debug!(name = %product.name, chars = text.len(), "Classifier answered");
        response::parse_single(&text)
    }

    async fn classify_batch(
        &self,
        products: &[ProductDescriptor],
        taxonomy: &Taxonomy,
    ) -> Result<Vec<Option<ClassificationResult>>, ClassifierError> {
        if products.is_empty() {
            return Ok(Vec::new());
        }
        let text = self
            .request(&prompt::batch_prompt(products, taxonomy))
            .await?;
        debug!(products = products.len(), chars = text.len(), "Classifier answered batch");
        response::parse_batch(&text, products.len())
    }
}
