//! HTTP embedding providers.
//!
//! Three wire flavors are supported:
//!
//! - **OpenAI-compatible** (`POST {api_base}/embeddings`, bearer auth). Also
//!   covers DashScope and other OpenAI-shaped gateways.
//! - **Jina AI** (`POST {api_base}/embeddings`, bearer auth, same payload).
//! - **Ollama** (`POST {url}/api/embed`, no auth). A `url` that already
//!   names the `/api/embed` or `/api/embeddings` route is used as is.
//!
//! Requests use a blocking `reqwest` client with a per-request timeout.
//! Transport errors, HTTP 429 and 5xx responses are retried up to
//! `max_retries` times with linear backoff; other statuses fail immediately
//! with an [`HttpStatusError`] as the failure source.
//!
//! Returned vectors are L2-normalized so every distance metric sees unit
//! vectors regardless of what the provider sends.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

use super::{
    Embedder, EmbedderError, EmbedderResult, ModelCategory, ModelTier, embedding_failed,
    normalize_in_place,
};

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const OPENAI_DEFAULT_BASE: &str = "https://api.openai.com/v1";
pub const JINA_DEFAULT_BASE: &str = "https://api.jina.ai/v1";
pub const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Texts sent per HTTP request.
pub const MAX_BATCH: usize = 64;

const RETRY_BACKOFF: Duration = Duration::from_millis(250);
const MAX_ERROR_BODY: usize = 512;
const OLLAMA_ROUTES: [&str; 2] = ["/api/embed", "/api/embeddings"];

/// Non-success HTTP response from a provider, after retries ran out.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("HTTP {status}: {body}")]
pub struct HttpStatusError {
    pub status: u16,
    pub body: String,
}

/// Status of the [`HttpStatusError`] behind an embedding failure, if any.
pub fn http_status(err: &EmbedderError) -> Option<u16> {
    match err {
        EmbedderError::EmbeddingFailed { source, .. } => source
            .downcast_ref::<HttpStatusError>()
            .map(|http| http.status),
        _ => None,
    }
}

fn ollama_endpoint(url: &str) -> String {
    let url = url.trim_end_matches('/');
    if OLLAMA_ROUTES.iter().any(|route| url.ends_with(route)) {
        url.to_string()
    } else {
        format!("{url}/api/embed")
    }
}

/// Wire protocol spoken by a [`RemoteEmbedder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFlavor {
    OpenAi,
    Jina,
    Ollama,
}

impl ApiFlavor {
    fn prefix(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Jina => "jina",
            Self::Ollama => "ollama",
        }
    }
}

/// Timeout and retry policy for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for HttpPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: RETRY_BACKOFF,
        }
    }
}

impl HttpPolicy {
    pub fn new(timeout_secs: u64, max_retries: u32) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
            max_retries,
            ..Self::default()
        }
    }
}

#[derive(Deserialize)]
struct DataResponse {
    data: Vec<DataItem>,
}

#[derive(Deserialize)]
struct DataItem {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

#[derive(Deserialize)]
struct OllamaResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Embedder backed by a remote HTTP API.
pub struct RemoteEmbedder {
    flavor: ApiFlavor,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    id: String,
    policy: HttpPolicy,
    client: reqwest::blocking::Client,
    /// 0 until the first response arrives.
    dimension: AtomicUsize,
}

impl RemoteEmbedder {
    /// OpenAI-compatible `/embeddings` endpoint under `api_base`.
    pub fn openai(
        api_key: &str,
        api_base: &str,
        model: &str,
        policy: HttpPolicy,
    ) -> EmbedderResult<Self> {
        let endpoint = format!("{}/embeddings", api_base.trim_end_matches('/'));
        Self::build(ApiFlavor::OpenAi, endpoint, Some(api_key), model, policy)
    }

    pub fn jina(
        api_key: &str,
        api_base: &str,
        model: &str,
        policy: HttpPolicy,
    ) -> EmbedderResult<Self> {
        let endpoint = format!("{}/embeddings", api_base.trim_end_matches('/'));
        Self::build(ApiFlavor::Jina, endpoint, Some(api_key), model, policy)
    }

    pub fn ollama(url: &str, model: &str, policy: HttpPolicy) -> EmbedderResult<Self> {
        Self::build(ApiFlavor::Ollama, ollama_endpoint(url), None, model, policy)
    }

    fn build(
        flavor: ApiFlavor,
        endpoint: String,
        api_key: Option<&str>,
        model: &str,
        policy: HttpPolicy,
    ) -> EmbedderResult<Self> {
        let id = format!("{}:{}", flavor.prefix(), model);
        if model.trim().is_empty() {
            return Err(EmbedderError::EmbedderUnavailable {
                model: id,
                reason: "model name is empty".into(),
            });
        }
        if let Some(key) = api_key
            && key.trim().is_empty()
        {
            return Err(EmbedderError::EmbedderUnavailable {
                model: id,
                reason: "api key is empty".into(),
            });
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(policy.timeout)
            .user_agent(concat!("hvdb/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EmbedderError::EmbedderUnavailable {
                model: id.clone(),
                reason: format!("building http client: {e}"),
            })?;

        Ok(Self {
            flavor,
            endpoint,
            api_key: api_key.map(str::to_string),
            model: model.to_string(),
            id,
            policy,
            client,
            dimension: AtomicUsize::new(0),
        })
    }

    pub fn flavor(&self) -> ApiFlavor {
        self.flavor
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// JSON body for one request. Every flavor takes `{model, input}`.
    pub fn request_body(&self, texts: &[&str]) -> Value {
        json!({
            "model": self.model,
            "input": texts,
        })
    }

    /// Decode a successful response body into one vector per input text.
    pub fn parse_response(&self, body: Value, expected: usize) -> EmbedderResult<Vec<Vec<f32>>> {
        let vectors = match self.flavor {
            ApiFlavor::OpenAi | ApiFlavor::Jina => {
                let parsed: DataResponse = serde_json::from_value(body).map_err(|e| {
                    EmbedderError::EmbeddingFailed {
                        model: self.id.clone(),
                        source: Box::new(e),
                    }
                })?;
                let mut items = parsed.data;
                // Providers may return items out of order; `index` is authoritative.
                if items.iter().all(|item| item.index.is_some()) {
                    items.sort_by_key(|item| item.index);
                }
                items.into_iter().map(|item| item.embedding).collect()
            }
            ApiFlavor::Ollama => {
                let parsed: OllamaResponse = serde_json::from_value(body).map_err(|e| {
                    EmbedderError::EmbeddingFailed {
                        model: self.id.clone(),
                        source: Box::new(e),
                    }
                })?;
                parsed.embeddings
            }
        };
        self.check_vectors(vectors, expected)
    }

    fn check_vectors(
        &self,
        vectors: Vec<Vec<f32>>,
        expected: usize,
    ) -> EmbedderResult<Vec<Vec<f32>>> {
        if vectors.len() != expected {
            return Err(embedding_failed(
                &self.id,
                format!("expected {expected} embeddings, got {}", vectors.len()),
            ));
        }
        let Some(first) = vectors.first() else {
            return Ok(vectors);
        };

        let dim = first.len();
        if dim == 0 {
            return Err(embedding_failed(&self.id, "provider returned an empty vector"));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
            return Err(embedding_failed(
                &self.id,
                format!("dimension mismatch: expected {dim}, got {}", bad.len()),
            ));
        }

        match self
            .dimension
            .compare_exchange(0, dim, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => {}
            Err(known) if known == dim => {}
            Err(known) => {
                return Err(embedding_failed(
                    &self.id,
                    format!("dimension changed from {known} to {dim}"),
                ));
            }
        }

        let mut vectors = vectors;
        for vector in &mut vectors {
            normalize_in_place(vector);
        }
        Ok(vectors)
    }

    fn post(&self, body: &Value) -> EmbedderResult<Value> {
        let mut attempt: u32 = 0;
        loop {
            let mut request = self.client.post(&self.endpoint).json(body);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            match request.send() {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json::<Value>().map_err(|e| {
                            EmbedderError::EmbeddingFailed {
                                model: self.id.clone(),
                                source: Box::new(e),
                            }
                        });
                    }

                    let mut text = response.text().unwrap_or_default();
                    if text.len() > MAX_ERROR_BODY {
                        let cut = (0..=MAX_ERROR_BODY)
                            .rev()
                            .find(|i| text.is_char_boundary(*i))
                            .unwrap_or(0);
                        text.truncate(cut);
                    }
                    let retryable = status.is_server_error() || status.as_u16() == 429;
                    if !retryable || attempt >= self.policy.max_retries {
                        return Err(EmbedderError::EmbeddingFailed {
                            model: self.id.clone(),
                            source: Box::new(HttpStatusError {
                                status: status.as_u16(),
                                body: text,
                            }),
                        });
                    }
                    warn!(
                        model = %self.id,
                        status = status.as_u16(),
                        attempt = attempt + 1,
                        "embedding request rejected, retrying"
                    );
                }
                Err(e) => {
                    if attempt >= self.policy.max_retries {
                        return Err(EmbedderError::EmbeddingFailed {
                            model: self.id.clone(),
                            source: Box::new(e),
                        });
                    }
                    warn!(
                        model = %self.id,
                        error = %e,
                        attempt = attempt + 1,
                        "embedding request failed, retrying"
                    );
                }
            }

            attempt += 1;
            std::thread::sleep(self.policy.backoff * attempt);
        }
    }
}

impl fmt::Debug for RemoteEmbedder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteEmbedder")
            .field("flavor", &self.flavor)
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("policy", &self.policy)
            .finish()
    }
}

impl Embedder for RemoteEmbedder {
    fn embed_sync(&self, text: &str) -> EmbedderResult<Vec<f32>> {
        let mut vectors = self.embed_batch_sync(&[text])?;
        vectors
            .pop()
            .ok_or_else(|| embedding_failed(&self.id, "provider returned no embedding"))
    }

    fn embed_batch_sync(&self, texts: &[&str]) -> EmbedderResult<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.is_empty()) {
            return Err(EmbedderError::InvalidConfig {
                field: "input_text".to_string(),
                value: "(empty)".to_string(),
                reason: "empty text".to_string(),
            });
        }

        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(MAX_BATCH) {
            debug!(model = %self.id, texts = chunk.len(), "requesting embeddings");
            let body = self.post(&self.request_body(chunk))?;
            out.extend(self.parse_response(body, chunk.len())?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.dimension.load(Ordering::SeqCst)
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn is_semantic(&self) -> bool {
        true
    }

    fn category(&self) -> ModelCategory {
        ModelCategory::TransformerEmbedder
    }

    fn tier(&self) -> ModelTier {
        ModelTier::Quality
    }
}
