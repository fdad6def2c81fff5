//! Generative text client — the seam to the external generation capability
//!
//! Defines the client trait and request/response types for requesting
//! generated text. Two implementations:
//! - `HttpGenerator`: JSON POST to a configured endpoint (production)
//! - `MockGenerator`: returns preconfigured responses (testing)
//!
//! The client returns raw text only. Stripping delimiters and parsing
//! the text into a task's typed shape happens in the task layer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Upper bound for a single generation call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment variable naming the generation endpoint
pub const ENDPOINT_ENV: &str = "INTAKE_GENERATE_URL";
/// Environment variable holding the bearer token, if the endpoint wants one
pub const TOKEN_ENV: &str = "INTAKE_GENERATE_TOKEN";

/// One generation request, built by an enrichment task
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    /// What to produce, in prose
    pub instruction: String,
    /// Structured context the generation should draw from
    pub payload: serde_json::Value,
    /// Enrichment slot the result is destined for
    pub slot: String,
}

/// Errors from generative client operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerateError {
    #[error("generator not configured: {0}")]
    NotConfigured(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("malformed endpoint response: {0}")]
    Malformed(String),
}

/// Client trait for requesting generated text.
///
/// Abstracts over transport (HTTP, mock) so enrichment tasks don't
/// depend on how the capability is reached.
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    /// Request a completion. Returns the raw response text.
    async fn complete(&self, request: &GenerateRequest) -> Result<String, GenerateError>;
}

/// Mock generator for testing — returns preconfigured responses and
/// counts every call per slot.
pub struct MockGenerator {
    responses: HashMap<String, Result<String, GenerateError>>,
    calls: AtomicUsize,
    calls_per_slot: Mutex<HashMap<String, usize>>,
    latency: Option<Duration>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            calls: AtomicUsize::new(0),
            calls_per_slot: Mutex::new(HashMap::new()),
            latency: None,
        }
    }

    /// Register a canned response for a slot.
    pub fn with_response(mut self, slot: impl Into<String>, text: impl Into<String>) -> Self {
        self.responses.insert(slot.into(), Ok(text.into()));
        self
    }

    /// Register a failure for a slot.
    pub fn with_failure(mut self, slot: impl Into<String>, error: GenerateError) -> Self {
        self.responses.insert(slot.into(), Err(error));
        self
    }

    /// Delay every call, widening race windows in concurrency tests.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Total calls made against this mock.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls made for one slot.
    pub fn calls_for(&self, slot: &str) -> usize {
        self.calls_per_slot
            .lock()
            .unwrap()
            .get(slot)
            .copied()
            .unwrap_or(0)
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerativeClient for MockGenerator {
    async fn complete(&self, request: &GenerateRequest) -> Result<String, GenerateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .calls_per_slot
            .lock()
            .unwrap()
            .entry(request.slot.clone())
            .or_insert(0) += 1;

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        match self.responses.get(&request.slot) {
            Some(Ok(text)) => Ok(text.clone()),
            Some(Err(error)) => Err(error.clone()),
            None => Err(GenerateError::NotConfigured(format!(
                "no canned response for slot '{}'",
                request.slot
            ))),
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    instruction: &'a str,
    payload: &'a serde_json::Value,
    slot: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    text: Option<String>,
    /// Some deployments name the field differently
    #[serde(default)]
    output: Option<String>,
}

/// HTTP generator: JSON POST against a completion endpoint.
pub struct HttpGenerator {
    http: reqwest::Client,
    endpoint: String,
    token: Option<String>,
    timeout: Duration,
}

impl HttpGenerator {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            token: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Read endpoint and token from the environment.
    pub fn from_env() -> Result<Self, GenerateError> {
        let endpoint = std::env::var(ENDPOINT_ENV)
            .map_err(|_| GenerateError::NotConfigured(format!("{ENDPOINT_ENV} not set")))?;
        let mut generator = Self::new(endpoint);
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.is_empty() {
                generator = generator.with_token(token);
            }
        }
        Ok(generator)
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl GenerativeClient for HttpGenerator {
    async fn complete(&self, request: &GenerateRequest) -> Result<String, GenerateError> {
        let body = CompletionRequest {
            instruction: &request.instruction,
            payload: &request.payload,
            slot: &request.slot,
        };

        let mut call = self
            .http
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&body);
        if let Some(token) = &self.token {
            call = call.bearer_auth(token);
        }

        let response = call.send().await.map_err(|e| {
            if e.is_timeout() {
                GenerateError::Transport(format!("generation timed out after {:?}", self.timeout))
            } else {
                GenerateError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerateError::Transport(format!(
                "endpoint returned {}: {}",
                status,
                clip(&body, 200)
            )));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| GenerateError::Malformed(e.to_string()))?;

        parsed
            .text
            .or(parsed.output)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                GenerateError::Malformed("response carried no text field".to_string())
            })
    }
}

/// Bound a raw text snippet for error messages and diagnostics.
pub(crate) fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}...")
    }
}
