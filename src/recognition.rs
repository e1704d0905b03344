use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::entity::extraction::parse_recognition_response;
use crate::entity::ExtractedEntities;
use crate::environment::Settings;
use crate::TARGET_RECOGNITION;

/// Seconds to wait before the first retry; doubled after every failure
const INITIAL_BACKOFF_SECS: u64 = 2;

/// A scanned document ready to be sent for recognition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub file_name: String,
    pub content: Vec<u8>,
    pub mime_type: String,
}

impl Document {
    pub fn new(file_name: &str, content: Vec<u8>) -> Self {
        Document {
            file_name: file_name.to_string(),
            mime_type: mime_type_for(file_name).to_string(),
            content,
        }
    }

    /// Read a document from disk, enforcing the allowed extensions and the
    /// maximum file size.
    pub async fn load(path: &Path, settings: &Settings) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("Invalid document path: {}", path.display()))?;

        if !settings.is_allowed_extension(file_name) {
            return Err(anyhow!(
                "File type not allowed for {}; expected one of: {}",
                file_name,
                settings.allowed_extensions.join(", ")
            ));
        }

        let metadata = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        if metadata.len() > settings.max_file_size {
            return Err(anyhow!(
                "{} is {} bytes, larger than the {} byte limit",
                file_name,
                metadata.len(),
                settings.max_file_size
            ));
        }

        let content = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        Ok(Document::new(file_name, content))
    }
}

fn mime_type_for(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}

/// Turns a document into typed entities. Implemented over HTTP in production
/// and by stubs in tests.
#[async_trait]
pub trait RecognitionService: Send + Sync {
    async fn extract_entities(&self, document: &Document) -> Result<ExtractedEntities>;
}

/// Client for an external document recognition endpoint
#[derive(Debug, Clone)]
pub struct HttpRecognitionClient {
    client: reqwest::Client,
    endpoint: String,
    api_token: Option<String>,
    timeout: Duration,
    max_retries: u32,
}

impl HttpRecognitionClient {
    pub fn new(endpoint: &str) -> Self {
        HttpRecognitionClient {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            api_token: None,
            timeout: Duration::from_secs(crate::environment::DEFAULT_TIMEOUT_SECS),
            max_retries: crate::environment::DEFAULT_MAX_RETRIES,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let endpoint = settings
            .recognition_endpoint
            .as_deref()
            .ok_or_else(|| anyhow!("RECOGNITION_ENDPOINT must be set to process documents"))?;

        Ok(Self::new(endpoint)
            .with_api_token(settings.recognition_api_token.clone())
            .with_timeout(settings.recognition_timeout)
            .with_max_retries(settings.recognition_max_retries))
    }

    pub fn with_api_token(mut self, api_token: Option<String>) -> Self {
        self.api_token = api_token;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    async fn send(&self, body: &Value) -> Result<Value> {
        let mut request = self.client.post(&self.endpoint).json(body);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .context("Recognition request failed")?
            .error_for_status()
            .context("Recognition service returned an error status")?;

        response
            .json::<Value>()
            .await
            .context("Recognition response was not valid JSON")
    }
}

fn request_body(document: &Document) -> Value {
    json!({
        "raw_document": {
            "content": BASE64.encode(&document.content),
            "mime_type": document.mime_type,
        }
    })
}

#[async_trait]
impl RecognitionService for HttpRecognitionClient {
    async fn extract_entities(&self, document: &Document) -> Result<ExtractedEntities> {
        let body = request_body(document);
        let attempts = self.max_retries.max(1);
        let mut backoff = INITIAL_BACKOFF_SECS;

        info!(
            target: TARGET_RECOGNITION,
            "Sending {} ({} bytes) for recognition", document.file_name, document.content.len()
        );

        for attempt in 0..attempts {
            match timeout(self.timeout, self.send(&body)).await {
                Ok(Ok(response)) => {
                    let entities = parse_recognition_response(&response)
                        .with_context(|| format!("Unusable recognition response for {}", document.file_name))?;
                    debug!(
                        target: TARGET_RECOGNITION,
                        "{}: {} entities", document.file_name, entities.len()
                    );
                    return Ok(entities);
                }
                Ok(Err(e)) => {
                    warn!(
                        target: TARGET_RECOGNITION,
                        "{}: recognition attempt {}/{} failed: {:#}", document.file_name, attempt + 1, attempts, e
                    );
                }
                Err(_) => {
                    warn!(
                        target: TARGET_RECOGNITION,
                        "{}: recognition attempt {}/{} timed out after {:?}",
                        document.file_name,
                        attempt + 1,
                        attempts,
                        self.timeout
                    );
                }
            }

            if attempt + 1 < attempts {
                debug!(
                    target: TARGET_RECOGNITION,
                    "Backing off for {} seconds before retry", backoff
                );
                sleep(Duration::from_secs(backoff)).await;
                backoff *= 2;
            }
        }

        error!(
            target: TARGET_RECOGNITION,
            "{}: recognition failed after {} attempts", document.file_name, attempts
        );
        Err(anyhow!(
            "Recognition failed for {} after {} attempts",
            document.file_name,
            attempts
        ))
    }
}
