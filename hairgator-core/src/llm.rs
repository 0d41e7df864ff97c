//! Vendor LLM clients for HairGator
//!
//! Provides two trait seams with HTTP implementations:
//! - **VisionBackend** — hair photo analysis
//!   - `AnthropicVisionClient` downloads the image, re-encodes it as a bounded
//!     JPEG and sends it base64-encoded
//!   - `OpenAiVisionClient` passes the image URL straight through
//! - **CompletionBackend** — text generation via OpenAI chat completions,
//!   with one-time model auto-selection

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::GenericImageView;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use crate::config::HairgatorConfig;
use crate::prompts::vision_prompt;

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Used whenever model listing fails or nothing preferred is available.
pub const FALLBACK_MODEL: &str = "gpt-3.5-turbo";

const IMAGE_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

pub const IMAGE_JPEG_QUALITY: u8 = 85;

// ============================================================================
// Traits
// ============================================================================

/// Image-understanding provider.
#[async_trait]
pub trait VisionBackend: Send + Sync {
    /// Analyze the image at `image_url`, embedding `user_query` in the observation prompt.
    async fn analyze(&self, image_url: &str, user_query: &str) -> Result<String, LlmError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Text-completion provider.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;

    fn name(&self) -> &str;
}

// ============================================================================
// Error and config types
// ============================================================================

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Missing API key")]
    MissingApiKey,

    #[error("Response contained no text content")]
    MissingContent,

    #[error("Image fetch failed: {0}")]
    ImageFetch(String),

    #[error("Image exceeds {limit} bytes")]
    ImageTooLarge { limit: usize },

    #[error("Image decode failed: {0}")]
    ImageDecode(#[from] image::ImageError),
}

/// Settings shared by every vendor client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: String,
    /// Empty for the completion client means "auto-select".
    pub model: String,
    pub preferred_models: Vec<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub max_image_bytes: usize,
    pub max_image_dimension: u32,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            preferred_models: Vec::new(),
            max_tokens: 2500,
            temperature: 0.1,
            timeout_secs: 60,
            max_retries: 0,
            retry_delay_ms: 1000,
            max_image_bytes: 10 * 1024 * 1024,
            max_image_dimension: 1024,
        }
    }

    pub fn for_vision(config: &HairgatorConfig) -> Self {
        Self {
            max_tokens: config.vision.max_tokens,
            temperature: config.vision.temperature,
            timeout_secs: config.vision.timeout_seconds,
            max_retries: config.vision.max_retries,
            max_image_bytes: config.vision.max_image_bytes,
            max_image_dimension: config.vision.max_image_dimension,
            ..Self::new(config.vision_api_key(), config.vision.model.clone())
        }
    }

    pub fn for_completion(config: &HairgatorConfig) -> Self {
        Self {
            preferred_models: config.completion.preferred_models.clone(),
            temperature: config.completion.temperature,
            timeout_secs: config.completion.timeout_seconds,
            max_retries: config.completion.max_retries,
            ..Self::new(config.openai_api_key(), config.completion.model.clone())
        }
    }
}

/// One system + user exchange sent to the completion model.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub top_p: f32,
    /// `None` lets the client size the budget for the selected model.
    pub max_tokens: Option<u32>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
}

/// Output budget by model family.
pub fn max_tokens_for(model: &str) -> u32 {
    if model.contains("gpt-4") {
        4000
    } else if model.contains("16k") {
        3500
    } else {
        3000
    }
}

// ============================================================================
// Factories
// ============================================================================

/// Build the configured vision backend. A missing key disables image analysis.
pub fn create_vision_backend(
    config: &HairgatorConfig,
) -> Result<Option<Box<dyn VisionBackend>>, LlmError> {
    if config.vision.backend == "disabled" {
        return Ok(None);
    }

    let client_config = ClientConfig::for_vision(config);
    if client_config.api_key.is_empty() {
        tracing::warn!(
            backend = %config.vision.backend,
            "No API key for vision backend — image analysis disabled"
        );
        return Ok(None);
    }

    let backend: Box<dyn VisionBackend> = match config.vision.backend.as_str() {
        "openai" => {
            let base_url = config
                .vision
                .base_url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string());
            Box::new(OpenAiVisionClient::with_base_url(client_config, base_url)?)
        }
        _ => {
            let base_url = config
                .vision
                .base_url
                .clone()
                .unwrap_or_else(|| ANTHROPIC_BASE_URL.to_string());
            Box::new(AnthropicVisionClient::with_base_url(client_config, base_url)?)
        }
    };

    Ok(Some(backend))
}

/// Build the completion backend. A missing key means canned responses only.
pub fn create_completion_backend(
    config: &HairgatorConfig,
) -> Result<Option<Box<dyn CompletionBackend>>, LlmError> {
    let client_config = ClientConfig::for_completion(config);
    if client_config.api_key.is_empty() {
        tracing::warn!("OPENAI_API_KEY not set — responses will use built-in fallbacks");
        return Ok(None);
    }

    let base_url = config
        .completion
        .base_url
        .clone()
        .unwrap_or_else(|| OPENAI_BASE_URL.to_string());
    Ok(Some(Box::new(OpenAiCompletionClient::with_base_url(
        client_config,
        base_url,
    )?)))
}

// ============================================================================
// Shared helpers
// ============================================================================

fn build_http_client(timeout_secs: u64) -> Result<Client, LlmError> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

async fn with_retries<T, F, Fut>(
    max_retries: usize,
    retry_delay_ms: u64,
    action: F,
) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let retry_strategy = ExponentialBackoff::from_millis(retry_delay_ms)
        .max_delay(Duration::from_secs(10))
        .map(jitter)
        .take(max_retries);

    Retry::spawn(retry_strategy, action).await
}

#[derive(Debug, Deserialize)]
struct VendorErrorResponse {
    error: Option<VendorErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct VendorErrorDetail {
    message: String,
}

/// Turn a non-success response into `LlmError::Api`, reading the vendor envelope when present.
async fn api_error(response: reqwest::Response, vendor: &str) -> LlmError {
    let code = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<VendorErrorResponse>(&body)
        .ok()
        .and_then(|e| e.error)
        .map(|e| e.message)
        .unwrap_or(body);

    tracing::error!(vendor = vendor, code = code, message = %message, "LLM API error");
    LlmError::Api { code, message }
}

/// Normalised photo ready for a base64 payload.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub media_type: String,
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl ImagePayload {
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.data)
    }
}

/// Decode any supported format, shrink to fit a `max_dimension` square and
/// re-encode as RGB JPEG. Smaller photos keep their size.
pub fn normalize_image(data: &[u8], max_dimension: u32) -> Result<ImagePayload, LlmError> {
    let decoded = image::load_from_memory(data)?;
    let (width, height) = decoded.dimensions();
    let fitted = if width > max_dimension || height > max_dimension {
        decoded.thumbnail(max_dimension, max_dimension)
    } else {
        decoded
    };
    let rgb = fitted.to_rgb8();

    let mut jpeg = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, IMAGE_JPEG_QUALITY);
        encoder.encode_image(&rgb)?;
    }

    Ok(ImagePayload {
        media_type: "image/jpeg".to_string(),
        data: jpeg,
        width: rgb.width(),
        height: rgb.height(),
    })
}

// ============================================================================
// OpenAI wire structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: ChatContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ChatContent<'a> {
    Text(&'a str),
    Parts(Vec<ChatContentPart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ChatContentPart<'a> {
    ImageUrl { image_url: ImageUrl<'a> },
    Text { text: &'a str },
}

#[derive(Debug, Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

fn first_choice_text(response: ChatCompletionResponse) -> Result<String, LlmError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or(LlmError::MissingContent)
}

// ============================================================================
// Anthropic wire structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: Vec<AnthropicContent<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContent<'a> {
    Image { source: AnthropicImageSource<'a> },
    Text { text: &'a str },
}

#[derive(Debug, Serialize)]
struct AnthropicImageSource<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'a str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<MessagesContentBlock>,
}

#[derive(Debug, Deserialize)]
struct MessagesContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

// ============================================================================
// AnthropicVisionClient
// ============================================================================

/// Calls the Anthropic Messages API with a base64 image block.
#[derive(Debug, Clone)]
pub struct AnthropicVisionClient {
    client: Client,
    config: ClientConfig,
    base_url: String,
}

impl AnthropicVisionClient {
    pub fn new(config: ClientConfig) -> Result<Self, LlmError> {
        Self::with_base_url(config, ANTHROPIC_BASE_URL.to_string())
    }

    /// Create a client with a custom base URL (for testing / proxies)
    pub fn with_base_url(config: ClientConfig, base_url: String) -> Result<Self, LlmError> {
        if config.api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }

        let client = build_http_client(config.timeout_secs)?;

        Ok(Self {
            client,
            config,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Download the raw photo, refusing bodies over `max_image_bytes`.
    pub async fn fetch_image(&self, image_url: &str) -> Result<Vec<u8>, LlmError> {
        let mut response = self
            .client
            .get(image_url)
            .header(reqwest::header::USER_AGENT, IMAGE_USER_AGENT)
            .send()
            .await
            .map_err(|e| LlmError::ImageFetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::ImageFetch(format!(
                "HTTP {} from {}",
                status.as_u16(),
                image_url
            )));
        }

        let limit = self.config.max_image_bytes;
        if response.content_length().is_some_and(|len| len > limit as u64) {
            return Err(LlmError::ImageTooLarge { limit });
        }

        // Content-Length can be absent or wrong, so the cap is enforced per chunk too
        let mut data = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| LlmError::ImageFetch(e.to_string()))?
        {
            if data.len() + chunk.len() > limit {
                return Err(LlmError::ImageTooLarge { limit });
            }
            data.extend_from_slice(&chunk);
        }

        if data.is_empty() {
            return Err(LlmError::ImageFetch(format!("empty body from {}", image_url)));
        }

        tracing::debug!(bytes = data.len(), "Fetched image");
        Ok(data)
    }

    /// Download and normalise the photo into a JPEG payload.
    pub async fn prepare_image(&self, image_url: &str) -> Result<ImagePayload, LlmError> {
        let data = self.fetch_image(image_url).await?;
        let max_dimension = self.config.max_image_dimension;

        let image = tokio::task::spawn_blocking(move || normalize_image(&data, max_dimension))
            .await
            .map_err(|e| LlmError::ImageFetch(format!("spawn_blocking join error: {e}")))??;

        tracing::debug!(
            width = image.width,
            height = image.height,
            bytes = image.data.len(),
            "Prepared image payload"
        );
        Ok(image)
    }

    async fn analyze_once(&self, image: &ImagePayload, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/v1/messages", self.base_url);

        let request = MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            messages: vec![AnthropicMessage {
                role: "user",
                content: vec![
                    AnthropicContent::Image {
                        source: AnthropicImageSource {
                            kind: "base64",
                            media_type: &image.media_type,
                            data: image.to_base64(),
                        },
                    },
                    AnthropicContent::Text { text: prompt },
                ],
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response, "anthropic").await);
        }

        let body: MessagesResponse = response.json().await?;
        body.content
            .into_iter()
            .find(|b| b.kind == "text")
            .and_then(|b| b.text)
            .ok_or(LlmError::MissingContent)
    }
}

#[async_trait]
impl VisionBackend for AnthropicVisionClient {
    async fn analyze(&self, image_url: &str, user_query: &str) -> Result<String, LlmError> {
        let image = self.prepare_image(image_url).await?;
        let prompt = vision_prompt(user_query);
        with_retries(self.config.max_retries, self.config.retry_delay_ms, || {
            self.analyze_once(&image, &prompt)
        })
        .await
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

// ============================================================================
// OpenAiVisionClient
// ============================================================================

/// Sends the image URL to an OpenAI vision-capable chat model.
#[derive(Debug, Clone)]
pub struct OpenAiVisionClient {
    client: Client,
    config: ClientConfig,
    base_url: String,
}

impl OpenAiVisionClient {
    pub fn new(config: ClientConfig) -> Result<Self, LlmError> {
        Self::with_base_url(config, OPENAI_BASE_URL.to_string())
    }

    pub fn with_base_url(config: ClientConfig, base_url: String) -> Result<Self, LlmError> {
        if config.api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }

        Ok(Self {
            client: build_http_client(config.timeout_secs)?,
            config,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn analyze_once(&self, image_url: &str, prompt: &str) -> Result<String, LlmError> {
        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: ChatContent::Parts(vec![
                    ChatContentPart::ImageUrl {
                        image_url: ImageUrl { url: image_url },
                    },
                    ChatContentPart::Text { text: prompt },
                ]),
            }],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response, "openai").await);
        }

        first_choice_text(response.json().await?)
    }
}

#[async_trait]
impl VisionBackend for OpenAiVisionClient {
    async fn analyze(&self, image_url: &str, user_query: &str) -> Result<String, LlmError> {
        let prompt = vision_prompt(user_query);
        with_retries(self.config.max_retries, self.config.retry_delay_ms, || {
            self.analyze_once(image_url, &prompt)
        })
        .await
    }

    fn name(&self) -> &str {
        "openai-vision"
    }
}

// ============================================================================
// OpenAiCompletionClient
// ============================================================================

/// OpenAI chat completions client.
///
/// When no model is configured, the first call lists the account's models and
/// caches the first preferred one that is available.
#[derive(Debug)]
pub struct OpenAiCompletionClient {
    client: Client,
    config: ClientConfig,
    base_url: String,
    selected_model: OnceCell<String>,
}

impl OpenAiCompletionClient {
    pub fn new(config: ClientConfig) -> Result<Self, LlmError> {
        Self::with_base_url(config, OPENAI_BASE_URL.to_string())
    }

    pub fn with_base_url(config: ClientConfig, base_url: String) -> Result<Self, LlmError> {
        if config.api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }

        Ok(Self {
            client: build_http_client(config.timeout_secs)?,
            config,
            base_url: base_url.trim_end_matches('/').to_string(),
            selected_model: OnceCell::new(),
        })
    }

    /// The model used for completions, resolving it on first use.
    pub async fn model(&self) -> &str {
        if !self.config.model.is_empty() {
            return &self.config.model;
        }
        self.selected_model
            .get_or_init(|| self.select_model())
            .await
            .as_str()
    }

    async fn select_model(&self) -> String {
        match self.list_models().await {
            Ok(available) => {
                let chosen = self
                    .config
                    .preferred_models
                    .iter()
                    .find(|m| available.iter().any(|a| a == *m))
                    .cloned();
                match chosen {
                    Some(model) => {
                        tracing::info!(model = %model, "Selected OpenAI model");
                        model
                    }
                    None => {
                        tracing::warn!(
                            fallback = FALLBACK_MODEL,
                            "No preferred model available"
                        );
                        FALLBACK_MODEL.to_string()
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, fallback = FALLBACK_MODEL, "Model listing failed");
                FALLBACK_MODEL.to_string()
            }
        }
    }

    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response, "openai").await);
        }

        let list: ModelList = response.json().await?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }

    async fn complete_once(
        &self,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<String, LlmError> {
        let body = ChatCompletionRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: ChatContent::Text(&request.system),
                },
                ChatMessage {
                    role: "user",
                    content: ChatContent::Text(&request.user),
                },
            ],
            max_tokens: request.max_tokens.unwrap_or_else(|| max_tokens_for(model)),
            temperature: request.temperature,
            top_p: Some(request.top_p),
            frequency_penalty: request.frequency_penalty,
            presence_penalty: request.presence_penalty,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response, "openai").await);
        }

        first_choice_text(response.json().await?)
    }
}

#[async_trait]
impl CompletionBackend for OpenAiCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let model = self.model().await.to_string();
        tracing::debug!(model = %model, "Requesting completion");
        with_retries(self.config.max_retries, self.config.retry_delay_ms, || {
            self.complete_once(&model, request)
        })
        .await
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat;
    use std::io::Cursor;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn encoded_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let pixels = image::RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(pixels)
            .write_to(&mut out, format)
            .unwrap();
        out.into_inner()
    }

    /// Decoded image block of the single Messages API call the server received.
    async fn sent_image(mock_server: &MockServer) -> (String, Vec<u8>) {
        let requests = mock_server.received_requests().await.unwrap();
        let call = requests
            .iter()
            .find(|r| r.url.path() == "/v1/messages")
            .expect("no Messages API call");
        let body: serde_json::Value = serde_json::from_slice(&call.body).unwrap();
        let source = &body["messages"][0]["content"][0]["source"];
        let data = BASE64.decode(source["data"].as_str().unwrap()).unwrap();
        (source["media_type"].as_str().unwrap().to_string(), data)
    }

    fn test_config(api_key: &str, model: &str) -> ClientConfig {
        ClientConfig {
            retry_delay_ms: 10,
            ..ClientConfig::new(api_key, model)
        }
    }

    fn completion_request() -> CompletionRequest {
        CompletionRequest {
            system: "system prompt".to_string(),
            user: "단발 레시피 알려줘".to_string(),
            temperature: 0.1,
            top_p: 0.9,
            max_tokens: None,
            frequency_penalty: None,
            presence_penalty: None,
        }
    }

    fn chat_response(text: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": text } }]
        })
    }

    #[tokio::test]
    async fn test_anthropic_sends_base64_image_and_returns_text() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/images/bob.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(encoded_image(64, 48, ImageFormat::Png)),
            )
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(body_partial_json(serde_json::json!({
                "model": "claude-test",
                "max_tokens": 2500,
                "messages": [{
                    "role": "user",
                    "content": [
                        { "type": "image", "source": {
                            "type": "base64",
                            "media_type": "image/jpeg"
                        }},
                        { "type": "text", "text": vision_prompt("analyze") }
                    ]
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{ "type": "text", "text": "Section: Horizontal" }]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = AnthropicVisionClient::with_base_url(
            test_config("test-key", "claude-test"),
            mock_server.uri(),
        )
        .unwrap();

        let image_url = format!("{}/images/bob.png", mock_server.uri());
        let result = client.analyze(&image_url, "analyze").await;

        assert_eq!(result.unwrap(), "Section: Horizontal");
        assert_eq!(client.name(), "anthropic");

        // small photos are re-encoded but keep their size
        let (_, data) = sent_image(&mock_server).await;
        assert_eq!(image::guess_format(&data).unwrap(), ImageFormat::Jpeg);
        assert_eq!(image::load_from_memory(&data).unwrap().dimensions(), (64, 48));
    }

    #[tokio::test]
    async fn test_anthropic_large_bmp_sent_as_bounded_jpeg() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/images/salon.bmp"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/bmp")
                    .set_body_bytes(encoded_image(1600, 1200, ImageFormat::Bmp)),
            )
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{ "type": "text", "text": "Cut Form: L" }]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = AnthropicVisionClient::with_base_url(
            test_config("test-key", "claude-test"),
            mock_server.uri(),
        )
        .unwrap();

        let image_url = format!("{}/images/salon.bmp", mock_server.uri());
        assert_eq!(client.analyze(&image_url, "analyze").await.unwrap(), "Cut Form: L");

        let (media_type, data) = sent_image(&mock_server).await;
        assert_eq!(media_type, "image/jpeg");
        assert_eq!(image::guess_format(&data).unwrap(), ImageFormat::Jpeg);
        assert_eq!(image::load_from_memory(&data).unwrap().dimensions(), (1024, 768));
        assert!(data.len() < 1600 * 1200 * 3 / 4);
    }

    #[tokio::test]
    async fn test_anthropic_rejects_image_over_byte_cap() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4096]))
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let mut config = test_config("test-key", "claude-test");
        config.max_image_bytes = 1024;
        let client = AnthropicVisionClient::with_base_url(config, mock_server.uri()).unwrap();

        let result = client
            .analyze(&format!("{}/huge.jpg", mock_server.uri()), "analyze")
            .await;
        assert!(matches!(result, Err(LlmError::ImageTooLarge { limit: 1024 })));
    }

    #[tokio::test]
    async fn test_anthropic_undecodable_image_is_decode_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/heic")
                    .set_body_bytes(b"definitely not pixels".to_vec()),
            )
            .mount(&mock_server)
            .await;

        let client = AnthropicVisionClient::with_base_url(
            test_config("test-key", "claude-test"),
            mock_server.uri(),
        )
        .unwrap();

        let result = client
            .analyze(&format!("{}/photo.heic", mock_server.uri()), "analyze")
            .await;
        assert!(matches!(result, Err(LlmError::ImageDecode(_))));
    }

    #[tokio::test]
    async fn test_anthropic_image_404_is_fetch_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let client = AnthropicVisionClient::with_base_url(
            test_config("test-key", "claude-test"),
            mock_server.uri(),
        )
        .unwrap();

        let result = client
            .analyze(&format!("{}/missing.jpg", mock_server.uri()), "analyze")
            .await;

        match result {
            Err(LlmError::ImageFetch(msg)) => assert!(msg.contains("404")),
            other => panic!("Expected ImageFetch error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_anthropic_api_error_envelope_is_parsed() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(encoded_image(8, 8, ImageFormat::Png)))
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(529).set_body_json(serde_json::json!({
                "type": "error",
                "error": { "type": "overloaded_error", "message": "Overloaded" }
            })))
            .mount(&mock_server)
            .await;

        let client = AnthropicVisionClient::with_base_url(
            test_config("test-key", "claude-test"),
            mock_server.uri(),
        )
        .unwrap();

        let result = client
            .analyze(&format!("{}/x.png", mock_server.uri()), "analyze")
            .await;

        match result {
            Err(LlmError::Api { code, message }) => {
                assert_eq!(code, 529);
                assert_eq!(message, "Overloaded");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_openai_vision_passes_image_url() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o",
                "messages": [{
                    "role": "user",
                    "content": [
                        { "type": "image_url", "image_url": { "url": "https://img.example/bob.jpg" } },
                        { "type": "text", "text": vision_prompt("analyze") }
                    ]
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("Cut Form: L")))
            .mount(&mock_server)
            .await;

        let client =
            OpenAiVisionClient::with_base_url(test_config("test-key", "gpt-4o"), mock_server.uri())
                .unwrap();

        let result = client.analyze("https://img.example/bob.jpg", "analyze").await;
        assert_eq!(result.unwrap(), "Cut Form: L");
    }

    #[tokio::test]
    async fn test_completion_with_configured_model() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-3.5-turbo",
                "max_tokens": 3000,
                "messages": [
                    { "role": "system", "content": "system prompt" },
                    { "role": "user", "content": "단발 레시피 알려줘" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("  recipe  ")))
            .mount(&mock_server)
            .await;

        let client = OpenAiCompletionClient::with_base_url(
            test_config("test-key", "gpt-3.5-turbo"),
            mock_server.uri(),
        )
        .unwrap();

        let result = client.complete(&completion_request()).await;
        assert_eq!(result.unwrap(), "recipe");
    }

    #[tokio::test]
    async fn test_completion_selects_preferred_model_once() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{ "id": "gpt-3.5-turbo" }, { "id": "gpt-4" }]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4",
                "max_tokens": 4000
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("ok")))
            .expect(2)
            .mount(&mock_server)
            .await;

        let mut config = test_config("test-key", "");
        config.preferred_models = vec![
            "gpt-4-turbo".to_string(),
            "gpt-4".to_string(),
            "gpt-3.5-turbo".to_string(),
        ];
        let client = OpenAiCompletionClient::with_base_url(config, mock_server.uri()).unwrap();

        client.complete(&completion_request()).await.unwrap();
        client.complete(&completion_request()).await.unwrap();
        assert_eq!(client.model().await, "gpt-4");
    }

    #[tokio::test]
    async fn test_model_listing_failure_falls_back() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let client =
            OpenAiCompletionClient::with_base_url(test_config("test-key", ""), mock_server.uri())
                .unwrap();

        assert_eq!(client.model().await, FALLBACK_MODEL);
    }

    #[tokio::test]
    async fn test_completion_api_error_returns_code_and_message() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": { "message": "Incorrect API key provided", "type": "invalid_request_error" }
            })))
            .mount(&mock_server)
            .await;

        let client = OpenAiCompletionClient::with_base_url(
            test_config("test-key", "gpt-4"),
            mock_server.uri(),
        )
        .unwrap();

        match client.complete(&completion_request()).await {
            Err(LlmError::Api { code, message }) => {
                assert_eq!(code, 401);
                assert_eq!(message, "Incorrect API key provided");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_completion_retries_then_succeeds() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": { "message": "Rate limit exceeded" }
            })))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("after retry")))
            .mount(&mock_server)
            .await;

        let mut config = test_config("test-key", "gpt-4");
        config.max_retries = 2;
        let client = OpenAiCompletionClient::with_base_url(config, mock_server.uri()).unwrap();

        assert_eq!(client.complete(&completion_request()).await.unwrap(), "after retry");
    }

    #[tokio::test]
    async fn test_empty_choice_is_missing_content() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": []
            })))
            .mount(&mock_server)
            .await;

        let client = OpenAiCompletionClient::with_base_url(
            test_config("test-key", "gpt-4"),
            mock_server.uri(),
        )
        .unwrap();

        assert!(matches!(
            client.complete(&completion_request()).await,
            Err(LlmError::MissingContent)
        ));
    }

    #[test]
    fn test_clients_reject_missing_api_key() {
        assert!(matches!(
            AnthropicVisionClient::new(test_config("", "claude")),
            Err(LlmError::MissingApiKey)
        ));
        assert!(matches!(
            OpenAiVisionClient::new(test_config("", "gpt-4o")),
            Err(LlmError::MissingApiKey)
        ));
        assert!(matches!(
            OpenAiCompletionClient::new(test_config("", "")),
            Err(LlmError::MissingApiKey)
        ));
    }

    #[test]
    fn test_max_tokens_for_model_family() {
        assert_eq!(max_tokens_for("gpt-4-turbo"), 4000);
        assert_eq!(max_tokens_for("gpt-3.5-turbo-16k"), 3500);
        assert_eq!(max_tokens_for("gpt-3.5-turbo"), 3000);
    }

    #[test]
    fn test_normalize_image_fits_longest_side() {
        let tall = encoded_image(300, 2400, ImageFormat::Png);
        let payload = normalize_image(&tall, 1024).unwrap();
        assert_eq!(payload.media_type, "image/jpeg");
        assert_eq!(payload.height, 1024);
        assert_eq!(payload.width, 128);

        let bmp = encoded_image(40, 30, ImageFormat::Bmp);
        let payload = normalize_image(&bmp, 1024).unwrap();
        assert_eq!((payload.width, payload.height), (40, 30));
        assert_eq!(image::guess_format(&payload.data).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_disabled_vision_backend_is_none() {
        let mut config = HairgatorConfig::default();
        config.vision.backend = "disabled".to_string();
        assert!(create_vision_backend(&config).unwrap().is_none());
    }

    #[test]
    fn test_completion_backend_from_config_key() {
        let mut config = HairgatorConfig::default();
        config.completion.api_key = Some("sk-test".to_string());
        let backend = create_completion_backend(&config).unwrap();
        assert_eq!(backend.unwrap().name(), "openai");
    }
}
