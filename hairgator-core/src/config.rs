use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct HairgatorConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub styles: StylesConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    pub cors: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors: true,
        }
    }
}

/// Image-understanding provider settings.
///
/// `backend` is one of `anthropic`, `openai` or `disabled`.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VisionConfig {
    pub backend: String,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_seconds: u64,
    pub max_retries: usize,
    /// Downloaded photos larger than this are rejected before decoding.
    pub max_image_bytes: usize,
    /// Photos are shrunk to fit a square of this many pixels.
    pub max_image_dimension: u32,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            backend: "anthropic".to_string(),
            model: "claude-3-5-sonnet-20241022".to_string(),
            base_url: None,
            api_key: None,
            max_tokens: 2500,
            temperature: 0.1,
            timeout_seconds: 60,
            max_retries: 0,
            max_image_bytes: 10 * 1024 * 1024,
            max_image_dimension: 1024,
        }
    }
}

/// Text-completion provider settings.
///
/// An empty `model` means "pick the first available entry of `preferred_models`".
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CompletionConfig {
    pub model: String,
    pub preferred_models: Vec<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub follow_up_temperature: f32,
    pub top_p: f32,
    pub timeout_seconds: u64,
    pub max_retries: usize,
    pub translate_terms: bool,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            preferred_models: vec![
                "gpt-4-turbo".to_string(),
                "gpt-4".to_string(),
                "gpt-3.5-turbo-16k".to_string(),
                "gpt-3.5-turbo".to_string(),
            ],
            base_url: None,
            api_key: None,
            temperature: 0.1,
            follow_up_temperature: 0.3,
            top_p: 0.9,
            timeout_seconds: 120,
            max_retries: 0,
            translate_terms: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StylesConfig {
    pub path: String,
    pub search_limit: usize,
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            path: "data/styles.json".to_string(),
            search_limit: 3,
        }
    }
}

/// Conversation log settings. Without `database_url` history lives in process memory.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ConversationConfig {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub ttl_seconds: i64,
    pub history_limit: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 5,
            ttl_seconds: 86400 * 7,
            history_limit: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChatConfig {
    pub use_rag_default: bool,
    pub redirect_non_hair: bool,
    pub max_message_chars: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            use_rag_default: true,
            redirect_non_hair: false,
            max_message_chars: 2000,
        }
    }
}

impl HairgatorConfig {
    /// Load from a TOML file, then overlay `HAIRGATOR__SECTION__KEY` env vars.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("HAIRGATOR").separator("__"))
            .build()?;
        let mut config: Self = s.try_deserialize()?;
        config.apply_port_override();
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()?;
        s.try_deserialize()
    }

    /// Hosting platforms hand the listen port over in `PORT`.
    fn apply_port_override(&mut self) {
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            self.http.port = port;
        }
    }

    pub fn openai_api_key(&self) -> String {
        self.completion
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_default()
    }

    /// Key for the configured vision backend.
    pub fn vision_api_key(&self) -> String {
        let env_name = match self.vision.backend.as_str() {
            "openai" => "OPENAI_API_KEY",
            _ => "ANTHROPIC_API_KEY",
        };
        self.vision
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(env_name).ok())
            .unwrap_or_default()
    }
}
