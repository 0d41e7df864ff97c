pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod llm;
pub mod models;
pub mod postprocess;
pub mod prompts;

pub use config::HairgatorConfig;
pub use error::HairgatorError;
pub use llm::{
    create_completion_backend, create_vision_backend, AnthropicVisionClient, ClientConfig,
    CompletionBackend, CompletionRequest, LlmError, OpenAiCompletionClient, OpenAiVisionClient,
    VisionBackend,
};
pub use models::{ConversationKey, ConversationMessage, Role, StyleRecord};
