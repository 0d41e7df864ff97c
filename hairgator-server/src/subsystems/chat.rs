//! Chat subsystem — one designer turn end to end
//!
//! validate → store user turn → image analysis → style lookup → history →
//! generate (recipe or follow-up) → post-process → store assistant turn.
//!
//! Vendor failures never escape: they degrade to canned text. Only input
//! validation produces an error for the caller.

use chrono::{DateTime, Utc};
use hairgator_core::context::{
    is_follow_up_question, is_professional_hair_question, is_valid_image_url,
    normalize_image_url, previous_assistant_message,
};
use hairgator_core::postprocess::{clean_response, translate_terms};
use hairgator_core::prompts::{self, PARAMETER_COUNT};
use hairgator_core::{CompletionRequest, ConversationKey, ConversationMessage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::HttpState;
use crate::subsystems::styles::format_rag_context;

pub const MESSAGE_TYPE_ANALYSIS: &str = "professional_56_parameter_analysis";
pub const MESSAGE_TYPE_REDIRECT: &str = "redirect";
pub const ANALYSIS_VERSION: &str = concat!("professional-", env!("CARGO_PKG_VERSION"));

const MAX_USER_ID_CHARS: usize = 100;
const IMAGE_ONLY_MESSAGE: &str = "이미지 헤어스타일 분석해줘";
const EMPTY_REQUEST_MESSAGE: &str = "헤어스타일 분석 요청";
const FOLLOW_UP_MAX_TOKENS: u32 = 1500;
const SAMPLING_PENALTY: f32 = 0.1;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub use_rag: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub conversation_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub message_type: String,
    pub additional_data: serde_json::Value,
}

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("{0}")]
    Validation(String),
}

/// Outcome of the optional image step.
#[derive(Debug, Default)]
struct ImageAnalysis {
    text: Option<String>,
    usable: bool,
}

/// Collapse whitespace runs to single spaces and trim.
fn normalize_message(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

struct ValidatedRequest {
    user_id: String,
    message: String,
    had_text: bool,
    image_url: Option<String>,
}

fn validate(request: &ChatRequest, max_message_chars: usize) -> Result<ValidatedRequest, ChatError> {
    let user_id = request.user_id.trim().to_string();
    let user_id_chars = user_id.chars().count();
    if user_id_chars == 0 || user_id_chars > MAX_USER_ID_CHARS {
        return Err(ChatError::Validation(format!(
            "user_id must be 1 to {} characters",
            MAX_USER_ID_CHARS
        )));
    }

    let message = request
        .message
        .as_deref()
        .map(normalize_message)
        .unwrap_or_default();
    if message.chars().count() > max_message_chars {
        return Err(ChatError::Validation(format!(
            "message must be at most {} characters",
            max_message_chars
        )));
    }

    let image_url = normalize_image_url(request.image_url.clone());
    let had_text = !message.is_empty();
    let message = match (had_text, image_url.is_some()) {
        (true, _) => message,
        (false, true) => IMAGE_ONLY_MESSAGE.to_string(),
        (false, false) => EMPTY_REQUEST_MESSAGE.to_string(),
    };

    Ok(ValidatedRequest {
        user_id,
        message,
        had_text,
        image_url,
    })
}

/// Run one chat turn.
pub async fn process_chat(state: &HttpState, request: ChatRequest) -> Result<ChatResponse, ChatError> {
    let validated = validate(&request, state.config.chat.max_message_chars)?;
    let ValidatedRequest {
        user_id,
        message,
        had_text,
        image_url,
    } = validated;

    let conversation_id = request
        .conversation_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| state.conversations.create_conversation());
    let key = ConversationKey::new(&user_id, &conversation_id);

    tracing::info!(
        user_id = %user_id,
        conversation_id = %conversation_id,
        has_image = image_url.is_some(),
        "Chat turn"
    );

    let user_content = match &image_url {
        Some(url) => format!("{} [이미지: {}]", message, url),
        None => message.clone(),
    };

    if state.config.chat.redirect_non_hair
        && image_url.is_none()
        && !is_professional_hair_question(&message)
    {
        tracing::info!(conversation_id = %conversation_id, "Non-hair question redirected");
        let reply = prompts::redirect_response(&message);
        state
            .conversations
            .add_message(&key, ConversationMessage::user(user_content))
            .await;
        let assistant = ConversationMessage::assistant(reply);
        state.conversations.add_message(&key, assistant.clone()).await;

        return Ok(ChatResponse {
            conversation_id,
            message: assistant.content,
            timestamp: assistant.timestamp,
            message_type: MESSAGE_TYPE_REDIRECT.to_string(),
            additional_data: serde_json::json!({
                "professional_analysis": false,
                "redirect": true,
            }),
        });
    }

    state
        .conversations
        .add_message(&key, ConversationMessage::user(user_content))
        .await;

    let analysis = analyze_image(state, image_url.as_deref(), &message).await;

    let use_rag = request.use_rag.unwrap_or(state.config.chat.use_rag_default);
    let (rag_context, rag_styles) = if use_rag {
        let matches = state.styles.search(&message, state.config.styles.search_limit);
        let records: Vec<_> = matches.into_iter().map(|m| m.record).collect();
        let ids: Vec<String> = records.iter().map(|r| r.model_no.clone()).collect();
        let context = (!records.is_empty()).then(|| format_rag_context(&records));
        (context, ids)
    } else {
        (None, Vec::new())
    };

    let history = state
        .conversations
        .history(&key, state.config.conversation.history_limit)
        .await;
    let follow_up = is_follow_up_question(&history, &message);

    let usable_analysis = analysis.text.as_deref().filter(|_| analysis.usable);
    let reply = if follow_up {
        let previous = previous_assistant_message(&history)
            .map(|m| m.content.as_str())
            .unwrap_or("");
        generate_follow_up(state, previous, &message).await
    } else {
        generate_professional(state, usable_analysis, &message, rag_context.as_deref()).await
    };

    let assistant = ConversationMessage::assistant(reply);
    state.conversations.add_message(&key, assistant.clone()).await;

    tracing::info!(
        conversation_id = %conversation_id,
        follow_up = follow_up,
        rag_styles = rag_styles.len(),
        chars = assistant.content.chars().count(),
        "Chat turn complete"
    );

    Ok(ChatResponse {
        conversation_id,
        message: assistant.content,
        timestamp: assistant.timestamp,
        message_type: MESSAGE_TYPE_ANALYSIS.to_string(),
        additional_data: serde_json::json!({
            "professional_analysis": true,
            "follow_up": follow_up,
            "image_analysis_used": analysis.usable,
            "rag_context_used": rag_context.is_some(),
            "rag_styles": rag_styles,
            "image_processed": image_url.is_some(),
            "image_only_input": image_url.is_some() && !had_text,
            "parameter_count": PARAMETER_COUNT,
            "analysis_version": ANALYSIS_VERSION,
            "target_audience": "hair_professionals",
        }),
    })
}

async fn analyze_image(state: &HttpState, image_url: Option<&str>, message: &str) -> ImageAnalysis {
    let Some(url) = image_url else {
        return ImageAnalysis::default();
    };
    if !is_valid_image_url(url) {
        tracing::warn!(image_url = url, "Ignoring invalid image URL");
        return ImageAnalysis::default();
    }
    let Some(vision) = state.vision.as_deref() else {
        tracing::debug!("No vision backend configured, skipping image analysis");
        return ImageAnalysis::default();
    };

    match vision.analyze(url, message).await {
        Ok(text) => {
            tracing::info!(backend = vision.name(), chars = text.chars().count(), "Image analyzed");
            ImageAnalysis {
                text: Some(text),
                usable: true,
            }
        }
        Err(e) => {
            tracing::warn!(backend = vision.name(), error = %e, "Image analysis failed");
            ImageAnalysis {
                text: Some(format!("이미지 처리 오류: {}", e)),
                usable: false,
            }
        }
    }
}

fn finish(state: &HttpState, raw: &str) -> String {
    let cleaned = clean_response(raw);
    if state.config.completion.translate_terms {
        translate_terms(&cleaned)
    } else {
        cleaned
    }
}

async fn generate_professional(
    state: &HttpState,
    image_analysis: Option<&str>,
    message: &str,
    rag_context: Option<&str>,
) -> String {
    let Some(completion) = state.completion.as_deref() else {
        return prompts::fallback_professional_response(message);
    };

    let request = CompletionRequest {
        system: prompts::professional_system_prompt(image_analysis, message, rag_context),
        user: prompts::professional_user_prompt(message),
        temperature: state.config.completion.temperature,
        top_p: state.config.completion.top_p,
        max_tokens: None,
        frequency_penalty: Some(SAMPLING_PENALTY),
        presence_penalty: Some(SAMPLING_PENALTY),
    };

    match completion.complete(&request).await {
        Ok(text) => finish(state, &text),
        Err(e) => {
            tracing::error!(backend = completion.name(), error = %e, "Recipe generation failed");
            prompts::fallback_professional_response(message)
        }
    }
}

async fn generate_follow_up(state: &HttpState, previous_answer: &str, message: &str) -> String {
    let Some(completion) = state.completion.as_deref() else {
        return prompts::fallback_follow_up_response(message);
    };

    let request = CompletionRequest {
        system: prompts::follow_up_system_prompt(previous_answer, message),
        user: prompts::follow_up_user_prompt(message),
        temperature: state.config.completion.follow_up_temperature,
        top_p: state.config.completion.top_p,
        max_tokens: Some(FOLLOW_UP_MAX_TOKENS),
        frequency_penalty: None,
        presence_penalty: None,
    };

    match completion.complete(&request).await {
        Ok(text) => finish(state, &text),
        Err(e) => {
            tracing::error!(backend = completion.name(), error = %e, "Follow-up generation failed");
            prompts::fallback_follow_up_response(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystems::conversation::ConversationManager;
    use crate::subsystems::styles::StyleTable;
    use async_trait::async_trait;
    use hairgator_core::llm::LlmError;
    use hairgator_core::{CompletionBackend, HairgatorConfig, VisionBackend};
    use std::sync::{Arc, Mutex};

    /// Records every request and answers with a fixed text.
    struct ScriptedCompletion {
        reply: Result<String, u16>,
        seen: Arc<Mutex<Vec<CompletionRequest>>>,
    }

    #[async_trait]
    impl CompletionBackend for ScriptedCompletion {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
            self.seen.lock().unwrap().push(request.clone());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(code) => Err(LlmError::Api {
                    code: *code,
                    message: "scripted failure".to_string(),
                }),
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct ScriptedVision {
        reply: Result<String, String>,
    }

    #[async_trait]
    impl VisionBackend for ScriptedVision {
        async fn analyze(&self, _image_url: &str, _user_query: &str) -> Result<String, LlmError> {
            self.reply.clone().map_err(LlmError::ImageFetch)
        }

        fn name(&self) -> &str {
            "scripted-vision"
        }
    }

    fn state_with(
        completion: Option<Box<dyn CompletionBackend>>,
        vision: Option<Box<dyn VisionBackend>>,
    ) -> HttpState {
        let mut config = HairgatorConfig::default();
        config.completion.translate_terms = false;
        HttpState {
            config,
            styles: StyleTable::with_defaults(),
            conversations: ConversationManager::in_memory(),
            vision,
            completion,
        }
    }

    fn scripted(reply: Result<String, u16>) -> (Box<dyn CompletionBackend>, Arc<Mutex<Vec<CompletionRequest>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        (
            Box::new(ScriptedCompletion {
                reply,
                seen: seen.clone(),
            }),
            seen,
        )
    }

    fn request(message: &str) -> ChatRequest {
        ChatRequest {
            user_id: "designer-1".to_string(),
            message: Some(message.to_string()),
            ..Default::default()
        }
    }

    fn recipe_reply() -> String {
        format!(
            "## 🎯 {}\n→ Section: Horizontal + 수평 섹션으로 깔끔한 단발 라인 구현\n→ Elevation: 45° 유지",
            prompts::RECIPE_HEADER
        )
    }

    // ========================================================================
    // TEST 1: validation
    // ========================================================================
    #[tokio::test]
    async fn test_validation_errors() {
        let state = state_with(None, None);

        let blank = ChatRequest {
            user_id: "   ".to_string(),
            ..Default::default()
        };
        assert!(matches!(process_chat(&state, blank).await, Err(ChatError::Validation(_))));

        let long_id = ChatRequest {
            user_id: "u".repeat(101),
            ..Default::default()
        };
        assert!(matches!(process_chat(&state, long_id).await, Err(ChatError::Validation(_))));

        let long_message = request(&"가".repeat(2001));
        assert!(matches!(
            process_chat(&state, long_message).await,
            Err(ChatError::Validation(_))
        ));
    }

    #[test]
    fn test_message_defaults_and_normalization() {
        let v = validate(&request("  단발   레시피\n 알려줘 "), 2000).unwrap();
        assert_eq!(v.message, "단발 레시피 알려줘");
        assert!(v.had_text);

        let image_only = ChatRequest {
            user_id: "u".into(),
            image_url: Some("https://img.example/a.jpg".into()),
            ..Default::default()
        };
        let v = validate(&image_only, 2000).unwrap();
        assert_eq!(v.message, IMAGE_ONLY_MESSAGE);
        assert!(!v.had_text);

        let empty = ChatRequest {
            user_id: "u".into(),
            image_url: Some("string".into()),
            ..Default::default()
        };
        let v = validate(&empty, 2000).unwrap();
        assert_eq!(v.message, EMPTY_REQUEST_MESSAGE);
        assert!(v.image_url.is_none());
    }

    // ========================================================================
    // TEST 2: no completion backend → canned recipe, history stored
    // ========================================================================
    #[tokio::test]
    async fn test_without_backend_returns_fallback() {
        let state = state_with(None, None);
        let response = process_chat(&state, request("단발 레시피 알려줘")).await.unwrap();

        assert!(response.message.contains(prompts::RECIPE_HEADER));
        assert_eq!(response.message_type, MESSAGE_TYPE_ANALYSIS);
        assert_eq!(response.additional_data["parameter_count"], 56);
        assert_eq!(response.additional_data["rag_context_used"], true);
        let rag_styles = response.additional_data["rag_styles"].as_array().unwrap();
        assert!(rag_styles.iter().any(|id| id == "FAL0002"));

        let key = ConversationKey::new("designer-1", &response.conversation_id);
        let history = state.conversations.history(&key, 10).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "단발 레시피 알려줘");
        assert_eq!(history[1].content, response.message);
    }

    // ========================================================================
    // TEST 3: completion sees RAG context; output is cleaned
    // ========================================================================
    #[tokio::test]
    async fn test_professional_prompt_and_cleanup() {
        let (completion, seen) = scripted(Ok(recipe_reply()));
        let state = state_with(Some(completion), None);

        let response = process_chat(&state, request("단발 레시피 알려줘")).await.unwrap();
        assert!(response.message.contains("Elevation: L2 (45°) 유지"));

        let requests = seen.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].system.contains("참고할 헤어게이터 전문 레시피들"));
        assert!(requests[0].system.contains("모델번호: FAL0002"));
        assert!(requests[0].user.ends_with("단발 레시피 알려줘"));
        assert_eq!(requests[0].max_tokens, None);
        assert_eq!(requests[0].frequency_penalty, Some(SAMPLING_PENALTY));
    }

    #[tokio::test]
    async fn test_use_rag_false_skips_context() {
        let (completion, seen) = scripted(Ok(recipe_reply()));
        let state = state_with(Some(completion), None);

        let mut req = request("단발 레시피 알려줘");
        req.use_rag = Some(false);
        let response = process_chat(&state, req).await.unwrap();

        assert_eq!(response.additional_data["rag_context_used"], false);
        assert!(!seen.lock().unwrap()[0].system.contains("참고 데이터베이스 정보"));
    }

    // ========================================================================
    // TEST 4: vendor error → fallback text, not an error
    // ========================================================================
    #[tokio::test]
    async fn test_completion_error_falls_back() {
        let (completion, _) = scripted(Err(500));
        let state = state_with(Some(completion), None);

        let response = process_chat(&state, request("레이어 컷 레시피")).await.unwrap();
        assert_eq!(response.message, prompts::fallback_professional_response("레이어 컷 레시피"));
    }

    // ========================================================================
    // TEST 5: short question after a recipe takes the follow-up path
    // ========================================================================
    #[tokio::test]
    async fn test_follow_up_turn() {
        let (completion, seen) = scripted(Ok(recipe_reply()));
        let state = state_with(Some(completion), None);

        let first = process_chat(&state, request("단발 레시피 알려줘")).await.unwrap();

        let mut second = request("L2가 뭐야?");
        second.conversation_id = Some(first.conversation_id.clone());
        let response = process_chat(&state, second).await.unwrap();

        assert_eq!(response.conversation_id, first.conversation_id);
        assert_eq!(response.additional_data["follow_up"], true);

        let requests = seen.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].max_tokens, Some(FOLLOW_UP_MAX_TOKENS));
        assert!(requests[1].system.contains("이전 답변 내용: ## 🎯"));
        assert!(requests[1].system.contains("사용자 추가 질문: L2가 뭐야?"));
    }

    #[tokio::test]
    async fn test_follow_up_without_backend_uses_short_fallback() {
        let state = state_with(None, None);
        let first = process_chat(&state, request("단발 레시피 알려줘")).await.unwrap();

        let mut second = request("D1은 뭐야?");
        second.conversation_id = Some(first.conversation_id);
        let response = process_chat(&state, second).await.unwrap();

        assert_eq!(response.message, prompts::fallback_follow_up_response("D1은 뭐야?"));
    }

    // ========================================================================
    // TEST 6: image analysis feeds the prompt; failures are flagged
    // ========================================================================
    #[tokio::test]
    async fn test_image_analysis_used() {
        let (completion, seen) = scripted(Ok(recipe_reply()));
        let vision = ScriptedVision {
            reply: Ok("Section: Vertical\nFringe Type: Side Fringe".to_string()),
        };
        let state = state_with(Some(completion), Some(Box::new(vision)));

        let req = ChatRequest {
            user_id: "designer-1".into(),
            image_url: Some("https://img.example/bob.jpg".into()),
            ..Default::default()
        };
        let response = process_chat(&state, req).await.unwrap();

        assert_eq!(response.additional_data["image_analysis_used"], true);
        assert_eq!(response.additional_data["image_only_input"], true);
        assert!(seen.lock().unwrap()[0]
            .system
            .contains("이미지 분석: Section: Vertical"));

        let key = ConversationKey::new("designer-1", &response.conversation_id);
        let history = state.conversations.history(&key, 5).await;
        assert_eq!(
            history[0].content,
            format!("{} [이미지: https://img.example/bob.jpg]", IMAGE_ONLY_MESSAGE)
        );
    }

    #[tokio::test]
    async fn test_image_analysis_failure_flagged() {
        let (completion, seen) = scripted(Ok(recipe_reply()));
        let vision = ScriptedVision {
            reply: Err("HTTP 404".to_string()),
        };
        let state = state_with(Some(completion), Some(Box::new(vision)));

        let mut req = request("이 스타일 분석해줘");
        req.image_url = Some("https://img.example/missing.jpg".into());
        let response = process_chat(&state, req).await.unwrap();

        assert_eq!(response.additional_data["image_analysis_used"], false);
        assert_eq!(response.additional_data["image_processed"], true);
        assert!(seen.lock().unwrap()[0]
            .system
            .contains("이미지 분석: 이미지 분석 데이터 없음"));
    }

    // ========================================================================
    // TEST 7: optional redirect for non-hair questions
    // ========================================================================
    #[tokio::test]
    async fn test_redirect_non_hair_question() {
        let (completion, seen) = scripted(Ok(recipe_reply()));
        let mut state = state_with(Some(completion), None);
        state.config.chat.redirect_non_hair = true;

        let response = process_chat(&state, request("오늘 날씨 어때?")).await.unwrap();
        assert_eq!(response.message_type, MESSAGE_TYPE_REDIRECT);
        assert_eq!(response.message, prompts::redirect_response("오늘 날씨 어때?"));
        assert!(seen.lock().unwrap().is_empty());

        let hair = process_chat(&state, request("단발 레시피")).await.unwrap();
        assert_eq!(hair.message_type, MESSAGE_TYPE_ANALYSIS);
    }

    #[tokio::test]
    async fn test_translate_terms_applied_when_enabled() {
        let (completion, _) = scripted(Ok(recipe_reply()));
        let mut state = state_with(Some(completion), None);
        state.config.completion.translate_terms = true;

        let response = process_chat(&state, request("단발 레시피")).await.unwrap();
        assert!(response.message.contains("Section: 수평"));
    }
}
