//! Keyword heuristics over user input and conversation history.

use crate::models::{ConversationMessage, Role};
use crate::prompts::RECIPE_HEADER;

/// Terms that mark a question as hair-related.
pub const PROFESSIONAL_KEYWORDS: &[&str] = &[
    // 42 formula
    "포뮬러", "섹션", "엘리베이션", "디렉션", "리프팅", "디자인라인",
    "formula", "section", "elevation", "direction", "lifting", "design line",
    // 56 parameters
    "디스트리뷰션", "웨이트플로우", "아웃라인", "인테리어디자인", "트랜지션존",
    "distribution", "weight flow", "outline", "interior design", "transition zone",
    // cutting techniques
    "블런트컷", "포인트컷", "슬라이드컷", "트위스트컷", "브릭컷", "클리퍼컷",
    "blunt cut", "point cut", "slide cut", "twist cut", "brick cut", "clipper cut",
    // angle and direction codes
    "L0", "L1", "L2", "L3", "L4", "L5", "L6", "L7", "L8",
    "D0", "D1", "D2", "D3", "D4", "D5", "D6", "D7", "D8",
    "수평섹션", "수직섹션", "대각선섹션", "파이섹션",
    // salon practice
    "레시피", "시술", "기법", "텍스처링", "언더컷", "오버다이렉션",
    "recipe", "technique", "texturizing", "undercut", "over direction",
    "단축", "연장", "길이조절", "트리밍", "쇼트닝",
    "볼륨업", "볼륨다운", "리프트", "루트볼륨", "크라운볼륨",
    // hair condition
    "직모", "곱슬모", "웨이브모", "가는모발", "굵은모발", "밀도",
    "모발밀도", "모발텍스처", "성장패턴", "모류", "모방향",
    // everyday words
    "헤어", "머리", "모발", "컷", "자르", "스타일", "펌", "염색",
    "hair", "cut", "style", "단발", "롱", "쇼트", "미디움",
    "볼륨", "레이어", "앞머리", "뒷머리", "옆머리", "가르마",
    "곱슬", "웨이브", "드라이", "블로우", "스타일링",
];

/// Phrasings typical of a designer asking for technique.
pub const QUESTION_PATTERNS: &[&str] = &[
    "레시피", "recipe", "시술법", "기법", "technique",
    "어떻게 커트", "어떻게 자르", "커팅방법", "cutting method",
    "파라미터", "parameter", "각도", "angle", "섹션", "section",
    "몇도로", "어떤 각도", "어떤 섹션", "어떤 방향",
    "볼륨 살리", "무게감 조절", "길이 조절", "레이어", "layer",
    "이미지 분석", "사진 분석", "헤어스타일 분석", "스타일 해석",
];

/// Words that signal a question about the previous answer.
pub const FOLLOW_UP_PATTERNS: &[&str] = &[
    "뭐야", "무엇", "무슨", "어떤", "어떻게", "왜", "언제", "어디서", "누구",
    "얼마나", "몇", "설명", "자세히", "더", "추가", "구체적", "예시", "방법",
];

const FOLLOW_UP_MAX_CHARS: usize = 30;

/// Placeholder values some clients send instead of omitting `image_url`.
const IMAGE_URL_SENTINELS: &[&str] = &["string", "", "null", "undefined"];

pub fn is_professional_hair_question(query: &str) -> bool {
    if query.trim().is_empty() {
        return false;
    }
    let q = query.to_lowercase();
    PROFESSIONAL_KEYWORDS
        .iter()
        .chain(QUESTION_PATTERNS.iter())
        .any(|k| q.contains(&k.to_lowercase()))
}

/// `history` is oldest-first and ends with the current user message.
pub fn is_follow_up_question(history: &[ConversationMessage], message: &str) -> bool {
    if history.len() < 2 {
        return false;
    }

    let previous_recipe = history[..history.len() - 1]
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
        .map(|m| m.content.contains(RECIPE_HEADER))
        .unwrap_or(false);

    if !previous_recipe {
        return false;
    }

    let lowered = message.to_lowercase();
    FOLLOW_UP_PATTERNS.iter().any(|p| lowered.contains(p))
        && message.chars().count() < FOLLOW_UP_MAX_CHARS
}

/// The assistant answer a follow-up refers to, if any.
pub fn previous_assistant_message(history: &[ConversationMessage]) -> Option<&ConversationMessage> {
    if history.len() < 2 {
        return None;
    }
    history[..history.len() - 1]
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
}

pub fn is_valid_image_url(url: &str) -> bool {
    let url = url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return false;
    }
    (10..=2000).contains(&url.chars().count())
}

/// Map placeholder values to `None` and trim the rest.
pub fn normalize_image_url(url: Option<String>) -> Option<String> {
    url.map(|u| u.trim().to_string())
        .filter(|u| !IMAGE_URL_SENTINELS.contains(&u.as_str()))
}
