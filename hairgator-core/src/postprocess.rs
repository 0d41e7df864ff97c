//! Response post-processing.
//!
//! `clean_response` strips structured junk the model sometimes emits and pins
//! angle notation to the level scale. `translate_terms` swaps English
//! parameter tokens for their Korean names.

use regex::{Captures, Regex};
use std::sync::LazyLock;

const UNDEFINED_TERMS: &[&str] = &[
    "Progressive",
    "Variable",
    "Custom",
    "Advanced",
    "Modified",
    "Dynamic",
    "Flexible",
    "Multi-level",
    "Adaptive",
];

const DEFAULT_LEVEL: &str = "L4 (90°)";

const ANGLE_LEVELS: &[(f64, &str)] = &[
    (0.0, "L0 (0°)"),
    (22.5, "L1 (22.5°)"),
    (45.0, "L2 (45°)"),
    (67.5, "L3 (67.5°)"),
    (90.0, "L4 (90°)"),
    (112.5, "L5 (112.5°)"),
    (135.0, "L6 (135°)"),
    (157.5, "L7 (157.5°)"),
    (180.0, "L8 (180°)"),
];

static RE_ANGLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)°").expect("invalid regex"));

static RE_STRUCTURED: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?s)```json.*?```",
        r"(?s)```.*?```",
        r"`[^`]*`",
        r#"\{[^{}]*"[^"]*"[^{}]*\}"#,
        r#"\[[^\[\]]*"[^"]*"[^\[\]]*\]"#,
    ]
    .iter()
    .map(|p| Regex::new(p).expect("invalid regex"))
    .collect()
});

static RE_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("invalid regex"));

static RE_SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" {2,}").expect("invalid regex"));

/// English parameter token → Korean.
pub const TERM_DICTIONARY: &[(&str, &str)] = &[
    ("Horizontal", "수평"),
    ("Vertical", "수직"),
    ("Diagonal Forward", "전대각"),
    ("Diagonal Backward", "후대각"),
    ("One-length", "원랭스"),
    ("Graduation", "그래듀에이션"),
    ("Stationary", "고정"),
    ("Mobile", "이동"),
    ("Combination", "혼합"),
    ("Triangular", "삼각형"),
    ("Square", "사각형"),
    ("Round", "원형"),
    ("Balanced", "균형"),
    ("Forward Weighted", "앞쪽 무게"),
    ("Backward Weighted", "뒤쪽 무게"),
    ("Side Weighted", "옆쪽 무게"),
    ("Connected", "연결"),
    ("Disconnected", "비연결"),
    ("Natural Fall", "자연 낙하"),
    ("Shifted", "이동 분배"),
    ("Perpendicular", "수직 분배"),
    ("Parallel", "평행"),
    ("Nonparallel", "비평행"),
    ("Blunt Cut", "블런트 컷"),
    ("Point Cut", "포인트 컷"),
    ("Slide Cut", "슬라이드 컷"),
    ("Twist Cut", "트위스트 컷"),
    ("Brick Cut", "브릭 컷"),
    ("Clipper Cut", "클리퍼 컷"),
    ("Blow Dry", "블로우 드라이"),
    ("Air Dry", "자연 건조"),
    ("Heat Set", "열 고정"),
    ("Natural Dry", "자연 드라이"),
    ("Soft Gloss", "소프트 글로스"),
    ("Matte", "매트"),
    ("Volume Emphasis", "볼륨 강조"),
    ("Shape Emphasis", "형태 강조"),
    ("Curl Emphasis", "컬 강조"),
    ("Length Emphasis", "길이 강조"),
    ("No Parting", "가르마 없음"),
    ("Light Hold", "약한 고정"),
    ("Medium Hold", "중간 고정"),
    ("Strong Hold", "강한 고정"),
    ("Oil Based", "오일 베이스"),
    ("Water Based", "워터 베이스"),
    ("No Fringe", "앞머리 없음"),
    ("Full Fringe", "풀 뱅"),
    ("Side Fringe", "사이드 뱅"),
    ("Curtain Fringe", "커튼 뱅"),
    ("Eye Level", "눈 높이"),
    ("Cheek Length", "볼 길이"),
    ("Wispy", "가벼운 결"),
    ("Asymmetric", "비대칭"),
    ("No Layer", "레이어 없음"),
    ("Long Layer", "롱 레이어"),
    ("Medium Layer", "미디움 레이어"),
    ("Short Layer", "숏 레이어"),
    ("Women's Cut", "여성 커트"),
    ("Men's Cut", "남성 커트"),
    ("Unisex Cut", "유니섹스 커트"),
];

static RE_TERMS: LazyLock<Regex> = LazyLock::new(|| {
    let mut terms: Vec<&str> = TERM_DICTIONARY.iter().map(|(en, _)| *en).collect();
    // Leftmost-first alternation: longer phrases must come before their prefixes.
    terms.sort_by(|a, b| b.len().cmp(&a.len()));
    let alternation = terms
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"\b(?:{})\b", alternation)).expect("invalid regex")
});

fn level_for_angle(raw: &str) -> &'static str {
    raw.parse::<f64>()
        .ok()
        .and_then(|angle| {
            ANGLE_LEVELS
                .iter()
                .find(|(a, _)| (*a - angle).abs() < f64::EPSILON)
                .map(|(_, level)| *level)
        })
        .unwrap_or(DEFAULT_LEVEL)
}

/// Rewrite bare `N°` to level notation, leaving `N°)` (already annotated) alone.
fn normalize_angles(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for caps in RE_ANGLE.captures_iter(text) {
        let (Some(whole), Some(number)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if text[whole.end()..].starts_with(')') {
            continue;
        }
        out.push_str(&text[last..whole.start()]);
        out.push_str(level_for_angle(number.as_str()));
        last = whole.end();
    }

    out.push_str(&text[last..]);
    out
}

fn replace_undefined_terms(text: &str) -> String {
    let mut cleaned = text.to_string();
    for term in UNDEFINED_TERMS {
        if cleaned.contains(term) {
            tracing::warn!(term = *term, "Undefined parameter value in model output");
            if *term == "Progressive" {
                cleaned = cleaned
                    .replace("Lifting: Progressive", "Lifting: L4 (90°)")
                    .replace("Progressive +", "L4 (90°) +");
            }
        }
    }
    cleaned
}

/// Line-based pass used when regex cleanup leaves too little text.
fn strip_structured_lines(text: &str) -> String {
    let mut kept = Vec::new();
    let mut skipping = false;

    for line in text.split('\n') {
        let trimmed = line.trim();
        if line.contains("```") || trimmed.starts_with('{') || trimmed.starts_with('[') {
            skipping = true;
        } else if trimmed.ends_with('}') || trimmed.ends_with(']') {
            skipping = false;
        } else if !skipping {
            kept.push(line);
        }
    }

    kept.join("\n").trim().to_string()
}

/// Clean a completion before it is shown to the designer.
///
/// Never fails: when every pass comes up empty the input is returned as is.
pub fn clean_response(text: &str) -> String {
    let mut cleaned = replace_undefined_terms(text);
    cleaned = normalize_angles(&cleaned);

    for re in RE_STRUCTURED.iter() {
        cleaned = re.replace_all(&cleaned, "").into_owned();
    }

    cleaned = RE_BLANK_LINES.replace_all(&cleaned, "\n\n").into_owned();
    cleaned = RE_SPACES.replace_all(&cleaned, " ").into_owned();
    let mut cleaned = cleaned.trim().to_string();

    if cleaned.chars().count() < 50 {
        cleaned = strip_structured_lines(text);
    }

    if cleaned.is_empty() {
        text.to_string()
    } else {
        cleaned
    }
}

/// Replace English parameter tokens with Korean, whole words only, longest phrase first.
pub fn translate_terms(text: &str) -> String {
    RE_TERMS
        .replace_all(text, |caps: &Captures| {
            let matched = &caps[0];
            TERM_DICTIONARY
                .iter()
                .find(|(en, _)| *en == matched)
                .map(|(_, ko)| ko.to_string())
                .unwrap_or_else(|| matched.to_string())
        })
        .into_owned()
}
