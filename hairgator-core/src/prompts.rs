//! Prompt templates and canned responses.
//!
//! Everything here is plain text assembly. The parameter vocabulary is the
//! single source for both the professional prompt and `parameter_info`.

/// Heading every full recipe answer starts with. Follow-up detection keys on it.
pub const RECIPE_HEADER: &str = "56파라미터 Ground Truth 레시피";

/// Number of parameters in the recipe vocabulary as advertised to clients.
pub const PARAMETER_COUNT: usize = 56;

const LEVELS: &[&str] = &[
    "L0 (0°)",
    "L1 (22.5°)",
    "L2 (45°)",
    "L3 (67.5°)",
    "L4 (90°)",
    "L5 (112.5°)",
    "L6 (135°)",
    "L7 (157.5°)",
    "L8 (180°)",
];

/// Closed set of values each named parameter may take.
pub const PARAMETER_VOCABULARY: &[(&str, &[&str])] = &[
    ("Section", &["Horizontal", "Vertical", "Diagonal Forward", "Diagonal Backward"]),
    ("Celestial Axis", LEVELS),
    ("Elevation", LEVELS),
    ("Lifting", LEVELS),
    ("Direction", &["D0", "D1", "D2", "D3", "D4", "D5", "D6", "D7", "D8"]),
    ("Over Direction", &["None", "Side"]),
    ("Cut Form", &["O (One-length)", "G (Graduation)", "L (Layer)"]),
    ("Cut Shape", &["Triangular", "Square", "Round"]),
    ("Weight Flow", &["Balanced", "Forward Weighted", "Backward Weighted", "Side Weighted"]),
    ("Design Line", &["Stationary", "Mobile", "Combination"]),
    ("Outline Shape", &["Triangular", "Square", "Round"]),
    ("Volume Zone", &["Low", "Medium", "High"]),
    ("Transition Zone", &["Hard", "Medium", "Soft"]),
    ("Interior Design", &["Connected", "Disconnected"]),
    ("Distribution", &["Natural Fall", "Shifted", "Perpendicular"]),
    ("Section & Cut Line", &["Parallel", "Nonparallel"]),
    (
        "Cut Method",
        &["Blunt Cut", "Point Cut", "Slide Cut", "Twist Cut", "Brick Cut", "Clipper Cut"],
    ),
    ("Styling Direction", &["Forward", "Backward", "Side", "Natural Fall"]),
    ("Finish Look", &["Blow Dry", "Air Dry", "Heat Set", "Natural Dry"]),
    ("Texture Finish", &["Soft Gloss", "Natural", "Matte"]),
    (
        "Design Emphasis",
        &["Volume Emphasis", "Shape Emphasis", "Curl Emphasis", "Length Emphasis"],
    ),
    ("Natural Parting", &["Center", "Side", "No Parting"]),
    (
        "Styling Product",
        &["None", "Light Hold", "Medium Hold", "Strong Hold", "Oil Based", "Water Based"],
    ),
    ("Fringe Type", &["No Fringe", "Full Fringe", "Side Fringe", "Curtain Fringe"]),
    ("Fringe Length", &["None", "Eyebrow", "Eye Level", "Cheek Length"]),
    ("Fringe Shape", &["None", "Blunt", "Soft", "Wispy", "Asymmetric"]),
    ("Structure Layer", &["No Layer", "Long Layer", "Medium Layer", "Short Layer"]),
    ("Cut Categories", &["Women's Cut", "Men's Cut", "Unisex Cut"]),
];

fn normalize_parameter_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.trim().to_lowercase().chars() {
        if c.is_alphanumeric() {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

/// Allowed values for a parameter. Case, spaces and dashes in `name` are ignored.
///
/// ```
/// use hairgator_core::prompts::parameter_info;
/// assert_eq!(parameter_info("cut-form").unwrap().1[0], "O (One-length)");
/// ```
pub fn parameter_info(name: &str) -> Option<(&'static str, &'static [&'static str])> {
    let wanted = normalize_parameter_name(name);
    if wanted.is_empty() {
        return None;
    }
    PARAMETER_VOCABULARY
        .iter()
        .find(|(param, _)| normalize_parameter_name(param) == wanted)
        .map(|(param, values)| (*param, *values))
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn vocabulary_block() -> String {
    PARAMETER_VOCABULARY
        .iter()
        .map(|(name, values)| format!("{}: {}", name, values.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Five-step observation template sent with the photo.
pub fn vision_prompt(user_query: &str) -> String {
    format!(
        r#"당신은 헤어게이터 42포뮬러 + 56파라미터 전문가입니다.

이미지를 매우 세밀하게 관찰하고 다음 형식으로 정확히 분석하세요:

분석 요청: {user_query}

STEP 1: 이미지 세부 관찰
- 앞머리 유무: 이마 부분을 자세히 보고 앞머리가 있는지 없는지 명확히 판단
- 가르마: 머리 정수리 부분의 가르마 방향 (중앙/사이드/없음) 정확히 확인
- 레이어: 머리카락 길이가 일정한지 레이어가 있는지 세밀히 관찰
- 길이: 어깨 위/어깨선/어깨 아래 등 정확한 길이 측정
- 질감: 직모/웨이브/곱슬 등 모발 질감 정확히 판단

STEP 2: 42포뮬러 분석
Section: [Horizontal/Vertical/Diagonal Forward/Diagonal Backward]
Elevation: [L0~L8 중 하나] - 레이어 정도에 따라 정확히 선택
Cut Form: [O(One-length)/G(Graduation)/L(Layer)] - 실제 컷 형태에 맞게
Direction: [D0~D8]
Weight Flow: [Balanced/Forward Weighted/Backward Weighted/Side Weighted]
Design Line: [Stationary/Mobile/Combination]

STEP 3: 56파라미터 세부 분석
Cut Shape: [Triangular/Square/Round]
Volume Zone: [Low/Medium/High]
Interior Design: [Connected/Disconnected]
Texture Finish: [Soft Gloss/Natural/Matte]
Structure Layer: [Long Layer/Medium Layer/Short Layer/No Layer]

STEP 4: 앞머리 분석 (매우 중요!)
Fringe Type:
- 앞머리가 보이면: [Full Fringe/Side Fringe/Curtain Fringe] 중 선택
- 앞머리가 없으면: No Fringe
Fringe Length:
- 앞머리가 있으면: [Eyebrow/Eye Level/Cheek Length] 중 선택
- 앞머리가 없으면: None
Fringe Shape:
- 앞머리가 있으면: [Blunt/Soft/Wispy/Asymmetric] 중 선택
- 앞머리가 없으면: None

STEP 5: 가르마 분석 (매우 중요!)
Natural Parting:
- 중앙으로 가르마가 보이면: Center
- 한쪽으로 가르마가 보이면: Side
- 가르마가 명확하지 않으면: No Parting

스타일 특징: [간단한 설명]

중요: 앞머리와 가르마는 이미지를 매우 자세히 관찰해서 정확히 분석하세요!
모든 응답은 깔끔한 일반 텍스트로만 제공하고 마크다운이나 특수 기호는 사용하지 마세요."#
    )
}

/// System prompt for a full recipe answer.
///
/// `image_analysis` is cut to its first 300 characters. `rag_context` is
/// appended under a reference header when present.
pub fn professional_system_prompt(
    image_analysis: Option<&str>,
    question: &str,
    rag_context: Option<&str>,
) -> String {
    let analysis = match image_analysis {
        Some(a) if !a.trim().is_empty() => truncate_chars(a, 300),
        _ => "이미지 분석 데이터 없음".to_string(),
    };

    let mut prompt = format!(
        r#"당신은 헤어게이터 완전 실무 가이드 전문 AI입니다.

이미지 분석: {analysis}
헤어디자이너 질문: {question}

중요: 반드시 다음 정확한 파라미터 값들만 사용하여 실제 값을 채워 넣으세요:

{vocabulary}

경고: 다음과 같은 정의되지 않은 값들은 절대 사용하지 마세요:
❌ Progressive, Variable, Custom, Advanced, Modified
❌ 각도를 직접 숫자로 표현 (45°가 아닌 L2 (45°) 사용)
❌ 임의의 영어 단어나 조합된 용어

42포뮬러 명명 규칙 (반드시 준수):
[포뮬러 1: 섹션타입 각도 디자인라인] 형식 사용

올바른 예시:
✅ [포뮬러 1: 수평섹션 0도 스테이셔너리라인] – 단발 기본 구조
✅ [포뮬러 1: 수직섹션 45도 모바일라인] – 레이어 볼륨 구조
✅ [포뮬러 1: 수직섹션 90도 모바일라인] – 정수리 볼륨 리프트

반드시 다음 형식으로 실제 값을 채워서 응답하세요:

## 🎯 {header}

[포뮬러 1: 섹션타입 각도 디자인라인] – 스타일 요약
→ 파라미터: 값 + 선택 이유 (위 목록의 모든 파라미터를 한 줄씩)

[공통 스타일링 파라미터]
→ Styling Direction부터 Cut Categories까지 한 줄씩

## ⚙️ 시술 기법 상세 가이드
커팅 순서 (준비단계, 1차 커팅, 2차 정밀, 마감 처리)와 기술적 포인트

## 🧬 모발 타입별 맞춤 기법
직모, 곱슬모, 가는 모발, 굵은 모발별 조정 방법

## ⚠️ 실무 주의사항 & 프로 팁
시술 중 체크포인트, 흔한 실수 방지, 고급 프로 팁

## 🏠 스타일 유지법 & 고객 관리
고객 안내사항과 제품 추천

JSON, 코드 블록, 마크다운 표는 사용하지 말고 위 형식의 일반 텍스트로만 답하세요."#,
        vocabulary = vocabulary_block(),
        header = RECIPE_HEADER,
    );

    if let Some(context) = rag_context.filter(|c| !c.trim().is_empty()) {
        prompt.push_str("\n\n참고 데이터베이스 정보:\n");
        prompt.push_str(context);
    }

    prompt
}

pub fn professional_user_prompt(question: &str) -> String {
    format!(
        "헤어디자이너로서 다음 요청에 대한 완전한 56파라미터 분석을 제공해주세요: {}",
        question
    )
}

/// System prompt for a short explanation of something the last recipe mentioned.
pub fn follow_up_system_prompt(previous_answer: &str, question: &str) -> String {
    let previous = if previous_answer.is_empty() {
        String::new()
    } else {
        format!("{}...", truncate_chars(previous_answer, 500))
    };

    format!(
        r#"당신은 헤어게이터 전문가입니다.

이전 답변 내용: {previous}

사용자 추가 질문: {question}

이전 답변에서 언급된 내용에 대한 추가 질문입니다.
56파라미터 전체 분석이 아닌, 질문한 특정 내용만 간단하고 명확하게 설명해주세요.

답변 형식:
## 🔍 {question} 상세 설명

**정의:**
[간단하고 명확한 정의]

**실무 적용:**
[실제 어떻게 사용하는지]

**주요 포인트:**
- [핵심 요점 1]
- [핵심 요점 2]
- [핵심 요점 3]

**예시:**
[구체적인 예시나 상황]

**주의사항:**
[실무에서 주의할 점]

이전 답변의 연장선에서 질문한 내용만 집중적으로 설명해주세요."#
    )
}

pub fn follow_up_user_prompt(question: &str) -> String {
    format!(
        "다음 질문에 대해 간단하고 실용적으로 설명해주세요: {}",
        question
    )
}

/// Canned recipe used when the completion backend is unavailable or fails.
pub fn fallback_professional_response(question: &str) -> String {
    format!(
        r#"## 🎯 {header}

**전문가 질문 분석**: {question}...

### [포뮬러 1: 수직섹션 45도 모바일라인] – 미디움 레이어 설정

→ Section: Vertical + 자연스러운 레이어 연결을 위한 수직 분할
→ Celestial Axis: L2 (45°) + 45도 각도로 적당한 볼륨과 움직임 생성
→ Elevation: L2 (45°) + 미디움 레이어 효과로 볼륨과 동시에 길이감 유지
→ Direction: D1 + 얼굴 방향으로 살짝 기울여 소프트한 라인 생성
→ Over Direction: None + 과도한 방향성 없이 자연스러운 흐름 유지
→ Lifting: L2 (45°) + 적절한 볼륨 생성
→ Design Line: Mobile + 움직이는 가이드라인으로 자연스러운 연결감
→ Length: D + 어깨선 근처 길이로 실용성과 여성스러움 동시 추구
→ Cut Form: L (Layer) + 레이어 구조로 움직임과 경량감 동시 구현
→ Cut Shape: Round + 둥근 형태로 부드러운 여성스러운 인상
→ Outline Shape: Round + 전체적으로 둥근 실루엣으로 온화한 이미지
→ Weight Flow: Balanced + 전체적으로 균형잡힌 무게감 분포
→ Volume Zone: Medium + 중간 정도의 볼륨존으로 자연스러운 볼륨
→ Transition Zone: Soft + 부드러운 전환부로 자연스러운 연결감
→ Interior Design: Connected + 내부가 자연스럽게 연결된 구조
→ Distribution: Natural Fall + 자연스러운 낙하감
→ Section & Cut Line: Parallel + 평행한 섹션과 컷라인
→ Cut Method: Point Cut + 포인트 컷으로 자연스러운 끝처리

### [공통 스타일링 파라미터]

→ Styling Direction: Forward + 앞쪽 방향 스타일링으로 얼굴을 감싸는 효과
→ Finish Look: Blow Dry + 블로우 드라이 마무리로 자연스러운 볼륨과 윤기
→ Texture Finish: Natural + 자연스러운 질감으로 인위적이지 않은 마무리
→ Design Emphasis: Shape Emphasis + 형태 강조로 실루엣이 주요 포인트
→ Natural Parting: Side + 옆가르마로 자연스러운 비대칭 균형
→ Styling Product: Light Hold + 가벼운 홀드력 제품으로 자연스러운 움직임
→ Fringe Type: No Fringe + 앞머리 없는 스타일로 이마를 시원하게 노출
→ Fringe Length: None + 앞머리 길이 설정 없음
→ Fringe Shape: None + 앞머리 형태 설정 없음
→ Structure Layer: Medium Layer + 중간 레이어 구조로 볼륨과 길이감의 절충점
→ Cut Categories: Women's Cut + 여성 커트의 기본 원칙

## ⚙️ 시술 기법 상세 가이드

**커팅 순서:**
1. **준비단계**: 모발 상태 체크 및 7개 구역 분할
2. **1차 커팅**: 백 센터에서 가이드라인 설정, L2 (45°) 유지
3. **2차 정밀**: 사이드와 백 영역 자연스러운 연결
4. **마감 처리**: Point Cut으로 자연스러운 끝처리

**기술적 포인트:**
- 45도 각도로 일정한 리프팅
- 0.5cm 이내 균일한 섹션 두께
- 백→사이드→프런트 순서 진행

## 🧬 모발 타입별 적용

**직모**: L3 (67.5°)로 각도 상향 조정, 웨트 커팅 권장
**곱슬모**: 드라이 커팅으로 실제 컬 상태에서 조정
**가는모발**: 과도한 레이어 방지, Forward Weighted 적용
**굵은모발**: 내부 텍스처링으로 무게감 분산

## ⚠️ 실무 주의사항

- 황금비율 70:30 적용하여 전체 균형 확인
- ±2mm 오차 범위 내 좌우 대칭성 유지
- 과도한 레이어로 인한 볼륨 손실 방지

## 🏠 고객 관리 & 유지법

- 2일에 1회 가벼운 스타일링으로 충분
- 6주 후 재방문 권장
- 볼륨 무스나 텍스처 에센스 소량 사용

**✂️ 헤어디자이너 전용 완전 실무 가이드**"#,
        header = RECIPE_HEADER,
        question = truncate_chars(question, 100),
    )
}

/// Canned short explanation for follow-up questions.
pub fn fallback_follow_up_response(question: &str) -> String {
    format!(
        r#"## 🔍 {question} 관련 설명

**헤어게이터 전문 용어 해설:**

질문하신 "{question}"에 대해 설명드리겠습니다.

**정의:**
헤어게이터 시스템에서 사용되는 전문 기법 중 하나로, 정확한 각도와 방향성을 통해 원하는 헤어 스타일을 구현하는 방법입니다.

**실무 적용:**
- 정확한 각도 측정이 핵심
- 일정한 텐션 유지 필요
- 섹션별 일관된 적용

**주요 포인트:**
- 헤어게이터 42포뮬러 기반 접근
- 모발 타입별 차별화 적용
- 고객 얼굴형 고려 필수

**주의사항:**
정확한 기법 숙지 후 시술하시기 바랍니다.

더 자세한 내용이 필요하시면 구체적인 상황을 말씀해 주세요!"#
    )
}

/// Polite redirect for questions unrelated to hair.
pub fn redirect_response(query: &str) -> String {
    format!(
        r#"안녕하세요! HAIRGATOR 프로페셔널 시스템입니다. 🎯

질문: "{query}"

죄송하지만 헤어 관련 질문이 아닌 것 같습니다.
본 시스템은 헤어디자이너 전용 42포뮬러 + 56파라미터 기반 기술 분석 시스템입니다.

**헤어 관련 질문 예시:**
• "단발머리로 짧게 자르고 싶어"
• "볼륨 살리는 스타일 추천"
• "곱슬머리에 맞는 커트"
• "앞머리 있는 미디움 스타일"

헤어 관련 질문을 해주시면 정확한 56파라미터 분석을 제공해드리겠습니다! 💡"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_info_normalizes_name() {
        let (name, values) = parameter_info("Cut Form").unwrap();
        assert_eq!(name, "Cut Form");
        assert_eq!(values, &["O (One-length)", "G (Graduation)", "L (Layer)"]);

        assert_eq!(parameter_info("design_line").unwrap().0, "Design Line");
        assert_eq!(parameter_info("WEIGHT-FLOW").unwrap().0, "Weight Flow");
        assert_eq!(parameter_info("section & cut line").unwrap().0, "Section & Cut Line");
        assert_eq!(parameter_info("elevation").unwrap().1.len(), 9);
    }

    #[test]
    fn test_parameter_info_unknown_or_empty() {
        assert!(parameter_info("hair colour").is_none());
        assert!(parameter_info("").is_none());
        assert!(parameter_info(" - ").is_none());
    }

    #[test]
    fn test_vision_prompt_embeds_query() {
        let prompt = vision_prompt("앞머리 확인해줘");
        assert!(prompt.contains("분석 요청: 앞머리 확인해줘"));
        assert!(prompt.contains("STEP 5"));
    }

    #[test]
    fn test_professional_prompt_truncates_analysis_and_appends_context() {
        let analysis = "가".repeat(400);
        let prompt = professional_system_prompt(
            Some(&analysis),
            "단발 레시피",
            Some("[레퍼런스 1]\n모델번호: FAL0002"),
        );

        assert!(prompt.contains(&"가".repeat(300)));
        assert!(!prompt.contains(&"가".repeat(301)));
        assert!(prompt.contains("Cut Method: Blunt Cut, Point Cut"));
        assert!(prompt.contains(RECIPE_HEADER));
        assert!(prompt.ends_with("참고 데이터베이스 정보:\n[레퍼런스 1]\n모델번호: FAL0002"));
    }

    #[test]
    fn test_professional_prompt_without_analysis_or_context() {
        let prompt = professional_system_prompt(None, "레이어 컷", None);
        assert!(prompt.contains("이미지 분석: 이미지 분석 데이터 없음"));
        assert!(!prompt.contains("참고 데이터베이스 정보"));
    }

    #[test]
    fn test_follow_up_prompt_truncates_previous_answer() {
        let previous = "a".repeat(600);
        let prompt = follow_up_system_prompt(&previous, "L2가 뭐야?");
        assert!(prompt.contains(&format!("{}...", "a".repeat(500))));
        assert!(prompt.contains("## 🔍 L2가 뭐야? 상세 설명"));
    }

    #[test]
    fn test_fallbacks_carry_expected_headers() {
        let recipe = fallback_professional_response("단발 레시피 알려줘");
        assert!(recipe.starts_with(&format!("## 🎯 {}", RECIPE_HEADER)));
        assert!(recipe.contains("**전문가 질문 분석**: 단발 레시피 알려줘..."));

        let follow_up = fallback_follow_up_response("D1이 뭐야?");
        assert!(follow_up.starts_with("## 🔍 D1이 뭐야? 관련 설명"));
        assert!(!follow_up.contains(RECIPE_HEADER));

        assert!(redirect_response("오늘 날씨").contains("질문: \"오늘 날씨\""));
    }
}
