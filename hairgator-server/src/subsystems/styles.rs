//! Style table subsystem — keyword lookup over exported style menu rows
//!
//! - Loads the spreadsheet export (JSON array of row objects) once at startup
//! - Falls back to three built-in records when the export is missing or unreadable
//! - Scores rows by weighted substring hits and formats the best ones as prompt context

use std::path::Path;

use hairgator_core::{HairgatorError, StyleRecord};
use serde::Serialize;
use serde_json::Value;

/// Upper bound accepted from callers for `search` limits.
pub const MAX_SEARCH_LIMIT: usize = 20;

/// Records rendered into the prompt context at most.
const RAG_CONTEXT_RECORDS: usize = 3;

const GROUND_TRUTH_PREVIEW_CHARS: usize = 200;

/// Field weights applied per matching keyword.
const FIELD_WEIGHTS: &[(&str, u32)] = &[
    ("introduction_kor", 5),
    ("subtitle", 3),
    ("ground_truth", 3),
    ("image_analysis_kor", 2),
    ("formula_42", 2),
    ("session_meaning", 1),
    ("management_kor", 1),
];

/// Column names tried in order for each field: spreadsheet header first, then snake_case.
const COLUMN_ALIASES: &[(&str, &[&str])] = &[
    ("model_no", &["St model no.", "St model no", "model_no"]),
    ("introduction_kor", &["Style Introduction(KOR)", "introduction_kor"]),
    ("management_kor", &["Management(KOR)", "management_kor"]),
    ("image_analysis_kor", &["Image Analysis(KOR)", "image_analysis_kor"]),
    ("subtitle", &["subtitle"]),
    ("formula_42", &["42fomular", "formula_42"]),
    ("session_meaning", &["세션전환의미", "session_meaning"]),
    ("ground_truth", &["groundtruce", "ground_truth"]),
    ("image_url", &["이미지 URL", "image_url"]),
];

/// One scored search hit.
#[derive(Debug, Clone, Serialize)]
pub struct StyleMatch {
    #[serde(flatten)]
    pub record: StyleRecord,
    pub score: u32,
    pub matched_fields: Vec<String>,
}

/// In-memory style menu.
#[derive(Debug, Clone, Default)]
pub struct StyleTable {
    records: Vec<StyleRecord>,
}

impl StyleTable {
    pub fn new(records: Vec<StyleRecord>) -> Self {
        Self { records }
    }

    /// Load an export file. `~` in the path is expanded.
    pub fn load(path: &str) -> Result<Self, HairgatorError> {
        let expanded = shellexpand::tilde(path).into_owned();
        let raw = std::fs::read_to_string(Path::new(&expanded)).map_err(|source| {
            HairgatorError::StyleTable {
                path: expanded.clone(),
                source,
            }
        })?;
        let rows: Vec<Value> = serde_json::from_str(&raw)?;

        let records: Vec<StyleRecord> = rows.iter().filter_map(record_from_row).collect();
        tracing::info!(path = %expanded, rows = rows.len(), loaded = records.len(), "Style table loaded");

        Ok(Self { records })
    }

    /// Load an export file, or the built-in records when that fails.
    pub fn load_or_default(path: &str) -> Self {
        match Self::load(path) {
            Ok(table) if !table.is_empty() => table,
            Ok(_) => {
                tracing::warn!(path = path, "Style table export has no usable rows, using built-in records");
                Self::with_defaults()
            }
            Err(e) => {
                tracing::warn!(path = path, error = %e, "Style table export unavailable, using built-in records");
                Self::with_defaults()
            }
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(default_records())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[StyleRecord] {
        &self.records
    }

    /// Weighted substring search.
    ///
    /// # Constraints
    /// * Matching is case-insensitive; the whole query is always the first keyword
    /// * Ties keep table order
    /// * With no hit at all, returns first/middle/last rows (or all rows when fewer than 3) with score 0
    pub fn search(&self, query: &str, limit: usize) -> Vec<StyleMatch> {
        let keywords = expand_keywords(query);

        let mut matches: Vec<StyleMatch> = self
            .records
            .iter()
            .filter_map(|record| score_record(record, &keywords))
            .collect();

        // sort_by is stable
        matches.sort_by(|a, b| b.score.cmp(&a.score));
        matches.truncate(limit);

        tracing::debug!(
            query = query,
            keywords = keywords.len(),
            hits = matches.len(),
            "Style search"
        );

        if matches.is_empty() && !self.records.is_empty() {
            return self.fallback_records();
        }

        matches
    }

    fn fallback_records(&self) -> Vec<StyleMatch> {
        let picks: Vec<&StyleRecord> = if self.records.len() >= 3 {
            vec![
                &self.records[0],
                &self.records[self.records.len() / 2],
                &self.records[self.records.len() - 1],
            ]
        } else {
            self.records.iter().collect()
        };

        tracing::debug!(count = picks.len(), "No style matched, returning spread sample");

        picks
            .into_iter()
            .map(|record| StyleMatch {
                record: record.clone(),
                score: 0,
                matched_fields: Vec::new(),
            })
            .collect()
    }
}

fn extend_keywords(keywords: &mut Vec<String>, words: &[&str]) {
    keywords.extend(words.iter().map(|w| w.to_string()));
}

fn expand_keywords(query: &str) -> Vec<String> {
    let q = query.to_lowercase();
    let mut keywords = vec![q.clone()];

    if q.contains("이미지") || q.contains("헤어스타일 분석") || q.contains("분석해줘") {
        extend_keywords(
            &mut keywords,
            &[
                "레이어", "layer", "미디움", "medium", "롱", "long", "웨이브", "wave", "앞머리",
                "fringe", "가르마", "parting", "볼륨", "volume", "컷", "cut", "스타일", "style",
            ],
        );
    }
    if q.contains("단발") || q.contains("bob") {
        extend_keywords(&mut keywords, &["단발", "bob", "밥", "쇼트", "short", "턱선"]);
    }
    if q.contains("레시피") || q.contains("recipe") {
        extend_keywords(&mut keywords, &["커트", "cut", "시술", "기법"]);
    }
    if q.contains("롱") || q.contains("long") {
        extend_keywords(&mut keywords, &["롱", "long", "긴머리", "어깨아래"]);
    }
    if q.contains("미디움") || q.contains("medium") {
        extend_keywords(&mut keywords, &["미디움", "medium", "중간길이", "어깨선"]);
    }

    keywords
}

fn field_value<'a>(record: &'a StyleRecord, field: &str) -> &'a str {
    match field {
        "introduction_kor" => &record.introduction_kor,
        "subtitle" => &record.subtitle,
        "ground_truth" => &record.ground_truth,
        "image_analysis_kor" => &record.image_analysis_kor,
        "formula_42" => &record.formula_42,
        "session_meaning" => &record.session_meaning,
        "management_kor" => &record.management_kor,
        _ => "",
    }
}

fn score_record(record: &StyleRecord, keywords: &[String]) -> Option<StyleMatch> {
    let mut score: u32 = 0;
    let mut matched_fields = Vec::new();

    for &(field, weight) in FIELD_WEIGHTS {
        let value = field_value(record, field).to_lowercase();
        if value.is_empty() {
            continue;
        }
        for keyword in keywords {
            if value.contains(keyword.as_str()) {
                score += weight;
                matched_fields.push(format!("{}:{}", field, keyword));
            }
        }
    }

    (score > 0).then(|| StyleMatch {
        record: record.clone(),
        score,
        matched_fields,
    })
}

/// Spreadsheet cell → trimmed text. `nan`/`None` placeholders become empty.
fn cell_text(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    };
    match text.as_str() {
        "nan" | "NaN" | "None" => String::new(),
        _ => text,
    }
}

fn column(row: &Value, field: &str) -> String {
    let aliases = COLUMN_ALIASES
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, aliases)| *aliases)
        .unwrap_or(&[]);

    aliases
        .iter()
        .filter_map(|alias| row.get(*alias))
        .map(cell_text)
        .find(|text| !text.is_empty())
        .unwrap_or_default()
}

fn record_from_row(row: &Value) -> Option<StyleRecord> {
    if !row.is_object() {
        return None;
    }
    let model_no = column(row, "model_no");
    if model_no.is_empty() {
        return None;
    }
    Some(StyleRecord {
        model_no,
        introduction_kor: column(row, "introduction_kor"),
        management_kor: column(row, "management_kor"),
        image_analysis_kor: column(row, "image_analysis_kor"),
        subtitle: column(row, "subtitle"),
        formula_42: column(row, "formula_42"),
        session_meaning: column(row, "session_meaning"),
        ground_truth: column(row, "ground_truth"),
        image_url: column(row, "image_url"),
    })
}

fn or_na(value: &str) -> &str {
    if value.is_empty() {
        "N/A"
    } else {
        value
    }
}

/// Render matched records as the reference block appended to the prompt.
pub fn format_rag_context(records: &[StyleRecord]) -> String {
    let mut context = String::from("참고할 헤어게이터 전문 레시피들:\n\n");

    for (i, style) in records.iter().take(RAG_CONTEXT_RECORDS).enumerate() {
        let ground_truth: String = style
            .ground_truth
            .chars()
            .take(GROUND_TRUTH_PREVIEW_CHARS)
            .collect();

        context.push_str(&format!("[레퍼런스 {}]\n", i + 1));
        context.push_str(&format!("모델번호: {}\n", or_na(&style.model_no)));
        context.push_str(&format!("스타일명: {}\n", or_na(&style.introduction_kor)));
        context.push_str(&format!("42포뮬러: {}\n", or_na(&style.formula_42)));
        context.push_str(&format!("Ground Truth: {}...\n", or_na(&ground_truth)));
        context.push_str(&format!("세션의미: {}\n\n", or_na(&style.session_meaning)));
    }

    context
}

fn default_records() -> Vec<StyleRecord> {
    vec![
        StyleRecord {
            model_no: "FAL0001".to_string(),
            introduction_kor: "롱 원랭스 스타일".to_string(),
            ground_truth: "[포뮬러 1: 수평섹션 0도 스테이셔너리라인] – 기본 아웃라인 설정\n\
                → Section: Horizontal + 수평 섹션으로 균일한 라인 구현\n\
                → Celestial Axis: L0 (0°) + 0도 각도로 클래식한 원랭스 형태\n\
                → Cut Form: O (One-length) + 원랭스로 균일한 길이감\n\
                → Cut Shape: Square + 정사각형 형태로 안정적인 실루엣"
                .to_string(),
            subtitle: "가로섹션을 이용하여 진행".to_string(),
            formula_42: "Horizontal Section, L0 Elevation, Stationary Design Line".to_string(),
            ..Default::default()
        },
        StyleRecord {
            model_no: "FAL0002".to_string(),
            introduction_kor: "클래식 단발 밥컷".to_string(),
            ground_truth: "[포뮬러 1: 수평섹션 0도 스테이셔너리라인] – 단발 기본 구조\n\
                → Section: Horizontal + 수평 섹션으로 깔끔한 단발 라인\n\
                → Celestial Axis: L0 (0°) + 0도 각도로 무게감 있는 밥컷\n\
                → Cut Form: O (One-length) + 원랭스로 균일한 단발 길이\n\
                → Weight Flow: Balanced + 균형잡힌 무게감 분포"
                .to_string(),
            subtitle: "단발 밥컷 기본 레시피".to_string(),
            formula_42: "Horizontal Section, L0 Elevation, One-length".to_string(),
            ..Default::default()
        },
        StyleRecord {
            model_no: "FAL0003".to_string(),
            introduction_kor: "단발머리 레이어드 스타일".to_string(),
            ground_truth: "[포뮬러 1: 수직섹션 45도 모바일라인] – 단발 레이어링\n\
                → Section: Vertical + 수직 섹션으로 자연스러운 레이어 연결\n\
                → Celestial Axis: L2 (45°) + 45도 각도로 적당한 볼륨 생성\n\
                → Cut Form: L (Layer) + 레이어 구조로 움직임과 경량감\n\
                → Structure Layer: Medium Layer + 중간 레이어로 볼륨과 길이감 절충"
                .to_string(),
            subtitle: "단발에 레이어를 적용한 동적 스타일".to_string(),
            formula_42: "Vertical Section, L2 Elevation, Layer Cut".to_string(),
            ..Default::default()
        },
    ]
}
