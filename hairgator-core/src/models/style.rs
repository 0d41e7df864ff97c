use serde::{Deserialize, Serialize};

/// One row of the exported style menu spreadsheet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StyleRecord {
    pub model_no: String,
    #[serde(default)]
    pub introduction_kor: String,
    #[serde(default)]
    pub management_kor: String,
    #[serde(default)]
    pub image_analysis_kor: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub formula_42: String,
    #[serde(default)]
    pub session_meaning: String,
    #[serde(default)]
    pub ground_truth: String,
    #[serde(default)]
    pub image_url: String,
}
