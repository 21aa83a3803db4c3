use serde::{Deserialize, Serialize};

/// Client → Server: first message on a debug connection opened without an
/// `id` query parameter.
///
/// Accepted as `{ "jobId": "..." }` (alias `id`) or as the bare id in plain
/// text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugStart {
    #[serde(alias = "id")]
    pub job_id: String,
}

impl DebugStart {
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if text.starts_with('{') {
            return serde_json::from_str::<DebugStart>(text)
                .ok()
                .filter(|s| !s.job_id.trim().is_empty());
        }
        if text.chars().any(char::is_whitespace) {
            return None;
        }
        Some(Self {
            job_id: text.to_string(),
        })
    }
}
