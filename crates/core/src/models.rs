use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storage::MergeMode;

/// One image as shown in a listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub filename: String,
    /// Raw sidecar text, trimmed.
    pub content: String,
    pub tags: Vec<String>,
    pub rating: Option<u8>,
    pub aesthetic_score: Option<f32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub image_url: String,
    pub thumbnail_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagCount {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOperation {
    #[default]
    Autotag,
    RateGeneral,
    RateAnime,
    FindReplace,
}

impl BatchOperation {
    pub fn uses_scorer(&self) -> bool {
        !matches!(self, BatchOperation::FindReplace)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchParams {
    pub threshold: Option<f32>,
    pub mode: MergeMode,
    pub custom_tag: Option<String>,
    pub tag_to_find: Option<String>,
    pub tag_to_replace: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    #[serde(default)]
    pub filenames: Vec<String>,
    #[serde(default)]
    pub operation_type: BatchOperation,
    #[serde(flatten)]
    pub params: BatchParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Completed,
    Cancelled,
}

/// Progress record shared between the batch worker and status readers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchJobState {
    pub is_running: bool,
    pub total: usize,
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub current_file: String,
    pub operation_type: Option<BatchOperation>,
    pub outcome: Option<JobOutcome>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_request_reads_flat_camel_case_body() {
        let req: BatchRequest = serde_json::from_str(
            r#"{"filenames":["a.png"],"operationType":"find_replace","tagToFind":"cat","tagToReplace":"dog"}"#,
        )
        .unwrap();
        assert_eq!(req.operation_type, BatchOperation::FindReplace);
        assert_eq!(req.params.tag_to_find.as_deref(), Some("cat"));
        assert_eq!(req.params.tag_to_replace.as_deref(), Some("dog"));
        assert_eq!(req.params.mode, MergeMode::Append);

        let req: BatchRequest =
            serde_json::from_str(r#"{"filenames":[],"threshold":0.5,"mode":"prepend"}"#).unwrap();
        assert_eq!(req.operation_type, BatchOperation::Autotag);
        assert_eq!(req.params.threshold, Some(0.5));
        assert_eq!(req.params.mode, MergeMode::Prepend);
    }

    #[test]
    fn idle_state_serializes_camel_case() {
        let json = serde_json::to_value(BatchJobState::default()).unwrap();
        assert_eq!(json["isRunning"], false);
        assert_eq!(json["currentFile"], "");
        assert!(json["outcome"].is_null());
        assert!(json["operationType"].is_null());
    }
}
