use std::fmt;

use serde::{Deserialize, Serialize};

/// Status of a generation task as reported by the server.
///
/// The server vocabulary may grow; unrecognized statuses map to `Unknown`
/// instead of failing deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
    #[default]
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    /// A terminal status is one from which no further transition occurs.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A generation task snapshot.
///
/// Tasks are identified by an opaque string id. Once completed, `outputs`
/// references the produced media by id — a weak link, not a live handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationTask {
    pub id: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<TaskOutputs>,
}

/// Output descriptor of a completed task: a single media id or a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutputs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<Vec<TaskOutput>>,
}

/// One entry of a batched task output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_id: Option<String>,
}

/// Media kind accepted by the upload pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
        })
    }
}

/// A (variant, URL) pair on a media record, e.g. the `public` variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaUrl {
    pub variant: String,
    pub url: String,
}

/// A stored media item, created by upload registration or referenced from
/// a completed task's outputs. Immutable from the client's perspective.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRecord {
    pub id: String,
    #[serde(default)]
    pub urls: Vec<MediaUrl>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaType>,
}

impl MediaRecord {
    /// Look up the URL tagged as the `public` variant. Pure lookup.
    pub fn public_url(&self) -> Option<&str> {
        self.urls
            .iter()
            .find(|u| u.variant == "public")
            .map(|u| u.url.as_str())
    }
}

/// Media resolved from a task's outputs: one record or an ordered batch.
#[derive(Debug, Clone)]
pub enum TaskMedia {
    Single(MediaRecord),
    Batch(Vec<MediaRecord>),
}

/// One event pushed over the personal-event subscription.
///
/// The feed is a tagged union of event kinds; `task_updated` is the only
/// kind this client consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalEventEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_updated: Option<GenerationTask>,
}

/// Wire shape of one `subscribePersonalEvents` payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PersonalEventsData {
    #[serde(default)]
    pub personal_events: Option<PersonalEventEnvelope>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_roundtrip() {
        let status: TaskStatus = serde_json::from_value(json!("completed")).unwrap();
        assert_eq!(status, TaskStatus::Completed);
        assert!(status.is_terminal());
        assert_eq!(serde_json::to_value(status).unwrap(), json!("completed"));
    }

    #[test]
    fn test_unrecognized_status_maps_to_unknown() {
        let status: TaskStatus = serde_json::from_value(json!("warming-up")).unwrap();
        assert_eq!(status, TaskStatus::Unknown);
        assert!(!status.is_terminal());
    }

    #[test]
    fn test_parse_task_with_single_output() {
        let task: GenerationTask = serde_json::from_value(json!({
            "id": "123",
            "status": "completed",
            "outputs": {"mediaId": "m-1"}
        }))
        .unwrap();
        assert_eq!(task.id, "123");
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.outputs.unwrap().media_id.as_deref(), Some("m-1"));
    }

    #[test]
    fn test_parse_task_with_batch_output() {
        let task: GenerationTask = serde_json::from_value(json!({
            "id": "123",
            "status": "completed",
            "outputs": {"batch": [{"mediaId": "m-1"}, {"mediaId": "m-2"}]}
        }))
        .unwrap();
        let batch = task.outputs.unwrap().batch.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].media_id.as_deref(), Some("m-1"));
        assert_eq!(batch[1].media_id.as_deref(), Some("m-2"));
    }

    #[test]
    fn test_public_url_lookup() {
        let media = MediaRecord {
            id: "m-1".into(),
            urls: vec![
                MediaUrl {
                    variant: "thumbnail".into(),
                    url: "https://cdn.example/thumb.png".into(),
                },
                MediaUrl {
                    variant: "public".into(),
                    url: "https://cdn.example/full.png".into(),
                },
            ],
            media_type: Some(MediaType::Image),
        };
        // Pure lookup: same answer on repeated calls.
        assert_eq!(media.public_url(), Some("https://cdn.example/full.png"));
        assert_eq!(media.public_url(), Some("https://cdn.example/full.png"));
    }

    #[test]
    fn test_public_url_missing() {
        let media = MediaRecord {
            id: "m-1".into(),
            urls: vec![],
            media_type: None,
        };
        assert_eq!(media.public_url(), None);
    }

    #[test]
    fn test_parse_personal_event() {
        let data: PersonalEventsData = serde_json::from_value(json!({
            "personalEvents": {
                "taskUpdated": {"id": "t-9", "status": "running"}
            }
        }))
        .unwrap();
        let task = data.personal_events.unwrap().task_updated.unwrap();
        assert_eq!(task.id, "t-9");
        assert_eq!(task.status, TaskStatus::Running);
    }

    #[test]
    fn test_parse_personal_event_other_kind() {
        // Event kinds this client does not consume parse to an empty envelope.
        let data: PersonalEventsData = serde_json::from_value(json!({
            "personalEvents": {"creditUpdated": {"amount": 5}}
        }))
        .unwrap();
        assert!(data.personal_events.unwrap().task_updated.is_none());
    }
}
