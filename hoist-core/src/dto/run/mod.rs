//! Run DTOs for inter-service communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::run::{PipelineRun, RunState, Trigger};
use crate::error::FailureKind;

/// Source-control push notification
///
/// Mirrors the fields every forge sends on a push webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEvent {
    /// Full ref that was pushed, e.g. `refs/heads/main`
    #[serde(rename = "ref")]
    pub git_ref: String,

    /// Commit the ref now points at
    pub after: String,
}

impl PushEvent {
    /// Branch name if the ref is a branch
    pub fn branch(&self) -> Option<&str> {
        self.git_ref.strip_prefix("refs/heads/")
    }

    /// Converts into a run trigger
    pub fn into_trigger(self) -> Option<Trigger> {
        let branch = self.branch()?.to_string();
        Some(Trigger::push(self.after, branch))
    }
}

/// Response to a push webhook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAck {
    /// True when the push did not start a run
    pub ignored: bool,

    /// Run started by the push
    pub run_id: Option<Uuid>,

    /// Why the push was ignored
    pub reason: Option<String>,
}

impl WebhookAck {
    pub fn started(run_id: Uuid) -> Self {
        Self {
            ignored: false,
            run_id: Some(run_id),
            reason: None,
        }
    }

    pub fn ignored(reason: impl Into<String>) -> Self {
        Self {
            ignored: true,
            run_id: None,
            reason: Some(reason.into()),
        }
    }
}

/// Run summary for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: Uuid,
    pub commit: String,
    pub branch: String,
    pub state: RunState,
    pub failure_kind: Option<FailureKind>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<&PipelineRun> for RunSummary {
    fn from(run: &PipelineRun) -> Self {
        Self {
            id: run.id,
            commit: run.trigger.commit.clone(),
            branch: run.trigger.branch.clone(),
            state: run.state,
            failure_kind: run.failure.as_ref().map(|f| f.kind),
            created_at: run.created_at,
            finished_at: run.finished_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_event_deserializes_forge_payload() {
        let json = r#"{"ref":"refs/heads/main","after":"3f2a9c1","repository":{"name":"app"}}"#;
        let event: PushEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.branch(), Some("main"));
        assert_eq!(event.after, "3f2a9c1");
    }

    #[test]
    fn test_tag_push_has_no_branch() {
        let event = PushEvent {
            git_ref: "refs/tags/v1.0".to_string(),
            after: "abc".to_string(),
        };
        assert!(event.branch().is_none());
        assert!(event.into_trigger().is_none());
    }

    #[test]
    fn test_summary_conversion() {
        let run = PipelineRun::new(Trigger::push("abc", "main"));
        let summary = RunSummary::from(&run);
        assert_eq!(summary.id, run.id);
        assert_eq!(summary.state, RunState::Triggered);
        assert!(summary.failure_kind.is_none());
    }
}
