use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::models::restoration::RestorationModel;

/// Lifecycle phase of a restoration task.
///
/// Phases advance in declaration order. `Failed` is reachable from every
/// non-terminal phase; `Finished` and `Failed` accept no further transitions.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Scheduled,
    Processing,
    Uploading,
    Finished,
    Failed,
}

impl TaskStatus {
    /// Position in the forward-only order. `Failed` sits outside the chain.
    fn rank(self) -> Option<u8> {
        match self {
            TaskStatus::Pending => Some(0),
            TaskStatus::Scheduled => Some(1),
            TaskStatus::Processing => Some(2),
            TaskStatus::Uploading => Some(3),
            TaskStatus::Finished => Some(4),
            TaskStatus::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Finished | TaskStatus::Failed)
    }

    /// Whether a task in `self` may move to `next`.
    ///
    /// `Scheduled` may be skipped (`Pending -> Processing`); no other phase
    /// may be skipped and nothing may regress.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == TaskStatus::Failed {
            return true;
        }
        match (self.rank(), next.rank()) {
            (Some(from), Some(to)) => {
                to == from + 1 || (self == TaskStatus::Pending && next == TaskStatus::Processing)
            }
            _ => false,
        }
    }
}

/// Storage tier that ended up holding a blob.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Backend {
    Remote,
    Local,
}

/// A submitted restoration job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: i64,
    pub status: TaskStatus,
    pub source: String,
    pub output: String,
    pub model: RestorationModel,
    /// Backend holding the output; unset until output storage succeeds.
    pub uploaded_to: Option<Backend>,
    pub source_uploaded_to: Option<Backend>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_chain() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Scheduled));
        assert!(TaskStatus::Scheduled.can_transition_to(TaskStatus::Processing));
        assert!(TaskStatus::Processing.can_transition_to(TaskStatus::Uploading));
        assert!(TaskStatus::Uploading.can_transition_to(TaskStatus::Finished));
    }

    #[test]
    fn test_scheduled_may_be_folded() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Processing));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Uploading));
        assert!(!TaskStatus::Processing.can_transition_to(TaskStatus::Finished));
    }

    #[test]
    fn test_no_regression() {
        assert!(!TaskStatus::Uploading.can_transition_to(TaskStatus::Processing));
        assert!(!TaskStatus::Processing.can_transition_to(TaskStatus::Processing));
        assert!(!TaskStatus::Scheduled.can_transition_to(TaskStatus::Pending));
    }

    #[test]
    fn test_failed_from_any_live_phase() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Scheduled,
            TaskStatus::Processing,
            TaskStatus::Uploading,
        ] {
            assert!(status.can_transition_to(TaskStatus::Failed), "{status}");
        }
        assert!(!TaskStatus::Finished.can_transition_to(TaskStatus::Failed));
        assert!(!TaskStatus::Failed.can_transition_to(TaskStatus::Finished));
    }

    #[test]
    fn test_status_string_form() {
        assert_eq!(TaskStatus::Uploading.as_ref(), "uploading");
        assert_eq!("finished".parse::<TaskStatus>().unwrap(), TaskStatus::Finished);
        assert_eq!(
            serde_json::to_string(&Backend::Remote).unwrap(),
            "\"remote\""
        );
    }
}
