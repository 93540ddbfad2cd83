//! Legal status transitions for a single upload.
//!
//! Every status change on an [`UploadItem`](crate::core::queue::UploadItem)
//! goes through [`Transition::target`]. A `None` result means the request is
//! not applicable to the current status and must be treated as a no-op.

use serde::Serialize;
use uplift_core::core::events::UploadStatus;

pub const CANCELLED_MESSAGE: &str = "cancelled by user";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    Start,
    Pause,
    Resume,
    Complete,
    Fail,
    Retry,
    Cancel,
}

impl Transition {
    pub fn target(self, from: UploadStatus) -> Option<UploadStatus> {
        use UploadStatus::*;

        match (self, from) {
            (Transition::Start, Pending) => Some(Transferring),
            (Transition::Pause, Transferring) => Some(Paused),
            (Transition::Resume, Paused) => Some(Transferring),
            (Transition::Complete, Transferring) => Some(Completed),
            (Transition::Fail, Transferring) => Some(Failed),
            (Transition::Retry, Failed) => Some(Pending),
            (Transition::Cancel, Pending | Transferring | Paused) => Some(Cancelled),
            _ => None,
        }
    }

    pub fn is_allowed(self, from: UploadStatus) -> bool {
        self.target(from).is_some()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Transition::Start => "start",
            Transition::Pause => "pause",
            Transition::Resume => "resume",
            Transition::Complete => "complete",
            Transition::Fail => "fail",
            Transition::Retry => "retry",
            Transition::Cancel => "cancel",
        }
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a per-record user action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ActionOutcome {
    Applied,
    /// Resume accepted while every slot is busy; the item is admitted first
    /// when a slot frees.
    Deferred,
    Ignored {
        status: UploadStatus,
        action: Transition,
    },
}

impl ActionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ActionOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use UploadStatus::*;

    const ACTIONS: [Transition; 7] = [
        Transition::Start,
        Transition::Pause,
        Transition::Resume,
        Transition::Complete,
        Transition::Fail,
        Transition::Retry,
        Transition::Cancel,
    ];

    #[test]
    fn pending_only_starts_or_cancels() {
        assert_eq!(Transition::Start.target(Pending), Some(Transferring));
        assert_eq!(Transition::Cancel.target(Pending), Some(Cancelled));
        assert_eq!(Transition::Pause.target(Pending), None);
        assert_eq!(Transition::Retry.target(Pending), None);
    }

    #[test]
    fn transferring_resolves_to_terminal_states() {
        assert_eq!(Transition::Complete.target(Transferring), Some(Completed));
        assert_eq!(Transition::Fail.target(Transferring), Some(Failed));
        assert_eq!(Transition::Pause.target(Transferring), Some(Paused));
        assert_eq!(Transition::Cancel.target(Transferring), Some(Cancelled));
    }

    #[test]
    fn paused_resumes_into_transferring() {
        assert_eq!(Transition::Resume.target(Paused), Some(Transferring));
        assert_eq!(Transition::Complete.target(Paused), None);
    }

    #[test]
    fn failed_is_reentered_only_by_retry() {
        assert_eq!(Transition::Retry.target(Failed), Some(Pending));
        for action in ACTIONS.iter().filter(|a| **a != Transition::Retry) {
            assert!(!action.is_allowed(Failed), "{} allowed on failed", action);
        }
    }

    #[test]
    fn cancelled_and_completed_accept_nothing() {
        for action in ACTIONS {
            assert!(!action.is_allowed(Cancelled), "{} allowed on cancelled", action);
            assert!(!action.is_allowed(Completed), "{} allowed on completed", action);
        }
    }
}
