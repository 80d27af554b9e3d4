//! Types used by the download state store.

/// Download identifier.
pub type DownloadId = i64;

/// Lifecycle status of a download, stored as a string in the database.
///
/// Transitions are strictly forward: `pending -> downloading -> {success, failed}`.
/// `success` and `failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    Pending,
    Downloading,
    Success,
    Failed,
}

impl DownloadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DownloadStatus::Pending => "pending",
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Success => "success",
            DownloadStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "pending" => DownloadStatus::Pending,
            "downloading" => DownloadStatus::Downloading,
            "success" => DownloadStatus::Success,
            "failed" => DownloadStatus::Failed,
            _ => DownloadStatus::Failed,
        }
    }

    /// True for states with no outgoing transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, DownloadStatus::Success | DownloadStatus::Failed)
    }

    /// Whether moving from `self` to `next` is a legal lifecycle transition.
    pub fn can_transition_to(self, next: DownloadStatus) -> bool {
        matches!(
            (self, next),
            (DownloadStatus::Pending, DownloadStatus::Downloading)
                | (DownloadStatus::Downloading, DownloadStatus::Success)
                | (DownloadStatus::Downloading, DownloadStatus::Failed)
        )
    }
}

/// Rejected status change (e.g. an attempt to leave a terminal state).
#[derive(Debug, thiserror::Error)]
#[error("illegal status transition for download {id}: {from:?} -> {to:?}")]
pub struct TransitionError {
    pub id: DownloadId,
    pub from: DownloadStatus,
    pub to: DownloadStatus,
}

/// One download request row. `fingerprint` is the dedup key: the store
/// enforces uniqueness per (hoster_id, fingerprint).
#[derive(Debug, Clone)]
pub struct DownloadRow {
    pub id: DownloadId,
    pub hoster_id: String,
    pub url: String,
    pub fingerprint: String,
    pub priority: i64,
    pub status: DownloadStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A hoster as seen by the scheduler: identity, concurrency ceiling, and the
/// externally-managed eligibility flag. Admin mutation happens outside the core.
#[derive(Debug, Clone)]
pub struct Hoster {
    pub id: String,
    pub name: String,
    pub max_concurrency: usize,
    pub active: bool,
}

/// Per-hoster rolling volume caps. A `None` period has no cap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HosterLimits {
    pub hourly: Option<i64>,
    pub daily: Option<i64>,
    pub monthly: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_string_roundtrip() {
        for s in [
            DownloadStatus::Pending,
            DownloadStatus::Downloading,
            DownloadStatus::Success,
            DownloadStatus::Failed,
        ] {
            assert_eq!(DownloadStatus::from_str(s.as_str()), s);
        }
    }

    #[test]
    fn forward_transitions_only() {
        use DownloadStatus::*;
        assert!(Pending.can_transition_to(Downloading));
        assert!(Downloading.can_transition_to(Success));
        assert!(Downloading.can_transition_to(Failed));

        // Nothing re-enters pending, nothing leaves a terminal state.
        for from in [Success, Failed] {
            for to in [Pending, Downloading, Success, Failed] {
                assert!(!from.can_transition_to(to));
            }
        }
        assert!(!Pending.can_transition_to(Success));
        assert!(!Pending.can_transition_to(Failed));
        assert!(!Downloading.can_transition_to(Pending));
    }

    #[test]
    fn terminal_states() {
        assert!(DownloadStatus::Success.is_terminal());
        assert!(DownloadStatus::Failed.is_terminal());
        assert!(!DownloadStatus::Pending.is_terminal());
        assert!(!DownloadStatus::Downloading.is_terminal());
    }
}
