//! Lifecycle status of a download record.

use serde::{Deserialize, Serialize};

/// High-level download state, stored lowercase in the JSON record file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Waiting,
    Downloading,
    Merging,
    Paused,
    Completed,
    Failed,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Waiting => "waiting",
            Status::Downloading => "downloading",
            Status::Merging => "merging",
            Status::Paused => "paused",
            Status::Completed => "completed",
            Status::Failed => "failed",
        }
    }

    pub fn can_pause(self) -> bool {
        self == Status::Downloading
    }

    pub fn can_resume(self) -> bool {
        matches!(self, Status::Paused | Status::Failed)
    }

    pub fn can_cancel(self) -> bool {
        matches!(self, Status::Waiting | Status::Downloading | Status::Paused)
    }

    /// True while a coordinator or merge may still be producing events for the record.
    pub fn is_active(self) -> bool {
        matches!(self, Status::Downloading | Status::Merging)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legality_predicates() {
        use Status::*;
        let all = [Waiting, Downloading, Merging, Paused, Completed, Failed];
        let pausable: Vec<_> = all.iter().filter(|s| s.can_pause()).collect();
        assert_eq!(pausable, vec![&Downloading]);
        let resumable: Vec<_> = all.iter().filter(|s| s.can_resume()).collect();
        assert_eq!(resumable, vec![&Paused, &Failed]);
        let cancelable: Vec<_> = all.iter().filter(|s| s.can_cancel()).collect();
        assert_eq!(cancelable, vec![&Waiting, &Downloading, &Paused]);
    }

    #[test]
    fn serde_lowercase() {
        assert_eq!(serde_json::to_string(&Status::Merging).unwrap(), "\"merging\"");
        let s: Status = serde_json::from_str("\"paused\"").unwrap();
        assert_eq!(s, Status::Paused);
        assert_eq!(Status::Failed.to_string(), "failed");
    }
}
