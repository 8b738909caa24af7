//! Coordinator state machine states.

/// Where a coordinator is in its lifecycle.
///
/// `Idle → Probing → Fetching → (FallbackFetching) → Done | Failed`, with `Paused` and
/// `Canceled` reachable from any active state by explicit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Probing,
    Fetching,
    FallbackFetching,
    Done,
    Failed,
    Paused,
    Canceled,
}

impl CoordinatorState {
    /// Probing or transferring; workers or a probe may still report.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            CoordinatorState::Probing | CoordinatorState::Fetching | CoordinatorState::FallbackFetching
        )
    }
}
