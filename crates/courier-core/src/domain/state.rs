//! State - TaskHandle の状態

use serde::{Deserialize, Serialize};

/// TaskState は TaskHandle の状態（値を持たないビュー）
///
/// # 状態遷移
/// - Pending -> Resolved / Rejected / Cancelled
/// - Pending -> Cancelling -> Cancelled
/// - Pending -> Cancelling -> Pending（`try_to_stop_cancellation`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    Pending,
    /// abort が委譲先に転送され、まだ確定していない
    Cancelling,
    Resolved,
    Rejected,
    Cancelled,
}

impl TaskState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Resolved | TaskState::Rejected | TaskState::Cancelled
        )
    }
}
