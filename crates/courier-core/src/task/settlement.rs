use crate::domain::{TaskError, TaskState};

/// TaskHandle の最終結果
///
/// `wait()` / `.await` で取り出します。キャンセルはエラーではないので
/// `Rejected` とは別の variant です。
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement<T, C = ()> {
    Resolved(T),
    Rejected(TaskError),
    Cancelled(Option<C>),
}

impl<T, C> Settlement<T, C> {
    /// `?` で扱いたい呼び出し側向け。キャンセルは `TaskError::Cancelled` になる。
    pub fn into_result(self) -> Result<T, TaskError> {
        match self {
            Settlement::Resolved(value) => Ok(value),
            Settlement::Rejected(err) => Err(err),
            Settlement::Cancelled(_) => Err(TaskError::Cancelled),
        }
    }

    pub fn state(&self) -> TaskState {
        match self {
            Settlement::Resolved(_) => TaskState::Resolved,
            Settlement::Rejected(_) => TaskState::Rejected,
            Settlement::Cancelled(_) => TaskState::Cancelled,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Settlement::Resolved(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Settlement::Rejected(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Settlement::Cancelled(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_maps_to_cancelled_error() {
        let settled: Settlement<u32, &str> = Settlement::Cancelled(Some("user"));
        assert_eq!(settled.state(), TaskState::Cancelled);
        assert_eq!(settled.into_result(), Err(TaskError::Cancelled));
    }

    #[test]
    fn resolved_maps_to_ok() {
        let settled: Settlement<u32> = Settlement::Resolved(7);
        assert!(settled.is_resolved());
        assert_eq!(settled.into_result(), Ok(7));
    }
}
