use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("choose_arm called while round {0} is still pending")]
    ChooseWhilePending(u64),
    #[error("notify_outcome called without a pending round")]
    NotifyWithoutPending,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("{kind} index {index} out of range (expected < {bound})")]
    OutOfRangeIndex {
        kind: &'static str,
        index: usize,
        bound: usize,
    },
    #[error("Protocol violation: {0}")]
    ProtocolViolation(#[from] ProtocolViolation),
    #[error("Statistic undefined for user {user} on arm {arm}: no picks recorded")]
    UndefinedStatistic { user: usize, arm: usize },
    #[error("Reward {0} is not finite")]
    NonFiniteReward(f64),
    #[error("No active arms to choose from")]
    NoArmsAvailable,
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl PolicyError {
    pub(crate) fn user_out_of_range(index: usize, bound: usize) -> Self {
        Self::OutOfRangeIndex {
            kind: "User",
            index,
            bound,
        }
    }

    pub(crate) fn arm_out_of_range(index: usize, bound: usize) -> Self {
        Self::OutOfRangeIndex {
            kind: "Arm",
            index,
            bound,
        }
    }
}
