use alloy::primitives::{TxHash, U256};
use serde::Serialize;
use uuid::Uuid;

use st0x_bridge::ExecutionStatus;

use crate::retry::RetryNotice;

/// Progress of a deposit, broadcast to subscribers of
/// [`super::DepositExecutor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DepositEvent {
    QuoteReady {
        quote_id: Uuid,
        direct: bool,
        legs: Vec<String>,
    },
    RateLimited(RetryNotice),
    RateUpdate {
        leg: usize,
        quoted: U256,
        updated: U256,
        accepted: bool,
    },
    LegStatusChanged {
        leg: usize,
        status: LegStatus,
        /// Bridge-reported reason when the leg failed.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    ActiveLegChanged {
        leg: usize,
    },
    RouteCompleted {
        settled: U256,
    },
    /// The custody transfer on the destination chain, which follows any
    /// bridge legs.
    DepositLegChanged {
        status: LegStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    DepositSubmitted {
        tx_hash: TxHash,
    },
    DepositConfirmed {
        tx_hash: TxHash,
    },
    Completed {
        flow_id: Uuid,
        tx_hash: TxHash,
    },
    Failed {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LegStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl From<ExecutionStatus> for LegStatus {
    fn from(status: ExecutionStatus) -> Self {
        match status {
            ExecutionStatus::NotStarted => Self::Pending,
            ExecutionStatus::Pending => Self::InProgress,
            ExecutionStatus::Done => Self::Completed,
            ExecutionStatus::Failed => Self::Failed,
        }
    }
}
