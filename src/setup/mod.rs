//! Venue account setup workflow.
//!
//! Five strictly ordered steps take a wallet from signed out to a managed
//! trading account. Nothing is persisted: every run re-derives progress by
//! asking the backend and the venue, so an interrupted setup resumes by
//! simply starting again.

mod checker;
mod orchestrator;
mod step;

use alloy::primitives::Address;

use st0x_evm::ChainId;

use crate::hyperliquid::{FeeRate, VenueNetwork};

pub use checker::{
    CheckError, DelegateConflict, DelegatedSigner, SetupFacts, StepChecker, StepCompletion,
    account_completion, agent_wallet_completion, auth_completion, delegate_completion,
    fee_policy_completion,
};
pub use orchestrator::{SetupOrchestrator, StepError};
pub use step::{StepRecord, StepStatus, StepTable, WorkflowStep};

/// Venue parameters the setup steps sign and check against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupSettings {
    pub network: VenueNetwork,
    /// Chain venue approvals are signed on by default.
    pub signature_chain_id: ChainId,
    /// Chains the venue accepts approval signatures from.
    pub supported_signature_chains: Vec<ChainId>,
    pub agent_name: String,
    pub builder: Address,
    pub max_fee_rate: FeeRate,
}

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("{step} failed: {source}")]
    Step {
        step: WorkflowStep,
        #[source]
        source: StepError,
    },
    #[error("{step} cannot run before {blocked_by} is complete")]
    OutOfOrder {
        step: WorkflowStep,
        blocked_by: WorkflowStep,
    },
}
