//! Route-based bridge abstraction for cross-chain token transfers.
//!
//! A [`Bridge`] prices a transfer between two assets as a [`Route`] made of
//! one or more legs ([`RouteStep`]) and executes that route leg by leg.
//! Execution is driven through [`ExecutionHooks`], which give the engine a
//! wallet scoped to the active chain, perform chain switches on its behalf,
//! and receive the updated route after every status change.
//!
//! The default build ships only the trait and shared domain types. Enable
//! the `lifi` feature for the LI.FI aggregator implementation.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, TxHash, U256};
use async_trait::async_trait;

use st0x_evm::{ChainId, EvmError, Wallet};

#[cfg(feature = "lifi")]
pub mod lifi;

/// Token address aggregators use for a chain's native gas token.
pub const NATIVE_TOKEN: Address = Address::ZERO;

/// A token on a specific chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Asset {
    pub chain_id: ChainId,
    pub token: Address,
}

impl Asset {
    pub const fn new(chain_id: ChainId, token: Address) -> Self {
        Self { chain_id, token }
    }

    pub fn is_native(&self) -> bool {
        self.token == NATIVE_TOKEN
    }
}

/// Parameters for pricing a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub from: Asset,
    pub to: Asset,
    /// Amount in the source token's smallest unit.
    pub from_amount: U256,
    pub from_address: Address,
    pub to_address: Address,
    /// Maximum accepted slippage in basis points.
    pub slippage_bps: u32,
}

/// A single fee charged by a leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeCost {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub amount: U256,
    pub amount_usd: Option<String>,
    /// Whether the fee is already deducted from the output amount.
    pub included: bool,
}

/// Execution status of a leg as reported by the bridge engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionStatus {
    #[default]
    NotStarted,
    Pending,
    Done,
    Failed,
}

/// Mutable execution state of a leg.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StepExecution {
    pub status: ExecutionStatus,
    pub tx_hash: Option<TxHash>,
    /// Amount actually delivered on the destination side of the leg.
    pub received_amount: Option<U256>,
    pub message: Option<String>,
}

/// One leg of a route.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteStep {
    pub id: String,
    /// Bridge or exchange that executes this leg.
    pub tool: String,
    pub from: Asset,
    pub to: Asset,
    pub from_amount: U256,
    pub to_amount: U256,
    pub to_amount_min: U256,
    /// Spender that needs an ERC-20 allowance before the leg can run.
    pub approval_address: Option<Address>,
    pub estimated_duration: Duration,
    pub fees: Vec<FeeCost>,
    pub execution: StepExecution,
    /// Provider payload for the leg, sent back when preparing its
    /// transaction.
    pub raw: serde_json::Value,
}

/// A priced path from one asset to another.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub id: String,
    pub from: Asset,
    pub to: Asset,
    pub from_amount: U256,
    pub to_amount: U256,
    pub to_amount_min: U256,
    pub steps: Vec<RouteStep>,
    pub tags: Vec<String>,
}

impl Route {
    pub fn estimated_duration(&self) -> Duration {
        self.steps.iter().map(|step| step.estimated_duration).sum()
    }

    pub fn fees(&self) -> impl Iterator<Item = &FeeCost> {
        self.steps.iter().flat_map(|step| step.fees.iter())
    }

    /// Output of the route: what the final leg delivered once it is done,
    /// the quoted output otherwise.
    pub fn settled_amount(&self) -> U256 {
        self.steps
            .last()
            .and_then(|step| step.execution.received_amount)
            .unwrap_or(self.to_amount)
    }

    pub fn failed_step(&self) -> Option<(usize, &RouteStep)> {
        self.steps
            .iter()
            .enumerate()
            .find(|(_, step)| step.execution.status == ExecutionStatus::Failed)
    }

    pub fn tx_hashes(&self) -> Vec<TxHash> {
        self.steps
            .iter()
            .filter_map(|step| step.execution.tx_hash)
            .collect()
    }
}

/// Callbacks the bridge engine uses while executing a route.
#[async_trait]
pub trait ExecutionHooks: Send + Sync {
    /// Wallet scoped to whatever chain is currently active.
    async fn wallet(&self) -> Result<Arc<dyn Wallet>, EvmError>;

    /// Switches to `chain_id` and returns a wallet scoped to it.
    async fn switch_chain(&self, chain_id: ChainId) -> Result<Arc<dyn Wallet>, EvmError>;

    /// Receives the route after every status change.
    fn on_progress(&self, route: &Route);

    /// Asked when a leg's refreshed output is lower than quoted. Returning
    /// `false` aborts the leg.
    async fn confirm_rate_update(&self, quoted: U256, updated: U256) -> bool;
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[cfg(feature = "lifi")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("invalid bridge response: {reason}")]
    InvalidResponse { reason: String },
    #[error("wallet error: {0}")]
    Wallet(#[from] EvmError),
    /// `step` is the zero-based leg index; messages number legs from one.
    #[error("leg {} failed: {message}", .step + 1)]
    StepFailed { step: usize, message: String },
    #[error("rate update declined for leg {}: quoted {quoted}, now {updated}", .step + 1)]
    RateUpdateDeclined {
        step: usize,
        quoted: U256,
        updated: U256,
    },
    #[error("leg {} status unknown after {attempts} polls", .step + 1)]
    StatusTimeout { step: usize, attempts: usize },
}

/// Prices and executes cross-chain routes.
#[async_trait]
pub trait Bridge: Send + Sync + 'static {
    /// Returns the recommended route, or `None` when no route exists.
    async fn quote(&self, request: &QuoteRequest) -> Result<Option<Route>, BridgeError>;

    /// Executes every leg of `route` in order and returns the route with
    /// its final execution state.
    async fn execute_route(
        &self,
        route: Route,
        hooks: &dyn ExecutionHooks,
    ) -> Result<Route, BridgeError>;
}
