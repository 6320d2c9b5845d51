//! Cross-chain deposit into the venue's custody contract.
//!
//! A deposit is quoted first and then executed. Funds already held as the
//! settlement token on the destination chain get a locally synthesized
//! direct quote; anything else is priced as a bridge route. Execution runs
//! the route leg by leg, then transfers the settled amount to the custody
//! contract and waits for the transfer to confirm.

mod custody;
mod event;
mod executor;
mod progress;
mod quote;

use alloy::primitives::{Address, TxHash, U256};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use st0x_bridge::{Asset, BridgeError};
use st0x_evm::{ChainId, EvmError};

use crate::usdc::{AmountError, Usdc};

pub use custody::check_minimum;
pub use event::{DepositEvent, LegStatus};
pub use executor::DepositExecutor;
pub use quote::{DIRECT_TAG, DepositQuote, LegDescriptor, QuoteKind};

/// Token the user pays the deposit with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FundingSource {
    pub chain_id: ChainId,
    pub token: Address,
    pub decimals: u8,
}

impl FundingSource {
    pub const fn asset(&self) -> Asset {
        Asset::new(self.chain_id, self.token)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositRequest {
    pub source: FundingSource,
    /// Amount of the source token, in whole units.
    pub amount: Decimal,
}

/// Where deposits end up and the rules they are held to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositSettings {
    /// Settlement token on the custody chain.
    pub destination: Asset,
    pub destination_decimals: u8,
    pub custody_contract: Address,
    /// Smallest amount the custody contract credits.
    pub minimum: Usdc,
    /// Slippage tolerated when pricing routes and accepting rate updates.
    pub slippage_bps: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepositOutcome {
    pub flow_id: Uuid,
    pub deposit_tx: TxHash,
    pub bridge_txs: Vec<TxHash>,
    /// Settlement token amount transferred to custody, in base units.
    pub amount: U256,
}

#[derive(Debug, thiserror::Error)]
pub enum DepositError {
    #[error("deposit amount must be greater than zero, got {amount}")]
    InvalidAmount { amount: Decimal },
    #[error(transparent)]
    Amount(#[from] AmountError),
    #[error("no route found from chain {from_chain} to chain {to_chain}")]
    NoRoutes {
        from_chain: ChainId,
        to_chain: ChainId,
    },
    #[error("failed to fetch quote: {0}")]
    Quote(#[source] BridgeError),
    #[error("quote does not match the requested deposit, request a new quote")]
    StaleQuote,
    #[error("bridge leg {} failed: {message}", .leg + 1)]
    Bridge { leg: usize, message: String },
    #[error("failed to switch to the deposit chain: {0}")]
    Chain(#[source] EvmError),
    #[error(
        "deposit of {amount} USDC is below the minimum of {minimum} USDC; \
         amounts below the minimum sent to the bridge contract are lost forever"
    )]
    BelowMinimum { amount: Usdc, minimum: Usdc },
    #[error("failed to read balance: {0}")]
    Balance(#[source] EvmError),
    #[error("insufficient balance: wallet holds {held} but the deposit requires {required}")]
    InsufficientBalance { held: Decimal, required: Decimal },
    #[error("failed to submit deposit transfer: {0}")]
    Submission(#[source] EvmError),
    #[error("deposit transfer {tx_hash} was not confirmed: {source}")]
    ConfirmationFailed {
        tx_hash: TxHash,
        #[source]
        source: EvmError,
    },
    #[error("deposit transfer {tx_hash} reverted")]
    Reverted { tx_hash: TxHash },
}

impl DepositError {
    /// Whether the failure belongs to the custody transfer rather than to
    /// quoting or bridging.
    pub fn is_custody_failure(&self) -> bool {
        matches!(
            self,
            Self::Chain(_)
                | Self::BelowMinimum { .. }
                | Self::Balance(_)
                | Self::InsufficientBalance { .. }
                | Self::Submission(_)
                | Self::ConfirmationFailed { .. }
                | Self::Reverted { .. }
        )
    }
}
