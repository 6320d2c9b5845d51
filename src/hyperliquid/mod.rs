//! Hyperliquid venue API: read-only `/info` queries and signed `/exchange`
//! actions.
//!
//! Actions are authorized by an EIP-712 signature from the user's wallet
//! over a `HyperliquidTransaction:*` typed message. The signature chain is
//! only part of the signing domain; the action itself always settles on the
//! venue network named by [`VenueNetwork`].

mod action;
mod client;
mod signature;

use std::fmt::Display;
use std::str::FromStr;

use alloy::primitives::Address;
use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

pub use action::{Action, ApproveAgent, ApproveBuilderFee, SignedAction};
pub use client::HyperliquidClient;
pub use signature::SignatureParts;

pub const MAINNET_API_URL: &str = "https://api.hyperliquid.xyz";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VenueNetwork {
    Mainnet,
    Testnet,
}

impl VenueNetwork {
    /// Value of the `hyperliquidChain` field in signed actions.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mainnet => "Mainnet",
            Self::Testnet => "Testnet",
        }
    }
}

/// Builder fee rate in tenths of a basis point, the unit the venue reports
/// approvals in. `0.1%` is `100`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeeRate(pub u64);

/// Tenths of a basis point per percent.
const UNITS_PER_PERCENT: u64 = 1_000;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid fee rate {input:?}, expected a percentage such as \"0.1%\"")]
pub struct InvalidFeeRate {
    input: String,
}

impl FromStr for FeeRate {
    type Err = InvalidFeeRate;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidFeeRate {
            input: input.to_string(),
        };

        let percent = input.trim().strip_suffix('%').ok_or_else(invalid)?;
        let percent = Decimal::from_str(percent.trim()).map_err(|_| invalid())?;
        let units = percent * Decimal::from(UNITS_PER_PERCENT);

        if units.is_sign_negative() || units.fract() != Decimal::ZERO {
            return Err(invalid());
        }

        units.to_u64().map(Self).ok_or_else(invalid)
    }
}

impl Display for FeeRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let percent = Decimal::from(self.0) / Decimal::from(UNITS_PER_PERCENT);
        write!(f, "{}%", percent.normalize())
    }
}

/// A delegated signer authorized for a user on the venue.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtraAgent {
    pub name: String,
    pub address: Address,
    pub valid_until: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum VenueError {
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error("API error (status {status}): {message}")]
    ApiError { status: StatusCode, message: String },
    #[error("venue rejected action: {message}")]
    Rejected { message: String },
}

#[async_trait]
pub trait VenueApi: Send + Sync {
    /// Delegated signers currently authorized for `user`.
    async fn extra_agents(&self, user: Address) -> Result<Vec<ExtraAgent>, VenueError>;

    /// Highest builder fee `user` has approved for `builder`.
    async fn max_builder_fee(&self, user: Address, builder: Address)
    -> Result<FeeRate, VenueError>;

    /// Submits a signed action to the exchange endpoint.
    async fn submit(&self, action: &SignedAction) -> Result<(), VenueError>;
}
