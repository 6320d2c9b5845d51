use std::time::Duration;

use alloy::primitives::U256;
use rust_decimal::Decimal;
use uuid::Uuid;

use st0x_bridge::{Asset, FeeCost, Route};
use st0x_evm::ChainId;

use super::{DepositError, DepositRequest, DepositSettings};
use crate::usdc::{format_units, to_base_units};

pub const DIRECT_TAG: &str = "DIRECT";

#[derive(Debug, Clone, PartialEq)]
pub enum QuoteKind {
    /// Funds already are the settlement token on the custody chain.
    Direct,
    Bridged(Route),
}

/// One leg of a bridged quote, as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegDescriptor {
    pub tool: String,
    pub from_chain: ChainId,
    pub to_chain: ChainId,
    pub estimated_duration: Duration,
}

impl LegDescriptor {
    pub fn label(&self) -> String {
        format!("{}: {} -> {}", self.tool, self.from_chain, self.to_chain)
    }
}

/// Priced deposit, bound to the request it was priced for.
#[derive(Debug, Clone, PartialEq)]
pub struct DepositQuote {
    pub id: Uuid,
    pub kind: QuoteKind,
    pub source: Asset,
    pub destination: Asset,
    /// Requested amount of the source token, in whole units.
    pub amount: Decimal,
    pub from_amount: U256,
    pub to_amount: U256,
    pub to_amount_min: U256,
    pub from_amount_formatted: String,
    pub to_amount_formatted: String,
    pub fees: Vec<FeeCost>,
    pub legs: Vec<LegDescriptor>,
    pub estimated_duration: Duration,
    pub tags: Vec<String>,
}

impl DepositQuote {
    /// Synthesizes a fee-free, instant quote for funds that need no bridging.
    pub(super) fn direct(
        request: &DepositRequest,
        settings: &DepositSettings,
    ) -> Result<Self, DepositError> {
        let units = to_base_units(request.amount, settings.destination_decimals)?;
        let formatted = format_units(units, settings.destination_decimals);

        Ok(Self {
            id: Uuid::new_v4(),
            kind: QuoteKind::Direct,
            source: request.source.asset(),
            destination: settings.destination,
            amount: request.amount,
            from_amount: units,
            to_amount: units,
            to_amount_min: units,
            from_amount_formatted: formatted.clone(),
            to_amount_formatted: formatted,
            fees: vec![],
            legs: vec![],
            estimated_duration: Duration::ZERO,
            tags: vec![DIRECT_TAG.to_string()],
        })
    }

    pub(super) fn bridged(
        request: &DepositRequest,
        settings: &DepositSettings,
        route: Route,
    ) -> Self {
        let legs = route
            .steps
            .iter()
            .map(|step| LegDescriptor {
                tool: step.tool.clone(),
                from_chain: step.from.chain_id,
                to_chain: step.to.chain_id,
                estimated_duration: step.estimated_duration,
            })
            .collect();

        Self {
            id: Uuid::new_v4(),
            source: request.source.asset(),
            destination: settings.destination,
            amount: request.amount,
            from_amount: route.from_amount,
            to_amount: route.to_amount,
            to_amount_min: route.to_amount_min,
            from_amount_formatted: format_units(route.from_amount, request.source.decimals),
            to_amount_formatted: format_units(route.to_amount, settings.destination_decimals),
            fees: route.fees().cloned().collect(),
            legs,
            estimated_duration: route.estimated_duration(),
            tags: route.tags.clone(),
            kind: QuoteKind::Bridged(route),
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self.kind, QuoteKind::Direct)
    }

    pub fn route(&self) -> Option<&Route> {
        match &self.kind {
            QuoteKind::Direct => None,
            QuoteKind::Bridged(route) => Some(route),
        }
    }

    /// Whether this quote was priced for `request`. Any change of chain,
    /// token or amount invalidates it.
    pub fn matches(&self, request: &DepositRequest) -> bool {
        self.source == request.source.asset() && self.amount == request.amount
    }

    pub fn leg_labels(&self) -> Vec<String> {
        self.legs.iter().map(LegDescriptor::label).collect()
    }
}
