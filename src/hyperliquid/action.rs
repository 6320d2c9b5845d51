use alloy::dyn_abi::TypedData;
use alloy::primitives::Address;
use serde_json::{Value, json};

use st0x_evm::ChainId;

use super::signature::SignatureParts;
use super::{FeeRate, VenueNetwork};

const SIGNING_DOMAIN_NAME: &str = "HyperliquidSignTransaction";
const SIGNING_DOMAIN_VERSION: &str = "1";

/// Authorizes `agent_address` to sign on behalf of the user under
/// `agent_name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApproveAgent {
    pub network: VenueNetwork,
    pub signature_chain_id: ChainId,
    pub agent_address: Address,
    pub agent_name: String,
    pub nonce: u64,
}

/// Approves `builder` to charge up to `max_fee_rate` on the user's orders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApproveBuilderFee {
    pub network: VenueNetwork,
    pub signature_chain_id: ChainId,
    pub max_fee_rate: FeeRate,
    pub builder: Address,
    pub nonce: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    ApproveAgent(ApproveAgent),
    ApproveBuilderFee(ApproveBuilderFee),
}

impl Action {
    pub const fn nonce(&self) -> u64 {
        match self {
            Self::ApproveAgent(action) => action.nonce,
            Self::ApproveBuilderFee(action) => action.nonce,
        }
    }

    pub const fn signature_chain_id(&self) -> ChainId {
        match self {
            Self::ApproveAgent(action) => action.signature_chain_id,
            Self::ApproveBuilderFee(action) => action.signature_chain_id,
        }
    }

    const fn primary_type(&self) -> &'static str {
        match self {
            Self::ApproveAgent(_) => "HyperliquidTransaction:ApproveAgent",
            Self::ApproveBuilderFee(_) => "HyperliquidTransaction:ApproveBuilderFee",
        }
    }

    fn fields(&self) -> Value {
        match self {
            Self::ApproveAgent(_) => json!([
                { "name": "hyperliquidChain", "type": "string" },
                { "name": "agentAddress", "type": "address" },
                { "name": "agentName", "type": "string" },
                { "name": "nonce", "type": "uint64" },
            ]),
            Self::ApproveBuilderFee(_) => json!([
                { "name": "hyperliquidChain", "type": "string" },
                { "name": "maxFeeRate", "type": "string" },
                { "name": "builder", "type": "address" },
                { "name": "nonce", "type": "uint64" },
            ]),
        }
    }

    /// Message signed by the user. Same fields as the exchange payload
    /// without the action type and signature chain.
    fn message(&self) -> Value {
        match self {
            Self::ApproveAgent(action) => json!({
                "hyperliquidChain": action.network.as_str(),
                "agentAddress": action.agent_address,
                "agentName": action.agent_name,
                "nonce": action.nonce,
            }),
            Self::ApproveBuilderFee(action) => json!({
                "hyperliquidChain": action.network.as_str(),
                "maxFeeRate": action.max_fee_rate.to_string(),
                "builder": action.builder,
                "nonce": action.nonce,
            }),
        }
    }

    /// EIP-712 payload the wallet signs to authorize this action.
    pub fn typed_data(&self) -> Result<TypedData, serde_json::Error> {
        let primary_type = self.primary_type();

        serde_json::from_value(json!({
            "types": {
                "EIP712Domain": [
                    { "name": "name", "type": "string" },
                    { "name": "version", "type": "string" },
                    { "name": "chainId", "type": "uint256" },
                    { "name": "verifyingContract", "type": "address" },
                ],
                primary_type: self.fields(),
            },
            "primaryType": primary_type,
            "domain": {
                "name": SIGNING_DOMAIN_NAME,
                "version": SIGNING_DOMAIN_VERSION,
                "chainId": format!("{:#x}", self.signature_chain_id()),
                "verifyingContract": Address::ZERO,
            },
            "message": self.message(),
        }))
    }

    /// Action object as sent to the exchange endpoint.
    pub fn payload(&self) -> Value {
        let (action_type, mut payload) = match self {
            Self::ApproveAgent(_) => ("approveAgent", self.message()),
            Self::ApproveBuilderFee(_) => ("approveBuilderFee", self.message()),
        };

        payload["type"] = json!(action_type);
        payload["signatureChainId"] = json!(format!("{:#x}", self.signature_chain_id()));
        payload
    }
}

/// An action together with the user's signature over it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedAction {
    pub action: Action,
    pub signature: SignatureParts,
}

impl SignedAction {
    /// Request body for `POST /exchange`.
    pub fn request_body(&self) -> Value {
        json!({
            "action": self.action.payload(),
            "nonce": self.action.nonce(),
            "signature": self.signature,
        })
    }
}
