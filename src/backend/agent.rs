use alloy::primitives::Address;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use super::client::BackendClient;
use super::{AgentWalletApi, BackendError};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgentWalletResponse {
    exists: bool,
    agent_wallet_address: Option<Address>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedAgentWallet {
    agent_wallet_address: Address,
}

#[async_trait]
impl AgentWalletApi for BackendClient {
    async fn agent_wallet(&self, address: Address) -> Result<Option<Address>, BackendError> {
        let Some(response) = self
            .get_optional(&format!("/agent-wallet?address={address}"))
            .await?
        else {
            return Ok(None);
        };
        let record: AgentWalletResponse = response.json().await?;

        Ok(record
            .agent_wallet_address
            .filter(|_| record.exists))
    }

    async fn create_agent_wallet(&self, address: Address) -> Result<Address, BackendError> {
        let response = self
            .post("/agent-wallet", &serde_json::json!({ "address": address }))
            .await?;
        let created: CreatedAgentWallet = response.json().await?;

        info!(%address, agent = %created.agent_wallet_address, "Delegated signer created");

        Ok(created.agent_wallet_address)
    }
}
