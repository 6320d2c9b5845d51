use alloy::primitives::Address;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::client::BackendClient;
use super::{BackendError, ManagedAccountApi};

/// Trading account operated on the user's behalf, keyed by wallet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedAccount {
    pub id: String,
    pub wallet_address: Address,
    pub policy: Option<RiskPolicy>,
}

/// Limits the backend enforces on a managed account. Read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskPolicy {
    pub max_leverage: Decimal,
    pub max_daily_notional: Decimal,
    pub max_drawdown: Decimal,
    #[serde(default)]
    pub allowed_instruments: Vec<String>,
}

#[async_trait]
impl ManagedAccountApi for BackendClient {
    async fn managed_account(
        &self,
        wallet: Address,
    ) -> Result<Option<ManagedAccount>, BackendError> {
        let Some(response) = self.get_optional(&format!("/accounts/{wallet}")).await? else {
            return Ok(None);
        };

        Ok(Some(response.json().await?))
    }

    async fn create_managed_account(
        &self,
        wallet: Address,
    ) -> Result<ManagedAccount, BackendError> {
        let response = self
            .post("/accounts", &json!({ "walletAddress": wallet }))
            .await?;
        let account: ManagedAccount = response.json().await?;

        info!(account_id = %account.id, %wallet, "Managed account created");

        Ok(account)
    }
}
