use alloy::primitives::{Address, TxHash};
use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use super::client::BackendClient;
use super::{BackendError, TrackingApi};

#[async_trait]
impl TrackingApi for BackendClient {
    async fn track_onboarding(
        &self,
        wallet: Address,
        flow_id: Uuid,
        tx_hashes: &[TxHash],
    ) -> Result<(), BackendError> {
        self.post(
            "/onboarding/track",
            &json!({ "address": wallet, "flowId": flow_id, "txHashes": tx_hashes }),
        )
        .await?;

        Ok(())
    }
}
