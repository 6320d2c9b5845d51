use alloy::primitives::Address;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::{ExtraAgent, FeeRate, SignedAction, VenueApi, VenueError};

pub struct HyperliquidClient {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
#[serde(tag = "status", content = "response", rename_all = "lowercase")]
enum ExchangeResponse {
    Ok(Value),
    Err(String),
}

impl HyperliquidClient {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Response, VenueError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self.client.post(&url).json(body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            return Err(VenueError::ApiError { status, message });
        }

        Ok(response)
    }
}

#[async_trait]
impl VenueApi for HyperliquidClient {
    async fn extra_agents(&self, user: Address) -> Result<Vec<ExtraAgent>, VenueError> {
        let response = self
            .post("/info", &json!({ "type": "extraAgents", "user": user }))
            .await?;

        let agents: Vec<ExtraAgent> = response.json().await?;
        debug!(%user, count = agents.len(), "Fetched delegated signers");

        Ok(agents)
    }

    async fn max_builder_fee(
        &self,
        user: Address,
        builder: Address,
    ) -> Result<FeeRate, VenueError> {
        let response = self
            .post(
                "/info",
                &json!({ "type": "maxBuilderFee", "user": user, "builder": builder }),
            )
            .await?;

        Ok(FeeRate(response.json().await?))
    }

    async fn submit(&self, action: &SignedAction) -> Result<(), VenueError> {
        let response = self.post("/exchange", &action.request_body()).await?;

        match response.json().await? {
            ExchangeResponse::Ok(_) => {
                info!(nonce = action.action.nonce(), "Venue accepted action");
                Ok(())
            }
            ExchangeResponse::Err(message) => Err(VenueError::Rejected { message }),
        }
    }
}
