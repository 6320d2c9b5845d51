use alloy::dyn_abi::TypedData;
use alloy::hex;
use alloy::primitives::{Address, Signature};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use st0x_evm::ChainId;

use super::client::BackendClient;
use super::{AuthApi, BackendError, typed_data_from_parts};

/// Sign-in challenge issued by the backend.
#[derive(Debug, Clone)]
pub struct AuthChallenge {
    pub typed_data: TypedData,
    /// Issue time echoed back on verification.
    pub timestamp: u64,
}

impl AuthChallenge {
    /// Chain named in the signing domain, if any. The wallet has to be on
    /// this chain to produce an acceptable signature.
    pub fn chain_id(&self) -> Option<ChainId> {
        self.typed_data
            .domain
            .chain_id
            .and_then(|chain_id| u64::try_from(chain_id).ok())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    pub authenticated: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthStatus {
    pub const fn unauthenticated() -> Self {
        Self {
            authenticated: false,
            expires_at: None,
        }
    }

    /// Authenticated and not yet expired at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.authenticated && self.expires_at.is_none_or(|expires_at| expires_at > now)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChallengeResponse {
    domain: Value,
    types: Value,
    primary_type: String,
    message: Value,
    timestamp: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponse {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

#[async_trait]
impl AuthApi for BackendClient {
    async fn auth_challenge(&self, address: Address) -> Result<AuthChallenge, BackendError> {
        let response = self.get(&format!("/auth/message?address={address}")).await?;
        let challenge: ChallengeResponse = response.json().await?;

        let typed_data = typed_data_from_parts(
            challenge.domain,
            challenge.types,
            &challenge.primary_type,
            challenge.message,
        )?;

        debug!(%address, timestamp = challenge.timestamp, "Fetched auth challenge");

        Ok(AuthChallenge {
            typed_data,
            timestamp: challenge.timestamp,
        })
    }

    async fn verify(
        &self,
        address: Address,
        signature: &Signature,
        challenge: &AuthChallenge,
    ) -> Result<AuthStatus, BackendError> {
        let body = json!({
            "address": address,
            "signature": hex::encode_prefixed(signature.as_bytes()),
            "timestamp": challenge.timestamp,
        });

        let response = self.post("/auth/verify", &body).await?;
        let verified: VerifyResponse = response.json().await?;

        self.set_session(verified.token);
        info!(%address, expires_at = ?verified.expires_at, "Wallet authenticated");

        Ok(AuthStatus {
            authenticated: true,
            expires_at: verified.expires_at,
        })
    }

    async fn auth_status(&self, address: Address) -> Result<AuthStatus, BackendError> {
        match self.get(&format!("/auth/status?address={address}")).await {
            Ok(response) => Ok(response.json().await?),
            Err(BackendError::ApiError {
                status: StatusCode::UNAUTHORIZED,
                ..
            }) => Ok(AuthStatus::unauthenticated()),
            Err(err) => Err(err),
        }
    }
}
