//! Client for the onboarding backend: wallet authentication, delegated
//! signer (agent wallet) provisioning, managed accounts and onboarding
//! tracking.
//!
//! Each concern is its own trait so flows only depend on what they use.
//! [`BackendClient`] implements all of them over HTTP.

mod account;
mod agent;
mod auth;
mod client;
mod tracking;

use alloy::dyn_abi::TypedData;
use alloy::primitives::{Address, Signature, TxHash};
use async_trait::async_trait;
use reqwest::StatusCode;
use uuid::Uuid;

pub use account::{ManagedAccount, RiskPolicy};
pub use auth::{AuthChallenge, AuthStatus};
pub use client::BackendClient;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error("API error (status {status}): {message}")]
    ApiError { status: StatusCode, message: String },
    #[error("malformed auth challenge: {0}")]
    InvalidChallenge(#[source] serde_json::Error),
}

#[async_trait]
pub trait AuthApi: Send + Sync {
    /// EIP-712 challenge the wallet signs to prove ownership of `address`.
    async fn auth_challenge(&self, address: Address) -> Result<AuthChallenge, BackendError>;

    /// Submits the signed challenge and opens a session.
    async fn verify(
        &self,
        address: Address,
        signature: &Signature,
        challenge: &AuthChallenge,
    ) -> Result<AuthStatus, BackendError>;

    /// Session state of `address`, as recorded by the backend.
    async fn auth_status(&self, address: Address) -> Result<AuthStatus, BackendError>;
}

#[async_trait]
pub trait AgentWalletApi: Send + Sync {
    /// Address of the delegated signer provisioned for `address`.
    async fn agent_wallet(&self, address: Address) -> Result<Option<Address>, BackendError>;

    /// Provisions a delegated signer for `address`. The returned address
    /// still has to be approved on the venue.
    async fn create_agent_wallet(&self, address: Address) -> Result<Address, BackendError>;
}

#[async_trait]
pub trait ManagedAccountApi: Send + Sync {
    async fn managed_account(&self, wallet: Address)
    -> Result<Option<ManagedAccount>, BackendError>;

    async fn create_managed_account(&self, wallet: Address)
    -> Result<ManagedAccount, BackendError>;
}

#[async_trait]
pub trait TrackingApi: Send + Sync {
    /// Records the transactions of a finished deposit by `wallet`.
    async fn track_onboarding(
        &self,
        wallet: Address,
        flow_id: Uuid,
        tx_hashes: &[TxHash],
    ) -> Result<(), BackendError>;
}

/// Everything the setup workflow needs from the backend.
pub trait Backend: AuthApi + AgentWalletApi + ManagedAccountApi {}

impl<T: AuthApi + AgentWalletApi + ManagedAccountApi> Backend for T {}

pub(crate) fn typed_data_from_parts(
    domain: serde_json::Value,
    types: serde_json::Value,
    primary_type: &str,
    message: serde_json::Value,
) -> Result<TypedData, BackendError> {
    serde_json::from_value(serde_json::json!({
        "domain": domain,
        "types": types,
        "primaryType": primary_type,
        "message": message,
    }))
    .map_err(BackendError::InvalidChallenge)
}
