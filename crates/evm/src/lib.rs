//! EVM wallet abstraction.
//!
//! [`Wallet`] is the signing capability the onboarding flows delegate to.
//! It owns the notion of an *active chain*: typed-data signatures and
//! transactions are always produced for whichever chain the wallet is
//! currently on, so callers that need a specific chain must ask for it via
//! [`Wallet::switch_chain`] and confirm the switch before signing.
//!
//! Transactions are chain-scoped explicitly: [`Wallet::send_transaction`]
//! takes the chain the caller believes is active and refuses to submit when
//! the wallet disagrees, instead of silently broadcasting on the wrong
//! network.
//!
//! Enable the `local-signer` feature for [`local::LocalWallet`], a private
//! key wallet backed by per-chain HTTP RPC endpoints.

use std::sync::Arc;

use alloy::dyn_abi::TypedData;
use alloy::primitives::{Address, Bytes, Signature, TxHash};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;

#[cfg(feature = "local-signer")]
pub mod local;

/// EIP-155 chain identifier.
pub type ChainId = u64;

/// Errors that can occur during wallet operations.
#[derive(Debug, thiserror::Error)]
pub enum EvmError {
    #[error("transport error: {0}")]
    Transport(#[from] alloy::transports::RpcError<alloy::transports::TransportErrorKind>),
    #[error("signer error: {0}")]
    Signer(#[from] alloy::signers::Error),
    #[error("typed data encoding error: {0}")]
    TypedData(#[from] alloy::dyn_abi::Error),
    #[error("wallet is on chain {active} but the request targets chain {requested}")]
    ChainMismatch { active: ChainId, requested: ChainId },
    #[error("wallet did not switch to chain {requested}, still on chain {active}")]
    ChainNotSwitched { active: ChainId, requested: ChainId },
    #[error("no RPC endpoint configured for chain {chain_id}")]
    UnsupportedChain { chain_id: ChainId },
    #[error("request rejected by wallet: {reason}")]
    Rejected { reason: String },
    #[error("receipt for {tx_hash} not available yet")]
    ReceiptPending { tx_hash: TxHash },
    #[error("transaction {tx_hash} not confirmed after {attempts} attempts")]
    ConfirmationTimeout { tx_hash: TxHash, attempts: usize },
    #[error("transaction reverted: {tx_hash}")]
    Reverted { tx_hash: TxHash },
}

/// Inclusion of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
}

/// Signing wallet that can act on more than one EVM chain.
#[async_trait]
pub trait Wallet: Send + Sync + 'static {
    /// Address this wallet signs for.
    fn address(&self) -> Address;

    /// Chain the wallet is currently pointed at.
    async fn active_chain(&self) -> Result<ChainId, EvmError>;

    /// Requests a switch to `chain_id`.
    ///
    /// Returning `Ok` only means the request was accepted. Providers may
    /// take a moment to settle, so callers re-read [`Wallet::active_chain`]
    /// before relying on the switch.
    async fn switch_chain(&self, chain_id: ChainId) -> Result<(), EvmError>;

    /// Signs EIP-712 typed data with the wallet key.
    async fn sign_typed_data(&self, data: &TypedData) -> Result<Signature, EvmError>;

    /// Submits a transaction on `chain_id` and returns its hash without
    /// waiting for inclusion.
    async fn send_transaction(
        &self,
        chain_id: ChainId,
        tx: TransactionRequest,
    ) -> Result<TxHash, EvmError>;

    /// Waits until `tx_hash` is included on `chain_id`.
    ///
    /// Returns [`EvmError::Reverted`] for receipts with a failed status.
    async fn wait_for_confirmation(
        &self,
        chain_id: ChainId,
        tx_hash: TxHash,
    ) -> Result<Confirmation, EvmError>;

    /// Executes a read-only `eth_call` on `chain_id`.
    async fn call(&self, chain_id: ChainId, tx: TransactionRequest) -> Result<Bytes, EvmError>;
}

#[async_trait]
impl<T: Wallet> Wallet for Arc<T> {
    fn address(&self) -> Address {
        (**self).address()
    }

    async fn active_chain(&self) -> Result<ChainId, EvmError> {
        (**self).active_chain().await
    }

    async fn switch_chain(&self, chain_id: ChainId) -> Result<(), EvmError> {
        (**self).switch_chain(chain_id).await
    }

    async fn sign_typed_data(&self, data: &TypedData) -> Result<Signature, EvmError> {
        (**self).sign_typed_data(data).await
    }

    async fn send_transaction(
        &self,
        chain_id: ChainId,
        tx: TransactionRequest,
    ) -> Result<TxHash, EvmError> {
        (**self).send_transaction(chain_id, tx).await
    }

    async fn wait_for_confirmation(
        &self,
        chain_id: ChainId,
        tx_hash: TxHash,
    ) -> Result<Confirmation, EvmError> {
        (**self).wait_for_confirmation(chain_id, tx_hash).await
    }

    async fn call(&self, chain_id: ChainId, tx: TransactionRequest) -> Result<Bytes, EvmError> {
        (**self).call(chain_id, tx).await
    }
}
