//! Private-key wallet for CLI use and tests.
//!
//! `LocalWallet` signs with an in-memory key and talks to each chain through
//! its own HTTP RPC endpoint. The active chain is plain local state: a
//! switch succeeds as long as an endpoint is configured for the target
//! chain.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy::dyn_abi::TypedData;
use alloy::network::EthereumWallet;
use alloy::primitives::{Address, B256, Bytes, Signature, TxHash};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::Signer;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use backon::{ConstantBuilder, Retryable};
use tracing::{debug, info};
use url::Url;

use crate::{ChainId, Confirmation, EvmError, Wallet};

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const RECEIPT_POLL_ATTEMPTS: usize = 150;

pub struct LocalWallet {
    signer: PrivateKeySigner,
    endpoints: HashMap<ChainId, Url>,
    active_chain: AtomicU64,
}

impl LocalWallet {
    /// Creates a wallet starting on `initial_chain`.
    ///
    /// # Errors
    ///
    /// Fails on an invalid key, or with [`EvmError::UnsupportedChain`] when
    /// no endpoint is configured for `initial_chain`.
    pub fn new(
        private_key: B256,
        endpoints: HashMap<ChainId, Url>,
        initial_chain: ChainId,
    ) -> Result<Self, LocalWalletError> {
        let signer = PrivateKeySigner::from_bytes(&private_key)?;

        if !endpoints.contains_key(&initial_chain) {
            return Err(EvmError::UnsupportedChain {
                chain_id: initial_chain,
            }
            .into());
        }

        Ok(Self {
            signer,
            endpoints,
            active_chain: AtomicU64::new(initial_chain),
        })
    }

    fn endpoint(&self, chain_id: ChainId) -> Result<Url, EvmError> {
        self.endpoints
            .get(&chain_id)
            .cloned()
            .ok_or(EvmError::UnsupportedChain { chain_id })
    }

    fn provider(&self, chain_id: ChainId) -> Result<impl Provider, EvmError> {
        let endpoint = self.endpoint(chain_id)?;

        Ok(ProviderBuilder::new()
            .wallet(EthereumWallet::from(self.signer.clone()))
            .connect_http(endpoint))
    }

    fn ensure_active(&self, requested: ChainId) -> Result<(), EvmError> {
        let active = self.active_chain.load(Ordering::SeqCst);

        if active != requested {
            return Err(EvmError::ChainMismatch { active, requested });
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LocalWalletError {
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(#[from] alloy::signers::k256::ecdsa::Error),
    #[error(transparent)]
    Evm(#[from] EvmError),
}

#[async_trait]
impl Wallet for LocalWallet {
    fn address(&self) -> Address {
        self.signer.address()
    }

    async fn active_chain(&self) -> Result<ChainId, EvmError> {
        Ok(self.active_chain.load(Ordering::SeqCst))
    }

    async fn switch_chain(&self, chain_id: ChainId) -> Result<(), EvmError> {
        self.endpoint(chain_id)?;

        let previous = self.active_chain.swap(chain_id, Ordering::SeqCst);
        debug!(previous, chain_id, "Switched active chain");

        Ok(())
    }

    async fn sign_typed_data(&self, data: &TypedData) -> Result<Signature, EvmError> {
        let hash = data.eip712_signing_hash()?;

        Ok(self.signer.sign_hash(&hash).await?)
    }

    async fn send_transaction(
        &self,
        chain_id: ChainId,
        mut tx: TransactionRequest,
    ) -> Result<TxHash, EvmError> {
        self.ensure_active(chain_id)?;

        tx.from = Some(self.signer.address());
        tx.chain_id = Some(chain_id);

        let pending = self.provider(chain_id)?.send_transaction(tx).await?;
        let tx_hash = *pending.tx_hash();

        info!(%tx_hash, chain_id, "Transaction submitted");

        Ok(tx_hash)
    }

    async fn wait_for_confirmation(
        &self,
        chain_id: ChainId,
        tx_hash: TxHash,
    ) -> Result<Confirmation, EvmError> {
        let provider = self.provider(chain_id)?;

        let backoff = ConstantBuilder::default()
            .with_delay(RECEIPT_POLL_INTERVAL)
            .with_max_times(RECEIPT_POLL_ATTEMPTS);

        let fetch_receipt = || async {
            provider
                .get_transaction_receipt(tx_hash)
                .await?
                .ok_or(EvmError::ReceiptPending { tx_hash })
        };

        let receipt = fetch_receipt
            .retry(backoff)
            .when(|err| matches!(err, EvmError::ReceiptPending { .. }))
            .await
            .map_err(|err| match err {
                EvmError::ReceiptPending { tx_hash } => EvmError::ConfirmationTimeout {
                    tx_hash,
                    attempts: RECEIPT_POLL_ATTEMPTS,
                },
                other => other,
            })?;

        if !receipt.status() {
            return Err(EvmError::Reverted { tx_hash });
        }

        info!(%tx_hash, chain_id, block = ?receipt.block_number, "Transaction confirmed");

        Ok(Confirmation {
            tx_hash,
            block_number: receipt.block_number,
        })
    }

    async fn call(&self, chain_id: ChainId, tx: TransactionRequest) -> Result<Bytes, EvmError> {
        Ok(self.provider(chain_id)?.call(tx).await?)
    }
}
