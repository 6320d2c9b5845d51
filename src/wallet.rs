//! Explicit wallet context threaded through the onboarding flows.
//!
//! The active chain is the one piece of shared mutable state the flows
//! touch. Every phase that needs a specific chain goes through
//! [`WalletCtx::ensure_chain`], which requests the switch, gives the wallet
//! time to settle and then confirms the switch actually happened.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use tracing::{debug, info};

use st0x_evm::{ChainId, EvmError, Wallet};

pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

#[derive(Clone)]
pub struct WalletCtx {
    wallet: Arc<dyn Wallet>,
    settle_delay: Duration,
}

impl std::fmt::Debug for WalletCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletCtx")
            .field("address", &self.wallet.address())
            .field("settle_delay", &self.settle_delay)
            .finish()
    }
}

impl WalletCtx {
    pub fn new(wallet: Arc<dyn Wallet>, settle_delay: Duration) -> Self {
        Self {
            wallet,
            settle_delay,
        }
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    pub fn wallet(&self) -> Arc<dyn Wallet> {
        Arc::clone(&self.wallet)
    }

    pub async fn active_chain(&self) -> Result<ChainId, EvmError> {
        self.wallet.active_chain().await
    }

    /// Makes `chain_id` the active chain and returns the wallet scoped to it.
    ///
    /// Fails with [`EvmError::ChainNotSwitched`] when the wallet accepts the
    /// request but is still on another chain after the settle delay.
    pub async fn ensure_chain(&self, chain_id: ChainId) -> Result<Arc<dyn Wallet>, EvmError> {
        let active = self.wallet.active_chain().await?;

        if active == chain_id {
            debug!(chain_id, "Wallet already on requested chain");
            return Ok(self.wallet());
        }

        info!(from = active, to = chain_id, "Switching wallet chain");
        self.wallet.switch_chain(chain_id).await?;
        tokio::time::sleep(self.settle_delay).await;

        let active = self.wallet.active_chain().await?;
        if active != chain_id {
            return Err(EvmError::ChainNotSwitched {
                active,
                requested: chain_id,
            });
        }

        Ok(self.wallet())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::test_utils::{ARBITRUM, BASE, MockWallet};

    #[tokio::test(start_paused = true)]
    async fn ensure_chain_is_noop_on_active_chain() {
        let wallet = Arc::new(MockWallet::new(ARBITRUM));
        let ctx = WalletCtx::new(wallet.clone(), DEFAULT_SETTLE_DELAY);

        ctx.ensure_chain(ARBITRUM).await.unwrap();

        assert!(wallet.switches.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn ensure_chain_switches_and_waits_for_settle() {
        let wallet = Arc::new(MockWallet::new(BASE));
        let ctx = WalletCtx::new(wallet.clone(), DEFAULT_SETTLE_DELAY);
        let started = tokio::time::Instant::now();

        let scoped = ctx.ensure_chain(ARBITRUM).await.unwrap();

        assert_eq!(scoped.active_chain().await.unwrap(), ARBITRUM);
        assert_eq!(*wallet.switches.lock().unwrap(), vec![ARBITRUM]);
        assert!(started.elapsed() >= DEFAULT_SETTLE_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn ensure_chain_detects_switch_that_did_not_happen() {
        let wallet = Arc::new(MockWallet::new(BASE));
        wallet.ignore_switches.store(true, Ordering::SeqCst);
        let ctx = WalletCtx::new(wallet, DEFAULT_SETTLE_DELAY);

        let Err(err) = ctx.ensure_chain(ARBITRUM).await else {
            panic!("switch that did not happen was accepted");
        };

        assert!(matches!(
            err,
            EvmError::ChainNotSwitched {
                active: BASE,
                requested: ARBITRUM
            }
        ));
    }
}
