use std::sync::{Arc, Mutex, PoisonError};

use alloy::primitives::U256;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info};

use st0x_bridge::{ExecutionHooks, ExecutionStatus, Route};
use st0x_evm::{ChainId, EvmError, Wallet};

use super::{DepositEvent, LegStatus};
use crate::wallet::WalletCtx;

#[derive(Debug, Default)]
struct LegTable {
    legs: Vec<LegStatus>,
    active: Option<usize>,
}

/// Bridges route execution callbacks into the wallet context and the
/// deposit event stream.
pub(super) struct ProgressHooks {
    wallet: WalletCtx,
    events: broadcast::Sender<DepositEvent>,
    slippage_bps: u32,
    table: Mutex<LegTable>,
}

impl ProgressHooks {
    pub(super) fn new(
        wallet: WalletCtx,
        events: broadcast::Sender<DepositEvent>,
        slippage_bps: u32,
        leg_count: usize,
    ) -> Self {
        Self {
            wallet,
            events,
            slippage_bps,
            table: Mutex::new(LegTable {
                legs: vec![LegStatus::Pending; leg_count],
                active: None,
            }),
        }
    }

    pub(super) fn active_leg(&self) -> Option<usize> {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .active
    }

    fn emit(&self, event: DepositEvent) {
        if self.events.send(event).is_err() {
            debug!("No deposit event subscribers");
        }
    }
}

/// Whether `updated` is within `slippage_bps` of `quoted`.
pub(super) fn within_slippage(quoted: U256, updated: U256, slippage_bps: u32) -> bool {
    let floor = quoted * U256::from(10_000_u32.saturating_sub(slippage_bps)) / U256::from(10_000);
    updated >= floor
}

#[async_trait]
impl ExecutionHooks for ProgressHooks {
    async fn wallet(&self) -> Result<Arc<dyn Wallet>, EvmError> {
        Ok(self.wallet.wallet())
    }

    async fn switch_chain(&self, chain_id: ChainId) -> Result<Arc<dyn Wallet>, EvmError> {
        self.wallet.ensure_chain(chain_id).await
    }

    fn on_progress(&self, route: &Route) {
        let mut events = vec![];

        {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            table.legs.resize(route.steps.len(), LegStatus::Pending);

            for (leg, step) in route.steps.iter().enumerate() {
                let status = LegStatus::from(step.execution.status);
                if table.legs[leg] != status {
                    table.legs[leg] = status;
                    let error = match status {
                        LegStatus::Failed => step.execution.message.clone(),
                        _ => None,
                    };
                    events.push(DepositEvent::LegStatusChanged { leg, status, error });
                }
            }

            let active = route
                .steps
                .iter()
                .position(|step| step.execution.status == ExecutionStatus::Pending);

            if let Some(leg) = active
                && table.active != Some(leg)
            {
                table.active = Some(leg);
                events.push(DepositEvent::ActiveLegChanged { leg });
            }
        }

        for event in events {
            self.emit(event);
        }
    }

    async fn confirm_rate_update(&self, quoted: U256, updated: U256) -> bool {
        let accepted = within_slippage(quoted, updated, self.slippage_bps);
        let leg = self.active_leg().unwrap_or_default();

        info!(leg, %quoted, %updated, accepted, "Route rate changed during execution");
        self.emit(DepositEvent::RateUpdate {
            leg,
            quoted,
            updated,
            accepted,
        });

        accepted
    }
}
