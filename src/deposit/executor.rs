use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::TxHash;
use rust_decimal::Decimal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, instrument, warn};
use uuid::Uuid;

use st0x_bridge::{Bridge, BridgeError, QuoteRequest, Route};
use st0x_evm::ChainId;

use super::custody::{CustodyLeg, check_minimum};
use super::progress::ProgressHooks;
use super::{
    DepositError, DepositEvent, DepositOutcome, DepositQuote, DepositRequest, DepositSettings,
    LegStatus, QuoteKind,
};
use crate::backend::TrackingApi;
use crate::retry::{RetryPolicy, retry_rate_limited};
use crate::usdc::to_base_units;
use crate::wallet::WalletCtx;

/// Quotes and executes deposits into the custody contract, broadcasting
/// [`DepositEvent`]s as it goes.
pub struct DepositExecutor {
    wallet: WalletCtx,
    bridge: Arc<dyn Bridge>,
    tracking: Arc<dyn TrackingApi>,
    settings: DepositSettings,
    retry: RetryPolicy,
    events: broadcast::Sender<DepositEvent>,
    tracking_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DepositExecutor {
    pub fn new(
        wallet: WalletCtx,
        bridge: Arc<dyn Bridge>,
        tracking: Arc<dyn TrackingApi>,
        settings: DepositSettings,
        retry: RetryPolicy,
    ) -> Self {
        let (events, _) = broadcast::channel(256);

        Self {
            wallet,
            bridge,
            tracking,
            settings,
            retry,
            events,
            tracking_tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DepositEvent> {
        self.events.subscribe()
    }

    pub fn settings(&self) -> &DepositSettings {
        &self.settings
    }

    /// Prices `request`.
    ///
    /// Funds that already are the settlement token on the custody chain get
    /// a direct quote without calling the bridge. Everything else is priced
    /// by the bridge, retrying rate-limited responses.
    #[instrument(skip(self), fields(chain_id = request.source.chain_id, amount = %request.amount))]
    pub async fn quote(&self, request: &DepositRequest) -> Result<DepositQuote, DepositError> {
        if request.amount <= Decimal::ZERO {
            return Err(DepositError::InvalidAmount {
                amount: request.amount,
            });
        }

        let quote = if request.source.asset() == self.settings.destination {
            let quote = DepositQuote::direct(request, &self.settings)?;
            check_minimum(
                quote.to_amount,
                self.settings.destination_decimals,
                self.settings.minimum,
            )?;
            quote
        } else {
            let route = self.price_route(request).await?;
            DepositQuote::bridged(request, &self.settings, route)
        };

        info!(
            quote_id = %quote.id,
            direct = quote.is_direct(),
            to_amount = %quote.to_amount_formatted,
            "Deposit quote ready"
        );
        self.emit(DepositEvent::QuoteReady {
            quote_id: quote.id,
            direct: quote.is_direct(),
            legs: quote.leg_labels(),
        });

        Ok(quote)
    }

    /// Executes `quote` for `request`: the bridge route if there is one,
    /// then the custody transfer.
    #[instrument(skip(self, quote), fields(quote_id = %quote.id))]
    pub async fn execute(
        &self,
        request: &DepositRequest,
        quote: DepositQuote,
    ) -> Result<DepositOutcome, DepositError> {
        match self.run(request, quote).await {
            Ok(outcome) => {
                info!(flow_id = %outcome.flow_id, tx_hash = %outcome.deposit_tx, "Deposit complete");
                self.emit(DepositEvent::Completed {
                    flow_id: outcome.flow_id,
                    tx_hash: outcome.deposit_tx,
                });
                Ok(outcome)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Quotes and executes in one go.
    pub async fn deposit(&self, request: &DepositRequest) -> Result<DepositOutcome, DepositError> {
        let quote = self.quote(request).await.map_err(|err| self.fail(err))?;
        self.execute(request, quote).await
    }

    fn fail(&self, err: DepositError) -> DepositError {
        error!(%err, "Deposit failed");

        if err.is_custody_failure() {
            self.emit(DepositEvent::DepositLegChanged {
                status: LegStatus::Failed,
                error: Some(err.to_string()),
            });
        }
        self.emit(DepositEvent::Failed {
            message: err.to_string(),
        });

        err
    }

    async fn price_route(&self, request: &DepositRequest) -> Result<Route, DepositError> {
        let address = self.wallet.address();
        let quote_request = QuoteRequest {
            from: request.source.asset(),
            to: self.settings.destination,
            from_amount: to_base_units(request.amount, request.source.decimals)?,
            from_address: address,
            to_address: address,
            slippage_bps: self.settings.slippage_bps,
        };

        let route = retry_rate_limited(
            &self.retry,
            || self.bridge.quote(&quote_request),
            |notice| self.emit(DepositEvent::RateLimited(*notice)),
        )
        .await
        .map_err(DepositError::Quote)?;

        route.ok_or(DepositError::NoRoutes {
            from_chain: request.source.chain_id,
            to_chain: self.settings.destination.chain_id,
        })
    }

    async fn run(
        &self,
        request: &DepositRequest,
        quote: DepositQuote,
    ) -> Result<DepositOutcome, DepositError> {
        if !quote.matches(request) {
            return Err(DepositError::StaleQuote);
        }

        let flow_id = Uuid::new_v4();

        let (amount, bridge_txs) = match quote.kind {
            QuoteKind::Direct => (quote.to_amount, vec![]),
            QuoteKind::Bridged(route) => {
                let executed = self.run_route(route).await?;
                (executed.settled_amount(), executed.tx_hashes())
            }
        };

        self.emit(DepositEvent::DepositLegChanged {
            status: LegStatus::InProgress,
            error: None,
        });

        let custody = CustodyLeg::new(&self.wallet, &self.settings);
        let transfer = custody.submit(amount).await?;
        self.emit(DepositEvent::DepositSubmitted {
            tx_hash: transfer.tx_hash,
        });

        custody.confirm(transfer).await?;
        self.emit(DepositEvent::DepositConfirmed {
            tx_hash: transfer.tx_hash,
        });
        self.emit(DepositEvent::DepositLegChanged {
            status: LegStatus::Completed,
            error: None,
        });

        self.switch_back(request.source.chain_id).await;

        let mut tx_hashes = bridge_txs.clone();
        tx_hashes.push(transfer.tx_hash);
        self.track(flow_id, tx_hashes);

        Ok(DepositOutcome {
            flow_id,
            deposit_tx: transfer.tx_hash,
            bridge_txs,
            amount,
        })
    }

    async fn run_route(&self, route: Route) -> Result<Route, DepositError> {
        let hooks = ProgressHooks::new(
            self.wallet.clone(),
            self.events.clone(),
            self.settings.slippage_bps,
            route.steps.len(),
        );

        info!(route_id = %route.id, legs = route.steps.len(), "Executing bridge route");

        let executed = match self.bridge.execute_route(route, &hooks).await {
            Ok(executed) => executed,
            Err(err) => return Err(leg_failure(err, hooks.active_leg())),
        };

        if let Some((leg, step)) = executed.failed_step() {
            return Err(DepositError::Bridge {
                leg,
                message: step
                    .execution
                    .message
                    .clone()
                    .unwrap_or_else(|| "leg reported failure".to_string()),
            });
        }

        let settled = executed.settled_amount();
        info!(%settled, "Bridge route complete");
        self.emit(DepositEvent::RouteCompleted { settled });

        Ok(executed)
    }

    /// Returns the wallet to the chain the funds came from. Failure is only
    /// logged: the deposit has already landed.
    async fn switch_back(&self, source_chain: ChainId) {
        if source_chain == self.settings.destination.chain_id {
            return;
        }

        if let Err(err) = self.wallet.ensure_chain(source_chain).await {
            warn!(source_chain, %err, "Failed to switch wallet back to source chain");
        }
    }

    /// Waits up to `limit` for background tracking calls to finish.
    ///
    /// Tracking never decides the deposit outcome, so running out of time
    /// is only logged.
    pub async fn wait_for_tracking(&self, limit: Duration) {
        let pending: Vec<_> = self
            .tracking_tasks
            .lock()
            .map(|mut tasks| tasks.drain(..).collect())
            .unwrap_or_default();

        if pending.is_empty() {
            return;
        }

        let all = async {
            for task in pending {
                if let Err(err) = task.await {
                    warn!(%err, "Onboarding tracking task aborted");
                }
            }
        };

        if tokio::time::timeout(limit, all).await.is_err() {
            warn!(?limit, "Gave up waiting for onboarding tracking");
        }
    }

    fn track(&self, flow_id: Uuid, tx_hashes: Vec<TxHash>) {
        let tracking = Arc::clone(&self.tracking);
        let wallet = self.wallet.address();

        let task = tokio::spawn(
            async move {
                match tracking.track_onboarding(wallet, flow_id, &tx_hashes).await {
                    Ok(()) => debug!(%flow_id, "Recorded onboarding deposit"),
                    Err(err) => warn!(%flow_id, %err, "Failed to record onboarding deposit"),
                }
            }
            .in_current_span(),
        );

        if let Ok(mut tasks) = self.tracking_tasks.lock() {
            tasks.retain(|task| !task.is_finished());
            tasks.push(task);
        }
    }

    fn emit(&self, event: DepositEvent) {
        if self.events.send(event).is_err() {
            debug!("No deposit event subscribers");
        }
    }
}

/// Attributes a bridge failure to a leg. Leg-level variants carry their own
/// index, everything else falls on whichever leg was running.
fn leg_failure(err: BridgeError, active_leg: Option<usize>) -> DepositError {
    let (leg, message) = match err {
        BridgeError::StepFailed { step, message } => (step, message),
        BridgeError::RateUpdateDeclined {
            step,
            quoted,
            updated,
        } => (
            step,
            format!("rate update declined: quoted {quoted}, now {updated}"),
        ),
        BridgeError::StatusTimeout { step, attempts } => {
            (step, format!("status unknown after {attempts} polls"))
        }
        other => (active_leg.unwrap_or_default(), other.to_string()),
    };

    DepositError::Bridge { leg, message }
}
