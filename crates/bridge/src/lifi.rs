//! LI.FI aggregator implementation of [`Bridge`].
//!
//! Pricing goes through `/v1/advanced/routes`. Execution is done natively:
//! for each leg the engine switches to the leg's source chain, fetches the
//! leg transaction from `/v1/advanced/stepTransaction`, confirms any rate
//! deterioration with the caller, ensures the ERC-20 allowance, submits the
//! transaction, waits for its receipt and then polls `/v1/status` until the
//! leg settles on the destination side.

use std::time::Duration;

use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::rpc::types::TransactionRequest;
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use backon::{ConstantBuilder, Retryable};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use st0x_evm::Wallet;

use crate::{
    Asset, Bridge, BridgeError, ExecutionHooks, ExecutionStatus, FeeCost, QuoteRequest, Route,
    RouteStep,
};

sol! {
    interface IERC20 {
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
    }
}

pub const DEFAULT_API_BASE: &str = "https://li.quest";

#[derive(Debug, Clone)]
pub struct LifiConfig {
    pub api_base: String,
    pub integrator: String,
    pub api_key: Option<String>,
    pub status_poll_interval: Duration,
    pub max_status_polls: usize,
}

impl Default for LifiConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            integrator: "st0x".to_string(),
            api_key: None,
            status_poll_interval: Duration::from_secs(10),
            max_status_polls: 180,
        }
    }
}

pub struct LifiBridge {
    client: Client,
    config: LifiConfig,
}

impl LifiBridge {
    pub fn new(config: LifiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => builder.header("x-lifi-api-key", key),
            None => builder,
        }
    }

    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, BridgeError> {
        let url = format!("{}{path}", self.config.api_base);
        let response = self
            .request(self.client.post(&url))
            .json(body)
            .send()
            .await?;

        parse_response(response).await
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, BridgeError> {
        let url = format!("{}{path}", self.config.api_base);
        let response = self
            .request(self.client.get(&url))
            .query(query)
            .send()
            .await?;

        parse_response(response).await
    }

    async fn execute_step(
        &self,
        route: &mut Route,
        index: usize,
        hooks: &dyn ExecutionHooks,
    ) -> Result<(), BridgeError> {
        let Some(step) = route.steps.get_mut(index) else {
            return Err(BridgeError::InvalidResponse {
                reason: format!("route has no leg {index}"),
            });
        };
        step.execution.status = ExecutionStatus::Pending;
        let from_chain = step.from.chain_id;
        hooks.on_progress(route);

        let mut wallet = hooks.wallet().await?;
        if wallet.active_chain().await? != from_chain {
            info!(leg = index, chain_id = from_chain, "Switching chain for leg");
            wallet = hooks.switch_chain(from_chain).await?;
        }

        let step = &route.steps[index];
        let prepared: PreparedStep = self.post("/v1/advanced/stepTransaction", &step.raw).await?;
        let updated_amount = parse_amount(&prepared.estimate.to_amount)?;

        if updated_amount < step.to_amount {
            let quoted = step.to_amount;
            info!(leg = index, %quoted, updated = %updated_amount, "Leg rate changed");

            if !hooks.confirm_rate_update(quoted, updated_amount).await {
                return Err(BridgeError::RateUpdateDeclined {
                    step: index,
                    quoted,
                    updated: updated_amount,
                });
            }
        }

        let request = prepared
            .transaction_request
            .ok_or_else(|| BridgeError::InvalidResponse {
                reason: format!("leg {} has no transaction request", index + 1),
            })?;

        if let Some(spender) = step.approval_address
            && !step.from.is_native()
        {
            ensure_allowance(wallet.as_ref(), step.from, spender, step.from_amount).await?;
        }

        let tx = request.into_transaction()?;
        let tx_hash = wallet.send_transaction(from_chain, tx).await?;
        info!(leg = index, %tx_hash, "Leg transaction submitted");

        let step = &mut route.steps[index];
        step.execution.tx_hash = Some(tx_hash);
        step.to_amount = updated_amount;
        hooks.on_progress(route);

        wallet.wait_for_confirmation(from_chain, tx_hash).await?;

        let step = &route.steps[index];
        let settled = self.poll_status(index, step, tx_hash).await?;

        let step = &mut route.steps[index];
        step.execution.status = ExecutionStatus::Done;
        step.execution.received_amount = settled;
        hooks.on_progress(route);

        Ok(())
    }

    async fn poll_status(
        &self,
        index: usize,
        step: &RouteStep,
        tx_hash: TxHash,
    ) -> Result<Option<U256>, BridgeError> {
        let query = [
            ("txHash", tx_hash.to_string()),
            ("fromChain", step.from.chain_id.to_string()),
            ("toChain", step.to.chain_id.to_string()),
            ("bridge", step.tool.clone()),
        ];

        let backoff = ConstantBuilder::default()
            .with_delay(self.config.status_poll_interval)
            .with_max_times(self.config.max_status_polls);

        let fetch_status = || async {
            let status: StatusResponse = self
                .get("/v1/status", &query)
                .await
                .map_err(StatusPollError::Request)?;

            match status.status.as_str() {
                "DONE" => Ok(status),
                "FAILED" | "INVALID" => Err(StatusPollError::Failed(
                    status
                        .substatus_message
                        .unwrap_or_else(|| status.status.clone()),
                )),
                other => Err(StatusPollError::Pending(other.to_string())),
            }
        };

        let status = fetch_status
            .retry(backoff)
            .when(|err| !matches!(err, StatusPollError::Failed(_)))
            .notify(|err, dur| match err {
                StatusPollError::Pending(status) => {
                    debug!(leg = index, %status, ?dur, "Leg still settling");
                }
                err => warn!(leg = index, ?err, ?dur, "Leg status poll failed, retrying"),
            })
            .await
            .map_err(|err| match err {
                StatusPollError::Failed(message) => BridgeError::StepFailed {
                    step: index,
                    message,
                },
                StatusPollError::Pending(_) | StatusPollError::Request(_) => {
                    BridgeError::StatusTimeout {
                        step: index,
                        attempts: self.config.max_status_polls,
                    }
                }
            })?;

        status
            .receiving
            .and_then(|receiving| receiving.amount)
            .map(|amount| parse_amount(&amount))
            .transpose()
    }
}

#[async_trait]
impl Bridge for LifiBridge {
    async fn quote(&self, request: &QuoteRequest) -> Result<Option<Route>, BridgeError> {
        let body = json!({
            "fromChainId": request.from.chain_id,
            "fromTokenAddress": request.from.token,
            "fromAmount": request.from_amount.to_string(),
            "fromAddress": request.from_address,
            "toChainId": request.to.chain_id,
            "toTokenAddress": request.to.token,
            "toAddress": request.to_address,
            "options": {
                "integrator": self.config.integrator,
                "slippage": f64::from(request.slippage_bps) / 10_000.0,
                "order": "RECOMMENDED",
            },
        });

        let response: RoutesResponse = self.post("/v1/advanced/routes", &body).await?;

        let Some(route) = response.routes.into_iter().next() else {
            debug!(?request, "No routes available");
            return Ok(None);
        };

        route.try_into().map(Some)
    }

    async fn execute_route(
        &self,
        mut route: Route,
        hooks: &dyn ExecutionHooks,
    ) -> Result<Route, BridgeError> {
        info!(route_id = %route.id, legs = route.steps.len(), "Executing route");

        for index in 0..route.steps.len() {
            if let Err(err) = self.execute_step(&mut route, index, hooks).await {
                warn!(route_id = %route.id, leg = index, %err, "Leg failed");
                let step = &mut route.steps[index];
                step.execution.status = ExecutionStatus::Failed;
                step.execution.message = Some(err.to_string());
                hooks.on_progress(&route);
                return Err(err);
            }
        }

        info!(route_id = %route.id, settled = %route.settled_amount(), "Route executed");
        Ok(route)
    }
}

async fn ensure_allowance(
    wallet: &dyn Wallet,
    token: Asset,
    spender: Address,
    amount: U256,
) -> Result<(), BridgeError> {
    let owner = wallet.address();
    let calldata = IERC20::allowanceCall { owner, spender }.abi_encode();
    let tx = TransactionRequest::default()
        .to(token.token)
        .input(Bytes::from(calldata).into());

    let output = wallet.call(token.chain_id, tx).await?;
    let allowance = output
        .get(..32)
        .and_then(|word| U256::try_from_be_slice(word))
        .ok_or_else(|| BridgeError::InvalidResponse {
            reason: format!("malformed allowance for token {}", token.token),
        })?;

    debug!(%allowance, %amount, %spender, "Checking leg allowance");

    if allowance >= amount {
        return Ok(());
    }

    let calldata = IERC20::approveCall { spender, amount }.abi_encode();
    let tx = TransactionRequest::default()
        .to(token.token)
        .input(Bytes::from(calldata).into());

    let tx_hash = wallet.send_transaction(token.chain_id, tx).await?;
    info!(%tx_hash, %spender, %amount, "Approval submitted");
    wallet.wait_for_confirmation(token.chain_id, tx_hash).await?;

    Ok(())
}

async fn parse_response<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, BridgeError> {
    let status = response.status();

    if !status.is_success() {
        let message = response.text().await?;
        return Err(BridgeError::Api {
            status: status.as_u16(),
            message,
        });
    }

    Ok(response.json().await?)
}

fn parse_amount(value: &str) -> Result<U256, BridgeError> {
    value
        .parse::<U256>()
        .map_err(|err| BridgeError::InvalidResponse {
            reason: format!("invalid amount {value:?}: {err}"),
        })
}

#[derive(Debug)]
enum StatusPollError {
    Request(BridgeError),
    Pending(String),
    Failed(String),
}

#[derive(Debug, Deserialize)]
struct RoutesResponse {
    routes: Vec<LifiRoute>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LifiToken {
    address: Address,
    chain_id: u64,
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    decimals: u8,
}

impl From<&LifiToken> for Asset {
    fn from(token: &LifiToken) -> Self {
        Self::new(token.chain_id, token.address)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LifiRoute {
    id: String,
    from_amount: String,
    from_token: LifiToken,
    to_amount: String,
    to_amount_min: String,
    to_token: LifiToken,
    #[serde(default)]
    tags: Vec<String>,
    steps: Vec<serde_json::Value>,
}

impl TryFrom<LifiRoute> for Route {
    type Error = BridgeError;

    fn try_from(route: LifiRoute) -> Result<Self, Self::Error> {
        let steps = route
            .steps
            .into_iter()
            .map(route_step)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: route.id,
            from: Asset::from(&route.from_token),
            to: Asset::from(&route.to_token),
            from_amount: parse_amount(&route.from_amount)?,
            to_amount: parse_amount(&route.to_amount)?,
            to_amount_min: parse_amount(&route.to_amount_min)?,
            steps,
            tags: route.tags,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LifiStep {
    id: String,
    tool: String,
    action: LifiAction,
    estimate: LifiEstimate,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LifiAction {
    from_token: LifiToken,
    to_token: LifiToken,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LifiEstimate {
    from_amount: String,
    to_amount: String,
    to_amount_min: String,
    approval_address: Option<Address>,
    #[serde(default)]
    execution_duration: f64,
    #[serde(default)]
    fee_costs: Vec<LifiFeeCost>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LifiFeeCost {
    name: String,
    amount: String,
    #[serde(rename = "amountUSD")]
    amount_usd: Option<String>,
    #[serde(default)]
    included: bool,
    token: LifiToken,
}

fn route_step(raw: serde_json::Value) -> Result<RouteStep, BridgeError> {
    let step: LifiStep =
        serde_json::from_value(raw.clone()).map_err(|err| BridgeError::InvalidResponse {
            reason: format!("malformed route leg: {err}"),
        })?;

    let fees = step
        .estimate
        .fee_costs
        .iter()
        .map(|fee| {
            Ok(FeeCost {
                name: fee.name.clone(),
                symbol: fee.token.symbol.clone(),
                decimals: fee.token.decimals,
                amount: parse_amount(&fee.amount)?,
                amount_usd: fee.amount_usd.clone(),
                included: fee.included,
            })
        })
        .collect::<Result<Vec<_>, BridgeError>>()?;

    Ok(RouteStep {
        id: step.id,
        tool: step.tool,
        from: Asset::from(&step.action.from_token),
        to: Asset::from(&step.action.to_token),
        from_amount: parse_amount(&step.estimate.from_amount)?,
        to_amount: parse_amount(&step.estimate.to_amount)?,
        to_amount_min: parse_amount(&step.estimate.to_amount_min)?,
        approval_address: step.estimate.approval_address,
        estimated_duration: Duration::from_secs_f64(step.estimate.execution_duration.max(0.0)),
        fees,
        execution: Default::default(),
        raw,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreparedStep {
    estimate: PreparedEstimate,
    transaction_request: Option<LifiTransactionRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreparedEstimate {
    to_amount: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LifiTransactionRequest {
    to: Address,
    data: Bytes,
    value: Option<String>,
    gas_limit: Option<String>,
}

impl LifiTransactionRequest {
    fn into_transaction(self) -> Result<TransactionRequest, BridgeError> {
        let mut tx = TransactionRequest::default()
            .to(self.to)
            .input(self.data.into());

        if let Some(value) = self.value {
            tx = tx.value(parse_amount(&value)?);
        }

        if let Some(gas_limit) = self.gas_limit {
            let gas_limit = u64::try_from(parse_amount(&gas_limit)?).map_err(|_| {
                BridgeError::InvalidResponse {
                    reason: format!("gas limit {gas_limit} out of range"),
                }
            })?;
            tx = tx.gas_limit(gas_limit);
        }

        Ok(tx)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    status: String,
    substatus_message: Option<String>,
    receiving: Option<StatusReceiving>,
}

#[derive(Debug, Deserialize)]
struct StatusReceiving {
    amount: Option<String>,
}
