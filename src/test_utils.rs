use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use alloy::dyn_abi::TypedData;
use alloy::primitives::{Address, B256, Bytes, Signature, TxHash, U256, address};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::SignerSync;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

use st0x_bridge::{
    Asset, Bridge, BridgeError, ExecutionHooks, ExecutionStatus, QuoteRequest, Route, RouteStep,
    StepExecution,
};
use st0x_evm::{ChainId, Confirmation, EvmError, Wallet};

use crate::backend::{
    AgentWalletApi, AuthApi, AuthChallenge, AuthStatus, BackendError, ManagedAccount,
    ManagedAccountApi, TrackingApi, typed_data_from_parts,
};
use crate::deposit::DepositSettings;
use crate::hyperliquid::{ExtraAgent, FeeRate, SignedAction, VenueApi, VenueError, VenueNetwork};
use crate::setup::SetupSettings;
use crate::usdc::Usdc;

pub(crate) const ARBITRUM: ChainId = 42161;
pub(crate) const BASE: ChainId = 8453;

/// First anvil dev account.
pub(crate) const TEST_PRIVATE_KEY: &str =
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub(crate) const USER: Address = address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

pub(crate) const AGENT: Address = address!("0x8a2f3b6f0c1e7b4d9a5c2e1f0d3b6a9c8e7f4d21");
pub(crate) const BUILDER: Address = address!("0x1924b8561eef20e70ede628a296175d358be80e5");
pub(crate) const CUSTODY: Address = address!("0x2df1c51e09aecf9cacb7bc98cb1742757f163df7");
pub(crate) const USDC_ARBITRUM: Address = address!("0xaf88d065e77c8cc2239327c5edb3a432268e5831");
pub(crate) const USDC_BASE: Address = address!("0x833589fcd6edb6e08f4c7c32d4f71b54bda02913");

pub(crate) fn setup_settings() -> SetupSettings {
    SetupSettings {
        network: VenueNetwork::Mainnet,
        signature_chain_id: ARBITRUM,
        supported_signature_chains: vec![ARBITRUM, BASE],
        agent_name: "st0x".to_string(),
        builder: BUILDER,
        max_fee_rate: FeeRate(100),
    }
}

pub(crate) fn deposit_settings() -> DepositSettings {
    DepositSettings {
        destination: Asset::new(ARBITRUM, USDC_ARBITRUM),
        destination_decimals: 6,
        custody_contract: CUSTODY,
        minimum: Usdc::new(dec!(5)),
        slippage_bps: 50,
    }
}

/// Route priced from `from` to `to` with `legs` legs, the last of which
/// delivers `to_amount`.
pub(crate) fn bridged_route(
    from: (ChainId, Address),
    to: (ChainId, Address),
    from_amount: U256,
    to_amount: U256,
    legs: usize,
) -> Route {
    let from = Asset::new(from.0, from.1);
    let to = Asset::new(to.0, to.1);
    let to_amount_min = to_amount * U256::from(995) / U256::from(1000);

    let steps = (0..legs)
        .map(|leg| RouteStep {
            id: format!("leg-{leg}"),
            tool: if leg == 0 { "across" } else { "stargate" }.to_string(),
            from: if leg == 0 { from } else { to },
            to,
            from_amount: if leg == 0 { from_amount } else { to_amount },
            to_amount,
            to_amount_min,
            approval_address: None,
            estimated_duration: Duration::from_secs(60),
            fees: vec![],
            execution: StepExecution::default(),
            raw: json!({ "id": format!("leg-{leg}") }),
        })
        .collect();

    Route {
        id: "route-1".to_string(),
        from,
        to,
        from_amount,
        to_amount,
        to_amount_min,
        steps,
        tags: vec!["RECOMMENDED".to_string()],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConfirmationOutcome {
    Confirmed,
    Reverted,
    Timeout,
}

/// In-memory wallet signing with a real key. Chain switches take effect
/// immediately unless `ignore_switches` is set.
pub(crate) struct MockWallet {
    signer: PrivateKeySigner,
    active_chain: AtomicU64,
    pub(crate) ignore_switches: AtomicBool,
    rejected_chain: Mutex<Option<ChainId>>,
    pub(crate) switches: Mutex<Vec<ChainId>>,
    signatures: AtomicUsize,
    pub(crate) sent: Mutex<Vec<(ChainId, TransactionRequest)>>,
    balance: Mutex<U256>,
    confirmation: Mutex<ConfirmationOutcome>,
    tx_counter: AtomicU64,
}

impl MockWallet {
    pub(crate) fn new(chain_id: ChainId) -> Self {
        Self {
            signer: TEST_PRIVATE_KEY.parse().unwrap(),
            active_chain: AtomicU64::new(chain_id),
            ignore_switches: AtomicBool::new(false),
            rejected_chain: Mutex::new(None),
            switches: Mutex::new(vec![]),
            signatures: AtomicUsize::new(0),
            sent: Mutex::new(vec![]),
            balance: Mutex::new(U256::MAX),
            confirmation: Mutex::new(ConfirmationOutcome::Confirmed),
            tx_counter: AtomicU64::new(0),
        }
    }

    pub(crate) fn signature_count(&self) -> usize {
        self.signatures.load(Ordering::SeqCst)
    }

    /// Makes the wallet refuse switch requests to `chain_id`.
    pub(crate) fn reject_switch_to(&self, chain_id: ChainId) {
        *self.rejected_chain.lock().unwrap() = Some(chain_id);
    }

    pub(crate) fn set_balance(&self, balance: U256) {
        *self.balance.lock().unwrap() = balance;
    }

    pub(crate) fn set_confirmation(&self, outcome: ConfirmationOutcome) {
        *self.confirmation.lock().unwrap() = outcome;
    }

    /// Transactions sent to `to`, with the chain they were sent on.
    pub(crate) fn sent_to(&self, to: Address) -> Vec<(ChainId, TransactionRequest)> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, tx)| tx.to.and_then(|kind| kind.to().copied()) == Some(to))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Wallet for MockWallet {
    fn address(&self) -> Address {
        self.signer.address()
    }

    async fn active_chain(&self) -> Result<ChainId, EvmError> {
        Ok(self.active_chain.load(Ordering::SeqCst))
    }

    async fn switch_chain(&self, chain_id: ChainId) -> Result<(), EvmError> {
        if *self.rejected_chain.lock().unwrap() == Some(chain_id) {
            return Err(EvmError::Rejected {
                reason: "user rejected the chain switch".to_string(),
            });
        }

        self.switches.lock().unwrap().push(chain_id);

        if !self.ignore_switches.load(Ordering::SeqCst) {
            self.active_chain.store(chain_id, Ordering::SeqCst);
        }

        Ok(())
    }

    async fn sign_typed_data(&self, data: &TypedData) -> Result<Signature, EvmError> {
        let hash = data.eip712_signing_hash()?;
        let signature = self.signer.sign_hash_sync(&hash)?;
        self.signatures.fetch_add(1, Ordering::SeqCst);
        Ok(signature)
    }

    async fn send_transaction(
        &self,
        chain_id: ChainId,
        tx: TransactionRequest,
    ) -> Result<TxHash, EvmError> {
        let active = self.active_chain.load(Ordering::SeqCst);
        if active != chain_id {
            return Err(EvmError::ChainMismatch {
                active,
                requested: chain_id,
            });
        }

        self.sent.lock().unwrap().push((chain_id, tx));
        let nonce = self.tx_counter.fetch_add(1, Ordering::SeqCst);

        Ok(B256::left_padding_from(&(0xd0_u64 + nonce).to_be_bytes()))
    }

    async fn wait_for_confirmation(
        &self,
        _chain_id: ChainId,
        tx_hash: TxHash,
    ) -> Result<Confirmation, EvmError> {
        match *self.confirmation.lock().unwrap() {
            ConfirmationOutcome::Confirmed => Ok(Confirmation {
                tx_hash,
                block_number: Some(1),
            }),
            ConfirmationOutcome::Reverted => Err(EvmError::Reverted { tx_hash }),
            ConfirmationOutcome::Timeout => Err(EvmError::ConfirmationTimeout {
                tx_hash,
                attempts: 3,
            }),
        }
    }

    async fn call(&self, _chain_id: ChainId, _tx: TransactionRequest) -> Result<Bytes, EvmError> {
        let balance = *self.balance.lock().unwrap();
        Ok(Bytes::from(balance.to_be_bytes::<32>().to_vec()))
    }
}

#[derive(Default)]
struct BackendState {
    sessions: HashSet<Address>,
    agents: HashMap<Address, Address>,
    account: Option<ManagedAccount>,
    challenge_chain: Option<ChainId>,
    fail_create_agent: bool,
    fail_tracking: bool,
    stall_tracking: bool,
    tracked: Vec<(Uuid, Vec<TxHash>)>,
    tracked_wallets: Vec<Address>,
}

pub(crate) struct MockBackend {
    state: Mutex<BackendState>,
    verify_calls: AtomicUsize,
    create_agent_calls: AtomicUsize,
    create_account_calls: AtomicUsize,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            state: Mutex::new(BackendState {
                challenge_chain: Some(ARBITRUM),
                ..BackendState::default()
            }),
            verify_calls: AtomicUsize::new(0),
            create_agent_calls: AtomicUsize::new(0),
            create_account_calls: AtomicUsize::new(0),
        }
    }
}

fn api_error(message: &str) -> BackendError {
    BackendError::ApiError {
        status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
        message: message.to_string(),
    }
}

impl MockBackend {
    pub(crate) fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn create_agent_calls(&self) -> usize {
        self.create_agent_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn create_account_calls(&self) -> usize {
        self.create_account_calls.load(Ordering::SeqCst)
    }

    /// Opens or drops the session of [`USER`].
    pub(crate) fn set_authenticated(&self, authenticated: bool) {
        let sessions = &mut self.state.lock().unwrap().sessions;
        if authenticated {
            sessions.insert(USER);
        } else {
            sessions.remove(&USER);
        }
    }

    /// Sets the delegated signer provisioned for [`USER`].
    pub(crate) fn set_agent(&self, agent: Option<Address>) {
        let agents = &mut self.state.lock().unwrap().agents;
        match agent {
            Some(agent) => agents.insert(USER, agent),
            None => agents.remove(&USER),
        };
    }

    pub(crate) fn set_account(&self, exists: bool) {
        self.state.lock().unwrap().account = exists.then(|| managed_account(USER));
    }

    pub(crate) fn set_challenge_chain(&self, chain_id: Option<ChainId>) {
        self.state.lock().unwrap().challenge_chain = chain_id;
    }

    pub(crate) fn fail_create_agent(&self, fail: bool) {
        self.state.lock().unwrap().fail_create_agent = fail;
    }

    pub(crate) fn fail_tracking(&self, fail: bool) {
        self.state.lock().unwrap().fail_tracking = fail;
    }

    /// Makes tracking calls hang until the caller gives up on them.
    pub(crate) fn stall_tracking(&self, stall: bool) {
        self.state.lock().unwrap().stall_tracking = stall;
    }

    pub(crate) fn tracked_wallets(&self) -> Vec<Address> {
        self.state.lock().unwrap().tracked_wallets.clone()
    }

    pub(crate) fn tracked(&self) -> Vec<(Uuid, Vec<TxHash>)> {
        self.state.lock().unwrap().tracked.clone()
    }
}

fn managed_account(wallet: Address) -> ManagedAccount {
    ManagedAccount {
        id: "acct-1".to_string(),
        wallet_address: wallet,
        policy: None,
    }
}

#[async_trait]
impl AuthApi for MockBackend {
    async fn auth_challenge(&self, address: Address) -> Result<AuthChallenge, BackendError> {
        let chain_id = self.state.lock().unwrap().challenge_chain;

        let mut domain = json!({ "name": "st0x", "version": "1" });
        let mut domain_types = vec![
            json!({ "name": "name", "type": "string" }),
            json!({ "name": "version", "type": "string" }),
        ];
        if let Some(chain_id) = chain_id {
            domain["chainId"] = json!(format!("{chain_id:#x}"));
            domain_types.push(json!({ "name": "chainId", "type": "uint256" }));
        }

        let typed_data = typed_data_from_parts(
            domain,
            json!({
                "EIP712Domain": domain_types,
                "Login": [
                    { "name": "wallet", "type": "address" },
                    { "name": "nonce", "type": "string" },
                ],
            }),
            "Login",
            json!({ "wallet": address, "nonce": "abc123" }),
        )?;

        Ok(AuthChallenge {
            typed_data,
            timestamp: 1_760_000_000,
        })
    }

    async fn verify(
        &self,
        address: Address,
        _signature: &Signature,
        _challenge: &AuthChallenge,
    ) -> Result<AuthStatus, BackendError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.state.lock().unwrap().sessions.insert(address);

        Ok(AuthStatus {
            authenticated: true,
            expires_at: None,
        })
    }

    async fn auth_status(&self, address: Address) -> Result<AuthStatus, BackendError> {
        let authenticated = self.state.lock().unwrap().sessions.contains(&address);

        Ok(AuthStatus {
            authenticated,
            expires_at: None,
        })
    }
}

#[async_trait]
impl AgentWalletApi for MockBackend {
    async fn agent_wallet(&self, address: Address) -> Result<Option<Address>, BackendError> {
        Ok(self.state.lock().unwrap().agents.get(&address).copied())
    }

    async fn create_agent_wallet(&self, address: Address) -> Result<Address, BackendError> {
        self.create_agent_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();

        if state.fail_create_agent {
            return Err(api_error("agent wallet provisioning unavailable"));
        }

        state.agents.insert(address, AGENT);
        Ok(AGENT)
    }
}

#[async_trait]
impl ManagedAccountApi for MockBackend {
    async fn managed_account(
        &self,
        _wallet: Address,
    ) -> Result<Option<ManagedAccount>, BackendError> {
        Ok(self.state.lock().unwrap().account.clone())
    }

    async fn create_managed_account(
        &self,
        wallet: Address,
    ) -> Result<ManagedAccount, BackendError> {
        self.create_account_calls.fetch_add(1, Ordering::SeqCst);
        let account = managed_account(wallet);
        self.state.lock().unwrap().account = Some(account.clone());
        Ok(account)
    }
}

#[async_trait]
impl TrackingApi for MockBackend {
    async fn track_onboarding(
        &self,
        wallet: Address,
        flow_id: Uuid,
        tx_hashes: &[TxHash],
    ) -> Result<(), BackendError> {
        let stall = self.state.lock().unwrap().stall_tracking;
        if stall {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock().unwrap();

        if state.fail_tracking {
            return Err(api_error("tracking unavailable"));
        }

        state.tracked.push((flow_id, tx_hashes.to_vec()));
        state.tracked_wallets.push(wallet);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct MockVenue {
    agents: Mutex<Vec<ExtraAgent>>,
    max_fee: Mutex<FeeRate>,
    submitted: Mutex<Vec<SignedAction>>,
    extra_agents_calls: AtomicUsize,
    reject: Mutex<Option<String>>,
}

impl MockVenue {
    pub(crate) fn set_agents(&self, agents: Vec<ExtraAgent>) {
        *self.agents.lock().unwrap() = agents;
    }

    pub(crate) fn set_max_builder_fee(&self, rate: FeeRate) {
        *self.max_fee.lock().unwrap() = rate;
    }

    pub(crate) fn reject_with(&self, message: &str) {
        *self.reject.lock().unwrap() = Some(message.to_string());
    }

    pub(crate) fn submitted(&self) -> Vec<SignedAction> {
        self.submitted.lock().unwrap().clone()
    }

    pub(crate) fn extra_agents_calls(&self) -> usize {
        self.extra_agents_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VenueApi for MockVenue {
    async fn extra_agents(&self, _user: Address) -> Result<Vec<ExtraAgent>, VenueError> {
        self.extra_agents_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.agents.lock().unwrap().clone())
    }

    async fn max_builder_fee(
        &self,
        _user: Address,
        _builder: Address,
    ) -> Result<FeeRate, VenueError> {
        Ok(*self.max_fee.lock().unwrap())
    }

    async fn submit(&self, action: &SignedAction) -> Result<(), VenueError> {
        if let Some(message) = self.reject.lock().unwrap().clone() {
            return Err(VenueError::Rejected { message });
        }

        self.submitted.lock().unwrap().push(action.clone());
        Ok(())
    }
}

/// How [`MockBridge`] plays out a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BridgeScript {
    /// Every leg succeeds and the last one delivers `received`.
    Succeed { received: U256 },
    /// Leg `leg` fails with `message`.
    FailLeg { leg: usize, message: String },
    /// The first leg's output is re-quoted at `updated` before it runs.
    RateDrop { updated: U256 },
}

/// Bridge engine that drives [`ExecutionHooks`] the way a real one does:
/// one transaction per leg on the leg's source chain, progress after every
/// status change.
pub(crate) struct MockBridge {
    route: Mutex<Option<Route>>,
    quote_errors: Mutex<VecDeque<BridgeError>>,
    quote_calls: AtomicUsize,
    requests: Mutex<Vec<QuoteRequest>>,
    script: Mutex<BridgeScript>,
    executions: AtomicUsize,
}

impl MockBridge {
    pub(crate) fn new(route: Option<Route>, script: BridgeScript) -> Self {
        Self {
            route: Mutex::new(route),
            quote_errors: Mutex::new(VecDeque::new()),
            quote_calls: AtomicUsize::new(0),
            requests: Mutex::new(vec![]),
            script: Mutex::new(script),
            executions: AtomicUsize::new(0),
        }
    }

    /// Fails the next quote with `error`; queued errors are returned in order.
    pub(crate) fn push_quote_error(&self, error: BridgeError) {
        self.quote_errors.lock().unwrap().push_back(error);
    }

    pub(crate) fn quote_calls(&self) -> usize {
        self.quote_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<QuoteRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Bridge for MockBridge {
    async fn quote(&self, request: &QuoteRequest) -> Result<Option<Route>, BridgeError> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        if let Some(error) = self.quote_errors.lock().unwrap().pop_front() {
            return Err(error);
        }

        Ok(self.route.lock().unwrap().clone())
    }

    async fn execute_route(
        &self,
        mut route: Route,
        hooks: &dyn ExecutionHooks,
    ) -> Result<Route, BridgeError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock().unwrap().clone();
        let last_leg = route.steps.len().saturating_sub(1);

        for leg in 0..route.steps.len() {
            let from_chain = route.steps[leg].from.chain_id;
            let mut wallet = hooks.wallet().await?;
            if wallet.active_chain().await? != from_chain {
                wallet = hooks.switch_chain(from_chain).await?;
            }

            route.steps[leg].execution.status = ExecutionStatus::Pending;
            hooks.on_progress(&route);

            let mut received = route.steps[leg].to_amount;

            if let BridgeScript::RateDrop { updated } = script
                && leg == 0
            {
                if !hooks.confirm_rate_update(received, updated).await {
                    route.steps[leg].execution.status = ExecutionStatus::Failed;
                    route.steps[leg].execution.message = Some("rate update declined".to_string());
                    hooks.on_progress(&route);
                    return Err(BridgeError::RateUpdateDeclined {
                        step: leg,
                        quoted: route.steps[leg].to_amount,
                        updated,
                    });
                }
                received = updated;
            }

            if let BridgeScript::FailLeg {
                leg: failing,
                message,
            } = &script
                && *failing == leg
            {
                route.steps[leg].execution.status = ExecutionStatus::Failed;
                route.steps[leg].execution.message = Some(message.clone());
                hooks.on_progress(&route);
                return Err(BridgeError::StepFailed {
                    step: leg,
                    message: message.clone(),
                });
            }

            let tx_hash = wallet
                .send_transaction(from_chain, TransactionRequest::default())
                .await?;

            if let BridgeScript::Succeed { received: delivered } = script
                && leg == last_leg
            {
                received = delivered;
            }

            route.steps[leg].execution = StepExecution {
                status: ExecutionStatus::Done,
                tx_hash: Some(tx_hash),
                received_amount: Some(received),
                message: None,
            };
            hooks.on_progress(&route);
        }

        Ok(route)
    }
}
