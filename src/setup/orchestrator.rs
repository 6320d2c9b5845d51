use std::sync::Arc;

use alloy::primitives::Address;
use chrono::Utc;
use tracing::{error, info, instrument, warn};

use st0x_evm::EvmError;

use super::checker::{CheckError, DelegateConflict, DelegatedSigner, SetupFacts, StepChecker};
use super::{SetupError, SetupSettings, StepCompletion, StepTable, WorkflowStep};
use crate::backend::{Backend, BackendError};
use crate::hyperliquid::{
    Action, ApproveAgent, ApproveBuilderFee, SignedAction, VenueApi, VenueError,
};
use crate::wallet::WalletCtx;

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Check(#[from] CheckError),
    #[error("backend request failed: {0}")]
    Backend(#[from] BackendError),
    #[error("venue request failed: {0}")]
    Venue(#[from] VenueError),
    #[error("wallet error: {0}")]
    Wallet(#[from] EvmError),
    #[error("failed to build signing payload: {0}")]
    TypedData(#[from] serde_json::Error),
    #[error(
        "another delegated signer ({name}, {address}) is already approved for this wallet; \
         revoke it on the venue and retry"
    )]
    DelegateConflict { address: Address, name: String },
    #[error("no delegated signer to approve")]
    MissingDelegatedSigner,
    #[error("backend did not accept the signed challenge")]
    NotAuthenticated,
}

impl From<DelegateConflict> for StepError {
    fn from(conflict: DelegateConflict) -> Self {
        Self::DelegateConflict {
            address: conflict.address,
            name: conflict.name,
        }
    }
}

/// Drives the setup steps in order, skipping whatever is already done.
pub struct SetupOrchestrator {
    wallet: WalletCtx,
    backend: Arc<dyn Backend>,
    venue: Arc<dyn VenueApi>,
    checker: StepChecker,
    settings: SetupSettings,
    steps: StepTable,
    facts: SetupFacts,
}

impl SetupOrchestrator {
    pub fn new(
        wallet: WalletCtx,
        backend: Arc<dyn Backend>,
        venue: Arc<dyn VenueApi>,
        settings: SetupSettings,
    ) -> Self {
        let checker = StepChecker::new(backend.clone(), venue.clone(), settings.clone());

        Self {
            wallet,
            backend,
            venue,
            checker,
            settings,
            steps: StepTable::default(),
            facts: SetupFacts::default(),
        }
    }

    pub fn steps(&self) -> &StepTable {
        &self.steps
    }

    pub fn facts(&self) -> &SetupFacts {
        &self.facts
    }

    /// Runs every incomplete step in order.
    ///
    /// Each step is checked against the backend or venue first; a step that
    /// is already done is marked complete without signing or submitting
    /// anything. The first failure halts the run and is recorded on its step.
    #[instrument(skip(self), fields(wallet = %self.wallet.address()))]
    pub async fn start(&mut self) -> Result<(), SetupError> {
        for step in WorkflowStep::ALL {
            self.steps.ensure_ready(step)?;

            if let Err(source) = self.run_step(step).await {
                error!(%step, %source, "Setup step failed");
                self.steps.fail(step, source.to_string());
                return Err(SetupError::Step { step, source });
            }
        }

        info!("Setup complete");
        Ok(())
    }

    /// Clears failed steps so the next [`Self::start`] retries them.
    pub fn reset(&mut self) {
        self.steps.reset();
    }

    async fn run_step(&mut self, step: WorkflowStep) -> Result<(), StepError> {
        let address = self.wallet.address();

        match self.checker.check(step, address, &mut self.facts).await? {
            StepCompletion::Completed => {
                info!(%step, "Step already complete");
                self.steps.complete(step);
                return Ok(());
            }
            StepCompletion::Conflict(conflict) => return Err(conflict.into()),
            StepCompletion::Incomplete => {}
        }

        self.steps.begin(step);
        info!(%step, "Running setup step");

        match step {
            WorkflowStep::Authenticate => self.authenticate().await?,
            WorkflowStep::CreateDelegatedSigner => self.create_delegated_signer().await?,
            WorkflowStep::ApproveDelegatedSigner => self.approve_delegated_signer().await?,
            WorkflowStep::ApproveFeePolicy => self.approve_fee_policy().await?,
            WorkflowStep::CreateManagedAccount => self.create_managed_account().await?,
        }

        self.steps.complete(step);
        Ok(())
    }

    async fn authenticate(&self) -> Result<(), StepError> {
        let address = self.wallet.address();
        let challenge = self.backend.auth_challenge(address).await?;

        let signer = match challenge.chain_id() {
            Some(chain_id) => self.wallet.ensure_chain(chain_id).await?,
            None => self.wallet.wallet(),
        };

        let signature = signer.sign_typed_data(&challenge.typed_data).await?;
        let status = self.backend.verify(address, &signature, &challenge).await?;

        if !status.authenticated {
            return Err(StepError::NotAuthenticated);
        }

        Ok(())
    }

    async fn create_delegated_signer(&mut self) -> Result<(), StepError> {
        let address = self
            .backend
            .create_agent_wallet(self.wallet.address())
            .await?;

        self.facts.delegate = Some(DelegatedSigner {
            address,
            pending_approval: true,
        });

        Ok(())
    }

    async fn approve_delegated_signer(&mut self) -> Result<(), StepError> {
        let delegate = self
            .facts
            .delegate
            .ok_or(StepError::MissingDelegatedSigner)?;

        let action = Action::ApproveAgent(ApproveAgent {
            network: self.settings.network,
            signature_chain_id: self.settings.signature_chain_id,
            agent_address: delegate.address,
            agent_name: self.settings.agent_name.clone(),
            nonce: action_nonce(),
        });

        self.sign_and_submit(action).await?;

        if let Some(known) = self.facts.delegate.as_mut() {
            known.pending_approval = false;
        }

        Ok(())
    }

    async fn approve_fee_policy(&self) -> Result<(), StepError> {
        let active = self.wallet.active_chain().await?;

        let signature_chain_id = if self.settings.supported_signature_chains.contains(&active) {
            active
        } else {
            self.settings.signature_chain_id
        };

        let action = Action::ApproveBuilderFee(ApproveBuilderFee {
            network: self.settings.network,
            signature_chain_id,
            max_fee_rate: self.settings.max_fee_rate,
            builder: self.settings.builder,
            nonce: action_nonce(),
        });

        self.sign_and_submit(action).await
    }

    async fn create_managed_account(&mut self) -> Result<(), StepError> {
        let account = self
            .backend
            .create_managed_account(self.wallet.address())
            .await?;

        self.facts.account = Some(account);
        Ok(())
    }

    /// Signs `action` on its signature chain and submits it to the venue.
    async fn sign_and_submit(&self, action: Action) -> Result<(), StepError> {
        let typed_data = action.typed_data()?;
        let signer = self.wallet.ensure_chain(action.signature_chain_id()).await?;
        let signature = signer.sign_typed_data(&typed_data).await?;

        let signed = SignedAction {
            action,
            signature: signature.into(),
        };

        self.venue.submit(&signed).await.inspect_err(|err| {
            warn!(nonce = signed.action.nonce(), %err, "Venue rejected signed action");
        })?;

        Ok(())
    }
}

/// Venue nonces are millisecond timestamps.
fn action_nonce() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default()
}
