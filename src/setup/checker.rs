//! Completion checks for setup steps.
//!
//! Every check queries the authority that owns the step (backend or venue)
//! and turns the answer into a [`StepCompletion`] with a pure function, so
//! the decision logic is testable without any I/O. Checks never mutate
//! remote state; the only side effect is refreshing [`SetupFacts`].

use std::sync::Arc;

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::{SetupSettings, WorkflowStep};
use crate::backend::{AuthStatus, Backend, BackendError, ManagedAccount};
use crate::hyperliquid::{ExtraAgent, FeeRate, VenueApi, VenueError};

/// Another delegated signer already holds the approval slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegateConflict {
    pub address: Address,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepCompletion {
    Incomplete,
    Completed,
    Conflict(DelegateConflict),
}

/// Locally cached delegated signer, reconciled on every check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelegatedSigner {
    pub address: Address,
    /// Created on the backend but not yet authorized on the venue.
    pub pending_approval: bool,
}

/// What the checks have learned so far about the user's setup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetupFacts {
    pub delegate: Option<DelegatedSigner>,
    pub account: Option<ManagedAccount>,
}

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("backend query failed: {0}")]
    Backend(#[from] BackendError),
    #[error("venue query failed: {0}")]
    Venue(#[from] VenueError),
}

pub fn auth_completion(status: &AuthStatus, now: DateTime<Utc>) -> StepCompletion {
    if status.is_active(now) {
        StepCompletion::Completed
    } else {
        StepCompletion::Incomplete
    }
}

pub fn agent_wallet_completion(agent: Option<Address>) -> StepCompletion {
    match agent {
        Some(_) => StepCompletion::Completed,
        None => StepCompletion::Incomplete,
    }
}

/// Matches the venue's authorized signers against our delegate: by address
/// first, then by name. Any other authorized signer is a conflict.
pub fn delegate_completion(
    agents: &[ExtraAgent],
    delegate: Address,
    agent_name: &str,
) -> StepCompletion {
    if agents.iter().any(|agent| agent.address == delegate) {
        return StepCompletion::Completed;
    }

    // A signer registered under our name is assumed to be ours, even when
    // the backend has since rotated the address.
    if agents.iter().any(|agent| agent.name == agent_name) {
        return StepCompletion::Completed;
    }

    match agents.first() {
        Some(other) => StepCompletion::Conflict(DelegateConflict {
            address: other.address,
            name: other.name.clone(),
        }),
        None => StepCompletion::Incomplete,
    }
}

pub fn fee_policy_completion(approved: FeeRate, required: FeeRate) -> StepCompletion {
    if approved >= required {
        StepCompletion::Completed
    } else {
        StepCompletion::Incomplete
    }
}

pub fn account_completion(account: Option<&ManagedAccount>) -> StepCompletion {
    match account {
        Some(_) => StepCompletion::Completed,
        None => StepCompletion::Incomplete,
    }
}

pub struct StepChecker {
    backend: Arc<dyn Backend>,
    venue: Arc<dyn VenueApi>,
    settings: SetupSettings,
}

impl StepChecker {
    pub fn new(backend: Arc<dyn Backend>, venue: Arc<dyn VenueApi>, settings: SetupSettings) -> Self {
        Self {
            backend,
            venue,
            settings,
        }
    }

    pub async fn check(
        &self,
        step: WorkflowStep,
        wallet: Address,
        facts: &mut SetupFacts,
    ) -> Result<StepCompletion, CheckError> {
        let completion = match step {
            WorkflowStep::Authenticate => {
                let status = self.backend.auth_status(wallet).await?;
                auth_completion(&status, Utc::now())
            }
            WorkflowStep::CreateDelegatedSigner => {
                let agent = self.refresh_delegate(wallet, facts).await?;
                agent_wallet_completion(agent)
            }
            WorkflowStep::ApproveDelegatedSigner => self.check_delegate_approval(wallet, facts).await?,
            WorkflowStep::ApproveFeePolicy => {
                let approved = self
                    .venue
                    .max_builder_fee(wallet, self.settings.builder)
                    .await?;
                fee_policy_completion(approved, self.settings.max_fee_rate)
            }
            WorkflowStep::CreateManagedAccount => {
                facts.account = self.backend.managed_account(wallet).await?;
                account_completion(facts.account.as_ref())
            }
        };

        debug!(%step, ?completion, "Checked setup step");

        Ok(completion)
    }

    async fn refresh_delegate(
        &self,
        wallet: Address,
        facts: &mut SetupFacts,
    ) -> Result<Option<Address>, CheckError> {
        let agent = self.backend.agent_wallet(wallet).await?;

        facts.delegate = agent.map(|address| DelegatedSigner {
            address,
            pending_approval: facts
                .delegate
                .filter(|known| known.address == address)
                .is_none_or(|known| known.pending_approval),
        });

        Ok(agent)
    }

    async fn check_delegate_approval(
        &self,
        wallet: Address,
        facts: &mut SetupFacts,
    ) -> Result<StepCompletion, CheckError> {
        let delegate = match facts.delegate {
            Some(delegate) => Some(delegate.address),
            None => self.refresh_delegate(wallet, facts).await?,
        };

        let Some(delegate) = delegate else {
            return Ok(StepCompletion::Incomplete);
        };

        let agents = self.venue.extra_agents(wallet).await?;
        let completion = delegate_completion(&agents, delegate, &self.settings.agent_name);

        if let Some(known) = facts.delegate.as_mut() {
            known.pending_approval = completion != StepCompletion::Completed;
        }

        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::address;
    use chrono::Duration;
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::backend::BackendClient;
    use crate::test_utils::{AGENT, MockBackend, MockVenue, USER, setup_settings};

    const OTHER: Address = address!("0x4444444444444444444444444444444444444444");

    fn agent(name: &str, address: Address) -> ExtraAgent {
        ExtraAgent {
            name: name.to_string(),
            address,
            valid_until: None,
        }
    }

    #[test]
    fn auth_requires_unexpired_session() {
        let now = Utc::now();

        let active = AuthStatus {
            authenticated: true,
            expires_at: Some(now + Duration::minutes(5)),
        };
        let expired = AuthStatus {
            authenticated: true,
            expires_at: Some(now - Duration::minutes(5)),
        };

        assert_eq!(auth_completion(&active, now), StepCompletion::Completed);
        assert_eq!(auth_completion(&expired, now), StepCompletion::Incomplete);
        assert_eq!(
            auth_completion(&AuthStatus::unauthenticated(), now),
            StepCompletion::Incomplete
        );
    }

    #[test]
    fn delegate_matches_by_address() {
        let agents = [agent("someone-else", AGENT)];

        assert_eq!(
            delegate_completion(&agents, AGENT, "st0x"),
            StepCompletion::Completed
        );
    }

    #[test]
    fn delegate_matches_by_name() {
        let agents = [agent("st0x", OTHER)];

        assert_eq!(
            delegate_completion(&agents, AGENT, "st0x"),
            StepCompletion::Completed
        );
    }

    #[test]
    fn unrelated_delegate_is_a_conflict() {
        let agents = [agent("other-app", OTHER)];

        assert_eq!(
            delegate_completion(&agents, AGENT, "st0x"),
            StepCompletion::Conflict(DelegateConflict {
                address: OTHER,
                name: "other-app".to_string(),
            })
        );
    }

    #[test]
    fn no_delegates_is_incomplete() {
        assert_eq!(
            delegate_completion(&[], AGENT, "st0x"),
            StepCompletion::Incomplete
        );
    }

    #[test]
    fn fee_policy_requires_at_least_required_rate() {
        assert_eq!(
            fee_policy_completion(FeeRate(100), FeeRate(100)),
            StepCompletion::Completed
        );
        assert_eq!(
            fee_policy_completion(FeeRate(200), FeeRate(100)),
            StepCompletion::Completed
        );
        assert_eq!(
            fee_policy_completion(FeeRate(50), FeeRate(100)),
            StepCompletion::Incomplete
        );
    }

    #[test]
    fn simple_existence_checks() {
        assert_eq!(agent_wallet_completion(None), StepCompletion::Incomplete);
        assert_eq!(agent_wallet_completion(Some(AGENT)), StepCompletion::Completed);
        assert_eq!(account_completion(None), StepCompletion::Incomplete);
    }

    #[tokio::test]
    async fn check_refreshes_delegate_facts() {
        let backend = std::sync::Arc::new(MockBackend::default());
        backend.set_agent(Some(AGENT));
        let venue = std::sync::Arc::new(MockVenue::default());
        let checker = StepChecker::new(backend, venue.clone(), setup_settings());
        let mut facts = SetupFacts::default();

        let completion = checker
            .check(WorkflowStep::CreateDelegatedSigner, USER, &mut facts)
            .await
            .unwrap();

        assert_eq!(completion, StepCompletion::Completed);
        assert_eq!(
            facts.delegate,
            Some(DelegatedSigner {
                address: AGENT,
                pending_approval: true,
            })
        );

        venue.set_agents(vec![agent("st0x", AGENT)]);
        let completion = checker
            .check(WorkflowStep::ApproveDelegatedSigner, USER, &mut facts)
            .await
            .unwrap();

        assert_eq!(completion, StepCompletion::Completed);
        assert!(!facts.delegate.unwrap().pending_approval);
    }

    #[tokio::test]
    async fn approval_check_without_delegate_is_incomplete() {
        let backend = std::sync::Arc::new(MockBackend::default());
        let venue = std::sync::Arc::new(MockVenue::default());
        let checker = StepChecker::new(backend, venue.clone(), setup_settings());

        let completion = checker
            .check(
                WorkflowStep::ApproveDelegatedSigner,
                USER,
                &mut SetupFacts::default(),
            )
            .await
            .unwrap();

        assert_eq!(completion, StepCompletion::Incomplete);
        assert_eq!(venue.extra_agents_calls(), 0);
    }

    #[tokio::test]
    async fn fresh_backend_client_resumes_by_wallet_address() {
        let server = MockServer::start();
        let status = server.mock(|when, then| {
            when.method(GET)
                .path("/auth/status")
                .query_param("address", USER.to_string());
            then.status(200).json_body(json!({
                "authenticated": true,
                "expiresAt": null,
            }));
        });
        let delegate = server.mock(|when, then| {
            when.method(GET)
                .path("/agent-wallet")
                .query_param("address", USER.to_string());
            then.status(200).json_body(json!({
                "exists": true,
                "agentWalletAddress": AGENT,
            }));
        });

        let backend = std::sync::Arc::new(BackendClient::new(server.base_url(), None));
        let venue = std::sync::Arc::new(MockVenue::default());
        let checker = StepChecker::new(backend, venue, setup_settings());
        let mut facts = SetupFacts::default();

        let authenticated = checker
            .check(WorkflowStep::Authenticate, USER, &mut facts)
            .await
            .unwrap();
        let provisioned = checker
            .check(WorkflowStep::CreateDelegatedSigner, USER, &mut facts)
            .await
            .unwrap();

        assert_eq!(authenticated, StepCompletion::Completed);
        assert_eq!(provisioned, StepCompletion::Completed);
        assert_eq!(facts.delegate.map(|known| known.address), Some(AGENT));
        status.assert();
        delegate.assert();
    }

    #[tokio::test]
    async fn session_of_another_wallet_does_not_count() {
        let backend = std::sync::Arc::new(MockBackend::default());
        backend.set_authenticated(true);
        backend.set_agent(Some(AGENT));
        let checker = StepChecker::new(
            backend,
            std::sync::Arc::new(MockVenue::default()),
            setup_settings(),
        );
        let mut facts = SetupFacts::default();

        for step in [WorkflowStep::Authenticate, WorkflowStep::CreateDelegatedSigner] {
            let completion = checker.check(step, OTHER, &mut facts).await.unwrap();
            assert_eq!(completion, StepCompletion::Incomplete, "{step}");
        }
    }
}
