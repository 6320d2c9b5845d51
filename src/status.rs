//! Folds setup progress and deposit events into one status view for host
//! surfaces (CLI output, a UI, a log line).

use alloy::primitives::TxHash;
use serde::Serialize;

use crate::deposit::{DepositEvent, LegStatus};
use crate::setup::{StepStatus, StepTable, WorkflowStep};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OnboardingStatus {
    NotStarted,
    SettingUp { step: WorkflowStep },
    SetupFailed { step: WorkflowStep, error: String },
    ReadyToDeposit,
    Quoted { direct: bool },
    /// Waiting out a rate limit before re-quoting.
    RateLimited { message: String },
    Bridging { leg: usize },
    Depositing,
    Completed { tx_hash: TxHash },
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepView {
    pub step: WorkflowStep,
    pub label: &'static str,
    pub description: &'static str,
    pub status: StepStatus,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegView {
    pub label: String,
    pub status: LegStatus,
    pub error: Option<String>,
}

impl LegView {
    fn pending(label: String) -> Self {
        Self {
            label,
            status: LegStatus::Pending,
            error: None,
        }
    }

    fn update(&mut self, status: LegStatus, error: Option<&String>) {
        self.status = status;
        self.error = error.cloned();
    }
}

const DEPOSIT_LEG_LABEL: &str = "deposit to custody";

/// Serializable view of the whole onboarding flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub status: OnboardingStatus,
    pub steps: Vec<StepView>,
    pub legs: Vec<LegView>,
    pub active_leg: Option<usize>,
    /// The custody transfer that follows the bridge legs, if any.
    pub deposit_leg: LegView,
}

#[derive(Debug, Clone)]
pub struct StatusProjector {
    status: OnboardingStatus,
    steps: Vec<StepView>,
    legs: Vec<LegView>,
    active_leg: Option<usize>,
    deposit_leg: LegView,
}

impl Default for StatusProjector {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusProjector {
    pub fn new() -> Self {
        Self {
            status: OnboardingStatus::NotStarted,
            steps: project_steps(&StepTable::default()),
            legs: vec![],
            active_leg: None,
            deposit_leg: LegView::pending(DEPOSIT_LEG_LABEL.to_string()),
        }
    }

    pub fn status(&self) -> &OnboardingStatus {
        &self.status
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            status: self.status.clone(),
            steps: self.steps.clone(),
            legs: self.legs.clone(),
            active_leg: self.active_leg,
            deposit_leg: self.deposit_leg.clone(),
        }
    }

    pub fn project_setup(&mut self, table: &StepTable) {
        self.steps = project_steps(table);

        self.status = if let Some(failed) = table.failed_step() {
            OnboardingStatus::SetupFailed {
                step: failed.step,
                error: failed.error.clone().unwrap_or_default(),
            }
        } else if table.is_complete() {
            OnboardingStatus::ReadyToDeposit
        } else if table
            .records()
            .iter()
            .all(|record| record.status == StepStatus::Pending)
        {
            OnboardingStatus::NotStarted
        } else {
            match table.current_step() {
                Some(step) => OnboardingStatus::SettingUp { step },
                None => OnboardingStatus::ReadyToDeposit,
            }
        };
    }

    pub fn apply(&mut self, event: &DepositEvent) {
        match event {
            DepositEvent::QuoteReady { direct, legs, .. } => {
                self.legs = legs.iter().cloned().map(LegView::pending).collect();
                self.active_leg = None;
                self.deposit_leg = LegView::pending(DEPOSIT_LEG_LABEL.to_string());
                self.status = OnboardingStatus::Quoted { direct: *direct };
            }
            DepositEvent::RateLimited(notice) => {
                self.status = OnboardingStatus::RateLimited {
                    message: notice.message(),
                };
            }
            DepositEvent::RateUpdate { .. } => {}
            DepositEvent::LegStatusChanged { leg, status, error } => {
                if let Some(view) = self.legs.get_mut(*leg) {
                    view.update(*status, error.as_ref());
                }
                if *status == LegStatus::InProgress {
                    self.status = OnboardingStatus::Bridging { leg: *leg };
                }
            }
            DepositEvent::ActiveLegChanged { leg } => {
                self.active_leg = Some(*leg);
                self.status = OnboardingStatus::Bridging { leg: *leg };
            }
            DepositEvent::DepositLegChanged { status, error } => {
                self.deposit_leg.update(*status, error.as_ref());
                if *status == LegStatus::InProgress {
                    self.status = OnboardingStatus::Depositing;
                }
            }
            DepositEvent::RouteCompleted { .. } | DepositEvent::DepositSubmitted { .. } => {
                self.status = OnboardingStatus::Depositing;
            }
            DepositEvent::DepositConfirmed { .. } => {}
            DepositEvent::Completed { tx_hash, .. } => {
                self.status = OnboardingStatus::Completed { tx_hash: *tx_hash };
            }
            DepositEvent::Failed { message } => {
                self.status = OnboardingStatus::Failed {
                    message: message.clone(),
                };
            }
        }
    }
}

fn project_steps(table: &StepTable) -> Vec<StepView> {
    table
        .records()
        .iter()
        .map(|record| StepView {
            step: record.step,
            label: record.step.label(),
            description: record.step.description(),
            status: record.status,
            error: record.error.clone(),
        })
        .collect()
}
