use std::fmt::Display;

use serde::Serialize;

use super::SetupError;

/// Setup steps in the order they must complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    Authenticate,
    CreateDelegatedSigner,
    ApproveDelegatedSigner,
    ApproveFeePolicy,
    CreateManagedAccount,
}

impl WorkflowStep {
    pub const ALL: [Self; 5] = [
        Self::Authenticate,
        Self::CreateDelegatedSigner,
        Self::ApproveDelegatedSigner,
        Self::ApproveFeePolicy,
        Self::CreateManagedAccount,
    ];

    pub const fn index(self) -> usize {
        match self {
            Self::Authenticate => 0,
            Self::CreateDelegatedSigner => 1,
            Self::ApproveDelegatedSigner => 2,
            Self::ApproveFeePolicy => 3,
            Self::CreateManagedAccount => 4,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Authenticate => "Authenticate",
            Self::CreateDelegatedSigner => "Create delegated signer",
            Self::ApproveDelegatedSigner => "Approve delegated signer",
            Self::ApproveFeePolicy => "Approve fee policy",
            Self::CreateManagedAccount => "Create managed account",
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::Authenticate => "Sign in by signing a message with your wallet",
            Self::CreateDelegatedSigner => {
                "Provision a signer that places orders on your behalf"
            }
            Self::ApproveDelegatedSigner => "Authorize the delegated signer on the venue",
            Self::ApproveFeePolicy => "Approve the maximum builder fee charged on your orders",
            Self::CreateManagedAccount => "Open the account that trades under your risk policy",
        }
    }
}

impl Display for WorkflowStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub step: WorkflowStep,
    pub status: StepStatus,
    pub error: Option<String>,
}

/// Status of every setup step.
///
/// Records are created once and only ever change status; reset
/// re-initializes failed records in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepTable {
    records: [StepRecord; 5],
}

impl Default for StepTable {
    fn default() -> Self {
        Self {
            records: WorkflowStep::ALL.map(|step| StepRecord {
                step,
                status: StepStatus::Pending,
                error: None,
            }),
        }
    }
}

impl StepTable {
    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn get(&self, step: WorkflowStep) -> &StepRecord {
        &self.records[step.index()]
    }

    fn get_mut(&mut self, step: WorkflowStep) -> &mut StepRecord {
        &mut self.records[step.index()]
    }

    /// Fails unless every step before `step` has completed.
    pub fn ensure_ready(&self, step: WorkflowStep) -> Result<(), SetupError> {
        let blocked_by = self.records[..step.index()]
            .iter()
            .find(|record| record.status != StepStatus::Completed);

        match blocked_by {
            Some(record) => Err(SetupError::OutOfOrder {
                step,
                blocked_by: record.step,
            }),
            None => Ok(()),
        }
    }

    pub fn begin(&mut self, step: WorkflowStep) {
        let record = self.get_mut(step);
        record.status = StepStatus::InProgress;
        record.error = None;
    }

    pub fn complete(&mut self, step: WorkflowStep) {
        let record = self.get_mut(step);
        record.status = StepStatus::Completed;
        record.error = None;
    }

    pub fn fail(&mut self, step: WorkflowStep, message: String) {
        let record = self.get_mut(step);
        record.status = StepStatus::Error;
        record.error = Some(message);
    }

    /// Puts failed steps back to pending. Other records are untouched.
    pub fn reset(&mut self) {
        for record in &mut self.records {
            if record.status == StepStatus::Error {
                record.status = StepStatus::Pending;
                record.error = None;
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.records
            .iter()
            .all(|record| record.status == StepStatus::Completed)
    }

    pub fn failed_step(&self) -> Option<&StepRecord> {
        self.records
            .iter()
            .find(|record| record.status == StepStatus::Error)
    }

    /// First step that has not completed yet.
    pub fn current_step(&self) -> Option<WorkflowStep> {
        self.records
            .iter()
            .find(|record| record.status != StepStatus::Completed)
            .map(|record| record.step)
    }
}
