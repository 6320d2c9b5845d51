//! Onboarding for a managed trading account on Hyperliquid: a resumable
//! five-step setup workflow and a cross-chain deposit into the venue's
//! custody contract.

pub mod backend;
pub mod cli;
pub mod config;
pub mod deposit;
pub mod hyperliquid;
pub mod retry;
pub mod setup;
pub mod status;
pub mod usdc;
pub mod wallet;

pub use config::setup_tracing;

#[cfg(test)]
pub(crate) mod test_utils;
