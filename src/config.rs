use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use alloy::primitives::{Address, B256, address};
use clap::Parser;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::Level;
use url::Url;

use st0x_bridge::Asset;
use st0x_bridge::lifi::{DEFAULT_API_BASE, LifiConfig};
use st0x_evm::ChainId;
use st0x_evm::local::{LocalWallet, LocalWalletError};

use crate::deposit::DepositSettings;
use crate::hyperliquid::{FeeRate, InvalidFeeRate, MAINNET_API_URL, VenueNetwork};
use crate::retry::RetryPolicy;
use crate::setup::SetupSettings;
use crate::usdc::{USDC_DECIMALS, Usdc};
use crate::wallet::DEFAULT_SETTLE_DELAY;

const ARBITRUM: ChainId = 42161;
const ARBITRUM_USDC: Address = address!("0xaf88d065e77c8cC2239327C5EDb3A432268e5831");
/// Hyperliquid bridge contract on Arbitrum.
const HYPERLIQUID_BRIDGE: Address = address!("0x2Df1c51E09aECF9cacB7bc98cB1742757f163dF7");
const DEFAULT_AGENT_NAME: &str = "st0x";
const DEFAULT_MAX_FEE_RATE: FeeRate = FeeRate(100);
const DEFAULT_SLIPPAGE_BPS: u32 = 50;

#[derive(Parser, Debug)]
pub struct Env {
    /// Path to plaintext TOML configuration file
    #[clap(long, env = "ONBOARD_CONFIG")]
    pub config: PathBuf,
    /// Path to TOML secrets file
    #[clap(long, env = "ONBOARD_SECRETS")]
    pub secrets: PathBuf,
}

/// Non-secret settings deserialized from the plaintext config TOML.
#[derive(Deserialize)]
struct Config {
    log_level: Option<LogLevel>,
    settle_delay_ms: Option<u64>,
    /// Chain the wallet starts on. Defaults to the deposit chain.
    initial_chain: Option<ChainId>,
    chains: Vec<ChainConfig>,
    hyperliquid: HyperliquidConfig,
    backend: BackendConfig,
    bridge: Option<BridgeConfig>,
    deposit: Option<DepositConfig>,
    retry: Option<RetryConfig>,
}

#[derive(Deserialize)]
struct ChainConfig {
    chain_id: ChainId,
    rpc_url: Url,
}

#[derive(Deserialize)]
struct HyperliquidConfig {
    api_url: Option<String>,
    network: Option<VenueNetwork>,
    signature_chain_id: Option<ChainId>,
    supported_signature_chains: Option<Vec<ChainId>>,
    agent_name: Option<String>,
    builder: Address,
    /// Percentage such as `"0.1%"`.
    max_fee_rate: Option<String>,
}

#[derive(Deserialize)]
struct BackendConfig {
    url: String,
}

#[derive(Deserialize)]
struct BridgeConfig {
    api_url: Option<String>,
    integrator: Option<String>,
    slippage_bps: Option<u32>,
    status_poll_interval_secs: Option<u64>,
    max_status_polls: Option<usize>,
}

#[derive(Deserialize)]
struct DepositConfig {
    chain_id: Option<ChainId>,
    token: Option<Address>,
    decimals: Option<u8>,
    custody_contract: Option<Address>,
    minimum: Option<Usdc>,
}

#[derive(Deserialize)]
struct RetryConfig {
    max_attempts: Option<usize>,
    initial_delay_ms: Option<u64>,
}

/// Secret credentials deserialized from the secrets TOML.
#[derive(Deserialize)]
struct Secrets {
    evm: EvmSecrets,
    backend: Option<ApiKeySecrets>,
    lifi: Option<ApiKeySecrets>,
}

#[derive(Deserialize)]
struct EvmSecrets {
    private_key: B256,
}

#[derive(Deserialize)]
struct ApiKeySecrets {
    api_key: String,
}

// ===== Runtime types (assembled from Config + Secrets) =====

/// Runtime context for the CLI, assembled from plaintext config and secrets.
#[derive(Clone)]
pub struct Ctx {
    pub log_level: LogLevel,
    pub settle_delay: Duration,
    pub initial_chain: ChainId,
    pub rpc_endpoints: HashMap<ChainId, Url>,
    pub venue_api_url: String,
    pub backend_url: String,
    pub backend_api_key: Option<String>,
    pub setup: SetupSettings,
    pub deposit: DepositSettings,
    pub lifi: LifiConfig,
    pub retry: RetryPolicy,
    private_key: B256,
}

impl std::fmt::Debug for Ctx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ctx")
            .field("log_level", &self.log_level)
            .field("settle_delay", &self.settle_delay)
            .field("initial_chain", &self.initial_chain)
            .field("rpc_endpoints", &self.rpc_endpoints)
            .field("venue_api_url", &self.venue_api_url)
            .field("backend_url", &self.backend_url)
            .field("setup", &self.setup)
            .field("deposit", &self.deposit)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(log_level: LogLevel) -> Self {
        match log_level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

impl From<&LogLevel> for Level {
    fn from(log_level: &LogLevel) -> Self {
        (*log_level).into()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML")]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    InvalidFeeRate(#[from] InvalidFeeRate),
    #[error("no RPC endpoint configured for chain {chain_id}")]
    MissingRpc { chain_id: ChainId },
    #[error("signature chain {chain_id} is not in supported_signature_chains")]
    UnsupportedSignatureChain { chain_id: ChainId },
    #[error("max_attempts must be at least 1")]
    ZeroRetryAttempts,
    #[error(transparent)]
    Wallet(#[from] LocalWalletError),
}

impl Ctx {
    pub fn load_files(config: &Path, secrets: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(config)?;
        let secrets_str = std::fs::read_to_string(secrets)?;
        Self::from_toml(&config_str, &secrets_str)
    }

    pub fn from_toml(config_toml: &str, secrets_toml: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(config_toml)?;
        let secrets: Secrets = toml::from_str(secrets_toml)?;

        let rpc_endpoints: HashMap<ChainId, Url> = config
            .chains
            .into_iter()
            .map(|chain| (chain.chain_id, chain.rpc_url))
            .collect();

        let setup = assemble_setup(&config.hyperliquid)?;
        let bridge = config.bridge;
        let slippage_bps = bridge
            .as_ref()
            .and_then(|bridge| bridge.slippage_bps)
            .unwrap_or(DEFAULT_SLIPPAGE_BPS);
        let deposit = assemble_deposit(config.deposit, slippage_bps);
        let lifi = assemble_lifi(bridge, secrets.lifi);
        let retry = assemble_retry(config.retry)?;

        let initial_chain = config.initial_chain.unwrap_or(deposit.destination.chain_id);

        for chain_id in [
            initial_chain,
            deposit.destination.chain_id,
            setup.signature_chain_id,
        ] {
            if !rpc_endpoints.contains_key(&chain_id) {
                return Err(ConfigError::MissingRpc { chain_id });
            }
        }

        Ok(Self {
            log_level: config.log_level.unwrap_or(LogLevel::Info),
            settle_delay: config
                .settle_delay_ms
                .map_or(DEFAULT_SETTLE_DELAY, Duration::from_millis),
            initial_chain,
            rpc_endpoints,
            venue_api_url: config
                .hyperliquid
                .api_url
                .unwrap_or_else(|| MAINNET_API_URL.to_string()),
            backend_url: config.backend.url,
            backend_api_key: secrets.backend.map(|backend| backend.api_key),
            setup,
            deposit,
            lifi,
            retry,
            private_key: secrets.evm.private_key,
        })
    }

    /// Local private-key wallet over the configured RPC endpoints.
    pub fn wallet(&self) -> Result<LocalWallet, ConfigError> {
        Ok(LocalWallet::new(
            self.private_key,
            self.rpc_endpoints.clone(),
            self.initial_chain,
        )?)
    }
}

fn assemble_setup(hyperliquid: &HyperliquidConfig) -> Result<SetupSettings, ConfigError> {
    let signature_chain_id = hyperliquid.signature_chain_id.unwrap_or(ARBITRUM);
    let supported_signature_chains = hyperliquid
        .supported_signature_chains
        .clone()
        .unwrap_or_else(|| vec![signature_chain_id]);

    if !supported_signature_chains.contains(&signature_chain_id) {
        return Err(ConfigError::UnsupportedSignatureChain {
            chain_id: signature_chain_id,
        });
    }

    let max_fee_rate = match &hyperliquid.max_fee_rate {
        Some(rate) => rate.parse()?,
        None => DEFAULT_MAX_FEE_RATE,
    };

    Ok(SetupSettings {
        network: hyperliquid.network.unwrap_or(VenueNetwork::Mainnet),
        signature_chain_id,
        supported_signature_chains,
        agent_name: hyperliquid
            .agent_name
            .clone()
            .unwrap_or_else(|| DEFAULT_AGENT_NAME.to_string()),
        builder: hyperliquid.builder,
        max_fee_rate,
    })
}

fn assemble_deposit(deposit: Option<DepositConfig>, slippage_bps: u32) -> DepositSettings {
    let deposit = deposit.unwrap_or(DepositConfig {
        chain_id: None,
        token: None,
        decimals: None,
        custody_contract: None,
        minimum: None,
    });

    DepositSettings {
        destination: Asset::new(
            deposit.chain_id.unwrap_or(ARBITRUM),
            deposit.token.unwrap_or(ARBITRUM_USDC),
        ),
        destination_decimals: deposit.decimals.unwrap_or(USDC_DECIMALS),
        custody_contract: deposit.custody_contract.unwrap_or(HYPERLIQUID_BRIDGE),
        minimum: deposit.minimum.unwrap_or(Usdc::new(Decimal::from(5))),
        slippage_bps,
    }
}

fn assemble_lifi(bridge: Option<BridgeConfig>, secrets: Option<ApiKeySecrets>) -> LifiConfig {
    let defaults = LifiConfig::default();
    let api_key = secrets.map(|lifi| lifi.api_key);

    let Some(bridge) = bridge else {
        return LifiConfig {
            api_key,
            ..defaults
        };
    };

    LifiConfig {
        api_base: bridge
            .api_url
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        integrator: bridge.integrator.unwrap_or(defaults.integrator),
        api_key,
        status_poll_interval: bridge
            .status_poll_interval_secs
            .map_or(defaults.status_poll_interval, Duration::from_secs),
        max_status_polls: bridge.max_status_polls.unwrap_or(defaults.max_status_polls),
    }
}

fn assemble_retry(retry: Option<RetryConfig>) -> Result<RetryPolicy, ConfigError> {
    let defaults = RetryPolicy::default();
    let Some(retry) = retry else {
        return Ok(defaults);
    };

    let max_attempts = retry.max_attempts.unwrap_or(defaults.max_attempts);
    if max_attempts == 0 {
        return Err(ConfigError::ZeroRetryAttempts);
    }

    Ok(RetryPolicy {
        max_attempts,
        initial_delay: retry
            .initial_delay_ms
            .map_or(defaults.initial_delay, Duration::from_millis),
    })
}

pub fn setup_tracing(log_level: &LogLevel) {
    let level: Level = log_level.into();
    let default_filter =
        format!("st0x_onboarding={level},st0x_bridge={level},st0x_evm={level}");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}
