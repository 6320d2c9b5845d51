use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{error, info, warn};

use st0x_bridge::Bridge;
use st0x_bridge::lifi::LifiBridge;
use st0x_evm::ChainId;

use crate::backend::{Backend, BackendClient, TrackingApi};
use crate::config::{ConfigError, Ctx, Env};
use crate::deposit::{
    DepositEvent, DepositExecutor, DepositQuote, DepositRequest, DepositSettings, FundingSource,
};
use crate::hyperliquid::{HyperliquidClient, VenueApi};
use crate::setup::{
    SetupFacts, SetupOrchestrator, StepChecker, StepCompletion, StepError, StepStatus, StepTable,
    WorkflowStep,
};
use crate::status::{OnboardingStatus, StatusProjector, StatusSnapshot};
use crate::wallet::WalletCtx;

/// How long a finished deposit waits for its tracking call before exiting.
const TRACKING_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(name = "onboard")]
#[command(about = "Set up a managed venue account and fund it from any chain")]
#[command(version)]
pub struct CliEnv {
    #[clap(flatten)]
    env: Env,
    #[command(subcommand)]
    pub command: Commands,
}

impl CliEnv {
    /// Parse CLI arguments and load the config and secrets files they name
    pub fn parse_and_convert() -> anyhow::Result<(Ctx, Commands)> {
        let cli_env = Self::parse();
        let ctx = Ctx::load_files(&cli_env.env.config, &cli_env.env.secrets)?;
        Ok((ctx, cli_env.command))
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Check which setup steps are already complete, without changing anything
    Status,
    /// Run every incomplete setup step in order
    Setup,
    /// Price a deposit without executing it
    Quote(DepositArgs),
    /// Quote a deposit and execute it
    Deposit(DepositArgs),
}

#[derive(Debug, Args)]
pub struct DepositArgs {
    /// Chain holding the funds (defaults to the deposit chain)
    #[arg(long = "chain-id")]
    pub chain_id: Option<ChainId>,
    /// Token to deposit (defaults to the settlement token)
    #[arg(long)]
    pub token: Option<Address>,
    /// Decimals of the token (defaults to the settlement token's)
    #[arg(long)]
    pub decimals: Option<u8>,
    /// Amount in whole tokens, e.g. 7.5
    #[arg(long)]
    pub amount: Decimal,
}

impl DepositArgs {
    fn into_request(self, settings: &DepositSettings) -> DepositRequest {
        DepositRequest {
            source: FundingSource {
                chain_id: self.chain_id.unwrap_or(settings.destination.chain_id),
                token: self.token.unwrap_or(settings.destination.token),
                decimals: self.decimals.unwrap_or(settings.destination_decimals),
            },
            amount: self.amount,
        }
    }
}

/// Clients every command runs against.
pub struct Services {
    pub wallet: WalletCtx,
    pub backend: Arc<dyn Backend>,
    pub tracking: Arc<dyn TrackingApi>,
    pub venue: Arc<dyn VenueApi>,
    pub bridge: Arc<dyn Bridge>,
}

impl Services {
    pub fn connect(ctx: &Ctx) -> Result<Self, ConfigError> {
        let wallet = WalletCtx::new(Arc::new(ctx.wallet()?), ctx.settle_delay);
        let backend = Arc::new(BackendClient::new(
            ctx.backend_url.clone(),
            ctx.backend_api_key.clone(),
        ));

        Ok(Self {
            wallet,
            backend: backend.clone(),
            tracking: backend,
            venue: Arc::new(HyperliquidClient::new(ctx.venue_api_url.clone())),
            bridge: Arc::new(LifiBridge::new(ctx.lifi.clone())),
        })
    }
}

pub async fn run_command(ctx: Ctx, command: Commands) -> anyhow::Result<()> {
    let services = Services::connect(&ctx)?;
    info!(wallet = %services.wallet.address(), "Connected wallet");

    run_command_with_writers(&ctx, command, &services, &mut std::io::stdout()).await
}

async fn run_command_with_writers<W: Write>(
    ctx: &Ctx,
    command: Commands,
    services: &Services,
    stdout: &mut W,
) -> anyhow::Result<()> {
    match command {
        Commands::Status => check_status(ctx, services, stdout).await,
        Commands::Setup => run_setup(ctx, services, stdout).await,
        Commands::Quote(args) => {
            let request = args.into_request(&ctx.deposit);
            let quote = executor(ctx, services).quote(&request).await?;
            write_quote(stdout, &quote)?;
            Ok(())
        }
        Commands::Deposit(args) => {
            let request = args.into_request(&ctx.deposit);
            run_deposit(ctx, services, &request, stdout).await
        }
    }
}

async fn check_status<W: Write>(
    ctx: &Ctx,
    services: &Services,
    stdout: &mut W,
) -> anyhow::Result<()> {
    let table = check_steps(ctx, services).await?;

    let mut projector = StatusProjector::new();
    projector.project_setup(&table);
    write_snapshot(stdout, &projector.snapshot())?;

    Ok(())
}

/// Read-only pass over every setup step.
async fn check_steps(ctx: &Ctx, services: &Services) -> anyhow::Result<StepTable> {
    let checker = StepChecker::new(
        services.backend.clone(),
        services.venue.clone(),
        ctx.setup.clone(),
    );
    let address = services.wallet.address();
    let mut facts = SetupFacts::default();
    let mut table = StepTable::default();

    for step in WorkflowStep::ALL {
        match checker.check(step, address, &mut facts).await? {
            StepCompletion::Completed => table.complete(step),
            StepCompletion::Conflict(conflict) => {
                table.fail(step, StepError::from(conflict).to_string());
            }
            StepCompletion::Incomplete => {}
        }
    }

    Ok(table)
}

async fn run_setup<W: Write>(
    ctx: &Ctx,
    services: &Services,
    stdout: &mut W,
) -> anyhow::Result<()> {
    writeln!(stdout, "🔄 Running account setup for {}", services.wallet.address())?;

    let mut orchestrator = SetupOrchestrator::new(
        services.wallet.clone(),
        services.backend.clone(),
        services.venue.clone(),
        ctx.setup.clone(),
    );
    let result = orchestrator.start().await;

    let mut projector = StatusProjector::new();
    projector.project_setup(orchestrator.steps());
    write_snapshot(stdout, &projector.snapshot())?;

    if let Err(setup_error) = result {
        error!("Setup failed: {setup_error}");
        return Err(setup_error.into());
    }

    Ok(())
}

async fn run_deposit<W: Write>(
    ctx: &Ctx,
    services: &Services,
    request: &DepositRequest,
    stdout: &mut W,
) -> anyhow::Result<()> {
    let table = check_steps(ctx, services).await?;
    if !table.is_complete() {
        let mut projector = StatusProjector::new();
        projector.project_setup(&table);
        write_snapshot(stdout, &projector.snapshot())?;

        warn!("Refusing to deposit before account setup is complete");
        anyhow::bail!("account setup is incomplete, run `onboard setup` before depositing");
    }

    let executor = executor(ctx, services);
    let mut events = executor.subscribe();
    let mut projector = StatusProjector::new();

    let deposit = executor.deposit(request);
    tokio::pin!(deposit);

    let result = loop {
        tokio::select! {
            result = &mut deposit => break result,
            Ok(event) = events.recv() => {
                projector.apply(&event);
                write_event(stdout, &event, projector.status())?;
            }
        }
    };

    loop {
        match events.try_recv() {
            Ok(event) => {
                projector.apply(&event);
                write_event(stdout, &event, projector.status())?;
            }
            Err(TryRecvError::Lagged(_)) => {}
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }

    executor.wait_for_tracking(TRACKING_GRACE).await;

    let outcome = result?;
    writeln!(
        stdout,
        "   Flow {}: {} bridge transaction(s), deposit {}",
        outcome.flow_id,
        outcome.bridge_txs.len(),
        outcome.deposit_tx
    )?;

    Ok(())
}

fn executor(ctx: &Ctx, services: &Services) -> DepositExecutor {
    DepositExecutor::new(
        services.wallet.clone(),
        services.bridge.clone(),
        services.tracking.clone(),
        ctx.deposit.clone(),
        ctx.retry,
    )
}

fn write_snapshot<W: Write>(stdout: &mut W, snapshot: &StatusSnapshot) -> std::io::Result<()> {
    for view in &snapshot.steps {
        let marker = match view.status {
            StepStatus::Completed => "✅",
            StepStatus::InProgress => "🔄",
            StepStatus::Error => "❌",
            StepStatus::Pending => "⏳",
        };
        writeln!(stdout, "{marker} {}: {}", view.label, view.description)?;

        if let Some(error) = &view.error {
            writeln!(stdout, "   {error}")?;
        }
    }

    match &snapshot.status {
        OnboardingStatus::ReadyToDeposit => writeln!(stdout, "Ready to deposit"),
        OnboardingStatus::SetupFailed { step, .. } => writeln!(stdout, "Setup stopped at {step}"),
        OnboardingStatus::SettingUp { step } => writeln!(stdout, "Next step: {step}"),
        _ => writeln!(stdout, "Setup not started"),
    }
}

fn write_quote<W: Write>(stdout: &mut W, quote: &DepositQuote) -> std::io::Result<()> {
    if quote.is_direct() {
        writeln!(
            stdout,
            "Direct deposit of {} with no bridging",
            quote.to_amount_formatted
        )?;
        return Ok(());
    }

    writeln!(
        stdout,
        "Bridge {} -> {} (minimum {}) in about {}s",
        quote.from_amount_formatted,
        quote.to_amount_formatted,
        quote.to_amount_min,
        quote.estimated_duration.as_secs()
    )?;

    for (index, label) in quote.leg_labels().iter().enumerate() {
        writeln!(stdout, "   Leg {}: {label}", index + 1)?;
    }

    for fee in &quote.fees {
        writeln!(
            stdout,
            "   Fee {}: {} {}{}",
            fee.name,
            fee.amount,
            fee.symbol,
            if fee.included { " (included)" } else { "" }
        )?;
    }

    Ok(())
}

fn write_event<W: Write>(
    stdout: &mut W,
    event: &DepositEvent,
    status: &OnboardingStatus,
) -> std::io::Result<()> {
    match event {
        DepositEvent::QuoteReady { direct: true, .. } => {
            writeln!(stdout, "📋 Direct deposit, no bridging needed")
        }
        DepositEvent::QuoteReady { legs, .. } => {
            writeln!(stdout, "📋 Route with {} leg(s): {}", legs.len(), legs.join(", "))
        }
        DepositEvent::RateLimited(notice) => writeln!(stdout, "⏳ {}", notice.message()),
        DepositEvent::RateUpdate {
            leg,
            quoted,
            updated,
            accepted,
        } => writeln!(
            stdout,
            "⚠️  Leg {} rate moved from {quoted} to {updated}: {}",
            leg + 1,
            if *accepted { "accepted" } else { "declined" }
        ),
        DepositEvent::LegStatusChanged { leg, status, error } => {
            writeln!(stdout, "🔄 Leg {}: {status:?}", leg + 1)?;
            match error {
                Some(error) => writeln!(stdout, "   {error}"),
                None => Ok(()),
            }
        }
        DepositEvent::DepositLegChanged { status, .. } => {
            writeln!(stdout, "🏦 Custody deposit: {status:?}")
        }
        DepositEvent::ActiveLegChanged { .. } => Ok(()),
        DepositEvent::RouteCompleted { settled } => {
            writeln!(stdout, "🌉 Bridging complete, {settled} base units settled")
        }
        DepositEvent::DepositSubmitted { tx_hash } => {
            writeln!(stdout, "📤 Deposit submitted: {tx_hash}")
        }
        DepositEvent::DepositConfirmed { tx_hash } => {
            writeln!(stdout, "📦 Deposit confirmed: {tx_hash}")
        }
        DepositEvent::Completed { .. } => writeln!(stdout, "✅ Deposit complete"),
        DepositEvent::Failed { message } => {
            writeln!(stdout, "❌ Deposit failed: {message}")?;
            writeln!(stdout, "   Status: {status:?}")
        }
    }
}
