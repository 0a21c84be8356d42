//! glowpost command-line interface.
//!
//! Thin wrapper over the library: loads configuration, wires up the real or
//! mock collaborators, and exposes the operator surface (run, drain, queue
//! and budget inspection).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use rust_decimal::Decimal;

use glowpost::alert::LogAlerts;
use glowpost::budget::{BudgetLedger, Period};
use glowpost::clients::{
    AmazonLinkFormatter, MockImageBackend, MockPublisher, MockTextBackend, MockTrendSource,
    OpenAiConfig, OpenAiImageBackend, OpenAiTextBackend, PinterestClient, PinterestConfig,
    PinterestTokenRefresher,
};
use glowpost::config::AppConfig;
use glowpost::content::ContentPipeline;
use glowpost::publish::{AuthRefresher, Publisher, PublishingApi};
use glowpost::queue::FallbackQueue;
use glowpost::run::{RunOrchestrator, RunResult};
use glowpost::trends::TrendSource;

#[derive(Parser)]
#[command(
    name = "glowpost",
    version,
    about = "Budget-capped affiliate content automation"
)]
struct Cli {
    /// Path to the configuration file (defaults to ./glowpost.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the state directory holding the ledger and queue stores
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute one posting run
    Run(RunArgs),
    /// Drain the fallback queue without posting new content
    Drain {
        /// Maximum queue entries to attempt
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Inspect or purge the fallback queue
    Queue {
        #[command(subcommand)]
        command: QueueCommand,
    },
    /// Inspect or reset the spend budget
    Budget {
        #[command(subcommand)]
        command: BudgetCommand,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Maximum posts this run
    #[arg(long)]
    limit: Option<usize>,

    /// Override the daily image spend cap, in USD
    #[arg(long)]
    budget_override: Option<Decimal>,

    /// Substitute mock collaborators: no network, no paid calls
    #[arg(long)]
    dry_run: bool,

    /// Skip the end-of-run queue drain
    #[arg(long)]
    no_drain: bool,

    /// Emit the run result as JSON instead of the human summary
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum QueueCommand {
    /// Show queue size and parked entries
    Status,
    /// Remove every entry, live and dead
    Purge,
}

#[derive(Subcommand)]
enum BudgetCommand {
    /// Show spend against both period caps
    Status,
    /// Zero the spend for a period
    Reset {
        #[arg(value_enum)]
        period: PeriodArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PeriodArg {
    Day,
    Month,
}

impl From<PeriodArg> for Period {
    fn from(value: PeriodArg) -> Self {
        match value {
            PeriodArg::Day => Period::Day,
            PeriodArg::Month => Period::Month,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    // Fall back to the user-level config when no file is given and the
    // working directory has none.
    let config_path = cli.config.clone().or_else(|| {
        dirs::config_dir()
            .map(|dir| dir.join("glowpost").join("glowpost.toml"))
            .filter(|path| path.exists())
    });
    let mut app = AppConfig::load(config_path.as_deref())?;
    if let Some(dir) = cli.state_dir {
        app.state_dir = dir;
    }

    match cli.command {
        Command::Run(args) => run(app, args).await,
        Command::Drain { limit } => drain(app, limit).await,
        Command::Queue { command } => queue_command(&app, command),
        Command::Budget { command } => budget_command(&app, command),
    }
}

async fn run(mut app: AppConfig, args: RunArgs) -> Result<()> {
    if let Some(limit) = args.limit {
        app.run.post_limit = limit;
    }
    if args.no_drain {
        app.run.drain_after_run = false;
    }
    if let Some(cap) = args.budget_override {
        app.budget.daily_image_cap = cap;
    }

    let orchestrator = if args.dry_run {
        println!("{}", "dry run: mock collaborators, no paid calls".yellow());
        build_mock_orchestrator(&app)
    } else {
        build_live_orchestrator(&app)?
    };

    let result = orchestrator.execute().await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_run_result(&result);
    }

    if result.shutdown_signaled {
        bail!("run halted after repeated fatal failures; inspect the queue before the next run");
    }
    Ok(())
}

async fn drain(mut app: AppConfig, limit: Option<usize>) -> Result<()> {
    if let Some(limit) = limit {
        app.run.drain_batch_size = limit;
    }

    let orchestrator = build_live_orchestrator(&app)?;
    let report = orchestrator.drain().await?;
    println!(
        "drained {} of {} attempted, {} remaining",
        report.delivered.to_string().green(),
        report.attempted,
        report.remaining
    );
    Ok(())
}

fn queue_command(app: &AppConfig, command: QueueCommand) -> Result<()> {
    let queue = FallbackQueue::new(&app.state_dir, app.queue.clone());
    match command {
        QueueCommand::Status => {
            let entries = queue.entries()?;
            let live = entries.iter().filter(|e| e.is_live()).count();
            let dead = entries.len() - live;
            println!("{live} live, {dead} dead");
            for entry in entries {
                let state = if entry.is_live() {
                    "pending".cyan()
                } else {
                    "dead".red()
                };
                println!(
                    "  [{state}] {} attempts={} last={} reason={}",
                    entry.candidate.topic,
                    entry.attempts,
                    entry.last_attempt_at.format("%Y-%m-%d %H:%M"),
                    entry.reason
                );
            }
        }
        QueueCommand::Purge => {
            let removed = queue.purge()?;
            println!("purged {} entries", removed.to_string().yellow());
        }
    }
    Ok(())
}

fn budget_command(app: &AppConfig, command: BudgetCommand) -> Result<()> {
    let ledger = BudgetLedger::new(&app.state_dir, app.budget.clone());
    match command {
        BudgetCommand::Status => {
            let report = ledger.status()?;
            print_budget_entry("day", report.day.as_ref());
            print_budget_entry("month", report.month.as_ref());
        }
        BudgetCommand::Reset { period } => {
            let period = Period::from(period);
            ledger.reset(period)?;
            println!("{} budget reset", period.label());
        }
    }
    Ok(())
}

fn print_budget_entry(label: &str, entry: Option<&glowpost::budget::BudgetEntry>) {
    match entry {
        Some(entry) => println!(
            "{label}: spent {} of {} ({} remaining), period {}, last reset {}",
            entry.spent.to_string().cyan(),
            entry.cap,
            entry.remaining().to_string().green(),
            entry.period_key,
            entry.last_reset.format("%Y-%m-%d %H:%M"),
        ),
        None => println!("{label}: no spend recorded yet"),
    }
}

fn print_run_result(result: &RunResult) {
    println!(
        "attempted {}, succeeded {}, queued {}, failed {}, not attempted {}",
        result.attempted,
        result.succeeded.to_string().green(),
        result.queued.to_string().yellow(),
        result.failed_fatal.to_string().red(),
        result.not_attempted,
    );
    println!(
        "spend this run: {}  drained: {}",
        result.total_spend.to_string().cyan(),
        result.drained
    );
}

fn build_mock_orchestrator(app: &AppConfig) -> RunOrchestrator {
    let pipeline = ContentPipeline::new(
        app.content.clone(),
        Arc::new(MockImageBackend),
        Arc::new(MockTextBackend),
        Arc::new(AmazonLinkFormatter::new("mock-20")),
    );
    let publisher = Publisher::new(
        Arc::new(MockPublisher::default()) as Arc<dyn PublishingApi>,
        app.publisher.clone(),
    );
    RunOrchestrator::new(
        Arc::new(MockTrendSource) as Arc<dyn TrendSource>,
        app.trends.clone(),
        pipeline,
        publisher,
        BudgetLedger::new(&app.state_dir, app.budget.clone()),
        FallbackQueue::new(&app.state_dir, app.queue.clone()),
        Arc::new(LogAlerts),
        app.run.clone(),
    )
}

fn build_live_orchestrator(app: &AppConfig) -> Result<RunOrchestrator> {
    let openai_key = require_env("OPENAI_API_KEY")?;
    let pinterest_token = require_env("PINTEREST_ACCESS_TOKEN")?;
    let board_id = require_env("PINTEREST_BOARD_ID")?;
    let associate_tag = require_env("AMAZON_ASSOCIATE_TAG")?;

    let pinterest = Arc::new(
        PinterestClient::new(PinterestConfig::new(pinterest_token, board_id))
            .context("failed to build Pinterest client")?,
    );

    let openai = OpenAiConfig::new(openai_key);
    let image_backend = OpenAiImageBackend::new(openai.clone(), app.budget.image_cost)
        .context("failed to build image backend")?;
    let text_cost = app.budget.text_cost_for(app.content.caption_token_budget);
    let text_backend = OpenAiTextBackend::new(openai, text_cost)
        .context("failed to build text backend")?;

    let pipeline = ContentPipeline::new(
        app.content.clone(),
        Arc::new(image_backend),
        Arc::new(text_backend),
        Arc::new(AmazonLinkFormatter::new(associate_tag)),
    );

    let mut publisher = Publisher::new(
        Arc::clone(&pinterest) as Arc<dyn PublishingApi>,
        app.publisher.clone(),
    );
    if let (Ok(app_id), Ok(app_secret), Ok(refresh_token)) = (
        std::env::var("PINTEREST_APP_ID"),
        std::env::var("PINTEREST_APP_SECRET"),
        std::env::var("PINTEREST_REFRESH_TOKEN"),
    ) {
        let refresher = PinterestTokenRefresher::new(
            pinterest.base_url().to_string(),
            app_id,
            app_secret,
            refresh_token,
            pinterest.token_handle(),
        )
        .context("failed to build token refresher")?;
        publisher = publisher.with_auth_refresher(Arc::new(refresher) as Arc<dyn AuthRefresher>);
    }

    Ok(RunOrchestrator::new(
        Arc::clone(&pinterest) as Arc<dyn TrendSource>,
        app.trends.clone(),
        pipeline,
        publisher,
        BudgetLedger::new(&app.state_dir, app.budget.clone()),
        FallbackQueue::new(&app.state_dir, app.queue.clone()),
        Arc::new(LogAlerts),
        app.run.clone(),
    ))
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("missing required environment variable {name}"))
}
