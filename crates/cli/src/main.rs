use std::process::ExitCode;
use std::sync::Arc;

use alphasense_core::controller::AnalysisSession;
use alphasense_core::domain::analysis::{AnalysisRequest, AnalysisState, BacktestStrategy};
use alphasense_core::llm::gemini::GeminiClient;
use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod render;

#[derive(Debug, Parser)]
#[command(name = "alphasense", about = "AI-audited stock picks for the Nifty 200")]
struct Args {
    /// Print the controller snapshot as JSON instead of the text view.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fundamental audit: potential multi-baggers.
    Fundamental,
    /// Technical sniper: short-term momentum setups.
    Technical,
    /// Backtest a strategy over one of its fixed windows.
    Backtest {
        #[arg(long, value_enum)]
        strategy: StrategyArg,

        /// Window label, e.g. "3 Years" or "2 Weeks".
        #[arg(long)]
        period: String,
    },
    /// List the backtest windows offered for each strategy.
    Shortcuts,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    Fundamental,
    Technical,
}

impl From<StrategyArg> for BacktestStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Fundamental => BacktestStrategy::Fundamental,
            StrategyArg::Technical => BacktestStrategy::Technical,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    let settings = alphasense_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let request = match args.command {
        Command::Fundamental => AnalysisRequest::fundamental(),
        Command::Technical => AnalysisRequest::technical(),
        Command::Backtest { strategy, period } => {
            AnalysisRequest::backtest(strategy.into(), &period)?
        }
        Command::Shortcuts => {
            print!("{}", render::render_shortcuts());
            return Ok(ExitCode::SUCCESS);
        }
    };

    let client = GeminiClient::from_settings(&settings)?;
    let session = AnalysisSession::new(Arc::new(client));

    let (output, state) = run_once(&session, request, args.json).await?;
    print!("{output}");

    // A failed run is reported to Sentry by the controller's error event.
    if state == AnalysisState::Error {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Runs one analysis to completion and renders it as text or JSON.
async fn run_once(
    session: &AnalysisSession,
    request: AnalysisRequest,
    json: bool,
) -> anyhow::Result<(String, AnalysisState)> {
    let started = chrono::Utc::now();
    let snapshot = session
        .run(request)
        .await
        .context("a fresh session refused the request")?;
    tracing::debug!(
        state = snapshot.state.as_str(),
        elapsed_ms = (chrono::Utc::now() - started).num_milliseconds(),
        "analysis run finished"
    );

    let output = if json {
        format!("{}\n", serde_json::to_string_pretty(&snapshot)?)
    } else {
        session.with_controller(render::render_view).await
    };
    Ok((output, snapshot.state))
}

fn init_sentry(settings: &alphasense_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
