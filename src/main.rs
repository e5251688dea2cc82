//! Admin CLI over a JSON state snapshot.
//!
//! Each invocation loads the snapshot, runs one platform operation,
//! saves the snapshot back, and prints the result as JSON.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use refledger::{
    GameKind, Platform, RewardClaim, RewardConfig, WalletKind,
};

#[derive(Parser)]
#[command(name = "refledger", about = "Reward-ledger admin tool", version)]
struct Cli {
    /// Path to the JSON state snapshot.
    #[arg(long, default_value = "refledger.snapshot.json")]
    state: PathBuf,
    /// Optional JSON file with a `RewardConfig` override.
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an empty snapshot.
    Init,
    /// Register an account, optionally under a sponsor's code.
    Register {
        account: String,
        #[arg(long)]
        sponsor_code: Option<String>,
    },
    /// Add a package tier to the catalog (JSON definition).
    AddPackage {
        /// Path to a JSON `PackageTier` file.
        tier: PathBuf,
    },
    /// Top up a wallet (simulated deposit).
    Credit {
        account: String,
        #[arg(long, value_parser = parse_wallet, default_value = "upgrade")]
        wallet: WalletKind,
        /// Amount in minor units.
        amount: u64,
    },
    /// Buy a package; runs level income and the direct bonus.
    BuyPackage {
        account: String,
        package: String,
        /// Idempotency key of the purchase event.
        #[arg(long)]
        event: String,
    },
    /// Wallet balances.
    Balance { account: String },
    /// Claim the daily login bonus.
    Login { account: String },
    /// Claim a video reward.
    Video {
        account: String,
        #[arg(long, value_parser = ["welcome", "ad", "unlock"])]
        kind: String,
        #[arg(long, default_value_t = 30)]
        watched: u32,
        #[arg(long, default_value_t = 30)]
        total: u32,
    },
    /// Claim a gaming reward for a finished session.
    Play {
        account: String,
        #[arg(long, value_parser = parse_game)]
        game: GameKind,
        #[arg(long)]
        score: u32,
        #[arg(long)]
        duration: u32,
    },
    /// Today's task progress.
    Tasks { account: String },
    /// Today's quota counters.
    Quota { account: String },
    /// Submit a withdrawal request.
    Withdraw {
        account: String,
        gross: u64,
        #[arg(long, default_value = "bank")]
        destination: String,
    },
    /// Approve or reject a pending withdrawal.
    Decide {
        request: Uuid,
        #[arg(long)]
        approve: bool,
        #[arg(long, default_value = "admin")]
        operator: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Mark an approved withdrawal as processed.
    Process {
        request: Uuid,
        #[arg(long, default_value = "admin")]
        operator: String,
    },
    /// Transaction history for an account.
    History { account: String },
    /// Downline statistics per level.
    Team {
        account: String,
        #[arg(long, default_value_t = 10)]
        depth: usize,
    },
}

fn parse_wallet(value: &str) -> Result<WalletKind, String> {
    match value {
        "upgrade" => Ok(WalletKind::Upgrade),
        "withdrawal" => Ok(WalletKind::Withdrawal),
        other => Err(format!("unknown wallet {other}, expected upgrade|withdrawal")),
    }
}

fn parse_game(value: &str) -> Result<GameKind, String> {
    match value {
        "casual" => Ok(GameKind::Casual),
        "arcade" => Ok(GameKind::Arcade),
        "puzzle" => Ok(GameKind::Puzzle),
        other => Err(format!("unknown game {other}, expected casual|arcade|puzzle")),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config: RewardConfig = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("read config {}", path.display()))?;
            serde_json::from_str(&raw).context("decode config")?
        }
        None => RewardConfig::default(),
    };

    if let Command::Init = cli.command {
        if cli.state.exists() {
            bail!("{} already exists", cli.state.display());
        }
        let platform = Platform::new(config);
        platform.save_to(&cli.state)?;
        eprintln!("created {}", cli.state.display());
        return Ok(());
    }

    let platform = Platform::load_from(&cli.state, config)?;
    match cli.command {
        Command::Init => unreachable!("handled above"),
        Command::Register { account, sponsor_code } => {
            let registered = platform.register(&account, sponsor_code.as_deref())?;
            print_json(&registered)?;
        }
        Command::AddPackage { tier } => {
            let raw = std::fs::read_to_string(&tier)
                .with_context(|| format!("read tier {}", tier.display()))?;
            let tier: refledger::PackageTier =
                serde_json::from_str(&raw).context("decode tier")?;
            platform.add_package(tier.clone())?;
            print_json(&tier)?;
        }
        Command::Credit { account, wallet, amount } => {
            let tx = platform.credit(&account, wallet, amount, "manual top-up")?;
            print_json(&tx)?;
        }
        Command::BuyPackage { account, package, event } => {
            let outcome = platform.buy_package(&account, &package, &event)?;
            print_json(&outcome)?;
        }
        Command::Balance { account } => {
            print_json(&platform.balances(&account)?)?;
        }
        Command::Login { account } => {
            print_json(&platform.claim_reward(&account, RewardClaim::LoginBonus)?)?;
        }
        Command::Video { account, kind, watched, total } => {
            let claim = match kind.as_str() {
                "welcome" => RewardClaim::WelcomeVideo,
                "unlock" => RewardClaim::GameUnlock,
                _ => RewardClaim::DailyAd { watched_secs: watched, total_secs: total },
            };
            print_json(&platform.claim_reward(&account, claim)?)?;
        }
        Command::Play { account, game, score, duration } => {
            let claim = RewardClaim::Game { game, score, duration_secs: duration };
            print_json(&platform.claim_reward(&account, claim)?)?;
        }
        Command::Tasks { account } => {
            let today = chrono::Utc::now().date_naive();
            print_json(&platform.daily_tasks(&account, today)?)?;
        }
        Command::Quota { account } => {
            let today = chrono::Utc::now().date_naive();
            print_json(&platform.quota_status(&account, today)?)?;
        }
        Command::Withdraw { account, gross, destination } => {
            print_json(&platform.submit_withdrawal(&account, gross, &destination)?)?;
        }
        Command::Decide { request, approve, operator, notes } => {
            print_json(&platform.decide_withdrawal(
                &request,
                approve,
                &operator,
                notes.as_deref(),
            )?)?;
        }
        Command::Process { request, operator } => {
            print_json(&platform.mark_processed(&request, &operator)?)?;
        }
        Command::History { account } => {
            print_json(&platform.history(&account, None, None)?)?;
        }
        Command::Team { account, depth } => {
            print_json(&platform.team_report(&account, depth)?)?;
        }
    }
    platform.save_to(&cli.state)?;
    Ok(())
}
