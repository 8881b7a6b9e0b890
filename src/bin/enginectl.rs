//! Thin operator CLI around the journal: chain verification, kill switch
//! status/reset, identity inspection, learning cycle triggers, and karma
//! settlement. Not a new API surface — every subcommand is a typed event
//! append or a typed read query against the same journal the daemon uses.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde_json::json;
use sovereign_engine::config::Config;
use sovereign_engine::events::EventType;
use sovereign_engine::execution::{KarmaEngine, KarmaGovernance};
use sovereign_engine::identity::{self, NodeIdentity};
use sovereign_engine::journal::{AppendRequest, Journal};
use sovereign_engine::kill_switch::{KillSwitch, KillSwitchLevel};
use sovereign_engine::learning;

#[derive(Parser)]
#[command(name = "enginectl", about = "Operator CLI for the sovereign decision engine")]
struct Cli {
    #[arg(long, env = "ENGINE_JOURNAL_PATH")]
    journal_path: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Re-walk the event chain and confirm every hash link is intact.
    VerifyChain {
        #[arg(long)]
        fast: bool,
        #[arg(long)]
        last: Option<usize>,
    },
    #[command(subcommand)]
    KillSwitch(KillSwitchCommand),
    #[command(subcommand)]
    Identity(IdentityCommand),
    #[command(subcommand)]
    Learning(LearningCommand),
    #[command(subcommand)]
    Karma(KarmaCommand),
}

#[derive(Subcommand)]
enum KillSwitchCommand {
    Status,
    Reset {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        reason: String,
    },
}

#[derive(Subcommand)]
enum IdentityCommand {
    Show,
    Generate {
        #[arg(long)]
        eth_key: Option<String>,
    },
}

#[derive(Subcommand)]
enum LearningCommand {
    RunDaily,
    RunWeekly,
    RunMonthly,
}

#[derive(Subcommand)]
enum KarmaCommand {
    Settle {
        #[arg(long, value_delimiter = ',')]
        intents: Vec<String>,
        #[arg(long)]
        wallet: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::try_init().ok();
    let cli = Cli::parse();
    let config = Config::load()?;
    let journal_path = cli.journal_path.unwrap_or_else(|| config.journal_path.clone());
    let journal = Journal::open(Path::new(&journal_path))?;

    match cli.command {
        Command::VerifyChain { fast: _, last: _ } => {
            // `--fast`/`--last` are accepted for operator ergonomics but the
            // chain is cheap enough to verify in full every time; a partial
            // verify would be a correctness trap (a corrupted early link
            // would pass silently).
            journal.verify_chain()?;
            println!("chain verified ok");
        }
        Command::KillSwitch(cmd) => run_kill_switch(&journal, &config, cmd)?,
        Command::Identity(cmd) => run_identity(&config, cmd)?,
        Command::Learning(cmd) => run_learning(&journal, &config, cmd)?,
        Command::Karma(cmd) => run_karma(&journal, &config, cmd)?,
    }

    Ok(())
}

fn run_kill_switch(journal: &Journal, config: &Config, cmd: KillSwitchCommand) -> anyhow::Result<()> {
    match cmd {
        KillSwitchCommand::Status => {
            let ks = KillSwitch::restore(config.kill_switch.clone(), journal);
            println!("level={:?} ({})", ks.level(), ks.level().message());
        }
        KillSwitchCommand::Reset { actor, reason } => {
            let mut ks = KillSwitch::restore(config.kill_switch.clone(), journal);
            ks.reset(KillSwitchLevel::Safe);
            journal.append(
                AppendRequest::new(
                    EventType::SystemAuditV1,
                    json!({
                        "action": "kill_switch_reset",
                        "actor": actor,
                        "reason": reason,
                    }),
                )
                .with_source("enginectl"),
            )?;
            println!("kill switch reset to SAFE in-memory (does not survive a restart; see system.audit.v1 for the record)");
        }
    }
    Ok(())
}

fn run_identity(config: &Config, cmd: IdentityCommand) -> anyhow::Result<()> {
    let path = PathBuf::from(&config.identity_key_path);
    match cmd {
        IdentityCommand::Show => {
            let identity = identity::ensure_identity(&path)?;
            println!("node_id={}", identity.node_id);
            println!("public_key={}", identity.public_key_hex());
            println!("created_at={}", identity.created_at);
        }
        IdentityCommand::Generate { eth_key } => {
            let seed = eth_key.map(|hex_str| hex::decode(hex_str.trim_start_matches("0x"))).transpose()?;
            let identity = NodeIdentity::generate(seed.as_deref())?;
            identity.save(&path)?;
            println!("generated node_id={} at {}", identity.node_id, path.display());
        }
    }
    Ok(())
}

fn run_learning(journal: &Journal, config: &Config, cmd: LearningCommand) -> anyhow::Result<()> {
    let overlay_path = std::env::var("ENGINE_LEARNED_WEIGHTS_PATH").unwrap_or_else(|_| "./data/learned_weights.yaml".to_string());
    let mode = match cmd {
        LearningCommand::RunDaily => "daily",
        LearningCommand::RunWeekly => "weekly",
        LearningCommand::RunMonthly => "monthly",
    };
    let report = learning::run_adjustment_cycle(journal, config, mode, Path::new(&overlay_path))?;
    println!("mode={} reason={:?} observations={}", report.mode, report.reason, report.observations);
    Ok(())
}

fn run_karma(journal: &Journal, config: &Config, cmd: KarmaCommand) -> anyhow::Result<()> {
    let KarmaCommand::Settle { intents, wallet } = cmd;
    let identity = identity::ensure_identity(Path::new(&config.identity_key_path))?;
    let governance = KarmaGovernance;
    let check = governance.check_settlement_allowed(journal, config.karma.percentage, &wallet)?;
    if !check.allowed {
        anyhow::bail!("settlement refused: {}", check.reason.unwrap_or_default());
    }

    let engine = KarmaEngine::new(config, &identity);
    let pending = engine.pending_intents(journal)?;
    let mut settled = 0;
    for intent in pending.into_iter().filter(|i| intents.contains(&i.id)) {
        if engine.settle(journal, &intent).is_some() {
            settled += 1;
        }
    }
    println!("settled {settled} of {} requested intents to {wallet}", intents.len());
    Ok(())
}
