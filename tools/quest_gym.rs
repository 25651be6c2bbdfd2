/// Quest Gym: play or train agents on text-adventure games.
///
/// Usage:
///   quest-gym play --agent random --game games/level1/quest.ulx
///   quest-gym train --agent neural --games "games/train/*.ulx" --epochs 20
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use quest_gym::config::{EngineKind, GymConfig};
use quest_gym::core::agent::{Agent, RandomAgent, WalkthroughAgent};
use quest_gym::core::engine::Engine;
use quest_gym::core::neural::NeuralAgent;
use quest_gym::core::process::ProcessEngine;
use quest_gym::core::runner::{play, CancelToken};
use quest_gym::core::script::ScriptedEngine;
use quest_gym::core::trainer::Trainer;
use quest_gym::schema::outcome::TrainReport;

/// Exit status after a second Ctrl+C, as shells report SIGINT.
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Parser)]
#[command(name = "quest-gym")]
#[command(version)]
#[command(about = "Play or train agents on text-adventure games", long_about = None)]
struct Cli {
    /// RON configuration file
    #[arg(short, long, global = true, env = "QUEST_GYM_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play one game for several episodes and report averages
    Play {
        /// Game file to play
        #[arg(short, long)]
        game: PathBuf,
        /// Number of episodes
        #[arg(short, long)]
        episodes: Option<u32>,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Train an agent on a set of games
    Train {
        /// Glob pattern selecting the training games
        #[arg(long)]
        games: Option<String>,
        /// Number of epochs
        #[arg(long)]
        epochs: Option<u32>,
        /// Seed of the per-epoch shuffle
        #[arg(long)]
        shuffle_seed: Option<u64>,
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Agent to run
    #[arg(short, long, value_enum, default_value_t = AgentKind::Random)]
    agent: AgentKind,
    /// Step budget per episode
    #[arg(long)]
    max_steps: Option<u32>,
    /// Engine implementation (overrides the config file)
    #[arg(long, value_enum)]
    engine: Option<EngineArg>,
    /// Seed of the agent's own randomness
    #[arg(long, default_value = "42")]
    seed: u64,
    /// Neural agent checkpoint (loaded if present, written after training)
    #[arg(long)]
    checkpoint: Option<PathBuf>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AgentKind {
    Random,
    Walkthrough,
    Neural,
}

#[derive(Clone, Copy, ValueEnum)]
enum EngineArg {
    Process,
    Script,
}

impl From<EngineArg> for EngineKind {
    fn from(arg: EngineArg) -> Self {
        match arg {
            EngineArg::Process => EngineKind::Process,
            EngineArg::Script => EngineKind::Script,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let mut config = GymConfig::load_or_default(cli.config.as_deref())
        .context("failed to load configuration")?;

    match cli.command {
        Commands::Play {
            game,
            episodes,
            common,
        } => {
            apply_common(&mut config, &common);
            if let Some(n) = episodes {
                config.play.nb_episodes = n;
            }
            let mut agent = build_agent(&config, &common)?;
            let summary = match config.engine.kind {
                EngineKind::Process => {
                    let engine =
                        ProcessEngine::new(&config.engine.program, config.engine.args.clone());
                    play_game(&mut agent, &engine, &game, &config)?
                }
                EngineKind::Script => play_game(&mut agent, &ScriptedEngine::new(), &game, &config)?,
            };
            println!(
                "avg. steps: {:5.1}; avg. score: {:4.1} / {}.",
                summary.avg_moves(),
                summary.avg_score(),
                summary.max_score()
            );
        }
        Commands::Train {
            games,
            epochs,
            shuffle_seed,
            common,
        } => {
            apply_common(&mut config, &common);
            if let Some(pattern) = games {
                config.train.games = pattern;
            }
            if let Some(n) = epochs {
                config.train.nb_epochs = n;
            }
            if let Some(seed) = shuffle_seed {
                config.train.seed = seed;
            }

            let cancel = CancelToken::new();
            let interrupt = cancel.clone();
            tokio::spawn(async move {
                if let Err(e) = signal::ctrl_c().await {
                    warn!("failed to install Ctrl+C handler: {}", e);
                    return;
                }
                warn!("interrupt received, stopping after the current step (Ctrl+C again to abort)");
                interrupt.cancel();
                if signal::ctrl_c().await.is_ok() {
                    eprintln!("Aborted.");
                    std::process::exit(INTERRUPTED_EXIT_CODE);
                }
            });

            let report = tokio::task::spawn_blocking(move || train_blocking(config, common, cancel))
                .await
                .context("training task panicked")??;

            if report.interrupted {
                println!("Keyboard interrupt.");
            }
            println!(
                "{} episodes over {} epochs; total reward {}.",
                report.progress.len(),
                report.epochs_completed,
                report.total_reward()
            );
        }
    }

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn apply_common(config: &mut GymConfig, common: &CommonArgs) {
    if let Some(engine) = common.engine {
        config.engine.kind = engine.into();
    }
    if let Some(max_steps) = common.max_steps {
        config.play.max_steps = max_steps;
        config.train.max_steps = max_steps;
    }
    config.neural.seed = common.seed;
}

fn build_agent(config: &GymConfig, common: &CommonArgs) -> Result<Box<dyn Agent>> {
    Ok(match common.agent {
        AgentKind::Random => Box::new(RandomAgent::new(common.seed)),
        AgentKind::Walkthrough => Box::new(WalkthroughAgent::new()),
        AgentKind::Neural => Box::new(load_neural(config, common.checkpoint.as_deref())?),
    })
}

fn load_neural(config: &GymConfig, checkpoint: Option<&Path>) -> Result<NeuralAgent> {
    let mut agent =
        NeuralAgent::new(config.neural.clone()).context("invalid neural configuration")?;
    if let Some(path) = checkpoint.filter(|p| p.exists()) {
        agent
            .load_checkpoint(path)
            .with_context(|| format!("failed to load checkpoint {}", path.display()))?;
        info!(path = %path.display(), "checkpoint loaded");
    }
    Ok(agent)
}

fn play_game<E: Engine>(
    agent: &mut Box<dyn Agent>,
    engine: &E,
    game: &Path,
    config: &GymConfig,
) -> Result<quest_gym::schema::outcome::RunSummary> {
    play(
        agent,
        engine,
        game,
        config.play.max_steps,
        config.play.nb_episodes,
    )
    .with_context(|| format!("failed to play {}", game.display()))
}

fn train_blocking(config: GymConfig, common: CommonArgs, cancel: CancelToken) -> Result<TrainReport> {
    if common.agent != AgentKind::Neural {
        let mut agent = build_agent(&config, &common)?;
        return train_with(&config, &mut agent, cancel);
    }

    let mut agent = load_neural(&config, common.checkpoint.as_deref())?;
    // Parameters reached before an interrupt are still worth keeping.
    let report = train_with(&config, &mut agent, cancel)?;
    if let Some(path) = &common.checkpoint {
        agent
            .save_checkpoint(path)
            .with_context(|| format!("failed to save checkpoint {}", path.display()))?;
        info!(path = %path.display(), "checkpoint saved");
    }
    Ok(report)
}

fn train_with<A: Agent + ?Sized>(
    config: &GymConfig,
    agent: &mut A,
    cancel: CancelToken,
) -> Result<TrainReport> {
    let report = match config.engine.kind {
        EngineKind::Process => {
            let engine = ProcessEngine::new(&config.engine.program, config.engine.args.clone());
            Trainer::new(&engine, config.train.clone())
                .with_cancel(cancel)
                .train(agent)
        }
        EngineKind::Script => Trainer::new(&ScriptedEngine::new(), config.train.clone())
            .with_cancel(cancel)
            .train(agent),
    };
    report.context("training failed")
}
