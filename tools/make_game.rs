/// Make Game: validates generation options and forwards them to `tw-make`.
///
/// Usage:
///   make-game custom --world-size 2 --nb-objects 10 --quest-length 3 --output games/
///   make-game challenge tw-simple-level5 --seed 1234
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use quest_gym::config::GymConfig;
use quest_gym::core::make::{Challenge, CustomGame, GameKind, GameMaker, MakeOptions, MakeRequest};

#[derive(Parser)]
#[command(name = "make-game")]
#[command(version)]
#[command(about = "Generate text-adventure games with tw-make", long_about = None)]
struct Cli {
    /// Generator program (overrides the config file)
    #[arg(long, global = true, env = "TW_MAKE")]
    program: Option<PathBuf>,

    /// RON configuration file
    #[arg(short, long, global = true, env = "QUEST_GYM_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a game with custom world and quest sizes
    Custom {
        /// Number of rooms
        #[arg(long, default_value = "5")]
        world_size: u32,
        /// Number of objects besides the rooms
        #[arg(long, default_value = "10")]
        nb_objects: u32,
        /// Minimum number of actions the quest requires
        #[arg(long, default_value = "5")]
        quest_length: u32,
        /// Branching of the quest
        #[arg(long, default_value = "3")]
        quest_breadth: u32,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Generate a game for a predefined challenge
    Challenge {
        /// Challenge token, e.g. tw-simple-level5
        challenge: Challenge,
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Where to write the generated game
    #[arg(long)]
    output: Option<PathBuf>,
    /// Generation seed (drawn at random when omitted)
    #[arg(long)]
    seed: Option<u64>,
    /// Display the generated game's world
    #[arg(long)]
    view: bool,
    /// Verbose generator output
    #[arg(long)]
    verbose: bool,
    /// Grammar theme
    #[arg(long)]
    theme: Option<String>,
    #[arg(long)]
    include_adj: bool,
    #[arg(long)]
    blend_descriptions: bool,
    #[arg(long)]
    ambiguous_instructions: bool,
    #[arg(long)]
    only_last_action: bool,
    #[arg(long)]
    blend_instructions: bool,
}

impl From<CommonArgs> for MakeOptions {
    fn from(args: CommonArgs) -> Self {
        MakeOptions {
            output: args.output,
            seed: args.seed,
            view: args.view,
            verbose: args.verbose,
            theme: args.theme,
            include_adj: args.include_adj,
            blend_descriptions: args.blend_descriptions,
            ambiguous_instructions: args.ambiguous_instructions,
            only_last_action: args.only_last_action,
            blend_instructions: args.blend_instructions,
        }
    }
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = GymConfig::load_or_default(cli.config.as_deref())
        .context("failed to load configuration")?;
    let program = cli.program.unwrap_or(config.make.program);

    let (kind, common) = match cli.command {
        Commands::Custom {
            world_size,
            nb_objects,
            quest_length,
            quest_breadth,
            common,
        } => (
            GameKind::Custom(CustomGame {
                world_size,
                nb_objects,
                quest_length,
                quest_breadth,
            }),
            common,
        ),
        Commands::Challenge { challenge, common } => (GameKind::Challenge(challenge), common),
    };

    let request = MakeRequest::new(kind, common.into(), &mut rand::thread_rng())?;
    println!("Global seed: {}", request.seed);

    let game = GameMaker::new(program).make(&request)?;
    println!("Game generated: {}", game.path.display());
    Ok(())
}
