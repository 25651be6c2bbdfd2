/// Training loop: one episode per game, shuffled games per epoch.
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::core::agent::Agent;
use crate::core::engine::{Engine, SessionGuard};
use crate::core::runner::{game_name, resolve_games, run_episode, CancelToken, RunError};
use crate::schema::outcome::{GameProgress, TrainReport};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Glob pattern selecting the game files.
    pub games: String,
    pub max_steps: u32,
    pub nb_epochs: u32,
    /// Seed of the per-epoch shuffle.
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            games: format!("games/*.{}", crate::schema::state::GAME_EXTENSION),
            max_steps: 100,
            nb_epochs: 10,
            seed: 1234,
        }
    }
}

/// Produces the game order of successive epochs.
///
/// The RNG is seeded once, so the sequence of orderings depends only on the
/// seed and the input list.
pub struct EpochShuffler {
    games: Vec<PathBuf>,
    rng: StdRng,
}

impl EpochShuffler {
    pub fn new(games: Vec<PathBuf>, seed: u64) -> Self {
        Self {
            games,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn next_order(&mut self) -> &[PathBuf] {
        self.games.shuffle(&mut self.rng);
        &self.games
    }
}

pub struct Trainer<'e, E: ?Sized> {
    engine: &'e E,
    config: TrainConfig,
    cancel: CancelToken,
}

impl<'e, E: Engine + ?Sized> Trainer<'e, E> {
    pub fn new(engine: &'e E, config: TrainConfig) -> Self {
        Self {
            engine,
            config,
            cancel: CancelToken::new(),
        }
    }

    /// Use an externally owned token, typically wired to Ctrl-C.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Resolve the configured pattern and train on the matching games.
    pub fn train<A: Agent + ?Sized>(&self, agent: &mut A) -> Result<TrainReport, RunError> {
        let games = resolve_games(&self.config.games)?;
        self.train_on(agent, games)
    }

    /// Train on an explicit list of games.
    ///
    /// Engine and agent failures propagate. An interrupt ends the run with
    /// `interrupted` set; the in-flight session is still released and the
    /// agent's finish hook is skipped for that episode.
    pub fn train_on<A: Agent + ?Sized>(
        &self,
        agent: &mut A,
        games: Vec<PathBuf>,
    ) -> Result<TrainReport, RunError> {
        info!(
            agent = agent.name(),
            games = games.len(),
            epochs = self.config.nb_epochs,
            seed = self.config.seed,
            "training started"
        );
        agent.set_training(true);
        let mut shuffler = EpochShuffler::new(games, self.config.seed);
        let mut report = TrainReport::default();

        'epochs: for epoch in 0..self.config.nb_epochs {
            for game in shuffler.next_order() {
                if self.cancel.is_cancelled() {
                    report.interrupted = true;
                    break 'epochs;
                }

                let mut guard = SessionGuard::open(self.engine, game)?;
                let run = run_episode(
                    &mut *agent,
                    guard.as_dyn(),
                    self.config.max_steps,
                    Some(&self.cancel),
                )?;
                if run.interrupted {
                    if let Err(e) = guard.release() {
                        warn!(game = %game.display(), "failed to close interrupted session: {}", e);
                    }
                    report.interrupted = true;
                    break 'epochs;
                }
                guard.release()?;
                agent.finish(&run.state, run.reward, run.done)?;

                let outcome = run.outcome();
                let name = game_name(game);
                info!(
                    "{:02}. {}: {:3} steps; {:4} reward",
                    epoch, name, outcome.moves, outcome.total_reward
                );
                report.progress.push(GameProgress {
                    epoch,
                    game: name,
                    outcome,
                });
            }
            report.epochs_completed = epoch + 1;
        }

        if report.interrupted {
            warn!(
                epochs_completed = report.epochs_completed,
                episodes = report.progress.len(),
                "training interrupted"
            );
        } else {
            info!(
                episodes = report.progress.len(),
                total_reward = report.total_reward(),
                "training finished"
            );
        }
        Ok(report)
    }
}
