/// Episode runner: alternates agent decisions and engine steps.
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::core::agent::{Agent, AgentError};
use crate::core::engine::{Engine, EngineError, Session, SessionGuard};
use crate::schema::outcome::{EpisodeOutcome, RunSummary, Termination};
use crate::schema::reward::Reward;
use crate::schema::state::GameState;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("agent error: {0}")]
    Agent(#[from] AgentError),
    #[error("invalid game pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("cannot read game path: {0}")]
    Glob(#[from] glob::GlobError),
    #[error("no game files match {0:?}")]
    NoGames(String),
}

/// Cooperative cancellation flag, shared between the loops and whoever
/// delivers the interrupt.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Raw result of driving one episode; the final state is kept so the
/// trainer can hand it to the agent's finish hook.
#[derive(Debug, Clone)]
pub struct EpisodeRun {
    pub state: GameState,
    pub reward: Reward,
    pub done: bool,
    pub steps: u32,
    pub total_reward: i32,
    pub interrupted: bool,
}

impl EpisodeRun {
    pub fn outcome(&self) -> EpisodeOutcome {
        let termination = if self.interrupted {
            Termination::Interrupted
        } else if self.state.won {
            Termination::Won
        } else if self.state.lost {
            Termination::Lost
        } else if self.done {
            Termination::Ended
        } else {
            Termination::StepBudget
        };
        EpisodeOutcome {
            steps: self.steps,
            moves: self.state.nb_moves,
            score: self.state.score,
            max_score: self.state.max_score,
            done: self.done,
            total_reward: self.total_reward,
            termination,
        }
    }
}

/// Play one episode on an already opened session.
///
/// The agent prepares, the session is reset, then decide/step alternate
/// until the engine signals done, `max_steps` commands were submitted, or
/// `cancel` fires. The token is checked before each step, never during one.
pub fn run_episode(
    agent: &mut (impl Agent + ?Sized),
    session: &mut dyn Session,
    max_steps: u32,
    cancel: Option<&CancelToken>,
) -> Result<EpisodeRun, RunError> {
    agent.prepare(session)?;
    let mut run = EpisodeRun {
        state: session.reset()?,
        reward: Reward::Neutral,
        done: false,
        steps: 0,
        total_reward: 0,
        interrupted: false,
    };

    while run.steps < max_steps {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            run.interrupted = true;
            break;
        }
        let command = agent.decide(&run.state, run.reward, run.done)?;
        let transition = session.step(&command)?;
        run.steps += 1;
        run.total_reward += transition.reward.value();
        debug!(
            step = run.steps,
            command = %command,
            reward = transition.reward.value(),
            done = transition.done,
            "step"
        );
        run.state = transition.state;
        run.reward = transition.reward;
        run.done = transition.done;
        if run.done {
            break;
        }
    }

    Ok(run)
}

/// Play `nb_episodes` episodes of one game and report mean moves and score.
///
/// One session serves the whole run; it is released when the run ends,
/// including when an episode fails.
pub fn play<E, A>(
    agent: &mut A,
    engine: &E,
    game: &Path,
    max_steps: u32,
    nb_episodes: u32,
) -> Result<RunSummary, RunError>
where
    E: Engine + ?Sized,
    A: Agent + ?Sized,
{
    let mut guard = SessionGuard::open(engine, game)?;
    let mut summary = RunSummary::default();

    for episode in 0..nb_episodes {
        let run = run_episode(&mut *agent, guard.as_dyn(), max_steps, None)?;
        let outcome = run.outcome();
        debug!(
            episode,
            moves = outcome.moves,
            score = outcome.score,
            termination = ?outcome.termination,
            "episode finished"
        );
        summary.push(outcome);
    }

    guard.release()?;
    debug!(
        agent = agent.name(),
        game = %game_name(game),
        episodes = nb_episodes,
        "avg. steps: {:5.1}; avg. score: {:4.1} / {}.",
        summary.avg_moves(),
        summary.avg_score(),
        summary.max_score()
    );
    Ok(summary)
}

/// File stem of a game path, used in progress reports.
pub fn game_name(game: &Path) -> String {
    game.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| game.display().to_string())
}

/// Expand a glob pattern into a sorted list of game files.
pub fn resolve_games(pattern: &str) -> Result<Vec<PathBuf>, RunError> {
    let mut games = Vec::new();
    for entry in glob::glob(pattern)? {
        let path = entry?;
        if path.is_file() {
            games.push(path);
        }
    }
    if games.is_empty() {
        return Err(RunError::NoGames(pattern.to_string()));
    }
    games.sort();
    Ok(games)
}
