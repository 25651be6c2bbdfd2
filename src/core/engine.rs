/// Engine seam: the traits the loops drive, and the scoped session handle.
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::schema::reward::InvalidReward;
use crate::schema::state::{GameState, Transition};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to start game {path:?}: {reason}")]
    Start { path: PathBuf, reason: String },
    #[error("engine reported an error: {0}")]
    Remote(String),
    #[error("engine protocol error: {0}")]
    Protocol(String),
    #[error("session is closed")]
    Closed,
    #[error("session does not support {0}")]
    Unsupported(&'static str),
    #[error("step called on a finished game")]
    GameOver,
    #[error("script has no stages")]
    EmptyScript,
    #[error(transparent)]
    Reward(#[from] InvalidReward),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// One started game. Implementations wrap whatever the underlying engine
/// exposes; the loops only ever talk to this trait.
pub trait Session {
    /// Ask the engine to track admissible and policy commands. Must be
    /// called before `reset` for those fields to be populated.
    fn activate_state_tracking(&mut self) -> Result<(), EngineError>;

    /// Ask the engine for per-step rewards instead of terminal-only ones.
    fn compute_intermediate_reward(&mut self) -> Result<(), EngineError>;

    fn reset(&mut self) -> Result<GameState, EngineError>;

    fn step(&mut self, command: &str) -> Result<Transition, EngineError>;

    /// Full winning command sequence from the initial state.
    fn walkthrough(&mut self) -> Result<Vec<String>, EngineError> {
        Err(EngineError::Unsupported("walkthrough"))
    }

    fn close(&mut self) -> Result<(), EngineError>;
}

/// Something that can start sessions for game files.
pub trait Engine {
    type Session: Session;

    fn start(&self, game: &Path) -> Result<Self::Session, EngineError>;
}

/// Owns a session and closes it exactly once.
///
/// `release` closes and reports the close error. If the guard is dropped
/// without being released (an error was propagated, or a panic unwound),
/// the session is closed in `Drop` and a failure is only logged.
pub struct SessionGuard<S: Session> {
    session: S,
    game: PathBuf,
    released: bool,
}

impl<S: Session> SessionGuard<S> {
    /// Start a session for `game` and request the state the loops rely on.
    pub fn open<E>(engine: &E, game: &Path) -> Result<Self, EngineError>
    where
        E: Engine<Session = S> + ?Sized,
    {
        let session = engine.start(game)?;
        let mut guard = Self {
            session,
            game: game.to_path_buf(),
            released: false,
        };
        guard.session.activate_state_tracking()?;
        guard.session.compute_intermediate_reward()?;
        tracing::debug!(game = %game.display(), "session opened");
        Ok(guard)
    }

    pub fn game(&self) -> &Path {
        &self.game
    }

    pub fn as_dyn(&mut self) -> &mut dyn Session {
        &mut self.session
    }

    pub fn release(mut self) -> Result<(), EngineError> {
        self.released = true;
        tracing::debug!(game = %self.game.display(), "session released");
        self.session.close()
    }
}

impl<S: Session> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S: Session> DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

impl<S: Session> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.session.close() {
            tracing::warn!(game = %self.game.display(), "failed to close session: {}", e);
        }
    }
}
