//! Agent API and the non-learning agents.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use thiserror::Error;

use crate::core::engine::{EngineError, Session};
use crate::schema::reward::Reward;
use crate::schema::state::GameState;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("no admissible commands; was state tracking activated?")]
    NoAdmissibleCommands,
    #[error("walkthrough exhausted after {0} commands")]
    WalkthroughExhausted(usize),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("checkpoint does not fit this agent: {0}")]
    Checkpoint(String),
    #[error("invalid agent configuration: {0}")]
    InvalidConfig(String),
}

/// Anything that can pick commands for a text game: random, oracle, or
/// learned.
///
/// Per episode the loops call `prepare` once, `decide` for every
/// non-terminal state, and (in training) `finish` with the final state.
pub trait Agent {
    fn name(&self) -> &str;

    /// Called before the session is reset for a new episode.
    fn prepare(&mut self, _session: &mut dyn Session) -> Result<(), AgentError> {
        Ok(())
    }

    /// Choose the next command. Only called with a non-terminal state.
    fn decide(
        &mut self,
        state: &GameState,
        reward: Reward,
        done: bool,
    ) -> Result<String, AgentError>;

    /// Learning hook, called with the last state of an episode.
    fn finish(&mut self, _state: &GameState, _reward: Reward, _done: bool) -> Result<(), AgentError> {
        Ok(())
    }

    /// Switch between training and evaluation behaviour.
    fn set_training(&mut self, _training: bool) {}
}

impl<A: Agent + ?Sized> Agent for Box<A> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn prepare(&mut self, session: &mut dyn Session) -> Result<(), AgentError> {
        (**self).prepare(session)
    }

    fn decide(
        &mut self,
        state: &GameState,
        reward: Reward,
        done: bool,
    ) -> Result<String, AgentError> {
        (**self).decide(state, reward, done)
    }

    fn finish(&mut self, state: &GameState, reward: Reward, done: bool) -> Result<(), AgentError> {
        (**self).finish(state, reward, done)
    }

    fn set_training(&mut self, training: bool) {
        (**self).set_training(training)
    }
}

/// Uniformly samples one of the admissible commands.
#[derive(Debug, Clone)]
pub struct RandomAgent {
    rng: StdRng,
}

impl RandomAgent {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Agent for RandomAgent {
    fn name(&self) -> &str {
        "random"
    }

    fn decide(
        &mut self,
        state: &GameState,
        _reward: Reward,
        _done: bool,
    ) -> Result<String, AgentError> {
        if state.admissible_commands.is_empty() {
            return Err(AgentError::NoAdmissibleCommands);
        }
        let idx = self.rng.gen_range(0..state.admissible_commands.len());
        Ok(state.admissible_commands[idx].clone())
    }
}

/// Replays the game's winning command sequence.
///
/// The walkthrough is fetched from the session in `prepare`. Sessions that
/// cannot provide one fall back to the policy commands carried by each
/// state.
#[derive(Debug, Clone, Default)]
pub struct WalkthroughAgent {
    commands: VecDeque<String>,
    issued: usize,
    from_session: bool,
}

impl WalkthroughAgent {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Agent for WalkthroughAgent {
    fn name(&self) -> &str {
        "walkthrough"
    }

    fn prepare(&mut self, session: &mut dyn Session) -> Result<(), AgentError> {
        self.issued = 0;
        match session.walkthrough() {
            Ok(commands) => {
                self.commands = commands.into();
                self.from_session = true;
            }
            Err(EngineError::Unsupported(_)) => {
                self.commands.clear();
                self.from_session = false;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    fn decide(
        &mut self,
        state: &GameState,
        _reward: Reward,
        _done: bool,
    ) -> Result<String, AgentError> {
        let next = if self.from_session {
            self.commands.pop_front()
        } else {
            state.policy_commands.first().cloned()
        };
        let command = next.ok_or(AgentError::WalkthroughExhausted(self.issued))?;
        self.issued += 1;
        Ok(command)
    }
}
