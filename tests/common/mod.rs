//! Test doubles shared by the integration tests.
#![allow(dead_code)]

use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;

use quest_gym::core::agent::{Agent, AgentError, RandomAgent};
use quest_gym::core::engine::{Engine, EngineError, Session};
use quest_gym::core::runner::CancelToken;
use quest_gym::core::script::{ScriptedEngine, ScriptedSession};
use quest_gym::schema::reward::Reward;
use quest_gym::schema::state::{GameState, Transition};

pub const FIVE_STEPS: &str = "tests/fixtures/quests/five_steps.ron";
pub const QUESTS: &str = "tests/fixtures/quests/*.ron";

/// Scripted engine that counts opened and closed sessions.
#[derive(Default)]
pub struct CountingEngine {
    inner: ScriptedEngine,
    pub opened: Rc<Cell<u32>>,
    pub closed: Rc<Cell<u32>>,
    /// Sessions report an error from `close` (after closing).
    pub fail_close: bool,
}

impl CountingEngine {
    pub fn failing_close() -> Self {
        Self {
            fail_close: true,
            ..Self::default()
        }
    }
}

impl Engine for CountingEngine {
    type Session = CountingSession;

    fn start(&self, game: &Path) -> Result<CountingSession, EngineError> {
        let inner = self.inner.start(game)?;
        self.opened.set(self.opened.get() + 1);
        Ok(CountingSession {
            inner,
            closed: Rc::clone(&self.closed),
            fail_close: self.fail_close,
        })
    }
}

pub struct CountingSession {
    inner: ScriptedSession,
    closed: Rc<Cell<u32>>,
    fail_close: bool,
}

impl Session for CountingSession {
    fn activate_state_tracking(&mut self) -> Result<(), EngineError> {
        self.inner.activate_state_tracking()
    }

    fn compute_intermediate_reward(&mut self) -> Result<(), EngineError> {
        self.inner.compute_intermediate_reward()
    }

    fn reset(&mut self) -> Result<GameState, EngineError> {
        self.inner.reset()
    }

    fn step(&mut self, command: &str) -> Result<Transition, EngineError> {
        self.inner.step(command)
    }

    fn walkthrough(&mut self) -> Result<Vec<String>, EngineError> {
        self.inner.walkthrough()
    }

    fn close(&mut self) -> Result<(), EngineError> {
        self.closed.set(self.closed.get() + 1);
        self.inner.close()?;
        if self.fail_close {
            return Err(EngineError::Remote("close refused".to_string()));
        }
        Ok(())
    }
}

/// Random agent that fires a cancel token after a number of decisions and
/// counts how often its finish hook ran.
pub struct CancellingAgent {
    inner: RandomAgent,
    token: CancelToken,
    cancel_after: u32,
    pub decisions: u32,
    pub finishes: u32,
}

impl CancellingAgent {
    pub fn new(token: CancelToken, cancel_after: u32) -> Self {
        Self {
            inner: RandomAgent::new(5),
            token,
            cancel_after,
            decisions: 0,
            finishes: 0,
        }
    }
}

impl Agent for CancellingAgent {
    fn name(&self) -> &str {
        "cancelling"
    }

    fn decide(
        &mut self,
        state: &GameState,
        reward: Reward,
        done: bool,
    ) -> Result<String, AgentError> {
        self.decisions += 1;
        if self.decisions == self.cancel_after {
            self.token.cancel();
        }
        self.inner.decide(state, reward, done)
    }

    fn finish(&mut self, _state: &GameState, _reward: Reward, _done: bool) -> Result<(), AgentError> {
        self.finishes += 1;
        Ok(())
    }
}

/// Agent that always submits the same command.
pub struct StubbornAgent(pub &'static str);

impl Agent for StubbornAgent {
    fn name(&self) -> &str {
        "stubborn"
    }

    fn decide(
        &mut self,
        _state: &GameState,
        _reward: Reward,
        _done: bool,
    ) -> Result<String, AgentError> {
        Ok(self.0.to_string())
    }
}
