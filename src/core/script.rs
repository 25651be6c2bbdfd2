/// Scripted engine: plays linear command scripts stored as RON files.
///
/// A script is a sequence of stages. Each stage offers a handful of
/// commands; exactly one advances the quest, hazards end it in a loss, and
/// the rest are harmless distractors. Winning scores 1 out of 1.
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::engine::{Engine, EngineError, Session};
use crate::schema::reward::Reward;
use crate::schema::state::{GameState, Transition};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestScript {
    pub objective: String,
    #[serde(default)]
    pub intro: String,
    pub stages: Vec<Stage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    pub description: String,
    pub command: String,
    #[serde(default)]
    pub distractors: Vec<String>,
    #[serde(default)]
    pub hazards: Vec<String>,
    #[serde(default)]
    pub feedback: String,
    /// Item added to the inventory when the stage is cleared.
    #[serde(default)]
    pub item: Option<String>,
}

impl QuestScript {
    pub fn load_from_ron(path: &Path) -> Result<QuestScript, EngineError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents).map_err(|e| match e {
            EngineError::EmptyScript => EngineError::Start {
                path: path.to_path_buf(),
                reason: "script has no stages".to_string(),
            },
            other => other,
        })
    }

    pub fn parse_ron(input: &str) -> Result<QuestScript, EngineError> {
        let script: QuestScript = ron::from_str(input)?;
        if script.stages.is_empty() {
            return Err(EngineError::EmptyScript);
        }
        Ok(script)
    }

    pub fn walkthrough(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.command.clone()).collect()
    }
}

/// Starts a [`ScriptedSession`] per RON script file.
#[derive(Debug, Clone, Default)]
pub struct ScriptedEngine;

impl ScriptedEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Engine for ScriptedEngine {
    type Session = ScriptedSession;

    fn start(&self, game: &Path) -> Result<ScriptedSession, EngineError> {
        let script = QuestScript::load_from_ron(game)?;
        Ok(ScriptedSession::new(script))
    }
}

#[derive(Debug, Clone)]
pub struct ScriptedSession {
    script: QuestScript,
    tracking: bool,
    intermediate: bool,
    stage: usize,
    moves: u32,
    inventory: Vec<String>,
    feedback: String,
    won: bool,
    lost: bool,
    closed: bool,
}

impl ScriptedSession {
    pub fn new(script: QuestScript) -> Self {
        Self {
            script,
            tracking: false,
            intermediate: false,
            stage: 0,
            moves: 0,
            inventory: Vec::new(),
            feedback: String::new(),
            won: false,
            lost: false,
            closed: false,
        }
    }

    fn done(&self) -> bool {
        self.won || self.lost
    }

    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.closed {
            Err(EngineError::Closed)
        } else {
            Ok(())
        }
    }

    fn admissible(&self) -> Vec<String> {
        let Some(stage) = self.script.stages.get(self.stage) else {
            return Vec::new();
        };
        let mut commands: Vec<String> = std::iter::once(&stage.command)
            .chain(&stage.distractors)
            .chain(&stage.hazards)
            .cloned()
            .collect();
        // Sorted so the position of the winning command carries no signal.
        commands.sort();
        commands.dedup();
        commands
    }

    fn snapshot(&self) -> GameState {
        let description = match self.script.stages.get(self.stage) {
            Some(stage) if !self.done() => stage.description.clone(),
            _ => "*** The End ***".to_string(),
        };
        let inventory = if self.inventory.is_empty() {
            "You are carrying nothing.".to_string()
        } else {
            format!("You are carrying: {}.", self.inventory.join(", "))
        };
        let (admissible_commands, policy_commands) = if self.tracking && !self.done() {
            (
                self.admissible(),
                self.script
                    .stages
                    .iter()
                    .skip(self.stage)
                    .map(|s| s.command.clone())
                    .collect(),
            )
        } else {
            (Vec::new(), Vec::new())
        };

        GameState {
            description,
            inventory,
            feedback: self.feedback.clone(),
            objective: self.script.objective.clone(),
            admissible_commands,
            policy_commands,
            nb_moves: self.moves,
            score: i32::from(self.won),
            max_score: 1,
            won: self.won,
            lost: self.lost,
        }
    }
}

impl Session for ScriptedSession {
    fn activate_state_tracking(&mut self) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.tracking = true;
        Ok(())
    }

    fn compute_intermediate_reward(&mut self) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.intermediate = true;
        Ok(())
    }

    fn reset(&mut self) -> Result<GameState, EngineError> {
        self.ensure_open()?;
        self.stage = 0;
        self.moves = 0;
        self.inventory.clear();
        self.feedback = self.script.intro.clone();
        self.won = false;
        self.lost = false;
        Ok(self.snapshot())
    }

    fn step(&mut self, command: &str) -> Result<Transition, EngineError> {
        self.ensure_open()?;
        if self.done() {
            return Err(EngineError::GameOver);
        }
        let stage = self
            .script
            .stages
            .get(self.stage)
            .ok_or(EngineError::GameOver)?;
        self.moves += 1;
        let command = command.trim();
        let reward = if command == stage.command {
            self.feedback = stage.feedback.clone();
            if let Some(item) = &stage.item {
                self.inventory.push(item.clone());
            }
            self.stage += 1;
            if self.stage == self.script.stages.len() {
                self.won = true;
                self.feedback.push_str(" *** You have won ***");
                Reward::Positive
            } else if self.intermediate {
                Reward::Positive
            } else {
                Reward::Neutral
            }
        } else if stage.hazards.iter().any(|h| h == command) {
            self.lost = true;
            self.feedback = "*** You have lost ***".to_string();
            Reward::Negative
        } else if stage.distractors.iter().any(|d| d == command) {
            self.feedback = "Nothing happens.".to_string();
            Reward::Neutral
        } else {
            self.feedback = "That's not a verb I recognise.".to_string();
            Reward::Neutral
        };

        Ok(Transition {
            state: self.snapshot(),
            reward,
            done: self.done(),
        })
    }

    fn walkthrough(&mut self) -> Result<Vec<String>, EngineError> {
        self.ensure_open()?;
        Ok(self.script.walkthrough())
    }

    fn close(&mut self) -> Result<(), EngineError> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script() -> QuestScript {
        QuestScript::parse_ron(
            r#"(
                objective: "Open the chest.",
                intro: "You are in a cellar.",
                stages: [
                    (
                        description: "A cellar with a key on the floor.",
                        command: "take key",
                        distractors: ["look"],
                        hazards: ["drink poison"],
                        feedback: "Taken.",
                        item: Some("key"),
                    ),
                    (
                        description: "A locked chest.",
                        command: "unlock chest with key",
                        distractors: ["look"],
                        feedback: "The chest opens.",
                    ),
                ],
            )"#,
        )
        .unwrap()
    }

    fn tracked_session() -> ScriptedSession {
        let mut session = ScriptedSession::new(script());
        session.activate_state_tracking().unwrap();
        session.compute_intermediate_reward().unwrap();
        session
    }

    #[test]
    fn admissible_commands_need_tracking() {
        let mut session = ScriptedSession::new(script());
        let state = session.reset().unwrap();
        assert!(state.admissible_commands.is_empty());

        let mut session = tracked_session();
        let state = session.reset().unwrap();
        assert_eq!(
            state.admissible_commands,
            vec!["drink poison", "look", "take key"]
        );
        assert_eq!(state.policy_commands, vec!["take key", "unlock chest with key"]);
        assert_eq!(state.feedback, "You are in a cellar.");
    }

    #[test]
    fn walkthrough_wins() {
        let mut session = tracked_session();
        session.reset().unwrap();
        let first = session.step("take key").unwrap();
        assert_eq!(first.reward, Reward::Positive);
        assert!(!first.done);
        assert!(first.state.inventory.contains("key"));

        let last = session.step("unlock chest with key").unwrap();
        assert!(last.done);
        assert!(last.state.won);
        assert_eq!(last.state.score, 1);
        assert_eq!(last.state.nb_moves, 2);
        assert!(last.state.admissible_commands.is_empty());
        assert!(matches!(session.step("look"), Err(EngineError::GameOver)));
    }

    #[test]
    fn hazard_loses() {
        let mut session = tracked_session();
        session.reset().unwrap();
        let t = session.step("drink poison").unwrap();
        assert!(t.done);
        assert!(t.state.lost);
        assert_eq!(t.reward, Reward::Negative);
        assert_eq!(t.state.score, 0);
    }

    #[test]
    fn terminal_only_rewards_without_intermediate() {
        let mut session = ScriptedSession::new(script());
        session.reset().unwrap();
        assert_eq!(session.step("take key").unwrap().reward, Reward::Neutral);
        assert_eq!(
            session.step("unlock chest with key").unwrap().reward,
            Reward::Positive
        );
    }

    #[test]
    fn distractors_and_unknown_commands_are_neutral() {
        let mut session = tracked_session();
        session.reset().unwrap();
        let t = session.step("look").unwrap();
        assert_eq!(t.reward, Reward::Neutral);
        assert_eq!(t.state.feedback, "Nothing happens.");
        let t = session.step("dance").unwrap();
        assert_eq!(t.state.feedback, "That's not a verb I recognise.");
        assert_eq!(t.state.nb_moves, 2);
    }

    #[test]
    fn closed_session_rejects_calls() {
        let mut session = tracked_session();
        session.close().unwrap();
        assert!(matches!(session.reset(), Err(EngineError::Closed)));
    }

    #[test]
    fn script_without_stages_is_rejected() {
        let err = QuestScript::parse_ron(r#"(objective: "o", stages: [])"#).unwrap_err();
        assert!(matches!(err, EngineError::EmptyScript));
    }

    #[test]
    fn stepping_past_the_last_stage_is_game_over() {
        let mut script = script();
        script.stages.clear();
        let mut session = ScriptedSession::new(script);
        session.reset().unwrap();
        assert!(matches!(session.step("look"), Err(EngineError::GameOver)));
    }

    #[test]
    fn reset_restarts_quest() {
        let mut session = tracked_session();
        session.reset().unwrap();
        session.step("take key").unwrap();
        let state = session.reset().unwrap();
        assert_eq!(state.nb_moves, 0);
        assert_eq!(state.inventory, "You are carrying nothing.");
    }
}
