use serde::{Deserialize, Serialize};

/// File extension of compiled games produced by the generator.
pub const GAME_EXTENSION: &str = "ulx";

/// A snapshot of the game as reported by the engine after a reset or a step.
///
/// The orchestration layer never mutates a state; it only reads it and hands
/// it to the agent. `admissible_commands` and `policy_commands` stay empty
/// unless state tracking was activated on the session before the episode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameState {
    pub description: String,
    pub inventory: String,
    pub feedback: String,
    pub objective: String,
    pub admissible_commands: Vec<String>,
    /// Remaining winning command sequence from this state.
    pub policy_commands: Vec<String>,
    pub nb_moves: u32,
    pub score: i32,
    pub max_score: i32,
    pub won: bool,
    pub lost: bool,
}

impl GameState {
    /// All free text of the state, in the order the agents read it.
    pub fn text_fields(&self) -> [&str; 4] {
        [
            &self.description,
            &self.inventory,
            &self.feedback,
            &self.objective,
        ]
    }

    pub fn is_admissible(&self, command: &str) -> bool {
        self.admissible_commands.iter().any(|c| c == command)
    }

    /// Score as a fraction of the maximum, or 0.0 when the game has no
    /// maximum score.
    pub fn normalized_score(&self) -> f64 {
        if self.max_score <= 0 {
            0.0
        } else {
            self.score as f64 / self.max_score as f64
        }
    }
}

/// One engine transition: the state after a command, its reward, and
/// whether the game ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub state: GameState,
    pub reward: super::reward::Reward,
    pub done: bool,
}
