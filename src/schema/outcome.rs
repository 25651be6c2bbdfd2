use serde::{Deserialize, Serialize};

/// How an episode came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Termination {
    Won,
    Lost,
    /// The engine signalled done without a win or a loss.
    Ended,
    /// The step budget ran out before the engine signalled done.
    StepBudget,
    /// The run was cancelled while the episode was in flight.
    Interrupted,
}

/// Result of a single episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeOutcome {
    /// Commands submitted by the orchestration layer in this episode.
    pub steps: u32,
    /// Move count reported by the engine.
    pub moves: u32,
    pub score: i32,
    pub max_score: i32,
    pub done: bool,
    /// Sum of reward signals received during the episode.
    pub total_reward: i32,
    pub termination: Termination,
}

/// Aggregate over the episodes of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub episodes: Vec<EpisodeOutcome>,
}

impl RunSummary {
    pub fn push(&mut self, outcome: EpisodeOutcome) {
        self.episodes.push(outcome);
    }

    pub fn avg_moves(&self) -> f64 {
        self.mean(|o| o.moves as f64)
    }

    pub fn avg_score(&self) -> f64 {
        self.mean(|o| o.score as f64)
    }

    pub fn avg_normalized_score(&self) -> f64 {
        self.mean(|o| {
            if o.max_score > 0 {
                o.score as f64 / o.max_score as f64
            } else {
                0.0
            }
        })
    }

    /// Largest max score seen across episodes.
    pub fn max_score(&self) -> i32 {
        self.episodes.iter().map(|o| o.max_score).max().unwrap_or(0)
    }

    pub fn wins(&self) -> usize {
        self.episodes
            .iter()
            .filter(|o| o.termination == Termination::Won)
            .count()
    }

    fn mean(&self, f: impl Fn(&EpisodeOutcome) -> f64) -> f64 {
        if self.episodes.is_empty() {
            return 0.0;
        }
        self.episodes.iter().map(f).sum::<f64>() / self.episodes.len() as f64
    }
}

/// Progress of one game within a training epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameProgress {
    pub epoch: u32,
    pub game: String,
    pub outcome: EpisodeOutcome,
}

/// Everything a training run produced, including whether it was cut short.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainReport {
    pub progress: Vec<GameProgress>,
    pub epochs_completed: u32,
    pub interrupted: bool,
}

impl TrainReport {
    pub fn total_reward(&self) -> i32 {
        self.progress.iter().map(|p| p.outcome.total_reward).sum()
    }
}
