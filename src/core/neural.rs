/// Neural agent: linear actor-critic over hashed text features.
///
/// The actor scores each admissible command from features of the command
/// alone and of command × observation token pairs; the policy is a softmax
/// over those scores. The critic estimates the value of an observation.
/// Transitions are buffered and learned from every `update_frequency` steps
/// with discounted returns and an entropy bonus.
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::{FxHashSet, FxHasher};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::path::Path;
use tracing::debug;

use crate::core::agent::{Agent, AgentError};
use crate::schema::reward::Reward;
use crate::schema::state::GameState;

const BIAS_TOKEN: &str = "<bias>";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeuralConfig {
    /// Number of hash buckets per weight vector.
    pub feature_dim: usize,
    pub learning_rate: f32,
    pub gamma: f32,
    pub entropy_coef: f32,
    pub value_coef: f32,
    pub update_frequency: usize,
    pub log_frequency: usize,
    pub seed: u64,
}

impl Default for NeuralConfig {
    fn default() -> Self {
        Self {
            feature_dim: 1 << 14,
            learning_rate: 0.05,
            gamma: 0.9,
            entropy_coef: 0.01,
            value_coef: 0.5,
            update_frequency: 10,
            log_frequency: 1000,
            seed: 20181012,
        }
    }
}

impl NeuralConfig {
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.feature_dim == 0 {
            return Err(AgentError::InvalidConfig(
                "feature_dim must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Learned weights; this is what checkpoints contain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuralParams {
    pub policy: Vec<f32>,
    pub value: Vec<f32>,
}

impl NeuralParams {
    fn zeros(dim: usize) -> Self {
        Self {
            policy: vec![0.0; dim],
            value: vec![0.0; dim],
        }
    }
}

/// Sparse binary feature vector, scaled to unit norm.
#[derive(Debug, Clone)]
struct Features {
    indices: Vec<usize>,
    scale: f32,
}

impl Features {
    fn new(mut indices: Vec<usize>) -> Self {
        indices.sort_unstable();
        indices.dedup();
        let scale = if indices.is_empty() {
            0.0
        } else {
            1.0 / (indices.len() as f32).sqrt()
        };
        Self { indices, scale }
    }

    fn dot(&self, weights: &[f32]) -> f32 {
        self.scale * self.indices.iter().map(|&i| weights[i]).sum::<f32>()
    }

    fn add_to(&self, weights: &mut [f32], coeff: f32) {
        let delta = coeff * self.scale;
        for &i in &self.indices {
            weights[i] += delta;
        }
    }
}

/// Lowercased alphanumeric tokens.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn bucket<T: Hash + ?Sized>(key: &T, dim: usize) -> usize {
    let mut hasher = FxHasher::default();
    key.hash(&mut hasher);
    (hasher.finish() % dim as u64) as usize
}

#[derive(Debug, Clone)]
struct Step {
    candidates: Vec<Features>,
    probs: Vec<f32>,
    chosen: usize,
    observation: Features,
    value: f32,
    reward: f32,
}

#[derive(Debug, Default)]
struct Stats {
    steps: usize,
    reward: f32,
    value: f32,
    entropy: f32,
}

pub struct NeuralAgent {
    config: NeuralConfig,
    params: NeuralParams,
    rng: StdRng,
    training: bool,
    buffer: Vec<Step>,
    stats: Stats,
    total_steps: u64,
}

impl NeuralAgent {
    pub fn new(config: NeuralConfig) -> Result<Self, AgentError> {
        config.validate()?;
        Ok(Self {
            params: NeuralParams::zeros(config.feature_dim),
            rng: StdRng::seed_from_u64(config.seed),
            config,
            training: false,
            buffer: Vec::new(),
            stats: Stats::default(),
            total_steps: 0,
        })
    }

    pub fn params(&self) -> &NeuralParams {
        &self.params
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    pub fn save_checkpoint(&self, path: &Path) -> Result<(), AgentError> {
        let serialized =
            ron::ser::to_string_pretty(&self.params, ron::ser::PrettyConfig::default())
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
        std::fs::write(path, serialized)?;
        debug!(path = %path.display(), "checkpoint saved");
        Ok(())
    }

    pub fn load_checkpoint(&mut self, path: &Path) -> Result<(), AgentError> {
        let contents = std::fs::read_to_string(path)?;
        let params: NeuralParams = ron::from_str(&contents)?;
        let dim = self.config.feature_dim;
        if params.policy.len() != dim || params.value.len() != dim {
            return Err(AgentError::Checkpoint(format!(
                "expected {} weights, found {} policy and {} value",
                dim,
                params.policy.len(),
                params.value.len()
            )));
        }
        self.params = params;
        Ok(())
    }

    fn observation_tokens(state: &GameState) -> Vec<String> {
        let mut seen = FxHashSet::default();
        state
            .text_fields()
            .iter()
            .flat_map(|text| tokenize(text))
            .filter(|t| seen.insert(t.clone()))
            .collect()
    }

    fn observation_features(&self, tokens: &[String]) -> Features {
        let dim = self.config.feature_dim;
        let mut indices: Vec<usize> = tokens.iter().map(|t| bucket(&("o", t), dim)).collect();
        indices.push(bucket(&("o", BIAS_TOKEN), dim));
        Features::new(indices)
    }

    fn command_features(&self, tokens: &[String], command: &str) -> Features {
        let dim = self.config.feature_dim;
        let mut indices = Vec::new();
        for word in tokenize(command) {
            indices.push(bucket(&("c", &word), dim));
            for token in tokens {
                indices.push(bucket(&("x", &word, token), dim));
            }
        }
        indices.push(bucket(&("c", BIAS_TOKEN), dim));
        Features::new(indices)
    }

    fn policy(&self, candidates: &[Features]) -> Vec<f32> {
        let scores: Vec<f32> = candidates
            .iter()
            .map(|f| f.dot(&self.params.policy))
            .collect();
        softmax(&scores)
    }

    fn sample(&mut self, probs: &[f32]) -> usize {
        if !self.training {
            return argmax(probs);
        }
        let mut target: f32 = self.rng.gen();
        for (i, p) in probs.iter().enumerate() {
            if target < *p {
                return i;
            }
            target -= p;
        }
        probs.len() - 1
    }

    /// Learn from the buffered steps. `bootstrap` is the value estimate of
    /// the state following the last buffered step.
    fn update(&mut self, bootstrap: f32) {
        if self.buffer.is_empty() {
            return;
        }
        let lr = self.config.learning_rate;
        let mut ret = bootstrap;
        let steps = std::mem::take(&mut self.buffer);

        for step in steps.iter().rev() {
            ret = step.reward + self.config.gamma * ret;
            let advantage = ret - step.value;

            // d log pi(a) / d score_j = 1[j == a] - p_j
            // d H / d score_j = -p_j (log p_j + H)
            let entropy = entropy(&step.probs);
            for (j, candidate) in step.candidates.iter().enumerate() {
                let p = step.probs[j];
                let indicator = if j == step.chosen { 1.0 } else { 0.0 };
                let pg = advantage * (indicator - p);
                let ent = -p * (p.max(f32::MIN_POSITIVE).ln() + entropy);
                candidate.add_to(
                    &mut self.params.policy,
                    lr * (pg + self.config.entropy_coef * ent),
                );
            }
            step.observation.add_to(
                &mut self.params.value,
                lr * self.config.value_coef * advantage,
            );
        }
    }

    fn record_stats(&mut self, reward: f32, value: f32, entropy: f32) {
        self.total_steps += 1;
        self.stats.steps += 1;
        self.stats.reward += reward;
        self.stats.value += value;
        self.stats.entropy += entropy;

        if self.config.log_frequency > 0 && self.stats.steps >= self.config.log_frequency {
            let n = self.stats.steps as f32;
            debug!(
                total_steps = self.total_steps,
                "avg. reward: {:5.2}; avg. value: {:5.2}; avg. entropy: {:5.2}",
                self.stats.reward / n,
                self.stats.value / n,
                self.stats.entropy / n
            );
            self.stats = Stats::default();
        }
    }
}

impl Agent for NeuralAgent {
    fn name(&self) -> &str {
        "neural"
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
        if !training {
            self.buffer.clear();
        }
    }

    fn decide(
        &mut self,
        state: &GameState,
        reward: Reward,
        _done: bool,
    ) -> Result<String, AgentError> {
        if state.admissible_commands.is_empty() {
            return Err(AgentError::NoAdmissibleCommands);
        }

        let tokens = Self::observation_tokens(state);
        let observation = self.observation_features(&tokens);
        let value = observation.dot(&self.params.value);
        let candidates: Vec<Features> = state
            .admissible_commands
            .iter()
            .map(|c| self.command_features(&tokens, c))
            .collect();
        let probs = self.policy(&candidates);
        let chosen = self.sample(&probs);

        if self.training {
            if let Some(last) = self.buffer.last_mut() {
                last.reward = reward.value() as f32;
            }
            if self.buffer.len() >= self.config.update_frequency {
                self.update(value);
            }
            self.record_stats(reward.value() as f32, value, entropy(&probs));
            self.buffer.push(Step {
                candidates,
                probs,
                chosen,
                observation,
                value,
                reward: 0.0,
            });
        }

        Ok(state.admissible_commands[chosen].clone())
    }

    fn finish(&mut self, state: &GameState, reward: Reward, done: bool) -> Result<(), AgentError> {
        if !self.training {
            return Ok(());
        }
        if let Some(last) = self.buffer.last_mut() {
            last.reward = reward.value() as f32;
        }
        let bootstrap = if done {
            0.0
        } else {
            let tokens = Self::observation_tokens(state);
            self.observation_features(&tokens).dot(&self.params.value)
        };
        self.update(bootstrap);
        Ok(())
    }
}

fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}

fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &v)| {
            if v > best.1 {
                (i, v)
            } else {
                best
            }
        })
        .0
}

fn entropy(probs: &[f32]) -> f32 {
    -probs
        .iter()
        .filter(|p| **p > 0.0)
        .map(|p| p * p.ln())
        .sum::<f32>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> NeuralConfig {
        NeuralConfig {
            feature_dim: 1024,
            learning_rate: 0.5,
            update_frequency: 4,
            ..NeuralConfig::default()
        }
    }

    fn state() -> GameState {
        GameState {
            description: "A bright kitchen. A golden coin lies on the table.".to_string(),
            objective: "Find the coin.".to_string(),
            admissible_commands: vec![
                "take coin".to_string(),
                "look".to_string(),
                "go west".to_string(),
            ],
            ..GameState::default()
        }
    }

    fn probability_of(agent: &NeuralAgent, state: &GameState, command: &str) -> f32 {
        let tokens = NeuralAgent::observation_tokens(state);
        let candidates: Vec<Features> = state
            .admissible_commands
            .iter()
            .map(|c| agent.command_features(&tokens, c))
            .collect();
        let probs = agent.policy(&candidates);
        let idx = state
            .admissible_commands
            .iter()
            .position(|c| c == command)
            .unwrap();
        probs[idx]
    }

    #[test]
    fn tokenize_lowercases_and_splits() {
        assert_eq!(tokenize("Take the Coin, now!"), vec!["take", "the", "coin", "now"]);
    }

    #[test]
    fn softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert_eq!(argmax(&probs), 2);
    }

    #[test]
    fn untrained_policy_is_uniform() {
        let agent = NeuralAgent::new(small_config()).unwrap();
        let p = probability_of(&agent, &state(), "take coin");
        assert!((p - 1.0 / 3.0).abs() < 1e-5);
    }

    #[test]
    fn evaluation_mode_does_not_learn() {
        let mut agent = NeuralAgent::new(small_config()).unwrap();
        let s = state();
        for _ in 0..10 {
            agent.decide(&s, Reward::Positive, false).unwrap();
        }
        agent.finish(&s, Reward::Positive, true).unwrap();
        assert!(agent.params().policy.iter().all(|w| *w == 0.0));
    }

    #[test]
    fn rewarded_command_gains_probability() {
        let mut agent = NeuralAgent::new(small_config()).unwrap();
        agent.set_training(true);
        let s = state();
        let before = probability_of(&agent, &s, "take coin");

        for _ in 0..30 {
            // Play a one-step episode and reward only the coin.
            let command = agent.decide(&s, Reward::Neutral, false).unwrap();
            let reward = if command == "take coin" {
                Reward::Positive
            } else {
                Reward::Negative
            };
            agent.finish(&s, reward, true).unwrap();
        }

        let after = probability_of(&agent, &s, "take coin");
        assert!(after > before, "expected {after} > {before}");
    }

    #[test]
    fn decide_without_commands_fails() {
        let mut agent = NeuralAgent::new(small_config()).unwrap();
        assert!(matches!(
            agent.decide(&GameState::default(), Reward::Neutral, false),
            Err(AgentError::NoAdmissibleCommands)
        ));
    }

    #[test]
    fn zero_feature_dim_is_rejected() {
        let result = NeuralAgent::new(NeuralConfig {
            feature_dim: 0,
            ..NeuralConfig::default()
        });
        assert!(matches!(result, Err(AgentError::InvalidConfig(_))));
    }

    #[test]
    fn checkpoint_dimension_mismatch_is_rejected() {
        let dir = std::env::temp_dir().join("quest_gym_neural_ckpt_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("small.ron");

        let agent = NeuralAgent::new(NeuralConfig {
            feature_dim: 8,
            ..NeuralConfig::default()
        })
        .unwrap();
        agent.save_checkpoint(&path).unwrap();

        let mut same = NeuralAgent::new(NeuralConfig {
            feature_dim: 8,
            ..NeuralConfig::default()
        })
        .unwrap();
        assert!(same.load_checkpoint(&path).is_ok());

        let mut other = NeuralAgent::new(small_config()).unwrap();
        assert!(matches!(
            other.load_checkpoint(&path),
            Err(AgentError::Checkpoint(_))
        ));
        std::fs::remove_file(&path).ok();
    }
}
