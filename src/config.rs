/// Run configuration, stored as RON.
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::neural::NeuralConfig;
use crate::core::trainer::TrainConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Which engine implementation drives the sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EngineKind {
    /// External engine program speaking JSON lines.
    #[default]
    Process,
    /// RON quest scripts played in-process.
    Script,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub kind: EngineKind,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::Process,
            program: PathBuf::from("tw-bridge"),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayConfig {
    pub max_steps: u32,
    pub nb_episodes: u32,
}

impl Default for PlayConfig {
    fn default() -> Self {
        Self {
            max_steps: 100,
            nb_episodes: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MakeConfig {
    pub program: PathBuf,
}

impl Default for MakeConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("tw-make"),
        }
    }
}

/// Top-level configuration. Every section and field is optional in the
/// file; anything missing takes its default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GymConfig {
    pub engine: EngineConfig,
    pub play: PlayConfig,
    pub train: TrainConfig,
    pub neural: NeuralConfig,
    pub make: MakeConfig,
}

impl GymConfig {
    pub fn load_from_ron(path: &Path) -> Result<GymConfig, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<GymConfig, ConfigError> {
        let config: GymConfig = ron::from_str(input)?;
        config
            .neural
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(config)
    }

    /// Load `path` when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<GymConfig, ConfigError> {
        match path {
            Some(path) => Self::load_from_ron(path),
            None => Ok(Self::default()),
        }
    }
}
