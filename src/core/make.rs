/// Game maker: typed options for the external `tw-make` generator.
///
/// Arguments are validated and rendered here; generation itself is done by
/// the external program, whose output is parsed for the resolved seed and
/// the path of the generated game.
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;
use thiserror::Error;

/// Challenge names the generator knows, under the `tw` prefix.
pub const KNOWN_CHALLENGES: &[&str] = &["simple", "cooking", "coin_collector", "treasure_hunter"];

const CHALLENGE_PREFIX: &str = "tw";

/// Upper bound of locally drawn seeds.
const MAX_SEED: u64 = 65635;

#[derive(Debug, Error)]
pub enum MakeError {
    #[error("invalid challenge {0:?}: expected <prefix>-<name>-level<N>")]
    MalformedChallenge(String),
    #[error("unknown challenge {name:?}; known challenges: {known}")]
    UnknownChallenge { name: String, known: String },
    #[error("invalid value for --{flag}: {reason}")]
    InvalidArgument { flag: &'static str, reason: String },
    #[error("failed to run {program:?}: {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },
    #[error("{program:?} exited with {status}: {stderr}")]
    Failed {
        program: PathBuf,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("generator output did not name the generated game")]
    MissingGamePath,
}

/// A `<prefix>-<name>-level<N>` challenge token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub name: String,
    pub level: u32,
}

impl FromStr for Challenge {
    type Err = MakeError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let malformed = || MakeError::MalformedChallenge(token.to_string());

        let rest = token
            .strip_prefix(CHALLENGE_PREFIX)
            .and_then(|r| r.strip_prefix('-'))
            .ok_or_else(malformed)?;
        let (name, level) = rest.rsplit_once('-').ok_or_else(malformed)?;
        let level: u32 = level
            .strip_prefix("level")
            .and_then(|n| n.parse().ok())
            .filter(|n| *n > 0)
            .ok_or_else(malformed)?;
        if name.is_empty() {
            return Err(malformed());
        }
        if !KNOWN_CHALLENGES.contains(&name) {
            return Err(MakeError::UnknownChallenge {
                name: name.to_string(),
                known: KNOWN_CHALLENGES.join(", "),
            });
        }
        Ok(Challenge {
            name: name.to_string(),
            level,
        })
    }
}

impl fmt::Display for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-level{}", CHALLENGE_PREFIX, self.name, self.level)
    }
}

/// World and quest sizes of a custom game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomGame {
    pub world_size: u32,
    pub nb_objects: u32,
    pub quest_length: u32,
    pub quest_breadth: u32,
}

impl Default for CustomGame {
    fn default() -> Self {
        Self {
            world_size: 5,
            nb_objects: 10,
            quest_length: 5,
            quest_breadth: 3,
        }
    }
}

impl CustomGame {
    pub fn validate(&self) -> Result<(), MakeError> {
        let positive = |flag: &'static str, value: u32| {
            if value == 0 {
                Err(MakeError::InvalidArgument {
                    flag,
                    reason: "must be at least 1".to_string(),
                })
            } else {
                Ok(())
            }
        };
        positive("world-size", self.world_size)?;
        positive("quest-length", self.quest_length)?;
        positive("quest-breadth", self.quest_breadth)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameKind {
    Custom(CustomGame),
    Challenge(Challenge),
}

/// Options shared by both subcommands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MakeOptions {
    pub output: Option<PathBuf>,
    pub seed: Option<u64>,
    pub view: bool,
    pub verbose: bool,
    pub theme: Option<String>,
    pub include_adj: bool,
    pub blend_descriptions: bool,
    pub ambiguous_instructions: bool,
    pub only_last_action: bool,
    pub blend_instructions: bool,
}

/// A fully resolved generation request: every value the generator sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MakeRequest {
    pub kind: GameKind,
    pub options: MakeOptions,
    pub seed: u64,
}

impl MakeRequest {
    /// Validate the request and resolve the seed, drawing one when the
    /// options leave it open.
    pub fn new(kind: GameKind, options: MakeOptions, rng: &mut impl Rng) -> Result<Self, MakeError> {
        if let GameKind::Custom(custom) = &kind {
            custom.validate()?;
        }
        if let Some(theme) = &options.theme {
            if theme.trim().is_empty() {
                return Err(MakeError::InvalidArgument {
                    flag: "theme",
                    reason: "must not be empty".to_string(),
                });
            }
        }
        let seed = options.seed.unwrap_or_else(|| rng.gen_range(0..MAX_SEED));
        Ok(Self {
            kind,
            options,
            seed,
        })
    }

    /// Command-line arguments for the generator, subcommand first.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        match &self.kind {
            GameKind::Custom(custom) => {
                args.push("custom".to_string());
                for (flag, value) in [
                    ("--world-size", custom.world_size),
                    ("--nb-objects", custom.nb_objects),
                    ("--quest-length", custom.quest_length),
                    ("--quest-breadth", custom.quest_breadth),
                ] {
                    args.push(flag.to_string());
                    args.push(value.to_string());
                }
            }
            GameKind::Challenge(challenge) => {
                args.push("challenge".to_string());
                args.push(challenge.to_string());
            }
        }

        let o = &self.options;
        if let Some(output) = &o.output {
            args.push("--output".to_string());
            args.push(output.display().to_string());
        }
        args.push("--seed".to_string());
        args.push(self.seed.to_string());
        if let Some(theme) = &o.theme {
            args.push("--theme".to_string());
            args.push(theme.clone());
        }
        for (flag, enabled) in [
            ("--view", o.view),
            ("--verbose", o.verbose),
            ("--include-adj", o.include_adj),
            ("--blend-descriptions", o.blend_descriptions),
            ("--ambiguous-instructions", o.ambiguous_instructions),
            ("--only-last-action", o.only_last_action),
            ("--blend-instructions", o.blend_instructions),
        ] {
            if enabled {
                args.push(flag.to_string());
            }
        }
        args
    }
}

/// What the generator reported back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MadeGame {
    pub seed: u64,
    pub path: PathBuf,
}

/// Find the generated game path in the generator's output.
///
/// Accepts a `Game generated: <path>` line, or failing that the last line
/// naming a compiled game file.
pub fn parse_generated_path(stdout: &str) -> Option<PathBuf> {
    let lines: Vec<&str> = stdout.lines().map(str::trim).collect();
    if let Some(path) = lines
        .iter()
        .find_map(|l| l.strip_prefix("Game generated:"))
    {
        return Some(PathBuf::from(path.trim()));
    }
    let suffix = format!(".{}", crate::schema::state::GAME_EXTENSION);
    lines
        .iter()
        .rev()
        .flat_map(|l| l.split_whitespace().rev())
        .find(|word| word.ends_with(&suffix))
        .map(PathBuf::from)
}

/// Runs the external generator.
#[derive(Debug, Clone)]
pub struct GameMaker {
    program: PathBuf,
}

impl Default for GameMaker {
    fn default() -> Self {
        Self::new("tw-make")
    }
}

impl GameMaker {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn make(&self, request: &MakeRequest) -> Result<MadeGame, MakeError> {
        let args = request.to_args();
        tracing::info!(program = %self.program.display(), ?args, "generating game");

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|source| MakeError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(MakeError::Failed {
                program: self.program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let path = parse_generated_path(&stdout).ok_or(MakeError::MissingGamePath)?;
        Ok(MadeGame {
            seed: request.seed,
            path,
        })
    }
}
