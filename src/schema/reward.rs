use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("reward signal out of range: {0} (expected -1, 0 or 1)")]
pub struct InvalidReward(pub i64);

/// Reward signal emitted by the engine.
///
/// Both the intermediate signal (did the last command move the player toward
/// the quest goal) and the terminal signal (won, lost, neither) use the same
/// three values. On the wire it is a plain integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Reward {
    Negative,
    #[default]
    Neutral,
    Positive,
}

impl Reward {
    pub fn value(self) -> i32 {
        match self {
            Self::Negative => -1,
            Self::Neutral => 0,
            Self::Positive => 1,
        }
    }
}

impl TryFrom<i64> for Reward {
    type Error = InvalidReward;

    fn try_from(signal: i64) -> Result<Self, Self::Error> {
        match signal {
            -1 => Ok(Self::Negative),
            0 => Ok(Self::Neutral),
            1 => Ok(Self::Positive),
            other => Err(InvalidReward(other)),
        }
    }
}

impl From<Reward> for i64 {
    fn from(reward: Reward) -> Self {
        reward.value() as i64
    }
}
