//! Plain data exchanged between the engine, the agents and the loops.

pub mod outcome;
pub mod reward;
pub mod state;
