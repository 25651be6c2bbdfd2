//! Engine seam, agents, and the loops that drive them.

pub mod agent;
pub mod engine;
pub mod make;
pub mod neural;
pub mod process;
pub mod runner;
pub mod script;
pub mod trainer;
