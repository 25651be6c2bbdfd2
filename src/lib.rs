//! Quest Gym: agents, episode runner and training loop for text-adventure
//! reinforcement learning.
//!
//! The game engine and the game generator are external programs. This crate
//! talks to the engine through the `Session` trait, alternates agent
//! decisions with engine steps, and forwards generation requests to
//! `tw-make`.

pub mod config;
pub mod core;
pub mod schema;
