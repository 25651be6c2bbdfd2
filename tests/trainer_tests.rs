/// Training loop integration tests: epochs, shuffling and interrupts.
mod common;

use common::{CancellingAgent, CountingEngine, QUESTS};
use quest_gym::core::agent::RandomAgent;
use quest_gym::core::engine::EngineError;
use quest_gym::core::neural::{NeuralAgent, NeuralConfig};
use quest_gym::core::runner::{resolve_games, CancelToken, RunError};
use quest_gym::core::script::ScriptedEngine;
use quest_gym::core::trainer::{TrainConfig, Trainer};

fn config(nb_epochs: u32, seed: u64) -> TrainConfig {
    TrainConfig {
        games: QUESTS.to_string(),
        max_steps: 40,
        nb_epochs,
        seed,
    }
}

fn game_sequence(seed: u64) -> Vec<String> {
    let engine = ScriptedEngine::new();
    let mut agent = RandomAgent::new(3);
    let report = Trainer::new(&engine, config(4, seed)).train(&mut agent).unwrap();
    report.progress.into_iter().map(|p| p.game).collect()
}

#[test]
fn resolves_fixture_games_sorted() {
    let games = resolve_games(QUESTS).unwrap();
    let names: Vec<String> = games
        .iter()
        .map(|g| g.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["five_steps.ron", "garden.ron", "kitchen.ron"]);
}

#[test]
fn one_episode_per_game_per_epoch() {
    let engine = CountingEngine::default();
    let mut agent = RandomAgent::new(17);
    let report = Trainer::new(&engine, config(3, 1234)).train(&mut agent).unwrap();

    assert!(!report.interrupted);
    assert_eq!(report.epochs_completed, 3);
    assert_eq!(report.progress.len(), 9);
    for epoch in 0..3 {
        let mut games: Vec<&str> = report
            .progress
            .iter()
            .filter(|p| p.epoch == epoch)
            .map(|p| p.game.as_str())
            .collect();
        games.sort();
        assert_eq!(games, vec!["five_steps", "garden", "kitchen"]);
    }
    for p in &report.progress {
        assert!(p.outcome.steps <= 40);
    }
    assert_eq!(engine.opened.get(), 9);
    assert_eq!(engine.closed.get(), 9);
}

#[test]
fn fixed_seed_gives_identical_epoch_orderings() {
    assert_eq!(game_sequence(42), game_sequence(42));
}

#[test]
fn finish_hook_runs_once_per_episode() {
    let engine = ScriptedEngine::new();
    let token = CancelToken::new();
    let mut agent = CancellingAgent::new(token, u32::MAX);
    let report = Trainer::new(&engine, config(2, 5)).train(&mut agent).unwrap();
    assert_eq!(agent.finishes, 6);
    assert_eq!(report.progress.len(), 6);
}

#[test]
fn interrupt_mid_epoch_releases_session_and_stops() {
    let engine = CountingEngine::default();
    let token = CancelToken::new();
    // Fires on the very first decision. Every quest needs at least two
    // commands, so the first episode is cut short after one step.
    let mut agent = CancellingAgent::new(token.clone(), 1);
    let trainer = Trainer::new(&engine, config(5, 8)).with_cancel(token);
    let report = trainer.train(&mut agent).unwrap();

    assert!(report.interrupted);
    assert!(report.progress.is_empty());
    assert_eq!(report.epochs_completed, 0);
    assert_eq!(agent.decisions, 1);
    assert_eq!(agent.finishes, 0);
    assert_eq!(engine.opened.get(), 1, "no episode may start after the interrupt");
    assert_eq!(engine.closed.get(), 1, "the in-flight session is released once");
}

#[test]
fn interrupt_after_some_episodes_keeps_completed_progress() {
    let engine = CountingEngine::default();
    let token = CancelToken::new();
    let mut agent = CancellingAgent::new(token.clone(), 60);
    let report = Trainer::new(&engine, config(10, 8))
        .with_cancel(token)
        .train(&mut agent)
        .unwrap();

    assert!(report.interrupted);
    assert_eq!(agent.finishes as usize, report.progress.len());
    assert_eq!(engine.opened.get(), engine.closed.get());
    // The episode that saw the interrupt either stopped early or had just
    // ended on its own; nothing starts after it.
    let opened = engine.opened.get() as usize;
    assert!(opened == report.progress.len() || opened == report.progress.len() + 1);
    assert!(report.epochs_completed < 10);
}

#[test]
fn interrupt_returns_cleanly_when_close_fails() {
    let engine = CountingEngine::failing_close();
    let token = CancelToken::new();
    let mut agent = CancellingAgent::new(token.clone(), 1);
    let report = Trainer::new(&engine, config(5, 8))
        .with_cancel(token)
        .train(&mut agent)
        .unwrap();

    assert!(report.interrupted);
    assert!(report.progress.is_empty());
    assert_eq!(engine.opened.get(), 1);
    assert_eq!(engine.closed.get(), 1);
}

#[test]
fn close_failure_without_interrupt_propagates() {
    let engine = CountingEngine::failing_close();
    let mut agent = RandomAgent::new(4);
    let result = Trainer::new(&engine, config(2, 8)).train(&mut agent);

    assert!(matches!(
        result,
        Err(RunError::Engine(EngineError::Remote(_)))
    ));
    assert_eq!(engine.opened.get(), 1);
    assert_eq!(engine.closed.get(), 1);
}

#[test]
fn cancelled_before_start_opens_nothing() {
    let engine = CountingEngine::default();
    let token = CancelToken::new();
    token.cancel();
    let mut agent = RandomAgent::new(1);
    let report = Trainer::new(&engine, config(3, 1))
        .with_cancel(token)
        .train(&mut agent)
        .unwrap();
    assert!(report.interrupted);
    assert_eq!(engine.opened.get(), 0);
}

#[test]
fn empty_pattern_is_an_error() {
    let engine = ScriptedEngine::new();
    let mut agent = RandomAgent::new(1);
    let trainer = Trainer::new(
        &engine,
        TrainConfig {
            games: "tests/fixtures/quests/*.ulx".to_string(),
            ..TrainConfig::default()
        },
    );
    assert!(matches!(trainer.train(&mut agent), Err(RunError::NoGames(_))));
}

#[test]
fn neural_agent_trains_on_scripted_quests() {
    let engine = ScriptedEngine::new();
    let mut agent = NeuralAgent::new(NeuralConfig {
        feature_dim: 2048,
        ..NeuralConfig::default()
    })
    .unwrap();
    let report = Trainer::new(&engine, config(3, 11)).train(&mut agent).unwrap();

    assert!(agent.is_training());
    assert_eq!(report.progress.len(), 9);
    assert!(agent.params().policy.iter().any(|w| *w != 0.0));
}
