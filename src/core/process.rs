/// Process bridge: drives an external engine program over JSON lines.
///
/// The program is started with the game file as its last argument. Every
/// request is one JSON object on stdin and is answered by exactly one JSON
/// object on stdout.
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use crate::core::engine::{Engine, EngineError, Session};
use crate::schema::reward::Reward;
use crate::schema::state::{GameState, Transition};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    ActivateStateTracking,
    ComputeIntermediateReward,
    Reset,
    Step { command: String },
    Walkthrough,
    Close,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Response {
    pub ok: bool,
    pub error: Option<String>,
    pub state: Option<GameState>,
    pub reward: Option<Reward>,
    pub done: Option<bool>,
    pub commands: Option<Vec<String>>,
}

impl Response {
    fn into_result(self) -> Result<Response, EngineError> {
        if self.ok {
            Ok(self)
        } else {
            Err(EngineError::Remote(
                self.error.unwrap_or_else(|| "unspecified failure".to_string()),
            ))
        }
    }

    fn require_state(&mut self) -> Result<GameState, EngineError> {
        self.state
            .take()
            .ok_or_else(|| EngineError::Protocol("response is missing `state`".to_string()))
    }
}

/// Encode a request as a single line, newline included.
pub fn encode_request(request: &Request) -> Result<String, EngineError> {
    let mut line = serde_json::to_string(request)?;
    line.push('\n');
    Ok(line)
}

pub fn decode_response(line: &str) -> Result<Response, EngineError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(EngineError::Protocol("empty response line".to_string()));
    }
    Ok(serde_json::from_str(line)?)
}

/// Starts one engine program per game file.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessEngine {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Engine for ProcessEngine {
    type Session = ProcessSession;

    fn start(&self, game: &Path) -> Result<ProcessSession, EngineError> {
        let start_error = |reason: String| EngineError::Start {
            path: game.to_path_buf(),
            reason,
        };
        if !game.exists() {
            return Err(start_error("no such file".to_string()));
        }

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(game)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| start_error(format!("{}: {}", self.program.display(), e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| start_error("engine stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| start_error("engine stdout unavailable".to_string()))?;

        tracing::debug!(program = %self.program.display(), game = %game.display(), "engine process started");
        Ok(ProcessSession {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            closed: false,
        })
    }
}

pub struct ProcessSession {
    child: Child,
    /// Dropped on close so the program sees end of input.
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    closed: bool,
}

impl ProcessSession {
    fn call(&mut self, request: &Request) -> Result<Response, EngineError> {
        let stdin = match (&mut self.stdin, self.closed) {
            (Some(stdin), false) => stdin,
            _ => return Err(EngineError::Closed),
        };
        stdin.write_all(encode_request(request)?.as_bytes())?;
        stdin.flush()?;

        let mut line = String::new();
        if self.stdout.read_line(&mut line)? == 0 {
            return Err(EngineError::Protocol(
                "engine closed its output".to_string(),
            ));
        }
        decode_response(&line)?.into_result()
    }
}

impl Session for ProcessSession {
    fn activate_state_tracking(&mut self) -> Result<(), EngineError> {
        self.call(&Request::ActivateStateTracking).map(|_| ())
    }

    fn compute_intermediate_reward(&mut self) -> Result<(), EngineError> {
        self.call(&Request::ComputeIntermediateReward).map(|_| ())
    }

    fn reset(&mut self) -> Result<GameState, EngineError> {
        self.call(&Request::Reset)?.require_state()
    }

    fn step(&mut self, command: &str) -> Result<Transition, EngineError> {
        let mut response = self.call(&Request::Step {
            command: command.to_string(),
        })?;
        let state = response.require_state()?;
        Ok(Transition {
            reward: response.reward.unwrap_or_default(),
            done: response.done.unwrap_or(state.won || state.lost),
            state,
        })
    }

    fn walkthrough(&mut self) -> Result<Vec<String>, EngineError> {
        self.call(&Request::Walkthrough)?
            .commands
            .ok_or(EngineError::Unsupported("walkthrough"))
    }

    fn close(&mut self) -> Result<(), EngineError> {
        if self.closed {
            return Ok(());
        }
        let result = self.call(&Request::Close).map(|_| ());
        self.closed = true;
        self.stdin = None;
        if result.is_err() {
            // The program may not exit on its own after a refused close.
            let _ = self.child.kill();
        }
        self.child.wait()?;
        result
    }
}

impl Drop for ProcessSession {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_request_wire_form() {
        let line = encode_request(&Request::Step {
            command: "open door".to_string(),
        })
        .unwrap();
        assert_eq!(line, "{\"op\":\"step\",\"command\":\"open door\"}\n");
    }

    #[test]
    fn unit_requests_carry_only_op() {
        let line = encode_request(&Request::ActivateStateTracking).unwrap();
        assert_eq!(line.trim(), r#"{"op":"activate_state_tracking"}"#);
    }

    #[test]
    fn decode_step_response() {
        let response = decode_response(
            r#"{"ok": true, "state": {"description": "Hall", "nb_moves": 3}, "reward": 1, "done": false}"#,
        )
        .unwrap();
        assert!(response.ok);
        assert_eq!(response.reward, Some(Reward::Positive));
        assert_eq!(response.state.unwrap().nb_moves, 3);
    }

    #[test]
    fn error_response_becomes_remote_error() {
        let response = decode_response(r#"{"ok": false, "error": "bad game file"}"#).unwrap();
        match response.into_result() {
            Err(EngineError::Remote(msg)) => assert_eq!(msg, "bad game file"),
            other => panic!("expected remote error, got {:?}", other.map(|r| r.ok)),
        }
    }

    #[test]
    fn invalid_reward_is_rejected() {
        assert!(decode_response(r#"{"ok": true, "reward": 5}"#).is_err());
        assert!(matches!(
            decode_response("   "),
            Err(EngineError::Protocol(_))
        ));
    }

    #[test]
    fn missing_game_file_fails_before_spawn() {
        let engine = ProcessEngine::new("definitely-not-a-real-engine", Vec::new());
        let err = engine
            .start(Path::new("tests/fixtures/missing.ulx"))
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::Start { .. }));
    }
}
