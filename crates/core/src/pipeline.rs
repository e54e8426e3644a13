//! Per-request pipeline state machine.
//!
//! ```text
//! Planning ──► Clarifying (terminal)
//!    │
//!    └──► Fetching ──► Cleaning ──► Aggregating ──► Composing ──► Done (terminal)
//!
//! any non-terminal state ──► Failed (terminal)
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::TransitionError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Planning,
    Clarifying,
    Fetching,
    Cleaning,
    Aggregating,
    Composing,
    Done,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Clarifying => "clarifying",
            Self::Fetching => "fetching",
            Self::Cleaning => "cleaning",
            Self::Aggregating => "aggregating",
            Self::Composing => "composing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Clarifying | Self::Done | Self::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn transition(from: PipelineState, to: PipelineState) -> Result<PipelineState, TransitionError> {
    use PipelineState::{
        Aggregating, Cleaning, Clarifying, Composing, Done, Failed, Fetching, Planning,
    };

    let allowed = match (from, to) {
        (Planning, Clarifying) | (Planning, Fetching) => true,
        (Fetching, Cleaning) => true,
        (Cleaning, Aggregating) => true,
        (Aggregating, Composing) => true,
        (Composing, Done) => true,
        (current, Failed) => !current.is_terminal(),
        _ => false,
    };

    if allowed {
        Ok(to)
    } else {
        Err(TransitionError { from, to })
    }
}

/// Tracks the current state of one request and rejects illegal moves.
#[derive(Clone, Debug)]
pub struct PipelineMachine {
    state: PipelineState,
}

impl Default for PipelineMachine {
    fn default() -> Self {
        Self { state: PipelineState::Planning }
    }
}

impl PipelineMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn advance(&mut self, to: PipelineState) -> Result<PipelineState, TransitionError> {
        self.state = transition(self.state, to)?;
        Ok(self.state)
    }
}
