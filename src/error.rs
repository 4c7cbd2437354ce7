//! Error types for the progression engine.
//!
//! Wrong answers and runner outages are not here: they are ordinary
//! `SubmitOutcome` values returned by the stage machine.

use thiserror::Error;

use crate::games::ChallengeKind;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
  #[error("{kind} not found: {id}")]
  NotFound { kind: &'static str, id: String },

  #[error("{0} is locked: complete prerequisites first")]
  Locked(String),

  #[error("a submission is already being evaluated")]
  Busy,

  #[error("no content available for this game")]
  NoContent,

  #[error("game already complete; reset to play again")]
  GameComplete,

  #[error("{action} is not available for {kind}")]
  Unsupported { action: &'static str, kind: ChallengeKind },

  #[error("{0} is a coding lesson: it completes through a passing submission")]
  SubmissionRequired(String),

  #[error("persistence error: {0}")]
  Persistence(String),

  #[error("internal error: {0}")]
  Internal(String),
}

impl EngineError {
  pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
    EngineError::NotFound { kind, id: id.into() }
  }

  /// Stable machine-readable code used by the HTTP and WS layers.
  pub fn code(&self) -> &'static str {
    match self {
      EngineError::NotFound { .. } => "not_found",
      EngineError::Locked(_) => "locked",
      EngineError::Busy => "busy",
      EngineError::NoContent => "no_content",
      EngineError::GameComplete => "game_complete",
      EngineError::Unsupported { .. } => "unsupported",
      EngineError::SubmissionRequired(_) => "submission_required",
      EngineError::Persistence(_) => "persistence",
      EngineError::Internal(_) => "internal",
    }
  }
}

/// A persisted resume index outside `[0, stage_count)`. Recovered by starting at 0.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("corrupt resume state: stage index {requested} outside 0..{stage_count}")]
pub struct CorruptResumeState {
  pub requested: i64,
  pub stage_count: usize,
}
