//! A live game session: the stage machine plus ordered persistence.
//!
//! Transitions happen synchronously in memory. The matching write is spawned
//! right after and is not awaited by the caller, but the next mutating
//! transition waits for it first. Writes therefore land in transition order and
//! a crash between transitions leaves the last fully-applied state persisted.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::{Lesson, SessionRecord};
use crate::error::EngineError;
use crate::games::Game;
use crate::machine::{ChallengeStageMachine, SubmitOutcome, SubmitTicket};
use crate::runner::{run_with_timeout, CodeRunner, RunVerdict, RunnerError};
use crate::store::PersistenceGateway;

pub struct LiveSession {
  key: String,
  machine: ChallengeStageMachine,
  gateway: Arc<dyn PersistenceGateway>,
  pending: Option<JoinHandle<()>>,
  discarded: bool,
}

impl LiveSession {
  /// Loads the stored record for `key` (if any) and resumes the game from it.
  #[instrument(level = "info", skip(game, gateway), fields(game_id = %game.id))]
  pub async fn open(
    key: String,
    game: &Game,
    gateway: Arc<dyn PersistenceGateway>,
    incorrect_flash: Duration,
  ) -> Result<Self, EngineError> {
    Self::open_with(key, gateway, incorrect_flash, |record| ChallengeStageMachine::for_game(game, record)).await
  }

  /// Same as `open`, for the single stage of a coding lesson.
  #[instrument(level = "info", skip(lesson, gateway), fields(lesson_id = %lesson.id))]
  pub async fn open_lesson(
    key: String,
    lesson: &Lesson,
    gateway: Arc<dyn PersistenceGateway>,
    incorrect_flash: Duration,
  ) -> Result<Self, EngineError> {
    let id = lesson.id.clone();
    Self::open_with(key, gateway, incorrect_flash, |record| ChallengeStageMachine::for_lesson(id, lesson, record)).await
  }

  async fn open_with(
    key: String,
    gateway: Arc<dyn PersistenceGateway>,
    incorrect_flash: Duration,
    build: impl FnOnce(Option<&SessionRecord>) -> ChallengeStageMachine,
  ) -> Result<Self, EngineError> {
    let record = gateway.load(&key).await?;
    let machine = build(record.as_ref()).with_incorrect_flash(incorrect_flash);
    let fresh = record.is_none();
    let mut session = Self::from_machine(key, machine, gateway);

    if session.machine.has_content() && (fresh || session.machine.corrupt_resume().is_some()) {
      session.persist();
    }
    info!(target: "session", key = %session.key, fresh, stage = session.machine.current_stage_index(), score = session.machine.score(), "Session opened");
    Ok(session)
  }

  pub fn from_machine(key: String, machine: ChallengeStageMachine, gateway: Arc<dyn PersistenceGateway>) -> Self {
    Self { key, machine, gateway, pending: None, discarded: false }
  }

  pub fn key(&self) -> &str {
    &self.key
  }

  pub fn machine(&self) -> &ChallengeStageMachine {
    &self.machine
  }

  /// Waits for the previous write, if one is still running.
  async fn settle(&mut self) {
    if let Some(handle) = self.pending.take() {
      if let Err(e) = handle.await {
        error!(target: "session", key = %self.key, error = %e, "Persistence task failed");
      }
    }
  }

  fn persist(&mut self) {
    let record = self.machine.record(Utc::now());
    let gateway = self.gateway.clone();
    let key = self.key.clone();
    self.pending = Some(tokio::spawn(async move {
      if let Err(e) = gateway.save(&key, record).await {
        error!(target: "session", %key, error = %e, "Failed to persist session");
      }
    }));
  }

  /// Waits until every issued write has completed.
  pub async fn flush(&mut self) {
    self.settle().await;
  }

  pub async fn begin_submit(&mut self, code: &str) -> Result<SubmitTicket, EngineError> {
    if self.discarded {
      return Err(EngineError::not_found("session", self.key.clone()));
    }
    self.settle().await;
    self.machine.begin_submit(code)
  }

  /// Applies a verdict. Results arriving after `discard` are dropped.
  pub async fn finish_submit(&mut self, ticket: SubmitTicket, result: Result<RunVerdict, RunnerError>) -> SubmitOutcome {
    if self.discarded {
      debug!(target: "session", key = %self.key, "Verdict arrived after discard; dropped");
      return SubmitOutcome::Stale;
    }
    self.settle().await;
    let outcome = self.machine.finish_submit(ticket, result);
    if matches!(outcome, SubmitOutcome::Solved { .. }) {
      self.persist();
    }
    outcome
  }

  /// Submit while holding the session. Callers that share a session across
  /// tasks should use `begin_submit`/`finish_submit` around the runner call.
  pub async fn submit(
    &mut self,
    runner: Option<&dyn CodeRunner>,
    code: &str,
    timeout: Duration,
  ) -> Result<SubmitOutcome, EngineError> {
    let ticket = self.begin_submit(code).await?;
    let result = match runner {
      Some(r) => run_with_timeout(r, &ticket.code, ticket.expected_output.as_deref(), timeout).await,
      None => Err(RunnerError::NotConfigured),
    };
    Ok(self.finish_submit(ticket, result).await)
  }

  pub fn toggle_hint(&mut self) -> Result<bool, EngineError> {
    self.machine.toggle_hint()
  }

  pub fn reveal_solution(&self) -> Result<Option<String>, EngineError> {
    self.machine.reveal_solution()
  }

  pub async fn previous_stage(&mut self) -> Result<usize, EngineError> {
    self.settle().await;
    let index = self.machine.previous_stage()?;
    self.persist();
    Ok(index)
  }

  pub async fn select_character(&mut self, character_id: &str) -> Result<(), EngineError> {
    self.settle().await;
    self.machine.select_character(character_id)?;
    self.persist();
    Ok(())
  }

  pub async fn reset(&mut self) {
    self.settle().await;
    self.machine.reset();
    if self.machine.has_content() {
      self.persist();
    }
  }

  /// Gives up on an outstanding evaluation without closing the session; its
  /// verdict will come back `Stale`.
  pub fn cancel_evaluation(&mut self) {
    self.machine.cancel();
  }

  /// Navigation away: the session stops accepting verdicts for good.
  pub fn discard(&mut self) {
    if self.machine.is_evaluating() {
      warn!(target: "session", key = %self.key, "Discarding session with an evaluation in flight");
    }
    self.machine.cancel();
    self.discarded = true;
  }
}
