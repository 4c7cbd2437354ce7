//! The challenge stage machine shared by every game and coding lesson.
//!
//! States: `AwaitingSubmission(i)` → `Evaluating(i)` → `StageSolved(i)` →
//! `AwaitingSubmission(i + 1)` or `GameComplete`. An empty stage list parks the
//! machine in `NoContent`, which is not the same as being complete.
//!
//! Submitting is split in two so the runner call can happen without holding
//! the machine: `begin_submit` moves to `Evaluating` and hands out a ticket,
//! `finish_submit` applies the verdict. A second `begin_submit` while a ticket
//! is outstanding is rejected with `Busy`. Every navigation that invalidates
//! an outstanding ticket bumps the epoch, and late verdicts for an old epoch
//! are dropped.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::domain::{AuxData, ChallengeStage, Lesson, SessionRecord};
use crate::error::{CorruptResumeState, EngineError};
use crate::games::{ChallengeKind, Game, AUX_SELECTED_CHARACTER};
use crate::runner::{run_with_timeout, CodeRunner, RunVerdict, RunnerError};

/// How long the "incorrect" signal stays up after a wrong answer.
pub const DEFAULT_INCORRECT_FLASH: Duration = Duration::from_millis(1500);

pub type StageSolvedCallback = Box<dyn FnMut(u32, &AuxData) + Send>;
pub type GameCompleteCallback = Box<dyn FnMut(u32) + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "stageIndex", rename_all = "snake_case")]
pub enum MachineState {
  NoContent,
  AwaitingSubmission(usize),
  Evaluating(usize),
  StageSolved(usize),
  GameComplete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
  NoContent,
  Awaiting,
  Evaluating,
  Solved,
  Complete,
}

/// Proof of an outstanding evaluation, redeemed by `finish_submit`.
#[derive(Clone, Debug)]
pub struct SubmitTicket {
  epoch: u64,
  stage_index: usize,
  pub code: String,
  pub expected_output: Option<String>,
}

impl SubmitTicket {
  pub fn stage_index(&self) -> usize {
    self.stage_index
  }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum SubmitOutcome {
  Solved {
    stage_index: usize,
    score: u32,
    aux_delta: AuxData,
    /// True only on the transition that completed the game.
    game_completed: bool,
  },
  Incorrect {
    stage_index: usize,
    output: String,
    error: String,
  },
  /// Retryable; no attempt was consumed.
  RunnerUnavailable {
    stage_index: usize,
    reason: String,
  },
  /// The session moved on (reset, navigation, discard) before the verdict came back.
  Stale,
}

pub struct ChallengeStageMachine {
  game_id: String,
  kind: ChallengeKind,
  stages: Vec<ChallengeStage>,
  roster: Vec<String>,
  phase: Phase,
  index: usize,
  score: u32,
  aux: AuxData,
  hint_visible: bool,
  incorrect_until: Option<Instant>,
  incorrect_flash: Duration,
  epoch: u64,
  completion_fired: bool,
  corrupt_resume: Option<CorruptResumeState>,
  on_stage_solved: Option<StageSolvedCallback>,
  on_game_complete: Option<GameCompleteCallback>,
}

impl ChallengeStageMachine {
  pub fn new(game_id: impl Into<String>, kind: impl Into<ChallengeKind>, stages: Vec<ChallengeStage>) -> Self {
    Self::resume(game_id, kind, stages, None)
  }

  /// Builds a machine for a catalogue game, continuing from `record` if given.
  pub fn for_game(game: &Game, record: Option<&SessionRecord>) -> Self {
    let mut m = Self::resume(game.id.clone(), game.kind, game.to_stages(), record);
    m.roster = game.roster();
    m
  }

  /// Builds a one-stage machine for a coding lesson. Other lesson kinds have
  /// nothing to submit and yield an empty machine.
  pub fn for_lesson(id: impl Into<String>, lesson: &Lesson, record: Option<&SessionRecord>) -> Self {
    let stages = lesson.to_stage().into_iter().collect();
    Self::resume(id, ChallengeKind::CodingLesson, stages, record)
  }

  /// Restores a session. Out-of-range resume indices restart at stage 0 and are
  /// reported through `corrupt_resume()`; a completed record stays complete
  /// without firing completion again.
  pub fn resume(
    game_id: impl Into<String>,
    kind: impl Into<ChallengeKind>,
    stages: Vec<ChallengeStage>,
    record: Option<&SessionRecord>,
  ) -> Self {
    let kind = kind.into();
    let mut m = ChallengeStageMachine {
      game_id: game_id.into(),
      kind,
      stages,
      roster: Vec::new(),
      phase: Phase::Awaiting,
      index: 0,
      score: 0,
      aux: kind.initial_aux(),
      hint_visible: false,
      incorrect_until: None,
      incorrect_flash: DEFAULT_INCORRECT_FLASH,
      epoch: 0,
      completion_fired: false,
      corrupt_resume: None,
      on_stage_solved: None,
      on_game_complete: None,
    };

    if m.stages.is_empty() {
      m.phase = Phase::NoContent;
      return m;
    }

    let Some(rec) = record else { return m };
    m.score = rec.score;
    m.aux.extend(rec.auxiliary_data.clone());

    let len = m.stages.len();
    let requested = rec.current_stage_index;
    if requested >= 0 && (requested as u64) < len as u64 {
      m.index = requested as usize;
    } else {
      let corrupt = CorruptResumeState { requested, stage_count: len };
      warn!(target: "engine", game = %m.game_id, error = %corrupt, "Recovered corrupt resume state");
      m.corrupt_resume = Some(corrupt);
    }

    if rec.completed {
      m.phase = Phase::Complete;
      m.completion_fired = true;
    }
    m
  }

  pub fn with_incorrect_flash(mut self, flash: Duration) -> Self {
    self.incorrect_flash = flash;
    self
  }

  pub fn on_stage_solved(mut self, cb: impl FnMut(u32, &AuxData) + Send + 'static) -> Self {
    self.on_stage_solved = Some(Box::new(cb));
    self
  }

  pub fn on_game_complete(mut self, cb: impl FnMut(u32) + Send + 'static) -> Self {
    self.on_game_complete = Some(Box::new(cb));
    self
  }

  // --- read-only state ---

  pub fn game_id(&self) -> &str {
    &self.game_id
  }

  pub fn kind(&self) -> ChallengeKind {
    self.kind
  }

  pub fn stages(&self) -> &[ChallengeStage] {
    &self.stages
  }

  pub fn has_content(&self) -> bool {
    !self.stages.is_empty()
  }

  pub fn current_stage_index(&self) -> usize {
    self.index
  }

  pub fn current_stage(&self) -> Option<&ChallengeStage> {
    self.stages.get(self.index)
  }

  pub fn score(&self) -> u32 {
    self.score
  }

  pub fn is_complete(&self) -> bool {
    self.phase == Phase::Complete
  }

  pub fn is_evaluating(&self) -> bool {
    self.phase == Phase::Evaluating
  }

  pub fn hint_visible(&self) -> bool {
    self.hint_visible
  }

  pub fn aux(&self) -> &AuxData {
    &self.aux
  }

  pub fn roster(&self) -> &[String] {
    &self.roster
  }

  pub fn corrupt_resume(&self) -> Option<&CorruptResumeState> {
    self.corrupt_resume.as_ref()
  }

  /// Transient wrong-answer signal; clears by itself after the flash duration.
  pub fn incorrect_signal(&self) -> bool {
    self.incorrect_until.is_some_and(|until| Instant::now() < until)
  }

  pub fn state(&self) -> MachineState {
    match self.phase {
      Phase::NoContent => MachineState::NoContent,
      Phase::Awaiting => MachineState::AwaitingSubmission(self.index),
      Phase::Evaluating => MachineState::Evaluating(self.index),
      Phase::Solved => MachineState::StageSolved(self.index),
      Phase::Complete => MachineState::GameComplete,
    }
  }

  /// Persistable snapshot. Evaluation in flight is not part of it.
  pub fn record(&self, now: DateTime<Utc>) -> SessionRecord {
    SessionRecord {
      started: true,
      completed: self.is_complete(),
      current_stage_index: self.index as i64,
      score: self.score,
      last_played_at: now,
      auxiliary_data: self.aux.clone(),
    }
  }

  // --- transitions ---

  fn ensure_playable(&self) -> Result<(), EngineError> {
    match self.phase {
      Phase::NoContent => Err(EngineError::NoContent),
      Phase::Complete => Err(EngineError::GameComplete),
      Phase::Evaluating | Phase::Solved => Err(EngineError::Busy),
      Phase::Awaiting => Ok(()),
    }
  }

  fn leave_stage(&mut self) {
    self.hint_visible = false;
    self.incorrect_until = None;
  }

  #[instrument(level = "debug", skip(self, code), fields(game = %self.game_id, stage = self.index, code_len = code.len()))]
  pub fn begin_submit(&mut self, code: &str) -> Result<SubmitTicket, EngineError> {
    self.ensure_playable()?;
    if self.kind.requires_character() && !self.aux.contains_key(AUX_SELECTED_CHARACTER) {
      return Err(EngineError::Locked("quest: select a character".into()));
    }

    let stage = &self.stages[self.index];
    let code = if code.trim().is_empty() { stage.starter_code.clone() } else { code.to_string() };
    let ticket = SubmitTicket {
      epoch: self.epoch,
      stage_index: self.index,
      code,
      expected_output: stage.expected_output.clone(),
    };
    self.incorrect_until = None;
    self.phase = Phase::Evaluating;
    Ok(ticket)
  }

  #[instrument(level = "debug", skip(self, ticket, result), fields(game = %self.game_id, stage = ticket.stage_index))]
  pub fn finish_submit(&mut self, ticket: SubmitTicket, result: Result<RunVerdict, RunnerError>) -> SubmitOutcome {
    if ticket.epoch != self.epoch || self.phase != Phase::Evaluating || ticket.stage_index != self.index {
      debug!(target: "engine", ticket_epoch = ticket.epoch, epoch = self.epoch, "Dropping stale verdict");
      return SubmitOutcome::Stale;
    }
    let i = self.index;

    let verdict = match result {
      Ok(v) => v,
      Err(e) => {
        warn!(target: "engine", game = %self.game_id, stage = i, error = %e, "Code runner unavailable");
        self.phase = Phase::Awaiting;
        return SubmitOutcome::RunnerUnavailable { stage_index: i, reason: e.to_string() };
      }
    };

    if !verdict.solves(ticket.expected_output.as_deref()) {
      self.phase = Phase::Awaiting;
      self.incorrect_until = Some(Instant::now() + self.incorrect_flash);
      debug!(target: "engine", game = %self.game_id, stage = i, "Incorrect solution");
      return SubmitOutcome::Incorrect { stage_index: i, output: verdict.output, error: verdict.error };
    }

    self.phase = Phase::Solved;
    self.score = self.score.saturating_add(self.kind.stage_award());
    let aux_delta = self.kind.aux_on_solved(&self.stages, i, &self.aux);
    self.aux.extend(aux_delta.clone());
    if let Some(cb) = self.on_stage_solved.as_mut() {
      cb(self.score, &aux_delta);
    }
    info!(target: "engine", game = %self.game_id, stage = i, score = self.score, "Stage solved");

    let mut game_completed = false;
    if i + 1 < self.stages.len() {
      self.index = i + 1;
      self.leave_stage();
      self.phase = Phase::Awaiting;
    } else {
      self.leave_stage();
      self.phase = Phase::Complete;
      if !self.completion_fired {
        self.completion_fired = true;
        game_completed = true;
        if let Some(cb) = self.on_game_complete.as_mut() {
          cb(self.score);
        }
        info!(target: "engine", game = %self.game_id, final_score = self.score, "Game complete");
      }
    }

    SubmitOutcome::Solved { stage_index: i, score: self.score, aux_delta, game_completed }
  }

  /// One-shot submit for a machine owned by a single caller.
  pub async fn submit(
    &mut self,
    runner: &dyn CodeRunner,
    code: &str,
    timeout: Duration,
  ) -> Result<SubmitOutcome, EngineError> {
    let ticket = self.begin_submit(code)?;
    let result = run_with_timeout(runner, &ticket.code, ticket.expected_output.as_deref(), timeout).await;
    Ok(self.finish_submit(ticket, result))
  }

  /// Flips hint visibility for the current stage. Returns the new visibility.
  pub fn toggle_hint(&mut self) -> Result<bool, EngineError> {
    match self.phase {
      Phase::NoContent => Err(EngineError::NoContent),
      Phase::Complete => Err(EngineError::GameComplete),
      _ => {
        self.hint_visible = !self.hint_visible;
        Ok(self.hint_visible)
      }
    }
  }

  /// Steps back one stage. Score and completion are untouched; at stage 0 this
  /// is a no-op.
  pub fn previous_stage(&mut self) -> Result<usize, EngineError> {
    if !self.kind.allows_previous() {
      return Err(EngineError::Unsupported { action: "previous stage", kind: self.kind });
    }
    self.ensure_playable()?;
    if self.index > 0 {
      self.index -= 1;
      self.leave_stage();
    }
    Ok(self.index)
  }

  /// Known-good code for the current debugging mission. Looking at it is not
  /// solving it: no score, no advance.
  pub fn reveal_solution(&self) -> Result<Option<String>, EngineError> {
    if !self.kind.allows_reveal() {
      return Err(EngineError::Unsupported { action: "reveal solution", kind: self.kind });
    }
    match self.phase {
      Phase::NoContent => Err(EngineError::NoContent),
      Phase::Complete => Err(EngineError::GameComplete),
      _ => Ok(self.current_stage().and_then(|s| s.solution.clone())),
    }
  }

  pub fn select_character(&mut self, character_id: &str) -> Result<(), EngineError> {
    if !self.kind.requires_character() {
      return Err(EngineError::Unsupported { action: "character selection", kind: self.kind });
    }
    self.ensure_playable()?;
    if !self.roster.is_empty() && !self.roster.iter().any(|c| c == character_id) {
      return Err(EngineError::not_found("character", character_id));
    }
    self.aux.insert(AUX_SELECTED_CHARACTER.into(), character_id.into());
    Ok(())
  }

  /// "Play again": back to stage 0 with score and auxiliary data cleared.
  /// Any evaluation still in flight is invalidated.
  pub fn reset(&mut self) {
    self.epoch += 1;
    self.index = 0;
    self.score = 0;
    self.aux = self.kind.initial_aux();
    self.leave_stage();
    self.completion_fired = false;
    self.corrupt_resume = None;
    self.phase = if self.stages.is_empty() { Phase::NoContent } else { Phase::Awaiting };
    info!(target: "engine", game = %self.game_id, "Session reset");
  }

  /// Drops any outstanding evaluation without touching progress.
  pub fn cancel(&mut self) {
    self.epoch += 1;
    if self.phase == Phase::Evaluating {
      self.phase = Phase::Awaiting;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::LessonKind;
  use crate::games::{self, GameData, GameKind, Mission, AUX_BUGS_FOUND};
  use async_trait::async_trait;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::{Arc, Mutex};

  fn stages(n: usize) -> Vec<ChallengeStage> {
    (0..n)
      .map(|i| ChallengeStage {
        index: i,
        title: format!("Stage {i}"),
        starter_code: format!("print({i})"),
        expected_output: Some(i.to_string()),
        hints: vec![format!("hint {i}")],
        group: i,
        ..Default::default()
      })
      .collect()
  }

  /// Echoes the number inside `print(n)`.
  struct EchoRunner;

  #[async_trait]
  impl CodeRunner for EchoRunner {
    async fn execute(&self, code: &str, _expected: Option<&str>) -> Result<RunVerdict, RunnerError> {
      let out = code.trim().trim_start_matches("print(").trim_end_matches(')').to_string();
      Ok(RunVerdict { success: true, output: out, ..Default::default() })
    }
  }

  struct DownRunner;

  #[async_trait]
  impl CodeRunner for DownRunner {
    async fn execute(&self, _code: &str, _expected: Option<&str>) -> Result<RunVerdict, RunnerError> {
      Err(RunnerError::Transport("connection refused".into()))
    }
  }

  struct SlowRunner;

  #[async_trait]
  impl CodeRunner for SlowRunner {
    async fn execute(&self, _code: &str, _expected: Option<&str>) -> Result<RunVerdict, RunnerError> {
      tokio::time::sleep(Duration::from_secs(60)).await;
      Ok(RunVerdict { success: true, ..Default::default() })
    }
  }

  const T: Duration = Duration::from_secs(5);

  fn ok(output: &str) -> Result<RunVerdict, RunnerError> {
    Ok(RunVerdict { success: true, output: output.into(), ..Default::default() })
  }

  #[tokio::test]
  async fn test_three_stages_complete_once() {
    let completions = Arc::new(AtomicUsize::new(0));
    let final_scores = Arc::new(Mutex::new(Vec::new()));
    let c = completions.clone();
    let f = final_scores.clone();
    let mut m = ChallengeStageMachine::new("g", GameKind::Adventure, stages(3)).on_game_complete(move |score| {
      c.fetch_add(1, Ordering::SeqCst);
      f.lock().unwrap().push(score);
    });

    assert_eq!(m.state(), MachineState::AwaitingSubmission(0));
    let out = m.submit(&EchoRunner, "print(0)", T).await.unwrap();
    assert!(matches!(out, SubmitOutcome::Solved { stage_index: 0, score: 10, game_completed: false, .. }));
    assert_eq!(m.current_stage_index(), 1);
    assert!(!m.is_complete());

    m.submit(&EchoRunner, "print(1)", T).await.unwrap();
    let out = m.submit(&EchoRunner, "print(2)", T).await.unwrap();
    assert!(matches!(out, SubmitOutcome::Solved { stage_index: 2, score: 30, game_completed: true, .. }));
    assert!(m.is_complete());
    assert_eq!(m.state(), MachineState::GameComplete);
    assert_eq!(completions.load(Ordering::SeqCst), 1);
    assert_eq!(*final_scores.lock().unwrap(), vec![30]);

    assert_eq!(m.submit(&EchoRunner, "print(2)", T).await.unwrap_err(), EngineError::GameComplete);
    assert_eq!(completions.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_stage_solved_callback_gets_score_and_delta() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    let mut m = ChallengeStageMachine::new("g", GameKind::Debugging, stages(2))
      .on_stage_solved(move |score, delta| s.lock().unwrap().push((score, delta.clone())));
    m.submit(&EchoRunner, "print(0)", T).await.unwrap();
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, 20);
    assert_eq!(seen[0].1[AUX_BUGS_FOUND], serde_json::json!(1));
  }

  #[test]
  fn test_busy_while_evaluating() {
    let mut m = ChallengeStageMachine::new("g", GameKind::Quest, stages(2));
    m.select_character("robo").unwrap();
    let ticket = m.begin_submit("print(0)").unwrap();
    assert_eq!(m.state(), MachineState::Evaluating(0));
    assert_eq!(m.begin_submit("print(0)").unwrap_err(), EngineError::Busy);
    assert_eq!(m.score(), 0);

    m.finish_submit(ticket, ok("0"));
    assert_eq!(m.score(), 10);
    assert_eq!(m.current_stage_index(), 1);
  }

  #[test]
  fn test_wrong_answer_keeps_stage_and_score() {
    let mut m = ChallengeStageMachine::new("g", GameKind::Factory, stages(2));
    let ticket = m.begin_submit("print(7)").unwrap();
    let out = m.finish_submit(ticket, ok("7"));
    assert!(matches!(out, SubmitOutcome::Incorrect { stage_index: 0, .. }));
    assert_eq!(m.state(), MachineState::AwaitingSubmission(0));
    assert_eq!(m.score(), 0);
    assert!(m.incorrect_signal());
  }

  #[tokio::test(start_paused = true)]
  async fn test_incorrect_signal_clears_after_flash() {
    let mut m = ChallengeStageMachine::new("g", GameKind::Adventure, stages(2))
      .with_incorrect_flash(Duration::from_millis(800));
    m.submit(&EchoRunner, "print(9)", T).await.unwrap();
    assert!(m.incorrect_signal());
    tokio::time::advance(Duration::from_millis(801)).await;
    assert!(!m.incorrect_signal());
  }

  #[test]
  fn test_incorrect_signal_does_not_survive_stage_change() {
    let mut m = ChallengeStageMachine::new("g", GameKind::Adventure, stages(3))
      .with_incorrect_flash(Duration::from_secs(3600));
    let t = m.begin_submit("x").unwrap();
    m.finish_submit(t, ok("wrong"));
    assert!(m.incorrect_signal());
    let t = m.begin_submit("x").unwrap();
    m.finish_submit(t, ok("0"));
    assert!(!m.incorrect_signal());

    let t = m.begin_submit("x").unwrap();
    m.finish_submit(t, ok("wrong"));
    assert!(m.incorrect_signal());
    m.previous_stage().unwrap();
    assert!(!m.incorrect_signal());
  }

  #[tokio::test]
  async fn test_runner_unavailable_is_retryable() {
    let mut m = ChallengeStageMachine::new("g", GameKind::Exploration, stages(2));
    let out = m.submit(&DownRunner, "print(0)", T).await.unwrap();
    assert!(matches!(out, SubmitOutcome::RunnerUnavailable { stage_index: 0, .. }));
    assert_eq!(m.state(), MachineState::AwaitingSubmission(0));
    assert_eq!(m.score(), 0);
    assert!(!m.incorrect_signal());

    let out = m.submit(&EchoRunner, "print(0)", T).await.unwrap();
    assert!(matches!(out, SubmitOutcome::Solved { score: 20, .. }));
  }

  #[tokio::test(start_paused = true)]
  async fn test_runner_timeout_is_unavailable() {
    let mut m = ChallengeStageMachine::new("g", GameKind::Adventure, stages(1));
    let out = m.submit(&SlowRunner, "print(0)", Duration::from_secs(3)).await.unwrap();
    match out {
      SubmitOutcome::RunnerUnavailable { reason, .. } => assert!(reason.contains("timed out")),
      other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(m.state(), MachineState::AwaitingSubmission(0));
  }

  #[test]
  fn test_missing_expected_output_accepts_clean_run() {
    let mut st = stages(1);
    st[0].expected_output = None;
    let mut m = ChallengeStageMachine::new("g", GameKind::Adventure, st);
    let t = m.begin_submit("anything").unwrap();
    let out = m.finish_submit(t, ok("whatever"));
    assert!(matches!(out, SubmitOutcome::Solved { game_completed: true, .. }));

    let mut st = stages(1);
    st[0].expected_output = None;
    let mut m = ChallengeStageMachine::new("g", GameKind::Adventure, st);
    let t = m.begin_submit("anything").unwrap();
    let out = m.finish_submit(t, Ok(RunVerdict { success: false, error: "SyntaxError".into(), ..Default::default() }));
    assert!(matches!(out, SubmitOutcome::Incorrect { .. }));
  }

  #[test]
  fn test_blank_submission_uses_starter_code() {
    let mut m = ChallengeStageMachine::new("g", GameKind::Adventure, stages(2));
    let t = m.begin_submit("   ").unwrap();
    assert_eq!(t.code, "print(0)");
    assert_eq!(t.expected_output.as_deref(), Some("0"));
  }

  #[test]
  fn test_resume_clamps_out_of_range_index() {
    for bad in [99, 3, -1] {
      let rec = SessionRecord {
        started: true,
        completed: false,
        current_stage_index: bad,
        score: 20,
        last_played_at: Utc::now(),
        auxiliary_data: AuxData::new(),
      };
      let m = ChallengeStageMachine::resume("g", GameKind::Adventure, stages(3), Some(&rec));
      assert_eq!(m.current_stage_index(), 0);
      assert_eq!(m.state(), MachineState::AwaitingSubmission(0));
      assert_eq!(m.corrupt_resume(), Some(&CorruptResumeState { requested: bad, stage_count: 3 }));
    }
  }

  #[test]
  fn test_resume_valid_index() {
    let rec = SessionRecord {
      started: true,
      completed: false,
      current_stage_index: 2,
      score: 20,
      last_played_at: Utc::now(),
      auxiliary_data: AuxData::new(),
    };
    let m = ChallengeStageMachine::resume("g", GameKind::Adventure, stages(3), Some(&rec));
    assert_eq!(m.state(), MachineState::AwaitingSubmission(2));
    assert_eq!(m.score(), 20);
    assert!(m.corrupt_resume().is_none());
  }

  #[test]
  fn test_completed_record_does_not_refire() {
    let fired = Arc::new(AtomicUsize::new(0));
    let f = fired.clone();
    let rec = SessionRecord {
      started: true,
      completed: true,
      current_stage_index: 1,
      score: 20,
      last_played_at: Utc::now(),
      auxiliary_data: AuxData::new(),
    };
    let mut m = ChallengeStageMachine::resume("g", GameKind::Adventure, stages(2), Some(&rec))
      .on_game_complete(move |_| {
        f.fetch_add(1, Ordering::SeqCst);
      });
    assert!(m.is_complete());
    assert_eq!(m.begin_submit("print(1)").unwrap_err(), EngineError::GameComplete);
    assert_eq!(m.toggle_hint().unwrap_err(), EngineError::GameComplete);
    assert_eq!(fired.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn test_hint_resets_when_stage_advances() {
    let mut m = ChallengeStageMachine::new("g", GameKind::Adventure, stages(3));
    assert!(m.toggle_hint().unwrap());
    assert!(m.hint_visible());
    assert_eq!(m.score(), 0);
    assert_eq!(m.current_stage_index(), 0);
    let t = m.begin_submit("x").unwrap();
    // hints stay usable while the runner is busy
    assert!(!m.toggle_hint().unwrap());
    assert!(m.toggle_hint().unwrap());
    m.finish_submit(t, ok("0"));
    assert!(!m.hint_visible());
  }

  #[test]
  fn test_previous_stage_is_pure_navigation() {
    let mut m = ChallengeStageMachine::new("g", GameKind::Quest, stages(3));
    m.select_character("knight").unwrap();
    assert_eq!(m.previous_stage().unwrap(), 0);
    let t = m.begin_submit("x").unwrap();
    m.finish_submit(t, ok("0"));
    m.toggle_hint().unwrap();
    assert_eq!(m.previous_stage().unwrap(), 0);
    assert_eq!(m.score(), 10);
    assert!(!m.hint_visible());
    assert!(!m.is_complete());

    let mut f = ChallengeStageMachine::new("g", GameKind::Factory, stages(3));
    assert!(matches!(f.previous_stage().unwrap_err(), EngineError::Unsupported { .. }));
  }

  #[test]
  fn test_reset_clears_progress_and_invalidates_tickets() {
    let mut m = ChallengeStageMachine::new("g", GameKind::Factory, stages(2));
    let t = m.begin_submit("x").unwrap();
    m.finish_submit(t, ok("0"));
    assert_eq!(m.current_stage_index(), 1);
    assert!(m.aux()[games::AUX_FACTORY_HEALTH].as_u64().unwrap() > games::factory::HEALTH_START);

    m.reset();
    assert_eq!(m.state(), MachineState::AwaitingSubmission(0));
    assert_eq!(m.score(), 0);
    assert_eq!(m.aux(), &games::initial_aux(GameKind::Factory));

    let stale = m.begin_submit("x").unwrap();
    m.reset();
    assert_eq!(m.finish_submit(stale, ok("0")), SubmitOutcome::Stale);
    assert_eq!(m.score(), 0);
  }

  #[test]
  fn test_completion_fires_again_after_reset() {
    let fired = Arc::new(AtomicUsize::new(0));
    let f = fired.clone();
    let mut m = ChallengeStageMachine::new("g", GameKind::Adventure, stages(1)).on_game_complete(move |_| {
      f.fetch_add(1, Ordering::SeqCst);
    });
    let t = m.begin_submit("x").unwrap();
    m.finish_submit(t, ok("0"));
    m.reset();
    let t = m.begin_submit("x").unwrap();
    m.finish_submit(t, ok("0"));
    assert_eq!(fired.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn test_cancel_drops_late_verdict() {
    let mut m = ChallengeStageMachine::new("g", GameKind::Adventure, stages(2));
    let t = m.begin_submit("x").unwrap();
    m.cancel();
    assert_eq!(m.state(), MachineState::AwaitingSubmission(0));
    assert_eq!(m.finish_submit(t, ok("0")), SubmitOutcome::Stale);
    assert_eq!(m.current_stage_index(), 0);
    assert_eq!(m.score(), 0);
  }

  #[test]
  fn test_empty_stage_list_is_no_content() {
    let game: Game = serde_json::from_str(r#"{"id":"x","title":"X","kind":"exploration","gameData":{"expeditions":[]}}"#).unwrap();
    let mut m = ChallengeStageMachine::for_game(&game, None);
    assert_eq!(m.state(), MachineState::NoContent);
    assert!(!m.is_complete());
    assert!(!m.has_content());
    assert_eq!(m.begin_submit("x").unwrap_err(), EngineError::NoContent);
    assert_eq!(m.toggle_hint().unwrap_err(), EngineError::NoContent);
    m.reset();
    assert_eq!(m.state(), MachineState::NoContent);
  }

  #[test]
  fn test_reveal_solution_is_never_scored() {
    let missions: Vec<Mission> = (0..7)
      .map(|i| Mission {
        title: format!("Mission {i}"),
        buggy_code: format!("prnt({i})"),
        fixed_code: format!("print({i})"),
        expected_output: Some(i.to_string()),
        ..Default::default()
      })
      .collect();
    let game = Game {
      id: "bugs".into(),
      title: "Bug Hunt".into(),
      kind: GameKind::Debugging,
      description: String::new(),
      game_data: GameData { missions, ..Default::default() },
    };
    let mut m = ChallengeStageMachine::for_game(&game, None);
    for i in 0..2 {
      let t = m.begin_submit(&format!("print({i})")).unwrap();
      m.finish_submit(t, ok(&i.to_string()));
    }
    assert_eq!(m.current_stage_index(), 2);
    let score = m.score();

    let fix = m.reveal_solution().unwrap();
    assert_eq!(fix.as_deref(), Some("print(2)"));
    assert_eq!(m.score(), score);
    assert_eq!(m.current_stage_index(), 2);
    assert_eq!(m.state(), MachineState::AwaitingSubmission(2));

    let t = m.begin_submit("print(2)").unwrap();
    m.finish_submit(t, ok("2"));
    assert_eq!(m.current_stage_index(), 3);
    assert_eq!(m.score(), score + 20);

    let mut a = ChallengeStageMachine::new("a", GameKind::Adventure, stages(1));
    assert!(matches!(a.reveal_solution().unwrap_err(), EngineError::Unsupported { .. }));
    a.reset();
  }

  #[test]
  fn test_quest_requires_character_from_roster() {
    let game: Game = serde_json::from_str(
      r#"{"id":"q","title":"Q","kind":"quest","gameData":{
        "characters":[{"id":"wizard","name":"Wizard"}],
        "levels":[{"title":"L1","challenges":[{"title":"c","starterCode":"print(0)","expectedOutput":"0"}]}]
      }}"#,
    )
    .unwrap();
    let mut m = ChallengeStageMachine::for_game(&game, None);
    assert!(matches!(m.begin_submit("print(0)").unwrap_err(), EngineError::Locked(_)));
    assert_eq!(m.select_character("dragon").unwrap_err(), EngineError::not_found("character", "dragon"));
    m.select_character("wizard").unwrap();
    assert_eq!(m.aux()[AUX_SELECTED_CHARACTER], serde_json::json!("wizard"));
    let t = m.begin_submit("print(0)").unwrap();
    m.finish_submit(t, ok("0"));
    assert!(m.is_complete());

    m.reset();
    assert!(!m.aux().contains_key(AUX_SELECTED_CHARACTER));
  }

  #[test]
  fn test_coding_lesson_is_one_unscored_stage() {
    let lesson = Lesson::new("first-print", "First print", LessonKind::Coding).with_code("print()", Some("hi"), &["Use quotes."]);
    let mut m = ChallengeStageMachine::for_lesson("lesson", &lesson, None);
    assert_eq!(m.stages().len(), 1);
    assert_eq!(m.stages()[0].expected_output.as_deref(), Some("hi"));
    assert!(matches!(m.previous_stage().unwrap_err(), EngineError::Unsupported { kind: ChallengeKind::CodingLesson, .. }));

    let t = m.begin_submit("print('nope')").unwrap();
    assert!(matches!(m.finish_submit(t, ok("nope")), SubmitOutcome::Incorrect { .. }));
    let t = m.begin_submit("print('hi')").unwrap();
    assert!(matches!(m.finish_submit(t, ok("hi")), SubmitOutcome::Solved { score: 0, game_completed: true, .. }));

    let reading = Lesson::new("intro", "Intro", LessonKind::Content);
    assert_eq!(ChallengeStageMachine::for_lesson("lesson", &reading, None).state(), MachineState::NoContent);
  }
}
