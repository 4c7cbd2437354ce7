//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Course outline and lesson completion (lock checks, XP awards)
//!   - Coding lessons, played as a one-stage session that completes the lesson
//!   - Starting/resuming game sessions and driving the stage machine
//!   - Converting a completed game's score into experience
//!
//! Submissions never hold the session lock across the runner call: the
//! machine hands out a ticket, the code runs, and the verdict is applied
//! afterwards. A second submission in between is rejected as busy. The run
//! and the verdict happen on a detached task, so a caller that goes away
//! mid-evaluation cannot leave the session stuck in `Evaluating`.

use tracing::{error, info, instrument};

use crate::domain::{EntityRef, Lesson, LessonKind, LessonRef};
use crate::error::EngineError;
use crate::machine::SubmitOutcome;
use crate::progress::{CourseView, ProgressModel};
use crate::protocol::*;
use crate::runner::{run_with_timeout, RunnerError};
use crate::state::{AppState, SharedSession};

/// Runs `code` against the session's current stage and applies the verdict.
async fn evaluate(state: &AppState, session: SharedSession, code: &str) -> Result<(SubmitOutcome, SessionView), EngineError> {
  let ticket = { session.lock().await.begin_submit(code).await? };
  let runner = state.runner.clone();
  let timeout = state.runner_timeout;

  let detached = session.clone();
  let task = tokio::spawn(async move {
    let result = match &runner {
      Some(r) => run_with_timeout(r.as_ref(), &ticket.code, ticket.expected_output.as_deref(), timeout).await,
      None => Err(RunnerError::NotConfigured),
    };
    let mut s = detached.lock().await;
    let outcome = s.finish_submit(ticket, result).await;
    (outcome, session_view(s.machine()))
  });

  match task.await {
    Ok(done) => Ok(done),
    Err(e) => {
      let mut s = session.lock().await;
      error!(target: "engine", key = %s.key(), error = %e, "Evaluation task failed");
      s.cancel_evaluation();
      Err(EngineError::Internal(e.to_string()))
    }
  }
}

#[instrument(level = "info", skip(state))]
pub async fn courses_outline(state: &AppState, user_id: &str) -> Vec<CourseView> {
  if let Some(model) = state.progress.read().await.get(user_id) {
    return model.outline();
  }
  ProgressModel::new(state.courses.to_vec()).outline()
}

/// Direct completion, for lessons without an exercise. Coding lessons only
/// complete through a passing submission (`submit_lesson_code`).
#[instrument(level = "info", skip(state))]
pub async fn complete_lesson(state: &AppState, user_id: &str, lesson: &LessonRef) -> Result<LessonCompleteOut, EngineError> {
  let kind = {
    let progress = state.progress.read().await;
    match progress.get(user_id) {
      Some(model) => model.lesson(lesson)?.kind,
      None => ProgressModel::new(state.courses.to_vec()).lesson(lesson)?.kind,
    }
  };
  if kind == LessonKind::Coding {
    return Err(EngineError::SubmissionRequired(lesson.lesson_id.clone()));
  }
  grant_lesson(state, user_id, lesson).await
}

async fn grant_lesson(state: &AppState, user_id: &str, lesson: &LessonRef) -> Result<LessonCompleteOut, EngineError> {
  let award = {
    let mut progress = state.progress.write().await;
    let model = progress
      .entry(user_id.to_string())
      .or_insert_with(|| ProgressModel::new(state.courses.to_vec()));
    model.mark_lesson_completed(user_id, lesson, &state.awards).await?
  };
  let (user, level_change) = state.award_xp(user_id, award.xp_awarded).await;
  Ok(LessonCompleteOut { award, level_change, user: user_view(user_id, &user) })
}

/// The coding lesson at `r`, provided the user may work on it.
async fn playable_coding_lesson(state: &AppState, user_id: &str, r: &LessonRef) -> Result<Lesson, EngineError> {
  let progress = state.progress.read().await;
  let fresh;
  let model = match progress.get(user_id) {
    Some(m) => m,
    None => {
      fresh = ProgressModel::new(state.courses.to_vec());
      &fresh
    }
  };
  let lesson = model.lesson(r)?;
  if lesson.kind != LessonKind::Coding {
    return Err(EngineError::not_found("coding lesson", r.lesson_id.clone()));
  }
  if model.is_locked(&EntityRef::Lesson(r.clone()))? {
    return Err(EngineError::Locked(format!("lesson {}", r.lesson_id)));
  }
  Ok(lesson.clone())
}

#[instrument(level = "info", skip(state))]
pub async fn start_lesson(state: &AppState, user_id: &str, r: &LessonRef) -> Result<SessionView, EngineError> {
  let lesson = playable_coding_lesson(state, user_id, r).await?;
  let session = state.lesson_session(user_id, r, &lesson).await?;
  let s = session.lock().await;
  Ok(session_view(s.machine()))
}

/// Checks a coding lesson submission. Solving the stage is what marks the
/// lesson completed and grants its XP.
#[instrument(level = "info", skip(state, code), fields(code_len = code.len()))]
pub async fn submit_lesson_code(state: &AppState, user_id: &str, r: &LessonRef, code: &str) -> Result<LessonSubmitReply, EngineError> {
  let lesson = playable_coding_lesson(state, user_id, r).await?;
  let session = state.lesson_session(user_id, r, &lesson).await?;
  let (outcome, session) = evaluate(state, session, code).await?;

  let completion = match &outcome {
    SubmitOutcome::Solved { game_completed: true, .. } => {
      let out = grant_lesson(state, user_id, r).await?;
      info!(target: "progress", %user_id, lesson = %r.lesson_id, xp = out.award.xp_awarded, "Coding lesson passed");
      Some(out)
    }
    _ => None,
  };
  Ok(LessonSubmitReply { outcome, session, completion })
}

#[instrument(level = "info", skip(state))]
pub async fn toggle_lesson_hint(state: &AppState, user_id: &str, r: &LessonRef) -> Result<HintOut, EngineError> {
  let lesson = playable_coding_lesson(state, user_id, r).await?;
  hint_out(state.lesson_session(user_id, r, &lesson).await?).await
}

pub async fn get_user(state: &AppState, user_id: &str) -> UserView {
  user_view(user_id, &state.user(user_id).await)
}

pub fn list_games(state: &AppState) -> Vec<GameSummary> {
  state.games.iter().map(game_summary).collect()
}

#[instrument(level = "info", skip(state))]
pub async fn start_session(state: &AppState, user_id: &str, game_id: &str) -> Result<SessionView, EngineError> {
  let session = state.live_session(user_id, game_id).await?;
  let s = session.lock().await;
  Ok(session_view(s.machine()))
}

#[instrument(level = "info", skip(state, code), fields(code_len = code.len()))]
pub async fn submit_code(state: &AppState, user_id: &str, game_id: &str, code: &str) -> Result<SubmitReply, EngineError> {
  let session = state.live_session(user_id, game_id).await?;
  let (outcome, view) = evaluate(state, session, code).await?;

  let user = match &outcome {
    SubmitOutcome::Solved { game_completed: true, score, .. } => {
      let xp = state.awards.game_xp(*score);
      let (user, change) = state.award_xp(user_id, xp).await;
      info!(target: "progress", %user_id, %game_id, final_score = score, xp, level = change.after, "Game completion converted to XP");
      Some(user_view(user_id, &user))
    }
    _ => None,
  };

  Ok(SubmitReply { outcome, session: view, user })
}

async fn hint_out(session: SharedSession) -> Result<HintOut, EngineError> {
  let mut s = session.lock().await;
  let visible = s.toggle_hint()?;
  let hints = match (visible, s.machine().current_stage()) {
    (true, Some(stage)) => stage.hints.clone(),
    _ => Vec::new(),
  };
  Ok(HintOut { visible, hints })
}

#[instrument(level = "info", skip(state))]
pub async fn toggle_hint(state: &AppState, user_id: &str, game_id: &str) -> Result<HintOut, EngineError> {
  hint_out(state.live_session(user_id, game_id).await?).await
}

#[instrument(level = "info", skip(state))]
pub async fn previous_stage(state: &AppState, user_id: &str, game_id: &str) -> Result<SessionView, EngineError> {
  let session = state.live_session(user_id, game_id).await?;
  let mut s = session.lock().await;
  s.previous_stage().await?;
  Ok(session_view(s.machine()))
}

#[instrument(level = "info", skip(state))]
pub async fn reset_session(state: &AppState, user_id: &str, game_id: &str) -> Result<SessionView, EngineError> {
  let session = state.live_session(user_id, game_id).await?;
  let mut s = session.lock().await;
  s.reset().await;
  Ok(session_view(s.machine()))
}

#[instrument(level = "info", skip(state))]
pub async fn reveal_solution(state: &AppState, user_id: &str, game_id: &str) -> Result<RevealOut, EngineError> {
  let session = state.live_session(user_id, game_id).await?;
  let s = session.lock().await;
  let fixed_code = s.reveal_solution()?;
  info!(target: "engine", %user_id, %game_id, stage = s.machine().current_stage_index(), "Solution revealed (unscored)");
  Ok(RevealOut { fixed_code, session: session_view(s.machine()) })
}

#[instrument(level = "info", skip(state))]
pub async fn select_character(state: &AppState, user_id: &str, game_id: &str, character_id: &str) -> Result<SessionView, EngineError> {
  let session = state.live_session(user_id, game_id).await?;
  let mut s = session.lock().await;
  s.select_character(character_id).await?;
  Ok(session_view(s.machine()))
}

pub async fn close_session(state: &AppState, user_id: &str, game_id: &str) -> bool {
  state.close_session(user_id, game_id).await
}
