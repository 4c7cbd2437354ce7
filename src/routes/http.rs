//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs its parameters and basic result info.
//! Engine errors map to a status code plus an `ErrorOut` body.

use std::sync::Arc;
use axum::{
  extract::{Path, Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{info, instrument, warn};

use crate::error::EngineError;
use crate::logic::*;
use crate::progress::CourseView;
use crate::protocol::*;
use crate::state::AppState;

pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
  fn from(e: EngineError) -> Self {
    ApiError(e)
  }
}

pub fn status_for(e: &EngineError) -> StatusCode {
  match e {
    EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
    EngineError::Locked(_) => StatusCode::LOCKED,
    EngineError::Busy | EngineError::GameComplete | EngineError::SubmissionRequired(_) => StatusCode::CONFLICT,
    EngineError::NoContent => StatusCode::UNPROCESSABLE_ENTITY,
    EngineError::Unsupported { .. } => StatusCode::BAD_REQUEST,
    EngineError::Persistence(_) | EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = status_for(&self.0);
    if status.is_server_error() {
      warn!(target: "codequest", error = %self.0, "Request failed");
    }
    (status, Json(error_out(&self.0))).into_response()
  }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state), fields(user_id = %q.user_id))]
pub async fn http_get_courses(
  State(state): State<Arc<AppState>>,
  Query(q): Query<UserQuery>,
) -> Json<Vec<CourseView>> {
  Json(courses_outline(&state, &q.user_id).await)
}

#[instrument(level = "info", skip(state, body), fields(user_id = %body.user_id, lesson = %body.lesson.lesson_id))]
pub async fn http_post_complete_lesson(
  State(state): State<Arc<AppState>>,
  Json(body): Json<LessonCompleteIn>,
) -> ApiResult<LessonCompleteOut> {
  let out = complete_lesson(&state, &body.user_id, &body.lesson).await?;
  info!(target: "progress", user_id = %body.user_id, xp = out.award.xp_awarded, repeat = out.award.already_completed, "HTTP lesson completed");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, body), fields(user_id = %body.user_id, lesson = %body.lesson.lesson_id))]
pub async fn http_post_start_lesson(
  State(state): State<Arc<AppState>>,
  Json(body): Json<LessonCompleteIn>,
) -> ApiResult<SessionView> {
  Ok(Json(start_lesson(&state, &body.user_id, &body.lesson).await?))
}

#[instrument(level = "info", skip(state, body), fields(user_id = %body.user_id, lesson = %body.lesson.lesson_id, code_len = body.code.len()))]
pub async fn http_post_submit_lesson(
  State(state): State<Arc<AppState>>,
  Json(body): Json<LessonSubmitIn>,
) -> ApiResult<LessonSubmitReply> {
  let reply = submit_lesson_code(&state, &body.user_id, &body.lesson, &body.code).await?;
  info!(target: "progress", user_id = %body.user_id, passed = reply.completion.is_some(), "HTTP lesson submission evaluated");
  Ok(Json(reply))
}

#[instrument(level = "info", skip(state, body), fields(user_id = %body.user_id, lesson = %body.lesson.lesson_id))]
pub async fn http_post_lesson_hint(
  State(state): State<Arc<AppState>>,
  Json(body): Json<LessonCompleteIn>,
) -> ApiResult<HintOut> {
  Ok(Json(toggle_lesson_hint(&state, &body.user_id, &body.lesson).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_user(
  State(state): State<Arc<AppState>>,
  Path(user_id): Path<String>,
) -> Json<UserView> {
  Json(get_user(&state, &user_id).await)
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_games(State(state): State<Arc<AppState>>) -> Json<Vec<GameSummary>> {
  Json(list_games(&state))
}

#[instrument(level = "info", skip(state, body), fields(user_id = %body.user_id, game_id = %body.game_id))]
pub async fn http_post_start_session(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SessionIn>,
) -> ApiResult<SessionView> {
  Ok(Json(start_session(&state, &body.user_id, &body.game_id).await?))
}

#[instrument(level = "info", skip(state, body), fields(user_id = %body.user_id, game_id = %body.game_id, code_len = body.code.len()))]
pub async fn http_post_submit(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SubmitIn>,
) -> ApiResult<SubmitReply> {
  let reply = submit_code(&state, &body.user_id, &body.game_id, &body.code).await?;
  info!(target: "engine", game_id = %body.game_id, score = reply.session.score, stage = reply.session.current_stage_index, "HTTP submission evaluated");
  Ok(Json(reply))
}

#[instrument(level = "info", skip(state, body), fields(user_id = %body.user_id, game_id = %body.game_id))]
pub async fn http_post_hint(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SessionIn>,
) -> ApiResult<HintOut> {
  Ok(Json(toggle_hint(&state, &body.user_id, &body.game_id).await?))
}

#[instrument(level = "info", skip(state, body), fields(user_id = %body.user_id, game_id = %body.game_id))]
pub async fn http_post_previous(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SessionIn>,
) -> ApiResult<SessionView> {
  Ok(Json(previous_stage(&state, &body.user_id, &body.game_id).await?))
}

#[instrument(level = "info", skip(state, body), fields(user_id = %body.user_id, game_id = %body.game_id))]
pub async fn http_post_reset(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SessionIn>,
) -> ApiResult<SessionView> {
  Ok(Json(reset_session(&state, &body.user_id, &body.game_id).await?))
}

#[instrument(level = "info", skip(state, body), fields(user_id = %body.user_id, game_id = %body.game_id))]
pub async fn http_post_reveal(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SessionIn>,
) -> ApiResult<RevealOut> {
  Ok(Json(reveal_solution(&state, &body.user_id, &body.game_id).await?))
}

#[instrument(level = "info", skip(state, body), fields(user_id = %body.user_id, game_id = %body.game_id, character = %body.character_id))]
pub async fn http_post_character(
  State(state): State<Arc<AppState>>,
  Json(body): Json<CharacterIn>,
) -> ApiResult<SessionView> {
  Ok(Json(select_character(&state, &body.user_id, &body.game_id, &body.character_id).await?))
}

#[instrument(level = "info", skip(state, body), fields(user_id = %body.user_id, game_id = %body.game_id))]
pub async fn http_post_close(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SessionIn>,
) -> Json<ClosedOut> {
  Json(ClosedOut { closed: close_session(&state, &body.user_id, &body.game_id).await })
}
