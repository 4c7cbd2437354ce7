//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic. We reply with a single JSON message per request.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{debug, error, info, instrument};

use crate::domain::LessonRef;
use crate::error::EngineError;
use crate::logic::*;
use crate::protocol::{error_out, ClientWsMessage, ErrorOut, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "codequest", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "codequest", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "codequest", "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &state).await
          }
          Err(e) => ServerWsMessage::Error(ErrorOut { code: "bad_request".into(), message: format!("Invalid JSON: {}", e) }),
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "code": "internal", "message": format!("Serialization error: {}", e) }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "codequest", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "codequest", "WebSocket disconnected");
}

fn reply<T>(res: Result<T, EngineError>, wrap: impl FnOnce(T) -> ServerWsMessage) -> ServerWsMessage {
  match res {
    Ok(v) => wrap(v),
    Err(e) => {
      debug!(target: "codequest", code = e.code(), error = %e, "WS request rejected");
      ServerWsMessage::Error(error_out(&e))
    }
  }
}

#[instrument(level = "info", skip(state))]
pub async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::Courses { user_id } =>
      ServerWsMessage::Courses { courses: courses_outline(state, &user_id).await },

    ClientWsMessage::CompleteLesson { user_id, course_id, topic_id, lesson_id } => {
      let lesson = LessonRef { course_id, topic_id, lesson_id };
      reply(complete_lesson(state, &user_id, &lesson).await, ServerWsMessage::LessonCompleted)
    }

    ClientWsMessage::StartLesson { user_id, course_id, topic_id, lesson_id } => {
      let lesson = LessonRef { course_id, topic_id, lesson_id };
      reply(start_lesson(state, &user_id, &lesson).await, |session| ServerWsMessage::Session { session })
    }

    ClientWsMessage::SubmitLesson { user_id, course_id, topic_id, lesson_id, code } => {
      let lesson = LessonRef { course_id, topic_id, lesson_id };
      reply(submit_lesson_code(state, &user_id, &lesson, &code).await, ServerWsMessage::LessonResult)
    }

    ClientWsMessage::LessonHint { user_id, course_id, topic_id, lesson_id } => {
      let lesson = LessonRef { course_id, topic_id, lesson_id };
      reply(toggle_lesson_hint(state, &user_id, &lesson).await, ServerWsMessage::Hint)
    }

    ClientWsMessage::User { user_id } => ServerWsMessage::User(get_user(state, &user_id).await),

    ClientWsMessage::Games => ServerWsMessage::Games { games: list_games(state) },

    ClientWsMessage::StartSession { user_id, game_id } =>
      reply(start_session(state, &user_id, &game_id).await, |session| ServerWsMessage::Session { session }),

    ClientWsMessage::Submit { user_id, game_id, code } => {
      let res = submit_code(state, &user_id, &game_id, &code).await;
      if let Ok(r) = &res {
        info!(target: "engine", %game_id, score = r.session.score, stage = r.session.current_stage_index, "WS submission evaluated");
      }
      reply(res, ServerWsMessage::SubmitResult)
    }

    ClientWsMessage::Hint { user_id, game_id } =>
      reply(toggle_hint(state, &user_id, &game_id).await, ServerWsMessage::Hint),

    ClientWsMessage::Previous { user_id, game_id } =>
      reply(previous_stage(state, &user_id, &game_id).await, |session| ServerWsMessage::Session { session }),

    ClientWsMessage::Reset { user_id, game_id } =>
      reply(reset_session(state, &user_id, &game_id).await, |session| ServerWsMessage::Session { session }),

    ClientWsMessage::Reveal { user_id, game_id } =>
      reply(reveal_solution(state, &user_id, &game_id).await, ServerWsMessage::Reveal),

    ClientWsMessage::SelectCharacter { user_id, game_id, character_id } =>
      reply(select_character(state, &user_id, &game_id, &character_id).await, |session| ServerWsMessage::Session { session }),

    ClientWsMessage::CloseSession { user_id, game_id } =>
      ServerWsMessage::Closed { closed: close_session(state, &user_id, &game_id).await },
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::EngineConfig;
  use crate::store::MemoryGateway;
  use serde_json::{json, Value};

  fn state() -> AppState {
    AppState::from_config(EngineConfig::default(), None, Arc::new(MemoryGateway::new()))
  }

  async fn send(state: &AppState, raw: Value) -> Value {
    let msg: ClientWsMessage = serde_json::from_value(raw).unwrap();
    serde_json::to_value(handle_client_ws(msg, state).await).unwrap()
  }

  #[tokio::test]
  async fn test_ws_session_round() {
    let s = state();
    let out = send(&s, json!({ "type": "start_session", "userId": "kid", "gameId": "code-quest" })).await;
    assert_eq!(out["type"], json!("session"));
    assert_eq!(out["session"]["kind"], json!("quest"));

    let out = send(&s, json!({ "type": "submit", "userId": "kid", "gameId": "code-quest", "code": "print(1)" })).await;
    assert_eq!(out["type"], json!("error"));
    assert_eq!(out["code"], json!("locked"));

    let out = send(&s, json!({ "type": "select_character", "userId": "kid", "gameId": "code-quest", "characterId": "knight" })).await;
    assert_eq!(out["session"]["auxiliaryData"]["selectedCharacterId"], json!("knight"));

    let out = send(&s, json!({ "type": "close_session", "userId": "kid", "gameId": "code-quest" })).await;
    assert_eq!(out, json!({ "type": "closed", "closed": true }));
  }

  #[tokio::test]
  async fn test_ws_lesson_and_user() {
    let s = state();
    let out = send(&s, json!({ "type": "complete_lesson", "userId": "kid", "courseId": "python-basics", "topicId": "printing", "lessonId": "what-is-code" })).await;
    assert_eq!(out["type"], json!("lesson_completed"));
    assert_eq!(out["award"]["xpAwarded"], json!(10));

    let out = send(&s, json!({ "type": "complete_lesson", "userId": "kid", "courseId": "python-basics", "topicId": "printing", "lessonId": "first-print" })).await;
    assert_eq!(out["code"], json!("submission_required"));

    let out = send(&s, json!({ "type": "lesson_hint", "userId": "kid", "courseId": "python-basics", "topicId": "printing", "lessonId": "first-print" })).await;
    assert_eq!(out["type"], json!("hint"));
    assert_eq!(out["visible"], json!(true));

    let out = send(&s, json!({ "type": "user", "userId": "kid" })).await;
    assert_eq!(out["experience"], json!(10));
    assert_eq!(send(&s, json!({ "type": "ping" })).await, json!({ "type": "pong" }));
  }
}
