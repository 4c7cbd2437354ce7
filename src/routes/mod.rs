//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - JSON API under `/api/v1/...` (courses, lessons, users, games, sessions)
/// - Static frontend from `./static` with index fallback
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // Learning paths
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/courses", get(http::http_get_courses))
        .route("/api/v1/lessons/complete", post(http::http_post_complete_lesson))
        .route("/api/v1/lessons/start", post(http::http_post_start_lesson))
        .route("/api/v1/lessons/submit", post(http::http_post_submit_lesson))
        .route("/api/v1/lessons/hint", post(http::http_post_lesson_hint))
        .route("/api/v1/users/:user_id", get(http::http_get_user))
        // Games
        .route("/api/v1/games", get(http::http_get_games))
        .route("/api/v1/sessions", post(http::http_post_start_session))
        .route("/api/v1/sessions/submit", post(http::http_post_submit))
        .route("/api/v1/sessions/hint", post(http::http_post_hint))
        .route("/api/v1/sessions/previous", post(http::http_post_previous))
        .route("/api/v1/sessions/reset", post(http::http_post_reset))
        .route("/api/v1/sessions/reveal", post(http::http_post_reveal))
        .route("/api/v1/sessions/character", post(http::http_post_character))
        .route("/api/v1/sessions/close", post(http::http_post_close))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::store::MemoryGateway;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        let state = AppState::from_config(EngineConfig::default(), None, Arc::new(MemoryGateway::new()));
        build_router(Arc::new(state))
    }

    async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call(&app(), Request::get("/api/v1/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], json!(true));
    }

    #[tokio::test]
    async fn test_lesson_completion_flow() {
        let app = app();
        let lesson = json!({ "userId": "kid", "courseId": "python-basics", "topicId": "printing", "lessonId": "what-is-code" });
        let (status, body) = call(&app, post("/api/v1/lessons/complete", lesson)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["award"]["xpAwarded"], json!(10));
        assert_eq!(body["user"]["experience"], json!(10));

        let locked = json!({ "userId": "kid", "courseId": "python-loops", "topicId": "for-loops", "lessonId": "for-intro" });
        let (status, body) = call(&app, post("/api/v1/lessons/complete", locked)).await;
        assert_eq!(status, StatusCode::LOCKED);
        assert_eq!(body["code"], json!("locked"));

        let (status, body) = call(&app, Request::get("/api/v1/users/kid").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["level"], json!(1));
        assert_eq!(body["xpToNextLevel"], json!(90));

        let (_, body) = call(&app, Request::get("/api/v1/courses?userId=kid").body(Body::empty()).unwrap()).await;
        assert_eq!(body[0]["topics"][0]["lessons"][0]["completed"], json!(true));
        assert_eq!(body[1]["locked"], json!(true));
    }

    #[tokio::test]
    async fn test_coding_lesson_needs_a_submission() {
        let app = app();
        let intro = json!({ "userId": "kid", "courseId": "python-basics", "topicId": "printing", "lessonId": "what-is-code" });
        call(&app, post("/api/v1/lessons/complete", intro)).await;

        let coding = json!({ "userId": "kid", "courseId": "python-basics", "topicId": "printing", "lessonId": "first-print" });
        let (status, body) = call(&app, post("/api/v1/lessons/complete", coding.clone())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], json!("submission_required"));

        let (status, body) = call(&app, post("/api/v1/lessons/start", coding.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["kind"], json!("coding_lesson"));
        assert_eq!(body["stageCount"], json!(1));

        let mut submit = coding.clone();
        submit["code"] = json!("print(\"Hello\")");
        let (status, body) = call(&app, post("/api/v1/lessons/submit", submit)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"]["result"], json!("runner_unavailable"));
        assert!(body.get("completion").is_none());

        let (_, body) = call(&app, Request::get("/api/v1/users/kid").body(Body::empty()).unwrap()).await;
        assert_eq!(body["experience"], json!(10));
    }

    #[tokio::test]
    async fn test_session_endpoints() {
        let app = app();
        let (_, games) = call(&app, Request::get("/api/v1/games").body(Body::empty()).unwrap()).await;
        assert_eq!(games.as_array().map(|g| g.len()), Some(5));

        let who = json!({ "userId": "kid", "gameId": "dragon-cave" });
        let (status, body) = call(&app, post("/api/v1/sessions", who.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"]["state"], json!("awaiting_submission"));
        assert_eq!(body["stage"]["title"], json!("The entrance"));

        let (_, body) = call(&app, post("/api/v1/sessions/hint", who.clone())).await;
        assert_eq!(body["visible"], json!(true));

        let (status, body) = call(&app, post("/api/v1/sessions/reveal", who.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], json!("unsupported"));

        let submit = json!({ "userId": "kid", "gameId": "dragon-cave", "code": "print(\"Open\")" });
        let (status, body) = call(&app, post("/api/v1/sessions/submit", submit)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"]["result"], json!("runner_unavailable"));

        let (_, body) = call(&app, post("/api/v1/sessions/close", who.clone())).await;
        assert_eq!(body["closed"], json!(true));

        let (status, _) = call(&app, post("/api/v1/sessions", json!({ "userId": "kid", "gameId": "missing" }))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
