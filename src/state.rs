//! Application state: content bank, per-user progress and stats, live game
//! sessions, the persistence gateway and the optional code runner.
//!
//! This module owns:
//!   - the course template and game catalogue (TOML bank or built-in seeds)
//!   - one `ProgressModel` per user, cloned from the course template on first use
//!   - user snapshots (experience, streak, coins)
//!   - live sessions keyed by (user, game)
//!
//! If no code runner is configured, submissions report "runner unavailable".
//! If no store directory is configured, session records are kept in memory.

use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, instrument};

use crate::config::{load_config_from_env, AwardSettings, EngineConfig};
use crate::domain::{Course, Lesson, LessonRef};
use crate::error::EngineError;
use crate::games::Game;
use crate::progress::ProgressModel;
use crate::runner::{CodeRunner, HttpCodeRunner};
use crate::seeds::{seed_courses, seed_games};
use crate::session::LiveSession;
use crate::store::{FileGateway, MemoryGateway, PersistenceGateway};
use crate::util::{lesson_session_id, session_key};
use crate::xp::{LevelChange, UserSnapshot};

pub type SharedSession = Arc<Mutex<LiveSession>>;

#[derive(Clone)]
pub struct AppState {
    pub courses: Arc<Vec<Course>>,
    pub games: Arc<Vec<Game>>,
    pub progress: Arc<RwLock<HashMap<String, ProgressModel>>>,
    pub users: Arc<RwLock<HashMap<String, UserSnapshot>>>,
    pub sessions: Arc<RwLock<HashMap<String, SharedSession>>>,
    pub gateway: Arc<dyn PersistenceGateway>,
    pub runner: Option<Arc<dyn CodeRunner>>,
    pub awards: AwardSettings,
    pub runner_timeout: Duration,
    pub incorrect_flash: Duration,
}

impl AppState {
    /// Build state from env: load config, merge seeds, init the code runner.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let mut cfg = load_config_from_env().unwrap_or_default();
        cfg.runner.apply_env_overrides();
        cfg.store.apply_env_overrides();

        let runner: Option<Arc<dyn CodeRunner>> = match HttpCodeRunner::from_settings(&cfg.runner) {
            Some(r) => {
                info!(target: "codequest", base_url = %r.base_url, language = %r.language, timeout_ms = cfg.runner.timeout_ms, "Code runner enabled.");
                Some(Arc::new(r))
            }
            None => {
                info!(target: "codequest", "Code runner disabled (no CODE_RUNNER_URL). Submissions will report runner unavailable.");
                None
            }
        };

        let gateway: Arc<dyn PersistenceGateway> = match &cfg.store.dir {
            Some(dir) => {
                info!(target: "codequest", %dir, "Session records stored on disk.");
                Arc::new(FileGateway::new(dir))
            }
            None => {
                info!(target: "codequest", "Session records kept in memory (no SESSION_STORE_DIR).");
                Arc::new(MemoryGateway::new())
            }
        };

        Self::from_config(cfg, runner, gateway)
    }

    pub fn from_config(
        cfg: EngineConfig,
        runner: Option<Arc<dyn CodeRunner>>,
        gateway: Arc<dyn PersistenceGateway>,
    ) -> Self {
        // Course order drives locking, so a configured bank replaces the seeds outright.
        let courses = if cfg.courses.is_empty() { seed_courses() } else { cfg.courses.clone() };

        // Configured games first; built-in seeds fill in without overwriting ids.
        let mut games = cfg.games.clone();
        for g in seed_games() {
            if !games.iter().any(|existing| existing.id == g.id) {
                games.push(g);
            }
        }
        info!(target: "codequest", courses = courses.len(), games = games.len(), "Content bank ready");

        Self {
            courses: Arc::new(courses),
            games: Arc::new(games),
            progress: Arc::new(RwLock::new(HashMap::new())),
            users: Arc::new(RwLock::new(HashMap::new())),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            gateway,
            runner,
            awards: cfg.awards.clone(),
            runner_timeout: cfg.runner.timeout(),
            incorrect_flash: cfg.engine.incorrect_flash(),
        }
    }

    pub fn game(&self, id: &str) -> Result<&Game, EngineError> {
        self.games
            .iter()
            .find(|g| g.id == id)
            .ok_or_else(|| EngineError::not_found("game", id))
    }

    /// Returns the live session for (user, game), opening it on first use.
    #[instrument(level = "debug", skip(self))]
    pub async fn live_session(&self, user_id: &str, game_id: &str) -> Result<SharedSession, EngineError> {
        let key = session_key(user_id, game_id);
        if let Some(s) = { self.sessions.read().await.get(&key).cloned() } {
            return Ok(s);
        }

        let game = self.game(game_id)?;
        let mut sessions = self.sessions.write().await;
        if let Some(s) = sessions.get(&key) {
            return Ok(s.clone());
        }
        let session = LiveSession::open(key.clone(), game, self.gateway.clone(), self.incorrect_flash).await?;
        let shared = Arc::new(Mutex::new(session));
        sessions.insert(key, shared.clone());
        Ok(shared)
    }

    /// Live session of a coding lesson. The caller has already checked that
    /// `lesson` is the one `r` points at.
    #[instrument(level = "debug", skip(self, lesson))]
    pub async fn lesson_session(&self, user_id: &str, r: &LessonRef, lesson: &Lesson) -> Result<SharedSession, EngineError> {
        let key = session_key(user_id, &lesson_session_id(&r.course_id, &r.topic_id, &r.lesson_id));
        let mut sessions = self.sessions.write().await;
        if let Some(s) = sessions.get(&key) {
            return Ok(s.clone());
        }
        let session = LiveSession::open_lesson(key.clone(), lesson, self.gateway.clone(), self.incorrect_flash).await?;
        let shared = Arc::new(Mutex::new(session));
        sessions.insert(key, shared.clone());
        Ok(shared)
    }

    /// Drops the live session; a verdict still in flight will not be applied.
    #[instrument(level = "debug", skip(self))]
    pub async fn close_session(&self, user_id: &str, game_id: &str) -> bool {
        let removed = { self.sessions.write().await.remove(&session_key(user_id, game_id)) };
        match removed {
            Some(s) => {
                let mut s = s.lock().await;
                s.discard();
                s.flush().await;
                true
            }
            None => false,
        }
    }

    pub async fn user(&self, user_id: &str) -> UserSnapshot {
        self.users.read().await.get(user_id).copied().unwrap_or_default()
    }

    pub async fn award_xp(&self, user_id: &str, xp: u64) -> (UserSnapshot, LevelChange) {
        let mut users = self.users.write().await;
        let current = users.get(user_id).copied().unwrap_or_default();
        let (next, change) = current.award(xp);
        users.insert(user_id.to_string(), next);
        if change.leveled_up {
            info!(target: "progress", %user_id, level = change.after, "Level up");
        }
        (next, change)
    }
}
