//! Loading engine configuration (runner, timings, lesson awards, optional
//! content bank) from TOML.
//!
//! See `EngineConfig` for the expected schema. Environment variables
//! `CODE_RUNNER_URL` and `CODE_RUNNER_TIMEOUT_MS` override the `[runner]` table,
//! `SESSION_STORE_DIR` overrides `[store] dir`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::domain::{Course, Lesson, LessonKind};
use crate::error::EngineError;
use crate::games::Game;
use crate::progress::AwardPolicy;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct EngineConfig {
  #[serde(default)]
  pub runner: RunnerSettings,
  #[serde(default)]
  pub engine: EngineSettings,
  #[serde(default)]
  pub awards: AwardSettings,
  #[serde(default)]
  pub store: StoreSettings,
  #[serde(default)]
  pub courses: Vec<Course>,
  #[serde(default)]
  pub games: Vec<Game>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
  pub base_url: Option<String>,
  pub timeout_ms: u64,
  pub language: String,
}

impl Default for RunnerSettings {
  fn default() -> Self {
    Self { base_url: None, timeout_ms: 5000, language: "python".into() }
  }
}

impl RunnerSettings {
  pub fn timeout(&self) -> Duration {
    Duration::from_millis(self.timeout_ms)
  }

  pub fn apply_env_overrides(&mut self) {
    if let Ok(url) = std::env::var("CODE_RUNNER_URL") {
      self.base_url = Some(url);
    }
    if let Ok(ms) = std::env::var("CODE_RUNNER_TIMEOUT_MS") {
      match ms.parse::<u64>() {
        Ok(v) => self.timeout_ms = v,
        Err(e) => warn!(target: "codequest", value = %ms, error = %e, "Ignoring invalid CODE_RUNNER_TIMEOUT_MS"),
      }
    }
  }
}

/// Where session records live. No directory means in memory only.
#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct StoreSettings {
  pub dir: Option<String>,
}

impl StoreSettings {
  pub fn apply_env_overrides(&mut self) {
    if let Ok(dir) = std::env::var("SESSION_STORE_DIR") {
      self.dir = Some(dir);
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
  pub incorrect_flash_ms: u64,
}

impl Default for EngineSettings {
  fn default() -> Self {
    Self { incorrect_flash_ms: 1500 }
  }
}

impl EngineSettings {
  pub fn incorrect_flash(&self) -> Duration {
    Duration::from_millis(self.incorrect_flash_ms)
  }
}

/// XP handed out when a lesson is completed for the first time, plus the
/// multiplier applied to a game's final score when it is converted to XP.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AwardSettings {
  pub content: u64,
  pub coding: u64,
  pub quiz: u64,
  pub game_completion_multiplier: u64,
}

impl Default for AwardSettings {
  fn default() -> Self {
    Self { content: 10, coding: 20, quiz: 15, game_completion_multiplier: 1 }
  }
}

impl AwardSettings {
  pub fn lesson_xp(&self, kind: LessonKind) -> u64 {
    match kind {
      LessonKind::Content => self.content,
      LessonKind::Coding => self.coding,
      LessonKind::Quiz => self.quiz,
    }
  }

  pub fn game_xp(&self, final_score: u32) -> u64 {
    u64::from(final_score).saturating_mul(self.game_completion_multiplier)
  }
}

#[async_trait]
impl AwardPolicy for AwardSettings {
  async fn award_lesson(&self, _user_id: &str, lesson: &Lesson) -> Result<u64, EngineError> {
    Ok(self.lesson_xp(lesson.kind))
  }
}

pub fn parse_config(s: &str) -> Result<EngineConfig, toml::de::Error> {
  toml::from_str::<EngineConfig>(s)
}

/// Attempt to load `EngineConfig` from ENGINE_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_config_from_env() -> Option<EngineConfig> {
  let path = std::env::var("ENGINE_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_config(&s) {
      Ok(cfg) => {
        info!(target: "codequest", %path, courses = cfg.courses.len(), games = cfg.games.len(), "Loaded engine config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "codequest", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "codequest", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
