//! Domain models: the course aggregate (course → topic → lesson), the normalized
//! challenge stage, and the persisted session record.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Game-specific extras kept next to the generic stage progress
/// (e.g. "bugsFound", "factoryHealth", "selectedCharacterId").
pub type AuxData = BTreeMap<String, serde_json::Value>;

/// What the learner does in a lesson.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum LessonKind {
  #[default]
  Content,
  Coding,
  Quiz,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Lesson {
  pub id: String,
  pub title: String,
  #[serde(default)]
  pub kind: LessonKind,
  /// Locally derived completion. Authoritative whenever it is present.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub completed: Option<bool>,
  /// Server-origin completion flag, only consulted when `completed` is absent.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub is_completed: Option<bool>,
  // Coding lessons only: the exercise checked by the code runner.
  #[serde(default)]
  pub instructions: String,
  #[serde(default)]
  pub starter_code: String,
  #[serde(default)]
  pub expected_output: Option<String>,
  #[serde(default)]
  pub hints: Vec<String>,
}

impl Lesson {
  pub fn new(id: impl Into<String>, title: impl Into<String>, kind: LessonKind) -> Self {
    Self {
      id: id.into(),
      title: title.into(),
      kind,
      completed: None,
      is_completed: None,
      instructions: String::new(),
      starter_code: String::new(),
      expected_output: None,
      hints: Vec::new(),
    }
  }

  pub fn with_code(mut self, starter_code: &str, expected_output: Option<&str>, hints: &[&str]) -> Self {
    self.starter_code = starter_code.to_string();
    self.expected_output = expected_output.map(str::to_string);
    self.hints = hints.iter().map(|h| h.to_string()).collect();
    self
  }

  /// The single stage a coding lesson is played as. None for other kinds.
  pub fn to_stage(&self) -> Option<ChallengeStage> {
    if self.kind != LessonKind::Coding {
      return None;
    }
    Some(ChallengeStage {
      index: 0,
      title: self.title.clone(),
      description: self.instructions.clone(),
      starter_code: self.starter_code.clone(),
      expected_output: self.expected_output.clone(),
      hints: self.hints.clone(),
      group: 0,
      solution: None,
    })
  }

  pub fn is_done(&self) -> bool {
    self.completed.or(self.is_completed).unwrap_or(false)
  }

  pub fn mark_done(&mut self) {
    self.completed = Some(true);
  }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Topic {
  pub id: String,
  pub title: String,
  #[serde(default)]
  pub lessons: Vec<Lesson>,
}

impl Topic {
  /// A topic with no lessons counts as fully completed.
  pub fn is_fully_completed(&self) -> bool {
    self.lessons.iter().all(Lesson::is_done)
  }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Course {
  pub id: String,
  pub title: String,
  #[serde(default)]
  pub topics: Vec<Topic>,
}

impl Course {
  pub fn is_fully_completed(&self) -> bool {
    self.topics.iter().all(Topic::is_fully_completed)
  }
}

/// Address of a lesson inside the course list.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LessonRef {
  pub course_id: String,
  pub topic_id: String,
  pub lesson_id: String,
}

/// Anything `is_locked` can be asked about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntityRef {
  Course { course_id: String },
  Topic { course_id: String, topic_id: String },
  Lesson(LessonRef),
}

/// One normalized unit of a game's challenge sequence.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeStage {
  pub index: usize,
  pub title: String,
  pub description: String,
  pub starter_code: String,
  /// None means any successful run counts.
  #[serde(default)]
  pub expected_output: Option<String>,
  #[serde(default)]
  pub hints: Vec<String>,
  /// Position of the stage's source group (level / factory level) in the native content.
  #[serde(default)]
  pub group: usize,
  /// Known-good code, only carried by debugging missions.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub solution: Option<String>,
}

/// What the persistence gateway stores per (user, game).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
  pub started: bool,
  pub completed: bool,
  /// Signed so corrupt negative values survive deserialization and get clamped.
  pub current_stage_index: i64,
  pub score: u32,
  pub last_played_at: DateTime<Utc>,
  #[serde(default)]
  pub auxiliary_data: AuxData,
}
