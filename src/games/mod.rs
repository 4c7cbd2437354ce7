//! Game catalogue shapes and the adapters that normalize each game's native
//! content into the stage list consumed by the stage machine.
//!
//! `GameKind` selects the adapter. Every adapter tolerates missing or empty
//! content arrays and yields an empty stage list for them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{AuxData, ChallengeStage};

pub mod adventure;
pub mod debugging;
pub mod exploration;
pub mod factory;
pub mod quest;

pub use adventure::Scene;
pub use debugging::Mission;
pub use exploration::{Expedition, ExplorationChallenge};
pub use factory::{FactoryLevel, FactoryTask};
pub use quest::{Character, QuestChallenge, QuestLevel};

pub const AUX_SELECTED_CHARACTER: &str = "selectedCharacterId";
pub const AUX_FACTORY_HEALTH: &str = "factoryHealth";
pub const AUX_BUGS_FOUND: &str = "bugsFound";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GameKind {
  Adventure,
  Quest,
  Factory,
  Debugging,
  Exploration,
}

impl GameKind {
  /// Points granted per solved stage. Fixed policy, not derived from difficulty.
  pub fn stage_award(self) -> u32 {
    match self {
      GameKind::Adventure => 10,
      GameKind::Quest => 10,
      GameKind::Factory => 15,
      GameKind::Debugging => 20,
      GameKind::Exploration => 20,
    }
  }

  /// Story-driven games let the learner step back a stage.
  pub fn allows_previous(self) -> bool {
    matches!(self, GameKind::Adventure | GameKind::Quest | GameKind::Exploration)
  }

  pub fn allows_reveal(self) -> bool {
    matches!(self, GameKind::Debugging)
  }

  pub fn requires_character(self) -> bool {
    matches!(self, GameKind::Quest)
  }
}

impl fmt::Display for GameKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      GameKind::Adventure => "adventure",
      GameKind::Quest => "quest",
      GameKind::Factory => "factory",
      GameKind::Debugging => "debugging",
      GameKind::Exploration => "exploration",
    };
    f.write_str(s)
  }
}

/// What a stage machine is driving: a catalogue game, or one coding lesson.
///
/// Coding lessons score nothing inside the machine; their XP comes from the
/// lesson award policy once the stage is solved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChallengeKind {
  Game(GameKind),
  CodingLesson,
}

impl From<GameKind> for ChallengeKind {
  fn from(kind: GameKind) -> Self {
    ChallengeKind::Game(kind)
  }
}

impl ChallengeKind {
  fn game(self) -> Option<GameKind> {
    match self {
      ChallengeKind::Game(k) => Some(k),
      ChallengeKind::CodingLesson => None,
    }
  }

  pub fn stage_award(self) -> u32 {
    self.game().map_or(0, GameKind::stage_award)
  }

  pub fn allows_previous(self) -> bool {
    self.game().is_some_and(GameKind::allows_previous)
  }

  pub fn allows_reveal(self) -> bool {
    self.game().is_some_and(GameKind::allows_reveal)
  }

  pub fn requires_character(self) -> bool {
    self.game().is_some_and(GameKind::requires_character)
  }

  pub fn initial_aux(self) -> AuxData {
    self.game().map(initial_aux).unwrap_or_default()
  }

  pub fn aux_on_solved(self, stages: &[ChallengeStage], solved: usize, aux: &AuxData) -> AuxData {
    self.game().map(|k| aux_on_solved(k, stages, solved, aux)).unwrap_or_default()
  }
}

impl fmt::Display for ChallengeKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ChallengeKind::Game(k) => k.fmt(f),
      ChallengeKind::CodingLesson => f.write_str("coding_lesson"),
    }
  }
}

impl Serialize for ChallengeKind {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

/// Native content of a game. Only the arrays relevant to its kind are read.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameData {
  #[serde(default)]
  pub scenes: Vec<Scene>,
  #[serde(default)]
  pub levels: Vec<QuestLevel>,
  #[serde(default)]
  pub characters: Vec<Character>,
  #[serde(default)]
  pub factory_levels: Vec<FactoryLevel>,
  #[serde(default)]
  pub missions: Vec<Mission>,
  #[serde(default)]
  pub expeditions: Vec<Expedition>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
  pub id: String,
  pub title: String,
  pub kind: GameKind,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub game_data: GameData,
}

impl Game {
  pub fn to_stages(&self) -> Vec<ChallengeStage> {
    to_stages(self.kind, &self.game_data)
  }

  /// Ids a quest player may pick from. Empty when the game has no roster.
  pub fn roster(&self) -> Vec<String> {
    match self.kind {
      GameKind::Quest => self.game_data.characters.iter().map(|c| c.id.clone()).collect(),
      _ => Vec::new(),
    }
  }
}

pub fn to_stages(kind: GameKind, data: &GameData) -> Vec<ChallengeStage> {
  let stages = match kind {
    GameKind::Adventure => adventure::to_stages(&data.scenes),
    GameKind::Quest => quest::to_stages(&data.levels),
    GameKind::Factory => factory::to_stages(&data.factory_levels),
    GameKind::Debugging => debugging::to_stages(&data.missions),
    GameKind::Exploration => exploration::to_stages(&data.expeditions),
  };
  number(stages)
}

/// Stage indices are positions in the final list, whatever the adapter skipped.
fn number(mut stages: Vec<ChallengeStage>) -> Vec<ChallengeStage> {
  for (i, s) in stages.iter_mut().enumerate() {
    s.index = i;
  }
  stages
}

/// Auxiliary data a fresh (or reset) session starts with.
pub fn initial_aux(kind: GameKind) -> AuxData {
  let mut aux = AuxData::new();
  match kind {
    GameKind::Factory => {
      aux.insert(AUX_FACTORY_HEALTH.into(), factory::HEALTH_START.into());
    }
    GameKind::Debugging => {
      aux.insert(AUX_BUGS_FOUND.into(), 0u64.into());
    }
    _ => {}
  }
  aux
}

/// Changes to auxiliary data caused by solving `stages[solved]`.
pub fn aux_on_solved(kind: GameKind, stages: &[ChallengeStage], solved: usize, aux: &AuxData) -> AuxData {
  match kind {
    GameKind::Factory => factory::aux_on_solved(stages, solved, aux),
    GameKind::Debugging => debugging::aux_on_solved(aux),
    _ => AuxData::new(),
  }
}

/// Joins non-empty parts with a blank line.
pub(crate) fn join_text(parts: &[&str]) -> String {
  parts
    .iter()
    .map(|p| p.trim())
    .filter(|p| !p.is_empty())
    .collect::<Vec<_>>()
    .join("\n\n")
}
