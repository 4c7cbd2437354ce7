//! Experience → level math and the user snapshot it is applied to.
//!
//! Levels are never stored: they are derived from cumulative experience
//! every time they are shown.

use serde::{Deserialize, Serialize};

pub const XP_PER_LEVEL: u64 = 100;

pub fn level_of(xp: u64) -> u64 {
  xp / XP_PER_LEVEL + 1
}

pub fn xp_into_level(xp: u64) -> u64 {
  xp % XP_PER_LEVEL
}

/// Someone who just leveled up still needs a full level, never zero.
pub fn xp_to_next_level(xp: u64) -> u64 {
  XP_PER_LEVEL - xp_into_level(xp)
}

/// Explicit copy of the learner's stats passed into calculations.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSnapshot {
  pub experience: u64,
  /// Consecutive active days, tracked outside the engine.
  pub streak: u32,
  pub coins: u64,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LevelChange {
  pub before: u64,
  pub after: u64,
  pub leveled_up: bool,
}

impl UserSnapshot {
  pub fn level(&self) -> u64 {
    level_of(self.experience)
  }

  pub fn xp_into_level(&self) -> u64 {
    xp_into_level(self.experience)
  }

  pub fn xp_to_next_level(&self) -> u64 {
    xp_to_next_level(self.experience)
  }

  /// Experience only grows here; a reset is a separate, explicit act.
  pub fn award(self, xp: u64) -> (UserSnapshot, LevelChange) {
    let before = self.level();
    let next = UserSnapshot { experience: self.experience.saturating_add(xp), ..self };
    let after = next.level();
    (next, LevelChange { before, after, leveled_up: after > before })
  }
}
