//! Factory: factory levels of tasks, flattened like quest levels. Moving from
//! one level to the next repairs the factory. The final task has no next level
//! and repairs nothing.

use serde::{Deserialize, Serialize};

use crate::domain::{AuxData, ChallengeStage};

use super::AUX_FACTORY_HEALTH;

pub const HEALTH_START: u64 = 40;
pub const HEALTH_STEP: u64 = 20;
pub const HEALTH_MAX: u64 = 100;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactoryLevel {
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub tasks: Vec<FactoryTask>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactoryTask {
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub instruction: String,
  #[serde(default)]
  pub starter_code: String,
  #[serde(default)]
  pub expected_output: Option<String>,
  #[serde(default)]
  pub hints: Vec<String>,
}

pub fn to_stages(levels: &[FactoryLevel]) -> Vec<ChallengeStage> {
  levels
    .iter()
    .enumerate()
    .flat_map(|(li, level)| {
      level.tasks.iter().map(move |t| ChallengeStage {
        index: 0,
        title: t.title.clone(),
        description: t.instruction.clone(),
        starter_code: t.starter_code.clone(),
        expected_output: t.expected_output.clone(),
        hints: t.hints.clone(),
        group: li,
        solution: None,
      })
    })
    .collect()
}

fn crosses_level_boundary(stages: &[ChallengeStage], solved: usize) -> bool {
  match (stages.get(solved), stages.get(solved + 1)) {
    (Some(cur), Some(next)) => cur.group != next.group,
    _ => false,
  }
}

pub fn aux_on_solved(stages: &[ChallengeStage], solved: usize, aux: &AuxData) -> AuxData {
  let mut delta = AuxData::new();
  if crosses_level_boundary(stages, solved) {
    let current = aux.get(AUX_FACTORY_HEALTH).and_then(|v| v.as_u64()).unwrap_or(HEALTH_START);
    let repaired = (current + HEALTH_STEP).min(HEALTH_MAX);
    delta.insert(AUX_FACTORY_HEALTH.into(), repaired.into());
  }
  delta
}
