//! Debugging: each mission starts from broken code. The fixed code travels with
//! the stage so the learner can peek at it, which never counts as solving.

use serde::{Deserialize, Serialize};

use crate::domain::{AuxData, ChallengeStage};

use super::AUX_BUGS_FOUND;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mission {
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub briefing: String,
  #[serde(default)]
  pub buggy_code: String,
  #[serde(default)]
  pub fixed_code: String,
  #[serde(default)]
  pub expected_output: Option<String>,
  #[serde(default)]
  pub hints: Vec<String>,
}

pub fn to_stages(missions: &[Mission]) -> Vec<ChallengeStage> {
  missions
    .iter()
    .enumerate()
    .map(|(i, m)| ChallengeStage {
      index: i,
      title: m.title.clone(),
      description: m.briefing.clone(),
      starter_code: m.buggy_code.clone(),
      expected_output: m.expected_output.clone(),
      hints: m.hints.clone(),
      group: i,
      solution: Some(m.fixed_code.clone()).filter(|c| !c.trim().is_empty()),
    })
    .collect()
}

pub fn aux_on_solved(aux: &AuxData) -> AuxData {
  let found = aux.get(AUX_BUGS_FOUND).and_then(|v| v.as_u64()).unwrap_or(0);
  let mut delta = AuxData::new();
  delta.insert(AUX_BUGS_FOUND.into(), (found + 1).into());
  delta
}
