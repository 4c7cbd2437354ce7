//! Exploration: one stage per expedition, built from its first challenge only.
//! Expeditions without challenges are skipped.

use serde::{Deserialize, Serialize};

use crate::domain::ChallengeStage;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expedition {
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub challenges: Vec<ExplorationChallenge>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorationChallenge {
  #[serde(default)]
  pub question: String,
  #[serde(default)]
  pub starter_code: String,
  #[serde(default)]
  pub expected_output: Option<String>,
  #[serde(default)]
  pub hints: Vec<String>,
}

pub fn to_stages(expeditions: &[Expedition]) -> Vec<ChallengeStage> {
  expeditions
    .iter()
    .enumerate()
    .filter_map(|(ei, e)| {
      let c = e.challenges.first()?;
      Some(ChallengeStage {
        index: 0,
        title: e.name.clone(),
        description: super::join_text(&[&e.description, &c.question]),
        starter_code: c.starter_code.clone(),
        expected_output: c.expected_output.clone(),
        hints: c.hints.clone(),
        group: ei,
        solution: None,
      })
    })
    .collect()
}
