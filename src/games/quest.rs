//! Quest: levels of challenges, flattened in level order then challenge order.
//! A character must be picked before the first stage can be played.

use serde::{Deserialize, Serialize};

use crate::domain::ChallengeStage;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
  pub id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub description: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestLevel {
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub challenges: Vec<QuestChallenge>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestChallenge {
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub starter_code: String,
  #[serde(default)]
  pub expected_output: Option<String>,
  #[serde(default)]
  pub hints: Vec<String>,
}

pub fn to_stages(levels: &[QuestLevel]) -> Vec<ChallengeStage> {
  levels
    .iter()
    .enumerate()
    .flat_map(|(li, level)| {
      level.challenges.iter().map(move |c| ChallengeStage {
        index: 0,
        title: c.title.clone(),
        description: c.description.clone(),
        starter_code: c.starter_code.clone(),
        expected_output: c.expected_output.clone(),
        hints: c.hints.clone(),
        group: li,
        solution: None,
      })
    })
    .collect()
}
