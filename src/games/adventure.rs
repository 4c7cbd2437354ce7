//! Adventure: one stage per story scene.

use serde::{Deserialize, Serialize};

use crate::domain::ChallengeStage;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
  #[serde(default)]
  pub title: String,
  /// Narrative shown above the task.
  #[serde(default)]
  pub story: String,
  #[serde(default)]
  pub task: String,
  #[serde(default)]
  pub starter_code: String,
  #[serde(default)]
  pub expected_output: Option<String>,
  #[serde(default)]
  pub hints: Vec<String>,
}

pub fn to_stages(scenes: &[Scene]) -> Vec<ChallengeStage> {
  scenes
    .iter()
    .enumerate()
    .map(|(i, scene)| ChallengeStage {
      index: i,
      title: scene.title.clone(),
      description: super::join_text(&[&scene.story, &scene.task]),
      starter_code: scene.starter_code.clone(),
      expected_output: scene.expected_output.clone(),
      hints: scene.hints.clone(),
      group: i,
      solution: None,
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_scene_becomes_stage() {
    let scenes = vec![Scene {
      title: "The Cave".into(),
      story: "A dragon sleeps.".into(),
      task: "Print its name.".into(),
      starter_code: "name = 'Ember'\n".into(),
      expected_output: Some("Ember".into()),
      hints: vec!["Use print()".into()],
    }];
    let stages = to_stages(&scenes);
    assert_eq!(stages.len(), 1);
    assert_eq!(stages[0].description, "A dragon sleeps.\n\nPrint its name.");
    assert_eq!(stages[0].expected_output.as_deref(), Some("Ember"));
    assert_eq!(stages[0].hints, vec!["Use print()".to_string()]);
  }
}
