//! Built-in content that keeps the server useful without a content bank:
//! two short Python courses and one demo game per game kind.

use crate::domain::{Course, Lesson, LessonKind, Topic};
use crate::games::{
  Character, Expedition, ExplorationChallenge, FactoryLevel, FactoryTask, Game, GameData, GameKind, Mission,
  QuestChallenge, QuestLevel, Scene,
};

fn lesson(id: &str, title: &str, kind: LessonKind) -> Lesson {
  Lesson::new(id, title, kind)
}

fn coding(id: &str, title: &str, instructions: &str, starter: &str, expected: &str, hints: &[&str]) -> Lesson {
  let mut l = Lesson::new(id, title, LessonKind::Coding).with_code(starter, Some(expected), hints);
  l.instructions = instructions.to_string();
  l
}

pub fn seed_courses() -> Vec<Course> {
  vec![
    Course {
      id: "python-basics".into(),
      title: "Python Basics".into(),
      topics: vec![
        Topic {
          id: "printing".into(),
          title: "Talking to the computer".into(),
          lessons: vec![
            lesson("what-is-code", "What is code?", LessonKind::Content),
            coding(
              "first-print",
              "Your first print()",
              "Make the computer say Hello.",
              "print(\"\")\n",
              "Hello",
              &["Put the word between the quotes."],
            ),
            lesson("print-quiz", "Print quiz", LessonKind::Quiz),
          ],
        },
        Topic {
          id: "variables".into(),
          title: "Boxes with names".into(),
          lessons: vec![
            lesson("variables-intro", "Variables", LessonKind::Content),
            coding(
              "variables-practice",
              "Store your name",
              "Put \"Ada\" in a box called name, then print it.",
              "name = \"\"\nprint(name)\n",
              "Ada",
              &["Text goes inside quotes."],
            ),
          ],
        },
      ],
    },
    Course {
      id: "python-loops".into(),
      title: "Loops and Repeats".into(),
      topics: vec![Topic {
        id: "for-loops".into(),
        title: "Counting with for".into(),
        lessons: vec![
          lesson("for-intro", "Repeating things", LessonKind::Content),
          coding(
            "for-practice",
            "Count to five",
            "Print the numbers 1 to 5, one per line.",
            "for i in range(1, 6):\n    pass\n",
            "1\n2\n3\n4\n5",
            &["range(1, 6) stops before 6.", "Swap pass for print(i)."],
          ),
        ],
      }],
    },
  ]
}

fn hints(items: &[&str]) -> Vec<String> {
  items.iter().map(|s| s.to_string()).collect()
}

pub fn seed_games() -> Vec<Game> {
  vec![
    Game {
      id: "dragon-cave".into(),
      title: "The Dragon's Cave".into(),
      kind: GameKind::Adventure,
      description: "Sneak past a sleepy dragon using Python.".into(),
      game_data: GameData {
        scenes: vec![
          Scene {
            title: "The entrance".into(),
            story: "A huge stone door blocks the way.".into(),
            task: "Say the magic word: print Open".into(),
            starter_code: "print(\"\")\n".into(),
            expected_output: Some("Open".into()),
            hints: hints(&["Put the word between the quotes."]),
          },
          Scene {
            title: "The sleeping dragon".into(),
            story: "The dragon snores. Count its snores.".into(),
            task: "Print the numbers 1 to 3, one per line.".into(),
            starter_code: "for i in range(1, 4):\n    pass\n".into(),
            expected_output: Some("1\n2\n3".into()),
            hints: hints(&["Replace pass with print(i)."]),
          },
        ],
        ..Default::default()
      },
    },
    Game {
      id: "code-quest".into(),
      title: "Code Quest".into(),
      kind: GameKind::Quest,
      description: "Pick a hero and clear the levels.".into(),
      game_data: GameData {
        characters: vec![
          Character { id: "wizard".into(), name: "Wizard".into(), description: "Loves loops.".into() },
          Character { id: "knight".into(), name: "Knight".into(), description: "Loves ifs.".into() },
        ],
        levels: vec![
          QuestLevel {
            title: "Village".into(),
            challenges: vec![QuestChallenge {
              title: "Greet the villager".into(),
              description: "Print Hello".into(),
              starter_code: "print()\n".into(),
              expected_output: Some("Hello".into()),
              hints: hints(&["Text needs quotes."]),
            }],
          },
          QuestLevel {
            title: "Forest".into(),
            challenges: vec![QuestChallenge {
              title: "Count the trees".into(),
              description: "Print 2 + 3".into(),
              starter_code: "print()\n".into(),
              expected_output: Some("5".into()),
              hints: vec![],
            }],
          },
        ],
        ..Default::default()
      },
    },
    Game {
      id: "robot-factory".into(),
      title: "Robot Factory".into(),
      kind: GameKind::Factory,
      description: "Fix the assembly line one task at a time.".into(),
      game_data: GameData {
        factory_levels: vec![FactoryLevel {
          name: "Assembly line".into(),
          tasks: vec![
            FactoryTask {
              title: "Power on".into(),
              instruction: "Print ON".into(),
              starter_code: "print(\"OFF\")\n".into(),
              expected_output: Some("ON".into()),
              hints: hints(&["Change OFF to ON."]),
            },
            FactoryTask {
              title: "Build robots".into(),
              instruction: "Print robot three times, one per line.".into(),
              starter_code: "for _ in range(3):\n    pass\n".into(),
              expected_output: Some("robot\nrobot\nrobot".into()),
              hints: vec![],
            },
          ],
        }],
        ..Default::default()
      },
    },
    Game {
      id: "bug-hunt".into(),
      title: "Bug Hunt".into(),
      kind: GameKind::Debugging,
      description: "Each program has one bug. Find it.".into(),
      game_data: GameData {
        missions: vec![
          Mission {
            title: "Missing quote".into(),
            briefing: "This greeting crashes.".into(),
            buggy_code: "print(\"Hi)\n".into(),
            fixed_code: "print(\"Hi\")\n".into(),
            expected_output: Some("Hi".into()),
            hints: hints(&["Strings open and close with the same quote."]),
          },
          Mission {
            title: "Wrong sum".into(),
            briefing: "It should print 10.".into(),
            buggy_code: "print(5 - 5)\n".into(),
            fixed_code: "print(5 + 5)\n".into(),
            expected_output: Some("10".into()),
            hints: vec![],
          },
        ],
        ..Default::default()
      },
    },
    Game {
      id: "island-explorer".into(),
      title: "Island Explorer".into(),
      kind: GameKind::Exploration,
      description: "Map a mysterious island.".into(),
      game_data: GameData {
        expeditions: vec![
          Expedition {
            name: "Beach".into(),
            description: "Shells everywhere.".into(),
            challenges: vec![ExplorationChallenge {
              question: "Print how many shells: 4 * 3".into(),
              starter_code: "print()\n".into(),
              expected_output: Some("12".into()),
              hints: vec![],
            }],
          },
          Expedition {
            name: "Volcano".into(),
            description: "It rumbles.".into(),
            challenges: vec![ExplorationChallenge {
              question: "Print anything to take a photo.".into(),
              starter_code: "print(\"click\")\n".into(),
              expected_output: None,
              hints: vec![],
            }],
          },
        ],
        ..Default::default()
      },
    },
  ]
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_every_seed_game_has_stages() {
    let games = seed_games();
    assert_eq!(games.len(), 5);
    for g in &games {
      assert!(!g.to_stages().is_empty(), "{}", g.id);
    }
  }

  #[test]
  fn test_every_coding_lesson_is_checkable() {
    let lessons = seed_courses().into_iter().flat_map(|c| c.topics).flat_map(|t| t.lessons);
    for l in lessons.filter(|l| l.kind == LessonKind::Coding) {
      let stage = l.to_stage().unwrap();
      assert!(stage.expected_output.is_some(), "{}", l.id);
      assert!(!stage.starter_code.is_empty(), "{}", l.id);
    }
  }
}
