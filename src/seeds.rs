//! Built-in content so the playground is usable without a TOML config.

use crate::domain::{Chapter, Level};

/// Two small chapters of Python snippets.
pub fn seed_chapters() -> Vec<Chapter> {
  vec![
    Chapter {
      id: "ch-basics".into(),
      title: "First Contact".into(),
      order: 1,
      levels: vec![
        Level {
          id: "lvl-hello".into(),
          title: "Say hi".into(),
          objective: "Print the greeting \"hi\" to the console.".into(),
          starter_code: "# print something\n".into(),
          canonical_solution: "print(\"hi\")".into(),
          reward_xp: 50,
          order: 1,
          intro_text: "Every mission starts with a signal. Send one.".into(),
          correct_feedback: Some("Signal received loud and clear.".into()),
          incorrect_feedback: Some("Check the order: function name, then the argument in parentheses.".into()),
          language: "python".into(),
        },
        Level {
          id: "lvl-assign".into(),
          title: "Store the fuel".into(),
          objective: "Assign the number 42 to a variable named fuel.".into(),
          starter_code: "fuel = ?\n".into(),
          canonical_solution: "fuel = 42".into(),
          reward_xp: 60,
          order: 2,
          intro_text: "Engines need fuel. Keep it in a variable.".into(),
          correct_feedback: None,
          incorrect_feedback: None,
          language: "python".into(),
        },
      ],
    },
    Chapter {
      id: "ch-logic".into(),
      title: "Decisions".into(),
      order: 2,
      levels: vec![
        Level {
          id: "lvl-compare".into(),
          title: "Enough fuel?".into(),
          objective: "Check whether fuel is greater than 10 and store it in ready.".into(),
          starter_code: "ready = \n".into(),
          canonical_solution: "ready = fuel > 10".into(),
          reward_xp: 80,
          order: 1,
          intro_text: "Before launch, verify the tank.".into(),
          correct_feedback: None,
          incorrect_feedback: None,
          language: "python".into(),
        },
        Level {
          id: "lvl-call".into(),
          title: "Launch".into(),
          objective: "Call launch with the string 'now' and the number 3.".into(),
          starter_code: String::new(),
          canonical_solution: "launch('now', 3)".into(),
          reward_xp: 100,
          order: 2,
          intro_text: "Everything checks out. Launch.".into(),
          correct_feedback: Some("Liftoff!".into()),
          incorrect_feedback: None,
          language: "python".into(),
        },
      ],
    },
  ]
}

/// Compact level constructor for tests.
#[cfg(test)]
pub fn level(id: &str, order: u32, solution: &str) -> Level {
  Level {
    id: id.into(),
    title: format!("Level {id}"),
    objective: format!("Write {solution}"),
    starter_code: String::new(),
    canonical_solution: solution.into(),
    reward_xp: 100,
    order,
    intro_text: String::new(),
    correct_feedback: None,
    incorrect_feedback: None,
    language: "python".into(),
  }
}
