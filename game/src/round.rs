use std::fmt;

use serde::{Deserialize, Serialize};

pub const MIN_ENTITIES: usize = 3;
pub const MAX_ENTITIES: usize = 6;

/// Logical wire identity, usually a color label such as `red`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Scene node handle for an entity. Never interpreted here, only handed back
/// to the presentation side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresenceToken(String);

impl PresenceToken {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PresenceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Advisor {
    /// The chat agent.
    Agent,
    /// The physical robot.
    Robot,
}

impl Advisor {
    pub const ALL: [Advisor; 2] = [Advisor::Agent, Advisor::Robot];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestions {
    pub agent: EntityId,
    pub robot: EntityId,
}

impl Suggestions {
    pub fn get(&self, advisor: Advisor) -> &EntityId {
        match advisor {
            Advisor::Agent => &self.agent,
            Advisor::Robot => &self.robot,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundDefinition {
    pub index: usize,
    pub entities: Vec<EntityId>,
    pub correct: EntityId,
    pub suggestions: Suggestions,
}

impl RoundDefinition {
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Loss,
    Timeout,
}

impl Outcome {
    pub fn judge(selected: &EntityId, correct: &EntityId) -> Self {
        if selected == correct {
            Outcome::Win
        } else {
            Outcome::Loss
        }
    }

    pub fn is_win(self) -> bool {
        matches!(self, Outcome::Win)
    }

    pub fn label(self) -> &'static str {
        match self {
            Outcome::Win => "win",
            Outcome::Loss => "loss",
            Outcome::Timeout => "timeout",
        }
    }

    pub fn banner(self) -> &'static str {
        match self {
            Outcome::Win => "BOMB DEFUSED",
            Outcome::Loss | Outcome::Timeout => "EXPLOSION DETECTED",
        }
    }
}

/// `Tutorial N` for the tutorial prefix, `Round N` afterwards (both 1-based).
pub fn round_label(index: usize, tutorial_len: usize) -> String {
    if index < tutorial_len {
        format!("Tutorial {}", index + 1)
    } else {
        format!("Round {}", index - tutorial_len + 1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeRecord {
    pub round_index: usize,
    pub round_label: String,
    pub condition: String,
    pub correct: EntityId,
    pub selected: Option<EntityId>,
    pub outcome: Outcome,
    pub elapsed_seconds: f64,
    pub agent_suggestion: EntityId,
    pub robot_suggestion: EntityId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn judge_compares_identities() {
        let red = EntityId::from("red");
        let blue = EntityId::from("blue");
        assert_eq!(Outcome::judge(&red, &red), Outcome::Win);
        assert_eq!(Outcome::judge(&blue, &red), Outcome::Loss);
    }

    #[test]
    fn labels_split_tutorial_prefix() {
        assert_eq!(round_label(0, 2), "Tutorial 1");
        assert_eq!(round_label(1, 2), "Tutorial 2");
        assert_eq!(round_label(2, 2), "Round 1");
        assert_eq!(round_label(6, 2), "Round 5");
        assert_eq!(round_label(0, 0), "Round 1");
    }

    #[test]
    fn record_serializes_camel_case() {
        let record = OutcomeRecord {
            round_index: 3,
            round_label: "Round 2".into(),
            condition: "a".into(),
            correct: "red".into(),
            selected: None,
            outcome: Outcome::Timeout,
            elapsed_seconds: 40.0,
            agent_suggestion: "red".into(),
            robot_suggestion: "blue".into(),
        };
        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["roundIndex"], 3);
        assert_eq!(json["outcome"], "timeout");
        assert_eq!(json["selected"], serde_json::Value::Null);
        assert_eq!(json["robotSuggestion"], "blue");
    }
}
