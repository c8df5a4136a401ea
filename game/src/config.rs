use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::round::{
    Advisor, EntityId, MAX_ENTITIES, MIN_ENTITIES, PresenceToken, RoundDefinition, Suggestions,
};

pub const DEFAULT_SESSION_PATH: &str = "config/session.json";
pub const DEFAULT_ROUND_DURATION: Duration = Duration::from_secs(40);
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(10);
pub const DEFAULT_AGENT_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_ROBOT_DELAY: Duration = Duration::from_secs(4);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed session document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("session has no rounds")]
    EmptySession,
    #[error("round {round}: {count} wires, expected 3..=6")]
    EntityCount { round: usize, count: usize },
    #[error("round {round}: wireCount is {declared} but {listed} wires are listed")]
    CountMismatch {
        round: usize,
        declared: usize,
        listed: usize,
    },
    #[error("round {round}: wire `{entity}` is listed twice")]
    DuplicateEntity { round: usize, entity: EntityId },
    #[error("round {round}: correct wire `{entity}` is not one of the round's wires")]
    UnknownCorrect { round: usize, entity: EntityId },
    #[error("round {round}: {advisor:?} suggests `{entity}`, which is not one of the round's wires")]
    UnknownSuggestion {
        round: usize,
        advisor: Advisor,
        entity: EntityId,
    },
    #[error("invalid timing: {0}")]
    InvalidTiming(&'static str),
}

/// Which of the two embedded advisor-suggestion variants a session uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    #[default]
    A,
    B,
}

impl Condition {
    /// `b` (any case) selects B; anything else, including no flag, is A.
    pub fn from_flag(flag: Option<&str>) -> Self {
        match flag.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("b") => Condition::B,
            _ => Condition::A,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Condition::A => "a",
            Condition::B => "b",
        }
    }
}

impl FromStr for Condition {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_flag(Some(s)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    #[serde(rename = "roundSeconds", with = "engine::serde_secs")]
    pub round_duration: Duration,
    #[serde(rename = "cooldownSeconds", with = "engine::serde_secs")]
    pub cooldown: Duration,
    #[serde(rename = "agentDelaySeconds", with = "engine::serde_secs")]
    pub agent_delay: Duration,
    #[serde(rename = "robotDelaySeconds", with = "engine::serde_secs")]
    pub robot_delay: Duration,
    /// First round index whose outcome is logged. `None` means "after the tutorial".
    pub telemetry_from_round: Option<usize>,
    /// First round index whose outcome makes the robot celebrate or sulk.
    pub reactions_from_round: usize,
    pub agent_name: String,
    pub robot_name: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            round_duration: DEFAULT_ROUND_DURATION,
            cooldown: DEFAULT_COOLDOWN,
            agent_delay: DEFAULT_AGENT_DELAY,
            robot_delay: DEFAULT_ROBOT_DELAY,
            telemetry_from_round: None,
            reactions_from_round: 0,
            agent_name: "LLM".to_string(),
            robot_name: "Dash".to_string(),
        }
    }
}

impl SessionSettings {
    pub fn advisor_delay(&self, advisor: Advisor) -> Duration {
        match advisor {
            Advisor::Agent => self.agent_delay,
            Advisor::Robot => self.robot_delay,
        }
    }

    pub fn advisor_name(&self, advisor: Advisor) -> &str {
        match advisor {
            Advisor::Agent => &self.agent_name,
            Advisor::Robot => &self.robot_name,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.round_duration.is_zero() {
            return Err(ConfigError::InvalidTiming("roundSeconds must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDocument {
    #[serde(default)]
    pub condition_name: Option<String>,
    #[serde(default)]
    pub tutorial: Vec<RoundDoc>,
    pub rounds: Vec<RoundDoc>,
    #[serde(default)]
    pub settings: SessionSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundDoc {
    pub wire_count: usize,
    pub wires: Vec<EntityId>,
    pub correct_wire: EntityId,
    pub suggestions: SuggestionVariants,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuggestionVariants {
    pub a: Suggestions,
    pub b: Suggestions,
}

impl SuggestionVariants {
    pub fn for_condition(&self, condition: Condition) -> &Suggestions {
        match condition {
            Condition::A => &self.a,
            Condition::B => &self.b,
        }
    }
}

/// A validated session, ready to drive the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub condition: Condition,
    pub condition_label: String,
    pub tutorial_len: usize,
    pub rounds: Vec<RoundDefinition>,
    pub settings: SessionSettings,
}

impl SessionConfig {
    pub fn from_document(doc: SessionDocument, condition: Condition) -> Result<Self, ConfigError> {
        doc.settings.validate()?;
        let tutorial_len = doc.tutorial.len();
        let rounds = doc
            .tutorial
            .iter()
            .chain(doc.rounds.iter())
            .enumerate()
            .map(|(index, round)| build_round(index, round, condition))
            .collect::<Result<Vec<_>, _>>()?;
        if rounds.is_empty() {
            return Err(ConfigError::EmptySession);
        }

        Ok(Self {
            condition,
            condition_label: doc
                .condition_name
                .unwrap_or_else(|| condition.as_str().to_string()),
            tutorial_len,
            rounds,
            settings: doc.settings,
        })
    }

    pub fn from_json_str(text: &str, condition: Condition) -> Result<Self, ConfigError> {
        let doc: SessionDocument = serde_json::from_str(text)?;
        Self::from_document(doc, condition)
    }

    pub fn load(path: impl AsRef<Path>, condition: Condition) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text, condition)
    }

    pub fn telemetry_from_round(&self) -> usize {
        self.settings.telemetry_from_round.unwrap_or(self.tutorial_len)
    }

    pub fn round_label(&self, index: usize) -> String {
        crate::round::round_label(index, self.tutorial_len)
    }
}

fn build_round(
    index: usize,
    doc: &RoundDoc,
    condition: Condition,
) -> Result<RoundDefinition, ConfigError> {
    let listed = doc.wires.len();
    if !(MIN_ENTITIES..=MAX_ENTITIES).contains(&doc.wire_count) {
        return Err(ConfigError::EntityCount {
            round: index,
            count: doc.wire_count,
        });
    }
    if listed != doc.wire_count {
        return Err(ConfigError::CountMismatch {
            round: index,
            declared: doc.wire_count,
            listed,
        });
    }

    let mut seen = HashSet::new();
    for wire in &doc.wires {
        if !seen.insert(wire) {
            return Err(ConfigError::DuplicateEntity {
                round: index,
                entity: wire.clone(),
            });
        }
    }

    if !seen.contains(&doc.correct_wire) {
        return Err(ConfigError::UnknownCorrect {
            round: index,
            entity: doc.correct_wire.clone(),
        });
    }

    let suggestions = doc.suggestions.for_condition(condition).clone();
    for advisor in Advisor::ALL {
        let entity = suggestions.get(advisor);
        if !seen.contains(entity) {
            return Err(ConfigError::UnknownSuggestion {
                round: index,
                advisor,
                entity: entity.clone(),
            });
        }
    }

    Ok(RoundDefinition {
        index,
        entities: doc.wires.clone(),
        correct: doc.correct_wire.clone(),
        suggestions,
    })
}

/// Entity → scene node mapping supplied by the rendering side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneInventory {
    tokens: HashMap<EntityId, PresenceToken>,
}

impl SceneInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, entity: impl Into<EntityId>, token: impl Into<String>) -> Self {
        self.tokens
            .insert(entity.into(), PresenceToken::new(token.into()));
        self
    }

    /// `cable1`, `cable2`, … assigned in first-seen order across the session.
    pub fn numbered_cables(config: &SessionConfig) -> Self {
        let mut inventory = Self::new();
        for entity in config.rounds.iter().flat_map(|round| round.entities.iter()) {
            if !inventory.tokens.contains_key(entity) {
                let token = format!("cable{}", inventory.tokens.len() + 1);
                inventory.tokens.insert(entity.clone(), PresenceToken::new(token));
            }
        }
        inventory
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn token(&self, entity: &EntityId) -> Option<&PresenceToken> {
        self.tokens.get(entity)
    }

    pub fn tokens(&self) -> impl Iterator<Item = &PresenceToken> {
        self.tokens.values()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Where the session document lives and which condition to use, resolved
/// from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSource {
    pub path: PathBuf,
    pub condition: Condition,
}

impl SessionSource {
    pub fn from_env() -> Self {
        let path = std::env::var_os("DEFUSAL_SESSION_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_PATH));
        let condition = Condition::from_flag(std::env::var("DEFUSAL_CONDITION").ok().as_deref());
        Self { path, condition }
    }

    pub fn load(&self) -> Result<SessionConfig, ConfigError> {
        SessionConfig::load(&self.path, self.condition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "conditionName": "pilot",
        "tutorial": [
            {"wireCount": 3, "wires": ["red", "blue", "green"], "correctWire": "red",
             "suggestions": {"a": {"agent": "red", "robot": "blue"},
                             "b": {"agent": "green", "robot": "red"}}}
        ],
        "rounds": [
            {"wireCount": 4, "wires": ["red", "blue", "green", "white"], "correctWire": "white",
             "suggestions": {"a": {"agent": "white", "robot": "white"},
                             "b": {"agent": "blue", "robot": "white"}}}
        ],
        "settings": {"roundSeconds": 30.0, "robotDelaySeconds": 2.5}
    }"#;

    #[test]
    fn parses_tutorial_then_scored_rounds() {
        let config = SessionConfig::from_json_str(DOC, Condition::A).expect("valid doc");
        assert_eq!(config.rounds.len(), 2);
        assert_eq!(config.tutorial_len, 1);
        assert_eq!(config.rounds[1].index, 1);
        assert_eq!(config.rounds[1].correct, EntityId::from("white"));
        assert_eq!(config.condition_label, "pilot");
        assert_eq!(config.telemetry_from_round(), 1);
        assert_eq!(config.round_label(1), "Round 1");
    }

    #[test]
    fn condition_selects_suggestion_variant() {
        let a = SessionConfig::from_json_str(DOC, Condition::A).expect("valid doc");
        let b = SessionConfig::from_json_str(DOC, Condition::B).expect("valid doc");
        assert_eq!(a.rounds[0].suggestions.agent, EntityId::from("red"));
        assert_eq!(b.rounds[0].suggestions.agent, EntityId::from("green"));
        assert_eq!(b.rounds[0].suggestions.robot, EntityId::from("red"));
    }

    #[test]
    fn settings_overrides_merge_with_defaults() {
        let config = SessionConfig::from_json_str(DOC, Condition::A).expect("valid doc");
        assert_eq!(config.settings.round_duration, Duration::from_secs(30));
        assert_eq!(config.settings.robot_delay, Duration::from_millis(2500));
        assert_eq!(config.settings.cooldown, DEFAULT_COOLDOWN);
        assert_eq!(config.settings.agent_name, "LLM");
    }

    #[test]
    fn condition_flag_defaults_to_a() {
        assert_eq!(Condition::from_flag(None), Condition::A);
        assert_eq!(Condition::from_flag(Some("b")), Condition::B);
        assert_eq!(Condition::from_flag(Some(" B ")), Condition::B);
        assert_eq!(Condition::from_flag(Some("c")), Condition::A);
    }

    fn round_json(count: usize, wires: &str, correct: &str, agent: &str) -> String {
        format!(
            r#"{{"rounds": [{{"wireCount": {count}, "wires": {wires}, "correctWire": "{correct}",
                "suggestions": {{"a": {{"agent": "{agent}", "robot": "red"}},
                                 "b": {{"agent": "red", "robot": "red"}}}}}}]}}"#
        )
    }

    #[test]
    fn rejects_out_of_range_counts() {
        let text = round_json(2, r#"["red","blue"]"#, "red", "red");
        let err = SessionConfig::from_json_str(&text, Condition::A).unwrap_err();
        assert!(matches!(err, ConfigError::EntityCount { count: 2, .. }));
    }

    #[test]
    fn rejects_count_mismatch() {
        let text = round_json(4, r#"["red","blue","green"]"#, "red", "red");
        let err = SessionConfig::from_json_str(&text, Condition::A).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::CountMismatch {
                declared: 4,
                listed: 3,
                ..
            }
        ));
    }

    #[test]
    fn rejects_foreign_identities() {
        let text = round_json(3, r#"["red","blue","green"]"#, "pink", "red");
        let err = SessionConfig::from_json_str(&text, Condition::A).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownCorrect { .. }));

        let text = round_json(3, r#"["red","blue","green"]"#, "red", "pink");
        let err = SessionConfig::from_json_str(&text, Condition::A).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnknownSuggestion {
                advisor: Advisor::Agent,
                ..
            }
        ));
    }

    #[test]
    fn rejects_duplicate_wires() {
        let text = round_json(3, r#"["red","red","green"]"#, "red", "red");
        let err = SessionConfig::from_json_str(&text, Condition::A).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateEntity { .. }));
    }

    #[test]
    fn rejects_empty_and_malformed_sessions() {
        let err = SessionConfig::from_json_str(r#"{"rounds": []}"#, Condition::A).unwrap_err();
        assert!(matches!(err, ConfigError::EmptySession));

        let err = SessionConfig::from_json_str(r#"{"tutorial": []}"#, Condition::A).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_zero_round_duration() {
        let text = r#"{"rounds": [], "settings": {"roundSeconds": 0.0}}"#;
        let err = SessionConfig::from_json_str(text, Condition::A).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTiming(_)));
    }

    #[test]
    fn numbered_cables_follow_first_appearance() {
        let config = SessionConfig::from_json_str(DOC, Condition::A).expect("valid doc");
        let inventory = SceneInventory::numbered_cables(&config);
        assert_eq!(inventory.len(), 4);
        assert_eq!(
            inventory.token(&EntityId::from("red")).map(PresenceToken::as_str),
            Some("cable1")
        );
        assert_eq!(
            inventory.token(&EntityId::from("white")).map(PresenceToken::as_str),
            Some("cable4")
        );
    }

    #[test]
    fn inventory_parses_plain_object() {
        let inventory =
            SceneInventory::from_json_str(r#"{"red": "wire_a", "blue": "wire_b"}"#).expect("parse");
        assert_eq!(
            inventory.token(&EntityId::from("blue")),
            Some(&PresenceToken::new("wire_b"))
        );
    }
}
