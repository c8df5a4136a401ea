//! Command interfaces the orchestrator talks to. None of them are queried for
//! state; every call is fire-and-forget from the round's point of view.

use serde::Serialize;
use thiserror::Error;

use crate::round::{EntityId, Outcome, PresenceToken};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityStyle {
    Default,
    Highlight,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultBanner {
    pub outcome: Outcome,
    pub title: String,
    pub subtitle: String,
}

pub trait Presentation {
    fn set_entity_visible(&mut self, token: &PresenceToken, visible: bool);
    /// Shows or hides the "already cut" counterpart of an entity.
    fn set_cut_visible(&mut self, token: &PresenceToken, visible: bool);
    fn set_entity_style(&mut self, token: &PresenceToken, style: EntityStyle);
    fn set_counter_text(&mut self, text: &str);
    fn show_result(&mut self, banner: &ResultBanner);
    fn hide_result(&mut self);
    fn set_cooldown_text(&mut self, text: &str);
}

/// The chat column both advisors speak through.
pub trait AdvisoryPanel {
    fn show_thinking(&mut self);
    fn hide_thinking(&mut self);
    fn add_message(&mut self, sender: &str, text: &str);
    fn clear_messages(&mut self);
}

#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("robot advisor unavailable: {0}")]
    Unavailable(String),
}

/// The physical advisor. Calls return as soon as the command is handed off.
pub trait RobotAdvisor {
    fn think(&mut self) -> Result<(), AdvisorError>;
    fn suggest(&mut self, entity: &EntityId) -> Result<(), AdvisorError>;
    fn celebrate(&mut self) -> Result<(), AdvisorError>;
    fn feel_sad(&mut self) -> Result<(), AdvisorError>;
}

/// Sessions run without a robot attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRobot;

impl RobotAdvisor for NoRobot {
    fn think(&mut self) -> Result<(), AdvisorError> {
        Ok(())
    }

    fn suggest(&mut self, _entity: &EntityId) -> Result<(), AdvisorError> {
        Ok(())
    }

    fn celebrate(&mut self) -> Result<(), AdvisorError> {
        Ok(())
    }

    fn feel_sad(&mut self) -> Result<(), AdvisorError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub rounds: usize,
    pub wins: usize,
    pub losses: usize,
    pub timeouts: usize,
}

impl SessionSummary {
    pub fn record(&mut self, outcome: Outcome) {
        self.rounds += 1;
        match outcome {
            Outcome::Win => self.wins += 1,
            Outcome::Loss => self.losses += 1,
            Outcome::Timeout => self.timeouts += 1,
        }
    }
}

pub trait SessionHost {
    fn session_complete(&mut self, summary: &SessionSummary);
}

pub struct Ports {
    pub presentation: Box<dyn Presentation>,
    pub panel: Box<dyn AdvisoryPanel>,
    pub robot: Box<dyn RobotAdvisor>,
    pub host: Box<dyn SessionHost>,
}
