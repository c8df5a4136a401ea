use std::time::Duration;

use clap::ValueEnum;
use engine::audio::AudioBackend;

use crate::orchestrator::{Frame, RoundOrchestrator, RoundPhase};
use crate::round::{EntityId, RoundDefinition};

/// Which wire a scripted participant goes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Strategy {
    Correct,
    /// The first wire that is not the correct one.
    Wrong,
    /// Whatever the chat agent recommends.
    Agent,
    /// Whatever the robot points at.
    Robot,
    /// Never cuts; every round times out.
    Idle,
}

impl Strategy {
    pub fn pick<'a>(self, round: &'a RoundDefinition) -> Option<&'a EntityId> {
        match self {
            Strategy::Correct => Some(&round.correct),
            Strategy::Wrong => round.entities.iter().find(|e| **e != round.correct),
            Strategy::Agent => Some(&round.suggestions.agent),
            Strategy::Robot => Some(&round.suggestions.robot),
            Strategy::Idle => None,
        }
    }
}

/// Produces frames for a headless session: idles until `reaction` has passed
/// in the current round, then hovers and cuts its pick.
#[derive(Debug, Clone)]
pub struct ScriptedParticipant {
    strategy: Strategy,
    reaction: Duration,
    dt: Duration,
    gestured: bool,
}

impl ScriptedParticipant {
    pub fn new(strategy: Strategy, reaction: Duration, dt: Duration) -> Self {
        Self {
            strategy,
            reaction,
            dt,
            gestured: false,
        }
    }

    pub fn next_frame<B: AudioBackend>(&mut self, session: &RoundOrchestrator<B>) -> Frame {
        let mut frame = Frame::idle(self.dt);
        if !self.gestured {
            // The first click unlocks audio output.
            frame.gesture = true;
            self.gestured = true;
        }
        if session.phase() != RoundPhase::Active {
            return frame;
        }
        let (Some(round), Some(runtime)) = (session.current_round(), session.runtime()) else {
            return frame;
        };
        let elapsed = session
            .config()
            .settings
            .round_duration
            .saturating_sub(runtime.timer().remaining());
        if elapsed < self.reaction {
            return frame;
        }
        match self.strategy.pick(round) {
            Some(target) => Frame::cut(self.dt, target.clone()),
            None => frame,
        }
    }
}
