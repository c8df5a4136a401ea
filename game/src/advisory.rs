use std::time::Duration;

use engine::scheduler::{DeferredQueue, Fired, Generation, TimerHandle};

use crate::config::SessionSettings;
use crate::round::{Advisor, EntityId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvisoryJob {
    pub advisor: Advisor,
}

pub fn advisory_message(advisor: Advisor, entity: &EntityId, settings: &SessionSettings) -> String {
    match advisor {
        Advisor::Agent => format!("I've analyzed the module. Recommend cutting {entity}."),
        Advisor::Robot => format!("{} points at {entity}.", settings.robot_name),
    }
}

/// Both advisors' delayed suggestions for each round, tagged by round generation.
#[derive(Debug, Default)]
pub struct AdvisoryScheduler {
    queue: DeferredQueue<AdvisoryJob>,
}

impl AdvisoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms one suggestion per advisor at its configured offset from now.
    pub fn arm_round(&mut self, generation: Generation, settings: &SessionSettings) -> Vec<TimerHandle> {
        Advisor::ALL
            .into_iter()
            .map(|advisor| {
                self.queue.arm(
                    generation,
                    settings.advisor_delay(advisor),
                    AdvisoryJob { advisor },
                )
            })
            .collect()
    }

    pub fn advance(&mut self, dt: Duration) -> Vec<Fired<AdvisoryJob>> {
        self.queue.advance(dt)
    }

    pub fn cancel_round(&mut self, generation: Generation) -> usize {
        self.queue.cancel_generation(generation)
    }

    pub fn cancel_all(&mut self) -> usize {
        self.queue.cancel_all()
    }

    pub fn pending(&self, generation: Generation) -> usize {
        self.queue.pending(generation)
    }
}
