pub mod audio;
pub mod countdown;
#[cfg(feature = "rodio")]
pub mod rodio_backend;
pub mod scheduler;
pub mod serde_secs;

use std::time::Duration;

/// Something advanced one frame at a time by a host loop.
pub trait Simulation {
    type Input;
    type Report;

    fn tick(&mut self, input: Self::Input) -> Self::Report;

    fn is_finished(&self) -> bool {
        false
    }
}

/// Frame duration for a fixed update rate.
pub fn fixed_step(fps: u32) -> Duration {
    Duration::from_secs_f64(1.0 / f64::from(fps.max(1)))
}

#[derive(Debug)]
pub struct HeadlessRunner<S: Simulation> {
    simulation: S,
    frame: usize,
}

impl<S: Simulation> HeadlessRunner<S> {
    pub fn new(simulation: S) -> Self {
        Self {
            simulation,
            frame: 0,
        }
    }

    pub fn frame(&self) -> usize {
        self.frame
    }

    pub fn simulation(&self) -> &S {
        &self.simulation
    }

    pub fn simulation_mut(&mut self) -> &mut S {
        &mut self.simulation
    }

    pub fn into_inner(self) -> S {
        self.simulation
    }

    pub fn step(&mut self, input: S::Input) -> S::Report {
        let report = self.simulation.tick(input);
        self.frame += 1;
        report
    }

    pub fn run<I>(&mut self, inputs: I) -> usize
    where
        I: IntoIterator<Item = S::Input>,
    {
        for input in inputs {
            self.step(input);
        }
        self.frame
    }

    /// Steps with inputs produced on demand until the simulation reports it is
    /// finished or `max_frames` more frames have run. Returns the frame count.
    pub fn run_until_finished<F>(&mut self, max_frames: usize, mut input_for: F) -> usize
    where
        F: FnMut(usize, &S) -> S::Input,
    {
        for _ in 0..max_frames {
            if self.simulation.is_finished() {
                break;
            }
            let input = input_for(self.frame, &self.simulation);
            self.step(input);
        }
        self.frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Countdown {
        left: u32,
    }

    impl Simulation for Countdown {
        type Input = u32;
        type Report = u32;

        fn tick(&mut self, input: Self::Input) -> Self::Report {
            self.left = self.left.saturating_sub(input);
            self.left
        }

        fn is_finished(&self) -> bool {
            self.left == 0
        }
    }

    #[test]
    fn runner_counts_frames() {
        let mut runner = HeadlessRunner::new(Countdown { left: 10 });
        assert_eq!(runner.step(3), 7);
        assert_eq!(runner.run([1, 1]), 3);
        assert_eq!(runner.simulation().left, 5);
    }

    #[test]
    fn run_until_finished_stops_early() {
        let mut runner = HeadlessRunner::new(Countdown { left: 5 });
        let frames = runner.run_until_finished(100, |_, _| 2);
        assert_eq!(frames, 3);
        assert!(runner.simulation().is_finished());
    }

    #[test]
    fn run_until_finished_respects_cap() {
        let mut runner = HeadlessRunner::new(Countdown { left: 50 });
        assert_eq!(runner.run_until_finished(4, |_, _| 1), 4);
        assert_eq!(runner.simulation().left, 46);
    }

    #[test]
    fn fixed_step_guards_zero_fps() {
        assert_eq!(fixed_step(0), Duration::from_secs(1));
        assert!((fixed_step(60).as_secs_f64() - 1.0 / 60.0).abs() < 1e-9);
    }
}
