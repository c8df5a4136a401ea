use std::time::Duration;

use engine::audio::{AudioBackend, CueController};

/// Looping tension track played while a round is live.
pub const TIMER_LOOP_CUE: &str = "timer-loop";
pub const WIN_CUE: &str = "win";
pub const LOSS_CUE: &str = "loss";

/// Base volumes (0.0..=1.0) before the participant's mix is applied.
///
/// The loop sits well under the result stingers.
pub const TIMER_LOOP_VOLUME: f32 = 0.05;
pub const RESULT_SFX_VOLUME: f32 = 0.5;

pub const WIN_CUE_LENGTH: Duration = Duration::from_millis(2_500);
pub const LOSS_CUE_LENGTH: Duration = Duration::from_millis(4_000);

/// A cue controller with the result stinger lengths registered.
pub fn cue_controller<B: AudioBackend>(backend: B) -> CueController<B> {
    CueController::new(backend)
        .with_cue_length(WIN_CUE, WIN_CUE_LENGTH)
        .with_cue_length(LOSS_CUE, LOSS_CUE_LENGTH)
}
