use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

/// Used for one-shot cues that were never given a nominal length.
pub const DEFAULT_ONE_SHOT_LENGTH: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayOptions {
    pub volume: f32,
    pub looping: bool,
}

impl PlayOptions {
    pub fn once(volume: f32) -> Self {
        Self {
            volume: volume.clamp(0.0, 1.0),
            looping: false,
        }
    }

    pub fn looped(volume: f32) -> Self {
        Self {
            volume: volume.clamp(0.0, 1.0),
            looping: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AudioError {
    #[error("audio output is locked until a user gesture")]
    Locked,
    #[error("unknown cue `{0}`")]
    UnknownCue(String),
    #[error("audio device error: {0}")]
    Device(String),
}

/// Whatever actually makes sound. Voices are started and stopped by id; the
/// controller owns all bookkeeping about which cue a voice belongs to.
pub trait AudioBackend {
    fn is_unlocked(&self) -> bool;
    fn unlock(&mut self) -> Result<(), AudioError>;
    fn start(&mut self, cue: &str, options: PlayOptions) -> Result<VoiceId, AudioError>;
    fn stop(&mut self, voice: VoiceId);
}

impl<B: AudioBackend + ?Sized> AudioBackend for Box<B> {
    fn is_unlocked(&self) -> bool {
        (**self).is_unlocked()
    }

    fn unlock(&mut self) -> Result<(), AudioError> {
        (**self).unlock()
    }

    fn start(&mut self, cue: &str, options: PlayOptions) -> Result<VoiceId, AudioError> {
        (**self).start(cue, options)
    }

    fn stop(&mut self, voice: VoiceId) {
        (**self).stop(voice)
    }
}

#[derive(Debug, Clone)]
struct ActiveVoice {
    cue: String,
    voice: VoiceId,
    // `None` for looping voices.
    remaining: Option<Duration>,
}

/// Keyed cue playback on top of an [`AudioBackend`].
///
/// `play` while the backend is locked queues the request; [`CueController::on_gesture`]
/// unlocks and replays the queue in order.
#[derive(Debug)]
pub struct CueController<B> {
    backend: B,
    lengths: HashMap<String, Duration>,
    active: Vec<ActiveVoice>,
    queued: Vec<(String, PlayOptions)>,
}

impl<B: AudioBackend> CueController<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            lengths: HashMap::new(),
            active: Vec::new(),
            queued: Vec::new(),
        }
    }

    pub fn with_cue_length(mut self, cue: impl Into<String>, length: Duration) -> Self {
        self.lengths.insert(cue.into(), length);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn play(&mut self, cue: &str, options: PlayOptions) {
        if !self.backend.is_unlocked() {
            debug!(cue, "audio locked, queueing cue");
            self.queued.push((cue.to_string(), options));
            return;
        }
        self.start_voice(cue, options);
    }

    fn start_voice(&mut self, cue: &str, options: PlayOptions) {
        match self.backend.start(cue, options) {
            Ok(voice) => {
                let remaining = if options.looping {
                    None
                } else {
                    Some(
                        self.lengths
                            .get(cue)
                            .copied()
                            .unwrap_or(DEFAULT_ONE_SHOT_LENGTH),
                    )
                };
                self.active.push(ActiveVoice {
                    cue: cue.to_string(),
                    voice,
                    remaining,
                });
            }
            Err(AudioError::Locked) => {
                debug!(cue, "audio backend reported locked, queueing cue");
                self.queued.push((cue.to_string(), options));
            }
            Err(err) => warn!(cue, error = %err, "failed to start cue"),
        }
    }

    /// Stops every active voice of `cue` and drops queued plays of it.
    pub fn stop(&mut self, cue: &str) {
        self.queued.retain(|(name, _)| name != cue);
        let backend = &mut self.backend;
        self.active.retain(|voice| {
            if voice.cue == cue {
                backend.stop(voice.voice);
                false
            } else {
                true
            }
        });
    }

    pub fn stop_all(&mut self) {
        self.queued.clear();
        for voice in self.active.drain(..) {
            self.backend.stop(voice.voice);
        }
    }

    /// A qualifying user gesture happened (click, key press).
    pub fn on_gesture(&mut self) {
        if self.backend.is_unlocked() && self.queued.is_empty() {
            return;
        }
        if !self.backend.is_unlocked() {
            if let Err(err) = self.backend.unlock() {
                warn!(error = %err, "audio unlock failed, keeping queued cues");
                return;
            }
        }
        let queued = std::mem::take(&mut self.queued);
        for (cue, options) in queued {
            self.start_voice(&cue, options);
        }
    }

    /// Releases one-shot voices whose nominal length has elapsed.
    pub fn advance(&mut self, dt: Duration) {
        let backend = &mut self.backend;
        self.active.retain_mut(|voice| {
            let Some(remaining) = voice.remaining.as_mut() else {
                return true;
            };
            *remaining = remaining.saturating_sub(dt);
            if remaining.is_zero() {
                backend.stop(voice.voice);
                false
            } else {
                true
            }
        });
    }

    pub fn active_count(&self, cue: &str) -> usize {
        self.active.iter().filter(|voice| voice.cue == cue).count()
    }

    pub fn queued_count(&self, cue: &str) -> usize {
        self.queued.iter().filter(|(name, _)| name == cue).count()
    }

    pub fn is_playing(&self, cue: &str) -> bool {
        self.active_count(cue) > 0
    }
}

/// In-memory backend for headless runs. Optionally starts locked to mimic
/// outputs that need a user gesture first.
#[derive(Debug, Default)]
pub struct SilentBackend {
    locked: bool,
    next_voice: u64,
    live: HashMap<VoiceId, String>,
    started: Vec<String>,
}

impl SilentBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn locked() -> Self {
        Self {
            locked: true,
            ..Self::default()
        }
    }

    pub fn live_voices(&self) -> usize {
        self.live.len()
    }

    /// Every cue started so far, in order.
    pub fn started(&self) -> &[String] {
        &self.started
    }
}

impl AudioBackend for SilentBackend {
    fn is_unlocked(&self) -> bool {
        !self.locked
    }

    fn unlock(&mut self) -> Result<(), AudioError> {
        self.locked = false;
        Ok(())
    }

    fn start(&mut self, cue: &str, _options: PlayOptions) -> Result<VoiceId, AudioError> {
        if self.locked {
            return Err(AudioError::Locked);
        }
        let voice = VoiceId(self.next_voice);
        self.next_voice += 1;
        self.live.insert(voice, cue.to_string());
        self.started.push(cue.to_string());
        Ok(voice)
    }

    fn stop(&mut self, voice: VoiceId) {
        self.live.remove(&voice);
    }
}
