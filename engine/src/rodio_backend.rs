use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};

use crate::audio::{AudioBackend, AudioError, PlayOptions, VoiceId};

/// Plays registered clips on the default output device, one `Sink` per voice.
pub struct RodioBackend {
    _stream: OutputStream,
    handle: OutputStreamHandle,
    clips: HashMap<String, Arc<[u8]>>,
    sinks: HashMap<VoiceId, Sink>,
    next_voice: u64,
}

impl RodioBackend {
    pub fn new() -> Result<Self, AudioError> {
        let (stream, handle) =
            OutputStream::try_default().map_err(|err| AudioError::Device(err.to_string()))?;
        Ok(Self {
            _stream: stream,
            handle,
            clips: HashMap::new(),
            sinks: HashMap::new(),
            next_voice: 0,
        })
    }

    /// Registers encoded audio (wav/mp3/ogg) under a cue name.
    pub fn add_clip(&mut self, cue: impl Into<String>, bytes: impl Into<Arc<[u8]>>) {
        self.clips.insert(cue.into(), bytes.into());
    }
}

impl AudioBackend for RodioBackend {
    fn is_unlocked(&self) -> bool {
        // Native output devices have no gesture gate.
        true
    }

    fn unlock(&mut self) -> Result<(), AudioError> {
        Ok(())
    }

    fn start(&mut self, cue: &str, options: PlayOptions) -> Result<VoiceId, AudioError> {
        let Some(bytes) = self.clips.get(cue) else {
            return Err(AudioError::UnknownCue(cue.to_string()));
        };
        let sink = Sink::try_new(&self.handle).map_err(|err| AudioError::Device(err.to_string()))?;
        sink.set_volume(options.volume);

        let cursor = Cursor::new(Arc::clone(bytes));
        if options.looping {
            let source =
                Decoder::new_looped(cursor).map_err(|err| AudioError::Device(err.to_string()))?;
            sink.append(source);
        } else {
            let source = Decoder::new(cursor).map_err(|err| AudioError::Device(err.to_string()))?;
            sink.append(source);
        }

        let voice = VoiceId(self.next_voice);
        self.next_voice += 1;
        self.sinks.insert(voice, sink);
        Ok(voice)
    }

    fn stop(&mut self, voice: VoiceId) {
        if let Some(sink) = self.sinks.remove(&voice) {
            sink.stop();
        }
    }
}
