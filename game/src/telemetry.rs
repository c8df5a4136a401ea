use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::round::OutcomeRecord;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry io: {0}")]
    Io(#[from] io::Error),
    #[error("telemetry encoding: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("telemetry http: {0}")]
    Http(#[from] crate::http::PostError),
    #[error("telemetry worker has shut down")]
    WorkerGone,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryPayload {
    #[serde(flatten)]
    pub record: OutcomeRecord,
    pub participant_id: String,
    /// Unix epoch milliseconds at hand-off.
    pub client_time_ms: i64,
}

pub trait TelemetrySink {
    fn deliver(&mut self, payload: &TelemetryPayload) -> Result<(), TelemetryError>;
}

/// One JSON object per line.
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl JsonLinesSink<File> {
    pub fn append_to(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(file))
    }
}

impl<W: Write> TelemetrySink for JsonLinesSink<W> {
    fn deliver(&mut self, payload: &TelemetryPayload) -> Result<(), TelemetryError> {
        serde_json::to_writer(&mut self.writer, payload)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Drops everything; used when no telemetry destination is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardSink;

impl TelemetrySink for DiscardSink {
    fn deliver(&mut self, payload: &TelemetryPayload) -> Result<(), TelemetryError> {
        debug!(round = payload.record.round_index, "telemetry discarded");
        Ok(())
    }
}

/// `user_` followed by nine base-36 characters.
pub fn generate_participant_id() -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("user_{suffix}")
}

/// Hands outcome records to a sink. Never retries and never fails the caller.
pub struct TelemetryEmitter {
    sink: Box<dyn TelemetrySink>,
    participant_id: String,
    delivered: usize,
    failed: usize,
}

impl TelemetryEmitter {
    pub fn new(sink: Box<dyn TelemetrySink>, participant_id: impl Into<String>) -> Self {
        Self {
            sink,
            participant_id: participant_id.into(),
            delivered: 0,
            failed: 0,
        }
    }

    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    pub fn emit(&mut self, record: OutcomeRecord) -> bool {
        let payload = TelemetryPayload {
            record,
            participant_id: self.participant_id.clone(),
            client_time_ms: Utc::now().timestamp_millis(),
        };
        match self.sink.deliver(&payload) {
            Ok(()) => {
                self.delivered += 1;
                info!(
                    round = payload.record.round_index,
                    outcome = payload.record.outcome.label(),
                    "round outcome logged"
                );
                true
            }
            Err(err) => {
                self.failed += 1;
                warn!(
                    round = payload.record.round_index,
                    error = %err,
                    "failed to log round outcome"
                );
                false
            }
        }
    }

    pub fn delivered(&self) -> usize {
        self.delivered
    }

    pub fn failed(&self) -> usize {
        self.failed
    }
}
