//! Port implementations for headless sessions: every command becomes a
//! `tracing` event.

use tracing::{debug, info};

use crate::ports::{
    AdvisoryPanel, EntityStyle, Presentation, ResultBanner, SessionHost, SessionSummary,
};
use crate::round::PresenceToken;

#[derive(Debug, Default)]
pub struct LogPresentation {
    counter: String,
}

impl LogPresentation {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Presentation for LogPresentation {
    fn set_entity_visible(&mut self, token: &PresenceToken, visible: bool) {
        debug!(%token, visible, "wire visibility");
    }

    fn set_cut_visible(&mut self, token: &PresenceToken, visible: bool) {
        if visible {
            info!(%token, "wire cut");
        } else {
            debug!(%token, "cut wire hidden");
        }
    }

    fn set_entity_style(&mut self, token: &PresenceToken, style: EntityStyle) {
        debug!(%token, ?style, "wire style");
    }

    fn set_counter_text(&mut self, text: &str) {
        // Only whole-second changes, the counter updates every frame.
        if self.counter.get(..5) != text.get(..5) {
            debug!(counter = text, "countdown");
        }
        self.counter.clear();
        self.counter.push_str(text);
    }

    fn show_result(&mut self, banner: &ResultBanner) {
        info!(
            outcome = banner.outcome.label(),
            "{} / {}", banner.title, banner.subtitle
        );
    }

    fn hide_result(&mut self) {
        debug!("result hidden");
    }

    fn set_cooldown_text(&mut self, text: &str) {
        if !text.is_empty() {
            info!("{text}");
        }
    }
}

#[derive(Debug, Default)]
pub struct LogPanel {
    thinking: bool,
}

impl LogPanel {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AdvisoryPanel for LogPanel {
    fn show_thinking(&mut self) {
        if !self.thinking {
            debug!("advisor thinking");
        }
        self.thinking = true;
    }

    fn hide_thinking(&mut self) {
        self.thinking = false;
    }

    fn add_message(&mut self, sender: &str, text: &str) {
        info!(sender, "{text}");
    }

    fn clear_messages(&mut self) {
        debug!("chat cleared");
    }
}

#[derive(Debug, Default)]
pub struct LogHost {
    summary: Option<SessionSummary>,
}

impl LogHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(&self) -> Option<&SessionSummary> {
        self.summary.as_ref()
    }
}

impl SessionHost for LogHost {
    fn session_complete(&mut self, summary: &SessionSummary) {
        info!(?summary, "host notified of session end");
        self.summary = Some(*summary);
    }
}
