//! Round lifecycle: Setup → Active → Resolved → Cooldown → Setup(next) | Terminal.
//!
//! Everything happens inside [`RoundOrchestrator::advance`]. Per frame the order
//! is gesture unlock, audio bookkeeping, deferred advisories, then phase work.

use std::collections::HashMap;
use std::time::Duration;

use engine::Simulation;
use engine::audio::{AudioBackend, CueController, PlayOptions};
use engine::countdown::Countdown;
use engine::scheduler::{Generation, TimerHandle};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::advisory::{AdvisoryScheduler, advisory_message};
use crate::config::{SceneInventory, SessionConfig};
use crate::interaction::{InteractionEvent, InteractionResolver};
use crate::ports::{AdvisorError, EntityStyle, Ports, Presentation, ResultBanner, SessionSummary};
use crate::round::{Advisor, EntityId, Outcome, OutcomeRecord, PresenceToken, RoundDefinition};
use crate::settings::PlayerSettings;
use crate::sfx::{LOSS_CUE, RESULT_SFX_VOLUME, TIMER_LOOP_CUE, TIMER_LOOP_VOLUME, WIN_CUE};
use crate::telemetry::TelemetryEmitter;

pub const SYSTEM_SENDER: &str = "System";
pub const SESSION_COMPLETE_MESSAGE: &str = "Simulation Complete. Thank you for participating!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundPhase {
    Setup,
    Active,
    Resolved,
    Cooldown,
    Terminal,
}

/// One frame of host input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub dt: Duration,
    /// Hit-test results under the pointer, front to back.
    pub hits: Vec<EntityId>,
    /// The select (click/tap) signal fired this frame.
    pub select: bool,
    /// A gesture that may unlock audio output.
    pub gesture: bool,
}

impl Frame {
    pub fn idle(dt: Duration) -> Self {
        Self {
            dt,
            ..Self::default()
        }
    }

    pub fn hover(dt: Duration, entity: impl Into<EntityId>) -> Self {
        Self {
            dt,
            hits: vec![entity.into()],
            ..Self::default()
        }
    }

    /// Hover `entity` and click it in the same frame.
    pub fn cut(dt: Duration, entity: impl Into<EntityId>) -> Self {
        Self {
            dt,
            hits: vec![entity.into()],
            select: true,
            gesture: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub phase: RoundPhase,
    pub round_index: usize,
    /// Set on the frame a round resolves.
    pub resolved: Option<Outcome>,
}

/// Per-round state, rebuilt at every Setup.
#[derive(Debug, Clone)]
pub struct RoundRuntime {
    generation: Generation,
    timer: Countdown,
    bindings: HashMap<EntityId, PresenceToken>,
    advisories: Vec<TimerHandle>,
    cut: Vec<EntityId>,
    selected: Option<EntityId>,
    outcome: Option<Outcome>,
}

impl RoundRuntime {
    fn new(generation: Generation) -> Self {
        Self {
            generation,
            timer: Countdown::idle(),
            bindings: HashMap::new(),
            advisories: Vec::new(),
            cut: Vec::new(),
            selected: None,
            outcome: None,
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn timer(&self) -> &Countdown {
        &self.timer
    }

    pub fn token(&self, entity: &EntityId) -> Option<&PresenceToken> {
        self.bindings.get(entity)
    }

    pub fn is_bound(&self, entity: &EntityId) -> bool {
        self.bindings.contains_key(entity)
    }

    pub fn is_cut(&self, entity: &EntityId) -> bool {
        self.cut.contains(entity)
    }

    /// Bound and still intact.
    pub fn is_interactable(&self, entity: &EntityId) -> bool {
        self.is_bound(entity) && !self.is_cut(entity)
    }

    pub fn pending_advisories(&self) -> usize {
        self.advisories.len()
    }

    pub fn selected(&self) -> Option<&EntityId> {
        self.selected.as_ref()
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }
}

#[derive(Debug, Clone)]
pub struct SessionState {
    round_index: usize,
    phase: RoundPhase,
    runtime: Option<RoundRuntime>,
    generation: Generation,
}

impl SessionState {
    fn new() -> Self {
        Self {
            round_index: 0,
            phase: RoundPhase::Setup,
            runtime: None,
            generation: Generation::new(0),
        }
    }

    pub fn round_index(&self) -> usize {
        self.round_index
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn runtime(&self) -> Option<&RoundRuntime> {
        self.runtime.as_ref()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }
}

pub struct RoundOrchestrator<B: AudioBackend> {
    config: SessionConfig,
    inventory: SceneInventory,
    state: SessionState,
    resolver: InteractionResolver,
    advisories: AdvisoryScheduler,
    audio: CueController<B>,
    mix: PlayerSettings,
    auto_pause: bool,
    cooldown: Countdown,
    cooldown_shown: Option<u64>,
    telemetry: TelemetryEmitter,
    ports: Ports,
    summary: SessionSummary,
    paused: bool,
    started: bool,
}

impl<B: AudioBackend> RoundOrchestrator<B> {
    pub fn new(
        config: SessionConfig,
        inventory: SceneInventory,
        ports: Ports,
        telemetry: TelemetryEmitter,
        audio: CueController<B>,
    ) -> Self {
        Self {
            config,
            inventory,
            state: SessionState::new(),
            resolver: InteractionResolver::new(),
            advisories: AdvisoryScheduler::new(),
            audio,
            mix: PlayerSettings::default(),
            auto_pause: true,
            cooldown: Countdown::idle(),
            cooldown_shown: None,
            telemetry,
            ports,
            summary: SessionSummary::default(),
            paused: false,
            started: false,
        }
    }

    /// Scales cue volumes by the participant's mix and picks up their
    /// auto-pause preference.
    pub fn with_player_settings(mut self, settings: &PlayerSettings) -> Self {
        self.mix = settings.sanitized();
        self.auto_pause = settings.auto_pause_on_focus_loss;
        self
    }

    /// Clears the chat and sets up the first round. Also happens lazily on the
    /// first frame.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        info!(
            condition = %self.config.condition_label,
            rounds = self.config.rounds.len(),
            tutorial = self.config.tutorial_len,
            "session started"
        );
        self.ports.panel.clear_messages();
        self.setup_round();
    }

    pub fn advance(&mut self, frame: &Frame) -> TickReport {
        if frame.gesture {
            self.audio.on_gesture();
        }
        if self.paused {
            return self.report(None);
        }

        self.audio.advance(frame.dt);
        self.run_advisories(frame.dt);

        let resolved = match self.state.phase {
            RoundPhase::Setup => {
                if self.started {
                    self.setup_round();
                } else {
                    self.start();
                }
                None
            }
            RoundPhase::Active => self.tick_active(frame),
            RoundPhase::Cooldown => {
                self.tick_cooldown(frame.dt);
                None
            }
            RoundPhase::Resolved | RoundPhase::Terminal => None,
        };
        self.report(resolved)
    }

    /// Host focus loss. Paused frames only process audio unlock gestures.
    pub fn set_paused(&mut self, paused: bool) {
        if self.paused == paused {
            return;
        }
        self.paused = paused;
        if let Some(runtime) = self.state.runtime.as_mut() {
            if paused {
                runtime.timer.pause();
            } else {
                runtime.timer.resume();
            }
        }
        if paused {
            self.cooldown.pause();
        } else {
            self.cooldown.resume();
        }
        info!(paused, round = self.state.round_index, "session pause toggled");
    }

    /// Host window focus changed. Pauses only when the participant opted in.
    pub fn on_focus_changed(&mut self, focused: bool) {
        if !self.auto_pause {
            debug!(focused, "focus change ignored, auto-pause disabled");
            return;
        }
        self.set_paused(!focused);
    }

    /// Hard teardown: drops every pending job and silences all audio without
    /// notifying the host.
    pub fn shutdown(&mut self) {
        let dropped = self.advisories.cancel_all();
        self.audio.stop_all();
        self.cooldown.stop();
        if let Some(runtime) = self.state.runtime.as_mut() {
            runtime.timer.stop();
            runtime.advisories.clear();
        }
        self.state.phase = RoundPhase::Terminal;
        info!(dropped, round = self.state.round_index, "session shut down");
    }

    pub fn phase(&self) -> RoundPhase {
        self.state.phase
    }

    pub fn round_index(&self) -> usize {
        self.state.round_index
    }

    pub fn generation(&self) -> Generation {
        self.state.generation
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn runtime(&self) -> Option<&RoundRuntime> {
        self.state.runtime.as_ref()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The definition of the round currently in play, if any.
    pub fn current_round(&self) -> Option<&RoundDefinition> {
        match self.state.phase {
            RoundPhase::Terminal => None,
            _ => self.config.rounds.get(self.state.round_index),
        }
    }

    pub fn focused(&self) -> Option<&EntityId> {
        self.resolver.focused()
    }

    pub fn cooldown(&self) -> &Countdown {
        &self.cooldown
    }

    pub fn audio(&self) -> &CueController<B> {
        &self.audio
    }

    pub fn telemetry(&self) -> &TelemetryEmitter {
        &self.telemetry
    }

    pub fn summary(&self) -> &SessionSummary {
        &self.summary
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    fn report(&self, resolved: Option<Outcome>) -> TickReport {
        TickReport {
            phase: self.state.phase,
            round_index: self.state.round_index,
            resolved,
        }
    }

    fn setup_round(&mut self) {
        let index = self.state.round_index;
        let Some(definition) = self.config.rounds.get(index).cloned() else {
            self.enter_terminal();
            return;
        };
        let settings = &self.config.settings;

        let generation = self.state.generation.next();
        self.state.generation = generation;
        let mut runtime = RoundRuntime::new(generation);

        for entity in &definition.entities {
            match self.inventory.token(entity) {
                Some(token) => {
                    runtime.bindings.insert(entity.clone(), token.clone());
                }
                None => warn!(
                    round = index,
                    wire = %entity,
                    "no scene node for wire; it stays non-interactable"
                ),
            }
        }

        let presentation = &mut self.ports.presentation;
        for token in self.inventory.tokens() {
            let bound = runtime.bindings.values().any(|t| t == token);
            presentation.set_entity_visible(token, bound);
            presentation.set_cut_visible(token, false);
            presentation.set_entity_style(token, EntityStyle::Default);
        }
        self.resolver.clear();
        presentation.hide_result();
        presentation.set_cooldown_text("");
        self.cooldown_shown = None;

        let label = self.config.round_label(index);
        self.ports.panel.add_message(
            SYSTEM_SENDER,
            &format!("--- {} START ---", label.to_uppercase()),
        );
        self.ports.panel.show_thinking();
        log_robot("think", self.ports.robot.think());

        runtime.timer.reset(settings.round_duration);
        self.ports
            .presentation
            .set_counter_text(&runtime.timer.display());
        self.audio.play(
            TIMER_LOOP_CUE,
            PlayOptions::looped(TIMER_LOOP_VOLUME * self.mix.timer_loop_gain()),
        );
        runtime.advisories = self.advisories.arm_round(generation, settings);

        self.state.runtime = Some(runtime);
        self.state.phase = RoundPhase::Active;
        info!(round = index, %label, %generation, wires = definition.entity_count(), "round active");
    }

    fn run_advisories(&mut self, dt: Duration) {
        for fired in self.advisories.advance(dt) {
            let live = advisory_is_live(fired.generation, self.state.generation, self.state.phase);
            let Some(runtime) = self.state.runtime.as_mut().filter(|_| live) else {
                trace!(generation = %fired.generation, advisor = ?fired.job.advisor, "dropping stale advisory");
                continue;
            };
            let Some(definition) = self.config.rounds.get(self.state.round_index) else {
                continue;
            };

            runtime.advisories.retain(|handle| *handle != fired.handle);
            let advisor = fired.job.advisor;
            let entity = definition.suggestions.get(advisor);
            let settings = &self.config.settings;
            self.ports.panel.add_message(
                settings.advisor_name(advisor),
                &advisory_message(advisor, entity, settings),
            );
            if advisor == Advisor::Robot {
                log_robot("suggest", self.ports.robot.suggest(entity));
            }
            if runtime.advisories.is_empty() {
                self.ports.panel.hide_thinking();
            }
            debug!(round = self.state.round_index, ?advisor, wire = %entity, "advisory posted");
        }
    }

    fn tick_active(&mut self, frame: &Frame) -> Option<Outcome> {
        let definition = self.config.rounds.get(self.state.round_index)?;
        let runtime = self.state.runtime.as_mut()?;

        let expired = runtime.timer.tick(frame.dt).is_some();
        self.ports
            .presentation
            .set_counter_text(&runtime.timer.display());

        let candidates: Vec<EntityId> = frame
            .hits
            .iter()
            .filter(|entity| runtime.is_interactable(entity))
            .cloned()
            .collect();
        if let Some(event) = self.resolver.update(&candidates) {
            apply_focus(self.ports.presentation.as_mut(), runtime, &event);
        }

        let mut selected = None;
        if frame.select {
            if let Some(InteractionEvent::Selected(entity)) =
                self.resolver.select(|entity| runtime.is_interactable(entity))
            {
                selected = Some(entity);
            }
        }

        let outcome = match &selected {
            Some(entity) => Outcome::judge(entity, &definition.correct),
            None if expired => Outcome::Timeout,
            None => return None,
        };
        self.resolve(outcome, selected);
        Some(outcome)
    }

    fn resolve(&mut self, outcome: Outcome, selected: Option<EntityId>) {
        let index = self.state.round_index;
        let Some(definition) = self.config.rounds.get(index) else {
            return;
        };
        let Some(runtime) = self.state.runtime.as_mut() else {
            return;
        };
        if runtime.outcome.is_some() {
            return;
        }
        let settings = &self.config.settings;

        runtime.timer.stop();
        runtime.outcome = Some(outcome);
        runtime.selected = selected.clone();
        let elapsed = settings
            .round_duration
            .saturating_sub(runtime.timer.remaining());

        self.audio.stop(TIMER_LOOP_CUE);
        let cancelled = self.advisories.cancel_round(runtime.generation);
        runtime.advisories.clear();
        self.ports.panel.hide_thinking();

        let presentation = self.ports.presentation.as_mut();
        if let Some(event) = self.resolver.clear() {
            apply_focus(presentation, runtime, &event);
        }
        if let Some(entity) = &selected {
            runtime.cut.push(entity.clone());
            if let Some(token) = runtime.bindings.get(entity) {
                presentation.set_entity_style(token, EntityStyle::Default);
                presentation.set_entity_visible(token, false);
                presentation.set_cut_visible(token, true);
            }
        }
        self.state.phase = RoundPhase::Resolved;

        let label = self.config.round_label(index);
        info!(
            round = index,
            %label,
            outcome = outcome.label(),
            selected = selected.as_ref().map(EntityId::as_str),
            elapsed_secs = elapsed.as_secs_f64(),
            cancelled,
            "round resolved"
        );

        let cue = if outcome.is_win() { WIN_CUE } else { LOSS_CUE };
        self.audio.play(
            cue,
            PlayOptions::once(RESULT_SFX_VOLUME * self.mix.result_cue_gain()),
        );
        presentation.show_result(&ResultBanner {
            outcome,
            title: outcome.banner().to_string(),
            subtitle: format!("{label} Complete"),
        });

        if index >= settings.reactions_from_round {
            if outcome.is_win() {
                log_robot("celebrate", self.ports.robot.celebrate());
            } else {
                log_robot("sad", self.ports.robot.feel_sad());
            }
        }

        self.summary.record(outcome);
        if index >= self.config.telemetry_from_round() {
            self.telemetry.emit(OutcomeRecord {
                round_index: index,
                round_label: label,
                condition: self.config.condition_label.clone(),
                correct: definition.correct.clone(),
                selected,
                outcome,
                elapsed_seconds: elapsed.as_secs_f64(),
                agent_suggestion: definition.suggestions.agent.clone(),
                robot_suggestion: definition.suggestions.robot.clone(),
            });
        } else {
            debug!(round = index, "round below telemetry threshold, not logged");
        }

        self.cooldown.reset(settings.cooldown);
        self.show_cooldown();
        self.state.phase = RoundPhase::Cooldown;
    }

    fn tick_cooldown(&mut self, dt: Duration) {
        if self.cooldown.tick(dt).is_some() {
            self.state.round_index += 1;
            self.state.phase = RoundPhase::Setup;
            self.setup_round();
            return;
        }
        self.show_cooldown();
    }

    fn show_cooldown(&mut self) {
        let left = self.cooldown.remaining_whole_secs();
        if self.cooldown_shown == Some(left) {
            return;
        }
        self.cooldown_shown = Some(left);
        self.ports
            .presentation
            .set_cooldown_text(&format!("Next round in {left}"));
    }

    fn enter_terminal(&mut self) {
        if self.state.phase == RoundPhase::Terminal {
            return;
        }
        self.state.phase = RoundPhase::Terminal;
        self.advisories.cancel_all();
        self.audio.stop(TIMER_LOOP_CUE);
        self.ports.presentation.set_cooldown_text("");
        self.ports
            .panel
            .add_message(SYSTEM_SENDER, SESSION_COMPLETE_MESSAGE);
        self.ports.host.session_complete(&self.summary);
        info!(
            rounds = self.summary.rounds,
            wins = self.summary.wins,
            losses = self.summary.losses,
            timeouts = self.summary.timeouts,
            "session complete"
        );
    }
}

impl<B: AudioBackend> Simulation for RoundOrchestrator<B> {
    type Input = Frame;
    type Report = TickReport;

    fn tick(&mut self, input: Frame) -> TickReport {
        self.advance(&input)
    }

    fn is_finished(&self) -> bool {
        self.state.phase == RoundPhase::Terminal
    }
}

/// Jobs only land in the round that armed them, and only while it is still open.
fn advisory_is_live(armed: Generation, current: Generation, phase: RoundPhase) -> bool {
    phase == RoundPhase::Active && armed == current
}

fn apply_focus(presentation: &mut dyn Presentation, runtime: &RoundRuntime, event: &InteractionEvent) {
    let InteractionEvent::FocusChanged { previous, current } = event else {
        return;
    };
    if let Some(token) = previous.as_ref().and_then(|entity| runtime.token(entity)) {
        presentation.set_entity_style(token, EntityStyle::Default);
    }
    if let Some(token) = current.as_ref().and_then(|entity| runtime.token(entity)) {
        presentation.set_entity_style(token, EntityStyle::Highlight);
    }
}

fn log_robot(command: &str, result: Result<(), AdvisorError>) {
    if let Err(err) = result {
        warn!(command, error = %err, "robot advisor command dropped");
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use engine::audio::SilentBackend;

    use super::*;
    use crate::config::Condition;
    use crate::console::{LogHost, LogPresentation};
    use crate::ports::{AdvisoryPanel, NoRobot};
    use crate::telemetry::DiscardSink;

    /// Collects the senders of advisor chat lines.
    struct AdvisorLines(Rc<RefCell<Vec<String>>>);

    impl AdvisoryPanel for AdvisorLines {
        fn show_thinking(&mut self) {}

        fn hide_thinking(&mut self) {}

        fn add_message(&mut self, sender: &str, _text: &str) {
            if sender != SYSTEM_SENDER {
                self.0.borrow_mut().push(sender.to_string());
            }
        }

        fn clear_messages(&mut self) {}
    }

    fn orchestrator(lines: Rc<RefCell<Vec<String>>>) -> RoundOrchestrator<SilentBackend> {
        let round = r#"{"wireCount": 3, "wires": ["red", "blue", "green"], "correctWire": "red",
            "suggestions": {"a": {"agent": "red", "robot": "blue"},
                            "b": {"agent": "green", "robot": "green"}}}"#;
        let json = format!(r#"{{"rounds": [{round}, {round}]}}"#);
        let config = SessionConfig::from_json_str(&json, Condition::A).expect("valid session");
        let inventory = SceneInventory::numbered_cables(&config);
        let ports = Ports {
            presentation: Box::new(LogPresentation::new()),
            panel: Box::new(AdvisorLines(lines)),
            robot: Box::new(NoRobot),
            host: Box::new(LogHost::new()),
        };
        RoundOrchestrator::new(
            config,
            inventory,
            ports,
            TelemetryEmitter::new(Box::new(DiscardSink), "user_unit0001"),
            crate::sfx::cue_controller(SilentBackend::new()),
        )
    }

    #[test]
    fn liveness_needs_matching_generation_and_active_phase() {
        let g = Generation::new(3);
        assert!(advisory_is_live(g, g, RoundPhase::Active));
        assert!(!advisory_is_live(g, g.next(), RoundPhase::Active));
        for phase in [
            RoundPhase::Setup,
            RoundPhase::Resolved,
            RoundPhase::Cooldown,
            RoundPhase::Terminal,
        ] {
            assert!(!advisory_is_live(g, g, phase));
        }
    }

    #[test]
    fn uncancelled_job_from_an_earlier_generation_is_dropped() {
        let lines = Rc::new(RefCell::new(Vec::new()));
        let mut orch = orchestrator(lines.clone());
        orch.start();
        let earlier = Generation::new(0);
        assert_ne!(earlier, orch.generation());

        // Jobs left behind under an old generation without going through cancellation.
        let settings = orch.config.settings.clone();
        orch.advisories.arm_round(earlier, &settings);

        orch.advance(&Frame::idle(settings.agent_delay.max(settings.robot_delay)));

        assert_eq!(orch.advisories.pending(earlier), 0);
        assert_eq!(orch.phase(), RoundPhase::Active);
        assert_eq!(
            *lines.borrow(),
            [
                settings.advisor_name(Advisor::Agent).to_string(),
                settings.advisor_name(Advisor::Robot).to_string(),
            ]
        );
    }
}
