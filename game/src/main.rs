use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use defusal::config::{Condition, SceneInventory, SessionConfig, SessionSource};
use defusal::console::{LogHost, LogPanel, LogPresentation};
use defusal::http::{HttpPoster, HttpRobotAdvisor, HttpTelemetrySink};
use defusal::orchestrator::RoundOrchestrator;
use defusal::participant::{ScriptedParticipant, Strategy};
use defusal::ports::{NoRobot, Ports, RobotAdvisor, SessionSummary};
use defusal::settings::{PlayerSettings, SettingsStore};
use defusal::telemetry::{
    DiscardSink, JsonLinesSink, TelemetryEmitter, TelemetrySink, generate_participant_id,
};
use engine::audio::{AudioBackend, SilentBackend};
use engine::{HeadlessRunner, fixed_step};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "defusal")]
#[command(about = "Run a wire-defusal session headlessly with a scripted participant")]
struct Cli {
    /// Session document; defaults to $DEFUSAL_SESSION_PATH or config/session.json.
    #[arg(long)]
    session: Option<PathBuf>,
    /// Suggestion variant (`a` or `b`); defaults to $DEFUSAL_CONDITION.
    #[arg(long)]
    condition: Option<String>,
    #[arg(long)]
    participant: Option<String>,
    /// JSON object mapping wire colors to scene node names.
    #[arg(long)]
    inventory: Option<PathBuf>,
    #[arg(long, conflicts_with = "telemetry_url")]
    telemetry_file: Option<PathBuf>,
    #[arg(long)]
    telemetry_url: Option<String>,
    #[arg(long)]
    robot_url: Option<String>,
    #[arg(long, value_enum, default_value_t = Strategy::Correct)]
    strategy: Strategy,
    #[arg(long, default_value_t = 2.5)]
    reaction_seconds: f64,
    #[arg(long, default_value_t = 60)]
    fps: u32,
    #[arg(long, default_value_t = 1_000_000)]
    max_frames: usize,
    /// Directory holding `timer-loop`, `win` and `loss` clips (wav/ogg/mp3).
    #[cfg(feature = "audio-device")]
    #[arg(long)]
    sound_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = load_session(&cli)?;
    let inventory = match &cli.inventory {
        Some(path) => SceneInventory::load(path)
            .with_context(|| format!("loading scene inventory {}", path.display()))?,
        None => SceneInventory::numbered_cables(&config),
    };
    let player = SettingsStore::from_env().load();

    let summary = run_with_audio(&cli, config, inventory, &player)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn load_session(cli: &Cli) -> Result<SessionConfig> {
    let mut source = SessionSource::from_env();
    if let Some(path) = &cli.session {
        source.path = path.clone();
    }
    if let Some(flag) = cli.condition.as_deref() {
        source.condition = Condition::from_flag(Some(flag));
    }
    source
        .load()
        .with_context(|| format!("loading session {}", source.path.display()))
}

#[cfg(feature = "audio-device")]
fn run_with_audio(
    cli: &Cli,
    config: SessionConfig,
    inventory: SceneInventory,
    player: &PlayerSettings,
) -> Result<SessionSummary> {
    use defusal::sfx::{LOSS_CUE, TIMER_LOOP_CUE, WIN_CUE};
    use engine::rodio_backend::RodioBackend;

    let Some(dir) = &cli.sound_dir else {
        return run_session(cli, config, inventory, player, SilentBackend::new());
    };
    let mut backend = RodioBackend::new().context("opening audio output")?;
    for cue in [TIMER_LOOP_CUE, WIN_CUE, LOSS_CUE] {
        let path = find_clip(dir, cue)?;
        let bytes = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        backend.add_clip(cue, bytes);
    }
    run_session(cli, config, inventory, player, backend)
}

#[cfg(not(feature = "audio-device"))]
fn run_with_audio(
    cli: &Cli,
    config: SessionConfig,
    inventory: SceneInventory,
    player: &PlayerSettings,
) -> Result<SessionSummary> {
    run_session(cli, config, inventory, player, SilentBackend::new())
}

#[cfg_attr(not(feature = "audio-device"), allow(dead_code))]
fn find_clip(dir: &Path, cue: &str) -> Result<PathBuf> {
    for ext in ["wav", "ogg", "mp3"] {
        let path = dir.join(format!("{cue}.{ext}"));
        if fs::metadata(&path).is_ok() {
            return Ok(path);
        }
    }
    bail!("no clip for cue `{cue}` in {}", dir.display())
}

fn run_session<B: AudioBackend>(
    cli: &Cli,
    config: SessionConfig,
    inventory: SceneInventory,
    player: &PlayerSettings,
    backend: B,
) -> Result<SessionSummary> {
    let participant_id = cli
        .participant
        .clone()
        .unwrap_or_else(generate_participant_id);
    let sink: Box<dyn TelemetrySink> = match (&cli.telemetry_file, &cli.telemetry_url) {
        (Some(path), _) => Box::new(
            JsonLinesSink::append_to(path)
                .with_context(|| format!("opening telemetry file {}", path.display()))?,
        ),
        (None, Some(url)) => Box::new(HttpTelemetrySink::new(
            HttpPoster::start(url).context("starting telemetry client")?,
        )),
        (None, None) => Box::new(DiscardSink),
    };
    let robot: Box<dyn RobotAdvisor> = match &cli.robot_url {
        Some(url) => Box::new(HttpRobotAdvisor::new(
            HttpPoster::start(url).context("starting robot client")?,
        )),
        None => Box::new(NoRobot),
    };
    let ports = Ports {
        presentation: Box::new(LogPresentation::new()),
        panel: Box::new(LogPanel::new()),
        robot,
        host: Box::new(LogHost::new()),
    };

    info!(participant = %participant_id, strategy = ?cli.strategy, "starting headless session");
    let orchestrator = RoundOrchestrator::new(
        config,
        inventory,
        ports,
        TelemetryEmitter::new(sink, participant_id),
        defusal::sfx::cue_controller(backend),
    )
    .with_player_settings(player);

    let reaction = Duration::try_from_secs_f64(cli.reaction_seconds)
        .context("--reaction-seconds must be a non-negative number")?;
    let mut participant = ScriptedParticipant::new(cli.strategy, reaction, fixed_step(cli.fps));
    let mut runner = HeadlessRunner::new(orchestrator);
    runner.simulation_mut().start();
    let frames =
        runner.run_until_finished(cli.max_frames, |_, session| participant.next_frame(session));

    let mut orchestrator = runner.into_inner();
    if !engine::Simulation::is_finished(&orchestrator) {
        orchestrator.shutdown();
        bail!("session did not finish within {frames} frames");
    }
    info!(
        frames,
        delivered = orchestrator.telemetry().delivered(),
        failed = orchestrator.telemetry().failed(),
        "headless session finished"
    );
    Ok(*orchestrator.summary())
}
