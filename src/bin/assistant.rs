//! assistant - run the detection pipeline against a configured frame source
//!
//! Loads configuration (file + environment), binds the source while
//! "visible", and renders the presentation label until the run ends or
//! Ctrl-C is pressed.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pedestrian_assistant::ui::Ui;
use pedestrian_assistant::{
    open_source, AssistantConfig, BackendRegistry, DetectionPipeline, DetectorEngine,
    DetectorEvent,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (JSON, or TOML for .toml). Defaults to $PEDESTRIAN_CONFIG.
    #[arg(long, env = "PEDESTRIAN_CONFIG")]
    config: Option<PathBuf>,
    /// Run time in seconds; 0 runs until Ctrl-C.
    #[arg(long, default_value_t = 10)]
    seconds: u64,
    /// Override the source frame rate.
    #[arg(long)]
    fps: Option<u32>,
    /// Override the detector backend (see --list-backends).
    #[arg(long)]
    backend: Option<String>,
    /// Override the source URI (stub://name or an image directory).
    #[arg(long)]
    source: Option<String>,
    /// Simulate the host leaving the foreground after N seconds, then resume.
    #[arg(long)]
    pause_after: Option<u64>,
    /// Print available detector backends and exit.
    #[arg(long)]
    list_backends: bool,
    /// Output mode: plain or pretty (default: pretty on a terminal).
    #[arg(long)]
    ui: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let registry = BackendRegistry::with_builtin();
    if args.list_backends {
        for name in registry.list() {
            println!("{name}");
        }
        return Ok(());
    }

    let ui = Ui::from_flag(args.ui.as_deref(), std::io::stdout().is_terminal());

    let mut config = AssistantConfig::load_from(args.config.as_deref())?;
    if let Some(backend) = args.backend {
        config.backend = backend;
    }
    if let Some(source) = args.source {
        config.source.uri = source;
    }
    if let Some(fps) = args.fps {
        if fps == 0 {
            return Err(anyhow!("fps must be >= 1"));
        }
        config.source.target_fps = fps;
    }

    let (mut pipeline, detector) = {
        let _stage = ui.stage("Preparing detector");
        let backend = registry.create(&config.backend)?;
        let mut engine = DetectorEngine::from_boxed(config.detector.clone(), backend);
        // Eager load surfaces model problems before the first frame; a failure
        // here is retried lazily by the worker. A CPU fallback is reported by
        // the worker's first event.
        if let Err(err) = engine.initialize() {
            log::error!("detector unavailable: {}", err);
        }
        let detector = format!(
            "{} backend (delegate {}, threshold {})",
            engine.backend_name(),
            engine.settings().delegate(),
            engine.settings().confidence_threshold()
        );
        let source = open_source(&config.source)
            .with_context(|| format!("failed to open source {}", config.source.uri))?;
        let pipeline = DetectionPipeline::from_boxed(engine, source).with_listener(|event| {
            match event {
                DetectorEvent::Error(err) => log::debug!("detection error: {}", err),
                DetectorEvent::Fallback {
                    requested,
                    used,
                    reason,
                } => log::warn!("using {} delegate instead of {}: {}", used, requested, reason),
                DetectorEvent::Results(_) => {}
            }
        });
        (pipeline, detector)
    };

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))
        .context("failed to install Ctrl-C handler")?;

    let presentation = pipeline.presentation();
    let mut view = ui.label_view();
    let started = Instant::now();
    let deadline = (args.seconds > 0).then(|| started + Duration::from_secs(args.seconds));
    let mut pause_at = args.pause_after.map(|secs| started + Duration::from_secs(secs));

    pipeline.resume()?;
    log::info!("watching {} with {}", pipeline.source_name(), detector);

    let mut version = presentation.snapshot().version;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if deadline.is_some_and(|deadline| now >= deadline) {
            break;
        }
        if pause_at.is_some_and(|at| now >= at) {
            pause_at = None;
            pipeline.pause()?;
            log::info!("paused; resuming in 1s");
            std::thread::sleep(Duration::from_secs(1));
            pipeline.resume()?;
        }
        if let Some(snapshot) = presentation.wait_for_change(version, Duration::from_millis(200)) {
            version = snapshot.version;
            view.show(&snapshot);
        }
    }
    view.finish();

    let stats = pipeline.stats();
    pipeline.shutdown()?;
    println!(
        "frames: received={} processed={} failed={} dropped={} rejected={} discarded={}",
        stats.frames_received,
        stats.frames_processed,
        stats.frames_failed,
        stats.frames_dropped,
        stats.frames_rejected,
        stats.results_discarded
    );
    Ok(())
}
