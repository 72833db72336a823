use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use facemash::atlas::MemoryTextures;
use facemash::compositor::Compositor;
use facemash::config::Configuration;
use facemash::events::{CommandReceiver, DetectionFrame, RenderCommand, command_queue};
use facemash::geometry::SurfaceSize;
use facemash::landmarks::LandmarkStore;
use facemash::render::{ViewerInputs, run_windowed};
use facemash::tasks::{detection, replay};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Game {
    Falling,
    Sequence,
    Zoom,
}

impl Game {
    fn start_command(self) -> RenderCommand {
        match self {
            Game::Falling => RenderCommand::StartFalling,
            Game::Sequence => RenderCommand::StartSequence,
            Game::Zoom => RenderCommand::StartZoom,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "facemash",
    version,
    about = "face-region overlay compositor and mini-games"
)]
struct Args {
    /// Path to YAML config
    #[arg(value_name = "CONFIG")]
    config: PathBuf,
    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Deterministic RNG seed for the falling game
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,
    /// Plan N frames without opening a window, then exit
    #[arg(long = "headless-frames", value_name = "N")]
    headless_frames: Option<u64>,
    /// Game to start once the first face regions arrive
    #[arg(long, value_enum)]
    game: Option<Game>,
}

fn default_filter(verbose: u8) -> EnvFilter {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    EnvFilter::new(format!("{level},wgpu=warn,wgpu_core=warn,wgpu_hal=warn,naga=warn,winit=warn"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let Args {
        config,
        verbose,
        seed,
        headless_frames,
        game,
    } = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbose)))
        .with_target(false)
        .compact()
        .init();

    let mut cfg = Configuration::from_yaml_file(&config)
        .with_context(|| format!("failed to load configuration from {}", config.display()))?
        .validated()
        .context("invalid configuration values")?;
    if seed.is_some() {
        cfg.games.falling.seed = seed;
    }
    tracing::debug!("Loaded configuration from {}:\n{:#?}", config.display(), cfg);

    let manifest = replay::Manifest::from_file(&cfg.source.manifest).with_context(|| {
        format!("failed to read manifest {}", cfg.source.manifest.display())
    })?;
    let frames = replay::load_frames(&manifest, cfg.camera_facing)?;
    tracing::info!(frames = frames.len(), facing = %cfg.camera_facing, "replay frames loaded");

    // Source -> Detection keeps only the newest frame
    let (frame_tx, frame_rx) = watch::channel::<Option<DetectionFrame>>(None);
    let (queue, commands) = command_queue(cfg.render.command_queue_capacity);
    let landmarks = Arc::new(LandmarkStore::new());
    let [width, height] = cfg.render.window_size;
    let surface_size = Arc::new(SurfaceSize::new(width, height));

    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    let mut tasks = JoinSet::new();

    tasks.spawn({
        let source = cfg.source.clone();
        let cancel = cancel.clone();
        async move {
            replay::run(frames, source, frame_tx, cancel)
                .await
                .context("replay task failed")
        }
    });

    tasks.spawn({
        let outputs = detection::DetectionOutputs {
            queue: queue.clone(),
            landmarks: landmarks.clone(),
            surface: surface_size.clone(),
        };
        let extraction = cfg.extraction.clone();
        let cancel = cancel.clone();
        async move {
            detection::run(frame_rx, outputs, extraction, cancel)
                .await
                .context("detection task failed")
        }
    });

    let outcome = match headless_frames {
        Some(count) => run_headless(&cfg, commands, landmarks, count, game, &cancel)
            .await
            .context("headless run failed"),
        None => {
            let inputs = ViewerInputs {
                commands,
                queue: queue.clone(),
                landmarks,
                surface_size,
                initial_game: game.map(Game::start_command),
            };
            run_windowed(cfg.clone(), inputs, cancel.clone()).context("viewer failed")
        }
    };
    if let Err(e) = outcome {
        tracing::error!("{e:?}");
    }
    cancel.cancel();

    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("task error: {e:?}"),
            Err(e) => tracing::error!("join error: {e}"),
        }
    }

    Ok(())
}

/// Drives the compositor against in-memory textures at the configured frame
/// rate. Useful for exercising the pipeline on machines without a GPU.
async fn run_headless(
    cfg: &Configuration,
    commands: CommandReceiver,
    landmarks: Arc<LandmarkStore>,
    frames: u64,
    game: Option<Game>,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut compositor = Compositor::new(MemoryTextures::new(), cfg, landmarks);
    if let Some(game) = game {
        compositor.queue_game(game.start_command());
    }
    let mut ticker = interval(cfg.render.frame_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    for frame in 0..frames {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let now = Instant::now();
        compositor.drain_commands(&commands, now);
        let plan = compositor.plan_frame(now);
        tracing::trace!(
            frame,
            engine = compositor.engine().name(),
            sprites = plan.sprites.len(),
            camera = plan.camera.is_some(),
            "frame_planned"
        );
    }

    let stats = compositor.stats();
    tracing::info!(
        frames = stats.frames_planned,
        commands = stats.commands_applied,
        upload_failures = stats.uploads_failed,
        regions = compositor.atlas().len(),
        live_textures = compositor.backend().live(),
        engine = compositor.engine().name(),
        "headless run finished"
    );
    Ok(())
}
