//! Render-thread owner of the atlas and the active game.
//!
//! The compositor applies queued commands, then turns the current state into
//! a [`FramePlan`]: an ordered, GPU-agnostic list of what to draw. The wgpu
//! viewer and the headless runner both consume the same plan.

use std::sync::Arc;
use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::atlas::{TextureAtlas, TextureBackend, TextureId};
use crate::config::{Configuration, GamesConfig};
use crate::engines::{
    ActiveEngine, FallingEngine, FallingOutcome, SequenceEngine, SpriteDraw, ZoomEngine,
};
use crate::events::{CameraFrame, CommandReceiver, RenderCommand};
use crate::geometry::{NdcPoint, Quad};
use crate::landmarks::LandmarkStore;
use crate::regions::Region;

/// Everything to draw for one frame, back to front.
#[derive(Debug, Clone, Default)]
pub struct FramePlan {
    pub camera: Option<(TextureId, Quad)>,
    pub debug_points: Vec<NdcPoint>,
    /// Outer mouth outline, filled translucent red.
    pub debug_mouth: Option<Vec<NdcPoint>>,
    pub backdrop: Option<SpriteDraw>,
    pub sprites: Vec<SpriteDraw>,
}

impl FramePlan {
    /// Textured draws in painter's order, camera first.
    pub fn textured(&self) -> impl Iterator<Item = SpriteDraw> + '_ {
        let camera = self.camera.map(|(texture, quad)| SpriteDraw {
            texture,
            quad,
            scale: 1.0,
        });
        camera
            .into_iter()
            .chain(self.backdrop)
            .chain(self.sprites.iter().copied())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompositorStats {
    pub frames_planned: u64,
    pub commands_applied: u64,
    pub uploads_failed: u64,
}

pub struct Compositor<B: TextureBackend> {
    atlas: TextureAtlas<B>,
    engine: ActiveEngine,
    games: GamesConfig,
    landmarks: Arc<LandmarkStore>,
    rng: StdRng,
    camera: Option<(TextureId, Quad)>,
    pending_game: Option<RenderCommand>,
    debug_landmarks: bool,
    debug_mouth_fill: bool,
    stats: CompositorStats,
}

impl<B: TextureBackend> Compositor<B> {
    pub fn new(backend: B, cfg: &Configuration, landmarks: Arc<LandmarkStore>) -> Self {
        let rng = match cfg.games.falling.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            atlas: TextureAtlas::new(backend),
            engine: ActiveEngine::None,
            games: cfg.games.clone(),
            landmarks,
            rng,
            camera: None,
            pending_game: None,
            debug_landmarks: cfg.render.debug_landmarks,
            debug_mouth_fill: cfg.render.debug_mouth_fill,
            stats: CompositorStats::default(),
        }
    }

    pub fn atlas(&self) -> &TextureAtlas<B> {
        &self.atlas
    }

    pub fn backend(&self) -> &B {
        self.atlas.backend()
    }

    pub fn backend_mut(&mut self) -> &mut B {
        self.atlas.backend_mut()
    }

    pub fn engine(&self) -> &ActiveEngine {
        &self.engine
    }

    pub fn stats(&self) -> CompositorStats {
        self.stats
    }

    pub fn debug_enabled(&self) -> (bool, bool) {
        (self.debug_landmarks, self.debug_mouth_fill)
    }

    /// Holds a game start until the atlas has what it needs: the mouth for
    /// the falling game, any region for the others.
    pub fn queue_game(&mut self, start: RenderCommand) {
        debug!(start = start.name(), "game_start_pending");
        self.pending_game = Some(start);
    }

    pub fn has_pending_game(&self) -> bool {
        self.pending_game.is_some()
    }

    fn start_pending_game(&mut self, now: Instant) {
        let ready = match &self.pending_game {
            None => return,
            Some(RenderCommand::StartFalling) => self.atlas.entry(Region::Mouth).is_some(),
            Some(_) => self.atlas.has_any(),
        };
        if !ready {
            return;
        }
        if let Some(start) = self.pending_game.take() {
            info!(start = start.name(), "starting_pending_game");
            self.apply(start, now);
        }
    }

    /// Applies every queued command in order. Returns how many ran.
    pub fn drain_commands(&mut self, rx: &CommandReceiver, now: Instant) -> usize {
        let commands = rx.drain();
        let count = commands.len();
        for cmd in commands {
            self.apply(cmd, now);
        }
        count
    }

    pub fn apply(&mut self, cmd: RenderCommand, now: Instant) {
        self.stats.commands_applied += 1;
        if cmd.replaces_game() {
            self.pending_game = None;
        }
        match cmd {
            RenderCommand::UpsertRegion(tex) => {
                let region = tex.region;
                if let Err(err) = self.atlas.upsert(region, tex.image, tex.quad) {
                    self.stats.uploads_failed += 1;
                    warn!(region = %region, error = %err, "region_upload_failed");
                }
            }
            RenderCommand::ClearRegions => self.atlas.clear(),
            RenderCommand::CameraFrame(frame) => self.replace_camera(frame),
            RenderCommand::StartFalling => self.start_falling(now),
            RenderCommand::StartSequence => {
                let mut engine = SequenceEngine::new(&self.games.sequence);
                engine.start_next();
                self.set_engine(ActiveEngine::Sequence(engine));
            }
            RenderCommand::StartZoom => {
                let engine = ZoomEngine::start(&self.games.zoom, now);
                self.set_engine(ActiveEngine::Zoom(engine));
            }
            RenderCommand::Advance => match &mut self.engine {
                ActiveEngine::Sequence(engine) => {
                    engine.stop_current();
                }
                ActiveEngine::Zoom(engine) => engine.advance(now),
                other => debug!(engine = other.name(), "advance_ignored"),
            },
            RenderCommand::ResetSequence => match &mut self.engine {
                ActiveEngine::Sequence(engine) => {
                    engine.reset();
                    engine.start_next();
                }
                other => debug!(engine = other.name(), "reset_ignored"),
            },
            RenderCommand::StopGame => self.set_engine(ActiveEngine::None),
            RenderCommand::ToggleDebug => {
                let on = !(self.debug_landmarks || self.debug_mouth_fill);
                self.debug_landmarks = on;
                self.debug_mouth_fill = on;
                info!(enabled = on, "debug_overlays_toggled");
            }
        }
    }

    fn replace_camera(&mut self, frame: CameraFrame) {
        match self.atlas.create_detached(&frame.image) {
            Ok(texture) => {
                if let Some((old, _)) = self.camera.replace((texture, frame.quad)) {
                    self.atlas.release_detached(old);
                }
            }
            Err(err) => {
                self.stats.uploads_failed += 1;
                warn!(error = %err, "camera_upload_failed");
            }
        }
    }

    fn start_falling(&mut self, now: Instant) {
        let Some(entry) = self.atlas.entry(Region::Mouth).cloned() else {
            debug!("falling_start_ignored_without_mouth");
            return;
        };
        match self.atlas.create_detached(&entry.image) {
            Ok(texture) => {
                let engine = FallingEngine::start(
                    texture,
                    entry.quad,
                    &self.games.falling,
                    &mut self.rng,
                    now,
                );
                self.set_engine(ActiveEngine::Falling(engine));
            }
            Err(err) => {
                self.stats.uploads_failed += 1;
                warn!(error = %err, "falling_snapshot_failed");
            }
        }
    }

    fn set_engine(&mut self, next: ActiveEngine) {
        let previous = std::mem::replace(&mut self.engine, next);
        if let ActiveEngine::Falling(engine) = &previous {
            self.atlas.release_detached(engine.texture());
        }
        debug!(
            from = previous.name(),
            to = self.engine.name(),
            "active_engine_changed"
        );
    }

    /// Steps the active game and collects this frame's draws.
    pub fn plan_frame(&mut self, now: Instant) -> FramePlan {
        self.start_pending_game(now);
        self.stats.frames_planned += 1;
        let landmarks = self.landmarks.snapshot();
        let mut plan = FramePlan {
            camera: self.camera,
            ..FramePlan::default()
        };

        if !landmarks.is_empty() {
            if self.debug_landmarks {
                plan.debug_points = landmarks.points().to_vec();
            }
            if self.debug_mouth_fill {
                let outline = landmarks.region_points(Region::MouthOutside);
                if outline.len() >= 3 {
                    plan.debug_mouth = Some(outline);
                }
            }
            if self.engine.shows_face_backdrop() && self.atlas.has_any() {
                plan.backdrop = self
                    .atlas
                    .get(Region::FullFace)
                    .map(|(texture, quad)| SpriteDraw {
                        texture,
                        quad,
                        scale: 1.0,
                    });
            }
        }

        let mut exhausted = false;
        match &mut self.engine {
            ActiveEngine::None => {}
            ActiveEngine::Falling(engine) => match engine.frame(&landmarks, now) {
                FallingOutcome::Draw(draw) => plan.sprites.push(draw),
                FallingOutcome::Exhausted => exhausted = true,
                FallingOutcome::Caught { .. } | FallingOutcome::NotCatchable => {}
            },
            ActiveEngine::Sequence(engine) => {
                if self.atlas.has_any() {
                    plan.sprites = engine.frame(&self.atlas);
                }
            }
            ActiveEngine::Zoom(engine) => {
                if self.atlas.has_any() {
                    plan.sprites = engine.frame(&self.atlas, now);
                }
            }
        }
        if exhausted {
            self.set_engine(ActiveEngine::None);
        }
        plan
    }
}
