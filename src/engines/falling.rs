use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, info};

use crate::atlas::TextureId;
use crate::config::FallingConfig;
use crate::geometry::Quad;
use crate::landmarks::LandmarkSnapshot;
use crate::regions::Region;

use super::SpriteDraw;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallingState {
    Falling,
    Exhausted,
}

/// What a single frame of the falling game produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FallingOutcome {
    Draw(SpriteDraw),
    /// The open mouth caught the sprite; the fall restarts from the top.
    Caught { repeats: u32 },
    /// No face or lip landmarks this frame; nothing drawn, nothing counted.
    NotCatchable,
    Exhausted,
}

/// A single texture falling from the top of the surface, over and over,
/// until it has fallen `total_repeats` times or been caught that often.
#[derive(Debug)]
pub struct FallingEngine {
    texture: TextureId,
    quad: Quad,
    started_at: Instant,
    repeats_so_far: u32,
    total_repeats: u32,
    fall_duration: Duration,
    scale: f32,
    mouth_open_threshold: f32,
    offsets: Vec<f32>,
    state: FallingState,
}

impl FallingEngine {
    /// `texture` is owned by the engine from here on; whoever replaces or
    /// drops the engine releases it.
    pub fn start<R>(
        texture: TextureId,
        quad: Quad,
        cfg: &FallingConfig,
        rng: &mut R,
        now: Instant,
    ) -> Self
    where
        R: Rng + ?Sized,
    {
        let range = cfg.horizontal_range;
        let offsets = (0..cfg.total_repeats)
            .map(|_| {
                if range > 0.0 {
                    rng.random_range(-range..=range)
                } else {
                    0.0
                }
            })
            .collect();
        info!(
            total_repeats = cfg.total_repeats,
            fall_duration = ?cfg.fall_duration,
            "falling_game_started"
        );
        Self {
            texture,
            quad,
            started_at: now,
            repeats_so_far: 0,
            total_repeats: cfg.total_repeats,
            fall_duration: cfg.fall_duration,
            scale: cfg.scale,
            mouth_open_threshold: cfg.mouth_open_threshold,
            offsets,
            state: FallingState::Falling,
        }
    }

    pub fn texture(&self) -> TextureId {
        self.texture
    }

    pub fn state(&self) -> FallingState {
        self.state
    }

    pub fn repeats(&self) -> u32 {
        self.repeats_so_far
    }

    pub fn offsets(&self) -> &[f32] {
        &self.offsets
    }

    /// Seconds into the current fall and the repeat it belongs to.
    fn progress(&self, now: Instant) -> (f32, u32) {
        let elapsed = now.saturating_duration_since(self.started_at).as_secs_f32();
        let period = self.fall_duration.as_secs_f32();
        let t = elapsed.rem_euclid(period);
        let current = (elapsed / period).floor() as u32 + self.repeats_so_far;
        (t, current)
    }

    /// Vertical center of the sprite: 1.0 at the top, -1.0 at the bottom.
    pub fn fall_y(&self, now: Instant) -> f32 {
        let (t, _) = self.progress(now);
        1.0 - t / self.fall_duration.as_secs_f32() * 2.0
    }

    pub fn frame(&mut self, landmarks: &LandmarkSnapshot, now: Instant) -> FallingOutcome {
        if self.state == FallingState::Exhausted {
            return FallingOutcome::Exhausted;
        }

        let (_, current) = self.progress(now);
        if current >= self.total_repeats {
            self.state = FallingState::Exhausted;
            info!(repeats = current, "falling_game_exhausted");
            return FallingOutcome::Exhausted;
        }

        let Some(gap) = landmarks.mouth_gap() else {
            return FallingOutcome::NotCatchable;
        };

        let offset_x = self.offsets.get(current as usize).copied().unwrap_or(0.0);
        let center = self.quad.center();
        let falling = self
            .quad
            .translated(offset_x - center.x, self.fall_y(now) - center.y);

        if gap > self.mouth_open_threshold {
            if let Some(mouth) = landmarks.region_bounds(Region::MouthInside) {
                if falling.bounds().intersects(&mouth) {
                    self.repeats_so_far = current + 1;
                    self.started_at = now;
                    debug!(repeats = self.repeats_so_far, "falling_sprite_caught");
                    return FallingOutcome::Caught {
                        repeats: self.repeats_so_far,
                    };
                }
            }
        }

        FallingOutcome::Draw(SpriteDraw {
            texture: self.texture,
            quad: falling,
            scale: self.scale,
        })
    }
}
