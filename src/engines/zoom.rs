use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::ZoomConfig;
use crate::regions::Region;

use super::{RegionTextures, SpriteDraw};

/// Pulses one region's scale back and forth; advancing freezes it at its
/// last scale and moves on to the next region.
#[derive(Debug)]
pub struct ZoomEngine {
    order: Vec<Region>,
    index: usize,
    zooming: bool,
    started_at: Instant,
    duration: Duration,
    initial_from: f32,
    initial_to: f32,
    scale_from: f32,
    scale_to: f32,
    repeat_count: u32,
    max_repeats: u32,
    loop_forever: bool,
    next_max_repeats: u32,
    next_loop_forever: bool,
    last_scale: f32,
    final_scales: Vec<(Region, f32)>,
}

impl ZoomEngine {
    pub fn start(cfg: &ZoomConfig, now: Instant) -> Self {
        let mut engine = Self {
            order: cfg.order.clone(),
            index: 0,
            zooming: false,
            started_at: now,
            duration: cfg.cycle,
            initial_from: cfg.scale_from,
            initial_to: cfg.scale_to,
            scale_from: cfg.scale_from,
            scale_to: cfg.scale_to,
            repeat_count: 0,
            max_repeats: cfg.max_repeats,
            loop_forever: cfg.loop_forever,
            next_max_repeats: cfg.next_max_repeats,
            next_loop_forever: cfg.next_loop_forever,
            last_scale: cfg.scale_from,
            final_scales: Vec::new(),
        };
        engine.begin_region(now);
        engine
    }

    fn begin_region(&mut self, now: Instant) {
        self.zooming = !self.order.is_empty() && self.index < self.order.len();
        self.started_at = now;
        self.scale_from = self.initial_from;
        self.scale_to = self.initial_to;
        self.repeat_count = 0;
        self.last_scale = self.initial_from;
        if let Some(region) = self.current() {
            debug!(region = %region, index = self.index, "zoom_region_started");
        }
    }

    /// Freezes the current region and starts the next one with the
    /// `next_*` repeat settings. The index always moves forward, even past
    /// the end of the order.
    pub fn advance(&mut self, now: Instant) {
        self.zooming = false;
        if let Some(region) = self.current() {
            self.set_final_scale(region, self.last_scale);
            if self.index + 1 < self.order.len() {
                self.index += 1;
                self.max_repeats = self.next_max_repeats;
                self.loop_forever = self.next_loop_forever;
                self.begin_region(now);
                return;
            }
        }
        self.index += 1;
    }

    fn set_final_scale(&mut self, region: Region, scale: f32) {
        match self.final_scales.iter_mut().find(|(r, _)| *r == region) {
            Some(entry) => entry.1 = scale,
            None => self.final_scales.push((region, scale)),
        }
    }

    pub fn current(&self) -> Option<Region> {
        self.order.get(self.index).copied()
    }

    pub fn current_index(&self) -> usize {
        self.index
    }

    pub fn is_zooming(&self) -> bool {
        self.zooming
    }

    pub fn repeat_count(&self) -> u32 {
        self.repeat_count
    }

    pub fn last_scale(&self) -> f32 {
        self.last_scale
    }

    pub fn final_scale(&self, region: Region) -> Option<f32> {
        self.final_scales
            .iter()
            .find(|(r, _)| *r == region)
            .map(|(_, s)| *s)
    }

    /// Advances the pulse and returns the settled regions followed by the
    /// one currently zooming. A region whose pulse ran out is hidden until
    /// `advance` settles it.
    pub fn frame(&mut self, textures: &impl RegionTextures, now: Instant) -> Vec<SpriteDraw> {
        self.tick(now);

        let mut draws = Vec::with_capacity(self.final_scales.len() + 1);
        for (region, scale) in &self.final_scales {
            if let Some((texture, quad)) = textures.lookup(*region) {
                draws.push(SpriteDraw {
                    texture,
                    quad,
                    scale: *scale,
                });
            }
        }

        if let Some(region) = self.current().filter(|_| self.zooming) {
            if self.final_scale(region).is_none() {
                if let Some((texture, quad)) = textures.lookup(region) {
                    draws.push(SpriteDraw {
                        texture,
                        quad,
                        scale: self.last_scale,
                    });
                }
            }
        }
        draws
    }

    fn tick(&mut self, now: Instant) {
        if !self.zooming {
            return;
        }
        let elapsed = now.saturating_duration_since(self.started_at).as_secs_f32();
        let t = (elapsed / self.duration.as_secs_f32()).clamp(0.0, 1.0);

        if t >= 1.0 {
            self.last_scale = self.scale_to;
            self.repeat_count += 1;
            if !self.loop_forever && self.repeat_count >= self.max_repeats {
                self.zooming = false;
                debug!(repeats = self.repeat_count, "zoom_region_settled");
                return;
            }
            std::mem::swap(&mut self.scale_from, &mut self.scale_to);
            self.started_at = now;
            return;
        }

        self.last_scale = self.scale_from + (self.scale_to - self.scale_from) * t;
    }
}
