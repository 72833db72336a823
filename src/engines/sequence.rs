use tracing::debug;

use crate::config::SequenceConfig;
use crate::regions::Region;

use super::{RegionTextures, SpriteDraw};

#[derive(Debug, Clone, Copy, PartialEq)]
struct RegionRuntime {
    offset: f32,
    stopped: bool,
    visible: bool,
}

/// Regions drop one after another, each from above the surface until it
/// falls out of view or is stopped.
#[derive(Debug)]
pub struct SequenceEngine {
    order: Vec<Region>,
    runtime: Vec<RegionRuntime>,
    index: usize,
    falling: bool,
    start_offset: f32,
    step: f32,
    hide_below: f32,
    scale: f32,
}

impl SequenceEngine {
    pub fn new(cfg: &SequenceConfig) -> Self {
        let mut engine = Self {
            order: cfg.order.clone(),
            runtime: Vec::new(),
            index: 0,
            falling: false,
            start_offset: cfg.start_offset,
            step: cfg.step,
            hide_below: cfg.hide_below,
            scale: cfg.scale,
        };
        engine.reset();
        engine
    }

    /// Every region back above the surface, visible, and the index at zero.
    pub fn reset(&mut self) {
        self.index = 0;
        self.falling = false;
        self.runtime = vec![
            RegionRuntime {
                offset: self.start_offset,
                stopped: false,
                visible: true,
            };
            self.order.len()
        ];
    }

    /// Drops the region at the current index. Returns it, or `None` once the
    /// sequence has run past its last region.
    pub fn start_next(&mut self) -> Option<Region> {
        let region = *self.order.get(self.index)?;
        self.runtime[self.index] = RegionRuntime {
            offset: self.start_offset,
            stopped: false,
            visible: true,
        };
        self.falling = true;
        debug!(region = %region, index = self.index, "sequence_region_started");
        Some(region)
    }

    /// Halts the falling region where it is, then moves on to the next one.
    pub fn stop_current(&mut self) -> Option<Region> {
        let region = *self.order.get(self.index)?;
        self.runtime[self.index].stopped = true;
        self.falling = false;
        self.index += 1;
        self.start_next();
        Some(region)
    }

    pub fn current_index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> Option<Region> {
        self.order.get(self.index).copied()
    }

    pub fn is_falling(&self) -> bool {
        self.falling
    }

    pub fn is_finished(&self) -> bool {
        self.index >= self.order.len()
    }

    pub fn offset_of(&self, region: Region) -> Option<f32> {
        self.position(region).map(|i| self.runtime[i].offset)
    }

    pub fn is_visible(&self, region: Region) -> bool {
        self.position(region)
            .is_some_and(|i| self.runtime[i].visible)
    }

    fn position(&self, region: Region) -> Option<usize> {
        self.order.iter().position(|r| *r == region)
    }

    /// Steps the falling region and returns every visible region with a texture.
    ///
    /// The falling region keeps moving even when its texture is missing, so a
    /// lost detection frame never stalls the sequence.
    pub fn frame(&mut self, textures: &impl RegionTextures) -> Vec<SpriteDraw> {
        let mut draws = Vec::with_capacity(self.order.len());
        for (i, region) in self.order.iter().enumerate() {
            let state = self.runtime[i];
            if !state.visible {
                continue;
            }
            if let Some((texture, quad)) = textures.lookup(*region) {
                draws.push(SpriteDraw {
                    texture,
                    quad: quad.translated(0.0, state.offset),
                    scale: self.scale,
                });
            }
        }
        self.step_falling();
        draws
    }

    fn step_falling(&mut self) {
        if !self.falling {
            return;
        }
        let Some(state) = self.runtime.get_mut(self.index) else {
            self.falling = false;
            return;
        };
        if state.stopped {
            return;
        }
        state.offset -= self.step;
        if state.offset < self.hide_below {
            state.visible = false;
            self.falling = false;
            debug!(index = self.index, "sequence_region_hidden");
            self.index += 1;
            self.start_next();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::TextureId;
    use crate::geometry::{NdcPoint, Quad};
    use std::collections::HashMap;

    fn textures(order: &[Region]) -> HashMap<Region, (TextureId, Quad)> {
        order
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let quad = Quad::from_corners(
                    NdcPoint::new(-0.1, 0.1),
                    NdcPoint::new(0.1, 0.1),
                    NdcPoint::new(0.1, -0.1),
                    NdcPoint::new(-0.1, -0.1),
                );
                (*r, (TextureId(i as u64 + 1), quad))
            })
            .collect()
    }

    #[test]
    fn stopping_visits_each_region_once_in_order() {
        let cfg = SequenceConfig::default();
        let mut engine = SequenceEngine::new(&cfg);
        engine.reset();
        assert_eq!(engine.start_next(), Some(cfg.order[0]));

        let mut visited = Vec::new();
        for _ in 0..cfg.order.len() {
            visited.push(engine.stop_current().unwrap());
        }
        assert_eq!(visited, cfg.order);
        assert_eq!(engine.current_index(), cfg.order.len());
        assert!(engine.is_finished());
        assert_eq!(engine.stop_current(), None);
        assert_eq!(engine.start_next(), None);
    }

    #[test]
    fn regions_fall_out_of_view_and_advance() {
        let cfg = SequenceConfig {
            step: 1.0,
            ..SequenceConfig::default()
        };
        let atlas = textures(&cfg.order);
        let mut engine = SequenceEngine::new(&cfg);
        engine.start_next();

        // 2.0 -> 1.0 -> 0.0 -> -1.0 -> -2.0 -> -3.0 (hidden on the fifth step).
        for _ in 0..5 {
            engine.frame(&atlas);
        }
        assert!(!engine.is_visible(cfg.order[0]));
        assert_eq!(engine.current_index(), 1);
        assert!(engine.is_falling());
        assert_eq!(engine.offset_of(cfg.order[1]), Some(2.0));

        let draws = engine.frame(&atlas);
        assert_eq!(draws.len(), cfg.order.len() - 1);
        assert!(draws.iter().all(|d| (d.scale - 0.8).abs() < f32::EPSILON));
    }

    #[test]
    fn stopped_region_stays_where_it_halted() {
        let cfg = SequenceConfig::default();
        let atlas = textures(&cfg.order);
        let mut engine = SequenceEngine::new(&cfg);
        engine.start_next();
        for _ in 0..50 {
            engine.frame(&atlas);
        }
        let first = cfg.order[0];
        let halted = engine.offset_of(first).unwrap();
        engine.stop_current();
        for _ in 0..50 {
            engine.frame(&atlas);
        }
        assert_eq!(engine.offset_of(first), Some(halted));
        assert!(engine.is_visible(first));
        assert!(engine.offset_of(cfg.order[1]).unwrap() < 2.0);
    }

    #[test]
    fn reset_restores_every_region() {
        let cfg = SequenceConfig::default();
        let mut engine = SequenceEngine::new(&cfg);
        engine.start_next();
        engine.stop_current();
        engine.stop_current();
        engine.reset();
        assert_eq!(engine.current_index(), 0);
        assert!(!engine.is_falling());
        for region in &cfg.order {
            assert_eq!(engine.offset_of(*region), Some(2.0));
            assert!(engine.is_visible(*region));
        }
    }

    #[test]
    fn missing_textures_do_not_stall_the_fall() {
        let cfg = SequenceConfig {
            step: 1.0,
            ..SequenceConfig::default()
        };
        let mut engine = SequenceEngine::new(&cfg);
        engine.start_next();
        let empty: HashMap<Region, (TextureId, Quad)> = HashMap::new();
        for _ in 0..5 {
            assert!(engine.frame(&empty).is_empty());
        }
        assert_eq!(engine.current_index(), 1);
    }
}
