//! Timed animation state machines driven once per rendered frame.
//!
//! Engines never touch the GPU. They read region bindings through
//! [`RegionTextures`] and describe what to draw as [`SpriteDraw`]s; every
//! method that depends on time takes `now` explicitly.

pub mod falling;
pub mod sequence;
pub mod zoom;

use std::collections::HashMap;

use crate::atlas::{TextureAtlas, TextureBackend, TextureId};
use crate::geometry::Quad;
use crate::regions::Region;

pub use falling::{FallingEngine, FallingOutcome};
pub use sequence::SequenceEngine;
pub use zoom::ZoomEngine;

/// One textured quad to draw, scaled about its own center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpriteDraw {
    pub texture: TextureId,
    pub quad: Quad,
    pub scale: f32,
}

impl SpriteDraw {
    /// Final corner positions after scaling.
    pub fn placed_quad(&self) -> Quad {
        self.quad.scaled(self.scale)
    }
}

/// Read access to the current region bindings.
pub trait RegionTextures {
    fn lookup(&self, region: Region) -> Option<(TextureId, Quad)>;
}

impl<B: TextureBackend> RegionTextures for TextureAtlas<B> {
    fn lookup(&self, region: Region) -> Option<(TextureId, Quad)> {
        self.get(region)
    }
}

impl RegionTextures for HashMap<Region, (TextureId, Quad)> {
    fn lookup(&self, region: Region) -> Option<(TextureId, Quad)> {
        self.get(&region).copied()
    }
}

/// The single game being played, if any. Switching games is one assignment.
#[derive(Debug, Default)]
pub enum ActiveEngine {
    #[default]
    None,
    Falling(FallingEngine),
    Sequence(SequenceEngine),
    Zoom(ZoomEngine),
}

impl ActiveEngine {
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Falling(_) => "falling",
            Self::Sequence(_) => "sequence",
            Self::Zoom(_) => "zoom",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// The full-face backdrop is only shown under the region games.
    pub fn shows_face_backdrop(&self) -> bool {
        matches!(self, Self::Sequence(_) | Self::Zoom(_))
    }
}
