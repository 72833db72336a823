//! Region textures keyed by name, plus the seam to whatever owns the pixels.

use std::collections::HashMap;
use std::sync::Arc;

use image::RgbaImage;
use tracing::{debug, warn};

use crate::error::Error;
use crate::geometry::Quad;
use crate::regions::Region;

/// Opaque handle for a texture living in a [`TextureBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

/// Creates and releases textures. Implemented by the GPU renderer and by an
/// in-memory stand-in for headless runs and tests.
pub trait TextureBackend {
    fn create(&mut self, image: &RgbaImage) -> Result<TextureId, Error>;
    /// Releasing an unknown id is a no-op.
    fn release(&mut self, id: TextureId);
}

#[derive(Debug, Clone)]
pub struct AtlasEntry {
    pub texture: TextureId,
    pub quad: Quad,
    pub image: Arc<RgbaImage>,
}

/// Live region bindings for the current frame. Render-thread only.
#[derive(Debug)]
pub struct TextureAtlas<B> {
    backend: B,
    entries: HashMap<Region, AtlasEntry>,
    has_any: bool,
}

impl<B: TextureBackend> TextureAtlas<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            entries: HashMap::new(),
            has_any: false,
        }
    }

    /// Binds `image` to `region`, releasing whatever was bound before.
    ///
    /// The new texture is created first so a failed creation leaves the
    /// previous entry in place.
    pub fn upsert(&mut self, region: Region, image: Arc<RgbaImage>, quad: Quad) -> Result<(), Error> {
        let texture = self.backend.create(&image)?;
        if let Some(old) = self.entries.remove(&region) {
            self.backend.release(old.texture);
        }
        self.entries.insert(
            region,
            AtlasEntry {
                texture,
                quad,
                image,
            },
        );
        self.has_any = true;
        Ok(())
    }

    /// Releases every handle and forgets that anything was ever bound.
    pub fn clear(&mut self) {
        let released = self.entries.len();
        for (_, entry) in self.entries.drain() {
            self.backend.release(entry.texture);
        }
        self.has_any = false;
        if released > 0 {
            debug!(released, "atlas_cleared");
        }
    }

    pub fn get(&self, region: Region) -> Option<(TextureId, Quad)> {
        self.entries
            .get(&region)
            .map(|entry| (entry.texture, entry.quad))
    }

    pub fn entry(&self, region: Region) -> Option<&AtlasEntry> {
        self.entries.get(&region)
    }

    pub fn has_any(&self) -> bool {
        self.has_any
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Creates a texture that the atlas does not track; the caller releases it.
    pub fn create_detached(&mut self, image: &RgbaImage) -> Result<TextureId, Error> {
        self.backend.create(image)
    }

    pub fn release_detached(&mut self, id: TextureId) {
        self.backend.release(id);
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

/// Texture bookkeeping without a GPU: tracks live handles and their sizes.
#[derive(Debug, Default)]
pub struct MemoryTextures {
    next_id: u64,
    live: HashMap<TextureId, (u32, u32)>,
    limit: Option<usize>,
    created: u64,
    released: u64,
}

impl MemoryTextures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuses creation once `limit` textures are live.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn live(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, id: TextureId) -> bool {
        self.live.contains_key(&id)
    }

    pub fn size_of(&self, id: TextureId) -> Option<(u32, u32)> {
        self.live.get(&id).copied()
    }

    pub fn created(&self) -> u64 {
        self.created
    }

    pub fn released(&self) -> u64 {
        self.released
    }
}

impl TextureBackend for MemoryTextures {
    fn create(&mut self, image: &RgbaImage) -> Result<TextureId, Error> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(Error::ResourceAcquisition(format!(
                "cannot create a {width}x{height} texture"
            )));
        }
        if let Some(limit) = self.limit {
            if self.live.len() >= limit {
                warn!(limit, "texture_limit_reached");
                return Err(Error::ResourceAcquisition(format!(
                    "texture limit of {limit} reached"
                )));
            }
        }
        self.next_id += 1;
        let id = TextureId(self.next_id);
        self.live.insert(id, (width, height));
        self.created += 1;
        Ok(id)
    }

    fn release(&mut self, id: TextureId) {
        if self.live.remove(&id).is_some() {
            self.released += 1;
        }
    }
}
