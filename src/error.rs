use thiserror::Error;

use crate::regions::Region;

/// Library error type for extraction, mapping and render-side bookkeeping.
///
/// None of these are fatal to the render loop: callers log them and let the
/// next frame retry the failed step.
#[derive(Debug, Error)]
pub enum Error {
    /// A zero-sized image or surface made a coordinate mapping impossible.
    #[error("invalid dimensions: image {image_w}x{image_h}, surface {surface_w}x{surface_h}")]
    InvalidDimensions {
        image_w: u32,
        image_h: u32,
        surface_w: u32,
        surface_h: u32,
    },

    /// Fewer than three outline points could be resolved for a region.
    #[error("region {region} resolved only {resolved} landmark(s)")]
    InsufficientLandmarks { region: Region, resolved: usize },

    /// A texture or pipeline resource could not be created.
    #[error("resource acquisition failed: {0}")]
    ResourceAcquisition(String),

    /// The detection result carried no face.
    #[error("no active face in detection result")]
    NoActiveFace,

    /// The render command queue is at capacity; the command was dropped.
    #[error("render command queue is full")]
    QueueFull,

    /// The render thread has gone away.
    #[error("render command queue is closed")]
    QueueClosed,

    /// A region name outside the reserved set.
    #[error("unknown region name: {0}")]
    UnknownRegion(String),

    /// Underlying IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// YAML/serde decoding error.
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// JSON decoding error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Image decoding error.
    #[error(transparent)]
    Image(#[from] image::ImageError),
}
