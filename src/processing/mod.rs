pub mod extract;
pub mod fade;
pub mod outline;
pub mod raster;

pub use extract::{RegionExtractor, RegionTexture};
pub use fade::{apply_radial_fade, trim_transparent_border};
