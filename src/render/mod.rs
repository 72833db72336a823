pub mod gpu;
pub mod overlay;
pub mod sprites;
pub mod viewer;

pub use viewer::{ViewerInputs, run_windowed};
