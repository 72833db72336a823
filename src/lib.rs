pub mod atlas;
pub mod compositor;
pub mod config;
pub mod engines;
pub mod error;
pub mod events;
pub mod geometry;
pub mod landmarks;
pub mod processing;
pub mod regions;
pub mod render;
pub mod tasks {
    pub mod detection;
    pub mod replay;
}
