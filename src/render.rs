pub mod blur;
pub mod composite;
pub mod fit;
mod paint;
pub mod region;
pub mod warp;
