//! Body-composition avatar visualizer.
//!
//! A single percentage drives a smooth torso warp of a photographic avatar, rendered on
//! the CPU into a premultiplied RGBA8 [`Surface`]:
//!
//! - Build a [`VisualizerController`] from a [`VisualizerConfig`] and an [`ImageSource`]
//! - `mount` it with the host layout and the initial value
//! - Forward value changes and resizes; read back the surface and the slider annotation
#![forbid(unsafe_code)]

pub mod assets;
pub mod config;
pub mod controller;
mod foundation;
pub mod render;
pub mod surface;

pub use crate::assets::AvatarImage;
pub use crate::assets::loader::{FsImageSource, ImageSource, InMemorySource, load_avatar};
pub use crate::config::{AssetLocator, SliderRange, VisualizerConfig, WarpCalibration};
pub use crate::controller::{
    Presentation, VisualizerController, VisualizerState, label_for, marker_percent,
    value_to_amount,
};
pub use crate::foundation::error::{VizError, VizResult};
pub use crate::render::fit::{FitRect, HostLayout, render_fitted};
pub use crate::render::region::Region;
pub use crate::render::warp::{RowWarp, WarpEngine, row_warp};
pub use crate::surface::Surface;
