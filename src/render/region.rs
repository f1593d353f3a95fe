use kurbo::{Point, Rect};
use tracing::{debug, warn};

use crate::config::WarpCalibration;
use crate::foundation::error::VizResult;
use crate::render::fit::FitRect;
use crate::render::paint::{RadialSpec, rect_to_cpu};
use crate::surface::Surface;

/// Torso sub-rectangle of the fit rectangle, in integer surface pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl Region {
    /// Derives the torso region and clamps it into the surface.
    ///
    /// `None` when the clamped region has no area.
    pub fn from_fit(
        surface_w: u32,
        surface_h: u32,
        fit: &FitRect,
        calibration: &WarpCalibration,
    ) -> Option<Self> {
        let cx = f64::from(surface_w) / 2.0;
        let top = fit.y + fit.h * calibration.region_top;
        let bottom = fit.y + fit.h * calibration.region_bottom;
        let torso_w = fit.w * calibration.region_width;

        let mut x = (cx - torso_w / 2.0).round() as i64;
        let mut y = top.round() as i64;
        let mut w = torso_w.round() as i64;
        let mut h = (bottom - top).round() as i64;

        if x < 0 {
            w += x;
            x = 0;
        }
        if y < 0 {
            h += y;
            y = 0;
        }
        w = w.min(i64::from(surface_w) - x);
        h = h.min(i64::from(surface_h) - y);
        if w <= 0 || h <= 0 {
            return None;
        }

        Some(Self {
            x: x as i32,
            y: y as i32,
            w: w as u32,
            h: h as u32,
        })
    }

    pub fn rect(&self) -> Rect {
        Rect::new(
            f64::from(self.x),
            f64::from(self.y),
            f64::from(self.x) + f64::from(self.w),
            f64::from(self.y) + f64::from(self.h),
        )
    }

    fn same_size(&self, other: &Region) -> bool {
        self.w == other.w && self.h == other.h
    }
}

/// Region-sized scratch buffers reused across warp renders.
pub(crate) struct ScratchArena {
    /// Undeformed crop of the base raster.
    pub(crate) source: Surface,
    /// Row-warped pixels before masking.
    pub(crate) work: Surface,
    /// Masked result composited onto the target.
    pub(crate) output: Surface,
    /// Radial opacity mask; read-only after allocation.
    pub(crate) mask: Surface,
}

impl ScratchArena {
    fn allocate(region: &Region) -> VizResult<Self> {
        Ok(Self {
            source: Surface::new(region.w, region.h)?,
            work: Surface::new(region.w, region.h)?,
            output: Surface::new(region.w, region.h)?,
            mask: render_mask(region.w, region.h)?,
        })
    }
}

/// Owns the torso region and its scratch arena.
///
/// Buffers are reallocated only when the region's size changes.
#[derive(Default)]
pub struct RegionCompositor {
    region: Option<Region>,
    arena: Option<ScratchArena>,
    allocations: u64,
}

impl RegionCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives the region for `fit` and makes the arena match it.
    ///
    /// Unchanged geometry is a no-op; a moved region of the same size keeps its buffers.
    pub fn setup(
        &mut self,
        surface_w: u32,
        surface_h: u32,
        fit: &FitRect,
        calibration: &WarpCalibration,
    ) -> Option<Region> {
        let Some(next) = Region::from_fit(surface_w, surface_h, fit, calibration) else {
            debug!(surface_w, surface_h, "torso region is degenerate; compositor not ready");
            self.reset();
            return None;
        };

        match (self.region, self.arena.is_some()) {
            (Some(current), true) if current == next => {}
            (Some(current), true) if current.same_size(&next) => {
                debug!(?next, "torso region moved; keeping scratch arena");
                self.region = Some(next);
            }
            _ => {
                debug!(?next, "allocating scratch arena");
                match ScratchArena::allocate(&next) {
                    Ok(arena) => {
                        self.arena = Some(arena);
                        self.region = Some(next);
                        self.allocations += 1;
                    }
                    Err(err) => {
                        warn!(error = %err, ?next, "cannot allocate scratch arena; compositor not ready");
                        self.reset();
                        return None;
                    }
                }
            }
        }
        self.region
    }

    pub fn region(&self) -> Option<Region> {
        self.region
    }

    pub fn is_ready(&self) -> bool {
        self.region.is_some() && self.arena.is_some()
    }

    /// How many times the scratch arena has been (re)allocated.
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    /// Drops the region and its buffers.
    pub fn reset(&mut self) {
        self.region = None;
        self.arena = None;
    }

    pub(crate) fn parts_mut(&mut self) -> Option<(Region, &mut ScratchArena)> {
        let region = self.region?;
        self.arena.as_mut().map(|arena| (region, arena))
    }
}

/// White mask whose alpha is a radial falloff around the buffer center.
///
/// Opaque up to a quarter of the smaller half-dimension, transparent from the larger one.
pub(crate) fn render_mask(w: u32, h: u32) -> VizResult<Surface> {
    let (mx, my) = (f64::from(w) / 2.0, f64::from(h) / 2.0);
    let gradient = RadialSpec::concentric(
        Point::new(mx, my),
        mx.min(my) * 0.25,
        mx.max(my),
        [255, 255, 255, 255],
        [255, 255, 255, 0],
    )
    .to_gradient();
    let bounds = Rect::new(0.0, 0.0, f64::from(w), f64::from(h));
    Surface::rasterized(w, h, |ctx| {
        ctx.set_paint(gradient);
        ctx.fill_rect(&rect_to_cpu(bounds));
    })
}
