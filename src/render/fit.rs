use kurbo::Rect;
use vello_cpu::kurbo::Affine;

use crate::assets::AvatarImage;
use crate::foundation::error::VizResult;
use crate::render::paint::rect_to_cpu;
use crate::surface::Surface;

/// Placement of the image inside the surface, in surface pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FitRect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl FitRect {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.x + self.w, self.y + self.h)
    }

    /// Maps image pixel space onto this rectangle.
    fn image_transform(&self, img_w: f64, img_h: f64) -> Affine {
        Affine::translate((self.x, self.y))
            * Affine::scale_non_uniform(self.w / img_w, self.h / img_h)
    }
}

/// Host layout box in logical pixels plus the display's device pixel ratio.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HostLayout {
    pub width: f64,
    pub height: f64,
    pub device_pixel_ratio: f64,
}

impl HostLayout {
    pub fn new(width: f64, height: f64, device_pixel_ratio: f64) -> Self {
        Self {
            width,
            height,
            device_pixel_ratio,
        }
    }

    /// Device pixel ratio clamped to `[1, cap]`; unusable ratios count as 1.
    pub fn effective_ratio(&self, cap: f64) -> f64 {
        let dpr = self.device_pixel_ratio;
        if !dpr.is_finite() || dpr <= 0.0 {
            return 1.0;
        }
        dpr.clamp(1.0, cap.max(1.0))
    }

    /// Surface size in device pixels.
    pub fn surface_size(&self, cap: f64) -> (u32, u32) {
        let dpr = self.effective_ratio(cap);
        let px = |v: f64| {
            if v.is_finite() && v > 0.0 {
                (v * dpr).round().min(f64::from(u32::MAX)) as u32
            } else {
                0
            }
        };
        (px(self.width), px(self.height))
    }
}

/// Uniform "contain" fit of an `img_w × img_h` image centered in the surface.
///
/// Returns `None` when either size is degenerate.
pub fn fit(surface_w: f64, surface_h: f64, img_w: f64, img_h: f64) -> Option<FitRect> {
    let sizes = [surface_w, surface_h, img_w, img_h];
    if sizes.iter().any(|v| !v.is_finite() || *v <= 0.0) {
        return None;
    }

    let scale = (surface_w / img_w).min(surface_h / img_h);
    let w = img_w * scale;
    let h = img_h * scale;
    Some(FitRect {
        x: (surface_w - w) / 2.0,
        y: (surface_h - h) / 2.0,
        w,
        h,
    })
}

/// Base raster of a render: `image` drawn into `fit` on a transparent surface.
pub fn render_fitted(
    surface_w: u32,
    surface_h: u32,
    image: &AvatarImage,
    fit: FitRect,
) -> VizResult<Surface> {
    let (iw, ih) = (f64::from(image.width), f64::from(image.height));
    let transform = fit.image_transform(iw, ih);
    let paint = image.paint();
    Surface::rasterized(surface_w, surface_h, |ctx| {
        ctx.set_transform(transform);
        ctx.set_paint(paint);
        ctx.fill_rect(&rect_to_cpu(Rect::new(0.0, 0.0, iw, ih)));
    })
}
