use kurbo::{Point, Rect};
use tracing::debug;

use crate::config::WarpCalibration;
use crate::foundation::error::VizResult;
use crate::foundation::math::unit_to_u8;
use crate::render::blur::{gaussian_blur, radius_for_sigma};
use crate::render::composite::{intersect_in_place, over_in_place};
use crate::render::paint::{RadialSpec, rect_to_cpu};
use crate::render::region::{Region, RegionCompositor, ScratchArena};
use crate::surface::{RowSpan, Surface};

/// Deformation applied to one scan row of the region.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RowWarp {
    /// Gaussian weight of the row around the waist anchor, in `(0, 1]`.
    pub profile: f64,
    /// Horizontal scale of each half about the midline.
    pub scale: f64,
    /// Downward displacement in pixels.
    pub sag: f64,
}

/// Deformation law for row `y` of a region `h` rows tall.
pub fn row_warp(y: f64, h: f64, amount: f64, calibration: &WarpCalibration) -> RowWarp {
    let amount = clamp_amount(amount);
    let waist = h * calibration.waist;
    let d = (y - waist) / h;
    let profile = (-(d * d) / calibration.profile_falloff).exp();
    let extra = amount * calibration.bulge * profile;
    let below = ((y - waist) / (h - waist)).max(0.0);
    RowWarp {
        profile,
        scale: 1.0 + extra * calibration.bulge_gain,
        sag: amount * calibration.sag_px * below,
    }
}

/// Warp amounts outside `[0, 1]` are clamped; non-finite amounts count as 0.
pub fn clamp_amount(amount: f64) -> f64 {
    if amount.is_finite() {
        amount.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Renders the torso warp of a base raster onto a target surface.
#[derive(Clone, Debug, Default)]
pub struct WarpEngine {
    calibration: WarpCalibration,
}

impl WarpEngine {
    pub fn new(calibration: WarpCalibration) -> Self {
        Self { calibration }
    }

    pub fn calibration(&self) -> &WarpCalibration {
        &self.calibration
    }

    /// Draws `base` onto `target` and, for a positive amount, the deformed torso on top.
    ///
    /// `pixel_ratio` scales the shadow's fixed pixel offsets. An amount of 0 (or an
    /// unready compositor) leaves `target` equal to `base`.
    #[tracing::instrument(skip(self, target, base, compositor), fields(w = target.width(), h = target.height()))]
    pub fn render(
        &self,
        target: &mut Surface,
        base: &Surface,
        compositor: &mut RegionCompositor,
        amount: f64,
        pixel_ratio: f64,
    ) -> VizResult<()> {
        target.copy_from(base)?;

        let amount = clamp_amount(amount);
        if amount <= 0.0 {
            return Ok(());
        }
        let Some((region, arena)) = compositor.parts_mut() else {
            debug!("compositor not ready; drawing undeformed base");
            return Ok(());
        };

        arena.source.copy_crop_from(base, region.x, region.y);
        self.warp_rows(arena, amount);

        if amount > self.calibration.blur_threshold {
            let sigma = self.calibration.blur_sigma;
            let blurred = gaussian_blur(&arena.work, radius_for_sigma(sigma), sigma)?;
            over_in_place(arena.work.data_mut(), blurred.data(), 1.0)?;
        }

        arena.output.clear();
        arena.output.composite_at(&arena.work, 0, 0);
        intersect_in_place(arena.output.data_mut(), arena.mask.data())?;

        target.composite_at(&arena.output, region.x, region.y);
        self.paint_shadow(target, &region, amount, pixel_ratio)
    }

    fn warp_rows(&self, arena: &mut ScratchArena, amount: f64) {
        let ScratchArena { source, work, .. } = arena;
        work.clear();

        let w = f64::from(source.width());
        let h = f64::from(source.height());
        let mid = w / 2.0;
        for y in 0..source.height() {
            let rw = row_warp(f64::from(y), h, amount, &self.calibration);
            let dst_y = f64::from(y) + rw.sag;

            // Halves are drawn separately so the midline seam stays put.
            work.draw_row_span(
                source,
                RowSpan {
                    src_y: y,
                    src_x0: 0.0,
                    src_x1: mid,
                    dst_x0: mid - mid * rw.scale,
                    dst_x1: mid,
                    dst_y,
                },
            );
            work.draw_row_span(
                source,
                RowSpan {
                    src_y: y,
                    src_x0: mid,
                    src_x1: w,
                    dst_x0: mid,
                    dst_x1: mid + (w - mid) * rw.scale,
                    dst_y,
                },
            );
        }
    }

    fn paint_shadow(
        &self,
        target: &mut Surface,
        region: &Region,
        amount: f64,
        pixel_ratio: f64,
    ) -> VizResult<()> {
        let alpha = unit_to_u8(self.calibration.shadow_alpha * amount);
        if alpha == 0 {
            return Ok(());
        }

        let r = if pixel_ratio.is_finite() && pixel_ratio > 0.0 {
            pixel_ratio
        } else {
            1.0
        };
        let h = f64::from(region.h);
        let cx = f64::from(target.width()) / 2.0;
        let gy = f64::from(region.y) + h * self.calibration.waist;
        let gradient = RadialSpec {
            start: Point::new(cx, gy + 10.0 * r),
            start_radius: 24.0 * r,
            end: Point::new(cx, gy + 42.0 * r),
            end_radius: h * 0.90,
            start_color: [0, 0, 0, 0],
            end_color: [0, 0, 0, alpha],
        }
        .to_gradient();

        let bounds = region.rect();
        let area = Rect::new(
            bounds.x0 - 60.0 * r,
            bounds.y0 - 30.0 * r,
            bounds.x1 + 60.0 * r,
            bounds.y1 + 50.0 * r,
        );
        let layer = Surface::rasterized(target.width(), target.height(), |ctx| {
            ctx.set_paint(gradient);
            ctx.fill_rect(&rect_to_cpu(area));
        })?;
        target.composite_layer(&layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::fit::FitRect;

    fn cal() -> WarpCalibration {
        WarpCalibration::default()
    }

    /// 100x100 region whose middle half is opaque red, sides transparent.
    fn band_base() -> (Surface, RegionCompositor) {
        let (w, h) = (100u32, 100u32);
        let mut data = Vec::with_capacity((w * h * 4) as usize);
        for _y in 0..h {
            for x in 0..w {
                if (25..75).contains(&x) {
                    data.extend_from_slice(&[255, 0, 0, 255]);
                } else {
                    data.extend_from_slice(&[0, 0, 0, 0]);
                }
            }
        }
        let base = Surface::from_premul(w, h, data).unwrap();

        // Calibrate the region to cover the whole surface.
        let mut full = cal();
        full.region_top = 0.0;
        full.region_bottom = 1.0;
        full.region_width = 1.0;
        let fit = FitRect {
            x: 0.0,
            y: 0.0,
            w: 100.0,
            h: 100.0,
        };
        let mut comp = RegionCompositor::new();
        comp.setup(w, h, &fit, &full).unwrap();
        (base, comp)
    }

    fn waist_extent(comp: &mut RegionCompositor) -> usize {
        let (_, arena) = comp.parts_mut().unwrap();
        (0..arena.work.width())
            .filter(|&x| arena.work.pixel(x, 36)[3] > 127)
            .count()
    }

    #[test]
    fn row_warp_is_identity_at_zero() {
        for y in [0.0, 20.0, 36.0, 80.0, 99.0] {
            let rw = row_warp(y, 100.0, 0.0, &cal());
            assert_eq!(rw.scale, 1.0);
            assert_eq!(rw.sag, 0.0);
        }
    }

    #[test]
    fn row_warp_peaks_at_waist_and_sags_only_below() {
        let at_waist = row_warp(36.0, 100.0, 1.0, &cal());
        assert!((at_waist.profile - 1.0).abs() < 1e-12);
        assert!((at_waist.scale - (1.0 + 0.28 * 1.08)).abs() < 1e-12);
        assert_eq!(at_waist.sag, 0.0);

        let above = row_warp(10.0, 100.0, 1.0, &cal());
        assert!(above.scale < at_waist.scale);
        assert_eq!(above.sag, 0.0);

        let bottom = row_warp(100.0, 100.0, 1.0, &cal());
        assert!((bottom.sag - 9.0).abs() < 1e-12);
    }

    #[test]
    fn row_warp_grows_with_amount() {
        for y in [0.0, 30.0, 36.0, 60.0, 99.0] {
            let lo = row_warp(y, 100.0, 0.3, &cal());
            let hi = row_warp(y, 100.0, 0.8, &cal());
            assert!(hi.scale > lo.scale);
            if y > 36.0 {
                assert!(hi.sag > lo.sag);
            }
        }
    }

    #[test]
    fn amount_zero_reproduces_base() {
        let (base, mut comp) = band_base();
        let mut target = Surface::new(100, 100).unwrap();
        WarpEngine::new(cal())
            .render(&mut target, &base, &mut comp, 0.0, 1.0)
            .unwrap();
        assert_eq!(target, base);
    }

    #[test]
    fn bulge_at_waist_grows_with_amount() {
        let (base, mut comp) = band_base();
        let engine = WarpEngine::new(cal());
        let mut target = Surface::new(100, 100).unwrap();

        engine.render(&mut target, &base, &mut comp, 0.3, 1.0).unwrap();
        let small = waist_extent(&mut comp);
        engine.render(&mut target, &base, &mut comp, 0.8, 1.0).unwrap();
        let large = waist_extent(&mut comp);

        assert!(small > 50, "small = {small}");
        assert!(large > small, "small = {small}, large = {large}");
    }

    #[test]
    fn render_is_deterministic() {
        let (base, mut comp) = band_base();
        let engine = WarpEngine::new(cal());
        let mut a = Surface::new(100, 100).unwrap();
        let mut b = Surface::new(100, 100).unwrap();
        engine.render(&mut a, &base, &mut comp, 0.6, 1.0).unwrap();
        engine.render(&mut b, &base, &mut comp, 0.6, 1.0).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, base);
    }

    #[test]
    fn shadow_darkens_more_with_amount() {
        let (w, h) = (400u32, 600u32);
        let base = Surface::from_premul(w, h, [255u8, 255, 255, 255].repeat((w * h) as usize))
            .unwrap();
        let fit = FitRect {
            x: 0.0,
            y: 0.0,
            w: 400.0,
            h: 600.0,
        };
        let mut comp = RegionCompositor::new();
        let region = comp.setup(w, h, &fit, &cal()).unwrap();
        let engine = WarpEngine::new(cal());

        // Inside the padded shadow rect but left of the masked region.
        let (px, py) = (80, 500);
        assert!(px < region.x as u32);
        let shadow_alpha_at = |amount: f64, comp: &mut RegionCompositor| {
            let mut t = Surface::new(w, h).unwrap();
            engine.render(&mut t, &base, comp, amount, 1.0).unwrap();
            t.pixel(px, py)[0]
        };
        let light = shadow_alpha_at(0.2, &mut comp);
        let dark = shadow_alpha_at(1.0, &mut comp);
        assert!(light < 255, "light = {light}");
        assert!(dark < light, "light = {light}, dark = {dark}");
    }

    fn soft_pixels_at_waist(comp: &mut RegionCompositor) -> usize {
        let (_, arena) = comp.parts_mut().unwrap();
        (0..arena.work.width())
            .filter(|&x| {
                let a = arena.work.pixel(x, 36)[3];
                a > 0 && a < 255
            })
            .count()
    }

    #[test]
    fn blur_starts_just_above_threshold() {
        let (base, mut comp) = band_base();
        let engine = WarpEngine::new(WarpCalibration {
            blur_sigma: 2.0,
            ..cal()
        });
        let mut target = Surface::new(100, 100).unwrap();

        engine.render(&mut target, &base, &mut comp, 0.01, 1.0).unwrap();
        let at_threshold = soft_pixels_at_waist(&mut comp);
        engine.render(&mut target, &base, &mut comp, 0.011, 1.0).unwrap();
        let above = soft_pixels_at_waist(&mut comp);

        assert!(at_threshold <= 4, "at_threshold = {at_threshold}");
        assert!(above >= 6, "above = {above}");
    }

    #[test]
    fn unready_compositor_draws_base_only() {
        let (base, _) = band_base();
        let mut comp = RegionCompositor::new();
        let mut target = Surface::new(100, 100).unwrap();
        WarpEngine::new(cal())
            .render(&mut target, &base, &mut comp, 1.0, 1.0)
            .unwrap();
        assert_eq!(target, base);
    }
}
