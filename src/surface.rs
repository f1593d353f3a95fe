use kurbo::Rect;

use crate::foundation::error::{VizError, VizResult};
use crate::foundation::math::rgba_len;
use crate::render::composite::{PremulRgba8, TRANSPARENT, over, over_in_place, scale};

/// CPU pixmap in premultiplied RGBA8, row-major, tightly packed.
///
/// Both dimensions are limited to `u16`, the raster backend's surface limit.
#[derive(Clone, Debug)]
pub struct Surface {
    pixmap: vello_cpu::Pixmap,
}

/// Horizontal span of one source row and where it lands in the destination.
#[derive(Clone, Copy, Debug)]
pub struct RowSpan {
    pub src_y: u32,
    pub src_x0: f64,
    pub src_x1: f64,
    pub dst_x0: f64,
    pub dst_x1: f64,
    /// Top edge of the destination row; may be fractional.
    pub dst_y: f64,
}

impl Surface {
    /// Transparent surface; errors when a dimension exceeds `u16`.
    pub fn new(width: u32, height: u32) -> VizResult<Self> {
        let (w, h) = surface_dims(width, height)?;
        Ok(Self {
            pixmap: vello_cpu::Pixmap::new(w, h),
        })
    }

    pub fn from_premul(width: u32, height: u32, data: Vec<u8>) -> VizResult<Self> {
        Ok(Self {
            pixmap: pixmap_from_premul(&data, width, height)?,
        })
    }

    /// Runs `draw` against a fresh render context and resolves it into a new surface.
    pub(crate) fn rasterized(
        width: u32,
        height: u32,
        draw: impl FnOnce(&mut vello_cpu::RenderContext),
    ) -> VizResult<Self> {
        let mut out = Self::new(width, height)?;
        if out.is_empty() {
            return Ok(out);
        }
        let mut ctx = vello_cpu::RenderContext::new(out.pixmap.width(), out.pixmap.height());
        draw(&mut ctx);
        ctx.flush();
        ctx.render_to_pixmap(&mut out.pixmap);
        Ok(out)
    }

    pub fn width(&self) -> u32 {
        u32::from(self.pixmap.width())
    }

    pub fn height(&self) -> u32 {
        u32::from(self.pixmap.height())
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn data(&self) -> &[u8] {
        self.pixmap.data_as_u8_slice()
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        self.pixmap.data_as_u8_slice_mut()
    }

    pub fn pixel(&self, x: u32, y: u32) -> PremulRgba8 {
        if x >= self.width() || y >= self.height() {
            return TRANSPARENT;
        }
        let i = self.index(x, y);
        let d = self.data();
        [d[i], d[i + 1], d[i + 2], d[i + 3]]
    }

    pub fn clear(&mut self) {
        self.data_mut().fill(0);
    }

    /// Replaces this surface's pixels with `src`'s; sizes must match.
    pub fn copy_from(&mut self, src: &Surface) -> VizResult<()> {
        if self.width() != src.width() || self.height() != src.height() {
            return Err(VizError::render(format!(
                "copy_from size mismatch: {}x{} vs {}x{}",
                self.width(),
                self.height(),
                src.width(),
                src.height()
            )));
        }
        self.data_mut().copy_from_slice(src.data());
        Ok(())
    }

    /// Fills this surface with the crop of `src` whose top-left corner is `(sx, sy)`.
    ///
    /// Pixels that fall outside `src` become transparent.
    pub fn copy_crop_from(&mut self, src: &Surface, sx: i32, sy: i32) {
        self.clear();
        let w = self.width() as usize;
        for y in 0..self.height() {
            let syy = i64::from(sy) + i64::from(y);
            if syy < 0 || syy >= i64::from(src.height()) {
                continue;
            }
            let x_start = (-i64::from(sx)).clamp(0, w as i64) as usize;
            let x_end = (i64::from(src.width()) - i64::from(sx)).clamp(0, w as i64) as usize;
            if x_start >= x_end {
                continue;
            }
            let src_x = (i64::from(sx) + x_start as i64) as u32;
            let si = src.index(src_x, syy as u32);
            let di = self.index(x_start as u32, y);
            let n = (x_end - x_start) * 4;
            self.data_mut()[di..di + n].copy_from_slice(&src.data()[si..si + n]);
        }
    }

    /// Source-over composite of `src` with its top-left corner at `(dx, dy)`.
    pub fn composite_at(&mut self, src: &Surface, dx: i32, dy: i32) {
        for y in 0..src.height() {
            let ty = i64::from(dy) + i64::from(y);
            if ty < 0 || ty >= i64::from(self.height()) {
                continue;
            }
            for x in 0..src.width() {
                let tx = i64::from(dx) + i64::from(x);
                if tx < 0 || tx >= i64::from(self.width()) {
                    continue;
                }
                let s = src.pixel(x, y);
                if s[3] == 0 {
                    continue;
                }
                self.blend_pixel(tx as u32, ty as u32, s);
            }
        }
    }

    /// Draws one row of `src` stretched horizontally into a destination span.
    ///
    /// Sampling is linear along x and clamped to the source span so neighbouring
    /// spans never bleed into each other. Fractional `dst_y` splits the row across
    /// two destination rows by coverage.
    pub fn draw_row_span(&mut self, src: &Surface, span: RowSpan) {
        let RowSpan {
            src_y,
            src_x0,
            src_x1,
            dst_x0,
            dst_x1,
            dst_y,
        } = span;
        if src_y >= src.height() || src_x1 <= src_x0 || dst_x1 <= dst_x0 {
            return;
        }

        let lo = src_x0.floor().max(0.0);
        let hi = (src_x1.ceil() - 1.0).min(f64::from(src.width()) - 1.0);
        if hi < lo {
            return;
        }

        let x_first = dst_x0.floor().max(0.0) as u32;
        let x_last = dst_x1.ceil().min(f64::from(self.width())) as u32;
        let row0 = dst_y.floor();
        let frac = dst_y - row0;
        let rows = [(row0, 1.0 - frac), (row0 + 1.0, frac)];

        let ratio = (src_x1 - src_x0) / (dst_x1 - dst_x0);
        for px in x_first..x_last {
            let cov_x = overlap(f64::from(px), f64::from(px) + 1.0, dst_x0, dst_x1);
            if cov_x <= 0.0 {
                continue;
            }
            let center = (f64::from(px) + 0.5).clamp(dst_x0, dst_x1);
            let u = (src_x0 + (center - dst_x0) * ratio - 0.5).clamp(lo, hi);
            let sample = sample_row_linear(src, src_y, u);
            if sample[3] == 0 {
                continue;
            }
            for (row, cov_y) in rows {
                if cov_y <= 0.0 || row < 0.0 || row >= f64::from(self.height()) {
                    continue;
                }
                self.blend_pixel(px, row as u32, scale(sample, cov_x * cov_y));
            }
        }
    }

    /// Source-over composite of a same-sized layer.
    pub fn composite_layer(&mut self, layer: &Surface) -> VizResult<()> {
        over_in_place(self.data_mut(), layer.data(), 1.0)
    }

    /// Straight-alpha copy suitable for encoding.
    pub fn to_rgba_image(&self) -> VizResult<image::RgbaImage> {
        let mut out = self.data().to_vec();
        for px in out.chunks_exact_mut(4) {
            let a = u32::from(px[3]);
            if a == 0 || a == 255 {
                continue;
            }
            for c in px.iter_mut().take(3) {
                *c = ((u32::from(*c) * 255 + a / 2) / a).min(255) as u8;
            }
        }
        image::RgbaImage::from_raw(self.width(), self.height(), out)
            .ok_or_else(|| VizError::render("surface buffer does not match its dimensions"))
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, f64::from(self.width()), f64::from(self.height()))
    }

    fn index(&self, x: u32, y: u32) -> usize {
        ((y as usize) * (self.width() as usize) + (x as usize)) * 4
    }

    fn blend_pixel(&mut self, x: u32, y: u32, src: PremulRgba8) {
        let i = self.index(x, y);
        let px = &mut self.data_mut()[i..i + 4];
        let out = over([px[0], px[1], px[2], px[3]], src, 1.0);
        px.copy_from_slice(&out);
    }
}

impl PartialEq for Surface {
    fn eq(&self, other: &Self) -> bool {
        self.width() == other.width()
            && self.height() == other.height()
            && self.data() == other.data()
    }
}

impl Eq for Surface {}

fn surface_dims(width: u32, height: u32) -> VizResult<(u16, u16)> {
    let w: u16 = width
        .try_into()
        .map_err(|_| VizError::render(format!("surface width {width} exceeds u16")))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| VizError::render(format!("surface height {height} exceeds u16")))?;
    Ok((w, h))
}

/// Wraps premultiplied RGBA8 bytes as a backend pixmap.
pub(crate) fn pixmap_from_premul(
    rgba8_premul: &[u8],
    width: u32,
    height: u32,
) -> VizResult<vello_cpu::Pixmap> {
    let (w, h) = surface_dims(width, height)?;
    if rgba_len(width, height) != Some(rgba8_premul.len()) {
        return Err(VizError::render(
            "surface data must match width*height*4",
        ));
    }

    let mut may_have_opacities = false;
    let pixels = rgba8_premul
        .chunks_exact(4)
        .map(|px| {
            may_have_opacities |= px[3] != 255;
            vello_cpu::peniko::color::PremulRgba8 {
                r: px[0],
                g: px[1],
                b: px[2],
                a: px[3],
            }
        })
        .collect();

    Ok(vello_cpu::Pixmap::from_parts_with_opacity(
        pixels,
        w,
        h,
        may_have_opacities,
    ))
}

fn overlap(a0: f64, a1: f64, b0: f64, b1: f64) -> f64 {
    (a1.min(b1) - a0.max(b0)).clamp(0.0, 1.0)
}

fn sample_row_linear(src: &Surface, y: u32, u: f64) -> PremulRgba8 {
    let x0 = u.floor();
    let t = u - x0;
    let a = src.pixel(x0 as u32, y);
    if t <= 0.0 {
        return a;
    }
    let b = src.pixel((x0 as u32 + 1).min(src.width() - 1), y);
    lerp_px(a, b, t)
}

fn lerp_px(a: PremulRgba8, b: PremulRgba8, t: f64) -> PremulRgba8 {
    if t >= 1.0 {
        return b;
    }
    let mut out = [0u8; 4];
    for i in 0..4 {
        let v = f64::from(a[i]) * (1.0 - t) + f64::from(b[i]) * t;
        out[i] = v.round().clamp(0.0, 255.0) as u8;
    }
    out
}
