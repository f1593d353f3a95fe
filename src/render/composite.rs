use crate::foundation::error::{VizError, VizResult};
use crate::foundation::math::mul_div255;

pub type PremulRgba8 = [u8; 4];

pub const TRANSPARENT: PremulRgba8 = [0, 0, 0, 0];

/// Source-over with an extra opacity factor in `[0, 1]`.
pub fn over(dst: PremulRgba8, src: PremulRgba8, opacity: f32) -> PremulRgba8 {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }

    let op = ((opacity * 255.0).round() as i32).clamp(0, 255) as u16;
    let sa = mul_div255(u16::from(src[3]), op);
    if sa == 0 {
        return dst;
    }
    if sa == 255 {
        return src;
    }

    let inv = 255u16 - u16::from(sa);

    let mut out = [0u8; 4];
    out[3] = sa.saturating_add(mul_div255(u16::from(dst[3]), inv));
    for i in 0..3 {
        let sc = mul_div255(u16::from(src[i]), op);
        let dc = mul_div255(u16::from(dst[i]), inv);
        out[i] = sc.saturating_add(dc);
    }
    out
}

/// Alpha intersection: the result alpha is `min(px.alpha, mask_alpha)`.
///
/// Colour channels are rescaled by the same ratio so the pixel stays premultiplied.
pub fn intersect(px: PremulRgba8, mask_alpha: u8) -> PremulRgba8 {
    let a = px[3];
    if mask_alpha >= a {
        return px;
    }
    if mask_alpha == 0 || a == 0 {
        return TRANSPARENT;
    }

    let mut out = [0u8; 4];
    out[3] = mask_alpha;
    for i in 0..3 {
        let c = (u32::from(px[i]) * u32::from(mask_alpha) + u32::from(a) / 2) / u32::from(a);
        out[i] = (c as u8).min(mask_alpha);
    }
    out
}

/// Scales every channel of a premultiplied pixel by `coverage` in `[0, 1]`.
pub fn scale(px: PremulRgba8, coverage: f64) -> PremulRgba8 {
    if coverage >= 1.0 {
        return px;
    }
    if coverage <= 0.0 {
        return TRANSPARENT;
    }
    px.map(|c| (f64::from(c) * coverage).round() as u8)
}

pub fn over_in_place(dst: &mut [u8], src: &[u8], opacity: f32) -> VizResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(VizError::render(
            "over_in_place expects equal-length rgba8 buffers",
        ));
    }
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let out = over([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]], opacity);
        d.copy_from_slice(&out);
    }
    Ok(())
}

/// Applies [`intersect`] pixel-wise, reading the mask's alpha channel.
pub fn intersect_in_place(dst: &mut [u8], mask: &[u8]) -> VizResult<()> {
    if dst.len() != mask.len() || !dst.len().is_multiple_of(4) {
        return Err(VizError::render(
            "intersect_in_place expects equal-length rgba8 buffers",
        ));
    }
    for (d, m) in dst.chunks_exact_mut(4).zip(mask.chunks_exact(4)) {
        let out = intersect([d[0], d[1], d[2], d[3]], m[3]);
        d.copy_from_slice(&out);
    }
    Ok(())
}
