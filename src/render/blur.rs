use crate::foundation::error::{VizError, VizResult};
use crate::surface::Surface;

#[derive(Clone, Copy)]
enum Axis {
    Horizontal,
    Vertical,
}

/// Separable Gaussian blur of a premultiplied surface; edges are clamped.
pub fn gaussian_blur(src: &Surface, radius: u32, sigma: f32) -> VizResult<Surface> {
    if radius == 0 || src.is_empty() {
        return Ok(src.clone());
    }

    let kernel = gaussian_kernel_q16(radius, sigma)?;
    let mut tmp = Surface::new(src.width(), src.height())?;
    let mut out = Surface::new(src.width(), src.height())?;

    convolve(src, &mut tmp, &kernel, Axis::Horizontal);
    convolve(&tmp, &mut out, &kernel, Axis::Vertical);
    Ok(out)
}

/// Kernel radius that covers three standard deviations.
pub fn radius_for_sigma(sigma: f32) -> u32 {
    if !sigma.is_finite() || sigma <= 0.0 {
        return 0;
    }
    (sigma * 3.0).ceil().max(1.0) as u32
}

fn gaussian_kernel_q16(radius: u32, sigma: f32) -> VizResult<Vec<u32>> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(VizError::validation("blur sigma must be > 0"));
    }

    let r = radius as i32;
    let denom = 2.0 * f64::from(sigma) * f64::from(sigma);
    let weights_f: Vec<f64> = (-r..=r)
        .map(|i| {
            let x = f64::from(i);
            (-x * x / denom).exp()
        })
        .collect();
    let sum: f64 = weights_f.iter().sum();
    if sum <= 0.0 {
        return Err(VizError::render("gaussian kernel sum is zero"));
    }

    let mut weights: Vec<u32> = weights_f
        .iter()
        .map(|wf| ((wf / sum) * 65536.0).round().clamp(0.0, 65536.0) as u32)
        .collect();

    // Rounding drift goes to the center tap so the kernel sums to exactly 1.0 in Q16.
    let acc: i64 = weights.iter().map(|&w| i64::from(w)).sum();
    let delta = 65536 - acc;
    if delta != 0 {
        let mid = weights.len() / 2;
        weights[mid] = (i64::from(weights[mid]) + delta).clamp(0, 65536) as u32;
    }

    Ok(weights)
}

fn convolve(src: &Surface, dst: &mut Surface, k: &[u32], axis: Axis) {
    let radius = (k.len() / 2) as i64;
    let (w, h) = (i64::from(src.width()), i64::from(src.height()));
    let data = src.data();
    let out = dst.data_mut();

    for y in 0..h {
        for x in 0..w {
            let mut acc = [0u64; 4];
            for (ki, &kw) in k.iter().enumerate() {
                let d = ki as i64 - radius;
                let (sx, sy) = match axis {
                    Axis::Horizontal => ((x + d).clamp(0, w - 1), y),
                    Axis::Vertical => (x, (y + d).clamp(0, h - 1)),
                };
                let idx = ((sy * w + sx) as usize) * 4;
                for c in 0..4 {
                    acc[c] += u64::from(kw) * u64::from(data[idx + c]);
                }
            }
            let out_idx = ((y * w + x) as usize) * 4;
            for c in 0..4 {
                out[out_idx + c] = q16_to_u8(acc[c]);
            }
        }
    }
}

fn q16_to_u8(acc: u64) -> u8 {
    ((acc + 32768) >> 16).min(255) as u8
}
