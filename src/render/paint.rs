//! Bridges crate geometry to the raster backend's paints.

use vello_cpu::peniko::{Color, Gradient};

use crate::render::composite::PremulRgba8;

/// Two-circle radial gradient with one colour stop per circle; padded beyond both.
///
/// Points that no interpolated circle passes through stay unpainted.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RadialSpec {
    pub start: kurbo::Point,
    pub start_radius: f64,
    pub end: kurbo::Point,
    pub end_radius: f64,
    /// Straight-alpha RGBA8.
    pub start_color: PremulRgba8,
    /// Straight-alpha RGBA8.
    pub end_color: PremulRgba8,
}

impl RadialSpec {
    pub(crate) fn concentric(
        center: kurbo::Point,
        inner_radius: f64,
        outer_radius: f64,
        inner_color: PremulRgba8,
        outer_color: PremulRgba8,
    ) -> Self {
        Self {
            start: center,
            start_radius: inner_radius,
            end: center,
            end_radius: outer_radius,
            start_color: inner_color,
            end_color: outer_color,
        }
    }

    pub(crate) fn to_gradient(self) -> Gradient {
        Gradient::new_two_point_radial(
            point_to_cpu(self.start),
            self.start_radius as f32,
            point_to_cpu(self.end),
            self.end_radius as f32,
        )
        .with_stops([
            (0.0, color(self.start_color)),
            (1.0, color(self.end_color)),
        ])
    }
}

fn color([r, g, b, a]: PremulRgba8) -> Color {
    Color::from_rgba8(r, g, b, a)
}

pub(crate) fn point_to_cpu(p: kurbo::Point) -> vello_cpu::kurbo::Point {
    vello_cpu::kurbo::Point::new(p.x, p.y)
}

pub(crate) fn rect_to_cpu(r: kurbo::Rect) -> vello_cpu::kurbo::Rect {
    vello_cpu::kurbo::Rect::new(r.x0, r.y0, r.x1, r.y1)
}
