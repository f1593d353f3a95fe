//! Entry point for hosts: mount, value changes, resizes and unmount.
//!
//! The controller owns the avatar, the fitted base raster, the presented surface and
//! the region compositor. Loading the avatar is the only asynchronous step; every
//! other handler runs to completion synchronously and overwrites the surface.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::assets::AvatarImage;
use crate::assets::loader::{ImageSource, load_avatar};
use crate::config::{SliderRange, VisualizerConfig};
use crate::foundation::error::{VizError, VizResult};
use crate::render::fit::{FitRect, HostLayout, fit, render_fitted};
use crate::render::region::{Region, RegionCompositor};
use crate::render::warp::WarpEngine;
use crate::surface::Surface;

/// Lifecycle of one mount.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisualizerState {
    Uninitialized,
    Loading,
    /// Avatar loaded; every resize and value change re-renders.
    Ready,
    /// Every candidate failed; terminal until the next mount.
    Failed,
}

/// Annotation shown above the host slider.
#[derive(Clone, Debug, PartialEq)]
pub struct Presentation {
    pub label: String,
    /// Horizontal marker position, percent of the slider width.
    pub marker_percent: f64,
}

/// Quadratic ease of the input percentage; 0 up to 15, 1 from 45.
pub fn value_to_amount(value: f64) -> f64 {
    let t = ((value - 15.0) / 30.0).clamp(0.0, 1.0);
    if t.is_nan() { 0.0 } else { t * t }
}

/// Five-wide band label, e.g. `"20–24%"`; `">40%"` from 40 upwards.
pub fn label_for(value: f64) -> String {
    if value >= 40.0 {
        return ">40%".to_string();
    }
    let band = ((value / 5.0).floor() * 5.0).max(5.0) as i64;
    format!("{}–{}%", band, band + 4)
}

pub fn marker_percent(value: f64, slider: &SliderRange) -> f64 {
    let p = (value - slider.min) / (slider.max - slider.min) * 100.0;
    if p.is_nan() { 0.0 } else { p.clamp(0.0, 100.0) }
}

pub fn presentation_for(value: f64, slider: &SliderRange) -> Presentation {
    Presentation {
        label: label_for(value),
        marker_percent: marker_percent(value, slider),
    }
}

pub struct VisualizerController<S> {
    config: VisualizerConfig,
    source: S,
    engine: WarpEngine,
    compositor: RegionCompositor,
    state: VisualizerState,
    mount_token: Option<CancellationToken>,

    image: Option<AvatarImage>,
    layout: Option<HostLayout>,
    fit: Option<FitRect>,
    base: Option<Surface>,
    surface: Option<Surface>,

    value: f64,
    presentation: Presentation,
    render_count: u64,
}

impl<S: ImageSource> VisualizerController<S> {
    pub fn new(config: VisualizerConfig, source: S) -> VizResult<Self> {
        config.validate()?;
        let presentation = presentation_for(config.slider.min, &config.slider);
        Ok(Self {
            engine: WarpEngine::new(config.calibration),
            value: config.slider.min,
            config,
            source,
            compositor: RegionCompositor::new(),
            state: VisualizerState::Uninitialized,
            mount_token: None,
            image: None,
            layout: None,
            fit: None,
            base: None,
            surface: None,
            presentation,
            render_count: 0,
        })
    }

    /// Loads the avatar and renders the first frame.
    ///
    /// Cancelling `cancel` while the load is pending (the host unmounting) discards the
    /// result and leaves the controller uninitialized. A failed load is not an error:
    /// it moves the controller to [`VisualizerState::Failed`].
    #[tracing::instrument(skip(self, cancel))]
    pub async fn mount(
        &mut self,
        layout: HostLayout,
        initial_value: f64,
        cancel: CancellationToken,
    ) -> VizResult<VisualizerState> {
        if self.state != VisualizerState::Uninitialized {
            debug!(state = ?self.state, "remounting; tearing down previous mount");
            self.teardown();
        }

        self.layout = Some(layout);
        self.set_value(initial_value);
        self.mount_token = Some(cancel.clone());
        self.state = VisualizerState::Loading;

        let loaded = load_avatar(&self.source, &self.config.asset, &cancel).await;
        match loaded {
            Ok(image) => {
                info!(width = image.width, height = image.height, "avatar ready");
                self.image = Some(image);
                self.state = VisualizerState::Ready;
                self.relayout();
            }
            Err(VizError::Cancelled) => {
                info!("mount cancelled before the avatar loaded; discarding");
                self.teardown();
            }
            Err(err) if err.is_asset_failure() => {
                warn!(error = %err, "could not load avatar");
                self.state = VisualizerState::Failed;
            }
            Err(err) => {
                self.state = VisualizerState::Failed;
                return Err(err);
            }
        }
        Ok(self.state)
    }

    /// Updates amount and presentation; re-renders the warp only.
    pub fn on_value_change(&mut self, value: f64) {
        self.set_value(value);
        if self.state == VisualizerState::Ready {
            self.render();
        }
    }

    /// Recomputes surface size, fit and region, then re-renders.
    pub fn on_resize(&mut self, layout: HostLayout) {
        self.layout = Some(layout);
        if self.state == VisualizerState::Ready {
            self.relayout();
        }
    }

    /// Cancels any pending load and drops every buffer.
    pub fn unmount(&mut self) {
        if let Some(token) = &self.mount_token {
            token.cancel();
        }
        self.teardown();
        info!("visualizer unmounted");
    }

    pub fn state(&self) -> VisualizerState {
        self.state
    }

    pub fn is_loaded(&self) -> bool {
        self.image.is_some()
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn amount(&self) -> f64 {
        value_to_amount(self.value)
    }

    pub fn presentation(&self) -> &Presentation {
        &self.presentation
    }

    /// The rendered avatar, absent until the first successful render.
    pub fn surface(&self) -> Option<&Surface> {
        self.surface.as_ref()
    }

    pub fn fit_rect(&self) -> Option<FitRect> {
        self.fit
    }

    pub fn region(&self) -> Option<Region> {
        self.compositor.region()
    }

    /// Number of warp renders since construction.
    pub fn render_count(&self) -> u64 {
        self.render_count
    }

    /// Number of scratch arena allocations since construction.
    pub fn arena_allocations(&self) -> u64 {
        self.compositor.allocations()
    }

    pub fn config(&self) -> &VisualizerConfig {
        &self.config
    }

    fn set_value(&mut self, value: f64) {
        self.value = value;
        self.presentation = presentation_for(value, &self.config.slider);
    }

    fn pixel_ratio(&self) -> f64 {
        self.layout
            .map(|l| l.effective_ratio(self.config.max_device_pixel_ratio.0))
            .unwrap_or(1.0)
    }

    fn relayout(&mut self) {
        let Some(layout) = self.layout else {
            return;
        };
        let (sw, sh) = layout.surface_size(self.config.max_device_pixel_ratio.0);
        match self.prepare_frame(sw, sh) {
            Ok(Some(fit_rect)) => {
                self.compositor
                    .setup(sw, sh, &fit_rect, self.engine.calibration());
                self.render();
            }
            Ok(None) => {
                debug!(sw, sh, "degenerate surface; skipping setup");
                self.clear_frame();
            }
            Err(err) => {
                warn!(error = %err, sw, sh, "cannot prepare surface; skipping render");
                self.clear_frame();
            }
        }
    }

    /// Fit, base raster and presented surface for a `sw × sh` surface.
    ///
    /// `None` when the surface or the image is degenerate.
    fn prepare_frame(&mut self, sw: u32, sh: u32) -> VizResult<Option<FitRect>> {
        let Some(image) = self.image.as_ref() else {
            return Ok(None);
        };
        let Some(fit_rect) = fit(
            f64::from(sw),
            f64::from(sh),
            f64::from(image.width),
            f64::from(image.height),
        ) else {
            return Ok(None);
        };

        let base = render_fitted(sw, sh, image, fit_rect)?;
        let surface = match self.surface.take() {
            Some(s) if s.width() == sw && s.height() == sh => s,
            _ => Surface::new(sw, sh)?,
        };
        self.fit = Some(fit_rect);
        self.base = Some(base);
        self.surface = Some(surface);
        Ok(Some(fit_rect))
    }

    fn clear_frame(&mut self) {
        self.fit = None;
        self.base = None;
        self.surface = None;
        self.compositor.reset();
    }

    fn render(&mut self) {
        let amount = self.amount();
        let ratio = self.pixel_ratio();
        let (Some(base), Some(surface)) = (self.base.as_ref(), self.surface.as_mut()) else {
            debug!("no surface yet; skipping render");
            return;
        };
        match self
            .engine
            .render(surface, base, &mut self.compositor, amount, ratio)
        {
            Ok(()) => self.render_count += 1,
            Err(err) => warn!(error = %err, "warp render failed"),
        }
    }

    fn teardown(&mut self) {
        self.mount_token = None;
        self.image = None;
        self.clear_frame();
        self.state = VisualizerState::Uninitialized;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_is_zero_below_threshold() {
        for v in [-10.0, 0.0, 5.0, 10.0, 14.9, 15.0] {
            assert_eq!(value_to_amount(v), 0.0, "v = {v}");
        }
    }

    #[test]
    fn amount_is_monotonic_and_reaches_one() {
        let mut prev = 0.0;
        for i in 0..=400 {
            let v = 5.0 + f64::from(i) * 0.1;
            let a = value_to_amount(v);
            assert!(a >= prev);
            prev = a;
        }
        assert_eq!(value_to_amount(45.0), 1.0);
        assert_eq!(value_to_amount(60.0), 1.0);
        assert_eq!(value_to_amount(30.0), 0.25);
        assert_eq!(value_to_amount(f64::NAN), 0.0);
    }

    #[test]
    fn labels_are_banded() {
        assert_eq!(label_for(5.0), "5–9%");
        assert_eq!(label_for(9.0), "5–9%");
        assert_eq!(label_for(22.0), "20–24%");
        assert_eq!(label_for(39.0), "35–39%");
        assert_eq!(label_for(40.0), ">40%");
        assert_eq!(label_for(44.0), ">40%");
        assert_eq!(label_for(2.0), "5–9%");
    }

    #[test]
    fn marker_spans_slider() {
        let s = SliderRange::default();
        assert_eq!(marker_percent(5.0, &s), 0.0);
        assert_eq!(marker_percent(45.0, &s), 100.0);
        assert!((marker_percent(22.0, &s) - 42.5).abs() < 1e-9);
        assert_eq!(marker_percent(100.0, &s), 100.0);
    }
}
