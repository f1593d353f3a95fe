use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::foundation::error::{VizError, VizResult};

/// Complete visualizer configuration. Every field has a default, so `{}` is a valid file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VisualizerConfig {
    pub asset: AssetLocator,
    pub slider: SliderRange,
    pub max_device_pixel_ratio: DevicePixelRatioCap,
    pub calibration: WarpCalibration,
}

/// Base resource name plus the ordered format suffixes to try.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssetLocator {
    pub base: String,
    pub formats: Vec<String>,
}

impl Default for AssetLocator {
    fn default() -> Self {
        Self {
            base: "avatar".to_string(),
            formats: vec![".webp".to_string(), ".png".to_string(), ".jpg".to_string()],
        }
    }
}

impl AssetLocator {
    pub fn candidates(&self) -> Vec<String> {
        self.formats
            .iter()
            .map(|ext| format!("{}{}", self.base, ext))
            .collect()
    }
}

/// Domain of the host slider, used for the marker position.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SliderRange {
    pub min: f64,
    pub max: f64,
}

impl Default for SliderRange {
    fn default() -> Self {
        Self {
            min: 5.0,
            max: 45.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DevicePixelRatioCap(pub f64);

impl Default for DevicePixelRatioCap {
    fn default() -> Self {
        Self(3.0)
    }
}

/// Calibration constants of the torso warp. The defaults reproduce the reference look.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WarpCalibration {
    /// Region top as a fraction of the fitted image height.
    pub region_top: f64,
    /// Region bottom as a fraction of the fitted image height.
    pub region_bottom: f64,
    /// Region width as a fraction of the fitted image width.
    pub region_width: f64,
    /// Waist anchor as a fraction of the region height.
    pub waist: f64,
    /// Denominator of the Gaussian row profile.
    pub profile_falloff: f64,
    pub bulge: f64,
    pub bulge_gain: f64,
    /// Maximum downward sag in pixels, reached at the region bottom.
    pub sag_px: f64,
    pub blur_threshold: f64,
    pub blur_sigma: f32,
    /// Shadow alpha at the outer stop when the amount is 1.
    pub shadow_alpha: f64,
}

impl Default for WarpCalibration {
    fn default() -> Self {
        Self {
            region_top: 0.46,
            region_bottom: 0.80,
            region_width: 0.34,
            waist: 0.36,
            profile_falloff: 0.050,
            bulge: 0.28,
            bulge_gain: 1.08,
            sag_px: 9.0,
            blur_threshold: 0.01,
            blur_sigma: 0.25,
            shadow_alpha: 0.20,
        }
    }
}

impl VisualizerConfig {
    pub fn from_json_str(s: &str) -> VizResult<Self> {
        let cfg: Self = serde_json::from_str(s).context("parse visualizer config JSON")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path(path: &Path) -> VizResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config '{}'", path.display()))?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> VizResult<()> {
        if self.asset.base.trim().is_empty() {
            return Err(VizError::validation("asset.base must be non-empty"));
        }
        if self.asset.formats.is_empty() {
            return Err(VizError::validation(
                "asset.formats must list at least one format",
            ));
        }
        if !(self.slider.min.is_finite() && self.slider.max.is_finite())
            || self.slider.min >= self.slider.max
        {
            return Err(VizError::validation("slider.min must be < slider.max"));
        }
        if !self.max_device_pixel_ratio.0.is_finite() || self.max_device_pixel_ratio.0 < 1.0 {
            return Err(VizError::validation(
                "max_device_pixel_ratio must be >= 1",
            ));
        }
        self.calibration.validate()
    }
}

impl WarpCalibration {
    pub fn validate(&self) -> VizResult<()> {
        let c = self;
        let all_finite = [
            c.region_top,
            c.region_bottom,
            c.region_width,
            c.waist,
            c.profile_falloff,
            c.bulge,
            c.bulge_gain,
            c.sag_px,
            c.blur_threshold,
            f64::from(c.blur_sigma),
            c.shadow_alpha,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !all_finite {
            return Err(VizError::validation(
                "calibration constants must be finite",
            ));
        }
        if !(0.0..1.0).contains(&c.region_top) || c.region_bottom <= c.region_top || c.region_bottom > 1.0
        {
            return Err(VizError::validation(
                "calibration requires 0 <= region_top < region_bottom <= 1",
            ));
        }
        if c.region_width <= 0.0 || c.region_width > 1.0 {
            return Err(VizError::validation(
                "calibration.region_width must be in (0, 1]",
            ));
        }
        if !(0.0..1.0).contains(&c.waist) {
            return Err(VizError::validation("calibration.waist must be in [0, 1)"));
        }
        if c.profile_falloff <= 0.0 {
            return Err(VizError::validation(
                "calibration.profile_falloff must be > 0",
            ));
        }
        if c.bulge < 0.0 || c.bulge_gain < 0.0 || c.sag_px < 0.0 || c.shadow_alpha < 0.0 {
            return Err(VizError::validation(
                "calibration magnitudes must be non-negative",
            ));
        }
        if c.blur_sigma < 0.0 {
            return Err(VizError::validation("calibration.blur_sigma must be >= 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        VisualizerConfig::default().validate().unwrap();
    }

    #[test]
    fn empty_json_is_default() {
        let cfg = VisualizerConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg, VisualizerConfig::default());
    }

    #[test]
    fn partial_json_overrides_fields() {
        let cfg = VisualizerConfig::from_json_str(
            r#"{ "asset": { "formats": [".png"] }, "max_device_pixel_ratio": 2.0 }"#,
        )
        .unwrap();
        assert_eq!(cfg.asset.base, "avatar");
        assert_eq!(cfg.asset.candidates(), vec!["avatar.png"]);
        assert_eq!(cfg.max_device_pixel_ratio.0, 2.0);
        assert_eq!(cfg.calibration, WarpCalibration::default());
    }

    #[test]
    fn candidates_keep_order() {
        assert_eq!(
            AssetLocator::default().candidates(),
            vec!["avatar.webp", "avatar.png", "avatar.jpg"]
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut cfg = VisualizerConfig::default();
        cfg.asset.formats.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = VisualizerConfig::default();
        cfg.slider = SliderRange {
            min: 45.0,
            max: 5.0,
        };
        assert!(cfg.validate().is_err());

        let mut cfg = VisualizerConfig::default();
        cfg.max_device_pixel_ratio = DevicePixelRatioCap(0.5);
        assert!(cfg.validate().is_err());

        let mut cfg = VisualizerConfig::default();
        cfg.calibration.region_bottom = 0.3;
        assert!(cfg.validate().is_err());

        let mut cfg = VisualizerConfig::default();
        cfg.calibration.profile_falloff = f64::NAN;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(VisualizerConfig::from_json_str(r#"{ "colour": "red" }"#).is_err());
    }
}
