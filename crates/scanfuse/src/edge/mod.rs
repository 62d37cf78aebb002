//! Continuous multi-type edge scoring.
//!
//! From one RGB frame plus the fused depth map, a single fused traversal
//! computes grayscale, Sobel gradients, HSV, and the relative depth gradient,
//! then turns them into four smooth per-pixel edge-type scores. Each score is
//! a product of logistic factors over (feature, threshold, transition-width)
//! triples, so every score is a monotone function of its inputs rather than a
//! hard-thresholded class.

mod features;

pub use features::{
    local_energy, rec601_gray, relative_depth_gradient, rgb_to_hsv, sobel_magnitude,
    BrightnessStretch,
};

use crate::math::{sigmoid_edge, sigmoid_edge_falling};
use crate::quant::DEPTH_INVALID_MM;

/// Thresholds and transition widths for the four edge-type scores.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    /// Color-gradient threshold shared by geometric and textural scores.
    pub color_grad_threshold: f64,
    pub color_grad_width: f64,
    /// Relative depth-gradient threshold for the geometric score.
    pub depth_grad_threshold: f64,
    pub depth_grad_width: f64,
    /// Depth-confidence threshold for the geometric score.
    pub conf_threshold: f64,
    pub conf_width: f64,
    /// Depth flatness gate for the textural score (low depth gradient).
    pub flat_depth_grad_threshold: f64,
    pub flat_depth_grad_width: f64,
    /// Local gray-energy threshold for the textural frequency factor.
    pub texture_energy_threshold: f64,
    pub texture_energy_width: f64,
    /// Stretched-brightness threshold for the specular score.
    pub specular_brightness_threshold: f64,
    pub specular_brightness_width: f64,
    /// Saturation ceiling for the specular score (specular highlights desaturate).
    pub specular_saturation_threshold: f64,
    pub specular_saturation_width: f64,
    /// Depth-confidence ceiling for the specular score.
    pub specular_conf_threshold: f64,
    pub specular_conf_width: f64,
    /// Color-gradient ceiling for the transparent score.
    pub transparent_color_grad_threshold: f64,
    pub transparent_color_grad_width: f64,
    /// Depth-conflict floor for the transparent score.
    pub depth_conflict_threshold: f64,
    pub depth_conflict_width: f64,
    /// Any score above this counts toward edge density.
    pub density_threshold: f64,
    /// Percentile stretch is skipped below this measured dynamic range.
    pub min_dynamic_range: f64,
    /// Reliability of each edge type for downstream reconstruction,
    /// ordered geometric/textural/specular/transparent.
    pub reliability: [f64; 4],
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            color_grad_threshold: 0.08,
            color_grad_width: 0.06,
            depth_grad_threshold: 0.03,
            depth_grad_width: 0.03,
            conf_threshold: 0.35,
            conf_width: 0.30,
            flat_depth_grad_threshold: 0.02,
            flat_depth_grad_width: 0.02,
            texture_energy_threshold: 0.04,
            texture_energy_width: 0.04,
            specular_brightness_threshold: 0.85,
            specular_brightness_width: 0.12,
            specular_saturation_threshold: 0.25,
            specular_saturation_width: 0.20,
            specular_conf_threshold: 0.40,
            specular_conf_width: 0.30,
            transparent_color_grad_threshold: 0.06,
            transparent_color_grad_width: 0.05,
            depth_conflict_threshold: 0.08,
            depth_conflict_width: 0.06,
            density_threshold: 0.5,
            min_dynamic_range: 0.10,
            reliability: [0.95, 0.70, 0.30, 0.15],
        }
    }
}

/// Per-frame edge scoring output. Transient: no cross-frame state.
#[derive(Debug, Clone)]
pub struct EdgeScoreResult {
    pub geometric: Vec<f32>,
    pub textural: Vec<f32>,
    pub specular: Vec<f32>,
    pub transparent: Vec<f32>,
    pub width: usize,
    pub height: usize,
    pub stats: EdgeStats,
}

/// Frame-level aggregates of the edge scores.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct EdgeStats {
    /// Unweighted means over valid-depth pixels, ordered
    /// geometric/textural/specular/transparent.
    pub means: [f64; 4],
    /// Fraction of pixels where any score exceeds the density threshold.
    pub edge_density: f64,
    /// Reliability-weighted average of the four means.
    pub overall_confidence: f64,
}

/// Computes the four edge-type score maps for one frame.
///
/// Owns a gray scratch buffer sized to the working resolution; create once,
/// score many frames.
pub struct EdgeScorer {
    width: usize,
    height: usize,
    config: EdgeConfig,
    gray: Vec<f64>,
    hist: [u32; 256],
}

impl EdgeScorer {
    pub fn new(width: usize, height: usize, config: EdgeConfig) -> Self {
        assert!(width > 0 && height > 0, "working resolution must be non-empty");
        Self {
            width,
            height,
            config,
            gray: vec![0.0; width * height],
            hist: [0; 256],
        }
    }

    pub fn config(&self) -> &EdgeConfig {
        &self.config
    }

    /// Score one frame.
    ///
    /// `rgb` is tightly packed RGB8, `fused_depth_mm` the fusion output, and
    /// `depth_conf` a `[0, 1]` per-pixel depth confidence.
    ///
    /// # Panics
    /// If any buffer length disagrees with the working resolution.
    pub fn compute_scores(
        &mut self,
        rgb: &[u8],
        fused_depth_mm: &[i32],
        depth_conf: &[f32],
    ) -> EdgeScoreResult {
        let n = self.width * self.height;
        assert_eq!(rgb.len(), 3 * n, "rgb buffer length must be 3*width*height");
        assert_eq!(fused_depth_mm.len(), n, "depth buffer length mismatch");
        assert_eq!(depth_conf.len(), n, "confidence buffer length mismatch");

        // Pass 1: gray plus the brightness histogram for the stretch.
        self.hist = [0; 256];
        for idx in 0..n {
            let r = rgb[3 * idx];
            let g = rgb[3 * idx + 1];
            let b = rgb[3 * idx + 2];
            let gray = rec601_gray(r, g, b);
            self.gray[idx] = gray;
            let (_h, _s, v) = rgb_to_hsv(r, g, b);
            self.hist[(v * 255.0 + 0.5) as usize & 0xff] += 1;
        }
        let stretch =
            BrightnessStretch::from_histogram(&self.hist, n, self.config.min_dynamic_range);

        let mut geometric = vec![0.0f32; n];
        let mut textural = vec![0.0f32; n];
        let mut specular = vec![0.0f32; n];
        let mut transparent = vec![0.0f32; n];

        let cfg = &self.config;
        let mut sums = [0.0f64; 4];
        let mut valid_px = 0usize;
        let mut dense_px = 0usize;

        // Pass 2: all remaining features and the four scores.
        for y in 0..self.height {
            for x in 0..self.width {
                let idx = y * self.width + x;
                let color_grad = sobel_magnitude(&self.gray, self.width, self.height, x, y);
                let energy = local_energy(&self.gray, self.width, self.height, x, y);
                let depth_grad =
                    relative_depth_gradient(fused_depth_mm, self.width, self.height, x, y);
                let (_h, sat, val) = rgb_to_hsv(rgb[3 * idx], rgb[3 * idx + 1], rgb[3 * idx + 2]);
                let brightness = stretch.apply(val);
                let conf = depth_conf[idx] as f64;

                let geo = sigmoid_edge(color_grad, cfg.color_grad_threshold, cfg.color_grad_width)
                    * sigmoid_edge(depth_grad, cfg.depth_grad_threshold, cfg.depth_grad_width)
                    * sigmoid_edge(conf, cfg.conf_threshold, cfg.conf_width);
                let tex = sigmoid_edge(color_grad, cfg.color_grad_threshold, cfg.color_grad_width)
                    * sigmoid_edge_falling(
                        depth_grad,
                        cfg.flat_depth_grad_threshold,
                        cfg.flat_depth_grad_width,
                    )
                    * sigmoid_edge(energy, cfg.texture_energy_threshold, cfg.texture_energy_width);
                let spec = sigmoid_edge(
                    brightness,
                    cfg.specular_brightness_threshold,
                    cfg.specular_brightness_width,
                ) * sigmoid_edge_falling(
                    sat,
                    cfg.specular_saturation_threshold,
                    cfg.specular_saturation_width,
                ) * sigmoid_edge_falling(
                    conf,
                    cfg.specular_conf_threshold,
                    cfg.specular_conf_width,
                );
                let trans = sigmoid_edge_falling(
                    color_grad,
                    cfg.transparent_color_grad_threshold,
                    cfg.transparent_color_grad_width,
                ) * sigmoid_edge(
                    depth_grad,
                    cfg.depth_conflict_threshold,
                    cfg.depth_conflict_width,
                );

                geometric[idx] = geo as f32;
                textural[idx] = tex as f32;
                specular[idx] = spec as f32;
                transparent[idx] = trans as f32;

                if fused_depth_mm[idx] != DEPTH_INVALID_MM {
                    valid_px += 1;
                    sums[0] += geo;
                    sums[1] += tex;
                    sums[2] += spec;
                    sums[3] += trans;
                }
                let any_dense = geo > cfg.density_threshold
                    || tex > cfg.density_threshold
                    || spec > cfg.density_threshold
                    || trans > cfg.density_threshold;
                if any_dense {
                    dense_px += 1;
                }
            }
        }

        let means = if valid_px > 0 {
            let inv = 1.0 / valid_px as f64;
            [sums[0] * inv, sums[1] * inv, sums[2] * inv, sums[3] * inv]
        } else {
            [0.0; 4]
        };
        let mean_total: f64 = means.iter().sum();
        let overall_confidence = if mean_total > 0.0 {
            means
                .iter()
                .zip(cfg.reliability.iter())
                .map(|(m, r)| m * r)
                .sum::<f64>()
                / mean_total
        } else {
            0.0
        };
        let stats = EdgeStats {
            means,
            edge_density: dense_px as f64 / n as f64,
            overall_confidence,
        };
        tracing::debug!(
            geometric = stats.means[0],
            textural = stats.means[1],
            specular = stats.means[2],
            transparent = stats.means[3],
            edge_density = stats.edge_density,
            "edge scoring complete"
        );

        EdgeScoreResult {
            geometric,
            textural,
            specular,
            transparent,
            width: self.width,
            height: self.height,
            stats,
        }
    }

    /// Convenience wrapper over [`EdgeScorer::compute_scores`] for an
    /// [`image::RgbImage`] already at the working resolution.
    pub fn compute_scores_image(
        &mut self,
        rgb: &image::RgbImage,
        fused_depth_mm: &[i32],
        depth_conf: &[f32],
    ) -> EdgeScoreResult {
        assert_eq!(
            (rgb.width() as usize, rgb.height() as usize),
            (self.width, self.height),
            "rgb frame must already be at the working resolution"
        );
        self.compute_scores(rgb.as_raw(), fused_depth_mm, depth_conf)
    }
}
