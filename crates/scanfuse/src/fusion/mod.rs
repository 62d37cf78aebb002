//! Depth-source consensus fusion.
//!
//! Per working-resolution pixel the engine resamples every source, takes a
//! confidence-weighted median consensus, then folds each source's truncated
//! residual back in with a trust weight (TSDF-style): closer surfaces and
//! flatter neighborhoods are trusted more, near-grazing viewing geometry is
//! not fused at all. Scratch buffers are allocated once at construction and
//! overwritten each call; the result buffers are handed to the caller.

mod consensus;
mod resample;

pub use consensus::{weighted_median, ConsensusSample};
pub use resample::resample_to_working;

use crate::evidence::{DepthEvidencePackage, DepthSource};
use crate::math;
use crate::quant::DEPTH_INVALID_MM;

/// Maximum number of depth sources fused per frame.
pub const MAX_SOURCES: usize = 4;

/// Tuning constants for the fusion engine. Single source of truth — no
/// threshold literal appears at a use site.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Exponent applied to per-sample confidence in the trust weight.
    pub conf_exponent: f64,
    /// Depth-trust scale (mm): weight halves at this consensus depth.
    pub depth_trust_scale_mm: f64,
    /// Gradient-trust scale (mm per pixel) for the local consensus gradient.
    pub grad_scale_mm: f64,
    /// Exponent applied to `max(0, cos(view_angle))`.
    pub angle_exponent: f64,
    /// Truncation distance at the reference depth (mm).
    pub base_trunc_mm: f64,
    /// Truncation floor for near objects (mm).
    pub min_trunc_mm: f64,
    /// Reference depth (mm) at which `base_trunc_mm` applies.
    pub trunc_ref_depth_mm: f64,
    /// View angle above which grazing suppression may trigger (radians).
    pub max_view_angle_rad: f64,
    /// Local gradient (mm per pixel) above which grazing suppression triggers.
    pub grazing_grad_threshold_mm: f64,
    /// Fixed low weight recorded for grazing-suppressed pixels.
    pub grazing_weight: f32,
    /// Accumulated weight below which downstream treats a pixel as weak.
    pub min_accumulated_weight: f32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            conf_exponent: 2.0,
            depth_trust_scale_mm: 2_000.0,
            grad_scale_mm: 50.0,
            angle_exponent: 2.0,
            base_trunc_mm: 50.0,
            min_trunc_mm: 8.0,
            trunc_ref_depth_mm: 2_000.0,
            max_view_angle_rad: 75.0 * std::f64::consts::PI / 180.0,
            grazing_grad_threshold_mm: 60.0,
            grazing_weight: 0.05,
            min_accumulated_weight: 0.1,
        }
    }
}

/// Frame-level fusion summary.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct FusionStats {
    /// Fraction of working-resolution pixels with a valid consensus.
    pub valid_ratio: f64,
    /// Mean accumulated weight over valid pixels.
    pub mean_weight: f64,
    /// Mean per-sample confidence over all contributing samples.
    pub mean_confidence: f64,
    /// Sources that contributed to this frame, in input order.
    pub sources_used: Vec<DepthSource>,
}

/// Fused depth map with per-pixel weight and source agreement.
#[derive(Debug, Clone)]
pub struct FusedDepthResult {
    /// Fused depth, millimeters, sentinel `0` where no source was valid.
    pub depth_mm: Vec<i32>,
    /// Accumulated fusion weight per pixel (non-negative).
    pub weight: Vec<f32>,
    /// Bit `i` set iff source `i`'s unclamped residual was within the
    /// truncation bound at that pixel.
    pub agreement: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub stats: FusionStats,
}

/// Fuses 1–4 resampled depth sources into one map per frame.
///
/// Owns its working-resolution scratch exclusively; create once per session
/// and call [`DepthFusionEngine::fuse`] per frame.
pub struct DepthFusionEngine {
    width: usize,
    height: usize,
    config: FusionConfig,
    scratch_depth: Vec<Vec<i32>>,
    scratch_conf: Vec<Vec<f64>>,
    consensus: Vec<i32>,
    grad_mm: Vec<f64>,
}

impl DepthFusionEngine {
    /// Allocate an engine for a fixed working resolution.
    pub fn new(width: usize, height: usize, config: FusionConfig) -> Self {
        assert!(width > 0 && height > 0, "working resolution must be non-empty");
        let n = width * height;
        Self {
            width,
            height,
            config,
            scratch_depth: (0..MAX_SOURCES).map(|_| vec![DEPTH_INVALID_MM; n]).collect(),
            scratch_conf: (0..MAX_SOURCES).map(|_| vec![0.0; n]).collect(),
            consensus: vec![DEPTH_INVALID_MM; n],
            grad_mm: vec![0.0; n],
        }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Fuse one frame of depth evidence.
    ///
    /// `view_angle_rad`, when present, is a per-working-pixel map of the
    /// angle between the viewing ray and the surface normal.
    ///
    /// # Panics
    /// If `sources` is empty or holds more than [`MAX_SOURCES`] packages, or
    /// if the view-angle map length differs from the working area. Malformed
    /// source buffers panic in [`DepthEvidencePackage::new`] long before this
    /// call; degenerate pixels (no valid source) are data, not errors.
    pub fn fuse(
        &mut self,
        sources: &[DepthEvidencePackage],
        view_angle_rad: Option<&[f32]>,
    ) -> FusedDepthResult {
        assert!(
            (1..=MAX_SOURCES).contains(&sources.len()),
            "fuse() requires 1..=4 sources, got {}",
            sources.len()
        );
        let n = self.width * self.height;
        if let Some(angles) = view_angle_rad {
            assert_eq!(angles.len(), n, "view-angle map length mismatch");
        }

        for (i, pkg) in sources.iter().enumerate() {
            resample_to_working(
                pkg,
                self.width,
                self.height,
                &mut self.scratch_depth[i],
                &mut self.scratch_conf[i],
            );
        }

        self.compute_consensus(sources);
        self.compute_consensus_gradient();

        let mut out_depth = vec![DEPTH_INVALID_MM; n];
        let mut out_weight = vec![0.0f32; n];
        let mut out_mask = vec![0u8; n];

        let mut valid_px = 0usize;
        let mut weight_sum = 0.0f64;
        let mut conf_sum = 0.0f64;
        let mut conf_count = 0usize;

        for y in 0..self.height {
            for x in 0..self.width {
                let idx = y * self.width + x;
                let z_c = self.consensus[idx];
                if z_c == DEPTH_INVALID_MM {
                    continue;
                }
                valid_px += 1;
                let z_cf = z_c as f64;
                let grad = self.grad_mm[idx];
                let angle = view_angle_rad.map(|a| a[idx] as f64);

                let mu = self
                    .config
                    .min_trunc_mm
                    .max(self.config.base_trunc_mm * z_cf / self.config.trunc_ref_depth_mm);

                // Near-parallel viewing over a steep neighborhood: keep the
                // consensus verbatim with a fixed low weight.
                let grazing = matches!(angle, Some(a) if a > self.config.max_view_angle_rad)
                    && grad > self.config.grazing_grad_threshold_mm;

                let depth_w = 1.0 / (1.0 + z_cf / self.config.depth_trust_scale_mm);
                let grad_w = 1.0 / (1.0 + grad / self.config.grad_scale_mm);
                let angle_w = match angle {
                    Some(a) => {
                        let c = math::cos(a).max(0.0);
                        math::powf(c, self.config.angle_exponent)
                    }
                    None => 1.0,
                };

                let mut num = 0.0f64;
                let mut acc_w = 0.0f64;
                let mut mask = 0u8;
                for (i, pkg) in sources.iter().enumerate() {
                    let z_i = self.scratch_depth[i][idx];
                    if !pkg.is_valid_depth(z_i) {
                        continue;
                    }
                    let conf = self.scratch_conf[i][idx];
                    conf_sum += conf;
                    conf_count += 1;

                    let r_raw = z_i as f64 - z_cf;
                    if r_raw.abs() <= mu {
                        mask |= 1 << pkg.source().bit();
                    }
                    if grazing {
                        continue;
                    }
                    let r = math::clamp(r_raw, -mu, mu);
                    let w = math::powf(conf, self.config.conf_exponent)
                        * depth_w
                        * grad_w
                        * angle_w;
                    num += r * w;
                    acc_w += w;
                }

                out_mask[idx] = mask;
                if grazing {
                    out_depth[idx] = z_c;
                    out_weight[idx] = self.config.grazing_weight;
                    weight_sum += self.config.grazing_weight as f64;
                } else if acc_w > 0.0 {
                    out_depth[idx] = (z_cf + num / acc_w + 0.5) as i32;
                    out_weight[idx] = acc_w as f32;
                    weight_sum += acc_w;
                } else {
                    // All trust weights vanished: consensus with zero weight.
                    out_depth[idx] = z_c;
                    out_weight[idx] = 0.0;
                }
            }
        }

        let stats = FusionStats {
            valid_ratio: valid_px as f64 / n as f64,
            mean_weight: if valid_px > 0 {
                weight_sum / valid_px as f64
            } else {
                0.0
            },
            mean_confidence: if conf_count > 0 {
                conf_sum / conf_count as f64
            } else {
                0.0
            },
            sources_used: sources.iter().map(|p| p.source()).collect(),
        };
        tracing::debug!(
            valid_ratio = stats.valid_ratio,
            mean_weight = stats.mean_weight,
            mean_confidence = stats.mean_confidence,
            n_sources = sources.len(),
            "depth fusion complete"
        );

        FusedDepthResult {
            depth_mm: out_depth,
            weight: out_weight,
            agreement: out_mask,
            width: self.width,
            height: self.height,
            stats,
        }
    }

    fn compute_consensus(&mut self, sources: &[DepthEvidencePackage]) {
        let n = self.width * self.height;
        for idx in 0..n {
            let mut samples = [ConsensusSample {
                depth_mm: 0,
                confidence: 0.0,
                source_idx: 0,
            }; MAX_SOURCES];
            let mut count = 0usize;
            for (i, pkg) in sources.iter().enumerate() {
                let z = self.scratch_depth[i][idx];
                if pkg.is_valid_depth(z) {
                    samples[count] = ConsensusSample {
                        depth_mm: z,
                        confidence: self.scratch_conf[i][idx],
                        source_idx: pkg.source().priority(),
                    };
                    count += 1;
                }
            }
            self.consensus[idx] = weighted_median(&mut samples[..count]).unwrap_or(DEPTH_INVALID_MM);
        }
    }

    /// Central-difference gradient magnitude of the consensus map (mm/px),
    /// falling back to one-sided differences beside invalid neighbors.
    fn compute_consensus_gradient(&mut self) {
        let w = self.width;
        let h = self.height;
        for y in 0..h {
            for x in 0..w {
                let idx = y * w + x;
                let c = self.consensus[idx];
                if c == DEPTH_INVALID_MM {
                    self.grad_mm[idx] = 0.0;
                    continue;
                }
                let sample = |xx: isize, yy: isize| -> Option<f64> {
                    if xx < 0 || yy < 0 || xx >= w as isize || yy >= h as isize {
                        return None;
                    }
                    let v = self.consensus[yy as usize * w + xx as usize];
                    (v != DEPTH_INVALID_MM).then_some(v as f64)
                };
                let xi = x as isize;
                let yi = y as isize;
                let cf = c as f64;
                let gx = match (sample(xi - 1, yi), sample(xi + 1, yi)) {
                    (Some(l), Some(r)) => (r - l) * 0.5,
                    (None, Some(r)) => r - cf,
                    (Some(l), None) => cf - l,
                    (None, None) => 0.0,
                };
                let gy = match (sample(xi, yi - 1), sample(xi, yi + 1)) {
                    (Some(u), Some(d)) => (d - u) * 0.5,
                    (None, Some(d)) => d - cf,
                    (Some(u), None) => cf - u,
                    (None, None) => 0.0,
                };
                self.grad_mm[idx] = math::sqrt(gx * gx + gy * gy);
            }
        }
    }
}
