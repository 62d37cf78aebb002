//! Soft gain functions.
//!
//! Pure, stateless mappings from the engines' frame aggregates to four
//! bounded, monotone scalars and their fixed convex combination. Each gain
//! lives in `[floor, 1]`; the floors keep one bad dimension from zeroing the
//! whole frame's quality. The caller multiplies the combined `soft_quality`
//! into an externally computed binary-admission gate quality — the gate's
//! decision logic never lives here.

use crate::math;

/// Floors, combination weights, and shape constants for the soft gains.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GainConfig {
    pub depth_floor: f64,
    pub edge_floor: f64,
    pub topo_floor: f64,
    pub base_floor: f64,
    /// Convex combination weights over depth/edge/topo/base; must sum to 1.
    pub weights: [f64; 4],
    /// Blend of valid-ratio / mean-confidence / weight terms inside
    /// `depth_gain`; must sum to 1.
    pub depth_terms: [f64; 3],
    /// Accumulated weight at which the weight term reaches one half.
    pub weight_half_point: f64,
    /// Blend of geometric-mean / edge-density terms inside `edge_gain`.
    pub edge_terms: [f64; 2],
    /// Edge density saturates the density term at `1 / edge_density_scale`.
    pub edge_density_scale: f64,
    /// Penalty slopes for specular and transparent edge content.
    pub specular_penalty: f64,
    pub transparent_penalty: f64,
    /// Fraction of the gate/soft blend shifted to soft quality at
    /// `progress == 1`.
    pub blend_shift: f64,
}

impl Default for GainConfig {
    fn default() -> Self {
        Self {
            depth_floor: 0.08,
            edge_floor: 0.10,
            topo_floor: 0.08,
            base_floor: 0.15,
            weights: [0.35, 0.25, 0.20, 0.20],
            depth_terms: [0.5, 0.3, 0.2],
            weight_half_point: 0.5,
            edge_terms: [0.6, 0.4],
            edge_density_scale: 4.0,
            specular_penalty: 0.5,
            transparent_penalty: 0.7,
            blend_shift: 0.5,
        }
    }
}

/// The four soft gains of one frame.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct SoftGains {
    pub depth: f64,
    pub edge: f64,
    pub topo: f64,
    pub base: f64,
}

impl SoftGains {
    /// Gains quantized to Q3.60 for bit-exact golden comparison.
    pub fn quantized(&self) -> [i64; 4] {
        [
            crate::quant::quantize_gain(self.depth),
            crate::quant::quantize_gain(self.edge),
            crate::quant::quantize_gain(self.topo),
            crate::quant::quantize_gain(self.base),
        ]
    }
}

#[inline]
fn lift(floor: f64, x: f64) -> f64 {
    floor + (1.0 - floor) * math::clamp(x, 0.0, 1.0)
}

/// Depth-evidence gain.
///
/// Strictly non-decreasing in the consensus valid ratio, the mean source
/// confidence, and the mean accumulated fusion weight. Range
/// `[depth_floor, 1]`.
pub fn depth_gain(
    valid_ratio: f64,
    mean_confidence: f64,
    mean_weight: f64,
    config: &GainConfig,
) -> f64 {
    let vr = math::clamp(valid_ratio, 0.0, 1.0);
    let mc = math::clamp(mean_confidence, 0.0, 1.0);
    // Saturating map of the unbounded weight into [0, 1).
    let w = mean_weight.max(0.0);
    let wn = w / (w + config.weight_half_point);
    let t = &config.depth_terms;
    lift(config.depth_floor, t[0] * vr + t[1] * mc + t[2] * wn)
}

/// Edge-evidence gain.
///
/// Increasing in the geometric score mean and edge density, decreasing in
/// the specular and transparent score means. Range `[edge_floor, 1]`.
pub fn edge_gain(
    geometric_mean: f64,
    edge_density: f64,
    specular_mean: f64,
    transparent_mean: f64,
    config: &GainConfig,
) -> f64 {
    let geo = math::clamp(geometric_mean, 0.0, 1.0);
    let density = math::clamp(edge_density * config.edge_density_scale, 0.0, 1.0);
    let t = &config.edge_terms;
    let support = t[0] * geo + t[1] * density;
    let penalty = math::clamp(
        1.0 - config.specular_penalty * math::clamp(specular_mean, 0.0, 1.0)
            - config.transparent_penalty * math::clamp(transparent_mean, 0.0, 1.0),
        0.0,
        1.0,
    );
    lift(config.edge_floor, support * penalty)
}

/// Topology gain: bounded passthrough of the externally computed hole /
/// occlusion aggregate. Range `[topo_floor, 1]`.
pub fn topo_gain(topo_aggregate: f64, config: &GainConfig) -> f64 {
    lift(config.topo_floor, topo_aggregate)
}

/// Base (temporal) gain from the mean temporal consistency score.
/// Range `[base_floor, 1]`.
pub fn base_gain(mean_consistency: f64, config: &GainConfig) -> f64 {
    lift(config.base_floor, mean_consistency)
}

/// Fixed convex combination of the four gains.
pub fn soft_quality(gains: &SoftGains, config: &GainConfig) -> f64 {
    let w = &config.weights;
    w[0] * gains.depth + w[1] * gains.edge + w[2] * gains.topo + w[3] * gains.base
}

/// Progress-dependent gate/soft blend weights.
///
/// Early in a session the binary gate dominates; as admission-evidence
/// coverage grows, weight shifts toward the soft score. The pair sums to
/// exactly 1 for every `progress` in `[0, 1]`.
pub fn blend_weights(progress: f64, config: &GainConfig) -> (f64, f64) {
    let p = math::clamp(progress, 0.0, 1.0);
    let soft = config.blend_shift * p;
    (1.0 - soft, soft)
}

/// Final frame quality: the externally supplied binary-admission quality
/// multiplicatively gates the soft score.
pub fn final_quality(gate_quality: f64, soft_quality: f64) -> f64 {
    math::clamp(gate_quality, 0.0, 1.0) * math::clamp(soft_quality, 0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn combination_weights_sum_to_one() {
        // Standing invariant, not just a construction-time check.
        let config = GainConfig::default();
        let sum: f64 = config.weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9, "gain weights must sum to 1");
        let dt: f64 = config.depth_terms.iter().sum();
        assert!((dt - 1.0).abs() < 1e-9);
        let et: f64 = config.edge_terms.iter().sum();
        assert!((et - 1.0).abs() < 1e-9);
    }

    #[test]
    fn gains_respect_their_floors_and_ceiling() {
        let config = GainConfig::default();
        for &(vr, mc, mw) in &[
            (0.0, 0.0, 0.0),
            (1.0, 1.0, 1e9),
            (-5.0, 2.0, f64::INFINITY),
            (0.3, 0.7, 0.2),
        ] {
            let g = depth_gain(vr, mc, mw, &config);
            assert!(g >= config.depth_floor && g <= 1.0, "depth gain {g} out of range");
        }
        for &(geo, den, sp, tr) in &[
            (0.0, 0.0, 0.0, 0.0),
            (1.0, 1.0, 0.0, 0.0),
            (1.0, 1.0, 1.0, 1.0),
            (0.5, 0.1, 0.2, 0.05),
        ] {
            let g = edge_gain(geo, den, sp, tr, &config);
            assert!(g >= config.edge_floor && g <= 1.0, "edge gain {g} out of range");
        }
        assert_relative_eq!(topo_gain(-1.0, &config), config.topo_floor);
        assert_relative_eq!(topo_gain(2.0, &config), 1.0);
        assert_relative_eq!(base_gain(0.0, &config), config.base_floor);
        assert_relative_eq!(base_gain(1.0, &config), 1.0);
    }

    #[test]
    fn depth_gain_is_monotone_in_each_input() {
        let config = GainConfig::default();
        let steps: Vec<f64> = (0..=20).map(|i| i as f64 / 20.0).collect();
        let mut prev = 0.0;
        for &vr in &steps {
            let g = depth_gain(vr, 0.5, 0.3, &config);
            assert!(g >= prev, "depth gain decreased with valid ratio");
            prev = g;
        }
        prev = 0.0;
        for &mc in &steps {
            let g = depth_gain(0.5, mc, 0.3, &config);
            assert!(g >= prev, "depth gain decreased with mean confidence");
            prev = g;
        }
        prev = 0.0;
        for &mw in &steps {
            let g = depth_gain(0.5, 0.5, mw * 3.0, &config);
            assert!(g >= prev, "depth gain decreased with accumulated weight");
            prev = g;
        }
    }

    #[test]
    fn edge_gain_is_monotone_with_the_right_signs() {
        let config = GainConfig::default();
        let steps: Vec<f64> = (0..=20).map(|i| i as f64 / 20.0).collect();
        let mut prev = 0.0;
        for &geo in &steps {
            let g = edge_gain(geo, 0.1, 0.1, 0.1, &config);
            assert!(g >= prev);
            prev = g;
        }
        prev = 2.0;
        for &sp in &steps {
            let g = edge_gain(0.6, 0.1, sp, 0.1, &config);
            assert!(g <= prev, "edge gain increased with specular score");
            prev = g;
        }
        prev = 2.0;
        for &tr in &steps {
            let g = edge_gain(0.6, 0.1, 0.1, tr, &config);
            assert!(g <= prev, "edge gain increased with transparent score");
            prev = g;
        }
    }

    #[test]
    fn soft_quality_is_a_convex_combination() {
        let config = GainConfig::default();
        let gains = SoftGains {
            depth: 0.9,
            edge: 0.4,
            topo: 0.6,
            base: 0.8,
        };
        let q = soft_quality(&gains, &config);
        assert!(q >= 0.4 && q <= 0.9, "convex combination must stay in hull");
        let expected = 0.35 * 0.9 + 0.25 * 0.4 + 0.20 * 0.6 + 0.20 * 0.8;
        assert_relative_eq!(q, expected, epsilon = 1e-12);
    }

    #[test]
    fn blend_weights_sum_to_one_for_all_progress() {
        let config = GainConfig::default();
        for i in 0..=1000 {
            let p = i as f64 / 1000.0;
            let (gate_w, soft_w) = blend_weights(p, &config);
            assert_relative_eq!(gate_w + soft_w, 1.0, epsilon = 1e-12);
            assert!(gate_w >= 0.0 && soft_w >= 0.0);
        }
        // Out-of-domain progress clamps rather than breaking the invariant.
        let (g, s) = blend_weights(7.0, &config);
        assert_relative_eq!(g + s, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn gate_quality_multiplicatively_scales_soft_quality() {
        assert_relative_eq!(final_quality(0.0, 0.9), 0.0);
        assert_relative_eq!(final_quality(1.0, 0.9), 0.9);
        assert_relative_eq!(final_quality(0.5, 0.6), 0.3);
    }

    #[test]
    fn quantized_gains_are_stable() {
        let gains = SoftGains {
            depth: 0.123456,
            edge: 0.654321,
            topo: 0.5,
            base: 0.15,
        };
        assert_eq!(gains.quantized(), gains.quantized());
        let q = gains.quantized();
        assert!((crate::quant::dequantize_gain(q[0]) - gains.depth).abs() < 1e-15);
    }
}
