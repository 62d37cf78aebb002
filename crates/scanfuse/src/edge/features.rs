//! Per-pixel features for edge scoring.
//!
//! All color math is closed-form with fixed coefficients — Rec.601 luma and
//! algebraic HSV — never a platform color-conversion routine, so feature
//! values are identical on every device.

use crate::math;
use crate::quant::DEPTH_INVALID_MM;

/// Rec.601 luma in `[0, 1]` from 8-bit RGB.
#[inline]
pub fn rec601_gray(r: u8, g: u8, b: u8) -> f64 {
    (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64) / 255.0
}

/// Closed-form HSV from 8-bit RGB: hue in degrees `[0, 360)`, saturation and
/// value in `[0, 1]`.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f64, f64, f64) {
    let rf = r as f64 / 255.0;
    let gf = g as f64 / 255.0;
    let bf = b as f64 / 255.0;
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let v = max;
    let s = if max > 0.0 { delta / max } else { 0.0 };
    let h = if delta <= 0.0 {
        0.0
    } else if max == rf {
        let mut h = 60.0 * ((gf - bf) / delta);
        if h < 0.0 {
            h += 360.0;
        }
        h
    } else if max == gf {
        60.0 * ((bf - rf) / delta) + 120.0
    } else {
        60.0 * ((rf - gf) / delta) + 240.0
    };
    (h, s, v)
}

/// Sobel gradient magnitude at `(x, y)` over a `[0, 1]` gray buffer, with the
/// fixed 3x3 kernels and divisor 8. Returns 0 on the 1-pixel border.
pub fn sobel_magnitude(gray: &[f64], width: usize, height: usize, x: usize, y: usize) -> f64 {
    if x == 0 || y == 0 || x + 1 >= width || y + 1 >= height {
        return 0.0;
    }
    let at = |xx: usize, yy: usize| gray[yy * width + xx];
    let gx = (at(x + 1, y - 1) + 2.0 * at(x + 1, y) + at(x + 1, y + 1)
        - at(x - 1, y - 1)
        - 2.0 * at(x - 1, y)
        - at(x - 1, y + 1))
        / 8.0;
    let gy = (at(x - 1, y + 1) + 2.0 * at(x, y + 1) + at(x + 1, y + 1)
        - at(x - 1, y - 1)
        - 2.0 * at(x, y - 1)
        - at(x + 1, y - 1))
        / 8.0;
    math::sqrt(gx * gx + gy * gy)
}

/// Local 3x3 standard deviation of gray, the frequency-energy proxy used by
/// the textural score. Returns 0 on the 1-pixel border.
pub fn local_energy(gray: &[f64], width: usize, height: usize, x: usize, y: usize) -> f64 {
    if x == 0 || y == 0 || x + 1 >= width || y + 1 >= height {
        return 0.0;
    }
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for yy in y - 1..=y + 1 {
        for xx in x - 1..=x + 1 {
            let v = gray[yy * width + xx];
            sum += v;
            sum_sq += v * v;
        }
    }
    let mean = sum / 9.0;
    let var = (sum_sq / 9.0 - mean * mean).max(0.0);
    math::sqrt(var)
}

/// Relative depth gradient magnitude at `(x, y)`: central differences
/// normalized by the local depth, one-sided beside invalid neighbors, zero
/// where the center itself is invalid.
pub fn relative_depth_gradient(
    depth_mm: &[i32],
    width: usize,
    height: usize,
    x: usize,
    y: usize,
) -> f64 {
    let c = depth_mm[y * width + x];
    if c == DEPTH_INVALID_MM {
        return 0.0;
    }
    let cf = c as f64;
    let sample = |xx: isize, yy: isize| -> Option<f64> {
        if xx < 0 || yy < 0 || xx >= width as isize || yy >= height as isize {
            return None;
        }
        let v = depth_mm[yy as usize * width + xx as usize];
        (v != DEPTH_INVALID_MM).then_some(v as f64)
    };
    let xi = x as isize;
    let yi = y as isize;
    let dzx = match (sample(xi - 1, yi), sample(xi + 1, yi)) {
        (Some(l), Some(r)) => (r - l) * 0.5,
        (None, Some(r)) => r - cf,
        (Some(l), None) => cf - l,
        (None, None) => 0.0,
    };
    let dzy = match (sample(xi, yi - 1), sample(xi, yi + 1)) {
        (Some(u), Some(d)) => (d - u) * 0.5,
        (None, Some(d)) => d - cf,
        (Some(u), None) => cf - u,
        (None, None) => 0.0,
    };
    math::sqrt(dzx * dzx + dzy * dzy) / cf
}

/// Percentile-stretch brightness normalization.
///
/// Derived from a 256-bin brightness histogram: the p10/p90 percentiles are
/// mapped to 0/1 to cancel cross-device exposure drift. When the measured
/// dynamic range is below `min_span` the stretch is the identity.
#[derive(Debug, Clone, Copy)]
pub struct BrightnessStretch {
    lo: f64,
    inv_span: f64,
    identity: bool,
}

impl BrightnessStretch {
    /// Build from a 256-bin histogram over `total` brightness samples.
    pub fn from_histogram(hist: &[u32; 256], total: usize, min_span: f64) -> Self {
        if total == 0 {
            return Self::identity();
        }
        let lo_bin = percentile_bin(hist, total, 0.10);
        let hi_bin = percentile_bin(hist, total, 0.90);
        let lo = lo_bin as f64 / 255.0;
        let hi = hi_bin as f64 / 255.0;
        let span = hi - lo;
        if span < min_span {
            return Self::identity();
        }
        Self {
            lo,
            inv_span: 1.0 / span,
            identity: false,
        }
    }

    pub fn identity() -> Self {
        Self {
            lo: 0.0,
            inv_span: 1.0,
            identity: true,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.identity
    }

    /// Normalize one brightness value into `[0, 1]`.
    #[inline]
    pub fn apply(&self, v: f64) -> f64 {
        if self.identity {
            v
        } else {
            math::clamp((v - self.lo) * self.inv_span, 0.0, 1.0)
        }
    }
}

/// Lowest bin whose cumulative count reaches `fraction` of `total`.
fn percentile_bin(hist: &[u32; 256], total: usize, fraction: f64) -> usize {
    let target = (total as f64 * fraction) as u64;
    let mut cum: u64 = 0;
    for (bin, &count) in hist.iter().enumerate() {
        cum += count as u64;
        if cum > target {
            return bin;
        }
    }
    255
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn gray_uses_rec601_coefficients() {
        assert_relative_eq!(rec601_gray(255, 255, 255), 1.0, epsilon = 1e-12);
        assert_relative_eq!(rec601_gray(0, 0, 0), 0.0, epsilon = 1e-12);
        assert_relative_eq!(rec601_gray(255, 0, 0), 0.299, epsilon = 1e-12);
        assert_relative_eq!(rec601_gray(0, 255, 0), 0.587, epsilon = 1e-12);
        assert_relative_eq!(rec601_gray(0, 0, 255), 0.114, epsilon = 1e-12);
    }

    #[test]
    fn hsv_matches_known_colors() {
        let (h, s, v) = rgb_to_hsv(255, 0, 0);
        assert_relative_eq!(h, 0.0, epsilon = 1e-9);
        assert_relative_eq!(s, 1.0, epsilon = 1e-9);
        assert_relative_eq!(v, 1.0, epsilon = 1e-9);

        let (h, s, v) = rgb_to_hsv(0, 255, 0);
        assert_relative_eq!(h, 120.0, epsilon = 1e-9);
        assert_relative_eq!(s, 1.0, epsilon = 1e-9);
        assert_relative_eq!(v, 1.0, epsilon = 1e-9);

        // Mid-gray: zero saturation, hue pinned to 0.
        let (h, s, v) = rgb_to_hsv(128, 128, 128);
        assert_relative_eq!(h, 0.0, epsilon = 1e-9);
        assert_relative_eq!(s, 0.0, epsilon = 1e-9);
        assert_relative_eq!(v, 128.0 / 255.0, epsilon = 1e-9);
    }

    #[test]
    fn sobel_is_zero_on_flat_field_and_border() {
        let w = 5;
        let h = 4;
        let gray = vec![0.5; w * h];
        for y in 0..h {
            for x in 0..w {
                assert_eq!(sobel_magnitude(&gray, w, h, x, y), 0.0);
            }
        }
    }

    #[test]
    fn sobel_detects_vertical_step() {
        let w = 6;
        let h = 5;
        let mut gray = vec![0.0; w * h];
        for y in 0..h {
            for x in 3..w {
                gray[y * w + x] = 1.0;
            }
        }
        // Step between x=2 and x=3: kernel straddling it sees magnitude 0.5.
        let m = sobel_magnitude(&gray, w, h, 2, 2);
        assert_relative_eq!(m, 0.5, epsilon = 1e-12);
        // Border stays zero even on the step row.
        assert_eq!(sobel_magnitude(&gray, w, h, 0, 2), 0.0);
    }

    #[test]
    fn local_energy_is_zero_on_flat_and_positive_on_texture() {
        let w = 5;
        let h = 5;
        let flat = vec![0.3; w * h];
        assert_eq!(local_energy(&flat, w, h, 2, 2), 0.0);

        let mut checker = vec![0.0; w * h];
        for y in 0..h {
            for x in 0..w {
                if (x + y) % 2 == 0 {
                    checker[y * w + x] = 1.0;
                }
            }
        }
        assert!(local_energy(&checker, w, h, 2, 2) > 0.4);
    }

    #[test]
    fn depth_gradient_is_relative_to_depth() {
        let w = 3;
        let h = 1;
        // Same absolute step, different depths: nearer pixel sees a larger
        // relative gradient.
        let near = vec![1000, 1100, 1200];
        let far = vec![4000, 4100, 4200];
        let g_near = relative_depth_gradient(&near, w, h, 1, 0);
        let g_far = relative_depth_gradient(&far, w, h, 1, 0);
        assert!(g_near > g_far);
        assert_relative_eq!(g_near, 100.0 / 1100.0, epsilon = 1e-12);
    }

    #[test]
    fn depth_gradient_skips_invalid_pixels() {
        let w = 3;
        let h = 1;
        let buf = vec![1000, DEPTH_INVALID_MM, 1200];
        assert_eq!(relative_depth_gradient(&buf, w, h, 1, 0), 0.0);
        // Valid center with an invalid neighbor: one-sided difference.
        let buf2 = vec![DEPTH_INVALID_MM, 1000, 1200];
        let g = relative_depth_gradient(&buf2, w, h, 1, 0);
        assert_relative_eq!(g, 200.0 / 1000.0, epsilon = 1e-12);
    }

    #[test]
    fn stretch_expands_narrow_histograms_above_min_span() {
        let mut hist = [0u32; 256];
        // Brightness concentrated between bins 64 and 192.
        hist[64] = 500;
        hist[192] = 500;
        let stretch = BrightnessStretch::from_histogram(&hist, 1000, 0.1);
        assert!(!stretch.is_identity());
        assert_relative_eq!(stretch.apply(64.0 / 255.0), 0.0, epsilon = 1e-9);
        assert_relative_eq!(stretch.apply(192.0 / 255.0), 1.0, epsilon = 1e-9);
        assert!(stretch.apply(128.0 / 255.0) > 0.4 && stretch.apply(128.0 / 255.0) < 0.6);
    }

    #[test]
    fn stretch_is_identity_below_min_dynamic_range() {
        let mut hist = [0u32; 256];
        hist[100] = 1000; // all mass in one bin: span 0
        let stretch = BrightnessStretch::from_histogram(&hist, 1000, 0.1);
        assert!(stretch.is_identity());
        assert_relative_eq!(stretch.apply(0.42), 0.42, epsilon = 1e-12);
    }
}
