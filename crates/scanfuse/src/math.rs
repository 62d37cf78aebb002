//! Portable math facade.
//!
//! Every transcendental evaluation in the scoring pipeline goes through this
//! module — never through `f64::exp`/`f64::ln` directly. The standard library
//! routes those calls to the platform libm, whose rounding differs across
//! hosts; the implementations here use only IEEE-754 add/mul/div with fixed
//! constants plus hardware `sqrt` (correctly rounded by the standard), so the
//! same inputs produce bit-identical outputs on every conforming target.
//!
//! [`MathOps`] is the seam: numeric code takes the operations from this trait
//! (or from the free functions below, which delegate to [`PortableMath`]),
//! and a target with a verified deterministic libm may substitute its own
//! implementation in one place.

/// Arithmetic operations the scoring pipeline is allowed to use.
pub trait MathOps {
    /// Clamp `x` into `[lo, hi]`.
    fn clamp(&self, x: f64, lo: f64, hi: f64) -> f64;
    /// Natural exponential.
    fn exp(&self, x: f64) -> f64;
    /// Natural logarithm. Domain `x > 0`; `ln(0) == -inf`.
    fn ln(&self, x: f64) -> f64;
    /// Square root (IEEE-754 correctly rounded on all targets).
    fn sqrt(&self, x: f64) -> f64;
    /// `base^exponent` for `base > 0`. Non-positive bases return 0.
    fn powf(&self, base: f64, exponent: f64) -> f64;
    /// Cosine on the view-angle domain. Inputs are clamped to `[-pi, pi]`.
    fn cos(&self, x: f64) -> f64;
    /// Logistic function `1 / (1 + exp(-x))`.
    fn sigmoid(&self, x: f64) -> f64 {
        if x >= 0.0 {
            1.0 / (1.0 + self.exp(-x))
        } else {
            let e = self.exp(x);
            e / (1.0 + e)
        }
    }
}

/// Default deterministic implementation of [`MathOps`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PortableMath;

const LN2_HI: f64 = 6.931_471_803_691_238e-1;
const LN2_LO: f64 = 1.908_214_929_270_587_7e-10;
const LOG2_E: f64 = std::f64::consts::LOG2_E;
const EXP_OVERFLOW: f64 = 709.782_712_893_384;
const EXP_UNDERFLOW: f64 = -745.133_219_101_941_2;

/// Reciprocal factorials 1/2! .. 1/13! for the exp Taylor tail.
const EXP_COEFFS: [f64; 12] = [
    0.5,
    1.0 / 6.0,
    1.0 / 24.0,
    1.0 / 120.0,
    1.0 / 720.0,
    1.0 / 5_040.0,
    1.0 / 40_320.0,
    1.0 / 362_880.0,
    1.0 / 3_628_800.0,
    1.0 / 39_916_800.0,
    1.0 / 479_001_600.0,
    1.0 / 6_227_020_800.0,
];

/// Scale `x` by `2^k` via exponent-bit arithmetic (deterministic ldexp).
#[inline]
fn scale_pow2(x: f64, k: i32) -> f64 {
    if k > 1023 {
        // k == 1024 is reachable just below the overflow cutoff.
        x * f64::from_bits((2046u64) << 52) * f64::from_bits(((k - 1023 + 1023) as u64) << 52)
    } else if k >= -1022 {
        x * f64::from_bits(((k + 1023) as u64) << 52)
    } else {
        // Subnormal result range: scale in two exact steps.
        let part = f64::from_bits(((-1000 + 1023) as u64) << 52);
        x * part * f64::from_bits(((k + 1000 + 1023) as u64) << 52)
    }
}

impl MathOps for PortableMath {
    #[inline]
    fn clamp(&self, x: f64, lo: f64, hi: f64) -> f64 {
        if x < lo {
            lo
        } else if x > hi {
            hi
        } else {
            x
        }
    }

    fn exp(&self, x: f64) -> f64 {
        if x.is_nan() {
            return x;
        }
        if x > EXP_OVERFLOW {
            return f64::INFINITY;
        }
        if x < EXP_UNDERFLOW {
            return 0.0;
        }
        // Range reduction: x = k*ln2 + r with |r| <= ln2/2.
        let k = (x * LOG2_E).round();
        let r = (x - k * LN2_HI) - k * LN2_LO;
        // exp(r) = 1 + r + r^2/2! + ... + r^13/13!, Horner from the tail.
        let mut p = EXP_COEFFS[11];
        for i in (0..11).rev() {
            p = p * r + EXP_COEFFS[i];
        }
        let exp_r = 1.0 + r + r * r * p;
        scale_pow2(exp_r, k as i32)
    }

    fn ln(&self, x: f64) -> f64 {
        if x.is_nan() || x < 0.0 {
            return f64::NAN;
        }
        if x == 0.0 {
            return f64::NEG_INFINITY;
        }
        if x.is_infinite() {
            return f64::INFINITY;
        }
        let mut bits = x.to_bits();
        let mut e: i32 = 0;
        // Normalize subnormals so the exponent field is usable.
        if bits < (1u64 << 52) {
            let scaled = x * f64::from_bits(((54 + 1023) as u64) << 52);
            bits = scaled.to_bits();
            e -= 54;
        }
        e += ((bits >> 52) & 0x7ff) as i32 - 1023;
        // m in [1, 2) with the original mantissa.
        let mut m = f64::from_bits((bits & 0x000f_ffff_ffff_ffff) | (1023u64 << 52));
        // Center m on 1 so the artanh series converges fast: m in [sqrt(1/2), sqrt(2)).
        if m > std::f64::consts::SQRT_2 {
            m *= 0.5;
            e += 1;
        }
        let s = (m - 1.0) / (m + 1.0);
        let s2 = s * s;
        // ln(m) = 2*artanh(s) = 2s * (1 + s^2/3 + s^4/5 + ... + s^12/13)
        let mut series = 1.0 / 13.0;
        for d in [11.0, 9.0, 7.0, 5.0, 3.0] {
            series = series * s2 + 1.0 / d;
        }
        let ln_m = 2.0 * s * (1.0 + s2 * series);
        let ef = e as f64;
        ef * LN2_HI + (ln_m + ef * LN2_LO)
    }

    #[inline]
    fn sqrt(&self, x: f64) -> f64 {
        x.sqrt()
    }

    fn powf(&self, base: f64, exponent: f64) -> f64 {
        if base <= 0.0 {
            return 0.0;
        }
        if exponent == 0.0 {
            return 1.0;
        }
        if exponent == 1.0 {
            return base;
        }
        self.exp(exponent * self.ln(base))
    }

    fn cos(&self, x: f64) -> f64 {
        // Even function; fold [pi/2, pi] onto [0, pi/2] with a sign flip.
        let mut u = if x < 0.0 { -x } else { x };
        if u > std::f64::consts::PI {
            u = std::f64::consts::PI;
        }
        let (u, sign) = if u > std::f64::consts::FRAC_PI_2 {
            (std::f64::consts::PI - u, -1.0)
        } else {
            (u, 1.0)
        };
        let u2 = u * u;
        // cos(u) = 1 + u^2*(c1 + u^2*(c2 + ...)), Taylor through u^14.
        let mut p = COS_COEFFS[6];
        for i in (0..6).rev() {
            p = p * u2 + COS_COEFFS[i];
        }
        sign * (1.0 + u2 * p)
    }
}

/// Alternating reciprocal factorials -1/2!, 1/4!, ..., -1/14!.
const COS_COEFFS: [f64; 7] = [
    -0.5,
    1.0 / 24.0,
    -1.0 / 720.0,
    1.0 / 40_320.0,
    -1.0 / 3_628_800.0,
    1.0 / 479_001_600.0,
    -1.0 / 87_178_291_200.0,
];

/// Default logistic slope divisor: a transition width covers the 10%..90%
/// band of the logistic, and `ln(9) - ln(1/9) ≈ 4.4` logits span that band.
pub const TRANSITION_BAND_LOGITS: f64 = 4.4;

#[inline]
pub fn clamp(x: f64, lo: f64, hi: f64) -> f64 {
    PortableMath.clamp(x, lo, hi)
}

#[inline]
pub fn exp(x: f64) -> f64 {
    PortableMath.exp(x)
}

#[inline]
pub fn ln(x: f64) -> f64 {
    PortableMath.ln(x)
}

#[inline]
pub fn sqrt(x: f64) -> f64 {
    PortableMath.sqrt(x)
}

#[inline]
pub fn powf(base: f64, exponent: f64) -> f64 {
    PortableMath.powf(base, exponent)
}

#[inline]
pub fn cos(x: f64) -> f64 {
    PortableMath.cos(x)
}

#[inline]
pub fn sigmoid(x: f64) -> f64 {
    PortableMath.sigmoid(x)
}

/// Smooth rising edge: logistic in `value` centered at `threshold`, whose
/// 10%..90% band spans `transition_width` input units.
#[inline]
pub fn sigmoid_edge(value: f64, threshold: f64, transition_width: f64) -> f64 {
    let slope = (transition_width / TRANSITION_BAND_LOGITS).max(1e-12);
    sigmoid((value - threshold) / slope)
}

/// Smooth falling edge: complement orientation of [`sigmoid_edge`].
#[inline]
pub fn sigmoid_edge_falling(value: f64, threshold: f64, transition_width: f64) -> f64 {
    let slope = (transition_width / TRANSITION_BAND_LOGITS).max(1e-12);
    sigmoid((threshold - value) / slope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn exp_matches_reference_values() {
        assert_relative_eq!(exp(0.0), 1.0, max_relative = 1e-14);
        assert_relative_eq!(exp(1.0), std::f64::consts::E, max_relative = 1e-13);
        assert_relative_eq!(exp(-1.0), 1.0 / std::f64::consts::E, max_relative = 1e-13);
        assert_relative_eq!(exp(10.0), 22026.465794806718, max_relative = 1e-12);
        assert_relative_eq!(exp(-20.0), 2.061153622438558e-9, max_relative = 1e-12);
    }

    #[test]
    fn exp_saturates_at_domain_edges() {
        assert_eq!(exp(800.0), f64::INFINITY);
        assert_eq!(exp(-800.0), 0.0);
    }

    #[test]
    fn ln_matches_reference_values() {
        assert_relative_eq!(ln(1.0), 0.0, epsilon = 1e-15);
        assert_relative_eq!(ln(std::f64::consts::E), 1.0, max_relative = 1e-13);
        assert_relative_eq!(ln(2.0), std::f64::consts::LN_2, max_relative = 1e-13);
        assert_relative_eq!(ln(1000.0), 6.907755278982137, max_relative = 1e-13);
        assert_relative_eq!(ln(1e-6), -13.815510557964274, max_relative = 1e-13);
    }

    #[test]
    fn ln_handles_domain_edges() {
        assert_eq!(ln(0.0), f64::NEG_INFINITY);
        assert!(ln(-1.0).is_nan());
    }

    #[test]
    fn exp_ln_round_trip() {
        for &x in &[0.001, 0.37, 1.0, 12.5, 2000.0] {
            assert_relative_eq!(exp(ln(x)), x, max_relative = 1e-12);
        }
    }

    #[test]
    fn powf_matches_integer_powers() {
        assert_relative_eq!(powf(2.0, 10.0), 1024.0, max_relative = 1e-12);
        assert_relative_eq!(powf(0.9, 2.0), 0.81, max_relative = 1e-12);
        assert_eq!(powf(-1.0, 2.0), 0.0);
        assert_eq!(powf(0.0, 2.0), 0.0);
    }

    #[test]
    fn sigmoid_is_centered_and_bounded() {
        assert_relative_eq!(sigmoid(0.0), 0.5, epsilon = 1e-15);
        assert!(sigmoid(40.0) > 0.999_999);
        assert!(sigmoid(-40.0) < 1e-6);
        // Symmetry: s(x) + s(-x) == 1.
        assert_relative_eq!(sigmoid(1.7) + sigmoid(-1.7), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn sigmoid_edge_spans_transition_band() {
        // Half a width above/below the threshold lands at the 90%/10% points.
        let up = sigmoid_edge(0.5 + 0.1, 0.5, 0.2);
        let down = sigmoid_edge(0.5 - 0.1, 0.5, 0.2);
        assert_relative_eq!(up, 0.9, max_relative = 0.02);
        assert_relative_eq!(down, 0.1, max_relative = 0.02);
        assert_relative_eq!(sigmoid_edge(0.5, 0.5, 0.2), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn falling_edge_mirrors_rising_edge() {
        let r = sigmoid_edge(0.3, 0.5, 0.2);
        let f = sigmoid_edge_falling(0.7, 0.5, 0.2);
        assert_relative_eq!(r, f, epsilon = 1e-12);
    }

    #[test]
    fn cos_matches_reference_values() {
        assert_relative_eq!(cos(0.0), 1.0, epsilon = 1e-15);
        assert_relative_eq!(cos(std::f64::consts::FRAC_PI_3), 0.5, max_relative = 1e-10);
        assert!(cos(std::f64::consts::FRAC_PI_2).abs() < 1e-10);
        assert_relative_eq!(cos(std::f64::consts::PI), -1.0, max_relative = 1e-10);
        // Even symmetry and domain clamp.
        assert_eq!(cos(-0.7).to_bits(), cos(0.7).to_bits());
        assert_relative_eq!(cos(10.0), -1.0, max_relative = 1e-10);
    }

    #[test]
    fn exp_is_bitwise_stable() {
        let a = exp(1.234567890123);
        for _ in 0..100 {
            assert_eq!(a.to_bits(), exp(1.234567890123).to_bits());
        }
    }
}
