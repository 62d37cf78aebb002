//! Fixed-point wire formats shared across the pipeline.
//!
//! Depth travels as signed 32-bit millimeters with `0` as the sole
//! invalid sentinel (never NaN, never negative for a valid sample).
//! Confidence travels as unsigned Q0.16 (`0..=65535` mapping to `[0, 1]`).
//! Soft gains are quantized to Q3.60 signed fixed point for golden-test
//! comparison across implementations.

/// The sole invalid-depth sentinel, in millimeters.
pub const DEPTH_INVALID_MM: i32 = 0;

/// Full-scale Q0.16 confidence (maps to 1.0).
pub const CONF_Q16_ONE: u16 = u16::MAX;

/// Fractional bits used when quantizing gains for bit-exact comparison.
pub const GAIN_FRAC_BITS: u32 = 60;

const GAIN_SCALE: f64 = (1u64 << GAIN_FRAC_BITS) as f64;

/// Convert a Q0.16 confidence to `[0, 1]`.
#[inline]
pub fn conf_to_f64(q: u16) -> f64 {
    q as f64 / CONF_Q16_ONE as f64
}

/// Convert a `[0, 1]` confidence to Q0.16, saturating and rounding to nearest.
#[inline]
pub fn conf_from_f64(c: f64) -> u16 {
    if !c.is_finite() || c <= 0.0 {
        return 0;
    }
    if c >= 1.0 {
        return CONF_Q16_ONE;
    }
    (c * CONF_Q16_ONE as f64 + 0.5) as u16
}

/// Millimeters to meters. The sentinel maps to 0.0 m.
#[inline]
pub fn mm_to_m(mm: i32) -> f32 {
    mm as f32 * 1e-3
}

/// Meters to millimeters, saturating and rounding to nearest.
///
/// Non-finite and non-positive inputs map to the invalid sentinel.
#[inline]
pub fn m_to_mm(m: f32) -> i32 {
    if !m.is_finite() || m <= 0.0 {
        return DEPTH_INVALID_MM;
    }
    let mm = (m as f64 * 1e3) + 0.5;
    if mm >= i32::MAX as f64 {
        i32::MAX
    } else {
        mm as i32
    }
}

/// Quantize a gain in `[-4, 4)` to signed Q3.60 fixed point.
///
/// Gains live in `[0, 1]`, so the representable range is generous; the wide
/// fraction makes quantized values a bit-exact cross-implementation contract.
#[inline]
pub fn quantize_gain(g: f64) -> i64 {
    debug_assert!(g.is_finite(), "gain must be finite");
    let scaled = g * GAIN_SCALE;
    if scaled >= i64::MAX as f64 {
        i64::MAX
    } else if scaled <= i64::MIN as f64 {
        i64::MIN
    } else if scaled >= 0.0 {
        (scaled + 0.5) as i64
    } else {
        (scaled - 0.5) as i64
    }
}

/// Inverse of [`quantize_gain`].
#[inline]
pub fn dequantize_gain(q: i64) -> f64 {
    q as f64 / GAIN_SCALE
}
