//! Robust temporal depth stabilization.
//!
//! Each working-resolution pixel owns a fixed-capacity ring buffer of recent
//! valid depth samples (meters). Per frame the filter computes a trimmed-mean
//! robust estimate, gates the current sample through an adaptive
//! depth-proportional outlier threshold, and blends into a per-pixel EMA with
//! a state-dependent smoothing weight. State is arena-style flat arrays
//! indexed by pixel, allocated once for the filter's lifetime and reset only
//! at session boundaries.
//!
//! Frames must be presented in temporal order by a single thread; the
//! per-pixel state is meaningless otherwise.

/// Hard capacity bound of the per-pixel ring buffer.
pub const MAX_WINDOW: usize = 8;

/// Tuning constants for the temporal filter.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TemporalConfig {
    /// Ring-buffer window (samples kept per pixel), at most [`MAX_WINDOW`].
    pub window: usize,
    /// Minimum buffered samples before robust estimation engages.
    pub min_samples: usize,
    /// Fraction trimmed from each end of the sorted window.
    pub trim_fraction: f64,
    /// Outlier gate floor (meters).
    pub min_abs_threshold_m: f64,
    /// Outlier gate slope, relative to the robust estimate.
    pub relative_threshold: f64,
    /// Outlier gate ceiling (meters).
    pub max_abs_threshold_m: f64,
    /// Consecutive suspicious samples that arm the anti-overshoot countdown.
    pub suspicious_streak_arm: u8,
    /// Frames of forced strongest smoothing once armed.
    pub overshoot_frames: u8,
    /// EMA weight of the input in the normal state.
    pub alpha_normal: f64,
    /// EMA weight while the current sample is suspicious.
    pub alpha_suspicious: f64,
    /// EMA weight during anti-overshoot damping (lowest).
    pub alpha_overshoot: f64,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            window: 5,
            min_samples: 4,
            trim_fraction: 0.10,
            min_abs_threshold_m: 0.02,
            relative_threshold: 0.03,
            max_abs_threshold_m: 0.30,
            suspicious_streak_arm: 3,
            overshoot_frames: 5,
            alpha_normal: 0.70,
            alpha_suspicious: 0.30,
            alpha_overshoot: 0.15,
        }
    }
}

/// Per-session temporal state and the filtering pass over it.
pub struct TemporalFilter {
    width: usize,
    height: usize,
    config: TemporalConfig,
    /// Ring-buffer storage, `window` slots per pixel.
    samples: Vec<f32>,
    cursor: Vec<u8>,
    count: Vec<u8>,
    ema: Vec<f32>,
    suspicious_streak: Vec<u8>,
    overshoot_countdown: Vec<u8>,
}

impl TemporalFilter {
    /// Allocate per-pixel state for a fixed working resolution.
    pub fn new(width: usize, height: usize, config: TemporalConfig) -> Self {
        assert!(width > 0 && height > 0, "working resolution must be non-empty");
        assert!(
            (1..=MAX_WINDOW).contains(&config.window),
            "window must be 1..={MAX_WINDOW}"
        );
        assert!(
            config.min_samples >= 1 && config.min_samples <= config.window,
            "min_samples must be within the window"
        );
        let n = width * height;
        Self {
            samples: vec![0.0; n * config.window],
            cursor: vec![0; n],
            count: vec![0; n],
            ema: vec![0.0; n],
            suspicious_streak: vec![0; n],
            overshoot_countdown: vec![0; n],
            width,
            height,
            config,
        }
    }

    pub fn config(&self) -> &TemporalConfig {
        &self.config
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Zero all per-pixel state. Called at session/segment boundaries decided
    /// by the host; the filter never decides them itself.
    pub fn reset(&mut self) {
        self.samples.fill(0.0);
        self.cursor.fill(0);
        self.count.fill(0);
        self.ema.fill(0.0);
        self.suspicious_streak.fill(0);
        self.overshoot_countdown.fill(0);
        tracing::debug!("temporal filter state reset");
    }

    /// Filter one frame of depth in meters.
    ///
    /// Invalid inputs (non-finite or `<= 0`) bypass the state entirely and
    /// emit zero depth and zero consistency.
    ///
    /// # Panics
    /// If any buffer length differs from the working area.
    pub fn filter_frame(
        &mut self,
        depth_m: &[f32],
        out_depth_m: &mut [f32],
        out_consistency: &mut [f32],
    ) {
        let n = self.width * self.height;
        assert_eq!(depth_m.len(), n, "input depth length mismatch");
        assert_eq!(out_depth_m.len(), n, "output depth length mismatch");
        assert_eq!(out_consistency.len(), n, "output consistency length mismatch");

        let window = self.config.window;
        for idx in 0..n {
            let current = depth_m[idx];
            if !current.is_finite() || current <= 0.0 {
                out_depth_m[idx] = 0.0;
                out_consistency[idx] = 0.0;
                continue;
            }

            // Push into the ring buffer; the write position wraps, the
            // storage never reallocates.
            let base = idx * window;
            let cur = self.cursor[idx] as usize;
            self.samples[base + cur] = current;
            self.cursor[idx] = ((cur + 1) % window) as u8;
            let count = (self.count[idx] as usize + 1).min(window);
            self.count[idx] = count as u8;

            let (estimate, gated) = if count < self.config.min_samples {
                // Too little history for robust estimation.
                (current as f64, false)
            } else {
                let est = robust_estimate(
                    &self.samples[base..base + count],
                    self.config.trim_fraction,
                );
                (est, true)
            };

            let threshold = (self.config.relative_threshold * estimate)
                .max(self.config.min_abs_threshold_m)
                .min(self.config.max_abs_threshold_m);
            let deviation = (current as f64 - estimate).abs();
            let suspicious = gated && deviation > threshold;

            if suspicious {
                let streak = self.suspicious_streak[idx].saturating_add(1);
                if streak >= self.config.suspicious_streak_arm {
                    // Real scene change in progress: force the strongest
                    // smoothing for a while to avoid ringing.
                    self.overshoot_countdown[idx] = self.config.overshoot_frames;
                    self.suspicious_streak[idx] = 0;
                } else {
                    self.suspicious_streak[idx] = streak;
                }
            } else {
                self.suspicious_streak[idx] = 0;
            }

            let alpha = if self.overshoot_countdown[idx] > 0 {
                self.overshoot_countdown[idx] -= 1;
                self.config.alpha_overshoot
            } else if suspicious {
                self.config.alpha_suspicious
            } else {
                self.config.alpha_normal
            };

            let input = if suspicious { estimate } else { current as f64 };
            let ema = if count == 1 {
                // First-ever sample: initialize directly, never blend with 0.
                current as f64
            } else {
                alpha * input + (1.0 - alpha) * self.ema[idx] as f64
            };
            self.ema[idx] = ema as f32;

            out_depth_m[idx] = ema as f32;
            out_consistency[idx] = (1.0 - deviation / threshold).max(0.0) as f32;
        }
    }
}

/// Trimmed mean of up to [`MAX_WINDOW`] samples; plain median when trimming
/// would discard everything.
fn robust_estimate(samples: &[f32], trim_fraction: f64) -> f64 {
    debug_assert!(!samples.is_empty() && samples.len() <= MAX_WINDOW);
    let mut sorted = [0.0f32; MAX_WINDOW];
    let n = samples.len();
    sorted[..n].copy_from_slice(samples);
    // Insertion sort: deterministic and stable for small n.
    for i in 1..n {
        let cur = sorted[i];
        let mut j = i;
        while j > 0 && sorted[j - 1] > cur {
            sorted[j] = sorted[j - 1];
            j -= 1;
        }
        sorted[j] = cur;
    }

    let trim = (n as f64 * trim_fraction) as usize;
    if 2 * trim >= n {
        return sorted[(n - 1) / 2] as f64;
    }
    let kept = &sorted[trim..n - trim];
    kept.iter().map(|&v| v as f64).sum::<f64>() / kept.len() as f64
}
