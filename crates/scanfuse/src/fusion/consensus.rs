//! Confidence-weighted median consensus across resampled depth sources.

/// One valid resampled sample at a pixel.
#[derive(Debug, Clone, Copy)]
pub struct ConsensusSample {
    /// Depth in millimeters.
    pub depth_mm: i32,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Index of the source in ascending declared priority order.
    pub source_idx: usize,
}

/// Confidence-weighted median of up to four samples.
///
/// Samples are ordered by `(depth, source_idx)` — equal depths are broken by
/// ascending source priority, never by insertion order. The median is the
/// first sample whose cumulative confidence reaches half the total; when all
/// confidences are zero every sample counts with weight one. Returns `None`
/// for an empty sample set (consensus = invalid sentinel at the call site).
pub fn weighted_median(samples: &mut [ConsensusSample]) -> Option<i32> {
    if samples.is_empty() {
        return None;
    }
    // Insertion sort: deterministic and branch-cheap for n <= 4.
    for i in 1..samples.len() {
        let cur = samples[i];
        let mut j = i;
        while j > 0 {
            let prev = samples[j - 1];
            let after = prev.depth_mm > cur.depth_mm
                || (prev.depth_mm == cur.depth_mm && prev.source_idx > cur.source_idx);
            if !after {
                break;
            }
            samples[j] = prev;
            j -= 1;
        }
        samples[j] = cur;
    }

    let total: f64 = samples.iter().map(|s| s.confidence).sum();
    if total <= 0.0 {
        // Degenerate confidences: unweighted median, lower of the middle pair.
        return Some(samples[(samples.len() - 1) / 2].depth_mm);
    }
    let half = total * 0.5;
    let mut cum = 0.0;
    for s in samples.iter() {
        cum += s.confidence;
        if cum >= half {
            return Some(s.depth_mm);
        }
    }
    Some(samples[samples.len() - 1].depth_mm)
}
