//! Normalized depth-evidence inputs.
//!
//! Capture and normalization happen upstream; this module only defines the
//! immutable package handed to the fusion engine and the closed set of
//! depth sources with their fixed tie-break priority.

use crate::quant::DEPTH_INVALID_MM;

/// Closed set of depth-estimation sources.
///
/// The declaration order is the tie-break priority used everywhere in the
/// pipeline: when two sources disagree by nothing measurable, the one with
/// the lower discriminant wins. Never replaced by iteration order of an
/// unordered collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthSource {
    PlatformApi,
    SmallModel,
    LargeModel,
    Stereo,
}

impl DepthSource {
    /// All sources in ascending priority order.
    pub const ALL: [DepthSource; 4] = [
        DepthSource::PlatformApi,
        DepthSource::SmallModel,
        DepthSource::LargeModel,
        DepthSource::Stereo,
    ];

    /// Bit index used in per-pixel agreement masks.
    #[inline]
    pub fn bit(self) -> u8 {
        self as u8
    }

    /// Tie-break priority (lower wins).
    #[inline]
    pub fn priority(self) -> usize {
        self as usize
    }
}

/// Frame-level metadata of a [`DepthEvidencePackage`], serializable for
/// frame summaries and debug dumps (the bulk buffers are not).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EvidenceHeader {
    pub source: DepthSource,
    pub width: usize,
    pub height: usize,
    /// Inclusive valid depth range in millimeters.
    pub valid_range_mm: [i32; 2],
    /// Caller-supplied capture timestamp in microseconds.
    pub timestamp_us: u64,
    /// Caller-supplied frame identifier.
    pub frame_id: u64,
}

/// One normalized depth observation of a frame from a single source.
///
/// Immutable once constructed: the buffers are only reachable as shared
/// slices. Depth is millimeters with `0` as the sole invalid sentinel;
/// confidence is Q0.16 parallel to the depth buffer.
#[derive(Debug, Clone)]
pub struct DepthEvidencePackage {
    header: EvidenceHeader,
    depth_mm: Vec<i32>,
    confidence_q16: Vec<u16>,
}

impl DepthEvidencePackage {
    /// Construct a package, enforcing the buffer-size and range contracts.
    ///
    /// # Panics
    /// If either buffer length differs from `width * height`, if the frame
    /// is empty, or if the valid range is empty or includes the sentinel.
    pub fn new(
        header: EvidenceHeader,
        depth_mm: Vec<i32>,
        confidence_q16: Vec<u16>,
    ) -> Self {
        let n = header.width * header.height;
        assert!(n > 0, "evidence package must not be empty");
        assert_eq!(
            depth_mm.len(),
            n,
            "depth buffer length must equal width*height"
        );
        assert_eq!(
            confidence_q16.len(),
            n,
            "confidence buffer length must equal width*height"
        );
        assert!(
            header.valid_range_mm[0] > DEPTH_INVALID_MM
                && header.valid_range_mm[0] <= header.valid_range_mm[1],
            "valid depth range must be positive and non-empty"
        );
        Self {
            header,
            depth_mm,
            confidence_q16,
        }
    }

    pub fn header(&self) -> &EvidenceHeader {
        &self.header
    }

    pub fn source(&self) -> DepthSource {
        self.header.source
    }

    pub fn width(&self) -> usize {
        self.header.width
    }

    pub fn height(&self) -> usize {
        self.header.height
    }

    pub fn depth_mm(&self) -> &[i32] {
        &self.depth_mm
    }

    pub fn confidence_q16(&self) -> &[u16] {
        &self.confidence_q16
    }

    /// Whether the sample at `idx` is non-sentinel and inside the declared range.
    #[inline]
    pub fn is_valid_at(&self, idx: usize) -> bool {
        let z = self.depth_mm[idx];
        z != DEPTH_INVALID_MM
            && z >= self.header.valid_range_mm[0]
            && z <= self.header.valid_range_mm[1]
    }

    /// Whether a depth value satisfies this package's validity contract.
    #[inline]
    pub fn is_valid_depth(&self, z: i32) -> bool {
        z != DEPTH_INVALID_MM
            && z >= self.header.valid_range_mm[0]
            && z <= self.header.valid_range_mm[1]
    }

    /// Fraction of pixels carrying a valid sample.
    pub fn valid_ratio(&self) -> f64 {
        let valid = (0..self.depth_mm.len())
            .filter(|&i| self.is_valid_at(i))
            .count();
        valid as f64 / self.depth_mm.len() as f64
    }
}
