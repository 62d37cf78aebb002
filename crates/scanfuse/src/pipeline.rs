//! Per-frame orchestration of the three engines.
//!
//! The host capture loop hands one frame of evidence to
//! [`FramePipeline::process_frame`]; fusion runs first, its fused depth feeds
//! the edge scorer and the temporal filter, and the aggregates of all three
//! collapse into the four soft gains and the frame's quality contribution.
//! Single-threaded, synchronous, strictly in temporal frame order.

use crate::edge::{EdgeConfig, EdgeScoreResult, EdgeScorer};
use crate::evidence::DepthEvidencePackage;
use crate::fusion::{DepthFusionEngine, FusedDepthResult, FusionConfig, FusionStats};
use crate::gain::{self, GainConfig, SoftGains};
use crate::math;
use crate::quant::{mm_to_m, DEPTH_INVALID_MM};
use crate::temporal::{TemporalConfig, TemporalFilter};

/// Top-level pipeline configuration: one section per engine plus the
/// pipeline's own constants.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub fusion: FusionConfig,
    pub edge: EdgeConfig,
    pub temporal: TemporalConfig,
    pub gain: GainConfig,
    /// Accumulated fusion weight mapped to full depth confidence for the
    /// edge scorer.
    pub conf_norm_weight: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fusion: FusionConfig::default(),
            edge: EdgeConfig::default(),
            temporal: TemporalConfig::default(),
            gain: GainConfig::default(),
            conf_norm_weight: 1.0,
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file. Missing fields take their
    /// defaults, so partial override files are fine.
    pub fn from_json_file(path: &std::path::Path) -> Result<Self, Box<dyn std::error::Error>> {
        let data = std::fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(Into::into)
    }

    fn conf_norm(&self) -> f64 {
        if self.conf_norm_weight > 0.0 {
            self.conf_norm_weight
        } else {
            1.0
        }
    }
}

/// Externally supplied per-frame scalars. The pipeline consumes these as
/// plain data; the admission gate and topology analysis live elsewhere.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct FrameExternals {
    /// Binary-admission quality in `[0, 1]`.
    pub gate_quality: f64,
    /// Hole/occlusion aggregate in `[0, 1]`.
    pub topo_aggregate: f64,
    /// Accumulated admission-evidence coverage in `[0, 1]` (never wall clock).
    pub progress: f64,
}

/// Frame-level quality summary handed to the admission/ledger pipeline.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FrameScore {
    pub frame_id: u64,
    pub gains: SoftGains,
    pub soft_quality: f64,
    /// `gate_quality * soft_quality`.
    pub final_quality: f64,
    /// Progress-dependent gate/soft blend weights (sum to 1).
    pub gate_weight: f64,
    pub soft_weight: f64,
    pub fusion: FusionStats,
    pub edges: crate::edge::EdgeStats,
    /// Mean temporal consistency over valid pixels.
    pub mean_consistency: f64,
}

/// Everything one frame produces.
#[derive(Debug, Clone)]
pub struct FrameOutput {
    pub fused: FusedDepthResult,
    pub edges: EdgeScoreResult,
    /// Temporally stabilized depth, meters, 0 where invalid.
    pub stabilized_m: Vec<f32>,
    /// Per-pixel temporal consistency in `[0, 1]`.
    pub consistency: Vec<f32>,
    pub score: FrameScore,
}

/// Owns the three engines and their session state for one capture session.
pub struct FramePipeline {
    width: usize,
    height: usize,
    config: PipelineConfig,
    fusion: DepthFusionEngine,
    edge: EdgeScorer,
    temporal: TemporalFilter,
    depth_m: Vec<f32>,
    depth_conf: Vec<f32>,
}

impl FramePipeline {
    /// Allocate a pipeline for a fixed working resolution.
    pub fn new(width: usize, height: usize, config: PipelineConfig) -> Self {
        let n = width * height;
        Self {
            fusion: DepthFusionEngine::new(width, height, config.fusion.clone()),
            edge: EdgeScorer::new(width, height, config.edge.clone()),
            temporal: TemporalFilter::new(width, height, config.temporal.clone()),
            depth_m: vec![0.0; n],
            depth_conf: vec![0.0; n],
            width,
            height,
            config,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Reset session-lifetime state (the temporal ring buffers) at a
    /// session/segment boundary decided by the host.
    pub fn reset_session(&mut self) {
        self.temporal.reset();
    }

    /// Process one frame of evidence.
    ///
    /// # Panics
    /// On contract violations: wrong buffer sizes or a source count outside
    /// `1..=4` (the engines assert their own preconditions). Data-quality
    /// degradation never panics; it lowers the resulting quality instead.
    pub fn process_frame(
        &mut self,
        sources: &[DepthEvidencePackage],
        rgb: &[u8],
        view_angle_rad: Option<&[f32]>,
        externals: FrameExternals,
    ) -> FrameOutput {
        let n = self.width * self.height;
        let frame_id = sources.first().map(|p| p.header().frame_id).unwrap_or(0);

        let fused = self.fusion.fuse(sources, view_angle_rad);

        let conf_norm = self.config.conf_norm();
        for idx in 0..n {
            self.depth_m[idx] = mm_to_m(fused.depth_mm[idx]);
            self.depth_conf[idx] =
                math::clamp(fused.weight[idx] as f64 / conf_norm, 0.0, 1.0) as f32;
        }

        let edges = self
            .edge
            .compute_scores(rgb, &fused.depth_mm, &self.depth_conf);

        let mut stabilized_m = vec![0.0f32; n];
        let mut consistency = vec![0.0f32; n];
        self.temporal
            .filter_frame(&self.depth_m, &mut stabilized_m, &mut consistency);

        let mut consistency_sum = 0.0f64;
        let mut valid_px = 0usize;
        for idx in 0..n {
            if fused.depth_mm[idx] != DEPTH_INVALID_MM {
                consistency_sum += consistency[idx] as f64;
                valid_px += 1;
            }
        }
        let mean_consistency = if valid_px > 0 {
            consistency_sum / valid_px as f64
        } else {
            0.0
        };

        let gain_cfg = &self.config.gain;
        let gains = SoftGains {
            depth: gain::depth_gain(
                fused.stats.valid_ratio,
                fused.stats.mean_confidence,
                fused.stats.mean_weight,
                gain_cfg,
            ),
            edge: gain::edge_gain(
                edges.stats.means[0],
                edges.stats.edge_density,
                edges.stats.means[2],
                edges.stats.means[3],
                gain_cfg,
            ),
            topo: gain::topo_gain(externals.topo_aggregate, gain_cfg),
            base: gain::base_gain(mean_consistency, gain_cfg),
        };
        let soft_quality = gain::soft_quality(&gains, gain_cfg);
        let final_quality = gain::final_quality(externals.gate_quality, soft_quality);
        let (gate_weight, soft_weight) = gain::blend_weights(externals.progress, gain_cfg);

        tracing::info!(
            frame_id,
            valid_ratio = fused.stats.valid_ratio,
            edge_density = edges.stats.edge_density,
            mean_consistency,
            depth_gain = gains.depth,
            edge_gain = gains.edge,
            topo_gain = gains.topo,
            base_gain = gains.base,
            soft_quality,
            final_quality,
            "frame scored"
        );
        if fused.stats.valid_ratio < 0.05 {
            tracing::warn!(
                frame_id,
                valid_ratio = fused.stats.valid_ratio,
                "almost no valid depth consensus this frame"
            );
        }

        let score = FrameScore {
            frame_id,
            gains,
            soft_quality,
            final_quality,
            gate_weight,
            soft_weight,
            fusion: fused.stats.clone(),
            edges: edges.stats.clone(),
            mean_consistency,
        };

        FrameOutput {
            fused,
            edges,
            stabilized_m,
            consistency,
            score,
        }
    }
}
