//! scanfuse — deterministic soft-quality evidence scoring for handheld 3D scanning.
//!
//! Turns per-frame capture evidence (multiple depth sources, RGB, viewing
//! geometry) into graded quality scores that gate what a reconstruction
//! backend admits. The pipeline stages are:
//!
//! 1. **Fusion** – 1–4 depth sources resampled to the working resolution,
//!    weighted-median consensus, truncated-residual (TSDF-style) refinement
//!    with per-source trust weights and anti-grazing suppression.
//! 2. **Edges** – continuous multi-type edge scoring (geometric, textural,
//!    specular, transparent) from fused depth plus RGB, all sigmoid products.
//! 3. **Temporal** – per-pixel ring-buffer robust filtering: trimmed-mean
//!    estimate, adaptive outlier gate, anti-overshoot EMA.
//! 4. **Gains** – four bounded monotone soft gains and their convex
//!    combination into the frame's soft quality.
//!
//! Every stage is bit-exactly deterministic: same inputs and configuration
//! produce identical outputs on any IEEE-754 host, in any build mode. All
//! transcendentals go through [`math::PortableMath`]; no platform vision or
//! color primitives are used in scoring paths.
//!
//! # Public API
//! - [`FramePipeline`] and [`PipelineConfig`] as primary entry points
//! - per-stage engines ([`DepthFusionEngine`], [`EdgeScorer`],
//!   [`TemporalFilter`]) for hosts that orchestrate stages themselves
//! - [`evidence`] input types and [`quant`] fixed-point conversions

pub mod edge;
pub mod evidence;
pub mod fusion;
pub mod gain;
pub mod math;
pub mod pipeline;
pub mod quant;
pub mod temporal;

pub use edge::{EdgeConfig, EdgeScoreResult, EdgeScorer, EdgeStats};
pub use evidence::{DepthEvidencePackage, DepthSource, EvidenceHeader};
pub use fusion::{DepthFusionEngine, FusedDepthResult, FusionConfig, FusionStats, MAX_SOURCES};
pub use gain::{GainConfig, SoftGains};
pub use math::{MathOps, PortableMath};
pub use pipeline::{FrameExternals, FrameOutput, FramePipeline, FrameScore, PipelineConfig};
pub use quant::{DEPTH_INVALID_MM, GAIN_FRAC_BITS};
pub use temporal::{TemporalConfig, TemporalFilter};
