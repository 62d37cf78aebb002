//! Deterministic bilinear resampling of depth evidence.
//!
//! Uses only basic arithmetic — no platform interpolation primitives — so
//! resampled buffers are bit-identical across devices. Invalid (sentinel or
//! out-of-range) corners are never blended: when any of the four corners is
//! invalid the pixel falls back to the valid corner with the largest
//! bilinear weight, ties broken in top-left, top-right, bottom-left,
//! bottom-right order.

use crate::evidence::DepthEvidencePackage;
use crate::quant::{conf_to_f64, DEPTH_INVALID_MM};

/// Resample one evidence package to the working resolution.
///
/// Writes depth (mm) and confidence (`[0, 1]`) into the caller's buffers.
/// When the source is already at the working resolution the buffers are a
/// verbatim copy (resampling is idempotent).
///
/// # Panics
/// If the output buffer lengths differ from `dst_w * dst_h`.
pub fn resample_to_working(
    pkg: &DepthEvidencePackage,
    dst_w: usize,
    dst_h: usize,
    out_depth: &mut [i32],
    out_conf: &mut [f64],
) {
    let n = dst_w * dst_h;
    assert_eq!(out_depth.len(), n, "resample depth buffer length mismatch");
    assert_eq!(out_conf.len(), n, "resample confidence buffer length mismatch");

    let src_w = pkg.width();
    let src_h = pkg.height();
    let depth = pkg.depth_mm();
    let conf = pkg.confidence_q16();

    if src_w == dst_w && src_h == dst_h {
        for i in 0..n {
            out_depth[i] = depth[i];
            out_conf[i] = conf_to_f64(conf[i]);
        }
        return;
    }

    let sx = src_w as f64 / dst_w as f64;
    let sy = src_h as f64 / dst_h as f64;
    let x_max = (src_w - 1) as f64;
    let y_max = (src_h - 1) as f64;

    for dy in 0..dst_h {
        let src_y = ((dy as f64 + 0.5) * sy - 0.5).clamp(0.0, y_max);
        let y0 = src_y as usize;
        let y1 = (y0 + 1).min(src_h - 1);
        let fy = src_y - y0 as f64;
        for dx in 0..dst_w {
            let src_x = ((dx as f64 + 0.5) * sx - 0.5).clamp(0.0, x_max);
            let x0 = src_x as usize;
            let x1 = (x0 + 1).min(src_w - 1);
            let fx = src_x - x0 as f64;

            // Corner order is the fallback tie-break order.
            let corners = [
                (y0 * src_w + x0, (1.0 - fx) * (1.0 - fy)),
                (y0 * src_w + x1, fx * (1.0 - fy)),
                (y1 * src_w + x0, (1.0 - fx) * fy),
                (y1 * src_w + x1, fx * fy),
            ];

            let out_idx = dy * dst_w + dx;
            let all_valid = corners.iter().all(|&(idx, _)| pkg.is_valid_at(idx));
            if all_valid {
                let mut z = 0.0;
                let mut c = 0.0;
                for &(idx, w) in &corners {
                    z += w * depth[idx] as f64;
                    c += w * conf_to_f64(conf[idx]);
                }
                out_depth[out_idx] = (z + 0.5) as i32;
                out_conf[out_idx] = c;
            } else {
                // Nearest-available fallback: the valid corner carrying the
                // most bilinear weight, never a blend against the sentinel.
                let mut best: Option<(usize, f64)> = None;
                for &(idx, w) in &corners {
                    if !pkg.is_valid_at(idx) {
                        continue;
                    }
                    match best {
                        Some((_, bw)) if w <= bw => {}
                        _ => best = Some((idx, w)),
                    }
                }
                match best {
                    Some((idx, _)) => {
                        out_depth[out_idx] = depth[idx];
                        out_conf[out_idx] = conf_to_f64(conf[idx]);
                    }
                    None => {
                        out_depth[out_idx] = DEPTH_INVALID_MM;
                        out_conf[out_idx] = 0.0;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{DepthSource, EvidenceHeader};
    use crate::quant::CONF_Q16_ONE;

    fn package(w: usize, h: usize, depth: Vec<i32>, conf: Vec<u16>) -> DepthEvidencePackage {
        DepthEvidencePackage::new(
            EvidenceHeader {
                source: DepthSource::PlatformApi,
                width: w,
                height: h,
                valid_range_mm: [100, 10_000],
                timestamp_us: 0,
                frame_id: 0,
            },
            depth,
            conf,
        )
    }

    #[test]
    fn identity_resolution_is_a_verbatim_copy() {
        let depth = vec![0, 1500, 2000, 11_000, 800, 900];
        let pkg = package(3, 2, depth.clone(), vec![CONF_Q16_ONE; 6]);
        let mut out_d = vec![1; 6];
        let mut out_c = vec![0.0; 6];
        resample_to_working(&pkg, 3, 2, &mut out_d, &mut out_c);
        assert_eq!(out_d, depth, "same-resolution resampling must be identity");
    }

    #[test]
    fn upsampling_constant_field_is_constant() {
        let pkg = package(2, 2, vec![2000; 4], vec![CONF_Q16_ONE; 4]);
        let mut out_d = vec![0; 16];
        let mut out_c = vec![0.0; 16];
        resample_to_working(&pkg, 4, 4, &mut out_d, &mut out_c);
        assert!(out_d.iter().all(|&z| z == 2000));
        assert!(out_c.iter().all(|&c| (c - 1.0).abs() < 1e-9));
    }

    #[test]
    fn sentinel_corner_falls_back_to_valid_corner() {
        // One invalid corner in a 2x2 source; upsampled pixels near that
        // corner must carry a valid corner value, never a blend with 0.
        let pkg = package(2, 2, vec![DEPTH_INVALID_MM, 2000, 2000, 2000], vec![CONF_Q16_ONE; 4]);
        let mut out_d = vec![0; 36];
        let mut out_c = vec![0.0; 36];
        resample_to_working(&pkg, 6, 6, &mut out_d, &mut out_c);
        for &z in &out_d {
            assert!(
                z == 2000 || z == DEPTH_INVALID_MM,
                "blended sentinel leaked into output: {z}"
            );
        }
        // The region nearest the three valid corners is fully valid.
        assert_eq!(out_d[35], 2000);
    }

    #[test]
    fn all_invalid_corners_produce_sentinel() {
        let pkg = package(2, 2, vec![DEPTH_INVALID_MM; 4], vec![0; 4]);
        let mut out_d = vec![7; 4];
        let mut out_c = vec![1.0; 4];
        resample_to_working(&pkg, 2, 2, &mut out_d, &mut out_c);
        // Identity path: sentinel copies through.
        assert!(out_d.iter().all(|&z| z == DEPTH_INVALID_MM));
    }

    #[test]
    fn downsampling_blends_valid_neighbors() {
        let pkg = package(4, 1, vec![1000, 2000, 3000, 4000], vec![CONF_Q16_ONE; 4]);
        let mut out_d = vec![0; 2];
        let mut out_c = vec![0.0; 2];
        resample_to_working(&pkg, 2, 1, &mut out_d, &mut out_c);
        assert_eq!(out_d, vec![1500, 3500]);
    }

    #[test]
    fn out_of_range_values_are_treated_as_invalid_corners() {
        // 11_000 exceeds the declared range; fallback must avoid it.
        let pkg = package(2, 1, vec![11_000, 2000], vec![CONF_Q16_ONE; 2]);
        let mut out_d = vec![0; 4];
        let mut out_c = vec![0.0; 4];
        resample_to_working(&pkg, 4, 1, &mut out_d, &mut out_c);
        for &z in &out_d {
            assert_eq!(z, 2000);
        }
    }
}
