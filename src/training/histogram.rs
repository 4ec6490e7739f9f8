//! Histogram accumulation and information-gain math.
//!
//! For a frontier node and a stripe `[c_start, c_end)` of the offset table,
//! [`accumulate_histograms`] fills one root label histogram plus a
//! `(c_end - c_start) x n_t` grid of left/right histograms, one pair per
//! `(offset, threshold)` candidate. The feature is evaluated once per
//! offset and reused across all thresholds, which is where the inner-loop
//! time goes for large nodes.
//!
//! The grid is laid out candidate-major: for stripe-local offset `c` and
//! threshold `k`, the block at `(c * n_t + k) * 2 * n_labels` holds the
//! left counts followed by the right counts.

use crate::error::DataError;
use crate::feature::sample_uv;

use super::context::{NodeTrainData, TrainContext};
use super::CancelToken;

/// Accumulate the root and left/right histograms for one node and stripe.
///
/// `samples` is caller-owned scratch of length `c_end - c_start`. When the
/// node sits on the final permitted depth only the root histogram is
/// filled. A label outside `0..n_labels` is a fatal data error; the
/// histograms are left partially accumulated in that case.
///
/// Cancellation is checked per pixel; an interrupted accumulation returns
/// `Ok` with partial counts, which the coordinator discards.
pub(crate) fn accumulate_histograms(
    ctx: &TrainContext,
    node: &NodeTrainData,
    c_start: u32,
    c_end: u32,
    root_histogram: &mut [u32],
    lr_histograms: &mut [u32],
    samples: &mut [f32],
    cancel: &CancelToken,
) -> Result<(), DataError> {
    let n_labels = ctx.n_labels as usize;
    let n_t = ctx.ts.len();
    debug_assert_eq!(root_histogram.len(), n_labels);
    debug_assert_eq!(samples.len(), (c_end - c_start) as usize);

    let last_depth = node.depth >= ctx.max_depth as u32 - 1;

    for pixel in &node.pixels {
        if cancel.is_cancelled() {
            break;
        }

        let (label_image, depth_image) = ctx.image(pixel.image);
        let pixel_idx = (pixel.y as u32 * ctx.width + pixel.x as u32) as usize;
        let label = label_image[pixel_idx];
        let depth = depth_image[pixel_idx].to_f32();

        if label >= ctx.n_labels {
            return Err(DataError::InvalidLabel {
                label,
                max: ctx.n_labels - 1,
            });
        }

        root_histogram[label as usize] += 1;

        // No split will be made below the last depth.
        if last_depth {
            continue;
        }

        for c in c_start..c_end {
            samples[(c - c_start) as usize] = sample_uv(
                depth_image,
                ctx.width,
                ctx.height,
                pixel.x,
                pixel.y,
                depth,
                ctx.uvs[c as usize],
            );
        }

        let mut lr_idx = 0;
        for &sample in samples.iter() {
            for &threshold in &ctx.ts {
                let side = if sample < threshold { 0 } else { n_labels };
                lr_histograms[lr_idx + side + label as usize] += 1;
                lr_idx += 2 * n_labels;
            }
        }
        debug_assert_eq!(lr_idx, samples.len() * n_t * 2 * n_labels);
    }

    Ok(())
}

/// Normalize a count histogram into `normalized`, returning the total count
/// and the number of non-empty labels. A zero total leaves all zeros.
pub fn normalize_histogram(histogram: &[u32], normalized: &mut [f32]) -> (u32, u32) {
    let mut total = 0u32;
    let mut occupied = 0u32;
    for &count in histogram {
        if count > 0 {
            total += count;
            occupied += 1;
        }
    }

    if total > 0 {
        for (out, &count) in normalized.iter_mut().zip(histogram) {
            *out = count as f32 / total as f32;
        }
    } else {
        normalized.fill(0.0);
    }

    (total, occupied)
}

/// Shannon entropy of a normalized histogram, in bits.
///
/// Degenerate entries (`p == 0` and `p == 1`) contribute nothing and are
/// skipped.
pub fn shannon_entropy(normalized: &[f32]) -> f32 {
    let mut entropy = 0.0f32;
    for &p in normalized {
        if p > 0.0 && p < 1.0 {
            entropy += -p * p.log2();
        }
    }
    entropy
}

/// Information gain of a candidate split: the parent entropy minus the
/// pixel-weighted child entropies.
pub fn split_gain(
    entropy: f32,
    n_pixels: u32,
    l_entropy: f32,
    l_n_pixels: u32,
    r_entropy: f32,
    r_n_pixels: u32,
) -> f32 {
    entropy
        - ((l_n_pixels as f32 / n_pixels as f32) * l_entropy
            + (r_n_pixels as f32 / n_pixels as f32) * r_entropy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::two_class_scene;
    use crate::training::context::{PixelRef, TrainContext};
    use crate::training::TrainOptions;
    use approx::assert_abs_diff_eq;

    fn test_context(n_uv: u32, n_t: u32, max_depth: u8) -> TrainContext {
        let opts = TrainOptions::builder()
            .n_uv(n_uv)
            .n_thresholds(n_t)
            .t_range(1.0f32)
            .uv_range(8.0f32)
            .max_depth(max_depth)
            .build()
            .unwrap();
        TrainContext::new(two_class_scene(2, 8, 8), &opts)
    }

    fn all_pixels(ctx: &TrainContext) -> Vec<PixelRef> {
        let mut pixels = Vec::new();
        for image in 0..ctx.n_images {
            for y in 0..ctx.height as i32 {
                for x in 0..ctx.width as i32 {
                    pixels.push(PixelRef { x, y, image });
                }
            }
        }
        pixels
    }

    #[test]
    fn root_histogram_counts_labels() {
        let ctx = test_context(4, 4, 4);
        let node = NodeTrainData {
            id: 0,
            depth: 0,
            pixels: all_pixels(&ctx),
        };
        let mut root = vec![0u32; 2];
        let mut lr = vec![0u32; 4 * 4 * 2 * 2];
        let mut samples = vec![0f32; 4];
        accumulate_histograms(
            &ctx,
            &node,
            0,
            4,
            &mut root,
            &mut lr,
            &mut samples,
            &CancelToken::new(),
        )
        .unwrap();

        // Two 8x8 images, half label 0 and half label 1 each.
        assert_eq!(root, vec![64, 64]);

        // Every (candidate, threshold) cell partitions every pixel exactly
        // once between its left and right halves.
        for cell in lr.chunks_exact(4) {
            assert_eq!(cell.iter().sum::<u32>(), 128);
        }
    }

    #[test]
    fn final_depth_skips_lr_accumulation() {
        let ctx = test_context(4, 4, 3);
        let node = NodeTrainData {
            id: 3,
            depth: 2,
            pixels: all_pixels(&ctx),
        };
        let mut root = vec![0u32; 2];
        let mut lr = vec![0u32; 4 * 4 * 2 * 2];
        let mut samples = vec![0f32; 4];
        accumulate_histograms(
            &ctx,
            &node,
            0,
            4,
            &mut root,
            &mut lr,
            &mut samples,
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(root.iter().sum::<u32>(), 128);
        assert!(lr.iter().all(|&c| c == 0));
    }

    #[test]
    fn out_of_range_label_is_fatal() {
        let mut ctx = test_context(2, 2, 4);
        ctx.label_images[0] = 9;
        let node = NodeTrainData {
            id: 0,
            depth: 0,
            pixels: vec![PixelRef {
                x: 0,
                y: 0,
                image: 0,
            }],
        };
        let mut root = vec![0u32; 2];
        let mut lr = vec![0u32; 2 * 2 * 2 * 2];
        let mut samples = vec![0f32; 2];
        let err = accumulate_histograms(
            &ctx,
            &node,
            0,
            2,
            &mut root,
            &mut lr,
            &mut samples,
            &CancelToken::new(),
        )
        .unwrap_err();
        assert_eq!(err, DataError::InvalidLabel { label: 9, max: 1 });
    }

    #[test]
    fn normalize_reports_total_and_occupancy() {
        let mut normalized = vec![0f32; 4];
        let (total, occupied) = normalize_histogram(&[6, 0, 2, 0], &mut normalized);
        assert_eq!(total, 8);
        assert_eq!(occupied, 2);
        assert_abs_diff_eq!(normalized[0], 0.75);
        assert_abs_diff_eq!(normalized[2], 0.25);
        assert_eq!(normalized[1], 0.0);
    }

    #[test]
    fn normalize_empty_histogram_zeroes_output() {
        let mut normalized = vec![0.5f32; 3];
        let (total, occupied) = normalize_histogram(&[0, 0, 0], &mut normalized);
        assert_eq!((total, occupied), (0, 0));
        assert!(normalized.iter().all(|&p| p == 0.0));
    }

    #[test]
    fn entropy_of_one_hot_is_zero() {
        assert_eq!(shannon_entropy(&[1.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn entropy_of_uniform_is_log2_k() {
        let uniform = vec![0.25f32; 4];
        assert_abs_diff_eq!(shannon_entropy(&uniform), 2.0, epsilon = 1e-6);

        let uniform = vec![1.0 / 8.0; 8];
        assert_abs_diff_eq!(shannon_entropy(&uniform), 3.0, epsilon = 1e-6);
    }

    #[test]
    fn gain_of_perfect_split_is_parent_entropy() {
        // Parent 50/50 over two labels, children one-hot.
        let gain = split_gain(1.0, 100, 0.0, 50, 0.0, 50);
        assert_abs_diff_eq!(gain, 1.0);
    }

    #[test]
    fn gain_nonnegative_for_impure_parent() {
        let parent = shannon_entropy(&[0.5, 0.5]);
        let left = shannon_entropy(&[0.75, 0.25]);
        let right = shannon_entropy(&[0.25, 0.75]);
        let gain = split_gain(parent, 80, left, 40, right, 40);
        assert!(gain >= 0.0);
    }
}
