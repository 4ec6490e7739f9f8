//! Immutable training context and candidate-table generation.
//!
//! [`TrainContext`] owns everything workers read during training: the packed
//! image arrays, the random `(u,v)` offset table, and the threshold table.
//! It is built once from a [`TrainData`] corpus plus [`TrainOptions`] and
//! never mutated afterwards, so workers share it without synchronization.

use derive_builder::Builder;
use half::f16;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::data::TrainData;
use crate::tree::UvPair;

use super::Verbosity;

/// Training parameters.
///
/// Use [`TrainOptions::builder()`] for a fluent configuration API, or
/// `TrainOptions::default()` for the standard settings.
///
/// # Example
///
/// ```
/// use depthtree::TrainOptions;
///
/// let opts = TrainOptions::builder()
///     .max_depth(8u8)
///     .n_uv(500u32)
///     .seed(7u64)
///     .build()
///     .unwrap();
/// assert_eq!(opts.max_depth, 8);
/// ```
#[derive(Debug, Clone, Builder)]
#[builder(setter(into), default)]
pub struct TrainOptions {
    /// Pixels sampled per image for the root node.
    #[builder(default = "2000")]
    pub n_pixels: u32,

    /// Number of candidate thresholds.
    #[builder(default = "50")]
    pub n_thresholds: u32,

    /// Total span of the threshold table, centred on zero.
    #[builder(default = "1.29")]
    pub t_range: f32,

    /// Number of candidate `(u,v)` offset pairs.
    #[builder(default = "2000")]
    pub n_uv: u32,

    /// Span of the offset components in metres, rescaled to pixels via the
    /// camera's pixels-per-meter factor.
    #[builder(default = "1.29")]
    pub uv_range: f32,

    /// Maximum tree depth; the node array holds `2^max_depth - 1` slots.
    #[builder(default = "20")]
    pub max_depth: u8,

    /// Worker thread count; `0` selects the hardware concurrency.
    #[builder(default = "0")]
    pub n_threads: usize,

    /// Background label index, recorded in the JSON emission.
    #[builder(default = "0")]
    pub background: u8,

    /// Seed for pixel sampling and offset-table generation.
    #[builder(default = "0")]
    pub seed: u64,

    /// Also reject candidate splits whose right side is empty or takes
    /// every pixel. The default filter checks the left side only; because
    /// left and right counts always sum to the node total the two filters
    /// accept the same splits, and this switch exists to make that
    /// equivalence checkable.
    #[builder(default = "false")]
    pub check_degenerate_right: bool,

    /// Progress output level.
    #[builder(default)]
    pub verbosity: Verbosity,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            n_pixels: 2000,
            n_thresholds: 50,
            t_range: 1.29,
            n_uv: 2000,
            uv_range: 1.29,
            max_depth: 20,
            n_threads: 0,
            background: 0,
            seed: 0,
            check_degenerate_right: false,
            verbosity: Verbosity::default(),
        }
    }
}

impl TrainOptions {
    pub fn builder() -> TrainOptionsBuilder {
        TrainOptionsBuilder::default()
    }
}

/// One sampled pixel: image coordinates plus the index of the image it
/// belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRef {
    pub x: i32,
    pub y: i32,
    pub image: u32,
}

/// A frontier node awaiting its split-or-leaf decision.
///
/// The pixel array is exclusively owned; it moves into the partitioner when
/// the node splits and is dropped when the node becomes a leaf.
#[derive(Debug)]
pub struct NodeTrainData {
    /// Breadth-first node id (root 0, children `2*id + 1` / `2*id + 2`).
    pub id: u32,
    /// Depth at which the node sits (root 0).
    pub depth: u32,
    /// Pixels that reached this node.
    pub pixels: Vec<PixelRef>,
}

/// Read-only state shared by the coordinator and all workers.
#[derive(Debug)]
pub struct TrainContext {
    pub width: u32,
    pub height: u32,
    pub fov: f32,
    pub n_labels: u8,
    pub n_images: u32,
    pub label_images: Vec<u8>,
    pub depth_images: Vec<f16>,
    /// Candidate feature offsets, components uniform in
    /// `[-range/2, range/2)` pixels.
    pub uvs: Vec<UvPair>,
    /// Candidate thresholds, evenly spanning `[-t_range/2, t_range/2]`.
    pub ts: Vec<f32>,
    pub max_depth: u8,
    pub n_pixels: u32,
    pub seed: u64,
}

impl TrainContext {
    /// Build the shared context: take ownership of the corpus and draw the
    /// candidate tables.
    pub fn new(data: TrainData, opts: &TrainOptions) -> Self {
        let ppm = pixels_per_meter(data.height, data.fov);
        let uv_range = opts.uv_range * ppm;

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(opts.seed);
        let uvs = (0..opts.n_uv)
            .map(|_| {
                let mut uv = [0.0f32; 4];
                for c in &mut uv {
                    *c = rng.gen_range(-uv_range / 2.0..uv_range / 2.0);
                }
                UvPair(uv)
            })
            .collect();

        let ts = if opts.n_thresholds == 1 {
            vec![0.0]
        } else {
            (0..opts.n_thresholds)
                .map(|i| {
                    -opts.t_range / 2.0
                        + i as f32 * opts.t_range / (opts.n_thresholds - 1) as f32
                })
                .collect()
        };

        Self {
            width: data.width,
            height: data.height,
            fov: data.fov,
            n_labels: data.n_labels,
            n_images: data.n_images,
            label_images: data.label_images,
            depth_images: data.depth_images,
            uvs,
            ts,
            max_depth: opts.max_depth,
            n_pixels: opts.n_pixels,
            seed: opts.seed,
        }
    }

    /// Draw the root node's pixel set: `n_pixels` uniform coordinates per
    /// image, from a stream derived only from the seed so a resumed run
    /// regenerates the identical set.
    pub fn sample_root_pixels(&self) -> Vec<PixelRef> {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.seed);
        let mut pixels = Vec::with_capacity((self.n_images * self.n_pixels) as usize);
        for image in 0..self.n_images {
            for _ in 0..self.n_pixels {
                pixels.push(PixelRef {
                    x: rng.gen_range(0..self.width as i32),
                    y: rng.gen_range(0..self.height as i32),
                    image,
                });
            }
        }
        pixels
    }

    /// Label and depth slices for one image.
    #[inline]
    pub fn image(&self, index: u32) -> (&[u8], &[f16]) {
        let len = (self.width * self.height) as usize;
        let base = index as usize * len;
        (
            &self.label_images[base..base + len],
            &self.depth_images[base..base + len],
        )
    }
}

/// Focal-length-equivalent scale turning metre offsets into pixel offsets,
/// so the same `uv_range` works across image resolutions.
#[inline]
pub fn pixels_per_meter(height: u32, fov: f32) -> f32 {
    (height as f32 / 2.0) / (fov / 2.0).tan()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::two_class_scene;

    #[test]
    fn default_options() {
        let opts = TrainOptions::default();
        assert_eq!(opts.n_pixels, 2000);
        assert_eq!(opts.n_thresholds, 50);
        assert_eq!(opts.n_uv, 2000);
        assert_eq!(opts.max_depth, 20);
        assert_eq!(opts.n_threads, 0);
        assert_eq!(opts.seed, 0);
    }

    #[test]
    fn threshold_table_spans_range_inclusive() {
        let opts = TrainOptions::builder()
            .n_thresholds(5u32)
            .t_range(2.0f32)
            .n_uv(4u32)
            .build()
            .unwrap();
        let ctx = TrainContext::new(two_class_scene(1, 8, 8), &opts);
        assert_eq!(ctx.ts, vec![-1.0, -0.5, 0.0, 0.5, 1.0]);
    }

    #[test]
    fn uv_table_stays_in_scaled_range() {
        let opts = TrainOptions::builder()
            .n_uv(64u32)
            .uv_range(1.0f32)
            .build()
            .unwrap();
        let data = two_class_scene(1, 8, 8);
        let half_range = 1.0 * pixels_per_meter(data.height, data.fov) / 2.0;
        let ctx = TrainContext::new(data, &opts);
        assert_eq!(ctx.uvs.len(), 64);
        for uv in &ctx.uvs {
            for c in uv.0 {
                assert!(c >= -half_range && c < half_range);
            }
        }
    }

    #[test]
    fn root_sampling_is_deterministic() {
        let opts = TrainOptions::builder()
            .n_pixels(32u32)
            .seed(9u64)
            .build()
            .unwrap();
        let ctx = TrainContext::new(two_class_scene(2, 8, 8), &opts);

        let a = ctx.sample_root_pixels();
        let b = ctx.sample_root_pixels();
        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
        assert!(a
            .iter()
            .all(|p| (0..8).contains(&p.x) && (0..8).contains(&p.y)));
        assert_eq!(a[0].image, 0);
        assert_eq!(a[32].image, 1);
    }

    #[test]
    fn pixels_per_meter_matches_fov_geometry() {
        // tan(pi/4) = 1, so a 90-degree fov maps half the image height to
        // one metre at one metre distance.
        let ppm = pixels_per_meter(480, std::f32::consts::FRAC_PI_2);
        assert!((ppm - 240.0).abs() < 1e-3);
    }
}
