//! The depth-difference feature shared by training and inference.
//!
//! Every node of a randomized decision tree tests the same kind of feature:
//! two offsets `u` and `v` (scaled by the inverse depth at the probe pixel)
//! are added to the pixel coordinate, and the feature value is the difference
//! of the depths sampled at the two displaced positions. Samples that land
//! outside the image read as [`BACKGROUND_DEPTH`].
//!
//! Training and inference must agree bit-for-bit on this computation, so
//! both call [`sample_uv`].

use half::f16;

use crate::tree::UvPair;

/// Depth returned for samples that fall outside the image, standing in for
/// "background at infinity".
pub const BACKGROUND_DEPTH: f32 = 1000.0;

/// Pixel storage that can be promoted to `f32` for feature arithmetic.
///
/// Depth images are held in half precision to halve memory; inference also
/// accepts plain `f32` buffers. All arithmetic happens at 32 bits either way.
pub trait Depth: Copy + Send + Sync {
    fn to_f32(self) -> f32;
}

impl Depth for f16 {
    #[inline]
    fn to_f32(self) -> f32 {
        f16::to_f32(self)
    }
}

impl Depth for f32 {
    #[inline]
    fn to_f32(self) -> f32 {
        self
    }
}

/// Evaluate the depth-difference feature for one pixel.
///
/// `depth` is the depth at `(x, y)`; `uv` supplies the two offsets. The
/// displaced coordinates are truncated to integers (not rounded, and not
/// floored for negative values) before the bounds check, matching the
/// on-disk trees this crate produces and consumes.
#[inline]
pub fn sample_uv<D: Depth>(
    depth_image: &[D],
    width: u32,
    height: u32,
    x: i32,
    y: i32,
    depth: f32,
    uv: UvPair,
) -> f32 {
    let [ux, uy, vx, vy] = uv.0;

    let u = ((x as f32 + ux / depth) as i32, (y as f32 + uy / depth) as i32);
    let v = ((x as f32 + vx / depth) as i32, (y as f32 + vy / depth) as i32);

    let upixel = if u.0 >= 0 && u.0 < width as i32 && u.1 >= 0 && u.1 < height as i32 {
        depth_image[(u.1 as u32 * width + u.0 as u32) as usize].to_f32()
    } else {
        BACKGROUND_DEPTH
    };
    let vpixel = if v.0 >= 0 && v.0 < width as i32 && v.1 >= 0 && v.1 < height as i32 {
        depth_image[(v.1 as u32 * width + v.0 as u32) as usize].to_f32()
    } else {
        BACKGROUND_DEPTH
    };

    upixel - vpixel
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_image(width: u32, height: u32, value: f32) -> Vec<f16> {
        vec![f16::from_f32(value); (width * height) as usize]
    }

    #[test]
    fn zero_offsets_cancel() {
        let image = flat_image(8, 8, 2.0);
        let f = sample_uv(&image, 8, 8, 4, 4, 2.0, UvPair([0.0; 4]));
        assert_eq!(f, 0.0);
    }

    #[test]
    fn both_sides_out_of_bounds() {
        let image = flat_image(8, 8, 1.0);
        // Offsets of 100 pixels at depth 1.0 land far outside an 8x8 image.
        let uv = UvPair([100.0, 100.0, -100.0, -100.0]);
        let f = sample_uv(&image, 8, 8, 4, 4, 1.0, uv);
        assert_eq!(f, BACKGROUND_DEPTH - BACKGROUND_DEPTH);
    }

    #[test]
    fn single_side_out_of_bounds() {
        let image = flat_image(8, 8, 1.5);
        let uv = UvPair([100.0, 0.0, 0.0, 0.0]);
        let f = sample_uv(&image, 8, 8, 4, 4, 1.5, uv);
        assert_eq!(f, BACKGROUND_DEPTH - 1.5);

        let uv = UvPair([0.0, 0.0, 100.0, 0.0]);
        let f = sample_uv(&image, 8, 8, 4, 4, 1.5, uv);
        assert_eq!(f, 1.5 - BACKGROUND_DEPTH);
    }

    #[test]
    fn offsets_scale_with_inverse_depth() {
        let mut image = flat_image(8, 8, 1.0);
        image[2 * 8 + 6] = f16::from_f32(3.0);

        // An 8-pixel x offset at depth 4.0 moves two pixels right.
        let uv = UvPair([8.0, 0.0, 0.0, 0.0]);
        let f = sample_uv(&image, 8, 8, 4, 2, 4.0, uv);
        assert_eq!(f, 3.0 - 1.0);
    }

    #[test]
    fn evaluator_is_pure() {
        let image = flat_image(16, 16, 2.5);
        let uv = UvPair([3.7, -1.2, 0.4, 9.9]);
        let a = sample_uv(&image, 16, 16, 7, 9, 2.5, uv);
        let b = sample_uv(&image, 16, 16, 7, 9, 2.5, uv);
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn truncation_not_rounding() {
        let mut image = flat_image(4, 4, 1.0);
        image[1] = f16::from_f32(5.0);

        // 0 + 1.9/1.0 truncates to x = 1, not 2.
        let uv = UvPair([1.9, 0.0, 0.0, 0.0]);
        let f = sample_uv(&image, 4, 4, 0, 0, 1.0, uv);
        assert_eq!(f, 5.0 - 1.0);
    }
}
