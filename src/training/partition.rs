//! Pixel partitioning for decided splits.

use crate::feature::sample_uv;
use crate::tree::UvPair;

use super::context::{PixelRef, TrainContext};

/// Split a node's pixels into left and right child sets by re-evaluating
/// the winning feature, exactly as the gain search did.
///
/// `hint` carries the left/right counts the winning worker observed and is
/// used only to size the child buffers; the actual counts are recomputed
/// from zero here. A zero hint falls back to the parent size.
pub(crate) fn collect_pixels(
    ctx: &TrainContext,
    pixels: &[PixelRef],
    uv: UvPair,
    t: f32,
    hint: [u32; 2],
) -> (Vec<PixelRef>, Vec<PixelRef>) {
    let cap = |h: u32| if h > 0 { h as usize } else { pixels.len() };
    let mut l_pixels = Vec::with_capacity(cap(hint[0]));
    let mut r_pixels = Vec::with_capacity(cap(hint[1]));

    for pixel in pixels {
        let (_, depth_image) = ctx.image(pixel.image);
        let depth = depth_image[(pixel.y as u32 * ctx.width + pixel.x as u32) as usize].to_f32();
        let value = sample_uv(depth_image, ctx.width, ctx.height, pixel.x, pixel.y, depth, uv);

        if value < t {
            l_pixels.push(*pixel);
        } else {
            r_pixels.push(*pixel);
        }
    }

    (l_pixels, r_pixels)
}
