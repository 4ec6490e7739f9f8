//! Synthetic training corpora for tests.

use half::f16;

use crate::data::TrainData;

/// A two-class scene: every image has its left half labelled `0` and its
/// right half `1`, at a constant depth of one metre. A single horizontal
/// depth-difference feature separates the classes near-perfectly, so tiny
/// trees reach one-hot leaves.
pub fn two_class_scene(n_images: u32, width: u32, height: u32) -> TrainData {
    let frame_len = (width * height) as usize;
    let mut labels = Vec::with_capacity(frame_len * n_images as usize);
    for _ in 0..n_images {
        for _y in 0..height {
            for x in 0..width {
                labels.push(u8::from(x >= width / 2));
            }
        }
    }
    let depths = vec![f16::from_f32(1.0); frame_len * n_images as usize];

    TrainData::from_parts(width, height, 1.0, 2, n_images, labels, depths)
}

/// A degenerate scene where every pixel carries label `0` (out of
/// `n_labels` classes) at constant depth. No split has any gain.
pub fn constant_label_scene(n_images: u32, width: u32, height: u32, n_labels: u8) -> TrainData {
    let frame_len = (width * height) as usize * n_images as usize;
    TrainData::from_parts(
        width,
        height,
        1.0,
        n_labels,
        n_images,
        vec![0u8; frame_len],
        vec![f16::from_f32(1.0); frame_len],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_class_scene_is_half_and_half() {
        let data = two_class_scene(2, 8, 8);
        assert_eq!(data.n_labels, 2);
        let zeros = data.label_images.iter().filter(|&&l| l == 0).count();
        assert_eq!(zeros, data.label_images.len() / 2);
    }

    #[test]
    fn constant_scene_is_single_label() {
        let data = constant_label_scene(1, 4, 4, 5);
        assert_eq!(data.n_labels, 5);
        assert!(data.label_images.iter().all(|&l| l == 0));
    }
}
