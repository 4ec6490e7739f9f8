//! Per-pixel label inference over a learned tree or forest.
//!
//! For every pixel of a depth image, walk each tree from the root: evaluate
//! the node's depth-difference feature, descend left when the value is
//! below the node's threshold, and accumulate the reached leaf's label
//! distribution. Forest outputs are the per-tree average.
//!
//! Feature evaluation is shared with training ([`crate::feature`]), so a
//! tree classifies exactly the pixels it was trained on the same way.

use rayon::prelude::*;

use crate::feature::{sample_uv, Depth};
use crate::tree::{left_child, right_child, RdTree};

/// Infer per-pixel label probabilities for a depth image.
///
/// Returns a `width * height * n_labels` row-major buffer; each pixel's
/// slice sums to 1 for complete trees (or 0 where every tree reached an
/// empty leaf). Accepts half-precision or `f32` depth images.
///
/// # Panics
///
/// Panics if the forest is empty, the trees disagree on `n_labels`, or the
/// image size does not match `width * height`.
pub fn infer_labels<D: Depth>(
    forest: &[RdTree],
    depth_image: &[D],
    width: u32,
    height: u32,
) -> Vec<f32> {
    assert!(!forest.is_empty(), "empty forest");
    assert_eq!(depth_image.len(), (width * height) as usize, "image size");
    let n_labels = forest[0].n_labels as usize;
    assert!(
        forest.iter().all(|t| t.n_labels as usize == n_labels),
        "forest trees disagree on label count"
    );

    let mut output = vec![0f32; (width * height) as usize * n_labels];

    // Rows are independent; trees accumulate in order within each pixel.
    output
        .par_chunks_mut(width as usize * n_labels)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width as usize {
                let depth = depth_image[y * width as usize + x].to_f32();
                let out = &mut row[x * n_labels..(x + 1) * n_labels];

                for tree in forest {
                    let leaf = walk(tree, depth_image, width, height, x as i32, y as i32, depth);
                    for (o, &p) in out.iter_mut().zip(leaf) {
                        *o += p;
                    }
                }
            }
        });

    let scale = 1.0 / forest.len() as f32;
    for p in &mut output {
        *p *= scale;
    }

    output
}

/// Walk one tree for one pixel and return the reached leaf's distribution.
fn walk<'t, D: Depth>(
    tree: &'t RdTree,
    depth_image: &[D],
    width: u32,
    height: u32,
    x: i32,
    y: i32,
    depth: f32,
) -> &'t [f32] {
    let mut id = 0u32;
    loop {
        let node = &tree.nodes[id as usize];
        if !node.is_interior() {
            return tree.leaf_distribution(node.label_pr_idx);
        }

        let value = sample_uv(depth_image, width, height, x, y, depth, node.uv);
        id = if value < node.t {
            left_child(id)
        } else {
            right_child(id)
        };
    }
}
