//! JSON emission of a tree.
//!
//! A textual rendering of the same logical record as the native format,
//! intended for inspection and interchange rather than bit-exact
//! round-tripping. The tree is nested: interior nodes carry their offsets,
//! threshold, and `l`/`r` children; leaves carry their probability row;
//! unfinished nodes (checkpoints only) serialize as empty objects.

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::tree::{left_child, right_child, RdTree};

use super::WriteError;

#[derive(Serialize)]
struct JsonTree {
    #[serde(rename = "_rdt_version")]
    rdt_version: u8,
    depth: u8,
    n_labels: u8,
    bg_label: u8,
    vertical_fov: f32,
    root: JsonNode,
}

#[derive(Serialize)]
#[serde(untagged)]
enum JsonNode {
    Split {
        u: [f32; 2],
        v: [f32; 2],
        t: f32,
        l: Box<JsonNode>,
        r: Box<JsonNode>,
    },
    Leaf {
        p: Vec<f32>,
    },
    Unfinished {},
}

fn convert(tree: &RdTree, id: u32) -> JsonNode {
    let node = &tree.nodes[id as usize];
    if node.is_interior() {
        JsonNode::Split {
            u: node.uv.u(),
            v: node.uv.v(),
            t: node.t,
            l: Box::new(convert(tree, left_child(id))),
            r: Box::new(convert(tree, right_child(id))),
        }
    } else if node.is_leaf() {
        JsonNode::Leaf {
            p: tree.leaf_distribution(node.label_pr_idx).to_vec(),
        }
    } else {
        JsonNode::Unfinished {}
    }
}

/// Render a tree as a JSON string.
///
/// `bg_label` is the background label index, carried here as metadata (the
/// packed format has no slot for it).
pub fn tree_to_json(tree: &RdTree, bg_label: u8) -> String {
    let json = JsonTree {
        rdt_version: super::native::RDT_VERSION,
        depth: tree.depth,
        n_labels: tree.n_labels,
        bg_label,
        vertical_fov: tree.fov,
        root: convert(tree, 0),
    };
    serde_json::to_string_pretty(&json).expect("tree serialization cannot fail")
}

/// Write the JSON rendering to a file.
pub fn save_tree_json(tree: &RdTree, bg_label: u8, path: &Path) -> Result<(), WriteError> {
    fs::write(path, tree_to_json(tree, bg_label))?;
    Ok(())
}
