//! The native `.rdt` tree file format.
//!
//! A packed little-endian layout: a 10-byte header, `2^depth - 1` node
//! records, then the flat leaf probability table.
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0       3     Magic ("RDT")
//! 3       1     Format version
//! 4       1     Tree depth
//! 5       1     Number of labels
//! 6       4     Vertical field of view, radians (f32 LE)
//! ```
//!
//! Each node record is 24 bytes: `uv` as four `f32`, `t` as `f32`, and the
//! `label_pr_idx` tag as `u32`. `0` marks an interior node, `u32::MAX` an
//! unfinished node (checkpoints), anything else a one-based index into the
//! probability table that follows the node array. The table's row count is
//! implied by the remaining file length.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use thiserror::Error;

use crate::tree::{node_count, Node, RdTree, UvPair};

/// Magic bytes identifying a tree file.
pub const MAGIC: &[u8; 3] = b"RDT";

/// Current format version.
pub const RDT_VERSION: u8 = 3;

/// Size of the packed header in bytes.
pub const HEADER_SIZE: usize = 10;

/// Size of one packed node record in bytes.
pub const NODE_SIZE: usize = 24;

/// Errors raised while reading a tree file.
#[derive(Debug, Error)]
pub enum ReadError {
    /// Wrong magic bytes.
    #[error("not an RDT tree file")]
    NotATree,

    /// Version this build does not understand.
    #[error("unsupported RDT version {0} (expected {RDT_VERSION})")]
    UnsupportedVersion(u8),

    /// Depth outside `1..=30`.
    #[error("implausible tree depth {0}")]
    BadDepth(u8),

    /// File ends before the node array does, or the probability table is
    /// not a whole number of rows.
    #[error("file truncated: expected {expected} more bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// A leaf index points past the probability table.
    #[error("node {node} references leaf {leaf} of {n_leaves}")]
    BadLeafIndex { node: u32, leaf: u32, n_leaves: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while writing a tree file.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serialize a tree to its packed byte representation.
pub fn tree_to_bytes(tree: &RdTree) -> Vec<u8> {
    let mut buf =
        Vec::with_capacity(HEADER_SIZE + tree.nodes.len() * NODE_SIZE + tree.label_prs.len() * 4);

    buf.extend_from_slice(MAGIC);
    buf.push(RDT_VERSION);
    buf.push(tree.depth);
    buf.push(tree.n_labels);
    buf.extend_from_slice(&tree.fov.to_le_bytes());

    for node in &tree.nodes {
        for c in node.uv.0 {
            buf.extend_from_slice(&c.to_le_bytes());
        }
        buf.extend_from_slice(&node.t.to_le_bytes());
        buf.extend_from_slice(&node.label_pr_idx.to_le_bytes());
    }

    for &p in &tree.label_prs {
        buf.extend_from_slice(&p.to_le_bytes());
    }

    buf
}

/// Parse a tree from its packed byte representation.
pub fn tree_from_bytes(bytes: &[u8]) -> Result<RdTree, ReadError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ReadError::Truncated {
            expected: HEADER_SIZE,
            actual: bytes.len(),
        });
    }
    if &bytes[0..3] != MAGIC {
        return Err(ReadError::NotATree);
    }
    let version = bytes[3];
    if version != RDT_VERSION {
        return Err(ReadError::UnsupportedVersion(version));
    }
    let depth = bytes[4];
    if !(1..=30).contains(&depth) {
        return Err(ReadError::BadDepth(depth));
    }
    let n_labels = bytes[5];
    let fov = f32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);

    let n_nodes = node_count(depth);
    let nodes_end = HEADER_SIZE + n_nodes * NODE_SIZE;
    if bytes.len() < nodes_end {
        return Err(ReadError::Truncated {
            expected: nodes_end - HEADER_SIZE,
            actual: bytes.len() - HEADER_SIZE,
        });
    }

    let f32_at = |offset: usize| {
        f32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ])
    };

    let mut nodes = Vec::with_capacity(n_nodes);
    for i in 0..n_nodes {
        let base = HEADER_SIZE + i * NODE_SIZE;
        let uv = UvPair([
            f32_at(base),
            f32_at(base + 4),
            f32_at(base + 8),
            f32_at(base + 12),
        ]);
        let t = f32_at(base + 16);
        let label_pr_idx = u32::from_le_bytes([
            bytes[base + 20],
            bytes[base + 21],
            bytes[base + 22],
            bytes[base + 23],
        ]);
        nodes.push(Node {
            uv,
            t,
            label_pr_idx,
        });
    }

    let table = &bytes[nodes_end..];
    let row_size = n_labels as usize * 4;
    if row_size > 0 && table.len() % row_size != 0 {
        return Err(ReadError::Truncated {
            expected: table.len().next_multiple_of(row_size) - table.len(),
            actual: 0,
        });
    }
    let label_prs: Vec<f32> = table
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    let tree = RdTree {
        depth,
        n_labels,
        fov,
        nodes,
        label_prs,
    };

    let n_leaves = tree.n_leaves() as u32;
    for (i, node) in tree.nodes.iter().enumerate() {
        if node.is_leaf() && node.label_pr_idx > n_leaves {
            return Err(ReadError::BadLeafIndex {
                node: i as u32,
                leaf: node.label_pr_idx,
                n_leaves,
            });
        }
    }

    Ok(tree)
}

/// Write a tree to a file.
pub fn save_tree(tree: &RdTree, path: &Path) -> Result<(), WriteError> {
    let mut file = fs::File::create(path)?;
    file.write_all(&tree_to_bytes(tree))?;
    Ok(())
}

/// Read a tree from a file.
pub fn read_tree(path: &Path) -> Result<RdTree, ReadError> {
    let mut bytes = Vec::new();
    fs::File::open(path)?.read_to_end(&mut bytes)?;
    tree_from_bytes(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> RdTree {
        let mut nodes = vec![Node::unfinished(); node_count(2)];
        nodes[0] = Node {
            uv: UvPair([1.5, -2.5, 0.25, 8.0]),
            t: -0.375,
            label_pr_idx: 0,
        };
        nodes[1] = Node {
            uv: UvPair::default(),
            t: 0.0,
            label_pr_idx: 1,
        };
        nodes[2] = Node {
            uv: UvPair::default(),
            t: 0.0,
            label_pr_idx: 2,
        };
        RdTree {
            depth: 2,
            n_labels: 3,
            fov: 1.2345,
            nodes,
            label_prs: vec![1.0, 0.0, 0.0, 0.25, 0.25, 0.5],
        }
    }

    #[test]
    fn round_trip_is_bit_exact() {
        let tree = sample_tree();
        let bytes = tree_to_bytes(&tree);
        let loaded = tree_from_bytes(&bytes).unwrap();
        assert_eq!(loaded, tree);
        // And the bytes themselves are stable.
        assert_eq!(tree_to_bytes(&loaded), bytes);
    }

    #[test]
    fn header_layout() {
        let bytes = tree_to_bytes(&sample_tree());
        assert_eq!(&bytes[0..3], b"RDT");
        assert_eq!(bytes[3], RDT_VERSION);
        assert_eq!(bytes[4], 2); // depth
        assert_eq!(bytes[5], 3); // n_labels
        assert_eq!(
            bytes.len(),
            HEADER_SIZE + 3 * NODE_SIZE + 6 * 4,
        );
    }

    #[test]
    fn unfinished_sentinel_survives() {
        let mut tree = sample_tree();
        tree.nodes[2] = Node::unfinished();
        tree.label_prs.truncate(3);

        let loaded = tree_from_bytes(&tree_to_bytes(&tree)).unwrap();
        assert!(loaded.nodes[2].is_unfinished());
    }

    #[test]
    fn rejects_wrong_magic() {
        let mut bytes = tree_to_bytes(&sample_tree());
        bytes[0] = b'X';
        assert!(matches!(
            tree_from_bytes(&bytes).unwrap_err(),
            ReadError::NotATree
        ));
    }

    #[test]
    fn rejects_unknown_version() {
        let mut bytes = tree_to_bytes(&sample_tree());
        bytes[3] = 99;
        assert!(matches!(
            tree_from_bytes(&bytes).unwrap_err(),
            ReadError::UnsupportedVersion(99)
        ));
    }

    #[test]
    fn rejects_truncated_node_array() {
        let bytes = tree_to_bytes(&sample_tree());
        assert!(matches!(
            tree_from_bytes(&bytes[..HEADER_SIZE + NODE_SIZE]).unwrap_err(),
            ReadError::Truncated { .. }
        ));
    }

    #[test]
    fn rejects_leaf_index_past_table() {
        let mut tree = sample_tree();
        tree.nodes[2].label_pr_idx = 40;
        assert!(matches!(
            tree_from_bytes(&tree_to_bytes(&tree)).unwrap_err(),
            ReadError::BadLeafIndex {
                node: 2,
                leaf: 40,
                ..
            }
        ));
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.rdt");

        let tree = sample_tree();
        save_tree(&tree, &path).unwrap();
        let loaded = read_tree(&path).unwrap();
        assert_eq!(loaded, tree);
    }
}
