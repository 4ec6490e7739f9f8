//! Tree persistence: the packed `.rdt` format and a JSON rendering.

mod json;
mod native;

pub use json::{save_tree_json, tree_to_json};
pub use native::{
    read_tree, save_tree, tree_from_bytes, tree_to_bytes, ReadError, WriteError, HEADER_SIZE,
    MAGIC, NODE_SIZE, RDT_VERSION,
};
