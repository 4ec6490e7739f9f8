//! Training corpus container and on-disk loader.
//!
//! Training consumes packed arrays: one byte label image and one
//! half-precision depth image per frame, all frames sharing dimensions and
//! camera field of view. [`TrainData`] owns those arrays;
//! [`TrainData::gather`] fills them from a dataset directory.
//!
//! # Dataset layout
//!
//! ```text
//! <dir>/<index>.json          metadata: width, height, vertical_fov, n_labels
//! <dir>/<index>.index         one frame basename per line
//! <dir>/labels/<name>.bin     raw u8 labels, row-major height x width
//! <dir>/depth/<name>.bin      raw IEEE binary16 depths, little-endian, same layout
//! ```
//!
//! Depth stays in 16-bit storage after loading; all arithmetic promotes to
//! `f32` on access.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use half::f16;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::Deserialize;
use thiserror::Error;

/// Errors raised while gathering a training corpus.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("bad metadata in '{path}': {source}")]
    Meta {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("index '{0}' lists no frames after limit/skip")]
    Empty(PathBuf),

    #[error("'{path}' holds {actual} bytes, expected {expected}")]
    BadFrameSize {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },
}

/// Frame selection options for [`TrainData::gather`].
#[derive(Debug, Clone, Copy)]
pub struct GatherOptions {
    /// Keep at most this many frames (after `skip`).
    pub limit: u32,
    /// Drop this many frames from the front of the index.
    pub skip: u32,
    /// Shuffle the index before limit/skip are applied.
    pub shuffle: bool,
    /// Seed for the shuffle.
    pub seed: u64,
}

impl Default for GatherOptions {
    fn default() -> Self {
        Self {
            limit: u32::MAX,
            skip: 0,
            shuffle: false,
            seed: 0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DatasetMeta {
    width: u32,
    height: u32,
    vertical_fov: f32,
    n_labels: u8,
}

/// A loaded training corpus: paired label and depth images in packed,
/// row-major layout.
#[derive(Debug, Clone)]
pub struct TrainData {
    pub width: u32,
    pub height: u32,
    /// Vertical field of view of the virtual camera, radians.
    pub fov: f32,
    pub n_labels: u8,
    pub n_images: u32,
    /// `n_images * height * width` label bytes.
    pub label_images: Vec<u8>,
    /// `n_images * height * width` half-precision depths.
    pub depth_images: Vec<f16>,
}

impl TrainData {
    /// Wrap pre-loaded arrays.
    ///
    /// # Panics
    ///
    /// Panics if the array lengths disagree with the declared dimensions.
    pub fn from_parts(
        width: u32,
        height: u32,
        fov: f32,
        n_labels: u8,
        n_images: u32,
        label_images: Vec<u8>,
        depth_images: Vec<f16>,
    ) -> Self {
        let expected = (n_images * width * height) as usize;
        assert_eq!(label_images.len(), expected, "label image array size");
        assert_eq!(depth_images.len(), expected, "depth image array size");
        Self {
            width,
            height,
            fov,
            n_labels,
            n_images,
            label_images,
            depth_images,
        }
    }

    /// Load a corpus from `<data_dir>/<index_name>.{json,index}`.
    pub fn gather(
        data_dir: &Path,
        index_name: &str,
        opts: &GatherOptions,
    ) -> Result<Self, DatasetError> {
        let meta_path = data_dir.join(format!("{index_name}.json"));
        let meta_text = read_file(&meta_path)?;
        let meta: DatasetMeta = serde_json::from_slice(&meta_text).map_err(|source| {
            DatasetError::Meta {
                path: meta_path,
                source,
            }
        })?;

        let index_path = data_dir.join(format!("{index_name}.index"));
        let index_text = read_file(&index_path)?;
        let mut names: Vec<String> = String::from_utf8_lossy(&index_text)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect();

        if opts.shuffle {
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(opts.seed);
            names.shuffle(&mut rng);
        }
        let names: Vec<String> = names
            .into_iter()
            .skip(opts.skip as usize)
            .take(opts.limit as usize)
            .collect();
        if names.is_empty() {
            return Err(DatasetError::Empty(index_path));
        }

        let frame_len = (meta.width * meta.height) as usize;
        let mut label_images = Vec::with_capacity(frame_len * names.len());
        let mut depth_images = Vec::with_capacity(frame_len * names.len());

        for name in &names {
            let label_path = data_dir.join("labels").join(format!("{name}.bin"));
            let bytes = read_file(&label_path)?;
            if bytes.len() != frame_len {
                return Err(DatasetError::BadFrameSize {
                    path: label_path,
                    expected: frame_len,
                    actual: bytes.len(),
                });
            }
            label_images.extend_from_slice(&bytes);

            let depth_path = data_dir.join("depth").join(format!("{name}.bin"));
            let bytes = read_file(&depth_path)?;
            if bytes.len() != frame_len * 2 {
                return Err(DatasetError::BadFrameSize {
                    path: depth_path,
                    expected: frame_len * 2,
                    actual: bytes.len(),
                });
            }
            depth_images.extend(
                bytes
                    .chunks_exact(2)
                    .map(|b| f16::from_le_bytes([b[0], b[1]])),
            );
        }

        Ok(Self {
            width: meta.width,
            height: meta.height,
            fov: meta.vertical_fov,
            n_labels: meta.n_labels,
            n_images: names.len() as u32,
            label_images,
            depth_images,
        })
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, DatasetError> {
    let mut buf = Vec::new();
    fs::File::open(path)
        .and_then(|mut f| f.read_to_end(&mut buf))
        .map_err(|source| DatasetError::Io {
            path: path.to_owned(),
            source,
        })?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_dataset(dir: &Path, names: &[&str], width: u32, height: u32) {
        fs::create_dir_all(dir.join("labels")).unwrap();
        fs::create_dir_all(dir.join("depth")).unwrap();

        let meta = format!(
            r#"{{"width": {width}, "height": {height}, "vertical_fov": 1.0, "n_labels": 2}}"#
        );
        fs::write(dir.join("test.json"), meta).unwrap();

        let mut index = fs::File::create(dir.join("test.index")).unwrap();
        for name in names {
            writeln!(index, "{name}").unwrap();
        }

        let frame_len = (width * height) as usize;
        for (i, name) in names.iter().enumerate() {
            fs::write(
                dir.join("labels").join(format!("{name}.bin")),
                vec![(i % 2) as u8; frame_len],
            )
            .unwrap();
            let depth: Vec<u8> = std::iter::repeat(f16::from_f32(1.5).to_le_bytes())
                .take(frame_len)
                .flatten()
                .collect();
            fs::write(dir.join("depth").join(format!("{name}.bin")), depth).unwrap();
        }
    }

    #[test]
    fn gather_reads_all_frames() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path(), &["a", "b", "c"], 4, 4);

        let data = TrainData::gather(dir.path(), "test", &GatherOptions::default()).unwrap();
        assert_eq!(data.n_images, 3);
        assert_eq!(data.width, 4);
        assert_eq!(data.n_labels, 2);
        assert_eq!(data.label_images.len(), 3 * 16);
        assert_eq!(data.depth_images.len(), 3 * 16);
        assert_eq!(data.depth_images[0].to_f32(), 1.5);
    }

    #[test]
    fn gather_applies_limit_and_skip() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path(), &["a", "b", "c", "d"], 2, 2);

        let opts = GatherOptions {
            limit: 2,
            skip: 1,
            ..Default::default()
        };
        let data = TrainData::gather(dir.path(), "test", &opts).unwrap();
        assert_eq!(data.n_images, 2);
        // Frames "b" (all 1) and "c" (all 0) survive.
        assert_eq!(data.label_images[0], 1);
        assert_eq!(data.label_images[4], 0);
    }

    #[test]
    fn gather_rejects_short_frames() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path(), &["a"], 4, 4);
        fs::write(dir.path().join("labels/a.bin"), vec![0u8; 7]).unwrap();

        let err = TrainData::gather(dir.path(), "test", &GatherOptions::default()).unwrap_err();
        assert!(matches!(err, DatasetError::BadFrameSize { .. }));
    }

    #[test]
    fn from_parts_checks_lengths() {
        let data = TrainData::from_parts(2, 2, 1.0, 1, 1, vec![0; 4], vec![f16::ZERO; 4]);
        assert_eq!(data.n_images, 1);
    }
}
