//! On-disk dataset layouts

use crate::augment::pipeline::PairAugmenter;
use crate::data::batch::ImagePair;
use crate::data::loader::PairSource;
use crate::io::error::{Result, TrainingError, WithContext};
use crate::io::image::{
    gray_to_tensor, load_image, resize_square, rgb_to_tensor, split_side_by_side,
};
use image::imageops;
use rand::Rng;
use rand::rngs::StdRng;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Image files directly inside `dir`, sorted by path
///
/// # Errors
///
/// Returns `FileSystem` if the directory cannot be read and `InvalidDataset`
/// if it holds no images
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_path(dir)? {
        let path = entry.with_path(dir)?.path();
        let is_image = path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if path.is_file() && is_image {
            files.push(path);
        }
    }
    if files.is_empty() {
        return Err(TrainingError::InvalidDataset {
            reason: format!("no images found in '{}'", dir.display()),
        });
    }
    files.sort();
    Ok(files)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}

/// Side-by-side `A|B` grayscale pairs for sketch simplification
///
/// With an augmenter the pairs go through the random geometric chain;
/// without one they are only resized.
#[derive(Debug, Clone)]
pub struct SketchSimplificationFolder {
    files: Vec<PathBuf>,
    a_to_b: bool,
    size: u32,
    augmenter: Option<PairAugmenter>,
}

impl SketchSimplificationFolder {
    /// Index every image in `dir`
    ///
    /// `a_to_b` maps the left half to the right half; otherwise the
    /// direction is reversed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read or holds no images
    pub fn open(
        dir: &Path,
        a_to_b: bool,
        size: u32,
        augmenter: Option<PairAugmenter>,
    ) -> Result<Self> {
        Ok(Self {
            files: list_images(dir)?,
            a_to_b,
            size,
            augmenter,
        })
    }
}

impl PairSource for SketchSimplificationFolder {
    fn len(&self) -> usize {
        self.files.len()
    }

    fn name(&self, index: usize) -> String {
        self.files.get(index).map(|p| file_stem(p)).unwrap_or_default()
    }

    fn load(&self, index: usize, rng: &mut StdRng) -> Result<ImagePair> {
        let path = self.files.get(index).ok_or_else(|| TrainingError::InvalidDataset {
            reason: format!("sample {index} out of range"),
        })?;
        let combined = load_image(path)?.to_luma8();
        let (left, right) = split_side_by_side(&combined).with_path(path)?;
        let (source, target) = if self.a_to_b {
            (left, right)
        } else {
            (right, left)
        };

        let (source, target) = match &self.augmenter {
            Some(augmenter) => augmenter.augment(&source, &target, rng)?,
            None => (
                gray_to_tensor(&resize_square(&source, self.size)),
                gray_to_tensor(&resize_square(&target, self.size)),
            ),
        };
        ImagePair::new(target.clone(), target, source)
    }
}

/// Parallel `color/` and `sketch/` directories matched by file name
///
/// Training folders flip colour and sketch together with probability one
/// half.
#[derive(Debug, Clone)]
pub struct ColorizationFolder {
    color_dir: PathBuf,
    sketch_dir: PathBuf,
    names: Vec<String>,
    size: u32,
    flip: bool,
}

impl ColorizationFolder {
    /// Index the images of `dir/color` that have a counterpart in `dir/sketch`
    ///
    /// # Errors
    ///
    /// Returns `InvalidDataset` if a colour image has no sketch, or an error
    /// if either directory cannot be read
    pub fn open(dir: &Path, size: u32, flip: bool) -> Result<Self> {
        let color_dir = dir.join("color");
        let sketch_dir = dir.join("sketch");
        let sketches: HashSet<String> = list_images(&sketch_dir)?
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
            .collect();

        let mut names = Vec::new();
        for path in list_images(&color_dir)? {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if !sketches.contains(&name) {
                return Err(TrainingError::InvalidDataset {
                    reason: format!(
                        "'{}' has no sketch in '{}'",
                        path.display(),
                        sketch_dir.display()
                    ),
                });
            }
            names.push(name);
        }

        Ok(Self {
            color_dir,
            sketch_dir,
            names,
            size,
            flip,
        })
    }
}

impl PairSource for ColorizationFolder {
    fn len(&self) -> usize {
        self.names.len()
    }

    fn name(&self, index: usize) -> String {
        self.names
            .get(index)
            .map(|n| file_stem(Path::new(n)))
            .unwrap_or_default()
    }

    fn load(&self, index: usize, rng: &mut StdRng) -> Result<ImagePair> {
        let name = self.names.get(index).ok_or_else(|| TrainingError::InvalidDataset {
            reason: format!("sample {index} out of range"),
        })?;
        let mut color = resize_square(&load_image(&self.color_dir.join(name))?.to_rgb8(), self.size);
        let mut sketch =
            resize_square(&load_image(&self.sketch_dir.join(name))?.to_luma8(), self.size);

        if self.flip && rng.random_bool(0.5) {
            imageops::flip_horizontal_in_place(&mut color);
            imageops::flip_horizontal_in_place(&mut sketch);
        }

        let content = rgb_to_tensor(&color);
        ImagePair::new(content.clone(), content, gray_to_tensor(&sketch))
    }
}
