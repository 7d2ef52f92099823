#![forbid(unsafe_code)]
#![cfg_attr(not(feature = "std"), no_std)]

//! Adaptive octree color quantization.
//!
//! Pixels are classified into an octree over the RGB cube, the tree is pruned
//! until at most `max_colors` nodes still own pixels, and each surviving node
//! becomes one palette entry holding the mean color of its pixels. The pruned
//! tree then maps every pixel to its palette index.
//!
//! ```
//! use octquant::QuantizeConfig;
//! use rgb::RGB8;
//!
//! let pixels = vec![RGB8 { r: 0, g: 0, b: 0 }, RGB8 { r: 255, g: 255, b: 255 }];
//! let result = octquant::quantize(&pixels, 2, 1, &QuantizeConfig::new().max_colors(2)).unwrap();
//! assert_eq!(result.palette_len(), 2);
//! assert_ne!(result.indices()[0], result.indices()[1]);
//! ```

extern crate alloc;

pub mod error;
pub mod octree;
pub mod palette;
pub mod remap;
pub mod session;
pub mod source;

pub use error::QuantizeError;
pub use imgref::{Img, ImgRef};
pub use palette::ColorMap;
pub use session::{Phase, Session};
pub use source::{PixelSource, Region, Sampler};

use alloc::vec::Vec;

use log::debug;
use rgb::RGB8;

/// Configuration for palette quantization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantizeConfig {
    /// Maximum number of palette colors (1..=256).
    pub max_colors: u32,
    /// Live node budget; past it the tree is cut one level shorter.
    pub tree_size: usize,
    /// Sample every `x_period`-th column.
    pub x_period: usize,
    /// Sample every `y_period`-th row.
    pub y_period: usize,
    /// Only sample inside this rectangle. `None` samples the whole image.
    pub region: Option<Region>,
}

impl Default for QuantizeConfig {
    fn default() -> Self {
        Self {
            max_colors: 256,
            tree_size: octree::DEFAULT_TREE_SIZE,
            x_period: 1,
            y_period: 1,
            region: None,
        }
    }
}

impl QuantizeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_colors(mut self, n: u32) -> Self {
        self.max_colors = n;
        self
    }

    pub fn tree_size(mut self, nodes: usize) -> Self {
        self.tree_size = nodes;
        self
    }

    pub fn period(mut self, x_period: usize, y_period: usize) -> Self {
        self.x_period = x_period;
        self.y_period = y_period;
        self
    }

    pub fn region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }
}

/// Quantization result.
#[derive(Debug, Clone)]
pub struct QuantizeResult {
    palette: ColorMap,
    indices: Vec<u8>,
    tree_depth: u8,
}

impl QuantizeResult {
    /// The palette, in the order the octree numbered its entries.
    pub fn palette(&self) -> &ColorMap {
        &self.palette
    }

    /// Get the palette index for each pixel.
    pub fn indices(&self) -> &[u8] {
        &self.indices
    }

    /// Number of colors in the palette.
    pub fn palette_len(&self) -> usize {
        self.palette.len()
    }

    /// Insertion depth the octree ended at, lower than the starting depth
    /// when the node budget forced level pruning.
    pub fn tree_depth(&self) -> u8 {
        self.tree_depth
    }

    pub fn into_parts(self) -> (ColorMap, Vec<u8>) {
        (self.palette, self.indices)
    }
}

/// Quantize an RGB image to a palette and map every pixel to it.
///
/// The palette is built from the pixels selected by the config's region and
/// sampling period; every pixel of the image is remapped.
pub fn quantize(
    pixels: &[RGB8],
    width: usize,
    height: usize,
    config: &QuantizeConfig,
) -> Result<QuantizeResult, QuantizeError> {
    let image = image_from_slice(pixels, width, height)?;
    quantize_img(image, config)
}

/// [`quantize`] for an image that may have a stride.
pub fn quantize_img(
    image: ImgRef<'_, RGB8>,
    config: &QuantizeConfig,
) -> Result<QuantizeResult, QuantizeError> {
    let session = train(image, config)?;
    let indices = remap::remap_image(image, &session);
    let tree_depth = session.tree().depth();

    Ok(QuantizeResult {
        palette: session.into_colormap(),
        indices,
        tree_depth,
    })
}

/// Build only the palette, without remapping pixels.
pub fn build_palette(
    pixels: &[RGB8],
    width: usize,
    height: usize,
    config: &QuantizeConfig,
) -> Result<ColorMap, QuantizeError> {
    let image = image_from_slice(pixels, width, height)?;
    Ok(train(image, config)?.into_colormap())
}

fn train(image: ImgRef<'_, RGB8>, config: &QuantizeConfig) -> Result<Session, QuantizeError> {
    validate_config(image, config)?;

    let mut sampler = Sampler::new(image).period(config.x_period, config.y_period)?;
    if let Some(region) = config.region {
        sampler = sampler.region(region)?;
    }
    debug!(
        "sampling {} of {}x{} pixels for a {}-color palette",
        sampler.sample_count(),
        image.width(),
        image.height(),
        config.max_colors
    );

    Ok(Session::train(
        config.max_colors as usize,
        config.tree_size,
        &sampler,
    ))
}

fn image_from_slice(
    pixels: &[RGB8],
    width: usize,
    height: usize,
) -> Result<ImgRef<'_, RGB8>, QuantizeError> {
    if width == 0 || height == 0 {
        return Err(QuantizeError::ZeroDimension);
    }
    if width.checked_mul(height) != Some(pixels.len()) {
        return Err(QuantizeError::DimensionMismatch {
            len: pixels.len(),
            width,
            height,
        });
    }
    Ok(Img::new(pixels, width, height))
}

fn validate_config(image: ImgRef<'_, RGB8>, config: &QuantizeConfig) -> Result<(), QuantizeError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(QuantizeError::ZeroDimension);
    }
    if config.max_colors < 1 || config.max_colors > 256 {
        return Err(QuantizeError::InvalidMaxColors(config.max_colors));
    }
    if config.tree_size == 0 {
        return Err(QuantizeError::InvalidTreeSize);
    }
    Ok(())
}
