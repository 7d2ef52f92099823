use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuantizeError {
    #[error("image dimensions cannot be zero")]
    ZeroDimension,

    #[error("pixel buffer length {len} does not match dimensions {width}x{height}")]
    DimensionMismatch {
        len: usize,
        width: usize,
        height: usize,
    },

    #[error("max_colors must be between 1 and 256, got {0}")]
    InvalidMaxColors(u32),

    #[error("tree_size must be at least 1")]
    InvalidTreeSize,

    #[error("sampling period must be non-zero, got {x_period}x{y_period}")]
    InvalidPeriod { x_period: usize, y_period: usize },

    #[error("region {width}x{height}+{x}+{y} does not fit inside a {image_width}x{image_height} image")]
    RegionOutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
        image_width: usize,
        image_height: usize,
    },
}
