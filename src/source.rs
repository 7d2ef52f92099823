//! Pixel sources feeding the octree.
//!
//! A source decides which pixels the quantizer sees: a rectangular region of
//! interest, and a periodic x/y stride inside it. The quantizer itself never
//! sees coordinates.

use imgref::ImgRef;
use rgb::RGB8;

use crate::error::QuantizeError;

/// Anything that can yield 8-bit RGB triples for palette construction.
pub trait PixelSource {
    /// Call `f` once per sampled pixel.
    fn for_each_pixel(&self, f: &mut dyn FnMut(RGB8));
}

impl PixelSource for [RGB8] {
    fn for_each_pixel(&self, f: &mut dyn FnMut(RGB8)) {
        for &p in self {
            f(p);
        }
    }
}

/// A rectangle in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Region {
    pub const fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The whole of a `width`x`height` image.
    pub const fn full(width: usize, height: usize) -> Self {
        Self::new(0, 0, width, height)
    }

    fn check_within(&self, image_width: usize, image_height: usize) -> Result<(), QuantizeError> {
        let fits = self.width > 0
            && self.height > 0
            && self
                .x
                .checked_add(self.width)
                .is_some_and(|right| right <= image_width)
            && self
                .y
                .checked_add(self.height)
                .is_some_and(|bottom| bottom <= image_height);
        if fits {
            Ok(())
        } else {
            Err(QuantizeError::RegionOutOfBounds {
                x: self.x,
                y: self.y,
                width: self.width,
                height: self.height,
                image_width,
                image_height,
            })
        }
    }
}

/// Samples an image every `x_period` columns and `y_period` rows of a region,
/// starting at the region's top-left pixel.
#[derive(Debug, Clone, Copy)]
pub struct Sampler<'a> {
    image: ImgRef<'a, RGB8>,
    region: Region,
    x_period: usize,
    y_period: usize,
}

impl<'a> Sampler<'a> {
    /// Every pixel of `image`.
    pub fn new(image: ImgRef<'a, RGB8>) -> Self {
        Self {
            image,
            region: Region::full(image.width(), image.height()),
            x_period: 1,
            y_period: 1,
        }
    }

    /// Restrict sampling to `region`.
    pub fn region(mut self, region: Region) -> Result<Self, QuantizeError> {
        region.check_within(self.image.width(), self.image.height())?;
        self.region = region;
        Ok(self)
    }

    /// Visit every `x_period`-th column and `y_period`-th row.
    pub fn period(mut self, x_period: usize, y_period: usize) -> Result<Self, QuantizeError> {
        if x_period == 0 || y_period == 0 {
            return Err(QuantizeError::InvalidPeriod { x_period, y_period });
        }
        self.x_period = x_period;
        self.y_period = y_period;
        Ok(self)
    }

    /// Number of pixels [`PixelSource::for_each_pixel`] will visit.
    pub fn sample_count(&self) -> usize {
        self.region.width.div_ceil(self.x_period) * self.region.height.div_ceil(self.y_period)
    }
}

impl PixelSource for Sampler<'_> {
    fn for_each_pixel(&self, f: &mut dyn FnMut(RGB8)) {
        let Region {
            x,
            y,
            width,
            height,
        } = self.region;
        if width == 0 || height == 0 {
            return;
        }

        let window = self.image.sub_image(x, y, width, height);
        for row in window.rows().step_by(self.y_period) {
            for &p in row.iter().step_by(self.x_period) {
                f(p);
            }
        }
    }
}
