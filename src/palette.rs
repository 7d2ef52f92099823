extern crate alloc;
use alloc::vec;
use alloc::vec::Vec;

use rgb::RGB8;

/// The color lookup table produced by octree assignment.
///
/// Stored as three parallel channel sequences so it can be handed to
/// consumers that expect a planar LUT (one byte array per band).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColorMap {
    red: Vec<u8>,
    green: Vec<u8>,
    blue: Vec<u8>,
}

impl ColorMap {
    /// A zero-filled map of `len` entries, written in place during assignment.
    pub(crate) fn with_len(len: usize) -> Self {
        Self {
            red: vec![0; len],
            green: vec![0; len],
            blue: vec![0; len],
        }
    }

    pub(crate) fn set(&mut self, index: usize, color: RGB8) {
        self.red[index] = color.r;
        self.green[index] = color.g;
        self.blue[index] = color.b;
    }

    /// Number of palette entries.
    pub fn len(&self) -> usize {
        self.red.len()
    }

    /// Whether the palette is empty.
    pub fn is_empty(&self) -> bool {
        self.red.is_empty()
    }

    /// Palette entry at `index`, if any.
    pub fn get(&self, index: usize) -> Option<RGB8> {
        Some(RGB8 {
            r: *self.red.get(index)?,
            g: self.green[index],
            b: self.blue[index],
        })
    }

    pub fn red(&self) -> &[u8] {
        &self.red
    }

    pub fn green(&self) -> &[u8] {
        &self.green
    }

    pub fn blue(&self) -> &[u8] {
        &self.blue
    }

    /// The three channel bands in R, G, B order.
    pub fn bands(&self) -> [&[u8]; 3] {
        [&self.red, &self.green, &self.blue]
    }

    /// Iterate over entries in index order.
    pub fn iter(&self) -> impl Iterator<Item = RGB8> + '_ {
        self.red
            .iter()
            .zip(&self.green)
            .zip(&self.blue)
            .map(|((&r, &g), &b)| RGB8 { r, g, b })
    }

    /// Interleaved `[r, g, b]` entries, the layout most encoders take.
    pub fn entries(&self) -> Vec<[u8; 3]> {
        self.iter().map(|c| [c.r, c.g, c.b]).collect()
    }

    /// Find the nearest palette index for a color (brute force, squared RGB distance).
    ///
    /// Ties resolve to the lowest index. Returns 0 for an empty palette.
    pub fn nearest(&self, color: RGB8) -> usize {
        let mut best_idx = 0;
        let mut best_dist = u32::MAX;

        for (i, entry) in self.iter().enumerate() {
            let d = distance_sq(color, entry);
            if d < best_dist {
                best_dist = d;
                best_idx = i;
                if d == 0 {
                    break;
                }
            }
        }

        best_idx
    }
}

/// Squared Euclidean distance between two colors in RGB space.
pub fn distance_sq(a: RGB8, b: RGB8) -> u32 {
    let dr = a.r.abs_diff(b.r) as u32;
    let dg = a.g.abs_diff(b.g) as u32;
    let db = a.b.abs_diff(b.b) as u32;
    dr * dr + dg * dg + db * db
}
