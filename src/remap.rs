extern crate alloc;
use alloc::vec::Vec;

use imgref::ImgRef;
use rgb::RGB8;

use crate::session::Session;

/// Map RGB pixels to palette indices of an assigned session.
///
/// # Panics
/// If the session is not assigned, or its palette has more than 256 entries.
pub fn remap_pixels(pixels: &[RGB8], session: &Session) -> Vec<u8> {
    check_byte_indexable(session);
    pixels
        .iter()
        .map(|&p| session.color_index(p) as u8)
        .collect()
}

/// Map every pixel of an image, row-major, to palette indices.
///
/// The output is tightly packed (`width * height` entries) even when the
/// image has a stride wider than its width.
pub fn remap_image(image: ImgRef<'_, RGB8>, session: &Session) -> Vec<u8> {
    check_byte_indexable(session);
    let mut indices = Vec::with_capacity(image.width() * image.height());
    for row in image.rows() {
        indices.extend(row.iter().map(|&p| session.color_index(p) as u8));
    }
    indices
}

fn check_byte_indexable(session: &Session) {
    let len = session.colormap().map(|c| c.len());
    assert!(
        len.is_some_and(|n| n <= 256),
        "remapping needs an assigned palette of at most 256 entries, got {len:?}"
    );
}
