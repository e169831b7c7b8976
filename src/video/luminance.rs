//! RGB0 to luminance conversion.
//!
//! Each raw pixel is four bytes `R, G, B, 0`. The converted pixel is the ITU-R
//! BT.601 luma computed in fixed point:
//!
//! ```text
//! Y = (299 * R + 587 * G + 114 * B + 500) / 1000
//! ```
//!
//! The `+ 500` rounds to nearest. The weights sum to 1000 so the result never
//! exceeds 255 and needs no clamping.

use crate::video::RAW_BYTES_PER_PIXEL;

/// Red weight, in thousandths.
pub const WEIGHT_R: u32 = 299;
/// Green weight, in thousandths.
pub const WEIGHT_G: u32 = 587;
/// Blue weight, in thousandths.
pub const WEIGHT_B: u32 = 114;

const SCALE: u32 = 1000;

/// Luma of a single pixel.
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    let weighted = WEIGHT_R * u32::from(r) + WEIGHT_G * u32::from(g) + WEIGHT_B * u32::from(b);
    ((weighted + SCALE / 2) / SCALE) as u8
}

/// Convert a packed RGB0 frame into a single-channel frame.
///
/// `dst` must hold one byte per pixel of `src`; extra bytes on either side are
/// left untouched.
pub fn rgb0_to_luma(src: &[u8], dst: &mut [u8]) {
    debug_assert_eq!(src.len() / RAW_BYTES_PER_PIXEL, dst.len());
    for (pixel, out) in src.chunks_exact(RAW_BYTES_PER_PIXEL).zip(dst.iter_mut()) {
        *out = luma(pixel[0], pixel[1], pixel[2]);
    }
}
