//! QOI codec with a block-parallel extended format.
//!
//! # Canonical format
//!
//! ## Header
//!
//! - 4-byte magic: `qoif`
//! - u32be width: 1..
//! - u32be height: 1.. (bounded so `width * height < 400_000_000`)
//! - u8 channels: 3 (RGB) or 4 (RGBA)
//! - u8 colorspace: 0 (sRGB, linear alpha) or 1 (all linear); informative
//!   only, never affects encoding
//!
//! ## Stream format
//!
//! The header is followed by a stream of byte-aligned chunks and an 8-byte
//! end marker `00 00 00 00 00 00 00 01`. Encoder and decoder both start with
//! `{r: 0, g: 0, b: 0, a: 255}` as the previous pixel and a zero-initialized
//! 64-entry array of previously seen pixels, updated at
//! `(3r + 5g + 7b + 11a) % 64`. Pixels run left to right, top to bottom.
//!
//! ```plain
//! .- QOI_OP_INDEX ----------.
//! |         Byte[0]         |
//! |  7  6  5  4  3  2  1  0 |
//! |-------+-----------------|
//! |  0  0 |     index       |
//! `-------------------------`
//! ```
//!
//! - 2-bit tag b00
//! - 6-bit index into the color index array: 0..63
//! - A valid encoder must not issue 2 or more consecutive QOI_OP_INDEX chunks
//!   to the same index. QOI_OP_RUN should be used instead.
//!
//! ```plain
//! .- QOI_OP_DIFF -----------.
//! |         Byte[0]         |
//! |  7  6  5  4  3  2  1  0 |
//! |-------+-----+-----+-----|
//! |  0  1 |  dr |  dg |  db |
//! `-------------------------`
//! ```
//!
//! - 2-bit tag b01
//! - 2-bit   red channel difference from the previous pixel between -2..1
//! - 2-bit green channel difference from the previous pixel between -2..1
//! - 2-bit  blue channel difference from the previous pixel between -2..1
//! - Differences wrap around (`1 - 2` is 255), values are stored with a bias
//!   of 2. Alpha is unchanged.
//!
//! ```plain
//! .- QOI_OP_LUMA -------------------------------------.
//! |         Byte[0]         |         Byte[1]         |
//! |  7  6  5  4  3  2  1  0 |  7  6  5  4  3  2  1  0 |
//! |-------+-----------------+-------------+-----------|
//! |  1  0 |   green diff    |   dr - dg   |  db - dg  |
//! `---------------------------------------------------`
//! ```
//!
//! - 2-bit tag b10
//! - 6-bit green channel difference from the previous pixel -32..31
//! - 4-bit   red channel difference minus green channel difference -8..7
//! - 4-bit  blue channel difference minus green channel difference -8..7
//! - Differences wrap around, biases are 32 and 8. Alpha is unchanged.
//!
//! ```plain
//! .- QOI_OP_RUN ------------.
//! |         Byte[0]         |
//! |  7  6  5  4  3  2  1  0 |
//! |-------+-----------------|
//! |  1  1 |       run       |
//! `-------------------------`
//! ```
//!
//! - 2-bit tag b11
//! - 6-bit run-length repeating the previous pixel: 1..62, stored with a bias
//!   of -1. The run-lengths 63 and 64 are occupied by the QOI_OP_RGB and
//!   QOI_OP_RGBA tags.
//!
//! ```plain
//! .- QOI_OP_RGB ------------------------------------------.
//! |         Byte[0]         | Byte[1] | Byte[2] | Byte[3] |
//! |  7  6  5  4  3  2  1  0 | 7 .. 0  | 7 .. 0  | 7 .. 0  |
//! |-------------------------+---------+---------+---------|
//! |  1  1  1  1  1  1  1  0 |   red   |  green  |  blue   |
//! `-------------------------------------------------------`
//!
//! .- QOI_OP_RGBA ---------------------------------------------------.
//! |         Byte[0]         | Byte[1] | Byte[2] | Byte[3] | Byte[4] |
//! |  7  6  5  4  3  2  1  0 | 7 .. 0  | 7 .. 0  | 7 .. 0  | 7 .. 0  |
//! |-------------------------+---------+---------+---------+---------|
//! |  1  1  1  1  1  1  1  1 |   red   |  green  |  blue   |  alpha  |
//! `-----------------------------------------------------------------`
//! ```
//!
//! - 8-bit tags b11111110 and b11111111, full channel values. A decoder must
//!   check for the 8-bit tags before testing the 2-bit tags.
//!
//! # Extended block-parallel format
//!
//! The [`parallel`] module produces a superset of the canonical layout that
//! trades a few bytes of compression for independently decodable segments.
//! It is *not* readable by plain QOI decoders:
//!
//! ```plain
//! offset    size  field
//! 0         14    canonical header (identical layout)
//! 14        4     num_blocks (u32be)
//! 18        4*N   block offsets (u32be each), relative to offset 18 + 4N
//! 18 + 4N   ..    concatenated per-block chunk streams
//! end - 8   8     end marker
//! ```
//!
//! The image is cut into blocks of [`consts::BLOCK_HEIGHT`] rows (the last
//! block may be shorter). Every block is encoded with a freshly reset
//! previous pixel, run, and color index array, so blocks share no state and
//! can be encoded and decoded on any number of workers with byte-identical
//! results.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod consts;
pub mod decode;
pub mod encode;
#[cfg(feature = "parallel")]
pub mod parallel;
pub mod utils;

use consts::QOI_PIXELS_MAX;
use snafu::ensure;

#[cfg(feature = "parallel")]
use alloc::vec::Vec;

pub use decode::{decode_header, DecodeError};
#[cfg(feature = "alloc")]
pub use decode::decode_to_vec;
pub use encode::EncodeError;
#[cfg(feature = "alloc")]
pub use encode::encode_to_vec;

/// Number of interleaved channel bytes per pixel in a raw buffer.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum Channels {
    Rgb = 3,
    Rgba = 4,
}

impl Channels {
    /// Bytes per pixel.
    #[inline]
    pub const fn bytes(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for Channels {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, DecodeError> {
        match value {
            3 => Ok(Channels::Rgb),
            4 => Ok(Channels::Rgba),
            _ => Err(DecodeError::InvalidChannels { value }),
        }
    }
}

/// Colorspace hint carried in the header. Purely informative; both values
/// encode and decode identically.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum Colorspace {
    Srgb = 0,
    Linear = 1,
}

impl TryFrom<u8> for Colorspace {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, DecodeError> {
        match value {
            0 => Ok(Colorspace::Srgb),
            1 => Ok(Colorspace::Linear),
            _ => Err(DecodeError::InvalidColorspace { value }),
        }
    }
}

/// Describes a raw pixel buffer. Parsed from the header on decode, supplied
/// by the caller on encode.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct QoiDescriptor {
    pub width: u32,
    pub height: u32,
    pub channels: Channels,
    pub colorspace: Colorspace,
}

impl QoiDescriptor {
    /// `width * height`.
    #[inline]
    pub const fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Size of the raw pixel buffer this descriptor describes.
    #[inline]
    pub const fn byte_len(&self) -> usize {
        self.pixel_count() * self.channels.bytes()
    }

    /// Worst case canonical encoding size: every pixel as a full literal,
    /// plus header and end marker. [`encode_to_vec`] allocates this up front
    /// and never reallocates.
    #[inline]
    pub const fn encoded_size_limit(&self) -> usize {
        self.pixel_count() * (self.channels.bytes() + 1)
            + consts::QOI_HEADER_SIZE
            + consts::QOI_PADDING.len()
    }

    /// Checks the dimension invariants: both dimensions nonzero and the
    /// total pixel count below [`consts::QOI_PIXELS_MAX`].
    pub fn validate(&self) -> Result<(), EncodeError> {
        ensure!(
            self.width != 0 && self.height != 0,
            encode::InvalidDimensionsSnafu {
                width: self.width,
                height: self.height,
            }
        );
        ensure!(
            (self.height as usize) < QOI_PIXELS_MAX / self.width as usize,
            encode::PixelBudgetExceededSnafu {
                width: self.width,
                height: self.height,
            }
        );
        Ok(())
    }
}

/// Pixel count at which [`encode_auto`] switches to the block-parallel
/// encoder.
#[cfg(feature = "parallel")]
pub const PARALLEL_THRESHOLD: usize = 256 * 1024;

/// Encodes with the serial codec for small images and the block-parallel
/// codec (on the ambient rayon pool) once the image crosses
/// [`PARALLEL_THRESHOLD`] pixels.
///
/// The two paths produce different wire formats; use [`decode_auto`] or pick
/// the matching decoder explicitly.
#[cfg(feature = "parallel")]
pub fn encode_auto(pixels: &[u8], desc: &QoiDescriptor) -> Result<Vec<u8>, EncodeError> {
    if desc.pixel_count() >= PARALLEL_THRESHOLD {
        parallel::encode_to_vec(pixels, desc, 0)
    } else {
        encode::encode_to_vec(pixels, desc)
    }
}

/// Decodes either wire format, branching on the word that follows the
/// canonical header: an extended stream carries its block count there, and
/// the block count is fully determined by the image height.
#[cfg(feature = "parallel")]
pub fn decode_auto(
    data: &[u8],
    channels: Option<Channels>,
) -> Result<(QoiDescriptor, Vec<u8>), DecodeError> {
    if parallel::is_extended(data)? {
        parallel::decode_to_vec(data, channels, 0)
    } else {
        decode::decode_to_vec(data, channels)
    }
}
