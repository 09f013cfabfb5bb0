use crate::{
    consts::*,
    utils::{self, unlikely, Pixel},
    Channels, Colorspace, QoiDescriptor,
};
use snafu::{ensure, Snafu};

#[cfg(feature = "alloc")]
use alloc::{vec, vec::Vec};
#[cfg(feature = "parallel")]
use std::boxed::Box;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DecodeError {
    #[snafu(display("stream of {size} bytes is too short to hold an image"))]
    TooSmall { size: usize },

    #[snafu(display("stream does not start with the `qoif` magic"))]
    InvalidMagic,

    #[snafu(display("header declares {value} channels, expected 3 or 4"))]
    InvalidChannels { value: u8 },

    #[snafu(display("header declares colorspace {value}, expected 0 or 1"))]
    InvalidColorspace { value: u8 },

    #[snafu(display("header declares {width}x{height}, both dimensions must be nonzero"))]
    InvalidDimensions { width: u32, height: u32 },

    #[snafu(display("header declares {width}x{height}, above the maximum safe pixel count"))]
    PixelBudgetExceeded { width: u32, height: u32 },

    #[snafu(display("chunk stream ended before the last pixel"))]
    TruncatedStream,

    /// The word after the header does not name `ceil(height / 64)` blocks.
    #[cfg(feature = "parallel")]
    #[snafu(display("block table names {got} blocks, the image dimensions call for {expected}"))]
    BlockCountMismatch { expected: u32, got: u32 },

    /// A block offset points outside the chunk region or before its
    /// predecessor.
    #[cfg(feature = "parallel")]
    #[snafu(display("block {index} has an out-of-place offset"))]
    BlockOffsetOutOfRange { index: usize },

    #[cfg(feature = "parallel")]
    #[snafu(display("block {index} failed to decode"))]
    Segment {
        index: usize,
        #[snafu(source(from(DecodeError, Box::new)))]
        source: Box<DecodeError>,
    },

    /// The worker pool for a parallel decode could not be built.
    #[cfg(feature = "parallel")]
    #[snafu(display("failed to build the worker pool"))]
    ThreadPool { source: rayon::ThreadPoolBuildError },
}

/// Decoder half of the pixel predictor.
///
/// Mirrors [`QoiEncodeContext`](crate::encode::QoiEncodeContext): after both
/// sides have processed the same pixel range, `prev`/`px` and the two color
/// index arrays are equal. A pending run may survive across calls.
#[derive(Debug, Clone)]
pub struct QoiDecodeContext {
    pub px: Pixel,
    pub run: u8,
    pub arr: [Pixel; 64],
}

impl QoiDecodeContext {
    pub const fn new() -> Self {
        Self {
            px: Pixel::opaque(),
            run: 0,
            arr: [Pixel::zero(); 64],
        }
    }
}

impl Default for QoiDecodeContext {
    fn default() -> Self {
        Self::new()
    }
}

impl QoiDecodeContext {
    /// Decodes chunks from `data` until `out` is full, writing `channels`
    /// bytes per pixel. The stream's own channel count is irrelevant here;
    /// the state machine always tracks full RGBA pixels.
    ///
    /// The color index array is updated exactly where the encoder updates
    /// its own (literal and difference chunks), so the two stay in lockstep.
    /// Returns the number of input bytes consumed.
    pub fn decode_pixels(
        &mut self,
        data: &[u8],
        out: &mut [u8],
        channels: Channels,
    ) -> Result<usize, DecodeError> {
        let step = channels.bytes();
        let mut pos = 0usize;

        macro_rules! next {
            () => {{
                let Some(&b) = data.get(pos) else {
                    return Err(DecodeError::TruncatedStream);
                };
                pos += 1;
                b
            }};
        }

        for slot in out.chunks_exact_mut(step) {
            if self.run > 0 {
                self.run -= 1;
            } else {
                let b1 = next!();

                if unlikely(b1 == QOI_OP_RGB) {
                    self.px = Pixel([next!(), next!(), next!(), self.px.a()]);
                    self.arr[usize::from(self.px.hash())] = self.px;
                } else if unlikely(b1 == QOI_OP_RGBA) {
                    self.px = Pixel([next!(), next!(), next!(), next!()]);
                    self.arr[usize::from(self.px.hash())] = self.px;
                } else {
                    match b1 & QOI_MASK_2 {
                        QOI_OP_INDEX => {
                            self.px = self.arr[usize::from(b1)];
                        }
                        QOI_OP_DIFF => {
                            let dr = ((b1 >> 4) & 0x03).wrapping_sub(2);
                            let dg = ((b1 >> 2) & 0x03).wrapping_sub(2);
                            let db = (b1 & 0x03).wrapping_sub(2);
                            self.px = self.px.add_rgb(dr, dg, db);
                            self.arr[usize::from(self.px.hash())] = self.px;
                        }
                        QOI_OP_LUMA => {
                            let b2 = next!();
                            let dg = (b1 & 0x3f).wrapping_sub(32);
                            let dr = ((b2 >> 4) & 0x0f).wrapping_sub(8).wrapping_add(dg);
                            let db = (b2 & 0x0f).wrapping_sub(8).wrapping_add(dg);
                            self.px = self.px.add_rgb(dr, dg, db);
                            self.arr[usize::from(self.px.hash())] = self.px;
                        }
                        _ => {
                            // QOI_OP_RUN; the two 8-bit tags were ruled out
                            // above, so the biased length is at most 61.
                            self.run = b1 & 0x3f;
                        }
                    }
                }
            }

            slot.copy_from_slice(&self.px.0[..step]);
        }

        Ok(pos)
    }
}

/// Parses and validates the canonical 14-byte header.
///
/// Also checks that the stream is at least large enough for the header and
/// the end marker, so callers may slice those off unchecked.
pub fn decode_header(data: &[u8]) -> Result<QoiDescriptor, DecodeError> {
    ensure!(
        data.len() >= QOI_HEADER_SIZE + QOI_PADDING.len(),
        TooSmallSnafu { size: data.len() }
    );

    let mut pos = 0;
    let magic = utils::read_u32_be(data, &mut pos);
    ensure!(magic == QOI_MAGIC, InvalidMagicSnafu);

    let width = utils::read_u32_be(data, &mut pos);
    let height = utils::read_u32_be(data, &mut pos);
    let channels = Channels::try_from(data[pos])?;
    let colorspace = Colorspace::try_from(data[pos + 1])?;

    ensure!(
        width != 0 && height != 0,
        InvalidDimensionsSnafu { width, height }
    );
    ensure!(
        (height as usize) < QOI_PIXELS_MAX / width as usize,
        PixelBudgetExceededSnafu { width, height }
    );

    Ok(QoiDescriptor {
        width,
        height,
        channels,
        colorspace,
    })
}

/// Decodes a canonical QOI stream into a freshly allocated pixel buffer.
///
/// `channels` selects the layout of the output buffer; `None` keeps the
/// stream's own channel count. Converting 4 to 3 drops the alpha byte of
/// every pixel, 3 to 4 fills in 255.
#[cfg(feature = "alloc")]
pub fn decode_to_vec(
    data: &[u8],
    channels: Option<Channels>,
) -> Result<(QoiDescriptor, Vec<u8>), DecodeError> {
    let desc = decode_header(data)?;
    let dst = channels.unwrap_or(desc.channels);

    let chunks = &data[QOI_HEADER_SIZE..data.len() - QOI_PADDING.len()];
    let mut out = vec![0; desc.pixel_count() * dst.bytes()];

    let mut state = QoiDecodeContext::new();
    state.decode_pixels(chunks, &mut out, dst)?;

    Ok((desc, out))
}
