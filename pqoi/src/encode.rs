use crate::{
    consts::*,
    utils::{self, Pixel},
    Channels, QoiDescriptor,
};
use snafu::{ensure, Snafu};

#[cfg(feature = "alloc")]
use alloc::vec::Vec;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum EncodeError {
    #[snafu(display("image dimensions {width}x{height} must both be nonzero"))]
    InvalidDimensions { width: u32, height: u32 },

    #[snafu(display("{width}x{height} exceeds the maximum safe pixel count"))]
    PixelBudgetExceeded { width: u32, height: u32 },

    #[snafu(display(
        "pixel buffer holds {got} bytes but the descriptor calls for {expected}"
    ))]
    PixelBufferMismatch { expected: usize, got: usize },

    /// The worker pool for a parallel encode could not be built.
    #[cfg(feature = "parallel")]
    #[snafu(display("failed to build the worker pool"))]
    ThreadPool { source: rayon::ThreadPoolBuildError },
}

/// Encoder half of the pixel predictor.
///
/// The previous pixel and the color index array survive across calls to
/// [`encode_pixels`](Self::encode_pixels); open runs never do, because a run
/// may not span the boundary of an independently decodable range.
#[derive(Debug, Clone)]
pub struct QoiEncodeContext {
    pub prev: Pixel,
    pub arr: [Pixel; 64],
}

impl QoiEncodeContext {
    pub const fn new() -> Self {
        Self {
            prev: Pixel::opaque(),
            arr: [Pixel::zero(); 64],
        }
    }
}

impl Default for QoiEncodeContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "alloc")]
impl QoiEncodeContext {
    /// Encodes one contiguous pixel range into `w`.
    ///
    /// For every pixel exactly one chunk wins, in strict priority order:
    /// extend/flush a run, hit the color index, then the smallest difference
    /// encoding that fits (DIFF, LUMA, RGB) while alpha is unchanged, RGBA
    /// otherwise. A run still open at the end of the range is flushed.
    ///
    /// `pixels.len()` must be a multiple of the channel size.
    pub fn encode_pixels(&mut self, pixels: &[u8], channels: Channels, w: &mut Vec<u8>) {
        let mut run = 0u8;
        let mut chunks = pixels.chunks_exact(channels.bytes());

        while let Some(raw) = chunks.next() {
            let px = match channels {
                Channels::Rgba => Pixel::from_rgba(raw),
                Channels::Rgb => Pixel::from_rgb(raw),
            };

            if px == self.prev {
                run += 1;
                if run == 62 || chunks.len() == 0 {
                    w.push(QOI_OP_RUN | (run - 1));
                    run = 0;
                }
                continue;
            }

            if run > 0 {
                w.push(QOI_OP_RUN | (run - 1));
                run = 0;
            }

            let index = usize::from(px.hash());
            if self.arr[index] == px {
                w.push(QOI_OP_INDEX | index as u8);
                self.prev = px;
                continue;
            }
            self.arr[index] = px;

            if px.a() == self.prev.a() {
                let dr = px.r().wrapping_sub(self.prev.r()) as i8;
                let dg = px.g().wrapping_sub(self.prev.g()) as i8;
                let db = px.b().wrapping_sub(self.prev.b()) as i8;
                let dr_dg = dr.wrapping_sub(dg);
                let db_dg = db.wrapping_sub(dg);

                if matches!((dr, dg, db), (-2..=1, -2..=1, -2..=1)) {
                    w.push(
                        QOI_OP_DIFF
                            | ((dr + 2) as u8) << 4
                            | ((dg + 2) as u8) << 2
                            | (db + 2) as u8,
                    );
                } else if matches!((dr_dg, dg, db_dg), (-8..=7, -32..=31, -8..=7)) {
                    w.extend_from_slice(&[
                        QOI_OP_LUMA | (dg + 32) as u8,
                        ((dr_dg + 8) as u8) << 4 | (db_dg + 8) as u8,
                    ]);
                } else {
                    w.extend_from_slice(&[QOI_OP_RGB, px.r(), px.g(), px.b()]);
                }
            } else {
                w.extend_from_slice(&[QOI_OP_RGBA, px.r(), px.g(), px.b(), px.a()]);
            }

            self.prev = px;
        }
    }
}

#[cfg(feature = "alloc")]
pub(crate) fn write_header(w: &mut Vec<u8>, desc: &QoiDescriptor) {
    utils::write_u32_be(w, QOI_MAGIC);
    utils::write_u32_be(w, desc.width);
    utils::write_u32_be(w, desc.height);
    w.push(desc.channels as u8);
    w.push(desc.colorspace as u8);
}

#[cfg(feature = "alloc")]
pub(crate) fn check_pixel_buffer(
    pixels: &[u8],
    desc: &QoiDescriptor,
) -> Result<(), EncodeError> {
    desc.validate()?;
    ensure!(
        pixels.len() == desc.byte_len(),
        PixelBufferMismatchSnafu {
            expected: desc.byte_len(),
            got: pixels.len(),
        }
    );
    Ok(())
}

/// Encodes a raw pixel buffer into a canonical QOI stream.
///
/// The output is allocated at its worst-case size up front and shrinks to
/// the bytes actually written.
#[cfg(feature = "alloc")]
pub fn encode_to_vec(pixels: &[u8], desc: &QoiDescriptor) -> Result<Vec<u8>, EncodeError> {
    check_pixel_buffer(pixels, desc)?;

    let mut w = Vec::with_capacity(desc.encoded_size_limit());
    write_header(&mut w, desc);

    let mut state = QoiEncodeContext::new();
    state.encode_pixels(pixels, desc.channels, &mut w);

    w.extend_from_slice(&QOI_PADDING);
    Ok(w)
}
