//! Block-parallel codec for the extended wire format.
//!
//! The image is partitioned into [`BLOCK_HEIGHT`]-row segments. Segments are
//! encoded and decoded with freshly reset predictor state, so they are
//! completely independent: the fan-out below imposes no ordering between
//! them, and the block table written after the header lets the decoder hand
//! each worker its own byte range. Concatenation order (and therefore the
//! output) is fixed by the segment index, never by scheduling.

use crate::{
    consts::*,
    decode::{self, DecodeError, QoiDecodeContext},
    encode::{self, EncodeError, QoiEncodeContext},
    utils, Channels, QoiDescriptor,
};
use rayon::prelude::*;
use snafu::{ensure, ResultExt};

/// Pixels per unit of the channel-conversion fan-out, sized to keep each
/// unit's source and destination within cache.
const CONVERT_BLOCK_PIXELS: usize = 4096;

/// Number of segments the extended format uses for an image height.
pub fn block_count(height: u32) -> u32 {
    (height + BLOCK_HEIGHT - 1) / BLOCK_HEIGHT
}

/// Runs `f` on a dedicated pool of `workers` threads, or inline on the
/// ambient rayon pool when `workers` is 0.
fn with_pool<T, F>(workers: usize, f: F) -> Result<T, rayon::ThreadPoolBuildError>
where
    T: Send,
    F: FnOnce() -> T + Send,
{
    if workers == 0 {
        Ok(f())
    } else {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;
        Ok(pool.install(f))
    }
}

fn encode_blocks(pixels: &[u8], desc: &QoiDescriptor) -> Vec<Vec<u8>> {
    let bpp = desc.channels.bytes();
    let block_bytes = BLOCK_HEIGHT as usize * desc.width as usize * bpp;

    pixels
        .par_chunks(block_bytes)
        .map(|block| {
            // Worst case: every pixel a full literal. Sized once, never grown.
            let mut w = Vec::with_capacity(block.len() / bpp * (bpp + 1));
            let mut state = QoiEncodeContext::new();
            state.encode_pixels(block, desc.channels, &mut w);
            w
        })
        .collect()
}

/// Encodes a raw pixel buffer into the extended block-parallel format.
///
/// `workers` sizes the worker pool; 0 uses the ambient one. The output bytes
/// do not depend on the worker count.
pub fn encode_to_vec(
    pixels: &[u8],
    desc: &QoiDescriptor,
    workers: usize,
) -> Result<Vec<u8>, EncodeError> {
    encode::check_pixel_buffer(pixels, desc)?;

    let blocks =
        with_pool(workers, || encode_blocks(pixels, desc)).context(encode::ThreadPoolSnafu)?;

    let body: usize = blocks.iter().map(Vec::len).sum();
    let mut w =
        Vec::with_capacity(QOI_HEADER_SIZE + 4 + 4 * blocks.len() + body + QOI_PADDING.len());

    encode::write_header(&mut w, desc);
    utils::write_u32_be(&mut w, blocks.len() as u32);
    let mut offset = 0u32;
    for block in &blocks {
        utils::write_u32_be(&mut w, offset);
        offset += block.len() as u32;
    }
    for block in &blocks {
        w.extend_from_slice(block);
    }
    w.extend_from_slice(&QOI_PADDING);

    Ok(w)
}

/// Reads and validates the block table, returning the byte range of every
/// segment relative to the returned chunk region.
fn read_block_table<'a>(
    data: &'a [u8],
    desc: &QoiDescriptor,
) -> Result<(Vec<(usize, usize)>, &'a [u8]), DecodeError> {
    let expected = block_count(desc.height);
    let table_len = 4 + 4 * expected as usize;
    ensure!(
        data.len() >= QOI_HEADER_SIZE + table_len + QOI_PADDING.len(),
        decode::TooSmallSnafu { size: data.len() }
    );

    let mut pos = QOI_HEADER_SIZE;
    let got = utils::read_u32_be(data, &mut pos);
    ensure!(
        got == expected,
        decode::BlockCountMismatchSnafu { expected, got }
    );

    let chunks = &data[QOI_HEADER_SIZE + table_len..data.len() - QOI_PADDING.len()];

    let mut ranges = Vec::with_capacity(expected as usize);
    let mut prev = 0usize;
    for index in 0..expected as usize {
        let offset = utils::read_u32_be(data, &mut pos) as usize;
        let in_order = if index == 0 { offset == 0 } else { offset >= prev };
        ensure!(
            in_order && offset <= chunks.len(),
            decode::BlockOffsetOutOfRangeSnafu { index }
        );
        if index > 0 {
            ranges.push((prev, offset));
        }
        prev = offset;
    }
    ranges.push((prev, chunks.len()));

    Ok((ranges, chunks))
}

/// Decodes an extended block-parallel stream into a freshly allocated pixel
/// buffer.
///
/// Workers decode their segments into disjoint slices of the output, so no
/// synchronization happens on the buffer itself; the join propagates the
/// first segment failure and abandons the rest. Channel conversion, when
/// requested, runs as a second fan-out over [`CONVERT_BLOCK_PIXELS`]-sized
/// units.
pub fn decode_to_vec(
    data: &[u8],
    channels: Option<Channels>,
    workers: usize,
) -> Result<(QoiDescriptor, Vec<u8>), DecodeError> {
    let desc = decode::decode_header(data)?;
    let dst = channels.unwrap_or(desc.channels);
    let (ranges, chunks) = read_block_table(data, &desc)?;

    let out = with_pool(workers, || {
        let mut native = vec![0; desc.byte_len()];
        let stride = BLOCK_HEIGHT as usize * desc.width as usize * desc.channels.bytes();

        native
            .par_chunks_mut(stride)
            .zip(ranges.par_iter())
            .enumerate()
            .try_for_each(|(index, (block_out, &(start, end)))| {
                let mut state = QoiDecodeContext::new();
                state
                    .decode_pixels(&chunks[start..end], block_out, desc.channels)
                    .map(|_| ())
                    .context(decode::SegmentSnafu { index })
            })?;

        Ok(if dst == desc.channels {
            native
        } else {
            convert_channels(&native, desc.channels, dst)
        })
    })
    .context(decode::ThreadPoolSnafu)??;

    Ok((desc, out))
}

/// Repacks a raw buffer between 3- and 4-channel layouts. Dropped alpha
/// bytes are discarded; synthesized ones are 255.
fn convert_channels(src: &[u8], from: Channels, to: Channels) -> Vec<u8> {
    let pixel_count = src.len() / from.bytes();
    let mut out = vec![0; pixel_count * to.bytes()];

    out.par_chunks_mut(CONVERT_BLOCK_PIXELS * to.bytes())
        .zip(src.par_chunks(CONVERT_BLOCK_PIXELS * from.bytes()))
        .for_each(|(dst_block, src_block)| {
            let dst_pixels = dst_block.chunks_exact_mut(to.bytes());
            let src_pixels = src_block.chunks_exact(from.bytes());
            for (d, s) in dst_pixels.zip(src_pixels) {
                d[..3].copy_from_slice(&s[..3]);
                if let Channels::Rgba = to {
                    d[3] = match from {
                        Channels::Rgba => s[3],
                        Channels::Rgb => 255,
                    };
                }
            }
        });

    out
}

/// Whether `data` looks like the extended format: the word after the
/// canonical header must spell exactly the block count the image height
/// dictates. Canonical streams put their first chunks there instead.
pub fn is_extended(data: &[u8]) -> Result<bool, DecodeError> {
    let desc = decode::decode_header(data)?;
    let table_len = 4 + 4 * block_count(desc.height) as usize;
    if data.len() < QOI_HEADER_SIZE + table_len + QOI_PADDING.len() {
        return Ok(false);
    }
    let mut pos = QOI_HEADER_SIZE;
    Ok(utils::read_u32_be(data, &mut pos) == block_count(desc.height))
}
