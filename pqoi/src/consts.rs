//! Wire-level constants shared by the serial and block-parallel codecs.

/// 2-bit tag `0b00xxxxxx`: 6-bit index into the color index array.
pub const QOI_OP_INDEX: u8 = 0x00;
/// 2-bit tag `0b01xxxxxx`: packed per-channel differences.
pub const QOI_OP_DIFF: u8 = 0x40;
/// 2-bit tag `0b10xxxxxx`: green-relative differences, one extra byte.
pub const QOI_OP_LUMA: u8 = 0x80;
/// 2-bit tag `0b11xxxxxx`: run of the previous pixel.
pub const QOI_OP_RUN: u8 = 0xc0;
/// 8-bit tag `0b11111110`: full RGB literal.
pub const QOI_OP_RGB: u8 = 0xfe;
/// 8-bit tag `0b11111111`: full RGBA literal.
pub const QOI_OP_RGBA: u8 = 0xff;

/// Selects the 2-bit tag. The 8-bit tags must be tested first; they occupy
/// the two top run-lengths of [`QOI_OP_RUN`].
pub const QOI_MASK_2: u8 = 0xc0;

/// `b"qoif"` as a big-endian u32.
pub const QOI_MAGIC: u32 = u32::from_be_bytes(*b"qoif");

/// Magic, width, height, channels, colorspace.
pub const QOI_HEADER_SIZE: usize = 14;

/// Every well-formed stream ends with these eight bytes.
pub const QOI_PADDING: [u8; 8] = [0, 0, 0, 0, 0, 0, 0, 1];

/// Upper bound on `width * height`. Keeps the worst-case encoded size of any
/// accepted image below 2 GiB.
pub const QOI_PIXELS_MAX: usize = 400_000_000;

/// Rows per segment in the extended block-parallel format. Encoders and
/// decoders of the extended format must agree on this value.
pub const BLOCK_HEIGHT: u32 = 64;
