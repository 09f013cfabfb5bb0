use pqoi::{
    consts::{QOI_HEADER_SIZE, QOI_OP_RGB, QOI_PADDING},
    parallel, Channels, Colorspace, QoiDescriptor,
};

fn desc(width: u32, height: u32, channels: Channels) -> QoiDescriptor {
    QoiDescriptor {
        width,
        height,
        channels,
        colorspace: Colorspace::Srgb,
    }
}

/// The 256x256 RGBA test pattern `(x, y, x ^ y, 255)`.
fn xor_image() -> (Vec<u8>, QoiDescriptor) {
    let mut pixels = Vec::with_capacity(256 * 256 * 4);
    for y in 0..256u32 {
        for x in 0..256u32 {
            pixels.extend_from_slice(&[x as u8, y as u8, (x ^ y) as u8, 255]);
        }
    }
    (pixels, desc(256, 256, Channels::Rgba))
}

/// One decoded chunk of a canonical stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Index(u8),
    Diff,
    Luma,
    Run(u8),
    Rgb,
    Rgba,
}

/// Splits a chunk stream into tagged ops, 8-bit tags first.
fn scan_ops(stream: &[u8]) -> Vec<Op> {
    let mut ops = Vec::new();
    let mut i = 0;
    while i < stream.len() {
        let b = stream[i];
        let (op, len) = match b {
            0xfe => (Op::Rgb, 4),
            0xff => (Op::Rgba, 5),
            _ => match b & 0xc0 {
                0x00 => (Op::Index(b & 0x3f), 1),
                0x40 => (Op::Diff, 1),
                0x80 => (Op::Luma, 2),
                _ => (Op::Run((b & 0x3f) + 1), 1),
            },
        };
        ops.push(op);
        i += len;
    }
    assert_eq!(i, stream.len(), "chunk stream ends mid-op");
    ops
}

fn chunk_stream(encoded: &[u8]) -> &[u8] {
    &encoded[QOI_HEADER_SIZE..encoded.len() - QOI_PADDING.len()]
}

#[test]
fn single_rgba_pixel_stream() {
    let encoded = pqoi::encode_to_vec(&[10, 20, 30, 255], &desc(1, 1, Channels::Rgba)).unwrap();

    let mut expected = Vec::new();
    expected.extend_from_slice(b"qoif");
    expected.extend_from_slice(&1u32.to_be_bytes());
    expected.extend_from_slice(&1u32.to_be_bytes());
    expected.extend_from_slice(&[4, 0]);
    // Alpha matches the implicit previous pixel, so the smallest fitting
    // chunk is a plain RGB literal.
    expected.extend_from_slice(&[QOI_OP_RGB, 10, 20, 30]);
    expected.extend_from_slice(&QOI_PADDING);

    assert_eq!(encoded, expected);
}

#[test]
fn header_fields_are_big_endian() {
    let pixels = vec![0u8; 640 * 3 * 2];
    let encoded = pqoi::encode_to_vec(&pixels, &desc(640, 2, Channels::Rgb)).unwrap();

    assert_eq!(&encoded[..4], b"qoif");
    assert_eq!(u32::from_be_bytes(encoded[4..8].try_into().unwrap()), 640);
    assert_eq!(u32::from_be_bytes(encoded[8..12].try_into().unwrap()), 2);
    assert_eq!(encoded[12], 3);
    assert_eq!(encoded[13], 0);
    assert_eq!(&encoded[encoded.len() - 8..], &QOI_PADDING);
}

#[test]
fn xor_image_roundtrips_serially() {
    let (pixels, d) = xor_image();
    let encoded = pqoi::encode_to_vec(&pixels, &d).unwrap();
    let (decoded_desc, decoded) = pqoi::decode_to_vec(&encoded, None).unwrap();

    assert_eq!(decoded_desc, d);
    assert_eq!(decoded, pixels);
}

#[test]
fn xor_image_roundtrips_in_parallel() {
    let (pixels, d) = xor_image();
    let encoded = parallel::encode_to_vec(&pixels, &d, 4).unwrap();

    assert_eq!(&encoded[..4], b"qoif");
    assert_eq!(&encoded[encoded.len() - 8..], &QOI_PADDING);
    // 256 rows in 64-row segments.
    assert_eq!(
        u32::from_be_bytes(encoded[14..18].try_into().unwrap()),
        4
    );

    for workers in [1, 2, 4] {
        let (decoded_desc, decoded) = parallel::decode_to_vec(&encoded, None, workers).unwrap();
        assert_eq!(decoded_desc, d);
        assert_eq!(decoded, pixels);
    }
}

#[test]
fn parallel_blocks_decode_like_independent_images() {
    // A 1-block-tall extended stream must byte-match the canonical encoding
    // of the same rows (modulo header and table).
    let (pixels, _) = xor_image();
    let top_rows = &pixels[..64 * 256 * 4];
    let d64 = desc(256, 64, Channels::Rgba);

    let canonical = pqoi::encode_to_vec(top_rows, &d64).unwrap();
    let extended = parallel::encode_to_vec(top_rows, &d64, 2).unwrap();

    assert_eq!(
        chunk_stream(&canonical),
        &extended[QOI_HEADER_SIZE + 8..extended.len() - QOI_PADDING.len()]
    );
}

#[test]
fn stream_grammar_invariants() {
    let (pixels, d) = xor_image();
    let encoded = pqoi::encode_to_vec(&pixels, &d).unwrap();
    let ops = scan_ops(chunk_stream(&encoded));

    let mut prev_index: Option<u8> = None;
    for op in ops {
        match op {
            Op::Run(len) => {
                assert!((1..=62).contains(&len), "run of {len}");
                prev_index = None;
            }
            Op::Index(slot) => {
                assert_ne!(prev_index, Some(slot), "consecutive index {slot}");
                prev_index = Some(slot);
            }
            _ => prev_index = None,
        }
    }
}

#[test]
fn decoded_pixel_count_is_exact() {
    let (pixels, d) = xor_image();
    let encoded = pqoi::encode_to_vec(&pixels, &d).unwrap();
    let (_, decoded) = pqoi::decode_to_vec(&encoded, Some(Channels::Rgb)).unwrap();
    assert_eq!(decoded.len(), 256 * 256 * 3);
}

#[test]
fn rgb_roundtrip_with_wraparound_pattern() {
    let mut pixels = Vec::new();
    for i in 0..1024u32 {
        pixels.extend_from_slice(&[
            (i.wrapping_mul(251) % 256) as u8,
            (i.wrapping_mul(17) % 256) as u8,
            (255 - i % 256) as u8,
        ]);
    }
    let d = desc(32, 32, Channels::Rgb);
    let encoded = pqoi::encode_to_vec(&pixels, &d).unwrap();
    let (_, decoded) = pqoi::decode_to_vec(&encoded, None).unwrap();
    assert_eq!(decoded, pixels);
}

#[test]
fn bad_magic_is_rejected_in_both_formats() {
    let (pixels, d) = xor_image();

    let mut canonical = pqoi::encode_to_vec(&pixels, &d).unwrap();
    canonical[1] = b'x';
    assert!(pqoi::decode_to_vec(&canonical, None).is_err());

    let mut extended = parallel::encode_to_vec(&pixels, &d, 2).unwrap();
    extended[1] = b'x';
    assert!(parallel::decode_to_vec(&extended, None, 2).is_err());
}

#[test]
fn auto_selection_by_size_and_header() {
    // Small image: canonical bytes.
    let small = vec![7u8; 10 * 10 * 3];
    let d_small = desc(10, 10, Channels::Rgb);
    let encoded = pqoi::encode_auto(&small, &d_small).unwrap();
    assert_eq!(encoded, pqoi::encode_to_vec(&small, &d_small).unwrap());
    let (_, decoded) = pqoi::decode_auto(&encoded, None).unwrap();
    assert_eq!(decoded, small);

    // 512 * 512 pixels crosses the threshold: extended bytes.
    let mut large = Vec::with_capacity(512 * 512 * 3);
    for i in 0..512u32 * 512 {
        large.extend_from_slice(&[(i % 256) as u8, (i / 256 % 256) as u8, 0]);
    }
    let d_large = desc(512, 512, Channels::Rgb);
    let encoded = pqoi::encode_auto(&large, &d_large).unwrap();
    assert!(parallel::is_extended(&encoded).unwrap());
    let (_, decoded) = pqoi::decode_auto(&encoded, None).unwrap();
    assert_eq!(decoded, large);
}
