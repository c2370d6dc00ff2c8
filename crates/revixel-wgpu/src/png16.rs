//! Lossless 16-bit PNG export
//!
//! Converts the pipeline's rgba16float readback into a canonical
//! 16-bit-per-channel RGBA PNG. Everything below the container surface is
//! computed here: half-float decoding, quantization, CRC-32 and Adler-32
//! checksums, and the zlib framing. The zlib stream uses stored (type 0)
//! blocks only, trading file size for a byte-deterministic artifact; a real
//! deflate implementation could replace [`deflate_stored`] without touching
//! the chunk layout.

use bytes::{BufMut, Bytes, BytesMut};

/// The fixed 8-byte PNG signature
const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a];

/// Largest payload a single stored zlib block can carry
const MAX_STORED_BLOCK: usize = 65535;

/// Adler-32 modulus
const ADLER_MOD: u32 = 65521;

/// Largest byte count whose sums fit in u32 before a modulo is required
const ADLER_BATCH: usize = 5552;

/// CRC-32 lookup table for the reflected polynomial 0xEDB88320
const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut value = i as u32;
        let mut bit = 0;
        while bit < 8 {
            value = if value & 1 != 0 { 0xEDB8_8320 ^ (value >> 1) } else { value >> 1 };
            bit += 1;
        }
        table[i] = value;
        i += 1;
    }
    table
};

/// Errors rejected before any encoding work begins
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PngEncodeError {
    /// Width or height is zero
    #[error("invalid PNG dimensions {width}x{height}")]
    InvalidDimensions {
        /// Offending width
        width: u32,
        /// Offending height
        height: u32,
    },
    /// The sample buffer does not hold exactly width*height*4 values
    #[error("invalid RGBA16 buffer length: got {actual}, expected {expected}")]
    BufferLengthMismatch {
        /// Required sample count
        expected: usize,
        /// Provided sample count
        actual: usize,
    },
}

/// An image of interleaved RGBA half-float bit patterns, row-major
#[derive(Debug, Clone)]
pub struct Rgba16Image {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// `width * height * 4` half-precision bit patterns in R,G,B,A order
    pub samples: Vec<u16>,
}

impl Rgba16Image {
    /// Wraps a readback buffer, validating dimensions and length
    pub fn new(width: u32, height: u32, samples: Vec<u16>) -> Result<Self, PngEncodeError> {
        validate(width, height, samples.len())?;
        Ok(Self { width, height, samples })
    }
}

fn validate(width: u32, height: u32, sample_count: usize) -> Result<(), PngEncodeError> {
    if width == 0 || height == 0 {
        return Err(PngEncodeError::InvalidDimensions { width, height });
    }
    let expected = width as usize * height as usize * 4;
    if sample_count != expected {
        return Err(PngEncodeError::BufferLengthMismatch {
            expected,
            actual: sample_count,
        });
    }
    Ok(())
}

/// Decodes a half-precision bit pattern to f32
///
/// Explicit sign/exponent/mantissa decomposition: exponent 0 covers zeros and
/// subnormals (scaled by 2^-14 without the implicit leading bit), exponent
/// 0x1F covers infinities and NaNs, everything else is a normal value with
/// bias 15. All scaling is by powers of two, so the conversion is exact.
pub fn f16_bits_to_f32(bits: u16) -> f32 {
    let sign = if bits & 0x8000 != 0 { -1.0f32 } else { 1.0f32 };
    let exponent = ((bits >> 10) & 0x1f) as i32;
    let mantissa = (bits & 0x03ff) as f32;

    if exponent == 0 {
        return sign * mantissa * (1.0 / 1024.0) * 2f32.powi(-14);
    }

    if exponent == 0x1f {
        return if mantissa == 0.0 { sign * f32::INFINITY } else { f32::NAN };
    }

    sign * (1.0 + mantissa * (1.0 / 1024.0)) * 2f32.powi(exponent - 15)
}

/// Requantizes a decoded channel value to an unsigned 16-bit sample
///
/// NaN and everything at or below zero map to 0; everything at or above one
/// (including +inf) maps to 65535; in between, scale and round to nearest.
pub fn quantize_channel(value: f32) -> u16 {
    if value.is_nan() || value <= 0.0 {
        return 0;
    }
    if value >= 1.0 || !value.is_finite() {
        return 65535;
    }
    (value * 65535.0).round() as u16
}

/// Computes the CRC-32 of a byte sequence
///
/// Standard table-driven byte-at-a-time update over the reflected polynomial,
/// initial state all-ones, final value XORed with all-ones.
pub fn crc32(bytes: &[u8]) -> u32 {
    let mut value = 0xffff_ffffu32;
    for &byte in bytes {
        value = CRC32_TABLE[((value ^ byte as u32) & 0xff) as usize] ^ (value >> 8);
    }
    value ^ 0xffff_ffff
}

/// Computes the Adler-32 checksum of a byte sequence
///
/// Rolling sums modulo 65521; the modulo is deferred across batches of 5552
/// bytes, the largest count that cannot overflow the 32-bit accumulators.
pub fn adler32(bytes: &[u8]) -> u32 {
    let mut a = 1u32;
    let mut b = 0u32;

    for batch in bytes.chunks(ADLER_BATCH) {
        for &byte in batch {
            a += byte as u32;
            b += a;
        }
        a %= ADLER_MOD;
        b %= ADLER_MOD;
    }

    (b << 16) | a
}

/// Frames a payload as a zlib stream of stored (uncompressed) blocks
///
/// 2-byte zlib header, then stored blocks of at most 65535 bytes (1-byte
/// final flag, little-endian length, little-endian ones-complement length),
/// then the big-endian Adler-32 of the uncompressed payload. An empty
/// payload still emits one final empty block so the stream stays decodable.
fn deflate_stored(payload: &[u8]) -> BytesMut {
    let block_count = payload.len().div_ceil(MAX_STORED_BLOCK).max(1);
    let mut out = BytesMut::with_capacity(2 + block_count * 5 + payload.len() + 4);

    // CMF/FLG: 32K window, no preset dictionary, check bits valid.
    out.put_u8(0x78);
    out.put_u8(0x01);

    if payload.is_empty() {
        out.put_u8(0x01);
        out.put_u16_le(0);
        out.put_u16_le(0xffff);
    } else {
        for (index, block) in payload.chunks(MAX_STORED_BLOCK).enumerate() {
            let is_final = (index + 1) * MAX_STORED_BLOCK >= payload.len();
            out.put_u8(u8::from(is_final));
            out.put_u16_le(block.len() as u16);
            out.put_u16_le(!(block.len() as u16));
            out.put_slice(block);
        }
    }

    out.put_u32(adler32(payload));
    out
}

/// Appends one chunk: big-endian length, type tag, payload, CRC over tag+payload
fn put_chunk(out: &mut BytesMut, tag: &[u8; 4], payload: &[u8]) {
    out.put_u32(payload.len() as u32);
    let crc_from = out.len();
    out.put_slice(tag);
    out.put_slice(payload);
    let crc = crc32(&out[crc_from..]);
    out.put_u32(crc);
}

/// Encodes an rgba16float image as a 16-bit RGBA PNG byte stream
///
/// Deterministic and side-effect free: the same samples always produce the
/// same bytes. Dimension and buffer-length violations are rejected before
/// any byte is written.
pub fn encode(image: &Rgba16Image) -> Result<Bytes, PngEncodeError> {
    validate(image.width, image.height, image.samples.len())?;

    let width = image.width as usize;
    let height = image.height as usize;

    // Each scanline is a filter-type byte (0, no filtering) followed by
    // big-endian 16-bit samples in R,G,B,A order.
    let stride = 1 + width * 8;
    let mut raw = BytesMut::with_capacity(stride * height);
    for row in image.samples.chunks_exact(width * 4) {
        raw.put_u8(0);
        for &bits in row {
            raw.put_u16(quantize_channel(f16_bits_to_f32(bits)));
        }
    }

    let mut ihdr = BytesMut::with_capacity(13);
    ihdr.put_u32(image.width);
    ihdr.put_u32(image.height);
    ihdr.put_u8(16); // bit depth
    ihdr.put_u8(6); // color type: RGBA
    ihdr.put_u8(0); // compression method
    ihdr.put_u8(0); // filter method
    ihdr.put_u8(0); // interlace: none

    let idat = deflate_stored(&raw);

    let mut png = BytesMut::with_capacity(PNG_SIGNATURE.len() + 12 + ihdr.len() + 12 + idat.len() + 12);
    png.put_slice(&PNG_SIGNATURE);
    put_chunk(&mut png, b"IHDR", &ihdr);
    put_chunk(&mut png, b"IDAT", &idat);
    put_chunk(&mut png, b"IEND", &[]);

    Ok(png.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use half::f16;

    fn solid(width: u32, height: u32, bits: u16) -> Rgba16Image {
        Rgba16Image::new(width, height, vec![bits; (width * height * 4) as usize]).unwrap()
    }

    fn decode(bytes: &[u8]) -> (png::OutputInfo, Vec<u16>) {
        let decoder = png::Decoder::new(std::io::Cursor::new(bytes));
        let mut reader = decoder.read_info().unwrap();
        let mut buf = vec![0u8; reader.output_buffer_size()];
        let info = reader.next_frame(&mut buf).unwrap();
        let samples = buf[..info.buffer_size()]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        (info, samples)
    }

    #[test]
    fn crc32_reference_values() {
        assert_eq!(crc32(&[]), 0x0000_0000);
        assert_eq!(crc32(b"IEND"), 0xae42_6082);
    }

    #[test]
    fn adler32_reference_values() {
        assert_eq!(adler32(&[]), 0x0000_0001);
        assert_eq!(adler32(b"Wikipedia"), 0x11e6_0398);
    }

    #[test]
    fn adler32_batching_matches_naive() {
        // Long enough to cross several deferred-modulo batches.
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();

        let mut a = 1u64;
        let mut b = 0u64;
        for &byte in &data {
            a = (a + byte as u64) % ADLER_MOD as u64;
            b = (b + a) % ADLER_MOD as u64;
        }
        assert_eq!(adler32(&data), ((b as u32) << 16) | a as u32);
    }

    #[test]
    fn half_decode_matches_reference_over_all_bit_patterns() {
        for bits in 0..=u16::MAX {
            let ours = f16_bits_to_f32(bits);
            let reference = f16::from_bits(bits).to_f32();
            if reference.is_nan() {
                assert!(ours.is_nan(), "bits {bits:#06x}: expected NaN, got {ours}");
            } else {
                assert_eq!(ours.to_bits(), reference.to_bits(), "bits {bits:#06x}: {ours} != {reference}");
            }
        }
    }

    #[test]
    fn quantization_edges() {
        assert_eq!(quantize_channel(f32::NAN), 0);
        assert_eq!(quantize_channel(-0.5), 0);
        assert_eq!(quantize_channel(0.0), 0);
        assert_eq!(quantize_channel(1.0), 65535);
        assert_eq!(quantize_channel(2.5), 65535);
        assert_eq!(quantize_channel(f32::INFINITY), 65535);
        assert_eq!(quantize_channel(f32::NEG_INFINITY), 0);
        assert_eq!(quantize_channel(0.5), 32768);
    }

    #[test]
    fn rejects_bad_dimensions_and_lengths() {
        assert_eq!(
            Rgba16Image::new(0, 2, vec![]).unwrap_err(),
            PngEncodeError::InvalidDimensions { width: 0, height: 2 }
        );
        assert_eq!(
            Rgba16Image::new(3, 2, vec![0; 23]).unwrap_err(),
            PngEncodeError::BufferLengthMismatch { expected: 24, actual: 23 }
        );
        assert!(Rgba16Image::new(3, 2, vec![0; 24]).is_ok());
    }

    #[test]
    fn white_image_round_trips_to_full_scale() {
        // 0x3C00 is half-precision 1.0.
        let bytes = encode(&solid(2, 2, 0x3c00)).unwrap();
        let (info, samples) = decode(&bytes);

        assert_eq!(info.bit_depth, png::BitDepth::Sixteen);
        assert_eq!(info.color_type, png::ColorType::Rgba);
        assert_eq!((info.width, info.height), (2, 2));
        assert_eq!(samples, vec![65535; 16]);
    }

    #[test]
    fn zero_image_round_trips_to_zero() {
        let bytes = encode(&solid(2, 2, 0x0000)).unwrap();
        let (_, samples) = decode(&bytes);
        assert_eq!(samples, vec![0; 16]);
    }

    #[test]
    fn mixed_values_round_trip() {
        let quarters = [0.25f32, 0.5, 0.75, 1.0];
        let samples: Vec<u16> = quarters.iter().map(|&v| f16::from_f32(v).to_bits()).collect();
        let image = Rgba16Image::new(1, 1, samples).unwrap();

        let bytes = encode(&image).unwrap();
        let (_, decoded) = decode(&bytes);

        let expected: Vec<u16> = quarters.iter().map(|&v| quantize_channel(v)).collect();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn large_image_splits_stored_blocks() {
        // Raw stream (1 + 129*8) * 128 = 132224 bytes, needing three stored
        // blocks; the png crate inflates it like any other zlib stream.
        let image = solid(129, 128, 0x3800); // half-precision 0.5
        let bytes = encode(&image).unwrap();
        let (info, samples) = decode(&bytes);

        assert_eq!((info.width, info.height), (129, 128));
        assert_eq!(samples.len(), 129 * 128 * 4);
        assert!(samples.iter().all(|&s| s == 32768));
    }

    #[test]
    fn stored_stream_layout() {
        let stream = deflate_stored(&[0xaa; 70_000]);

        // zlib header
        assert_eq!(&stream[..2], &[0x78, 0x01]);
        // First block: not final, 65535 bytes
        assert_eq!(stream[2], 0x00);
        assert_eq!(u16::from_le_bytes([stream[3], stream[4]]), 65535);
        assert_eq!(u16::from_le_bytes([stream[5], stream[6]]), !65535u16);
        // Second block: final, the remaining 4465 bytes
        let second = 2 + 5 + 65535;
        assert_eq!(stream[second], 0x01);
        assert_eq!(u16::from_le_bytes([stream[second + 1], stream[second + 2]]), 4465);
        // Trailing Adler-32 over the uncompressed payload
        let tail = &stream[stream.len() - 4..];
        assert_eq!(u32::from_be_bytes([tail[0], tail[1], tail[2], tail[3]]), adler32(&[0xaa; 70_000]));
    }

    #[test]
    fn empty_payload_still_emits_a_final_block() {
        let stream = deflate_stored(&[]);
        assert_eq!(&stream[..], &[0x78, 0x01, 0x01, 0x00, 0x00, 0xff, 0xff, 0x00, 0x00, 0x00, 0x01]);
    }
}
