// src/engine/decoder.rs
//
// Decode call sequences: open a session over the byte source, check the
// header against limits, pull the rows, then either keep the native encoding
// (RawImage) or normalize to RGBA (CanonicalImage).

use crate::canonical::CanonicalImage;
use crate::engine::common::run_with_panic_policy;
use crate::engine::io::Source;
use crate::engine::limits::DecodeConfig;
use crate::engine::pipeline::{Normalizer, RowArena};
use crate::engine::session::{DecodeSession, Diagnostics, ErrorSlot};
use crate::engine::{MAX_DIMENSION, MAX_PIXELS};
use crate::error::PngError;
use crate::raw::{Header, RawImage, Transparency};
use std::io::Read;
use tracing::debug;

// Always PngError, so limit and layout failures keep their category.
type DecoderResult<T> = std::result::Result<T, PngError>;

/// Reject geometry beyond the global ceilings, whatever the configured policy.
pub fn check_dimensions(width: u32, height: u32) -> DecoderResult<()> {
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(PngError::dimension_exceeds_limit(
            width.max(height),
            MAX_DIMENSION,
        ));
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(PngError::pixel_count_exceeds_limit(pixels, MAX_PIXELS));
    }
    Ok(())
}

struct Opened<'a, R: Read> {
    session: DecodeSession<'a, R>,
    header: Header,
    palette: Option<Vec<[u8; 3]>>,
    transparency: Option<Transparency>,
}

fn open<'a, R: Read>(
    reader: &'a mut R,
    slot: &'a ErrorSlot,
    config: &DecodeConfig,
) -> DecoderResult<Opened<'a, R>> {
    let session = DecodeSession::open(reader, slot, &config.limits)?;
    let header = session.header();
    check_dimensions(header.width, header.height)?;
    config.limits.check(&header)?;
    let (palette, transparency) = session.ancillary();
    Ok(Opened {
        session,
        header,
        palette,
        transparency,
    })
}

fn read_all<R: Read>(session: DecodeSession<'_, R>) -> DecoderResult<RowArena> {
    let mut session = session;
    let rows = session.read_rows()?;
    session.finish()?;
    Ok(rows)
}

pub(crate) fn decode_raw(source: Source<'_>, config: &DecodeConfig) -> DecoderResult<RawImage> {
    let origin = source.origin();
    let mut reader = source.open()?;
    decode_raw_from_reader(&mut reader, &origin, config)
}

/// Decode keeping the stored color type and bit depth.
pub fn decode_raw_from_reader<R: Read>(
    reader: &mut R,
    origin: &str,
    config: &DecodeConfig,
) -> DecoderResult<RawImage> {
    let slot = ErrorSlot::reading(origin);
    let opened = open(reader, &slot, config)?;
    let header = opened.header;
    debug!(
        target: "pngkit::decode",
        origin,
        width = header.width,
        height = header.height,
        color_type = ?header.color_type,
        bit_depth = header.bit_depth.bits(),
        "raw decode"
    );
    let rows = read_all(opened.session)?;
    RawImage::from_parts(
        header,
        rows.into_contiguous(),
        opened.palette,
        opened.transparency,
    )
}

pub(crate) fn decode_canonical(
    source: Source<'_>,
    config: &DecodeConfig,
) -> DecoderResult<CanonicalImage> {
    let origin = source.origin();
    let mut reader = source.open()?;
    decode_canonical_from_reader(&mut reader, &origin, config)
}

/// Decode and normalize to 8-bit RGBA.
pub fn decode_canonical_from_reader<R: Read>(
    reader: &mut R,
    origin: &str,
    config: &DecodeConfig,
) -> DecoderResult<CanonicalImage> {
    decode_canonical_with_diagnostics(reader, origin, config).map(|(image, _)| image)
}

/// Like [`decode_canonical_from_reader`], also returning the warnings the
/// decode produced.
pub fn decode_canonical_with_diagnostics<R: Read>(
    reader: &mut R,
    origin: &str,
    config: &DecodeConfig,
) -> DecoderResult<(CanonicalImage, Diagnostics)> {
    let slot = ErrorSlot::reading(origin);
    let image = {
        let opened = open(reader, &slot, config)?;
        let header = opened.header;
        let mut diagnostics = Diagnostics::default();
        // The plan is fixed from IHDR/PLTE/tRNS before any row is pulled.
        let normalizer = Normalizer::new(
            header,
            opened.palette.as_deref(),
            opened.transparency.as_ref(),
            &mut diagnostics,
        )?;
        debug!(
            target: "pngkit::decode",
            origin,
            width = header.width,
            height = header.height,
            plan = ?normalizer.plan(),
            "canonical decode"
        );
        let rows = read_all(opened.session)?;
        let pixels = run_with_panic_policy("pipeline:normalize", || {
            normalizer.normalize_rows(rows.par_rows(), &mut diagnostics)
        })?;
        slot.absorb(diagnostics);
        CanonicalImage::new(header.width, header.height, pixels)?
    };
    Ok((image, slot.into_diagnostics()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::io::live_bridges;
    use crate::pixel::Rgba;
    use crate::raw::{BitDepth, ColorType};

    fn encode(width: u32, height: u32, color: png::ColorType, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(color);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(data).unwrap();
        writer.finish().unwrap();
        out
    }

    #[test]
    fn check_dimensions_limits() {
        assert!(check_dimensions(100, 100).is_ok());
        assert!(check_dimensions(MAX_DIMENSION, 1).is_ok());
        assert!(matches!(
            check_dimensions(MAX_DIMENSION + 1, 1),
            Err(PngError::DimensionExceedsLimit { .. })
        ));
        assert!(matches!(
            check_dimensions(20_000, 20_000),
            Err(PngError::PixelCountExceedsLimit { .. })
        ));
    }

    #[test]
    fn raw_decode_keeps_native_layout() {
        let bytes = encode(2, 1, png::ColorType::Grayscale, &[10, 200]);
        let mut src: &[u8] = &bytes;
        let raw = decode_raw_from_reader(&mut src, "<memory>", &DecodeConfig::default()).unwrap();
        assert_eq!(raw.color_type(), ColorType::Gray);
        assert_eq!(raw.bit_depth(), BitDepth::Eight);
        assert_eq!(raw.pixel_data(), &[10, 200]);
    }

    #[test]
    fn canonical_decode_normalizes() {
        let bytes = encode(1, 1, png::ColorType::Rgb, &[1, 2, 3]);
        let mut src: &[u8] = &bytes;
        let (img, diagnostics) =
            decode_canonical_with_diagnostics(&mut src, "<memory>", &DecodeConfig::default())
                .unwrap();
        assert_eq!(img.pixel(0, 0), Rgba::new(1, 2, 3, 255));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn streamed_and_in_memory_normalization_agree() {
        let data = [0, 10, 50, 60, 100, 110, 200, 210];
        let bytes = encode(2, 2, png::ColorType::GrayscaleAlpha, &data);
        let mut src: &[u8] = &bytes;
        let (streamed, _) =
            decode_canonical_with_diagnostics(&mut src, "<memory>", &DecodeConfig::default())
                .unwrap();
        let mut src: &[u8] = &bytes;
        let raw = decode_raw_from_reader(&mut src, "<memory>", &DecodeConfig::default()).unwrap();
        assert_eq!(streamed, raw.to_canonical().unwrap());
        assert_eq!(streamed.pixel(1, 1), Rgba::new(200, 200, 200, 210));
    }

    #[test]
    fn limits_reject_before_rows_are_read() {
        let bytes = encode(4, 4, png::ColorType::Rgba, &[0; 64]);
        let config = DecodeConfig::new()
            .with_limits(crate::engine::Limits::custom().with_max_pixels(15));
        let mut src: &[u8] = &bytes;
        let err = decode_raw_from_reader(&mut src, "<memory>", &config).unwrap_err();
        assert_eq!(err, PngError::pixel_count_exceeds_limit(16, 15));
    }

    #[test]
    fn truncation_reports_origin_and_releases_bridge() {
        let bytes = encode(8, 8, png::ColorType::Rgba, &[7; 256]);
        let cut = &bytes[..bytes.len() / 2];
        let mut src: &[u8] = cut;
        let err = decode_canonical_from_reader(&mut src, "cut.png", &DecodeConfig::default())
            .unwrap_err();
        assert!(matches!(err, PngError::ReadFailed { .. }));
        assert_eq!(err.origin(), Some("cut.png"));
        assert_eq!(live_bridges(), 0);
    }

    #[test]
    fn empty_input_fails_on_signature() {
        let mut src: &[u8] = &[];
        let err = decode_raw_from_reader(&mut src, "<memory>", &DecodeConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("exhausted"));
    }
}
