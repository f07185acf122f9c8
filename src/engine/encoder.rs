// src/engine/encoder.rs
//
// Encode call sequences. RawImage is written in its own color type and bit
// depth; CanonicalImage is always written as 8-bit RGBA.

use crate::canonical::CanonicalImage;
use crate::engine::io;
use crate::engine::pipeline::{self, RowArena};
use crate::engine::session::{EncodeSession, ErrorSlot};
use crate::error::PngError;
use crate::raw::{BitDepth, ColorType, Header, RawImage, Transparency};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;
use tempfile::NamedTempFile;
use tracing::debug;

type EncoderResult<T> = std::result::Result<T, PngError>;

/// zlib effort for IDAT.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Compression {
    Fast,
    #[default]
    Default,
    Best,
}

impl Compression {
    pub(crate) fn to_png(self) -> png::Compression {
        match self {
            Compression::Fast => png::Compression::Fast,
            Compression::Default => png::Compression::Default,
            Compression::Best => png::Compression::Best,
        }
    }
}

impl FromStr for Compression {
    type Err = PngError;

    fn from_str(s: &str) -> Result<Self, PngError> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(Compression::Fast),
            "default" => Ok(Compression::Default),
            "best" => Ok(Compression::Best),
            _ => Err(PngError::invalid_argument(
                "compression",
                s.to_string(),
                "expected fast, default or best",
            )),
        }
    }
}

/// Options for one encode call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EncodeConfig {
    pub compression: Compression,
}

impl EncodeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }
}

struct Frame<'a> {
    header: Header,
    palette: Option<&'a [[u8; 3]]>,
    transparency: Option<&'a Transparency>,
    rows: RowArena,
}

fn write_frame<W: Write>(
    frame: Frame<'_>,
    sink: &mut W,
    origin: &str,
    config: &EncodeConfig,
) -> EncoderResult<()> {
    let slot = ErrorSlot::writing(origin);
    let mut session = EncodeSession::open(
        sink,
        &slot,
        frame.header,
        frame.palette,
        frame.transparency,
        config,
    )?;
    session.write_rows(&frame.rows)?;
    session.finish()?;
    debug!(
        target: "pngkit::encode",
        origin,
        width = frame.header.width,
        height = frame.header.height,
        compression = ?config.compression,
        "image written"
    );
    Ok(())
}

/// Encode in the image's own color type and bit depth, with its PLTE and
/// tRNS if present.
pub fn encode_raw<W: Write>(
    image: &RawImage,
    sink: &mut W,
    origin: &str,
    config: &EncodeConfig,
) -> EncoderResult<()> {
    let header = image.header();
    header.ensure_supported()?;
    if header.color_type == ColorType::Palette && image.palette().is_none() {
        return Err(PngError::write_failed(
            origin.to_string(),
            Some("palette image has no palette"),
        ));
    }
    if let Some(transparency) = image.transparency() {
        check_transparency(transparency, header.color_type, image.palette())?;
    }
    let frame = Frame {
        header,
        palette: image.palette(),
        transparency: image.transparency(),
        rows: pipeline::pack_raw_rows(image),
    };
    write_frame(frame, sink, origin, config)?;
    sink.flush()
        .map_err(|e| PngError::write_failed(origin.to_string(), Some(e.to_string())))
}

/// A tRNS chunk must match the color type, and palette alpha may not run past
/// the palette, or the stream written would not decode.
fn check_transparency(
    transparency: &Transparency,
    color_type: ColorType,
    palette: Option<&[[u8; 3]]>,
) -> EncoderResult<()> {
    if !transparency.applies_to(color_type) {
        return Err(PngError::invalid_argument(
            "transparency",
            format!("{transparency:?}"),
            format!("tRNS does not apply to {color_type:?} images"),
        ));
    }
    if let (Transparency::Palette(alpha), Some(palette)) = (transparency, palette) {
        if alpha.len() > palette.len() {
            return Err(PngError::invalid_argument(
                "transparency",
                format!("{} alpha entries", alpha.len()),
                format!("palette has only {} entries", palette.len()),
            ));
        }
    }
    Ok(())
}

/// Encode as 8-bit RGBA.
pub fn encode_canonical<W: Write>(
    image: &CanonicalImage,
    sink: &mut W,
    origin: &str,
    config: &EncodeConfig,
) -> EncoderResult<()> {
    let frame = Frame {
        header: Header::new(image.width(), image.height(), ColorType::Rgba, BitDepth::Eight),
        palette: None,
        transparency: None,
        rows: pipeline::pack_canonical_rows(image),
    };
    write_frame(frame, sink, origin, config)?;
    sink.flush()
        .map_err(|e| PngError::write_failed(origin.to_string(), Some(e.to_string())))
}

pub(crate) fn encode_raw_to_path(
    image: &RawImage,
    path: &Path,
    config: &EncodeConfig,
) -> EncoderResult<()> {
    write_atomically(path, |file, origin| encode_raw(image, file, origin, config))
}

pub(crate) fn encode_canonical_to_path(
    image: &CanonicalImage,
    path: &Path,
    config: &EncodeConfig,
) -> EncoderResult<()> {
    write_atomically(path, |file, origin| {
        encode_canonical(image, file, origin, config)
    })
}

pub(crate) fn encode_raw_to_url(
    image: &RawImage,
    url: &str,
    config: &EncodeConfig,
) -> EncoderResult<()> {
    encode_raw_to_path(image, &io::writable_path(url)?, config)
}

pub(crate) fn encode_canonical_to_url(
    image: &CanonicalImage,
    url: &str,
    config: &EncodeConfig,
) -> EncoderResult<()> {
    encode_canonical_to_path(image, &io::writable_path(url)?, config)
}

/// Write to a temp file next to `path` and rename it into place only after a
/// complete encode. A failed encode leaves no file at `path`.
fn write_atomically<F>(path: &Path, encode: F) -> EncoderResult<()>
where
    F: FnOnce(&mut BufWriter<&mut File>, &str) -> EncoderResult<()>,
{
    let origin = path.display().to_string();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    // Same directory as the target so the final rename stays on one filesystem
    let mut temp_file = NamedTempFile::new_in(dir)
        .map_err(|e| PngError::unable_to_open(origin.clone(), e.to_string()))?;

    {
        let mut writer = BufWriter::new(temp_file.as_file_mut());
        encode(&mut writer, &origin)?;
    }

    temp_file
        .as_file_mut()
        .sync_all()
        .map_err(|e| PngError::write_failed(origin.clone(), Some(e.to_string())))?;

    temp_file.persist(path).map_err(|e| {
        PngError::write_failed(
            origin.clone(),
            Some(format!("failed to persist file: {}", e.error)),
        )
    })?;
    Ok(())
}
