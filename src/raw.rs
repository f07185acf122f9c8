// src/raw.rs
//
// As-decoded images: the pixel bytes exactly as the PNG stores them,
// tagged with color type and bit depth.

use crate::canonical::CanonicalImage;
use crate::engine::{decoder, encoder, pipeline, DecodeConfig, EncodeConfig, Source};
use crate::error::{PngError, Result};
use crate::pixel;
use std::io::{Read, Write};
use std::ops::{Index, IndexMut};
use std::path::Path;

/// Source pixel encoding family. Discriminants are the PNG IHDR codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ColorType {
    Gray = 0,
    Rgb = 2,
    Palette = 3,
    GrayAlpha = 4,
    Rgba = 6,
}

impl ColorType {
    pub const ALL: [ColorType; 5] = [
        ColorType::Gray,
        ColorType::Rgb,
        ColorType::Palette,
        ColorType::GrayAlpha,
        ColorType::Rgba,
    ];

    /// Samples per pixel. Palette images carry one index per pixel.
    pub fn component_count(self) -> usize {
        match self {
            ColorType::Gray | ColorType::Palette => 1,
            ColorType::GrayAlpha => 2,
            ColorType::Rgb => 3,
            ColorType::Rgba => 4,
        }
    }

    pub fn has_alpha(self) -> bool {
        matches!(self, ColorType::GrayAlpha | ColorType::Rgba)
    }

    pub fn is_gray(self) -> bool {
        matches!(self, ColorType::Gray | ColorType::GrayAlpha)
    }

    /// Bit depths the PNG format allows for this color type.
    pub fn supports(self, depth: BitDepth) -> bool {
        match self {
            ColorType::Gray => true,
            ColorType::Palette => depth != BitDepth::Sixteen,
            ColorType::Rgb | ColorType::GrayAlpha | ColorType::Rgba => {
                matches!(depth, BitDepth::Eight | BitDepth::Sixteen)
            }
        }
    }

    pub(crate) fn from_png(color: png::ColorType) -> Self {
        match color {
            png::ColorType::Grayscale => ColorType::Gray,
            png::ColorType::Rgb => ColorType::Rgb,
            png::ColorType::Indexed => ColorType::Palette,
            png::ColorType::GrayscaleAlpha => ColorType::GrayAlpha,
            png::ColorType::Rgba => ColorType::Rgba,
        }
    }

    pub(crate) fn to_png(self) -> png::ColorType {
        match self {
            ColorType::Gray => png::ColorType::Grayscale,
            ColorType::Rgb => png::ColorType::Rgb,
            ColorType::Palette => png::ColorType::Indexed,
            ColorType::GrayAlpha => png::ColorType::GrayscaleAlpha,
            ColorType::Rgba => png::ColorType::Rgba,
        }
    }
}

impl TryFrom<u8> for ColorType {
    type Error = PngError;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(ColorType::Gray),
            2 => Ok(ColorType::Rgb),
            3 => Ok(ColorType::Palette),
            4 => Ok(ColorType::GrayAlpha),
            6 => Ok(ColorType::Rgba),
            other => Err(PngError::invalid_argument(
                "color_type",
                other.to_string(),
                "expected 0, 2, 3, 4 or 6",
            )),
        }
    }
}

/// Bits per sample (per palette index for palette images).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum BitDepth {
    One = 1,
    Two = 2,
    Four = 4,
    Eight = 8,
    Sixteen = 16,
}

impl BitDepth {
    pub fn bits(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_png(depth: png::BitDepth) -> Self {
        match depth {
            png::BitDepth::One => BitDepth::One,
            png::BitDepth::Two => BitDepth::Two,
            png::BitDepth::Four => BitDepth::Four,
            png::BitDepth::Eight => BitDepth::Eight,
            png::BitDepth::Sixteen => BitDepth::Sixteen,
        }
    }

    pub(crate) fn to_png(self) -> png::BitDepth {
        match self {
            BitDepth::One => png::BitDepth::One,
            BitDepth::Two => png::BitDepth::Two,
            BitDepth::Four => png::BitDepth::Four,
            BitDepth::Eight => png::BitDepth::Eight,
            BitDepth::Sixteen => png::BitDepth::Sixteen,
        }
    }
}

impl TryFrom<u8> for BitDepth {
    type Error = PngError;

    fn try_from(bits: u8) -> Result<Self> {
        match bits {
            1 => Ok(BitDepth::One),
            2 => Ok(BitDepth::Two),
            4 => Ok(BitDepth::Four),
            8 => Ok(BitDepth::Eight),
            16 => Ok(BitDepth::Sixteen),
            other => Err(PngError::invalid_argument(
                "bit_depth",
                other.to_string(),
                "expected 1, 2, 4, 8 or 16",
            )),
        }
    }
}

/// Image header as read from (or written to) IHDR.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub width: u32,
    pub height: u32,
    pub color_type: ColorType,
    pub bit_depth: BitDepth,
}

impl Header {
    pub fn new(width: u32, height: u32, color_type: ColorType, bit_depth: BitDepth) -> Self {
        Self {
            width,
            height,
            color_type,
            bit_depth,
        }
    }

    /// Bytes per scanline. Sub-byte rows are padded to a whole byte.
    ///
    /// This rounds `width * components * bits / 8` up rather than truncating
    /// it, matching the scanline length PNG stores. A 3-pixel 1-bit gray row
    /// therefore needs one byte, not zero, and `RawImage::new` rejects an
    /// empty buffer for it.
    pub fn row_byte_count(&self) -> usize {
        let bits = self.width as u64
            * self.color_type.component_count() as u64
            * self.bit_depth.bits() as u64;
        bits.div_ceil(8) as usize
    }

    /// Total pixel buffer length implied by the header.
    pub fn data_len(&self) -> usize {
        self.row_byte_count() * self.height as usize
    }

    pub fn ensure_supported(&self) -> Result<()> {
        if self.color_type.supports(self.bit_depth) {
            Ok(())
        } else {
            Err(PngError::unsupported_layout(
                self.color_type,
                self.bit_depth.bits(),
            ))
        }
    }
}

/// The tRNS side channel.
///
/// Gray and RGB keys are stored at the image's own bit depth; a pixel whose
/// raw samples equal the key is fully transparent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transparency {
    /// Alpha per palette entry. Entries past the end are opaque.
    Palette(Vec<u8>),
    Gray(u16),
    Rgb([u16; 3]),
}

impl Transparency {
    /// Parse tRNS payload bytes for the given color type.
    ///
    /// Accepts both the on-disk form (two bytes per key sample) and the
    /// single-byte-per-sample form some decoders hand back for depths below 16.
    /// Returns `None` for color types that cannot carry tRNS or for
    /// payloads too short to hold a key.
    pub fn from_chunk(color_type: ColorType, data: &[u8]) -> Option<Self> {
        match color_type {
            ColorType::Palette => Some(Transparency::Palette(data.to_vec())),
            ColorType::Gray => match data.len() {
                0 => None,
                1 => Some(Transparency::Gray(data[0] as u16)),
                _ => Some(Transparency::Gray(u16::from_be_bytes([data[0], data[1]]))),
            },
            ColorType::Rgb => {
                if data.len() >= 6 {
                    Some(Transparency::Rgb([
                        u16::from_be_bytes([data[0], data[1]]),
                        u16::from_be_bytes([data[2], data[3]]),
                        u16::from_be_bytes([data[4], data[5]]),
                    ]))
                } else if data.len() == 3 {
                    Some(Transparency::Rgb([
                        data[0] as u16,
                        data[1] as u16,
                        data[2] as u16,
                    ]))
                } else {
                    None
                }
            }
            ColorType::GrayAlpha | ColorType::Rgba => None,
        }
    }

    /// Serialize into the on-disk tRNS payload.
    pub fn to_chunk(&self) -> Vec<u8> {
        match self {
            Transparency::Palette(alpha) => alpha.clone(),
            Transparency::Gray(key) => key.to_be_bytes().to_vec(),
            Transparency::Rgb(key) => key.iter().flat_map(|s| s.to_be_bytes()).collect(),
        }
    }

    /// Whether this kind of tRNS is meaningful for `color_type`.
    pub fn applies_to(&self, color_type: ColorType) -> bool {
        matches!(
            (self, color_type),
            (Transparency::Palette(_), ColorType::Palette)
                | (Transparency::Gray(_), ColorType::Gray)
                | (Transparency::Rgb(_), ColorType::Rgb)
        )
    }
}

/// Image in its source encoding.
///
/// Invariant: `pixel_data.len() == height * row_byte_count()`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawImage {
    header: Header,
    pixel_data: Vec<u8>,
    palette: Option<Vec<[u8; 3]>>,
    transparency: Option<Transparency>,
}

impl RawImage {
    /// Validating constructor. Fails with `SizeMismatch` when the buffer
    /// length disagrees with the declared geometry; nothing is truncated.
    pub fn new(
        width: u32,
        height: u32,
        color_type: ColorType,
        bit_depth: BitDepth,
        pixel_data: Vec<u8>,
    ) -> Result<Self> {
        Self::from_header(Header::new(width, height, color_type, bit_depth), pixel_data)
    }

    pub fn from_header(header: Header, pixel_data: Vec<u8>) -> Result<Self> {
        let expected = header.data_len();
        if pixel_data.len() != expected {
            return Err(PngError::size_mismatch(expected, pixel_data.len()));
        }
        Ok(Self {
            header,
            pixel_data,
            palette: None,
            transparency: None,
        })
    }

    /// 8-bit image from samples in [0.0, 1.0], one per component.
    pub fn from_samples(
        width: u32,
        height: u32,
        color_type: ColorType,
        samples: &[f32],
    ) -> Result<Self> {
        let bytes = samples
            .iter()
            .map(|&s| pixel::from_normalized(s as f64))
            .collect();
        Self::new(width, height, color_type, BitDepth::Eight, bytes)
    }

    pub fn with_palette(mut self, palette: Vec<[u8; 3]>) -> Self {
        self.palette = Some(palette);
        self
    }

    pub fn with_transparency(mut self, transparency: Transparency) -> Self {
        self.transparency = Some(transparency);
        self
    }

    pub(crate) fn from_parts(
        header: Header,
        pixel_data: Vec<u8>,
        palette: Option<Vec<[u8; 3]>>,
        transparency: Option<Transparency>,
    ) -> Result<Self> {
        let mut image = Self::from_header(header, pixel_data)?;
        image.palette = palette;
        image.transparency = transparency;
        Ok(image)
    }

    pub fn header(&self) -> Header {
        self.header
    }

    pub fn width(&self) -> u32 {
        self.header.width
    }

    pub fn height(&self) -> u32 {
        self.header.height
    }

    pub fn color_type(&self) -> ColorType {
        self.header.color_type
    }

    pub fn bit_depth(&self) -> BitDepth {
        self.header.bit_depth
    }

    pub fn row_byte_count(&self) -> usize {
        self.header.row_byte_count()
    }

    pub fn palette(&self) -> Option<&[[u8; 3]]> {
        self.palette.as_deref()
    }

    pub fn transparency(&self) -> Option<&Transparency> {
        self.transparency.as_ref()
    }

    pub fn pixel_data(&self) -> &[u8] {
        &self.pixel_data
    }

    /// Mutable access to the bytes. The length is fixed, so the size
    /// invariant cannot be broken through this slice.
    pub fn pixel_data_mut(&mut self) -> &mut [u8] {
        &mut self.pixel_data
    }

    pub fn into_pixel_data(self) -> Vec<u8> {
        self.pixel_data
    }

    pub fn row(&self, y: usize) -> &[u8] {
        let stride = self.row_byte_count();
        &self.pixel_data[y * stride..(y + 1) * stride]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        let stride = self.row_byte_count();
        &mut self.pixel_data[y * stride..(y + 1) * stride]
    }

    /// Run the normalization pipeline over this image.
    pub fn to_canonical(&self) -> Result<CanonicalImage> {
        pipeline::normalize_image(self)
    }

    // -- decode ---------------------------------------------------------------

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_path_with_config(path, &DecodeConfig::default())
    }

    pub fn from_path_with_config(path: impl AsRef<Path>, config: &DecodeConfig) -> Result<Self> {
        decoder::decode_raw(Source::Path(path.as_ref()), config)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_bytes_with_config(bytes, &DecodeConfig::default())
    }

    pub fn from_bytes_with_config(bytes: &[u8], config: &DecodeConfig) -> Result<Self> {
        decoder::decode_raw(Source::Memory(bytes), config)
    }

    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        decoder::decode_raw_from_reader(&mut reader, "<stream>", &DecodeConfig::default())
    }

    /// Decode from a `file://`, `http://` or `https://` URL.
    pub fn from_url(url: &str) -> Result<Self> {
        Self::from_url_with_config(url, &DecodeConfig::default())
    }

    pub fn from_url_with_config(url: &str, config: &DecodeConfig) -> Result<Self> {
        decoder::decode_raw(Source::Url(url), config)
    }

    // -- encode ---------------------------------------------------------------

    pub fn write_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        self.write_to_path_with_config(path, &EncodeConfig::default())
    }

    pub fn write_to_path_with_config(
        &self,
        path: impl AsRef<Path>,
        config: &EncodeConfig,
    ) -> Result<()> {
        encoder::encode_raw_to_path(self, path.as_ref(), config)
    }

    /// Encode to a `file://` URL. Remote URLs cannot be written.
    pub fn write_to_url(&self, url: &str) -> Result<()> {
        self.write_to_url_with_config(url, &EncodeConfig::default())
    }

    pub fn write_to_url_with_config(&self, url: &str, config: &EncodeConfig) -> Result<()> {
        encoder::encode_raw_to_url(self, url, config)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.to_bytes_with_config(&EncodeConfig::default())
    }

    pub fn to_bytes_with_config(&self, config: &EncodeConfig) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.pixel_data.len());
        encoder::encode_raw(self, &mut out, "<memory>", config)?;
        Ok(out)
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        encoder::encode_raw(self, &mut writer, "<stream>", &EncodeConfig::default())
    }
}

/// Byte at column `x` (a byte offset within the row) of row `y`.
impl Index<(usize, usize)> for RawImage {
    type Output = u8;

    fn index(&self, (x, y): (usize, usize)) -> &u8 {
        &self.pixel_data[y * self.row_byte_count() + x]
    }
}

impl IndexMut<(usize, usize)> for RawImage {
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut u8 {
        let stride = self.row_byte_count();
        &mut self.pixel_data[y * stride + x]
    }
}

impl From<CanonicalImage> for RawImage {
    fn from(image: CanonicalImage) -> Self {
        let header = Header::new(
            image.width(),
            image.height(),
            ColorType::Rgba,
            BitDepth::Eight,
        );
        RawImage {
            header,
            pixel_data: image.to_rgba_bytes(),
            palette: None,
            transparency: None,
        }
    }
}
