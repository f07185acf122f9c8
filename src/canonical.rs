// src/canonical.rs
//
// Canonical images: every pixel is 8-bit RGBA regardless of how the
// source PNG encoded it.

use crate::engine::{decoder, encoder, DecodeConfig, EncodeConfig, Source};
use crate::error::{PngError, Result};
use crate::pixel::Rgba;
use image::RgbaImage;
use std::io::{Read, Write};
use std::ops::{Index, IndexMut};
use std::path::Path;

/// Row-major RGBA image. Width and height are fixed at construction; pixels
/// may be modified in place.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CanonicalImage {
    width: u32,
    height: u32,
    pixels: Vec<Rgba>,
}

impl CanonicalImage {
    /// Fails with `SizeMismatch` unless `pixels.len() == width * height`.
    pub fn new(width: u32, height: u32, pixels: Vec<Rgba>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(PngError::size_mismatch(expected, pixels.len()));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn filled(width: u32, height: u32, color: Rgba) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; width as usize * height as usize],
        }
    }

    /// Build from interleaved RGBA bytes (4 per pixel).
    pub fn from_rgba_bytes(width: u32, height: u32, bytes: &[u8]) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if bytes.len() != expected {
            return Err(PngError::size_mismatch(expected, bytes.len()));
        }
        let pixels = bytes
            .chunks_exact(4)
            .map(|px| Rgba::new(px[0], px[1], px[2], px[3]))
            .collect();
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn to_rgba_bytes(&self) -> Vec<u8> {
        self.pixels.iter().flat_map(|px| px.to_bytes()).collect()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[Rgba] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [Rgba] {
        &mut self.pixels
    }

    pub fn into_pixels(self) -> Vec<Rgba> {
        self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgba {
        self.pixels[self.offset(x, y)]
    }

    pub fn pixel_mut(&mut self, x: u32, y: u32) -> &mut Rgba {
        let offset = self.offset(x, y);
        &mut self.pixels[offset]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: Rgba) {
        let offset = self.offset(x, y);
        self.pixels[offset] = color;
    }

    pub fn row(&self, y: u32) -> &[Rgba] {
        let start = self.offset(0, y);
        &self.pixels[start..start + self.width as usize]
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    // -- decode ---------------------------------------------------------------

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_path_with_config(path, &DecodeConfig::default())
    }

    pub fn from_path_with_config(path: impl AsRef<Path>, config: &DecodeConfig) -> Result<Self> {
        decoder::decode_canonical(Source::Path(path.as_ref()), config)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_bytes_with_config(bytes, &DecodeConfig::default())
    }

    pub fn from_bytes_with_config(bytes: &[u8], config: &DecodeConfig) -> Result<Self> {
        decoder::decode_canonical(Source::Memory(bytes), config)
    }

    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        decoder::decode_canonical_from_reader(&mut reader, "<stream>", &DecodeConfig::default())
    }

    /// Decode from a `file://`, `http://` or `https://` URL.
    pub fn from_url(url: &str) -> Result<Self> {
        Self::from_url_with_config(url, &DecodeConfig::default())
    }

    pub fn from_url_with_config(url: &str, config: &DecodeConfig) -> Result<Self> {
        decoder::decode_canonical(Source::Url(url), config)
    }

    // -- encode ---------------------------------------------------------------

    /// Always written as 8-bit RGBA.
    pub fn write_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        self.write_to_path_with_config(path, &EncodeConfig::default())
    }

    pub fn write_to_path_with_config(
        &self,
        path: impl AsRef<Path>,
        config: &EncodeConfig,
    ) -> Result<()> {
        encoder::encode_canonical_to_path(self, path.as_ref(), config)
    }

    /// Encode to a `file://` URL. Remote URLs cannot be written.
    pub fn write_to_url(&self, url: &str) -> Result<()> {
        self.write_to_url_with_config(url, &EncodeConfig::default())
    }

    pub fn write_to_url_with_config(&self, url: &str, config: &EncodeConfig) -> Result<()> {
        encoder::encode_canonical_to_url(self, url, config)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.to_bytes_with_config(&EncodeConfig::default())
    }

    pub fn to_bytes_with_config(&self, config: &EncodeConfig) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.pixels.len() * 4);
        encoder::encode_canonical(self, &mut out, "<memory>", config)?;
        Ok(out)
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        encoder::encode_canonical(self, &mut writer, "<stream>", &EncodeConfig::default())
    }
}

impl Index<(u32, u32)> for CanonicalImage {
    type Output = Rgba;

    fn index(&self, (x, y): (u32, u32)) -> &Rgba {
        &self.pixels[self.offset(x, y)]
    }
}

impl IndexMut<(u32, u32)> for CanonicalImage {
    fn index_mut(&mut self, (x, y): (u32, u32)) -> &mut Rgba {
        let offset = self.offset(x, y);
        &mut self.pixels[offset]
    }
}

impl From<RgbaImage> for CanonicalImage {
    fn from(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        let pixels = image.pixels().map(|p| Rgba::from_bytes(p.0)).collect();
        Self {
            width,
            height,
            pixels,
        }
    }
}

impl From<CanonicalImage> for RgbaImage {
    fn from(canonical: CanonicalImage) -> Self {
        let (width, height) = (canonical.width, canonical.height);
        RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba(canonical.pixel(x, y).to_bytes())
        })
    }
}
