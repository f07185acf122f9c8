// tests/common/mod.rs
//
// PNG fixtures built in-test with the png encoder, independent of pngkit's
// own encode path.

#![allow(dead_code)]

use pngkit::{BitDepth, ColorType, Header};

pub struct Fixture<'a> {
    pub width: u32,
    pub height: u32,
    pub color: png::ColorType,
    pub depth: png::BitDepth,
    pub data: &'a [u8],
    pub palette: Option<&'a [u8]>,
    pub trns: Option<&'a [u8]>,
}

impl<'a> Fixture<'a> {
    pub fn rgba8(width: u32, height: u32, data: &'a [u8]) -> Self {
        Self::new(width, height, png::ColorType::Rgba, png::BitDepth::Eight, data)
    }

    pub fn new(
        width: u32,
        height: u32,
        color: png::ColorType,
        depth: png::BitDepth,
        data: &'a [u8],
    ) -> Self {
        Self {
            width,
            height,
            color,
            depth,
            data,
            palette: None,
            trns: None,
        }
    }

    pub fn palette(mut self, palette: &'a [u8]) -> Self {
        self.palette = Some(palette);
        self
    }

    pub fn trns(mut self, trns: &'a [u8]) -> Self {
        self.trns = Some(trns);
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, self.width, self.height);
            encoder.set_color(self.color);
            encoder.set_depth(self.depth);
            if let Some(palette) = self.palette {
                encoder.set_palette(palette.to_vec());
            }
            if let Some(trns) = self.trns {
                encoder.set_trns(trns.to_vec());
            }
            let mut writer = encoder.write_header().unwrap();
            writer.write_image_data(self.data).unwrap();
            writer.finish().unwrap();
        }
        out
    }
}

/// Every (color type, bit depth) pair PNG allows.
pub fn valid_layouts() -> Vec<(ColorType, BitDepth)> {
    let depths = [
        BitDepth::One,
        BitDepth::Two,
        BitDepth::Four,
        BitDepth::Eight,
        BitDepth::Sixteen,
    ];
    ColorType::ALL
        .iter()
        .flat_map(|&ct| depths.iter().map(move |&d| (ct, d)))
        .filter(|&(ct, d)| ct.supports(d))
        .collect()
}

/// Deterministic, non-uniform pixel bytes for a header.
pub fn patterned_data(header: &Header) -> Vec<u8> {
    (0..header.data_len())
        .map(|i| (i.wrapping_mul(37) ^ (i >> 3)) as u8)
        .collect()
}

/// A palette with one distinct entry per possible index.
pub fn full_palette(depth: BitDepth) -> Vec<[u8; 3]> {
    (0..1usize << depth.bits())
        .map(|i| [i as u8, (255 - i) as u8, (i * 7) as u8])
        .collect()
}
