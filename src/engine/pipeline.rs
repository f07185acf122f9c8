// src/engine/pipeline.rs
//
// Normalization pipeline: every supported (color type, bit depth) pair is
// brought to 8-bit RGBA by an ordered, per-row sequence of transforms.
// Rows are independent, so they are normalized in parallel with rayon.

use crate::canonical::CanonicalImage;
use crate::engine::common::run_with_panic_policy;
use crate::engine::session::Diagnostics;
use crate::error::Result;
use crate::pixel::Rgba;
use crate::raw::{BitDepth, ColorType, Header, RawImage, Transparency};
use bitflags::bitflags;
use rayon::prelude::*;
use std::borrow::Cow;
use tracing::debug;

bitflags! {
    /// Decode transforms, listed in the order they run.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Transform: u8 {
        /// 16-bit samples keep their most significant byte
        const STRIP_16 = 1 << 0;
        /// Palette indices become the RGB triples they name
        const EXPAND_PALETTE = 1 << 1;
        /// 1/2/4-bit gray scaled up to 8 bits
        const EXPAND_GRAY = 1 << 2;
        /// tRNS becomes a real alpha channel
        const TRNS_TO_ALPHA = 1 << 3;
        /// Opaque alpha appended where none exists
        const FILL_ALPHA = 1 << 4;
        /// Gray replicated into R, G and B
        const GRAY_TO_RGB = 1 << 5;
    }
}

impl Transform {
    /// Transforms needed to bring `header`'s layout to canonical RGBA.
    ///
    /// Selection depends only on the header and on whether a tRNS chunk is
    /// present; selecting for an already canonical layout yields the empty set.
    pub fn select(header: &Header, transparency: Option<&Transparency>) -> Transform {
        let color_type = header.color_type;
        let mut plan = Transform::empty();
        if header.bit_depth == BitDepth::Sixteen {
            plan |= Transform::STRIP_16;
        }
        if color_type == ColorType::Palette {
            plan |= Transform::EXPAND_PALETTE;
        }
        if color_type == ColorType::Gray && header.bit_depth < BitDepth::Eight {
            plan |= Transform::EXPAND_GRAY;
        }
        if transparency.is_some() {
            plan |= Transform::TRNS_TO_ALPHA;
        }
        if matches!(
            color_type,
            ColorType::Gray | ColorType::Rgb | ColorType::Palette
        ) {
            plan |= Transform::FILL_ALPHA;
        }
        if color_type.is_gray() {
            plan |= Transform::GRAY_TO_RGB;
        }
        plan
    }
}

/// Channel layout of a row between stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct RowLayout {
    channels: usize,
    depth: u8,
    alpha: bool,
}

impl RowLayout {
    const CANONICAL: RowLayout = RowLayout {
        channels: 4,
        depth: 8,
        alpha: true,
    };

    fn of(header: &Header) -> Self {
        Self {
            channels: header.color_type.component_count(),
            depth: header.bit_depth.bits(),
            alpha: header.color_type.has_alpha(),
        }
    }
}

/// A transform plan bound to one image's header and ancillary chunks.
pub(crate) struct Normalizer<'a> {
    header: Header,
    plan: Transform,
    palette: &'a [[u8; 3]],
    transparency: Option<&'a Transparency>,
}

impl<'a> Normalizer<'a> {
    /// Fails with `UnsupportedLayout` for pairs PNG does not allow. tRNS data
    /// that cannot apply to the color type is dropped with a warning.
    pub(crate) fn new(
        header: Header,
        palette: Option<&'a [[u8; 3]]>,
        transparency: Option<&'a Transparency>,
        diagnostics: &mut Diagnostics,
    ) -> Result<Self> {
        header.ensure_supported()?;
        let color_type = header.color_type;

        let transparency = match transparency {
            Some(trns) if trns.applies_to(color_type) => Some(trns),
            Some(_) => {
                diagnostics.warn(format!(
                    "tRNS data does not apply to {color_type:?} images; ignored"
                ));
                None
            }
            None => None,
        };

        if color_type == ColorType::Palette {
            match palette {
                None => diagnostics.warn("palette image without PLTE; indices expand to black"),
                Some(entries) => {
                    if let Some(Transparency::Palette(alpha)) = transparency {
                        if alpha.len() > entries.len() {
                            diagnostics.warn(format!(
                                "tRNS has {} entries for a {}-entry palette; extras ignored",
                                alpha.len(),
                                entries.len()
                            ));
                        }
                    }
                }
            }
        }

        let plan = Transform::select(&header, transparency);
        debug!(
            target: "pngkit::pipeline",
            color_type = ?color_type,
            bit_depth = header.bit_depth.bits(),
            ?plan,
            "transform plan selected"
        );
        Ok(Self {
            header,
            plan,
            palette: palette.unwrap_or(&[]),
            transparency,
        })
    }

    pub(crate) fn plan(&self) -> Transform {
        self.plan
    }

    /// Normalize rows produced in parallel by `rows` into canonical pixels.
    pub(crate) fn normalize_rows<'r, I>(&self, rows: I, diagnostics: &mut Diagnostics) -> Vec<Rgba>
    where
        I: IndexedParallelIterator<Item = &'r [u8]>,
    {
        let width = self.header.width as usize;
        let mut pixels = vec![Rgba::default(); width * self.header.height as usize];
        if pixels.is_empty() {
            return pixels;
        }
        let misses: usize = pixels
            .par_chunks_exact_mut(width)
            .zip(rows)
            .map(|(dst, src)| self.normalize_row(src, dst))
            .sum();
        if misses > 0 {
            diagnostics.warn(format!(
                "{misses} palette indices out of range; expanded to black"
            ));
        }
        pixels
    }

    /// Run the plan over one row. Returns the number of palette indices
    /// that fell outside the palette.
    fn normalize_row(&self, raw: &[u8], out: &mut [Rgba]) -> usize {
        let width = self.header.width as usize;
        let mut layout = RowLayout::of(&self.header);
        let mut row: Cow<'_, [u8]> = Cow::Borrowed(raw);
        let mut misses = 0;

        if self.plan.contains(Transform::STRIP_16) && layout.depth == 16 {
            row = Cow::Owned(strip_16(&row));
            layout.depth = 8;
        }
        if self.plan.contains(Transform::EXPAND_PALETTE) {
            let (expanded, missed) = expand_palette(&row, layout.depth, width, self.palette);
            row = Cow::Owned(expanded);
            misses = missed;
            layout = RowLayout {
                channels: 3,
                depth: 8,
                alpha: false,
            };
        }
        if self.plan.contains(Transform::EXPAND_GRAY) && layout.depth < 8 {
            row = Cow::Owned(expand_gray(&row, layout.depth, width));
            layout.depth = 8;
        }
        if self.plan.contains(Transform::TRNS_TO_ALPHA) && !layout.alpha {
            if let Some(trns) = self.transparency {
                let depth = self.header.bit_depth.bits();
                row = Cow::Owned(trns_to_alpha(&row, layout.channels, raw, depth, trns));
                layout.channels += 1;
                layout.alpha = true;
            }
        }
        if self.plan.contains(Transform::FILL_ALPHA) && !layout.alpha {
            row = Cow::Owned(fill_alpha(&row, layout.channels));
            layout.channels += 1;
            layout.alpha = true;
        }
        if self.plan.contains(Transform::GRAY_TO_RGB) && layout.channels == 2 {
            row = Cow::Owned(gray_to_rgb(&row));
            layout.channels = 4;
        }

        debug_assert_eq!(layout, RowLayout::CANONICAL);
        for (dst, px) in out.iter_mut().zip(row.chunks_exact(4)) {
            *dst = Rgba::new(px[0], px[1], px[2], px[3]);
        }
        misses
    }
}

/// Sample `index` of a row packed at `depth` bits per sample, MSB first.
fn sample_at(row: &[u8], depth: u8, index: usize) -> u16 {
    match depth {
        16 => u16::from_be_bytes([row[2 * index], row[2 * index + 1]]),
        8 => row[index] as u16,
        _ => {
            let bits = depth as usize;
            let per_byte = 8 / bits;
            let byte = row[index / per_byte];
            let shift = 8 - bits * (index % per_byte + 1);
            ((byte >> shift) & ((1u8 << depth) - 1)) as u16
        }
    }
}

fn strip_16(row: &[u8]) -> Vec<u8> {
    row.chunks_exact(2).map(|pair| pair[0]).collect()
}

fn expand_palette(row: &[u8], depth: u8, width: usize, palette: &[[u8; 3]]) -> (Vec<u8>, usize) {
    let mut out = Vec::with_capacity(width * 3);
    let mut misses = 0;
    for x in 0..width {
        match palette.get(sample_at(row, depth, x) as usize) {
            Some(rgb) => out.extend_from_slice(rgb),
            None => {
                misses += 1;
                out.extend_from_slice(&[0, 0, 0]);
            }
        }
    }
    (out, misses)
}

fn expand_gray(row: &[u8], depth: u8, width: usize) -> Vec<u8> {
    // 1-bit: x255, 2-bit: x85, 4-bit: x17
    let scale = 255 / ((1u8 << depth) - 1);
    (0..width)
        .map(|x| sample_at(row, depth, x) as u8 * scale)
        .collect()
}

/// Append alpha computed from tRNS. Keys compare against the samples of the
/// untransformed row at the image's own depth.
fn trns_to_alpha(row: &[u8], channels: usize, raw: &[u8], depth: u8, trns: &Transparency) -> Vec<u8> {
    let mut out = Vec::with_capacity(row.len() / channels * (channels + 1));
    for (x, px) in row.chunks_exact(channels).enumerate() {
        out.extend_from_slice(px);
        let alpha = match trns {
            Transparency::Palette(alpha) => alpha
                .get(sample_at(raw, depth, x) as usize)
                .copied()
                .unwrap_or(255),
            Transparency::Gray(key) => {
                if sample_at(raw, depth, x) == *key {
                    0
                } else {
                    255
                }
            }
            Transparency::Rgb(key) => {
                if (0..3).all(|c| sample_at(raw, depth, x * 3 + c) == key[c]) {
                    0
                } else {
                    255
                }
            }
        };
        out.push(alpha);
    }
    out
}

fn fill_alpha(row: &[u8], channels: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(row.len() / channels * (channels + 1));
    for px in row.chunks_exact(channels) {
        out.extend_from_slice(px);
        out.push(0xFF);
    }
    out
}

fn gray_to_rgb(row: &[u8]) -> Vec<u8> {
    row.chunks_exact(2)
        .flat_map(|px| [px[0], px[0], px[0], px[1]])
        .collect()
}

/// Normalize an in-memory raw image.
pub(crate) fn normalize_image(image: &RawImage) -> Result<CanonicalImage> {
    let mut diagnostics = Diagnostics::default();
    let normalizer = Normalizer::new(
        image.header(),
        image.palette(),
        image.transparency(),
        &mut diagnostics,
    )?;
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return CanonicalImage::new(width, height, Vec::new());
    }
    let stride = image.row_byte_count();
    let pixels = run_with_panic_policy("pipeline:normalize", || {
        normalizer.normalize_rows(image.pixel_data().par_chunks_exact(stride), &mut diagnostics)
    })?;
    CanonicalImage::new(width, height, pixels)
}

/// Scanline storage for one codec call. Every row is its own allocation,
/// made before the engine is asked for data; the arena is dropped with the
/// call that created it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowArena {
    rows: Vec<Vec<u8>>,
}

impl RowArena {
    pub fn allocate(height: usize, stride: usize) -> Self {
        Self {
            rows: (0..height).map(|_| vec![0u8; stride]).collect(),
        }
    }

    pub fn from_rows(rows: Vec<Vec<u8>>) -> Self {
        Self { rows }
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, y: usize) -> &[u8] {
        &self.rows[y]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        &mut self.rows[y]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.rows.iter().map(Vec::as_slice)
    }

    pub fn par_rows(&self) -> impl IndexedParallelIterator<Item = &[u8]> + '_ {
        self.rows.par_iter().map(Vec::as_slice)
    }

    /// Split a contiguous, de-interlaced frame into the arena's rows.
    pub(crate) fn fill_from_frame(&mut self, frame: &[u8]) {
        let Some(stride) = self.rows.first().map(Vec::len).filter(|&s| s > 0) else {
            return;
        };
        for (row, src) in self.rows.iter_mut().zip(frame.chunks_exact(stride)) {
            row.copy_from_slice(src);
        }
    }

    pub fn into_contiguous(self) -> Vec<u8> {
        self.rows.concat()
    }
}

/// Fresh per-row copies of a raw image's bytes, ready for the encoder.
pub(crate) fn pack_raw_rows(image: &RawImage) -> RowArena {
    let stride = image.row_byte_count();
    let height = image.height() as usize;
    if stride == 0 {
        return RowArena::allocate(height, 0);
    }
    RowArena::from_rows(
        image
            .pixel_data()
            .chunks_exact(stride)
            .map(<[u8]>::to_vec)
            .collect(),
    )
}

/// Canonical pixels packed as RGBA8 rows.
pub(crate) fn pack_canonical_rows(image: &CanonicalImage) -> RowArena {
    let width = image.width() as usize;
    let height = image.height() as usize;
    if width == 0 {
        return RowArena::allocate(height, 0);
    }
    RowArena::from_rows(
        image
            .pixels()
            .chunks_exact(width)
            .map(|row| row.iter().flat_map(|px| px.to_bytes()).collect())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(raw: &RawImage) -> CanonicalImage {
        raw.to_canonical().unwrap()
    }

    #[test]
    fn canonical_layout_selects_nothing() {
        let header = Header::new(4, 4, ColorType::Rgba, BitDepth::Eight);
        assert_eq!(Transform::select(&header, None), Transform::empty());
    }

    #[test]
    fn selection_per_layout() {
        let gray1 = Header::new(1, 1, ColorType::Gray, BitDepth::One);
        assert_eq!(
            Transform::select(&gray1, None),
            Transform::EXPAND_GRAY | Transform::FILL_ALPHA | Transform::GRAY_TO_RGB
        );
        let pal = Header::new(1, 1, ColorType::Palette, BitDepth::Four);
        let trns = Transparency::Palette(vec![0]);
        assert_eq!(
            Transform::select(&pal, Some(&trns)),
            Transform::EXPAND_PALETTE | Transform::TRNS_TO_ALPHA | Transform::FILL_ALPHA
        );
        let rgba16 = Header::new(1, 1, ColorType::Rgba, BitDepth::Sixteen);
        assert_eq!(Transform::select(&rgba16, None), Transform::STRIP_16);
        let ga = Header::new(1, 1, ColorType::GrayAlpha, BitDepth::Eight);
        assert_eq!(Transform::select(&ga, None), Transform::GRAY_TO_RGB);
    }

    #[test]
    fn palette_pixel_expands_to_entry() {
        let raw = RawImage::new(1, 1, ColorType::Palette, BitDepth::Eight, vec![0])
            .unwrap()
            .with_palette(vec![[10, 20, 30]]);
        let img = normalize(&raw);
        assert_eq!(img.pixel(0, 0), Rgba::new(10, 20, 30, 255));
    }

    #[test]
    fn gray_trns_key_becomes_transparent() {
        let raw = RawImage::new(2, 1, ColorType::Gray, BitDepth::Eight, vec![0, 255])
            .unwrap()
            .with_transparency(Transparency::Gray(0));
        let img = normalize(&raw);
        assert_eq!(img.pixels(), &[Rgba::new(0, 0, 0, 0), Rgba::new(255, 255, 255, 255)]);
    }

    #[test]
    fn sub_byte_gray_scales_to_full_range() {
        // 1-bit: 1,0,1,1 ; padded
        let raw = RawImage::new(4, 1, ColorType::Gray, BitDepth::One, vec![0b1011_0000]).unwrap();
        let img = normalize(&raw);
        let values: Vec<u8> = img.pixels().iter().map(|p| p.r).collect();
        assert_eq!(values, vec![255, 0, 255, 255]);

        let raw = RawImage::new(2, 1, ColorType::Gray, BitDepth::Two, vec![0b0110_0000]).unwrap();
        let img = normalize(&raw);
        assert_eq!(img.pixel(0, 0), Rgba::new(85, 85, 85, 255));
        assert_eq!(img.pixel(1, 0), Rgba::new(170, 170, 170, 255));

        let raw = RawImage::new(1, 1, ColorType::Gray, BitDepth::Four, vec![0xF0]).unwrap();
        assert_eq!(normalize(&raw).pixel(0, 0), Rgba::WHITE);
    }

    #[test]
    fn sub_byte_gray_trns_compares_raw_sample() {
        let raw = RawImage::new(2, 1, ColorType::Gray, BitDepth::Two, vec![0b1101_0000])
            .unwrap()
            .with_transparency(Transparency::Gray(3));
        let img = normalize(&raw);
        assert_eq!(img.pixel(0, 0), Rgba::new(255, 255, 255, 0));
        assert_eq!(img.pixel(1, 0), Rgba::new(85, 85, 85, 255));
    }

    #[test]
    fn sixteen_bit_keeps_high_byte() {
        let raw = RawImage::new(
            1,
            1,
            ColorType::Rgba,
            BitDepth::Sixteen,
            vec![0x12, 0xFF, 0x34, 0x00, 0x56, 0x80, 0xAB, 0xCD],
        )
        .unwrap();
        assert_eq!(normalize(&raw).pixel(0, 0), Rgba::new(0x12, 0x34, 0x56, 0xAB));
    }

    #[test]
    fn rgb16_trns_key_uses_full_samples() {
        let data = vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x01, 0x02, 0x03, 0x04, 0x05, 0x07];
        let raw = RawImage::new(2, 1, ColorType::Rgb, BitDepth::Sixteen, data)
            .unwrap()
            .with_transparency(Transparency::Rgb([0x0102, 0x0304, 0x0506]));
        let img = normalize(&raw);
        assert_eq!(img.pixel(0, 0), Rgba::new(1, 3, 5, 0));
        assert_eq!(img.pixel(1, 0), Rgba::new(1, 3, 5, 255));
    }

    #[test]
    fn packed_palette_with_short_trns() {
        // 2-bit indices 0,1,2,3
        let raw = RawImage::new(4, 1, ColorType::Palette, BitDepth::Two, vec![0b0001_1011])
            .unwrap()
            .with_palette(vec![[1, 1, 1], [2, 2, 2], [3, 3, 3], [4, 4, 4]])
            .with_transparency(Transparency::Palette(vec![0, 128]));
        let img = normalize(&raw);
        assert_eq!(
            img.pixels(),
            &[
                Rgba::new(1, 1, 1, 0),
                Rgba::new(2, 2, 2, 128),
                Rgba::new(3, 3, 3, 255),
                Rgba::new(4, 4, 4, 255),
            ]
        );
    }

    #[test]
    fn out_of_range_index_is_black_and_warned() {
        let raw = RawImage::new(2, 1, ColorType::Palette, BitDepth::Eight, vec![0, 5])
            .unwrap()
            .with_palette(vec![[9, 9, 9]]);
        let mut diagnostics = Diagnostics::default();
        let normalizer =
            Normalizer::new(raw.header(), raw.palette(), None, &mut diagnostics).unwrap();
        let pixels = normalizer.normalize_rows(raw.pixel_data().par_chunks_exact(2), &mut diagnostics);
        assert_eq!(pixels[1], Rgba::BLACK);
        assert_eq!(diagnostics.warnings().len(), 1);
    }

    #[test]
    fn foreign_trns_is_ignored_with_warning() {
        let raw = RawImage::new(1, 1, ColorType::Rgba, BitDepth::Eight, vec![1, 2, 3, 4]).unwrap();
        let trns = Transparency::Gray(1);
        let mut diagnostics = Diagnostics::default();
        let normalizer =
            Normalizer::new(raw.header(), None, Some(&trns), &mut diagnostics).unwrap();
        assert_eq!(normalizer.plan(), Transform::empty());
        assert!(!diagnostics.is_empty());
    }

    #[test]
    fn gray_alpha_replicates() {
        let raw = RawImage::new(1, 1, ColorType::GrayAlpha, BitDepth::Eight, vec![40, 7]).unwrap();
        assert_eq!(normalize(&raw).pixel(0, 0), Rgba::new(40, 40, 40, 7));
    }

    #[test]
    fn unsupported_pair_is_rejected() {
        let raw = RawImage::new(1, 1, ColorType::Rgb, BitDepth::Four, vec![0, 0]).unwrap();
        assert!(matches!(
            raw.to_canonical(),
            Err(crate::PngError::UnsupportedLayout { .. })
        ));
    }

    #[test]
    fn normalization_is_idempotent_on_canonical() {
        let data: Vec<u8> = (0..48).collect();
        let raw = RawImage::new(4, 3, ColorType::Rgba, BitDepth::Eight, data.clone()).unwrap();
        let once = normalize(&raw);
        assert_eq!(once.to_rgba_bytes(), data);
        let twice = normalize(&RawImage::from(once.clone()));
        assert_eq!(twice, once);
    }

    #[test]
    fn empty_images_normalize_to_empty() {
        let raw = RawImage::new(0, 5, ColorType::Gray, BitDepth::One, Vec::new()).unwrap();
        let img = normalize(&raw);
        assert_eq!((img.width(), img.height()), (0, 5));
        assert!(img.pixels().is_empty());
    }

    #[test]
    fn arena_rows_are_independent_allocations() {
        let mut arena = RowArena::allocate(3, 2);
        arena.row_mut(1).copy_from_slice(&[7, 8]);
        assert_eq!(arena.height(), 3);
        assert_eq!(arena.row(0), &[0, 0]);
        assert_eq!(arena.par_rows().count(), 3);
        assert_eq!(arena.into_contiguous(), vec![0, 0, 7, 8, 0, 0]);
    }

    #[test]
    fn arena_fills_from_frame() {
        let mut arena = RowArena::allocate(2, 3);
        arena.fill_from_frame(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(arena.rows().collect::<Vec<_>>(), vec![&[1, 2, 3][..], &[4, 5, 6][..]]);
    }

    #[test]
    fn canonical_rows_pack_rgba() {
        let img = CanonicalImage::filled(2, 2, Rgba::new(1, 2, 3, 4));
        let arena = pack_canonical_rows(&img);
        assert_eq!(arena.height(), 2);
        assert_eq!(arena.row(1), &[1, 2, 3, 4, 1, 2, 3, 4]);
    }
}
