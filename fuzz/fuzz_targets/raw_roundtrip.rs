#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use pngkit::{BitDepth, ColorType, Header, RawImage};

#[derive(Arbitrary, Debug)]
struct Input {
    width: u8,
    height: u8,
    color_code: u8,
    depth_bits: u8,
    seed: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let (Ok(color_type), Ok(bit_depth)) = (
        ColorType::try_from(input.color_code),
        BitDepth::try_from(input.depth_bits),
    ) else {
        return;
    };
    let header = Header::new(
        input.width.max(1) as u32,
        input.height.max(1) as u32,
        color_type,
        bit_depth,
    );
    if header.ensure_supported().is_err() || input.seed.is_empty() {
        return;
    }
    let data = input.seed.iter().cycle().take(header.data_len()).copied().collect();
    let mut raw = RawImage::from_header(header, data).expect("length matches header");
    if color_type == ColorType::Palette {
        raw = raw.with_palette(vec![[0, 0, 0]; 1 << bit_depth.bits()]);
    }

    let bytes = raw.to_bytes().expect("valid raw images encode");
    let back = RawImage::from_bytes(&bytes).expect("own output decodes");
    assert_eq!(back.pixel_data(), raw.pixel_data());
});
