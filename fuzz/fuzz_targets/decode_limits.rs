#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use pngkit::{DecodeConfig, Limits, PngError, RawImage};

#[derive(Arbitrary, Debug)]
struct Input {
    max_width: Option<u16>,
    max_height: Option<u16>,
    max_pixels: Option<u32>,
    data: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let mut limits = Limits::custom();
    limits.max_width = input.max_width.map(u32::from);
    limits.max_height = input.max_height.map(u32::from);
    limits.max_pixels = input.max_pixels.map(u64::from);
    let config = DecodeConfig::new().with_limits(limits.clone());

    match RawImage::from_bytes_with_config(&input.data, &config) {
        Ok(raw) => assert!(limits.check(&raw.header()).is_ok()),
        Err(PngError::InternalPanic { message }) => panic!("engine panicked: {message}"),
        Err(_) => {}
    }
});
