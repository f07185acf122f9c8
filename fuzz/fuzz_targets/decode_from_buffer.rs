#![no_main]

use libfuzzer_sys::fuzz_target;
use pngkit::{CanonicalImage, RawImage};

fuzz_target!(|data: &[u8]| {
    // Either path may fail, but a successful raw decode must normalize.
    if let Ok(raw) = RawImage::from_bytes(data) {
        let canonical = raw.to_canonical().expect("decoded layouts always normalize");
        assert_eq!(
            canonical.pixels().len(),
            raw.width() as usize * raw.height() as usize
        );
    }
    let _ = CanonicalImage::from_bytes(data);
});
