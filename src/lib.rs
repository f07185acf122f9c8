// lib.rs
//
// pngkit: PNG decode/encode with a canonical RGBA view
//
// Two image types sit on top of the `png` codec:
// - RawImage keeps the stored color type and bit depth, byte for byte
// - CanonicalImage normalizes every layout to 8-bit RGBA
//
// Bytes come from files, memory, readers or URLs through a streaming bridge;
// every failure surfaces as a PngError and nothing is returned half-decoded.

pub mod canonical;
pub mod engine;
pub mod error;
pub mod pixel;
pub mod raw;

pub use canonical::CanonicalImage;
pub use engine::{
    Compression, DecodeConfig, Diagnostics, EncodeConfig, LimitPolicy, Limits, Source, Transform,
};
pub use error::{ErrorCategory, PngError, Result};
pub use pixel::Rgba;
pub use raw::{BitDepth, ColorType, Header, RawImage, Transparency};
