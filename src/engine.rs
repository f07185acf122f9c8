// src/engine.rs
//
// The decode/encode machinery behind RawImage and CanonicalImage:
// 1. io: byte sources/sinks bridged onto the codec's read/write contract
// 2. session: one codec session per call, every engine call settled through an ErrorSlot
// 3. pipeline: transform selection and row normalization to canonical RGBA
// 4. decoder/encoder: the call sequences tying the above together
//
// The PNG bitstream itself (chunks, CRC, zlib, filters, interlace) belongs to
// the `png` crate, which is always driven with Transformations::IDENTITY.

// =============================================================================
// SECURITY LIMITS
// =============================================================================

/// Maximum allowed image dimension (width or height).
/// Images larger than 32768x32768 are rejected to prevent decompression bombs.
pub const MAX_DIMENSION: u32 = 32768;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 400MB of canonical RGBA.
pub const MAX_PIXELS: u64 = 100_000_000;

/// The 8-byte PNG signature.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

mod common;
pub(crate) mod decoder;
pub(crate) mod encoder;
mod io;
mod limits;
pub(crate) mod pipeline;
mod session;

pub use common::run_with_panic_policy;
pub use decoder::{
    check_dimensions, decode_canonical_from_reader, decode_canonical_with_diagnostics,
    decode_raw_from_reader,
};
pub use encoder::{encode_canonical, encode_raw, Compression, EncodeConfig};
#[cfg(feature = "http")]
pub use io::HttpSource;
pub use io::{ReadBridge, Source, WriteBridge};
pub use limits::{DecodeConfig, LimitPolicy, Limits};
pub use pipeline::{RowArena, Transform};
pub use session::Diagnostics;
