// src/engine/limits.rs
//
// Decode-side resource limits and the configuration that carries them.

use crate::error::PngError;
use crate::raw::Header;
use std::str::FromStr;

const STRICT_MAX_PIXELS: u64 = 40_000_000; // ~8K x 5K
const LENIENT_MAX_PIXELS: u64 = 75_000_000; // generous but below global MAX_PIXELS
const STRICT_ENGINE_BYTES: usize = 64 * 1024 * 1024;
const LENIENT_ENGINE_BYTES: usize = 512 * 1024 * 1024;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LimitPolicy {
    /// Only the global MAX_DIMENSION / MAX_PIXELS ceilings apply
    #[default]
    Disabled,
    Strict,
    Lenient,
    /// Limits set one by one through the builder methods
    Custom,
}

impl FromStr for LimitPolicy {
    type Err = PngError;

    fn from_str(s: &str) -> Result<Self, PngError> {
        match s.to_ascii_lowercase().as_str() {
            "disabled" | "off" => Ok(LimitPolicy::Disabled),
            "strict" => Ok(LimitPolicy::Strict),
            "lenient" => Ok(LimitPolicy::Lenient),
            "custom" => Ok(LimitPolicy::Custom),
            _ => Err(PngError::invalid_argument(
                "policy",
                s.to_string(),
                "expected disabled, strict, lenient or custom",
            )),
        }
    }
}

/// Per-decode ceilings, checked against IHDR before any row is read.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Limits {
    pub policy: LimitPolicy,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    pub max_pixels: Option<u64>,
    /// Byte budget handed to the png engine for its own allocations
    /// (ancillary chunks, decompression state). `None` keeps its default.
    pub engine_bytes: Option<usize>,
}

impl Limits {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn strict() -> Self {
        Self {
            policy: LimitPolicy::Strict,
            max_pixels: Some(STRICT_MAX_PIXELS),
            engine_bytes: Some(STRICT_ENGINE_BYTES),
            ..Self::default()
        }
    }

    pub fn lenient() -> Self {
        Self {
            policy: LimitPolicy::Lenient,
            max_pixels: Some(LENIENT_MAX_PIXELS),
            engine_bytes: Some(LENIENT_ENGINE_BYTES),
            ..Self::default()
        }
    }

    pub fn custom() -> Self {
        Self {
            policy: LimitPolicy::Custom,
            ..Self::default()
        }
    }

    pub fn for_policy(policy: LimitPolicy) -> Self {
        match policy {
            LimitPolicy::Disabled => Self::disabled(),
            LimitPolicy::Strict => Self::strict(),
            LimitPolicy::Lenient => Self::lenient(),
            LimitPolicy::Custom => Self::custom(),
        }
    }

    pub fn with_max_width(mut self, width: u32) -> Self {
        self.max_width = Some(width);
        self.policy = LimitPolicy::Custom;
        self
    }

    pub fn with_max_height(mut self, height: u32) -> Self {
        self.max_height = Some(height);
        self.policy = LimitPolicy::Custom;
        self
    }

    pub fn with_max_pixels(mut self, pixels: u64) -> Self {
        self.max_pixels = Some(pixels);
        self.policy = LimitPolicy::Custom;
        self
    }

    pub fn with_engine_bytes(mut self, bytes: usize) -> Self {
        self.engine_bytes = Some(bytes);
        self.policy = LimitPolicy::Custom;
        self
    }

    /// Reject a header whose geometry exceeds any configured ceiling.
    pub fn check(&self, header: &Header) -> Result<(), PngError> {
        if let Some(max) = self.max_width {
            if header.width > max {
                return Err(PngError::dimension_exceeds_limit(header.width, max));
            }
        }
        if let Some(max) = self.max_height {
            if header.height > max {
                return Err(PngError::dimension_exceeds_limit(header.height, max));
            }
        }
        if let Some(max) = self.max_pixels {
            let pixels = header.width as u64 * header.height as u64;
            if pixels > max {
                return Err(PngError::pixel_count_exceeds_limit(pixels, max));
            }
        }
        Ok(())
    }

    pub(crate) fn engine_limits(&self) -> png::Limits {
        let mut limits = png::Limits::default();
        if let Some(bytes) = self.engine_bytes {
            limits.bytes = bytes;
        }
        limits
    }
}

/// Options for one decode call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodeConfig {
    pub limits: Limits,
}

impl DecodeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_policy(self, policy: LimitPolicy) -> Self {
        self.with_limits(Limits::for_policy(policy))
    }
}
