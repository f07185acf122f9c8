// src/error.rs
//
// Unified error handling for pngkit
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - UserError: Invalid input, recoverable
// - CodecError: The byte stream or the codec engine failed mid-call
// - ResourceLimit: Unopenable sources/sinks and dimension limits
// - InternalBug: Library bugs (should not happen)

use crate::raw::ColorType;
use std::borrow::Cow;
use thiserror::Error;

/// Error taxonomy used to decide how a caller can react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCategory {
    /// Invalid input, recoverable by user
    UserError,
    /// Truncated or malformed byte streams, engine-reported failures
    CodecError,
    /// Unavailable sources/sinks, dimension and memory limits
    ResourceLimit,
    /// Library bugs (should not happen)
    InternalBug,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::UserError => "UserError",
            ErrorCategory::CodecError => "CodecError",
            ErrorCategory::ResourceLimit => "ResourceLimit",
            ErrorCategory::InternalBug => "InternalBug",
        }
    }
}

/// pngkit error types
///
/// Every decode/encode call either returns a complete image (or byte buffer)
/// or exactly one of these. Failures from the byte bridge and failures
/// reported by the codec engine share the `ReadFailed`/`WriteFailed` variants,
/// so callers never need to know which layer gave up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PngError {
    #[error("Incorrect data size: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Unable to open '{path}': {reason}")]
    UnableToOpen {
        path: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    #[error("Unable to read '{path}'{}", describe(.description))]
    ReadFailed {
        path: Cow<'static, str>,
        description: Option<Cow<'static, str>>,
    },

    #[error("Unable to write to '{path}'{}", describe(.description))]
    WriteFailed {
        path: Cow<'static, str>,
        description: Option<Cow<'static, str>>,
    },

    #[error("Unsupported pixel layout: {color_type:?} at {bit_depth} bits per sample")]
    UnsupportedLayout { color_type: ColorType, bit_depth: u8 },

    #[error("Image dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("Image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    #[error("Invalid value for {name}: {value}. {reason}")]
    InvalidArgument {
        name: Cow<'static, str>,
        value: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    #[error("Internal error: {message}")]
    InternalPanic { message: Cow<'static, str> },
}

fn describe(description: &Option<Cow<'static, str>>) -> String {
    match description {
        Some(text) if !text.trim().is_empty() => format!(": {}", text.trim()),
        _ => String::new(),
    }
}

// Constructor Helpers
impl PngError {
    pub fn size_mismatch(expected: usize, actual: usize) -> Self {
        Self::SizeMismatch { expected, actual }
    }

    pub fn unable_to_open(
        path: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::UnableToOpen {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn read_failed(
        path: impl Into<Cow<'static, str>>,
        description: Option<impl Into<Cow<'static, str>>>,
    ) -> Self {
        Self::ReadFailed {
            path: path.into(),
            description: description.map(Into::into),
        }
    }

    pub fn write_failed(
        path: impl Into<Cow<'static, str>>,
        description: Option<impl Into<Cow<'static, str>>>,
    ) -> Self {
        Self::WriteFailed {
            path: path.into(),
            description: description.map(Into::into),
        }
    }

    pub fn unsupported_layout(color_type: ColorType, bit_depth: u8) -> Self {
        Self::UnsupportedLayout {
            color_type,
            bit_depth,
        }
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn invalid_argument(
        name: impl Into<Cow<'static, str>>,
        value: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn internal_panic(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InternalPanic {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable (user can fix it)
    ///
    /// Consistent with category(): UserError and ResourceLimit are
    /// recoverable, CodecError and InternalBug are not.
    pub fn is_recoverable(&self) -> bool {
        match self.category() {
            ErrorCategory::UserError | ErrorCategory::ResourceLimit => true,
            ErrorCategory::CodecError | ErrorCategory::InternalBug => false,
        }
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::SizeMismatch { .. }
            | Self::UnsupportedLayout { .. }
            | Self::InvalidArgument { .. } => ErrorCategory::UserError,

            Self::ReadFailed { .. } | Self::WriteFailed { .. } => ErrorCategory::CodecError,

            // An unopenable path or unreachable host is an environment problem
            // the caller can fix (permissions, missing file, network).
            Self::UnableToOpen { .. }
            | Self::DimensionExceedsLimit { .. }
            | Self::PixelCountExceedsLimit { .. } => ErrorCategory::ResourceLimit,

            Self::InternalPanic { .. } => ErrorCategory::InternalBug,
        }
    }

    /// The path or identifier the failing call was reading from or writing to.
    pub fn origin(&self) -> Option<&str> {
        match self {
            Self::UnableToOpen { path, .. }
            | Self::ReadFailed { path, .. }
            | Self::WriteFailed { path, .. } => Some(&**path),
            _ => None,
        }
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, PngError>;
