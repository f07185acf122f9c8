// src/engine/common.rs
//
// Common utilities shared across engine modules.

use crate::error::PngError;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Run a codec call so that a panic inside the engine surfaces as
/// `PngError::InternalPanic` instead of unwinding into the caller.
///
/// The closure's own `Result` is passed through untouched; callers settle it
/// against the session's `ErrorSlot` afterwards.
pub fn run_with_panic_policy<T>(stage: &'static str, f: impl FnOnce() -> T) -> Result<T, PngError> {
    catch_unwind(AssertUnwindSafe(f))
        .map_err(|payload| PngError::internal_panic(format!("{stage}: {}", panic_message(&payload))))
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_through_values() {
        let value = run_with_panic_policy("test", || 7).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn converts_panics_with_stage_name() {
        let err = run_with_panic_policy("decode:rows", || -> u8 { panic!("row index out of range") })
            .unwrap_err();
        match err {
            PngError::InternalPanic { message } => {
                assert!(message.starts_with("decode:rows"));
                assert!(message.contains("row index out of range"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn formatted_panic_payloads_are_kept() {
        let err = run_with_panic_policy("encode:header", || -> u32 { panic!("bad width {}", 0) })
            .unwrap_err();
        assert!(err.to_string().contains("bad width 0"));
    }
}
