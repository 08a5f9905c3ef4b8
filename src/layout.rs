//! Structural checks on caller-owned arrays.
//!
//! Every kernel in this crate walks its inputs as flat `[x0, y0, z0, x1, ...]`
//! slices, so point, normal and current arrays must be `(n, 3)` and stored
//! row-major without gaps. These helpers reject anything else before any
//! floating-point work starts.
use ndarray::ArrayView2;

use crate::error::{WindingSurfaceError, WsResult};

/// Borrow an `(n, 3)` array as a flat row-major slice of length `3n`.
///
/// # Arguments
///
/// * `name`: Name reported in the error if the check fails
/// * `a`:    Array of 3-vectors, one per row
/// * `rows`: Required number of rows, if the caller needs a match with another array
pub fn xyz_slice<'a>(
    name: &'static str,
    a: ArrayView2<'a, f64>,
    rows: Option<usize>,
) -> WsResult<&'a [f64]> {
    let (nrows, ncols) = a.dim();
    let expected_rows = rows.unwrap_or(nrows);
    if ncols != 3 || nrows != expected_rows {
        return Err(WindingSurfaceError::Shape {
            name,
            expected: format!("({expected_rows}, 3)"),
            got: vec![nrows, ncols],
        });
    }

    a.to_slice().ok_or(WindingSurfaceError::Layout { name })
}

/// Check a 1-D input against the length it has to match.
pub fn check_len<T>(name: &'static str, v: &[T], expected: usize) -> WsResult<()> {
    if v.len() != expected {
        return Err(WindingSurfaceError::Length {
            name,
            expected,
            got: v.len(),
        });
    }
    Ok(())
}
