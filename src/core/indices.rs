//! Normalized-difference indices and the i16 encoding of derived bands

use crate::types::Encoded;
use ndarray::{Array2, ArrayView2, Zip};

/// Multiplier applied to ratio indices before integer encoding
pub const INDEX_SCALE: f64 = 10_000.0;

/// Reserved output value marking "no valid data"
pub const NODATA: Encoded = i16::MIN;

/// Round to nearest (ties away from zero) and saturate into
/// `[-32767, 32767]`, so `NODATA` never collides with a valid value.
/// NaN encodes as `NODATA`.
pub fn encode(value: f64) -> Encoded {
    if value.is_nan() {
        return NODATA;
    }
    value.round().clamp(-(i16::MAX as f64), i16::MAX as f64) as Encoded
}

/// `(a - b) / (a + b) * 10000`, encoded.
///
/// A zero (or non-finite) denominator has no defined ratio and yields
/// `NODATA` instead of propagating NaN or infinity.
pub fn normalized_difference_value(a: f64, b: f64) -> Encoded {
    let sum = a + b;
    if sum == 0.0 || !sum.is_finite() || !a.is_finite() || !b.is_finite() {
        return NODATA;
    }
    encode((a - b) / sum * INDEX_SCALE)
}

/// Per-pixel normalized difference; pixels flagged invalid become `NODATA`
pub fn normalized_difference(
    band_a: ArrayView2<f64>,
    band_b: ArrayView2<f64>,
    valid: ArrayView2<bool>,
) -> Array2<Encoded> {
    let mut out = Array2::from_elem(band_a.dim(), NODATA);
    Zip::from(&mut out)
        .and(&band_a)
        .and(&band_b)
        .and(&valid)
        .for_each(|o, &a, &b, &ok| {
            if ok {
                *o = normalized_difference_value(a, b);
            }
        });
    out
}
