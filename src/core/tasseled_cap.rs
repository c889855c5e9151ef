use crate::core::sensor::{TasseledCapCoefficients, REFLECTANCE_BAND_COUNT};
use crate::types::{StackError, StackResult};
use ndarray::{Array3, ArrayView2, ArrayView3, Axis, Zip};

/// Brightness, greenness and wetness as a (3, rows, cols) cube.
///
/// `reflectance` holds exactly the sensor's reflectance bands, already in
/// the storage scale. Invalid pixels are NaN in every component.
pub fn tasseled_cap(
    reflectance: ArrayView3<f64>,
    coefficients: &TasseledCapCoefficients,
    valid: ArrayView2<bool>,
) -> StackResult<Array3<f64>> {
    let (bands, rows, cols) = reflectance.dim();
    if bands != REFLECTANCE_BAND_COUNT {
        return Err(StackError::InvalidFormat(format!(
            "Tasseled cap needs {} reflectance bands, got {}",
            REFLECTANCE_BAND_COUNT, bands
        )));
    }
    if valid.dim() != (rows, cols) {
        return Err(StackError::InvalidFormat(
            "Validity mask and reflectance dimensions do not match".to_string(),
        ));
    }
    log::debug!("Computing tasseled cap on {}x{} pixels", rows, cols);

    let mut out = Array3::<f64>::zeros((3, rows, cols));
    for (mut component, weights) in out.axis_iter_mut(Axis(0)).zip(coefficients.components()) {
        for (band, &weight) in reflectance.axis_iter(Axis(0)).zip(weights.iter()) {
            component.scaled_add(weight, &band);
        }
        Zip::from(&mut component).and(&valid).for_each(|v, &ok| {
            if !ok {
                *v = f64::NAN;
            }
        });
    }
    Ok(out)
}
