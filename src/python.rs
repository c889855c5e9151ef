//! Python bindings (`python` feature)

use crate::core::{normalized_difference, FeatureEngine, FeatureParams, PreprocessParams, Preprocessor, ReflectanceScale};
use crate::io::{AoiKind, AreaOfInterest};
use crate::types::StackError;
use numpy::{IntoPyArray, PyArray2, PyReadonlyArray2};
use pyo3::prelude::*;

fn to_py_err(e: StackError) -> PyErr {
    match e {
        StackError::UnsupportedSensor(_) | StackError::ScaleMismatch(_) => {
            PyErr::new::<pyo3::exceptions::PyValueError, _>(format!("{}", e))
        }
        _ => PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("{}", e)),
    }
}

/// Python module definition
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(preprocess, m)?)?;
    m.add_function(wrap_pyfunction!(add_features, m)?)?;
    m.add_function(wrap_pyfunction!(py_normalized_difference, m)?)?;
    Ok(())
}

/// Stack every scene archive in `directory`; returns the acquisition dates
#[pyfunction]
#[pyo3(signature = (directory, aoi_path, sensor = "Landsat8", buffered = true))]
fn preprocess(directory: &str, aoi_path: &str, sensor: &str, buffered: bool) -> PyResult<Vec<String>> {
    let kind = if buffered { AoiKind::Buffered } else { AoiKind::Unbuffered };
    let aoi = AreaOfInterest::open(aoi_path, kind).map_err(to_py_err)?;
    let summary = Preprocessor::new(sensor, PreprocessParams::default())
        .and_then(|p| p.run(directory, &aoi))
        .map_err(to_py_err)?;
    Ok(summary.dates.iter().map(|d| d.format("%Y%m%d").to_string()).collect())
}

/// Enrich a composite; returns (composite path, metadata path)
#[pyfunction]
#[pyo3(signature = (composite, sensor = "Landsat8", elevation = "data/srtm.tif", scale = "scaled", output_dir = "."))]
fn add_features(
    composite: &str,
    sensor: &str,
    elevation: &str,
    scale: &str,
    output_dir: &str,
) -> PyResult<(String, String)> {
    let scale: ReflectanceScale = scale.parse().map_err(to_py_err)?;
    let params = FeatureParams {
        scale,
        ..FeatureParams::default()
    };
    let exported = FeatureEngine::new(sensor, params)
        .and_then(|engine| engine.run(composite, elevation, output_dir))
        .map_err(to_py_err)?;
    Ok((
        exported.composite_path.display().to_string(),
        exported.metadata_path.display().to_string(),
    ))
}

/// Encoded normalized difference of two equally shaped float arrays
#[pyfunction]
#[pyo3(name = "normalized_difference")]
fn py_normalized_difference<'py>(
    py: Python<'py>,
    band_a: PyReadonlyArray2<f64>,
    band_b: PyReadonlyArray2<f64>,
) -> PyResult<&'py PyArray2<i16>> {
    let a = band_a.as_array();
    let b = band_b.as_array();
    if a.dim() != b.dim() {
        return Err(PyErr::new::<pyo3::exceptions::PyValueError, _>(format!(
            "Shape mismatch: {:?} vs {:?}",
            a.dim(),
            b.dim()
        )));
    }
    let valid = ndarray::Array2::from_elem(a.dim(), true);
    Ok(normalized_difference(a, b, valid.view()).into_pyarray(py))
}
