//! scenestack: Landsat scene archives to analysis-ready rasters
//!
//! Two pipelines:
//! - preprocessing: unpack scene archives, find each required band per
//!   acquisition date, crop to an area of interest and stack the dates into
//!   one chronologically ordered GeoTIFF per band
//! - feature engine: enrich a best-available-pixel composite with tasseled
//!   cap components, NDVI/NDII/NBR2 and elevation

pub mod types;
pub mod io;
pub mod core;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use crate::types::{
    AcquisitionDate, Bounds, GeoTransform, GridSpec, RasterGrid, StackError, StackResult,
};

pub use crate::io::{AoiKind, AreaOfInterest, ArchiveExtractor, BandLocator, DateParser, RasterSource};
pub use crate::core::{
    FeatureEngine, FeatureParams, PreprocessParams, Preprocessor, ReflectanceScale, Sensor,
    SensorProfile,
};
