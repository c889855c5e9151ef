//! Core processing modules: sensor registry, cropping, stacking, spectral features

pub mod sensor;
pub mod crop;
pub mod stack;
pub mod preprocess;
pub mod indices;
pub mod tasseled_cap;
pub mod features;

// Re-export main types
pub use sensor::{Sensor, SensorProfile, TasseledCapCoefficients, BandRoles, resolve_profile};
pub use crop::SpatialCropper;
pub use stack::{TemporalStacker, TimeSeriesRaster};
pub use preprocess::{Preprocessor, PreprocessParams, PreprocessSummary};
pub use indices::{normalized_difference, encode, NODATA};
pub use features::{FeatureEngine, FeatureParams, ReflectanceScale, ExportedComposite};
