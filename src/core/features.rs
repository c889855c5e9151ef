//! Spectral feature engine
//!
//! Turns a best-available-pixel composite (reflectance bands followed by the
//! cumulative-distance, day-of-year and score bands) plus an aligned
//! elevation raster into:
//! 1. an enriched i16 composite: reflectance, tasseled cap (3),
//!    NDVI, NDII, NBR2 and elevation
//! 2. a metadata raster with the composite's three trailing bands
//!
//! Each stage consumes the previous one, so the pipeline order
//! `Loaded -> TasseledCapComputed -> IndicesComputed -> Assembled -> Exported`
//! is enforced by the types.

use crate::core::indices::{encode, normalized_difference, NODATA};
use crate::core::sensor::{resolve_profile, SensorProfile};
use crate::core::tasseled_cap::tasseled_cap;
use crate::io::geotiff::{write_geotiff, write_geotiff_as, RasterSource};
use crate::types::{Encoded, RasterGrid, StackError, StackResult};
use gdal::raster::GdalDataType;
use gdal::spatial_ref::SpatialRef;
use ndarray::{s, Array2, Array3, Axis, Zip};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Trailing composite bands: cumulative distance, day of year, score
pub const METADATA_BAND_COUNT: usize = 3;

/// Largest plausible value of a 0..1 reflectance fraction
const UNIT_REFLECTANCE_MAX: f64 = 1.5;

/// Scale convention of the composite's reflectance values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReflectanceScale {
    /// Integers where 10000 means 100 % reflectance
    Scaled,
    /// Fractions in 0..1
    Unit,
}

impl ReflectanceScale {
    /// Multiplier bringing input values to the 0..10000 storage scale
    pub fn factor(self) -> f64 {
        match self {
            ReflectanceScale::Scaled => 1.0,
            ReflectanceScale::Unit => 10_000.0,
        }
    }

    /// Reject inputs whose magnitude contradicts the declared scale
    pub fn validate(self, max_reflectance: f64) -> StackResult<()> {
        match self {
            ReflectanceScale::Unit if max_reflectance > UNIT_REFLECTANCE_MAX => {
                Err(StackError::ScaleMismatch(format!(
                    "declared 0..1 reflectance but found values up to {}",
                    max_reflectance
                )))
            }
            ReflectanceScale::Scaled if max_reflectance > 0.0 && max_reflectance <= UNIT_REFLECTANCE_MAX => {
                Err(StackError::ScaleMismatch(format!(
                    "declared 0..10000 reflectance but all values are at most {}",
                    max_reflectance
                )))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for ReflectanceScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReflectanceScale::Scaled => write!(f, "scaled"),
            ReflectanceScale::Unit => write!(f, "unit"),
        }
    }
}

impl FromStr for ReflectanceScale {
    type Err = StackError;

    fn from_str(s: &str) -> StackResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scaled" | "10000" | "integer" => Ok(ReflectanceScale::Scaled),
            "unit" | "1" | "fraction" => Ok(ReflectanceScale::Unit),
            _ => Err(StackError::InvalidFormat(format!(
                "Unknown reflectance scale '{}' (expected 'scaled' or 'unit')",
                s
            ))),
        }
    }
}

/// Feature engine configuration
#[derive(Debug, Clone)]
pub struct FeatureParams {
    pub scale: ReflectanceScale,
    pub composite_name: String,
    pub metadata_name: String,
}

impl Default for FeatureParams {
    fn default() -> Self {
        Self {
            scale: ReflectanceScale::Scaled,
            composite_name: "out_composite_with_indices.tif".to_string(),
            metadata_name: "out_metadata_cdist-doy-score.tif".to_string(),
        }
    }
}

/// Entry point: a validated sensor profile plus parameters
pub struct FeatureEngine {
    profile: SensorProfile,
    params: FeatureParams,
}

impl FeatureEngine {
    /// Resolve the sensor up front; unsupported sensors fail here
    pub fn new(sensor: &str, params: FeatureParams) -> StackResult<Self> {
        let profile = resolve_profile(sensor)?;
        Ok(Self { profile, params })
    }

    pub fn profile(&self) -> &SensorProfile {
        &self.profile
    }

    /// Read the composite and the elevation raster
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(&self, composite_path: P, elevation_path: Q) -> StackResult<LoadedComposite> {
        let composite_path = composite_path.as_ref();
        log::info!("Loading composite: {}", composite_path.display());
        let source = RasterSource::open(composite_path)?;
        let composite_type = source.band_type()?;
        let composite = source.read_all::<f64>()?;

        log::info!("Loading elevation: {}", elevation_path.as_ref().display());
        let elevation = RasterSource::open(elevation_path.as_ref())?.read_bands::<f64>(&[1])?;

        LoadedComposite::new(self.profile.clone(), self.params.scale, composite, composite_type, elevation)
            .map_err(|e| match e {
                StackError::BandCountMismatch { expected, found, .. } => StackError::BandCountMismatch {
                    path: composite_path.to_path_buf(),
                    expected,
                    found,
                },
                other => other,
            })
    }

    /// Load, compute, assemble and export into `output_dir`
    pub fn run<P: AsRef<Path>, Q: AsRef<Path>, R: AsRef<Path>>(
        &self,
        composite_path: P,
        elevation_path: Q,
        output_dir: R,
    ) -> StackResult<ExportedComposite> {
        let output_dir = output_dir.as_ref();
        self.load(composite_path, elevation_path)?
            .compute_tasseled_cap()?
            .compute_indices()?
            .assemble()?
            .export(
                output_dir.join(&self.params.composite_name),
                output_dir.join(&self.params.metadata_name),
            )
    }
}

fn same_crs(a: &str, b: &str) -> StackResult<bool> {
    if a.is_empty() || b.is_empty() {
        return Ok(a.is_empty() && b.is_empty());
    }
    Ok(SpatialRef::from_wkt(a)? == SpatialRef::from_wkt(b)?)
}

/// Inputs read and validated; reflectance already in storage scale
#[derive(Debug)]
pub struct LoadedComposite {
    profile: SensorProfile,
    composite: RasterGrid<f64>,
    composite_type: GdalDataType,
    elevation: RasterGrid<f64>,
    reflectance: Array3<f64>,
    valid: Array2<bool>,
}

impl LoadedComposite {
    pub fn new(
        profile: SensorProfile,
        scale: ReflectanceScale,
        composite: RasterGrid<f64>,
        composite_type: GdalDataType,
        elevation: RasterGrid<f64>,
    ) -> StackResult<Self> {
        let band_count = profile.reflectance_bands.len();
        let expected = band_count + METADATA_BAND_COUNT;
        if composite.band_count() != expected {
            return Err(StackError::BandCountMismatch {
                path: PathBuf::new(),
                expected,
                found: composite.band_count(),
            });
        }

        let composite_grid = composite.grid_spec();
        let elevation_grid = elevation.grid_spec();
        if !composite_grid.is_aligned_with(&elevation_grid) || !same_crs(&composite.crs_wkt, &elevation.crs_wkt)? {
            return Err(StackError::GridMismatch {
                band: "elevation".to_string(),
                date: "composite".to_string(),
                expected: format!("{}x{}", composite_grid.height, composite_grid.width),
                found: format!("{}x{}", elevation_grid.height, elevation_grid.width),
            });
        }

        let raw = composite.data.slice(s![..band_count, .., ..]);
        let nodata = composite.nodata;
        let mut valid = Array2::from_elem(composite.shape(), true);
        for band in raw.axis_iter(Axis(0)) {
            Zip::from(&mut valid).and(&band).for_each(|ok, &v| {
                if !v.is_finite() || Some(v) == nodata {
                    *ok = false;
                }
            });
        }

        let mut max_reflectance = 0.0f64;
        for band in raw.axis_iter(Axis(0)) {
            Zip::from(&band).and(&valid).for_each(|&v, &ok| {
                if ok {
                    max_reflectance = max_reflectance.max(v.abs());
                }
            });
        }
        scale.validate(max_reflectance)?;
        log::debug!(
            "{} reflectance bands, max value {} ({} scale)",
            band_count,
            max_reflectance,
            scale
        );

        let reflectance = raw.mapv(|v| v * scale.factor());
        Ok(Self {
            profile,
            composite,
            composite_type,
            elevation,
            reflectance,
            valid,
        })
    }

    pub fn valid_mask(&self) -> &Array2<bool> {
        &self.valid
    }

    pub fn compute_tasseled_cap(self) -> StackResult<TasseledCapComputed> {
        log::info!("Computing tasseled cap components...");
        let tasseled_cap = tasseled_cap(
            self.reflectance.view(),
            &self.profile.tasseled_cap,
            self.valid.view(),
        )?;
        Ok(TasseledCapComputed {
            loaded: self,
            tasseled_cap,
        })
    }
}

/// Brightness, greenness, wetness added
#[derive(Debug)]
pub struct TasseledCapComputed {
    loaded: LoadedComposite,
    tasseled_cap: Array3<f64>,
}

impl TasseledCapComputed {
    pub fn tasseled_cap(&self) -> &Array3<f64> {
        &self.tasseled_cap
    }

    pub fn compute_indices(self) -> StackResult<IndicesComputed> {
        log::info!("Computing normalized difference indices...");
        let reflectance = &self.loaded.reflectance;
        let valid = self.loaded.valid.view();

        let arrays: Vec<Array2<Encoded>> = self
            .loaded
            .profile
            .roles
            .index_pairs()
            .iter()
            .map(|&(name, a, b)| {
                log::debug!("{} from bands {} and {}", name, a, b);
                normalized_difference(
                    reflectance.index_axis(Axis(0), a),
                    reflectance.index_axis(Axis(0), b),
                    valid,
                )
            })
            .collect();
        let views: Vec<_> = arrays.iter().map(|a| a.view()).collect();
        let indices = ndarray::stack(Axis(0), &views)
            .map_err(|e| StackError::InvalidFormat(format!("Failed to stack indices: {}", e)))?;

        Ok(IndicesComputed {
            loaded: self.loaded,
            tasseled_cap: self.tasseled_cap,
            indices,
        })
    }
}

/// NDVI, NDII and NBR2 added
#[derive(Debug)]
pub struct IndicesComputed {
    loaded: LoadedComposite,
    tasseled_cap: Array3<f64>,
    indices: Array3<Encoded>,
}

impl IndicesComputed {
    pub fn indices(&self) -> &Array3<Encoded> {
        &self.indices
    }

    /// Concatenate reflectance, tasseled cap, indices and elevation
    pub fn assemble(self) -> StackResult<AssembledComposite> {
        log::info!("Assembling enriched composite...");
        let loaded = self.loaded;
        let (bands, rows, cols) = loaded.reflectance.dim();
        if self.indices.dim() != (3, rows, cols) {
            return Err(StackError::InvalidFormat("Index cube has unexpected shape".to_string()));
        }
        let total = bands + 3 + 3 + 1;
        let mut enriched = Array3::from_elem((total, rows, cols), NODATA);

        let valid = &loaded.valid;
        Zip::from(enriched.slice_mut(s![..bands, .., ..]))
            .and(&loaded.reflectance)
            .and_broadcast(valid)
            .for_each(|o, &v, &ok| {
                if ok {
                    *o = encode(v);
                }
            });
        Zip::from(enriched.slice_mut(s![bands..bands + 3, .., ..]))
            .and(&self.tasseled_cap)
            .for_each(|o, &v| *o = encode(v));
        enriched
            .slice_mut(s![bands + 3..bands + 6, .., ..])
            .assign(&self.indices);

        let elevation_nodata = loaded.elevation.nodata;
        Zip::from(enriched.index_axis_mut(Axis(0), total - 1))
            .and(&loaded.elevation.band(0))
            .for_each(|o, &v| {
                if Some(v) != elevation_nodata {
                    *o = encode(v);
                }
            });

        let composite = loaded.composite;
        let metadata = RasterGrid {
            data: composite.data.slice(s![bands.., .., ..]).to_owned(),
            transform: composite.transform,
            crs_wkt: composite.crs_wkt.clone(),
            nodata: composite.nodata,
        };

        Ok(AssembledComposite {
            enriched: RasterGrid {
                data: enriched,
                transform: composite.transform,
                crs_wkt: composite.crs_wkt,
                nodata: Some(NODATA as f64),
            },
            metadata,
            metadata_type: loaded.composite_type,
        })
    }
}

/// Output rasters in memory, ready to write
#[derive(Debug)]
pub struct AssembledComposite {
    pub enriched: RasterGrid<Encoded>,
    pub metadata: RasterGrid<f64>,
    /// Element type of the source composite, kept for the metadata raster
    pub metadata_type: GdalDataType,
}

impl AssembledComposite {
    pub fn export<P: AsRef<Path>, Q: AsRef<Path>>(&self, composite_path: P, metadata_path: Q) -> StackResult<ExportedComposite> {
        write_geotiff_as(&self.metadata, self.metadata_type, metadata_path.as_ref())?;
        write_geotiff(&self.enriched, composite_path.as_ref())?;
        log::info!("Successfully exported composite to {}", composite_path.as_ref().display());
        Ok(ExportedComposite {
            composite_path: composite_path.as_ref().to_path_buf(),
            metadata_path: metadata_path.as_ref().to_path_buf(),
            band_count: self.enriched.band_count(),
        })
    }
}

/// Paths of the written outputs
#[derive(Debug, Clone)]
pub struct ExportedComposite {
    pub composite_path: PathBuf,
    pub metadata_path: PathBuf,
    pub band_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sensor::Sensor;
    use crate::types::GeoTransform;

    fn transform() -> GeoTransform {
        GeoTransform::from_gdal([500_000.0, 30.0, 0.0, 5_600_000.0, 0.0, -30.0])
    }

    /// 6 reflectance bands with NIR=8000, Red=4000 plus 3 metadata bands
    fn composite(rows: usize, cols: usize) -> RasterGrid<f64> {
        let values = [500.0, 800.0, 4000.0, 8000.0, 3000.0, 1500.0, 12.0, 200.0, 0.9];
        let data = Array3::from_shape_fn((9, rows, cols), |(b, _, _)| values[b]);
        RasterGrid { data, transform: transform(), crs_wkt: String::new(), nodata: Some(0.0) }
    }

    fn elevation(rows: usize, cols: usize) -> RasterGrid<f64> {
        RasterGrid::from_band(Array2::from_elem((rows, cols), 812.4), transform(), String::new(), Some(-9999.0))
    }

    fn loaded(composite: RasterGrid<f64>, scale: ReflectanceScale) -> StackResult<LoadedComposite> {
        let profile = Sensor::Landsat8.profile().unwrap();
        let (rows, cols) = composite.shape();
        LoadedComposite::new(profile, scale, composite, GdalDataType::Float32, elevation(rows, cols))
    }

    #[test]
    fn test_unsupported_sensor_fails_before_loading() {
        let result = FeatureEngine::new("Sentinel2", FeatureParams::default());
        assert!(matches!(result, Err(StackError::UnsupportedSensor(_))));
        assert!(FeatureEngine::new("Landsat9000", FeatureParams::default()).is_err());
    }

    #[test]
    fn test_band_layout() {
        let assembled = loaded(composite(2, 3), ReflectanceScale::Scaled)
            .unwrap()
            .compute_tasseled_cap()
            .unwrap()
            .compute_indices()
            .unwrap()
            .assemble()
            .unwrap();

        assert_eq!(assembled.enriched.band_count(), 6 + 3 + 3 + 1);
        assert_eq!(assembled.enriched.band_count(), 9 + 4);
        let px = |b: usize| assembled.enriched.data[[b, 1, 2]];
        assert_eq!(px(3), 8000);
        assert_eq!(px(9), 3333); // NDVI
        assert_eq!(px(10), 4545); // NDII (8000-3000)/11000
        assert_eq!(px(11), 3333); // NBR2 (3000-1500)/4500
        assert_eq!(px(12), 812);

        assert_eq!(assembled.metadata.band_count(), 3);
        assert_eq!(assembled.metadata.data[[2, 0, 0]], 0.9);
        assert_eq!(assembled.metadata_type, GdalDataType::Float32);
    }

    #[test]
    fn test_unit_scale_matches_scaled() {
        let scaled = loaded(composite(1, 1), ReflectanceScale::Scaled)
            .unwrap()
            .compute_tasseled_cap()
            .unwrap();
        let mut unit_input = composite(1, 1);
        unit_input.data.slice_mut(s![..6, .., ..]).mapv_inplace(|v| v / 10_000.0);
        let unit = loaded(unit_input, ReflectanceScale::Unit)
            .unwrap()
            .compute_tasseled_cap()
            .unwrap();

        for c in 0..3 {
            let a = scaled.tasseled_cap()[[c, 0, 0]];
            let b = unit.tasseled_cap()[[c, 0, 0]];
            assert!((a - b).abs() < 1e-6, "component {}: {} vs {}", c, a, b);
        }
    }

    #[test]
    fn test_scale_mismatch_is_rejected() {
        assert!(matches!(
            loaded(composite(1, 1), ReflectanceScale::Unit),
            Err(StackError::ScaleMismatch(_))
        ));

        let mut fractions = composite(1, 1);
        fractions.data.slice_mut(s![..6, .., ..]).mapv_inplace(|v| v / 10_000.0);
        assert!(matches!(
            loaded(fractions, ReflectanceScale::Scaled),
            Err(StackError::ScaleMismatch(_))
        ));
    }

    #[test]
    fn test_nodata_pixels_and_zero_denominator() {
        let mut input = composite(1, 2);
        // Pixel (0,0): red band is nodata -> everything derived is nodata
        input.data[[2, 0, 0]] = 0.0;
        // Pixel (0,1): SWIR1 = -SWIR2 -> NBR2 denominator is zero
        input.data[[4, 0, 1]] = 1500.0;
        input.data[[5, 0, 1]] = -1500.0;

        let assembled = loaded(input, ReflectanceScale::Scaled)
            .unwrap()
            .compute_tasseled_cap()
            .unwrap()
            .compute_indices()
            .unwrap()
            .assemble()
            .unwrap();
        let data = &assembled.enriched.data;

        for band in 0..12 {
            assert_eq!(data[[band, 0, 0]], NODATA, "band {}", band);
        }
        assert_eq!(data[[12, 0, 0]], 812);
        assert_eq!(data[[11, 0, 1]], NODATA);
        assert_ne!(data[[9, 0, 1]], NODATA);
    }

    #[test]
    fn test_wrong_band_count() {
        let mut input = composite(1, 1);
        input.data = input.data.slice(s![..8, .., ..]).to_owned();
        assert!(matches!(
            loaded(input, ReflectanceScale::Scaled),
            Err(StackError::BandCountMismatch { expected: 9, found: 8, .. })
        ));
    }

    #[test]
    fn test_misaligned_elevation() {
        let profile = Sensor::Landsat8.profile().unwrap();
        let result = LoadedComposite::new(
            profile,
            ReflectanceScale::Scaled,
            composite(2, 2),
            GdalDataType::Int16,
            elevation(3, 2),
        );
        assert!(matches!(result, Err(StackError::GridMismatch { .. })));
    }

    #[test]
    fn test_scale_parsing() {
        assert_eq!("unit".parse::<ReflectanceScale>().unwrap(), ReflectanceScale::Unit);
        assert_eq!("10000".parse::<ReflectanceScale>().unwrap(), ReflectanceScale::Scaled);
        assert!("percent".parse::<ReflectanceScale>().is_err());
    }
}
