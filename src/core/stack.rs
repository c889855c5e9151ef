use crate::core::crop::SpatialCropper;
use crate::io::aoi::AreaOfInterest;
use crate::io::geotiff::{write_geotiff, RasterSource};
use crate::types::{AcquisitionDate, GridSpec, RasterGrid, StackError, StackResult};
use gdal::raster::{GdalDataType, GdalType};
use ndarray::{Array3, Axis};
use num_traits::NumCast;
use std::path::{Path, PathBuf};

/// One band's cropped acquisitions, band axis in chronological order
#[derive(Debug, Clone)]
pub struct TimeSeriesRaster<T> {
    pub band: String,
    /// Acquisition date of each output band, earliest first
    pub dates: Vec<AcquisitionDate>,
    pub raster: RasterGrid<T>,
}

/// Default output name; `{first}`, `{last}` and `{band}` are substituted
pub const DEFAULT_NAME_TEMPLATE: &str = "time_series_{first}_{last}_{band}.tif";

impl<T: Clone + GdalType + Copy + NumCast> TimeSeriesRaster<T> {
    pub fn file_name(&self) -> String {
        self.file_name_from(DEFAULT_NAME_TEMPLATE)
    }

    pub fn file_name_from(&self, template: &str) -> String {
        let fmt = |d: Option<&AcquisitionDate>| d.map(|d| d.format("%Y%m%d").to_string()).unwrap_or_default();
        template
            .replace("{first}", &fmt(self.dates.first()))
            .replace("{last}", &fmt(self.dates.last()))
            .replace("{band}", &self.band)
    }

    /// Write the stack into `dir`, returning the output path
    pub fn write_to<P: AsRef<Path>>(&self, dir: P, template: &str) -> StackResult<PathBuf> {
        let path = dir.as_ref().join(self.file_name_from(template));
        write_geotiff(&self.raster, &path)?;
        Ok(path)
    }
}

/// Time series kept in the element type of its source files
#[derive(Debug, Clone)]
pub enum NativeTimeSeries {
    UInt8(TimeSeriesRaster<u8>),
    UInt16(TimeSeriesRaster<u16>),
    Int16(TimeSeriesRaster<i16>),
    UInt32(TimeSeriesRaster<u32>),
    Int32(TimeSeriesRaster<i32>),
    Float32(TimeSeriesRaster<f32>),
    Float64(TimeSeriesRaster<f64>),
}

impl NativeTimeSeries {
    pub fn band(&self) -> &str {
        match self {
            NativeTimeSeries::UInt8(s) => &s.band,
            NativeTimeSeries::UInt16(s) => &s.band,
            NativeTimeSeries::Int16(s) => &s.band,
            NativeTimeSeries::UInt32(s) => &s.band,
            NativeTimeSeries::Int32(s) => &s.band,
            NativeTimeSeries::Float32(s) => &s.band,
            NativeTimeSeries::Float64(s) => &s.band,
        }
    }

    pub fn dates(&self) -> &[AcquisitionDate] {
        match self {
            NativeTimeSeries::UInt8(s) => &s.dates,
            NativeTimeSeries::UInt16(s) => &s.dates,
            NativeTimeSeries::Int16(s) => &s.dates,
            NativeTimeSeries::UInt32(s) => &s.dates,
            NativeTimeSeries::Int32(s) => &s.dates,
            NativeTimeSeries::Float32(s) => &s.dates,
            NativeTimeSeries::Float64(s) => &s.dates,
        }
    }

    pub fn write_to<P: AsRef<Path>>(&self, dir: P, template: &str) -> StackResult<PathBuf> {
        match self {
            NativeTimeSeries::UInt8(s) => s.write_to(dir, template),
            NativeTimeSeries::UInt16(s) => s.write_to(dir, template),
            NativeTimeSeries::Int16(s) => s.write_to(dir, template),
            NativeTimeSeries::UInt32(s) => s.write_to(dir, template),
            NativeTimeSeries::Int32(s) => s.write_to(dir, template),
            NativeTimeSeries::Float32(s) => s.write_to(dir, template),
            NativeTimeSeries::Float64(s) => s.write_to(dir, template),
        }
    }
}

/// Crops every acquisition of a band and stacks them by date
pub struct TemporalStacker<'a> {
    cropper: SpatialCropper<'a>,
}

impl<'a> TemporalStacker<'a> {
    pub fn new(aoi: &'a AreaOfInterest) -> Self {
        log::debug!("Stacking against {:?} AOI", aoi.kind);
        Self {
            cropper: SpatialCropper::new(aoi),
        }
    }

    /// Stack `(date, path)` pairs of one band; input order is irrelevant.
    pub fn stack<T, I>(&self, band: &str, acquisitions: I) -> StackResult<TimeSeriesRaster<T>>
    where
        T: GdalType + Copy + NumCast,
        I: IntoIterator<Item = (AcquisitionDate, PathBuf)>,
    {
        let mut acquisitions: Vec<(AcquisitionDate, PathBuf)> = acquisitions.into_iter().collect();
        acquisitions.sort_by(|a, b| a.0.cmp(&b.0));
        if acquisitions.is_empty() {
            return Err(StackError::EmptyTimeSeries(band.to_string()));
        }
        if let Some(pair) = acquisitions.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(StackError::AmbiguousMatch {
                band: format!("{} on {}", band, pair[0].0),
                candidates: vec![pair[0].1.clone(), pair[1].1.clone()],
            });
        }

        let mut reference: Option<(GridSpec, Option<f64>)> = None;
        let mut layers = Vec::with_capacity(acquisitions.len());
        for (date, path) in &acquisitions {
            let cropped: RasterGrid<T> = self.cropper.crop(path)?;
            let spec = cropped.grid_spec();
            match &reference {
                None => reference = Some((spec, cropped.nodata)),
                Some((expected, _)) => {
                    if !expected.is_aligned_with(&spec) {
                        return Err(StackError::GridMismatch {
                            band: band.to_string(),
                            date: date.to_string(),
                            expected: describe(expected),
                            found: describe(&spec),
                        });
                    }
                }
            }
            layers.push(cropped.data.index_axis_move(Axis(0), 0));
        }

        let (spec, nodata) = reference.ok_or_else(|| StackError::EmptyTimeSeries(band.to_string()))?;
        let views: Vec<_> = layers.iter().map(|l| l.view()).collect();
        let data: Array3<T> = ndarray::stack(Axis(0), &views)
            .map_err(|e| StackError::InvalidFormat(format!("Failed to stack {}: {}", band, e)))?;
        log::debug!("Stacked {} dates of {} into {:?}", acquisitions.len(), band, data.dim());

        Ok(TimeSeriesRaster {
            band: band.to_string(),
            dates: acquisitions.into_iter().map(|(d, _)| d).collect(),
            raster: RasterGrid {
                data,
                transform: spec.transform,
                crs_wkt: spec.crs_wkt,
                nodata,
            },
        })
    }

    /// Stack in the element type shared by all acquisition files
    pub fn stack_native<I>(&self, band: &str, acquisitions: I) -> StackResult<NativeTimeSeries>
    where
        I: IntoIterator<Item = (AcquisitionDate, PathBuf)>,
    {
        let acquisitions: Vec<(AcquisitionDate, PathBuf)> = acquisitions.into_iter().collect();
        let mut data_type: Option<GdalDataType> = None;
        for (date, path) in &acquisitions {
            let found = RasterSource::open(path)?.band_type()?;
            match data_type {
                None => data_type = Some(found),
                Some(expected) if expected != found => {
                    return Err(StackError::InvalidFormat(format!(
                        "{} on {}: {} is {:?}, other dates are {:?}",
                        band,
                        date,
                        path.display(),
                        found,
                        expected
                    )));
                }
                Some(_) => {}
            }
        }
        let data_type = data_type.ok_or_else(|| StackError::EmptyTimeSeries(band.to_string()))?;
        log::debug!("Stacking {} as {:?}", band, data_type);

        Ok(match data_type {
            GdalDataType::UInt8 => NativeTimeSeries::UInt8(self.stack(band, acquisitions)?),
            GdalDataType::UInt16 => NativeTimeSeries::UInt16(self.stack(band, acquisitions)?),
            GdalDataType::Int16 => NativeTimeSeries::Int16(self.stack(band, acquisitions)?),
            GdalDataType::UInt32 => NativeTimeSeries::UInt32(self.stack(band, acquisitions)?),
            GdalDataType::Int32 => NativeTimeSeries::Int32(self.stack(band, acquisitions)?),
            GdalDataType::Float32 => NativeTimeSeries::Float32(self.stack(band, acquisitions)?),
            GdalDataType::Float64 => NativeTimeSeries::Float64(self.stack(band, acquisitions)?),
            other => {
                return Err(StackError::InvalidFormat(format!(
                    "{}: unsupported element type {:?}",
                    band, other
                )))
            }
        })
    }
}

fn describe(spec: &GridSpec) -> String {
    format!(
        "{}x{} at ({}, {})",
        spec.height, spec.width, spec.transform.top_left_x, spec.transform.top_left_y
    )
}
