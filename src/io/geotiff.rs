use crate::types::{GeoTransform, GridSpec, RasterGrid, StackError, StackResult};
use gdal::raster::{Buffer, GdalDataType, GdalType};
use gdal::{Dataset, DriverManager};
use ndarray::{Array2, Array3, Axis};
use num_traits::{NumCast, ToPrimitive};
use std::path::{Path, PathBuf};

/// Pixel window (offsets and size in pixels)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub row_off: usize,
    pub col_off: usize,
    pub height: usize,
    pub width: usize,
}

/// Open raster file, read lazily band by band
pub struct RasterSource {
    path: PathBuf,
    dataset: Dataset,
}

impl RasterSource {
    pub fn open<P: AsRef<Path>>(path: P) -> StackResult<Self> {
        let path = path.as_ref().to_path_buf();
        log::debug!("Opening raster: {}", path.display());
        let dataset = Dataset::open(&path)?;
        Ok(Self { path, dataset })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn band_count(&self) -> usize {
        self.dataset.raster_count().max(0) as usize
    }

    pub fn grid_spec(&self) -> StackResult<GridSpec> {
        let (width, height) = self.dataset.raster_size();
        Ok(GridSpec {
            width,
            height,
            transform: GeoTransform::from_gdal(self.dataset.geo_transform()?),
            crs_wkt: self.dataset.projection(),
        })
    }

    /// Nodata value declared on the first band
    pub fn nodata(&self) -> StackResult<Option<f64>> {
        Ok(self.dataset.rasterband(1)?.no_data_value())
    }

    pub fn band_type(&self) -> StackResult<GdalDataType> {
        Ok(self.dataset.rasterband(1)?.band_type())
    }

    /// Read a window of one band (1-based band number)
    pub fn read_window<T: GdalType + Copy>(&self, band: usize, window: Window) -> StackResult<Array2<T>> {
        let rasterband = self.dataset.rasterband(band as isize)?;
        let buffer = rasterband.read_as::<T>(
            (window.col_off as isize, window.row_off as isize),
            (window.width, window.height),
            (window.width, window.height),
            None,
        )?;
        Array2::from_shape_vec((window.height, window.width), buffer.data)
            .map_err(|e| StackError::InvalidFormat(format!("Failed to reshape band {}: {}", band, e)))
    }

    /// Read a set of bands (1-based) over the full extent
    pub fn read_bands<T: GdalType + Copy>(&self, bands: &[usize]) -> StackResult<RasterGrid<T>> {
        let spec = self.grid_spec()?;
        let window = Window {
            row_off: 0,
            col_off: 0,
            height: spec.height,
            width: spec.width,
        };
        let arrays = bands
            .iter()
            .map(|&b| self.read_window::<T>(b, window))
            .collect::<StackResult<Vec<_>>>()?;
        let views: Vec<_> = arrays.iter().map(|a| a.view()).collect();
        let data = ndarray::stack(Axis(0), &views)
            .map_err(|e| StackError::InvalidFormat(format!("Failed to stack bands: {}", e)))?;

        Ok(RasterGrid {
            data,
            transform: spec.transform,
            crs_wkt: spec.crs_wkt,
            nodata: self.nodata()?,
        })
    }

    pub fn read_all<T: GdalType + Copy>(&self) -> StackResult<RasterGrid<T>> {
        let bands: Vec<usize> = (1..=self.band_count()).collect();
        self.read_bands(&bands)
    }
}

/// Write a multi-band raster as GeoTIFF.
///
/// The file is created under a temporary sibling name and renamed into
/// place only after every band was written and the dataset closed.
pub fn write_geotiff<T: GdalType + Copy + NumCast, P: AsRef<Path>>(raster: &RasterGrid<T>, output_path: P) -> StackResult<()> {
    let output_path = output_path.as_ref();
    log::info!("Saving GeoTIFF: {}", output_path.display());

    if let Some(nodata) = raster.nodata {
        if <T as NumCast>::from(nodata).is_none() {
            return Err(StackError::InvalidFormat(format!(
                "nodata {} does not fit the element type of {}",
                nodata,
                output_path.display()
            )));
        }
    }

    let parent = match output_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let temp_path = tempfile::Builder::new()
        .prefix(".partial-")
        .suffix(".tif")
        .tempfile_in(&parent)?
        .into_temp_path();

    {
        let (bands, height, width) = raster.data.dim();
        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let mut dataset = driver.create_with_band_type::<T, _>(
            &*temp_path,
            width as isize,
            height as isize,
            bands as isize,
        )?;
        dataset.set_geo_transform(&raster.transform.to_gdal())?;
        if !raster.crs_wkt.is_empty() {
            dataset.set_projection(&raster.crs_wkt)?;
        }

        for (i, band) in raster.data.axis_iter(Axis(0)).enumerate() {
            let mut rasterband = dataset.rasterband(i as isize + 1)?;
            let buffer = Buffer::new((width, height), band.iter().copied().collect());
            rasterband.write((0, 0), (width, height), &buffer)?;
            rasterband.set_no_data_value(raster.nodata)?;
        }
        // Dataset is flushed and closed here
    }

    temp_path.persist(output_path).map_err(|e| StackError::Io(e.error))?;
    log::debug!("GeoTIFF saved: {}", output_path.display());
    Ok(())
}

/// Write f64 values as `data_type`, saturating into the target range
pub fn write_geotiff_as<P: AsRef<Path>>(
    raster: &RasterGrid<f64>,
    data_type: GdalDataType,
    output_path: P,
) -> StackResult<()> {
    match data_type {
        GdalDataType::UInt8 => write_geotiff(&cast_raster::<u8>(raster), output_path),
        GdalDataType::UInt16 => write_geotiff(&cast_raster::<u16>(raster), output_path),
        GdalDataType::Int16 => write_geotiff(&cast_raster::<i16>(raster), output_path),
        GdalDataType::UInt32 => write_geotiff(&cast_raster::<u32>(raster), output_path),
        GdalDataType::Int32 => write_geotiff(&cast_raster::<i32>(raster), output_path),
        GdalDataType::Float32 => write_geotiff(&cast_raster::<f32>(raster), output_path),
        GdalDataType::Float64 => write_geotiff(raster, output_path),
        other => Err(StackError::InvalidFormat(format!(
            "Unsupported output data type {:?}",
            other
        ))),
    }
}

/// Convert element type, rounding and clamping to the target's range
pub fn cast_raster<T>(raster: &RasterGrid<f64>) -> RasterGrid<T>
where
    T: NumCast + num_traits::Bounded + ToPrimitive + Copy,
{
    let min = T::min_value().to_f64().unwrap_or(f64::MIN);
    let max = T::max_value().to_f64().unwrap_or(f64::MAX);
    let integral = <T as NumCast>::from(0.5f64).and_then(|v| v.to_f64()) != Some(0.5);

    let data: Array3<T> = raster.data.mapv(|v| {
        if v.is_nan() {
            // Integers have no NaN; floats keep it
            return <T as NumCast>::from(if integral { 0.0 } else { v }).unwrap_or_else(T::min_value);
        }
        let v = if integral { v.round() } else { v };
        <T as NumCast>::from(v.clamp(min, max)).unwrap_or_else(T::min_value)
    });

    RasterGrid {
        data,
        transform: raster.transform,
        crs_wkt: raster.crs_wkt.clone(),
        nodata: raster.nodata,
    }
}
