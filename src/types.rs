use chrono::NaiveDate;
use ndarray::{Array2, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Acquisition date of a scene (calendar date, no time of day)
pub type AcquisitionDate = NaiveDate;

/// Encoded value of the enriched composite
pub type Encoded = i16;

/// Geospatial transformation parameters (GDAL ordering)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    /// North-up grids only; rotated grids are rejected by the cropper
    pub fn is_north_up(&self) -> bool {
        self.rotation_x == 0.0 && self.rotation_y == 0.0 && self.pixel_height < 0.0
    }

    /// World coordinates of the centre of pixel (row, col)
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.top_left_x + (col as f64 + 0.5) * self.pixel_width,
            self.top_left_y + (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// Transform of a sub-window starting at (row_off, col_off)
    pub fn shifted(&self, row_off: usize, col_off: usize) -> Self {
        Self {
            top_left_x: self.top_left_x + col_off as f64 * self.pixel_width,
            top_left_y: self.top_left_y + row_off as f64 * self.pixel_height,
            ..*self
        }
    }

    /// Equality up to a small fraction of a pixel
    pub fn approx_eq(&self, other: &GeoTransform) -> bool {
        let tol = 1e-6 * self.pixel_width.abs().max(self.pixel_height.abs()).max(1e-12);
        self.to_gdal()
            .iter()
            .zip(other.to_gdal().iter())
            .all(|(a, b)| (a - b).abs() <= tol)
    }
}

/// Projected bounds of a grid or geometry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn intersection(&self, other: &Bounds) -> Option<Bounds> {
        let b = Bounds {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        };
        if b.min_x < b.max_x && b.min_y < b.max_y {
            Some(b)
        } else {
            None
        }
    }
}

/// Spatial reference of a raster grid, independent of pixel values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    /// Coordinate reference system as WKT (empty when the source has none)
    pub crs_wkt: String,
}

impl GridSpec {
    pub fn bounds(&self) -> Bounds {
        let x0 = self.transform.top_left_x;
        let y0 = self.transform.top_left_y;
        let x1 = x0 + self.width as f64 * self.transform.pixel_width;
        let y1 = y0 + self.height as f64 * self.transform.pixel_height;
        Bounds {
            min_x: x0.min(x1),
            min_y: y0.min(y1),
            max_x: x0.max(x1),
            max_y: y0.max(y1),
        }
    }

    /// Same pixel dimensions and affine transform
    pub fn is_aligned_with(&self, other: &GridSpec) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.transform.approx_eq(&other.transform)
    }
}

/// Multi-band raster: pixel cube (band, row, col) plus geospatial metadata
#[derive(Debug, Clone)]
pub struct RasterGrid<T> {
    pub data: Array3<T>,
    pub transform: GeoTransform,
    pub crs_wkt: String,
    pub nodata: Option<f64>,
}

impl<T: Clone> RasterGrid<T> {
    /// Wrap a single band
    pub fn from_band(band: Array2<T>, transform: GeoTransform, crs_wkt: String, nodata: Option<f64>) -> Self {
        Self {
            data: band.insert_axis(Axis(0)),
            transform,
            crs_wkt,
            nodata,
        }
    }

    pub fn band_count(&self) -> usize {
        self.data.dim().0
    }

    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        let (_, rows, cols) = self.data.dim();
        (rows, cols)
    }

    /// 0-based band view
    pub fn band(&self, index: usize) -> ArrayView2<'_, T> {
        self.data.index_axis(Axis(0), index)
    }

    pub fn grid_spec(&self) -> GridSpec {
        let (height, width) = self.shape();
        GridSpec {
            width,
            height,
            transform: self.transform,
            crs_wkt: self.crs_wkt.clone(),
        }
    }
}

/// Error types for scene preprocessing and feature computation
#[derive(Debug, thiserror::Error)]
pub enum StackError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("Failed to extract archive {archive}: {reason}")]
    Extraction { archive: PathBuf, reason: String },

    #[error("Unsupported sensor: {0}")]
    UnsupportedSensor(String),

    #[error("Band {band} not found in {directory}")]
    BandNotFound { band: String, directory: PathBuf },

    #[error("Ambiguous match for band {band}: {candidates:?}")]
    AmbiguousMatch { band: String, candidates: Vec<PathBuf> },

    #[error("Grid mismatch for band {band} on {date}: expected {expected}, found {found}")]
    GridMismatch {
        band: String,
        date: String,
        expected: String,
        found: String,
    },

    #[error("Area of interest does not overlap raster {raster}")]
    EmptyIntersection { raster: PathBuf },

    #[error("Cannot parse acquisition date from {filename}: {reason}")]
    DateParse { filename: String, reason: String },

    #[error("Coordinate reference system error: {0}")]
    Crs(String),

    #[error("Reflectance scale mismatch: {0}")]
    ScaleMismatch(String),

    #[error("No acquisitions found for band {0}")]
    EmptyTimeSeries(String),

    #[error("Expected {expected} bands in {path}, found {found}")]
    BandCountMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),
}

/// Result type for preprocessing and feature operations
pub type StackResult<T> = Result<T, StackError>;
