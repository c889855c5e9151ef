//! Crop single-band rasters to an area of interest
//!
//! The output window is derived only from the intersection of the raster
//! bounds with the AOI bounds, snapped outwards to the raster's pixel grid.
//! Rasters sharing pixel size and grid phase therefore crop to identical
//! windows against the same AOI, whatever their original size or origin.

use crate::io::aoi::AreaOfInterest;
use crate::io::geotiff::{RasterSource, Window};
use crate::types::{Bounds, GridSpec, RasterGrid, StackError, StackResult};
use gdal::raster::GdalType;
use ndarray::Array2;
use num_traits::NumCast;
use std::path::Path;

// Tolerance (in pixels) for floating-point noise when snapping to the grid
const SNAP_EPSILON: f64 = 1e-6;

/// Crops rasters against one area of interest
pub struct SpatialCropper<'a> {
    aoi: &'a AreaOfInterest,
}

impl<'a> SpatialCropper<'a> {
    pub fn new(aoi: &'a AreaOfInterest) -> Self {
        Self { aoi }
    }

    /// Pixel window covering `aoi_bounds ∩ grid bounds`, snapped outward
    pub fn crop_window(grid: &GridSpec, aoi_bounds: &Bounds) -> Option<Window> {
        let overlap = grid.bounds().intersection(aoi_bounds)?;
        let gt = &grid.transform;

        let col_start = (overlap.min_x - gt.top_left_x) / gt.pixel_width;
        let col_end = (overlap.max_x - gt.top_left_x) / gt.pixel_width;
        let row_start = (overlap.max_y - gt.top_left_y) / gt.pixel_height;
        let row_end = (overlap.min_y - gt.top_left_y) / gt.pixel_height;

        let col_off = (col_start + SNAP_EPSILON).floor().max(0.0) as usize;
        let row_off = (row_start + SNAP_EPSILON).floor().max(0.0) as usize;
        let col_stop = ((col_end - SNAP_EPSILON).ceil().max(0.0) as usize).min(grid.width);
        let row_stop = ((row_end - SNAP_EPSILON).ceil().max(0.0) as usize).min(grid.height);

        if col_stop <= col_off || row_stop <= row_off {
            return None;
        }

        Some(Window {
            row_off,
            col_off,
            height: row_stop - row_off,
            width: col_stop - col_off,
        })
    }

    /// Crop band 1 of `raster_path`; pixels outside the polygon become nodata
    /// (0 when the raster declares none).
    pub fn crop<T, P>(&self, raster_path: P) -> StackResult<RasterGrid<T>>
    where
        T: GdalType + Copy + NumCast,
        P: AsRef<Path>,
    {
        let raster_path = raster_path.as_ref();
        let source = RasterSource::open(raster_path)?;
        let grid = source.grid_spec()?;
        if !grid.transform.is_north_up() {
            return Err(StackError::InvalidFormat(format!(
                "{} is rotated or not north-up",
                raster_path.display()
            )));
        }

        let aoi = self.aoi.to_crs(&grid.crs_wkt)?;
        let window = aoi
            .bounds()
            .and_then(|b| Self::crop_window(&grid, &b))
            .ok_or_else(|| StackError::EmptyIntersection {
                raster: raster_path.to_path_buf(),
            })?;
        log::debug!("Cropping {} to window {:?}", raster_path.display(), window);

        let mut pixels: Array2<T> = source.read_window(1, window)?;
        let nodata = source.nodata()?;
        let fill: T = <T as NumCast>::from(nodata.unwrap_or(0.0)).ok_or_else(|| {
            StackError::InvalidFormat(format!(
                "nodata {:?} of {} is not representable in the requested element type",
                nodata,
                raster_path.display()
            ))
        })?;

        let transform = grid.transform.shifted(window.row_off, window.col_off);
        let mut masked = 0usize;
        for ((row, col), value) in pixels.indexed_iter_mut() {
            let (x, y) = transform.pixel_center(row, col);
            if !aoi.contains(x, y) {
                *value = fill;
                masked += 1;
            }
        }
        if masked == pixels.len() {
            log::warn!("All pixels of {} fall outside the AOI polygon", raster_path.display());
        }

        Ok(RasterGrid::from_band(pixels, transform, grid.crs_wkt, nodata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoTransform;

    fn grid(x0: f64, y0: f64, width: usize, height: usize) -> GridSpec {
        GridSpec {
            width,
            height,
            transform: GeoTransform::from_gdal([x0, 30.0, 0.0, y0, 0.0, -30.0]),
            crs_wkt: String::new(),
        }
    }

    #[test]
    fn test_window_snaps_outward() {
        let g = grid(0.0, 300.0, 10, 10);
        let aoi = Bounds { min_x: 40.0, min_y: 100.0, max_x: 100.0, max_y: 250.0 };
        let w = SpatialCropper::crop_window(&g, &aoi).unwrap();
        // cols 40/30=1.33 -> 1 .. 100/30=3.33 -> 4 ; rows 50/30=1.67 -> 1 .. 200/30=6.67 -> 7
        assert_eq!(w, Window { row_off: 1, col_off: 1, height: 6, width: 3 });
    }

    #[test]
    fn test_window_clamped_to_raster() {
        let g = grid(0.0, 300.0, 10, 10);
        let aoi = Bounds { min_x: -100.0, min_y: -100.0, max_x: 1000.0, max_y: 1000.0 };
        let w = SpatialCropper::crop_window(&g, &aoi).unwrap();
        assert_eq!(w, Window { row_off: 0, col_off: 0, height: 10, width: 10 });
    }

    #[test]
    fn test_no_overlap() {
        let g = grid(0.0, 300.0, 10, 10);
        let aoi = Bounds { min_x: 400.0, min_y: 0.0, max_x: 500.0, max_y: 100.0 };
        assert!(SpatialCropper::crop_window(&g, &aoi).is_none());
    }

    #[test]
    fn test_same_aoi_same_window_size_across_origins() {
        let aoi = Bounds { min_x: 610.0, min_y: 1205.0, max_x: 1490.0, max_y: 1800.0 };
        // Same 30 m grid phase, different origins and sizes
        let a = grid(0.0, 3000.0, 100, 100);
        let b = grid(300.0, 2400.0, 60, 50);
        let c = grid(-600.0, 6000.0, 200, 220);

        let wa = SpatialCropper::crop_window(&a, &aoi).unwrap();
        let wb = SpatialCropper::crop_window(&b, &aoi).unwrap();
        let wc = SpatialCropper::crop_window(&c, &aoi).unwrap();
        assert_eq!((wa.height, wa.width), (wb.height, wb.width));
        assert_eq!((wa.height, wa.width), (wc.height, wc.width));

        // And they describe the same ground footprint
        let ta = a.transform.shifted(wa.row_off, wa.col_off);
        let tb = b.transform.shifted(wb.row_off, wb.col_off);
        assert!(ta.approx_eq(&tb));
    }
}
