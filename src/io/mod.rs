//! Filesystem-facing modules: archives, band discovery, AOI vectors, GeoTIFF, logs

pub mod archive;
pub mod locator;
pub mod aoi;
pub mod geotiff;
pub mod acquisition_log;

pub use archive::{ArchiveExtractor, ArchiveFormat, WorkingDir};
pub use locator::{BandIndex, BandLocator, DateParser};
pub use aoi::{AoiKind, AreaOfInterest};
pub use geotiff::{RasterSource, Window, write_geotiff};
pub use acquisition_log::AcquisitionLog;
