use crate::types::{Bounds, StackError, StackResult};
use gdal::spatial_ref::{CoordTransform, SpatialRef};
use gdal::vector::LayerAccess;
use gdal::Dataset;
use geo::{BoundingRect, Contains, Coord, LineString, MultiPolygon, Point, Polygon};
use std::path::Path;

/// Which variant of the area of interest a polygon represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AoiKind {
    /// Buffered outline, more permissive, used while preprocessing
    Buffered,
    /// Exact outline used for final outputs
    Unbuffered,
}

/// Area-of-interest polygon with its coordinate reference system
#[derive(Debug, Clone)]
pub struct AreaOfInterest {
    pub geometry: MultiPolygon<f64>,
    /// CRS as WKT
    pub crs_wkt: String,
    pub kind: AoiKind,
}

/// Spatial reference with x=easting/longitude, y=northing/latitude
fn traditional_srs(wkt: &str) -> StackResult<SpatialRef> {
    let srs = SpatialRef::from_wkt(wkt)?;
    srs.set_axis_mapping_strategy(gdal_sys::OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER);
    Ok(srs)
}

impl AreaOfInterest {
    pub fn new(geometry: MultiPolygon<f64>, crs_wkt: String, kind: AoiKind) -> Self {
        Self { geometry, crs_wkt, kind }
    }

    /// Read every polygon of the first layer of a vector file (shapefile,
    /// GeoPackage, GeoJSON, ...) into one multi-polygon.
    pub fn open<P: AsRef<Path>>(path: P, kind: AoiKind) -> StackResult<Self> {
        let path = path.as_ref();
        log::info!("Reading {:?} area of interest from: {}", kind, path.display());

        let dataset = Dataset::open(path)?;
        let mut layer = dataset.layer(0)?;
        let srs = layer.spatial_ref().ok_or_else(|| {
            StackError::Crs(format!("{} declares no coordinate reference system", path.display()))
        })?;
        let crs_wkt = srs.to_wkt()?;

        let mut polygons = Vec::new();
        for feature in layer.features() {
            let Some(geometry) = feature.geometry() else {
                continue;
            };
            match geometry.to_geo()? {
                geo::Geometry::Polygon(p) => polygons.push(p),
                geo::Geometry::MultiPolygon(mp) => polygons.extend(mp.0),
                other => log::warn!("Ignoring non-polygon AOI geometry: {:?}", other),
            }
        }

        if polygons.is_empty() {
            return Err(StackError::InvalidFormat(format!(
                "{} contains no polygon features",
                path.display()
            )));
        }
        log::debug!("AOI has {} polygon(s)", polygons.len());

        Ok(Self::new(MultiPolygon(polygons), crs_wkt, kind))
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.geometry.bounding_rect().map(|r| Bounds {
            min_x: r.min().x,
            min_y: r.min().y,
            max_x: r.max().x,
            max_y: r.max().y,
        })
    }

    /// True when the point lies strictly inside the polygon
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.geometry.contains(&Point::new(x, y))
    }

    /// Express the polygon in `target_wkt`, reprojecting when the CRS differ
    pub fn to_crs(&self, target_wkt: &str) -> StackResult<AreaOfInterest> {
        if self.crs_wkt.is_empty() || target_wkt.is_empty() {
            return Err(StackError::Crs(
                "area of interest and raster must both declare a coordinate reference system"
                    .to_string(),
            ));
        }

        let source = traditional_srs(&self.crs_wkt)?;
        let target = traditional_srs(target_wkt)?;
        if source == target {
            return Ok(self.clone());
        }

        log::debug!("Reprojecting AOI to raster CRS");
        let transform = CoordTransform::new(&source, &target)?;
        let polygons = self
            .geometry
            .0
            .iter()
            .map(|polygon| reproject_polygon(polygon, &transform))
            .collect::<StackResult<Vec<_>>>()?;

        Ok(AreaOfInterest {
            geometry: MultiPolygon(polygons),
            crs_wkt: target_wkt.to_string(),
            kind: self.kind,
        })
    }
}

fn reproject_ring(ring: &LineString<f64>, transform: &CoordTransform) -> StackResult<LineString<f64>> {
    let mut xs: Vec<f64> = ring.0.iter().map(|c| c.x).collect();
    let mut ys: Vec<f64> = ring.0.iter().map(|c| c.y).collect();
    let mut zs = vec![0.0; xs.len()];
    transform
        .transform_coords(&mut xs, &mut ys, &mut zs)
        .map_err(|e| StackError::Crs(format!("AOI reprojection failed: {}", e)))?;
    Ok(LineString(
        xs.into_iter().zip(ys).map(|(x, y)| Coord { x, y }).collect(),
    ))
}

fn reproject_polygon(polygon: &Polygon<f64>, transform: &CoordTransform) -> StackResult<Polygon<f64>> {
    let exterior = reproject_ring(polygon.exterior(), transform)?;
    let interiors = polygon
        .interiors()
        .iter()
        .map(|ring| reproject_ring(ring, transform))
        .collect::<StackResult<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}
