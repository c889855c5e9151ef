//! Sensor profile registry
//!
//! Closed set of sensors with their required band codes and tasseled-cap
//! coefficients. Unknown sensors, and known sensors without a published
//! transform, are rejected when the profile is requested.

use crate::types::{StackError, StackResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of reflectance bands used by every registered transform
pub const REFLECTANCE_BAND_COUNT: usize = 6;

/// Supported sensor identifiers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sensor {
    Landsat5,
    Landsat7,
    #[default]
    Landsat8,
    Sentinel2,
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sensor::Landsat5 => write!(f, "Landsat5"),
            Sensor::Landsat7 => write!(f, "Landsat7"),
            Sensor::Landsat8 => write!(f, "Landsat8"),
            Sensor::Sentinel2 => write!(f, "Sentinel2"),
        }
    }
}

impl FromStr for Sensor {
    type Err = StackError;

    fn from_str(s: &str) -> StackResult<Self> {
        match s.trim().to_ascii_lowercase().replace(['-', '_', ' '], "").as_str() {
            "landsat5" | "l5" | "lt05" => Ok(Sensor::Landsat5),
            "landsat7" | "l7" | "le07" => Ok(Sensor::Landsat7),
            "landsat8" | "l8" | "lc08" => Ok(Sensor::Landsat8),
            "sentinel2" | "s2" => Ok(Sensor::Sentinel2),
            _ => Err(StackError::UnsupportedSensor(s.to_string())),
        }
    }
}

/// Brightness, greenness and wetness weights, one per reflectance band
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TasseledCapCoefficients {
    pub brightness: [f64; REFLECTANCE_BAND_COUNT],
    pub greenness: [f64; REFLECTANCE_BAND_COUNT],
    pub wetness: [f64; REFLECTANCE_BAND_COUNT],
}

impl TasseledCapCoefficients {
    pub fn components(&self) -> [&[f64; REFLECTANCE_BAND_COUNT]; 3] {
        [&self.brightness, &self.greenness, &self.wetness]
    }
}

/// Zero-based positions of the bands feeding the normalized-difference indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BandRoles {
    pub red: usize,
    pub nir: usize,
    pub swir1: usize,
    pub swir2: usize,
}

impl BandRoles {
    /// (a, b) pairs for NDVI, NDII and NBR2, in output order
    pub fn index_pairs(&self) -> [(&'static str, usize, usize); 3] {
        [
            ("NDVI", self.nir, self.red),
            ("NDII", self.nir, self.swir1),
            ("NBR2", self.swir1, self.swir2),
        ]
    }
}

/// Everything the pipeline needs to know about one sensor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorProfile {
    pub sensor: Sensor,
    /// Reflectance band codes, in composite band order
    pub reflectance_bands: &'static [&'static str],
    /// Bands stacked alongside reflectance without a tasseled-cap weight
    pub auxiliary_bands: &'static [&'static str],
    pub tasseled_cap: TasseledCapCoefficients,
    pub roles: BandRoles,
}

impl SensorProfile {
    /// All band codes the locator must find in every scene.
    ///
    /// Reflectance bands followed by auxiliary bands. Only the reflectance
    /// part lines up with the tasseled-cap coefficient vectors.
    pub fn required_bands(&self) -> Vec<&'static str> {
        self.reflectance_bands
            .iter()
            .chain(self.auxiliary_bands.iter())
            .copied()
            .collect()
    }
}

const TM_ETM_BANDS: [&str; REFLECTANCE_BAND_COUNT] = ["B1", "B2", "B3", "B4", "B5", "B7"];
const OLI_BANDS: [&str; REFLECTANCE_BAND_COUNT] = ["B2", "B3", "B4", "B5", "B6", "B7"];
const AUXILIARY_BANDS: [&str; 1] = ["CDIST"];

// Blue, green, red, NIR, SWIR1, SWIR2 for both band sets
const LANDSAT_ROLES: BandRoles = BandRoles {
    red: 2,
    nir: 3,
    swir1: 4,
    swir2: 5,
};

// Crist & Cicone 1984, doi.org/10.1109/TGRS.1984.350619
const TM_TASSELED_CAP: TasseledCapCoefficients = TasseledCapCoefficients {
    brightness: [0.3037, 0.2793, 0.4743, 0.5585, 0.5082, 0.1863],
    greenness: [-0.2848, -0.2435, -0.5463, 0.7243, 0.0840, -0.1800],
    wetness: [0.1509, 0.1973, 0.3279, 0.3407, -0.7112, -0.4572],
};

// Baig et al. 2014, doi.org/10.1080/2150704X.2014.915434
const OLI_TASSELED_CAP: TasseledCapCoefficients = TasseledCapCoefficients {
    brightness: [0.3029, 0.2786, 0.4733, 0.5599, 0.5080, 0.1872],
    greenness: [-0.2941, -0.2430, -0.5424, 0.7276, 0.0713, -0.1608],
    wetness: [0.1511, 0.1973, 0.3283, 0.3407, -0.7117, -0.4559],
};

impl Sensor {
    pub const ALL: [Sensor; 4] = [
        Sensor::Landsat5,
        Sensor::Landsat7,
        Sensor::Landsat8,
        Sensor::Sentinel2,
    ];

    /// Look up the registered profile; sensors without one are a hard error
    pub fn profile(self) -> StackResult<SensorProfile> {
        let (reflectance_bands, tasseled_cap): (&'static [&'static str], _) = match self {
            Sensor::Landsat5 | Sensor::Landsat7 => (&TM_ETM_BANDS, TM_TASSELED_CAP),
            Sensor::Landsat8 => (&OLI_BANDS, OLI_TASSELED_CAP),
            Sensor::Sentinel2 => {
                return Err(StackError::UnsupportedSensor(format!(
                    "{} has no registered band list or tasseled-cap coefficients",
                    self
                )))
            }
        };

        Ok(SensorProfile {
            sensor: self,
            reflectance_bands,
            auxiliary_bands: &AUXILIARY_BANDS,
            tasseled_cap,
            roles: LANDSAT_ROLES,
        })
    }
}

/// Parse a sensor name and resolve its profile in one step
pub fn resolve_profile(name: &str) -> StackResult<SensorProfile> {
    let sensor: Sensor = name.parse()?;
    log::debug!("Resolved sensor '{}' as {}", name, sensor);
    sensor.profile()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_count_matches_coefficients() {
        for sensor in Sensor::ALL {
            if let Ok(profile) = sensor.profile() {
                // Auxiliary bands are located and stacked but carry no weights
                assert_eq!(
                    profile.required_bands().len(),
                    profile.reflectance_bands.len() + profile.auxiliary_bands.len()
                );
                for component in profile.tasseled_cap.components() {
                    assert_eq!(profile.reflectance_bands.len(), component.len(), "{}", sensor);
                }
                let roles = profile.roles;
                for idx in [roles.red, roles.nir, roles.swir1, roles.swir2] {
                    assert!(idx < profile.reflectance_bands.len());
                }
            }
        }
    }

    #[test]
    fn test_sentinel2_is_unsupported() {
        assert!(matches!(
            Sensor::Sentinel2.profile(),
            Err(StackError::UnsupportedSensor(_))
        ));
        assert!(matches!(
            resolve_profile("Sentinel2"),
            Err(StackError::UnsupportedSensor(_))
        ));
    }

    #[test]
    fn test_sensor_parsing() {
        assert_eq!("Landsat8".parse::<Sensor>().unwrap(), Sensor::Landsat8);
        assert_eq!("landsat-7".parse::<Sensor>().unwrap(), Sensor::Landsat7);
        assert_eq!("LT05".parse::<Sensor>().unwrap(), Sensor::Landsat5);
        assert!("MODIS".parse::<Sensor>().is_err());
        assert_eq!(Sensor::default(), Sensor::Landsat8);
    }

    #[test]
    fn test_required_bands_include_cdist() {
        let profile = Sensor::Landsat8.profile().unwrap();
        assert_eq!(
            profile.required_bands(),
            vec!["B2", "B3", "B4", "B5", "B6", "B7", "CDIST"]
        );

        let tm = Sensor::Landsat5.profile().unwrap();
        assert_eq!(tm.reflectance_bands, Sensor::Landsat7.profile().unwrap().reflectance_bands);
        assert!(!tm.reflectance_bands.contains(&"B6"));
    }

    #[test]
    fn test_index_pairs() {
        let pairs = Sensor::Landsat8.profile().unwrap().roles.index_pairs();
        assert_eq!(pairs[0], ("NDVI", 3, 2));
        assert_eq!(pairs[1], ("NDII", 3, 4));
        assert_eq!(pairs[2], ("NBR2", 4, 5));
    }
}
