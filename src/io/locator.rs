use crate::core::sensor::SensorProfile;
use crate::types::{AcquisitionDate, StackError, StackResult};
use chrono::NaiveDate;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Extracts the acquisition date from a scene file name.
///
/// The pattern must contain a named `date` capture group whose text is
/// parsed with the chrono `format`.
#[derive(Debug, Clone)]
pub struct DateParser {
    pattern: Regex,
    format: String,
}

impl DateParser {
    pub fn new(pattern: &str, format: &str) -> StackResult<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| StackError::InvalidFormat(format!("Invalid date pattern: {}", e)))?;
        if !pattern.capture_names().any(|name| name == Some("date")) {
            return Err(StackError::InvalidFormat(format!(
                "Date pattern '{}' has no named 'date' group",
                pattern.as_str()
            )));
        }
        Ok(Self {
            pattern,
            format: format.to_string(),
        })
    }

    /// Landsat Collection 2 product identifiers:
    /// `LC08_L2SP_190025_20220615_20220627_02_T1_SR_B2.TIF`
    pub fn landsat_collection2() -> Self {
        Self::new(r"^L[COTEM]0\d_L\w{3}_\d{6}_(?P<date>\d{8})_", "%Y%m%d")
            .expect("Landsat date pattern is valid")
    }

    pub fn parse(&self, filename: &str) -> StackResult<AcquisitionDate> {
        let captures = self.pattern.captures(filename).ok_or_else(|| StackError::DateParse {
            filename: filename.to_string(),
            reason: format!("does not match '{}'", self.pattern.as_str()),
        })?;
        let text = captures
            .name("date")
            .map(|m| m.as_str())
            .ok_or_else(|| StackError::DateParse {
                filename: filename.to_string(),
                reason: "date group did not match".to_string(),
            })?;
        NaiveDate::parse_from_str(text, &self.format).map_err(|e| StackError::DateParse {
            filename: filename.to_string(),
            reason: format!("'{}' is not a {} date: {}", text, self.format, e),
        })
    }
}

impl Default for DateParser {
    fn default() -> Self {
        Self::landsat_collection2()
    }
}

/// Acquisition dates of one band, chronologically ordered by construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandDates {
    pub band: String,
    pub dates: BTreeMap<AcquisitionDate, PathBuf>,
}

impl BandDates {
    pub fn sorted_dates(&self) -> Vec<AcquisitionDate> {
        self.dates.keys().copied().collect()
    }
}

/// band -> acquisition date -> file, bands kept in profile order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BandIndex {
    pub bands: Vec<BandDates>,
}

impl BandIndex {
    pub fn get(&self, band: &str) -> Option<&BandDates> {
        self.bands.iter().find(|b| b.band == band)
    }
}

/// Finds every required band file in every extracted scene directory
pub struct BandLocator {
    date_parser: DateParser,
}

impl BandLocator {
    pub fn new(date_parser: DateParser) -> Self {
        Self { date_parser }
    }

    /// Build the band/date index for the profile's required bands
    pub fn locate(&self, profile: &SensorProfile, scene_dirs: &[PathBuf]) -> StackResult<BandIndex> {
        log::info!("Selecting bands to keep...");
        log::debug!("{} requires bands {:?}", profile.sensor, profile.required_bands());

        let mut index = BandIndex::default();
        for band in profile.required_bands() {
            let mut dates = BTreeMap::new();
            for dir in scene_dirs {
                let path = Self::find_band_file(band, dir)?;
                let filename = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default()
                    .to_string();
                let date = self.date_parser.parse(&filename)?;
                log::debug!("{} {} -> {}", band, date, path.display());

                if let Some(previous) = dates.insert(date, path.clone()) {
                    return Err(StackError::AmbiguousMatch {
                        band: format!("{} on {}", band, date),
                        candidates: vec![previous, path],
                    });
                }
            }
            index.bands.push(BandDates {
                band: band.to_string(),
                dates,
            });
        }
        Ok(index)
    }

    /// The single file in `dir` named `*_<band>.TIF` (extension case-insensitive)
    pub fn find_band_file(band: &str, dir: &Path) -> StackResult<PathBuf> {
        let suffix = format!("_{}.tif", band.to_ascii_lowercase());
        let mut matches: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.to_ascii_lowercase().ends_with(&suffix))
                    .unwrap_or(false)
            })
            .collect();
        matches.sort();

        match matches.len() {
            0 => Err(StackError::BandNotFound {
                band: band.to_string(),
                directory: dir.to_path_buf(),
            }),
            1 => Ok(matches.remove(0)),
            _ => Err(StackError::AmbiguousMatch {
                band: band.to_string(),
                candidates: matches,
            }),
        }
    }
}

impl Default for BandLocator {
    fn default() -> Self {
        Self::new(DateParser::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sensor::Sensor;
    use tempfile::TempDir;

    const L8_NAMES: [&str; 7] = ["SR_B2", "SR_B3", "SR_B4", "SR_B5", "SR_B6", "SR_B7", "ST_CDIST"];

    fn make_scene(root: &Path, date: &str, bands: &[&str]) -> PathBuf {
        let dir = root.join(format!("LC08_L2SP_190025_{}", date));
        fs::create_dir_all(&dir).unwrap();
        for band in bands {
            let name = format!("LC08_L2SP_190025_{}_20220627_02_T1_{}.TIF", date, band);
            fs::write(dir.join(name), b"").unwrap();
        }
        fs::write(dir.join(format!("LC08_L2SP_190025_{}_20220627_02_T1_MTL.txt", date)), b"").unwrap();
        dir
    }

    #[test]
    fn test_landsat_date_parsing() {
        let parser = DateParser::landsat_collection2();
        let date = parser
            .parse("LC08_L2SP_190025_20220615_20220627_02_T1_SR_B2.TIF")
            .unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2022, 6, 15).unwrap());

        let tm = parser.parse("LT05_L2SP_190025_19990704_20200907_02_T1_SR_B1.TIF").unwrap();
        assert_eq!(tm, NaiveDate::from_ymd_opt(1999, 7, 4).unwrap());

        assert!(matches!(parser.parse("random.TIF"), Err(StackError::DateParse { .. })));
        assert!(parser.parse("LC08_L2SP_190025_20221345_20220627_02_T1_SR_B2.TIF").is_err());
    }

    #[test]
    fn test_parser_requires_date_group() {
        assert!(DateParser::new(r"(\d{8})", "%Y%m%d").is_err());
        assert!(DateParser::new(r"(?P<date>\d{4}-\d{2}-\d{2})", "%Y-%m-%d").is_ok());
    }

    #[test]
    fn test_optional_date_group_without_match() {
        let parser = DateParser::new(r"^scene_(?P<date>\d{8})?", "%Y%m%d").unwrap();
        assert_eq!(
            parser.parse("scene_20200101.tif").unwrap(),
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
        );
        assert!(matches!(
            parser.parse("scene_undated.tif"),
            Err(StackError::DateParse { .. })
        ));
    }

    #[test]
    fn test_locate_builds_index() {
        let dir = TempDir::new().unwrap();
        let scenes = vec![
            make_scene(dir.path(), "20220701", &L8_NAMES),
            make_scene(dir.path(), "20220615", &L8_NAMES),
        ];
        let profile = Sensor::Landsat8.profile().unwrap();
        let index = BandLocator::default().locate(&profile, &scenes).unwrap();

        assert_eq!(index.bands.len(), 7);
        assert_eq!(index.bands[0].band, "B2");
        let cdist = index.get("CDIST").unwrap();
        assert_eq!(
            cdist.sorted_dates(),
            vec![
                NaiveDate::from_ymd_opt(2022, 6, 15).unwrap(),
                NaiveDate::from_ymd_opt(2022, 7, 1).unwrap()
            ]
        );
        assert!(cdist.dates.values().all(|p| p.to_string_lossy().ends_with("ST_CDIST.TIF")));
    }

    #[test]
    fn test_missing_band_names_band_and_directory() {
        let dir = TempDir::new().unwrap();
        let scene = make_scene(dir.path(), "20220615", &L8_NAMES[..6]);
        let profile = Sensor::Landsat8.profile().unwrap();

        match BandLocator::default().locate(&profile, &[scene.clone()]) {
            Err(StackError::BandNotFound { band, directory }) => {
                assert_eq!(band, "CDIST");
                assert_eq!(directory, scene);
            }
            other => panic!("expected BandNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_band_file_is_ambiguous() {
        let dir = TempDir::new().unwrap();
        let scene = make_scene(dir.path(), "20220615", &L8_NAMES);
        fs::write(scene.join("copy_of_SR_B2.TIF"), b"").unwrap();

        let result = BandLocator::find_band_file("B2", &scene);
        match result {
            Err(StackError::AmbiguousMatch { candidates, .. }) => assert_eq!(candidates.len(), 2),
            other => panic!("expected AmbiguousMatch, got {:?}", other),
        }
    }

    #[test]
    fn test_same_date_twice_is_ambiguous() {
        let dir = TempDir::new().unwrap();
        let first = make_scene(dir.path(), "20220615", &L8_NAMES);
        let second = dir.path().join("other_tile");
        fs::create_dir_all(&second).unwrap();
        for band in L8_NAMES {
            let name = format!("LC08_L2SP_189025_20220615_20220627_02_T1_{}.TIF", band);
            fs::write(second.join(name), b"").unwrap();
        }
        let parser = DateParser::new(r"^LC08_L2SP_\d{6}_(?P<date>\d{8})_", "%Y%m%d").unwrap();
        let profile = Sensor::Landsat8.profile().unwrap();

        let result = BandLocator::new(parser).locate(&profile, &[first, second]);
        assert!(matches!(result, Err(StackError::AmbiguousMatch { .. })));
    }

    #[test]
    fn test_b1_does_not_match_b10() {
        let dir = TempDir::new().unwrap();
        let scene = dir.path().join("scene");
        fs::create_dir_all(&scene).unwrap();
        fs::write(scene.join("LT05_L2SP_190025_19990704_20200907_02_T1_SR_B10.TIF"), b"").unwrap();

        assert!(matches!(
            BandLocator::find_band_file("B1", &scene),
            Err(StackError::BandNotFound { .. })
        ));
    }
}
