//! Scene preprocessing pipeline
//!
//! Extract archives -> locate bands -> crop and stack per band ->
//! write the acquisition log -> delete the working directory.

use crate::core::sensor::{resolve_profile, SensorProfile};
use crate::core::stack::{TemporalStacker, DEFAULT_NAME_TEMPLATE};
use crate::io::acquisition_log::AcquisitionLog;
use crate::io::aoi::AreaOfInterest;
use crate::io::archive::ArchiveExtractor;
use crate::io::locator::{BandLocator, DateParser};
use crate::types::{AcquisitionDate, StackError, StackResult};
use std::path::{Path, PathBuf};

/// Preprocessing parameters
#[derive(Debug, Clone)]
pub struct PreprocessParams {
    /// Working directory created inside the imagery directory
    pub working_dir_name: String,
    pub acquisition_log_name: String,
    /// Output name with `{first}`, `{last}` and `{band}` placeholders
    pub name_template: String,
    /// Wipe and re-extract scene directories left incomplete by a previous run
    pub overwrite_partial: bool,
    pub date_parser: DateParser,
}

impl Default for PreprocessParams {
    fn default() -> Self {
        Self {
            working_dir_name: "temp".to_string(),
            acquisition_log_name: "acquisition_dates.txt".to_string(),
            name_template: DEFAULT_NAME_TEMPLATE.to_string(),
            overwrite_partial: false,
            date_parser: DateParser::default(),
        }
    }
}

/// What a successful run produced
#[derive(Debug, Clone)]
pub struct PreprocessSummary {
    pub dates: Vec<AcquisitionDate>,
    /// (band, output path) in profile order
    pub outputs: Vec<(String, PathBuf)>,
    pub acquisition_log: PathBuf,
}

pub struct Preprocessor {
    profile: SensorProfile,
    params: PreprocessParams,
}

impl Preprocessor {
    /// Unknown or unregistered sensors are rejected here, before any I/O
    pub fn new(sensor: &str, params: PreprocessParams) -> StackResult<Self> {
        Ok(Self {
            profile: resolve_profile(sensor)?,
            params,
        })
    }

    pub fn profile(&self) -> &SensorProfile {
        &self.profile
    }

    /// Run the whole pipeline over `imagery_dir`.
    ///
    /// Outputs land in `imagery_dir`. The working directory is removed only
    /// after every band and the log were written; any error leaves it in place.
    pub fn run<P: AsRef<Path>>(&self, imagery_dir: P, aoi: &AreaOfInterest) -> StackResult<PreprocessSummary> {
        let imagery_dir = imagery_dir.as_ref();
        log::info!("Preprocessing {} scenes in {}", self.profile.sensor, imagery_dir.display());

        let working_dir = ArchiveExtractor::new(imagery_dir, &self.params.working_dir_name)
            .overwrite_partial(self.params.overwrite_partial)
            .extract_all()?;
        let scene_dirs = working_dir.scene_dirs();
        if scene_dirs.is_empty() {
            return Err(StackError::EmptyTimeSeries(format!(
                "no scene archives in {}",
                imagery_dir.display()
            )));
        }

        let index = BandLocator::new(self.params.date_parser.clone()).locate(&self.profile, &scene_dirs)?;

        log::info!("Combining images...");
        let stacker = TemporalStacker::new(aoi);
        let mut dates: Option<Vec<AcquisitionDate>> = None;
        let mut stacks = Vec::with_capacity(index.bands.len());
        for band_dates in &index.bands {
            let series = stacker.stack_native(
                &band_dates.band,
                band_dates.dates.iter().map(|(d, p)| (*d, p.clone())),
            )?;

            match &dates {
                None => dates = Some(series.dates().to_vec()),
                Some(expected) if expected.as_slice() != series.dates() => {
                    return Err(StackError::GridMismatch {
                        band: band_dates.band.clone(),
                        date: "date list".to_string(),
                        expected: format!("{:?}", expected),
                        found: format!("{:?}", series.dates()),
                    });
                }
                Some(_) => {}
            }
            stacks.push(series);
        }

        // Nothing is persisted until every band stacked and validated
        let mut outputs = Vec::with_capacity(stacks.len());
        for series in &stacks {
            let path = series.write_to(imagery_dir, &self.params.name_template)?;
            log::info!("Band {} -> {}", series.band(), path.display());
            outputs.push((series.band().to_string(), path));
        }

        let dates = dates.unwrap_or_default();
        let acquisition_log = imagery_dir.join(&self.params.acquisition_log_name);
        AcquisitionLog::write(&acquisition_log, &dates)?;

        working_dir.cleanup()?;

        Ok(PreprocessSummary {
            dates,
            outputs,
            acquisition_log,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unregistered_sensor() {
        assert!(matches!(
            Preprocessor::new("Sentinel2", PreprocessParams::default()),
            Err(StackError::UnsupportedSensor(_))
        ));
        let pre = Preprocessor::new("L7", PreprocessParams::default()).unwrap();
        assert_eq!(pre.profile().required_bands().len(), 7);
    }

    #[test]
    fn test_default_params() {
        let params = PreprocessParams::default();
        assert_eq!(params.working_dir_name, "temp");
        assert_eq!(params.acquisition_log_name, "acquisition_dates.txt");
        assert!(!params.overwrite_partial);
    }
}
