use crate::types::{AcquisitionDate, StackError, StackResult};
use chrono::NaiveDate;
use std::fs;
use std::io::Write;
use std::path::Path;

const DATE_FORMAT: &str = "%Y%m%d";

/// Plain-text list of stacked acquisition dates, one per line, in band order
pub struct AcquisitionLog;

impl AcquisitionLog {
    /// Replace `path` with the given dates (written to a temporary file first)
    pub fn write<P: AsRef<Path>>(path: P, dates: &[AcquisitionDate]) -> StackResult<()> {
        let path = path.as_ref();
        log::info!("Writing {} acquisition dates to {}", dates.len(), path.display());

        let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        for date in dates {
            writeln!(file, "{}", date.format(DATE_FORMAT))?;
        }
        file.flush()?;
        file.persist(path).map_err(|e| StackError::Io(e.error))?;
        Ok(())
    }

    pub fn read<P: AsRef<Path>>(path: P) -> StackResult<Vec<AcquisitionDate>> {
        let path = path.as_ref();
        fs::read_to_string(path)?
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                NaiveDate::parse_from_str(line, DATE_FORMAT).map_err(|e| StackError::DateParse {
                    filename: path.display().to_string(),
                    reason: format!("'{}': {}", line, e),
                })
            })
            .collect()
    }
}
