use crate::types::{StackError, StackResult};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Written into an extraction directory once unpacking finished
const COMPLETE_MARKER: &str = ".extracted";

/// Container formats the extractor understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Tar,
    TarGz,
    Zip,
}

impl ArchiveFormat {
    /// Detect the format from the file name
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else if name.ends_with(".tar") {
            Some(ArchiveFormat::Tar)
        } else if name.ends_with(".zip") {
            Some(ArchiveFormat::Zip)
        } else {
            None
        }
    }
}

/// One unpacked scene archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedScene {
    pub archive: PathBuf,
    pub directory: PathBuf,
}

/// Working directory holding every extracted scene of one run
#[derive(Debug, Clone)]
pub struct WorkingDir {
    pub root: PathBuf,
    pub scenes: Vec<ExtractedScene>,
}

impl WorkingDir {
    pub fn scene_dirs(&self) -> Vec<PathBuf> {
        self.scenes.iter().map(|s| s.directory.clone()).collect()
    }

    /// Recursively delete the working directory.
    ///
    /// Consumes the handle so it can only run once, after every output is
    /// persisted; on upstream failure callers simply never reach it.
    pub fn cleanup(self) -> StackResult<()> {
        log::info!("Cleaning up, deleting temporary folder {}...", self.root.display());
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
        }
        Ok(())
    }
}

/// Unpacks every scene archive of a directory into an isolated subdirectory
pub struct ArchiveExtractor {
    imagery_dir: PathBuf,
    working_dir_name: String,
    overwrite_partial: bool,
}

impl ArchiveExtractor {
    pub fn new<P: AsRef<Path>>(imagery_dir: P, working_dir_name: &str) -> Self {
        Self {
            imagery_dir: imagery_dir.as_ref().to_path_buf(),
            working_dir_name: working_dir_name.to_string(),
            overwrite_partial: false,
        }
    }

    /// Wipe and re-extract directories left half-written by an interrupted run
    pub fn overwrite_partial(mut self, enabled: bool) -> Self {
        self.overwrite_partial = enabled;
        self
    }

    pub fn working_dir(&self) -> PathBuf {
        self.imagery_dir.join(&self.working_dir_name)
    }

    /// Archives directly inside the imagery directory, sorted by path
    pub fn find_archives(&self) -> StackResult<Vec<PathBuf>> {
        let mut archives = Vec::new();
        for entry in fs::read_dir(&self.imagery_dir)? {
            let path = entry?.path();
            if path.is_file() && ArchiveFormat::from_path(&path).is_some() {
                archives.push(path);
            }
        }
        archives.sort();
        Ok(archives)
    }

    /// Extract all archives, reusing scenes a previous run already completed
    pub fn extract_all(&self) -> StackResult<WorkingDir> {
        log::info!("Extracting imagery archives...");
        let archives = self.find_archives()?;
        log::debug!("Found {} archives in {}", archives.len(), self.imagery_dir.display());

        let root = self.working_dir();
        if !root.is_dir() {
            fs::create_dir_all(&root)?;
            log::info!("Created temporary directory: {}", root.display());
        }

        let mut scenes = Vec::with_capacity(archives.len());
        for archive in archives {
            let directory = root.join(Self::scene_name(&archive)?);
            if scenes.iter().any(|s: &ExtractedScene| s.directory == directory) {
                return Err(StackError::Extraction {
                    archive,
                    reason: format!("another archive already maps to {}", directory.display()),
                });
            }
            self.extract_one(&archive, &directory)?;
            scenes.push(ExtractedScene { archive, directory });
        }

        Ok(WorkingDir { root, scenes })
    }

    /// Subdirectory name: file name up to the first '.'
    fn scene_name(archive: &Path) -> StackResult<String> {
        archive
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.split('.').next())
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .ok_or_else(|| StackError::Extraction {
                archive: archive.to_path_buf(),
                reason: "archive name has no usable stem".to_string(),
            })
    }

    fn extract_one(&self, archive: &Path, directory: &Path) -> StackResult<()> {
        if directory.join(COMPLETE_MARKER).is_file() {
            log::info!("Reusing previously extracted {}", directory.display());
            return Ok(());
        }

        if directory.exists() {
            let non_empty = fs::read_dir(directory)?.next().is_some();
            if non_empty && !self.overwrite_partial {
                return Err(StackError::Extraction {
                    archive: archive.to_path_buf(),
                    reason: format!(
                        "target {} already exists with content from an incomplete extraction",
                        directory.display()
                    ),
                });
            }
            if non_empty {
                log::warn!("Removing partial extraction {}", directory.display());
                fs::remove_dir_all(directory)?;
            }
        }
        fs::create_dir_all(directory)?;

        log::debug!("Unpacking {} into {}", archive.display(), directory.display());
        let format = ArchiveFormat::from_path(archive).ok_or_else(|| StackError::Extraction {
            archive: archive.to_path_buf(),
            reason: "unknown archive format".to_string(),
        })?;
        Self::unpack(archive, format, directory).map_err(|reason| StackError::Extraction {
            archive: archive.to_path_buf(),
            reason,
        })?;

        fs::write(directory.join(COMPLETE_MARKER), b"")?;
        Ok(())
    }

    fn unpack(archive: &Path, format: ArchiveFormat, directory: &Path) -> Result<(), String> {
        let file = File::open(archive).map_err(|e| format!("cannot open: {}", e))?;
        match format {
            ArchiveFormat::Tar => tar::Archive::new(file)
                .unpack(directory)
                .map_err(|e| format!("corrupt tar archive: {}", e)),
            ArchiveFormat::TarGz => tar::Archive::new(GzDecoder::new(file))
                .unpack(directory)
                .map_err(|e| format!("corrupt tar.gz archive: {}", e)),
            ArchiveFormat::Zip => ZipArchive::new(file)
                .and_then(|mut zip| zip.extract(directory))
                .map_err(|e| format!("corrupt zip archive: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_tar(path: &Path, files: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut builder = tar::Builder::new(file);
        for (name, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *content).unwrap();
        }
        builder.finish().unwrap();
    }

    fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, content) in files {
            zip.start_file(*name, zip::write::FileOptions::default()).unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(ArchiveFormat::from_path(Path::new("a/LC08.tar")), Some(ArchiveFormat::Tar));
        assert_eq!(ArchiveFormat::from_path(Path::new("LC08.TAR.GZ")), Some(ArchiveFormat::TarGz));
        assert_eq!(ArchiveFormat::from_path(Path::new("x.zip")), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::from_path(Path::new("x.tif")), None);
    }

    #[test]
    fn test_extracts_each_archive_into_own_dir() {
        let dir = TempDir::new().unwrap();
        write_tar(&dir.path().join("scene_a.tar"), &[("a_B2.TIF", b"aaa")]);
        write_zip(&dir.path().join("scene_b.zip"), &[("b_B2.TIF", b"bbb")]);
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let extractor = ArchiveExtractor::new(dir.path(), "temp");
        let working = extractor.extract_all().unwrap();

        assert_eq!(working.scenes.len(), 2);
        assert_eq!(working.scenes[0].directory, dir.path().join("temp").join("scene_a"));
        assert_eq!(fs::read(working.scenes[0].directory.join("a_B2.TIF")).unwrap(), b"aaa");
        assert_eq!(fs::read(working.scenes[1].directory.join("b_B2.TIF")).unwrap(), b"bbb");

        let root = working.root.clone();
        working.cleanup().unwrap();
        assert!(!root.exists());
    }

    #[test]
    fn test_rerun_reuses_completed_extraction() {
        let dir = TempDir::new().unwrap();
        write_tar(&dir.path().join("scene.tar"), &[("s_B2.TIF", b"x")]);

        let extractor = ArchiveExtractor::new(dir.path(), "temp");
        extractor.extract_all().unwrap();
        let again = extractor.extract_all().unwrap();
        assert_eq!(again.scenes.len(), 1);
    }

    #[test]
    fn test_partial_extraction_is_conflict() {
        let dir = TempDir::new().unwrap();
        write_tar(&dir.path().join("scene.tar"), &[("s_B2.TIF", b"x")]);
        let leftover = dir.path().join("temp").join("scene");
        fs::create_dir_all(&leftover).unwrap();
        fs::write(leftover.join("half.TIF"), b"partial").unwrap();

        let result = ArchiveExtractor::new(dir.path(), "temp").extract_all();
        assert!(matches!(result, Err(StackError::Extraction { .. })));

        let working = ArchiveExtractor::new(dir.path(), "temp")
            .overwrite_partial(true)
            .extract_all()
            .unwrap();
        assert!(working.scenes[0].directory.join("s_B2.TIF").is_file());
        assert!(!working.scenes[0].directory.join("half.TIF").exists());
    }

    #[test]
    fn test_corrupt_archive() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("broken.zip"), b"definitely not a zip").unwrap();

        let result = ArchiveExtractor::new(dir.path(), "temp").extract_all();
        match result {
            Err(StackError::Extraction { archive, .. }) => {
                assert!(archive.ends_with("broken.zip"));
            }
            other => panic!("expected extraction error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_directory() {
        let dir = TempDir::new().unwrap();
        let working = ArchiveExtractor::new(dir.path(), "temp").extract_all().unwrap();
        assert!(working.scenes.is_empty());
        assert!(working.root.is_dir());
    }
}
