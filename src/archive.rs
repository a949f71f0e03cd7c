//! ZIP packaging of a completed task's working directory.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::ZipWriter;

use crate::error::{ArchiveError, Error, Result};

const ARCHIVE_NAME: &str = "archive.zip";

/// Recursively walk `dir`, writing every file under it (except the archive
/// itself) into a stored-entry ZIP at `<dir>/archive.zip`. Returns the
/// archive's absolute path.
///
/// Entries use POSIX-style paths relative to `dir`, so a page at
/// `dir/Ch.1/001.png` lands in the archive as `Ch.1/001.png`.
pub fn write_zip(dir: &Path) -> Result<std::path::PathBuf> {
    let archive_path = dir.join(ARCHIVE_NAME);
    let file = File::create(&archive_path).map_err(|e| {
        ArchiveError::WalkFailed {
            path: archive_path.display().to_string(),
            reason: e.to_string(),
        }
    })?;
    let mut writer = ZipWriter::new(file);
    let options: FileOptions<()> =
        FileOptions::default().compression_method(zip::CompressionMethod::Stored);

    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if path == archive_path {
            continue;
        }
        let relative = path.strip_prefix(dir).map_err(|_| ArchiveError::WalkFailed {
            path: path.display().to_string(),
            reason: "entry escaped working directory".into(),
        })?;
        if relative.as_os_str().is_empty() {
            continue;
        }
        let entry_name = relative.to_string_lossy().replace('\\', "/");

        if entry.file_type().is_dir() {
            writer
                .add_directory(format!("{entry_name}/"), options)
                .map_err(ArchiveError::from)?;
            continue;
        }

        writer
            .start_file(entry_name, options)
            .map_err(ArchiveError::from)?;
        let mut contents = Vec::new();
        File::open(path)
            .and_then(|mut f| f.read_to_end(&mut contents))
            .map_err(|e| ArchiveError::WalkFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        writer
            .write_all(&contents)
            .map_err(|e| ArchiveError::WalkFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
    }

    writer.finish().map_err(ArchiveError::from)?;
    Ok(archive_path)
}

/// Delete everything under `dir` except the archive itself, once packaging
/// has succeeded.
pub fn prune_sources(dir: &Path) -> Result<()> {
    let archive_path = dir.join(ARCHIVE_NAME);
    for entry in std::fs::read_dir(dir).map_err(Error::Io)? {
        let entry = entry.map_err(Error::Io)?;
        let path = entry.path();
        if path == archive_path {
            continue;
        }
        if path.is_dir() {
            std::fs::remove_dir_all(&path).map_err(Error::Io)?;
        } else {
            std::fs::remove_file(&path).map_err(Error::Io)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn writes_nested_files_with_posix_entry_names() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("Ch.1");
        std::fs::create_dir(&sub).unwrap();
        std::fs::File::create(sub.join("001.png"))
            .unwrap()
            .write_all(b"page")
            .unwrap();

        let archive_path = write_zip(dir.path()).unwrap();
        let file = std::fs::File::open(&archive_path).unwrap();
        let mut zip = zip::ZipArchive::new(file).unwrap();
        let entry = zip.by_name("Ch.1/001.png").unwrap();
        assert_eq!(entry.compression(), zip::CompressionMethod::Stored);
    }

    #[test]
    fn prune_sources_leaves_only_the_archive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::File::create(dir.path().join("page.png")).unwrap();
        write_zip(dir.path()).unwrap();
        prune_sources(dir.path()).unwrap();

        let remaining: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(remaining, vec![std::ffi::OsString::from(ARCHIVE_NAME)]);
    }
}
