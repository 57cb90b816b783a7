// SPDX-FileCopyrightText: 2026 Quayside Contributors
// SPDX-License-Identifier: MIT

//! Archive extraction.
//!
//! Thin wrapper around the `zip` crate that materializes an uploaded archive
//! as an on-disk tree for the normalizer to repair. Entries are written only
//! under the destination: an entry whose name would escape it (absolute path
//! or `..` traversal) fails the whole extraction, since an archive crafted
//! that way is not a site bundle.
//!
//! The destination is recreated from scratch on every call. Stale trees from
//! an earlier failed request must never leak into a new one.

use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// Extract `archive` into a freshly-created `destination` directory.
///
/// # Errors
///
/// - Return [`ArchiveError::Open`] if the archive file cannot be read.
/// - Return [`ArchiveError::Corrupt`] if the archive is not a readable zip.
/// - Return [`ArchiveError::UnsafeEntryPath`] if an entry would land outside
///   the destination.
/// - Return filesystem variants if the destination cannot be written.
#[instrument(skip(archive, destination), level = "debug")]
pub fn extract_archive(archive: &Path, destination: &Path) -> Result<()> {
    if destination.exists() {
        fs::remove_dir_all(destination).map_err(|err| ArchiveError::CreateDir {
            source: err,
            path: destination.to_path_buf(),
        })?;
    }
    mkdirp::mkdirp(destination).map_err(|err| ArchiveError::CreateDir {
        source: err,
        path: destination.to_path_buf(),
    })?;

    let file = File::open(archive).map_err(|err| ArchiveError::Open {
        source: err,
        path: archive.to_path_buf(),
    })?;
    let mut bundle = zip::ZipArchive::new(file)?;

    debug!(
        "extracting {} entries into {:?}",
        bundle.len(),
        destination.display()
    );
    for index in 0..bundle.len() {
        let mut entry = bundle.by_index(index)?;

        // INVARIANT: Only write entries that resolve inside the destination.
        let Some(relative) = entry.enclosed_name() else {
            return Err(ArchiveError::UnsafeEntryPath {
                name: entry.name().to_string(),
            });
        };
        let target = destination.join(relative);

        if entry.is_dir() {
            ensure_dir(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            ensure_dir(parent)?;
        }

        let mut output = File::create(&target).map_err(|err| ArchiveError::Write {
            source: err,
            path: target.clone(),
        })?;
        io::copy(&mut entry, &mut output).map_err(|err| ArchiveError::Write {
            source: err,
            path: target.clone(),
        })?;
    }

    Ok(())
}

fn ensure_dir(path: &Path) -> Result<()> {
    mkdirp::mkdirp(path).map_err(|err| ArchiveError::CreateDir {
        source: err,
        path: path.to_path_buf(),
    })?;

    Ok(())
}

/// All possible error types for archive extraction.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The uploaded archive file cannot be opened.
    #[error("cannot open archive {path:?}")]
    Open {
        source: std::io::Error,
        path: PathBuf,
    },

    /// The archive is corrupt or not a supported format.
    #[error("archive is not a readable zip file")]
    Corrupt(#[from] zip::result::ZipError),

    /// An entry would escape the extraction destination.
    #[error("archive entry {name:?} escapes the extraction directory")]
    UnsafeEntryPath { name: String },

    /// A directory under the destination cannot be created.
    #[error("cannot create directory {path:?}")]
    CreateDir {
        source: std::io::Error,
        path: PathBuf,
    },

    /// An extracted file cannot be written.
    #[error("cannot write extracted file {path:?}")]
    Write {
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
type Result<T, E = ArchiveError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write as _;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn build_zip(dest: &Path, entries: &[(&str, &str)]) {
        let file = File::create(dest).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, content) in entries {
            if name.ends_with('/') {
                writer
                    .add_directory(name.trim_end_matches('/'), SimpleFileOptions::default())
                    .unwrap();
            } else {
                writer.start_file(*name, SimpleFileOptions::default()).unwrap();
                writer.write_all(content.as_bytes()).unwrap();
            }
        }
        writer.finish().unwrap();
    }

    #[test]
    fn extracts_files_and_directories() {
        let scratch = TempDir::new().unwrap();
        let archive = scratch.path().join("site.zip");
        build_zip(
            &archive,
            &[
                ("index.html", "<html></html>"),
                ("assets/", ""),
                ("assets/app.js", "console.log(1)"),
            ],
        );
        let dest = scratch.path().join("tree");

        extract_archive(&archive, &dest).unwrap();

        assert_eq!(
            fs::read_to_string(dest.join("index.html")).unwrap(),
            "<html></html>"
        );
        assert_eq!(
            fs::read_to_string(dest.join("assets/app.js")).unwrap(),
            "console.log(1)"
        );
    }

    #[test]
    fn recreates_destination_from_scratch() {
        let scratch = TempDir::new().unwrap();
        let archive = scratch.path().join("site.zip");
        build_zip(&archive, &[("index.html", "fresh")]);
        let dest = scratch.path().join("tree");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("stale.txt"), "old request").unwrap();

        extract_archive(&archive, &dest).unwrap();

        assert!(!dest.join("stale.txt").exists());
        assert_eq!(fs::read_to_string(dest.join("index.html")).unwrap(), "fresh");
    }

    #[test]
    fn rejects_garbage_input() {
        let scratch = TempDir::new().unwrap();
        let archive = scratch.path().join("garbage.zip");
        fs::write(&archive, [0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
        let dest = scratch.path().join("tree");

        let result = extract_archive(&archive, &dest);

        assert!(matches!(result, Err(ArchiveError::Corrupt(_))));
    }

    #[test]
    fn rejects_missing_archive() {
        let scratch = TempDir::new().unwrap();
        let archive = scratch.path().join("nope.zip");
        let dest = scratch.path().join("tree");

        let result = extract_archive(&archive, &dest);

        assert!(matches!(result, Err(ArchiveError::Open { .. })));
    }
}
