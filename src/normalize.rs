// SPDX-FileCopyrightText: 2026 Quayside Contributors
// SPDX-License-Identifier: MIT

//! Site tree normalization.
//!
//! Users routinely zip a parent folder instead of its contents, or ship
//! editor and OS artifacts inside the archive. Handing such a tree straight
//! to version control produces a broken publish: wrong root, stray metadata,
//! no discoverable entry point. The normalizer repairs the structure of an
//! extracted tree in place before anything else sees it. It never transforms
//! file content.
//!
//! # Procedure
//!
//! 1. __Trash removal__: walk the tree and delete version-control and
//!    OS-generated clutter. Idempotent, and never descends into a directory
//!    it has just deleted.
//! 2. __Single-wrapper collapse__: when exactly one non-trash entry remains
//!    at the root and it is a directory, its children move up to the root and
//!    the empty wrapper goes away. One pass only, matching the common
//!    "zipped a folder" mistake.
//! 3. __Entry-document verification__: a breadth-first, lexicographic search
//!    locates the first directory containing the entry document. If that
//!    directory is not the root, its contents are hoisted to the root the
//!    same way as step 2. A tree with no entry document anywhere is rejected;
//!    that is an input-validation failure, not something to silently work
//!    around.
//!
//! After a successful run, the directory handed in __is__ the site root: the
//! entry document sits directly beneath it.

use std::{
    collections::VecDeque,
    ffi::OsString,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, trace};

/// Directory names deleted on sight during trash removal.
pub const TRASH_DIRS: [&str; 2] = [".git", "__MACOSX"];

/// File names deleted on sight during trash removal.
pub const TRASH_FILES: [&str; 2] = [".DS_Store", ".gitmodules"];

/// Name under which a wrapper directory is staged while its children move up.
const COLLAPSE_STAGING: &str = ".quayside-collapse";

/// Structural repair of an extracted site tree.
///
/// Construct one per publishing policy with the designated entry document
/// name, then run [`TreeNormalizer::normalize`] against each extracted tree.
/// The normalizer owns no state beyond that name and is cheap to clone.
#[derive(Clone, Debug)]
pub struct TreeNormalizer {
    entry_document: OsString,
}

impl TreeNormalizer {
    /// Construct new tree normalizer for the given entry document name.
    pub fn new(entry_document: impl Into<OsString>) -> Self {
        Self {
            entry_document: entry_document.into(),
        }
    }

    /// Normalize the tree rooted at `root` in place.
    ///
    /// # Errors
    ///
    /// - Return [`NormalizeError::MissingEntryDocument`] if no directory in
    ///   the tree contains the entry document. Callers must treat this as a
    ///   terminal validation failure and perform no remote side effects.
    /// - Return filesystem variants if the walk or a move fails.
    #[instrument(skip(self, root), level = "debug")]
    pub fn normalize(&self, root: &Path) -> Result<()> {
        remove_trash(root)?;
        collapse_wrapper(root)?;
        self.hoist_entry_root(root)?;

        Ok(())
    }

    /// Locate the directory that should become the site root.
    ///
    /// Breadth-first over the tree, visiting sibling directories in
    /// lexicographic order, so the result is deterministic for any tree
    /// shape. Returns the first directory that directly contains the entry
    /// document.
    fn locate_entry_root(&self, root: &Path) -> Result<Option<PathBuf>> {
        let mut queue = VecDeque::new();
        queue.push_back(root.to_path_buf());

        while let Some(dir) = queue.pop_front() {
            if dir.join(&self.entry_document).is_file() {
                return Ok(Some(dir));
            }

            for child in sorted_entries(&dir)? {
                if child.is_dir() {
                    queue.push_back(child);
                }
            }
        }

        Ok(None)
    }

    fn hoist_entry_root(&self, root: &Path) -> Result<()> {
        let entry_root = self.locate_entry_root(root)?.ok_or_else(|| {
            NormalizeError::MissingEntryDocument {
                entry: self.entry_document.to_string_lossy().into_owned(),
            }
        })?;

        if entry_root == root {
            return Ok(());
        }

        debug!(
            "hoisting site root {:?} to {:?}",
            entry_root.display(),
            root.display()
        );
        hoist_children(root, &entry_root)?;
        remove_empty_ancestors(root, &entry_root);

        Ok(())
    }
}

/// Delete version-control and OS-generated clutter beneath `dir`.
///
/// Idempotent: a second run over the same tree is a no-op. A directory whose
/// name matches [`TRASH_DIRS`] is removed whole and never descended into.
/// Deletion is best-effort in the face of races: an entry that vanished
/// between listing and removal is not an error.
///
/// # Errors
///
/// - Return [`NormalizeError::Walk`] if a directory cannot be listed.
/// - Return [`NormalizeError::Remove`] if a deletion fails for any reason
///   other than the entry already being gone.
pub fn remove_trash(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }

    for path in sorted_entries(dir)? {
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };

        if path.is_dir() {
            if TRASH_DIRS.contains(&name) {
                trace!("removing trash directory {:?}", path.display());
                remove_existing(&path)?;
            } else {
                remove_trash(&path)?;
            }
        } else if TRASH_FILES.contains(&name) {
            trace!("removing trash file {:?}", path.display());
            remove_existing(&path)?;
        }
    }

    Ok(())
}

/// Collapse a single superfluous wrapping directory at `root`.
///
/// When exactly one non-trash entry remains at the root and it is a
/// directory, every entry inside it moves up to the root and the wrapper is
/// removed. On a name collision the moved child replaces the existing root
/// entry. Runs a single pass; nested wrappers are left for the entry-document
/// search to resolve.
///
/// # Errors
///
/// - Return [`NormalizeError::Walk`] if the root cannot be listed.
/// - Return [`NormalizeError::Move`] if a child cannot be relocated.
pub fn collapse_wrapper(root: &Path) -> Result<()> {
    let survivors: Vec<PathBuf> = sorted_entries(root)?
        .into_iter()
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| !TRASH_DIRS.contains(&name) && !TRASH_FILES.contains(&name))
                .unwrap_or(true)
        })
        .collect();

    let [wrapper] = survivors.as_slice() else {
        return Ok(());
    };
    if !wrapper.is_dir() {
        return Ok(());
    }

    debug!("collapsing wrapper directory {:?}", wrapper.display());
    hoist_children(root, wrapper)?;

    Ok(())
}

/// Move every child of `source` up into `root`, then drop the emptied
/// `source`.
///
/// The source is first staged under a reserved name so a child that shares
/// the source's own name cannot clobber it mid-move. Children move in
/// lexicographic order and overwrite same-named root entries, which makes the
/// collision outcome deterministic.
fn hoist_children(root: &Path, source: &Path) -> Result<()> {
    let staging = root.join(COLLAPSE_STAGING);
    remove_existing(&staging)?;
    rename(source, &staging)?;

    for child in sorted_entries(&staging)? {
        let Some(name) = child.file_name() else {
            continue;
        };
        let target = root.join(name);

        // INVARIANT: Clear the landing spot first; rename does not replace
        // non-empty directories.
        remove_existing(&target)?;
        rename(&child, &target)?;
    }

    remove_existing(&staging)?;

    Ok(())
}

/// Remove directories left empty between `root` and a hoisted subtree.
///
/// Best-effort: a parent that still has entries stays, and a failure to
/// remove is ignored.
fn remove_empty_ancestors(root: &Path, hoisted: &Path) {
    let mut current = hoisted.parent();
    while let Some(dir) = current {
        if dir == root {
            break;
        }

        if fs::remove_dir(dir).is_err() {
            break;
        }

        current = dir.parent();
    }
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let listing = fs::read_dir(dir).map_err(|err| NormalizeError::Walk {
        source: err,
        path: dir.to_path_buf(),
    })?;

    let mut entries = Vec::new();
    for entry in listing {
        let entry = entry.map_err(|err| NormalizeError::Walk {
            source: err,
            path: dir.to_path_buf(),
        })?;
        entries.push(entry.path());
    }

    entries.sort();

    Ok(entries)
}

fn remove_existing(path: &Path) -> Result<()> {
    let outcome = match path.symlink_metadata() {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(_) => return Ok(()),
    };

    match outcome {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(NormalizeError::Remove {
            source: err,
            path: path.to_path_buf(),
        }),
    }
}

fn rename(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to).map_err(|err| NormalizeError::Move {
        source: err,
        from: from.to_path_buf(),
        to: to.to_path_buf(),
    })
}

/// All possible error types for tree normalization.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    /// No directory in the tree contains the entry document.
    #[error("no {entry:?} found anywhere in the uploaded site")]
    MissingEntryDocument { entry: String },

    /// A directory could not be listed.
    #[error("cannot list directory {path:?}")]
    Walk {
        source: std::io::Error,
        path: PathBuf,
    },

    /// An entry could not be removed.
    #[error("cannot remove {path:?}")]
    Remove {
        source: std::io::Error,
        path: PathBuf,
    },

    /// An entry could not be relocated.
    #[error("cannot move {from:?} to {to:?}")]
    Move {
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },
}

/// Friendly result alias :3
type Result<T, E = NormalizeError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;
    use simple_txtar::Archive;
    use std::fs::File;
    use tempfile::TempDir;

    /// Materialize a txtar listing as a file tree. A trailing "/" in a file
    /// name creates an empty directory instead.
    fn write_tree(root: &Path, listing: &str) {
        let archive = Archive::from(listing);
        for file in archive.iter() {
            let path = root.join(file.name.trim());
            if file.name.trim().ends_with('/') {
                fs::create_dir_all(&path).unwrap();
                continue;
            }
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, file.content.as_bytes()).unwrap();
        }
    }

    /// Collect every path in the tree relative to root, sorted, directories
    /// suffixed with "/".
    fn snapshot(root: &Path) -> Vec<String> {
        let mut paths = Vec::new();
        let mut queue = VecDeque::from([root.to_path_buf()]);
        while let Some(dir) = queue.pop_front() {
            for child in sorted_entries(&dir).unwrap() {
                let rel = child.strip_prefix(root).unwrap().to_string_lossy().into_owned();
                if child.is_dir() {
                    paths.push(format!("{rel}/"));
                    queue.push_back(child);
                } else {
                    paths.push(rel);
                }
            }
        }
        paths.sort();
        paths
    }

    fn normalizer() -> TreeNormalizer {
        TreeNormalizer::new("index.html")
    }

    #[test]
    fn flat_tree_is_left_untouched() {
        let root = TempDir::new().unwrap();
        write_tree(
            root.path(),
            "-- index.html --\n<html></html>\n-- style.css --\nbody {}\n-- assets/logo.svg --\n<svg/>\n",
        );
        let before = snapshot(root.path());

        normalizer().normalize(root.path()).unwrap();

        assert_eq!(snapshot(root.path()), before);
    }

    #[test]
    fn single_wrapper_collapses_to_root() {
        let root = TempDir::new().unwrap();
        write_tree(
            root.path(),
            "-- site/index.html --\n<html></html>\n-- site/style.css --\nbody {}\n",
        );

        normalizer().normalize(root.path()).unwrap();

        assert_eq!(snapshot(root.path()), vec!["index.html", "style.css"]);
    }

    #[test]
    fn trash_is_removed_everywhere() {
        let root = TempDir::new().unwrap();
        write_tree(
            root.path(),
            indoc! {"
                -- index.html --
                <html></html>
                -- .DS_Store --
                junk
                -- .gitmodules --
                junk
                -- .git/objects/aa/blob --
                junk
                -- assets/.DS_Store --
                junk
                -- assets/app.js --
                console.log(1)
                -- __MACOSX/._index.html --
                junk
            "},
        );

        normalizer().normalize(root.path()).unwrap();

        assert_eq!(
            snapshot(root.path()),
            vec!["assets/", "assets/app.js", "index.html"]
        );
    }

    #[test]
    fn trash_removal_is_idempotent() {
        let root = TempDir::new().unwrap();
        write_tree(
            root.path(),
            "-- index.html --\n<html></html>\n-- .git/config --\njunk\n-- docs/.DS_Store --\njunk\n-- docs/readme.txt --\nhello\n",
        );

        remove_trash(root.path()).unwrap();
        let first = snapshot(root.path());
        remove_trash(root.path()).unwrap();

        assert_eq!(snapshot(root.path()), first);
    }

    #[test]
    fn wrapper_of_only_trash_siblings_still_collapses() {
        let root = TempDir::new().unwrap();
        write_tree(
            root.path(),
            "-- site/index.html --\n<html></html>\n-- .DS_Store --\njunk\n-- __MACOSX/._site --\njunk\n",
        );

        normalizer().normalize(root.path()).unwrap();

        assert_eq!(snapshot(root.path()), vec!["index.html"]);
    }

    #[test]
    fn hoist_overwrites_colliding_root_entries() {
        let root = TempDir::new().unwrap();
        write_tree(
            root.path(),
            "-- README.md --\nouter\n-- site/index.html --\n<html></html>\n-- site/README.md --\ninner\n",
        );

        normalizer().normalize(root.path()).unwrap();

        assert_eq!(snapshot(root.path()), vec!["README.md", "index.html"]);
        assert_eq!(fs::read_to_string(root.path().join("README.md")).unwrap(), "inner\n");
    }

    #[test]
    fn wrapper_containing_directory_of_same_name_collapses() {
        let root = TempDir::new().unwrap();
        write_tree(root.path(), "-- site/site/index.html --\n<html></html>\n");

        normalizer().normalize(root.path()).unwrap();

        assert_eq!(snapshot(root.path()), vec!["index.html"]);
    }

    #[test]
    fn entry_search_prefers_lexicographically_first_directory() {
        let root = TempDir::new().unwrap();
        write_tree(
            root.path(),
            "-- alpha/index.html --\nalpha\n-- beta/index.html --\nbeta\n-- notes.txt --\nkeep\n",
        );

        normalizer().normalize(root.path()).unwrap();

        assert_eq!(
            fs::read_to_string(root.path().join("index.html")).unwrap(),
            "alpha\n"
        );
        // The losing candidate stays where it was.
        assert!(root.path().join("beta/index.html").is_file());
    }

    #[test]
    fn nested_entry_root_is_hoisted_and_emptied_ancestors_removed() {
        let root = TempDir::new().unwrap();
        write_tree(
            root.path(),
            "-- notes.txt --\nkeep\n-- dist/public/index.html --\n<html></html>\n-- dist/public/style.css --\nbody {}\n",
        );

        normalizer().normalize(root.path()).unwrap();

        assert_eq!(
            snapshot(root.path()),
            vec!["index.html", "notes.txt", "style.css"]
        );
    }

    #[test]
    fn missing_entry_document_is_a_validation_failure() {
        let root = TempDir::new().unwrap();
        write_tree(root.path(), "-- style.css --\nbody {}\n-- assets/app.js --\nhi\n");

        let result = normalizer().normalize(root.path());

        assert!(matches!(
            result,
            Err(NormalizeError::MissingEntryDocument { .. })
        ));
    }

    #[test]
    fn entry_document_must_be_a_file() {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("index.html")).unwrap();
        File::create(root.path().join("style.css")).unwrap();

        let result = normalizer().normalize(root.path());

        assert!(matches!(
            result,
            Err(NormalizeError::MissingEntryDocument { .. })
        ));
    }

    #[test_case(".git"; "git dir")]
    #[test_case("__MACOSX"; "macos resource fork dir")]
    #[test]
    fn trash_directory_is_never_treated_as_wrapper(name: &str) {
        let root = TempDir::new().unwrap();
        write_tree(root.path(), &format!("-- {name}/index.html --\ntrap\n"));

        let result = normalizer().normalize(root.path());

        // Only trash remained, so the tree is empty and has no entry point.
        assert!(matches!(
            result,
            Err(NormalizeError::MissingEntryDocument { .. })
        ));
        pretty_assertions::assert_eq!(snapshot(root.path()), Vec::<String>::new());
    }

    #[test]
    fn normalize_is_idempotent_end_to_end() {
        let root = TempDir::new().unwrap();
        write_tree(
            root.path(),
            "-- site/index.html --\n<html></html>\n-- site/assets/app.js --\nhi\n",
        );

        normalizer().normalize(root.path()).unwrap();
        let first = snapshot(root.path());
        normalizer().normalize(root.path()).unwrap();

        assert_eq!(snapshot(root.path()), first);
    }
}
