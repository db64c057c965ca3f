//! Apply or drop the upper layer of an overlay.
//!
//! An overlay upper layer holds everything a contributor created or changed.
//! [`apply_upper_layer`] copies it onto the project it was stacked on, with
//! the upper layer winning every conflict. [`remove_layer_tree`] deletes a
//! contribution's storage, refusing anything outside the storage root.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::sandbox::is_within;

#[derive(Debug, thiserror::Error)]
pub enum LayerError {
    #[error("upper layer {0} does not exist")]
    UpperMissing(PathBuf),
    #[error("merge target {0} is not a directory")]
    TargetMissing(PathBuf),
    #[error("refusing to remove {path}: not below storage root {root}")]
    OutsideStorage { root: PathBuf, path: PathBuf },
    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Counts of what a merge touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub files: usize,
    pub directories: usize,
    pub removed: usize,
}

/// Copy every entry of `upper` onto `target`.
///
/// Directories are merged recursively, files and symlinks replace whatever
/// the target held at that name, and overlay whiteouts delete the matching
/// target entry.
pub fn apply_upper_layer(upper: &Path, target: &Path) -> Result<MergeStats, LayerError> {
    if !upper.is_dir() {
        return Err(LayerError::UpperMissing(upper.to_path_buf()));
    }
    if !target.is_dir() {
        return Err(LayerError::TargetMissing(target.to_path_buf()));
    }

    let mut stats = MergeStats::default();
    merge_dir(upper, target, &mut stats)?;
    tracing::debug!(
        upper = %upper.display(),
        target = %target.display(),
        files = stats.files,
        directories = stats.directories,
        removed = stats.removed,
        "applied upper layer"
    );
    Ok(stats)
}

fn merge_dir(src: &Path, dst: &Path, stats: &mut MergeStats) -> Result<(), LayerError> {
    for entry in fs::read_dir(src).map_err(io_at(src))? {
        let entry = entry.map_err(io_at(src))?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let metadata = fs::symlink_metadata(&src_path).map_err(io_at(&src_path))?;
        let file_type = metadata.file_type();

        if is_whiteout(&metadata) {
            if remove_entry(&dst_path)? {
                stats.removed += 1;
            }
        } else if file_type.is_dir() {
            let existing_dir = fs::symlink_metadata(&dst_path)
                .map(|m| m.file_type().is_dir())
                .unwrap_or(false);
            if !existing_dir {
                remove_entry(&dst_path)?;
                fs::create_dir(&dst_path).map_err(io_at(&dst_path))?;
            }
            stats.directories += 1;
            merge_dir(&src_path, &dst_path, stats)?;
        } else if file_type.is_symlink() {
            remove_entry(&dst_path)?;
            let link_target = fs::read_link(&src_path).map_err(io_at(&src_path))?;
            make_symlink(&link_target, &dst_path)?;
            stats.files += 1;
        } else {
            // Never write through an existing symlink in the target tree.
            remove_entry(&dst_path)?;
            fs::copy(&src_path, &dst_path).map_err(io_at(&dst_path))?;
            stats.files += 1;
        }
    }
    Ok(())
}

/// Delete a contribution storage tree below `root`.
///
/// Returns `false` when the tree was already gone.
pub fn remove_layer_tree(root: &Path, tree: &Path) -> Result<bool, LayerError> {
    if tree == root || !is_within(root, tree) {
        return Err(LayerError::OutsideStorage {
            root: root.to_path_buf(),
            path: tree.to_path_buf(),
        });
    }
    match fs::remove_dir_all(tree) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(LayerError::Io {
            path: tree.to_path_buf(),
            source: e,
        }),
    }
}

/// Remove whatever sits at `path`, returning whether anything was there.
fn remove_entry(path: &Path) -> Result<bool, LayerError> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(io_at(path)(e)),
    };
    if metadata.file_type().is_dir() {
        fs::remove_dir_all(path).map_err(io_at(path))?;
    } else {
        fs::remove_file(path).map_err(io_at(path))?;
    }
    Ok(true)
}

#[cfg(unix)]
fn is_whiteout(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::{FileTypeExt, MetadataExt};
    metadata.file_type().is_char_device() && metadata.rdev() == 0
}

#[cfg(not(unix))]
fn is_whiteout(_metadata: &fs::Metadata) -> bool {
    false
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> Result<(), LayerError> {
    std::os::unix::fs::symlink(target, link).map_err(io_at(link))
}

#[cfg(not(unix))]
fn make_symlink(target: &Path, link: &Path) -> Result<(), LayerError> {
    let resolved = link.parent().map(|p| p.join(target)).unwrap_or_default();
    fs::copy(resolved, link).map(|_| ()).map_err(io_at(link))
}

fn io_at(path: &Path) -> impl FnOnce(io::Error) -> LayerError + '_ {
    move |source| LayerError::Io {
        path: path.to_path_buf(),
        source,
    }
}
