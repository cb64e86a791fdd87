//! File-system resource helpers.
//!
//! All helpers go through [`FileSystemOps`] and report failures as
//! [`ResourceError`], keeping permission failures distinct.
use std::fmt::Write as _;
use std::path::Path;

use sha2::{Digest as _, Sha256};

use crate::operations::{EntryKind, FileSystemOps};
use crate::resources::error::ResourceError;

/// Ensure the parent directory of `path` exists, creating it (and any
/// ancestors) if necessary.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_parent_dir(fs: &dyn FileSystemOps, path: &Path) -> Result<(), ResourceError> {
    if let Some(parent) = path.parent() {
        fs.create_dir_all(parent)
            .map_err(|e| ResourceError::from_io(parent, e))?;
    }
    Ok(())
}

/// Remove whatever is at `path` unless it is already of kind `keep`.
fn clear_unless(fs: &dyn FileSystemOps, path: &Path, keep: EntryKind) -> Result<(), ResourceError> {
    match fs.kind(path).map_err(|e| ResourceError::from_io(path, e))? {
        Some(kind) if kind != keep => fs
            .remove_all(path)
            .map_err(|e| ResourceError::from_io(path, e)),
        _ => Ok(()),
    }
}

/// Copy a regular file, keeping its mode bits.
///
/// A directory or symlink already at `dst` is removed first so the copy
/// never writes through a link.
///
/// # Errors
///
/// Returns an error if the destination cannot be cleared or the copy fails.
pub fn copy_file(fs: &dyn FileSystemOps, src: &Path, dst: &Path) -> Result<(), ResourceError> {
    clear_unless(fs, dst, EntryKind::File)?;
    fs.copy_file(src, dst)
        .map_err(|e| ResourceError::from_io(dst, e))
}

/// Write `contents` to `dst` with `mode`, replacing a directory or symlink
/// already at that path.
///
/// # Errors
///
/// Returns an error if the destination cannot be cleared, written, or
/// chmod-ed.
pub fn write_file(fs: &dyn FileSystemOps, dst: &Path, contents: &[u8], mode: u32) -> Result<(), ResourceError> {
    clear_unless(fs, dst, EntryKind::File)?;
    fs.write(dst, contents)
        .map_err(|e| ResourceError::from_io(dst, e))?;
    fs.set_mode(dst, mode)
        .map_err(|e| ResourceError::from_io(dst, e))
}

/// Recursively copy a directory tree into `dst`.
///
/// Files keep their mode bits, directories get their source mode once their
/// contents are in place, and symlinks are recreated as symlinks with the
/// same target. Entries already in `dst` that do not exist in `src` are left
/// alone.
///
/// # Errors
///
/// Returns an error if a directory cannot be created or read, or an entry
/// cannot be copied.
pub fn copy_dir_recursive(fs: &dyn FileSystemOps, src: &Path, dst: &Path) -> Result<(), ResourceError> {
    clear_unless(fs, dst, EntryKind::Directory)?;
    fs.create_dir_all(dst)
        .map_err(|e| ResourceError::from_io(dst, e))?;

    let children = fs.read_dir(src).map_err(|e| ResourceError::from_io(src, e))?;
    for child in children {
        let Some(name) = child.file_name() else {
            continue;
        };
        let target = dst.join(name);
        match fs.kind(&child).map_err(|e| ResourceError::from_io(&child, e))? {
            Some(EntryKind::Directory) => copy_dir_recursive(fs, &child, &target)?,
            Some(EntryKind::Symlink) => {
                let link = fs
                    .read_link(&child)
                    .map_err(|e| ResourceError::from_io(&child, e))?;
                fs.remove_all(&target)
                    .map_err(|e| ResourceError::from_io(&target, e))?;
                fs.symlink(&link, &target)
                    .map_err(|e| ResourceError::from_io(&target, e))?;
            }
            Some(EntryKind::File) => copy_file(fs, &child, &target)?,
            None => {}
        }
    }

    let mode = fs.mode(src).map_err(|e| ResourceError::from_io(src, e))?;
    fs.set_mode(dst, mode)
        .map_err(|e| ResourceError::from_io(dst, e))
}

/// Lowercase hex SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut hex = String::with_capacity(64);
    for b in &digest {
        // write! to a String is infallible; unwrap_or(()) makes that explicit.
        write!(hex, "{b:02x}").unwrap_or(());
    }
    hex
}

/// Whether `path` is a regular file whose content digest equals `expected`.
///
/// # Errors
///
/// Returns an error if `path` exists but cannot be read.
pub fn file_matches(fs: &dyn FileSystemOps, path: &Path, expected: &[u8]) -> Result<bool, ResourceError> {
    if fs.kind(path).map_err(|e| ResourceError::from_io(path, e))? != Some(EntryKind::File) {
        return Ok(false);
    }
    let current = fs.read(path).map_err(|e| ResourceError::from_io(path, e))?;
    Ok(sha256_hex(&current) == sha256_hex(expected))
}
