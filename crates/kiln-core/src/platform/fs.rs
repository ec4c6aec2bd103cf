//! Directory and file helpers used to prepare volume paths.
//!
//! Every function reports failure through [`FsError`]; callers treat any
//! error as an input-preparation failure.

use crate::error::FsError;
use std::fs;
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

type Result<T> = std::result::Result<T, FsError>;

/// Kind of a filesystem entry, links not followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Regular,
    Directory,
    Block,
    Character,
    Fifo,
    Link,
    Socket,
    Unknown,
}

/// Inspect the entry at `path` without following symlinks.
pub fn file_type(path: &Path) -> Result<FileType> {
    use std::os::unix::fs::FileTypeExt;

    let meta = fs::symlink_metadata(path).map_err(|e| FsError::io_with_path(e, path))?;
    let ft = meta.file_type();

    Ok(if ft.is_file() {
        FileType::Regular
    } else if ft.is_dir() {
        FileType::Directory
    } else if ft.is_symlink() {
        FileType::Link
    } else if ft.is_char_device() {
        FileType::Character
    } else if ft.is_block_device() {
        FileType::Block
    } else if ft.is_fifo() {
        FileType::Fifo
    } else if ft.is_socket() {
        FileType::Socket
    } else {
        FileType::Unknown
    })
}

/// Whether `path` exists and is a directory.
///
/// A missing path is `Ok(false)`; a path that exists but is something else
/// is `Ok(false)` as well. Any other stat failure is an error.
pub fn dir_exists(path: &Path) -> Result<bool> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.is_dir()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(FsError::io_with_path(e, path)),
    }
}

/// Create a single directory with the given permission bits.
pub fn create_dir(path: &Path, mode: u32) -> Result<()> {
    let ret = fs::DirBuilder::new().mode(mode).create(path);
    debug!("mkdir {} -> {:?}", path.display(), ret);

    match ret {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            Err(FsError::AlreadyExists(path.to_path_buf()))
        }
        Err(e) => Err(FsError::io_with_path(e, path)),
    }
}

/// Remove a file. A file that is already gone is not an error.
pub fn remove_file(path: &Path) -> Result<()> {
    let ret = fs::remove_file(path);
    debug!("unlink {} -> {:?}", path.display(), ret);

    match ret {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(FsError::io_with_path(e, path)),
    }
}

/// Remove a directory, optionally with everything below it.
///
/// Symlinks inside the tree are removed, never followed.
pub fn remove_dir(path: &Path, recursive: bool) -> Result<()> {
    if recursive {
        for entry in WalkDir::new(path)
            .min_depth(1)
            .follow_links(false)
            .contents_first(true)
        {
            let entry = entry.map_err(|e| walk_error(e, path))?;
            if entry.file_type().is_dir() {
                remove_empty_dir(entry.path())?;
            } else {
                remove_file(entry.path())?;
            }
        }
    }

    remove_empty_dir(path)
}

fn remove_empty_dir(path: &Path) -> Result<()> {
    let ret = fs::remove_dir(path);
    debug!("rmdir {} -> {:?}", path.display(), ret);
    ret.map_err(|e| FsError::io_with_path(e, path))
}

/// Immediate children of `path`, as full paths, in directory order.
pub fn list_dir(path: &Path, only_dirs: bool, skip_links: bool) -> Result<Vec<PathBuf>> {
    if !dir_exists(path)? {
        return Err(FsError::NotADirectory(path.to_path_buf()));
    }

    let mut items = Vec::new();
    for entry in WalkDir::new(path).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| walk_error(e, path))?;
        let ft = entry.file_type();

        if skip_links && ft.is_symlink() {
            continue;
        }
        if only_dirs && !ft.is_dir() {
            continue;
        }
        items.push(entry.into_path());
    }
    Ok(items)
}

/// Immediate child directories of `path`, symlinks skipped.
pub fn subfolders(path: &Path) -> Result<Vec<PathBuf>> {
    list_dir(path, true, true)
}

fn walk_error(err: walkdir::Error, root: &Path) -> FsError {
    let path = err.path().unwrap_or(root).to_path_buf();
    let io_err = err
        .into_io_error()
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "filesystem loop"));
    FsError::io_with_path(io_err, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_and_detect_dir() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("volume");

        assert!(!dir_exists(&dir).unwrap());
        create_dir(&dir, 0o755).unwrap();
        assert!(dir_exists(&dir).unwrap());
        assert_eq!(file_type(&dir).unwrap(), FileType::Directory);

        match create_dir(&dir, 0o755) {
            Err(FsError::AlreadyExists(p)) => assert_eq!(p, dir),
            other => panic!("Expected AlreadyExists, got: {:?}", other),
        }
    }

    #[test]
    fn test_dir_exists_on_regular_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("plain");
        fs::write(&file, b"x").unwrap();

        assert!(!dir_exists(&file).unwrap());
        assert_eq!(file_type(&file).unwrap(), FileType::Regular);
    }

    #[test]
    fn test_remove_missing_file_is_ok() {
        let temp = TempDir::new().unwrap();
        remove_file(&temp.path().join("nothing")).unwrap();
    }

    #[test]
    fn test_remove_dir_recursive_keeps_link_targets() {
        let temp = TempDir::new().unwrap();
        let outside = temp.path().join("outside");
        fs::create_dir(&outside).unwrap();
        fs::write(outside.join("keep"), b"keep").unwrap();

        let root = temp.path().join("root");
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::write(root.join("a/b/file"), b"data").unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();

        assert!(remove_dir(&root, false).is_err());
        remove_dir(&root, true).unwrap();

        assert!(!root.exists());
        assert!(outside.join("keep").exists());
    }

    #[test]
    fn test_list_dir_filters() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("d1")).unwrap();
        fs::create_dir(temp.path().join("d2")).unwrap();
        fs::write(temp.path().join("f"), b"").unwrap();
        std::os::unix::fs::symlink(temp.path().join("d1"), temp.path().join("l")).unwrap();

        let mut all = list_dir(temp.path(), false, false).unwrap();
        all.sort();
        assert_eq!(all.len(), 4);
        assert!(all.iter().all(|p| p.starts_with(temp.path())));

        let mut dirs = subfolders(temp.path()).unwrap();
        dirs.sort();
        assert_eq!(dirs, vec![temp.path().join("d1"), temp.path().join("d2")]);

        let no_links = list_dir(temp.path(), false, true).unwrap();
        assert_eq!(no_links.len(), 3);
    }

    #[test]
    fn test_list_dir_on_file_fails() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("f");
        fs::write(&file, b"").unwrap();

        assert!(matches!(
            list_dir(&file, false, true),
            Err(FsError::NotADirectory(_))
        ));
    }
}
