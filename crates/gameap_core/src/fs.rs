//! Blocking filesystem helpers. Async callers run them on the blocking pool.

use std::fs;
use std::io;
use std::path::Path;

use walkdir::WalkDir;

/// Copies a file or a directory tree. Symlinks are recreated, not followed.
pub fn copy_path(src: &Path, dst: &Path) -> io::Result<()> {
    let metadata = fs::symlink_metadata(src)?;

    if metadata.file_type().is_symlink() {
        return copy_symlink(src, dst);
    }

    if metadata.is_file() {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src, dst)?;
        return Ok(());
    }

    copy_dir(src, dst)
}

pub fn copy_dir(src: &Path, dst: &Path) -> io::Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(io::Error::other)?;
        let target = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }

    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    let link = fs::read_link(src)?;
    std::os::unix::fs::symlink(link, dst)
}

#[cfg(windows)]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    let link = fs::read_link(src)?;
    if fs::metadata(src).map(|m| m.is_dir()).unwrap_or(false) {
        std::os::windows::fs::symlink_dir(link, dst)
    } else {
        std::os::windows::fs::symlink_file(link, dst)
    }
}

/// Changes the owner of every entry below `path`. Unreadable entries and broken symlinks are skipped.
#[cfg(unix)]
pub fn chown_recursive(path: &Path, uid: u32, gid: u32) -> io::Result<()> {
    use std::os::unix::fs::{chown, lchown};

    for entry in WalkDir::new(path).follow_links(false) {
        let Ok(entry) = entry else {
            continue;
        };

        if entry.path_is_symlink() {
            if fs::metadata(entry.path()).is_err() {
                tracing::debug!(
                    log_type = "installer",
                    "Skipping broken symlink {}",
                    entry.path().display()
                );
                continue;
            }
            lchown(entry.path(), Some(uid), Some(gid))?;
        } else {
            chown(entry.path(), Some(uid), Some(gid))?;
        }
    }

    Ok(())
}

#[cfg(not(unix))]
pub fn chown_recursive(_path: &Path, _uid: u32, _gid: u32) -> io::Result<()> {
    Ok(())
}

pub fn is_root() -> bool {
    #[cfg(unix)]
    {
        nix::unistd::geteuid().is_root()
    }
    #[cfg(not(unix))]
    {
        false
    }
}
