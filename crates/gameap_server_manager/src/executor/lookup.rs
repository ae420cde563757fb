use std::env;
use std::path::{Path, PathBuf};

use gameap_core::{ExecutorError, ExecutorOptions};

/// Splits a command line with POSIX shell quoting rules.
///
/// Backslashes are doubled on Windows first, so `C:\games\hlds.exe` keeps its separators.
pub fn split_command(command: &str) -> Result<Vec<String>, ExecutorError> {
    let prepared = if cfg!(windows) {
        command.replace('\\', "\\\\")
    } else {
        command.to_string()
    };

    shell_words::split(&prepared).map_err(|e| ExecutorError::InvalidQuoting(e.to_string()))
}

/// Quotes arguments so that [`split_command`] gives them back unchanged.
pub fn join_command<S: AsRef<str>>(args: &[S]) -> String {
    shell_words::join(args.iter().map(AsRef::as_ref))
}

/// `work_dir`, or the fallback when `work_dir` is missing.
pub fn resolve_work_dir(options: &ExecutorOptions) -> Result<PathBuf, ExecutorError> {
    if options.work_dir.as_os_str().is_empty() {
        return env::current_dir().map_err(ExecutorError::Io);
    }

    if options.work_dir.is_dir() {
        return Ok(options.work_dir.clone());
    }

    if let Some(fallback) = &options.fallback_work_dir
        && fallback.is_dir()
    {
        return Ok(fallback.clone());
    }

    Err(ExecutorError::InvalidWorkDirectory(options.work_dir.clone()))
}

/// A program inside the work dir wins over one found on `PATH`.
pub fn resolve_executable(program: &str, work_dir: &Path) -> Result<PathBuf, ExecutorError> {
    let local = work_dir.join(program);
    if local.is_file() {
        return std::path::absolute(&local).map_err(ExecutorError::Io);
    }

    look_path(program).ok_or_else(|| ExecutorError::ExecutableNotFound(program.to_string()))
}

/// Searches `PATH` for an executable. Names with a directory part are checked as they are.
pub fn look_path(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    if path.is_absolute() || path.components().count() > 1 {
        return candidates(path).into_iter().find(|c| is_executable(c));
    }

    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .flat_map(|dir| candidates(&dir.join(name)))
        .find(|candidate| is_executable(candidate))
}

#[cfg(windows)]
fn candidates(path: &Path) -> Vec<PathBuf> {
    if path.extension().is_some() {
        return vec![path.to_path_buf()];
    }

    let extensions = env::var("PATHEXT").unwrap_or_else(|_| ".COM;.EXE;.BAT;.CMD".to_string());
    extensions
        .split(';')
        .filter(|ext| !ext.is_empty())
        .map(|ext| path.with_extension(ext.trim_start_matches('.')))
        .collect()
}

#[cfg(not(windows))]
fn candidates(path: &Path) -> Vec<PathBuf> {
    vec![path.to_path_buf()]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
