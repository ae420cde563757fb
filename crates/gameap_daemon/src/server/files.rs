//! File operations of the wire protocol.

use std::fs::{FileType, Metadata};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, warn};

use gameap_protocol::{
    FileRequest, ProtocolError, Response, StatusCode, Value, read_end_bytes,
};

use super::{read_request, write_response};

const SNIFF_LEN: usize = 512;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Unknown = 0,
    Dir = 1,
    File = 2,
    CharDevice = 3,
    BlockDevice = 4,
    NamedPipe = 5,
    Symlink = 6,
    Socket = 7,
}

impl EntryType {
    pub fn of(file_type: FileType) -> Self {
        if file_type.is_symlink() {
            return EntryType::Symlink;
        }
        if file_type.is_file() {
            return EntryType::File;
        }
        if file_type.is_dir() {
            return EntryType::Dir;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::FileTypeExt;

            if file_type.is_char_device() {
                return EntryType::CharDevice;
            }
            if file_type.is_block_device() {
                return EntryType::BlockDevice;
            }
            if file_type.is_fifo() {
                return EntryType::NamedPipe;
            }
            if file_type.is_socket() {
                return EntryType::Socket;
            }
        }

        EntryType::Unknown
    }
}

fn unix_secs(time: io::Result<SystemTime>) -> u64 {
    time.ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(unix)]
fn permissions(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permissions(metadata: &Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o666
    }
}

#[cfg(unix)]
fn change_time(metadata: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    u64::try_from(metadata.ctime()).unwrap_or(0)
}

#[cfg(not(unix))]
fn change_time(metadata: &Metadata) -> u64 {
    unix_secs(metadata.created())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// `(name, size, mtime, type, perm)`
fn dir_entry(name: String, metadata: &Metadata) -> Value {
    Value::List(vec![
        Value::from(name),
        Value::from(metadata.len()),
        Value::from(unix_secs(metadata.modified())),
        Value::from(EntryType::of(metadata.file_type()) as u8),
        Value::from(permissions(metadata)),
    ])
}

pub(crate) async fn handle<S>(stream: &mut S) -> gameap_protocol::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let Some(value) = read_request(stream).await? else {
        return Ok(());
    };

    let request = match FileRequest::from_value(&value) {
        Ok(request) => request,
        Err(ProtocolError::InvalidOperation) => {
            return write_response(stream, Response::error("Invalid operation")).await;
        }
        Err(e) => {
            debug!(log_type = "wire_server", "Invalid files message: {}", e);
            return write_response(stream, Response::error("Invalid message")).await;
        }
    };

    match request {
        FileRequest::ReadDir { path, .. } => read_dir(stream, &path).await,
        FileRequest::MakeDir { path } => make_dir(stream, &path).await,
        FileRequest::Move {
            source,
            destination,
            copy,
        } => move_or_copy(stream, &source, &destination, copy).await,
        FileRequest::SendToClient { path } => send_to_client(stream, &path).await,
        FileRequest::GetFromClient {
            path,
            size,
            make_dirs,
            perms,
        } => get_from_client(stream, &path, size, make_dirs, perms).await,
        FileRequest::UnknownSend => {
            write_response(stream, Response::error("Invalid file send operation")).await
        }
        FileRequest::Remove { path, recursive } => remove(stream, &path, recursive).await,
        FileRequest::Info { path } => info(stream, &path).await,
        FileRequest::Chmod { path, perm } => chmod(stream, &path, perm).await,
    }
}

async fn read_dir<S>(stream: &mut S, path: &str) -> gameap_protocol::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let mut entries = match fs::read_dir(path).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(log_type = "wire_server", "Failed to read {}: {}", path, e);
            return write_response(stream, Response::error("Failed to read directory")).await;
        }
    };

    let mut listing = Vec::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(log_type = "wire_server", "Failed to read {}: {}", path, e);
                break;
            }
        };

        // Entries that vanish while listing are skipped.
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        listing.push(dir_entry(
            entry.file_name().to_string_lossy().into_owned(),
            &metadata,
        ));
    }

    write_response(stream, Response::ok("").with_data(Value::List(listing))).await
}

async fn make_dir<S>(stream: &mut S, path: &str) -> gameap_protocol::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o777);

    if let Err(e) = builder.create(path).await {
        error!(log_type = "wire_server", "Failed to make {}: {}", path, e);
        return write_response(stream, Response::error("Failed to make directory")).await;
    }

    write_response(stream, Response::ok("")).await
}

async fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).await.is_ok()
}

async fn move_or_copy<S>(
    stream: &mut S,
    source: &str,
    destination: &str,
    copy: bool,
) -> gameap_protocol::Result<()>
where
    S: AsyncWrite + Unpin,
{
    if !exists(Path::new(source)).await {
        return write_response(
            stream,
            Response::error(format!("Source \"{}\" not found", source)),
        )
        .await;
    }
    if exists(Path::new(destination)).await {
        return write_response(
            stream,
            Response::error(format!("Destination \"{}\" already exists", destination)),
        )
        .await;
    }

    if copy {
        let from = PathBuf::from(source);
        let to = PathBuf::from(destination);
        let copied = tokio::task::spawn_blocking(move || gameap_core::fs::copy_path(&from, &to))
            .await
            .map_err(io::Error::other)
            .and_then(|result| result);

        if let Err(e) = copied {
            error!(
                log_type = "wire_server",
                "Failed to copy {} to {}: {}", source, destination, e
            );
            return write_response(stream, Response::error("Failed to copy")).await;
        }
    } else if let Err(e) = fs::rename(source, destination).await {
        error!(
            log_type = "wire_server",
            "Failed to move {} to {}: {}", source, destination, e
        );
        return write_response(stream, Response::error("Failed to move")).await;
    }

    write_response(stream, Response::ok("")).await
}

/// Announces the size, waits for the client's end marker, then streams the raw bytes.
async fn send_to_client<S>(stream: &mut S, path: &str) -> gameap_protocol::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let metadata = match fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) => {
            error!(log_type = "wire_server", "Failed to stat {}: {}", path, e);
            return write_response(stream, Response::error(format!("File \"{}\" error", path)))
                .await;
        }
    };

    if !metadata.is_file() {
        return write_response(
            stream,
            Response::error(format!("\"{}\" is not a file", path)),
        )
        .await;
    }

    let file = match fs::File::open(path).await {
        Ok(file) => file,
        Err(e) => {
            error!(log_type = "wire_server", "Failed to open {}: {}", path, e);
            return write_response(
                stream,
                Response::error(format!("Failed to open file \"{}\"", path)),
            )
            .await;
        }
    };

    let size = metadata.len();
    write_response(
        stream,
        Response::new(StatusCode::ReadyToTransfer, "File is ready to transfer").with_data(size),
    )
    .await?;
    read_end_bytes(stream).await?;

    let mut limited = file.take(size);
    if let Err(e) = tokio::io::copy(&mut limited, stream).await {
        error!(log_type = "wire_server", "Failed to send {}: {}", path, e);
        return write_response(stream, Response::error("Failed to transfer file")).await;
    }
    stream.flush().await?;

    Ok(())
}

fn temp_path(destination: &Path) -> PathBuf {
    let name = format!(
        ".{}.{}.part",
        file_name(destination),
        uuid::Uuid::new_v4().simple()
    );
    destination.with_file_name(name)
}

/// Consumes the request marker, then receives exactly `size` bytes into a temp file
/// beside `path` and renames it into place.
async fn get_from_client<S>(
    stream: &mut S,
    path: &str,
    size: u64,
    make_dirs: bool,
    perms: u32,
) -> gameap_protocol::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let destination = Path::new(path);
    let parent = destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    if !exists(parent).await {
        if !make_dirs {
            return write_response(
                stream,
                Response::error(format!("File path \"{}\" not found", parent.display())),
            )
            .await;
        }

        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o755);
        if let Err(e) = builder.create(parent).await {
            error!(
                log_type = "wire_server",
                "Failed to make {}: {}",
                parent.display(),
                e
            );
            return write_response(
                stream,
                Response::error(format!(
                    "Failed to make directory \"{}\"",
                    parent.display()
                )),
            )
            .await;
        }
    }

    let temp = temp_path(destination);
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(perms);
    #[cfg(not(unix))]
    let _ = perms;

    let mut file = match options.open(&temp).await {
        Ok(file) => file,
        Err(e) => {
            error!(
                log_type = "wire_server",
                "Failed to open {}: {}",
                temp.display(),
                e
            );
            return write_response(stream, Response::error("Failed to open file")).await;
        }
    };

    read_end_bytes(stream).await?;
    write_response(
        stream,
        Response::new(StatusCode::ReadyToTransfer, "File is ready to transfer"),
    )
    .await?;

    let received = {
        let mut limited = (&mut *stream).take(size);
        tokio::io::copy(&mut limited, &mut file).await
    };
    let flushed = file.flush().await;
    drop(file);

    let transferred = match (received, flushed) {
        (Ok(n), Ok(())) if n == size => fs::rename(&temp, destination).await,
        (Ok(n), Ok(())) => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("received {} of {} bytes", n, size),
        )),
        (Err(e), _) | (_, Err(e)) => Err(e),
    };

    if let Err(e) = transferred {
        error!(
            log_type = "wire_server",
            "Failed to receive {}: {}", path, e
        );
        discard_partial(&temp).await;
        return write_response(stream, Response::error("Failed to transfer file")).await;
    }

    write_response(stream, Response::ok("")).await
}

/// Removes an unfinished upload, returning whether the file is gone.
async fn discard_partial(temp: &Path) -> bool {
    match fs::remove_file(temp).await {
        Ok(()) => true,
        Err(e) => {
            warn!(
                log_type = "wire_server",
                "Failed to remove {}: {}", temp.display(), e
            );
            false
        }
    }
}

/// `"."`, `"/"` and paths that clean up to them.
fn is_protected(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::RootDir | Component::CurDir | Component::Prefix(_)))
}

async fn remove<S>(stream: &mut S, path: &str, recursive: bool) -> gameap_protocol::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let target = Path::new(path);
    if is_protected(target) {
        return write_response(stream, Response::error("Invalid path")).await;
    }

    let metadata = match fs::symlink_metadata(target).await {
        Ok(metadata) => metadata,
        Err(_) => return write_response(stream, Response::error("Path not exist")).await,
    };

    let removed = match (metadata.is_dir(), recursive) {
        (true, true) => fs::remove_dir_all(target).await,
        (true, false) => fs::remove_dir(target).await,
        (false, _) => fs::remove_file(target).await,
    };

    if let Err(e) = removed {
        error!(log_type = "wire_server", "Failed to remove {}: {}", path, e);
        return write_response(stream, Response::error("Failed to remove")).await;
    }

    write_response(stream, Response::ok("")).await
}

/// Extension first, then a look at the first bytes.
async fn detect_mime(path: &Path) -> io::Result<String> {
    if let Some(mime) = mime_guess::from_path(path).first_raw() {
        return Ok(mime.to_string());
    }

    let mut file = fs::File::open(path).await?;
    let mut head = vec![0u8; SNIFF_LEN];
    let n = file.read(&mut head).await?;
    head.truncate(n);

    let text = match std::str::from_utf8(&head) {
        Ok(s) => !s.contains('\0'),
        // A multi-byte character cut at the end of the sample.
        Err(e) => e.error_len().is_none() && !head[..e.valid_up_to()].contains(&0),
    };

    Ok(if text {
        "text/plain; charset=utf-8".to_string()
    } else {
        "application/octet-stream".to_string()
    })
}

/// `(name, size, type, mtime, atime, ctime, perm, mime)`
async fn file_details(path: &Path) -> io::Result<Value> {
    let metadata = fs::symlink_metadata(path).await?;
    let entry_type = EntryType::of(metadata.file_type());

    let mime = if entry_type == EntryType::File && metadata.len() > 0 {
        detect_mime(path).await?
    } else {
        String::new()
    };

    Ok(Value::List(vec![
        Value::from(file_name(path)),
        Value::from(metadata.len()),
        Value::from(entry_type as u8),
        Value::from(unix_secs(metadata.modified())),
        Value::from(unix_secs(metadata.accessed())),
        Value::from(change_time(&metadata)),
        Value::from(permissions(&metadata)),
        Value::from(mime),
    ]))
}

async fn info<S>(stream: &mut S, path: &str) -> gameap_protocol::Result<()>
where
    S: AsyncWrite + Unpin,
{
    match file_details(Path::new(path)).await {
        Ok(details) => write_response(stream, Response::ok("").with_data(details)).await,
        Err(e) => {
            debug!(log_type = "wire_server", "Failed to stat {}: {}", path, e);
            write_response(stream, Response::error("Failed to read file details")).await
        }
    }
}

#[cfg(unix)]
async fn set_permissions(path: &str, perm: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(perm & 0o7777)).await
}

#[cfg(not(unix))]
async fn set_permissions(path: &str, perm: u32) -> io::Result<()> {
    let mut permissions = fs::metadata(path).await?.permissions();
    permissions.set_readonly(perm & 0o222 == 0);
    fs::set_permissions(path, permissions).await
}

async fn chmod<S>(stream: &mut S, path: &str, perm: u32) -> gameap_protocol::Result<()>
where
    S: AsyncWrite + Unpin,
{
    match set_permissions(path, perm).await {
        Ok(()) => write_response(stream, Response::ok("")).await,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            write_response(stream, Response::error("Path not exist")).await
        }
        Err(e) => {
            error!(log_type = "wire_server", "Failed to chmod {}: {}", path, e);
            write_response(stream, Response::error("Failed to change permissions")).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn discarding_partial_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let temp = temp_path(&dir.path().join("server.cfg"));
        std::fs::write(&temp, b"partial").unwrap();

        assert!(discard_partial(&temp).await);
        assert!(!temp.exists());
        assert!(!discard_partial(&temp).await);
    }

    #[test]
    fn protected_paths() {
        assert!(is_protected(Path::new("/")));
        assert!(is_protected(Path::new(".")));
        assert!(is_protected(Path::new("./")));
        assert!(is_protected(Path::new("")));
        assert!(!is_protected(Path::new("/srv/gameap")));
        assert!(!is_protected(Path::new("servers")));
    }

    #[tokio::test]
    async fn mime_by_extension_then_content() {
        let dir = tempfile::tempdir().unwrap();

        let cfg = dir.path().join("server.json");
        std::fs::write(&cfg, b"{}").unwrap();
        assert_eq!(detect_mime(&cfg).await.unwrap(), "application/json");

        let text = dir.path().join("motd");
        std::fs::write(&text, "Welcome\n").unwrap();
        assert_eq!(
            detect_mime(&text).await.unwrap(),
            "text/plain; charset=utf-8"
        );

        let binary = dir.path().join("hlds_linux");
        std::fs::write(&binary, [0x7f, b'E', b'L', b'F', 0, 0, 1]).unwrap();
        assert_eq!(
            detect_mime(&binary).await.unwrap(),
            "application/octet-stream"
        );
    }

    #[tokio::test]
    async fn details_of_empty_file_have_no_mime() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.txt");
        std::fs::write(&empty, b"").unwrap();

        let details = file_details(&empty).await.unwrap();
        let fields = details.as_list().unwrap();

        assert_eq!(fields[0].as_str(), Some("empty.txt"));
        assert_eq!(fields[1].as_u64(), Some(0));
        assert_eq!(fields[2].as_u64(), Some(EntryType::File as u64));
        assert_eq!(fields[7].as_str(), Some(""));
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_reported_as_such() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(dir.path(), &link).unwrap();

        let metadata = std::fs::symlink_metadata(&link).unwrap();
        assert_eq!(EntryType::of(metadata.file_type()), EntryType::Symlink);
    }
}
