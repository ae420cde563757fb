//! Blocking archive extraction. Callers run it through `spawn_blocking`.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use flate2::read::GzDecoder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Tar,
    TarGz,
}

impl ArchiveKind {
    /// Detects the archive type from the file name.
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();

        if name.ends_with(".zip") {
            Some(ArchiveKind::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveKind::TarGz)
        } else if name.ends_with(".tar") {
            Some(ArchiveKind::Tar)
        } else {
            None
        }
    }
}

pub fn unpack(kind: ArchiveKind, archive: &Path, destination: &Path) -> io::Result<()> {
    std::fs::create_dir_all(destination)?;
    let file = BufReader::new(File::open(archive)?);

    match kind {
        ArchiveKind::Zip => {
            let mut zip = zip::ZipArchive::new(file).map_err(io::Error::other)?;
            zip.extract(destination).map_err(io::Error::other)
        }
        ArchiveKind::Tar => tar::Archive::new(file).unpack(destination),
        ArchiveKind::TarGz => tar::Archive::new(GzDecoder::new(file)).unpack(destination),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn detects_by_extension() {
        assert_eq!(ArchiveKind::detect(Path::new("a/b.zip")), Some(ArchiveKind::Zip));
        assert_eq!(ArchiveKind::detect(Path::new("b.TAR.GZ")), Some(ArchiveKind::TarGz));
        assert_eq!(ArchiveKind::detect(Path::new("b.tgz")), Some(ArchiveKind::TarGz));
        assert_eq!(ArchiveKind::detect(Path::new("b.tar")), Some(ArchiveKind::Tar));
        assert_eq!(ArchiveKind::detect(Path::new("hlds_run")), None);
    }

    #[test]
    fn unpacks_tar_gz() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("server.tar.gz");

        let mut builder = tar::Builder::new(GzEncoder::new(
            File::create(&archive).unwrap(),
            Compression::default(),
        ));
        let content = b"#!/bin/sh\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder
            .append_data(&mut header, "bin/run.sh", &content[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let destination = temp.path().join("out");
        unpack(ArchiveKind::TarGz, &archive, &destination).unwrap();

        assert_eq!(
            std::fs::read(destination.join("bin/run.sh")).unwrap(),
            content
        );
    }

    #[test]
    fn unpacks_zip() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("server.zip");

        let mut writer = zip::ZipWriter::new(File::create(&archive).unwrap());
        writer
            .start_file("cstrike/server.cfg", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"hostname test\n").unwrap();
        writer.finish().unwrap();

        let destination = temp.path().join("out");
        unpack(ArchiveKind::Zip, &archive, &destination).unwrap();

        assert_eq!(
            std::fs::read_to_string(destination.join("cstrike/server.cfg")).unwrap(),
            "hostname test\n"
        );
    }
}
