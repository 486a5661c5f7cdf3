use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use super::ArchiveError;

/// Packs the content of `dir` into the gzip compressed tarball `dest`.
///
/// The content of `dir` is placed at the root (`./`) of the archive.
pub fn pack(dir: &Path, dest: &Path) -> Result<(), ArchiveError> {
    let file = File::create_new(dest).map_err(ArchiveError::io(dest))?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());

    let mut tar = tar::Builder::new(encoder);
    tar.follow_symlinks(false);
    tar.append_dir_all(".", dir).map_err(ArchiveError::io(dir))?;

    let encoder = tar.into_inner().map_err(ArchiveError::io(dest))?;
    let mut writer = encoder.finish().map_err(ArchiveError::io(dest))?;
    std::io::Write::flush(&mut writer).map_err(ArchiveError::io(dest))?;

    Ok(())
}

/// Extracts the gzip compressed tarball `archive` into `dest`.
pub fn unpack(archive: &Path, dest: &Path) -> Result<(), ArchiveError> {
    let file = File::open(archive).map_err(ArchiveError::io(archive))?;
    let decoder = GzDecoder::new(BufReader::new(file));

    let mut tar = tar::Archive::new(decoder);
    tar.set_preserve_permissions(true);
    tar.unpack(dest).map_err(ArchiveError::io(archive))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn content_is_placed_at_the_archive_root() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("stage");
        fs::create_dir_all(dir.join("mysql")).unwrap();
        fs::write(dir.join("mysql/app.sql"), "CREATE TABLE t;").unwrap();
        let archive = tmp.path().join("backup.tar.gz");

        pack(&dir, &archive).unwrap();

        let decoder = GzDecoder::new(File::open(&archive).unwrap());
        let mut tar = tar::Archive::new(decoder);
        let paths: Vec<String> = tar
            .entries()
            .unwrap()
            .map(|entry| entry.unwrap().path().unwrap().display().to_string())
            .collect();
        assert!(paths.iter().any(|p| p.trim_start_matches("./") == "mysql/app.sql"));
        assert!(paths.iter().all(|p| !p.contains("stage")));
    }

    #[test]
    fn unpack_restores_packed_content() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("stage");
        fs::create_dir_all(dir.join("files/etc")).unwrap();
        fs::write(dir.join("files/etc/hosts"), "127.0.0.1 localhost").unwrap();
        let archive = tmp.path().join("backup.tar.gz");
        let dest = tmp.path().join("unpacked");

        pack(&dir, &archive).unwrap();
        unpack(&archive, &dest).unwrap();

        assert_eq!(
            fs::read_to_string(dest.join("files/etc/hosts")).unwrap(),
            "127.0.0.1 localhost"
        );
    }

    #[test]
    fn pack_refuses_to_overwrite() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("backup.tar.gz");
        fs::write(&archive, "").unwrap();

        assert!(pack(tmp.path(), &archive).is_err());
    }
}
