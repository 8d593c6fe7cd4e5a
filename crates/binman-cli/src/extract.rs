//! Tar and zip extraction for downloaded release archives.

use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};

use binman_release::{Extractor, FileKind, ReleaseError, ReleaseResult};
use flate2::read::GzDecoder;
use tracing::debug;
use zip::ZipArchive;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const UNSUPPORTED_MAGIC: [(&str, &[u8]); 3] = [
    ("xz", &[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]),
    ("bzip2", b"BZh"),
    ("zstd", &[0x28, 0xb5, 0x2f, 0xfd]),
];

/// Unpacks tar (optionally gzip compressed) and zip archives.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ArchiveExtractor;

impl Extractor for ArchiveExtractor {
    fn extract(&self, kind: FileKind, archive: &Path, destination: &Path) -> ReleaseResult<()> {
        debug!(
            archive = %archive.display(),
            destination = %destination.display(),
            kind = kind.as_str(),
            "extracting archive"
        );
        match kind {
            FileKind::Tar => extract_tar(archive, destination),
            FileKind::Zip => extract_zip(archive, destination),
            FileKind::Binary => Err(ReleaseError::collaborator(
                "extract.kind",
                invalid_data(format!("{} is not an archive", archive.display())),
            )),
        }
    }
}

fn extract_tar(source: &Path, target: &Path) -> ReleaseResult<()> {
    let mut file =
        File::open(source).map_err(|err| ReleaseError::collaborator("extract_tar.open", err))?;
    let header = sniff(&mut file)?;
    if let Some((name, _)) = UNSUPPORTED_MAGIC
        .iter()
        .find(|(_, magic)| header.starts_with(magic))
    {
        return Err(ReleaseError::collaborator(
            "extract_tar.compression",
            invalid_data(format!("{name} compressed tarballs are not supported")),
        ));
    }
    let reader = BufReader::new(file);
    if header.starts_with(GZIP_MAGIC) {
        unpack_tar(tar::Archive::new(GzDecoder::new(reader)), target)
    } else {
        unpack_tar(tar::Archive::new(reader), target)
    }
}

/// Leading bytes of `file`, leaving the cursor at the start.
fn sniff(file: &mut File) -> ReleaseResult<Vec<u8>> {
    let mut header = Vec::with_capacity(8);
    file.by_ref()
        .take(8)
        .read_to_end(&mut header)
        .map_err(|err| ReleaseError::collaborator("extract_tar.sniff", err))?;
    file.seek(SeekFrom::Start(0))
        .map_err(|err| ReleaseError::collaborator("extract_tar.rewind", err))?;
    Ok(header)
}

fn unpack_tar<R: Read>(mut archive: tar::Archive<R>, target: &Path) -> ReleaseResult<()> {
    archive.set_preserve_permissions(true);
    let entries = archive
        .entries()
        .map_err(|err| ReleaseError::collaborator("extract_tar.entries", err))?;
    for entry in entries {
        let mut entry = entry.map_err(|err| ReleaseError::collaborator("extract_tar.entry", err))?;
        let name = entry
            .path()
            .map_err(|err| ReleaseError::collaborator("extract_tar.path", err))?
            .to_string_lossy()
            .into_owned();
        sanitize_archive_path(&name)?;
        // `unpack_in` refuses entries escaping `target` on its own; the check
        // above turns them into hard errors instead of silent skips.
        entry
            .unpack_in(target)
            .map_err(|err| ReleaseError::collaborator("extract_tar.unpack", err))?;
    }
    Ok(())
}

fn extract_zip(source: &Path, target: &Path) -> ReleaseResult<()> {
    let file =
        File::open(source).map_err(|err| ReleaseError::collaborator("extract_zip.open", err))?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| ReleaseError::collaborator("extract_zip.decode", err))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|err| ReleaseError::collaborator("extract_zip.read_entry", err))?;
        let destination = target.join(sanitize_archive_path(entry.name())?);

        if entry.is_dir() {
            fs::create_dir_all(&destination)
                .map_err(|err| ReleaseError::collaborator("extract_zip.create_dir", err))?;
            continue;
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| ReleaseError::collaborator("extract_zip.create_parent", err))?;
        }
        let mut output = File::create(&destination)
            .map_err(|err| ReleaseError::collaborator("extract_zip.create_file", err))?;
        io::copy(&mut entry, &mut output)
            .map_err(|err| ReleaseError::collaborator("extract_zip.copy", err))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            fs::set_permissions(&destination, fs::Permissions::from_mode(mode))
                .map_err(|err| ReleaseError::collaborator("extract_zip.set_permissions", err))?;
        }
    }
    Ok(())
}

fn sanitize_archive_path(entry: &str) -> ReleaseResult<PathBuf> {
    let path = Path::new(entry);
    if path.is_absolute() {
        return Err(ReleaseError::collaborator(
            "extract.sanitize",
            invalid_data(format!("absolute archive entry {entry}")),
        ));
    }
    let mut sanitized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(segment) => sanitized.push(segment),
            Component::CurDir => {}
            _ => {
                return Err(ReleaseError::collaborator(
                    "extract.sanitize",
                    invalid_data(format!("archive entry escapes destination: {entry}")),
                ));
            }
        }
    }
    Ok(sanitized)
}

fn invalid_data(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}
