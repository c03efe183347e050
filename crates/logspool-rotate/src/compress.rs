use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;

use crate::naming::COMPRESSED_SUFFIX;

/// Gzip `source` next to itself and remove the original
///
/// The archive is written under a temporary name, synced, renamed into place
/// and given the original modification time; only then is `source` removed.
pub fn gzip_in_place(source: &Path) -> io::Result<PathBuf> {
    let file_name = source
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?
        .to_string_lossy()
        .into_owned();
    let target = source.with_file_name(format!("{}{}", file_name, COMPRESSED_SUFFIX));
    let tmp = source.with_file_name(format!("{}{}.tmp", file_name, COMPRESSED_SUFFIX));

    if let Err(e) = write_archive(source, &tmp) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    if let Err(e) = fs::rename(&tmp, &target) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::remove_file(source)?;
    Ok(target)
}

fn write_archive(source: &Path, tmp: &Path) -> io::Result<()> {
    let mut input = File::open(source)?;
    let modified = input.metadata()?.modified()?;

    let output = File::create(tmp)?;
    let mut encoder = GzEncoder::new(output, Compression::default());
    io::copy(&mut input, &mut encoder)?;
    let output = encoder.finish()?;
    output.sync_all()?;
    output.set_modified(modified)?;
    Ok(())
}
