use std::fs;
use std::io::{self, Read};

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;

use crate::error::KiraError;

pub fn file_exists(path: &Utf8Path) -> bool {
    path.as_std_path().is_file()
}

/// Streams `reader` into a temporary file next to `destination` and renames it into
/// place only once everything was written.
pub fn write_stream_atomic<R: Read>(
    reader: &mut R,
    destination: &Utf8Path,
) -> Result<u64, KiraError> {
    let parent = destination
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".kira-pdb")
        .suffix(".part")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    let written = io::copy(reader, temp.as_file_mut())
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    temp.persist(destination.as_std_path())
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    Ok(written)
}

/// Decompresses `<name>.gz` into `<name>` and removes the archive. On failure the
/// archive is left untouched and no partial output remains.
pub fn gunzip(path: &Utf8Path) -> Result<Utf8PathBuf, KiraError> {
    let target = path
        .as_str()
        .strip_suffix(".gz")
        .map(Utf8PathBuf::from)
        .ok_or_else(|| KiraError::Decompression {
            path: path.to_string(),
            message: "not a .gz file".to_string(),
        })?;
    let file = fs::File::open(path.as_std_path()).map_err(|err| KiraError::Decompression {
        path: path.to_string(),
        message: err.to_string(),
    })?;
    let mut decoder = GzDecoder::new(file);
    write_stream_atomic(&mut decoder, &target).map_err(|err| KiraError::Decompression {
        path: path.to_string(),
        message: err.to_string(),
    })?;
    fs::remove_file(path.as_std_path()).map_err(|err| KiraError::Filesystem(err.to_string()))?;
    Ok(target)
}
