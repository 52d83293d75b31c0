// restorecheck/src/backup/archive.rs
use flate2::read::MultiGzDecoder;
use log::info;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::errors::{RestoreError, Result};
use crate::utils::scratch::DumpFile;

/// One decodable layer, identified by its filename suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layer {
    Gzip,
    Tar,
}

impl Layer {
    fn from_ext(ext: &str) -> Option<Self> {
        match ext {
            ".gz" => Some(Layer::Gzip),
            ".tar" => Some(Layer::Tar),
            _ => None,
        }
    }
}

/// Splits the last `.suffix` off a file name.
///
/// The extension keeps its leading dot and is empty when there is none. Dots
/// in parent directories are not considered.
pub fn split_ext(filename: &str) -> (&str, &str) {
    let base_start = filename.rfind('/').map_or(0, |i| i + 1);
    match filename[base_start..].rfind('.') {
        Some(dot) => filename.split_at(base_start + dot),
        None => (filename, ""),
    }
}

/// Peels `.gz` and `.tar` layers off a dump until an unrecognised suffix
/// remains.
///
/// Every decoded layer is written to `scratch_dir` under the name with its
/// suffix stripped, so the next iteration sees the next suffix. The previous
/// layer's file is released as soon as it has been consumed.
#[derive(Debug, Clone)]
pub struct Extractor {
    scratch_dir: PathBuf,
}

impl Extractor {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self { scratch_dir: scratch_dir.into() }
    }

    pub fn extract(&self, mut current: DumpFile) -> Result<DumpFile> {
        loop {
            let file_name = current
                .path()
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    RestoreError::Extraction(format!(
                        "Dump path has no file name: {}",
                        current.path().display()
                    ))
                })?;

            let (stem, ext) = split_ext(&file_name);
            let Some(layer) = Layer::from_ext(ext) else {
                info!("Payload ready: {}", current.path().display());
                return Ok(current);
            };

            let output_path = self.scratch_dir.join(stem);
            if output_path == current.path() {
                return Err(RestoreError::Extraction(format!(
                    "Refusing to overwrite {} with its own contents",
                    output_path.display()
                )));
            }

            info!("Extracting {} ({:?})", current.path().display(), layer);
            let output = DumpFile::owned(&output_path);
            match layer {
                Layer::Gzip => decompress_gzip(current.path(), output.path())?,
                Layer::Tar => unpack_first_entry(current.path(), output.path())?,
            }
            info!("✓ Extracted to {}", output.path().display());

            // Dropping the consumed layer deletes it if this process owns it.
            current = output;
        }
    }
}

fn decompress_gzip(input: &Path, output: &Path) -> Result<()> {
    let reader = open_layer(input)?;
    let mut decoder = MultiGzDecoder::new(reader);
    copy_into(&mut decoder, input, output)
}

/// Only the first member of a tar archive is surfaced; the rest are ignored.
fn unpack_first_entry(input: &Path, output: &Path) -> Result<()> {
    let reader = open_layer(input)?;
    let mut archive = tar::Archive::new(reader);
    let mut entries = archive.entries().map_err(|e| {
        RestoreError::Extraction(format!("Failed to read tar archive {}: {}", input.display(), e))
    })?;

    let mut entry = match entries.next() {
        Some(entry) => entry.map_err(|e| {
            RestoreError::Extraction(format!(
                "Failed to read first entry of {}: {}",
                input.display(),
                e
            ))
        })?,
        None => {
            return Err(RestoreError::Extraction(format!(
                "Reached end of input before any entry was read in {}",
                input.display()
            )));
        }
    };

    if let Ok(member) = entry.path() {
        info!("Reading tar member {}", member.display());
    }
    copy_into(&mut entry, input, output)
}

fn open_layer(input: &Path) -> Result<File> {
    File::open(input).map_err(|e| {
        RestoreError::Extraction(format!("Failed to open {}: {}", input.display(), e))
    })
}

fn copy_into<R: Read>(reader: &mut R, input: &Path, output: &Path) -> Result<()> {
    let mut out_file = File::create(output).map_err(|e| {
        RestoreError::Extraction(format!("Failed to create {}: {}", output.display(), e))
    })?;
    io::copy(reader, &mut out_file).map_err(|e| {
        RestoreError::Extraction(format!(
            "Failed to decode {} into {}: {}",
            input.display(),
            output.display(),
            e
        ))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const PAYLOAD: &[u8] = b"CREATE TABLE t (id INT);\nINSERT INTO t VALUES (1),(2),(3);\n";

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(bytes).unwrap();
        enc.finish().unwrap()
    }

    fn tar_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn test_split_ext() {
        assert_eq!(split_ext("test.txt"), ("test", ".txt"));
        assert_eq!(split_ext("test.tar.gz"), ("test.tar", ".gz"));
        assert_eq!(split_ext("test.tar.gz.aaa.iii.uuu.eee"), ("test.tar.gz.aaa.iii.uuu", ".eee"));
        assert_eq!(split_ext("a.b.c.d"), ("a.b.c", ".d"));
        assert_eq!(split_ext("test"), ("test", ""));
        assert_eq!(split_ext("/tmp/dir.d/dump"), ("/tmp/dir.d/dump", ""));
    }

    #[test]
    fn test_extract_tar_gz_chain() -> anyhow::Result<()> {
        let input_dir = tempfile::tempdir()?;
        let scratch = tempfile::tempdir()?;
        let archive = input_dir.path().join("test.sql.tar.gz");
        std::fs::write(&archive, gzip(&tar_of(&[("dump.sql", PAYLOAD)])))?;

        let payload = Extractor::new(scratch.path()).extract(DumpFile::owned(&archive))?;

        assert_eq!(payload.path(), scratch.path().join("test.sql"));
        assert_eq!(std::fs::read(payload.path())?, PAYLOAD);
        assert!(!archive.exists(), "owned input should be released");
        assert!(!scratch.path().join("test.sql.tar").exists(), "intermediate layer should be released");
        Ok(())
    }

    #[test]
    fn test_extract_double_gzip() -> anyhow::Result<()> {
        let scratch = tempfile::tempdir()?;
        let archive = scratch.path().join("dump.sql.gz.gz");
        std::fs::write(&archive, gzip(&gzip(PAYLOAD)))?;

        let payload = Extractor::new(scratch.path()).extract(DumpFile::owned(&archive))?;
        assert_eq!(std::fs::read(payload.path())?, PAYLOAD);
        Ok(())
    }

    #[test]
    fn test_borrowed_input_survives_extraction() -> anyhow::Result<()> {
        let input_dir = tempfile::tempdir()?;
        let scratch = tempfile::tempdir()?;
        let archive = input_dir.path().join("dump.sql.gz");
        std::fs::write(&archive, gzip(PAYLOAD))?;

        let payload = Extractor::new(scratch.path()).extract(DumpFile::borrowed(&archive))?;
        assert!(archive.exists());
        assert!(payload.is_owned());

        let payload_path = payload.path().to_path_buf();
        drop(payload);
        assert!(!payload_path.exists());
        Ok(())
    }

    #[test]
    fn test_plain_file_is_returned_unchanged() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let dump = dir.path().join("dump.sql");
        std::fs::write(&dump, PAYLOAD)?;

        let payload = Extractor::new(dir.path()).extract(DumpFile::borrowed(&dump))?;
        assert_eq!(payload.path(), dump);
        assert!(!payload.is_owned());
        Ok(())
    }

    #[test]
    fn test_multi_entry_tar_yields_first_member() -> anyhow::Result<()> {
        let scratch = tempfile::tempdir()?;
        let archive = scratch.path().join("bundle.tar");
        std::fs::write(&archive, tar_of(&[("first.sql", b"first"), ("second.sql", b"second")]))?;

        let payload = Extractor::new(scratch.path()).extract(DumpFile::owned(&archive))?;
        assert_eq!(std::fs::read(payload.path())?, b"first");
        Ok(())
    }

    #[test]
    fn test_empty_tar_is_an_error() -> anyhow::Result<()> {
        let scratch = tempfile::tempdir()?;
        let archive = scratch.path().join("empty.tar");
        std::fs::write(&archive, tar_of(&[]))?;

        let err = Extractor::new(scratch.path())
            .extract(DumpFile::owned(&archive))
            .unwrap_err();
        assert!(matches!(err, RestoreError::Extraction(_)), "{err}");
        Ok(())
    }

    #[test]
    fn test_corrupt_gzip_is_an_error() -> anyhow::Result<()> {
        let scratch = tempfile::tempdir()?;
        let archive = scratch.path().join("broken.sql.gz");
        std::fs::write(&archive, b"definitely not gzip")?;

        let err = Extractor::new(scratch.path())
            .extract(DumpFile::owned(&archive))
            .unwrap_err();
        assert!(matches!(err, RestoreError::Extraction(_)), "{err}");
        assert!(!scratch.path().join("broken.sql").exists(), "partial output should be removed");
        Ok(())
    }
}
