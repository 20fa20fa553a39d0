//! Input validation: reject anything that is not a readable, non-empty PDF
//! before the run creates a single scratch file.

use crate::error::PaperError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Validate the uploaded file and return its path.
///
/// Checks, in order: existence, `.pdf` extension, read permission,
/// non-empty content, and the `%PDF` magic bytes.
pub fn validate_pdf(path: &Path) -> Result<PathBuf, PaperError> {
    let path = path.to_path_buf();

    if !path.is_file() {
        return Err(PaperError::FileNotFound { path });
    }

    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    if !is_pdf {
        return Err(PaperError::UnsupportedFormat { path });
    }

    let mut file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(PaperError::PermissionDenied { path });
        }
        Err(e) => return Err(PaperError::io(path, e)),
    };

    let mut magic = [0u8; 4];
    let mut read = 0;
    while read < magic.len() {
        match file.read(&mut magic[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(e) => return Err(PaperError::io(path, e)),
        }
    }
    if read == 0 {
        return Err(PaperError::EmptyFile { path });
    }
    if read < magic.len() || &magic != b"%PDF" {
        return Err(PaperError::NotAPdf { path, magic });
    }

    debug!("Validated PDF: {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        path
    }

    #[test]
    fn accepts_pdf_magic() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_file(tmp.path(), "paper.pdf", b"%PDF-1.7\n...");
        assert_eq!(validate_pdf(&path).unwrap(), path);
    }

    #[test]
    fn extension_is_case_insensitive() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_file(tmp.path(), "PAPER.PDF", b"%PDF-1.4");
        assert!(validate_pdf(&path).is_ok());
    }

    #[test]
    fn missing_file() {
        let err = validate_pdf(Path::new("/definitely/not/here.pdf")).unwrap_err();
        assert!(matches!(err, PaperError::FileNotFound { .. }));
    }

    #[test]
    fn wrong_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_file(tmp.path(), "paper.docx", b"%PDF-1.7");
        assert!(matches!(
            validate_pdf(&path).unwrap_err(),
            PaperError::UnsupportedFormat { .. }
        ));
    }

    #[test]
    fn empty_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_file(tmp.path(), "empty.pdf", b"");
        assert!(matches!(validate_pdf(&path).unwrap_err(), PaperError::EmptyFile { .. }));
    }

    #[test]
    fn wrong_magic() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_file(tmp.path(), "fake.pdf", b"PK\x03\x04zip");
        match validate_pdf(&path).unwrap_err() {
            PaperError::NotAPdf { magic, .. } => assert_eq!(&magic, b"PK\x03\x04"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn short_file_is_not_a_pdf() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_file(tmp.path(), "short.pdf", b"%P");
        assert!(matches!(validate_pdf(&path).unwrap_err(), PaperError::NotAPdf { .. }));
    }
}
