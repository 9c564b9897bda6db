use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Writes `bytes` to `path` through a temporary file in the same directory,
/// renamed into place once fully written. On failure the temporary file is
/// removed and `path` is left untouched.
pub fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("cannot create a temporary file in {}", dir.display()))?;
    tmp.write_all(bytes)
        .with_context(|| format!("cannot write {} bytes", bytes.len()))?;
    tmp.as_file()
        .sync_all()
        .context("cannot flush the temporary file")?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("cannot move the output into {}", path.display()))?;
    debug!(target: "output", path = %path.display(), bytes = bytes.len(), "Output written");
    Ok(())
}

/// `<dir>/<stem>_modified.<ext>` next to `source`.
pub fn modified_sibling(source: &Path, fallback_ext: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    let ext = source
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or(fallback_ext);
    source.with_file_name(format!("{}_modified.{}", stem, ext))
}

/// `<output>.log.json`
pub fn log_path_for(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_os_string();
    name.push(".log.json");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sibling_and_log_names() {
        let out = modified_sibling(Path::new("/data/brochure.pdf"), "pdf");
        assert_eq!(out, PathBuf::from("/data/brochure_modified.pdf"));
        assert_eq!(
            log_path_for(&out),
            PathBuf::from("/data/brochure_modified.pdf.log.json")
        );
        assert_eq!(
            modified_sibling(Path::new("notes"), "txt"),
            PathBuf::from("notes_modified.txt")
        );
    }

    #[test]
    fn writes_and_replaces_files() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.txt");
        write_atomically(&target, b"first").unwrap();
        write_atomically(&target, b"second").unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"second");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn missing_directory_fails_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("missing").join("out.txt");
        assert!(write_atomically(&target, b"data").is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
