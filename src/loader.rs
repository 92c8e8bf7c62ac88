//! Document discovery and loading.
//!
//! [`discover`] scans the ingestion directory (non-recursively) for files
//! whose extension is in [`SUPPORTED_EXTENSIONS`]; everything else is skipped
//! silently. [`DocumentLoader`] turns paths into [`NormalizedDocument`]s
//! lazily, one result per path, so a single unreadable file never stops the
//! files after it.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::{PipelineError, Result};
use crate::extract;
use crate::models::{NormalizedDocument, SourceFile, SUPPORTED_EXTENSIONS};

/// Lists supported files directly under `dir`, sorted by path.
///
/// Fails with [`PipelineError::ConversionFailure`] only if `dir` itself
/// cannot be read.
pub fn discover(dir: &Path) -> Result<Vec<SourceFile>> {
    if !dir.is_dir() {
        return Err(PipelineError::conversion(
            dir,
            "ingestion directory does not exist",
        ));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| PipelineError::conversion(dir, e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(file) = SourceFile::detect(entry.path()) {
            files.push(file);
        }
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));

    tracing::debug!(
        dir = %dir.display(),
        found = files.len(),
        extensions = %SUPPORTED_EXTENSIONS.join(","),
        "discovered documents"
    );
    Ok(files)
}

/// Reads and converts one file.
pub fn load_file(file: &SourceFile, max_bytes: u64) -> Result<NormalizedDocument> {
    let path = &file.path;
    let size = std::fs::metadata(path)
        .map_err(|e| PipelineError::conversion(path, e))?
        .len();
    if size > max_bytes {
        return Err(PipelineError::conversion(
            path,
            format!("file is {} bytes, limit is {}", size, max_bytes),
        ));
    }

    let bytes = std::fs::read(path).map_err(|e| PipelineError::conversion(path, e))?;
    let text = extract::extract_text(&bytes, file).map_err(|e| PipelineError::conversion(path, e))?;
    if text.trim().is_empty() {
        return Err(PipelineError::conversion(path, "no extractable text"));
    }

    Ok(normalized(path.clone(), text))
}

/// Like [`load_file`], but classifies the path first.
pub fn load_path(path: &Path, max_bytes: u64) -> Result<NormalizedDocument> {
    let file = SourceFile::detect(path).ok_or_else(|| PipelineError::UnsupportedFormat {
        path: path.to_path_buf(),
    })?;
    load_file(&file, max_bytes)
}

/// Converts on the blocking pool; a panic inside a converter becomes a
/// [`PipelineError::ConversionFailure`] for that file only.
pub async fn load_path_blocking(path: PathBuf, max_bytes: u64) -> Result<NormalizedDocument> {
    let for_error = path.clone();
    tokio::task::spawn_blocking(move || load_path(&path, max_bytes))
        .await
        .unwrap_or_else(|e| {
            Err(PipelineError::conversion(
                for_error,
                format!("converter crashed: {}", e),
            ))
        })
}

pub fn normalized(source_path: PathBuf, text: String) -> NormalizedDocument {
    let content_hash = hex::encode(Sha256::digest(text.as_bytes()));
    NormalizedDocument {
        source_path,
        text,
        content_hash,
    }
}

/// Lazily loads a fixed list of paths. Stateless between calls, so it can
/// be re-run. Every failure is logged here and returned for that path only.
#[derive(Debug, Clone)]
pub struct DocumentLoader {
    paths: Vec<PathBuf>,
    max_bytes: u64,
}

impl DocumentLoader {
    pub fn new(paths: Vec<PathBuf>, max_bytes: u64) -> Self {
        Self { paths, max_bytes }
    }

    /// Loader over the supported files directly under `dir`.
    pub fn from_dir(dir: &Path, max_bytes: u64) -> Result<Self> {
        let paths = discover(dir)?.into_iter().map(|f| f.path).collect();
        Ok(Self::new(paths, max_bytes))
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Loads on the calling thread, one result per path.
    pub fn iter(&self) -> impl Iterator<Item = Result<NormalizedDocument>> + '_ {
        self.paths
            .iter()
            .map(move |path| logged(path, load_path(path, self.max_bytes)))
    }

    /// Loads one path on the blocking pool.
    pub async fn load(&self, path: &Path) -> Result<NormalizedDocument> {
        let result = load_path_blocking(path.to_path_buf(), self.max_bytes).await;
        logged(path, result)
    }
}

fn logged(path: &Path, result: Result<NormalizedDocument>) -> Result<NormalizedDocument> {
    if let Err(e) = &result {
        tracing::warn!(path = %path.display(), error = %e, "skipping document");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn discover_filters_extensions_and_does_not_recurse() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();
        fs::write(dir.join("b.md"), "# B").unwrap();
        fs::write(dir.join("a.TXT"), "a").unwrap();
        fs::write(dir.join("photo.png"), [0u8, 1, 2]).unwrap();
        fs::write(dir.join("notes"), "no extension").unwrap();
        fs::create_dir(dir.join("nested")).unwrap();
        fs::write(dir.join("nested").join("c.md"), "# C").unwrap();

        let files = discover(dir).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.TXT", "b.md"]);
    }

    #[test]
    fn discover_missing_dir_fails() {
        let tmp = TempDir::new().unwrap();
        let err = discover(&tmp.path().join("missing")).unwrap_err();
        assert_eq!(err.code(), "conversion_failure");
    }

    #[test]
    fn loader_isolates_failures() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();
        fs::write(dir.join("1.md"), "first file").unwrap();
        fs::write(dir.join("2.docx"), "definitely not a zip").unwrap();
        fs::write(dir.join("3.txt"), "third file").unwrap();

        let paths = vec![dir.join("1.md"), dir.join("2.docx"), dir.join("3.txt")];
        let loader = DocumentLoader::new(paths, 1024 * 1024);
        let results: Vec<_> = loader.iter().collect();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().text, "first file");
        assert!(matches!(
            results[1],
            Err(PipelineError::ConversionFailure { .. })
        ));
        assert_eq!(results[2].as_ref().unwrap().text, "third file");

        // restartable
        assert_eq!(loader.iter().filter(|r| r.is_ok()).count(), 2);
    }

    #[tokio::test]
    async fn loader_from_dir_loads_on_the_blocking_pool() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();
        fs::write(dir.join("a.md"), "alpha").unwrap();
        fs::write(dir.join("b.pptx"), "not a zip").unwrap();
        fs::write(dir.join("skip.png"), [0u8]).unwrap();

        let loader = DocumentLoader::from_dir(dir, 1024).unwrap();
        assert_eq!(loader.paths().len(), 2);

        let first = loader.load(&loader.paths()[0]).await.unwrap();
        assert_eq!(first.text, "alpha");
        let err = loader.load(&loader.paths()[1]).await.unwrap_err();
        assert_eq!(err.code(), "conversion_failure");
        assert!(err.to_string().contains("b.pptx"));
    }

    #[test]
    fn unsupported_path_reports_format() {
        let err = load_path(Path::new("diagram.png"), 10).unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFormat { .. }));
    }

    #[test]
    fn oversized_and_empty_files_fail() {
        let tmp = TempDir::new().unwrap();
        let big = tmp.path().join("big.txt");
        fs::write(&big, "x".repeat(100)).unwrap();
        assert!(load_path(&big, 10).is_err());

        let blank = tmp.path().join("blank.md");
        fs::write(&blank, "  \n\n ").unwrap();
        let err = load_path(&blank, 1024).unwrap_err();
        assert!(err.to_string().contains("no extractable text"));
    }

    #[test]
    fn content_hash_is_stable() {
        let a = normalized(PathBuf::from("a.md"), "same".into());
        let b = normalized(PathBuf::from("b.md"), "same".into());
        assert_eq!(a.content_hash, b.content_hash);
        assert_eq!(a.content_hash.len(), 64);
    }
}
