//! Upload intake for transcripts, codebases and wireframes.
//!
//! Text uploads land in the ingestion directory, where the next index run
//! picks them up. Wireframes are stored under `<ingest.dir>/wireframes/`,
//! which discovery never descends into, since images carry no extractable
//! text.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::error::PipelineError;

const TRANSCRIPT_EXTENSIONS: &[&str] = &["txt", "md", "json", "srt", "vtt"];
const WIREFRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "svg", "pdf"];
const MAX_ARCHIVE_ENTRIES: usize = 10_000;
const MAX_ARCHIVE_ENTRY_BYTES: u64 = 10 * 1024 * 1024;

pub const WIREFRAME_DIR: &str = "wireframes";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadKind {
    Transcript,
    Codebase,
    Wireframe,
}

impl FromStr for UploadKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "transcript" => Ok(UploadKind::Transcript),
            "codebase" => Ok(UploadKind::Codebase),
            "wireframe" => Ok(UploadKind::Wireframe),
            other => Err(PipelineError::InvalidRequest(format!(
                "unknown upload kind '{}': expected transcript, codebase or wireframe",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub kind: UploadKind,
    pub filename: String,
    pub size: usize,
    pub stored: Vec<PathBuf>,
    /// Entries of an archive that were skipped as binary or oversized.
    pub skipped: usize,
    /// Whether the next index run will pick the files up.
    pub indexable: bool,
}

/// Reduces an untrusted name to a single safe path component.
pub fn sanitize_file_name(name: &str) -> std::result::Result<String, PipelineError> {
    let base = name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        return Err(PipelineError::InvalidRequest(format!(
            "invalid file name '{}'",
            name
        )));
    }
    Ok(cleaned)
}

fn extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

/// Stores one upload. `project` names a codebase; it defaults to the
/// archive's file stem.
pub fn store_upload(
    ingest_dir: &Path,
    kind: UploadKind,
    filename: &str,
    bytes: &[u8],
    project: Option<&str>,
) -> Result<UploadOutcome> {
    let filename = sanitize_file_name(filename)?;
    let ext = extension(&filename).unwrap_or_default();
    let mut outcome = UploadOutcome {
        kind,
        filename: filename.clone(),
        size: bytes.len(),
        stored: Vec::new(),
        skipped: 0,
        indexable: kind != UploadKind::Wireframe,
    };

    match kind {
        UploadKind::Transcript => {
            if !TRANSCRIPT_EXTENSIONS.contains(&ext.as_str()) {
                return Err(unsupported(&filename, TRANSCRIPT_EXTENSIONS).into());
            }
            let text = utf8(&filename, bytes)?;
            let target = if ext == "txt" || ext == "md" {
                filename.clone()
            } else {
                format!("{}.txt", filename)
            };
            outcome.stored.push(write(ingest_dir, &target, text.as_bytes())?);
        }
        UploadKind::Codebase => {
            let project = match project {
                Some(p) => sanitize_file_name(p)?,
                None => sanitize_file_name(
                    Path::new(&filename)
                        .file_stem()
                        .map(|s| s.to_string_lossy())
                        .as_deref()
                        .unwrap_or("codebase"),
                )?,
            };
            if ext == "zip" {
                let (files, skipped) = unpack_codebase(bytes)
                    .map_err(|e| PipelineError::conversion(&filename, e))?;
                outcome.skipped = skipped;
                for (path, text) in files {
                    let flat = sanitize_file_name(&format!(
                        "{}__{}.txt",
                        project,
                        path.replace(['/', '\\'], "__")
                    ))?;
                    outcome.stored.push(write(ingest_dir, &flat, text.as_bytes())?);
                }
            } else {
                let text = utf8(&filename, bytes)?;
                let flat = format!("{}__{}.txt", project, filename);
                outcome.stored.push(write(ingest_dir, &flat, text.as_bytes())?);
            }
        }
        UploadKind::Wireframe => {
            if !WIREFRAME_EXTENSIONS.contains(&ext.as_str()) {
                return Err(unsupported(&filename, WIREFRAME_EXTENSIONS).into());
            }
            let dir = ingest_dir.join(WIREFRAME_DIR);
            outcome.stored.push(write(&dir, &filename, bytes)?);
        }
    }

    tracing::info!(
        kind = ?kind,
        filename = %outcome.filename,
        size = outcome.size,
        stored = outcome.stored.len(),
        skipped = outcome.skipped,
        "upload stored"
    );
    Ok(outcome)
}

fn unsupported(filename: &str, allowed: &[&str]) -> PipelineError {
    PipelineError::InvalidRequest(format!(
        "unsupported file type for '{}': expected one of {}",
        filename,
        allowed.join(", ")
    ))
}

fn utf8<'a>(filename: &str, bytes: &'a [u8]) -> std::result::Result<&'a str, PipelineError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    std::str::from_utf8(bytes).map_err(|_| {
        PipelineError::InvalidRequest(format!("'{}' is not valid UTF-8 text", filename))
    })
}

fn write(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    let path = dir.join(name);
    std::fs::write(&path, bytes)
        .with_context(|| format!("Failed to write upload: {}", path.display()))?;
    Ok(path)
}

/// UTF-8 text entries of a zip archive as `(path, text)`, plus the number
/// of entries skipped as binary, oversized or unreadable.
fn unpack_codebase(bytes: &[u8]) -> Result<(Vec<(String, String)>, usize)> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).context("not a zip archive")?;
    if archive.len() > MAX_ARCHIVE_ENTRIES {
        anyhow::bail!(
            "archive has {} entries, limit is {}",
            archive.len(),
            MAX_ARCHIVE_ENTRIES
        );
    }

    let mut files = Vec::new();
    let mut skipped = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let Some(path) = entry.enclosed_name() else {
            skipped += 1;
            continue;
        };
        let path = path.to_string_lossy().to_string();
        if entry.size() > MAX_ARCHIVE_ENTRY_BYTES {
            skipped += 1;
            continue;
        }

        let mut buf = Vec::new();
        if (&mut entry)
            .take(MAX_ARCHIVE_ENTRY_BYTES)
            .read_to_end(&mut buf)
            .is_err()
        {
            skipped += 1;
            continue;
        }
        match String::from_utf8(buf) {
            Ok(text) if !text.trim().is_empty() && !text.contains('\0') => {
                files.push((path, text))
            }
            _ => skipped += 1,
        }
    }
    Ok((files, skipped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn zip_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default();
            for (name, data) in entries {
                zip.start_file(*name, options).unwrap();
                zip.write_all(data).unwrap();
            }
            zip.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn sanitizes_names() {
        assert_eq!(sanitize_file_name("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(sanitize_file_name("C:\\tmp\\notes.txt").unwrap(), "notes.txt");
        assert_eq!(sanitize_file_name("my file?.md").unwrap(), "my file_.md");
        assert_eq!(sanitize_file_name("..hidden").unwrap(), "hidden");
        assert!(sanitize_file_name("..").is_err());
        assert!(sanitize_file_name("dir/").is_err());
    }

    #[test]
    fn transcript_formats() {
        let tmp = TempDir::new().unwrap();
        let out = store_upload(
            tmp.path(),
            UploadKind::Transcript,
            "standup.vtt",
            b"WEBVTT\n\n00:01 hello",
            None,
        )
        .unwrap();
        assert_eq!(out.stored, vec![tmp.path().join("standup.vtt.txt")]);
        assert!(out.indexable);

        let err = store_upload(tmp.path(), UploadKind::Transcript, "audio.mp3", b"x", None)
            .unwrap_err();
        let pe = err.downcast_ref::<PipelineError>().unwrap();
        assert_eq!(pe.code(), "bad_request");
    }

    #[test]
    fn codebase_zip_is_flattened() {
        let tmp = TempDir::new().unwrap();
        let bytes = zip_with(&[
            ("src/main.rs", b"fn main() {}"),
            ("assets/logo.png", &[0u8, 159, 146, 150]),
            ("README.md", b"# Demo"),
        ]);
        let out = store_upload(
            tmp.path(),
            UploadKind::Codebase,
            "demo.zip",
            &bytes,
            Some("demo"),
        )
        .unwrap();
        assert_eq!(out.stored.len(), 2);
        assert_eq!(out.skipped, 1);
        assert!(tmp.path().join("demo__src__main.rs.txt").exists());
        assert!(tmp.path().join("demo__README.md.txt").exists());
    }

    #[test]
    fn wireframes_are_kept_out_of_discovery() {
        let tmp = TempDir::new().unwrap();
        let out = store_upload(tmp.path(), UploadKind::Wireframe, "home.png", b"\x89PNG", None)
            .unwrap();
        assert!(!out.indexable);
        assert_eq!(out.stored, vec![tmp.path().join(WIREFRAME_DIR).join("home.png")]);
        assert!(crate::loader::discover(tmp.path()).unwrap().is_empty());
    }

    #[test]
    fn parses_kinds() {
        assert_eq!("codebase".parse::<UploadKind>().unwrap(), UploadKind::Codebase);
        assert!("video".parse::<UploadKind>().is_err());
    }
}
