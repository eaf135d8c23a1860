//! Directory scanning and per-file extraction.
//!
//! [`DocumentScanner`] walks the documents root lazily in file-name
//! order and yields one [`ScanEntry`] per regular file. Excluded paths
//! are dropped silently; files with an unsupported extension come back
//! as skips so the run report accounts for them. [`read_document`] turns
//! a candidate into a [`RawDocument`] or a [`SkipReason`].

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use docvec_core::models::RawDocument;

use crate::config::DocumentsConfig;
use crate::extract::{extract_text, is_blank};
use crate::report::SkipReason;

/// A file that passed the extension and exclude filters.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub path: PathBuf,
    /// Path relative to the scan root, `/`-separated.
    pub source_id: String,
    pub filename: String,
    pub extension: String,
    pub size: u64,
}

#[derive(Debug)]
pub enum ScanEntry {
    Candidate(Candidate),
    Skipped { source_id: String, reason: SkipReason },
}

pub struct DocumentScanner {
    root: PathBuf,
    walker: walkdir::IntoIter,
    extensions: Vec<String>,
    excludes: GlobSet,
}

impl DocumentScanner {
    pub fn new(config: &DocumentsConfig) -> Result<Self> {
        let root = &config.root;
        if !root.is_dir() {
            bail!("Documents directory does not exist: {}", root.display());
        }

        let mut excludes = vec!["**/.git/**".to_string()];
        excludes.extend(config.exclude_globs.iter().cloned());
        let excludes = build_globset(&excludes)?;

        let max_depth = if config.recursive { usize::MAX } else { 1 };
        let walker = WalkDir::new(root)
            .follow_links(config.follow_symlinks)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter();

        Ok(Self {
            root: root.clone(),
            walker,
            extensions: config
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            excludes,
        })
    }

    fn relative_id(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl Iterator for DocumentScanner {
    type Item = ScanEntry;

    fn next(&mut self) -> Option<ScanEntry> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    let source_id = err
                        .path()
                        .map(|p| self.relative_id(p))
                        .unwrap_or_else(|| "<unknown>".to_string());
                    tracing::warn!(file = %source_id, error = %err, "cannot read directory entry");
                    return Some(ScanEntry::Skipped {
                        source_id,
                        reason: SkipReason::Unreadable(err.to_string()),
                    });
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let source_id = self.relative_id(path);
            if self.excludes.is_match(&source_id) {
                tracing::debug!(file = %source_id, "excluded");
                continue;
            }

            let extension = path
                .extension()
                .map(|e| e.to_string_lossy().to_ascii_lowercase())
                .unwrap_or_default();
            if !self.extensions.contains(&extension) {
                tracing::info!(file = %source_id, "skipping unsupported file");
                return Some(ScanEntry::Skipped {
                    source_id,
                    reason: SkipReason::UnsupportedExtension(extension),
                });
            }

            let size = match entry.metadata() {
                Ok(meta) => meta.len(),
                Err(err) => {
                    return Some(ScanEntry::Skipped {
                        source_id,
                        reason: SkipReason::Unreadable(err.to_string()),
                    })
                }
            };
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| source_id.clone());

            return Some(ScanEntry::Candidate(Candidate {
                path: path.to_path_buf(),
                source_id,
                filename,
                extension,
                size,
            }));
        }
    }
}

/// Read and extract one candidate. Blocking; run it off the async runtime.
pub fn read_document(candidate: &Candidate, max_file_bytes: u64) -> Result<RawDocument, SkipReason> {
    if candidate.size > max_file_bytes {
        tracing::warn!(
            file = %candidate.source_id,
            bytes = candidate.size,
            "file exceeds size limit"
        );
        return Err(SkipReason::TooLarge {
            bytes: candidate.size,
            limit: max_file_bytes,
        });
    }

    let bytes = std::fs::read(&candidate.path).map_err(|e| {
        tracing::warn!(file = %candidate.source_id, error = %e, "cannot read file");
        SkipReason::Unreadable(e.to_string())
    })?;

    let text = extract_text(&bytes, &candidate.extension).map_err(|e| {
        tracing::warn!(file = %candidate.source_id, error = %e, "extraction failed");
        SkipReason::Unreadable(e.to_string())
    })?;

    if is_blank(&text) {
        tracing::warn!(file = %candidate.source_id, "no text extracted, skipping");
        return Err(SkipReason::NoExtractableText);
    }

    Ok(RawDocument {
        source_id: candidate.source_id.clone(),
        filename: candidate.filename.clone(),
        text,
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn docs_config(root: &Path) -> DocumentsConfig {
        DocumentsConfig {
            root: root.to_path_buf(),
            extensions: vec!["pdf".into(), "txt".into()],
            ..DocumentsConfig::default()
        }
    }

    fn collect(scanner: DocumentScanner) -> (Vec<String>, Vec<(String, SkipReason)>) {
        let mut found = Vec::new();
        let mut skipped = Vec::new();
        for entry in scanner {
            match entry {
                ScanEntry::Candidate(c) => found.push(c.source_id),
                ScanEntry::Skipped { source_id, reason } => skipped.push((source_id, reason)),
            }
        }
        (found, skipped)
    }

    #[test]
    fn test_missing_root_is_error() {
        let tmp = TempDir::new().unwrap();
        let cfg = docs_config(&tmp.path().join("nope"));
        assert!(DocumentScanner::new(&cfg).is_err());
    }

    #[test]
    fn test_sorted_and_filtered() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.txt"), "bee").unwrap();
        fs::write(tmp.path().join("a.txt"), "ay").unwrap();
        fs::write(tmp.path().join("notes.docx"), "x").unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub/c.txt"), "sea").unwrap();

        let (found, skipped) = collect(DocumentScanner::new(&docs_config(tmp.path())).unwrap());
        assert_eq!(found, vec!["a.txt", "b.txt"]);
        assert_eq!(
            skipped,
            vec![(
                "notes.docx".to_string(),
                SkipReason::UnsupportedExtension("docx".into())
            )]
        );
    }

    #[test]
    fn test_recursive_with_excludes() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("sub/drafts")).unwrap();
        fs::write(tmp.path().join("sub/c.txt"), "sea").unwrap();
        fs::write(tmp.path().join("sub/drafts/d.txt"), "dee").unwrap();

        let mut cfg = docs_config(tmp.path());
        cfg.recursive = true;
        cfg.exclude_globs = vec!["**/drafts/**".into()];
        let (found, skipped) = collect(DocumentScanner::new(&cfg).unwrap());
        assert_eq!(found, vec!["sub/c.txt"]);
        assert!(skipped.is_empty());
    }

    #[test]
    fn test_uppercase_extension_matches() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("REPORT.TXT"), "text").unwrap();
        let (found, _) = collect(DocumentScanner::new(&docs_config(tmp.path())).unwrap());
        assert_eq!(found, vec!["REPORT.TXT"]);
    }

    fn candidate_for(tmp: &TempDir, name: &str) -> Candidate {
        let mut scanner = DocumentScanner::new(&docs_config(tmp.path())).unwrap();
        loop {
            match scanner.next().unwrap() {
                ScanEntry::Candidate(c) if c.source_id == name => return c,
                _ => continue,
            }
        }
    }

    #[test]
    fn test_read_document() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "some words").unwrap();
        let doc = read_document(&candidate_for(&tmp, "a.txt"), 1024).unwrap();
        assert_eq!(doc.source_id, "a.txt");
        assert_eq!(doc.filename, "a.txt");
        assert_eq!(doc.text, "some words");
    }

    #[test]
    fn test_read_document_skips() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("blank.txt"), "  \n\t ").unwrap();
        fs::write(tmp.path().join("big.txt"), "0123456789").unwrap();
        fs::write(tmp.path().join("broken.pdf"), "%PDF-1.4 garbage").unwrap();

        assert_eq!(
            read_document(&candidate_for(&tmp, "blank.txt"), 1024).unwrap_err(),
            SkipReason::NoExtractableText
        );
        assert_eq!(
            read_document(&candidate_for(&tmp, "big.txt"), 4).unwrap_err(),
            SkipReason::TooLarge { bytes: 10, limit: 4 }
        );
        assert!(matches!(
            read_document(&candidate_for(&tmp, "broken.pdf"), 1024).unwrap_err(),
            SkipReason::Unreadable(_)
        ));

        // Removed between scan and read.
        fs::write(tmp.path().join("gone.txt"), "short lived").unwrap();
        let gone = candidate_for(&tmp, "gone.txt");
        fs::remove_file(tmp.path().join("gone.txt")).unwrap();
        assert!(matches!(
            read_document(&gone, 1024).unwrap_err(),
            SkipReason::Unreadable(_)
        ));
    }
}
