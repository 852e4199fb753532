use anyhow::{bail, Result};
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use sprint_pulse_core::models::CorpusDocument;
use sprint_pulse_core::traits::DocumentSource;
use sprint_pulse_core::PulseError;

use crate::config::FilesystemCorpusConfig;

/// A directory of Markdown/text notes (past retros, runbooks, team
/// agreements) used as the retrieval corpus. One document per file, keyed
/// by its path relative to the root.
pub struct FilesystemCorpus {
    root: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
}

impl FilesystemCorpus {
    pub fn new(config: &FilesystemCorpusConfig) -> Result<Self> {
        let mut default_excludes = vec![
            "**/.git/**".to_string(),
            "**/target/**".to_string(),
            "**/node_modules/**".to_string(),
        ];
        default_excludes.extend(config.exclude_globs.iter().cloned());

        Ok(Self {
            root: config.root.clone(),
            include: build_globset(&config.include_globs)?,
            exclude: build_globset(&default_excludes)?,
        })
    }

    pub fn scan(&self) -> Result<Vec<CorpusDocument>> {
        if !self.root.exists() {
            bail!("Corpus root does not exist: {}", self.root.display());
        }

        let mut docs = Vec::new();
        for entry in WalkDir::new(&self.root) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().replace('\\', "/");

            if self.exclude.is_match(&rel_str) || !self.include.is_match(&rel_str) {
                continue;
            }

            if let Some(doc) = file_to_document(path, &rel_str) {
                docs.push(doc);
            }
        }

        // Deterministic ingestion order keeps BM25 tie-breaking stable.
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(docs)
    }
}

fn file_to_document(path: &Path, relative_path: &str) -> Option<CorpusDocument> {
    let body = match std::fs::read_to_string(path) {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "skipping unreadable corpus file");
            return None;
        }
    };
    if body.trim().is_empty() {
        return None;
    }

    // First Markdown heading wins; otherwise the file name.
    let title = body
        .lines()
        .find_map(|l| l.strip_prefix("# "))
        .map(|t| t.trim().to_string())
        .or_else(|| {
            path.file_name()
                .map(|n| n.to_string_lossy().to_string())
        });

    Some(CorpusDocument {
        id: relative_path.to_string(),
        title,
        text: body,
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[async_trait]
impl DocumentSource for FilesystemCorpus {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn list_documents(&self) -> sprint_pulse_core::Result<Vec<CorpusDocument>> {
        self.scan()
            .map_err(|e| PulseError::SourceUnavailable(format!("{:#}", e)))
    }
}
