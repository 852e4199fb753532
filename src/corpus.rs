//! Corpus selection from `[corpus.*]` configuration.
//!
//! Zero, one, or both of the filesystem and Confluence corpora may be
//! configured. With none, summaries are ungrounded. With both, documents
//! are concatenated in configuration order (filesystem first) so BM25
//! tie-breaking stays deterministic.

use anyhow::Result;
use async_trait::async_trait;

use sprint_pulse_core::models::CorpusDocument;
use sprint_pulse_core::traits::DocumentSource;
use sprint_pulse_core::PulseError;

use crate::config::Config;
use crate::connector_confluence::ConfluenceCorpus;
use crate::connector_fs::FilesystemCorpus;

/// Several sources read as one. A failing member is skipped with a
/// warning; the union fails only when every member fails.
pub struct MultiCorpus {
    sources: Vec<Box<dyn DocumentSource>>,
}

impl MultiCorpus {
    pub fn new(sources: Vec<Box<dyn DocumentSource>>) -> Self {
        Self { sources }
    }
}

#[async_trait]
impl DocumentSource for MultiCorpus {
    fn name(&self) -> &str {
        "multi"
    }

    async fn list_documents(&self) -> sprint_pulse_core::Result<Vec<CorpusDocument>> {
        let mut docs = Vec::new();
        let mut failures = Vec::new();
        for source in &self.sources {
            match source.list_documents().await {
                Ok(batch) => docs.extend(batch),
                Err(e) => {
                    tracing::warn!(source = source.name(), error = %e, "corpus source failed");
                    failures.push(format!("{}: {}", source.name(), e));
                }
            }
        }
        if !self.sources.is_empty() && failures.len() == self.sources.len() {
            return Err(PulseError::SourceUnavailable(failures.join("; ")));
        }
        Ok(docs)
    }
}

/// Build the configured corpus, or `None` when no corpus is configured.
pub fn build_corpus(config: &Config) -> Result<Option<Box<dyn DocumentSource>>> {
    let mut sources: Vec<Box<dyn DocumentSource>> = Vec::new();

    if let Some(fs) = &config.corpus.filesystem {
        sources.push(Box::new(FilesystemCorpus::new(fs)?));
    }

    if let Some(cf) = &config.corpus.confluence {
        let base = config
            .confluence_base(cf.server.as_deref())
            .ok_or_else(|| anyhow::anyhow!("corpus.confluence.server must be set"))?;
        sources.push(Box::new(ConfluenceCorpus::new(
            &base,
            &cf.space,
            config.retrieval.limit_pages,
        )?));
    }

    Ok(match sources.len() {
        0 => None,
        1 => sources.pop(),
        _ => Some(Box::new(MultiCorpus::new(sources))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str, bool);

    #[async_trait]
    impl DocumentSource for Fixed {
        fn name(&self) -> &str {
            self.0
        }
        async fn list_documents(&self) -> sprint_pulse_core::Result<Vec<CorpusDocument>> {
            if self.1 {
                return Err(PulseError::SourceUnavailable("down".into()));
            }
            Ok(vec![CorpusDocument {
                id: self.0.to_string(),
                title: None,
                text: "notes".into(),
            }])
        }
    }

    #[tokio::test]
    async fn test_multi_corpus_skips_failed_member() {
        let multi = MultiCorpus::new(vec![
            Box::new(Fixed("a", false)),
            Box::new(Fixed("b", true)),
            Box::new(Fixed("c", false)),
        ]);
        let ids: Vec<String> = multi
            .list_documents()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_multi_corpus_fails_when_all_fail() {
        let multi = MultiCorpus::new(vec![Box::new(Fixed("a", true))]);
        assert!(multi.list_documents().await.is_err());
    }

    #[test]
    fn test_no_corpus_configured() {
        let cfg: Config = toml::from_str("[cache]\npath = \"x\"\n").unwrap();
        assert!(build_corpus(&cfg).unwrap().is_none());
    }
}
