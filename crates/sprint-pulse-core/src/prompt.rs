//! Prompt assembly and request fingerprinting.
//!
//! A prompt is built from a fixed template, the rendered metrics
//! ([`report::summary_markdown`](crate::report::summary_markdown)), an optional
//! focus question, and retrieved context in ranked order. The
//! [`fingerprint`] is a SHA-256 over the prompt and every generation
//! parameter, so any change to either yields a new cache key.

use sha2::{Digest, Sha256};

use crate::bm25::ScoredDocument;
use crate::models::GenerationParams;

/// Character budget for the retrieval query derived from the metrics text.
pub const MAX_QUERY_CHARS: usize = 2000;

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Retrieval query: the focus question when given, otherwise the metrics
/// summary itself.
pub fn retrieval_query<'a>(focus: Option<&'a str>, metrics_markdown: &'a str) -> &'a str {
    match focus.map(str::trim) {
        Some(f) if !f.is_empty() => f,
        _ => truncate_chars(metrics_markdown, MAX_QUERY_CHARS),
    }
}

/// Render ranked documents as `# title\ntext` blocks, best first. Returns
/// `None` for no documents.
pub fn render_context(hits: &[ScoredDocument<'_>], snippet_chars: usize) -> Option<String> {
    if hits.is_empty() {
        return None;
    }
    let blocks: Vec<String> = hits
        .iter()
        .map(|hit| {
            let doc = hit.document;
            let title = doc.title().unwrap_or(doc.id());
            format!("# {}\n{}", title, truncate_chars(doc.text(), snippet_chars))
        })
        .collect();
    Some(blocks.join(CONTEXT_SEPARATOR))
}

/// Assemble the retrospective prompt.
pub fn build_prompt(metrics_markdown: &str, focus: Option<&str>, context: Option<&str>) -> String {
    let mut parts: Vec<&str> = vec![
        "You are an experienced Agile coach.",
        "Given the team's sprint metrics, write a concise, actionable sprint retrospective analysis:",
        "- Identify 3-5 key insights (what went well, what to improve)",
        "- Give 3 concrete, high-leverage recommendations",
        "- Keep it pragmatic and non-generic; tie each point to the metrics.",
        "\nSprint Metrics Summary (Markdown):\n",
        metrics_markdown,
    ];
    if let Some(f) = focus.map(str::trim).filter(|f| !f.is_empty()) {
        parts.push("\nThe team asked to focus on:\n");
        parts.push(f);
    }
    if let Some(ctx) = context {
        parts.push("\nRelevant internal context:\n");
        parts.push(ctx);
    }
    parts.push("\nOutput as Markdown with headings and bullet points.");
    parts.join("\n")
}

/// Stable hex SHA-256 over the generation parameters and prompt.
///
/// Each component is length-prefixed so adjacent values cannot run
/// together into the same byte stream.
pub fn fingerprint(prompt: &str, params: &GenerationParams) -> String {
    let temperature = params
        .temperature
        .map(|t| format!("{:.4}", t))
        .unwrap_or_default();
    let max_tokens = params
        .max_tokens
        .map(|m| m.to_string())
        .unwrap_or_default();

    let mut hasher = Sha256::new();
    for (label, value) in [
        ("model", params.model.as_str()),
        ("temperature", temperature.as_str()),
        ("max_tokens", max_tokens.as_str()),
        ("prompt", prompt),
    ] {
        hasher.update(label.as_bytes());
        hasher.update((value.len() as u64).to_le_bytes());
        hasher.update(value.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bm25::Bm25Index;
    use crate::models::CorpusDocument;

    fn params() -> GenerationParams {
        GenerationParams {
            model: "gpt-4o-mini".to_string(),
            temperature: Some(0.3),
            max_tokens: Some(800),
        }
    }

    #[test]
    fn test_fingerprint_is_stable_hex() {
        let a = fingerprint("prompt", &params());
        assert_eq!(a, fingerprint("prompt", &params()));
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_changes_with_inputs() {
        let base = fingerprint("prompt", &params());
        assert_ne!(base, fingerprint("prompt!", &params()));
        let mut p = params();
        p.model = "other".into();
        assert_ne!(base, fingerprint("prompt", &p));
        let mut p = params();
        p.temperature = Some(0.7);
        assert_ne!(base, fingerprint("prompt", &p));
        let mut p = params();
        p.max_tokens = None;
        assert_ne!(base, fingerprint("prompt", &p));
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn test_retrieval_query_prefers_focus() {
        assert_eq!(retrieval_query(Some(" scope creep "), "metrics"), "scope creep");
        assert_eq!(retrieval_query(Some("  "), "metrics"), "metrics");
        assert_eq!(retrieval_query(None, "metrics"), "metrics");
    }

    #[test]
    fn test_render_context_in_rank_order() {
        let index = Bm25Index::build(vec![
            CorpusDocument {
                id: "1".into(),
                title: Some("Runbook".into()),
                text: "deploy steps".into(),
            },
            CorpusDocument {
                id: "2".into(),
                title: None,
                text: "velocity velocity notes".into(),
            },
        ]);
        let hits = index.query("velocity", 2);
        let ctx = render_context(&hits, 8).unwrap();
        assert_eq!(ctx, "# 2\nvelocity\n\n---\n\n# Runbook\ndeploy s");
        assert!(render_context(&[], 10).is_none());
    }

    #[test]
    fn test_build_prompt_sections() {
        let p = build_prompt("METRICS", Some("carry-over"), Some("CTX"));
        let m = p.find("METRICS").unwrap();
        let f = p.find("carry-over").unwrap();
        let c = p.find("CTX").unwrap();
        assert!(m < f && f < c);
        let ungrounded = build_prompt("METRICS", None, None);
        assert!(!ungrounded.contains("Relevant internal context"));
        assert!(!ungrounded.contains("focus on"));
    }
}
