//! Confluence corpus source and publish sink.
//!
//! [`ConfluenceCorpus`] lists the pages of one space (storage body
//! expanded), strips the markup to plain text, and yields one
//! [`CorpusDocument`] per non-empty page. [`ConfluencePublisher`] creates a
//! page by title, or updates the existing one with version + 1.
//!
//! Credentials: `CONFLUENCE_EMAIL` / `CONFLUENCE_API_TOKEN`, falling back
//! to `JIRA_EMAIL` / `JIRA_API_TOKEN` for single-site Atlassian Cloud.

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use std::time::Duration;

use sprint_pulse_core::models::CorpusDocument;
use sprint_pulse_core::traits::{DocumentSource, PublishSink};
use sprint_pulse_core::PulseError;

const CONTENT_PATH: &str = "/rest/api/content";
const PAGE_SIZE: usize = 50;
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Authenticated HTTP access to one Confluence site.
struct ConfluenceClient {
    base_url: String,
    email: String,
    token: String,
    client: reqwest::Client,
}

fn env_with_fallback(primary: &str, fallback: &str) -> Result<String> {
    std::env::var(primary)
        .or_else(|_| std::env::var(fallback))
        .map_err(|_| anyhow::anyhow!("{} (or {}) environment variable not set", primary, fallback))
}

impl ConfluenceClient {
    fn new(base_url: &str) -> Result<Self> {
        let email = env_with_fallback("CONFLUENCE_EMAIL", "JIRA_EMAIL")?;
        let token = env_with_fallback("CONFLUENCE_API_TOKEN", "JIRA_API_TOKEN")?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            email,
            token,
            client,
        })
    }

    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> std::result::Result<Value, String> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self
            .client
            .request(method.clone(), &url)
            .basic_auth(&self.email, Some(&self.token))
            .header("Accept", "application/json")
            .query(query);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await.map_err(|e| e.to_string())?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(format!("{} {} returned {}: {}", method, path, status, text));
        }
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        resp.json::<Value>().await.map_err(|e| e.to_string())
    }
}

/// Pre-compiled patterns for turning storage-format HTML into text.
pub struct HtmlStripper {
    script: Regex,
    style: Regex,
    tag: Regex,
    whitespace: Regex,
}

impl HtmlStripper {
    pub fn new() -> Result<Self> {
        Ok(Self {
            script: Regex::new(r"(?is)<script.*?</script>")?,
            style: Regex::new(r"(?is)<style.*?</style>")?,
            tag: Regex::new(r"<[^>]+>")?,
            whitespace: Regex::new(r"\s+")?,
        })
    }

    pub fn strip(&self, html: &str) -> String {
        let text = self.script.replace_all(html, " ");
        let text = self.style.replace_all(&text, " ");
        let text = self.tag.replace_all(&text, " ");
        let text = decode_entities(&text);
        self.whitespace.replace_all(&text, " ").trim().to_string()
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Pages of one space as a retrieval corpus.
pub struct ConfluenceCorpus {
    client: ConfluenceClient,
    space: String,
    limit: usize,
    stripper: HtmlStripper,
    name: String,
}

impl ConfluenceCorpus {
    pub fn new(base_url: &str, space: &str, limit: usize) -> Result<Self> {
        Ok(Self {
            client: ConfluenceClient::new(base_url)?,
            space: space.to_string(),
            limit,
            stripper: HtmlStripper::new()?,
            name: format!("confluence:{}", space),
        })
    }

    async fn list_pages(&self) -> std::result::Result<Vec<Value>, String> {
        let mut pages: Vec<Value> = Vec::new();
        let mut start = 0usize;
        while pages.len() < self.limit {
            let batch_limit = (self.limit - pages.len()).min(PAGE_SIZE);
            let query = [
                ("spaceKey", self.space.clone()),
                ("type", "page".to_string()),
                ("start", start.to_string()),
                ("limit", batch_limit.to_string()),
                ("expand", "body.storage".to_string()),
            ];
            let data = self
                .client
                .request(reqwest::Method::GET, CONTENT_PATH, &query, None)
                .await?;
            let batch = data
                .get("results")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            if batch.is_empty() {
                break;
            }
            start += batch.len();
            pages.extend(batch);
        }
        pages.truncate(self.limit);
        Ok(pages)
    }
}

/// Convert one content-API page into a corpus document; `None` when the
/// page has no text.
pub fn page_to_document(page: &Value, stripper: &HtmlStripper) -> Option<CorpusDocument> {
    let id = match page.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return None,
    };
    let body = page
        .pointer("/body/storage/value")
        .and_then(Value::as_str)
        .unwrap_or("");
    let text = stripper.strip(body);
    if text.is_empty() {
        return None;
    }
    Some(CorpusDocument {
        id,
        title: page
            .get("title")
            .and_then(Value::as_str)
            .map(str::to_string),
        text,
    })
}

#[async_trait]
impl DocumentSource for ConfluenceCorpus {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_documents(&self) -> sprint_pulse_core::Result<Vec<CorpusDocument>> {
        let pages = self
            .list_pages()
            .await
            .map_err(PulseError::SourceUnavailable)?;
        let docs: Vec<CorpusDocument> = pages
            .iter()
            .filter_map(|p| page_to_document(p, &self.stripper))
            .collect();
        tracing::debug!(
            space = %self.space,
            pages = pages.len(),
            documents = docs.len(),
            "loaded confluence corpus"
        );
        Ok(docs)
    }
}

/// Creates or updates retrospective pages in a space.
pub struct ConfluencePublisher {
    client: ConfluenceClient,
    parent_page_id: Option<String>,
}

impl ConfluencePublisher {
    pub fn new(base_url: &str, parent_page_id: Option<String>) -> Result<Self> {
        Ok(Self {
            client: ConfluenceClient::new(base_url)?,
            parent_page_id,
        })
    }

    async fn find_page(
        &self,
        space: &str,
        title: &str,
    ) -> std::result::Result<Option<Value>, String> {
        let query = [
            ("spaceKey", space.to_string()),
            ("title", title.to_string()),
            ("expand", "version".to_string()),
            ("limit", "1".to_string()),
        ];
        let data = self
            .client
            .request(reqwest::Method::GET, CONTENT_PATH, &query, None)
            .await?;
        Ok(data
            .get("results")
            .and_then(Value::as_array)
            .and_then(|r| r.first())
            .cloned())
    }
}

/// Request body for a create (`version = None`) or update.
pub fn page_payload(
    space: &str,
    title: &str,
    html_body: &str,
    parent_page_id: Option<&str>,
    version: Option<u64>,
) -> Value {
    let mut payload = json!({
        "type": "page",
        "title": title,
        "space": { "key": space },
        "body": { "storage": { "value": html_body, "representation": "storage" } },
    });
    if let Some(parent) = parent_page_id {
        payload["ancestors"] = json!([{ "id": parent }]);
    }
    if let Some(number) = version {
        payload["version"] = json!({ "number": number });
    }
    payload
}

/// Convert the report Markdown to Confluence storage XHTML.
///
/// Handles headings, bullet lists, pipe tables (a `|---|` row after the
/// first marks it as a header), `**bold**` spans, and paragraphs.
pub fn markdown_to_storage(markdown: &str) -> String {
    let mut html = String::new();
    let mut in_list = false;
    let mut table: Vec<&str> = Vec::new();
    for line in markdown.lines() {
        let trimmed = line.trim();
        let bullet = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "));
        if in_list && bullet.is_none() {
            html.push_str("</ul>");
            in_list = false;
        }
        if trimmed.starts_with('|') {
            table.push(trimmed);
            continue;
        }
        push_table(&mut html, &std::mem::take(&mut table));
        if trimmed.is_empty() {
            continue;
        }
        if let Some(item) = bullet {
            if !in_list {
                html.push_str("<ul>");
                in_list = true;
            }
            html.push_str(&format!("<li>{}</li>", inline(item)));
            continue;
        }
        let level = trimmed.chars().take_while(|c| *c == '#').count();
        if (1..=6).contains(&level) && trimmed[level..].starts_with(' ') {
            html.push_str(&format!(
                "<h{l}>{}</h{l}>",
                inline(trimmed[level..].trim()),
                l = level
            ));
        } else {
            html.push_str(&format!("<p>{}</p>", inline(trimmed)));
        }
    }
    push_table(&mut html, &table);
    if in_list {
        html.push_str("</ul>");
    }
    html
}

fn push_table(html: &mut String, rows: &[&str]) {
    if rows.is_empty() {
        return;
    }
    let rows: Vec<Vec<&str>> = rows.iter().map(|r| table_cells(r)).collect();
    let has_header = rows.get(1).is_some_and(|r| is_separator_row(r));
    html.push_str("<table><tbody>");
    for (i, cells) in rows.iter().enumerate() {
        if is_separator_row(cells) {
            continue;
        }
        let tag = if has_header && i == 0 { "th" } else { "td" };
        html.push_str("<tr>");
        for cell in cells {
            html.push_str(&format!("<{t}>{}</{t}>", inline(cell), t = tag));
        }
        html.push_str("</tr>");
    }
    html.push_str("</tbody></table>");
}

fn table_cells(row: &str) -> Vec<&str> {
    let inner = row.strip_prefix('|').unwrap_or(row);
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    inner.split('|').map(str::trim).collect()
}

fn is_separator_row(cells: &[&str]) -> bool {
    !cells.is_empty()
        && cells
            .iter()
            .all(|c| !c.is_empty() && c.chars().all(|ch| ch == '-' || ch == ':'))
}

/// Escape text and turn paired `**` markers into `<strong>`. An unpaired
/// marker stays literal.
fn inline(text: &str) -> String {
    let escaped = escape(text);
    let parts: Vec<&str> = escaped.split("**").collect();
    let paired = if parts.len() % 2 == 1 {
        parts.len()
    } else {
        parts.len() - 1
    };
    let mut out = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i >= paired {
            out.push_str("**");
            out.push_str(part);
        } else if i % 2 == 1 {
            out.push_str("<strong>");
            out.push_str(part);
            out.push_str("</strong>");
        } else {
            out.push_str(part);
        }
    }
    out
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[async_trait]
impl PublishSink for ConfluencePublisher {
    async fn publish(
        &self,
        space: &str,
        title: &str,
        body: &str,
    ) -> sprint_pulse_core::Result<String> {
        let html = markdown_to_storage(body);
        let parent = self.parent_page_id.as_deref();

        let existing = self.find_page(space, title).await.map_err(PulseError::Publish)?;
        let data = match existing {
            Some(page) => {
                let id = page
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| PulseError::Publish("existing page has no id".into()))?
                    .to_string();
                let current = page
                    .pointer("/version/number")
                    .and_then(Value::as_u64)
                    .unwrap_or(1);
                let payload = page_payload(space, title, &html, parent, Some(current + 1));
                self.client
                    .request(
                        reqwest::Method::PUT,
                        &format!("{}/{}", CONTENT_PATH, id),
                        &[],
                        Some(&payload),
                    )
                    .await
                    .map_err(PulseError::Publish)?
            }
            None => {
                let payload = page_payload(space, title, &html, parent, None);
                self.client
                    .request(reqwest::Method::POST, CONTENT_PATH, &[], Some(&payload))
                    .await
                    .map_err(PulseError::Publish)?
            }
        };

        let id = data
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let link = data
            .pointer("/_links/webui")
            .and_then(Value::as_str)
            .map(|p| format!("{}{}", self.client.base_url, p));
        Ok(link.unwrap_or(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_html() {
        let s = HtmlStripper::new().unwrap();
        let html = "<style>p{}</style><h1>Retro</h1><p>Carry&nbsp;over &amp; <b>scope</b></p>\
                    <SCRIPT>alert(1)</SCRIPT>";
        assert_eq!(s.strip(html), "Retro Carry over & scope");
    }

    #[test]
    fn test_page_to_document_skips_empty() {
        let s = HtmlStripper::new().unwrap();
        let page = json!({"id": "12", "title": "Notes", "body": {"storage": {"value": "<p>hi</p>"}}});
        let doc = page_to_document(&page, &s).unwrap();
        assert_eq!(doc.id, "12");
        assert_eq!(doc.title.as_deref(), Some("Notes"));
        assert_eq!(doc.text, "hi");

        let empty = json!({"id": "13", "body": {"storage": {"value": "<p> </p>"}}});
        assert!(page_to_document(&empty, &s).is_none());
    }

    #[test]
    fn test_page_payload_update_bumps_version() {
        let p = page_payload("TEAM", "Retro", "<p/>", Some("99"), Some(4));
        assert_eq!(p["version"]["number"], json!(4));
        assert_eq!(p["ancestors"][0]["id"], json!("99"));
        let create = page_payload("TEAM", "Retro", "<p/>", None, None);
        assert!(create.get("version").is_none());
        assert!(create.get("ancestors").is_none());
    }

    #[test]
    fn test_markdown_to_storage() {
        let html = markdown_to_storage("# Title\n\n- a < b\n- c\ntext");
        assert_eq!(
            html,
            "<h1>Title</h1><ul><li>a &lt; b</li><li>c</li></ul><p>text</p>"
        );
    }

    #[test]
    fn test_markdown_tables_and_bold_to_storage() {
        let md = "**Summary:**\n- **Velocity**: 7.0\n\n\
                  | Sprint | Completion |\n|---|---|\n| S1 | 50% |\n\
                  closing ** note";
        assert_eq!(
            markdown_to_storage(md),
            "<p><strong>Summary:</strong></p>\
             <ul><li><strong>Velocity</strong>: 7.0</li></ul>\
             <table><tbody><tr><th>Sprint</th><th>Completion</th></tr>\
             <tr><td>S1</td><td>50%</td></tr></tbody></table>\
             <p>closing ** note</p>"
        );
    }

    #[test]
    fn test_table_without_separator_has_no_header() {
        let html = markdown_to_storage("- a\n| x | y |\n| 1 | 2 |");
        assert_eq!(
            html,
            "<ul><li>a</li></ul><table><tbody><tr><td>x</td><td>y</td></tr>\
             <tr><td>1</td><td>2</td></tr></tbody></table>"
        );
    }
}
