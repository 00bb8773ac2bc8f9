//! Web page fetching for research-style agents.

use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use url::Url;

use super::{Tool, ToolContext};

/// Page text handed back to the model is capped at this many characters.
const MAX_TEXT_CHARS: usize = 20_000;

/// Raw bytes read from a response before the rest is dropped.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetch a public web page and return its readable text.
pub struct FetchUrl;

#[async_trait]
impl Tool for FetchUrl {
    fn name(&self) -> &str {
        "fetch_url"
    }

    fn description(&self) -> &str {
        "Fetch a public web page (company site, pricing page, press release) and return its readable text."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "Absolute http(s) URL"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext<'_>) -> anyhow::Result<Value> {
        let raw = args["url"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'url' argument"))?;
        let url = parse_web_url(raw)?;

        tracing::debug!(agent_id = %ctx.emitter.agent_id(), url = %url, "fetching page");

        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (compatible; DepartmentRunner/0.3)")
            .timeout(FETCH_TIMEOUT)
            .build()?;

        let response = client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("HTTP error: {}", status);
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_default();

        let (bytes, body_truncated) =
            read_capped(response.bytes_stream(), MAX_BODY_BYTES).await?;
        let body = String::from_utf8_lossy(&bytes);
        let text = if content_type.contains("text/html") {
            extract_text_from_html(&body)
        } else {
            body.into_owned()
        };
        let (text, text_truncated) = truncate_chars(text, MAX_TEXT_CHARS);
        let truncated = body_truncated || text_truncated;

        Ok(json!({
            "url": url.as_str(),
            "contentType": content_type,
            "text": text,
            "truncated": truncated,
        }))
    }
}

/// Read at most `limit` bytes of a body stream. Reports whether anything
/// was left unread.
async fn read_capped<S, B, E>(body: S, limit: usize) -> anyhow::Result<(Vec<u8>, bool)>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::error::Error + Send + Sync + 'static,
{
    futures::pin_mut!(body);
    let mut buf = Vec::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        let chunk = chunk.as_ref();
        let room = limit - buf.len();
        if chunk.len() > room {
            buf.extend_from_slice(&chunk[..room]);
            return Ok((buf, true));
        }
        buf.extend_from_slice(chunk);
    }
    Ok((buf, false))
}

fn parse_web_url(raw: &str) -> anyhow::Result<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| anyhow::anyhow!("Invalid URL {:?}: {}", raw, e))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => anyhow::bail!("Unsupported URL scheme: {}", other),
    }
}

fn truncate_chars(text: String, max: usize) -> (String, bool) {
    match text.char_indices().nth(max) {
        Some((cut, _)) => (text[..cut].to_string(), true),
        None => (text, false),
    }
}

/// Drop script and style blocks and tags, then collapse whitespace.
fn extract_text_from_html(html: &str) -> String {
    let without_scripts = strip_blocks(html, "<script", "</script>");
    let stripped = strip_blocks(&without_scripts, "<style", "</style>");

    let mut text = String::with_capacity(stripped.len());
    let mut in_tag = false;
    for c in stripped.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                text.push(' ');
            }
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }

    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    decode_entities(&collapsed)
}

fn strip_blocks(html: &str, open: &str, close: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(start) = rest.find(open) {
        out.push_str(&rest[..start]);
        match rest[start..].find(close) {
            Some(end) => rest = &rest[start + end + close.len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
