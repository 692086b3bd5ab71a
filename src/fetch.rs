// Paginated client for the Find a Tender OCDS release-package API.
use crate::error::ReportError;
use crate::util::format_int;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::Url;
use serde_json::Value;
use std::borrow::Cow;
use std::thread;
use std::time::Duration;
use tracing::{error, info};

/// Anything that can produce the raw releases for a fetch window.
pub trait ReleaseSource {
    fn fetch(&self, window: &FetchWindow) -> Result<Vec<Value>, ReportError>;
}

/// `updatedFrom` / `updatedTo` bounds, formatted `%Y-%m-%dT%H:%M:%S`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchWindow {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub page_limit: usize,
    pub timeout: Duration,
    pub page_delay: Duration,
}

pub struct ApiClient {
    client: Client,
    settings: ApiSettings,
}

// Money fields are sometimes published with leading zeros (`"amount": 0150`),
// which is not valid JSON.
static LEADING_ZEROS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""(amount|amountGross|value)": 0+([1-9]\d*)"#).expect("valid regex"));
static ALL_ZEROS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""(amount|amountGross|value)": 0+\b"#).expect("valid regex"));

/// Rewrite zero-padded money values into valid JSON numbers.
pub fn repair_leading_zeros(text: &str) -> Cow<'_, str> {
    match LEADING_ZEROS.replace_all(text, r#""$1": $2"#) {
        Cow::Borrowed(_) => ALL_ZEROS.replace_all(text, r#""$1": 0"#),
        Cow::Owned(fixed) => Cow::Owned(ALL_ZEROS.replace_all(&fixed, r#""$1": 0"#).into_owned()),
    }
}

/// Cursor for the next page, taken from the `links.next` URL.
pub fn next_cursor(page: &Value) -> Option<String> {
    let next = page.get("links")?.get("next")?.as_str()?;
    let url = Url::parse(next).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "cursor")
        .map(|(_, value)| value.into_owned())
        .filter(|cursor| !cursor.is_empty())
}

/// Decode one page body after repairing its numbers.
pub fn parse_page(body: &str, page: usize) -> Result<Value, ReportError> {
    serde_json::from_str(&repair_leading_zeros(body)).map_err(|e| {
        let snippet = error_snippet(body, e.line(), e.column());
        error!(page, error = %e, snippet = %snippet, "JSON decode error");
        ReportError::MalformedPage {
            page,
            reason: e.to_string(),
        }
    })
}

/// Up to 200 characters around a 1-based line/column position.
fn error_snippet(body: &str, line: usize, column: usize) -> String {
    let line_start: usize = body
        .split('\n')
        .take(line.saturating_sub(1))
        .map(|l| l.chars().count() + 1)
        .sum();
    let start = (line_start + column).saturating_sub(100);
    body.chars().skip(start).take(200).collect()
}

impl ApiClient {
    pub fn new(settings: ApiSettings) -> Result<Self, ReportError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .user_agent(concat!("fts_report/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, settings })
    }

    fn get_page(&self, window: &FetchWindow, cursor: Option<&str>, page: usize) -> Result<Value, ReportError> {
        let limit = self.settings.page_limit.to_string();
        let mut params = vec![
            ("updatedFrom", window.from.as_str()),
            ("updatedTo", window.to.as_str()),
            ("limit", limit.as_str()),
        ];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor));
        }

        let resp = self.client.get(&self.settings.base_url).query(&params).send()?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(ReportError::Server {
                page,
                status: status.as_u16(),
                body,
            });
        }
        let body = resp.text()?;
        parse_page(&body, page)
    }
}

impl ReleaseSource for ApiClient {
    /// Walk every page of the window. Any failed page aborts the whole
    /// fetch; partial results are never returned.
    fn fetch(&self, window: &FetchWindow) -> Result<Vec<Value>, ReportError> {
        info!(from = %window.from, to = %window.to, "fetching releases");
        let mut releases: Vec<Value> = Vec::new();
        let mut cursor: Option<String> = None;
        let mut page = 0usize;

        loop {
            page += 1;
            info!(page, so_far = %format_int(releases.len()), "fetching page");
            let data = self.get_page(window, cursor.as_deref(), page).map_err(|e| {
                error!(page, error = %e, "request failed");
                e
            })?;

            let batch = match data.get("releases").and_then(Value::as_array) {
                Some(batch) if !batch.is_empty() => batch,
                _ => {
                    info!("no more releases found");
                    break;
                }
            };
            releases.extend(batch.iter().cloned());

            match next_cursor(&data) {
                Some(next) => cursor = Some(next),
                None => {
                    info!("no more pages available");
                    break;
                }
            }
            thread::sleep(self.settings.page_delay);
        }

        info!(pages = page, releases = %format_int(releases.len()), "completed fetch");
        Ok(releases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn repairs_zero_padded_amounts() {
        let raw = r#"{"amount": 00150, "amountGross": 000, "value": 0, "other": 0012}"#;
        let fixed = repair_leading_zeros(raw);
        assert_eq!(fixed, r#"{"amount": 150, "amountGross": 0, "value": 0, "other": 0012}"#);
    }

    #[test]
    fn leaves_valid_numbers_alone() {
        let raw = r#"{"amount": 100, "amountGross": 0.5, "value": 10}"#;
        assert_eq!(repair_leading_zeros(raw), raw);
        let parsed: Value = serde_json::from_str(&repair_leading_zeros(raw)).unwrap();
        assert_eq!(parsed["amountGross"], json!(0.5));
    }

    #[test]
    fn cursor_comes_from_next_link_query() {
        let page = json!({"links": {"next": "https://example.org/api?limit=100&cursor=abc%3D%3D"}});
        assert_eq!(next_cursor(&page).as_deref(), Some("abc=="));
        assert_eq!(next_cursor(&json!({"links": {"next": "https://example.org/api?limit=1"}})), None);
        assert_eq!(next_cursor(&json!({"links": {}})), None);
        assert_eq!(next_cursor(&json!({})), None);
    }

    #[test]
    fn snippet_is_taken_from_the_failing_line() {
        let filler = "x".repeat(150);
        let body = format!("{}\n{}\nBAD", filler, filler);
        let snippet = error_snippet(&body, 3, 1);
        assert!(snippet.ends_with("\nBAD"));
        assert_eq!(snippet.chars().count(), 102);
        assert_eq!(error_snippet("abc", 1, 2), "abc");
    }

    #[test]
    fn malformed_pages_are_errors() {
        let err = parse_page("{\"releases\": [", 3).unwrap_err();
        assert!(matches!(err, ReportError::MalformedPage { page: 3, .. }));
        let ok = parse_page(r#"{"releases": [{"amount": 07}]}"#, 1).unwrap();
        assert_eq!(ok["releases"][0]["amount"], json!(7));
    }
}
