//! Page snapshots attached to tool replies: url, title and a noise-stripped,
//! truncated copy of the live DOM.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;
use warden_cdp::ops;

use crate::session::SessionState;

static NOISE_BLOCKS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)<script\b[^>]*>.*?</script>|<style\b[^>]*>.*?</style>|<noscript\b[^>]*>.*?</noscript>|<!--.*?-->",
    )
    .expect("noise pattern is valid")
});

/// Capture a snapshot of the current page. Failures degrade to `None`; a
/// snapshot never fails the handler that requested it.
pub async fn capture(state: &SessionState, max_chars: usize) -> Option<Value> {
    let driver = state.driver.clone()?;
    let session = state.page_session.clone()?;

    let url = ops::evaluate(driver.as_ref(), &session, "location.href")
        .await
        .ok()
        .and_then(|v| v.as_str().map(str::to_string));
    let title = ops::evaluate(driver.as_ref(), &session, "document.title")
        .await
        .ok()
        .and_then(|v| v.as_str().map(str::to_string));
    let html = match ops::evaluate(
        driver.as_ref(),
        &session,
        "document.documentElement.outerHTML",
    )
    .await
    {
        Ok(value) => value.as_str().unwrap_or_default().to_string(),
        Err(err) => {
            debug!(target: "warden", %err, "snapshot html capture failed");
            String::new()
        }
    };

    let (html, truncated) = clean_and_truncate(&html, max_chars);
    Some(json!({
        "url": url,
        "title": title,
        "html": html,
        "truncated": truncated,
    }))
}

/// Strip script/style/comment noise and cut at `max_chars` on a char
/// boundary.
pub fn clean_and_truncate(html: &str, max_chars: usize) -> (String, bool) {
    let cleaned = NOISE_BLOCKS.replace_all(html, "");
    let cleaned = cleaned.trim();
    if cleaned.chars().count() <= max_chars {
        return (cleaned.to_string(), false);
    }
    (cleaned.chars().take(max_chars).collect(), true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripts_and_comments_are_stripped() {
        let html = r#"<html><head><script>alert(1)</script><style>b{}</style></head>
            <body><!-- hidden --><p>hello</p></body></html>"#;
        let (cleaned, truncated) = clean_and_truncate(html, 10_000);
        assert!(cleaned.contains("<p>hello</p>"));
        assert!(!cleaned.contains("alert"));
        assert!(!cleaned.contains("hidden"));
        assert!(!truncated);
    }

    #[test]
    fn truncation_reports_itself() {
        let html = "x".repeat(100);
        let (cleaned, truncated) = clean_and_truncate(&html, 10);
        assert_eq!(cleaned.len(), 10);
        assert!(truncated);
    }
}
