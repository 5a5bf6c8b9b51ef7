//! JavaScript locator expressions for the interaction handlers.
//!
//! All element work happens inside `Runtime.evaluate`; these builders
//! produce the scripts. Selectors resolve against the document, or against
//! an iframe's document when `iframe_selector` is given; the iframe hop is
//! re-resolved on every action, so there is no sticky frame context to
//! corrupt.

use serde::Deserialize;
use serde_json::Value;

use crate::errors::GatewayError;

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SelectorKind {
    #[default]
    Css,
    Xpath,
    Id,
}

/// Expression yielding the scope document (`document`, or the iframe's
/// content document, or `null` when the iframe cannot be reached).
fn scope_expression(iframe_selector: Option<&str>) -> String {
    match iframe_selector {
        None => "document".to_string(),
        Some(selector) => {
            let literal = js_string(selector);
            format!(
                "(() => {{\n    try {{\n        const frameEl = document.querySelector({literal});\n        if (!frameEl) {{ return null; }}\n        return frameEl.contentDocument || (frameEl.contentWindow ? frameEl.contentWindow.document : null);\n    }} catch (err) {{\n        return null;\n    }}\n}})()"
            )
        }
    }
}

fn locator(kind: SelectorKind, selector: &str) -> String {
    let literal = js_string(selector);
    match kind {
        SelectorKind::Css => format!("__scope.querySelector({literal})"),
        SelectorKind::Id => format!("__scope.getElementById({literal})"),
        SelectorKind::Xpath => format!(
            "__scope.evaluate({literal}, __scope, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue"
        ),
    }
}

/// Wrap an action body in the find-element scaffolding. The body sees `el`
/// bound to the located element and must return a JSON-serializable value.
pub fn element_script(
    kind: SelectorKind,
    selector: &str,
    iframe_selector: Option<&str>,
    body: &str,
) -> String {
    format!(
        "(() => {{\n    const __scope = {scope};\n    if (!__scope) {{ return {{ status: 'iframe_not_found' }}; }}\n    const el = {locator};\n    if (!el) {{ return {{ status: 'not_found' }}; }}\n    {body}\n}})()",
        scope = scope_expression(iframe_selector),
        locator = locator(kind, selector),
    )
}

/// Probe returning the element's interactability facts.
pub fn probe_script(kind: SelectorKind, selector: &str, iframe_selector: Option<&str>) -> String {
    element_script(
        kind,
        selector,
        iframe_selector,
        r#"const rect = el.getBoundingClientRect();
    const style = window.getComputedStyle(el);
    const visible = rect.width > 0 && rect.height > 0
        && style.display !== 'none' && style.visibility !== 'hidden';
    return {
        status: 'found',
        tag: el.tagName.toLowerCase(),
        visible: visible,
        disabled: !!el.disabled,
        rect: { x: rect.x, y: rect.y, width: rect.width, height: rect.height },
        text: (el.textContent || '').slice(0, 200),
        value: el.value === undefined ? null : String(el.value).slice(0, 200),
    };"#,
    )
}

pub fn click_script(kind: SelectorKind, selector: &str, iframe_selector: Option<&str>) -> String {
    element_script(
        kind,
        selector,
        iframe_selector,
        r#"const rect = el.getBoundingClientRect();
    const style = window.getComputedStyle(el);
    if (rect.width === 0 || rect.height === 0 || style.display === 'none' || style.visibility === 'hidden') {
        return { status: 'not_interactable' };
    }
    el.scrollIntoView({ block: 'center', inline: 'center' });
    el.click();
    return { status: 'ok' };"#,
    )
}

pub fn fill_script(
    kind: SelectorKind,
    selector: &str,
    iframe_selector: Option<&str>,
    text: &str,
    clear_first: bool,
) -> String {
    let text_literal = js_string(text);
    let clear = if clear_first { "true" } else { "false" };
    let body = format!(
        r#"if (el.disabled || el.readOnly) {{ return {{ status: 'not_interactable' }}; }}
    el.focus();
    if ({clear}) {{ el.value = ''; }}
    el.value = (el.value || '') + {text_literal};
    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
    return {{ status: 'ok' }};"#
    );
    element_script(kind, selector, iframe_selector, &body)
}

pub fn focus_script(kind: SelectorKind, selector: &str) -> String {
    element_script(
        kind,
        selector,
        None,
        "el.focus(); return { status: 'ok' };",
    )
}

/// Map a locator script's `{status}` result onto the error taxonomy.
pub fn status_to_result(result: &Value, selector: &str) -> Result<(), GatewayError> {
    match result.get("status").and_then(Value::as_str) {
        Some("ok") | Some("found") => Ok(()),
        Some("not_found") => Err(GatewayError::ElementNotFound(selector.to_string())),
        Some("not_interactable") => {
            Err(GatewayError::ElementNotInteractable(selector.to_string()))
        }
        Some("iframe_not_found") => Err(GatewayError::ElementNotFound(format!(
            "iframe for {selector}"
        ))),
        other => Err(GatewayError::Internal(format!(
            "unexpected locator status {other:?}"
        ))),
    }
}

fn js_string(raw: &str) -> String {
    serde_json::to_string(raw).unwrap_or_else(|_| "\"\"".to_string())
}
