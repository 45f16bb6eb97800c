use crate::core::BrowserTrait;
use crate::errors::{Result, ScrapeError};
use serde_json::Value;

/// Helpers shared by every scripted primitive. Nodes are addressed by a
/// stamp attribute carrying a per-document token, so an element replaced by
/// the page (or a document replaced by navigation) no longer matches.
pub const PRELUDE: &str = r#"
const __cascade = (function() {
    const STAMP = 'data-cascade-node';
    if (!window.__cascadeToken) {
        window.__cascadeToken = Math.random().toString(36).slice(2, 10);
        window.__cascadeSeq = 0;
    }

    const frameElements = (doc) => Array.from(doc.querySelectorAll('iframe, frame'));

    const childDocument = (frame) => {
        try {
            return frame.contentDocument || null;
        } catch (e) {
            return null;
        }
    };

    const docAt = (path) => {
        let doc = document;
        for (const index of path) {
            const frame = frameElements(doc)[index];
            const next = frame ? childDocument(frame) : null;
            if (!next) return null;
            doc = next;
        }
        return doc;
    };

    const contexts = () => {
        const found = [];
        const walk = (doc, path) => {
            found.push(path);
            frameElements(doc).forEach((frame, index) => {
                const child = childDocument(frame);
                if (child) walk(child, path.concat([index]));
            });
        };
        walk(document, []);
        return found;
    };

    const stamp = (el) => {
        let key = el.getAttribute(STAMP);
        if (!key) {
            window.__cascadeSeq += 1;
            key = window.__cascadeToken + '-' + window.__cascadeSeq;
            el.setAttribute(STAMP, key);
        }
        return key;
    };

    const node = (path, key) => {
        const doc = docAt(path);
        if (!doc) throw new Error('stale: context ' + JSON.stringify(path) + ' is gone');
        const el = doc.querySelector('[' + STAMP + '="' + key + '"]');
        if (!el) throw new Error('stale: node ' + key + ' was replaced');
        return el;
    };

    const text = (el) => {
        if (el.tagName === 'OPTION') return (el.text || '').trim();
        const raw = el.innerText !== undefined ? el.innerText : el.textContent;
        return (raw || '').trim();
    };

    const accessibleName = (el) => {
        const doc = el.ownerDocument;
        const aria = el.getAttribute('aria-label');
        if (aria && aria.trim()) return aria.trim();

        const labelledBy = el.getAttribute('aria-labelledby');
        if (labelledBy) {
            const joined = labelledBy.split(/\s+/)
                .map((id) => doc.getElementById(id))
                .filter(Boolean)
                .map((n) => (n.textContent || '').trim())
                .join(' ')
                .trim();
            if (joined) return joined;
        }

        if (el.id) {
            const label = doc.querySelector('label[for="' + CSS.escape(el.id) + '"]');
            if (label) return (label.textContent || '').trim();
        }

        const tag = el.tagName;
        if (tag === 'INPUT' && ['button', 'submit', 'reset'].includes(el.type)) {
            return (el.value || '').trim();
        }
        if (tag === 'BUTTON' || tag === 'A' || el.getAttribute('role') === 'button'
            || el.getAttribute('role') === 'link') {
            return text(el);
        }

        const wrapping = el.closest('label');
        if (wrapping) {
            const clone = wrapping.cloneNode(true);
            clone.querySelectorAll('select, option').forEach((n) => n.remove());
            const own = (clone.textContent || '').trim();
            if (own) return own;
        }

        return (el.getAttribute('title') || '').trim();
    };

    const roleSelectors = {
        combobox: 'select, [role="combobox"]',
        button: 'button, input[type="button"], input[type="submit"], input[type="reset"], [role="button"]',
        link: 'a[href], [role="link"]',
    };

    const visible = (el) => !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length);

    return { docAt, contexts, stamp, node, text, accessibleName, roleSelectors, visible };
})();
"#;

pub const CONTEXTS: &str = "() => __cascade.contexts()";

pub const QUERY_ALL: &str = r#"(path, key, css) => {
    const root = key === null ? __cascade.docAt(path) : __cascade.node(path, key);
    if (!root) throw new Error('stale: context ' + JSON.stringify(path) + ' is gone');
    return Array.from(root.querySelectorAll(css)).map(__cascade.stamp);
}"#;

pub const QUERY_BY_ROLE: &str = r#"(path, role, name) => {
    const doc = __cascade.docAt(path);
    if (!doc) throw new Error('stale: context ' + JSON.stringify(path) + ' is gone');
    return Array.from(doc.querySelectorAll(__cascade.roleSelectors[role]))
        .filter((el) => __cascade.accessibleName(el) === name)
        .map(__cascade.stamp);
}"#;

pub const NEXT_SIBLING: &str = r#"(path, key, css) => {
    let el = __cascade.node(path, key).nextElementSibling;
    while (el) {
        if (el.matches(css)) return __cascade.stamp(el);
        el = el.nextElementSibling;
    }
    return null;
}"#;

pub const ATTRIBUTE: &str =
    "(path, key, name) => __cascade.node(path, key).getAttribute(name)";

pub const TEXT: &str = "(path, key) => __cascade.text(__cascade.node(path, key))";

pub const OUTER_HTML: &str = "(path, key) => __cascade.node(path, key).outerHTML";

pub const NODE_STATE: &str = r#"(path, key) => {
    try {
        const el = __cascade.node(path, key);
        return { attached: true, visible: __cascade.visible(el) };
    } catch (e) {
        return { attached: false, visible: false };
    }
}"#;

pub const CLICK: &str = r#"(path, key) => {
    const el = __cascade.node(path, key);
    if (el.scrollIntoView) el.scrollIntoView({ block: 'center' });
    el.click();
    return true;
}"#;

/// Native selection: only real `<select>` elements, matched on the exact
/// option label. Returns a status string instead of throwing.
pub const SELECT_NATIVE: &str = r#"(path, key, label) => {
    const el = __cascade.node(path, key);
    if (el.tagName !== 'SELECT') return 'not_a_select';
    if (el.disabled) return 'disabled';
    const option = Array.from(el.options).find((o) => o.label === label);
    if (!option) return 'missing';
    option.selected = true;
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('change', { bubbles: true }));
    return 'ok';
}"#;

/// Scripted selection used when the native path is rejected. Works on a
/// `<select>` or on a custom widget wrapping one: finds the option by exact
/// trimmed text, makes it active and fires the change notification.
pub const SELECT_OPTION_FALLBACK: &str = r#"(el, args) => {
    const label = String(args.label).trim();
    const select = el.tagName === 'SELECT' ? el : el.querySelector('select');
    const scope = select || el;
    const option = Array.from(scope.querySelectorAll('option'))
        .find((o) => (o.textContent || '').trim() === label);
    if (!option) return false;
    const target = option.closest('select') || select;
    if (!target) return false;
    target.value = option.value;
    option.selected = true;
    target.dispatchEvent(new Event('input', { bubbles: true }));
    target.dispatchEvent(new Event('change', { bubbles: true }));
    return true;
}"#;

/// Runs a caller-supplied `function(element, args)` against a stamped node.
pub const EVALUATE_ON_NODE: &str = r#"(path, key, source, args) => {
    const el = __cascade.node(path, key);
    const fn = (0, eval)('(' + source + ')');
    return fn(el, args);
}"#;

/// Installs a fetch/XHR counter once per document and reports activity.
pub const NETWORK_PROBE: &str = r#"() => {
    if (!window.__cascadeNet) {
        const net = { pending: 0, last: Date.now() };
        window.__cascadeNet = net;
        const touch = () => { net.last = Date.now(); };
        const settle = () => { net.pending = Math.max(0, net.pending - 1); touch(); };

        if (window.fetch) {
            const originalFetch = window.fetch;
            window.fetch = function(...args) {
                net.pending += 1;
                touch();
                return originalFetch.apply(this, args).finally(settle);
            };
        }

        const originalSend = XMLHttpRequest.prototype.send;
        XMLHttpRequest.prototype.send = function(...args) {
            net.pending += 1;
            touch();
            this.addEventListener('loadend', settle);
            return originalSend.apply(this, args);
        };
    }

    const complete = __cascade.contexts()
        .map((path) => __cascade.docAt(path))
        .every((doc) => !doc || doc.readyState === 'complete');

    return {
        complete: complete,
        pending: window.__cascadeNet.pending,
        quietMs: Date.now() - window.__cascadeNet.last,
        url: window.location.href,
    };
}"#;

/// Builds a self-contained expression calling `function` with positional
/// JSON arguments. The expression evaluates to a JSON string envelope
/// `{ ok, value }` or `{ ok: false, error }`.
pub fn invocation(function: &str, args: &[Value]) -> String {
    let encoded = Value::Array(args.to_vec()).to_string();
    format!(
        r#"(function() {{
{prelude}
    try {{
        const __args = {args};
        const __value = ({function})(...__args);
        return JSON.stringify({{ ok: true, value: __value === undefined ? null : __value }});
    }} catch (e) {{
        return JSON.stringify({{ ok: false, error: String((e && e.message) || e) }});
    }}
}})()"#,
        prelude = PRELUDE,
        args = encoded,
        function = function,
    )
}

/// Decodes the envelope produced by an `invocation` expression.
pub fn decode_envelope(raw: &Value) -> Result<Value> {
    let text = raw.as_str().ok_or_else(|| {
        ScrapeError::JavaScriptFailed(format!("unexpected script result: {}", raw))
    })?;
    let envelope: Value = serde_json::from_str(text)?;

    if envelope.get("ok").and_then(|v| v.as_bool()).unwrap_or(false) {
        return Ok(envelope.get("value").cloned().unwrap_or(Value::Null));
    }

    let message = envelope
        .get("error")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown script error")
        .to_string();

    if message.starts_with("stale:") {
        Err(ScrapeError::StaleNode(message))
    } else {
        Err(ScrapeError::JavaScriptFailed(message))
    }
}

pub struct JavaScriptRunner;

impl JavaScriptRunner {
    /// Calls one of the scripted primitives and unwraps its result.
    pub async fn call<B: BrowserTrait>(
        browser: &B,
        tab: &B::TabHandle,
        function: &str,
        args: &[Value],
    ) -> Result<Value> {
        let raw = browser.execute_script(tab, &invocation(function, args)).await?;
        decode_envelope(&raw)
    }

    pub async fn call_with_timeout<B: BrowserTrait>(
        browser: &B,
        tab: &B::TabHandle,
        function: &str,
        args: &[Value],
        timeout_ms: u64,
    ) -> Result<Value> {
        let execution = Self::call(browser, tab, function, args);

        tokio::time::timeout(tokio::time::Duration::from_millis(timeout_ms), execution)
            .await
            .map_err(|_| ScrapeError::TimeoutError(format!("script exceeded {}ms", timeout_ms)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_invocation_embeds_arguments_as_json() {
        let script = invocation(QUERY_ALL, &[json!([0, 2]), Value::Null, json!("select")]);
        assert!(script.contains(r#"const __args = [[0,2],null,"select"];"#));
        assert!(script.contains("const __cascade"));
        assert!(script.trim_end().ends_with("})()"));
    }

    #[test]
    fn test_invocation_escapes_quotes_in_labels() {
        let script = invocation(SELECT_NATIVE, &[json!([]), json!("1-1"), json!("A \"quoted\" label")]);
        assert!(script.contains(r#""A \"quoted\" label""#));
    }

    #[test]
    fn test_decode_envelope_ok() {
        let raw = json!(r#"{"ok":true,"value":["1","2"]}"#);
        assert_eq!(decode_envelope(&raw).unwrap(), json!(["1", "2"]));
    }

    #[test]
    fn test_decode_envelope_maps_stale_errors() {
        let raw = json!(r#"{"ok":false,"error":"stale: node x-3 was replaced"}"#);
        assert!(matches!(decode_envelope(&raw), Err(ScrapeError::StaleNode(_))));

        let raw = json!(r#"{"ok":false,"error":"TypeError: boom"}"#);
        assert!(matches!(
            decode_envelope(&raw),
            Err(ScrapeError::JavaScriptFailed(_))
        ));
    }

    /// Evaluates the way `ChromeBrowser` does, through the blocking pool,
    /// with a page that takes `delay` to answer.
    struct SlowBrowser {
        delay: std::time::Duration,
    }

    #[async_trait::async_trait]
    impl BrowserTrait for SlowBrowser {
        type TabHandle = ();

        async fn launch(&mut self, _config: &crate::core::config::BrowserConfig) -> Result<()> {
            Ok(())
        }

        async fn new_tab(&self) -> Result<()> {
            Ok(())
        }

        async fn navigate(&self, _tab: &(), _url: &str, _timeout_ms: u64) -> Result<()> {
            Ok(())
        }

        async fn execute_script(&self, _tab: &(), _script: &str) -> Result<Value> {
            let delay = self.delay;
            crate::utils::blocking(move || {
                std::thread::sleep(delay);
                Ok(json!(r#"{"ok":true,"value":"done"}"#))
            })
            .await
        }

        async fn get_url(&self, _tab: &()) -> Result<String> {
            Ok("about:blank".to_string())
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_script_timeout_fires_on_a_hung_page() {
        let browser = SlowBrowser {
            delay: std::time::Duration::from_millis(800),
        };
        let started = std::time::Instant::now();

        let result = JavaScriptRunner::call_with_timeout(&browser, &(), CONTEXTS, &[], 50).await;

        assert!(matches!(result, Err(ScrapeError::TimeoutError(_))));
        assert!(started.elapsed() < std::time::Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_script_within_timeout_returns_its_value() {
        let browser = SlowBrowser {
            delay: std::time::Duration::from_millis(5),
        };

        let value = JavaScriptRunner::call_with_timeout(&browser, &(), CONTEXTS, &[], 5_000)
            .await
            .unwrap();
        assert_eq!(value, json!("done"));
    }

    #[test]
    fn test_decode_envelope_rejects_non_string() {
        assert!(decode_envelope(&json!(42)).is_err());
    }
}
