//! JavaScript snippets injected into crawled pages.
//!
//! Each constant is a self-contained arrow-function expression evaluated
//! via [`PageHandle::evaluate`](crate::driver::PageHandle::evaluate) and
//! returning JSON. Selector computation lives inside the snippets: an
//! element with an `id` is addressed as `#id`, anything else as a
//! `tag:nth-child(i)` chain from `body`, so the engine can re-locate the
//! element after a full re-navigation.

/// Collects every `href`/`src` URL reachable from the document root.
///
/// Returns a JSON array of absolute URL strings (the browser resolves
/// relative literals against the document base).
pub const FIND_HREFS: &str = r#"() => {
    let nodes = document.createNodeIterator(document.getRootNode());
    let hrefs = [];
    let node;
    while ((node = nodes.nextNode())) {
        let {href, src} = node;
        if (href) { hrefs.push(href); }
        else if (src && node.tagName === 'A') { hrefs.push(src); }
    }
    return hrefs;
}"#;

/// Enumerates visible input-like elements with their fill metadata.
///
/// Returns a JSON array of objects:
/// `{selector, kind, visible, keywords}` where `kind` is the input
/// `type` (or `"textarea"` / `"select"`) and `keywords` concatenates
/// placeholder, id, name, value and alt attributes for keyword matching.
pub const COLLECT_INPUTS: &str = r#"() => {
    const cssPath = (el) => {
        if (el.id) { return '#' + el.id; }
        let path = [];
        while (el && el.nodeType === Node.ELEMENT_NODE && el.tagName !== 'BODY') {
            let i = 1, sib = el;
            while ((sib = sib.previousElementSibling)) { i++; }
            path.unshift(el.tagName.toLowerCase() + ':nth-child(' + i + ')');
            el = el.parentElement;
        }
        return 'body > ' + path.join(' > ');
    };
    const visible = (el) => {
        const r = el.getBoundingClientRect();
        return r.width > 0 && r.height > 0;
    };
    let out = [];
    for (const el of document.querySelectorAll('input, textarea, select')) {
        let kind = el.tagName === 'INPUT' ? (el.type || 'text') : el.tagName.toLowerCase();
        let keywords = [el.placeholder, el.id, el.name, el.value, el.alt]
            .filter(Boolean).join(' ');
        out.push({selector: cssPath(el), kind: kind, visible: visible(el), keywords: keywords});
    }
    return out;
}"#;

/// Enumerates clickable elements: submit inputs, buttons and anything
/// carrying an `onclick` attribute.
///
/// Returns a JSON array of `{selector, text}` objects; `text` is the
/// element's visible text plus its value attribute, for the
/// sensitive-word guard.
pub const COLLECT_CLICKABLES: &str = r#"() => {
    const cssPath = (el) => {
        if (el.id) { return '#' + el.id; }
        let path = [];
        while (el && el.nodeType === Node.ELEMENT_NODE && el.tagName !== 'BODY') {
            let i = 1, sib = el;
            while ((sib = sib.previousElementSibling)) { i++; }
            path.unshift(el.tagName.toLowerCase() + ':nth-child(' + i + ')');
            el = el.parentElement;
        }
        return 'body > ' + path.join(' > ');
    };
    let out = [];
    for (const el of document.querySelectorAll('input[type=submit], button, [onclick]')) {
        let text = ((el.innerText || '') + ' ' + (el.value || '')).trim();
        out.push({selector: cssPath(el), text: text});
    }
    return out;
}"#;

/// Enumerates elements with registered click listeners, for the SPA
/// fallback strategy.
///
/// Returns a JSON array of selector strings. Listener registration is
/// shimmed at document start; elements wired up before the shim runs are
/// approximated by the `[onclick]` scan in [`COLLECT_CLICKABLES`].
pub const COLLECT_LISTENERS: &str = r#"() => {
    const cssPath = (el) => {
        if (el.id) { return '#' + el.id; }
        let path = [];
        while (el && el.nodeType === Node.ELEMENT_NODE && el.tagName !== 'BODY') {
            let i = 1, sib = el;
            while ((sib = sib.previousElementSibling)) { i++; }
            path.unshift(el.tagName.toLowerCase() + ':nth-child(' + i + ')');
            el = el.parentElement;
        }
        return 'body > ' + path.join(' > ');
    };
    let out = [];
    const tracked = window.__clickListenerTargets || [];
    for (const el of tracked) {
        if (el.isConnected) { out.push(cssPath(el)); }
    }
    for (const el of document.querySelectorAll('[onclick]')) {
        let sel = cssPath(el);
        if (!out.includes(sel)) { out.push(sel); }
    }
    return out;
}"#;

/// Document-start shim recording click-listener targets for
/// [`COLLECT_LISTENERS`].
pub const TRACK_LISTENERS: &str = r#"() => {
    if (window.__clickListenerTargets) { return; }
    window.__clickListenerTargets = [];
    const orig = EventTarget.prototype.addEventListener;
    EventTarget.prototype.addEventListener = function(type, fn, opts) {
        if (type === 'click' && this instanceof Element) {
            window.__clickListenerTargets.push(this);
        }
        return orig.call(this, type, fn, opts);
    };
}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snippets_are_arrow_functions() {
        for script in [
            FIND_HREFS,
            COLLECT_INPUTS,
            COLLECT_CLICKABLES,
            COLLECT_LISTENERS,
            TRACK_LISTENERS,
        ] {
            assert!(script.trim_start().starts_with("() =>"), "not a thunk");
        }
    }

    #[test]
    fn test_selector_snippets_embed_css_path() {
        assert!(COLLECT_INPUTS.contains("nth-child"));
        assert!(COLLECT_CLICKABLES.contains("nth-child"));
        assert!(COLLECT_LISTENERS.contains("nth-child"));
    }
}
