//! Page action pipeline.
//!
//! After a page settles, the pipeline runs one of two strategies:
//!
//! - **Standard**: Input-Fill → Link-Harvest → Click-Explore. Used
//!   whenever the page exposes anchors or fillable/submit elements.
//! - **SPA fallback**: enumerate elements with click listeners and
//!   re-navigate to the page before clicking each one, recording URL
//!   changes as event URLs. Used only when the standard strategy would
//!   find nothing at all; the two are never combined.
//!
//! Element failures are page-scoped: a dead selector or refused click is
//! logged and skipped, never escalated.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::driver::PageHandle;
use crate::error::Result;
use crate::record::TrafficRecord;
use crate::script;

use super::CrawlShared;

// ============================================================================
// Constants
// ============================================================================

/// Settle delay after a click before inspecting the page URL.
const CLICK_SETTLE: Duration = Duration::from_millis(500);

// ============================================================================
// Element Metadata
// ============================================================================

/// One input-like element reported by [`script::COLLECT_INPUTS`].
#[derive(Debug, Deserialize)]
struct InputInfo {
    selector: String,
    kind: String,
    visible: bool,
    #[serde(default)]
    keywords: String,
}

impl InputInfo {
    fn is_fillable(&self) -> bool {
        self.visible
            && matches!(
                self.kind.as_str(),
                "text" | "password" | "email" | "tel" | "search" | "number" | "file" | "radio"
                    | "checkbox" | "textarea" | "select"
            )
    }
}

/// One clickable element reported by [`script::COLLECT_CLICKABLES`].
#[derive(Debug, Deserialize)]
struct ClickableInfo {
    selector: String,
    #[serde(default)]
    text: String,
}

// ============================================================================
// ActionPipeline
// ============================================================================

/// Runs the action strategy for one loaded page.
pub(crate) struct ActionPipeline {
    shared: Arc<CrawlShared>,
    page_url: String,
    depth: usize,
}

impl ActionPipeline {
    pub(crate) fn new(shared: Arc<CrawlShared>, page_url: String, depth: usize) -> Self {
        Self {
            shared,
            page_url,
            depth,
        }
    }

    /// Executes the pipeline on `page`.
    pub(crate) async fn run(&self, page: &Arc<dyn PageHandle>) -> Result<()> {
        let hrefs: Vec<String> = serde_json::from_value(page.evaluate(script::FIND_HREFS).await?)?;
        let inputs: Vec<InputInfo> =
            serde_json::from_value(page.evaluate(script::COLLECT_INPUTS).await?)?;
        let clickables: Vec<ClickableInfo> =
            serde_json::from_value(page.evaluate(script::COLLECT_CLICKABLES).await?)?;

        let has_fillable = inputs.iter().any(InputInfo::is_fillable);
        if hrefs.is_empty() && !has_fillable && clickables.is_empty() {
            debug!(url = %self.page_url, "No static surface, switching to event strategy");
            return self.run_event_strategy(page).await;
        }

        self.fill_inputs(page, &inputs).await;
        for href in &hrefs {
            if self.shared.stopping() {
                return Ok(());
            }
            self.shared.harvest(href, self.depth + 1).await;
        }
        self.click_explore(page, &clickables).await;
        Ok(())
    }

    // ========================================================================
    // Input-Fill
    // ========================================================================

    async fn fill_inputs(&self, page: &Arc<dyn PageHandle>, inputs: &[InputInfo]) {
        for input in inputs {
            if self.shared.stopping() {
                return;
            }
            if !input.visible {
                continue;
            }
            let result = match input.kind.as_str() {
                "text" | "password" | "email" | "tel" | "search" | "number" | "textarea" => {
                    let value = self.shared.config.fill_value_for(&input.keywords);
                    page.input(&input.selector, value).await
                }
                "file" => match self.shared.config.upload_path_for(&input.keywords) {
                    Some(path) => page.set_input_files(&input.selector, path).await,
                    None => continue,
                },
                "radio" | "checkbox" => page.click(&input.selector).await,
                "select" => {
                    page.evaluate(&select_last_option(&input.selector))
                        .await
                        .map(|_| ())
                }
                _ => continue,
            };
            if let Err(err) = result {
                debug!(selector = %input.selector, error = %err, "Input fill skipped");
            }
        }
    }

    // ========================================================================
    // Click-Explore
    // ========================================================================

    async fn click_explore(&self, page: &Arc<dyn PageHandle>, clickables: &[ClickableInfo]) {
        for clickable in clickables {
            if self.shared.stopping() {
                return;
            }
            if self.is_sensitive(&clickable.text) {
                debug!(selector = %clickable.selector, "Skipping sensitive element");
                continue;
            }
            if let Err(err) = page.click(&clickable.selector).await {
                debug!(selector = %clickable.selector, error = %err, "Click skipped");
                continue;
            }
            tokio::time::sleep(CLICK_SETTLE).await;

            let landed = match page.current_url().await {
                Ok(url) => url,
                Err(err) => {
                    warn!(error = %err, "Current URL unavailable after click");
                    continue;
                }
            };
            if !landed.is_empty() && landed != self.page_url {
                self.shared.harvest(&landed, self.depth + 1).await;
                self.return_to_page(page).await;
            }
        }
    }

    /// Navigates back after a click changed the URL, with one full
    /// re-navigation retry.
    async fn return_to_page(&self, page: &Arc<dyn PageHandle>) {
        let timeout = self.shared.config.page_timeout;
        let back = async {
            page.navigate_back().await?;
            page.wait_load(timeout).await
        };
        if back.await.is_ok() {
            return;
        }
        let retry = async {
            page.navigate(&self.page_url).await?;
            page.wait_load(timeout).await
        };
        if let Err(err) = retry.await {
            warn!(url = %self.page_url, error = %err, "Failed to return after click");
        }
    }

    // ========================================================================
    // SPA Fallback
    // ========================================================================

    async fn run_event_strategy(&self, page: &Arc<dyn PageHandle>) -> Result<()> {
        let inputs: Vec<InputInfo> =
            serde_json::from_value(page.evaluate(script::COLLECT_INPUTS).await?)?;
        self.fill_inputs(page, &inputs).await;

        let selectors: Vec<String> =
            serde_json::from_value(page.evaluate(script::COLLECT_LISTENERS).await?)?;
        let timeout = self.shared.config.page_timeout;

        for selector in &selectors {
            if self.shared.stopping() {
                return Ok(());
            }
            // Clicks mutate SPA state, so each one starts from a fresh
            // navigation to the origin page.
            page.navigate(&self.page_url).await?;
            page.wait_load(timeout).await?;
            tokio::time::sleep(CLICK_SETTLE).await;

            if let Err(err) = page.click(selector).await {
                debug!(selector = %selector, error = %err, "Event click skipped");
                continue;
            }
            tokio::time::sleep(CLICK_SETTLE).await;

            let landed = match page.current_url().await {
                Ok(url) => url,
                Err(_) => continue,
            };
            if landed.is_empty() || landed == self.page_url {
                continue;
            }

            if self.shared.policy.scope().admits(&landed) {
                let key = self.shared.dedup.url_key(&landed);
                if self.shared.mark_sent(&key) {
                    let record = TrafficRecord::event_url(landed.clone(), self.page_url.clone());
                    self.shared.emit(record).await;
                }
            }
            self.shared.harvest(&landed, self.depth + 1).await;
        }
        Ok(())
    }

    fn is_sensitive(&self, text: &str) -> bool {
        if self.shared.config.sensitive_words.is_empty() {
            return false;
        }
        let lowered = text.to_lowercase();
        self.shared
            .config
            .sensitive_words
            .iter()
            .any(|word| lowered.contains(word.as_str()))
    }
}

/// Script selecting the last option of the `<select>` at `selector`.
fn select_last_option(selector: &str) -> String {
    let quoted = serde_json::to_string(selector).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        "() => {{ const el = document.querySelector({quoted}); \
         if (!el || el.options.length === 0) {{ return false; }} \
         el.selectedIndex = el.options.length - 1; \
         el.dispatchEvent(new Event('change', {{bubbles: true}})); \
         return true; }}"
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_info_fillable() {
        let fillable = InputInfo {
            selector: "#user".to_string(),
            kind: "text".to_string(),
            visible: true,
            keywords: "username".to_string(),
        };
        assert!(fillable.is_fillable());

        let hidden = InputInfo {
            selector: "#user".to_string(),
            kind: "text".to_string(),
            visible: false,
            keywords: String::new(),
        };
        assert!(!hidden.is_fillable());

        let submit = InputInfo {
            selector: "#go".to_string(),
            kind: "submit".to_string(),
            visible: true,
            keywords: String::new(),
        };
        assert!(!submit.is_fillable());
    }

    #[test]
    fn test_input_info_deserializes_from_script_shape() {
        let value = serde_json::json!([
            {"selector": "#username", "kind": "text", "visible": true, "keywords": "username login"},
            {"selector": "body > form:nth-child(1) > input:nth-child(2)", "kind": "password", "visible": true}
        ]);
        let inputs: Vec<InputInfo> = serde_json::from_value(value).expect("deserialize");
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[1].kind, "password");
        assert!(inputs[1].keywords.is_empty());
    }

    #[test]
    fn test_select_last_option_quotes_selector() {
        let script = select_last_option("body > select:nth-child(3)");
        assert!(script.contains(r#"querySelector("body > select:nth-child(3)")"#));
        assert!(script.starts_with("() =>"));
    }
}
