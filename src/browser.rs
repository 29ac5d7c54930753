use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetLocaleOverrideParams, SetTimezoneOverrideParams,
};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::page::{PinFeed, RawPin};
use crate::settings::Settings;

/// Selector for one pin card in the feed.
const PIN_SELECTOR: &str = r#"div[data-test-id="pin"]"#;

/// Ordered candidate selectors for the title- and description-bearing
/// sub-elements; first match wins.
const TITLE_SELECTORS: &str = r#"h1, [data-test-id="pin-closeup-title"], [data-test-id="pin-card-title"], div[data-test-id="pin-title"], [data-test-id="card-title"]"#;
const DESCRIPTION_SELECTORS: &str = r#"[data-test-id="pin-closeup-description"], [data-test-id="pin-card-description"], div[data-test-id="pin-description"], [data-test-id="card-description"]"#;

// Overrides the fingerprint surfaces automation typically leaks through.
const STEALTH_INIT_SCRIPT: &str = r#"
    Object.defineProperty(navigator, 'webdriver', {
      get: () => undefined
    });
    Object.defineProperty(navigator, 'plugins', {
        get: () => [
            { name: 'Chrome PDF Viewer', description: 'Portable Document Format' },
            { name: 'Chrome PDF Viewer', description: 'Portable Document Format' }
        ]
    });
    Object.defineProperty(navigator, 'languages', {
        get: () => ['pt-BR', 'pt', 'en-US', 'en']
    });
    Object.defineProperty(navigator, 'deviceMemory', {
        get: () => 8
    });
    Object.defineProperty(navigator, 'hardwareConcurrency', {
        get: () => 4
    });
    window.chrome = { runtime: {}, csi: () => {}, loadTimes: () => {} };
    window.navigator.chrome = window.chrome;
    window.console.debug = () => {};
"#;

/// One headless Chromium instance with a single tab, released explicitly
/// via `close()` once the run result is known.
pub struct BrowserSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl BrowserSession {
    pub async fn launch(settings: &Settings) -> Result<Self> {
        let config = BrowserConfig::builder()
            .no_sandbox()
            .window_size(settings.viewport_width, settings.viewport_height)
            .request_timeout(Duration::from_secs(30))
            .arg("--disable-setuid-sandbox")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-gpu")
            .arg("--no-zygote")
            .build()
            .map_err(|e| anyhow::anyhow!("Invalid browser config: {}", e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch Chromium")?;

        // Drive browser events until the transport closes.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("Failed to open a tab")?;
        page.set_user_agent(settings.user_agent.as_str()).await?;
        page.execute(SetTimezoneOverrideParams::new(settings.timezone.clone()))
            .await?;
        page.execute(SetLocaleOverrideParams {
            locale: Some(settings.locale.clone()),
        })
        .await?;
        page.evaluate_on_new_document(STEALTH_INIT_SCRIPT).await?;

        Ok(Self {
            browser,
            page,
            handler_task,
        })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub async fn goto(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("Navigation to {} failed", url))?;
        Ok(())
    }

    pub async fn current_url(&self) -> Result<Option<String>> {
        Ok(self.page.url().await?)
    }

    /// Poll for a selector until it attaches or the timeout passes.
    pub async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<bool> {
        let script = format!(
            r#"(async () => {{
                const deadline = Date.now() + {timeout_ms};
                while (Date.now() < deadline) {{
                    if (document.querySelector({selector})) return true;
                    await new Promise(r => setTimeout(r, 250));
                }}
                return false;
            }})()"#,
            timeout_ms = timeout.as_millis(),
            selector = serde_json::to_string(selector)?,
        );
        let found = self.page.evaluate(script).await?.into_value::<bool>()?;
        Ok(found)
    }

    /// Close the tab and the browser process, then wait for the event
    /// handler task to drain.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Browser did not close cleanly: {}", e);
        }
        let _ = self.handler_task.await;
    }
}

#[async_trait]
impl PinFeed for BrowserSession {
    async fn wait_for_pins(&self, timeout: Duration) -> Result<bool> {
        self.wait_for_selector(PIN_SELECTOR, timeout).await
    }

    /// One evaluate call snapshots every attached pin. The per-element reads
    /// run inside a try/catch so an element detaching mid-read drops that
    /// element, never the pass.
    async fn visible_pins(&self) -> Result<Vec<RawPin>> {
        let script = format!(
            r#"(() => {{
                const out = [];
                for (const el of document.querySelectorAll('{pin}')) {{
                    try {{
                        const rect = el.getBoundingClientRect();
                        const fingerprint =
                            (el.dataset.testId || 'pin') + '-' + rect.top + '-' + rect.left;
                        const img = el.querySelector('img');
                        const link = el.querySelector('a[href*="/pin/"]');
                        const titleEl = el.querySelector('{title}');
                        const descEl = el.querySelector('{desc}');
                        out.push({{
                            fingerprint,
                            image_src: img ? img.getAttribute('src') : null,
                            pin_href: link ? link.getAttribute('href') : null,
                            title: titleEl ? titleEl.innerText : null,
                            description: descEl ? descEl.innerText : null,
                        }});
                    }} catch (e) {{
                        // Detached mid-read; skip the element.
                    }}
                }}
                return out;
            }})()"#,
            pin = PIN_SELECTOR,
            title = TITLE_SELECTORS,
            desc = DESCRIPTION_SELECTORS,
        );
        let pins = self.page.evaluate(script).await?.into_value::<Vec<RawPin>>()?;
        debug!("Snapshot of {} visible pin elements", pins.len());
        Ok(pins)
    }

    async fn scroll_to_bottom(&self) -> Result<()> {
        self.page
            .evaluate("window.scrollTo(0, document.body.scrollHeight);")
            .await?;
        Ok(())
    }

    async fn scroll_height(&self) -> Result<i64> {
        let height = self
            .page
            .evaluate("document.body.scrollHeight")
            .await?
            .into_value::<i64>()?;
        Ok(height)
    }
}
