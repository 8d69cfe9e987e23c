//! Chromium renderer over the DevTools protocol.
//!
//! chromiumoxide is async; the engine is not. Each tab call is driven to
//! completion with `block_on` on a current-thread runtime owned by the
//! browser, and the CDP handler task only makes progress during those calls.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, anyhow, bail};
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::element::Element;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

use crate::capability::{Browser, Geometry, Renderer};
use crate::config::{BrowserConfig as BrowserSettings, CaptureConfig};

const GEOMETRY_JS: &str = "function() { \
    const r = this.getBoundingClientRect(); \
    return JSON.stringify([Math.ceil(r.width), Math.ceil(r.height)]); \
}";

/// CDP reports an empty match on a scoped node as a protocol error. Anything
/// else (closed socket, crashed target) is a real failure.
fn is_no_match(message: &str) -> bool {
    message.contains("Could not find node")
}

/// A launched Chromium with a persistent profile.
pub struct ChromeBrowser {
    runtime: Arc<Runtime>,
    browser: CdpBrowser,
    handler: JoinHandle<()>,
}

impl ChromeBrowser {
    /// Launch Chromium with a `capture.width × capture.height` viewport.
    pub fn launch(settings: &BrowserSettings, capture: CaptureConfig) -> Result<Self> {
        let start = Instant::now();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to start tokio runtime")?;

        let mut builder = BrowserConfig::builder()
            .window_size(capture.width, capture.height)
            .viewport(Viewport {
                width: capture.width,
                height: capture.height,
                ..Viewport::default()
            })
            .user_data_dir(&settings.user_data_dir)
            .arg("--hide-scrollbars");
        if !settings.headless {
            builder = builder.with_head();
        }
        if let Some(exe) = &settings.executable {
            builder = builder.chrome_executable(exe);
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("invalid browser configuration: {e}"))?;

        let (browser, mut events) = runtime
            .block_on(CdpBrowser::launch(config))
            .context("failed to launch Chromium")?;
        let handler = runtime.spawn(async move {
            while let Some(event) = events.next().await {
                if let Err(e) = event {
                    debug!("chrome: handler event error: {e}");
                }
            }
        });

        info!(
            "chrome: launched in {:.1}ms (viewport {}x{}, headless={})",
            start.elapsed().as_secs_f64() * 1000.0,
            capture.width,
            capture.height,
            settings.headless
        );
        Ok(Self {
            runtime: Arc::new(runtime),
            browser,
            handler,
        })
    }

    /// Close Chromium and stop the handler task.
    pub fn shutdown(mut self) -> Result<()> {
        let runtime = Arc::clone(&self.runtime);
        runtime.block_on(async {
            self.browser.close().await.context("failed to close Chromium")?;
            if let Err(e) = self.browser.wait().await {
                warn!("chrome: waiting for exit failed: {e}");
            }
            Ok::<_, anyhow::Error>(())
        })?;
        self.handler.abort();
        info!("chrome: shut down");
        Ok(())
    }
}

impl Browser for ChromeBrowser {
    type Tab = ChromeTab;

    fn open_tab(&mut self) -> Result<ChromeTab> {
        let page = self
            .runtime
            .block_on(self.browser.new_page("about:blank"))
            .context("failed to open tab")?;
        Ok(ChromeTab {
            runtime: Arc::clone(&self.runtime),
            page: Some(page),
        })
    }
}

/// One Chromium tab. `close` consumes the underlying page.
pub struct ChromeTab {
    runtime: Arc<Runtime>,
    page: Option<Page>,
}

impl ChromeTab {
    fn page(&self) -> Result<&Page> {
        self.page.as_ref().context("tab already closed")
    }
}

impl Renderer for ChromeTab {
    type Node = Element;

    fn navigate(&mut self, url: &str) -> Result<()> {
        let page = self.page()?;
        self.runtime
            .block_on(page.goto(url))
            .with_context(|| format!("navigation to {url} failed"))?;
        Ok(())
    }

    fn wait_until_ready(&mut self) -> Result<bool> {
        let page = self.page()?;
        self.runtime
            .block_on(page.wait_for_navigation())
            .context("waiting for page load failed")?;
        Ok(true)
    }

    fn query_node(&mut self, selector: &str, scope: Option<&Element>) -> Result<Option<Element>> {
        Ok(self.query_all(selector, scope)?.into_iter().next())
    }

    fn query_all(&mut self, selector: &str, scope: Option<&Element>) -> Result<Vec<Element>> {
        let found = match scope {
            Some(node) => self.runtime.block_on(node.find_elements(selector)),
            None => {
                let page = self.page()?;
                self.runtime.block_on(page.find_elements(selector))
            }
        };
        match found {
            Ok(nodes) => Ok(nodes),
            Err(e) if is_no_match(&e.to_string()) => {
                debug!("chrome: query {selector:?} matched nothing: {e}");
                Ok(Vec::new())
            }
            Err(e) => Err(e).with_context(|| format!("query {selector:?} failed")),
        }
    }

    fn children(&mut self, node: &Element) -> Result<Vec<Element>> {
        self.runtime
            .block_on(node.find_elements(":scope > *"))
            .context("failed to list children")
    }

    fn geometry(&mut self, node: &Element) -> Result<Geometry> {
        let ret = self
            .runtime
            .block_on(node.call_js_fn(GEOMETRY_JS, false))
            .context("failed to measure node")?;
        let json = ret
            .result
            .value
            .and_then(|v| v.as_str().map(str::to_owned))
            .context("node measurement returned no value")?;
        let [width, height]: [f64; 2] =
            serde_json::from_str(&json).context("unexpected node measurement")?;
        Ok(Geometry {
            width: width.max(0.0) as u32,
            height: height.max(0.0) as u32,
        })
    }

    fn text(&mut self, node: &Element) -> Result<String> {
        let text = self
            .runtime
            .block_on(node.inner_text())
            .context("failed to read text")?;
        Ok(text.unwrap_or_default())
    }

    fn attribute(&mut self, node: &Element, name: &str) -> Result<Option<String>> {
        self.runtime
            .block_on(node.attribute(name))
            .with_context(|| format!("failed to read attribute {name}"))
    }

    fn scroll_by(&mut self, distance: u32) -> Result<()> {
        let page = self.page()?;
        self.runtime
            .block_on(page.evaluate(format!("window.scrollBy(0, {distance})")))
            .context("scroll failed")?;
        Ok(())
    }

    fn scroll_extent(&mut self) -> Result<u32> {
        let page = self.page()?;
        let extent: f64 = self
            .runtime
            .block_on(page.evaluate("document.body.scrollHeight"))
            .context("failed to read scroll height")?
            .into_value()
            .context("scroll height is not a number")?;
        Ok(extent.max(0.0) as u32)
    }

    fn capture(&mut self, node: &Element) -> Result<Vec<u8>> {
        let png = self
            .runtime
            .block_on(node.screenshot(CaptureScreenshotFormat::Png))
            .context("element screenshot failed")?;
        if png.is_empty() {
            bail!("element screenshot is empty");
        }
        Ok(png)
    }

    fn invoke(&mut self, node: &Element) -> Result<()> {
        self.runtime
            .block_on(node.click())
            .context("click failed")?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(page) = self.page.take() {
            self.runtime
                .block_on(page.close())
                .context("failed to close tab")?;
        }
        Ok(())
    }
}
