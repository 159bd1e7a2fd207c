//! Chromium-backed implementation of the page capability interface
//!
//! A [`ChromeBrowser`] owns one Chrome process and the task that drives its
//! DevTools connection. [`ChromePage`] adapts a chromiumoxide page to
//! [`PageDriver`], and the two factories decide how pages are provisioned:
//! an incognito context per page for the pooled strategy, or plain pages on a
//! process-wide warm browser for the ephemeral one.

use crate::browser_pool::PageFactory;
use crate::{
    create_browser_config, CaptureError, Config, Dimensions, ImageFormat, PageDriver,
    ScreenshotSpec, WaitUntil,
};
use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::emulation::{
    MediaFeature, SetDeviceMetricsOverrideParams, SetEmulatedMediaParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, Headers, SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, EventLifecycleEvent, SetLifecycleEventsEnabledParams,
};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A running Chrome process and its DevTools event loop.
pub struct ChromeBrowser {
    browser: Mutex<Browser>,
    handler: JoinHandle<Result<(), chromiumoxide::error::CdpError>>,
}

impl ChromeBrowser {
    pub async fn launch(config: &Config) -> Result<Self, CaptureError> {
        let browser_config = create_browser_config(config)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| CaptureError::BrowserLaunchFailed(e.to_string()))?;

        // The handler is a stream that must be polled for any command to complete.
        let handler = tokio::spawn(async move {
            loop {
                match handler.next().await {
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        error!("Browser handler error: {}", e);
                        return Err(e);
                    }
                    None => {
                        info!("Browser handler stream ended");
                        break;
                    }
                }
            }
            Ok(())
        });

        info!("Browser launched");
        Ok(Self {
            browser: Mutex::new(browser),
            handler,
        })
    }

    /// False once the DevTools connection has gone away.
    pub fn is_alive(&self) -> bool {
        !self.handler.is_finished()
    }

    async fn new_page(&self, params: CreateTargetParams) -> Result<Page, CaptureError> {
        let browser = self.browser.lock().await;
        Ok(browser.new_page(params).await?)
    }

    async fn create_context(&self) -> Result<BrowserContextId, CaptureError> {
        let browser = self.browser.lock().await;
        let response = browser
            .execute(CreateBrowserContextParams::default())
            .await?;
        Ok(response.result.browser_context_id.clone())
    }

    async fn dispose_context(&self, id: BrowserContextId) -> Result<(), CaptureError> {
        let browser = self.browser.lock().await;
        browser.execute(DisposeBrowserContextParams::new(id)).await?;
        Ok(())
    }

    pub async fn close(&self) {
        if let Err(e) = self.browser.lock().await.close().await {
            warn!("Failed to close browser cleanly: {}", e);
        }
        self.handler.abort();
    }
}

/// Holds at most one live browser, relaunching it when the process has died.
#[derive(Default)]
pub struct BrowserSlot {
    current: Mutex<Option<Arc<ChromeBrowser>>>,
}

impl BrowserSlot {
    pub async fn get_or_launch(&self, config: &Config) -> Result<Arc<ChromeBrowser>, CaptureError> {
        let mut current = self.current.lock().await;

        if let Some(browser) = current.as_ref() {
            if browser.is_alive() {
                return Ok(browser.clone());
            }
            warn!("Browser connection lost, relaunching");
            browser.close().await;
        }

        let browser = Arc::new(ChromeBrowser::launch(config).await?);
        *current = Some(browser.clone());
        Ok(browser)
    }

    pub async fn shutdown(&self) {
        if let Some(browser) = self.current.lock().await.take() {
            browser.close().await;
        }
    }
}

static WARM_BROWSER: OnceLock<BrowserSlot> = OnceLock::new();

/// Browser reused by every ephemeral request served by this process.
fn warm_browser() -> &'static BrowserSlot {
    WARM_BROWSER.get_or_init(BrowserSlot::default)
}

/// One browser tab, optionally backed by its own incognito context.
#[derive(Clone)]
pub struct ChromePage {
    page: Page,
    context: Option<(Arc<ChromeBrowser>, BrowserContextId)>,
}

impl ChromePage {
    async fn evaluate_bool(&self, expression: String) -> Result<bool, CaptureError> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(CaptureError::PageError)?;

        let result = self.page.evaluate_expression(params).await?;
        result
            .into_value::<bool>()
            .map_err(|e| CaptureError::PageError(e.to_string()))
    }

    async fn wait_for_lifecycle(&self, url: &str, event_name: &str) -> Result<(), CaptureError> {
        self.page
            .execute(SetLifecycleEventsEnabledParams::new(true))
            .await?;
        let mut events = self.page.event_listener::<EventLifecycleEvent>().await?;

        self.page.goto(url).await?;
        let main_frame = self.page.mainframe().await?;

        // Lifecycle events of the previous document can still be buffered;
        // only events after the new document's "init" count.
        let mut navigation_started = false;
        while let Some(event) = events.next().await {
            if main_frame.as_ref().is_some_and(|id| *id != event.frame_id) {
                continue;
            }
            match event.name.as_str() {
                "init" => navigation_started = true,
                name if navigation_started && name == event_name => return Ok(()),
                _ => {}
            }
        }

        Err(CaptureError::PageError(
            "page closed while waiting for network idle".to_string(),
        ))
    }
}

#[async_trait]
impl PageDriver for ChromePage {
    async fn set_user_agent(&self, user_agent: &str) -> Result<(), CaptureError> {
        self.page
            .execute(SetUserAgentOverrideParams::new(user_agent.to_string()))
            .await?;
        Ok(())
    }

    async fn set_extra_headers(&self, headers: Vec<(String, String)>) -> Result<(), CaptureError> {
        let map: serde_json::Map<String, serde_json::Value> = headers
            .into_iter()
            .map(|(name, value)| (name, serde_json::Value::String(value)))
            .collect();

        self.page.execute(EnableParams::default()).await?;
        self.page
            .execute(SetExtraHttpHeadersParams::new(Headers::new(
                serde_json::Value::Object(map),
            )))
            .await?;
        Ok(())
    }

    async fn set_viewport(&self, dimensions: Dimensions) -> Result<(), CaptureError> {
        let params = SetDeviceMetricsOverrideParams::builder()
            .width(dimensions.width as i64)
            .height(dimensions.height as i64)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(CaptureError::PageError)?;

        self.page.execute(params).await?;
        Ok(())
    }

    async fn emulate_media_feature(&self, name: &str, value: &str) -> Result<(), CaptureError> {
        let params = SetEmulatedMediaParams::builder()
            .features(vec![MediaFeature::new(name, value)])
            .build();

        self.page.execute(params).await?;
        Ok(())
    }

    async fn navigate(&self, url: &str, wait_until: WaitUntil) -> Result<(), CaptureError> {
        debug!("Navigating to {} (wait until {:?})", url, wait_until);
        match wait_until {
            // goto resolves on the load event, which follows DOMContentLoaded.
            WaitUntil::Load | WaitUntil::DomContentLoaded => {
                self.page.goto(url).await?;
                Ok(())
            }
            WaitUntil::NetworkIdle0 => self.wait_for_lifecycle(url, "networkIdle").await,
            WaitUntil::NetworkIdle2 => self.wait_for_lifecycle(url, "networkAlmostIdle").await,
        }
    }

    async fn add_style_tag(&self, css: &str) -> Result<(), CaptureError> {
        let css = serde_json::to_string(css).map_err(|e| CaptureError::Internal(e.to_string()))?;
        let script = format!(
            "(() => {{ const style = document.createElement('style'); \
             style.textContent = {css}; \
             (document.head || document.documentElement).appendChild(style); \
             return true; }})()"
        );
        self.evaluate_bool(script).await?;
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str) -> Result<(), CaptureError> {
        let selector =
            serde_json::to_string(selector).map_err(|e| CaptureError::Internal(e.to_string()))?;
        let script = format!("document.querySelector({selector}) !== null");

        loop {
            if self.evaluate_bool(script.clone()).await? {
                return Ok(());
            }
            tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    async fn wait_for_fonts(&self) -> Result<(), CaptureError> {
        self.evaluate_bool("document.fonts.ready.then(() => true)".to_string())
            .await?;
        Ok(())
    }

    async fn screenshot(&self, spec: ScreenshotSpec) -> Result<Vec<u8>, CaptureError> {
        let format = match spec.format {
            ImageFormat::Png => CaptureScreenshotFormat::Png,
            ImageFormat::Jpeg => CaptureScreenshotFormat::Jpeg,
            ImageFormat::Webp => CaptureScreenshotFormat::Webp,
        };

        let mut builder = ScreenshotParams::builder()
            .format(format)
            .full_page(spec.full_page);
        if let Some(quality) = spec.quality {
            builder = builder.quality(quality as i64);
        }

        self.page
            .screenshot(builder.build())
            .await
            .map_err(|e| CaptureError::CaptureFailed(e.to_string()))
    }

    async fn close(&self) -> Result<(), CaptureError> {
        let closed = self.page.clone().close().await;

        if let Some((browser, context_id)) = &self.context {
            browser.dispose_context(context_id.clone()).await?;
        }

        closed?;
        Ok(())
    }
}

fn blank_target(context: Option<BrowserContextId>) -> Result<CreateTargetParams, CaptureError> {
    let mut builder = CreateTargetParams::builder().url("about:blank");
    if let Some(id) = context {
        builder = builder.browser_context_id(id);
    }
    builder.build().map_err(CaptureError::PageError)
}

/// Incognito context not yet owned by a page. Disposed on drop, so a failed
/// or cancelled page open does not leave it behind.
struct PendingContext {
    browser: Arc<ChromeBrowser>,
    id: BrowserContextId,
    armed: bool,
}

impl PendingContext {
    fn keep(mut self) -> (Arc<ChromeBrowser>, BrowserContextId) {
        self.armed = false;
        (self.browser.clone(), self.id.clone())
    }
}

impl Drop for PendingContext {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let browser = self.browser.clone();
        let id = self.id.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = browser.dispose_context(id).await {
                    warn!("Failed to dispose browser context: {}", e);
                }
            });
        }
    }
}

/// Pooled provisioning: one long-lived browser, a fresh incognito context per page.
pub struct ChromeContextFactory {
    config: Config,
    slot: BrowserSlot,
}

impl ChromeContextFactory {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            slot: BrowserSlot::default(),
        }
    }
}

#[async_trait]
impl PageFactory for ChromeContextFactory {
    type Page = ChromePage;

    async fn open_page(&self) -> Result<ChromePage, CaptureError> {
        let browser = self.slot.get_or_launch(&self.config).await?;
        let context = PendingContext {
            id: browser.create_context().await?,
            browser,
            armed: true,
        };

        let target = blank_target(Some(context.id.clone()))?;
        let page = context.browser.new_page(target).await?;
        let (browser, context_id) = context.keep();
        Ok(ChromePage {
            page,
            context: Some((browser, context_id)),
        })
    }

    async fn shutdown(&self) {
        self.slot.shutdown().await;
    }
}

/// Ephemeral provisioning: a plain page on the process-wide warm browser.
pub struct ChromeWarmFactory {
    config: Config,
}

impl ChromeWarmFactory {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PageFactory for ChromeWarmFactory {
    type Page = ChromePage;

    async fn open_page(&self) -> Result<ChromePage, CaptureError> {
        let browser = warm_browser().get_or_launch(&self.config).await?;
        let page = browser.new_page(blank_target(None)?).await?;
        Ok(ChromePage {
            page,
            context: None,
        })
    }

    async fn shutdown(&self) {
        warm_browser().shutdown().await;
    }
}
