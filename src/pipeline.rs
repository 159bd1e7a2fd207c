//! The fixed capture sequence run against one leased page
//!
//! Steps always run in the same order: identity, headers, viewport, color
//! scheme, navigation, stylesheet, selector wait, font wait, delay, capture.
//! Navigation and the selector wait are the only bounded suspension points.

use crate::{CaptureError, CaptureOptions, PageDriver};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::debug;

/// Fixed desktop user agent so sites serve their regular layout.
pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/134.0.0.0 Safari/537.36";

/// Stylesheet injected after navigation so renders are consistent across hosts.
pub const SCREENSHOT_CSS: &str = "*, *::before, *::after {
  -webkit-print-color-adjust: exact !important;
  print-color-adjust: exact !important;
  text-rendering: geometricprecision !important;
  -webkit-font-smoothing: antialiased !important;
  box-sizing: border-box;
}";

pub const SELECTOR_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct CapturePipeline {
    pub navigation_timeout: Duration,
    pub selector_timeout: Duration,
    /// Forwarded to the target site as a bearer header when set.
    pub auth_token: Option<String>,
}

impl CapturePipeline {
    pub fn new(navigation_timeout: Duration, auth_token: Option<String>) -> Self {
        Self {
            navigation_timeout,
            selector_timeout: SELECTOR_TIMEOUT,
            auth_token,
        }
    }

    /// Runs the capture sequence and returns the encoded image.
    ///
    /// Stops at the first failing step. Never closes the page; that is the
    /// caller's job whatever the outcome.
    pub async fn run<D>(&self, page: &D, options: &CaptureOptions) -> Result<Vec<u8>, CaptureError>
    where
        D: PageDriver + ?Sized,
    {
        page.set_user_agent(USER_AGENT).await?;
        if let Some(token) = &self.auth_token {
            page.set_extra_headers(vec![(
                "Authorization".to_string(),
                format!("Bearer {token}"),
            )])
            .await?;
        }
        page.set_viewport(options.dimensions).await?;

        if let Some(scheme) = options.color_scheme {
            page.emulate_media_feature("prefers-color-scheme", scheme.as_str())
                .await?;
        }

        debug!("Navigating to {}", options.url);
        timeout(
            self.navigation_timeout,
            page.navigate(options.url.as_str(), options.wait_until),
        )
        .await
        .map_err(|_| CaptureError::NavigationTimeout(self.navigation_timeout))??;

        page.add_style_tag(SCREENSHOT_CSS).await?;

        if let Some(selector) = &options.wait_for_selector {
            debug!("Waiting for selector {}", selector);
            timeout(self.selector_timeout, page.wait_for_selector(selector))
                .await
                .map_err(|_| CaptureError::SelectorTimeout {
                    selector: selector.clone(),
                    timeout: self.selector_timeout,
                })??;
        }

        page.wait_for_fonts().await?;

        if let Some(delay) = options.delay {
            sleep(delay).await;
        }

        page.screenshot(options.screenshot_spec()).await
    }
}
