//! Browser page capability interface
//!
//! The capture pipeline only ever talks to a [`PageDriver`]; the chromium
//! implementation lives in [`crate::chrome`] and tests substitute fakes.

use crate::{CaptureError, Dimensions, ScreenshotSpec, WaitUntil};
use async_trait::async_trait;

/// Operations the capture pipeline needs from one browser rendering surface.
///
/// Implementations do not enforce timeouts themselves (apart from whatever
/// the underlying driver imposes); the pipeline bounds each suspension point.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn set_user_agent(&self, user_agent: &str) -> Result<(), CaptureError>;

    /// Headers added to every request the page issues from now on.
    async fn set_extra_headers(&self, headers: Vec<(String, String)>) -> Result<(), CaptureError>;

    async fn set_viewport(&self, dimensions: Dimensions) -> Result<(), CaptureError>;

    /// Emulates a CSS media feature such as `prefers-color-scheme`.
    async fn emulate_media_feature(&self, name: &str, value: &str) -> Result<(), CaptureError>;

    /// Navigates and resolves once `wait_until` is satisfied.
    async fn navigate(&self, url: &str, wait_until: WaitUntil) -> Result<(), CaptureError>;

    async fn add_style_tag(&self, css: &str) -> Result<(), CaptureError>;

    /// Resolves once `selector` matches an element in the DOM. Never times out on its own.
    async fn wait_for_selector(&self, selector: &str) -> Result<(), CaptureError>;

    /// Resolves once `document.fonts.ready` settles.
    async fn wait_for_fonts(&self) -> Result<(), CaptureError>;

    async fn screenshot(&self, spec: ScreenshotSpec) -> Result<Vec<u8>, CaptureError>;

    /// Closes the page and whatever per-page browser state backs it.
    async fn close(&self) -> Result<(), CaptureError>;
}
