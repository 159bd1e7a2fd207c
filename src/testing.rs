//! In-process page fakes for provider, engine and router tests.

use crate::browser_pool::PageFactory;
use crate::{CaptureError, Dimensions, ImageFormat, PageDriver, ScreenshotSpec, WaitUntil};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

#[derive(Default)]
struct Shared {
    opened: AtomicUsize,
    closed: AtomicUsize,
    fail_next_open: AtomicBool,
    selector_never_matches: AtomicBool,
    navigation_never_settles: AtomicBool,
    /// When set, every screenshot waits for one permit.
    screenshot_gate: Mutex<Option<Arc<Semaphore>>>,
    /// When set, every close waits for one permit.
    close_gate: Mutex<Option<Arc<Semaphore>>>,
    calls: Mutex<Vec<String>>,
    viewports: Mutex<Vec<Dimensions>>,
    specs: Mutex<Vec<ScreenshotSpec>>,
}

/// Opens [`StubPage`]s and records everything done to them.
#[derive(Clone, Default)]
pub struct StubFactory {
    shared: Arc<Shared>,
}

impl StubFactory {
    pub fn opened(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.shared.closed.load(Ordering::SeqCst)
    }

    pub fn fail_next_open(&self) {
        self.shared.fail_next_open.store(true, Ordering::SeqCst);
    }

    pub fn selector_never_matches(&self) {
        self.shared.selector_never_matches.store(true, Ordering::SeqCst);
    }

    pub fn navigation_never_settles(&self) {
        self.shared
            .navigation_never_settles
            .store(true, Ordering::SeqCst);
    }

    /// Blocks screenshots until permits are added to the returned semaphore.
    pub fn gate_screenshots(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.shared.screenshot_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Blocks page closes until permits are added to the returned semaphore.
    pub fn gate_closes(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.shared.close_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.shared.calls.lock().unwrap().clone()
    }

    pub fn viewports(&self) -> Vec<Dimensions> {
        self.shared.viewports.lock().unwrap().clone()
    }

    pub fn specs(&self) -> Vec<ScreenshotSpec> {
        self.shared.specs.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFactory for StubFactory {
    type Page = StubPage;

    async fn open_page(&self) -> Result<StubPage, CaptureError> {
        if self.shared.fail_next_open.swap(false, Ordering::SeqCst) {
            return Err(CaptureError::BrowserLaunchFailed("stub launch failure".into()));
        }
        self.shared.opened.fetch_add(1, Ordering::SeqCst);
        Ok(StubPage {
            shared: self.shared.clone(),
        })
    }
}

#[derive(Clone)]
pub struct StubPage {
    shared: Arc<Shared>,
}

impl StubPage {
    fn record(&self, call: impl Into<String>) {
        self.shared.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl PageDriver for StubPage {
    async fn set_user_agent(&self, _user_agent: &str) -> Result<(), CaptureError> {
        self.record("user_agent");
        Ok(())
    }

    async fn set_extra_headers(&self, _headers: Vec<(String, String)>) -> Result<(), CaptureError> {
        self.record("headers");
        Ok(())
    }

    async fn set_viewport(&self, dimensions: Dimensions) -> Result<(), CaptureError> {
        self.record("viewport");
        self.shared.viewports.lock().unwrap().push(dimensions);
        Ok(())
    }

    async fn emulate_media_feature(&self, _name: &str, value: &str) -> Result<(), CaptureError> {
        self.record(format!("media:{value}"));
        Ok(())
    }

    async fn navigate(&self, url: &str, _wait_until: WaitUntil) -> Result<(), CaptureError> {
        self.record(format!("navigate:{url}"));
        if self.shared.navigation_never_settles.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn add_style_tag(&self, _css: &str) -> Result<(), CaptureError> {
        self.record("style");
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str) -> Result<(), CaptureError> {
        self.record(format!("selector:{selector}"));
        if self.shared.selector_never_matches.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn wait_for_fonts(&self) -> Result<(), CaptureError> {
        self.record("fonts");
        Ok(())
    }

    async fn screenshot(&self, spec: ScreenshotSpec) -> Result<Vec<u8>, CaptureError> {
        let gate = self.shared.screenshot_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await?.forget();
        }
        self.record("screenshot");
        self.shared.specs.lock().unwrap().push(spec);

        Ok(match spec.format {
            ImageFormat::Png => vec![0x89, b'P', b'N', b'G'],
            ImageFormat::Jpeg => vec![0xff, 0xd8, 0xff, 0xe0],
            ImageFormat::Webp => b"RIFF\0\0\0\0WEBP".to_vec(),
        })
    }

    async fn close(&self) -> Result<(), CaptureError> {
        let gate = self.shared.close_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await?.forget();
        }
        self.record("close");
        self.shared.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
