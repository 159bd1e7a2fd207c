//! # Screenshot Service
//!
//! An HTTP service that renders a web page in headless Chrome and returns the
//! result as PNG, JPEG or WebP. Captures run through a bounded page pool so a
//! burst of requests queues instead of exhausting the host.
//!
//! ## Request flow
//!
//! 1. Query parameters are validated into [`CaptureOptions`] (all errors at once).
//! 2. The bearer-token gate and the hostname allow-list run before any browser work.
//! 3. A page is leased from a [`BrowserProvider`], the fixed capture sequence
//!    runs against it, and the page is released whatever happened.
//!
//! ## Provisioning strategies
//!
//! | Strategy | Browser | Page | Concurrency bound |
//! |----------|---------|------|-------------------|
//! | `pooled` | one long-lived process | incognito context per capture | `max_concurrency`, FIFO |
//! | `ephemeral` | warm-cached per process | plain page per capture | none |
//!
//! ## Quick Start
//!
//! ```bash
//! SCREENSHOT_AUTH_TOKEN=secret SCREENSHOT_HOST_WHITELIST=example.com screenshot-service
//! curl -H 'Authorization: Bearer secret' \
//!     'http://localhost:3000/screenshot?url=https://example.com&type=jpeg&quality=80' > shot.jpg
//! ```

/// Configuration and Chrome launch settings
pub mod config;

/// Error types and HTTP status mapping
pub mod error;

/// Capture request parsing and validation
pub mod options;

/// Bearer-token and hostname allow-list gates
pub mod security;

/// Page capability interface used by the capture pipeline
pub mod page;

/// Chromium-backed pages and browser lifecycle
pub mod chrome;

/// Page provisioning and concurrency admission
pub mod browser_pool;

/// The ordered capture sequence
pub mod pipeline;

/// Capture engine orchestrating one request end to end
pub mod screenshot_service;

/// HTTP routing layer
pub mod server;

/// Command-line interface and logging setup
pub mod cli;

/// Capture metrics and Prometheus export
pub mod metrics;

#[cfg(test)]
mod testing;


pub use browser_pool::*;
pub use chrome::*;
pub use cli::*;
pub use config::*;
pub use error::*;
pub use options::*;
pub use page::PageDriver;
pub use pipeline::*;
pub use screenshot_service::*;
pub use security::*;
pub use server::*;
