//! Capture engine: one request from raw parameters to encoded image
//!
//! Every request walks the same states:
//!
//! ```text
//! Authenticating -> Validating -> AllowlistChecking -> AcquiringPage
//!     -> Capturing -> Releasing -> Done | Failed
//! ```
//!
//! Rejections in the first three states never touch the provider, and once a
//! page has been acquired it is released exactly once whatever the outcome.

use crate::{
    metrics, validate, BrowserProvider, CaptureError, CapturePipeline, CaptureRequest,
    ImageFormat, SecurityConfig,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Authenticating,
    Validating,
    AllowlistChecking,
    AcquiringPage,
    Capturing,
    Releasing,
    Done,
    Failed,
}

/// An encoded screenshot ready to be sent to the client.
#[derive(Debug, Clone)]
pub struct CaptureResult {
    pub data: Vec<u8>,
    pub format: ImageFormat,
    pub duration: Duration,
}

impl CaptureResult {
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }
}

/// Orchestrates the security gates, validation, page leasing and capture.
///
/// # Examples
///
/// ```rust,no_run
/// use screenshot_service::{
///     CaptureEngine, CapturePipeline, CaptureRequest, ChromeContextFactory, Config,
///     PooledProvider,
/// };
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let provider = PooledProvider::new(
///         ChromeContextFactory::new(config.clone()),
///         config.max_concurrency,
///         config.max_queue_depth,
///     );
///     let engine = CaptureEngine::new(
///         Arc::new(provider),
///         config.security.clone(),
///         CapturePipeline::new(config.navigation_timeout, None),
///     );
///
///     let result = engine
///         .capture(&CaptureRequest::for_url("https://example.com"), None)
///         .await?;
///     println!("Captured {} bytes", result.data.len());
///     Ok(())
/// }
/// ```
pub struct CaptureEngine<P: BrowserProvider> {
    provider: Arc<P>,
    security: SecurityConfig,
    pipeline: CapturePipeline,
    log_urls: bool,
}

impl<P: BrowserProvider> CaptureEngine<P> {
    pub fn new(provider: Arc<P>, security: SecurityConfig, pipeline: CapturePipeline) -> Self {
        Self {
            provider,
            security,
            pipeline,
            log_urls: true,
        }
    }

    /// Whether each capture logs its destination URL at info level.
    pub fn with_url_logging(mut self, enabled: bool) -> Self {
        self.log_urls = enabled;
        self
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    pub fn security(&self) -> &SecurityConfig {
        &self.security
    }

    pub async fn capture(
        &self,
        request: &CaptureRequest,
        authorization: Option<&str>,
    ) -> Result<CaptureResult, CaptureError> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("capture", %request_id);
        self.capture_inner(request, authorization).instrument(span).await
    }

    async fn capture_inner(
        &self,
        request: &CaptureRequest,
        authorization: Option<&str>,
    ) -> Result<CaptureResult, CaptureError> {
        debug!(state = ?CaptureState::Authenticating);
        self.security
            .check_auth(authorization)
            .map_err(|e| self.reject(e))?;

        debug!(state = ?CaptureState::Validating);
        let options = validate(request).map_err(|e| self.reject(e.into()))?;

        debug!(state = ?CaptureState::AllowlistChecking);
        self.security
            .check_host(&options)
            .map_err(|e| self.reject(e))?;

        if self.log_urls {
            info!("Capturing {}", options.url);
        }

        let start = Instant::now();
        debug!(state = ?CaptureState::AcquiringPage);
        let lease = match self.provider.acquire().await {
            Ok(lease) => lease,
            Err(e) => return Err(self.fail(e, start)),
        };

        debug!(state = ?CaptureState::Capturing, page = lease.id());
        let outcome = self.pipeline.run(lease.page(), &options).await;

        debug!(state = ?CaptureState::Releasing, page = lease.id());
        self.provider.release(lease).await;

        match outcome {
            Ok(data) => {
                let duration = start.elapsed();
                metrics::record_capture(options.format.as_str(), duration, data.len());
                debug!(state = ?CaptureState::Done, bytes = data.len(), ?duration);
                Ok(CaptureResult {
                    data,
                    format: options.format,
                    duration,
                })
            }
            Err(e) => Err(self.fail(e, start)),
        }
    }

    fn reject(&self, error: CaptureError) -> CaptureError {
        debug!(state = ?CaptureState::Failed, kind = error.kind(), "Request rejected: {}", error);
        metrics::record_rejection(error.kind());
        error
    }

    fn fail(&self, error: CaptureError, start: Instant) -> CaptureError {
        warn!("Capture failed: {}", error);
        debug!(state = ?CaptureState::Failed, kind = error.kind());
        metrics::record_failure(error.kind(), start.elapsed());
        error
    }
}
