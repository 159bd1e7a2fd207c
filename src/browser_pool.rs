//! Page provisioning and concurrency admission
//!
//! A [`BrowserProvider`] hands out [`PageLease`]s and takes them back. The
//! pooled provider admits at most `max_concurrency` leases at once and queues
//! the rest in arrival order; the ephemeral provider opens and closes a page
//! per request with no bound of its own.

use crate::{metrics, CaptureError, PageDriver};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

/// Opens fresh pages. Implemented by the chromium factories and by test fakes.
#[async_trait]
pub trait PageFactory: Send + Sync + 'static {
    type Page: PageDriver + Clone + 'static;

    async fn open_page(&self) -> Result<Self::Page, CaptureError>;

    /// Releases any process-wide browser resources.
    async fn shutdown(&self) {}
}

/// Supplies pages to the capture engine.
#[async_trait]
pub trait BrowserProvider: Send + Sync + 'static {
    type Page: PageDriver + Clone + 'static;

    /// Suspends until a page is available.
    async fn acquire(&self) -> Result<PageLease<Self::Page>, CaptureError>;

    /// Returns the page; it is closed and never handed out again.
    async fn release(&self, lease: PageLease<Self::Page>);

    async fn shutdown(&self) {}
}

/// Exclusive use of one page for the duration of a capture.
///
/// A lease dropped without going through [`BrowserProvider::release`] still
/// closes its page and frees its admission slot.
pub struct PageLease<P: PageDriver + Clone + 'static> {
    page: P,
    id: u64,
    slot: Option<SlotGuard>,
    released: bool,
}

impl<P: PageDriver + Clone + 'static> PageLease<P> {
    fn new(page: P, id: u64, slot: Option<SlotGuard>) -> Self {
        Self {
            page,
            id,
            slot,
            released: false,
        }
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Closes the page on a detached task so a cancelled release still
    /// finishes. The slot is returned only after the page is gone.
    async fn close(mut self) {
        self.released = true;
        let cleanup = tokio::spawn(close_page(self.page.clone(), self.id, self.slot.take()));
        if let Err(e) = cleanup.await {
            warn!("Page {} cleanup task failed: {}", self.id, e);
        }
    }
}

async fn close_page<P: PageDriver>(page: P, id: u64, slot: Option<SlotGuard>) {
    if let Err(e) = page.close().await {
        warn!("Failed to close page {}: {}", id, e);
    }
    drop(slot);
}

impl<P: PageDriver + Clone + 'static> std::fmt::Debug for PageLease<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageLease")
            .field("id", &self.id)
            .field("pooled", &self.slot.is_some())
            .field("released", &self.released)
            .finish()
    }
}

impl<P: PageDriver + Clone + 'static> Drop for PageLease<P> {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("Closing abandoned page {}", self.id);
                handle.spawn(close_page(self.page.clone(), self.id, self.slot.take()));
            }
            Err(_) => warn!("Page {} dropped outside of a runtime, not closed", self.id),
        }
    }
}

/// Admission slot held by an active lease.
struct SlotGuard {
    _permit: OwnedSemaphorePermit,
    active: Arc<AtomicUsize>,
}

impl SlotGuard {
    fn new(permit: OwnedSemaphorePermit, active: Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self {
            _permit: permit,
            active,
        }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Decrements the waiting counter however the acquire future ends.
struct WaitingGuard<'a>(&'a AtomicUsize);

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Point-in-time view of the pooled provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    pub active: usize,
    pub idle: usize,
    pub waiting: usize,
}

/// Bounded provider: at most `max_concurrency` pages exist at once.
///
/// Waiters are admitted strictly in arrival order. When `max_queue_depth`
/// requests are already waiting, further acquires fail immediately.
pub struct PooledProvider<F: PageFactory> {
    factory: F,
    semaphore: Arc<Semaphore>,
    capacity: usize,
    max_queue_depth: usize,
    active: Arc<AtomicUsize>,
    waiting: AtomicUsize,
    next_id: AtomicU64,
}

impl<F: PageFactory> PooledProvider<F> {
    pub fn new(factory: F, max_concurrency: usize, max_queue_depth: usize) -> Self {
        info!(
            "Page pool ready: {} concurrent pages, {} queued requests",
            max_concurrency, max_queue_depth
        );
        Self {
            factory,
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            capacity: max_concurrency,
            max_queue_depth,
            active: Arc::new(AtomicUsize::new(0)),
            waiting: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn stats(&self) -> PoolStats {
        let active = self.active.load(Ordering::SeqCst);
        PoolStats {
            capacity: self.capacity,
            active,
            idle: self.capacity.saturating_sub(active),
            waiting: self.waiting.load(Ordering::SeqCst),
        }
    }

    fn publish_stats(&self) {
        let stats = self.stats();
        metrics::set_pool_usage(stats.active, stats.waiting);
    }

    async fn admit(&self) -> Result<SlotGuard, CaptureError> {
        if let Ok(permit) = self.semaphore.clone().try_acquire_owned() {
            return Ok(SlotGuard::new(permit, self.active.clone()));
        }

        let waiting = self.waiting.fetch_add(1, Ordering::SeqCst);
        let _waiting = WaitingGuard(&self.waiting);
        if waiting >= self.max_queue_depth {
            warn!("Capture queue full, {} requests waiting", waiting);
            return Err(CaptureError::ResourceExhausted { waiting });
        }

        self.publish_stats();
        debug!("Waiting for a free page slot ({} ahead)", waiting);
        let permit = self.semaphore.clone().acquire_owned().await?;
        Ok(SlotGuard::new(permit, self.active.clone()))
    }
}

#[async_trait]
impl<F: PageFactory> BrowserProvider for PooledProvider<F> {
    type Page = F::Page;

    async fn acquire(&self) -> Result<PageLease<F::Page>, CaptureError> {
        let slot = self.admit().await?;
        self.publish_stats();

        // The slot drops with the error, so a failed open frees it at once.
        let page = self.factory.open_page().await?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        debug!("Leased page {}", id);
        Ok(PageLease::new(page, id, Some(slot)))
    }

    async fn release(&self, lease: PageLease<F::Page>) {
        let id = lease.id();
        lease.close().await;
        debug!("Released page {}", id);
        self.publish_stats();
    }

    async fn shutdown(&self) {
        info!("Shutting down page pool...");
        self.semaphore.close();
        self.factory.shutdown().await;
        info!("Page pool shutdown complete");
    }
}

/// Unbounded provider: one page per request, closed on release.
pub struct EphemeralProvider<F: PageFactory> {
    factory: F,
    next_id: AtomicU64,
}

impl<F: PageFactory> EphemeralProvider<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            next_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl<F: PageFactory> BrowserProvider for EphemeralProvider<F> {
    type Page = F::Page;

    async fn acquire(&self) -> Result<PageLease<F::Page>, CaptureError> {
        let page = self.factory.open_page().await?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(PageLease::new(page, id, None))
    }

    async fn release(&self, lease: PageLease<F::Page>) {
        lease.close().await;
    }

    async fn shutdown(&self) {
        self.factory.shutdown().await;
    }
}
