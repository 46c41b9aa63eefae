//! # pool
//!
//! The Browser Pool (spec §4.1/§9): acquires/releases short-lived
//! headless-browser instances, bounding total concurrent browser
//! instances. Acquisition blocks (or aborts on cancellation); release is
//! guaranteed on all audit exit paths via `OwnedSemaphorePermit`'s Drop.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;

use crate::browser::capability::BrowserPage;
use crate::error::{EngineError, EngineResult};

/// Produces fresh `BrowserPage` instances. The concrete CDP-backed
/// implementation lives outside this crate (spec §1: the CDP driver is a
/// capability, not a core concern); tests use `FakeBrowserFactory`.
#[async_trait]
pub trait BrowserFactory: Send + Sync {
    async fn create(&self) -> EngineResult<Box<dyn BrowserPage>>;
}

/// One leased browser instance — exclusive ownership for the duration of
/// one probe (spec §9 "Browser scope"). The page is anchored to a scope
/// derived from the caller's cancellation token so navigation and dialog
/// listeners abort together (spec §5).
pub struct BrowserHandle<'pool> {
    _permit: SemaphorePermit<'pool>,
    page: Box<dyn BrowserPage>,
    scope: CancellationToken,
}

impl<'pool> BrowserHandle<'pool> {
    pub fn page_mut(&mut self) -> &mut dyn BrowserPage {
        self.page.as_mut()
    }

    pub fn scope(&self) -> &CancellationToken {
        &self.scope
    }
}

pub struct BrowserPool {
    semaphore: Semaphore,
    factory: Arc<dyn BrowserFactory>,
}

impl BrowserPool {
    pub fn new(capacity: usize, factory: Arc<dyn BrowserFactory>) -> Self {
        Self { semaphore: Semaphore::new(capacity.max(1)), factory }
    }

    /// Blocks until a browser slot is free, or returns
    /// `EngineError::Cancelled` if `cancel` fires first — checked at this
    /// suspension point per spec §5's cancellation discipline ("inside
    /// each worker before making the first network/browser call").
    pub async fn acquire(&self, cancel: &CancellationToken) -> EngineResult<BrowserHandle<'_>> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            permit = self.semaphore.acquire() => permit.map_err(|_| EngineError::Internal("semaphore closed".to_string()))?,
        };

        let page = self.factory.create().await?;

        Ok(BrowserHandle { _permit: permit, page, scope: cancel.child_token() })
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::capability::FakeBrowserPage;

    struct FakeFactory;

    #[async_trait]
    impl BrowserFactory for FakeFactory {
        async fn create(&self) -> EngineResult<Box<dyn BrowserPage>> {
            Ok(Box::new(FakeBrowserPage::default()))
        }
    }

    #[tokio::test]
    async fn acquire_bounds_concurrency() {
        let pool = BrowserPool::new(1, Arc::new(FakeFactory));
        let cancel = CancellationToken::new();
        let handle_a = pool.acquire(&cancel).await.unwrap();
        assert_eq!(pool.available_permits(), 0);
        drop(handle_a);
        // Permit is released synchronously on drop.
        let _handle_b = pool.acquire(&cancel).await.unwrap();
    }

    #[tokio::test]
    async fn acquire_respects_cancellation() {
        let pool = BrowserPool::new(1, Arc::new(FakeFactory));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = pool.acquire(&cancel).await;
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }
}
