//! Build abort signalling

use std::sync::Arc;

use tokio::sync::watch;

/// Create a connected abort handle and signal
#[must_use]
pub fn abort_pair() -> (AbortHandle, AbortSignal) {
    let (tx, rx) = watch::channel(false);
    (AbortHandle(Arc::new(tx)), AbortSignal { rx: Some(rx) })
}

/// Aborts the build the paired [`AbortSignal`] belongs to
#[derive(Debug, Clone)]
pub struct AbortHandle(Arc<watch::Sender<bool>>);

impl AbortHandle {
    /// Request abort; idempotent
    pub fn abort(&self) {
        self.0.send_replace(true);
    }

    /// Whether abort has been requested
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        *self.0.borrow()
    }
}

/// Resolves once the build is aborted
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl AbortSignal {
    /// A signal that never fires
    #[must_use]
    pub fn never() -> Self {
        Self { rx: None }
    }

    /// Whether abort has been requested
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Wait until abort is requested
    ///
    /// Pends forever if every handle is dropped without aborting.
    pub async fn aborted(&mut self) {
        if let Some(rx) = self.rx.as_mut()
            && rx.wait_for(|aborted| *aborted).await.is_ok()
        {
            return;
        }
        std::future::pending::<()>().await;
    }
}
