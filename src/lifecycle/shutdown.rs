//! Shutdown coordination.
//!
//! `serve` owns one `Shutdown`. The admin API waits on [`Shutdown::signalled`];
//! watchers are stopped by the caller once the admin task has drained.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;

/// One-shot shutdown signal shared by long-running tasks.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    triggered: AtomicBool,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            triggered: AtomicBool::new(false),
        }
    }

    /// A future that completes once [`Shutdown::trigger`] has been called,
    /// including when it was called before this future was created.
    pub fn signalled(&self) -> impl Future<Output = ()> + Send + 'static {
        // Subscribe before reading the flag so a concurrent trigger is not lost.
        let mut rx = self.tx.subscribe();
        let already = self.triggered.load(Ordering::SeqCst);
        async move {
            if !already {
                let _ = rx.recv().await;
            }
        }
    }

    pub fn trigger(&self) {
        if self.triggered.swap(true, Ordering::SeqCst) {
            return;
        }
        let listeners = self.tx.send(()).unwrap_or(0);
        tracing::info!(listeners, "Shutdown triggered");
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
