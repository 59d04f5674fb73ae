//! Every long-lived background process (elector, monitor, sweeper, gate
//! poller, store compactor) registers here so `Shutdown()` can block until
//! all of them have drained (§5).

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, warn};

#[derive(Clone)]
pub struct ShutdownGroup {
    inner: Arc<Inner>,
}

struct Inner {
    stop_tx: watch::Sender<bool>,
    tasks: parking_lot::Mutex<JoinSet<()>>,
}

impl ShutdownGroup {
    pub fn new() -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                stop_tx,
                tasks: parking_lot::Mutex::new(JoinSet::new()),
            }),
        }
    }

    /// Spawn a named background task. `f` receives a clone of the stop
    /// signal receiver so it can select on cancellation at its next
    /// suspension point (§5).
    pub fn spawn<F, Fut>(&self, name: &'static str, f: F)
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let rx = self.inner.stop_tx.subscribe();
        self.inner.tasks.lock().spawn(async move {
            f(rx).await;
        });
        info!(task = name, "background task started");
    }

    pub fn request_shutdown(&self) {
        let _ = self.inner.stop_tx.send(true);
    }

    /// Signals cancellation and waits for every registered task to drain.
    pub async fn shutdown(&self) {
        self.request_shutdown();
        let mut tasks = self.inner.tasks.lock();
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "background task panicked during shutdown");
            }
        }
        drop(tasks);
        info!("all background tasks drained");
    }
}

impl Default for ShutdownGroup {
    fn default() -> Self {
        Self::new()
    }
}
