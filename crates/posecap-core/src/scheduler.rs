//! Self-rescheduling polling loop with owner-scoped cancellation.

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Owns a running loop. Dropping the handle cancels the loop.
pub struct LoopHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl LoopHandle {
    /// Request cancellation. An in-flight step is dropped at its next await.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// True once the loop task has exited (cancelled or stopped itself).
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Cancel and wait for the loop task to exit.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    tracing::error!(error = %e, "polling loop panicked");
                }
            }
        }
    }
}

impl Drop for LoopHandle {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

/// Run `step` forever: await it, wait `interval`, repeat.
///
/// Steps never overlap; the next one is scheduled only after the previous
/// future resolves. The loop ends when the handle is cancelled or dropped,
/// or when a step returns `ControlFlow::Break`.
pub fn repeat_until_cancelled<F, Fut>(interval: Duration, mut step: F) -> LoopHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ControlFlow<()>> + Send + 'static,
{
    let token = CancellationToken::new();
    let cancelled = token.clone();

    let task = tokio::spawn(async move {
        loop {
            let flow = tokio::select! {
                _ = cancelled.cancelled() => break,
                flow = step() => flow,
            };
            if flow.is_break() {
                tracing::debug!("polling loop stopped by step");
                break;
            }
            tokio::select! {
                _ = cancelled.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        tracing::debug!("polling loop exited");
    });

    LoopHandle {
        token,
        task: Some(task),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(count: Arc<AtomicUsize>) -> impl FnMut() -> std::future::Ready<ControlFlow<()>> {
        move || {
            count.fetch_add(1, Ordering::SeqCst);
            std::future::ready(ControlFlow::Continue(()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeats_until_cancelled() {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = repeat_until_cancelled(Duration::from_millis(10), counting(count.clone()));

        tokio::time::sleep(Duration::from_millis(105)).await;
        let seen = count.load(Ordering::SeqCst);
        assert!(seen >= 5, "only {seen} iterations");

        handle.shutdown().await;
        let after = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), after);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = repeat_until_cancelled(Duration::from_millis(10), counting(count.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(handle);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let after = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), after);
    }

    #[tokio::test(start_paused = true)]
    async fn test_break_ends_loop() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let handle = repeat_until_cancelled(Duration::from_millis(1), move || {
            let n = c.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n == 3 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.is_finished());
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_steps_never_overlap() {
        let busy = Arc::new(AtomicBool::new(false));
        let overlaps = Arc::new(AtomicUsize::new(0));
        let runs = Arc::new(AtomicUsize::new(0));
        let (b, o, r) = (busy.clone(), overlaps.clone(), runs.clone());

        // Each step takes longer than the interval.
        let handle = repeat_until_cancelled(Duration::from_millis(1), move || {
            let (b, o, r) = (b.clone(), o.clone(), r.clone());
            async move {
                if b.swap(true, Ordering::SeqCst) {
                    o.fetch_add(1, Ordering::SeqCst);
                }
                tokio::time::sleep(Duration::from_millis(25)).await;
                b.store(false, Ordering::SeqCst);
                r.fetch_add(1, Ordering::SeqCst);
                ControlFlow::Continue(())
            }
        });

        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.shutdown().await;
        assert!(runs.load(Ordering::SeqCst) >= 5);
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }
}
