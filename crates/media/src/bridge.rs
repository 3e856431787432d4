//! Bounded execution of retrieval work under a deadline.
//!
//! The bridge owns a fixed number of slots. Work queues while every slot is
//! busy, and the deadline covers the time spent queued as well as running.
//! A [`WorkItem`] is either a blocking closure or a spawned task. Neither can
//! be interrupted: on timeout the caller stops waiting, the work's
//! [`CancellationToken`] is cancelled so it can stop cooperatively, and its
//! eventual result is handed to the item's late-result handler (or dropped).
//! The slot stays occupied until the work really returns.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use {
    futures::future::BoxFuture,
    tokio::sync::{OwnedSemaphorePermit, Semaphore},
    tokio_util::sync::CancellationToken,
    tracing::{debug, warn},
};

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("{label} exceeded its {}s deadline", .deadline.as_secs())]
    Timeout {
        label: &'static str,
        deadline: Duration,
    },
    #[error("execution bridge is shut down")]
    Closed,
    #[error("{label} panicked")]
    Panicked { label: &'static str },
}

type LateHandler<T> = Box<dyn FnOnce(T) + Send>;

enum Operation<T> {
    Blocking(Box<dyn FnOnce() -> T + Send>),
    Task(BoxFuture<'static, T>),
}

/// An operation plus its deadline.
pub struct WorkItem<T> {
    label: &'static str,
    deadline: Duration,
    operation: Operation<T>,
    cancel: Option<CancellationToken>,
    on_late: Option<LateHandler<T>>,
}

impl<T> WorkItem<T> {
    fn with_operation(label: &'static str, deadline: Duration, operation: Operation<T>) -> Self {
        Self {
            label,
            deadline,
            operation,
            cancel: None,
            on_late: None,
        }
    }

    /// A blocking closure, run on the blocking thread pool.
    pub fn new<F>(label: &'static str, deadline: Duration, operation: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Self::with_operation(label, deadline, Operation::Blocking(Box::new(operation)))
    }

    /// An async operation, run as its own task so it can outlive the caller.
    pub fn task<F>(label: &'static str, deadline: Duration, future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self::with_operation(label, deadline, Operation::Task(Box::pin(future)))
    }

    /// Token cancelled when the deadline passes.
    #[must_use]
    pub fn cancel_on_timeout(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Receives the result of an operation that finished after its deadline.
    #[must_use]
    pub fn on_late<F>(mut self, handler: F) -> Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.on_late = Some(Box::new(handler));
        self
    }
}

#[derive(Clone)]
pub struct ExecutionBridge {
    permits: Arc<Semaphore>,
}

impl ExecutionBridge {
    pub fn new(slots: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(slots.max(1))),
        }
    }

    /// Slots not currently held by running work.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run a work item in a slot.
    pub async fn submit<T>(&self, item: WorkItem<T>) -> Result<T, BridgeError>
    where
        T: Send + 'static,
    {
        let WorkItem {
            label,
            deadline,
            operation,
            cancel,
            on_late,
        } = item;
        let started = Instant::now();
        let permit = self.acquire(label, deadline).await?;
        let remaining = deadline.saturating_sub(started.elapsed());

        let mut handle = match operation {
            Operation::Blocking(operation) => tokio::task::spawn_blocking(move || {
                let _permit = permit;
                operation()
            }),
            Operation::Task(future) => tokio::spawn(async move {
                let _permit = permit;
                future.await
            }),
        };

        match tokio::time::timeout(remaining, &mut handle).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(label, error = %e, "work failed to complete");
                Err(BridgeError::Panicked { label })
            },
            Err(_) => {
                warn!(
                    label,
                    deadline_secs = deadline.as_secs(),
                    "deadline exceeded, abandoning work"
                );
                if let Some(token) = cancel {
                    token.cancel();
                }
                tokio::spawn(async move {
                    if let Ok(value) = handle.await {
                        match on_late {
                            Some(handler) => handler(value),
                            None => debug!(label, "discarding late result"),
                        }
                    }
                });
                Err(BridgeError::Timeout { label, deadline })
            },
        }
    }

    /// Run async work under the same slot accounting and deadline rules.
    /// The future is dropped on timeout.
    pub async fn run<F>(
        &self,
        label: &'static str,
        deadline: Duration,
        future: F,
    ) -> Result<F::Output, BridgeError>
    where
        F: Future,
    {
        let started = Instant::now();
        let _permit = self.acquire(label, deadline).await?;
        let remaining = deadline.saturating_sub(started.elapsed());
        tokio::time::timeout(remaining, future).await.map_err(|_| {
            warn!(
                label,
                deadline_secs = deadline.as_secs(),
                "deadline exceeded"
            );
            BridgeError::Timeout { label, deadline }
        })
    }

    async fn acquire(
        &self,
        label: &'static str,
        deadline: Duration,
    ) -> Result<OwnedSemaphorePermit, BridgeError> {
        match tokio::time::timeout(deadline, self.permits.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(BridgeError::Closed),
            Err(_) => {
                debug!(label, "deadline expired while queued");
                Err(BridgeError::Timeout { label, deadline })
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        std::sync::atomic::{AtomicUsize, Ordering},
    };

    #[tokio::test]
    async fn returns_operation_result() {
        let bridge = ExecutionBridge::new(2);
        let value = bridge
            .submit(WorkItem::new("add", Duration::from_secs(5), || 2 + 2))
            .await
            .unwrap();
        assert_eq!(value, 4);
        assert_eq!(bridge.available(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn never_runs_more_than_slot_count() {
        let bridge = ExecutionBridge::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..5)
            .map(|_| {
                let bridge = bridge.clone();
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                tokio::spawn(async move {
                    bridge
                        .submit(WorkItem::new("sleep", Duration::from_secs(10), move || {
                            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            std::thread::sleep(Duration::from_millis(50));
                            running.fetch_sub(1, Ordering::SeqCst);
                        }))
                        .await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn timeout_cancels_and_forwards_late_result() {
        let bridge = ExecutionBridge::new(1);
        let token = CancellationToken::new();
        let observed = token.clone();
        let (tx, rx) = tokio::sync::oneshot::channel();

        let item = WorkItem::new("slow", Duration::from_millis(50), move || {
            while !observed.is_cancelled() {
                std::thread::sleep(Duration::from_millis(5));
            }
            "late"
        })
        .cancel_on_timeout(token.clone())
        .on_late(move |value| {
            let _ = tx.send(value);
        });

        let err = bridge.submit(item).await.unwrap_err();
        assert!(matches!(err, BridgeError::Timeout { label: "slow", .. }));
        assert!(token.is_cancelled());
        assert_eq!(rx.await.unwrap(), "late");
    }

    #[tokio::test]
    async fn deadline_covers_time_spent_queued() {
        let bridge = ExecutionBridge::new(1);
        let blocker = bridge.clone();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let busy = tokio::spawn(async move {
            blocker
                .submit(WorkItem::new("busy", Duration::from_secs(5), move || {
                    let _ = started_tx.send(());
                    std::thread::sleep(Duration::from_millis(300));
                }))
                .await
        });
        started_rx.await.unwrap();

        let err = bridge
            .submit(WorkItem::new("queued", Duration::from_millis(50), || ()))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Timeout { label: "queued", .. }));
        busy.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn async_work_is_dropped_on_timeout() {
        let bridge = ExecutionBridge::new(1);
        let err = bridge
            .run(
                "stall",
                Duration::from_millis(20),
                tokio::time::sleep(Duration::from_secs(5)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Timeout { .. }));
        assert_eq!(bridge.available(), 1);
    }

    #[tokio::test]
    async fn task_outlives_timeout_and_holds_its_slot() {
        let bridge = ExecutionBridge::new(1);
        let token = CancellationToken::new();
        let observed = token.clone();
        let (tx, rx) = tokio::sync::oneshot::channel();

        let item = WorkItem::task("slow-task", Duration::from_millis(50), async move {
            observed.cancelled().await;
            tokio::time::sleep(Duration::from_millis(200)).await;
            7
        })
        .cancel_on_timeout(token.clone())
        .on_late(move |value| {
            let _ = tx.send(value);
        });

        let err = bridge.submit(item).await.unwrap_err();
        assert!(matches!(err, BridgeError::Timeout { .. }));
        assert!(token.is_cancelled());
        assert_eq!(bridge.available(), 0);
        assert_eq!(rx.await.unwrap(), 7);
    }
}
